use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portfolio_insight_core::allocation::allocate_request;
use portfolio_insight_core::domain::allocation::{AllocationReport, InvestmentAmount};
use portfolio_insight_core::domain::contract::AllocationRequest;
use portfolio_insight_core::service::AllocationService;

mod render;
mod target;

#[derive(Debug, Parser)]
#[command(name = "portfolio-insight", about = "Whole-share purchase plans toward a target allocation")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compute from a JSON file with target, amount, holdings and prices.
    Compute {
        #[arg(long)]
        input: PathBuf,

        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Compute against a brokerage account's holdings and live quotes.
    Account {
        #[arg(long)]
        account_id_key: String,

        /// e.g. AAPL=0.6,GOOGL=0.4 or AAPL=60%,GOOGL=40%
        #[arg(long)]
        target: String,

        /// Defaults to the account's cash available for investment.
        #[arg(long)]
        amount: Option<f64>,

        #[arg(long)]
        json: bool,
    },

    /// List brokerage accounts.
    Accounts,

    /// Balance and position statistics for one account.
    Summary {
        #[arg(long)]
        account_id_key: String,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = portfolio_insight_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let res = run(args.command, &settings).await;
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "command failed");
    }
    res
}

async fn run(
    command: Command,
    settings: &portfolio_insight_core::config::Settings,
) -> anyhow::Result<()> {
    match command {
        Command::Compute { input, json } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let request: AllocationRequest = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a valid allocation request", input.display()))?;

            let report = allocate_request(request)?;
            print_report(&report, json)
        }
        Command::Account {
            account_id_key,
            target,
            amount,
            json,
        } => {
            let target = target::parse_target(&target)?;
            let amount = amount.map(InvestmentAmount::new).transpose()?;
            let service = AllocationService::from_settings(settings)?;

            let report = service
                .calculate_allocation(&account_id_key, &target, amount)
                .await?;
            tracing::info!(
                %account_id_key,
                provider = service.provider_name(),
                amount = report.investment_amount.value(),
                unused_cash = report.unused_cash,
                "allocation calculated"
            );
            print_report(&report, json)
        }
        Command::Accounts => {
            let service = AllocationService::from_settings(settings)?;
            let accounts = service.list_accounts().await?;
            print!("{}", render::render_accounts(service.provider_name(), &accounts));
            Ok(())
        }
        Command::Summary {
            account_id_key,
            json,
        } => {
            let service = AllocationService::from_settings(settings)?;
            let summary = service.account_summary(&account_id_key).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", render::render_summary(&summary));
            }
            Ok(())
        }
    }
}

fn print_report(report: &AllocationReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", render::render_report(report));
    }
    Ok(())
}

fn init_sentry(
    settings: &portfolio_insight_core::config::Settings,
) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
