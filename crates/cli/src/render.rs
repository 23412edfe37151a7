use portfolio_insight_core::brokerage::Account;
use portfolio_insight_core::domain::allocation::AllocationReport;
use portfolio_insight_core::service::AccountSummary;
use std::fmt::Write;

pub fn render_report(report: &AllocationReport) -> String {
    let mut out = String::new();

    if report.allocation_breakdown.is_empty() {
        let _ = writeln!(out, "No purchases recommended.");
    }
    for (symbol, entry) in &report.allocation_breakdown {
        let _ = writeln!(
            out,
            "{symbol}: {} shares @ ${:.2} = ${:.2} ({:.1}%)",
            entry.shares,
            entry.price_per_share,
            entry.investment_value,
            entry.percentage_of_investment
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Total invested: ${:.2} of ${:.2}",
        report.total_investment_value,
        report.investment_amount.value()
    );
    let _ = writeln!(out, "Unused cash: ${:.2}", report.unused_cash);

    if !report.projection.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Projected allocation:");
        for (symbol, holding) in &report.projection {
            let _ = writeln!(
                out,
                "  {symbol}: {:.1}% vs {:.1}% target",
                holding.projected_weight * 100.0,
                holding.target_weight * 100.0
            );
        }
    }

    out
}

pub fn render_accounts(provider: &str, accounts: &[Account]) -> String {
    let mut out = String::new();
    if accounts.is_empty() {
        let _ = writeln!(out, "No accounts returned by {provider}.");
        return out;
    }

    for account in accounts {
        let _ = writeln!(
            out,
            "{}  {}  {}  {}",
            account.account_id_key,
            account.account_id.as_deref().unwrap_or("-"),
            account.description.as_deref().unwrap_or("-"),
            account.status.as_deref().unwrap_or("-"),
        );
    }
    out
}

fn money(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("${v:.2}"))
}

pub fn render_summary(summary: &AccountSummary) -> String {
    let mut out = String::new();
    let balance = &summary.balance;
    let stats = &summary.portfolio_summary;

    let _ = writeln!(
        out,
        "Account {} ({})",
        balance.account_id.as_deref().unwrap_or(&summary.account_id_key),
        balance.account_description.as_deref().unwrap_or("-")
    );
    let _ = writeln!(out, "Total value: {}", money(balance.total_account_value));
    let _ = writeln!(
        out,
        "Cash available for investment: {}",
        money(balance.investable_cash())
    );
    let _ = writeln!(out, "Margin buying power: {}", money(balance.margin_buying_power));

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} positions, ${:.2} market value, ${:.2} gain/loss ({} up, {} down)",
        stats.total_positions,
        stats.total_market_value,
        stats.total_gain_loss,
        stats.positions_with_gains,
        stats.positions_with_losses
    );
    for position in &summary.positions {
        let _ = writeln!(
            out,
            "  {}: {} @ {} = {} (gain {})",
            position.resolved_symbol().unwrap_or("?"),
            position
                .quantity
                .map_or_else(|| "-".to_string(), |q| q.to_string()),
            money(position.last_trade),
            money(position.market_value),
            money(position.total_gain)
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_insight_core::allocation::allocate_request;
    use serde_json::json;

    #[test]
    fn renders_purchases_totals_and_projection() {
        let report = allocate_request(
            serde_json::from_value(json!({
                "target_allocation": {"AAPL": 0.6, "GOOGL": 0.4},
                "investment_amount": 1000.0,
                "current_allocation": {"AAPL": 500.0, "GOOGL": 500.0},
                "current_prices": {"AAPL": 150.0, "GOOGL": 200.0}
            }))
            .unwrap(),
        )
        .unwrap();

        let text = render_report(&report);
        assert!(text.contains("AAPL: 2 shares @ $150.00 = $300.00 (30.0%)"));
        assert!(!text.contains("GOOGL: 0 shares"));
        assert!(text.contains("Total invested: $300.00 of $1000.00"));
        assert!(text.contains("Unused cash: $700.00"));
        // 800 / 1300 and 500 / 1300 after the purchase
        assert!(text.contains("AAPL: 61.5% vs 60.0% target"));
        assert!(text.contains("GOOGL: 38.5% vs 40.0% target"));
    }

    #[test]
    fn renders_account_summary() {
        use portfolio_insight_core::brokerage::{Balance, Position};
        use portfolio_insight_core::service::summarize_positions;

        let positions = vec![Position {
            symbol: Some("AAPL".to_string()),
            symbol_description: None,
            security_type: Some("EQ".to_string()),
            quantity: Some(10.0),
            market_value: Some(1500.0),
            price_paid: Some(120.0),
            total_gain: Some(300.0),
            last_trade: Some(150.0),
        }];
        let summary = AccountSummary {
            account_id_key: "key-1".to_string(),
            balance: Balance {
                account_id: Some("84010429".to_string()),
                account_description: Some("INDIVIDUAL".to_string()),
                total_account_value: Some(2000.0),
                cash_available_for_investment: Some(500.0),
                cash_buying_power: None,
                margin_buying_power: None,
            },
            portfolio_summary: summarize_positions(&positions),
            positions,
        };

        let text = render_summary(&summary);
        assert!(text.contains("Account 84010429 (INDIVIDUAL)"));
        assert!(text.contains("Cash available for investment: $500.00"));
        assert!(text.contains("Margin buying power: -"));
        assert!(text.contains("1 positions, $1500.00 market value, $300.00 gain/loss (1 up, 0 down)"));
        assert!(text.contains("  AAPL: 10 @ $150.00 = $1500.00 (gain $300.00)"));
    }

    #[test]
    fn renders_empty_account_list() {
        assert_eq!(
            render_accounts("etrade_http_json", &[]),
            "No accounts returned by etrade_http_json.\n"
        );
    }
}
