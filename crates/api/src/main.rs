use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use portfolio_insight_core::allocation::{allocate_request, AllocationError};
use portfolio_insight_core::brokerage::{Account, InvalidAccountKey};
use portfolio_insight_core::domain::allocation::AllocationReport;
use portfolio_insight_core::domain::contract::{AccountAllocationRequest, AllocationRequest};
use portfolio_insight_core::service::{AccountSummary, AllocationService, CollaboratorTimeout};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = portfolio_insight_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    // Without a brokerage the stateless /allocations route still works.
    let service = if settings.brokerage_configured() {
        match AllocationService::from_settings(&settings) {
            Ok(svc) => Some(Arc::new(svc)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "brokerage client init failed; starting API in degraded mode");
                None
            }
        }
    } else {
        tracing::warn!("BROKERAGE_BASE_URL missing; starting API without brokerage routes");
        None
    };

    let app = router(AppState { service });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/allocations", post(post_allocation))
        .route("/accounts", get(get_accounts))
        .route(
            "/accounts/:account_id_key/allocations",
            post(post_account_allocation),
        )
        .route("/accounts/:account_id_key/summary", get(get_account_summary))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    service: Option<Arc<AllocationService>>,
}

#[derive(Debug, Serialize)]
struct ApiAllocation {
    calculation_id: Uuid,
    generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id_key: Option<String>,
    report: AllocationReport,
}

impl ApiAllocation {
    fn new(account_id_key: Option<String>, report: AllocationReport) -> Self {
        Self {
            calculation_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            account_id_key,
            report,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiAccounts {
    provider: &'static str,
    accounts: Vec<Account>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        match &err {
            AllocationError::Validation(v) => ApiError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({"error": err.to_string(), "field": v.field(), "kind": err.kind()}),
            },
            AllocationError::InternalConsistency(_) => {
                let wrapped = anyhow::Error::new(err.clone());
                sentry_anyhow::capture_anyhow(&wrapped);
                ApiError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    body: json!({"error": err.to_string(), "kind": err.kind()}),
                }
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(alloc) = err.downcast_ref::<AllocationError>() {
            return alloc.clone().into();
        }
        if let Some(invalid) = err.downcast_ref::<InvalidAccountKey>() {
            return ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({"error": invalid.to_string(), "field": "account_id_key", "kind": "validation"}),
            };
        }

        // Upstream detail stays in logs and sentry; clients get a fixed message.
        let (status, kind, message) = if err.downcast_ref::<CollaboratorTimeout>().is_some() {
            (StatusCode::GATEWAY_TIMEOUT, "timeout", "brokerage request timed out")
        } else {
            (StatusCode::BAD_GATEWAY, "collaborator", "brokerage request failed")
        };
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = ?err, kind, "brokerage request failed");

        ApiError {
            status,
            body: json!({"error": message, "kind": kind}),
        }
    }
}

fn require_service(state: &AppState) -> Result<&Arc<AllocationService>, ApiError> {
    state.service.as_ref().ok_or_else(|| ApiError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: json!({"error": "brokerage is not configured", "kind": "unavailable"}),
    })
}

async fn post_allocation(
    Json(request): Json<AllocationRequest>,
) -> Result<Json<ApiAllocation>, ApiError> {
    let report = allocate_request(request)?;
    Ok(Json(ApiAllocation::new(None, report)))
}

async fn get_accounts(State(state): State<AppState>) -> Result<Json<ApiAccounts>, ApiError> {
    let service = require_service(&state)?;
    let accounts = service.list_accounts().await?;
    Ok(Json(ApiAccounts {
        provider: service.provider_name(),
        accounts,
    }))
}

async fn post_account_allocation(
    State(state): State<AppState>,
    Path(account_id_key): Path<String>,
    Json(request): Json<AccountAllocationRequest>,
) -> Result<Json<ApiAllocation>, ApiError> {
    let service = require_service(&state)?;
    let (target, amount) = request
        .validate()
        .map_err(|e| ApiError::from(AllocationError::from(e)))?;

    let report = service
        .calculate_allocation(&account_id_key, &target, amount)
        .await?;
    Ok(Json(ApiAllocation::new(Some(account_id_key), report)))
}

async fn get_account_summary(
    State(state): State<AppState>,
    Path(account_id_key): Path<String>,
) -> Result<Json<AccountSummary>, ApiError> {
    let service = require_service(&state)?;
    let summary = service.account_summary(&account_id_key).await?;
    Ok(Json(summary))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_insight_core::allocation::{InternalConsistencyError, ValidationError};
    use std::time::Duration;

    #[test]
    fn validation_errors_map_to_unprocessable_with_field() {
        let err = ApiError::from(AllocationError::from(ValidationError::MissingPrices {
            symbols: vec!["GOOGL".to_string()],
        }));

        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body["field"], "current_prices.GOOGL");
        assert_eq!(err.body["kind"], "validation");
        assert_eq!(err.body["error"], "Missing current prices for: GOOGL");
    }

    #[test]
    fn internal_consistency_maps_to_server_error() {
        let err = ApiError::from(AllocationError::from(
            InternalConsistencyError::UnpricedPlanEntry {
                symbol: "AAPL".to_string(),
            },
        ));

        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body["kind"], "internal_consistency");
    }

    #[test]
    fn service_errors_map_by_cause() {
        let wrapped: anyhow::Error = AllocationError::from(ValidationError::EmptyTarget).into();
        assert_eq!(
            ApiError::from(wrapped).status,
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let timeout = anyhow::Error::new(CollaboratorTimeout {
            operation: "quotes",
            timeout: Duration::from_secs(1),
        })
        .context("failed to fetch quotes");
        assert_eq!(ApiError::from(timeout).status, StatusCode::GATEWAY_TIMEOUT);

        let upstream = anyhow::anyhow!("brokerage portfolio HTTP 401 Unauthorized: token expired");
        let err = ApiError::from(upstream);
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.body["kind"], "collaborator");
    }

    #[test]
    fn upstream_detail_is_not_returned_to_clients() {
        let upstream = anyhow::anyhow!("brokerage balance HTTP 500: internal host db-7.corp")
            .context("failed to fetch balance for account abc");
        let err = ApiError::from(upstream);

        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.body["error"], "brokerage request failed");
        assert!(!err.body.to_string().contains("db-7.corp"));
    }

    #[test]
    fn malformed_account_key_is_bad_request() {
        let invalid = portfolio_insight_core::brokerage::validate_account_id_key("a/b")
            .map(str::to_string)
            .unwrap_err();
        let err = ApiError::from(
            anyhow::Error::new(invalid).context("failed to fetch portfolio for account a/b"),
        );

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.body["field"], "account_id_key");
    }

    #[test]
    fn cash_bound_maps_to_unprocessable() {
        let err: anyhow::Error = AllocationError::from(ValidationError::ExceedsAvailableCash {
            amount: 5000.0,
            available: 100.0,
        })
        .into();
        let err = ApiError::from(err);

        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.body["field"], "investment_amount");
    }

    #[test]
    fn missing_brokerage_is_unavailable() {
        let state = AppState { service: None };
        let err = require_service(&state).err().unwrap();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn posts_allocation_without_brokerage() {
        let request: AllocationRequest = serde_json::from_value(json!({
            "target_allocation": {"AAPL": 0.6, "GOOGL": 0.4},
            "investment_amount": 1000.0,
            "current_allocation": {"AAPL": 500.0, "GOOGL": 500.0},
            "current_prices": {"AAPL": 150.0, "GOOGL": 200.0}
        }))
        .unwrap();

        let Json(body) = post_allocation(Json(request)).await.unwrap();
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["report"]["allocation_recommendations"]["AAPL"], 2);
        assert_eq!(v["report"]["unused_cash"], 700.0);
        assert!(v.get("account_id_key").is_none());
    }
}
