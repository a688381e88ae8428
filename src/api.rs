use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{CommandError, ErrorKind};
use crate::services::ExecutorFacade;
use crate::types::PriceMode;

/// Local HTTP surface over the executor. Every handler maps to one facade call.
pub fn router(executor: ExecutorFacade) -> Router {
    Router::new()
        .route("/launch", post(launch))
        .route("/activate", post(activate))
        .route("/buy", post(buy))
        .route("/sell", post(sell))
        .route("/cancel", post(cancel))
        .route("/assets", get(assets))
        .route("/positions", get(positions))
        .route("/trades", get(trades))
        .route("/orders", get(orders))
        .route("/cleanup", post(cleanup))
        .with_state(executor)
}

pub async fn run_server(
    executor: ExecutorFacade,
    bind: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("🌐 [API] Listening on {}", bind);

    axum::serve(listener, router(executor))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("🛑 [API] Shutting down");
        })
        .await
}

pub struct ApiError(CommandError);

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match err.error_kind() {
            ErrorKind::Gating => StatusCode::CONFLICT,
            ErrorKind::InvalidOrder => StatusCode::BAD_REQUEST,
            ErrorKind::LaunchTimeout | ErrorKind::Spawn | ErrorKind::WindowNotFound | ErrorKind::Focus => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "status": "failed",
            "command_id": err.command_id,
            "kind": err.kind,
            "target": err.target,
            "stage": err.stage,
            "error_kind": err.error_kind(),
            "message": err.source.to_string(),
            "at": err.at,
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize, Default)]
struct LaunchBody {
    path: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize)]
struct TradeBody {
    symbol: String,
    price: String,
    quantity: u64,
    #[serde(default)]
    mode: PriceMode,
}

#[derive(Deserialize)]
struct CancelBody {
    order_id: String,
}

#[derive(Deserialize)]
struct AssetParams {
    extract: Option<bool>,
}

/// The body is optional; an empty POST launches from the configured `exe_path`.
async fn launch(State(executor): State<ExecutorFacade>, body: Option<Json<LaunchBody>>) -> Result<Response, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let handle = match body.path {
        Some(path) => {
            let timeout = Duration::from_secs(body.timeout_secs.unwrap_or(crate::constants::defaults::LAUNCH_TIMEOUT_SECS));
            executor.launch_with(&path, timeout).await?
        }
        None => executor.launch().await?,
    };
    Ok(Json(json!({"status": "ok", "window": handle})).into_response())
}

async fn activate(State(executor): State<ExecutorFacade>) -> Result<Response, ApiError> {
    let handle = executor.activate().await?;
    Ok(Json(json!({"status": "ok", "window": handle})).into_response())
}

async fn buy(State(executor): State<ExecutorFacade>, Json(body): Json<TradeBody>) -> Result<Response, ApiError> {
    let result = executor.buy(&body.symbol, &body.price, body.quantity, body.mode).await?;
    Ok(Json(result).into_response())
}

async fn sell(State(executor): State<ExecutorFacade>, Json(body): Json<TradeBody>) -> Result<Response, ApiError> {
    let result = executor.sell(&body.symbol, &body.price, body.quantity, body.mode).await?;
    Ok(Json(result).into_response())
}

async fn cancel(State(executor): State<ExecutorFacade>, Json(body): Json<CancelBody>) -> Result<Response, ApiError> {
    let result = executor.cancel(&body.order_id).await?;
    Ok(Json(result).into_response())
}

async fn assets(State(executor): State<ExecutorFacade>, Query(params): Query<AssetParams>) -> Result<Response, ApiError> {
    let snapshot = executor.query_assets(params.extract.unwrap_or(true)).await?;
    Ok(Json(snapshot).into_response())
}

async fn positions(State(executor): State<ExecutorFacade>) -> Result<Response, ApiError> {
    Ok(Json(executor.query_positions().await?).into_response())
}

async fn trades(State(executor): State<ExecutorFacade>) -> Result<Response, ApiError> {
    Ok(Json(executor.query_trades().await?).into_response())
}

async fn orders(State(executor): State<ExecutorFacade>) -> Result<Response, ApiError> {
    Ok(Json(executor.query_orders().await?).into_response())
}

async fn cleanup(State(executor): State<ExecutorFacade>) -> Response {
    match executor.cleanup().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            warn!("⚠️ [API] Cleanup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "failed", "error_kind": ErrorKind::Persistence, "message": e.to_string()})),
            )
                .into_response()
        }
    }
}
