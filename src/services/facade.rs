//! Caller-facing command API.
//!
//! Every method enqueues one command on the serialized worker and waits for its
//! outcome. Failures come back as [`CommandError`] after they have been logged
//! and published.

use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::info;
use uuid::Uuid;

use crate::bus::EventBus;
use crate::capture::ScreenCapture;
use crate::config::AppConfig;
use crate::constants::defaults;
use crate::error::{CommandError, ExecutorError};
use crate::events::ExecutorEvent;
use crate::persistence::{CleanupReport, PersistenceLog};
use crate::pricing::PriceCalculator;
use crate::services::dispatcher::CommandDispatcher;
use crate::services::gating::Clock;
use crate::services::queue::{Command, CommandWorker, Job, Outcome, PostStage};
use crate::symbols::SymbolBook;
use crate::types::{AssetSnapshot, CommandKind, CommandStage, OrderRequest, OrderResult, PriceMode, QueryResult};
use crate::vision::Extraction;
use crate::window::{Actuator, WindowController, WindowHandle};

/// Runtime collaborators the executor cannot build from config alone.
pub struct ExecutorDeps {
    pub actuator: Arc<dyn Actuator>,
    pub clock: Arc<dyn Clock>,
    pub extraction: Extraction,
    pub bus: EventBus,
    pub shutdown: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct ExecutorFacade {
    tx: mpsc::Sender<Job>,
    persistence: PersistenceLog,
    symbols: SymbolBook,
    bus: EventBus,
    exe_path: Option<PathBuf>,
    launch_timeout: Duration,
    retention_days: u32,
    extract_queries: bool,
}

impl ExecutorFacade {
    /// Wires the worker from config and starts it.
    pub fn start(config: &AppConfig, deps: ExecutorDeps) -> Self {
        let symbols = SymbolBook::from_config(&config.symbols);
        let persistence = PersistenceLog::new(config.log_root.clone());

        let controller = WindowController::new(deps.actuator.clone(), config.window.clone(), deps.shutdown);
        let dispatcher = CommandDispatcher::new(
            deps.actuator.clone(),
            PriceCalculator::new(&config.pricing, symbols.clone()),
            symbols.clone(),
            config.trading_hours.clone(),
            deps.clock,
            config.pacing.clone(),
        );
        let capture = ScreenCapture::new(deps.actuator, config.window.regions.clone());
        let post = PostStage::new(
            persistence.clone(),
            deps.extraction,
            Duration::from_secs(config.vision.timeout_secs),
            config.vision.verify_orders,
            deps.bus.clone(),
        );

        let tx = CommandWorker::new(controller, dispatcher, capture, post).spawn(defaults::QUEUE_CAPACITY);
        info!("🏁 [EXECUTOR] Ready (log root {})", config.log_root.display());

        Self {
            tx,
            persistence,
            symbols,
            bus: deps.bus,
            exe_path: config.window.exe_path.clone(),
            launch_timeout: Duration::from_secs(config.window.launch_timeout_secs),
            retention_days: config.retention.days,
            extract_queries: config.vision.extract_queries,
        }
    }

    async fn submit(&self, command: Command) -> Result<Outcome, CommandError> {
        let id = Uuid::new_v4();
        let kind = command.kind();
        let target = command.target();
        let (reply, rx) = oneshot::channel();

        if self.tx.send(Job { id, command, reply }).await.is_err() {
            return Err(idle_error(id, kind, target, ExecutorError::QueueClosed));
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(idle_error(id, kind, target, ExecutorError::QueueClosed)),
        }
    }

    /// Launches the configured client executable.
    pub async fn launch(&self) -> Result<WindowHandle, CommandError> {
        match &self.exe_path {
            Some(path) => self.launch_with(path, self.launch_timeout).await,
            None => Err(idle_error(
                Uuid::new_v4(),
                CommandKind::Launch,
                None,
                ExecutorError::Spawn {
                    path: "-".to_string(),
                    reason: "window.exe_path is not configured".to_string(),
                },
            )),
        }
    }

    pub async fn launch_with(&self, path: &Path, timeout: Duration) -> Result<WindowHandle, CommandError> {
        let command = Command::Launch {
            path: path.to_path_buf(),
            timeout,
        };
        match self.submit(command).await? {
            Outcome::Window(handle) => Ok(handle),
            other => Err(unexpected(CommandKind::Launch, other)),
        }
    }

    pub async fn activate(&self) -> Result<WindowHandle, CommandError> {
        match self.submit(Command::Activate).await? {
            Outcome::Window(handle) => Ok(handle),
            other => Err(unexpected(CommandKind::Activate, other)),
        }
    }

    pub async fn buy(&self, symbol: &str, price: &str, quantity: u64, mode: PriceMode) -> Result<OrderResult, CommandError> {
        self.order(OrderRequest::buy(symbol, price, quantity, mode)).await
    }

    pub async fn sell(&self, symbol: &str, price: &str, quantity: u64, mode: PriceMode) -> Result<OrderResult, CommandError> {
        self.order(OrderRequest::sell(symbol, price, quantity, mode)).await
    }

    pub async fn cancel(&self, order_id: &str) -> Result<OrderResult, CommandError> {
        self.order(OrderRequest::cancel(order_id)).await
    }

    /// Any buy / sell / cancel request.
    pub async fn order(&self, request: OrderRequest) -> Result<OrderResult, CommandError> {
        let kind = request.kind();
        match self.submit(Command::Order(request)).await? {
            Outcome::Order(result) => Ok(result),
            other => Err(unexpected(kind, other)),
        }
    }

    pub async fn query_assets(&self, use_extraction: bool) -> Result<AssetSnapshot, CommandError> {
        let command = Command::Query {
            kind: CommandKind::QueryAssets,
            use_extraction,
        };
        match self.submit(command).await? {
            Outcome::Assets(snapshot) => Ok(snapshot),
            other => Err(unexpected(CommandKind::QueryAssets, other)),
        }
    }

    pub async fn query_positions(&self) -> Result<QueryResult, CommandError> {
        self.query_page(CommandKind::QueryPositions).await
    }

    pub async fn query_trades(&self) -> Result<QueryResult, CommandError> {
        self.query_page(CommandKind::QueryTrades).await
    }

    pub async fn query_orders(&self) -> Result<QueryResult, CommandError> {
        self.query_page(CommandKind::QueryOrders).await
    }

    async fn query_page(&self, kind: CommandKind) -> Result<QueryResult, CommandError> {
        let command = Command::Query {
            kind,
            use_extraction: self.extract_queries,
        };
        match self.submit(command).await? {
            Outcome::Page(result) => Ok(result),
            other => Err(unexpected(kind, other)),
        }
    }

    /// Retention sweep with the configured period. Runs beside the queue.
    pub async fn cleanup(&self) -> io::Result<CleanupReport> {
        let report = self.persistence.cleanup(self.retention_days).await?;
        self.bus.publish(ExecutorEvent::CleanupFinished(report.clone()));
        Ok(report)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.bus.subscribe()
    }

    /// Symbol book shared with the dispatcher; entries added here apply to
    /// subsequent orders.
    pub fn symbols(&self) -> &SymbolBook {
        &self.symbols
    }

    pub fn persistence(&self) -> &PersistenceLog {
        &self.persistence
    }
}

fn idle_error(id: Uuid, kind: CommandKind, target: Option<String>, source: ExecutorError) -> CommandError {
    CommandError {
        command_id: id,
        kind,
        target,
        stage: CommandStage::Idle,
        at: Local::now(),
        source,
    }
}

fn unexpected(kind: CommandKind, outcome: Outcome) -> CommandError {
    idle_error(
        Uuid::new_v4(),
        kind,
        None,
        ExecutorError::Actuator(format!("unexpected outcome for {}: {:?}", kind, outcome)),
    )
}
