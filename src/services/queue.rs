//! Serialized command worker.
//!
//! One task owns the window controller, dispatcher and capture, so at most one
//! command touches the client window at a time. Once a command's keys are sent
//! and its screenshot taken, the rest of its work (extraction, recording, reply)
//! moves to its own task and the worker picks up the next command.

use chrono::Local;
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::capture::{CapturedImage, ScreenCapture};
use crate::error::{CommandError, ExecutorError, VisionError};
use crate::events::{CommandFailure, ExecutorEvent, QueryPayload};
use crate::persistence::{ArtifactCategory, ArtifactPayload, CommandLogEntry, LogArtifact, PersistenceLog};
use crate::services::dispatcher::CommandDispatcher;
use crate::types::{
    AccountAssets, AssetSnapshot, CommandKind, CommandStage, ExtractionStatus, OrderRequest, OrderResult, QueryResult,
    Side,
};
use crate::vision::{prompts, Extraction, ImageRef};
use crate::window::{WindowController, WindowHandle};

pub enum Command {
    Launch { path: PathBuf, timeout: Duration },
    Activate,
    Order(OrderRequest),
    Query { kind: CommandKind, use_extraction: bool },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Launch { .. } => CommandKind::Launch,
            Command::Activate => CommandKind::Activate,
            Command::Order(req) => req.kind(),
            Command::Query { kind, .. } => *kind,
        }
    }

    pub fn target(&self) -> Option<String> {
        match self {
            Command::Launch { path, .. } => Some(path.display().to_string()),
            Command::Activate => None,
            Command::Order(req) => Some(req.target()),
            Command::Query { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Window(WindowHandle),
    Order(OrderResult),
    Assets(AssetSnapshot),
    Page(QueryResult),
}

pub type Reply = oneshot::Sender<Result<Outcome, CommandError>>;

pub struct Job {
    pub id: Uuid,
    pub command: Command,
    pub reply: Reply,
}

/// What was actually typed for an order or cancel.
struct OrderEcho {
    target: String,
    price: Option<String>,
    quantity: Option<u64>,
}

type StageResult<T> = Result<T, (CommandStage, ExecutorError)>;

/// Failed order, with what was (or was about to be) typed once it was priced.
type OrderFailure = (CommandStage, ExecutorError, Option<OrderEcho>);

fn at(stage: CommandStage) -> impl Fn(ExecutorError) -> (CommandStage, ExecutorError) {
    move |e| (stage, e)
}

pub struct CommandWorker {
    controller: WindowController,
    dispatcher: CommandDispatcher,
    capture: ScreenCapture,
    handle: Option<WindowHandle>,
    post: PostStage,
}

impl CommandWorker {
    pub fn new(
        controller: WindowController,
        dispatcher: CommandDispatcher,
        capture: ScreenCapture,
        post: PostStage,
    ) -> Self {
        Self {
            controller,
            dispatcher,
            capture,
            handle: None,
            post,
        }
    }

    /// Starts the worker task and returns its queue.
    pub fn spawn(self, capacity: usize) -> mpsc::Sender<Job> {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(self.run(rx));
        tx
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Job>) {
        info!("📬 [QUEUE] Command worker started");
        while let Some(job) = rx.recv().await {
            self.handle_job(job).await;
        }
        info!("📬 [QUEUE] All senders dropped, shutting down");
    }

    async fn handle_job(&mut self, job: Job) {
        let Job { id, command, reply } = job;
        let kind = command.kind();
        let target = command.target();
        debug!("[QUEUE] {} {} dequeued", kind, id);

        match command {
            Command::Launch { path, timeout } => {
                let result = self.controller.launch(&path, timeout).await;
                self.finish_window(id, kind, target, result, reply);
            }
            Command::Activate => {
                let result = self.controller.activate().await;
                self.finish_window(id, kind, target, result, reply);
            }
            Command::Order(req) => match self.run_order(&req).await {
                Ok((echo, image)) => {
                    let post = self.post.clone();
                    tokio::spawn(async move { post.finish_order(id, kind, echo, image, reply).await });
                }
                Err((stage, e, echo)) => {
                    // Resolved code or trimmed order id once known
                    let target = echo.as_ref().map(|echo| echo.target.clone()).or(target);
                    tokio::spawn(self.post.clone().fail(id, kind, target, stage, e, echo, None, reply));
                }
            },
            Command::Query { kind, use_extraction } => match self.run_query(kind).await {
                Ok(image) => {
                    let post = self.post.clone();
                    tokio::spawn(async move { post.finish_query(id, kind, use_extraction, image, reply).await });
                }
                Err((stage, e)) => {
                    tokio::spawn(self.post.clone().fail(id, kind, target, stage, e, None, None, reply));
                }
            },
        }
    }

    fn finish_window(
        &mut self,
        id: Uuid,
        kind: CommandKind,
        target: Option<String>,
        result: Result<WindowHandle, ExecutorError>,
        reply: Reply,
    ) {
        match result {
            Ok(handle) => {
                self.handle = Some(handle.clone());
                let entry = CommandLogEntry::new(id, kind, target.or_else(|| Some(handle.title.clone())));
                let post = self.post.clone();
                tokio::spawn(async move {
                    post.append(entry).await;
                    let _ = reply.send(Ok(Outcome::Window(handle)));
                });
            }
            Err(e) => {
                if e.is_window_error() {
                    self.handle = None;
                }
                tokio::spawn(self.post.clone().fail(id, kind, target, CommandStage::Focusing, e, None, None, reply));
            }
        }
    }

    /// Current handle if still valid, else re-activated or relaunched, then focused.
    async fn focus(&mut self) -> Result<WindowHandle, ExecutorError> {
        let handle = match self.controller.acquire(self.handle.as_ref()).await {
            Ok(h) => h,
            Err(e) => {
                self.handle = None;
                return Err(e);
            }
        };
        self.handle = Some(handle.clone());
        self.controller.ensure_focus(&handle).await?;
        Ok(handle)
    }

    async fn run_order(&mut self, req: &OrderRequest) -> Result<(OrderEcho, CapturedImage), OrderFailure> {
        self.dispatcher
            .trading_window_check(req.kind())
            .map_err(|e| (CommandStage::Idle, e, None))?;

        let prepared = match req.side {
            Side::Cancel if req.order_id.as_deref().map(str::trim).unwrap_or_default().is_empty() => {
                return Err((
                    CommandStage::Idle,
                    ExecutorError::InvalidOrder {
                        reason: "order id is required".to_string(),
                    },
                    None,
                ));
            }
            Side::Cancel => None,
            _ => Some(
                self.dispatcher
                    .prepare(req)
                    .map_err(|e| (CommandStage::Idle, e, None))?,
            ),
        };

        let echo = match &prepared {
            Some(order) => OrderEcho {
                target: order.code.clone(),
                price: Some(order.price.clone()),
                quantity: Some(order.quantity),
            },
            None => OrderEcho {
                target: req.order_id.as_deref().unwrap_or_default().trim().to_string(),
                price: None,
                quantity: None,
            },
        };

        let handle = match self.focus().await {
            Ok(handle) => handle,
            Err(e) => return Err((CommandStage::Focusing, e, Some(echo))),
        };

        let sent = match &prepared {
            Some(order) => self.dispatcher.send_order(order).await,
            None => self.dispatcher.send_cancel(&echo.target).await,
        };
        if let Err(e) = sent {
            return Err((CommandStage::Dispatching, e, Some(echo)));
        }

        match self.capture.capture(&handle, None).await {
            Ok(image) => Ok((echo, image)),
            Err(e) => Err((CommandStage::Capturing, e, Some(echo))),
        }
    }

    async fn run_query(&mut self, kind: CommandKind) -> StageResult<CapturedImage> {
        let handle = self.focus().await.map_err(at(CommandStage::Focusing))?;
        self.dispatcher
            .open_page(kind)
            .await
            .map_err(at(CommandStage::Dispatching))?;
        self.capture
            .capture(&handle, None)
            .await
            .map_err(at(CommandStage::Capturing))
    }
}

/// Extraction, recording and reply for one command, off the worker task.
#[derive(Clone)]
pub struct PostStage {
    persistence: PersistenceLog,
    extraction: Extraction,
    vision_timeout: Duration,
    verify_orders: bool,
    bus: EventBus,
}

impl PostStage {
    pub fn new(
        persistence: PersistenceLog,
        extraction: Extraction,
        vision_timeout: Duration,
        verify_orders: bool,
        bus: EventBus,
    ) -> Self {
        Self {
            persistence,
            extraction,
            vision_timeout,
            verify_orders,
            bus,
        }
    }

    async fn extract(&self, image: &CapturedImage, prompt: &str) -> Option<Result<Value, VisionError>> {
        let extractor = self.extraction.extractor()?;
        let image = ImageRef::from_capture(image);
        let result = match tokio::time::timeout(self.vision_timeout, extractor.analyze_json(&image, prompt, None)).await {
            Ok(result) => result,
            Err(_) => Err(VisionError::Timeout(self.vision_timeout)),
        };
        Some(result)
    }

    async fn finish_order(self, id: Uuid, kind: CommandKind, echo: OrderEcho, image: CapturedImage, reply: Reply) {
        let mut confirmation_text = None;
        let mut rejection = None;

        if self.verify_orders {
            match self.extract(&image, prompts::confirmation().prompt()).await {
                Some(Ok(value)) => {
                    let message = value
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_string);
                    if value.get("accepted").and_then(Value::as_bool) == Some(false) {
                        rejection = Some(message.clone().unwrap_or_else(|| "rejected by client".to_string()));
                    }
                    confirmation_text = message;
                }
                Some(Err(e)) => warn!("⚠️ [VISION] Confirmation check skipped for {}: {}", id, e),
                None => {}
            }
        }

        let confirmation = self.persist_image(image).await;
        let mut result = OrderResult {
            command_id: id,
            kind,
            success: rejection.is_none(),
            target: echo.target.clone(),
            price: echo.price.clone(),
            quantity: echo.quantity,
            confirmation: confirmation.clone(),
            confirmation_text,
            error: None,
            timestamp: Local::now(),
        };

        if let Some(reason) = rejection {
            let error = ExecutorError::InputError { reason };
            result.error = Some(error.kind());
            // Observers still get the rejected order with its screenshot
            self.bus.publish(ExecutorEvent::OrderCompleted(result));
            let target = Some(echo.target.clone());
            self.fail(
                id,
                kind,
                target,
                CommandStage::Extracting,
                error,
                Some(echo),
                confirmation.map(|a| a.path),
                reply,
            )
            .await;
            return;
        }

        let mut entry = CommandLogEntry::new(id, kind, Some(echo.target));
        entry.price = echo.price;
        entry.quantity = echo.quantity;
        entry.artifact = result.confirmation.as_ref().map(|a| a.path.clone());
        self.append(entry).await;

        info!("✅ [QUEUE] {} {} done", kind, id);
        self.bus.publish(ExecutorEvent::OrderCompleted(result.clone()));
        let _ = reply.send(Ok(Outcome::Order(result)));
    }

    async fn finish_query(self, id: Uuid, kind: CommandKind, use_extraction: bool, image: CapturedImage, reply: Reply) {
        let (mut extracted, mut status, mut extraction_error) = (None, ExtractionStatus::Skipped, None);

        if use_extraction {
            if let Some(prompt) = prompts::for_query(kind) {
                match self.extract(&image, prompt.prompt()).await {
                    Some(Ok(value)) => {
                        extracted = Some(value);
                        status = ExtractionStatus::Ok;
                    }
                    Some(Err(e)) => {
                        warn!("⚠️ [VISION] {} extraction degraded: {}", kind, e);
                        status = ExtractionStatus::Degraded;
                        extraction_error = Some(e.to_string());
                    }
                    None => debug!("[QUEUE] No extractor configured, skipping extraction"),
                }
            }
        }

        let taken_at = image.captured_at;
        let screenshot = self.persist_image(image).await;

        let outcome = if kind == CommandKind::QueryAssets {
            let assets = match extracted.as_ref().map(AccountAssets::from_value) {
                Some(Ok(assets)) => Some(assets),
                Some(Err(reason)) => {
                    warn!("⚠️ [VISION] Asset answer not usable: {}", reason);
                    status = ExtractionStatus::Degraded;
                    extraction_error = Some(reason);
                    None
                }
                None => None,
            };
            if let Some(raw) = extracted.clone() {
                self.persist(ArtifactCategory::Asset, move |log| {
                    log.record(ArtifactCategory::Asset, ArtifactPayload::Json(&raw))
                })
                .await;
            }
            Outcome::Assets(AssetSnapshot {
                command_id: id,
                screenshot: screenshot.clone(),
                assets,
                raw: extracted,
                status,
                extraction_error: extraction_error.clone(),
                taken_at,
            })
        } else {
            Outcome::Page(QueryResult {
                command_id: id,
                kind,
                screenshot: screenshot.clone(),
                extracted,
                status,
                extraction_error: extraction_error.clone(),
                taken_at,
            })
        };

        let mut entry = CommandLogEntry::new(id, kind, None);
        if status == ExtractionStatus::Degraded {
            entry.outcome = "degraded".to_string();
            entry.error = extraction_error;
        }
        entry.artifact = screenshot.map(|a| a.path);
        self.append(entry).await;

        let payload = match &outcome {
            Outcome::Assets(snapshot) => Some(QueryPayload::Assets(snapshot.clone())),
            Outcome::Page(page) => Some(QueryPayload::Page(page.clone())),
            _ => None,
        };
        if let Some(payload) = payload {
            self.bus.publish(ExecutorEvent::QueryCompleted(payload));
        }

        info!("✅ [QUEUE] {} {} done ({:?})", kind, id, status);
        let _ = reply.send(Ok(outcome));
    }

    /// Records a failed command and replies with the error.
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        self,
        id: Uuid,
        kind: CommandKind,
        target: Option<String>,
        stage: CommandStage,
        source: ExecutorError,
        echo: Option<OrderEcho>,
        artifact: Option<PathBuf>,
        reply: Reply,
    ) {
        let err = CommandError {
            command_id: id,
            kind,
            target,
            stage,
            at: Local::now(),
            source,
        };
        warn!("❌ [QUEUE] {}", err);

        let mut entry = CommandLogEntry::new(id, kind, err.target.clone());
        entry.outcome = "failed".to_string();
        entry.error_kind = Some(err.error_kind());
        entry.error = Some(err.source.to_string());
        entry.stage = Some(stage);
        entry.artifact = artifact;
        if let Some(echo) = echo {
            entry.price = echo.price;
            entry.quantity = echo.quantity;
        }
        self.append(entry).await;

        self.bus.publish(ExecutorEvent::CommandFailed(CommandFailure {
            command_id: id,
            kind,
            target: err.target.clone(),
            stage,
            error_kind: err.error_kind(),
            message: err.source.to_string(),
            at: err.at,
        }));
        let _ = reply.send(Err(err));
    }

    async fn persist_image(&self, image: CapturedImage) -> Option<LogArtifact> {
        self.persist(ArtifactCategory::Screenshot, move |log| {
            log.record(ArtifactCategory::Screenshot, ArtifactPayload::Image(&image))
        })
        .await
    }

    /// Runs an artifact write on the blocking pool.
    async fn persist<F>(&self, category: ArtifactCategory, write: F) -> Option<LogArtifact>
    where
        F: FnOnce(&PersistenceLog) -> io::Result<LogArtifact> + Send + 'static,
    {
        let log = self.persistence.clone();
        let result = tokio::task::spawn_blocking(move || write(&log))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)));
        match result {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                error!("💾 [PERSIST] Failed to write {:?} artifact: {}", category, e);
                None
            }
        }
    }

    async fn append(&self, entry: CommandLogEntry) {
        let log = self.persistence.clone();
        let result = tokio::task::spawn_blocking(move || log.append(&entry))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)));
        if let Err(e) = result {
            error!("💾 [PERSIST] Failed to append command log: {}", e);
        }
    }
}
