//! Integration tests for the executor.
//! These drive the full queue against the in-memory actuator and a temp log root.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::watch;

use desk_executor::bus::EventBus;
use desk_executor::config::{AppConfig, PacingConfig};
use desk_executor::error::{ErrorKind, VisionError};
use desk_executor::events::ExecutorEvent;
use desk_executor::services::gating::FixedClock;
use desk_executor::services::{ExecutorDeps, ExecutorFacade};
use desk_executor::types::{CommandKind, CommandStage, ExtractionStatus, PriceMode};
use desk_executor::vision::{Extraction, ImageRef, VisionExtractor};
use desk_executor::window::{ActuatorEvent, FakeActuator, Key};

/// Friday 2026-10-16.
fn friday(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap().and_hms_opt(h, m, 0).unwrap()
}

struct Harness {
    executor: ExecutorFacade,
    fake: Arc<FakeActuator>,
    clock: Arc<FixedClock>,
    dir: TempDir,
    _shutdown: watch::Sender<bool>,
}

fn harness_with(extraction: Extraction, tweak: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.log_root = dir.path().to_path_buf();
    config.pacing = PacingConfig::immediate();
    config.window.poll_interval_ms = 10;
    config.window.focus_retry_delay_ms = 1;
    config.vision.timeout_secs = 1;
    tweak(&mut config);

    let fake = Arc::new(FakeActuator::with_window("网上股票交易系统"));
    let clock = Arc::new(FixedClock::new(friday(10, 0)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let executor = ExecutorFacade::start(
        &config,
        ExecutorDeps {
            actuator: fake.clone(),
            clock: clock.clone(),
            extraction,
            bus: EventBus::new(64),
            shutdown: shutdown_rx,
        },
    );

    Harness {
        executor,
        fake,
        clock,
        dir,
        _shutdown: shutdown_tx,
    }
}

fn harness() -> Harness {
    harness_with(Extraction::Absent, |_| {})
}

fn read_logs(root: &Path) -> Vec<Value> {
    let dir = root.join("logs");
    let mut lines = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let text = std::fs::read_to_string(entry.unwrap().path()).unwrap();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            lines.push(serde_json::from_str(line).unwrap());
        }
    }
    lines
}

// ============= Fake extractors =============

struct StaticExtractor(Value);

#[async_trait]
impl VisionExtractor for StaticExtractor {
    fn name(&self) -> &str {
        "static"
    }

    async fn analyze_text(&self, _image: &ImageRef, _prompt: &str) -> Result<String, VisionError> {
        Ok(self.0.to_string())
    }

    async fn analyze_json(&self, _image: &ImageRef, _prompt: &str, _schema: Option<&Value>) -> Result<Value, VisionError> {
        Ok(self.0.clone())
    }
}

struct FailingExtractor;

#[async_trait]
impl VisionExtractor for FailingExtractor {
    fn name(&self) -> &str {
        "failing"
    }

    async fn analyze_text(&self, _image: &ImageRef, _prompt: &str) -> Result<String, VisionError> {
        Err(VisionError::Api("503 service unavailable".to_string()))
    }

    async fn analyze_json(&self, _image: &ImageRef, _prompt: &str, _schema: Option<&Value>) -> Result<Value, VisionError> {
        Err(VisionError::Api("503 service unavailable".to_string()))
    }
}

struct SlowExtractor;

#[async_trait]
impl VisionExtractor for SlowExtractor {
    fn name(&self) -> &str {
        "slow"
    }

    async fn analyze_text(&self, _image: &ImageRef, _prompt: &str) -> Result<String, VisionError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(String::new())
    }

    async fn analyze_json(&self, _image: &ImageRef, _prompt: &str, _schema: Option<&Value>) -> Result<Value, VisionError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(json!({}))
    }
}

// ============= Order Flow Tests =============

/// Concurrent orders never interleave their keystrokes
#[tokio::test]
async fn test_concurrent_orders_are_serialized() {
    let h = harness();
    h.fake.set_key_delay(Duration::from_millis(2));

    let (a, b, c) = tokio::join!(
        h.executor.buy("600519", "1700", 100, PriceMode::Limit),
        h.executor.sell("000001", "10.50", 200, PriceMode::Limit),
        h.executor.buy("510300", "3.912", 300, PriceMode::Limit),
    );
    assert!(a.unwrap().success);
    assert!(b.unwrap().success);
    assert!(c.unwrap().success);

    // F1/F2, 6 backspaces, 3 x (text + Enter), 2 confirm Enters
    let inputs = h.fake.inputs();
    assert_eq!(inputs.len(), 45);

    let mut seen = Vec::new();
    for chunk in inputs.chunks(15) {
        assert!(matches!(chunk[0], ActuatorEvent::Key(Key::F1) | ActuatorEvent::Key(Key::F2)));
        let texts: Vec<String> = chunk
            .iter()
            .filter_map(|e| match e {
                ActuatorEvent::Text(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        seen.push(texts);
    }
    seen.sort();
    assert_eq!(
        seen,
        vec![
            vec!["000001".to_string(), "10.50".to_string(), "200".to_string()],
            vec!["510300".to_string(), "3.912".to_string(), "300".to_string()],
            vec!["600519".to_string(), "1700.00".to_string(), "100".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_buy_records_screenshot_and_log() {
    let h = harness();

    let result = h.executor.buy("600519", "10.50", 150, PriceMode::Market).await.unwrap();

    assert!(result.success);
    assert_eq!(result.price.as_deref(), Some("10.61"));
    assert_eq!(result.quantity, Some(100));
    let shot = result.confirmation.expect("confirmation screenshot");
    assert!(shot.path.exists());
    assert!(shot.path.starts_with(h.dir.path().join("screenshots")));

    let logs = read_logs(h.dir.path());
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["action"], "buy");
    assert_eq!(logs[0]["outcome"], "ok");
    assert_eq!(logs[0]["price"], "10.61");
}

#[tokio::test]
async fn test_cancel_requires_order_id() {
    let h = harness();

    let err = h.executor.cancel("   ").await.unwrap_err();

    assert_eq!(err.error_kind(), ErrorKind::InvalidOrder);
    assert!(h.fake.inputs().is_empty());
}

#[tokio::test]
async fn test_capture_failure_reports_stage() {
    let h = harness();
    h.fake.set_capture_fails(true);

    let err = h.executor.buy("600519", "1700", 100, PriceMode::Limit).await.unwrap_err();

    assert_eq!(err.error_kind(), ErrorKind::Capture);
    assert_eq!(err.stage, CommandStage::Capturing);
    // Keys already went out; the caller must check before retrying
    assert!(!h.fake.inputs().is_empty());

    let logs = read_logs(h.dir.path());
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["outcome"], "failed");
    assert_eq!(logs[0]["stage"], "capturing");
    assert_eq!(logs[0]["target"], "600519");
    assert_eq!(logs[0]["price"], "1700.00");
    assert_eq!(logs[0]["quantity"], 100);
}

#[tokio::test]
async fn test_oversized_price_keeps_worker_alive() {
    let h = harness();

    let err = h
        .executor
        .buy("600519", "79228162514264337593543950335", 100, PriceMode::Market)
        .await
        .unwrap_err();
    assert_eq!(err.error_kind(), ErrorKind::InvalidOrder);
    assert!(h.fake.inputs().is_empty());

    let sell = h
        .executor
        .sell("600519", "79228162514264337593543950335", 100, PriceMode::Limit)
        .await
        .unwrap_err();
    assert_eq!(sell.error_kind(), ErrorKind::InvalidOrder);

    // The queue still serves commands afterwards
    assert!(h.executor.query_positions().await.is_ok());
    assert!(h.executor.buy("600519", "1700", 100, PriceMode::Limit).await.unwrap().success);
}

// ============= Gating Tests =============

#[tokio::test]
async fn test_orders_blocked_outside_trading_hours() {
    let h = harness();
    h.clock.set(friday(20, 0));
    let mut rx = h.executor.subscribe();

    let err = h.executor.buy("600519", "1700", 100, PriceMode::Limit).await.unwrap_err();

    assert_eq!(err.error_kind(), ErrorKind::Gating);
    assert_eq!(err.stage, CommandStage::Idle);
    assert_eq!(err.kind, CommandKind::Buy);
    assert!(h.fake.events().is_empty(), "no focus or keys while gated");

    match rx.recv().await.unwrap() {
        ExecutorEvent::CommandFailed(failure) => {
            assert_eq!(failure.error_kind, ErrorKind::Gating);
            assert_eq!(failure.command_id, err.command_id);
        }
        other => panic!("unexpected event {:?}", other),
    }

    let logs = read_logs(h.dir.path());
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["outcome"], "failed");
    assert_eq!(logs[0]["error_kind"], "gating");
    assert_eq!(logs[0]["stage"], "idle");
}

#[tokio::test]
async fn test_queries_run_outside_trading_hours() {
    let h = harness();
    h.clock.set(friday(22, 0));

    let page = h.executor.query_positions().await.unwrap();

    assert_eq!(page.kind, CommandKind::QueryPositions);
    assert_eq!(page.status, ExtractionStatus::Skipped);
    assert!(page.screenshot.is_some());
    assert_eq!(
        h.fake.inputs(),
        vec![ActuatorEvent::Key(Key::F1), ActuatorEvent::Key(Key::F6)]
    );
}

// ============= Extraction Tests =============

#[tokio::test]
async fn test_asset_extraction() {
    let answer = json!({
        "total_assets": "1,234.50",
        "available_cash": 500,
        "market_value": "734.50",
        "frozen_amount": "",
        "stocks": [
            {"code": "600519", "name": "贵州茅台", "quantity": "100", "profit_loss_rate": "+6.67%"}
        ]
    });
    let h = harness_with(Extraction::Present(Arc::new(StaticExtractor(answer))), |_| {});

    let snapshot = h.executor.query_assets(true).await.unwrap();

    assert_eq!(snapshot.status, ExtractionStatus::Ok);
    let assets = snapshot.assets.expect("parsed assets");
    assert_eq!(assets.total_assets, Some(dec!(1234.50)));
    assert_eq!(assets.frozen_amount, None);
    assert_eq!(assets.holdings.len(), 1);
    assert_eq!(assets.holdings[0].profit_loss_rate, Some(dec!(6.67)));

    let asset_files: Vec<_> = std::fs::read_dir(h.dir.path().join("assets")).unwrap().collect();
    assert_eq!(asset_files.len(), 1);
}

#[tokio::test]
async fn test_extraction_failure_degrades() {
    let h = harness_with(Extraction::Present(Arc::new(FailingExtractor)), |_| {});

    let snapshot = h.executor.query_assets(true).await.unwrap();

    assert_eq!(snapshot.status, ExtractionStatus::Degraded);
    assert!(snapshot.assets.is_none());
    assert!(snapshot.extraction_error.unwrap().contains("503"));
    assert!(snapshot.screenshot.unwrap().path.exists());

    let logs = read_logs(h.dir.path());
    assert_eq!(logs[0]["outcome"], "degraded");
}

#[tokio::test]
async fn test_extraction_timeout_degrades() {
    let h = harness_with(Extraction::Present(Arc::new(SlowExtractor)), |_| {});

    let started = std::time::Instant::now();
    let snapshot = h.executor.query_assets(true).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(snapshot.status, ExtractionStatus::Degraded);
    assert!(snapshot.screenshot.is_some());
}

#[tokio::test]
async fn test_extraction_not_requested() {
    let h = harness_with(Extraction::Present(Arc::new(FailingExtractor)), |_| {});

    let snapshot = h.executor.query_assets(false).await.unwrap();

    assert_eq!(snapshot.status, ExtractionStatus::Skipped);
    assert!(snapshot.extraction_error.is_none());
}

#[tokio::test]
async fn test_rejected_order_is_an_input_error() {
    let answer = json!({"accepted": false, "message": "资金不足"});
    let h = harness_with(Extraction::Present(Arc::new(StaticExtractor(answer))), |c| {
        c.vision.verify_orders = true;
    });

    let err = h.executor.buy("600519", "1700", 100, PriceMode::Limit).await.unwrap_err();

    assert_eq!(err.error_kind(), ErrorKind::Input);
    assert!(err.to_string().contains("资金不足"));

    let logs = read_logs(h.dir.path());
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["outcome"], "failed");
    assert_eq!(logs[0]["stage"], "extracting");
    assert_eq!(logs[0]["price"], "1700.00");
    assert_eq!(logs[0]["quantity"], 100);
    assert!(logs[0]["artifact"].is_string());
}

#[tokio::test]
async fn test_failed_cancel_logs_order_id() {
    let h = harness();
    h.fake.set_capture_fails(true);

    let err = h.executor.cancel(" 2301 ").await.unwrap_err();

    assert_eq!(err.stage, CommandStage::Capturing);
    let logs = read_logs(h.dir.path());
    assert_eq!(logs[0]["action"], "cancel");
    assert_eq!(logs[0]["target"], "2301");
    assert!(logs[0]["price"].is_null());
}

// ============= Window Lifecycle Tests =============

#[tokio::test]
async fn test_launch_missing_executable_fails_fast() {
    let h = harness();

    let result = tokio::time::timeout(
        Duration::from_secs(1),
        h.executor.launch_with(Path::new("/nonexistent/xiadan.exe"), Duration::from_secs(30)),
    )
    .await
    .expect("should not wait for the launch timeout");

    assert_eq!(result.unwrap_err().error_kind(), ErrorKind::Spawn);
}

#[tokio::test]
async fn test_launch_without_configured_path() {
    let h = harness();
    assert_eq!(h.executor.launch().await.unwrap_err().error_kind(), ErrorKind::Spawn);
}

#[tokio::test]
async fn test_launch_times_out_without_window() {
    let h = harness();
    h.fake.close_window(desk_executor::window::WindowId(1));
    let exe = tempfile::NamedTempFile::new().unwrap();

    let err = h
        .executor
        .launch_with(exe.path(), Duration::from_millis(200))
        .await
        .unwrap_err();

    assert_eq!(err.error_kind(), ErrorKind::LaunchTimeout);
}

#[tokio::test]
async fn test_launch_finds_spawned_window() {
    let h = harness();
    h.fake.close_window(desk_executor::window::WindowId(1));
    h.fake.set_spawn_window(Some(FakeActuator::window(7, "网上股票交易系统")));
    let exe = tempfile::NamedTempFile::new().unwrap();

    let handle = h.executor.launch_with(exe.path(), Duration::from_secs(2)).await.unwrap();

    assert_eq!(handle.id.0, 7);
    assert!(h.fake.events().contains(&ActuatorEvent::Focus(handle.id)));
}

#[tokio::test]
async fn test_order_fails_when_window_gone() {
    let h = harness();
    h.fake.close_window(desk_executor::window::WindowId(1));

    let err = h.executor.buy("600519", "1700", 100, PriceMode::Limit).await.unwrap_err();

    assert_eq!(err.error_kind(), ErrorKind::WindowNotFound);
    assert_eq!(err.stage, CommandStage::Focusing);
    assert!(h.fake.inputs().is_empty());
}

// ============= Retention Tests =============

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let h = harness();
    h.executor.query_positions().await.unwrap();
    h.executor.query_orders().await.unwrap();

    let later = SystemTime::now() + Duration::from_secs(30 * 24 * 3600);
    let first = h.executor.persistence().cleanup_at(later, 7);
    let second = h.executor.persistence().cleanup_at(later, 7);

    // Two screenshots and one daily log
    assert_eq!(first.removed, 3);
    assert_eq!(second.removed, 0);
    assert_eq!(second.failures, 0);
}

#[tokio::test]
async fn test_cleanup_publishes_report() {
    let h = harness();
    h.executor.query_trades().await.unwrap();
    let mut rx = h.executor.subscribe();

    let report = h.executor.cleanup().await.unwrap();

    assert_eq!(report.removed, 0);
    assert!(report.retained >= 2);
    match rx.recv().await.unwrap() {
        ExecutorEvent::CleanupFinished(published) => assert_eq!(published, report),
        other => panic!("unexpected event {:?}", other),
    }
}
