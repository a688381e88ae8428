//! Unit tests for window lookup, launch and focus handling.

#[cfg(test)]
mod controller_tests {
    use crate::config::WindowConfig;
    use crate::error::ExecutorError;
    use crate::window::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::sync::watch;

    fn config() -> WindowConfig {
        WindowConfig {
            poll_interval_ms: 10,
            focus_retry_delay_ms: 1,
            ..Default::default()
        }
    }

    fn controller(fake: Arc<FakeActuator>, config: WindowConfig) -> (WindowController, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (WindowController::new(fake, config, rx), tx)
    }

    fn fake_exe() -> tempfile::NamedTempFile {
        tempfile::NamedTempFile::new().unwrap()
    }

    // ============= Activate Tests =============

    #[tokio::test]
    async fn test_activate_finds_title_and_focuses() {
        let fake = Arc::new(FakeActuator::with_window("网上股票交易系统5.0"));
        let (ctl, _tx) = controller(fake.clone(), config());

        let handle = ctl.activate().await.unwrap();

        assert_eq!(handle.id, WindowId(1));
        assert_eq!(fake.events(), vec![ActuatorEvent::Focus(WindowId(1))]);
    }

    #[tokio::test]
    async fn test_activate_falls_back_to_class_pattern() {
        let fake = Arc::new(FakeActuator::new());
        let mut window = FakeActuator::window(7, "Untitled");
        window.class = Some("TdxW_MainFrame_Class".to_string());
        fake.add_window(window);

        let mut cfg = config();
        cfg.class_pattern = Some("TdxW_MainFrame_Class".to_string());
        let (ctl, _tx) = controller(fake, cfg);

        assert_eq!(ctl.activate().await.unwrap().id, WindowId(7));
    }

    #[tokio::test]
    async fn test_activate_without_window_is_not_found() {
        let fake = Arc::new(FakeActuator::with_window("记事本"));
        let (ctl, _tx) = controller(fake, config());

        let err = ctl.activate().await.unwrap_err();
        assert!(matches!(err, ExecutorError::WindowNotFound { .. }));
    }

    // ============= Focus Tests =============

    #[tokio::test]
    async fn test_ensure_focus_is_noop_when_foreground() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        fake.set_foreground(Some(WindowId(1)));
        let (ctl, _tx) = controller(fake.clone(), config());
        let handle = FakeActuator::window(1, "下单");

        ctl.ensure_focus(&handle).await.unwrap();
        ctl.ensure_focus(&handle).await.unwrap();

        assert!(fake.events().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_focus_refocuses() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let (ctl, _tx) = controller(fake.clone(), config());

        ctl.ensure_focus(&FakeActuator::window(1, "下单")).await.unwrap();

        assert_eq!(fake.events(), vec![ActuatorEvent::Focus(WindowId(1))]);
    }

    #[tokio::test]
    async fn test_ensure_focus_gives_up_after_retries() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        fake.set_focus_sticks(false);
        let (ctl, _tx) = controller(fake.clone(), config());

        let err = ctl.ensure_focus(&FakeActuator::window(1, "下单")).await.unwrap_err();

        assert!(matches!(err, ExecutorError::FocusError { attempts: 3, .. }));
        assert_eq!(fake.events().len(), 3);
    }

    #[tokio::test]
    async fn test_ensure_focus_on_closed_window() {
        let fake = Arc::new(FakeActuator::new());
        let (ctl, _tx) = controller(fake, config());

        let err = ctl.ensure_focus(&FakeActuator::window(9, "下单")).await.unwrap_err();
        assert!(matches!(err, ExecutorError::WindowNotFound { .. }));
    }

    // ============= Launch Tests =============

    #[tokio::test]
    async fn test_launch_missing_path_fails_fast() {
        let fake = Arc::new(FakeActuator::new());
        let (ctl, _tx) = controller(fake.clone(), config());

        let started = Instant::now();
        let err = ctl
            .launch(&PathBuf::from("/nonexistent/xiadan.exe"), Duration::from_secs(30))
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutorError::Spawn { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(fake.events().is_empty());
    }

    #[tokio::test]
    async fn test_launch_waits_for_spawned_window() {
        let fake = Arc::new(FakeActuator::new());
        fake.set_spawn_window(Some(FakeActuator::window(3, "网上股票交易系统5.0")));
        let (ctl, _tx) = controller(fake.clone(), config());
        let exe = fake_exe();

        let handle = ctl.launch(exe.path(), Duration::from_secs(2)).await.unwrap();

        assert_eq!(handle.id, WindowId(3));
        assert_eq!(handle.pid, Some(fake::FAKE_PID));
        assert!(matches!(fake.events()[0], ActuatorEvent::Spawn(_)));
    }

    #[tokio::test]
    async fn test_launch_times_out_without_window() {
        let fake = Arc::new(FakeActuator::new());
        let (ctl, _tx) = controller(fake, config());
        let exe = fake_exe();

        let started = Instant::now();
        let err = ctl.launch(exe.path(), Duration::from_millis(150)).await.unwrap_err();

        assert!(matches!(err, ExecutorError::LaunchTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_launch_observes_shutdown() {
        let fake = Arc::new(FakeActuator::new());
        let (ctl, tx) = controller(fake, config());
        let exe = fake_exe();

        let task = tokio::spawn(async move { ctl.launch(exe.path(), Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
    }

    // ============= Acquire Tests =============

    #[tokio::test]
    async fn test_acquire_reuses_valid_handle() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        let (ctl, _tx) = controller(fake.clone(), config());
        let handle = FakeActuator::window(1, "下单");

        assert_eq!(ctl.acquire(Some(&handle)).await.unwrap(), handle);
        assert!(fake.events().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_relaunches_closed_client() {
        let fake = Arc::new(FakeActuator::with_window("下单"));
        fake.close_window(WindowId(1));
        fake.set_spawn_window(Some(FakeActuator::window(2, "下单")));
        let exe = fake_exe();

        let mut cfg = config();
        cfg.exe_path = Some(exe.path().to_path_buf());
        let (ctl, _tx) = controller(fake, cfg);

        let handle = ctl.acquire(Some(&FakeActuator::window(1, "下单"))).await.unwrap();
        assert_eq!(handle.id, WindowId(2));
    }

    #[tokio::test]
    async fn test_acquire_without_exe_path_reports_not_found() {
        let fake = Arc::new(FakeActuator::new());
        let (ctl, _tx) = controller(fake.clone(), config());

        let err = ctl.acquire(None).await.unwrap_err();
        assert!(matches!(err, ExecutorError::WindowNotFound { .. }));
        assert!(fake.events().is_empty());
    }
}
