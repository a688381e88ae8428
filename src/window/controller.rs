use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::WindowConfig;
use crate::error::ExecutorError;

use super::traits::{Actuator, WindowHandle, WindowMatch};

/// Locates, launches and focuses the trading client window.
#[derive(Clone)]
pub struct WindowController {
    actuator: Arc<dyn Actuator>,
    config: WindowConfig,
    shutdown: watch::Receiver<bool>,
}

impl WindowController {
    pub fn new(actuator: Arc<dyn Actuator>, config: WindowConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            actuator,
            config,
            shutdown,
        }
    }

    pub fn actuator(&self) -> &Arc<dyn Actuator> {
        &self.actuator
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    fn patterns(&self) -> Vec<WindowMatch> {
        let mut patterns: Vec<WindowMatch> = self
            .config
            .title_patterns
            .iter()
            .map(|t| WindowMatch::Title(t.clone()))
            .collect();
        if let Some(class) = &self.config.class_pattern {
            patterns.push(WindowMatch::Class(class.clone()));
        }
        patterns
    }

    fn describe_patterns(&self) -> String {
        self.patterns()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    async fn search(&self, patterns: &[WindowMatch]) -> Result<Option<WindowHandle>, ExecutorError> {
        for pattern in patterns {
            let found = self
                .actuator
                .find_window(pattern)
                .await
                .map_err(|e| ExecutorError::Actuator(format!("window search {}: {}", pattern, e)))?;
            if let Some(handle) = found {
                debug!("[WINDOW] {} matched {}", pattern, handle);
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Spawns the client and waits for its main window.
    ///
    /// Polls every `poll_interval_ms` until `timeout`; a shutdown signal aborts the
    /// wait with `Cancelled`.
    pub async fn launch(&self, path: &Path, timeout: Duration) -> Result<WindowHandle, ExecutorError> {
        let path_str = path.display().to_string();
        if !path.is_file() {
            return Err(ExecutorError::Spawn {
                path: path_str,
                reason: "executable not found".to_string(),
            });
        }

        info!("🚀 [WINDOW] Launching {} (timeout {:?})", path_str, timeout);
        let pid = self.actuator.spawn(path).await.map_err(|e| ExecutorError::Spawn {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let mut patterns = vec![WindowMatch::Pid(pid)];
        patterns.extend(self.patterns());

        let poll = Duration::from_millis(self.config.poll_interval_ms.max(10));
        let mut shutdown = self.shutdown.clone();

        let wait = async {
            loop {
                match self.search(&patterns).await {
                    Ok(Some(mut handle)) => {
                        handle.pid.get_or_insert(pid);
                        return Ok(handle);
                    }
                    Ok(None) => {}
                    Err(e) => return Err(e),
                }
                tokio::select! {
                    _ = tokio::time::sleep(poll) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return Err(ExecutorError::Cancelled);
                        }
                    }
                }
            }
        };

        let handle = match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("⏱️ [WINDOW] No window {}s after launching {}", timeout.as_secs(), path_str);
                return Err(ExecutorError::LaunchTimeout {
                    path: path_str,
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        self.focus(&handle).await?;
        info!("✅ [WINDOW] Client window up: {} (pid {})", handle, pid);
        Ok(handle)
    }

    /// Finds an already running client and brings it to the foreground.
    pub async fn activate(&self) -> Result<WindowHandle, ExecutorError> {
        let patterns = self.patterns();
        match self.search(&patterns).await? {
            Some(handle) => {
                self.focus(&handle).await?;
                info!("🪟 [WINDOW] Activated {}", handle);
                Ok(handle)
            }
            None => Err(ExecutorError::WindowNotFound {
                pattern: self.describe_patterns(),
            }),
        }
    }

    /// No-op when the window already has focus; otherwise re-focuses up to
    /// `focus_retries` times.
    pub async fn ensure_focus(&self, handle: &WindowHandle) -> Result<(), ExecutorError> {
        if self.is_foreground(handle).await? {
            return Ok(());
        }

        let retries = self.config.focus_retries.max(1);
        let delay = Duration::from_millis(self.config.focus_retry_delay_ms);

        for attempt in 1..=retries {
            if !self.is_valid(handle).await {
                return Err(ExecutorError::WindowNotFound {
                    pattern: handle.to_string(),
                });
            }
            debug!("[WINDOW] Focus attempt {}/{} on {}", attempt, retries, handle);
            if let Err(e) = self.actuator.focus(handle.id).await {
                warn!("⚠️ [WINDOW] Focus attempt {} failed: {}", attempt, e);
            }
            tokio::time::sleep(delay).await;
            if self.is_foreground(handle).await? {
                return Ok(());
            }
        }

        Err(ExecutorError::FocusError {
            window: handle.to_string(),
            attempts: retries,
        })
    }

    pub async fn is_valid(&self, handle: &WindowHandle) -> bool {
        match self.actuator.window_exists(handle.id).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("⚠️ [WINDOW] Could not check {}: {}", handle, e);
                false
            }
        }
    }

    /// Returns a usable handle: the current one if still valid, else a
    /// re-activated window, else (when configured) a freshly launched client.
    pub async fn acquire(&self, current: Option<&WindowHandle>) -> Result<WindowHandle, ExecutorError> {
        if let Some(handle) = current {
            if self.is_valid(handle).await {
                return Ok(handle.clone());
            }
            warn!("⚠️ [WINDOW] Handle {} is gone, re-activating", handle);
        }

        match self.activate().await {
            Ok(handle) => Ok(handle),
            Err(ExecutorError::WindowNotFound { pattern }) => match (&self.config.exe_path, self.config.auto_relaunch) {
                (Some(path), true) => {
                    info!("🔁 [WINDOW] No client window, relaunching");
                    self.launch(path, Duration::from_secs(self.config.launch_timeout_secs))
                        .await
                }
                _ => Err(ExecutorError::WindowNotFound { pattern }),
            },
            Err(e) => Err(e),
        }
    }

    async fn is_foreground(&self, handle: &WindowHandle) -> Result<bool, ExecutorError> {
        let fg = self
            .actuator
            .foreground_window()
            .await
            .map_err(|e| ExecutorError::Actuator(format!("foreground query: {}", e)))?;
        Ok(fg == Some(handle.id))
    }

    async fn focus(&self, handle: &WindowHandle) -> Result<(), ExecutorError> {
        self.actuator
            .focus(handle.id)
            .await
            .map_err(|e| ExecutorError::Actuator(format!("focus {}: {}", handle, e)))
    }
}
