//! In-memory actuator that records every input and replays a canned screenshot.
//! Backs the `--dry-run` mode of the binary and the test suites.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{Actuator, ActuatorResult, Key, Rect, WindowHandle, WindowId, WindowMatch};

/// Smallest byte string the capture layer accepts as a PNG.
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRfake";

pub const FAKE_PID: u32 = 4242;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActuatorEvent {
    Spawn(PathBuf),
    Focus(WindowId),
    Key(Key),
    Text(String),
    Capture(WindowId, Option<Rect>),
}

struct FakeState {
    windows: Vec<WindowHandle>,
    foreground: Option<WindowId>,
    events: Vec<ActuatorEvent>,
    screenshot: Vec<u8>,
    spawn_window: Option<WindowHandle>,
    focus_sticks: bool,
    capture_fails: bool,
    key_delay: Duration,
}

pub struct FakeActuator {
    state: Mutex<FakeState>,
}

impl Default for FakeActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeActuator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                windows: Vec::new(),
                foreground: None,
                events: Vec::new(),
                screenshot: FAKE_PNG.to_vec(),
                spawn_window: None,
                focus_sticks: true,
                capture_fails: false,
                key_delay: Duration::ZERO,
            }),
        }
    }

    /// A fake with one visible client window titled `title`.
    pub fn with_window(title: &str) -> Self {
        let fake = Self::new();
        fake.add_window(Self::window(1, title));
        fake
    }

    pub fn window(id: u64, title: &str) -> WindowHandle {
        WindowHandle {
            id: WindowId(id),
            title: title.to_string(),
            class: Some("Afx:400000:0".to_string()),
            pid: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_window(&self, handle: WindowHandle) {
        self.state().windows.push(handle);
    }

    pub fn close_window(&self, id: WindowId) {
        let mut state = self.state();
        state.windows.retain(|w| w.id != id);
        if state.foreground == Some(id) {
            state.foreground = None;
        }
    }

    pub fn set_foreground(&self, id: Option<WindowId>) {
        self.state().foreground = id;
    }

    /// Window that becomes visible when something is spawned. `None` simulates
    /// a client that never shows its window.
    pub fn set_spawn_window(&self, handle: Option<WindowHandle>) {
        self.state().spawn_window = handle;
    }

    /// When false, focus requests are recorded but never take effect.
    pub fn set_focus_sticks(&self, sticks: bool) {
        self.state().focus_sticks = sticks;
    }

    pub fn set_screenshot(&self, bytes: Vec<u8>) {
        self.state().screenshot = bytes;
    }

    pub fn set_capture_fails(&self, fails: bool) {
        self.state().capture_fails = fails;
    }

    /// Delay per key press, to widen interleaving windows in concurrency tests.
    pub fn set_key_delay(&self, delay: Duration) {
        self.state().key_delay = delay;
    }

    pub fn events(&self) -> Vec<ActuatorEvent> {
        self.state().events.clone()
    }

    /// Only the key and text events, in order.
    pub fn inputs(&self) -> Vec<ActuatorEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, ActuatorEvent::Key(_) | ActuatorEvent::Text(_)))
            .collect()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    fn record(&self, event: ActuatorEvent) {
        self.state().events.push(event);
    }
}

#[async_trait]
impl Actuator for FakeActuator {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn spawn(&self, path: &Path) -> ActuatorResult<u32> {
        let mut state = self.state();
        state.events.push(ActuatorEvent::Spawn(path.to_path_buf()));
        if let Some(mut window) = state.spawn_window.take() {
            window.pid = Some(FAKE_PID);
            state.windows.push(window);
        }
        Ok(FAKE_PID)
    }

    async fn find_window(&self, query: &WindowMatch) -> ActuatorResult<Option<WindowHandle>> {
        let state = self.state();
        Ok(state
            .windows
            .iter()
            .find(|w| match query {
                WindowMatch::Title(t) => w.title.contains(t.as_str()),
                WindowMatch::Class(c) => w.class.as_deref() == Some(c.as_str()),
                WindowMatch::Pid(p) => w.pid == Some(*p),
            })
            .cloned())
    }

    async fn window_exists(&self, id: WindowId) -> ActuatorResult<bool> {
        Ok(self.state().windows.iter().any(|w| w.id == id))
    }

    async fn foreground_window(&self) -> ActuatorResult<Option<WindowId>> {
        Ok(self.state().foreground)
    }

    async fn focus(&self, id: WindowId) -> ActuatorResult<()> {
        let mut state = self.state();
        state.events.push(ActuatorEvent::Focus(id));
        if !state.windows.iter().any(|w| w.id == id) {
            return Err(format!("no window {}", id).into());
        }
        if state.focus_sticks {
            state.foreground = Some(id);
        }
        Ok(())
    }

    async fn send_key(&self, key: Key) -> ActuatorResult<()> {
        let delay = {
            let mut state = self.state();
            state.events.push(ActuatorEvent::Key(key));
            state.key_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn send_text(&self, text: &str, _char_delay: Duration) -> ActuatorResult<()> {
        self.record(ActuatorEvent::Text(text.to_string()));
        Ok(())
    }

    async fn capture(&self, id: WindowId, region: Option<Rect>) -> ActuatorResult<Vec<u8>> {
        let mut state = self.state();
        state.events.push(ActuatorEvent::Capture(id, region));
        if state.capture_fails {
            return Err("capture backend unavailable".into());
        }
        Ok(state.screenshot.clone())
    }
}
