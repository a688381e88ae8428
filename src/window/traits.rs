use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub type ActuatorResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Native window identifier as reported by the windowing system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A located top-level window of the trading client.
///
/// Only valid while the window exists; callers re-check with
/// [`Actuator::window_exists`] before use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowHandle {
    pub id: WindowId,
    pub title: String,
    pub class: Option<String>,
    /// Set when this process launched the client.
    pub pid: Option<u32>,
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.id, self.title)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowMatch {
    /// Substring of the window title.
    Title(String),
    Class(String),
    Pid(u32),
}

impl fmt::Display for WindowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMatch::Title(t) => write!(f, "title~'{}'", t),
            WindowMatch::Class(c) => write!(f, "class='{}'", c),
            WindowMatch::Pid(p) => write!(f, "pid={}", p),
        }
    }
}

/// Rectangle in window coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    F1,
    F2,
    F3,
    F4,
    F6,
    F7,
    F8,
    Enter,
    Backspace,
    Escape,
}

impl Key {
    /// X keysym name.
    pub fn keysym(&self) -> &'static str {
        match self {
            Key::F1 => "F1",
            Key::F2 => "F2",
            Key::F3 => "F3",
            Key::F4 => "F4",
            Key::F6 => "F6",
            Key::F7 => "F7",
            Key::F8 => "F8",
            Key::Enter => "Return",
            Key::Backspace => "BackSpace",
            Key::Escape => "Escape",
        }
    }
}

/// OS-level capabilities needed to drive the client: process spawn, window
/// lookup and focus, synthetic input and bitmap capture.
#[async_trait]
pub trait Actuator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts the executable and returns its process id.
    async fn spawn(&self, path: &Path) -> ActuatorResult<u32>;

    /// First visible window matching `query`.
    async fn find_window(&self, query: &WindowMatch) -> ActuatorResult<Option<WindowHandle>>;

    async fn window_exists(&self, id: WindowId) -> ActuatorResult<bool>;

    async fn foreground_window(&self) -> ActuatorResult<Option<WindowId>>;

    /// Raises, restores and focuses the window.
    async fn focus(&self, id: WindowId) -> ActuatorResult<()>;

    /// Sends a key to whatever window has focus.
    async fn send_key(&self, key: Key) -> ActuatorResult<()>;

    async fn send_text(&self, text: &str, char_delay: Duration) -> ActuatorResult<()>;

    /// Encoded image bytes of the window, or of `region` inside it.
    async fn capture(&self, id: WindowId, region: Option<Rect>) -> ActuatorResult<Vec<u8>>;
}
