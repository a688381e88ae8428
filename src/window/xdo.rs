use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::traits::{Actuator, ActuatorResult, Key, Rect, WindowHandle, WindowId, WindowMatch};

/// Drives an X11 desktop (the client runs under Wine) with `xdotool` for
/// windows and input and ImageMagick `import` for captures.
#[derive(Clone, Debug)]
pub struct XdoActuator {
    xdotool: String,
    import: String,
    /// Launcher prepended for `.exe` paths.
    wine: String,
}

impl Default for XdoActuator {
    fn default() -> Self {
        Self {
            xdotool: "xdotool".to_string(),
            import: "import".to_string(),
            wine: "wine".to_string(),
        }
    }
}

impl XdoActuator {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, program: &str, args: &[String]) -> ActuatorResult<Output> {
        debug!("[XDO] {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", program, e))?;
        Ok(output)
    }

    async fn run_checked(&self, program: &str, args: &[String]) -> ActuatorResult<Vec<u8>> {
        let output = self.run(program, args).await?;
        if !output.status.success() {
            return Err(format!(
                "{} {} exited with {}: {}",
                program,
                args.first().map(String::as_str).unwrap_or(""),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )
            .into());
        }
        Ok(output.stdout)
    }

    async fn xdo(&self, args: &[&str]) -> ActuatorResult<Vec<u8>> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        self.run_checked(&self.xdotool, &args).await
    }

    async fn window_text(&self, command: &str, id: WindowId) -> Option<String> {
        let out = self.xdo(&[command, &id.to_string()]).await.ok()?;
        let text = String::from_utf8_lossy(&out).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
impl Actuator for XdoActuator {
    fn name(&self) -> &'static str {
        "xdotool"
    }

    async fn spawn(&self, path: &Path) -> ActuatorResult<u32> {
        let is_windows_exe = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("exe"))
            .unwrap_or(false);

        let mut cmd = if is_windows_exe {
            let mut c = Command::new(&self.wine);
            c.arg(path);
            c
        } else {
            Command::new(path)
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        child
            .id()
            .ok_or_else(|| "process exited before reporting a pid".into())
    }

    async fn find_window(&self, query: &WindowMatch) -> ActuatorResult<Option<WindowHandle>> {
        let (flag, value) = match query {
            WindowMatch::Title(t) => ("--name", escape_regex(t)),
            WindowMatch::Class(c) => ("--class", escape_regex(c)),
            WindowMatch::Pid(p) => ("--pid", p.to_string()),
        };

        // xdotool exits 1 when nothing matches
        let args = vec!["search".to_string(), "--onlyvisible".to_string(), flag.to_string(), value];
        let output = self.run(&self.xdotool, &args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        let Some(id) = stdout.lines().find_map(|l| l.trim().parse::<u64>().ok()) else {
            return Ok(None);
        };
        let id = WindowId(id);

        Ok(Some(WindowHandle {
            id,
            title: self.window_text("getwindowname", id).await.unwrap_or_default(),
            class: self.window_text("getwindowclassname", id).await,
            pid: self
                .window_text("getwindowpid", id)
                .await
                .and_then(|p| p.parse().ok()),
        }))
    }

    async fn window_exists(&self, id: WindowId) -> ActuatorResult<bool> {
        let args = vec!["getwindowname".to_string(), id.to_string()];
        Ok(self.run(&self.xdotool, &args).await?.status.success())
    }

    async fn foreground_window(&self) -> ActuatorResult<Option<WindowId>> {
        let args = vec!["getactivewindow".to_string()];
        let output = self.run(&self.xdotool, &args).await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<u64>()
            .ok()
            .map(WindowId))
    }

    async fn focus(&self, id: WindowId) -> ActuatorResult<()> {
        let id = id.to_string();
        // Map first so a minimized window is restored
        self.xdo(&["windowmap", &id]).await?;
        self.xdo(&["windowactivate", "--sync", &id]).await?;
        Ok(())
    }

    async fn send_key(&self, key: Key) -> ActuatorResult<()> {
        self.xdo(&["key", "--clearmodifiers", key.keysym()]).await?;
        Ok(())
    }

    async fn send_text(&self, text: &str, char_delay: Duration) -> ActuatorResult<()> {
        let delay = char_delay.as_millis().to_string();
        self.xdo(&["type", "--delay", &delay, "--", text]).await?;
        Ok(())
    }

    async fn capture(&self, id: WindowId, region: Option<Rect>) -> ActuatorResult<Vec<u8>> {
        let mut args = vec!["-window".to_string(), id.to_string()];
        if let Some(r) = region {
            args.push("-crop".to_string());
            args.push(format!("{}x{}+{}+{}", r.width, r.height, r.x, r.y));
            args.push("+repage".to_string());
        }
        args.push("png:-".to_string());
        self.run_checked(&self.import, &args).await
    }
}

/// xdotool search patterns are regular expressions.
fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
