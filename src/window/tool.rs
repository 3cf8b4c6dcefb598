//! Window adapter backed by the external automation tool.
//!
//! Each primitive is one invocation of `<automation exe> <script> <verb> [args...]`.
//! The script prints tab-separated records on stdout and exits non-zero when the
//! window or control is gone.

use super::{ControlInfo, ControlKind, WindowAdapter, WindowInfo, WindowRef, WindowSnapshot};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Ceiling for a single tool invocation unless overridden.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

const EXIT_POLL: Duration = Duration::from_millis(10);

pub struct ToolAdapter {
    exe: PathBuf,
    script: PathBuf,
    env: Vec<(String, String)>,
    call_timeout: Duration,
}

impl ToolAdapter {
    pub fn new(exe: PathBuf, script: PathBuf) -> Self {
        Self {
            exe,
            script,
            env: Vec::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Pass an opaque value through to the automation script's environment.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Bound every invocation; a hung tool is killed and read as absence.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    fn call(&self, args: &[&str]) -> Option<String> {
        self.call_within(args, self.call_timeout)
    }

    fn call_within(&self, args: &[&str], limit: Duration) -> Option<String> {
        let verb = args.first().copied();
        let mut child = match Command::new(&self.exe)
            .arg(&self.script)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(?verb, error = %e, "automation tool failed to run");
                return None;
            }
        };

        // Drain stdout off-thread so a chatty tool cannot block on a full pipe.
        let reader = child.stdout.take().map(|mut stdout| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stdout.read_to_string(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + limit;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::debug!(?verb, timeout = ?limit, "automation call timed out");
                    return None;
                }
                Ok(None) => std::thread::sleep(EXIT_POLL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::debug!(?verb, error = %e, "automation call lost");
                    return None;
                }
            }
        };

        let out = reader.and_then(|r| r.join().ok()).unwrap_or_default();
        if status.success() {
            Some(out.trim_end().to_string())
        } else {
            tracing::trace!(?verb, ?status, "automation call reported absence");
            None
        }
    }
}

fn handle_arg(window: WindowRef) -> String {
    format!("{:#x}", window.0)
}

pub(crate) fn parse_handle(s: &str) -> Option<WindowRef> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u64::from_str_radix(hex, 16).ok().map(WindowRef)
}

/// `<handle>\t<class>\t<title>`
pub(crate) fn parse_window_line(line: &str) -> Option<WindowInfo> {
    let mut parts = line.splitn(3, '\t');
    let handle = parse_handle(parts.next()?)?;
    let class = parts.next()?.to_string();
    let title = parts.next().unwrap_or("").to_string();
    Some(WindowInfo {
        handle,
        class,
        title,
    })
}

/// First line is the title, then one `<id>\t<kind>\t<caption>` per control.
pub(crate) fn parse_snapshot(out: &str) -> Option<WindowSnapshot> {
    let mut lines = out.lines();
    let title = lines.next()?.to_string();
    let controls = lines
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let id = parts.next()?.trim();
            if id.is_empty() {
                return None;
            }
            let kind = match parts.next()?.trim().to_ascii_lowercase().as_str() {
                "edit" | "text" => ControlKind::TextEntry,
                "button" => ControlKind::Button,
                _ => ControlKind::Other,
            };
            Some(ControlInfo {
                id: id.to_string(),
                kind,
                caption: parts.next().unwrap_or("").to_string(),
            })
        })
        .collect();
    Some(WindowSnapshot { title, controls })
}

impl WindowAdapter for ToolAdapter {
    fn find_windows(&self, class_filter: Option<&str>) -> Vec<WindowInfo> {
        let out = match class_filter {
            Some(class) => self.call(&["list", class]),
            None => self.call(&["list"]),
        };
        out.map(|o| o.lines().filter_map(parse_window_line).collect())
            .unwrap_or_default()
    }

    fn foreground(&self) -> Option<WindowRef> {
        self.call(&["foreground"]).and_then(|o| parse_handle(&o))
    }

    fn exists(&self, window: WindowRef) -> bool {
        self.call(&["exists", &handle_arg(window)])
            .map(|o| o.trim() == "1")
            .unwrap_or(false)
    }

    fn snapshot(&self, window: WindowRef) -> Option<WindowSnapshot> {
        self.call(&["snapshot", &handle_arg(window)])
            .and_then(|o| parse_snapshot(&o))
    }

    fn get_control_text(&self, window: WindowRef, control: &str) -> Option<String> {
        self.call(&["get-text", &handle_arg(window), control])
    }

    fn set_control_text(&self, window: WindowRef, control: &str, text: &str) -> bool {
        self.call(&["set-text", &handle_arg(window), control, text])
            .is_some()
    }

    fn invoke(&self, window: WindowRef, control: &str) -> bool {
        self.call(&["invoke", &handle_arg(window), control]).is_some()
    }

    fn send_keys(&self, window: WindowRef, keys: &str) {
        let _ = self.call(&["send-keys", &handle_arg(window), keys]);
    }

    fn activate(&self, window: WindowRef) {
        let _ = self.call(&["activate", &handle_arg(window)]);
    }

    fn wait_active(&self, window: WindowRef, timeout: Duration) -> bool {
        let ms = timeout.as_millis().to_string();
        self.call_within(
            &["wait-active", &handle_arg(window), &ms],
            timeout + self.call_timeout,
        )
            .map(|o| o.trim() == "1")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_window_listing() {
        let info = parse_window_line("0x2A04F0\t#32770\tSave As").unwrap();
        assert_eq!(info.handle, WindowRef(0x2A04F0));
        assert_eq!(info.class, "#32770");
        assert_eq!(info.title, "Save As");

        // Tabs inside titles survive.
        let info = parse_window_line("0x10\tMain\tNesstar Explorer\t- study").unwrap();
        assert_eq!(info.title, "Nesstar Explorer\t- study");

        assert!(parse_window_line("garbage").is_none());
        assert!(parse_window_line("12\tMain\tno hex prefix").is_none());
    }

    #[test]
    fn parses_snapshot_controls() {
        let out = "Export Datasets\nEdit1\tedit\t\nButton1\tbutton\t&OK\nButton2\tButton\tCancel\nStatic1\tstatic\tFormat:";
        let snap = parse_snapshot(out).unwrap();
        assert_eq!(snap.title, "Export Datasets");
        assert_eq!(snap.controls.len(), 4);
        assert_eq!(snap.controls[0].kind, ControlKind::TextEntry);
        assert_eq!(snap.controls[1].caption, "&OK");
        assert_eq!(snap.controls[2].kind, ControlKind::Button);
        assert_eq!(snap.controls[3].kind, ControlKind::Other);
    }

    #[test]
    fn handle_round_trips_through_argument_form() {
        let w = WindowRef(0xBEEF);
        assert_eq!(parse_handle(&handle_arg(w)), Some(w));
    }

    #[test]
    fn missing_tool_reports_absence() {
        let adapter = ToolAdapter::new(
            PathBuf::from("/nonexistent/automation-tool"),
            PathBuf::from("/nonexistent/export.au3"),
        );
        assert!(adapter.find_windows(None).is_empty());
        assert!(!adapter.exists(WindowRef(1)));
        assert!(adapter.snapshot(WindowRef(1)).is_none());
        assert!(!adapter.invoke(WindowRef(1), "Button1"));
    }

    #[cfg(unix)]
    fn shell_tool(dir: &std::path::Path, body: &str) -> ToolAdapter {
        let script = dir.join("tool.sh");
        std::fs::write(&script, body).unwrap();
        ToolAdapter::new(PathBuf::from("sh"), script)
    }

    #[cfg(unix)]
    #[test]
    fn hung_tool_is_cut_off_at_the_call_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = shell_tool(dir.path(), "exec sleep 5\n")
            .with_call_timeout(Duration::from_millis(200));

        let started = Instant::now();
        assert!(adapter.foreground().is_none());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn tool_output_is_read_within_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = shell_tool(dir.path(), "printf '0x10\\n'\n")
            .with_call_timeout(Duration::from_secs(5));
        assert_eq!(adapter.foreground(), Some(WindowRef(0x10)));

        let failing = shell_tool(dir.path(), "exit 1\n");
        assert!(failing.foreground().is_none());
    }
}
