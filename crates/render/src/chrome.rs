use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A Chrome/Chromium executable.
#[derive(Debug, Clone)]
pub(crate) enum Chrome {
    /// A directly executable binary.
    Binary { path: PathBuf },
    /// A Flatpak-installed application.
    Flatpak { flatpak: PathBuf, app_id: String },
}
impl Chrome {
    pub(crate) fn discover() -> Result<Self> {
        let executables = ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser", "chrome"];
        for exe in executables {
            if let Ok(path) = which::which(exe) {
                tracing::debug!(chrome = %path.display(), "Discovered Chrome executable");
                return Ok(Self::Binary { path });
            }
        }
        tracing::info!("Chrome executable not found in PATH");
        if let Ok(flatpak) = which::which("flatpak") {
            tracing::trace!(flatpak = %flatpak.display(), "Discovered Flatpak on system; searching installed apps");
            for app_id in ["com.google.Chrome", "org.chromium.Chromium"] {
                if Command::new(&flatpak).args(["info", app_id]).output().is_ok_and(|o| o.status.success()) {
                    return Ok(Self::Flatpak { flatpak, app_id: app_id.to_string() });
                }
            }
        } else {
            tracing::info!("Flatpak not found; skipping containerized Chrome checks.");
        }
        exn::bail!(ErrorKind::ChromeNotFound);
    }

    fn command(&self, workdir: &Path) -> Command {
        match self {
            Self::Binary { path } => Command::new(path),
            Self::Flatpak { flatpak, app_id } => {
                let mut command = Command::new(flatpak);
                command.arg("run").arg(format!("--filesystem={}", workdir.display())).arg(app_id);
                command
            },
        }
    }

    /// Prints `input` (an HTML file) to `output` as a PDF. Both paths must
    /// live inside `workdir`.
    pub(crate) fn print_to_pdf(
        &self,
        workdir: &Path,
        input: &Path,
        output: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut command = self.command(workdir);
        command
            .args([
                "--headless",
                "--disable-gpu",
                "--no-sandbox",
                "--no-pdf-header-footer",
                "--run-all-compositor-stages-before-draw",
            ])
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(format!("file://{}", input.display()))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = command.spawn().or_raise(|| ErrorKind::Io)?;
        let Some(status) = wait_with_timeout(&mut child, timeout, cancel)? else {
            exn::bail!(ErrorKind::ChromeTimeout);
        };
        if !status.success() {
            exn::bail!(ErrorKind::ChromeFailed(status.code().unwrap_or(-1)));
        }
        if std::fs::metadata(output).map(|m| m.len()).unwrap_or_default() == 0 {
            exn::bail!(ErrorKind::EmptyOutput);
        }
        Ok(())
    }
}

/// Waits for `child`, killing it once `timeout` has passed or `cancel` has
/// fired. Returns `None` when the process timed out.
pub(crate) fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().or_raise(|| ErrorKind::Io)? {
            return Ok(Some(status));
        }
        if cancel.is_cancelled() {
            tracing::info!(pid = child.id(), "Killing process for an abandoned request");
            kill(child);
            exn::bail!(ErrorKind::Cancelled);
        }
        if started.elapsed() >= timeout {
            tracing::warn!(pid = child.id(), timeout_ms = timeout.as_millis() as u64, "Killing process after timeout");
            kill(child);
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// The process may exit between the last check and the kill.
fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sleeper() -> Child {
        Command::new("sleep").arg("30").spawn().unwrap()
    }

    #[test]
    fn cancelled_child_is_killed() {
        let mut child = sleeper();
        let cancel = CancellationToken::new();
        let remote = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });
        let started = Instant::now();
        let err = wait_with_timeout(&mut child, Duration::from_secs(30), &cancel).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        // Reaped, not left running.
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn timed_out_child_is_killed() {
        let mut child = sleeper();
        let status = wait_with_timeout(&mut child, Duration::from_millis(100), &CancellationToken::new()).unwrap();
        assert!(status.is_none());
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn finished_child_reports_its_status() {
        let mut child = Command::new("true").spawn().unwrap();
        let status = wait_with_timeout(&mut child, Duration::from_secs(5), &CancellationToken::new()).unwrap();
        assert!(status.unwrap().success());
    }
}
