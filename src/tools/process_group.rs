//! Process-group cleanup for spawned commands.
//!
//! Each command is started as the leader of its own process group, so a
//! single `killpg` reaches everything it forked. [`ProcessGroupGuard`] kills
//! the group when dropped, which is how cancellation of the owning task
//! reaches the process layer.
//!
//! On non-Unix platforms the guard is a no-op and only `kill_on_drop` on the
//! child applies.

use std::io;
use std::process::ExitStatus;
use tokio::process::Child;

/// Kills a child's process group on drop unless disarmed
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    /// Guard the group led by `child`
    ///
    /// The child must have been spawned with `process_group(0)` so that its
    /// PID is also its process group ID.
    pub fn new(child: &Child) -> Self {
        Self { pgid: child.id() }
    }

    /// Send SIGKILL to every process in the group (best-effort)
    ///
    /// A group that no longer exists is not an error.
    #[cfg(unix)]
    pub fn kill(&self) -> io::Result<()> {
        let Some(pgid) = self.pgid else {
            return Ok(());
        };

        let result = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
        if result == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }
        tracing::debug!("Sent SIGKILL to process group {}", pgid);
        Ok(())
    }

    /// No-op on non-Unix platforms.
    #[cfg(not(unix))]
    pub fn kill(&self) -> io::Result<()> {
        Ok(())
    }

    /// Wait for the leader to exit, then kill what is left of its group
    ///
    /// The exit is observed with `waitid(WNOWAIT)`, which leaves the leader a
    /// zombie. Its pid, and so the group id, stays reserved until
    /// `child.wait()` reaps it after the kill.
    #[cfg(target_os = "linux")]
    pub async fn reap_with_group(&self, child: &mut Child) -> io::Result<ExitStatus> {
        if let Some(pid) = self.pgid {
            if let Err(e) = wait_exited(pid).await {
                tracing::debug!("waitid on {} failed: {}", pid, e);
            }
        }
        self.kill_leftovers();
        child.wait().await
    }

    /// Wait for the leader to exit, then kill what is left of its group
    ///
    /// The leader is reaped before the kill here.
    #[cfg(not(target_os = "linux"))]
    pub async fn reap_with_group(&self, child: &mut Child) -> io::Result<ExitStatus> {
        let status = child.wait().await;
        self.kill_leftovers();
        status
    }

    fn kill_leftovers(&self) {
        if let Err(e) = self.kill() {
            tracing::debug!("Process group cleanup failed: {}", e);
        }
    }

    /// Stop guarding; the group will not be signalled on drop
    pub fn disarm(&mut self) {
        self.pgid = None;
    }
}

/// Block until `pid` has exited without reaping it
#[cfg(target_os = "linux")]
async fn wait_exited(pid: u32) -> io::Result<()> {
    tokio::task::spawn_blocking(move || loop {
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        let result = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if result == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    })
    .await
    .map_err(io::Error::other)?
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if self.pgid.is_some() {
            if let Err(e) = self.kill() {
                tracing::warn!("Failed to kill process group on drop: {}", e);
            }
        }
    }
}
