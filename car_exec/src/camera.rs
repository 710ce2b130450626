//! # Camera helper
//!
//! The video stream is served by an external helper process. The car only starts and stops it.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval at which a terminating helper is checked for exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Lifecycle of the streaming helper process.
#[derive(Debug)]
pub struct Camera {
    command: Vec<String>,
    child: Option<Child>,

    /// Time the helper is given to exit after SIGTERM before it is killed
    stop_timeout: Duration,

    /// Exit status of the last helper stopped by [`Camera::stop`]
    last_exit: Option<ExitStatus>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum CameraError {
    #[error("No camera helper command is configured")]
    NoCommand,

    #[error("Could not start the camera helper: {0}")]
    SpawnFailed(std::io::Error),

    #[error("Could not stop the camera helper: {0}")]
    StopFailed(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Camera {
    /// `command` is the helper program followed by its arguments.
    pub fn new(command: Vec<String>, stop_timeout: Duration) -> Self {
        Self {
            command,
            child: None,
            stop_timeout,
            last_exit: None,
        }
    }

    /// Start the helper. Does nothing if it is already running.
    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.is_running() {
            debug!("Camera helper already running");
            return Ok(());
        }

        let (program, args) = match self.command.split_first() {
            Some(c) => c,
            None => return Err(CameraError::NoCommand),
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(CameraError::SpawnFailed)?;

        info!("Camera helper started (pid {})", child.id());
        self.child = Some(child);

        Ok(())
    }

    /// Stop the helper. Does nothing if it is not running.
    ///
    /// The helper is sent SIGTERM and given `stop_timeout` to exit, then killed.
    pub fn stop(&mut self) -> Result<(), CameraError> {
        // Reaps the helper if it has already exited
        if !self.is_running() {
            debug!("Camera helper not running");
            return Ok(());
        }

        if let Some(mut child) = self.child.take() {
            let pid = child.id();

            match terminate(&mut child, self.stop_timeout) {
                Ok(status) => {
                    info!("Camera helper stopped (pid {}, {})", pid, status);
                    self.last_exit = Some(status);
                }
                Err(e) => {
                    self.child = Some(child);
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Exit status of the last helper stopped with [`Camera::stop`].
    pub fn last_exit_status(&self) -> Option<ExitStatus> {
        self.last_exit
    }

    /// True if the helper is running. An exited helper is reaped here.
    pub fn is_running(&mut self) -> bool {
        let exited = match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    warn!("Camera helper exited on its own ({})", status);
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    warn!("Could not query the camera helper: {}", e);
                    false
                }
            },
            None => return false,
        };

        if exited {
            self.child = None;
        }

        !exited
    }

    /// Process id of the running helper.
    pub fn pid(&mut self) -> Option<u32> {
        if self.is_running() {
            self.child.as_ref().map(Child::id)
        } else {
            None
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("{}", e);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// SIGTERM the child and wait for it, killing it if it outlives `timeout`.
fn terminate(child: &mut Child, timeout: Duration) -> Result<ExitStatus, CameraError> {
    let pid = Pid::from_raw(child.id() as i32);

    match signal::kill(pid, Signal::SIGTERM) {
        // Already exited, only needs reaping
        Ok(()) | Err(Errno::ESRCH) => (),
        Err(e) => return Err(CameraError::StopFailed(e.into())),
    }

    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait().map_err(CameraError::StopFailed)? {
            return Ok(status);
        }

        if Instant::now() >= deadline {
            break;
        }

        thread::sleep(EXIT_POLL_INTERVAL);
    }

    warn!(
        "Camera helper (pid {}) ignored SIGTERM for {:?}, killing it",
        pid, timeout
    );

    if let Err(e) = child.kill() {
        // Exited between the last poll and the kill
        if let Some(status) = child.try_wait().map_err(CameraError::StopFailed)? {
            return Ok(status);
        }
        return Err(CameraError::StopFailed(e));
    }

    child.wait().map_err(CameraError::StopFailed)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const STOP_TIMEOUT: Duration = Duration::from_secs(2);

    fn cmd(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_start_stop_idempotent() {
        let mut camera = Camera::new(cmd(&["sleep", "30"]), STOP_TIMEOUT);

        // Stop while stopped
        camera.stop().unwrap();

        camera.start().unwrap();
        let pid = camera.pid();
        assert!(pid.is_some());

        // Start while started keeps the same process
        camera.start().unwrap();
        assert_eq!(camera.pid(), pid);

        camera.stop().unwrap();
        assert!(!camera.is_running());
        camera.stop().unwrap();
    }

    #[test]
    fn test_exited_helper_is_reaped() {
        let mut camera = Camera::new(cmd(&["true"]), STOP_TIMEOUT);

        camera.start().unwrap();
        thread::sleep(Duration::from_millis(200));

        assert!(!camera.is_running());
        camera.stop().unwrap();

        // A new helper can be started afterwards
        camera.start().unwrap();
    }

    #[test]
    fn test_bad_commands() {
        assert!(matches!(
            Camera::new(vec![], STOP_TIMEOUT).start(),
            Err(CameraError::NoCommand)
        ));
        assert!(matches!(
            Camera::new(cmd(&["/no/such/camera/helper"]), STOP_TIMEOUT).start(),
            Err(CameraError::SpawnFailed(_))
        ));
    }

    #[test]
    fn test_stop_lets_helper_exit_cleanly() {
        // Exits with status 0 on SIGTERM, a killed helper has no exit code
        let mut camera = Camera::new(
            cmd(&["sh", "-c", "trap 'exit 0' TERM; sleep 5 & wait"]),
            STOP_TIMEOUT,
        );

        camera.start().unwrap();

        // Give the shell time to install its trap
        thread::sleep(Duration::from_millis(200));

        let start = Instant::now();
        camera.stop().unwrap();

        assert!(start.elapsed() < STOP_TIMEOUT);
        let status = camera.last_exit_status().unwrap();
        assert!(status.success(), "helper exited with {}", status);
    }

    #[test]
    fn test_stop_kills_helper_ignoring_sigterm() {
        let mut camera = Camera::new(
            cmd(&["sh", "-c", "trap '' TERM; sleep 5"]),
            Duration::from_millis(100),
        );

        camera.start().unwrap();
        thread::sleep(Duration::from_millis(200));

        let start = Instant::now();
        camera.stop().unwrap();

        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!camera.last_exit_status().unwrap().success());
        assert!(!camera.is_running());
    }
}
