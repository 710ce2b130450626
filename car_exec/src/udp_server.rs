//! # UDP frame server
//!
//! Receives binary command frames from the operator station. Datagrams are fed byte by byte into a
//! [`FrameParser`], so a frame split over several datagrams, or several frames in one datagram,
//! are both handled.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use comms_if::{
    cmd::ActuatorCommand,
    frame::{FrameParser, ParserStats},
};
use log::{debug, error, info, trace, warn};

use crate::controller::{dispatch, ActuatorController};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest datagram read in one go.
const RECV_BUFFER_LEN: usize = 2048;

/// Delay after the first failed receive, doubled for each further consecutive failure.
const RECV_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Longest delay between retries.
const RECV_RETRY_DELAY_MAX: Duration = Duration::from_secs(1);

/// Consecutive failed receives after which the server gives up.
const RECV_MAX_CONSECUTIVE_ERRORS: u32 = 10;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Frame receiver bound to a UDP socket.
pub struct UdpFrameServer {
    socket: UdpSocket,
    parser: FrameParser,
    buffer: Vec<u8>,
}

/// Retry policy for failed receives.
#[derive(Debug, Clone)]
pub struct RecvBackoff {
    consecutive: u32,
    delay: Duration,
    delay_max: Duration,
    limit: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum UdpServerError {
    #[error("Could not bind the UDP socket to {0}: {1}")]
    BindError(String, std::io::Error),

    #[error("Could not configure the UDP socket: {0}")]
    SocketOptionError(std::io::Error),

    #[error("Could not recieve from the UDP socket: {0}")]
    RecvError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl UdpFrameServer {
    /// Bind the server. Reads give up after `timeout` so shutdown can be noticed.
    pub fn bind(addr: &str, timeout: Duration) -> Result<Self, UdpServerError> {
        let socket =
            UdpSocket::bind(addr).map_err(|e| UdpServerError::BindError(addr.into(), e))?;

        socket
            .set_read_timeout(Some(timeout))
            .map_err(UdpServerError::SocketOptionError)?;

        Ok(Self {
            socket,
            parser: FrameParser::new(),
            buffer: vec![0u8; RECV_BUFFER_LEN],
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Receive one datagram and return the commands it completed.
    ///
    /// A read timeout or an interrupted read is not an error, it returns no commands.
    pub fn recv_commands(&mut self) -> Result<Vec<ActuatorCommand>, UdpServerError> {
        let (len, peer) = match self.socket.recv_from(&mut self.buffer) {
            Ok(r) => r,
            Err(e)
                if e.kind() == ErrorKind::WouldBlock
                    || e.kind() == ErrorKind::TimedOut
                    || e.kind() == ErrorKind::Interrupted =>
            {
                return Ok(Vec::new())
            }
            Err(e) => return Err(UdpServerError::RecvError(e)),
        };

        trace!("{} bytes from {}", len, peer);

        let frames = self.parser.feed_slice(&self.buffer[..len]);

        Ok(frames
            .iter()
            .map(|f| {
                trace!("Frame {} (command {}) from {}", f.seq, f.command, peer);
                f.command()
            })
            .collect())
    }

    /// Parser counters since the server was bound.
    pub fn stats(&self) -> ParserStats {
        self.parser.stats()
    }

    /// Receive and apply commands until `shutdown` is raised. The socket is closed on return.
    ///
    /// Failed receives are retried with a growing delay. Once too many fail in a row the last
    /// error is returned.
    pub fn run<C: ActuatorController>(
        self,
        car: Arc<Mutex<C>>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(), UdpServerError> {
        self.run_with_backoff(car, shutdown, RecvBackoff::default())
    }

    /// [`UdpFrameServer::run`] with a custom retry policy.
    pub fn run_with_backoff<C: ActuatorController>(
        mut self,
        car: Arc<Mutex<C>>,
        shutdown: Arc<AtomicBool>,
        mut backoff: RecvBackoff,
    ) -> Result<(), UdpServerError> {
        info!(
            "UDP frame server listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "?".into())
        );

        let mut result = Ok(());

        while !shutdown.load(Ordering::Relaxed) {
            let cmds = match self.recv_commands() {
                Ok(c) => {
                    backoff.reset();
                    c
                }
                Err(e) => match backoff.failed() {
                    Some(delay) => {
                        warn!("{}, retrying in {:?}", e, delay);
                        thread::sleep(delay);
                        continue;
                    }
                    None => {
                        error!("{}, giving up after {} attempts", e, backoff.limit);
                        result = Err(e);
                        break;
                    }
                },
            };

            for cmd in cmds.iter() {
                dispatch(&car, cmd, "udp");
            }
        }

        let stats = self.stats();
        debug!(
            "UDP frame server stopped ({} frames, {} bad checksums, {} skipped)",
            stats.frames, stats.crc_errors, stats.skipped
        );

        result
    }
}

impl RecvBackoff {
    pub fn new(delay: Duration, delay_max: Duration, limit: u32) -> Self {
        Self {
            consecutive: 0,
            delay,
            delay_max,
            limit,
        }
    }

    /// Record a failed receive. Returns the delay before the next attempt, or `None` once `limit`
    /// receives have failed in a row.
    pub fn failed(&mut self) -> Option<Duration> {
        self.consecutive += 1;

        if self.consecutive >= self.limit {
            return None;
        }

        let factor = 1u32 << (self.consecutive - 1).min(16);
        Some(self.delay.saturating_mul(factor).min(self.delay_max))
    }

    /// Record a successful receive.
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

impl Default for RecvBackoff {
    fn default() -> Self {
        Self::new(
            RECV_RETRY_DELAY,
            RECV_RETRY_DELAY_MAX,
            RECV_MAX_CONSECUTIVE_ERRORS,
        )
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        controller::Car,
        imu::SimImuSource,
        params::CarExecParams,
        pwm::SimPwm,
    };
    use comms_if::{cmd::Direction, frame::FrameEncoder};

    #[test]
    fn test_timeout_is_not_an_error() {
        let mut server = UdpFrameServer::bind("127.0.0.1:0", Duration::from_millis(10)).unwrap();

        assert!(server.recv_commands().unwrap().is_empty());
    }

    #[test]
    fn test_split_and_joined_datagrams() {
        let mut server = UdpFrameServer::bind("127.0.0.1:0", Duration::from_millis(500)).unwrap();
        let addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut enc = FrameEncoder::default();

        // One frame over two datagrams
        let bytes = enc.encode(&ActuatorCommand::CameraStart).unwrap();
        client.send_to(&bytes[..20], addr).unwrap();
        assert!(server.recv_commands().unwrap().is_empty());
        client.send_to(&bytes[20..], addr).unwrap();
        assert_eq!(
            server.recv_commands().unwrap(),
            vec![ActuatorCommand::CameraStart]
        );

        // Two frames in one datagram
        let mut joined = enc
            .encode(&ActuatorCommand::TurnTo { degrees: 10.0 })
            .unwrap()
            .to_vec();
        joined.extend_from_slice(&enc.encode(&ActuatorCommand::ResetGimbal).unwrap());
        client.send_to(&joined, addr).unwrap();
        assert_eq!(
            server.recv_commands().unwrap(),
            vec![
                ActuatorCommand::TurnTo { degrees: 10.0 },
                ActuatorCommand::ResetGimbal
            ]
        );
    }

    #[test]
    fn test_run_until_shutdown() {
        let pwm = SimPwm::new();
        let car = Arc::new(Mutex::new(Car::new(
            CarExecParams::default(),
            pwm.clone(),
            SimImuSource::default(),
        )));
        let shutdown = Arc::new(AtomicBool::new(false));

        let server = UdpFrameServer::bind("127.0.0.1:0", Duration::from_millis(20)).unwrap();
        let addr = server.local_addr().unwrap();

        let car_clone = car.clone();
        let shutdown_clone = shutdown.clone();
        let jh = thread::spawn(move || server.run(car_clone, shutdown_clone));

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut enc = FrameEncoder::default();
        let cmd = ActuatorCommand::Move {
            speed: 40,
            direction: Direction::Forward,
        };
        client.send_to(&enc.encode(&cmd).unwrap(), addr).unwrap();

        // Wait for the command to land
        for _ in 0..100 {
            if pwm.last_pulse(23).is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pwm.last_pulse(23), Some(1700));

        shutdown.store(true, Ordering::Relaxed);
        jh.join().unwrap().unwrap();

        // The port is free again once the server returns
        assert!(UdpSocket::bind(addr).is_ok());
    }

    /// A socket connected to a closed port reports the ICMP rejection on the next read.
    fn refused_server() -> UdpFrameServer {
        let server = UdpFrameServer::bind("127.0.0.1:0", Duration::from_millis(200)).unwrap();
        let closed = UdpSocket::bind("127.0.0.1:0").unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        server.socket.connect(closed_addr).unwrap();
        server.socket.send(&[0u8]).unwrap();
        server
    }

    #[test]
    fn test_recv_error_is_reported() {
        let mut server = refused_server();

        assert!(matches!(
            server.recv_commands(),
            Err(UdpServerError::RecvError(e)) if e.kind() == ErrorKind::ConnectionRefused
        ));
    }

    #[test]
    fn test_backoff_grows_and_gives_up() {
        let mut backoff = RecvBackoff::new(
            Duration::from_millis(50),
            Duration::from_millis(300),
            6,
        );

        assert_eq!(backoff.failed(), Some(Duration::from_millis(50)));
        assert_eq!(backoff.failed(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.failed(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.failed(), Some(Duration::from_millis(300)));

        // A good read starts over
        backoff.reset();
        assert_eq!(backoff.failed(), Some(Duration::from_millis(50)));

        for _ in 0..4 {
            assert!(backoff.failed().is_some());
        }
        assert_eq!(backoff.failed(), None);
    }

    #[test]
    fn test_run_stops_on_repeated_errors() {
        let server = refused_server();
        let car = Arc::new(Mutex::new(Car::new(
            CarExecParams::default(),
            SimPwm::new(),
            SimImuSource::default(),
        )));
        let shutdown = Arc::new(AtomicBool::new(false));

        // Give up on the first failure
        let backoff = RecvBackoff::new(Duration::from_millis(1), Duration::from_millis(1), 1);

        assert!(matches!(
            server.run_with_backoff(car, shutdown, backoff),
            Err(UdpServerError::RecvError(_))
        ));
    }
}
