//! # Router client
//!
//! Connects the car to the message router as `rc-car-server`, announces it has started and applies
//! every command envelope addressed to it. While the router is unreachable the client keeps trying
//! to reconnect.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

use comms_if::{
    cmd::ActuatorCommand,
    envelope::{self, CodecError},
    net::NetParams,
};
use log::{debug, info, warn};
use tungstenite::{stream::MaybeTlsStream, Message, WebSocket};

use crate::controller::{dispatch, ActuatorController};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time between connection attempts while the router is unreachable.
pub const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Read timeout on the socket, bounds how long a shutdown request can go unnoticed.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Granularity of the wait between reconnection attempts.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Text-channel client of the car.
pub struct RouterClient {
    /// Full URL including the `source` query parameter
    url: String,

    /// Recipient of the status announcements
    status_to: String,

    reconnect_interval: Duration,
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RouterClientError {
    #[error("Could not connect to the router: {0}")]
    ConnectError(tungstenite::Error),

    #[error("Could not configure the router socket: {0}")]
    SocketOptionError(std::io::Error),

    #[error("Could not send to the router: {0}")]
    SendError(tungstenite::Error),

    #[error("Could not recieve from the router: {0}")]
    RecvError(tungstenite::Error),

    #[error("The router closed the connection")]
    Closed,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RouterClient {
    pub fn new(net: &NetParams) -> Self {
        Self {
            url: net.router_url_for(&net.car_source),
            status_to: net.operator_source.clone(),
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }

    /// Override the time between connection attempts.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Stay connected to the router and apply the commands it forwards until `shutdown` is raised.
    pub fn run<C: ActuatorController>(self, car: Arc<Mutex<C>>, shutdown: Arc<AtomicBool>) {
        while !shutdown.load(Ordering::Relaxed) {
            match self.connect() {
                Ok(mut ws) => {
                    info!("Connected to the router at {}", self.url);

                    match self.session(&mut ws, &car, &shutdown) {
                        Ok(()) => break,
                        Err(e) => warn!("Router connection lost: {}", e),
                    }
                }
                Err(e) => warn!("{}", e),
            }

            debug!(
                "Reconnecting to the router in {} s",
                self.reconnect_interval.as_secs_f32()
            );
            wait_or_shutdown(self.reconnect_interval, &shutdown);
        }

        info!("Router client stopped");
    }

    fn connect(&self) -> Result<Socket, RouterClientError> {
        let (mut ws, _) =
            tungstenite::connect(self.url.as_str()).map_err(RouterClientError::ConnectError)?;

        match ws.get_mut() {
            MaybeTlsStream::Plain(s) => s
                .set_read_timeout(Some(READ_TIMEOUT))
                .map_err(RouterClientError::SocketOptionError)?,
            _ => warn!("Router stream is not plain TCP, shutdown may be delayed"),
        }

        Ok(ws)
    }

    /// Returns `Ok` only when the session ended because of a shutdown request.
    fn session<C: ActuatorController>(
        &self,
        ws: &mut Socket,
        car: &Mutex<C>,
        shutdown: &AtomicBool,
    ) -> Result<(), RouterClientError> {
        ws.send(Message::Text(envelope::status_message(
            &self.status_to,
            "started",
        )))
        .map_err(RouterClientError::SendError)?;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                ws.send(Message::Text(envelope::status_message(
                    &self.status_to,
                    "stopped",
                )))
                .map_err(RouterClientError::SendError)?;

                if let Err(e) = ws.close(None) {
                    debug!("Router close: {}", e);
                }
                if let Err(e) = ws.flush() {
                    debug!("Router close: {}", e);
                }

                return Ok(());
            }

            match ws.read() {
                Ok(Message::Text(text)) => {
                    if let Some(cmd) = handle_text(&text) {
                        dispatch(car, &cmd, "router");
                    }
                }
                Ok(Message::Close(_)) => return Err(RouterClientError::Closed),
                Ok(_) => (),
                Err(tungstenite::Error::Io(e))
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {}
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => return Err(RouterClientError::Closed),
                Err(e) => return Err(RouterClientError::RecvError(e)),
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Decode a text message. Messages without a `data` object (e.g. the router's welcome) are not
/// commands and are only logged.
fn handle_text(text: &str) -> Option<ActuatorCommand> {
    match envelope::decode(text) {
        Ok(cmd) => Some(cmd),
        Err(CodecError::MissingData) => {
            debug!("Ignoring message without data: {}", text);
            None
        }
        Err(e) => {
            warn!("Could not decode router message: {}", e);
            None
        }
    }
}

fn wait_or_shutdown(duration: Duration, shutdown: &AtomicBool) {
    let start = Instant::now();

    while start.elapsed() < duration && !shutdown.load(Ordering::Relaxed) {
        thread::sleep(SHUTDOWN_POLL);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{controller::Car, imu::SimImuSource, params::CarExecParams, pwm::SimPwm};
    use comms_if::envelope::{CAR_PEER_ID, OPERATOR_PEER_ID};
    use std::net::TcpListener;

    fn net_params(port: u16) -> NetParams {
        NetParams {
            router_bind: format!("127.0.0.1:{}", port),
            router_url: format!("ws://127.0.0.1:{}/", port),
            car_udp_bind: "127.0.0.1:0".into(),
            car_udp_target: "127.0.0.1:0".into(),
            car_source: CAR_PEER_ID.into(),
            operator_source: OPERATOR_PEER_ID.into(),
            udp_recv_timeout_ms: 100,
        }
    }

    #[test]
    fn test_handle_text() {
        assert_eq!(handle_text(r#"{"message":"Connection Established"}"#), None);
        assert_eq!(handle_text("not json"), None);

        let text = envelope::encode(&ActuatorCommand::TurnTo { degrees: 45.0 }, CAR_PEER_ID)
            .unwrap();
        assert_eq!(
            handle_text(&text),
            Some(ActuatorCommand::TurnTo { degrees: 45.0 })
        );
    }

    #[test]
    fn test_url_carries_source() {
        let client = RouterClient::new(&net_params(8080));
        assert_eq!(client.url, "ws://127.0.0.1:8080/?source=rc-car-server");
        assert_eq!(client.status_to, OPERATOR_PEER_ID);
    }

    #[test]
    fn test_session_against_router() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Minimal stand-in router: check the announcement, send one command, wait for the goodbye
        let router = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut ws = tungstenite::accept(stream).unwrap();

            let started = ws.read().unwrap().into_text().unwrap();
            assert!(started.contains("\"started\""));
            assert!(started.contains(OPERATOR_PEER_ID));

            ws.send(Message::Text(r#"{"message":"Connection Established"}"#.into()))
                .unwrap();
            let cmd = envelope::encode(&ActuatorCommand::TurnTo { degrees: 45.0 }, CAR_PEER_ID)
                .unwrap();
            ws.send(Message::Text(cmd)).unwrap();

            loop {
                match ws.read() {
                    Ok(Message::Text(t)) if t.contains("\"stopped\"") => break,
                    Ok(_) => (),
                    Err(e) => panic!("Router read failed before goodbye: {}", e),
                }
            }
        });

        let pwm = SimPwm::new();
        let car = Arc::new(Mutex::new(Car::new(
            CarExecParams::default(),
            pwm.clone(),
            SimImuSource::default(),
        )));
        let shutdown = Arc::new(AtomicBool::new(false));

        let client = RouterClient::new(&net_params(port))
            .with_reconnect_interval(Duration::from_millis(50));
        let car_clone = car.clone();
        let shutdown_clone = shutdown.clone();
        let jh = thread::spawn(move || client.run(car_clone, shutdown_clone));

        for _ in 0..200 {
            if pwm.last_pulse(17).is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(car.lock().unwrap().state().turn_degrees, 45.0);

        shutdown.store(true, Ordering::Relaxed);
        jh.join().unwrap();
        router.join().unwrap();
    }

    #[test]
    fn test_unreachable_router_stops_on_shutdown() {
        // Reserve a port then free it so nothing is listening
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };

        let car = Arc::new(Mutex::new(Car::new(
            CarExecParams::default(),
            SimPwm::new(),
            SimImuSource::default(),
        )));
        let shutdown = Arc::new(AtomicBool::new(false));

        let client = RouterClient::new(&net_params(port));
        let shutdown_clone = shutdown.clone();
        let jh = thread::spawn(move || client.run(car, shutdown_clone));

        thread::sleep(Duration::from_millis(200));
        shutdown.store(true, Ordering::Relaxed);

        let start = Instant::now();
        jh.join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
