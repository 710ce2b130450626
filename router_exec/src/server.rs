//! # Router WebSocket server
//!
//! Accepts WebSocket connections and registers them with a shared [`Router`]. Each connection is
//! served by its own thread: text received from the peer is routed, and text routed to the peer
//! arrives over a channel and is written out between reads.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::borrow::Cow;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{channel, Receiver, Sender},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, trace, warn};
use serde_json::json;
use tungstenite::{
    handshake::server::{ErrorResponse, Request, Response},
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message, WebSocket,
};

use crate::{
    params::RouterExecParams,
    router::{ClientId, Router},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Request header carrying the source tag, preferred over the query string.
pub const SOURCE_HEADER: &str = "x-source";

/// Query parameter carrying the source tag.
pub const SOURCE_QUERY_KEY: &str = "source";

/// Wait between polls of the non-blocking listener.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

type SharedRouter = Arc<Mutex<Router<Sender<String>>>>;

pub struct RouterServer {
    listener: TcpListener,
    router: SharedRouter,
    read_timeout: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RouterServerError {
    #[error("Could not bind the router to {0}: {1}")]
    BindError(String, std::io::Error),

    #[error("Could not configure a socket: {0}")]
    SocketOptionError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RouterServer {
    pub fn bind(addr: &str, params: &RouterExecParams) -> Result<Self, RouterServerError> {
        let listener =
            TcpListener::bind(addr).map_err(|e| RouterServerError::BindError(addr.into(), e))?;
        listener
            .set_nonblocking(true)
            .map_err(RouterServerError::SocketOptionError)?;

        Ok(Self {
            listener,
            router: Arc::new(Mutex::new(Router::new(params.capacity))),
            read_timeout: Duration::from_millis(params.read_timeout_ms),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Handle to the router shared with the connection threads.
    pub fn router(&self) -> SharedRouter {
        self.router.clone()
    }

    /// Accept connections until `shutdown` is raised, then wait for every connection thread.
    pub fn run(self, shutdown: Arc<AtomicBool>) {
        info!(
            "Router listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|| "?".into())
        );

        let mut handlers: Vec<JoinHandle<()>> = Vec::new();

        while !shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!("Connection from {}", peer);

                    let router = self.router.clone();
                    let shutdown = shutdown.clone();
                    let read_timeout = self.read_timeout;

                    let spawned = thread::Builder::new()
                        .name(format!("router_client_{}", peer))
                        .spawn(move || serve(stream, peer, router, shutdown, read_timeout));

                    match spawned {
                        Ok(jh) => handlers.push(jh),
                        Err(e) => warn!("Could not start a thread for {}: {}", peer, e),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => warn!("Could not accept a connection: {}", e),
            }

            handlers.retain(|jh| !jh.is_finished());
        }

        for jh in handlers {
            if jh.join().is_err() {
                warn!("A connection thread panicked");
            }
        }

        info!("Router stopped");
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Value of the `source` parameter in a query string, empty if absent.
///
/// The key must match exactly and the value runs up to the next `&`.
pub fn source_from_query(query: &str) -> String {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == SOURCE_QUERY_KEY)
        .map(|(_, value)| value.to_string())
        .unwrap_or_default()
}

/// Source tag of a handshake request: the `x-source` header, else the `source` query parameter.
pub fn source_from_request(req: &Request) -> String {
    if let Some(tag) = req
        .headers()
        .get(SOURCE_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return tag.to_string();
    }

    req.uri().query().map(source_from_query).unwrap_or_default()
}

/// The message sent to a client once it is registered.
pub fn welcome_message() -> String {
    json!({ "message": "Connection Established" }).to_string()
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    router: SharedRouter,
    shutdown: Arc<AtomicBool>,
    read_timeout: Duration,
) {
    // Accepted sockets may inherit the listener's non-blocking mode
    if let Err(e) = stream
        .set_nonblocking(false)
        .and_then(|_| stream.set_read_timeout(Some(read_timeout)))
    {
        warn!("{}: {}", peer, RouterServerError::SocketOptionError(e));
        return;
    }

    let mut source = String::new();
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        source = source_from_request(req);
        Ok(resp)
    };

    let mut ws = match tungstenite::accept_hdr(stream, callback) {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let (tx, rx) = channel();

    let registered = match router.lock() {
        Ok(mut r) => r.connect(&source, tx),
        Err(_) => {
            warn!("Router lock poisoned, dropping {}", peer);
            return;
        }
    };

    let id = match registered {
        Ok(id) => id,
        Err(e) => {
            info!("Closing {}: {}", peer, e);
            close(
                &mut ws,
                CloseFrame {
                    code: CloseCode::Away,
                    reason: Cow::Borrowed("Router is full"),
                },
            );
            return;
        }
    };

    info!("{} connected as \"{}\"", peer, source);

    if let Err(e) = session(&mut ws, &router, &rx, &shutdown) {
        debug!("{} ({:?}): {}", peer, id, e);
    }

    match router.lock() {
        Ok(mut r) => {
            r.disconnect(id);
        }
        Err(_) => warn!("Router lock poisoned, could not remove {:?}", id),
    }

    info!("{} (\"{}\") disconnected", peer, source);
}

/// Serve one registered client until it closes or shutdown is requested.
fn session(
    ws: &mut WebSocket<TcpStream>,
    router: &SharedRouter,
    outgoing: &Receiver<String>,
    shutdown: &AtomicBool,
) -> Result<(), tungstenite::Error> {
    ws.send(Message::Text(welcome_message()))?;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            close(
                ws,
                CloseFrame {
                    code: CloseCode::Away,
                    reason: Cow::Borrowed("Router shutting down"),
                },
            );
            return Ok(());
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                trace!("Recieved: {}", text);
                let routed = match router.lock() {
                    Ok(mut r) => r.route(&text),
                    Err(_) => {
                        warn!("Router lock poisoned, dropping message");
                        continue;
                    }
                };
                if let Err(e) = routed {
                    warn!("Dropping message: {}", e);
                }
            }
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => (),
            Err(tungstenite::Error::Io(e))
                if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(e) => return Err(e),
        }

        for text in outgoing.try_iter() {
            ws.send(Message::Text(text))?;
        }
    }
}

fn close(ws: &mut WebSocket<TcpStream>, frame: CloseFrame<'static>) {
    if let Err(e) = ws.close(Some(frame)).and_then(|_| ws.flush()) {
        debug!("Close: {}", e);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
