//! # Command sinks
//!
//! Where the operator station sends the commands it produces: binary frames over UDP straight to
//! the car, or JSON envelopes through the message router.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::ErrorKind;
use std::net::{TcpStream, UdpSocket};
use std::time::Duration;

use comms_if::{
    cmd::ActuatorCommand,
    envelope::{self, CodecError},
    frame::FrameEncoder,
    net::NetParams,
};
use log::{debug, info, trace};
use tungstenite::{stream::MaybeTlsStream, Message, WebSocket};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Read timeout used to poll the router for incoming messages.
const ROUTER_POLL_TIMEOUT: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait CommandSink {
    /// Send one command. Delivery is not acknowledged.
    fn send(&mut self, cmd: &ActuatorCommand) -> Result<(), SinkError>;

    /// Process anything the transport received. Called once per poll of the input source.
    fn service(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Sends binary command frames as UDP datagrams, one frame per datagram.
pub struct UdpFrameSink {
    socket: UdpSocket,
    target: String,
    encoder: FrameEncoder,
}

/// Sends JSON envelopes to the car through the router.
pub struct RouterSink {
    ws: WebSocket<MaybeTlsStream<TcpStream>>,

    /// Source tag of the car
    to: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Could not bind the UDP socket: {0}")]
    BindError(std::io::Error),

    #[error("Could not send the frame to {0}: {1}")]
    UdpSendError(String, std::io::Error),

    #[error("{0} has no wire representation")]
    Unencodable(&'static str),

    #[error("Could not encode the command: {0}")]
    EncodeError(CodecError),

    #[error("Could not connect to the router: {0}")]
    ConnectError(tungstenite::Error),

    #[error("Could not configure the router socket: {0}")]
    SocketOptionError(std::io::Error),

    #[error("Router connection failed: {0}")]
    RouterError(tungstenite::Error),

    #[error("The router closed the connection")]
    RouterClosed,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl UdpFrameSink {
    /// Bind an ephemeral local socket sending to `net.car_udp_target`.
    pub fn new(net: &NetParams) -> Result<Self, SinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(SinkError::BindError)?;

        Ok(Self {
            socket,
            target: net.car_udp_target.clone(),
            encoder: FrameEncoder::default(),
        })
    }
}

impl CommandSink for UdpFrameSink {
    fn send(&mut self, cmd: &ActuatorCommand) -> Result<(), SinkError> {
        let frame = self
            .encoder
            .encode(cmd)
            .ok_or_else(|| SinkError::Unencodable(cmd.action_name()))?;

        self.socket
            .send_to(&frame, self.target.as_str())
            .map_err(|e| SinkError::UdpSendError(self.target.clone(), e))?;

        trace!("Sent {} to {}", cmd.action_name(), self.target);

        Ok(())
    }
}

impl RouterSink {
    /// Connect to the router as the operator station.
    pub fn connect(net: &NetParams) -> Result<Self, SinkError> {
        let url = net.router_url_for(&net.operator_source);

        let (mut ws, _) = tungstenite::connect(url.as_str()).map_err(SinkError::ConnectError)?;

        match ws.get_mut() {
            MaybeTlsStream::Plain(s) => s
                .set_read_timeout(Some(ROUTER_POLL_TIMEOUT))
                .map_err(SinkError::SocketOptionError)?,
            _ => debug!("Router stream is not plain TCP, incoming messages may block"),
        }

        info!("Connected to the router at {}", url);

        Ok(Self {
            ws,
            to: net.car_source.clone(),
        })
    }
}

impl CommandSink for RouterSink {
    fn send(&mut self, cmd: &ActuatorCommand) -> Result<(), SinkError> {
        if *cmd == ActuatorCommand::Unknown {
            return Err(SinkError::Unencodable(cmd.action_name()));
        }

        let text = envelope::encode(cmd, &self.to).map_err(SinkError::EncodeError)?;

        self.ws
            .send(Message::Text(text))
            .map_err(SinkError::RouterError)?;

        trace!("Sent {} to \"{}\"", cmd.action_name(), self.to);

        Ok(())
    }

    /// Log the messages the router forwarded to the operator station, e.g. the car's status.
    fn service(&mut self) -> Result<(), SinkError> {
        loop {
            match self.ws.read() {
                Ok(Message::Text(text)) => info!("Router: {}", text),
                Ok(Message::Close(_)) => return Err(SinkError::RouterClosed),
                Ok(_) => (),
                Err(tungstenite::Error::Io(e))
                    if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(())
                }
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => return Err(SinkError::RouterClosed),
                Err(e) => return Err(SinkError::RouterError(e)),
            }
        }
    }
}

impl Drop for RouterSink {
    fn drop(&mut self) {
        if let Err(e) = self.ws.close(None).and_then(|_| self.ws.flush()) {
            debug!("Router close: {}", e);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
