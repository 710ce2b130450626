//! # Binary command frames
//!
//! The low latency channel carries one command per UDP datagram as a MAVLink v1 `COMMAND_LONG`
//! packet:
//!
//! ```text
//! 0xFE | len | seq | sysid | compid | msgid | payload[len] | crc_lo | crc_hi
//! ```
//!
//! The `COMMAND_LONG` payload holds the seven `f32` parameters, the `u16` command id, the target
//! system and component and a confirmation counter, all little-endian. The frame size is fixed
//! regardless of how many parameters the command uses.
//!
//! The receiver treats the channel as a byte stream and reassembles frames with a
//! [`FrameParser`], one byte at a time.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use thiserror::Error;

use crate::cmd::ActuatorCommand;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Start of frame marker.
pub const STX: u8 = 0xFE;

/// Message id of `COMMAND_LONG`.
pub const COMMAND_LONG_ID: u8 = 76;

/// Payload length of `COMMAND_LONG`.
pub const COMMAND_LONG_LEN: usize = 33;

/// CRC seed byte for `COMMAND_LONG`.
pub const COMMAND_LONG_CRC_EXTRA: u8 = 152;

/// Number of header bytes (including the start marker).
pub const HEADER_LEN: usize = 6;

/// Total size of an encoded command frame.
pub const FRAME_LEN: usize = HEADER_LEN + COMMAND_LONG_LEN + 2;

/// Number of float parameters in a frame.
pub const NUM_PARAMS: usize = 7;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A decoded `COMMAND_LONG` frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    /// Packet sequence number
    pub seq: u8,

    /// Sending system id
    pub system_id: u8,

    /// Sending component id
    pub component_id: u8,

    /// Target system id
    pub target_system: u8,

    /// Target component id
    pub target_component: u8,

    /// Command id, see [`crate::cmd::ACTION_NAMES`]
    pub command: u16,

    /// Confirmation counter
    pub confirmation: u8,

    /// Command parameters, unused slots are zero
    pub params: [f32; NUM_PARAMS],
}

/// Identity of the sender used when encoding frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    system_id: u8,
    component_id: u8,
    target_system: u8,
    target_component: u8,
    seq: u8,
}

/// Incremental frame parser.
///
/// Bytes are pushed in with [`FrameParser::feed`]; a [`Frame`] is returned on the byte that
/// completes a valid `COMMAND_LONG` packet. Packets with another message id are skipped by their
/// length, packets with a bad checksum are dropped, and in both cases parsing resumes on the next
/// start marker.
#[derive(Debug)]
pub struct FrameParser {
    state: ParseState,
    len: usize,
    msg_id: u8,
    header: [u8; HEADER_LEN],
    payload: [u8; 255],
    payload_idx: usize,
    crc_lo: u8,
    stats: ParserStats,
}

/// Counters kept by the parser.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParserStats {
    /// Frames successfully decoded
    pub frames: u64,

    /// Packets dropped due to checksum mismatch
    pub crc_errors: u64,

    /// Packets skipped because their message id is not `COMMAND_LONG`
    pub skipped: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors from decoding a complete datagram with [`Frame::from_bytes`].
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("Expected a 41 byte frame, found {0} bytes")]
    InvalidLength(usize),

    #[error("Frame does not begin with the start marker (found 0x{0:02X})")]
    MissingStart(u8),

    #[error("Unsupported message id {0}")]
    UnsupportedMessage(u8),

    #[error("Checksum mismatch (expected 0x{expected:04X}, found 0x{found:04X})")]
    BadChecksum { expected: u16, found: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Idle,
    Len,
    Seq,
    SystemId,
    ComponentId,
    MsgId,
    Payload,
    CrcLo,
    CrcHi,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Frame {
    /// Convert the frame into the command it carries.
    pub fn command(&self) -> ActuatorCommand {
        ActuatorCommand::from_id_params(self.command, &self.params)
    }

    /// Serialize the frame into its wire representation.
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut buf = [0u8; FRAME_LEN];

        buf[0] = STX;
        buf[1] = COMMAND_LONG_LEN as u8;
        buf[2] = self.seq;
        buf[3] = self.system_id;
        buf[4] = self.component_id;
        buf[5] = COMMAND_LONG_ID;

        {
            let payload = &mut buf[HEADER_LEN..HEADER_LEN + COMMAND_LONG_LEN];
            LittleEndian::write_f32_into(&self.params, &mut payload[0..28]);
            LittleEndian::write_u16(&mut payload[28..30], self.command);
            payload[30] = self.target_system;
            payload[31] = self.target_component;
            payload[32] = self.confirmation;
        }

        let crc = frame_crc(&buf[1..HEADER_LEN + COMMAND_LONG_LEN], COMMAND_LONG_CRC_EXTRA);
        LittleEndian::write_u16(&mut buf[HEADER_LEN + COMMAND_LONG_LEN..], crc);

        buf
    }

    /// Decode a single complete frame.
    ///
    /// Unlike [`FrameParser`] this requires the slice to hold exactly one `COMMAND_LONG` packet.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != FRAME_LEN {
            return Err(FrameError::InvalidLength(bytes.len()));
        }
        if bytes[0] != STX {
            return Err(FrameError::MissingStart(bytes[0]));
        }
        if bytes[5] != COMMAND_LONG_ID || bytes[1] as usize != COMMAND_LONG_LEN {
            return Err(FrameError::UnsupportedMessage(bytes[5]));
        }

        let crc_idx = HEADER_LEN + COMMAND_LONG_LEN;
        let expected = frame_crc(&bytes[1..crc_idx], COMMAND_LONG_CRC_EXTRA);
        let found = LittleEndian::read_u16(&bytes[crc_idx..]);
        if expected != found {
            return Err(FrameError::BadChecksum { expected, found });
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);

        Ok(Self::from_parts(&header, &bytes[HEADER_LEN..crc_idx]))
    }

    fn from_parts(header: &[u8; HEADER_LEN], payload: &[u8]) -> Self {
        let mut params = [0f32; NUM_PARAMS];
        LittleEndian::read_f32_into(&payload[0..28], &mut params);

        Frame {
            seq: header[2],
            system_id: header[3],
            component_id: header[4],
            target_system: payload[30],
            target_component: payload[31],
            command: LittleEndian::read_u16(&payload[28..30]),
            confirmation: payload[32],
            params,
        }
    }
}

impl FrameEncoder {
    /// Create a new encoder for the given sender and target.
    pub fn new(system_id: u8, component_id: u8, target_system: u8, target_component: u8) -> Self {
        Self {
            system_id,
            component_id,
            target_system,
            target_component,
            seq: 0,
        }
    }

    /// Encode a command into a frame, advancing the sequence number.
    ///
    /// Returns `None` for [`ActuatorCommand::Unknown`], which has no command id.
    pub fn encode(&mut self, cmd: &ActuatorCommand) -> Option<[u8; FRAME_LEN]> {
        let command = cmd.command_id()?;

        let frame = Frame {
            seq: self.seq,
            system_id: self.system_id,
            component_id: self.component_id,
            target_system: self.target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            params: cmd.params(),
        };

        self.seq = self.seq.wrapping_add(1);

        Some(frame.to_bytes())
    }
}

impl Default for FrameEncoder {
    /// Operator station identity (system 1, component 200) targeting the car (1, 1).
    fn default() -> Self {
        Self::new(1, 200, 1, 1)
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Idle,
            len: 0,
            msg_id: 0,
            header: [0u8; HEADER_LEN],
            payload: [0u8; 255],
            payload_idx: 0,
            crc_lo: 0,
            stats: ParserStats::default(),
        }
    }

    /// Push one byte into the parser, returning a frame if this byte completed one.
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            ParseState::Idle => {
                if byte == STX {
                    self.header[0] = byte;
                    self.state = ParseState::Len;
                }
            }
            ParseState::Len => {
                self.header[1] = byte;
                self.len = byte as usize;
                self.payload_idx = 0;
                self.state = ParseState::Seq;
            }
            ParseState::Seq => {
                self.header[2] = byte;
                self.state = ParseState::SystemId;
            }
            ParseState::SystemId => {
                self.header[3] = byte;
                self.state = ParseState::ComponentId;
            }
            ParseState::ComponentId => {
                self.header[4] = byte;
                self.state = ParseState::MsgId;
            }
            ParseState::MsgId => {
                self.header[5] = byte;
                self.msg_id = byte;
                self.state = match self.len {
                    0 => ParseState::CrcLo,
                    _ => ParseState::Payload,
                };
            }
            ParseState::Payload => {
                self.payload[self.payload_idx] = byte;
                self.payload_idx += 1;
                if self.payload_idx >= self.len {
                    self.state = ParseState::CrcLo;
                }
            }
            ParseState::CrcLo => {
                self.crc_lo = byte;
                self.state = ParseState::CrcHi;
            }
            ParseState::CrcHi => {
                self.state = ParseState::Idle;
                return self.finish(byte);
            }
        }

        None
    }

    /// Push a slice of bytes, returning every frame completed along the way.
    pub fn feed_slice(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|b| self.feed(*b)).collect()
    }

    /// Drop any partially received packet.
    pub fn reset(&mut self) {
        self.state = ParseState::Idle;
        self.payload_idx = 0;
    }

    /// Counters since the parser was created.
    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    fn finish(&mut self, crc_hi: u8) -> Option<Frame> {
        if self.msg_id != COMMAND_LONG_ID || self.len != COMMAND_LONG_LEN {
            trace!("Skipping packet with message id {} ({} bytes)", self.msg_id, self.len);
            self.stats.skipped += 1;
            return None;
        }

        let mut crc = crc_accumulate_slice(0xFFFF, &self.header[1..HEADER_LEN]);
        crc = crc_accumulate_slice(crc, &self.payload[..self.len]);
        crc = crc_accumulate(crc, COMMAND_LONG_CRC_EXTRA);

        if crc != u16::from_le_bytes([self.crc_lo, crc_hi]) {
            trace!("Dropping packet with bad checksum (seq {})", self.header[2]);
            self.stats.crc_errors += 1;
            return None;
        }

        self.stats.frames += 1;

        Some(Frame::from_parts(&self.header, &self.payload[..self.len]))
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// CRC-16/MCRF4XX over `bytes`, finished with the message's CRC_EXTRA seed.
fn frame_crc(bytes: &[u8], crc_extra: u8) -> u16 {
    crc_accumulate(crc_accumulate_slice(0xFFFF, bytes), crc_extra)
}

fn crc_accumulate_slice(crc: u16, bytes: &[u8]) -> u16 {
    bytes.iter().fold(crc, |c, b| crc_accumulate(c, *b))
}

fn crc_accumulate(crc: u16, byte: u8) -> u16 {
    let mut tmp = byte ^ (crc & 0xFF) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;

    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
