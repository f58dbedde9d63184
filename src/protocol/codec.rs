use std::fmt::{self, Write};

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::queries::Query;


pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;

/// Longest payload accepted before a frame is dropped as garbage.
const MAX_PAYLOAD: usize = 64;


pub trait Checksum {
    fn checksum(&mut self) -> u8;
}

impl<'a> Checksum for std::slice::Iter<'a, u8> {
    fn checksum(&mut self) -> u8 {
        self.fold(0, |acc, byte| acc.wrapping_add(*byte))
    }
}

/// 8-bit truncated sum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().checksum()
}

/// Wrap `payload` as `STX <payload> <checksum> ETX`.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut wire = Vec::with_capacity(payload.len() + 3);
    wire.push(STX);
    wire.extend_from_slice(payload);
    wire.push(checksum(payload));
    wire.push(ETX);
    wire
}

/// Decode a single complete wire frame, as produced by [encode].
pub fn decode(wire: &[u8]) -> Result<Frame, FramingError> {
    let mut reader = FrameReader::new();

    for &byte in wire {
        match reader.push(byte) {
            ReadOutcome::Pending => continue,
            ReadOutcome::Unexpected(byte) => return Err(FramingError::Unexpected(byte)),
            ReadOutcome::Complete(result) => return result,
        }
    }

    Err(FramingError::Incomplete)
}

/// Decode the unit's numeric fields: `<ones><tens><hundreds>[-]`.
///
/// Returns `None` if fewer than three bytes are given or a digit isn't one.
pub fn decode_numeric(bytes: &[u8]) -> Option<i16> {
    let digits = bytes.get(..3)?;

    let mut value: i16 = 0;
    for (i, digit) in digits.iter().enumerate() {
        if !digit.is_ascii_digit() {
            return None;
        }
        value += (*digit - b'0') as i16 * 10_i16.pow(i as u32);
    }

    if bytes.get(3) == Some(&b'-') {
        value = -value;
    }

    Some(value)
}

/// Native single-byte encoding of a target temperature in tenths of °C.
pub fn setpoint_byte(setpoint_c10: i16) -> u8 {
    ((setpoint_c10 + 3) / 5 + 28) as u8
}

/// Inverse of [setpoint_byte].
pub fn setpoint_c10(byte: u8) -> i16 {
    (byte as i16 - 28) * 5
}

/// `02:47:31` style rendering for logs.
pub fn hex_repr(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        let _ = write!(out, "{byte:02X}");
    }
    out
}

/// Printable rendering with C-style escapes for control bytes.
pub fn str_repr(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            7 => out.push_str("\\a"),
            8 => out.push_str("\\b"),
            9 => out.push_str("\\t"),
            10 => out.push_str("\\n"),
            11 => out.push_str("\\v"),
            12 => out.push_str("\\f"),
            13 => out.push_str("\\r"),
            27 => out.push_str("\\e"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            b if b < 32 || b > 127 => {
                let _ = write!(out, "\\x{b:02X}");
            }
            b => out.push(b as char),
        }
    }
    out
}


/// A checksum-validated S21 frame payload (without STX, checksum and ETX).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>
}

impl Frame {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self { payload: payload.into() }
    }

    pub fn query(query: Query) -> Self {
        Self::new(query.code().as_slice())
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The two header bytes, if present.
    pub fn header(&self) -> Option<[u8; 2]> {
        match self.payload[..] {
            [a, b, ..] => Some([a, b]),
            _ => None
        }
    }

    /// Payload bytes after the header.
    pub fn body(&self) -> &[u8] {
        self.payload.get(2..).unwrap_or_default()
    }

    pub fn to_wire(&self) -> Vec<u8> {
        encode(&self.payload)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", str_repr(&self.payload))
    }
}


#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("unexpected byte {0:#04x} outside of a frame")]
    Unexpected(u8),
    #[error("frame ended before it was complete")]
    Incomplete,
    #[error("empty frame")]
    Empty,
    #[error("frame longer than 64 bytes")]
    Overflow,
    #[error("invalid checksum (frame: {actual:#04x}, calculated: {expected:#04x}) for {}", hex_repr(.payload))]
    InvalidChecksum {
        expected: u8,
        actual: u8,
        payload: Vec<u8>
    },
}


/// Result of feeding one byte into a [FrameReader].
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Byte consumed, frame not finished yet.
    Pending,
    /// Byte seen while waiting for STX; ignored.
    Unexpected(u8),
    /// ETX seen (or the frame overflowed).
    Complete(Result<Frame, FramingError>)
}

/// Byte-at-a-time frame accumulator.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
    in_frame: bool
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Has STX been seen for the frame currently being read?
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    pub fn push(&mut self, byte: u8) -> ReadOutcome {
        if !self.in_frame {
            if byte != STX {
                return ReadOutcome::Unexpected(byte);
            }

            self.in_frame = true;
            self.buffer.clear();
            return ReadOutcome::Pending;
        }

        // The checksum is not escaped, so an STX or ETX whose value matches the
        // sum so far is the checksum byte. A buffer already ending in its own
        // checksum sums to an even value, so it never matches ETX.
        let is_checksum = (byte == STX || byte == ETX) && checksum(&self.buffer) == byte;

        match byte {
            _ if is_checksum => self.store(byte),
            // lost the end of the previous frame -- resync on the new one
            STX => {
                self.buffer.clear();
                ReadOutcome::Pending
            },
            ETX => {
                self.in_frame = false;
                ReadOutcome::Complete(Self::finish(std::mem::take(&mut self.buffer)))
            },
            byte => self.store(byte),
        }
    }

    fn store(&mut self, byte: u8) -> ReadOutcome {
        if self.buffer.len() >= MAX_PAYLOAD {
            self.in_frame = false;
            self.buffer.clear();
            return ReadOutcome::Complete(Err(FramingError::Overflow));
        }
        self.buffer.push(byte);
        ReadOutcome::Pending
    }

    fn finish(mut payload: Vec<u8>) -> Result<Frame, FramingError> {
        let actual = payload.pop().ok_or(FramingError::Empty)?;

        let expected = checksum(&payload);
        if expected != actual {
            return Err(FramingError::InvalidChecksum { expected, actual, payload });
        }

        Ok(Frame { payload })
    }
}


/// Something received on the line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RxFrame {
    Ack,
    Nak,
    Frame(Frame),
    /// A frame that failed validation, with whatever payload was read.
    Corrupted(Vec<u8>),
    /// A byte outside any frame that isn't ACK or NAK.
    Unexpected(u8)
}

/// Something to send on the line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxFrame {
    Frame(Frame),
    Ack,
    Nak
}

impl From<Frame> for TxFrame {
    fn from(frame: Frame) -> Self {
        TxFrame::Frame(frame)
    }
}


/// Stream codec for whole-line consumers (emulator, sniffer).
///
/// The controller itself reads byte by byte through [FrameReader] since it
/// needs per-byte timeouts.
#[derive(Debug, Default)]
pub struct S21Codec {
    reader: FrameReader
}

impl S21Codec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for S21Codec {
    type Item = RxFrame;

    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();

            if !self.reader.in_frame() {
                match byte {
                    ACK => return Ok(Some(RxFrame::Ack)),
                    NAK => return Ok(Some(RxFrame::Nak)),
                    _ => ()
                }
            }

            match self.reader.push(byte) {
                ReadOutcome::Pending => continue,
                ReadOutcome::Unexpected(byte) => return Ok(Some(RxFrame::Unexpected(byte))),
                ReadOutcome::Complete(Ok(frame)) => return Ok(Some(RxFrame::Frame(frame))),
                ReadOutcome::Complete(Err(FramingError::InvalidChecksum { payload, .. })) => {
                    return Ok(Some(RxFrame::Corrupted(payload)))
                },
                ReadOutcome::Complete(Err(_)) => return Ok(Some(RxFrame::Corrupted(vec![]))),
            }
        }

        Ok(None)
    }
}

impl Encoder<TxFrame> for S21Codec {
    type Error = std::io::Error;

    fn encode(&mut self, frame: TxFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            TxFrame::Frame(frame) => {
                dst.reserve(frame.payload.len() + 3);
                dst.put_u8(STX);
                dst.put(&frame.payload[..]);
                dst.put_u8(checksum(&frame.payload));
                dst.put_u8(ETX);
            },
            TxFrame::Ack => dst.put_u8(ACK),
            TxFrame::Nak => dst.put_u8(NAK),
        }

        Ok(())
    }
}
