//! OSC 1.0 packet reader and writer.
//!
//! Wire format (all integers big-endian, every field padded to 4 bytes):
//!
//! - message: `address\0` `,tags\0` `arg*`
//! - bundle:  `#bundle\0` `timetag:u64` (`size:i32` `element`)*
//!
//! Bundles are flattened into the messages they carry. Each bundle element is
//! size-prefixed, so one malformed element does not hide its siblings.

use crate::error::DecodeError;

/// Leading bytes of every bundle
pub const BUNDLE_TAG: &[u8] = b"#bundle\0";

/// Bundles nested deeper than this are rejected
const MAX_BUNDLE_DEPTH: usize = 8;

/// Timetag meaning "apply immediately"
const IMMEDIATELY: u64 = 1;

/// A single typed OSC argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Double(f64),
    Str(String),
    Blob(Vec<u8>),
    Bool(bool),
    Nil,
    Impulse,
}

impl OscArg {
    /// Name used in decode errors
    pub fn type_name(&self) -> &'static str {
        match self {
            OscArg::Int(_) => "int",
            OscArg::Float(_) => "float",
            OscArg::Double(_) => "double",
            OscArg::Str(_) => "string",
            OscArg::Blob(_) => "blob",
            OscArg::Bool(_) => "bool",
            OscArg::Nil => "nil",
            OscArg::Impulse => "impulse",
        }
    }

    /// Numeric value at the protocol's declared width
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OscArg::Float(v) => Some(*v),
            OscArg::Double(v) => Some(*v as f32),
            OscArg::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscArg::Str(s) => Some(s),
            _ => None,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            OscArg::Int(_) => b'i',
            OscArg::Float(_) => b'f',
            OscArg::Double(_) => b'd',
            OscArg::Str(_) => b's',
            OscArg::Blob(_) => b'b',
            OscArg::Bool(true) => b'T',
            OscArg::Bool(false) => b'F',
            OscArg::Nil => b'N',
            OscArg::Impulse => b'I',
        }
    }
}

/// A decoded OSC message
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Encode this message as a standalone packet
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_padded_str(&mut out, &self.address);

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(|a| a.tag() as char));
        write_padded_str(&mut out, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
                OscArg::Str(s) => write_padded_str(&mut out, s),
                OscArg::Blob(b) => {
                    out.extend_from_slice(&(b.len() as i32).to_be_bytes());
                    out.extend_from_slice(b);
                    pad_to_four(&mut out);
                }
                OscArg::Bool(_) | OscArg::Nil | OscArg::Impulse => {}
            }
        }
        out
    }
}

/// Encode messages into one bundle with an "immediately" timetag
pub fn encode_bundle(messages: &[OscMessage]) -> Vec<u8> {
    let mut out = Vec::from(BUNDLE_TAG);
    out.extend_from_slice(&IMMEDIATELY.to_be_bytes());
    for msg in messages {
        let element = msg.encode();
        out.extend_from_slice(&(element.len() as i32).to_be_bytes());
        out.extend_from_slice(&element);
    }
    out
}

/// Decode a datagram into the messages it carries.
///
/// Each entry is either one message or the framing error of one element.
/// A packet that cannot be framed at all yields a single error.
pub fn decode_packet(buf: &[u8]) -> Vec<Result<OscMessage, DecodeError>> {
    let mut out = Vec::new();
    decode_into(buf, 0, &mut out);
    out
}

fn decode_into(buf: &[u8], depth: usize, out: &mut Vec<Result<OscMessage, DecodeError>>) {
    if !buf.starts_with(BUNDLE_TAG) {
        out.push(decode_message(buf));
        return;
    }

    if depth >= MAX_BUNDLE_DEPTH {
        out.push(Err(DecodeError::Malformed(format!(
            "bundle nesting deeper than {}",
            MAX_BUNDLE_DEPTH
        ))));
        return;
    }

    let mut reader = Reader::new(&buf[BUNDLE_TAG.len()..]);
    if let Err(e) = reader.read_u64() {
        out.push(Err(e));
        return;
    }

    while reader.remaining() > 0 {
        let size = match reader.read_i32() {
            Ok(size) if size >= 0 => size as usize,
            Ok(size) => {
                out.push(Err(DecodeError::Malformed(format!(
                    "negative bundle element size {}",
                    size
                ))));
                return;
            }
            Err(e) => {
                out.push(Err(e));
                return;
            }
        };
        match reader.take(size) {
            Ok(element) => decode_into(element, depth + 1, out),
            Err(e) => {
                out.push(Err(e));
                return;
            }
        }
    }
}

/// Decode a single (non-bundle) message
pub fn decode_message(buf: &[u8]) -> Result<OscMessage, DecodeError> {
    let mut reader = Reader::new(buf);

    let address = reader.read_padded_str()?;
    if !address.starts_with('/') {
        return Err(DecodeError::Malformed(format!(
            "address must start with '/': {:?}",
            address
        )));
    }

    // Type tags are optional in very old senders; treat their absence as no arguments
    if reader.remaining() == 0 {
        return Ok(OscMessage::new(address, Vec::new()));
    }

    let tags = reader.read_padded_str()?;
    let tags = tags
        .strip_prefix(',')
        .ok_or_else(|| DecodeError::Malformed(format!("type tags must start with ',': {:?}", tags)))?;

    let mut args = Vec::with_capacity(tags.len());
    for tag in tags.bytes() {
        let arg = match tag {
            b'i' => OscArg::Int(reader.read_i32()?),
            b'f' => OscArg::Float(f32::from_bits(reader.read_u32()?)),
            b'd' => OscArg::Double(f64::from_bits(reader.read_u64()?)),
            b's' | b'S' => OscArg::Str(reader.read_padded_str()?.to_string()),
            b'b' => OscArg::Blob(reader.read_blob()?.to_vec()),
            b'T' => OscArg::Bool(true),
            b'F' => OscArg::Bool(false),
            b'N' => OscArg::Nil,
            b'I' => OscArg::Impulse,
            other => {
                return Err(DecodeError::Malformed(format!(
                    "unsupported type tag '{}'",
                    other as char
                )));
            }
        };
        args.push(arg);
    }

    Ok(OscMessage::new(address, args))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::Malformed(format!(
                "need {} bytes at offset {}, only {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.read_u32()? as i32)
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let hi = self.read_u32()? as u64;
        let lo = self.read_u32()? as u64;
        Ok((hi << 32) | lo)
    }

    fn read_padded_str(&mut self) -> Result<&'a str, DecodeError> {
        let buf = self.buf;
        let rest = &buf[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| DecodeError::Malformed("unterminated string".into()))?;
        let raw = &rest[..len];
        // String plus its NUL, rounded up to a multiple of four
        self.take((len + 4) & !3)?;
        std::str::from_utf8(raw)
            .map_err(|e| DecodeError::Malformed(format!("string is not UTF-8: {}", e)))
    }

    fn read_blob(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(DecodeError::Malformed(format!("negative blob size {}", len)));
        }
        let len = len as usize;
        let padded = (len + 3) & !3;
        let bytes = self.take(padded)?;
        Ok(&bytes[..len])
    }
}

fn write_padded_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    pad_to_four(out);
}

fn pad_to_four(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}
