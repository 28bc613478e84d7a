//! Byte/text codecs: UTF-8/16/32 with explicit endianness, and base64.
//!
//! Lua strings are raw byte buffers. These helpers move host text in and out
//! of that representation without involving an interpreter.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Errors produced by the byte/text and structured-data codecs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer length is not a multiple of the code-unit width.
    #[error("{encoding} input length {len} is not a multiple of {width}")]
    Length {
        encoding: &'static str,
        len: usize,
        width: usize,
    },

    /// A code unit sequence does not decode to a Unicode scalar value.
    #[error("invalid {encoding} data at byte offset {offset}")]
    Invalid {
        encoding: &'static str,
        offset: usize,
    },

    /// Malformed base64 text.
    #[error("invalid base64: {0}")]
    Base64(String),

    /// The value has no JSON representation.
    #[error("cannot encode a {0} value as JSON")]
    Unsupported(&'static str),

    /// Malformed JSON text or a structure JSON cannot express.
    #[error("json: {0}")]
    Json(String),
}

/// Byte order for multi-byte code units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    /// Byte order of the host platform.
    pub const NATIVE: Endian = if cfg!(target_endian = "big") {
        Endian::Big
    } else {
        Endian::Little
    };
}

impl Default for Endian {
    fn default() -> Self {
        Endian::NATIVE
    }
}

/// Encode text as UTF-8 bytes.
pub fn encode_utf8(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Decode UTF-8 bytes, rejecting malformed sequences.
pub fn decode_utf8(bytes: &[u8]) -> Result<String, CodecError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| CodecError::Invalid {
            encoding: "UTF-8",
            offset: e.valid_up_to(),
        })
}

/// Encode text as UTF-16 code units in the given byte order.
pub fn encode_utf16(text: &str, endian: Endian) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2);
    for unit in text.encode_utf16() {
        match endian {
            Endian::Big => out.extend_from_slice(&unit.to_be_bytes()),
            Endian::Little => out.extend_from_slice(&unit.to_le_bytes()),
        }
    }
    out
}

/// Decode UTF-16 bytes in the given byte order. Unpaired surrogates and odd
/// lengths are errors.
pub fn decode_utf16(bytes: &[u8], endian: Endian) -> Result<String, CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::Length {
            encoding: "UTF-16",
            len: bytes.len(),
            width: 2,
        });
    }
    let units = bytes.chunks_exact(2).map(|pair| {
        let pair = [pair[0], pair[1]];
        match endian {
            Endian::Big => u16::from_be_bytes(pair),
            Endian::Little => u16::from_le_bytes(pair),
        }
    });

    let mut out = String::with_capacity(bytes.len() / 2);
    let mut unit_pos = 0usize;
    for decoded in char::decode_utf16(units) {
        match decoded {
            Ok(c) => {
                unit_pos += c.len_utf16();
                out.push(c);
            }
            Err(_) => {
                return Err(CodecError::Invalid {
                    encoding: "UTF-16",
                    offset: unit_pos * 2,
                })
            }
        }
    }
    Ok(out)
}

/// Encode text as UTF-32 code units in the given byte order.
pub fn encode_utf32(text: &str, endian: Endian) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 4);
    for c in text.chars() {
        let unit = c as u32;
        match endian {
            Endian::Big => out.extend_from_slice(&unit.to_be_bytes()),
            Endian::Little => out.extend_from_slice(&unit.to_le_bytes()),
        }
    }
    out
}

/// Decode UTF-32 bytes in the given byte order.
pub fn decode_utf32(bytes: &[u8], endian: Endian) -> Result<String, CodecError> {
    if bytes.len() % 4 != 0 {
        return Err(CodecError::Length {
            encoding: "UTF-32",
            len: bytes.len(),
            width: 4,
        });
    }
    let mut out = String::with_capacity(bytes.len() / 4);
    for (i, quad) in bytes.chunks_exact(4).enumerate() {
        let quad = [quad[0], quad[1], quad[2], quad[3]];
        let unit = match endian {
            Endian::Big => u32::from_be_bytes(quad),
            Endian::Little => u32::from_le_bytes(quad),
        };
        let c = char::from_u32(unit).ok_or(CodecError::Invalid {
            encoding: "UTF-32",
            offset: i * 4,
        })?;
        out.push(c);
    }
    Ok(out)
}

/// Encode bytes as standard (padded) base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard (padded) base64.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(text)
        .map_err(|e| CodecError::Base64(e.to_string()))
}
