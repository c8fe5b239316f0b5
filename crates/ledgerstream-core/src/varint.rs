//! Variable-length Integer Encoding
//!
//! Ledger payload lengths inside a batch body are written as LEB128 varints:
//! seven data bits per byte, high bit set while more bytes follow. Most
//! ledgers are a few KB, so a length costs 2 bytes instead of 8.
//!
//! Decoding never panics. Batch files come from the network, so a malformed
//! or truncated varint is reported as an error instead.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Longest valid encoding of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Encode an unsigned integer as a varint
pub fn encode_varint_u64(buf: &mut impl BufMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;

        if value != 0 {
            byte |= 0x80;
        }

        buf.put_u8(byte);

        if value == 0 {
            break;
        }
    }
}

/// Decode a varint, failing on truncated input or encodings longer than a u64
pub fn decode_varint_u64(buf: &mut impl Buf) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;

    loop {
        if !buf.has_remaining() {
            return Err(Error::Truncated("varint"));
        }

        let byte = buf.get_u8();
        if shift == 63 && byte > 1 {
            return Err(Error::InvalidBatch("varint overflows u64".to_string()));
        }
        value |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(value);
        }

        shift += 7;
        if shift > 63 {
            return Err(Error::InvalidBatch("varint overflows u64".to_string()));
        }
    }
}

/// Number of bytes `value` occupies when encoded
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}
