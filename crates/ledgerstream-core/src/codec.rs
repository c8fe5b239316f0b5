//! Batch File Format
//!
//! Every datastore object holds one [`LedgerBatch`] in the format below.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (20 bytes)                                           │
//! │ - Magic bytes: "LBAT" (4 bytes)                             │
//! │ - Version: 1 (2 bytes)                                      │
//! │ - Compression: None/Lz4 (2 bytes)                           │
//! │ - Start sequence (4 bytes)                                  │
//! │ - End sequence (4 bytes)                                    │
//! │ - Ledger count (4 bytes)                                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Body (LZ4 size-prepended when compressed)                   │
//! │ - For each ledger:                                          │
//! │   * Payload length (varint)                                 │
//! │   * Payload bytes                                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                            │
//! │ - CRC32 of header + body (4 bytes)                          │
//! │ - Magic bytes: "LBAT" again (4 bytes)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian. The decoder validates magic, version,
//! checksum and counts before handing out any ledger, so a corrupted download
//! surfaces as an error rather than as a wrong ledger.
//!
//! ## Usage
//!
//! ```ignore
//! let bytes = BatchEncoder::new(Compression::Lz4).encode(&batch)?;
//! let decoded = BatchCodec.decode(bytes)?;
//! assert_eq!(decoded, batch);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::ledger::LedgerBatch;
use crate::varint;

/// Magic bytes for batch files: "LBAT"
pub const BATCH_MAGIC: [u8; 4] = *b"LBAT";

/// Version number for the batch format
pub const BATCH_VERSION: u16 = 1;

/// Batch header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// Batch footer size (8 bytes)
pub const FOOTER_SIZE: usize = 8;

/// Largest decompressed body the decoder will allocate (256 MiB)
pub const MAX_BODY_SIZE: usize = 256 * 1024 * 1024;

/// Compression applied to the batch body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum Compression {
    None = 0,
    #[default]
    Lz4 = 1,
}

impl TryFrom<u16> for Compression {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            _ => Err(Error::InvalidCompression(value)),
        }
    }
}

/// Turns the raw bytes of one datastore object into a batch.
pub trait BatchDecoder: Send + Sync {
    fn decode(&self, data: Bytes) -> Result<LedgerBatch>;
}

/// Writes batches in the format described above
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchEncoder {
    compression: Compression,
}

impl BatchEncoder {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    pub fn encode(&self, batch: &LedgerBatch) -> Result<Bytes> {
        let body_len: usize = batch
            .payloads()
            .iter()
            .map(|p| varint::varint_len(p.len() as u64) + p.len())
            .sum();

        let mut body = BytesMut::with_capacity(body_len);
        for payload in batch.payloads() {
            varint::encode_varint_u64(&mut body, payload.len() as u64);
            body.put_slice(payload);
        }

        let body = match self.compression {
            Compression::None => body.freeze(),
            Compression::Lz4 => Bytes::from(lz4_flex::compress_prepend_size(&body)),
        };

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len() + FOOTER_SIZE);
        buf.put_slice(&BATCH_MAGIC);
        buf.put_u16(BATCH_VERSION);
        buf.put_u16(self.compression as u16);
        buf.put_u32(batch.start_sequence());
        buf.put_u32(batch.end_sequence());
        buf.put_u32(batch.len() as u32);
        buf.put_slice(&body);

        let crc = crc32fast::hash(&buf[..]);
        buf.put_u32(crc);
        buf.put_slice(&BATCH_MAGIC);

        Ok(buf.freeze())
    }
}

/// Default [`BatchDecoder`] for the batch file format
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchCodec;

impl BatchDecoder for BatchCodec {
    fn decode(&self, data: Bytes) -> Result<LedgerBatch> {
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::Truncated("header"));
        }

        let footer_start = data.len() - FOOTER_SIZE;
        let mut footer = &data[footer_start..];
        let stored_crc = footer.get_u32();
        if footer[..4] != BATCH_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let mut header = &data[..HEADER_SIZE];
        if header[..4] != BATCH_MAGIC {
            return Err(Error::InvalidMagic);
        }
        header.advance(4);

        if crc32fast::hash(&data[..footer_start]) != stored_crc {
            return Err(Error::CrcMismatch);
        }

        let version = header.get_u16();
        if version != BATCH_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let compression = Compression::try_from(header.get_u16())?;
        let start = header.get_u32();
        let end = header.get_u32();
        let count = header.get_u32();

        if start > end || (end - start) as u64 + 1 != count as u64 {
            return Err(Error::InvalidBatch(format!(
                "header declares [{},{}] with {} ledgers",
                start, end, count
            )));
        }

        let body = data.slice(HEADER_SIZE..footer_start);
        let body = match compression {
            Compression::None => body,
            Compression::Lz4 => {
                if body.len() < 4 {
                    return Err(Error::Truncated("compressed body size"));
                }
                // lz4_flex prepends the uncompressed size as a little-endian u32.
                let declared = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
                if declared > MAX_BODY_SIZE {
                    return Err(Error::BodyTooLarge {
                        size: declared,
                        max: MAX_BODY_SIZE,
                    });
                }
                Bytes::from(
                    lz4_flex::decompress_size_prepended(&body)
                        .map_err(|e| Error::Decompression(e.to_string()))?,
                )
            }
        };

        // Each ledger needs at least one length byte, so the body bounds the count.
        let mut ledgers = Vec::with_capacity((count as usize).min(body.len()));
        let mut cursor = body.clone();
        for _ in 0..count {
            let len = varint::decode_varint_u64(&mut cursor)?;
            if (cursor.remaining() as u64) < len {
                return Err(Error::Truncated("ledger payload"));
            }
            ledgers.push(cursor.split_to(len as usize));
        }

        if cursor.has_remaining() {
            return Err(Error::InvalidBatch(format!(
                "{} trailing bytes after last ledger",
                cursor.remaining()
            )));
        }

        LedgerBatch::new(start, end, ledgers)
    }
}
