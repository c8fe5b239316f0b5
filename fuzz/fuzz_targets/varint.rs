#![no_main]

use bytes::BytesMut;
use ledgerstream_core::varint::{decode_varint_u64, encode_varint_u64, varint_len};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut cursor = data;
    if let Ok(value) = decode_varint_u64(&mut cursor) {
        let mut buf = BytesMut::new();
        encode_varint_u64(&mut buf, value);
        assert_eq!(buf.len(), varint_len(value));
    }
});
