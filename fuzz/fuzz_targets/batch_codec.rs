#![no_main]

use bytes::Bytes;
use ledgerstream_core::{BatchCodec, BatchDecoder, BatchEncoder, Compression};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Downloaded objects are untrusted. Decoding must never panic on:
    // - Invalid magic bytes or version
    // - Truncated headers/footers
    // - Bad CRC32 checksums
    // - Invalid LZ4 data
    // - Corrupted varint lengths and ledger counts
    let bytes = Bytes::copy_from_slice(data);

    if let Ok(batch) = BatchCodec.decode(bytes) {
        for sequence in batch.start_sequence()..=batch.end_sequence() {
            let ledger = batch.ledger(sequence).expect("decoded batch covers its range");
            assert_eq!(ledger.sequence, sequence);
        }
        let _ = batch.ledger(batch.end_sequence().wrapping_add(1));

        // Anything that decodes must survive a re-encode unchanged.
        for compression in [Compression::None, Compression::Lz4] {
            let encoded = BatchEncoder::new(compression)
                .encode(&batch)
                .expect("decoded batch can be encoded");
            assert_eq!(BatchCodec.decode(encoded).expect("re-encoded batch decodes"), batch);
        }
    }
});
