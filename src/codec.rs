//! # Slice codec
//!
//! Pure, in-memory compress/decompress of one EBZIP1 slice, plus the
//! running Adler-32 both directions share. No file I/O here; `transform`
//! and `zio` own the framing.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

/// Deflate `raw` at level 9. If the compressed form would not be smaller
/// than `raw.len()`, the slice is stored verbatim instead - the container
/// treats a slice whose length equals `slice_size` as a candidate for the
/// stored fallback, but the decision here is made purely on size.
pub fn compress_slice(raw: &[u8]) -> Vec<u8> {
    let mut compressor = Compress::new(Compression::best(), false);
    let mut out = Vec::with_capacity(raw.len());
    let _status = compressor
        .compress_vec(raw, &mut out, FlushCompress::Finish)
        .expect("in-memory deflate cannot fail");
    if out.len() >= raw.len() {
        raw.to_vec()
    } else {
        out
    }
}

/// Inflate `compressed` back to exactly `expected_len` bytes. If
/// `compressed.len() == expected_len`, the slice was stored rather than
/// deflated and is returned unchanged - this mirrors the decoder's lack of
/// an explicit stored/compressed flag in the index. A corrupted deflate
/// stream (truncated input, flipped bits) cannot be recovered; rather than
/// panic, this returns whatever partial output was produced, zero-padded
/// to `expected_len` - the caller's Adler-32 check then reports the
/// corruption as a `CrcMismatch` instead of crashing the run.
pub fn decompress_slice(compressed: &[u8], expected_len: usize) -> Vec<u8> {
    if compressed.len() == expected_len {
        return compressed.to_vec();
    }
    let mut decompressor = Decompress::new(false);
    let mut out = Vec::with_capacity(expected_len);
    if let Err(e) = decompressor.decompress_vec(compressed, &mut out, FlushDecompress::Finish) {
        log::warn!("corrupt deflate stream: {e}");
    }
    out.resize(expected_len, 0);
    out
}

/// A running Adler-32 accumulator over zero-padded slices, in order,
/// matching the seed (1) and update rule of RFC 1950.
pub struct RunningCrc {
    inner: adler::Adler32,
}

impl RunningCrc {
    pub fn new() -> Self {
        RunningCrc { inner: adler::Adler32::new() }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.write_slice(bytes);
    }

    pub fn finish(&self) -> u32 {
        self.inner.checksum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_at_every_level() {
        let raw: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        for level in 0..=5u8 {
            let slice_size = 2048usize << level;
            let mut padded = raw.clone();
            padded.resize(slice_size, 0);
            let compressed = compress_slice(&padded);
            let decompressed = decompress_slice(&compressed, slice_size);
            assert_eq!(decompressed, padded, "level {level} round trip failed");
        }
    }

    #[test]
    fn incompressible_data_falls_back_to_stored() {
        let raw: Vec<u8> = (0..2048u32).map(|i| ((i * 2654435761) % 256) as u8).collect();
        let compressed = compress_slice(&raw);
        assert_eq!(compressed.len(), raw.len());
        assert_eq!(decompress_slice(&compressed, raw.len()), raw);
    }

    #[test]
    fn all_zero_slice_compresses_smaller() {
        let raw = vec![0u8; 2048];
        let compressed = compress_slice(&raw);
        assert!(compressed.len() < raw.len());
    }

    #[test]
    fn empty_input_has_adler_seed_of_one() {
        let crc = RunningCrc::new();
        assert_eq!(crc.finish(), 1);
    }

    #[test]
    fn crc_accumulates_across_slices_in_order() {
        let mut whole = RunningCrc::new();
        whole.update(b"hello ");
        whole.update(b"world");

        let mut piecewise = RunningCrc::new();
        piecewise.update(b"hello world");

        assert_eq!(whole.finish(), piecewise.finish());
    }
}
