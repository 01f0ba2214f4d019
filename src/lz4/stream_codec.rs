use crate::block::compress::compress_bound;
use crate::block::decompress_api::{decompress_safe_continue, Lz4StreamDecode};
use crate::block::stream::Lz4Stream;
use crate::config::{LZ4_INPUT_RING_BYTES, LZ4_ONE_SHOT_THRESHOLD_BYTES, MAX_DECODE_BUFFER_KB};
use crate::error::{BcsvError, Result};

/// Compress side of the cross-packet LZ4 streaming codec.
///
/// `ring` is the 128 KiB + 64 B input window rows are copied into before
/// compression; `stream` carries the 64 KiB rolling dictionary forward
/// between calls via `Lz4Stream`'s internal state.
pub struct StreamCompressor {
    stream: Box<Lz4Stream>,
    ring: Vec<u8>,
    pos: usize,
    poisoned: bool,
}

impl StreamCompressor {
    pub fn new() -> Self {
        Self {
            stream: Lz4Stream::new(),
            ring: vec![0u8; LZ4_INPUT_RING_BYTES],
            pos: 0,
            poisoned: false,
        }
    }

    /// Zeroes the dictionary. Called at file open and after any stream
    /// error.
    pub fn reset(&mut self) {
        self.stream.reset();
        self.pos = 0;
        self.poisoned = false;
    }

    /// Compresses one packet payload. `acceleration` is the file's
    /// `compression_lvl` (1..=9); callers must not invoke this when the
    /// level is `0` (stored verbatim, no compression stage).
    pub fn compress(&mut self, input: &[u8], acceleration: i32) -> Result<Vec<u8>> {
        if self.poisoned {
            return Err(BcsvError::codec(
                "stream compressor requires reset() after a prior error",
            ));
        }
        let bound = compress_bound(input.len() as i32);
        if bound <= 0 {
            return Err(BcsvError::invalid_argument(
                "input exceeds the maximum LZ4 block size",
            ));
        }
        let mut dst = vec![0u8; bound as usize];

        if input.len() >= LZ4_ONE_SHOT_THRESHOLD_BYTES {
            let written = self.stream.compress_fast_continue(input, &mut dst, acceleration);
            if written <= 0 {
                self.poisoned = true;
                return Err(BcsvError::codec("LZ4 one-shot compression failed"));
            }
            dst.truncate(written as usize);
            // Bypassing the ring discipline means the dictionary state no
            // longer reflects file order; drop it rather than let the next
            // packet reference stale back-references.
            self.stream.reset();
            self.pos = 0;
            return Ok(dst);
        }

        if self.pos + input.len() > self.ring.len() {
            self.pos = 0;
        }
        self.ring[self.pos..self.pos + input.len()].copy_from_slice(input);
        let written = {
            let src = &self.ring[self.pos..self.pos + input.len()];
            self.stream.compress_fast_continue(src, &mut dst, acceleration)
        };
        if written <= 0 {
            self.poisoned = true;
            return Err(BcsvError::codec("LZ4 streaming compression failed"));
        }
        dst.truncate(written as usize);
        self.pos += input.len();
        Ok(dst)
    }
}

impl Default for StreamCompressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decompress side of the cross-packet LZ4 streaming codec.
///
/// `decompress_safe_continue` (see `block::decompress_api`) already detects
/// whether the destination is contiguous with the previous call's output
/// via pointer identity, and automatically demotes the old prefix to an
/// external dictionary on a ring wrap — so this wrapper only needs to own
/// the growing ring and hand it the right write offset.
pub struct StreamDecompressor {
    ctx: Lz4StreamDecode,
    ring: Vec<u8>,
    pos: usize,
    poisoned: bool,
}

impl StreamDecompressor {
    pub fn new(initial_capacity_bytes: usize) -> Self {
        Self {
            ctx: Lz4StreamDecode::new(),
            ring: vec![0u8; initial_capacity_bytes.max(1)],
            pos: 0,
            poisoned: false,
        }
    }

    pub fn reset(&mut self) {
        self.ctx = Lz4StreamDecode::new();
        self.pos = 0;
        self.poisoned = false;
    }

    /// Decompresses one packet whose uncompressed size is declared by the
    /// packet header. Rejects packets whose declared size exceeds the
    /// configured cap.
    pub fn decompress(&mut self, compressed: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        if self.poisoned {
            return Err(BcsvError::codec(
                "stream decompressor requires reset() after a prior error",
            ));
        }
        let cap_bytes = MAX_DECODE_BUFFER_KB * 1024;
        if uncompressed_size > cap_bytes {
            return Err(BcsvError::packet(format!(
                "packet uncompressed size {uncompressed_size} exceeds the {cap_bytes}-byte cap"
            )));
        }
        if uncompressed_size > self.ring.len() {
            self.ring.resize(uncompressed_size, 0);
        }
        if self.pos + uncompressed_size > self.ring.len() {
            self.pos = 0;
        }

        // SAFETY: `dst_ptr` is valid for `uncompressed_size` writes because
        // we just ensured `self.ring.len() >= self.pos + uncompressed_size`;
        // `compressed` is a valid slice for its own length.
        let dst_ptr = unsafe { self.ring.as_mut_ptr().add(self.pos) };
        let result = unsafe {
            decompress_safe_continue(
                &mut self.ctx,
                compressed.as_ptr(),
                dst_ptr,
                compressed.len(),
                uncompressed_size,
            )
        };
        match result {
            Ok(written) => {
                let out = self.ring[self.pos..self.pos + written].to_vec();
                self.pos += written;
                Ok(out)
            }
            Err(e) => {
                self.poisoned = true;
                Err(BcsvError::codec(format!("LZ4 stream decode error: {e:?}")))
            }
        }
    }
}
