//! Cross-packet LZ4 streaming compression/decompression.
//!
//! Wraps the block-streaming engine in `block` (a port of lz4.c v1.10.0)
//! in a ring-buffer discipline: a rolling input ring on the compress side,
//! a growing output ring on the decompress side, and a one-shot path for
//! inputs too large to ring-buffer.

mod stream_codec;

pub use stream_codec::{StreamCompressor, StreamDecompressor};
