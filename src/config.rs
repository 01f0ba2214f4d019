//! Compile-time configuration constants.
//!
//! A single place for the tunables a Writer/Reader accepts as optional
//! parameters, plus the defaults used when a caller omits them.

/// Default LZ4 acceleration level used when a caller passes `None`.
/// `0` means "no compression, stored verbatim"; `1..=9` are LZ4
/// acceleration levels.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 1;

/// Soft upper bound on packet payload size, in KiB, used when a Writer is
/// opened without an explicit `block_size_kb`.
pub const DEFAULT_BLOCK_SIZE_KB: u32 = 64;

/// Minimum configurable block size, in KiB.
pub const MIN_BLOCK_SIZE_KB: u32 = 4;

/// Maximum configurable block size, in KiB.
pub const MAX_BLOCK_SIZE_KB: u32 = 4096;

/// Starting capacity of a [`crate::lz4::StreamDecompressor`]'s output ring,
/// in KiB, before it grows to accommodate a larger packet.
pub const DEFAULT_DECODE_BUFFER_KB: usize = 256;

/// Hard cap on the decompressor's output ring, in KiB. Packets whose
/// declared uncompressed size exceeds this are rejected.
pub const MAX_DECODE_BUFFER_KB: usize = 64 * 1024;

/// Size of the LZ4 streaming dictionary window.
pub const LZ4_DICTIONARY_KB: usize = 64;

/// Size of the compressor's input ring buffer: 128 KiB plus 64 bytes of
/// slack.
pub const LZ4_INPUT_RING_BYTES: usize = 128 * 1024 + 64;

/// Inputs at or above this size bypass the ring buffer entirely and use the
/// one-shot zero-copy compression path.
pub const LZ4_ONE_SHOT_THRESHOLD_BYTES: usize = 128 * 1024;

/// Queue depth of the batch pipeline's single background worker: exactly
/// one in-flight packet.
pub const BATCH_QUEUE_DEPTH: usize = 1;
