//! Row codecs: encode/decode one row to/from a byte stream.
//!
//! Each of the three implementations owns per-column offsets precomputed
//! at `setup`, and a structural lock held for its lifetime.

mod delta;
mod flat;
mod zoh;

pub use delta::DeltaCodec;
pub use flat::FlatCodec;
pub use zoh::ZohCodec;

use crate::error::{BcsvError, Result};
use crate::layout::{ColumnType, LayoutHandle};
use crate::row::Row;

/// Shared contract implemented by [`FlatCodec`], [`ZohCodec`], and
/// [`DeltaCodec`].
pub trait RowCodec {
    /// Precomputes per-column state and acquires a structural lock on
    /// `layout`. Must be called before `encode`/`decode`.
    fn setup(&mut self, layout: LayoutHandle);

    /// Appends `row`'s wire image to `out`.
    fn encode(&mut self, row: &Row, out: &mut Vec<u8>) -> Result<()>;

    /// Decodes exactly one row's wire image from `input[pos..]` into
    /// `row`, returning the number of bytes consumed.
    fn decode(&mut self, input: &[u8], pos: usize, row: &mut Row) -> Result<usize>;

    /// Drops any previous-row state. Called at every packet boundary so
    /// packets remain independently decodable outside stream mode.
    fn reset(&mut self);
}

/// Which codec variant a file header selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Flat,
    ZeroOrderHold,
    Delta,
}

impl CodecKind {
    pub fn new_codec(self) -> Box<dyn RowCodec> {
        match self {
            CodecKind::Flat => Box::new(FlatCodec::new()),
            CodecKind::ZeroOrderHold => Box::new(ZohCodec::new()),
            CodecKind::Delta => Box::new(DeltaCodec::new()),
        }
    }
}

/// Appends one column's wire image: raw little-endian bytes for
/// fixed-width columns, `u16` length + UTF-8 bytes for `String`. Used by
/// `FlatCodec` within each of its two column-order passes (fixed-width,
/// then string), and by ZoH/Delta directly in column order for whichever
/// columns they serialize in full.
pub(crate) fn encode_column_value(row: &Row, i: usize, out: &mut Vec<u8>) {
    match row.layout().column_type(i).expect("valid column index") {
        ColumnType::String => {
            let s = row.get_str(i).unwrap_or("");
            out.extend_from_slice(&(s.len() as u16).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        _ => {
            out.extend_from_slice(row.get_raw(i).expect("fixed-width column has raw bytes"));
        }
    }
}

/// Inverse of [`encode_column_value`]: consumes one column's wire image
/// from `input[pos..]`, writes it into `row`, and returns the number of
/// bytes consumed.
pub(crate) fn decode_column_value(input: &[u8], pos: usize, row: &mut Row, i: usize) -> Result<usize> {
    match row.layout().column_type(i).expect("valid column index") {
        ColumnType::String => {
            if pos + 2 > input.len() {
                return Err(BcsvError::codec("truncated string length prefix"));
            }
            let len = u16::from_le_bytes(input[pos..pos + 2].try_into().unwrap()) as usize;
            let start = pos + 2;
            let end = start + len;
            if end > input.len() {
                return Err(BcsvError::codec("truncated string payload"));
            }
            let s = std::str::from_utf8(&input[start..end])
                .map_err(|_| BcsvError::codec("string payload is not valid UTF-8"))?;
            row.set_string(i, s)?;
            Ok(end - pos)
        }
        ty => {
            let width = ty.fixed_width();
            if pos + width > input.len() {
                return Err(BcsvError::codec(format!(
                    "truncated fixed-width column {i}, needed {width} bytes"
                )));
            }
            row.set_raw(i, &input[pos..pos + width])?;
            Ok(width)
        }
    }
}
