//! Delta-encoding row codec: same framing as ZoH, but changed numeric
//! columns store an arithmetic difference from the previous row.

use super::{decode_column_value, encode_column_value, RowCodec};
use crate::bitset::{pack_bits_to_bytes, unpack_bits_from_bytes, BitOps, DynBitset};
use crate::error::{BcsvError, Result};
use crate::layout::{ColumnType, LayoutHandle};
use crate::row::Row;

/// Arithmetic difference/restoration for one delta-capable scalar type.
/// Integers use wrapping arithmetic so encode-then-decode round-trips
/// exactly even across overflow; floats use ordinary hardware
/// subtraction/addition, so NaN payloads follow the hardware exactly.
trait DeltaNumeric: Sized + Copy {
    fn delta_from(self, prev: Self) -> Self;
    fn undelta(self, prev: Self) -> Self;
    fn to_le_buf(self, out: &mut [u8]);
    fn from_le_buf(bytes: &[u8]) -> Self;
}

macro_rules! impl_delta_int {
    ($t:ty) => {
        impl DeltaNumeric for $t {
            fn delta_from(self, prev: Self) -> Self {
                self.wrapping_sub(prev)
            }
            fn undelta(self, prev: Self) -> Self {
                prev.wrapping_add(self)
            }
            fn to_le_buf(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }
            fn from_le_buf(bytes: &[u8]) -> Self {
                <$t>::from_le_bytes(bytes.try_into().expect("width mismatch"))
            }
        }
    };
}

macro_rules! impl_delta_float {
    ($t:ty) => {
        impl DeltaNumeric for $t {
            fn delta_from(self, prev: Self) -> Self {
                self - prev
            }
            fn undelta(self, prev: Self) -> Self {
                prev + self
            }
            fn to_le_buf(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }
            fn from_le_buf(bytes: &[u8]) -> Self {
                <$t>::from_le_bytes(bytes.try_into().expect("width mismatch"))
            }
        }
    };
}

impl_delta_int!(i8);
impl_delta_int!(u8);
impl_delta_int!(i16);
impl_delta_int!(u16);
impl_delta_int!(i32);
impl_delta_int!(u32);
impl_delta_int!(i64);
impl_delta_int!(u64);
impl_delta_float!(f32);
impl_delta_float!(f64);

/// Columns eligible for arithmetic delta encoding. `Bool` and `String`
/// always use the ZoH-style absolute replace (a boolean's "difference" is
/// not meaningful, and a string has nothing to subtract); `Float128` has
/// no native Rust arithmetic type available and also falls back to an
/// absolute write.
fn is_delta_eligible(ty: ColumnType) -> bool {
    !matches!(ty, ColumnType::Bool | ColumnType::String | ColumnType::Float128)
}

fn encode_delta_value(ty: ColumnType, cur: &[u8], prev: &[u8], out: &mut Vec<u8>) {
    macro_rules! go {
        ($t:ty) => {{
            let c = <$t>::from_le_buf(cur);
            let p = <$t>::from_le_buf(prev);
            let d = c.delta_from(p);
            let mut buf = [0u8; 16];
            d.to_le_buf(&mut buf[..core::mem::size_of::<$t>()]);
            out.extend_from_slice(&buf[..core::mem::size_of::<$t>()]);
        }};
    }
    match ty {
        ColumnType::Int8 => go!(i8),
        ColumnType::UInt8 => go!(u8),
        ColumnType::Int16 => go!(i16),
        ColumnType::UInt16 => go!(u16),
        ColumnType::Int32 => go!(i32),
        ColumnType::UInt32 => go!(u32),
        ColumnType::Int64 => go!(i64),
        ColumnType::UInt64 => go!(u64),
        ColumnType::Float32 => go!(f32),
        ColumnType::Float64 => go!(f64),
        ColumnType::Float16 | ColumnType::BFloat16 => out.extend_from_slice(cur),
        ColumnType::Bool | ColumnType::String | ColumnType::Float128 => {
            unreachable!("not delta-eligible")
        }
    }
}

fn decode_delta_value(ty: ColumnType, encoded: &[u8], prev: &[u8], out: &mut [u8]) {
    macro_rules! go {
        ($t:ty) => {{
            let d = <$t>::from_le_buf(encoded);
            let p = <$t>::from_le_buf(prev);
            let v = d.undelta(p);
            v.to_le_buf(out);
        }};
    }
    match ty {
        ColumnType::Int8 => go!(i8),
        ColumnType::UInt8 => go!(u8),
        ColumnType::Int16 => go!(i16),
        ColumnType::UInt16 => go!(u16),
        ColumnType::Int32 => go!(i32),
        ColumnType::UInt32 => go!(u32),
        ColumnType::Int64 => go!(i64),
        ColumnType::UInt64 => go!(u64),
        ColumnType::Float32 => go!(f32),
        ColumnType::Float64 => go!(f64),
        ColumnType::Float16 | ColumnType::BFloat16 => out.copy_from_slice(encoded),
        ColumnType::Bool | ColumnType::String | ColumnType::Float128 => {
            unreachable!("not delta-eligible")
        }
    }
}

/// Keeps its own snapshot of the previous row's raw column bytes, separate
/// from the live [`Row`], because by the time `encode` runs the Row's own
/// buffer already holds the *new* value (the caller wrote it via
/// `Row::set`), so the old value is gone from there.
pub struct DeltaCodec {
    layout: Option<LayoutHandle>,
    first_in_packet: bool,
    prev: Vec<u8>,
    prev_valid: DynBitset,
}

impl DeltaCodec {
    pub fn new() -> Self {
        Self {
            layout: None,
            first_in_packet: true,
            prev: Vec::new(),
            prev_valid: DynBitset::new(0),
        }
    }
}

impl Default for DeltaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RowCodec for DeltaCodec {
    fn setup(&mut self, layout: LayoutHandle) {
        self.prev = vec![0u8; layout.row_stride()];
        self.prev_valid = DynBitset::new(layout.column_count());
        self.layout = Some(layout);
        self.first_in_packet = true;
    }

    fn encode(&mut self, row: &Row, out: &mut Vec<u8>) -> Result<()> {
        let count = row.layout().column_count();
        let force_full = self.first_in_packet;
        let mask = if force_full {
            DynBitset::with_all_set(count)
        } else {
            row.changes().clone()
        };
        out.extend_from_slice(&pack_bits_to_bytes(&mask));

        for i in 0..count {
            if !mask.test(i) {
                continue;
            }
            let ty = row.layout().column_type(i).expect("valid column index");
            if ty == ColumnType::String || !is_delta_eligible(ty) {
                encode_column_value(row, i, out);
            } else {
                let cur = row.get_raw(i).expect("fixed-width column");
                let offset = row.layout().column_offset(i).expect("valid column index");
                let width = cur.len();
                if force_full || !self.prev_valid.test(i) {
                    out.extend_from_slice(cur);
                } else {
                    encode_delta_value(ty, cur, &self.prev[offset..offset + width], out);
                }
            }
        }

        // Snapshot every column's current raw bytes for the next row's delta base.
        for i in 0..count {
            let ty = row.layout().column_type(i).expect("valid column index");
            if ty == ColumnType::String {
                continue;
            }
            let offset = row.layout().column_offset(i).expect("valid column index");
            let cur = row.get_raw(i).expect("fixed-width column");
            self.prev[offset..offset + cur.len()].copy_from_slice(cur);
            self.prev_valid.set_bit(i, true);
        }
        self.first_in_packet = false;
        Ok(())
    }

    fn decode(&mut self, input: &[u8], pos: usize, row: &mut Row) -> Result<usize> {
        let count = row.layout().column_count();
        let mask_bytes = (count + 7) / 8;
        if pos + mask_bytes > input.len() {
            return Err(BcsvError::codec("truncated change mask"));
        }
        let mask = unpack_bits_from_bytes(&input[pos..pos + mask_bytes], count);
        let mut consumed = mask_bytes;
        let force_full = self.first_in_packet;

        for i in 0..count {
            if !mask.test(i) {
                continue;
            }
            let ty = row.layout().column_type(i).expect("valid column index");
            if ty == ColumnType::String || !is_delta_eligible(ty) {
                consumed += decode_column_value(input, pos + consumed, row, i)?;
                continue;
            }
            let width = ty.fixed_width();
            if pos + consumed + width > input.len() {
                return Err(BcsvError::codec(format!(
                    "truncated delta column {i}, needed {width} bytes"
                )));
            }
            let encoded = &input[pos + consumed..pos + consumed + width];
            let offset = row.layout().column_offset(i).expect("valid column index");
            let mut resolved = [0u8; 16];
            if force_full || !self.prev_valid.test(i) {
                resolved[..width].copy_from_slice(encoded);
            } else {
                decode_delta_value(ty, encoded, &self.prev[offset..offset + width], &mut resolved[..width]);
            }
            row.set_raw(i, &resolved[..width])?;
            consumed += width;
        }

        for i in 0..count {
            let ty = row.layout().column_type(i).expect("valid column index");
            if ty == ColumnType::String {
                continue;
            }
            if let Some(cur) = row.get_raw(i) {
                let offset = row.layout().column_offset(i).expect("valid column index");
                let len = cur.len();
                // Avoid an aliasing borrow of `row` and `self.prev` at once.
                let cur_owned = cur.to_vec();
                self.prev[offset..offset + len].copy_from_slice(&cur_owned);
            }
            self.prev_valid.set_bit(i, true);
        }
        self.first_in_packet = false;
        Ok(consumed)
    }

    fn reset(&mut self) {
        self.first_in_packet = true;
        self.prev_valid.reset_all();
    }
}
