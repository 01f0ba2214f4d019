//! A single row-sized typed value buffer over a [`Layout`].
//!
//! One dynamically laid-out `Row` type serves every schema; there is no
//! separate static/flexible split. Accessors return `Result` rather than
//! panicking on a type or range mismatch.

use std::sync::Arc;

use crate::bitset::{BitOps, DynBitset};
use crate::error::{BcsvError, Result};
use crate::layout::{ColumnType, Layout, LayoutHandle, StructuralLockGuard};

/// A fixed-width column value convertible to/from its little-endian wire
/// representation. Implemented for every scalar [`ColumnType`] except
/// `String`, which is owned out-of-line by the Row instead.
pub trait Scalar: Sized + Copy + PartialEq {
    const COLUMN_TYPE: ColumnType;
    fn from_le_bytes(bytes: &[u8]) -> Self;
    fn write_le_bytes(self, bytes: &mut [u8]);
}

macro_rules! impl_scalar_int {
    ($t:ty, $ct:expr) => {
        impl Scalar for $t {
            const COLUMN_TYPE: ColumnType = $ct;
            fn from_le_bytes(bytes: &[u8]) -> Self {
                <$t>::from_le_bytes(bytes.try_into().expect("width mismatch"))
            }
            fn write_le_bytes(self, bytes: &mut [u8]) {
                bytes.copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl Scalar for bool {
    const COLUMN_TYPE: ColumnType = ColumnType::Bool;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
    fn write_le_bytes(self, bytes: &mut [u8]) {
        bytes[0] = self as u8;
    }
}

impl_scalar_int!(i8, ColumnType::Int8);
impl_scalar_int!(u8, ColumnType::UInt8);
impl_scalar_int!(i16, ColumnType::Int16);
impl_scalar_int!(u16, ColumnType::UInt16);
impl_scalar_int!(i32, ColumnType::Int32);
impl_scalar_int!(u32, ColumnType::UInt32);
impl_scalar_int!(i64, ColumnType::Int64);
impl_scalar_int!(u64, ColumnType::UInt64);
impl_scalar_int!(f32, ColumnType::Float32);
impl_scalar_int!(f64, ColumnType::Float64);

#[cfg(feature = "f16")]
impl Scalar for half::f16 {
    const COLUMN_TYPE: ColumnType = ColumnType::Float16;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        half::f16::from_le_bytes(bytes.try_into().expect("width mismatch"))
    }
    fn write_le_bytes(self, bytes: &mut [u8]) {
        bytes.copy_from_slice(&self.to_le_bytes());
    }
}

#[cfg(feature = "bf16")]
impl Scalar for half::bf16 {
    const COLUMN_TYPE: ColumnType = ColumnType::BFloat16;
    fn from_le_bytes(bytes: &[u8]) -> Self {
        half::bf16::from_le_bytes(bytes.try_into().expect("width mismatch"))
    }
    fn write_le_bytes(self, bytes: &mut [u8]) {
        bytes.copy_from_slice(&self.to_le_bytes());
    }
}

/// One column's value, named by index in [`Row::visit_const`]'s order.
/// Used by generic dispatch such as a CSV adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(&'a str),
    /// Raw bytes for column types this build has no typed accessor for
    /// (e.g. `Float128`, or `Float16`/`BFloat16` without their feature).
    Raw(&'a [u8]),
}

/// One row's worth of values against a [`Layout`].
///
/// Fixed-width columns live inline in `buffer`, laid out exactly as the
/// Layout's offsets describe; `String` columns reserve the same inline
/// slot (so the buffer's size always equals `layout.row_stride()`) but the
/// actual bytes live in `strings`, indexed by column index: string values
/// are owned by the Row, not borrowed from caller-provided storage.
pub struct Row {
    layout: LayoutHandle,
    _lock: StructuralLockGuard,
    buffer: Vec<u8>,
    strings: Vec<Option<String>>,
    tracking: bool,
    changes: DynBitset,
}

/// Maximum UTF-8 byte length of a string value: the wire format prefixes
/// strings with a `u16` length, so `65535` itself is
/// unrepresentable and reserved.
pub const MAX_STRING_BYTES: usize = u16::MAX as usize - 1;

impl Row {
    /// Creates a Row over `layout` with change tracking disabled.
    pub fn new(layout: LayoutHandle) -> Self {
        Self::with_tracking(layout, false)
    }

    pub fn with_tracking(layout: LayoutHandle, tracking: bool) -> Self {
        let lock = layout.acquire_lock();
        let stride = layout.row_stride();
        let count = layout.column_count();
        Self {
            buffer: vec![0u8; stride],
            strings: vec![None; count],
            changes: DynBitset::new(count),
            tracking,
            layout,
            _lock: lock,
        }
    }

    pub fn layout(&self) -> &Layout {
        self.layout.as_ref()
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking
    }

    /// The per-column change bitset consulted by the ZoH/Delta codecs.
    /// Bit `i` set means column `i` changed since the last
    /// [`Row::clear_changes`] call.
    pub fn changes(&self) -> &DynBitset {
        &self.changes
    }

    /// Clears the change bitset. Called by the Writer/codec once a row has
    /// been consumed, so the next row's changes are tracked from scratch.
    pub fn clear_changes(&mut self) {
        self.changes.reset_all();
    }

    fn column_offset_checked(&self, i: usize, ty: ColumnType) -> Result<usize> {
        let actual = self
            .layout
            .column_type(i)
            .ok_or_else(|| BcsvError::invalid_argument(format!("column index {i} out of range")))?;
        if actual != ty {
            return Err(BcsvError::invalid_argument(format!(
                "column {i} has type {actual:?}, requested {ty:?}"
            )));
        }
        self.layout
            .column_offset(i)
            .ok_or_else(|| BcsvError::invalid_argument(format!("column index {i} out of range")))
    }

    fn mark_changed(&mut self, i: usize, changed: bool) {
        if self.tracking {
            if changed {
                self.changes.set_bit(i, true);
            }
        } else {
            self.changes.set_bit(i, true);
        }
    }

    /// Reads a fixed-width column's value. Returns `None` if `i` is out of
    /// range or its type does not match `T`.
    pub fn get<T: Scalar>(&self, i: usize) -> Option<T> {
        let offset = self.column_offset_checked(i, T::COLUMN_TYPE).ok()?;
        let width = T::COLUMN_TYPE.fixed_width();
        Some(T::from_le_bytes(&self.buffer[offset..offset + width]))
    }

    /// Writes a fixed-width column's value, updating the change bitset
    /// per the active tracking policy.
    pub fn set<T: Scalar>(&mut self, i: usize, value: T) -> Result<()> {
        let offset = self.column_offset_checked(i, T::COLUMN_TYPE)?;
        let width = T::COLUMN_TYPE.fixed_width();
        let changed = !self.tracking || T::from_le_bytes(&self.buffer[offset..offset + width]) != value;
        value.write_le_bytes(&mut self.buffer[offset..offset + width]);
        self.mark_changed(i, changed);
        Ok(())
    }

    /// Reads a fixed-width column's raw little-endian bytes, independent of
    /// which Rust type (if any) the running build can decode it as. Used
    /// by the row codecs so an extended float column (e.g. `Float128`,
    /// which has no native Rust scalar type) still round-trips even when
    /// its typed accessor feature is disabled.
    pub fn get_raw(&self, i: usize) -> Option<&[u8]> {
        let ty = self.layout.column_type(i)?;
        if !ty.is_fixed_width() {
            return None;
        }
        let offset = self.layout.column_offset(i)?;
        let width = ty.fixed_width();
        Some(&self.buffer[offset..offset + width])
    }

    /// Writes a fixed-width column's raw little-endian bytes. `bytes.len()`
    /// must equal the column's fixed width exactly.
    pub fn set_raw(&mut self, i: usize, bytes: &[u8]) -> Result<()> {
        let ty = self
            .layout
            .column_type(i)
            .ok_or_else(|| BcsvError::invalid_argument(format!("column index {i} out of range")))?;
        if !ty.is_fixed_width() {
            return Err(BcsvError::invalid_argument(format!(
                "column {i} is not fixed-width"
            )));
        }
        let offset = self.layout.column_offset(i).expect("fixed-width column has an offset");
        let width = ty.fixed_width();
        if bytes.len() != width {
            return Err(BcsvError::codec(format!(
                "column {i} expects {width} raw bytes, got {}",
                bytes.len()
            )));
        }
        let changed = !self.tracking || self.buffer[offset..offset + width] != *bytes;
        self.buffer[offset..offset + width].copy_from_slice(bytes);
        self.mark_changed(i, changed);
        Ok(())
    }

    pub fn get_str(&self, i: usize) -> Option<&str> {
        match self.layout.column_type(i) {
            Some(ColumnType::String) => self.strings.get(i).and_then(|s| s.as_deref()).or(Some("")),
            _ => None,
        }
    }

    pub fn set_string(&mut self, i: usize, value: impl Into<String>) -> Result<()> {
        let actual = self
            .layout
            .column_type(i)
            .ok_or_else(|| BcsvError::invalid_argument(format!("column index {i} out of range")))?;
        if actual != ColumnType::String {
            return Err(BcsvError::invalid_argument(format!(
                "column {i} has type {actual:?}, requested String"
            )));
        }
        let value = value.into();
        if value.len() > MAX_STRING_BYTES {
            return Err(BcsvError::invalid_argument(format!(
                "string value is {} bytes, limit is {MAX_STRING_BYTES}",
                value.len()
            )));
        }
        let changed = !self.tracking || self.strings[i].as_deref() != Some(value.as_str());
        self.strings[i] = Some(value);
        self.mark_changed(i, changed);
        Ok(())
    }

    /// Reads `count` contiguous, identically-typed columns starting at
    /// `start` in one call.
    pub fn get_range<T: Scalar>(&self, start: usize, count: usize) -> Result<Vec<T>> {
        (start..start + count)
            .map(|i| {
                self.get::<T>(i)
                    .ok_or_else(|| BcsvError::invalid_argument(format!("column {i} is not of the requested type")))
            })
            .collect()
    }

    pub fn set_range<T: Scalar>(&mut self, start: usize, values: &[T]) -> Result<()> {
        for (offset, &value) in values.iter().enumerate() {
            self.set(start + offset, value)?;
        }
        Ok(())
    }

    /// Yields `(column_index, value)` pairs in column order for generic
    /// dispatch, e.g. a CSV writer.
    pub fn visit_const<'a, F: FnMut(usize, Value<'a>)>(&'a self, mut f: F)
    where
        Self: 'a,
    {
        for i in 0..self.layout.column_count() {
            let ty = self.layout.column_type(i).expect("index within column_count");
            let offset = self.layout.column_offset(i).expect("index within column_count");
            let value = match ty {
                ColumnType::Bool => Value::Bool(self.buffer[offset] != 0),
                ColumnType::Int8 => Value::I8(self.buffer[offset] as i8),
                ColumnType::UInt8 => Value::U8(self.buffer[offset]),
                ColumnType::Int16 => Value::I16(i16::from_le_bytes(
                    self.buffer[offset..offset + 2].try_into().unwrap(),
                )),
                ColumnType::UInt16 => Value::U16(u16::from_le_bytes(
                    self.buffer[offset..offset + 2].try_into().unwrap(),
                )),
                ColumnType::Int32 => Value::I32(i32::from_le_bytes(
                    self.buffer[offset..offset + 4].try_into().unwrap(),
                )),
                ColumnType::UInt32 => Value::U32(u32::from_le_bytes(
                    self.buffer[offset..offset + 4].try_into().unwrap(),
                )),
                ColumnType::Int64 => Value::I64(i64::from_le_bytes(
                    self.buffer[offset..offset + 8].try_into().unwrap(),
                )),
                ColumnType::UInt64 => Value::U64(u64::from_le_bytes(
                    self.buffer[offset..offset + 8].try_into().unwrap(),
                )),
                ColumnType::Float32 => Value::F32(f32::from_le_bytes(
                    self.buffer[offset..offset + 4].try_into().unwrap(),
                )),
                ColumnType::Float64 => Value::F64(f64::from_le_bytes(
                    self.buffer[offset..offset + 8].try_into().unwrap(),
                )),
                ColumnType::String => Value::Str(self.strings[i].as_deref().unwrap_or("")),
                ColumnType::Float16 | ColumnType::BFloat16 | ColumnType::Float128 => {
                    let width = ty.fixed_width();
                    Value::Raw(&self.buffer[offset..offset + width])
                }
            };
            f(i, value);
        }
    }
}

impl Clone for Row {
    /// Clones values into a Row sharing the same Layout; acquires its own
    /// structural-lock clone independently.
    fn clone(&self) -> Self {
        Self {
            layout: Arc::clone(&self.layout),
            _lock: self.layout.acquire_lock(),
            buffer: self.buffer.clone(),
            strings: self.strings.clone(),
            tracking: self.tracking,
            changes: self.changes.clone(),
        }
    }
}
