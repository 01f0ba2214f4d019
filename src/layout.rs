//! Schema model: an ordered sequence of typed, named columns.
//!
//! Structural edits (add/remove/retype/replace/clear a column) are rejected
//! while any codec, Writer, or Reader holds the structural lock;
//! `set_column_name` is exempt since renaming changes neither wire layout
//! nor any precomputed offset.
//!
//! The column list lives behind a `RefCell` and every mutator takes `&self`,
//! so a single `Layout` can be shared (via [`LayoutHandle`]) across the
//! several things that need to read it concurrently. `RefCell` is not
//! `Sync`, so `Arc<Layout>` inherits that: single-threaded ownership without
//! external synchronization is enforced by the compiler, not left as a
//! documentation-only promise.

use std::cell::RefCell;
use std::sync::Arc;

use crate::error::{BcsvError, Result};

/// The twelve mandatory scalar column types, plus three
/// optional extended float types recognized on read regardless of which
/// Cargo features are enabled, so that files written with them stay
/// readable by a reader built without them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Bool = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float32 = 9,
    Float64 = 10,
    String = 11,
    /// IEEE-754 binary16. Typed accessors require the `f16` feature.
    Float16 = 12,
    /// bfloat16. Typed accessors require the `bf16` feature.
    BFloat16 = 13,
    /// IEEE-754 binary128. Typed accessors require the `f128` feature.
    Float128 = 14,
}

impl ColumnType {
    pub(crate) fn from_wire(id: u8) -> Result<Self> {
        use ColumnType::*;
        Ok(match id {
            0 => Bool,
            1 => Int8,
            2 => Int16,
            3 => Int32,
            4 => Int64,
            5 => UInt8,
            6 => UInt16,
            7 => UInt32,
            8 => UInt64,
            9 => Float32,
            10 => Float64,
            11 => String,
            12 => Float16,
            13 => BFloat16,
            14 => Float128,
            other => {
                return Err(BcsvError::header(format!(
                    "unknown column type id {other}"
                )))
            }
        })
    }

    pub(crate) fn wire_id(self) -> u8 {
        self as u8
    }

    /// `true` for columns stored inline in the row's fixed-width buffer;
    /// `false` for `String`, which is stored out-of-line.
    pub fn is_fixed_width(self) -> bool {
        !matches!(self, ColumnType::String)
    }

    /// Byte width of the inline representation. Strings have no fixed
    /// width; callers must not call this for `ColumnType::String`.
    pub fn fixed_width(self) -> usize {
        use ColumnType::*;
        match self {
            Bool | Int8 | UInt8 => 1,
            Int16 | UInt16 | Float16 | BFloat16 => 2,
            Int32 | UInt32 | Float32 => 4,
            Int64 | UInt64 | Float64 => 8,
            Float128 => 16,
            String => unreachable!("string columns have no fixed width"),
        }
    }
}

/// One `(name, type)` pair in a [`Layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Default)]
struct LayoutInner {
    columns: Vec<ColumnDef>,
    offsets: Vec<usize>,
    row_stride: usize,
}

impl LayoutInner {
    fn recompute_offsets(&mut self) {
        self.offsets.clear();
        let mut offset = 0usize;
        for col in &self.columns {
            self.offsets.push(offset);
            if col.ty.is_fixed_width() {
                offset += col.ty.fixed_width();
            } else {
                // String columns occupy one u32-sized indirection slot
                // into the Row's side table of owned strings.
                offset += core::mem::size_of::<u32>();
            }
        }
        self.row_stride = offset;
    }
}

/// A shared, reference-counted [`Layout`] handle, the form a Row, Writer,
/// or Reader actually stores.
pub type LayoutHandle = Arc<Layout>;

/// An ordered, named, typed schema shared by a Row and its Writer/Reader.
///
/// The structural lock is `Arc<()>`: any number of codecs, Readers, and
/// Writers may each hold a clone of `lock_token` concurrently; mutating
/// methods check `Arc::strong_count(&self.lock_token) > 1` (the layout's own
/// handle plus at least one external holder) and reject the mutation if so.
/// `set_column_name` does not check the lock: it cannot invalidate any
/// precomputed offset or wire layout.
#[derive(Debug)]
pub struct Layout {
    inner: RefCell<LayoutInner>,
    lock_token: Arc<()>,
}

/// An opaque structural-lock guard. While any clone is alive, the
/// originating [`Layout`]'s structure cannot be mutated. Dropping it
/// releases the hold.
#[derive(Clone)]
pub struct StructuralLockGuard {
    _token: Arc<()>,
}

impl Layout {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(LayoutInner::default()),
            lock_token: Arc::new(()),
        }
    }

    pub fn from_columns(columns: Vec<ColumnDef>) -> Result<Self> {
        let layout = Self::new();
        layout.set_columns(columns)?;
        Ok(layout)
    }

    pub fn shared(self) -> LayoutHandle {
        Arc::new(self)
    }

    fn is_locked(&self) -> bool {
        Arc::strong_count(&self.lock_token) > 1
    }

    fn check_unlocked(&self, op: &str) -> Result<()> {
        if self.is_locked() {
            return Err(BcsvError::StructuralLock(format!(
                "{op} while {} live holder(s) of the structural lock remain",
                Arc::strong_count(&self.lock_token) - 1
            )));
        }
        Ok(())
    }

    /// Acquire a clone of the structural lock. Held by Writers, Readers,
    /// and row codecs for their lifetime.
    pub fn acquire_lock(&self) -> StructuralLockGuard {
        StructuralLockGuard {
            _token: Arc::clone(&self.lock_token),
        }
    }

    pub fn column_count(&self) -> usize {
        self.inner.borrow().columns.len()
    }

    pub fn column_name(&self, i: usize) -> Option<String> {
        self.inner.borrow().columns.get(i).map(|c| c.name.clone())
    }

    pub fn column_type(&self, i: usize) -> Option<ColumnType> {
        self.inner.borrow().columns.get(i).map(|c| c.ty)
    }

    pub fn column_offset(&self, i: usize) -> Option<usize> {
        self.inner.borrow().offsets.get(i).copied()
    }

    pub fn row_stride(&self) -> usize {
        self.inner.borrow().row_stride
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.inner.borrow().columns.iter().any(|c| c.name == name)
    }

    /// Index of the first column named `name`. Duplicate names always
    /// resolve to the first match.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.inner.borrow().columns.iter().position(|c| c.name == name)
    }

    fn warn_on_duplicate(inner: &LayoutInner, name: &str) {
        if inner.columns.iter().any(|c| c.name == name) {
            log::warn!(
                "layout: duplicate column name {name:?}; columnIndex will resolve to the first occurrence"
            );
        }
    }

    pub fn add_column(&self, col: ColumnDef) -> Result<()> {
        self.check_unlocked("addColumn")?;
        let mut inner = self.inner.borrow_mut();
        if inner.columns.len() >= u16::MAX as usize {
            return Err(BcsvError::invalid_argument("column count exceeds 2^16"));
        }
        Self::warn_on_duplicate(&inner, &col.name);
        inner.columns.push(col);
        inner.recompute_offsets();
        Ok(())
    }

    pub fn remove_column(&self, i: usize) -> Result<()> {
        self.check_unlocked("removeColumn")?;
        let mut inner = self.inner.borrow_mut();
        if i >= inner.columns.len() {
            return Err(BcsvError::invalid_argument(format!(
                "column index {i} out of range"
            )));
        }
        inner.columns.remove(i);
        inner.recompute_offsets();
        Ok(())
    }

    pub fn set_column_type(&self, i: usize, ty: ColumnType) -> Result<()> {
        self.check_unlocked("setColumnType")?;
        let mut inner = self.inner.borrow_mut();
        let col = inner
            .columns
            .get_mut(i)
            .ok_or_else(|| BcsvError::invalid_argument(format!("column index {i} out of range")))?;
        col.ty = ty;
        inner.recompute_offsets();
        Ok(())
    }

    pub fn set_columns(&self, columns: Vec<ColumnDef>) -> Result<()> {
        self.check_unlocked("setColumns")?;
        if columns.len() > u16::MAX as usize {
            return Err(BcsvError::invalid_argument("column count exceeds 2^16"));
        }
        let mut inner = self.inner.borrow_mut();
        for col in &columns {
            Self::warn_on_duplicate(&inner, &col.name);
        }
        inner.columns = columns;
        inner.recompute_offsets();
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.check_unlocked("clear")?;
        let mut inner = self.inner.borrow_mut();
        inner.columns.clear();
        inner.recompute_offsets();
        Ok(())
    }

    /// Permitted even while the structural lock is held: renaming a column
    /// changes neither wire layout nor any precomputed offset.
    pub fn set_column_name(&self, i: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let mut inner = self.inner.borrow_mut();
        Self::warn_on_duplicate(&inner, &name);
        let col = inner
            .columns
            .get_mut(i)
            .ok_or_else(|| BcsvError::invalid_argument(format!("column index {i} out of range")))?;
        col.name = name;
        Ok(())
    }

    /// Two layouts are wire-compatible iff they share column count and
    /// types in order.
    pub fn is_wire_compatible(&self, other: &Layout) -> bool {
        let a = self.inner.borrow();
        let b = other.inner.borrow();
        a.columns.len() == b.columns.len()
            && a.columns.iter().zip(b.columns.iter()).all(|(x, y)| x.ty == y.ty)
    }

    /// Strict wire-compatibility used by the sequential Reader: column
    /// count, types, and names must all match in order.
    pub fn is_strictly_compatible(&self, other: &Layout) -> bool {
        let a = self.inner.borrow();
        let b = other.inner.borrow();
        a.columns.len() == b.columns.len()
            && a.columns
                .iter()
                .zip(b.columns.iter())
                .all(|(x, y)| x.ty == y.ty && x.name == y.name)
    }

    pub fn columns(&self) -> Vec<ColumnDef> {
        self.inner.borrow().columns.clone()
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Layout {
    /// Clones the column data into an independent Layout with its own,
    /// unlocked structural-lock token (used by the Reader to materialize
    /// its own copy of a file's layout).
    fn clone(&self) -> Self {
        let inner = self.inner.borrow();
        Self {
            inner: RefCell::new(LayoutInner {
                columns: inner.columns.clone(),
                offsets: inner.offsets.clone(),
                row_stride: inner.row_stride,
            }),
            lock_token: Arc::new(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Layout {
        Layout::from_columns(vec![
            ColumnDef::new("b1", ColumnType::Bool),
            ColumnDef::new("i32", ColumnType::Int32),
            ColumnDef::new("d", ColumnType::Float64),
            ColumnDef::new("s", ColumnType::String),
        ])
        .unwrap()
    }

    #[test]
    fn column_index_resolves_first_match() {
        let layout = sample();
        layout.add_column(ColumnDef::new("b1", ColumnType::Int8)).unwrap();
        assert_eq!(layout.column_index("b1"), Some(0));
    }

    #[test]
    fn structural_lock_blocks_mutation() {
        let layout = sample();
        let guard = layout.acquire_lock();
        assert!(layout.add_column(ColumnDef::new("x", ColumnType::Bool)).is_err());
        assert!(layout.remove_column(0).is_err());
        assert!(layout.set_column_type(0, ColumnType::Int64).is_err());
        assert!(layout.clear().is_err());
        drop(guard);
        assert!(layout.add_column(ColumnDef::new("x", ColumnType::Bool)).is_ok());
    }

    #[test]
    fn set_column_name_allowed_while_locked() {
        let layout = sample();
        let _guard = layout.acquire_lock();
        assert!(layout.set_column_name(0, "renamed").is_ok());
        assert_eq!(layout.column_name(0).as_deref(), Some("renamed"));
    }

    #[test]
    fn multiple_holders_all_must_release() {
        let layout = sample();
        let g1 = layout.acquire_lock();
        let g2 = g1.clone();
        drop(g1);
        assert!(layout.add_column(ColumnDef::new("x", ColumnType::Bool)).is_err());
        drop(g2);
        assert!(layout.add_column(ColumnDef::new("x", ColumnType::Bool)).is_ok());
    }

    #[test]
    fn row_stride_accounts_for_string_indirection() {
        let layout = sample();
        // bool(1) + i32(4) + f64(8) + string-slot(4) = 17
        assert_eq!(layout.row_stride(), 17);
    }
}
