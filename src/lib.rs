//! BCSV: a binary columnar serialization format and library for
//! high-throughput tabular data.
//!
//! A typed [`Layout`] describes a row's columns; a [`Row`] holds one row's
//! values against that Layout; a [`Writer`] encodes a sequence of Rows
//! through a pluggable row codec (flat, zero-order-hold, delta) into a
//! packetized, optionally LZ4-compressed file; a [`Reader`] or
//! [`DirectReader`] decodes them back.
//!
//! ```no_run
//! use bcsv::{ColumnDef, ColumnType, Layout, Writer, WriterOptions};
//!
//! let layout = Layout::from_columns(vec![
//!     ColumnDef::new("id", ColumnType::Int32),
//!     ColumnDef::new("name", ColumnType::String),
//! ])?.shared();
//!
//! let mut writer = Writer::open(layout, "out.bcsv", WriterOptions::default())?;
//! writer.row().set::<i32>(0, 1)?;
//! writer.row().set_string(1, "Alice")?;
//! writer.write_row()?;
//! writer.close()?;
//! # Ok::<(), bcsv::BcsvError>(())
//! ```

mod batch;
pub mod bitset;
pub(crate) mod block;
pub mod codec;
pub mod config;
mod direct_reader;
mod error;
pub mod footer;
pub mod header;
pub mod layout;
pub(crate) mod lz4;
mod packet;
mod reader;
pub mod row;
mod writer;
pub(crate) mod xxhash;

pub use codec::CodecKind;
pub use direct_reader::DirectReader;
pub use error::{BcsvError, Result};
pub use header::FileHeader;
pub use layout::{ColumnDef, ColumnType, Layout, LayoutHandle, StructuralLockGuard};
pub use packet::{PacketHeader, PacketIndexEntry};
pub use reader::Reader;
pub use row::{Row, Scalar, Value, MAX_STRING_BYTES};
pub use writer::{Writer, WriterOptions};
