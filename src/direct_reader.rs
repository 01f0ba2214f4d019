//! Random-access BCSV reading via the footer index.
//!
//! Reuses the same header/packet primitives `reader.rs` uses sequentially;
//! the only new state here is the footer itself and a one-entry packet
//! cache for the common `read(i), read(i+1), ...` access pattern.

use std::fs::File;
use std::path::Path;

use crate::codec::RowCodec;
use crate::config;
use crate::error::{BcsvError, Result};
use crate::footer::Footer;
use crate::layout::{LayoutHandle, StructuralLockGuard};
use crate::lz4::StreamDecompressor;
use crate::packet::read_packet;
use crate::reader::open_header;
use crate::row::Row;

/// Loads a file's footer index and serves `read(i)` by seeking directly to
/// the packet containing row `i`.
pub struct DirectReader {
    file: File,
    layout: LayoutHandle,
    _lock: StructuralLockGuard,
    footer: Footer,
    codec: Box<dyn RowCodec>,
    compression_lvl: u8,
    decompressor: Option<StreamDecompressor>,
    row: Row,
    cached_packet_index: Option<usize>,
    cached_payload: Vec<u8>,
}

impl DirectReader {
    /// Opens `path` and loads its footer. Fails if the footer is absent or
    /// corrupt (e.g. a `STREAM_MODE` or `NO_FILE_INDEX` file); callers
    /// should fall back to [`crate::reader::Reader`] in that case.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (mut file, header, layout) = open_header(path)?;
        if header.stream_mode() || !header.has_file_index() {
            return Err(BcsvError::header(
                "file has no footer index (stream mode or NO_FILE_INDEX)",
            ));
        }
        let footer = Footer::read_from(&mut file)?;
        let codec_kind = header.codec_kind()?;
        let mut codec = codec_kind.new_codec();
        codec.setup(layout.clone());
        let lock = layout.acquire_lock();
        let decompressor = if header.compression_lvl > 0 {
            Some(StreamDecompressor::new(config::DEFAULT_DECODE_BUFFER_KB * 1024))
        } else {
            None
        };
        let row = Row::new(layout.clone());

        log::debug!(
            "bcsv direct reader: opened {} ({} packets, {} rows)",
            path.display(),
            footer.entries.len(),
            footer.row_count(),
        );

        Ok(Self {
            file,
            layout,
            _lock: lock,
            footer,
            codec,
            compression_lvl: header.compression_lvl,
            decompressor,
            row,
            cached_packet_index: None,
            cached_payload: Vec::new(),
        })
    }

    pub fn layout(&self) -> &LayoutHandle {
        &self.layout
    }

    pub fn row_count(&self) -> u64 {
        self.footer.row_count()
    }

    /// Decodes and returns row `i`: binary search for its packet, load that
    /// packet if not already cached, reset the row codec, and decode
    /// forward from the packet's first row through `i`.
    pub fn read(&mut self, i: u64) -> Result<&Row> {
        let (entry_idx, entry) = self
            .footer
            .entry_for_row(i)
            .ok_or_else(|| BcsvError::invalid_argument(format!("row index {i} out of range")))?;
        let entry = *entry;

        if self.cached_packet_index != Some(entry_idx) {
            use std::io::{Seek, SeekFrom};
            self.file.seek(SeekFrom::Start(entry.file_offset))?;
            let (_, payload) = read_packet(&mut self.file, self.decompressor.as_mut(), self.compression_lvl)?
                .ok_or_else(|| BcsvError::packet("expected a packet at the indexed offset, found EOF"))?;
            self.cached_payload = payload;
            self.cached_packet_index = Some(entry_idx);
        }

        self.codec.reset();
        let rows_to_decode = (i - entry.first_row_number as u64 + 1) as usize;
        let mut pos = 0usize;
        for _ in 0..rows_to_decode {
            pos += self.codec.decode(&self.cached_payload, pos, &mut self.row)?;
        }
        Ok(&self.row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColumnDef, ColumnType, Layout};
    use crate::reader::Reader;
    use crate::writer::{Writer, WriterOptions};

    fn layout() -> LayoutHandle {
        Layout::from_columns(vec![
            ColumnDef::new("id", ColumnType::Int32),
            ColumnDef::new("value", ColumnType::Float64),
        ])
        .unwrap()
        .shared()
    }

    /// 10,000 rows, small blocks to force many packets.
    #[test]
    fn direct_access_matches_sequential_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("direct.bcsv");
        let layout = layout();
        let mut writer = Writer::open(
            layout.clone(),
            &path,
            WriterOptions {
                block_size_kb: 4,
                ..Default::default()
            },
        )
        .unwrap();
        for i in 0..10_000i32 {
            writer.row().set::<i32>(0, i).unwrap();
            writer.row().set::<f64>(1, i as f64 * 1.5).unwrap();
            writer.write_row().unwrap();
        }
        writer.close().unwrap();

        let mut direct = DirectReader::open(&path).unwrap();
        assert_eq!(direct.row_count(), 10_000);
        for i in [0u64, 5000, 9999, 10] {
            let row = direct.read(i).unwrap();
            assert_eq!(row.get::<i32>(0), Some(i as i32));
            assert_eq!(row.get::<f64>(1), Some(i as f64 * 1.5));
        }

        let mut sequential = Reader::open(&path).unwrap();
        let mut idx = 0u64;
        while sequential.read_next().unwrap() {
            let seq_row = sequential.row();
            let direct_row = direct.read(idx).unwrap();
            assert_eq!(seq_row.get::<i32>(0), direct_row.get::<i32>(0));
            assert_eq!(seq_row.get::<f64>(1), direct_row.get::<f64>(1));
            idx += 1;
        }
    }

    #[test]
    fn stream_mode_file_has_no_usable_footer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.bcsv");
        Writer::open(
            layout(),
            &path,
            WriterOptions {
                stream_mode: true,
                ..Default::default()
            },
        )
        .unwrap()
        .close()
        .unwrap();
        assert!(DirectReader::open(&path).is_err());
    }
}
