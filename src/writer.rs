//! The BCSV writer state machine: `Open → Writing → Closed`, orchestrating
//! header, packet assembly, and footer.
//!
//! The first hard error transitions the Writer straight to `Closed` and
//! records its message in `last_error`; every later call short-circuits
//! instead of attempting more I/O against a file already left in an
//! unknown state.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write as _};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::batch::{BatchWorker, PendingPacket};
use crate::codec::{CodecKind, RowCodec};
use crate::config;
use crate::error::{BcsvError, Result};
use crate::footer::Footer;
use crate::header::FileHeader;
use crate::layout::{LayoutHandle, StructuralLockGuard};
use crate::lz4::StreamCompressor;
use crate::packet::{flush_packet, PacketIndexEntry};
use crate::row::Row;

/// Tunables for [`Writer::open`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub codec: CodecKind,
    /// `0` disables compression (payload stored verbatim); `1..=9` is an
    /// LZ4 acceleration level.
    pub compression_level: u8,
    /// Soft cap on packet payload size, in KiB, clamped to
    /// `[MIN_BLOCK_SIZE_KB, MAX_BLOCK_SIZE_KB]`.
    pub block_size_kb: u32,
    /// If `false`, `open()` rejects an already-existing path.
    pub overwrite: bool,
    /// Stream mode: the LZ4 dictionary and row codec state carry across
    /// packet boundaries, and the footer is omitted.
    pub stream_mode: bool,
    /// Forces footer omission even outside stream mode.
    pub no_file_index: bool,
    /// Runs packet compression on a background worker.
    pub batch_compress: bool,
    /// Change-tracking policy for the Writer's own staging row. Irrelevant
    /// for `CodecKind::Flat`, which ignores change masks.
    pub tracking: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            codec: CodecKind::Flat,
            compression_level: config::DEFAULT_COMPRESSION_LEVEL,
            block_size_kb: config::DEFAULT_BLOCK_SIZE_KB,
            overwrite: false,
            stream_mode: false,
            no_file_index: false,
            batch_compress: false,
            tracking: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Writing,
    Closed,
}

/// Drives `Header → Packet* → Footer` for one output file.
pub struct Writer {
    layout: LayoutHandle,
    lock: Option<StructuralLockGuard>,
    options: WriterOptions,
    file: Arc<Mutex<File>>,
    codec: Box<dyn RowCodec>,
    compressor: Option<StreamCompressor>,
    batch: Option<BatchWorker>,
    index: Arc<Mutex<Vec<PacketIndexEntry>>>,
    staging_row: Row,
    payload: Vec<u8>,
    rows_in_packet: u32,
    first_row_in_packet: u32,
    total_rows: u64,
    block_size_bytes: usize,
    state: WriterState,
    last_error: Option<String>,
}

impl Writer {
    /// Opens `path` for writing: rejects if the file exists and `overwrite`
    /// is false, writes the header, and initializes the row codec, packet
    /// assembler, and (if requested) the batch worker.
    pub fn open(layout: LayoutHandle, path: impl AsRef<Path>, options: WriterOptions) -> Result<Self> {
        let path = path.as_ref();
        if !options.overwrite && path.exists() {
            return Err(BcsvError::already_exists(path.display().to_string()));
        }
        let block_size_kb = options
            .block_size_kb
            .clamp(config::MIN_BLOCK_SIZE_KB, config::MAX_BLOCK_SIZE_KB);
        if block_size_kb > u16::MAX as u32 {
            return Err(BcsvError::invalid_argument("block_size_kb exceeds u16 range"));
        }

        let lock = layout.acquire_lock();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let header = FileHeader::new(
            options.codec,
            options.compression_level,
            block_size_kb as u16,
            options.stream_mode,
            options.no_file_index,
            options.batch_compress,
            layout.columns(),
        );
        header.write_to(&mut file)?;
        file.flush()?;

        let mut codec = options.codec.new_codec();
        codec.setup(layout.clone());

        let index = Arc::new(Mutex::new(Vec::new()));
        let file = Arc::new(Mutex::new(file));

        let batch = if options.batch_compress {
            Some(BatchWorker::spawn(
                Arc::clone(&file),
                Arc::clone(&index),
                !options.stream_mode,
            ))
        } else {
            None
        };
        let compressor = if batch.is_none() && options.compression_level > 0 {
            Some(StreamCompressor::new())
        } else {
            None
        };

        log::debug!(
            "bcsv writer: opened {} (codec={:?}, compression_lvl={}, block_size_kb={block_size_kb}, batch={})",
            path.display(),
            options.codec,
            options.compression_level,
            options.batch_compress,
        );

        let staging_row = Row::with_tracking(layout.clone(), options.tracking);
        Ok(Self {
            layout,
            lock: Some(lock),
            options,
            file,
            codec,
            compressor,
            batch,
            index,
            staging_row,
            payload: Vec::new(),
            rows_in_packet: 0,
            first_row_in_packet: 0,
            total_rows: 0,
            block_size_bytes: block_size_kb as usize * 1024,
            state: WriterState::Open,
            last_error: None,
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Err(BcsvError::invalid_argument(
                self.last_error.clone().unwrap_or_else(|| "writer is closed".to_string()),
            ));
        }
        Ok(())
    }

    fn fail(&mut self, err: BcsvError) -> BcsvError {
        self.last_error = Some(err.to_string());
        self.state = WriterState::Closed;
        log::warn!("bcsv writer: fatal error, closing: {err}");
        err
    }

    /// The Writer-owned staging Row used by [`Writer::write_row`].
    pub fn row(&mut self) -> &mut Row {
        &mut self.staging_row
    }

    pub fn row_count(&self) -> u64 {
        self.total_rows
    }

    pub fn error_message(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Encodes the Writer's staging row (see [`Writer::row`]) and clears its
    /// change bitset for the next mutation cycle.
    pub fn write_row(&mut self) -> Result<()> {
        self.check_open()?;
        match self.encode_and_buffer_current_staging_row() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn encode_and_buffer_current_staging_row(&mut self) -> Result<()> {
        self.codec.encode(&self.staging_row, &mut self.payload)?;
        self.staging_row.clear_changes();
        self.rows_in_packet += 1;
        self.total_rows += 1;
        self.state = WriterState::Writing;
        if self.payload.len() >= self.block_size_bytes {
            self.flush_current_packet()?;
        }
        Ok(())
    }

    /// Encodes an externally-owned row. `row`'s layout must be
    /// wire-compatible with this Writer's layout.
    pub fn write(&mut self, row: &Row) -> Result<()> {
        self.check_open()?;
        if !self.layout.is_wire_compatible(row.layout()) {
            return Err(BcsvError::layout_incompatible(
                "row's layout is not wire-compatible with the writer's layout",
            ));
        }
        match self.encode_and_buffer_external_row(row) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn encode_and_buffer_external_row(&mut self, row: &Row) -> Result<()> {
        self.codec.encode(row, &mut self.payload)?;
        self.rows_in_packet += 1;
        self.total_rows += 1;
        self.state = WriterState::Writing;
        if self.payload.len() >= self.block_size_bytes {
            self.flush_current_packet()?;
        }
        Ok(())
    }

    /// Forces the current (possibly short) packet to close immediately.
    /// A no-op if no rows are buffered.
    pub fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        self.flush_current_packet().map_err(|e| self.fail(e))
    }

    fn flush_current_packet(&mut self) -> Result<()> {
        if self.payload.is_empty() {
            return Ok(());
        }
        let row_count = self.rows_in_packet;
        let first_row_number = self.first_row_in_packet;
        let payload = std::mem::take(&mut self.payload);

        match &self.batch {
            Some(worker) => {
                worker.submit(PendingPacket {
                    payload,
                    first_row_number,
                    row_count,
                    compression_lvl: self.options.compression_level,
                })?;
            }
            None => {
                if !self.options.stream_mode {
                    if let Some(c) = self.compressor.as_mut() {
                        c.reset();
                    }
                }
                let entry = {
                    let mut file = self.file.lock().unwrap();
                    flush_packet(
                        &mut *file,
                        self.compressor.as_mut(),
                        &payload,
                        first_row_number,
                        row_count,
                        self.options.compression_level,
                    )?
                };
                self.index.lock().unwrap().push(entry);
            }
        }

        if !self.options.stream_mode {
            self.codec.reset();
        }
        self.rows_in_packet = 0;
        self.first_row_in_packet = self.total_rows as u32;
        Ok(())
    }

    /// Flushes, writes the footer (unless stream mode or `no_file_index`),
    /// joins the batch worker, and releases the structural lock. Calling
    /// `close()` again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == WriterState::Closed {
            return Ok(());
        }
        let result = self.close_inner();
        self.state = WriterState::Closed;
        self.lock = None;
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn close_inner(&mut self) -> Result<()> {
        self.flush_current_packet()?;
        if let Some(worker) = self.batch.as_mut() {
            worker.shutdown()?;
        }
        if !self.options.stream_mode && !self.options.no_file_index {
            let entries = self.index.lock().unwrap().clone();
            let footer = Footer::new(entries);
            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::End(0))?;
            footer.write_to(&mut *file)?;
            file.flush()?;
        }
        log::debug!("bcsv writer: closed after {} rows", self.total_rows);
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if self.state != WriterState::Closed {
            if let Err(e) = self.close() {
                log::warn!("bcsv writer: error closing during drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColumnDef, ColumnType, Layout};
    use crate::reader::Reader;

    fn layout() -> LayoutHandle {
        Layout::from_columns(vec![
            ColumnDef::new("id", ColumnType::Int32),
            ColumnDef::new("name", ColumnType::String),
        ])
        .unwrap()
        .shared()
    }

    #[test]
    fn refuses_to_overwrite_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bcsv");
        Writer::open(layout(), &path, WriterOptions::default())
            .unwrap()
            .close()
            .unwrap();
        let err = Writer::open(layout(), &path, WriterOptions::default());
        assert!(err.is_err());
        let ok = Writer::open(
            layout(),
            &path,
            WriterOptions {
                overwrite: true,
                ..Default::default()
            },
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn structural_lock_is_held_while_open_and_released_on_close() {
        let layout = layout();
        let mut writer = Writer::open(
            layout.clone(),
            tempfile::NamedTempFile::new().unwrap().path(),
            WriterOptions::default(),
        )
        .unwrap();
        assert!(layout.add_column(ColumnDef::new("x", ColumnType::Bool)).is_err());
        writer.close().unwrap();
        assert!(layout.add_column(ColumnDef::new("x", ColumnType::Bool)).is_ok());
    }

    #[test]
    fn double_close_is_a_no_op() {
        let mut writer = Writer::open(
            layout(),
            tempfile::NamedTempFile::new().unwrap().path(),
            WriterOptions::default(),
        )
        .unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn write_and_read_back_three_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.bcsv");
        let layout = layout();
        let mut writer = Writer::open(layout.clone(), &path, WriterOptions::default()).unwrap();
        for (id, name) in [(1i32, "Alice"), (2, "Bob"), (3, "")] {
            writer.row().set::<i32>(0, id).unwrap();
            writer.row().set_string(1, name).unwrap();
            writer.write_row().unwrap();
        }
        writer.close().unwrap();

        let mut reader = Reader::open(&path).unwrap();
        let mut got = Vec::new();
        while reader.read_next().unwrap() {
            let row = reader.row();
            got.push((row.get::<i32>(0).unwrap(), row.get_str(1).unwrap().to_string()));
        }
        assert_eq!(
            got,
            vec![(1, "Alice".to_string()), (2, "Bob".to_string()), (3, "".to_string())]
        );
    }
}
