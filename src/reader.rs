//! The sequential BCSV reader: parses the header, then decompresses and
//! decodes packets strictly in file order.
//!
//! Shares `packet::read_packet` with `direct_reader.rs` — both readers use
//! the same packet-framing code, differing only in how they locate the
//! next packet to decode.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::codec::RowCodec;
use crate::config;
use crate::error::{BcsvError, Result};
use crate::footer::Footer;
use crate::header::FileHeader;
use crate::layout::{LayoutHandle, StructuralLockGuard};
use crate::lz4::StreamDecompressor;
use crate::packet::read_packet;
use crate::row::Row;

/// Parses a file's header and hands back the bits a Reader and a
/// DirectReader both need: the layout, the codec kind, and the compression
/// level. Shared so the two readers can't drift on header interpretation.
pub(crate) fn open_header(path: &Path) -> Result<(File, FileHeader, LayoutHandle)> {
    if !path.exists() {
        return Err(BcsvError::not_found(path.display().to_string()));
    }
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(BcsvError::invalid_argument(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    let mut file = File::open(path)?;
    let header = FileHeader::read_from(&mut file)?;
    let layout = header.to_layout()?;
    Ok((file, header, layout))
}

/// Sequentially yields rows from a BCSV file.
pub struct Reader {
    file: BufReader<File>,
    layout: LayoutHandle,
    _lock: StructuralLockGuard,
    codec: Box<dyn RowCodec>,
    decompressor: Option<StreamDecompressor>,
    compression_lvl: u8,
    stream_mode: bool,
    row: Row,
    current_packet: Option<Vec<u8>>,
    packet_pos: usize,
    rows_left_in_packet: u32,
    /// Row count taken from the footer for non-stream-mode files. Without
    /// this, there is nothing to distinguish "next bytes are the footer"
    /// from "next bytes are a corrupt packet" once the last real packet has
    /// been consumed.
    total_rows: Option<u64>,
    rows_yielded: u64,
    eof: bool,
}

impl Reader {
    /// Opens `path` using whatever layout the file itself declares.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_impl(path.as_ref(), None)
    }

    /// Opens `path`, requiring the file's layout to be strictly compatible
    /// (same column count, types, and names in order) with `expected`
    /// (returns `LayoutIncompatible` on mismatch).
    pub fn open_expecting(path: impl AsRef<Path>, expected: &LayoutHandle) -> Result<Self> {
        Self::open_impl(path.as_ref(), Some(expected))
    }

    fn open_impl(path: &Path, expected: Option<&LayoutHandle>) -> Result<Self> {
        let (mut file, header, layout) = open_header(path)?;
        if let Some(expected) = expected {
            if !expected.is_strictly_compatible(&layout) {
                return Err(BcsvError::layout_incompatible(
                    "file layout does not match the expected layout",
                ));
            }
        }
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

        // A footer, when present, is the only reliable way to know where
        // packets end and the index begins; without it the last
        // `read_packet` call would try to parse the footer's bytes as
        // another packet header instead of seeing a clean EOF.
        let total_rows = if header.has_file_index() {
            use std::io::{Seek, SeekFrom};
            let data_start = file.stream_position()?;
            let footer = Footer::read_from(&mut file)?;
            file.seek(SeekFrom::Start(data_start))?;
            Some(footer.row_count())
        } else {
            None
        };

        log::debug!(
            "bcsv reader: opened {} (codec={:?}, compression_lvl={}, stream_mode={})",
            path.display(),
            codec_kind,
            header.compression_lvl,
            header.stream_mode(),
        );

        Ok(Self {
            file: BufReader::new(file),
            layout,
            _lock: lock,
            codec,
            decompressor,
            compression_lvl: header.compression_lvl,
            stream_mode: header.stream_mode(),
            row,
            current_packet: None,
            packet_pos: 0,
            rows_left_in_packet: 0,
            total_rows,
            rows_yielded: 0,
            eof: false,
        })
    }

    pub fn layout(&self) -> &LayoutHandle {
        &self.layout
    }

    /// The Reader's own Row, last populated by [`Reader::read_next`].
    /// Invalidated by the next `read_next()` call.
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Decodes the next row, or returns `false` at a clean end of file.
    /// For files with a footer, EOF is signaled once `rows_yielded` reaches
    /// the footer's row count, so the reader never tries to parse the
    /// footer's bytes as another packet. Stream-mode files have no footer;
    /// there EOF is a clean zero-byte read where a packet header is
    /// expected.
    pub fn read_next(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        if let Some(total) = self.total_rows {
            if self.rows_yielded >= total {
                self.eof = true;
                return Ok(false);
            }
        }
        loop {
            if self.rows_left_in_packet > 0 {
                let payload = self
                    .current_packet
                    .as_ref()
                    .expect("rows_left_in_packet > 0 implies a loaded packet");
                let consumed = self.codec.decode(payload, self.packet_pos, &mut self.row)?;
                self.packet_pos += consumed;
                self.rows_left_in_packet -= 1;
                self.rows_yielded += 1;
                return Ok(true);
            }

            match read_packet(&mut self.file, self.decompressor.as_mut(), self.compression_lvl)? {
                None => {
                    self.eof = true;
                    return Ok(false);
                }
                Some((header, payload)) => {
                    if !self.stream_mode {
                        self.codec.reset();
                    }
                    self.rows_left_in_packet = header.row_count;
                    self.packet_pos = 0;
                    self.current_packet = Some(payload);
                    if header.row_count == 0 {
                        // An empty packet is wasteful but not malformed; loop
                        // around to read the next one instead of returning
                        // a phantom row.
                        continue;
                    }
                }
            }
        }
    }
}
