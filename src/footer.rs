//! End-of-file packet index.
//!
//! Same header-body-then-crc shape `header.rs` uses, plus a fixed-size
//! trailer trick: the last 16 bytes of the file are always `footer_magic
//! (4) + footer_crc (4) + index_offset (8)`, so `DirectReader::open` can
//! seek to `EOF - 16`, read that trailer, then seek to `index_offset` and
//! read forward to the start of the trailer for the entry table — the
//! footer is located in at most two reads regardless of file size.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{BcsvError, Result};
use crate::packet::{PacketIndexEntry, PACKET_INDEX_ENTRY_BYTES};
use crate::xxhash::xxh32_oneshot;

pub const FOOTER_MAGIC: &[u8; 4] = b"BIDX";

/// Size of the fixed trailer written at the very end of the file:
/// `footer_magic(4) + footer_crc(4) + index_offset(8)`.
pub const FOOTER_TRAILER_BYTES: usize = 4 + 4 + 8;

#[derive(Debug, Clone, Default)]
pub struct Footer {
    pub entries: Vec<PacketIndexEntry>,
}

impl Footer {
    pub fn new(entries: Vec<PacketIndexEntry>) -> Self {
        Self { entries }
    }

    pub fn row_count(&self) -> u64 {
        self.entries.iter().map(|e| e.row_count as u64).sum()
    }

    /// Writes the footer at the file's current position:
    /// `index_entry_count`, `entries`, `footer_magic`, `footer_crc`,
    /// `index_offset`, in that wire order. `index_offset` is the absolute
    /// offset of `index_entry_count`, i.e. the position the file cursor is
    /// at right now.
    pub fn write_to<W: Write + Seek>(&self, w: &mut W) -> Result<()> {
        if self.entries.len() > u32::MAX as usize {
            return Err(BcsvError::invalid_argument("too many packets for one footer"));
        }
        let index_offset = w.stream_position()?;

        let mut body = Vec::with_capacity(4 + self.entries.len() * PACKET_INDEX_ENTRY_BYTES + 4);
        body.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            e.write_to(&mut body)?;
        }
        body.extend_from_slice(FOOTER_MAGIC);
        let footer_crc = xxh32_oneshot(&body, 0);

        w.write_all(&body)?;
        w.write_all(&footer_crc.to_le_bytes())?;
        w.write_all(&index_offset.to_le_bytes())?;
        Ok(())
    }

    /// Locates and parses the footer from a file opened for random access,
    /// in two reads: the fixed trailer at `EOF - 16`, then the
    /// variable-length body at `[index_offset, EOF - 16)`.
    pub fn read_from<R: Read + Seek>(r: &mut R) -> Result<Self> {
        let file_len = r.seek(SeekFrom::End(0))?;
        if file_len < FOOTER_TRAILER_BYTES as u64 {
            return Err(BcsvError::header("file too short to contain a footer"));
        }
        r.seek(SeekFrom::End(-(FOOTER_TRAILER_BYTES as i64)))?;
        let mut trailer = [0u8; FOOTER_TRAILER_BYTES];
        r.read_exact(&mut trailer)?;
        if &trailer[0..4] != FOOTER_MAGIC {
            return Err(BcsvError::header("missing or corrupt footer magic"));
        }
        let expected_crc = u32::from_le_bytes(trailer[4..8].try_into().unwrap());
        let index_offset = u64::from_le_bytes(trailer[8..16].try_into().unwrap());

        let trailer_start = file_len - FOOTER_TRAILER_BYTES as u64;
        if index_offset > trailer_start {
            return Err(BcsvError::header("footer index_offset points past the trailer"));
        }
        let body_len = (trailer_start - index_offset) as usize;
        r.seek(SeekFrom::Start(index_offset))?;
        let mut body = vec![0u8; body_len];
        r.read_exact(&mut body)?;

        if body.len() < 4 + 4 || &body[body.len() - 4..] != FOOTER_MAGIC {
            return Err(BcsvError::header("footer body missing trailing magic"));
        }
        let actual_crc = xxh32_oneshot(&body, 0);
        if actual_crc != expected_crc {
            return Err(BcsvError::header("footer checksum mismatch"));
        }

        let entry_count = u32::from_le_bytes(body[0..4].try_into().unwrap()) as usize;
        let mut cursor = std::io::Cursor::new(&body[4..body.len() - 4]);
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            entries.push(PacketIndexEntry::read_from(&mut cursor)?);
        }
        Ok(Self { entries })
    }

    /// Binary-searches for the entry containing row `i`.
    pub fn entry_for_row(&self, i: u64) -> Option<(usize, &PacketIndexEntry)> {
        self.entries
            .binary_search_by(|e| {
                if i < e.first_row_number as u64 {
                    std::cmp::Ordering::Greater
                } else if i > e.last_row_number() as u64 {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
            .map(|idx| (idx, &self.entries[idx]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_entries() -> Vec<PacketIndexEntry> {
        vec![
            PacketIndexEntry {
                file_offset: 100,
                compressed_size: 40,
                uncompressed_size: 64,
                first_row_number: 0,
                row_count: 10,
                checksum: 0xAAAA,
            },
            PacketIndexEntry {
                file_offset: 160,
                compressed_size: 50,
                uncompressed_size: 64,
                first_row_number: 10,
                row_count: 5,
                checksum: 0xBBBB,
            },
        ]
    }

    #[test]
    fn footer_round_trips() {
        let mut buf = Cursor::new(Vec::new());
        buf.write_all(&[0u8; 100]).unwrap(); // pretend packets already written
        let footer = Footer::new(sample_entries());
        footer.write_to(&mut buf).unwrap();

        let mut reader = Cursor::new(buf.into_inner());
        let parsed = Footer::read_from(&mut reader).unwrap();
        assert_eq!(parsed.entries, footer.entries);
        assert_eq!(parsed.row_count(), 15);
    }

    #[test]
    fn entry_for_row_binary_search() {
        let footer = Footer::new(sample_entries());
        assert_eq!(footer.entry_for_row(0).unwrap().0, 0);
        assert_eq!(footer.entry_for_row(9).unwrap().0, 0);
        assert_eq!(footer.entry_for_row(10).unwrap().0, 1);
        assert_eq!(footer.entry_for_row(14).unwrap().0, 1);
        assert!(footer.entry_for_row(15).is_none());
    }

    #[test]
    fn corrupted_footer_crc_is_rejected() {
        let mut buf = Cursor::new(Vec::new());
        let footer = Footer::new(sample_entries());
        footer.write_to(&mut buf).unwrap();
        let mut bytes = buf.into_inner();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let mut reader = Cursor::new(bytes);
        assert!(Footer::read_from(&mut reader).is_err());
    }

    #[test]
    fn too_short_file_is_rejected() {
        let mut reader = Cursor::new(vec![0u8; 4]);
        assert!(Footer::read_from(&mut reader).is_err());
    }
}
