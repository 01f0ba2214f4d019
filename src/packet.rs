//! Packets: a framed, checksummed run of encoded rows, and the in-memory
//! index entry describing where one lives on disk.
//!
//! `PacketHeader` frames one packet behind a header+checksum, the same
//! shape `block::compress`/`block::decompress_core` use to frame one LZ4
//! block; `flush_packet`/`read_packet` are the write/read halves of that
//! framing at the BCSV layer.

use std::io::{self, Read, Seek, Write};

use crate::error::{BcsvError, Result};
use crate::lz4::{StreamCompressor, StreamDecompressor};
use crate::xxhash::xxh32_oneshot;

pub const PACKET_MAGIC: &[u8; 4] = b"PKT1";

/// On-disk packet framing. 24 bytes.
pub const PACKET_HEADER_BYTES: usize = 4 + 4 + 4 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub row_count: u32,
    pub first_row_number: u32,
    pub payload_crc: u32,
}

impl PacketHeader {
    fn write_to(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(PACKET_MAGIC)?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        w.write_all(&self.row_count.to_le_bytes())?;
        w.write_all(&self.first_row_number.to_le_bytes())?;
        w.write_all(&self.payload_crc.to_le_bytes())?;
        Ok(())
    }

    /// Returns `Ok(None)` on a clean EOF (zero bytes read where a header was
    /// expected) — the sequential Reader's stream-mode end-of-file signal.
    pub fn read_from(r: &mut impl Read) -> Result<Option<Self>> {
        let mut magic = [0u8; 4];
        match read_fill(r, &mut magic)? {
            0 => return Ok(None),
            n if n < 4 => {
                return Err(BcsvError::packet("truncated packet header"));
            }
            _ => {}
        }
        if &magic != PACKET_MAGIC {
            return Err(BcsvError::packet("bad packet magic"));
        }
        let compressed_size = read_u32(r)?;
        let uncompressed_size = read_u32(r)?;
        let row_count = read_u32(r)?;
        let first_row_number = read_u32(r)?;
        let payload_crc = read_u32(r)?;
        Ok(Some(Self {
            compressed_size,
            uncompressed_size,
            row_count,
            first_row_number,
            payload_crc,
        }))
    }
}

/// One row of the file footer's packet index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketIndexEntry {
    pub file_offset: u64,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub first_row_number: u32,
    pub row_count: u32,
    pub checksum: u32,
}

pub const PACKET_INDEX_ENTRY_BYTES: usize = 8 + 4 + 4 + 4 + 4 + 4;

impl PacketIndexEntry {
    pub fn last_row_number(&self) -> u32 {
        self.first_row_number + self.row_count - 1
    }

    pub fn write_to(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(&self.file_offset.to_le_bytes())?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        w.write_all(&self.first_row_number.to_le_bytes())?;
        w.write_all(&self.row_count.to_le_bytes())?;
        w.write_all(&self.checksum.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from(r: &mut impl Read) -> Result<Self> {
        let mut buf = [0u8; PACKET_INDEX_ENTRY_BYTES];
        r.read_exact(&mut buf)?;
        Ok(Self {
            file_offset: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            compressed_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            uncompressed_size: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            first_row_number: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            row_count: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            checksum: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        })
    }
}

/// Compresses (or stores verbatim) one packet payload, writes it at the
/// file's current cursor position, and returns the index entry describing
/// it.
///
/// `compressor` is `None` when `compression_lvl == 0`, meaning the payload
/// is stored verbatim. Called from both the single-threaded Writer path and
/// the batch worker thread — it only needs `&mut File`, so either caller
/// can invoke it without sharing any other Writer state.
pub fn flush_packet<F: Write + Seek>(
    file: &mut F,
    compressor: Option<&mut StreamCompressor>,
    payload: &[u8],
    first_row_number: u32,
    row_count: u32,
    compression_lvl: u8,
) -> Result<PacketIndexEntry> {
    let checksum = xxh32_oneshot(payload, 0);
    let compressed: std::borrow::Cow<[u8]> = match compressor {
        Some(c) if compression_lvl > 0 => std::borrow::Cow::Owned(c.compress(payload, compression_lvl as i32)?),
        _ => std::borrow::Cow::Borrowed(payload),
    };

    let file_offset = file.stream_position()?;
    let header = PacketHeader {
        compressed_size: compressed.len() as u32,
        uncompressed_size: payload.len() as u32,
        row_count,
        first_row_number,
        payload_crc: checksum,
    };
    header.write_to(file)?;
    file.write_all(&compressed)?;

    Ok(PacketIndexEntry {
        file_offset,
        compressed_size: header.compressed_size,
        uncompressed_size: header.uncompressed_size,
        first_row_number,
        row_count,
        checksum,
    })
}

/// Reads one packet's header and payload at the reader's current cursor
/// position, decompresses it if needed, and verifies its checksum.
/// Returns `Ok(None)` at a clean stream-mode EOF. The header is returned
/// alongside the payload so the caller knows `row_count`/`first_row_number`
/// without a second parse.
pub fn read_packet<R: Read>(
    r: &mut R,
    decompressor: Option<&mut StreamDecompressor>,
    compression_lvl: u8,
) -> Result<Option<(PacketHeader, Vec<u8>)>> {
    let header = match PacketHeader::read_from(r)? {
        None => return Ok(None),
        Some(h) => h,
    };
    let mut compressed = vec![0u8; header.compressed_size as usize];
    r.read_exact(&mut compressed)?;

    let payload = if compression_lvl > 0 {
        let d = decompressor.ok_or_else(|| {
            BcsvError::packet("packet declares compression but no decompressor is configured")
        })?;
        d.decompress(&compressed, header.uncompressed_size as usize)?
    } else {
        compressed
    };

    if payload.len() != header.uncompressed_size as usize {
        return Err(BcsvError::packet(format!(
            "packet declared {} uncompressed bytes, got {}",
            header.uncompressed_size,
            payload.len()
        )));
    }
    let actual_crc = xxh32_oneshot(&payload, 0);
    if actual_crc != header.payload_crc {
        return Err(BcsvError::packet("packet checksum mismatch"));
    }
    Ok(Some((header, payload)))
}

fn read_fill(r: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match r.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn packet_round_trips_without_compression() {
        let mut file = Cursor::new(Vec::new());
        let payload = b"row row row your boat".to_vec();
        let entry = flush_packet(&mut file, None, &payload, 0, 3, 0).unwrap();
        assert_eq!(entry.file_offset, 0);
        assert_eq!(entry.row_count, 3);

        file.set_position(0);
        let (header, got) = read_packet(&mut file, None, 0).unwrap().unwrap();
        assert_eq!(got, payload);
        assert_eq!(header.row_count, 3);
    }

    #[test]
    fn packet_round_trips_with_compression() {
        let mut file = Cursor::new(Vec::new());
        let mut comp = StreamCompressor::new();
        let payload = vec![7u8; 4096];
        let entry = flush_packet(&mut file, Some(&mut comp), &payload, 0, 10, 1).unwrap();
        assert!(entry.compressed_size < entry.uncompressed_size);

        file.set_position(0);
        let mut decomp = StreamDecompressor::new(64 * 1024);
        let (_, got) = read_packet(&mut file, Some(&mut decomp), 1).unwrap().unwrap();
        assert_eq!(got, payload);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut file = Cursor::new(Vec::new());
        flush_packet(&mut file, None, b"hello", 0, 1, 0).unwrap();
        let mut bytes = file.into_inner();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut file = Cursor::new(bytes);
        assert!(read_packet(&mut file, None, 0).is_err());
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut file = Cursor::new(Vec::<u8>::new());
        assert!(read_packet(&mut file, None, 0).unwrap().is_none());
    }
}
