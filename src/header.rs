//! The BCSV file header: magic, format version, flags, compression level,
//! block size, and the column-definition table.

use std::io::{self, Read, Write};

use crate::codec::CodecKind;
use crate::error::{BcsvError, Result};
use crate::layout::{ColumnDef, ColumnType, Layout, LayoutHandle};
use crate::xxhash::xxh32_oneshot;

pub const MAGIC: &[u8; 4] = b"BCSV";
pub const FORMAT_VERSION: u16 = 1;

/// `FileFlags` bit values. Exactly one of the codec bits
/// (`ZERO_ORDER_HOLD`, `DELTA_ENCODING`) is set; Flat is their absence.
pub mod flags {
    pub const ZERO_ORDER_HOLD: u16 = 1;
    pub const NO_FILE_INDEX: u16 = 2;
    pub const STREAM_MODE: u16 = 4;
    pub const BATCH_COMPRESS: u16 = 8;
    pub const DELTA_ENCODING: u16 = 16;
}

impl CodecKind {
    pub(crate) fn from_flags(f: u16) -> Result<Self> {
        match (f & flags::ZERO_ORDER_HOLD != 0, f & flags::DELTA_ENCODING != 0) {
            (false, false) => Ok(CodecKind::Flat),
            (true, false) => Ok(CodecKind::ZeroOrderHold),
            (false, true) => Ok(CodecKind::Delta),
            (true, true) => Err(BcsvError::header(
                "flags set both ZERO_ORDER_HOLD and DELTA_ENCODING",
            )),
        }
    }

    pub(crate) fn to_flag_bit(self) -> u16 {
        match self {
            CodecKind::Flat => 0,
            CodecKind::ZeroOrderHold => flags::ZERO_ORDER_HOLD,
            CodecKind::Delta => flags::DELTA_ENCODING,
        }
    }
}

/// In-memory representation of `FileHeader`.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub flags: u16,
    pub compression_lvl: u8,
    pub block_size_kb: u16,
    pub columns: Vec<ColumnDef>,
}

impl FileHeader {
    pub fn new(
        codec: CodecKind,
        compression_lvl: u8,
        block_size_kb: u16,
        stream_mode: bool,
        no_file_index: bool,
        batch_compress: bool,
        columns: Vec<ColumnDef>,
    ) -> Self {
        let mut flags = codec.to_flag_bit();
        if stream_mode {
            flags |= self::flags::STREAM_MODE;
        }
        if no_file_index || stream_mode {
            flags |= self::flags::NO_FILE_INDEX;
        }
        if batch_compress {
            flags |= self::flags::BATCH_COMPRESS;
        }
        Self {
            flags,
            compression_lvl,
            block_size_kb,
            columns,
        }
    }

    pub fn codec_kind(&self) -> Result<CodecKind> {
        CodecKind::from_flags(self.flags)
    }

    pub fn stream_mode(&self) -> bool {
        self.flags & self::flags::STREAM_MODE != 0
    }

    pub fn has_file_index(&self) -> bool {
        self.flags & self::flags::NO_FILE_INDEX == 0 && !self.stream_mode()
    }

    pub fn batch_compress(&self) -> bool {
        self.flags & self::flags::BATCH_COMPRESS != 0
    }

    pub fn to_layout(&self) -> Result<LayoutHandle> {
        Ok(Layout::from_columns(self.columns.clone())?.shared())
    }

    fn body_bytes(&self) -> Result<Vec<u8>> {
        if self.columns.len() > u16::MAX as usize {
            return Err(BcsvError::invalid_argument("column count exceeds 2^16"));
        }
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.push(self.compression_lvl);
        buf.extend_from_slice(&self.block_size_kb.to_le_bytes());
        buf.extend_from_slice(&(self.columns.len() as u16).to_le_bytes());
        for col in &self.columns {
            buf.push(col.ty.wire_id());
            let name_bytes = col.name.as_bytes();
            if name_bytes.len() > u16::MAX as usize {
                return Err(BcsvError::invalid_argument("column name too long"));
            }
            buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
            buf.extend_from_slice(name_bytes);
        }
        Ok(buf)
    }

    pub fn write_to(&self, w: &mut impl Write) -> Result<()> {
        let body = self.body_bytes()?;
        let crc = xxh32_oneshot(&body, 0);
        w.write_all(&body)?;
        w.write_all(&crc.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from(r: &mut impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        read_exact_or_eof(r, &mut magic)?;
        if &magic != MAGIC {
            return Err(BcsvError::header("bad magic, not a BCSV file"));
        }
        let mut body = Vec::new();
        body.extend_from_slice(&magic);

        let format_version = read_u16(r, &mut body)?;
        if format_version != FORMAT_VERSION {
            return Err(BcsvError::header(format!(
                "unsupported format version {format_version}"
            )));
        }
        let header_flags = read_u16(r, &mut body)?;
        let compression_lvl = read_u8(r, &mut body)?;
        let block_size_kb = read_u16(r, &mut body)?;
        let column_count = read_u16(r, &mut body)? as usize;

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let type_id = read_u8(r, &mut body)?;
            let ty = ColumnType::from_wire(type_id)?;
            let name_len = read_u16(r, &mut body)? as usize;
            let mut name_bytes = vec![0u8; name_len];
            r.read_exact(&mut name_bytes)?;
            body.extend_from_slice(&name_bytes);
            let name = String::from_utf8(name_bytes)
                .map_err(|_| BcsvError::header("column name is not valid UTF-8"))?;
            columns.push(ColumnDef::new(name, ty));
        }

        let mut crc_bytes = [0u8; 4];
        r.read_exact(&mut crc_bytes)?;
        let expected_crc = u32::from_le_bytes(crc_bytes);
        let actual_crc = xxh32_oneshot(&body, 0);
        if actual_crc != expected_crc {
            return Err(BcsvError::header("header checksum mismatch"));
        }

        Ok(Self {
            flags: header_flags,
            compression_lvl,
            block_size_kb,
            columns,
        })
    }
}

fn read_exact_or_eof(r: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    match r.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(BcsvError::header("file is shorter than a BCSV header"))
        }
        Err(e) => Err(e.into()),
    }
}

fn read_u8(r: &mut impl Read, body: &mut Vec<u8>) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    body.extend_from_slice(&b);
    Ok(b[0])
}

fn read_u16(r: &mut impl Read, body: &mut Vec<u8>) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    body.extend_from_slice(&b);
    Ok(u16::from_le_bytes(b))
}
