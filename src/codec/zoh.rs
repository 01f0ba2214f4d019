//! Zero-order-hold row codec: emit only changed values.

use super::{decode_column_value, encode_column_value, RowCodec};
use crate::bitset::{pack_bits_to_bytes, unpack_bits_from_bytes, BitOps};
use crate::error::{BcsvError, Result};
use crate::layout::LayoutHandle;
use crate::row::Row;

/// Each row is prefixed with a packed change-mask bitset of `column_count`
/// bits; set bits mark columns present in this row's wire image. The first
/// row of every packet forces all bits set, so packets stay independently
/// decodable.
///
/// Relies on the Writer/Reader reusing the *same* [`Row`] instance across
/// calls: unchanged columns are simply never written into, so whatever
/// value is already sitting in the row's buffer from the previous
/// encode/decode call IS the zero-order-hold reconstruction. No separate
/// "previous row" state is kept here.
pub struct ZohCodec {
    layout: Option<LayoutHandle>,
    first_in_packet: bool,
}

impl ZohCodec {
    pub fn new() -> Self {
        Self {
            layout: None,
            first_in_packet: true,
        }
    }
}

impl Default for ZohCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RowCodec for ZohCodec {
    fn setup(&mut self, layout: LayoutHandle) {
        self.layout = Some(layout);
        self.first_in_packet = true;
    }

    fn encode(&mut self, row: &Row, out: &mut Vec<u8>) -> Result<()> {
        let count = row.layout().column_count();
        if self.first_in_packet {
            let mask = crate::bitset::DynBitset::with_all_set(count);
            out.extend_from_slice(&pack_bits_to_bytes(&mask));
            for i in 0..count {
                encode_column_value(row, i, out);
            }
            self.first_in_packet = false;
        } else {
            let mask = row.changes();
            out.extend_from_slice(&pack_bits_to_bytes(mask));
            for i in 0..count {
                if mask.test(i) {
                    encode_column_value(row, i, out);
                }
            }
        }
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
        for i in 0..count {
            if mask.test(i) {
                consumed += decode_column_value(input, pos + consumed, row, i)?;
            }
        }
        self.first_in_packet = false;
        Ok(consumed)
    }

    fn reset(&mut self) {
        self.first_in_packet = true;
    }
}
