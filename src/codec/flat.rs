//! Baseline row codec: no change mask, no cross-row state.

use super::{decode_column_value, encode_column_value, RowCodec};
use crate::error::Result;
use crate::layout::{ColumnType, LayoutHandle};
use crate::row::Row;

/// Fixed-width fields in column order, then each string payload prefixed by
/// a `u16` length.
pub struct FlatCodec {
    layout: Option<LayoutHandle>,
}

impl FlatCodec {
    pub fn new() -> Self {
        Self { layout: None }
    }
}

impl Default for FlatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RowCodec for FlatCodec {
    fn setup(&mut self, layout: LayoutHandle) {
        self.layout = Some(layout);
    }

    fn encode(&mut self, row: &Row, out: &mut Vec<u8>) -> Result<()> {
        let count = row.layout().column_count();
        // Fixed-width fields first, in column order, then string payloads,
        // also in column order: the wire image is grouped by kind, not
        // interleaved at each column's position.
        for i in 0..count {
            if row.layout().column_type(i).expect("valid column index") != ColumnType::String {
                encode_column_value(row, i, out);
            }
        }
        for i in 0..count {
            if row.layout().column_type(i).expect("valid column index") == ColumnType::String {
                encode_column_value(row, i, out);
            }
        }
        Ok(())
    }

    fn decode(&mut self, input: &[u8], pos: usize, row: &mut Row) -> Result<usize> {
        let count = row.layout().column_count();
        let mut consumed = 0usize;
        for i in 0..count {
            if row.layout().column_type(i).expect("valid column index") != ColumnType::String {
                consumed += decode_column_value(input, pos + consumed, row, i)?;
            }
        }
        for i in 0..count {
            if row.layout().column_type(i).expect("valid column index") == ColumnType::String {
                consumed += decode_column_value(input, pos + consumed, row, i)?;
            }
        }
        Ok(consumed)
    }

    fn reset(&mut self) {
        // Flat carries no cross-row state.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ColumnDef, ColumnType, Layout};

    fn layout() -> LayoutHandle {
        Layout::from_columns(vec![
            ColumnDef::new("id", ColumnType::Int32),
            ColumnDef::new("name", ColumnType::String),
            ColumnDef::new("score", ColumnType::Float32),
            ColumnDef::new("active", ColumnType::Bool),
        ])
        .unwrap()
        .shared()
    }

    #[test]
    fn round_trip_three_rows() {
        let layout = layout();
        let mut codec = FlatCodec::new();
        codec.setup(layout.clone());

        let rows_in = [
            (1i32, "Alice", 95.5f32, true),
            (2, "Bob", 87.2, false),
            (3, "", 0.0, false),
        ];
        let mut buf = Vec::new();
        for (id, name, score, active) in rows_in {
            let mut row = Row::new(layout.clone());
            row.set::<i32>(0, id).unwrap();
            row.set_string(1, name).unwrap();
            row.set::<f32>(2, score).unwrap();
            row.set::<bool>(3, active).unwrap();
            codec.encode(&row, &mut buf).unwrap();
        }

        let mut pos = 0;
        let mut decoded = Vec::new();
        let mut row = Row::new(layout.clone());
        for _ in 0..3 {
            pos += codec.decode(&buf, pos, &mut row).unwrap();
            decoded.push((
                row.get::<i32>(0).unwrap(),
                row.get_str(1).unwrap().to_string(),
                row.get::<f32>(2).unwrap(),
                row.get::<bool>(3).unwrap(),
            ));
        }
        assert_eq!(pos, buf.len());
        assert_eq!(decoded[0], (1, "Alice".to_string(), 95.5, true));
        assert_eq!(decoded[1], (2, "Bob".to_string(), 87.2, false));
        assert_eq!(decoded[2], (3, "".to_string(), 0.0, false));
    }

    /// The wire image groups all fixed-width fields first, in column order,
    /// then all string payloads, in column order — not interleaved at each
    /// column's own position.
    #[test]
    fn fixed_fields_are_grouped_before_strings() {
        let layout = layout();
        let mut codec = FlatCodec::new();
        codec.setup(layout.clone());

        let mut row = Row::new(layout);
        row.set::<i32>(0, 7).unwrap();
        row.set_string(1, "hello").unwrap();
        row.set::<f32>(2, 2.5).unwrap();
        row.set::<bool>(3, true).unwrap();

        let mut buf = Vec::new();
        codec.encode(&row, &mut buf).unwrap();

        // id(4) + score(4) + active(1) = 9 bytes of fixed fields, then the
        // string's u16 length prefix followed by its bytes.
        let fixed_bytes = 4 + 4 + 1;
        assert_eq!(&buf[0..4], &7i32.to_le_bytes());
        assert_eq!(&buf[4..8], &2.5f32.to_le_bytes());
        assert_eq!(buf[8], 1u8);
        let str_len = u16::from_le_bytes(buf[fixed_bytes..fixed_bytes + 2].try_into().unwrap());
        assert_eq!(str_len, 5);
        assert_eq!(&buf[fixed_bytes + 2..fixed_bytes + 2 + 5], b"hello");
        assert_eq!(buf.len(), fixed_bytes + 2 + 5);
    }
}
