//! Concrete seed scenarios S1-S6.

use bcsv::{ColumnDef, ColumnType, CodecKind, DirectReader, Layout, LayoutHandle, Reader, Writer, WriterOptions};

fn s1_layout() -> LayoutHandle {
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
fn s1_flat_four_column_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s1.bcsv");
    let layout = s1_layout();
    let rows = [(1i32, "Alice", 95.5f32, true), (2, "Bob", 87.2, false), (3, "", 0.0, false)];

    let mut writer = Writer::open(
        layout.clone(),
        &path,
        WriterOptions {
            compression_level: 1,
            block_size_kb: 64,
            ..Default::default()
        },
    )
    .unwrap();
    for (id, name, score, active) in rows {
        writer.row().set::<i32>(0, id).unwrap();
        writer.row().set_string(1, name).unwrap();
        writer.row().set::<f32>(2, score).unwrap();
        writer.row().set::<bool>(3, active).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::open(&path).unwrap();
    let mut got = Vec::new();
    while reader.read_next().unwrap() {
        let row = reader.row();
        got.push((
            row.get::<i32>(0).unwrap(),
            row.get_str(1).unwrap().to_string(),
            row.get::<f32>(2).unwrap(),
            row.get::<bool>(3).unwrap(),
        ));
    }
    assert_eq!(got.len(), 3);
    for ((id, name, score, active), (gid, gname, gscore, gactive)) in rows.iter().zip(got.iter()) {
        assert_eq!(*id, *gid);
        assert_eq!(*name, gname);
        assert_eq!(*score, *gscore);
        assert_eq!(*active, *gactive);
    }
}

#[test]
fn s2_zoh_time_series() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s2.bcsv");
    let layout = s1_layout();

    let rows: Vec<(i32, &str, f32, bool)> = vec![
        (1, "Alice", 95.5, true),
        (2, "Alice", 95.5, true),
        (3, "Alice", 95.5, true),
        (9, "Carol", 10.0, false),
        (9, "Carol", 42.0, false),
        (9, "Dave", 42.0, false),
        (9, "Dave", 42.0, true),
        (1, "Alice", 95.5, true),
    ];

    let mut writer = Writer::open(
        layout.clone(),
        &path,
        WriterOptions {
            codec: CodecKind::ZeroOrderHold,
            ..Default::default()
        },
    )
    .unwrap();
    for (id, name, score, active) in &rows {
        writer.row().set::<i32>(0, *id).unwrap();
        writer.row().set_string(1, *name).unwrap();
        writer.row().set::<f32>(2, *score).unwrap();
        writer.row().set::<bool>(3, *active).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::open(&path).unwrap();
    let mut count = 0;
    while reader.read_next().unwrap() {
        let row = reader.row();
        let (id, name, score, active) = rows[count];
        assert_eq!(row.get::<i32>(0), Some(id));
        assert_eq!(row.get_str(1), Some(name));
        assert_eq!(row.get::<f32>(2), Some(score));
        assert_eq!(row.get::<bool>(3), Some(active));
        count += 1;
    }
    assert_eq!(count, 8);

    // Not required for correctness, but ZoH should beat Flat on this
    // heavily-repetitive input.
    let flat_path = dir.path().join("s2_flat.bcsv");
    let mut flat_writer = Writer::open(layout, &flat_path, WriterOptions::default()).unwrap();
    for (id, name, score, active) in &rows {
        flat_writer.row().set::<i32>(0, *id).unwrap();
        flat_writer.row().set_string(1, *name).unwrap();
        flat_writer.row().set::<f32>(2, *score).unwrap();
        flat_writer.row().set::<bool>(3, *active).unwrap();
        flat_writer.write_row().unwrap();
    }
    flat_writer.close().unwrap();
    let zoh_size = std::fs::metadata(&path).unwrap().len();
    let flat_size = std::fs::metadata(&flat_path).unwrap().len();
    assert!(zoh_size <= flat_size, "ZoH ({zoh_size}) should not exceed Flat ({flat_size}) on repetitive input");
}

#[test]
fn s3_direct_access() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s3.bcsv");
    let layout = Layout::from_columns(vec![
        ColumnDef::new("id", ColumnType::Int32),
        ColumnDef::new("value", ColumnType::Float64),
    ])
    .unwrap()
    .shared();

    let mut writer = Writer::open(
        layout,
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

    let mut reader = DirectReader::open(&path).unwrap();
    assert_eq!(reader.row_count(), 10_000);
    for i in [0u64, 5000, 9999, 10] {
        let row = reader.read(i).unwrap();
        assert_eq!(row.get::<i32>(0), Some(i as i32));
        assert_eq!(row.get::<f64>(1), Some(i as f64 * 1.5));
    }
}

#[test]
fn s4_structural_lock() {
    let layout = s1_layout();
    let mut writer = Writer::open(
        layout.clone(),
        tempfile::NamedTempFile::new().unwrap().path(),
        WriterOptions::default(),
    )
    .unwrap();

    assert!(layout.add_column(ColumnDef::new("extra", ColumnType::Bool)).is_err());
    assert!(layout.remove_column(0).is_err());
    assert!(layout.set_column_name(0, "renamed").is_ok());
    assert_eq!(layout.column_name(0).as_deref(), Some("renamed"));

    writer.close().unwrap();
    assert!(layout.add_column(ColumnDef::new("extra", ColumnType::Bool)).is_ok());
}

#[test]
fn s5_stream_mode_no_footer_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s5.bcsv");
    let layout = Layout::from_columns(vec![ColumnDef::new("id", ColumnType::Int32)])
        .unwrap()
        .shared();

    let mut writer = Writer::open(
        layout,
        &path,
        WriterOptions {
            stream_mode: true,
            block_size_kb: bcsv::config::MIN_BLOCK_SIZE_KB,
            ..Default::default()
        },
    )
    .unwrap();
    for i in 0..1000i32 {
        writer.row().set::<i32>(0, i).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    assert!(DirectReader::open(&path).is_err());

    let mut reader = Reader::open(&path).unwrap();
    let mut count = 0;
    while reader.read_next().unwrap() {
        assert_eq!(reader.row().get::<i32>(0), Some(count as i32));
        count += 1;
    }
    assert_eq!(count, 1000);
}

#[test]
fn s6_batch_parity() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::from_columns(vec![
        ColumnDef::new("id", ColumnType::Int32),
        ColumnDef::new("value", ColumnType::Float64),
    ])
    .unwrap()
    .shared();

    let write_all = |path: &std::path::Path, batch: bool| {
        let mut writer = Writer::open(
            layout.clone(),
            path,
            WriterOptions {
                batch_compress: batch,
                compression_level: 1,
                block_size_kb: bcsv::config::MIN_BLOCK_SIZE_KB,
                ..Default::default()
            },
        )
        .unwrap();
        for i in 0..100_000i32 {
            writer.row().set::<i32>(0, i).unwrap();
            writer.row().set::<f64>(1, i as f64).unwrap();
            writer.write_row().unwrap();
        }
        writer.close().unwrap();
    };

    let batch_path = dir.path().join("s6_batch.bcsv");
    let single_path = dir.path().join("s6_single.bcsv");
    write_all(&batch_path, true);
    write_all(&single_path, false);

    let batch_bytes = std::fs::read(&batch_path).unwrap();
    let single_bytes = std::fs::read(&single_path).unwrap();
    assert_eq!(batch_bytes, single_bytes, "batch and single-threaded output must be byte-identical");
}
