use std::path::Path;

use archio::archive::{
    read_header_info, ArchiveReader, ArchiveWriter, ByteOrder, Component, Matrix, ScalarType, Schema, StorageOrder,
    Value,
};
use archio::strategy::{AccessPattern, IoMethod, IoStrategy, OpenMode, StrategyConfig};
use archio::{Error, Handle};
use tempfile::tempdir;

fn sample_schema() -> Schema {
    Schema::new(vec![
        Component::Scalar(ScalarType::F64),
        Component::Vector {
            scalar: ScalarType::F64,
            len: 37,
        },
        Component::Matrix {
            scalar: ScalarType::F64,
            rows: 13,
            cols: 37,
            order: StorageOrder::RowMajor,
        },
        Component::Matrix {
            scalar: ScalarType::I16,
            rows: 38,
            cols: 53,
            order: StorageOrder::RowMajor,
        },
        Component::Vector {
            scalar: ScalarType::I8,
            len: 4,
        },
        Component::Scalar(ScalarType::I32),
    ])
    .expect("valid schema")
}

fn sample_element(i: usize) -> Vec<Value> {
    let base = i as f64;
    vec![
        Value::scalar(base * 1.5),
        Value::vector((0..37).map(|k| base + k as f64 / 8.0).collect::<Vec<_>>()),
        Value::from(Matrix::from_fn(13, 37, StorageOrder::RowMajor, |r, c| {
            base * 1000.0 + (r * 37 + c) as f64
        })),
        Value::from(Matrix::from_fn(38, 53, StorageOrder::RowMajor, |r, c| {
            (r as i16 - 19) * 53 + c as i16 - i as i16
        })),
        Value::vector(vec![-1i8, 0, 1, i as i8]),
        Value::scalar(i as i32 * -7),
    ]
}

fn write_archive(path: &Path, order: ByteOrder, count: usize) -> u64 {
    let config = StrategyConfig::for_host();
    let strategy = IoStrategy::for_path(path, OpenMode::CreateOrReplace, AccessPattern::Sequential, None, &config)
        .expect("strategy");
    let handle = Handle::open(path, OpenMode::CreateOrReplace, &strategy).expect("open for write");
    let mut writer = ArchiveWriter::new_with_order(&handle, sample_schema(), order).expect("writer");
    for i in 0..count {
        writer.push(&sample_element(i)).expect("push");
    }
    let written = writer.finish().expect("finish");
    handle.close().expect("close");
    written
}

fn open_for_read(path: &Path) -> Handle {
    let config = StrategyConfig::for_host();
    let strategy =
        IoStrategy::for_path(path, OpenMode::Read, AccessPattern::Sequential, None, &config).expect("strategy");
    Handle::open(path, OpenMode::Read, &strategy).expect("open for read")
}

/// Compares logical contents; matrix storage order may differ.
fn assert_same_element(got: &[Value], want: &[Value]) {
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(want) {
        match (g.as_matrix(), w.as_matrix()) {
            (Some(gm), Some(wm)) => {
                assert_eq!((gm.rows(), gm.cols()), (wm.rows(), wm.cols()));
                for r in 0..wm.rows() {
                    for c in 0..wm.cols() {
                        assert_eq!(gm.value(r, c), wm.value(r, c), "cell ({r}, {c})");
                    }
                }
            }
            _ => assert_eq!(g, w),
        }
    }
}

#[test]
fn header_size_counts_descriptors() {
    let schema = Schema::new(vec![
        Component::Scalar(ScalarType::F64),
        Component::Vector {
            scalar: ScalarType::F64,
            len: 10,
        },
        Component::Matrix {
            scalar: ScalarType::F64,
            rows: 10,
            cols: 10,
            order: StorageOrder::RowMajor,
        },
    ])
    .expect("valid schema");
    assert_eq!(schema.header_size(), 30);
    assert_eq!(schema.element_size(), 8 + 80 + 800);
}

#[test]
fn mixed_tuple_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mixed.arc");
    assert_eq!(write_archive(&path, ByteOrder::native(), 12), 12);

    let schema = sample_schema();
    let expected_len = schema.header_size() as u64 + 12 * schema.element_size() as u64;
    assert_eq!(std::fs::metadata(&path).expect("metadata").len(), expected_len);

    let handle = open_for_read(&path);
    let mut reader = ArchiveReader::new(&handle, sample_schema()).expect("reader");
    assert_eq!(reader.element_count(), 12);
    assert!(!reader.state().flip_integers());
    let mut seen = 0;
    while let Some(element) = reader.next_element().expect("element") {
        assert_eq!(element, &sample_element(seen)[..]);
        seen += 1;
    }
    assert_eq!(seen, 12);
    assert!(reader.diagnostics().is_empty());
}

#[test]
fn transposed_schema_reads_the_same_values() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("transposed.arc");
    write_archive(&path, ByteOrder::native(), 5);

    let handle = open_for_read(&path);
    let mut reader = ArchiveReader::new(&handle, sample_schema().transposed_storage()).expect("reader");
    assert!(reader.state().is_transposed(2));
    assert!(reader.state().is_transposed(3));
    assert!(!reader.state().is_transposed(0));

    let element = reader.read_element(3).expect("element").to_vec();
    assert_same_element(&element, &sample_element(3));
    assert_eq!(element[2].as_matrix().map(Matrix::order), Some(StorageOrder::RowMajor));

    reader.state_mut().set_materialize(true);
    let element = reader.read_element(4).expect("element").to_vec();
    assert_same_element(&element, &sample_element(4));
    assert_eq!(element[3].as_matrix().map(Matrix::order), Some(StorageOrder::ColumnMajor));
}

#[test]
fn foreign_byte_order_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("foreign.arc");
    write_archive(&path, ByteOrder::foreign(), 4);

    let handle = open_for_read(&path);
    let info = read_header_info(&handle).expect("header info");
    assert_eq!(info.byte_order, ByteOrder::foreign());
    assert_eq!(info.element_count, 4);

    let mut reader = ArchiveReader::new(&handle, sample_schema()).expect("reader");
    assert!(reader.state().flip_integers());
    assert!(reader.state().flip_floats());
    for i in (0..4).rev() {
        assert_eq!(reader.read_element(i as u64).expect("element"), &sample_element(i)[..]);
    }
}

#[test]
fn split_byte_order_round_trip() {
    let dir = tempdir().expect("tempdir");
    for (name, flags) in [("int-big.arc", 0x01u8), ("float-big.arc", 0x10)] {
        let path = dir.path().join(name);
        let order = ByteOrder::from_flags(flags);
        write_archive(&path, order, 3);

        let handle = open_for_read(&path);
        let mut reader = ArchiveReader::new(&handle, sample_schema()).expect("reader");
        assert_eq!(reader.state().byte_order(), order);
        assert_ne!(reader.state().flip_integers(), reader.state().flip_floats());
        for i in 0..3 {
            assert_eq!(reader.read_element(i as u64).expect("element"), &sample_element(i)[..]);
        }
    }
}

#[test]
fn component_count_mismatch_is_fatal() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("count.arc");
    write_archive(&path, ByteOrder::native(), 1);

    let mut components = sample_schema().components().to_vec();
    components.pop();
    let shorter = Schema::new(components).expect("valid schema");

    let handle = open_for_read(&path);
    match ArchiveReader::new(&handle, shorter) {
        Err(Error::Format(message)) => assert!(message.contains("mismatching component extents"), "{message}"),
        result => panic!("expected a format error, got {result:?}"),
    };
}

#[test]
fn mapped_writer_round_trip() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mapped.arc");
    let schema = sample_schema();
    let count = 6u64;
    let total = schema.header_size() as u64 + count * schema.element_size() as u64;

    let config = StrategyConfig::for_host();
    let mut strategy =
        IoStrategy::for_path(&path, OpenMode::CreateOrReplace, AccessPattern::Sequential, Some(total), &config)
            .expect("strategy");
    strategy.set_write_method(IoMethod::Mapped).expect("mapped");
    let handle = Handle::open(&path, OpenMode::CreateOrReplace, &strategy).expect("open for write");
    let mut writer = ArchiveWriter::new(&handle, sample_schema()).expect("writer");
    for i in 0..count as usize {
        writer.push(&sample_element(i)).expect("push");
    }
    assert!(writer.push(&sample_element(99)).is_err());
    assert_eq!(writer.finish().expect("finish"), count);
    handle.close().expect("close");
    assert_eq!(std::fs::metadata(&path).expect("metadata").len(), total);

    let mut strategy =
        IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &config).expect("strategy");
    strategy.set_read_method(IoMethod::Mapped).expect("mapped");
    let handle = Handle::open(&path, OpenMode::Read, &strategy).expect("open for read");
    let mut reader = ArchiveReader::open_inspected(&handle).expect("reader");
    assert_eq!(reader.schema(), &sample_schema());
    assert_eq!(reader.element_count(), count);
    assert_eq!(reader.read_element(5).expect("element"), &sample_element(5)[..]);
    assert_eq!(reader.read_element(0).expect("element"), &sample_element(0)[..]);
}

#[test]
fn truncated_archive_reports_early_end() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("short.arc");
    write_archive(&path, ByteOrder::native(), 3);
    let schema = sample_schema();
    let cut = schema.header_size() as u64 + 2 * schema.element_size() as u64 + 10;
    std::fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .and_then(|f| f.set_len(cut))
        .expect("truncate");

    let handle = open_for_read(&path);
    let mut reader = ArchiveReader::new(&handle, sample_schema()).expect("reader");
    assert_eq!(reader.element_count(), 3);
    reader.read_element(1).expect("intact element");
    assert!(matches!(reader.read_element(2), Err(Error::Format(_))));
}
