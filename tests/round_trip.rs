mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use columnar_bridge::*;
    use quickcheck_macros::quickcheck;
    use rstest::rstest;
    use std::io::Cursor;
    use tempdir::TempDir;

    #[derive(Debug, Clone, Copy)]
    enum Storage {
        Path,
        Memory,
        Seekable,
    }

    fn write_and_open(
        storage: Storage,
        groups: &[Vec<ColumnValues>],
        dir: &TempDir,
    ) -> ParquetFileReader {
        match storage {
            Storage::Path => {
                let path = dir.path().join("round_trip.parquet");
                let writer = ParquetFileWriter::create(
                    &path,
                    &sample_schema(),
                    &WriterProperties::default()
                        .with_compression(Compression::Uncompressed),
                )
                .unwrap();
                write_columns(&writer, groups);
                ParquetFileReader::open(&path).unwrap()
            }
            Storage::Memory => ParquetFileReader::from_bytes(
                encode(groups),
                &ReaderProperties::default(),
            )
            .unwrap(),
            Storage::Seekable => ParquetFileReader::from_reader(
                Cursor::new(encode(groups)),
                &ReaderProperties::default().with_read_ahead(512),
            )
            .unwrap(),
        }
    }

    #[rstest]
    #[case(Storage::Path)]
    #[case(Storage::Memory)]
    #[case(Storage::Seekable)]
    fn test_every_kind_survives(#[case] storage: Storage) {
        let dir = TempDir::new("round_trip").unwrap();
        let columns = sample_columns();
        let reader = write_and_open(storage, &[columns.clone()], &dir);

        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.num_rows().unwrap(), 4);
        assert_eq!(metadata.num_row_groups().unwrap(), 1);
        assert_eq!(metadata.schema().unwrap(), sample_schema());

        let row_group = reader.row_group(0).unwrap();
        assert_eq!(row_group.num_rows().unwrap(), 4);
        assert_eq!(row_group.read_all().unwrap(), columns);
    }

    #[rstest]
    #[case(Storage::Path)]
    #[case(Storage::Memory)]
    fn test_multiple_row_groups(#[case] storage: Storage) {
        let dir = TempDir::new("round_trip").unwrap();
        let first = sample_columns();
        let second: Vec<ColumnValues> = sample_columns()
            .into_iter()
            .map(|column| match column {
                ColumnValues::Int64(v) => {
                    ColumnValues::Int64(v.into_iter().rev().collect())
                }
                other => other,
            })
            .collect();
        let reader =
            write_and_open(storage, &[first.clone(), second.clone()], &dir);

        let metadata = reader.metadata().unwrap();
        assert_eq!(metadata.num_row_groups().unwrap(), 2);
        assert_eq!(metadata.num_rows().unwrap(), 8);
        assert_eq!(reader.row_group(1).unwrap().read_all().unwrap(), second);
        assert_eq!(reader.row_group(0).unwrap().read_column(2).unwrap(), first[2]);
    }

    #[test]
    fn test_empty_row_group() {
        let empty: Vec<ColumnValues> = vec![
            ColumnValues::Boolean(vec![]),
            ColumnValues::Int32(vec![]),
            ColumnValues::Int64(vec![]),
            ColumnValues::Float(vec![]),
            ColumnValues::Double(vec![]),
            ColumnValues::Utf8(vec![]),
            ColumnValues::Binary(vec![]),
        ];
        let reader = ParquetFileReader::from_bytes(
            encode(&[empty.clone()]),
            &ReaderProperties::default(),
        )
        .unwrap();
        assert_eq!(reader.metadata().unwrap().num_rows().unwrap(), 0);
        assert_eq!(reader.row_group(0).unwrap().read_all().unwrap(), empty);
    }

    #[test]
    fn test_created_by_is_recorded() {
        let buffer = SharedBuffer::new();
        let writer = ParquetFileWriter::to_sink(
            buffer.clone(),
            &sample_schema(),
            &WriterProperties::default().with_created_by("columnar-bridge tests"),
            true,
        )
        .unwrap();
        write_columns(&writer, &[sample_columns()]);

        let reader = ParquetFileReader::from_bytes(
            buffer.contents(),
            &ReaderProperties::default(),
        )
        .unwrap();
        assert_eq!(
            reader.metadata().unwrap().created_by().unwrap().as_deref(),
            Some("columnar-bridge tests")
        );
    }

    #[test]
    fn test_row_group_size_limit() {
        let writer = ParquetFileWriter::to_sink(
            SharedBuffer::new(),
            &sample_schema(),
            &WriterProperties::default().with_max_row_group_size(2),
            true,
        )
        .unwrap();
        let mut row_group = writer.append_row_group().unwrap();
        for column in sample_columns() {
            row_group.write_column(&column).unwrap();
        }
        let err = row_group.close().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(matches!(err, BridgeError::NativeCall { .. }));
    }

    #[test]
    fn test_writer_validates_before_native_call() {
        let writer = ParquetFileWriter::to_sink(
            SharedBuffer::new(),
            &sample_schema(),
            &WriterProperties::default(),
            true,
        )
        .unwrap();
        let mut row_group = writer.append_row_group().unwrap();

        let err = row_group
            .write_column(&ColumnValues::Int32(vec![Some(1)]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Argument(_)));

        let err = row_group
            .write_column(&ColumnValues::Boolean(vec![Some(true), None]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Argument(_)));

        row_group
            .write_column(&ColumnValues::Boolean(vec![Some(true), Some(false)]))
            .unwrap();
        let err = row_group
            .write_column(&ColumnValues::Int32(vec![Some(1)]))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Argument(_)));

        let err = row_group.close().unwrap_err();
        assert!(matches!(err, BridgeError::Argument(_)));
        assert_eq!(row_group.next_column(), 1);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new("round_trip").unwrap();
        let err = ParquetFileReader::open(dir.path().join("missing.parquet"))
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::Io);

        let err = ParquetFileReader::open("").err().unwrap();
        assert!(matches!(err, BridgeError::Argument(_)));
    }

    #[test]
    fn test_garbage_is_a_codec_error() {
        let err = ParquetFileReader::from_bytes(
            vec![7u8; 4096],
            &ReaderProperties::default(),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), ErrorCode::Codec);
    }

    #[quickcheck]
    fn prop_nullable_values_survive_round_trip(
        numbers: Vec<Option<i64>>,
        labels: Vec<Option<String>>,
    ) -> bool {
        let _ = env_logger::builder().is_test(true).try_init();
        let rows = numbers.len().min(labels.len());
        let columns = vec![
            ColumnValues::Int64(numbers[..rows].to_vec()),
            ColumnValues::Utf8(labels[..rows].to_vec()),
        ];
        let schema = Schema::new(vec![
            ColumnSpec::optional("number", ValueKind::Int64),
            ColumnSpec::optional("label", ValueKind::Utf8),
        ])
        .unwrap();

        let buffer = SharedBuffer::new();
        let writer = ParquetFileWriter::to_sink(
            buffer.clone(),
            &schema,
            &WriterProperties::default(),
            true,
        )
        .unwrap();
        write_columns(&writer, &[columns.clone()]);

        let reader = ParquetFileReader::from_bytes(
            buffer.contents(),
            &ReaderProperties::default(),
        )
        .unwrap();
        reader.metadata().unwrap().schema().unwrap() == schema
            && reader.row_group(0).unwrap().read_all().unwrap() == columns
    }
}
