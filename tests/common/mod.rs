#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use columnar_bridge::*;

pub fn sample_schema() -> Schema {
    Schema::new(vec![
        ColumnSpec::required("flag", ValueKind::Boolean),
        ColumnSpec::optional("small", ValueKind::Int32),
        ColumnSpec::required("big", ValueKind::Int64),
        ColumnSpec::optional("ratio", ValueKind::Float),
        ColumnSpec::required("measure", ValueKind::Double),
        ColumnSpec::optional("label", ValueKind::Utf8),
        ColumnSpec::optional("payload", ValueKind::Binary),
    ])
    .unwrap()
}

/// Boundary values and nulls for every kind of [`sample_schema`].
pub fn sample_columns() -> Vec<ColumnValues> {
    vec![
        ColumnValues::Boolean(vec![Some(true), Some(false), Some(true), Some(false)]),
        ColumnValues::Int32(vec![Some(i32::MIN), None, Some(0), Some(i32::MAX)]),
        ColumnValues::Int64(vec![Some(i64::MIN), Some(-1), Some(0), Some(i64::MAX)]),
        ColumnValues::Float(vec![
            Some(f32::MIN),
            Some(f32::MAX),
            None,
            Some(f32::INFINITY),
        ]),
        ColumnValues::Double(vec![
            Some(f64::MIN_POSITIVE),
            Some(f64::MAX),
            Some(-0.5),
            Some(f64::NEG_INFINITY),
        ]),
        ColumnValues::Utf8(vec![
            Some(String::new()),
            Some("héllo wörld".to_owned()),
            None,
            Some("x".repeat(1000)),
        ]),
        ColumnValues::Binary(vec![
            None,
            Some(vec![]),
            Some(vec![0, 255, 0]),
            Some((0..=255).collect()),
        ]),
    ]
}

pub fn write_columns(writer: &ParquetFileWriter, groups: &[Vec<ColumnValues>]) {
    for group in groups {
        let mut row_group = writer.append_row_group().unwrap();
        for column in group {
            row_group.write_column(column).unwrap();
        }
        row_group.close().unwrap();
    }
    writer.close().unwrap();
}

/// Encode `groups` into memory.
pub fn encode(groups: &[Vec<ColumnValues>]) -> Vec<u8> {
    let buffer = SharedBuffer::new();
    let writer = ParquetFileWriter::to_sink(
        buffer.clone(),
        &sample_schema(),
        &WriterProperties::default(),
        true,
    )
    .unwrap();
    write_columns(&writer, groups);
    buffer.contents()
}

/// Source that logs every call it receives.
pub struct EventSource {
    inner: MemorySource,
    pub events: Arc<Mutex<Vec<&'static str>>>,
    pub fail_reads: Arc<Mutex<bool>>,
}

impl EventSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemorySource::new(data),
            events: Arc::default(),
            fail_reads: Arc::default(),
        }
    }
}

impl RandomAccessSource for EventSource {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.events.lock().unwrap().push("read");
        if *self.fail_reads.lock().unwrap() {
            return Err(BridgeError::Callback("injected failure".to_owned()));
        }
        self.inner.read_at(offset, buf)
    }

    fn size(&mut self) -> Result<u64> {
        self.events.lock().unwrap().push("size");
        self.inner.size()
    }

    fn close(&mut self) -> Result<()> {
        self.events.lock().unwrap().push("close");
        Ok(())
    }
}

pub fn count(events: &Mutex<Vec<&'static str>>, event: &str) -> usize {
    events.lock().unwrap().iter().filter(|e| **e == event).count()
}
