use super::{
    Sink,
    SinkError,
};
use crate::metrics::{
    line_protocol::{
        encode_line,
        Flavor,
    },
    FilteredRecord,
};
use chrono::{
    DateTime,
    Utc,
};
use std::{
    collections::BTreeMap,
    future::Future,
    io::{
        self,
        Write,
    },
    pin::Pin,
};

/// Writes records as line protocol text, one line per record, no timestamp.
pub struct StdoutSink<W> {
    writer: W,
}

impl StdoutSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> StdoutSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// The whole batch is rendered before anything is written, so a record
    /// without fields leaves the output untouched.
    pub fn write_records(
        &mut self,
        records: &[FilteredRecord],
        extra_tags: &BTreeMap<String, String>,
    ) -> Result<(), SinkError> {
        info!(records = records.len(), "Outputting metrics");
        let mut output = String::new();
        for record in records {
            output.push_str(&encode_line(record, extra_tags, Flavor::Console, None)?);
        }
        if output.is_empty() {
            return Ok(());
        }
        self.writer.write_all(output.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Sink for StdoutSink<W> {
    fn emit<'a>(
        &'a mut self,
        records: &'a [FilteredRecord],
        extra_tags: &'a BTreeMap<String, String>,
        _timestamp: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move { self.write_records(records, extra_tags) })
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}
