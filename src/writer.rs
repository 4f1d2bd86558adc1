use crate::value::{Record, Value};
use crate::{CsvPipelineError, CsvResult, DEFAULT_DELIMITER};
use futures::{Stream, StreamExt};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Anything the writer can turn into a CSV line.
///
/// Keyed rows expose their own column order; values without named fields
/// report `None` and are rejected by the writer.
pub trait CsvRow {
    fn columns(&self) -> Option<Vec<String>>;

    fn field(&self, column: &str) -> Option<&Value>;

    fn is_keyed(&self) -> bool {
        self.columns().is_some()
    }
}

impl CsvRow for Record {
    fn columns(&self) -> Option<Vec<String>> {
        Some(self.keys().map(str::to_string).collect())
    }

    fn field(&self, column: &str) -> Option<&Value> {
        self.get(column)
    }

    fn is_keyed(&self) -> bool {
        true
    }
}

impl CsvRow for Value {
    fn columns(&self) -> Option<Vec<String>> {
        None
    }

    fn field(&self, _column: &str) -> Option<&Value> {
        None
    }
}

impl<T: CsvRow + ?Sized> CsvRow for &T {
    fn columns(&self) -> Option<Vec<String>> {
        (**self).columns()
    }

    fn field(&self, column: &str) -> Option<&Value> {
        (**self).field(column)
    }

    fn is_keyed(&self) -> bool {
        (**self).is_keyed()
    }
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub delimiter: char,
    pub include_header: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            include_header: true,
        }
    }
}

impl WriterConfig {
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, include_header: bool) -> Self {
        self.include_header = include_header;
        self
    }
}

enum Destination {
    File(BufWriter<File>),
    Memory(String),
}

/// Serializes rows to delimited text.
///
/// Column order comes from the first row and never changes. File writes are
/// awaited until the buffered writer accepts them, so a producer driving the
/// writer is throttled by the destination.
pub struct CsvWriter {
    config: WriterConfig,
    destination: Destination,
    columns: Option<Vec<String>>,
    rows_written: u64,
    finished: bool,
}

impl CsvWriter {
    /// Creates (or truncates) `path`.
    pub async fn to_file(path: impl AsRef<Path>, config: WriterConfig) -> CsvResult<Self> {
        let path = path.as_ref();
        let file = File::create(path).await?;
        debug!(path = %path.display(), "opened output file");
        Ok(Self::with_destination(
            config,
            Destination::File(BufWriter::with_capacity(1 << 16, file)),
        ))
    }

    pub fn in_memory(config: WriterConfig) -> Self {
        Self::with_destination(config, Destination::Memory(String::new()))
    }

    fn with_destination(config: WriterConfig, destination: Destination) -> Self {
        Self {
            config,
            destination,
            columns: None,
            rows_written: 0,
            finished: false,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Text produced so far for in-memory writers; empty for file writers.
    pub fn output_buffer(&self) -> &str {
        match &self.destination {
            Destination::Memory(buf) => buf,
            Destination::File(_) => "",
        }
    }

    pub async fn write<R: CsvRow + ?Sized>(&mut self, row: &R) -> CsvResult<()> {
        if self.finished {
            return Err(CsvPipelineError::WriterClosed);
        }

        let columns = match self.columns.take() {
            Some(columns) => {
                if !row.is_keyed() {
                    self.columns = Some(columns);
                    return Err(CsvPipelineError::RecordNotObject);
                }
                columns
            }
            None => {
                let columns = row
                    .columns()
                    .ok_or(CsvPipelineError::FirstRecordNotObject)?;
                if self.config.include_header {
                    let mut header = join(columns.iter().map(String::as_str), self.config.delimiter);
                    header.push('\n');
                    self.emit(&header).await?;
                }
                debug!(?columns, "writer columns fixed");
                columns
            }
        };

        let delimiter = self.config.delimiter;
        let mut line = join(
            columns
                .iter()
                .map(|column| render_field(row.field(column), delimiter)),
            delimiter,
        );
        line.push('\n');
        self.columns = Some(columns);
        self.emit(&line).await?;
        self.rows_written += 1;
        Ok(())
    }

    /// Writes every row of `rows`, then finishes the writer.
    ///
    /// Rows are pulled one at a time, so the stream is only advanced once
    /// the previous row has been accepted by the destination. On error the
    /// writer is still finished, so rows already accepted stay in the output.
    pub async fn write_stream<S, R>(&mut self, mut rows: S) -> CsvResult<u64>
    where
        S: Stream<Item = CsvResult<R>> + Unpin,
        R: CsvRow,
    {
        while let Some(row) = rows.next().await {
            let written = match row {
                Ok(row) => self.write(&row).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                if let Err(close) = self.finish().await {
                    warn!(error = %close, "failed to finish writer after error");
                }
                return Err(e);
            }
        }
        self.finish().await?;
        Ok(self.rows_written)
    }

    /// Flushes and closes the destination. Later calls are no-ops.
    pub async fn finish(&mut self) -> CsvResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Destination::File(file) = &mut self.destination {
            file.flush().await?;
            file.shutdown().await?;
        }
        debug!(rows = self.rows_written, "writer finished");
        Ok(())
    }

    async fn emit(&mut self, data: &str) -> CsvResult<()> {
        match &mut self.destination {
            Destination::File(file) => file.write_all(data.as_bytes()).await?,
            Destination::Memory(buf) => buf.push_str(data),
        }
        Ok(())
    }
}

fn join<I, S>(fields: I, delimiter: char) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(delimiter);
        }
        out.push_str(field.as_ref());
    }
    out
}

fn render_field(value: Option<&Value>, delimiter: char) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) if s.contains(delimiter) || s.contains('"') => {
            format!("\"{}\"", s.replace('"', "\"\""))
        }
        Some(value) => value.to_string(),
    }
}
