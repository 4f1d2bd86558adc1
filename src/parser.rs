use crate::codec::{line_text, LineFramer};
use crate::value::{Record, Value};
use crate::{CsvPipelineError, CsvResult, DEFAULT_DELIMITER};
use futures::{ready, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

/// Keep/drop decision on a fully typed record.
pub type RecordPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;
/// Replaces a record wholesale.
pub type RecordTransform = Arc<dyn Fn(Record) -> Record + Send + Sync>;

#[derive(Clone)]
pub struct ParserConfig {
    pub delimiter: char,
    /// When set, every line is data and these are the column names.
    pub headers: Option<Vec<String>>,
    pub validate: Option<RecordPredicate>,
    pub filter: Option<RecordPredicate>,
    pub transform: Option<RecordTransform>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            headers: None,
            validate: None,
            filter: None,
            transform: None,
        }
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("delimiter", &self.delimiter)
            .field("headers", &self.headers)
            .field("validate", &self.validate.is_some())
            .field("filter", &self.filter.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl ParserConfig {
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            ..Default::default()
        }
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(f));
        self
    }

    pub fn with_filter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(f));
        self
    }

    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Record) -> Record + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    /// validate, then filter, then transform. `None` means dropped.
    fn apply_hooks(&self, record: Record) -> Option<Record> {
        if let Some(validate) = &self.validate {
            if !validate(&record) {
                return None;
            }
        }
        if let Some(filter) = &self.filter {
            if !filter(&record) {
                return None;
            }
        }
        match &self.transform {
            Some(transform) => Some(transform(record)),
            None => Some(record),
        }
    }
}

/// Turns a byte stream into typed [`Record`]s.
///
/// A row whose field count differs from the header is yielded as
/// [`CsvPipelineError::MalformedRow`] and ends the stream.
pub struct RecordParser<S> {
    lines: LineFramer<S>,
    config: ParserConfig,
    header: Option<Vec<String>>,
    line_number: u64,
    emitted: u64,
    done: bool,
}

impl<S> RecordParser<S> {
    pub fn new(upstream: S, config: ParserConfig) -> Self {
        let header = config.headers.clone();
        Self {
            lines: LineFramer::new(upstream),
            config,
            header,
            line_number: 0,
            emitted: 0,
            done: false,
        }
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Records yielded so far (after hooks).
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// `Ok(None)` for blank lines, the header line and hook drops.
    fn parse_line(&mut self, raw: &[u8]) -> CsvResult<Option<Record>> {
        let text = line_text(raw);
        if text.trim().is_empty() {
            return Ok(None);
        }
        self.line_number += 1;
        let fields: Vec<&str> = text.split(self.config.delimiter).collect();

        if self.header.is_none() {
            let header: Vec<String> = fields.iter().map(|h| h.trim().to_string()).collect();
            debug!(?header, "parser header established");
            self.header = Some(header);
            return Ok(None);
        }
        let header = self.header.as_deref().unwrap_or_default();

        if fields.len() != header.len() {
            return Err(CsvPipelineError::MalformedRow {
                line: self.line_number,
                expected: header.len(),
                actual: fields.len(),
            });
        }

        let mut record = Record::with_capacity(header.len());
        for (column, field) in header.iter().zip(&fields) {
            record.insert(column.as_str(), Value::infer(field));
        }
        let kept = self.config.apply_hooks(record);
        if kept.is_none() {
            trace!(line = self.line_number, "record dropped by hook");
        }
        Ok(kept)
    }
}

impl<S, B> Stream for RecordParser<S>
where
    S: Stream<Item = CsvResult<B>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = CsvResult<Record>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        while !this.done {
            let raw = match ready!(this.lines.poll_next_unpin(cx)) {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    this.done = true;
                    debug!(records = this.emitted, "parser reached end of input");
                    break;
                }
            };
            match this.parse_line(&raw) {
                Ok(Some(record)) => {
                    this.emitted += 1;
                    return Poll::Ready(Some(Ok(record)));
                }
                Ok(None) => continue,
                Err(e) => {
                    this.done = true;
                    warn!(error = %e, "parse failed");
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
        Poll::Ready(None)
    }
}
