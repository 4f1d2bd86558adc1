use crate::codec::{line_text, LineFramer};
use crate::{CsvPipelineError, CsvResult, DEFAULT_DELIMITER};
use bytes::Bytes;
use futures::{ready, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Shape constraints checked by [`Validator`].
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub delimiter: char,
    /// Compared position by position against the first line, after trimming.
    pub expected_header: Option<Vec<String>>,
    pub min_columns: Option<usize>,
    pub max_columns: Option<usize>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            expected_header: None,
            min_columns: None,
            max_columns: None,
        }
    }
}

impl ValidatorConfig {
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            ..Default::default()
        }
    }

    pub fn with_expected_header<I, S>(mut self, header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_header = Some(header.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_min_columns(mut self, min: usize) -> Self {
        self.min_columns = Some(min);
        self
    }

    pub fn with_max_columns(mut self, max: usize) -> Self {
        self.max_columns = Some(max);
        self
    }
}

/// Pass-through gate over a byte stream.
///
/// Yields every non-blank logical line unchanged (terminator included) as
/// long as it satisfies the configured constraints. The first violation is
/// yielded as an error and ends the stream.
pub struct Validator<S> {
    lines: LineFramer<S>,
    config: ValidatorConfig,
    header: Option<Vec<String>>,
    row_count: u64,
    done: bool,
}

impl<S> Validator<S> {
    pub fn new(upstream: S, config: ValidatorConfig) -> Self {
        Self {
            lines: LineFramer::new(upstream),
            config,
            header: None,
            row_count: 0,
            done: false,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Header observed on the first non-blank line, once seen.
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Non-blank lines seen so far, header included.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// `Ok(false)` for blank lines, which are dropped silently.
    fn check_line(&mut self, raw: &[u8]) -> CsvResult<bool> {
        let text = line_text(raw);
        if text.trim().is_empty() {
            return Ok(false);
        }
        self.row_count += 1;
        let line = self.row_count;
        let fields: Vec<&str> = text.split(self.config.delimiter).collect();

        if self.header.is_none() {
            let header: Vec<String> = fields.iter().map(|h| h.trim().to_string()).collect();
            if let Some(expected) = &self.config.expected_header {
                check_header(expected, &header, line)?;
            }
            debug!(columns = header.len(), "validator header established");
            self.header = Some(header);
            return Ok(true);
        }

        let count = fields.len();
        if let Some(min) = self.config.min_columns {
            if count < min {
                return Err(CsvPipelineError::TooFewColumns {
                    line,
                    min,
                    actual: count,
                });
            }
        }
        if let Some(max) = self.config.max_columns {
            if count > max {
                return Err(CsvPipelineError::TooManyColumns {
                    line,
                    max,
                    actual: count,
                });
            }
        }
        Ok(true)
    }
}

fn check_header(expected: &[String], actual: &[String], line: u64) -> CsvResult<()> {
    if expected.len() != actual.len() {
        return Err(CsvPipelineError::HeaderLength {
            expected: expected.len(),
            actual: actual.len(),
            line,
        });
    }
    for (i, (want, got)) in expected.iter().zip(actual).enumerate() {
        if want.trim() != got {
            return Err(CsvPipelineError::HeaderMismatch {
                column: i + 1,
                expected: want.trim().to_string(),
                actual: got.clone(),
                line,
            });
        }
    }
    Ok(())
}

impl<S, B> Stream for Validator<S>
where
    S: Stream<Item = CsvResult<B>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = CsvResult<Bytes>;

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
                    debug!(rows = this.row_count, "validator reached end of input");
                    break;
                }
            };
            match this.check_line(&raw) {
                Ok(true) => return Poll::Ready(Some(Ok(raw))),
                Ok(false) => continue,
                Err(e) => {
                    this.done = true;
                    warn!(error = %e, "validation failed");
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
        Poll::Ready(None)
    }
}
