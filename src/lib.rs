//! Streaming CSV pipeline: load, validate, parse, write.
//!
//! - Loader: fixed-size byte chunks from a local file, in offset order.
//! - Validator: header identity and column-count gate over logical lines.
//! - Parser: typed records with per-field inference and optional hooks.
//! - Writer: records back to delimited text, to a file or to memory.
//!
//! Data shape:
//! - Stages are pull-based `futures::Stream`s, so a slow consumer throttles
//!   every stage above it down to the loader.
//! - Records: [`Record`] (ordered `column -> Value`), values: [`Value`].
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod codec;
mod loader;
mod parser;
mod pipeline;
mod validator;
mod value;
mod writer;

pub use crate::loader::{Chunk, ChunkLoader, DEFAULT_CHUNK_SIZE};
pub use crate::parser::{ParserConfig, RecordParser, RecordPredicate, RecordTransform};
pub use crate::pipeline::{CsvPipeline, PipelineConfig, RecordStream};
pub use crate::validator::{Validator, ValidatorConfig};
pub use crate::value::{Record, Value};
pub use crate::writer::{CsvRow, CsvWriter, WriterConfig};

use thiserror::Error;

/// Delimiter used when a config does not name one.
pub const DEFAULT_DELIMITER: char = ',';

/// Error type returned by every stage of the pipeline.
#[derive(Debug, Error)]
pub enum CsvPipelineError {
    #[error("Header column count mismatch. Expected {expected}, got {actual} on line {line}")]
    HeaderLength {
        expected: usize,
        actual: usize,
        line: u64,
    },
    #[error("Header mismatch at column {column}. Expected '{expected}', got '{actual}' on line {line}")]
    HeaderMismatch {
        column: usize,
        expected: String,
        actual: String,
        line: u64,
    },
    #[error("Row {line} has too few columns. Expected at least {min}, got {actual}")]
    TooFewColumns { line: u64, min: usize, actual: usize },
    #[error("Row {line} has too many columns. Expected at most {max}, got {actual}")]
    TooManyColumns { line: u64, max: usize, actual: usize },
    #[error("Malformed row on line {line}: expected {expected} fields, got {actual}")]
    MalformedRow {
        line: u64,
        expected: usize,
        actual: usize,
    },
    #[error("First record must be an object to determine columns")]
    FirstRecordNotObject,
    #[error("Record must be an object")]
    RecordNotObject,
    #[error("Writer already finished")]
    WriterClosed,
    #[error("Delimiter mismatch: {stage} uses {actual:?}, pipeline uses {expected:?}")]
    DelimiterMismatch {
        stage: &'static str,
        expected: char,
        actual: char,
    },
    #[error("Invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CsvResult<T> = std::result::Result<T, CsvPipelineError>;
