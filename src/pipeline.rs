use crate::loader::{ChunkLoader, DEFAULT_CHUNK_SIZE};
use crate::parser::{ParserConfig, RecordParser};
use crate::validator::{Validator, ValidatorConfig};
use crate::value::Record;
use crate::writer::{CsvWriter, WriterConfig};
use crate::{CsvPipelineError, CsvResult, DEFAULT_DELIMITER};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loader -> Validator -> Parser.
pub type RecordStream = RecordParser<Validator<ChunkLoader>>;

/// Settings for every stage of one pipeline.
///
/// The stage configs carry their own delimiter; [`CsvPipeline::new`] rejects
/// a config where they disagree with `delimiter`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub delimiter: char,
    pub chunk_size: usize,
    pub validator: ValidatorConfig,
    pub parser: ParserConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl PipelineConfig {
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            chunk_size: DEFAULT_CHUNK_SIZE,
            validator: ValidatorConfig::new(delimiter),
            parser: ParserConfig::new(delimiter),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_parser(mut self, parser: ParserConfig) -> Self {
        self.parser = parser;
        self
    }

    pub fn writer_config(&self, include_header: bool) -> WriterConfig {
        WriterConfig::new(self.delimiter).with_header(include_header)
    }

    pub fn check(&self) -> CsvResult<()> {
        if matches!(self.delimiter, '\n' | '\r' | '"') {
            return Err(CsvPipelineError::InvalidConfig(
                "delimiter cannot be a line break or a quote",
            ));
        }
        if self.chunk_size == 0 {
            return Err(CsvPipelineError::InvalidConfig("chunk size must be non-zero"));
        }
        let stages = [
            ("validator", self.validator.delimiter),
            ("parser", self.parser.delimiter),
        ];
        for (stage, actual) in stages {
            if actual != self.delimiter {
                return Err(CsvPipelineError::DelimiterMismatch {
                    stage,
                    expected: self.delimiter,
                    actual,
                });
            }
        }
        if let (Some(min), Some(max)) = (self.validator.min_columns, self.validator.max_columns) {
            if min > max {
                return Err(CsvPipelineError::InvalidConfig(
                    "min_columns must not exceed max_columns",
                ));
            }
        }
        Ok(())
    }
}

/// One file run through the load/validate/parse stages.
#[derive(Debug, Clone)]
pub struct CsvPipeline {
    path: PathBuf,
    config: PipelineConfig,
}

impl CsvPipeline {
    /// Checks the config; the file itself is opened when the stream is first polled.
    pub fn new(path: impl Into<PathBuf>, config: PipelineConfig) -> CsvResult<Self> {
        config.check()?;
        Ok(Self {
            path: path.into(),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn into_stream(self) -> RecordStream {
        let loader = ChunkLoader::new(self.path, self.config.chunk_size);
        let validator = Validator::new(loader, self.config.validator);
        RecordParser::new(validator, self.config.parser)
    }

    /// Calls `f` for each record in order; returns the number of records.
    pub async fn for_each<F>(self, mut f: F) -> CsvResult<u64>
    where
        F: FnMut(Record),
    {
        let mut stream = self.into_stream();
        let mut count = 0u64;
        while let Some(record) = stream.next().await {
            f(record?);
            count += 1;
        }
        Ok(count)
    }

    /// Re-serializes every record into `output`; returns rows written.
    pub async fn write_csv(self, output: impl AsRef<Path>, include_header: bool) -> CsvResult<u64> {
        let output = output.as_ref();
        let mut writer = CsvWriter::to_file(output, self.config.writer_config(include_header)).await?;
        let source = self.path.clone();
        let rows = writer.write_stream(self.into_stream()).await?;
        debug!(source = %source.display(), output = %output.display(), rows, "csv written");
        Ok(rows)
    }

    /// Re-serializes every record into memory and returns the text.
    pub async fn write_csv_buffer(self, include_header: bool) -> CsvResult<String> {
        let mut writer = CsvWriter::in_memory(self.config.writer_config(include_header));
        writer.write_stream(self.into_stream()).await?;
        Ok(writer.output_buffer().to_string())
    }
}
