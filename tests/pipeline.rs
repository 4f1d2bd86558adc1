use csv_pipeline::{
    CsvPipeline, CsvPipelineError, ParserConfig, PipelineConfig, Record, Value, ValidatorConfig,
};
use futures::StreamExt;
use std::{fs::File, io::Write, path::PathBuf};

fn write_fixture(dir: &tempfile::TempDir, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let path = dir.path().join(name);
    let mut f = File::create(&path)?;
    f.write_all(contents.as_bytes())?;
    Ok(path)
}

#[tokio::test]
async fn parses_large_file_and_counts_rows() -> anyhow::Result<()> {
    // Create a file that spans many small chunks
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("tiny.csv");
    let mut f = File::create(&csv_path)?;
    writeln!(f, "sku,col1")?;
    for i in 0..100_000 {
        writeln!(f, "SKU{i:06},{i}")?;
    }
    drop(f);

    let config = PipelineConfig::new(',')
        .with_chunk_size(4096)
        .with_validator(
            ValidatorConfig::new(',')
                .with_expected_header(["sku", "col1"])
                .with_min_columns(2)
                .with_max_columns(2),
        );

    let mut sum = 0i64;
    let mut last_sku = String::new();
    let count = CsvPipeline::new(&csv_path, config)?
        .for_each(|record| {
            sum += record.get("col1").and_then(Value::as_i64).unwrap_or_default();
            if let Some(sku) = record.get("sku").and_then(Value::as_str) {
                last_sku = sku.to_string();
            }
        })
        .await?;

    assert_eq!(count, 100_000);
    assert_eq!(sum, (0..100_000i64).sum());
    assert_eq!(last_sku, "SKU099999");
    Ok(())
}

#[tokio::test]
async fn stream_yields_typed_records() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "people.csv", "name,age\nJohn,30\nJane,25\n")?;

    let records: Vec<_> = CsvPipeline::new(&path, PipelineConfig::default())?
        .into_stream()
        .collect()
        .await;
    let records = records.into_iter().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        records,
        vec![
            Record::new().with("name", "John").with("age", 30i64),
            Record::new().with("name", "Jane").with("age", 25i64),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn validator_failure_aborts_pipeline() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "bad.csv", "FirstName,Age,City\nJohn,30,New York\n")?;

    let config = PipelineConfig::new(',')
        .with_validator(ValidatorConfig::new(',').with_expected_header(["Name", "Age", "City"]));
    let items: Vec<_> = CsvPipeline::new(&path, config)?.into_stream().collect().await;

    assert_eq!(items.len(), 1);
    assert!(matches!(
        &items[0],
        Err(CsvPipelineError::HeaderMismatch { column: 1, line: 1, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn validator_bounds_fail_before_parser_sees_row() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "short.csv", "a,b,c\n1,2,3\n4,5\n")?;

    let config = PipelineConfig::new(',')
        .with_validator(ValidatorConfig::new(',').with_min_columns(3));
    let mut seen = Vec::new();
    let err = CsvPipeline::new(&path, config)?
        .for_each(|record| seen.push(record))
        .await
        .unwrap_err();

    assert_eq!(seen.len(), 1);
    assert!(matches!(err, CsvPipelineError::TooFewColumns { line: 3, .. }));
    Ok(())
}

#[tokio::test]
async fn missing_file_surfaces_io_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let items: Vec<_> = CsvPipeline::new(dir.path().join("nope.csv"), PipelineConfig::default())?
        .into_stream()
        .collect()
        .await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(CsvPipelineError::Io(_))));
    Ok(())
}

#[tokio::test]
async fn mismatched_delimiters_are_rejected_up_front() {
    let config = PipelineConfig::new(',').with_parser(ParserConfig::new(';'));
    let err = CsvPipeline::new("unused.csv", config).unwrap_err();
    assert!(matches!(
        err,
        CsvPipelineError::DelimiterMismatch {
            stage: "parser",
            expected: ',',
            actual: ';'
        }
    ));

    let config = PipelineConfig::new('|').with_validator(ValidatorConfig::default());
    let err = CsvPipeline::new("unused.csv", config).unwrap_err();
    assert!(matches!(err, CsvPipelineError::DelimiterMismatch { stage: "validator", .. }));
}

#[tokio::test]
async fn invalid_configs_are_rejected() {
    for config in [
        PipelineConfig::new('\n'),
        PipelineConfig::new('"'),
        PipelineConfig::default().with_chunk_size(0),
        PipelineConfig::default()
            .with_validator(ValidatorConfig::default().with_min_columns(4).with_max_columns(2)),
    ] {
        let err = CsvPipeline::new("unused.csv", config).unwrap_err();
        assert!(matches!(err, CsvPipelineError::InvalidConfig(_)), "{err}");
    }
}

#[tokio::test]
async fn hooks_flow_through_pipeline() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_fixture(&dir, "people.csv", "name;age\nJohn;30\nJane;25\nJim;52\n")?;

    let parser = ParserConfig::new(';')
        .with_filter(|r: &Record| r.get("age").and_then(Value::as_i64).is_some_and(|a| a >= 30))
        .with_transform(|r: Record| r.with("senior", true));
    let config = PipelineConfig::new(';')
        .with_validator(ValidatorConfig::new(';'))
        .with_parser(parser);

    let text = CsvPipeline::new(&path, config)?.write_csv_buffer(true).await?;
    assert_eq!(text, "name;age;senior\nJohn;30;true\nJim;52;true\n");
    Ok(())
}

#[tokio::test]
async fn write_csv_round_trips_through_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let input = "id,name,score,active,joined\n1,Ann,9.5,true,2024-01-15\n2,Ben,7.25,false,2024-02-01\n";
    let source = write_fixture(&dir, "in.csv", input)?;
    let output = dir.path().join("out.csv");

    let config = PipelineConfig::default().with_chunk_size(7);
    let rows = CsvPipeline::new(&source, config.clone())?
        .write_csv(&output, true)
        .await?;
    assert_eq!(rows, 2);

    let written = std::fs::read_to_string(&output)?;
    assert_eq!(
        written,
        "id,name,score,active,joined\n\
         1,Ann,9.5,true,2024-01-15T00:00:00Z\n\
         2,Ben,7.25,false,2024-02-01T00:00:00Z\n"
    );

    let first: Vec<_> = CsvPipeline::new(&source, config.clone())?.into_stream().collect().await;
    let again: Vec<_> = CsvPipeline::new(&output, config)?.into_stream().collect().await;
    let first = first.into_iter().collect::<Result<Vec<_>, _>>()?;
    let again = again.into_iter().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(first, again);
    Ok(())
}

#[tokio::test]
async fn write_csv_keeps_rows_written_before_a_malformed_row() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let source = write_fixture(&dir, "in.csv", "a,b\n1,2\n3,4\n5\n")?;
    let output = dir.path().join("out.csv");

    let err = CsvPipeline::new(&source, PipelineConfig::default())?
        .write_csv(&output, true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CsvPipelineError::MalformedRow {
            line: 4,
            expected: 2,
            actual: 1
        }
    ));
    assert_eq!(std::fs::read_to_string(&output)?, "a,b\n1,2\n3,4\n");
    Ok(())
}

#[tokio::test]
async fn dropping_stream_mid_file_stops_reading() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let body: String = (0..10_000).map(|i| format!("{i},{}\n", i * 2)).collect();
    let path = write_fixture(&dir, "many.csv", &format!("a,b\n{body}"))?;

    let mut stream = CsvPipeline::new(&path, PipelineConfig::default().with_chunk_size(256))?
        .into_stream();
    let first = stream.next().await.transpose()?;
    assert_eq!(first, Some(Record::new().with("a", 0i64).with("b", 0i64)));
    assert_eq!(stream.emitted(), 1);
    drop(stream);
    Ok(())
}
