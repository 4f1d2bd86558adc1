use clap::{Arg, ArgAction, Command};
use csv_pipeline::{CsvPipeline, ParserConfig, PipelineConfig, ValidatorConfig, DEFAULT_CHUNK_SIZE};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("csvpipe")
        .arg(Arg::new("path").long("path").value_parser(clap::value_parser!(PathBuf)).required(true))
        .arg(Arg::new("delimiter").long("delimiter").default_value(","))
        .arg(Arg::new("expected-header").long("expected-header").help("Expected header column, in order (repeat per column)").action(ArgAction::Append))
        .arg(Arg::new("min-columns").long("min-columns").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("max-columns").long("max-columns").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("chunk-size").long("chunk-size").help("Loader chunk size in bytes").value_parser(clap::value_parser!(usize)))
        .arg(Arg::new("output").long("output").help("Write the parsed records back out as CSV").value_parser(clap::value_parser!(PathBuf)))
        .arg(Arg::new("no-header").long("no-header").help("Omit the header line from --output").action(ArgAction::SetTrue))
        .arg(Arg::new("verbose").short('v').long("verbose").help("Raise log verbosity (-v debug, -vv trace)").action(ArgAction::Count))
        .get_matches();

    init_tracing(matches.get_count("verbose"));

    let delimiter = single_char(matches.get_one::<String>("delimiter").map(String::as_str).unwrap_or(","))?;
    let mut validator = ValidatorConfig::new(delimiter);
    if let Some(header) = matches.get_many::<String>("expected-header") {
        validator = validator.with_expected_header(header.cloned());
    }
    if let Some(&min) = matches.get_one::<usize>("min-columns") {
        validator = validator.with_min_columns(min);
    }
    if let Some(&max) = matches.get_one::<usize>("max-columns") {
        validator = validator.with_max_columns(max);
    }
    let config = PipelineConfig::new(delimiter)
        .with_chunk_size(matches.get_one::<usize>("chunk-size").copied().unwrap_or(DEFAULT_CHUNK_SIZE))
        .with_validator(validator)
        .with_parser(ParserConfig::new(delimiter));

    let path = matches
        .get_one::<PathBuf>("path")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Provide --path <file>"))?;
    let pipeline = CsvPipeline::new(&path, config)?;

    let start = Instant::now();
    let rows = match matches.get_one::<PathBuf>("output") {
        Some(output) => pipeline.write_csv(output, !matches.get_flag("no-header")).await?,
        None => pipeline.for_each(|_| {}).await?,
    };
    let elapsed = start.elapsed().as_secs_f64();
    let rps = (rows as f64) / elapsed;

    println!(
        "source={} rows={}\nelapsed={:.1}s rows/sec={:.0}",
        path.display(),
        rows,
        elapsed,
        rps
    );
    Ok(())
}

fn single_char(s: &str) -> anyhow::Result<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(anyhow::anyhow!("delimiter must be a single character, got {s:?}")),
    }
}

/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
