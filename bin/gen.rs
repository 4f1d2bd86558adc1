use clap::{Arg, Command};
use std::io::{self, Write};

const CITIES: &[&str] = &["New York", "London", "Paris", "Tokyo", "Berlin"];

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .get_matches();

    let rows: u64 = matches.get_one::<u64>("rows").copied().unwrap_or_default();
    let with_header = matches.get_flag("with_header");
    let delim = matches
        .get_one::<String>("delim")
        .map(String::as_str)
        .unwrap_or(",");

    let mut out = io::BufWriter::new(io::stdout().lock());

    if with_header {
        let header = ["id", "name", "age", "score", "active", "joined", "city"];
        writeln!(&mut out, "{}", header.join(delim))?;
    }

    // Deterministic rows covering every inferred type:
    // integer, string, integer, float, boolean, date, string.
    for i in 0..rows {
        let day = i % 28 + 1;
        let month = i % 12 + 1;
        writeln!(
            &mut out,
            "{i}{d}user{i:08}{d}{age}{d}{score:.2}{d}{active}{d}2024-{month:02}-{day:02}{d}{city}",
            d = delim,
            age = 18 + i % 60,
            score = (i % 1000) as f64 / 7.0,
            active = i % 2 == 0,
            city = CITIES[(i % CITIES.len() as u64) as usize],
        )?;
        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}
