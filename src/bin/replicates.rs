use std::env;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use csv::Writer;
use resilsim::{
    ensemble_quantiles, run_replicates, summarize_batch, trajectory_rows, PopulationConfig,
    ReplicateConfig, DEFAULT_REPLICATES,
};

#[derive(Debug, Clone)]
struct CliConfig {
    runs: usize,
    seed: u64,
    base: PopulationConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        let defaults = ReplicateConfig::default();
        Self {
            runs: defaults.n_runs,
            seed: defaults.seed,
            base: defaults.base,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = parse_args(env::args().skip(1))?;
    let output_dir = create_output_dir()?;
    let config = ReplicateConfig {
        n_runs: cli.runs,
        seed: cli.seed,
        base: cli.base,
    };

    let batch = run_replicates(&config)?;
    let summary = summarize_batch(&config, &batch);
    let quantiles = ensemble_quantiles(&batch.tables);

    write_csv(&output_dir.join("replicates.csv"), &batch.records)?;
    write_csv(&output_dir.join("quantiles.csv"), &quantiles)?;
    write_csv(
        &output_dir.join("example_run.csv"),
        &trajectory_rows(&batch.tables[0]),
    )?;
    fs::write(
        output_dir.join("summary.json"),
        serde_json::to_string_pretty(&summary)?,
    )?;

    println!("Output directory: {}", output_dir.display());
    Ok(())
}

fn parse_args<I>(args: I) -> Result<CliConfig, Box<dyn Error>>
where
    I: IntoIterator<Item = String>,
{
    let mut cli = CliConfig::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--runs" => cli.runs = parse_value(args.next(), "--runs")?,
            "--seed" => cli.seed = parse_value(args.next(), "--seed")?,
            "--r" => cli.base.r = parse_value(args.next(), "--r")?,
            "--f" => cli.base.f = parse_value(args.next(), "--f")?,
            "--d" => cli.base.d = parse_value(args.next(), "--d")?,
            "--d-sd" => cli.base.d_sd = parse_value(args.next(), "--d-sd")?,
            "--sf" => cli.base.sf = parse_value(args.next(), "--sf")?,
            "--tmax" => cli.base.tmax = parse_value(args.next(), "--tmax")?,
            "--x0" => cli.base.x0 = parse_value(args.next(), "--x0")?,
            "--fixed-timing" => cli.base.stochastic_timing = false,
            "--fixed-magnitude" => cli.base.stochastic_magnitude = false,
            "--oscillate" => cli.base.oscillate = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    Ok(cli)
}

fn parse_value<T>(value: Option<String>, flag: &str) -> Result<T, Box<dyn Error>>
where
    T: std::str::FromStr,
    T::Err: Error + 'static,
{
    let raw = value.ok_or_else(|| format!("missing value for {flag}"))?;
    Ok(raw.parse()?)
}

fn print_help() {
    println!("Usage: cargo run --bin replicates -- [OPTIONS]");
    println!("  --runs <usize>       default: {DEFAULT_REPLICATES}");
    println!("  --seed <u64>");
    println!("  --r <f64>            recovery rate");
    println!("  --f <f64>            mean/fixed disturbance interval");
    println!("  --d <f64>            mean disturbance magnitude");
    println!("  --d-sd <f64>         disturbance magnitude spread");
    println!("  --sf <f64>           sampling interval");
    println!("  --tmax <f64>         horizon");
    println!("  --x0 <f64>           initial deviation");
    println!("  --fixed-timing       fixed inter-pulse interval");
    println!("  --fixed-magnitude    constant pulse magnitude");
    println!("  --oscillate          alternate constant-pulse signs");
}

fn create_output_dir() -> Result<PathBuf, Box<dyn Error>> {
    let output_root = repo_root().join("output-resilsim");
    fs::create_dir_all(&output_root)?;

    let timestamp = timestamp_string()?;
    let output_dir = output_root.join(timestamp);
    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn timestamp_string() -> Result<String, Box<dyn Error>> {
    let output = Command::new("date").arg("+%Y%m%d_%H%M%S").output()?;
    if !output.status.success() {
        return Err("date command failed while building output path".into());
    }

    let timestamp = String::from_utf8(output.stdout)?.trim().to_string();
    if timestamp.is_empty() {
        return Err("date command returned an empty timestamp".into());
    }

    Ok(timestamp)
}

fn write_csv<P: AsRef<Path>, T: serde::Serialize>(path: P, rows: &[T]) -> Result<(), Box<dyn Error>> {
    let mut writer = Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
