//! CLI binary for running and validating miner strategy chains.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use miner_pipeline::strategies::csv_reader::read_records;
use miner_pipeline::{parameters_resource, MinerRunner, StrategyFactory};
use miner_types::{GeometryFactory, Keyword, Resource, ResourceList};

#[derive(Parser)]
#[command(name = "miner", version, about = "Run strategy chains over record sets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the strategies of a config file
    Run {
        /// Path to the config file holding `Object = Miner`
        config: PathBuf,

        /// Global parameter, KEY=VALUE (repeatable)
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// PVL file whose keywords become another global resource
        #[arg(long, value_name = "FILE")]
        parameters: Option<PathBuf>,

        /// Input records: a JSON array, or a CSV file with a header row
        /// (an optional `Geometry` column holds WKT)
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Field delimiter for CSV input
        #[arg(long, default_value_t = ',')]
        delimiter: char,

        /// Print the run report and final records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build every strategy of a config file without running it
    Validate {
        config: PathBuf,

        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        #[arg(long, value_name = "FILE")]
        parameters: Option<PathBuf>,
    },

    /// List the registered strategy types
    Types,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            params,
            parameters,
            input,
            delimiter,
            json,
        } => cmd_run(
            &config,
            &params,
            parameters.as_deref(),
            input.as_deref(),
            delimiter,
            json,
        ),
        Commands::Validate {
            config,
            params,
            parameters,
        } => cmd_validate(&config, &params, parameters.as_deref()),
        Commands::Types => {
            cmd_types();
            Ok(())
        }
    }
}

/// Globals in the order given: `-p` pairs first, then the parameters file.
fn load_globals(params: &[String], parameters: Option<&Path>) -> anyhow::Result<ResourceList> {
    let mut globals = Vec::new();
    if !params.is_empty() {
        let mut pairs = Vec::with_capacity(params.len());
        for param in params {
            let Some((key, value)) = param.split_once('=') else {
                bail!("parameter '{param}' is not of the form KEY=VALUE");
            };
            pairs.push((key.trim(), value.trim()));
        }
        globals.push(parameters_resource(pairs));
    }
    if let Some(path) = parameters {
        let doc = miner_pvl::read_file(path)
            .with_context(|| format!("reading parameters from {}", path.display()))?;
        let resource = Resource::shared("Parameters");
        for keyword in doc.definition_map().iter() {
            resource.add_keyword(keyword.clone());
        }
        globals.push(resource);
    }
    Ok(globals)
}

/// Records from a `.csv` file, or from a JSON array of
/// `{"name", "keywords", "geometry"}` objects.
fn load_records(path: &Path, factory: &StrategyFactory, delimiter: char) -> anyhow::Result<ResourceList> {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        let records = read_records(path, delimiter)
            .with_context(|| format!("reading records from {}", path.display()))?;
        let geometry = factory.geometry_factory();
        for record in &records {
            if !record.is_null("Geometry", 0) {
                record.set_geometry(Some(geometry.create(&record.value("Geometry", 0)?, "wkt")?));
            }
        }
        return Ok(records);
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading records from {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let Some(items) = value.as_array() else {
        bail!("{} must contain a JSON array of records", path.display());
    };
    let geometry = factory.geometry_factory();
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let name = item
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Resource{}", index + 1));
        let resource = Resource::shared(name);
        if let Some(keys) = item.get("keywords").and_then(|k| k.as_object()) {
            for (key, value) in keys {
                resource.add_keyword(Keyword::with_values(key.clone(), json_values(value)));
            }
        }
        if let Some(wkt) = item.get("geometry").and_then(|g| g.as_str()) {
            resource.set_geometry(Some(geometry.create(wkt, "wkt")?));
        }
        if item.get("discarded").and_then(|d| d.as_bool()) == Some(true) {
            resource.discard();
        }
        records.push(resource);
    }
    Ok(records)
}

fn json_values(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => items.iter().flat_map(json_values).collect(),
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Null => vec!["NULL".to_string()],
        other => vec![other.to_string()],
    }
}

fn cmd_run(
    config: &Path,
    params: &[String],
    parameters: Option<&Path>,
    input: Option<&Path>,
    delimiter: char,
    json: bool,
) -> anyhow::Result<()> {
    let globals = load_globals(params, parameters)?;
    let factory = StrategyFactory::new();
    let mut runner = MinerRunner::from_file(&factory, config, &globals)
        .with_context(|| format!("building strategies from {}", config.display()))?;
    let mut records = match input {
        Some(path) => load_records(path, &factory, delimiter)?,
        None => Vec::new(),
    };
    tracing::info!(
        config = %config.display(),
        strategies = runner.len(),
        records = records.len(),
        "starting run"
    );

    let report = runner.run(&mut records, &globals)?;

    if json {
        let records: Vec<serde_json::Value> = records.iter().map(|r| r.to_json()).collect();
        let out = serde_json::json!({ "report": report, "records": records });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for step in &report.steps {
        println!(
            "{:<24} {:<16} result={:<6} processed={:<6} active={}/{}",
            step.name, step.strategy_type, step.result, step.processed, step.active, step.total
        );
    }
    println!(
        "\nRecords: {} total, {} active, {} discarded",
        report.total, report.active, report.discarded
    );
    Ok(())
}

fn cmd_validate(config: &Path, params: &[String], parameters: Option<&Path>) -> anyhow::Result<()> {
    let globals = load_globals(params, parameters)?;
    let factory = StrategyFactory::new();
    match MinerRunner::from_file(&factory, config, &globals) {
        Ok(runner) => {
            println!("Configuration is valid: {} strategies", runner.len());
            for strategy in runner.strategies() {
                println!("  {} [{}]", strategy.name(), strategy.strategy_type());
            }
            Ok(())
        }
        Err(err) => bail!("[{}] {err}", err.kind()),
    }
}

fn cmd_types() {
    let factory = StrategyFactory::new();
    for name in factory.registry().types() {
        println!("{name}");
    }
}
