//! planlens command line
//!
//! Usage: planlens --plans <dir> [--cost actual|estimated] [--format text|json] [--tree]

use std::fs;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use planlens::config::ExplainConfig;
use planlens::explain::Explainer;
use planlens::plan::{CostSource, TreeFormatter};
use planlens::source::DirectoryPlanSource;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Explain why the optimizer chose each operator of a query plan")]
struct Cli {
    /// Directory holding primary.json and disable_<capability>.json records
    #[arg(long, default_value = "./plans", env = "PLANLENS_PLAN_DIR")]
    plans: PathBuf,

    /// Cost pair compared between plans (overrides PLANLENS_COST_SOURCE)
    #[arg(long)]
    cost: Option<CostSource>,

    /// File holding the query text the plans were captured for
    #[arg(long)]
    query: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Print the primary plan tree before the report
    #[arg(long)]
    tree: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ExplainConfig::from_env()?;
    if let Some(cost) = cli.cost {
        config = config.with_cost_source(cost);
    }

    let query = match &cli.query {
        Some(path) => fs::read_to_string(path)?,
        None => String::new(),
    };

    tracing::info!(
        plans = %cli.plans.display(),
        cost_source = %config.cost_source,
        "Starting planlens"
    );

    let mut source = DirectoryPlanSource::new(&cli.plans);
    let report = Explainer::new(config).explain(&mut source, &query)?;

    match cli.format {
        OutputFormat::Text => {
            if cli.tree {
                println!("{}", TreeFormatter::format(&report.primary));
            }
            print!("{}", report);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
