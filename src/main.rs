use clap::{Parser, Subcommand};
use royalbit_kpi_forge::cli;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kpi-forge")]
#[command(about = "Sandboxed KPI formula validation and evaluation")]
#[command(long_about = "KPI Forge - Sandboxed KPI formulas over untrusted records

Formulas are arithmetic expressions with {field} placeholders, evaluated
per record inside an allow-listed sandbox and summed into one KPI value.
Records that fail or produce a non-finite value are skipped.

COMMANDS:
  validate   - Check a formula without any data
  test       - Preview a formula against one record
  calculate  - Aggregate a formula over a records file
  run        - Calculate a stored KPI from a workspace file
  fields     - List known record fields
  examples   - List example formulas

EXAMPLES:
  kpi-forge validate '{monthlyRate} * 1.15'
  kpi-forge test '{cost} * 2' --record '{\"cost\": 21}'
  kpi-forge calculate '{revenue} - {cost}' --records sales.json --verbose
  kpi-forge run workspace.yaml --kpi revenue --org acme --user alice

LOGGING:
  Set RUST_LOG (e.g. RUST_LOG=royalbit_kpi_forge=debug) for diagnostics on stderr.")]
#[command(version)]
struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short, long, global = true, env = "KPI_FORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a formula is safe and evaluates
    #[command(long_about = "Check that a formula is safe and evaluates.

Rejects empty formulas and formulas containing forbidden patterns, then
runs one dry run with every placeholder set to the sentinel value (100).

Exits with status 1 when the formula is invalid.")]
    Validate {
        /// Formula, e.g. '{monthlyRate} * 1.15'
        formula: String,
    },

    /// Preview a formula against one record
    Test {
        /// Formula to evaluate
        formula: String,

        /// Record as inline JSON or a JSON/YAML file
        #[arg(short, long)]
        record: String,
    },

    /// Aggregate a formula over a records file
    #[command(long_about = "Aggregate a formula over a records file.

The file holds a list of records, as JSON (.json) or YAML (anything else).
Records that fail or produce a non-finite value are skipped; --verbose lists
them.")]
    Calculate {
        /// Formula to aggregate
        formula: String,

        /// Records file (JSON or YAML list)
        #[arg(short, long)]
        records: PathBuf,

        /// Show every skipped record
        #[arg(short, long)]
        verbose: bool,
    },

    /// Calculate a stored KPI from a workspace file
    Run {
        /// Workspace file with kpis and records (JSON or YAML)
        workspace: PathBuf,

        /// KPI id
        #[arg(long)]
        kpi: String,

        /// Organization id
        #[arg(long)]
        org: String,

        /// User requesting the calculation
        #[arg(long, default_value = "cli")]
        user: String,

        /// Show every skipped record
        #[arg(short, long)]
        verbose: bool,
    },

    /// List known record fields
    Fields,

    /// List example formulas
    Examples,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "royalbit_kpi_forge=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;
    let config = cli.config;
    let engine = || cli::load_engine(config.as_deref());

    match cli.command {
        Commands::Validate { formula } => cli::validate(&engine()?, &formula, json)?,
        Commands::Test { formula, record } => cli::test(&engine()?, &formula, &record, json)?,
        Commands::Calculate {
            formula,
            records,
            verbose,
        } => cli::calculate(&engine()?, &formula, records, verbose, json)?,
        Commands::Run {
            workspace,
            kpi,
            org,
            user,
            verbose,
        } => cli::run(&engine()?, workspace, &kpi, &org, &user, verbose, json)?,
        Commands::Fields => cli::fields(json)?,
        Commands::Examples => cli::examples(json)?,
    }

    Ok(())
}
