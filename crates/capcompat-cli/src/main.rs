//! capcompat - cross-implementation compatibility harness CLI
//!
//! Each implementation lives in its own directory under the base directory,
//! named after its language, with a `runner.config.json` naming the
//! command that runs it.
//!
//! ## Commands
//!
//! - `test <client> <server>`: run the shared cases with one implementation
//!   as client and another as server
//! - `matrix <lang>...`: run every ordered client/server pairing

mod telemetry;

use std::path::PathBuf;

use anyhow::{Context, Result};
use capcompat_driver::{Driver, DriverConfig};
use capcompat_suite::{write_json, CompatSuite, SuiteReport};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "capcompat")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Test compatibility between capability invocation implementations", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Test compatibility between client and server implementations
    ///
    /// Example: capcompat test go js
    Test {
        /// Implementation acting as client
        client: String,

        /// Implementation acting as server
        server: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Test every ordered client/server pairing of the given implementations
    ///
    /// Example: capcompat matrix go js
    Matrix {
        /// Implementations to pair up
        #[arg(required = true, num_args = 1..)]
        langs: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory containing one subdirectory per implementation
    #[arg(long, env = "CAPCOMPAT_BASE_DIR", default_value = ".")]
    base_dir: PathBuf,

    /// Only run the named case (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,

    /// Seconds to wait for a server to report readiness
    #[arg(long, value_name = "SECS")]
    start_timeout: Option<u64>,

    /// Write suite reports as JSON to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

impl RunArgs {
    fn load_driver(&self, lang: &str) -> Result<Driver> {
        let dir = self.base_dir.join(lang);
        let mut config = DriverConfig::load(&dir)
            .with_context(|| format!("failed to load implementation '{lang}'"))?;
        if let Some(secs) = self.start_timeout {
            config = config.with_start_timeout(secs);
        }
        Ok(Driver::new(dir, config)?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json, level);

    let (pairs, run) = match cli.command {
        Commands::Test {
            client,
            server,
            run,
        } => (vec![(client, server)], run),
        Commands::Matrix { langs, run } => (pairings(&langs), run),
    };

    let reports = cmd_run(&pairs, &run).await?;
    if let Some(path) = &run.report {
        write_json(path, &reports)?;
        info!(path = %path.display(), "Wrote report");
    }

    summarize(&reports)
}

/// Every ordered (client, server) pair, including an implementation
/// against itself.
fn pairings(langs: &[String]) -> Vec<(String, String)> {
    langs
        .iter()
        .flat_map(|client| {
            langs
                .iter()
                .map(move |server| (client.clone(), server.clone()))
        })
        .collect()
}

async fn cmd_run(pairs: &[(String, String)], run: &RunArgs) -> Result<Vec<SuiteReport>> {
    let mut reports = Vec::with_capacity(pairs.len());
    for (client_lang, server_lang) in pairs {
        let client = run.load_driver(client_lang)?;
        let server = run.load_driver(server_lang)?;

        let report = CompatSuite::new(&client, &server)
            .only(&run.only)
            .run()
            .await;
        println!("{}", report.render());
        reports.push(report);
    }
    Ok(reports)
}

fn summarize(reports: &[SuiteReport]) -> Result<()> {
    let failed: Vec<&SuiteReport> = reports.iter().filter(|r| !r.success()).collect();
    if failed.is_empty() {
        println!("\n✓ {} suite(s) passed", reports.len());
        return Ok(());
    }

    println!("\n✗ {} of {} suite(s) failed:", failed.len(), reports.len());
    for report in &failed {
        for case in report.failures() {
            println!("  {} / {}", report.name, case.name);
        }
    }
    anyhow::bail!("compatibility failures in {} suite(s)", failed.len())
}
