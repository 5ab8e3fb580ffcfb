//! strata CLI
//!
//! Command-line tool for diffing schema snapshots, planning and linting
//! migrations, and verifying migration history.

use std::path::PathBuf;

use anyhow::bail;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use strata_core::prelude::*;
use strata_core::plan::DEFAULT_MAX_GROUP_SIZE;
use strata_migrate::prelude::*;

/// Schema diffing and migration planning.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by the diffing commands.
#[derive(Args)]
struct DiffArgs {
    /// Snapshot of the current schema (JSON).
    current: PathBuf,

    /// Snapshot of the desired schema (JSON).
    desired: PathBuf,

    /// Detect renames heuristically.
    #[arg(long)]
    detect_renames: bool,

    /// Minimum score for a detected rename.
    #[arg(long, requires = "detect_renames")]
    rename_threshold: Option<f64>,

    /// Fail on ambiguous renames instead of emitting drop and add.
    #[arg(long)]
    strict: bool,
}

impl DiffArgs {
    fn options(&self) -> DiffOptions {
        let mut options = DiffOptions::new();
        if self.detect_renames {
            options = options.with_rename_detection();
        }
        if let Some(threshold) = self.rename_threshold {
            options = options.with_threshold(threshold);
        }
        if self.strict {
            options = options.strict();
        }
        options
    }
}

/// Inputs shared by the planning commands.
#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    diff: DiffArgs,

    /// Target dialect (sqlite, postgres, mysql). Defaults to the snapshots' dialect.
    #[arg(short, long, env = "STRATA_DIALECT")]
    dialect: Option<DialectFamily>,

    /// Capability descriptor (JSON) overriding the dialect's built-in one.
    #[arg(long, env = "STRATA_CAPABILITIES")]
    capabilities: Option<PathBuf>,

    /// Maximum number of changes per group.
    #[arg(long, default_value_t = DEFAULT_MAX_GROUP_SIZE)]
    max_group_size: usize,

    /// Turn matching drop and add pairs into renames.
    #[arg(long)]
    collapse_renames: bool,

    /// Build indexes concurrently where the dialect can.
    #[arg(long)]
    concurrent_indexes: bool,
}

impl PlanArgs {
    fn options(&self) -> PlannerOptions {
        let mut options = PlannerOptions::new().with_max_group_size(self.max_group_size);
        if self.collapse_renames {
            options = options.with_collapse_renames();
        }
        if self.concurrent_indexes {
            options = options.with_concurrent_indexes();
        }
        options
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the changes between two schema snapshots.
    Diff {
        #[command(flatten)]
        args: DiffArgs,
    },

    /// Plan a migration and show it with its findings.
    Plan {
        #[command(flatten)]
        args: PlanArgs,
    },

    /// Lint a migration plan.
    Lint {
        #[command(flatten)]
        args: PlanArgs,

        /// Exit with an error if any change is destructive.
        #[arg(long)]
        deny_destructive: bool,
    },

    /// Print the content hash of each migration record and the history sum.
    Hash {
        /// Migration records (JSON array).
        records: PathBuf,
    },

    /// Verify migration history for drift.
    Verify {
        /// Migration records (JSON array). Takes precedence over the database.
        records: Option<PathBuf>,

        /// Database URL of the history store.
        #[arg(long, env = "DATABASE_URL")]
        database: Option<String>,

        /// Require versions to increase by exactly one.
        #[arg(long)]
        contiguous: bool,

        /// Expected history sum (`h1:...`).
        #[arg(long)]
        sum: Option<String>,
    },
}

fn diff(args: &DiffArgs) -> anyhow::Result<(Schema, SchemaDiff)> {
    let current = load_schema(&args.current)?;
    let desired = load_schema(&args.desired)?;
    let diff = Differ::with_options(args.options()).diff(&current, &desired)?;
    for ambiguous in &diff.ambiguous {
        warn!(
            dropped = %ambiguous.dropped,
            candidates = ?ambiguous.candidates,
            "Ambiguous rename left as drop and add; supply a rename hint"
        );
    }
    Ok((current, diff))
}

fn plan(args: &PlanArgs) -> anyhow::Result<(Plan, LintReport)> {
    let (current, diff) = diff(&args.diff)?;
    let caps = resolve_capabilities(args.capabilities.as_deref(), args.dialect, current.dialect)?;
    let plan = Planner::new(caps).with_options(args.options()).plan(&diff.changes)?;
    let lint = Linter::new().lint(&plan);
    info!(
        groups = plan.groups.len(),
        changes = plan.len(),
        destructive = lint.count(Severity::Destructive),
        "Planned migration"
    );
    Ok((plan, lint))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Diff { args } => {
            let (_, diff) = diff(&args)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&diff)?);
            } else {
                print!("{}", render_diff(&diff));
            }
        }

        Commands::Plan { args } => {
            let (plan, lint) = plan(&args)?;
            if cli.json {
                let output = PlanOutput {
                    plan: &plan,
                    lint: &lint,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print!("{}", render_plan(&plan, &lint));
            }
        }

        Commands::Lint {
            args,
            deny_destructive,
        } => {
            let (_, lint) = plan(&args)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&lint)?);
            } else {
                print!("{}", render_lint(&lint));
            }
            if deny_destructive && lint.has_destructive() {
                bail!(
                    "{} destructive change(s) found",
                    lint.count(Severity::Destructive)
                );
            }
        }

        Commands::Hash { records } => {
            let records = load_records(&records)?;
            let hashed: Vec<MigrationRecord> = records
                .iter()
                .map(|r| MigrationRecord {
                    hash: r.computed_hash(),
                    ..r.clone()
                })
                .collect();
            let sum = HistorySum::compute(&hashed);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&sum)?);
            } else {
                print!("{}", render_hashes(&records, &sum));
            }
        }

        Commands::Verify {
            records,
            database,
            contiguous,
            sum,
        } => {
            let records = match (records, database) {
                (Some(path), _) => load_records(&path)?,
                (None, Some(url)) => HistoryStore::connect(&url).await?.records().await?,
                (None, None) => bail!("Pass a records file or --database (or set DATABASE_URL)"),
            };

            let options = if contiguous {
                VerifyOptions::new().contiguous()
            } else {
                VerifyOptions::new()
            };
            let verifier = HistoryVerifier::with_options(options);
            let report = verifier.verify(&records)?;
            if let Some(expected) = sum {
                verifier.verify_sum(&records, &expected)?;
            }

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                match report.last_version {
                    Some(version) => println!(
                        "History intact: {} migration(s), last version {version}",
                        report.records_checked
                    ),
                    None => println!("History is empty."),
                }
            }
        }
    }

    Ok(())
}
