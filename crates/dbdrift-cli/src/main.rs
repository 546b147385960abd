//! dbdrift CLI - database schema/data reconciliation and migrations.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use dbdrift::{
    create_compare_rule, generate_schema_sql, stream_compare_to_diff, AdapterImpl, Config,
    DbAdapter, DialectImpl, DriftError, MigrationRunner, RuleSet, SqlDialect,
};

#[derive(Parser)]
#[command(name = "dbdrift")]
#[command(about = "Reconcile schemas and data between databases, apply versioned migrations")]
#[command(version)]
struct Cli {
    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare schemas and write schema_diff.sql to the working directory
    DiffSchema {
        /// Path to the YAML config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Compare table data per rules file and write data_diff.sql
    DiffData {
        /// Path to the YAML config file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the JSON rules file
        #[arg(short, long)]
        rules: PathBuf,

        /// Rows fetched per batch
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
    },

    /// Apply versioned migration scripts to the target database
    MigrateScript {
        /// Path to the YAML config file
        #[arg(short, long)]
        config: PathBuf,

        /// Directory holding the migration scripts
        #[arg(short, long)]
        dir: PathBuf,

        /// Target version; defaults to the greatest discovered version
        #[arg(short = 'v', long)]
        version: Option<String>,

        /// Rehearse inside a transaction and roll back
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Drop and recreate the target database (MySQL) or schema (PostgreSQL)
    ResetDb {
        /// Path to the YAML config file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.verbosity);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: &str) {
    let level = match verbosity {
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

async fn run(command: Commands) -> Result<(), DriftError> {
    match command {
        Commands::DiffSchema { config } => diff_schema(&config).await,
        Commands::DiffData {
            config,
            rules,
            batch_size,
        } => diff_data(&config, &rules, batch_size).await,
        Commands::MigrateScript {
            config,
            dir,
            version,
            dry_run,
        } => migrate_script(&config, &dir, version.as_deref(), dry_run).await,
        Commands::ResetDb { config } => reset_db(&config).await,
    }
}

async fn diff_schema(config_path: &Path) -> Result<(), DriftError> {
    let config = Config::load(config_path)?;
    let src = AdapterImpl::connect(&config.source_db).await?;
    let tgt = AdapterImpl::connect(&config.target_db).await?;

    let result = async {
        info!("comparing schemas");
        let diff = dbdrift::compare_schemas_with_adapters(&src, &tgt).await?;
        let sqls = generate_schema_sql(&diff, config.target_db.db_type);

        let out_path = std::env::current_dir()?.join("schema_diff.sql");
        info!("writing {:?}", out_path);
        let mut out = File::create(&out_path)?;
        for sql in &sqls {
            if !sql.is_empty() {
                writeln!(out, "{}", sql)?;
            }
        }
        Ok(())
    }
    .await;

    src.close().await;
    tgt.close().await;
    result
}

async fn diff_data(
    config_path: &Path,
    rules_path: &Path,
    batch_size: usize,
) -> Result<(), DriftError> {
    let config = Config::load(config_path)?;
    let rules = RuleSet::load(rules_path)?;
    let src = AdapterImpl::connect(&config.source_db).await?;
    let tgt = AdapterImpl::connect(&config.target_db).await?;

    let result = async {
        let dialect = DialectImpl::from_db_type(config.target_db.db_type);
        let out_path = std::env::current_dir()?.join("data_diff.sql");
        info!("writing {:?}", out_path);
        let mut out = File::create(&out_path)?;

        for rule in &rules.rules {
            let table = match tgt.extract_table(&rule.table).await {
                Ok(table) => table,
                Err(e) => {
                    error!("failed to extract table {}: {}", rule.table, e);
                    continue;
                }
            };

            info!("comparing data for table {}", rule.table);
            writeln!(out, "--- diff {} ", rule.table)?;

            let compare_rule = create_compare_rule(&table, &rule.comparison_key);
            let diff =
                match stream_compare_to_diff(&src, &tgt, &compare_rule, batch_size).await {
                    Ok(diff) => diff,
                    Err(e) => {
                        error!("failed to compare data for table {}: {}", rule.table, e);
                        continue;
                    }
                };

            for row in &diff.dropped {
                writeln!(out, "{}", dialect.generate_delete_sql(&table, row))?;
            }
            for row in &diff.added {
                writeln!(out, "{}", dialect.generate_insert_sql(&table, row))?;
            }
            for row in &diff.modified {
                writeln!(
                    out,
                    "{}",
                    dialect.generate_update_sql(&table, &row.new, &rule.comparison_key)
                )?;
            }
        }
        Ok(())
    }
    .await;

    src.close().await;
    tgt.close().await;
    result
}

async fn migrate_script(
    config_path: &Path,
    dir: &Path,
    version: Option<&str>,
    dry_run: bool,
) -> Result<(), DriftError> {
    let config = Config::load(config_path)?;
    let tgt = AdapterImpl::connect(&config.target_db).await?;

    let runner = MigrationRunner::new(&tgt);
    let result = runner.run(dir, version, dry_run).await;

    tgt.close().await;
    result
}

async fn reset_db(config_path: &Path) -> Result<(), DriftError> {
    let config = Config::load(config_path)?;
    let tgt = AdapterImpl::connect(&config.target_db).await?;

    let runner = MigrationRunner::new(&tgt);
    let result = runner.reset_database().await;

    tgt.close().await;
    result
}
