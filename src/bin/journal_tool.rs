use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use syncjournal::{CheckReport, Journal, JournalConfig, check_journal};

#[derive(Parser)]
#[command(name = "journal-tool")]
#[command(about = "Inspect and edit sync journals through the staged working copy")]
struct Cli {
    #[command(flatten)]
    retry: RetryArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RetryArgs {
    /// Attempts while the journal is locked
    #[arg(long, global = true, default_value_t = 120)]
    busy_retries: usize,
    /// Attempts while the journal schema keeps changing
    #[arg(long, global = true, default_value_t = 10)]
    schema_retries: usize,
    /// Pause between busy attempts
    #[arg(long, global = true, default_value_t = 100)]
    retry_interval_ms: u64,
    /// Working copy suffix
    #[arg(long, global = true, default_value = "ctmp")]
    suffix: String,
}

impl RetryArgs {
    fn config(&self) -> JournalConfig {
        JournalConfig::new()
            .busy_attempts(self.busy_retries)
            .schema_attempts(self.schema_retries)
            .retry_interval(Duration::from_millis(self.retry_interval_ms))
            .staging_suffix(&self.suffix)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Validate the journal, recreating it when it is corrupt
    Check {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Report whether the journal holds state from an earlier run
    Status { path: PathBuf },
    /// Run a query against a working copy and print the rows
    Query {
        path: PathBuf,
        sql: String,
        #[arg(long)]
        json: bool,
    },
    /// Run a write statement; keep the result only with --commit
    Exec {
        path: PathBuf,
        sql: String,
        #[arg(long)]
        commit: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.retry.config();
    config.validate()?;

    match cli.command {
        Command::Check { path, json } => check(&path, json, config),
        Command::Status { path } => status(&path, config),
        Command::Query { path, sql, json } => query(&path, &sql, json, config),
        Command::Exec { path, sql, commit } => exec(&path, &sql, commit, config),
    }
}

fn open(path: &Path, config: JournalConfig) -> Result<Journal> {
    Journal::open(path, config)
        .with_context(|| format!("Failed to open journal '{}'", path.display()))
}

fn check(path: &Path, json: bool, config: JournalConfig) -> Result<()> {
    let report = check_journal(path, config.busy_retry)
        .with_context(|| format!("Failed to check journal '{}'", path.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    match report {
        CheckReport::Intact => println!("{}: intact", path.display()),
        CheckReport::Created => println!("{}: created", path.display()),
        CheckReport::Recreated(reason) => {
            println!("{}: recreated ({:?})", path.display(), reason)
        }
    }
    Ok(())
}

fn status(path: &Path, config: JournalConfig) -> Result<()> {
    let journal = open(path, config)?;
    if journal.existed() {
        println!("{}: resuming from existing journal", path.display());
    } else {
        println!("{}: first run, journal is empty", path.display());
    }
    journal.discard()?;
    Ok(())
}

fn query(path: &Path, sql: &str, json: bool, config: JournalConfig) -> Result<()> {
    let journal = open(path, config)?;
    let result = journal.query(sql);
    journal.discard()?;

    let rows = result.map_err(|e| anyhow!("Query failed: {}", e))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        rows.print();
    }
    Ok(())
}

fn exec(path: &Path, sql: &str, commit: bool, config: JournalConfig) -> Result<()> {
    let journal = open(path, config)?;
    let rowid = match journal.mutate(sql) {
        Ok(rowid) => rowid,
        Err(err) => {
            journal.discard()?;
            return Err(anyhow!("Statement failed: {}", err));
        }
    };

    if commit {
        journal.commit().context("Failed to promote working copy")?;
        println!("Committed. Last insert row id: {}", rowid);
    } else {
        journal.discard()?;
        println!("Dry run (use --commit to keep). Last insert row id: {}", rowid);
    }
    Ok(())
}
