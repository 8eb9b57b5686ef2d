//! Demo entry point for `sqlrepo_core`.
//!
//! # Responsibility
//! - Wire a connection, schema and repository for a sample entity.
//! - Run every repository operation once and print the results.

use clap::Parser;
use log::info;
use rusqlite::types::Value;
use rusqlite::Row;
use sqlrepo_core::{
    auto_migrate, default_log_level, init_logging, open_db_with_config, Column, DbConfig, Entity,
    ExecContext, LogConfig, Record, Repository, SqlRepository,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "sqlrepo", version, about = "Runs a CRUD tour against a SQLite repository")]
struct Cli {
    /// Database file; omitted means a throwaway in-memory database.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off when omitted.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long, default_value_t = default_log_level().to_string())]
    log_level: String,

    /// Per-operation timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,
}

#[derive(Debug, Clone, Default)]
struct Person {
    record: Record,
    first_name: String,
    last_name: String,
}

impl Person {
    fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            ..Self::default()
        }
    }
}

impl Entity for Person {
    const TABLE: &'static str = "people";
    const COLUMNS: &'static [Column] = &[
        Column::new("first_name", "TEXT NOT NULL DEFAULT ''"),
        Column::new("last_name", "TEXT NOT NULL DEFAULT ''"),
    ];

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.first_name.clone()),
            Value::Text(self.last_name.clone()),
        ]
    }

    fn from_row(record: Record, row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            record,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sqlrepo: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(log_dir) = &cli.log_dir {
        init_logging(&LogConfig::new(cli.log_level.as_str(), log_dir))?;
    }

    let config = DbConfig {
        path: cli.db.clone(),
        ..DbConfig::default()
    };
    let conn = open_db_with_config(&config)?;
    auto_migrate::<Person>(&conn)?;
    let repo = SqlRepository::<Person>::try_new(&conn)?;
    let timeout = Duration::from_millis(cli.timeout_ms);
    info!(
        "event=cli_tour module=cli status=start core_version={}",
        sqlrepo_core::core_version()
    );

    let created = repo.create(&ExecContext::with_timeout(timeout), Person::new("Test", "Test"))?;
    println!("create      -> {}", describe(&created));

    let bulk = repo.create_bulk(
        &ExecContext::with_timeout(timeout),
        vec![Person::new("Marcos", "Huck"), Person::new("Andres", "Huck")],
    )?;
    for person in &bulk {
        println!("create_bulk -> {}", describe(person));
    }

    let fetched = repo.get(&ExecContext::with_timeout(timeout), created.record.id)?;
    println!("get         -> {}", describe(&fetched));

    let ids: Vec<_> = bulk.iter().map(|person| person.record.id).collect();
    let found = repo.find(&ExecContext::with_timeout(timeout), &ids)?;
    println!("find        -> {} of {} ids", found.len(), ids.len());

    let renamed = repo.update(
        &ExecContext::with_timeout(timeout),
        created.record.id,
        &Person::new("Renamed", ""),
    )?;
    println!("update      -> {}", describe(&renamed));

    let moved = repo.update_bulk(
        &ExecContext::with_timeout(timeout),
        &ids,
        &Person::new("", "Baker"),
    )?;
    for person in &moved {
        println!("update_bulk -> {}", describe(person));
    }

    let removed = repo.remove(&ExecContext::with_timeout(timeout), created.record.id)?;
    println!("remove      -> {}", describe(&removed));

    let removed_bulk = repo.remove_bulk(&ExecContext::with_timeout(timeout), &ids)?;
    println!("remove_bulk -> {} rows", removed_bulk.len());

    info!("event=cli_tour module=cli status=ok");
    Ok(())
}

fn describe(person: &Person) -> String {
    let deleted = match person.record.deleted_at {
        Some(at) => format!(" deleted_at={at}"),
        None => String::new(),
    };
    format!(
        "id={} first_name={} last_name={}{}",
        person.record.id, person.first_name, person.last_name, deleted
    )
}
