use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Args;
use datakeep::database::{table_exists, table_row_count};
use datakeep::{Database, DatabaseConfig, DatabaseUrl, PoolStatus, SchemaMetadata, SchemaStatus};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Arguments for the Status command
#[derive(Args)]
pub struct StatusArgs {
    /// Schema file listing the expected tables (TOML)
    #[clap(short, long, value_name = "FILE")]
    pub schema: Option<PathBuf>,

    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    url: String,
    pool: PoolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<SchemaStatus>,
    tables: Vec<TableReport>,
}

#[derive(Debug, Serialize)]
struct TableReport {
    name: String,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<u64>,
}

#[derive(Tabled)]
struct TableRow {
    table: String,
    exists: bool,
    rows: String,
}

pub async fn run(config: &DatabaseConfig, args: StatusArgs) -> Result<()> {
    let metadata = match &args.schema {
        Some(path) => SchemaMetadata::from_file(path)?,
        None => SchemaMetadata::new(),
    };
    let has_schema = !metadata.is_empty();

    // opening a missing file would create it, status only inspects
    let url = DatabaseUrl::parse(&config.url())?;
    if url.is_missing_file() {
        return Err(anyhow!(
            "Database '{}' does not exist; run `datakeep init` first",
            url
        ));
    }

    let db = Database::new(config, metadata)?;
    let report = collect(&db, has_schema).await;
    let closed = db.close().await;
    let report = report?;
    closed?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Database URL:       {}", report.url);
    println!(
        "Pool:               {} connection(s), {} idle",
        report.pool.connections, report.pool.idle_connections
    );
    if let Some(schema) = &report.schema {
        println!("Schema:             {}", schema);
    }

    if !report.tables.is_empty() {
        let rows: Vec<TableRow> = report
            .tables
            .iter()
            .map(|t| TableRow {
                table: t.name.clone(),
                exists: t.exists,
                rows: t
                    .rows
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
    }

    Ok(())
}

async fn collect(db: &Database, has_schema: bool) -> Result<StatusReport> {
    let pool = db.engine().status();
    let schema = if has_schema {
        Some(db.schema_status().await?)
    } else {
        None
    };

    let names: Vec<String> = db
        .metadata()
        .table_names()
        .into_iter()
        .map(String::from)
        .collect();
    let tables = db
        .engine()
        .run(move |conn| {
            let mut tables = Vec::with_capacity(names.len());
            for name in names {
                let exists = table_exists(conn, &name)?;
                let rows = if exists {
                    Some(table_row_count(conn, &name)?)
                } else {
                    None
                };
                tables.push(TableReport { name, exists, rows });
            }
            Ok(tables)
        })
        .await?;

    Ok(StatusReport {
        url: db.engine().url().to_string(),
        pool,
        schema,
        tables,
    })
}
