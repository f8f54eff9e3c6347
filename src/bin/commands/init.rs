use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use datakeep::{Database, DatabaseConfig, SchemaMetadata};

/// Arguments for the Init command
#[derive(Args)]
pub struct InitArgs {
    /// Schema file listing the tables to create (TOML)
    #[clap(short, long, value_name = "FILE")]
    pub schema: PathBuf,
}

pub async fn run(config: &DatabaseConfig, args: InitArgs) -> Result<()> {
    let metadata = SchemaMetadata::from_file(&args.schema)?;
    let table_count = metadata.tables().len();

    let db = Database::new(config, metadata)?;
    let initialized = db.initialize().await.map(|_| ());
    // release the pool whether or not initialization worked
    let closed = db.close().await;
    initialized?;
    closed?;

    println!(
        "Schema ready: {} table(s) at {}",
        table_count,
        db.engine().url()
    );
    Ok(())
}
