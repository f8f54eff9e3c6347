use anyhow::Result;
use clap::Args;
use datakeep::DatabaseConfig;
use serde::Serialize;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo<'a> {
    config_file: String,
    resolved_url: String,
    settings: &'a DatabaseConfig,
}

pub fn run(config: &DatabaseConfig, config_path: &Option<String>, args: ConfigArgs) -> Result<()> {
    let config_file = config_path
        .clone()
        .unwrap_or_else(DatabaseConfig::config_file_path);

    if args.json {
        let info = ConfigInfo {
            config_file,
            resolved_url: config.url(),
            settings: config,
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("Config File:        {}", config_file);
        println!("{}", config.summary());
    }
    Ok(())
}
