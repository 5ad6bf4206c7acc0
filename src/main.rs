use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use mcp_dispatch::config::{ConfigLoader, ConfigValidator, ManagerConfig};
use mcp_dispatch::utils::init_tracing;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "mcp-dispatch")]
#[command(about = "Inspect and validate MCP dispatch configuration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration (defaults, file, environment)
    Show {
        /// Configuration file path
        #[arg(short, long, env = "MCP_DISPATCH_CONFIG")]
        config: Option<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Toml)]
        format: OutputFormat,
    },
    /// Validate a configuration file
    Validate {
        /// Configuration file path
        path: String,
    },
    /// Print the configuration JSON Schema
    Schema,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Toml,
    Json,
    Yaml,
}

fn load(path: Option<&str>) -> anyhow::Result<ManagerConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader.load().context("Failed to load configuration")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Show { config, format } => {
                let config = load(config.as_deref())?;
                init_tracing(&config.logging);
                debug!("Effective configuration loaded");

                let rendered = match format {
                    OutputFormat::Toml => toml::to_string_pretty(&config)?,
                    OutputFormat::Json => serde_json::to_string_pretty(&config)?,
                    OutputFormat::Yaml => serde_yaml::to_string(&config)?,
                };
                println!("{}", rendered);
            }
            ConfigCommand::Validate { path } => {
                let config = load(Some(&path))?;
                init_tracing(&config.logging);
                info!("Configuration {} is valid", path);
                println!("{}: ok", path);
            }
            ConfigCommand::Schema => {
                println!("{}", ConfigValidator::new().export_schema());
            }
        },
    }

    Ok(())
}
