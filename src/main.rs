use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use oci_registry::{Client, ClientBuilder, ClientConfig, FetchFailure, Reference};

/// Inspect images in a Docker Registry V2 / OCI distribution registry
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Registry host, e.g. ghcr.io or http://localhost:5000
    #[arg(long)]
    host: Option<String>,

    /// Username for the token endpoint
    #[arg(short, long)]
    username: Option<String>,

    /// Password for the token endpoint
    #[arg(short, long)]
    password: Option<String>,

    /// Preset bearer token, used for every repository
    #[arg(short, long)]
    token: Option<String>,

    /// Configuration file (defaults to ./oci-registry.{toml,yaml,json} if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the image configuration JSON
    Metadata {
        repository: String,

        /// Tag or digest
        #[arg(long, default_value = "latest")]
        tag: String,
    },

    /// Print the image labels and runtime configuration
    Labels {
        repository: String,

        /// Tag or digest
        #[arg(long, default_value = "latest")]
        tag: String,
    },

    /// List every tag of a repository
    Tags { repository: String },

    /// Write the first file with the given name found in the image layers to stdout
    FindFile {
        repository: String,

        /// Base name of the file to look for
        file_name: String,

        /// Tag or digest
        #[arg(long, default_value = "latest")]
        tag: String,
    },

    /// Check that the registry API answers
    Ping,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    let client = build_client(&cli)?;

    match cli.command {
        Commands::Metadata { repository, tag } => {
            let reference = parse_reference(&tag)?;
            let config = client
                .metadata(&repository, &reference)
                .with_context(|| format!("Failed to resolve metadata for {}:{}", repository, tag))?;
            println!("{}", serde_json::to_string_pretty(config.as_value())?);
        }
        Commands::Labels { repository, tag } => {
            let reference = parse_reference(&tag)?;
            let config = client
                .metadata(&repository, &reference)
                .with_context(|| format!("Failed to resolve metadata for {}:{}", repository, tag))?;
            let runtime = config
                .config()
                .map(|c| Value::Object(c.clone()))
                .unwrap_or(Value::Null);
            let labels = runtime.get("Labels").cloned().unwrap_or(Value::Null);

            println!("Labels:");
            println!("{}", serde_json::to_string_pretty(&labels)?);
            println!("\nOther Metadata:");
            println!("{}", serde_json::to_string_pretty(&runtime)?);
        }
        Commands::Tags { repository } => {
            let listing = client
                .tags_with(&repository, |tag| println!("{}", tag))
                .with_context(|| format!("Failed to list tags for {}", repository))?;
            report_failures(&listing.failures);
            info!("{} tags listed for {}", listing.value.len(), repository);
        }
        Commands::FindFile {
            repository,
            file_name,
            tag,
        } => {
            let reference = parse_reference(&tag)?;
            let layers = client
                .layers(&repository, &reference)
                .with_context(|| format!("Failed to resolve layers for {}:{}", repository, tag))?;
            let search = client.find_file_in_layers(&repository, &layers, &file_name)?;
            report_failures(&search.failures);

            match search.value {
                Some(found) => {
                    let mut stdout = io::stdout().lock();
                    stdout.write_all(&found.content)?;
                    stdout.flush()?;
                }
                None => {
                    warn!("'{}' not found in {} layers of {}:{}", file_name, layers.len(), repository, tag);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Ping => {
            let response = client.ping().context("Registry did not answer")?;
            println!(
                "{} {} {}",
                client.registry_url(),
                response.status.as_u16(),
                response.reason()
            );
            if !response.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn build_client(cli: &Cli) -> Result<Client> {
    let config = ClientConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let mut builder = ClientBuilder::from_config(config);

    if let Some(host) = &cli.host {
        builder = builder.host(host.clone());
    }
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        builder = builder.credentials(username.clone(), password.clone());
    }
    if let Some(token) = &cli.token {
        builder = builder.token(token.clone());
    }

    builder.build().context("Failed to create registry client")
}

fn parse_reference(tag: &str) -> Result<Reference> {
    tag.parse::<Reference>()
        .with_context(|| format!("'{}' is neither a tag nor a digest", tag))
}

fn report_failures(failures: &[FetchFailure]) {
    for failure in failures {
        warn!("Incomplete result: {}", failure);
    }
}
