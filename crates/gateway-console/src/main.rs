//! Gateway console binary.
//!
//! Lists, adds, edits and removes the services registered with an API gateway,
//! and fetches their OpenAPI documents through the gateway backend.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gateway_console::{Console, ConsoleConfig, ServiceDescriptor, ServiceRegistry, SyncEvent};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "gateway-console")]
#[command(about = "Manage the service registry of an API gateway")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gateway backend URL (overrides the config file)
    #[arg(long, env = "GATEWAY_CONSOLE_BACKEND")]
    backend_url: Option<String>,

    /// Per-request timeout, e.g. "30s" (overrides the config file)
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    timeout: Option<Duration>,

    #[arg(long, default_value = "warn")]
    log_level: String,

    #[arg(long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered services
    List,

    /// Show one registered service
    Show { name: String },

    /// Register a new service
    Add {
        name: String,
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        swagger: String,
    },

    /// Change the endpoint and OpenAPI path of a registered service
    Update {
        name: String,
        #[arg(long)]
        endpoint: String,
        #[arg(long)]
        swagger: String,
    },

    /// Unregister a service
    Remove { name: String },

    /// Check whether an upstream base URL is reachable
    Check {
        /// Registered service name, or a base URL with --url
        target: String,
        /// Treat TARGET as a URL instead of a service name
        #[arg(long)]
        url: bool,
    },

    /// Fetch the interactive test page of a registered service
    Swagger { name: String },

    /// Fetch a service's upstream OpenAPI document through the backend
    Original {
        name: String,
        /// Preview an unregistered service at this endpoint
        #[arg(long, requires = "swagger")]
        endpoint: Option<String>,
        #[arg(long, requires = "endpoint")]
        swagger: Option<String>,
    },

    /// Fetch the gateway's OpenAPI document for a registered service
    Openapi { name: String },

    /// List OpenAPI documents stored on the backend
    Files,

    /// Fetch one OpenAPI document stored on the backend
    SwaggerFile { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn load_config(cli: &Cli) -> Result<ConsoleConfig> {
    let mut config = match &cli.config {
        Some(path) => ConsoleConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => ConsoleConfig::default(),
    };
    if let Some(url) = &cli.backend_url {
        config = config.with_backend_url(url);
    }
    if cli.timeout.is_some() {
        config.request_timeout = cli.timeout;
    }
    config.validate()?;
    Ok(config)
}

fn print_registry(registry: &ServiceRegistry, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(registry.as_slice())?);
        }
        OutputFormat::Table => {
            if registry.is_empty() {
                println!("No services registered");
                return Ok(());
            }
            println!("{:<20} {:<45} SWAGGER", "NAME", "ENDPOINT");
            for service in registry.iter() {
                println!(
                    "{:<20} {:<45} {}",
                    service.name, service.endpoint, service.swagger
                );
            }
        }
    }
    Ok(())
}

fn print_service(service: &ServiceDescriptor, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(service)?),
        OutputFormat::Table => {
            println!("Name:     {}", service.name);
            println!("Endpoint: {}", service.endpoint);
            println!("OpenAPI:  {}", service.swagger);
            println!("Document: {}", service.document_url());
            for key in service.extra.keys() {
                println!("Extra:    {}", key);
            }
        }
    }
    Ok(())
}

/// Wait for pending pushes and report them. Fails if any push was rejected.
async fn finish(console: Console) -> Result<()> {
    let events = console.shutdown().await;
    let failures: Vec<&SyncEvent> = events.iter().filter(|e| e.is_failure()).collect();

    for event in &events {
        if event.is_failure() {
            error!("{}", event);
        } else {
            info!("{}", event);
        }
    }

    if let Some(first) = failures.first() {
        anyhow::bail!(
            "Local change applied but {} of {} snapshot pushes failed: {}",
            failures.len(),
            events.len(),
            first
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;
    let mut console = Console::connect(&config)
        .await
        .with_context(|| format!("Failed to load registry from {}", config.backend_url))?;

    match cli.command {
        Commands::List => {
            print_registry(console.registry(), cli.format)?;
        }

        Commands::Show { name } => {
            print_service(console.lookup(&name)?, cli.format)?;
        }

        Commands::Add {
            name,
            endpoint,
            swagger,
        } => {
            let registry = console.add(&name, &endpoint, &swagger)?;
            println!("Added '{}' ({} services)", name, registry.len());
        }

        Commands::Update {
            name,
            endpoint,
            swagger,
        } => {
            console.update(&name, &endpoint, &swagger)?;
            println!("Updated '{}'", name);
        }

        Commands::Remove { name } => {
            let existed = console.registry().lookup(&name).is_some();
            let registry = console.remove(&name);
            if existed {
                println!("Removed '{}' ({} services)", name, registry.len());
            } else {
                println!("No service named '{}'; registry unchanged", name);
            }
        }

        Commands::Check { target, url } => {
            let base = if url {
                target.clone()
            } else {
                console.lookup(&target)?.endpoint.clone()
            };
            let exists = console.check(&base).await?;
            println!("{} {}", if exists { "✅" } else { "❌" }, base);
            if !exists {
                finish(console).await?;
                std::process::exit(1);
            }
        }

        Commands::Swagger { name } => {
            println!("{}", console.test_document(&name).await?);
        }

        Commands::Original {
            name,
            endpoint,
            swagger,
        } => {
            let document = match (endpoint, swagger) {
                (Some(endpoint), Some(swagger)) => {
                    let preview = ServiceDescriptor::new(name, endpoint, swagger);
                    console.preview_document(&preview).await?
                }
                _ => console.service_document(&name).await?,
            };
            println!("{}", document);
        }

        Commands::Openapi { name } => {
            let document = console.openapi(&name).await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }

        Commands::Files => {
            let files = console.local_files().await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&files)?),
                OutputFormat::Table => {
                    for file in files {
                        println!("{}", file);
                    }
                }
            }
        }

        Commands::SwaggerFile { name } => {
            println!("{}", console.swagger_file(&name).await?);
        }
    }

    finish(console).await
}
