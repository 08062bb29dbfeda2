mod catalog;
mod config;
mod error;
mod logging;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use broker_core::BrokerRegistry;

use crate::config::BrokerConfig;
use crate::error::CliError;

/// Open Service Broker for infrastructure-as-code service offerings.
#[derive(Parser)]
#[command(name = "osb-broker", version, about = "Open Service Broker lifecycle server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the OSB HTTP API
    Serve {
        /// Port to listen on (overrides the config file and PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Path to TLS certificate PEM file (requires --tls-key)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires --tls-cert)
        #[arg(long)]
        tls_key: Option<PathBuf>,
        /// Extra service-definition files to load
        #[arg()]
        services: Vec<PathBuf>,
    },

    /// Print the catalog the broker would serve, as JSON
    Catalog {
        /// Extra service-definition files to load
        #[arg()]
        services: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let mut config = match BrokerConfig::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    logging::init(&config.log.level, cli.log_json || config.log.json);

    let result = match cli.command {
        Commands::Serve {
            port,
            tls_cert,
            tls_key,
            services,
        } => serve(&mut config, port, tls_cert, tls_key, services),
        Commands::Catalog { services } => {
            config.catalog.paths.extend(services);
            print_catalog(&config)
        }
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "osb-broker failed");
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn serve(
    config: &mut BrokerConfig,
    port: Option<u16>,
    tls_cert: Option<PathBuf>,
    tls_key: Option<PathBuf>,
    services: Vec<PathBuf>,
) -> Result<(), CliError> {
    if tls_cert.is_some() != tls_key.is_some() {
        return Err(CliError::IncompleteTls);
    }
    if let Some(port) = port {
        config.api.port = port;
    }
    if tls_cert.is_some() {
        config.api.tls_cert = tls_cert;
        config.api.tls_key = tls_key;
    }
    config.catalog.paths.extend(services);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve::start_server(config.clone()))
}

fn print_catalog(config: &BrokerConfig) -> Result<(), CliError> {
    let settings = config.settings()?;
    let registry: BrokerRegistry = catalog::load_registry(&config.catalog.paths, &settings)?;
    let services: Vec<_> = registry
        .get_enabled_services(&settings.flags)
        .into_iter()
        .map(|service| service.catalog_entry())
        .collect();
    let catalog = serde_json::json!({ "services": services });
    println!("{}", serde_json::to_string_pretty(&catalog)?);
    Ok(())
}
