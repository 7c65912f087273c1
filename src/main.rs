// src/main.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rpmrepo::repository::group_modules;
use rpmrepo::{FetchError, RepositoryClient, RepositoryConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "rpmrepo")]
#[command(author, version, about = "Fetch and decode Yum/DNF repository metadata", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repository base URL (overrides the configuration file)
    #[arg(short, long)]
    url: Option<String>,

    /// Ceiling on decompressed bytes read per artifact
    #[arg(long)]
    max_size: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the repomd.xml index
    Repomd,
    /// List RPM packages from the primary catalog
    Packages,
    /// List comps.xml groups
    Groups,
    /// List comps.xml environments
    Environments,
    /// List modules and their streams
    Modules,
    /// Print the detached repomd.xml signature
    Signature,
    /// Fetch a GPG public key and print its fingerprints
    GpgKey {
        /// URL of the armored key
        url: String,
    },
}

fn load_config(cli: &Cli) -> Result<RepositoryConfig> {
    let mut config = match &cli.config {
        Some(path) => RepositoryConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RepositoryConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.url = url.clone();
    }
    if let Some(max_size) = cli.max_size {
        config.max_xml_size = max_size;
    }
    Ok(config)
}

fn report(err: FetchError) -> anyhow::Error {
    match err.status {
        Some(status) => anyhow::Error::new(err).context(format!("fetch failed with HTTP {status}")),
        None => anyhow::Error::new(err),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    if config.url.is_empty() && !matches!(cli.command, Commands::GpgKey { .. }) {
        anyhow::bail!("no repository URL given; use --url or a configuration file");
    }

    let mut client = RepositoryClient::new(config)?;

    match cli.command {
        Commands::Repomd => {
            let repomd = client.repomd().map_err(report)?;
            println!("revision {}", repomd.value.revision);
            for data in &repomd.value.data {
                println!("{}\t{}", data.kind, data.href);
            }
        }
        Commands::Packages => {
            let packages = client.packages().map_err(report)?;
            for package in packages.value {
                println!("{}\t{}", package.nevra(), package.summary);
            }
            info!("{} packages", packages.value.len());
        }
        Commands::Groups => {
            let groups = client.groups().map_err(report)?;
            for group in groups.value {
                println!("{}\t{}", group.id, group.name);
            }
        }
        Commands::Environments => {
            let environments = client.environments().map_err(report)?;
            for env in environments.value {
                println!("{}\t{}\t{}", env.id, env.name, env.groups.join(","));
            }
        }
        Commands::Modules => {
            let streams = client.module_streams().map_err(report)?.value.to_vec();
            for module in group_modules(streams) {
                let streams: Vec<&str> = module.streams.iter().map(|s| s.stream.as_str()).collect();
                println!("{}\t{}", module.name, streams.join(","));
            }
        }
        Commands::Signature => {
            let signature = client.signature().map_err(report)?;
            print!("{}", signature.value);
        }
        Commands::GpgKey { url } => {
            let key = client.gpg_key(&url)?;
            for fingerprint in &key.fingerprints {
                println!("{fingerprint}");
            }
        }
    }

    Ok(())
}
