//! rsftp - resilient SFTP from the command line

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use resilient_sftp::profile::ConnectionProfile;
use resilient_sftp::SftpClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// rsftp - SFTP operations with automatic reconnect and retry.
#[derive(Parser, Debug)]
#[command(name = "rsftp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to connection profile (default: ~/.resilient-sftp/profile.json)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Remote host, overrides the profile
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// SSH port, overrides the profile
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Username, overrides the profile
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Private key file, overrides the profile
    #[arg(short, long, global = true, value_name = "FILE")]
    pub key: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List a remote directory
    Ls {
        /// Remote directory
        #[arg(default_value = ".")]
        dir: String,
    },

    /// Upload a local file into a remote directory
    Put {
        /// Local file
        file: PathBuf,

        /// Remote directory
        dir: String,
    },

    /// Download a remote file into a local directory or file
    Get {
        /// Remote file
        remote: String,

        /// Local directory or file
        #[arg(default_value = ".")]
        local: PathBuf,
    },

    /// Move or rename a remote file
    Mv {
        from: String,
        to: String,
    },

    /// Delete one or more remote files
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn build_client(cli: &Cli) -> anyhow::Result<SftpClient> {
    let mut profile = ConnectionProfile::load_or_default(cli.config.as_deref()).await?;

    if let Some(host) = &cli.host {
        profile.host = host.clone();
    }
    if let Some(port) = cli.port {
        profile.port = port;
    }
    if let Some(user) = &cli.user {
        profile.username = Some(user.clone());
    }
    if let Some(key) = &cli.key {
        profile.private_key_path = Some(key.clone());
    }

    let key = profile
        .read_private_key()
        .await
        .context("Cannot load private key (use --key or set private_key_path)")?;

    Ok(profile.builder().private_key(key).build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let sftp = build_client(&cli).await?;

    let result = match &cli.command {
        Commands::Ls { dir } => sftp.list_directory(dir).await.map(|names| {
            for name in names {
                println!("{}", name);
            }
        }),
        Commands::Put { file, dir } => sftp.upload(file, dir).await,
        Commands::Get { remote, local } => sftp
            .download(remote, local)
            .await
            .map(|path| println!("{}", path.display())),
        Commands::Mv { from, to } => sftp.rename(from, to).await,
        Commands::Rm { paths } => match paths.as_slice() {
            [single] => sftp.delete(single).await,
            _ => sftp.delete_all(paths.iter().cloned()).await,
        },
    };

    sftp.disconnect().await;
    result?;
    Ok(())
}
