//! srtp-session - protect and unprotect RTP/RTCP packets with SRTP
//!
//! Packets are read from stdin as base64 lines and written to stdout the
//! same way.

use std::io;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use srtp_session::config::Config;
use srtp_session::media::srtp::{parse_crypto_line, KeyingMaterial};
use srtp_session::pipe::{self, Direction};

#[derive(Parser)]
#[command(name = "srtp-session")]
#[command(about = "Protect and unprotect RTP/RTCP packets with SRTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a master key and salt and print it as an SDP crypto line
    Keygen {
        /// Crypto tag number for the a=crypto line
        #[arg(short, long, default_value = "1")]
        tag: u32,

        /// Store the key in the config file
        #[arg(long)]
        save: bool,
    },

    /// Encrypt RTP/RTCP packets (base64, one per line) from stdin
    Protect {
        /// Treat every packet as RTCP
        #[arg(long)]
        rtcp: bool,

        /// Key from an SDP crypto line instead of the config file
        #[arg(long)]
        crypto: Option<String>,
    },

    /// Decrypt SRTP/SRTCP packets (base64, one per line) from stdin
    Unprotect {
        /// Treat every packet as SRTCP
        #[arg(long)]
        rtcp: bool,

        /// Key from an SDP crypto line instead of the config file
        #[arg(long)]
        crypto: Option<String>,
    },

    /// Show the effective configuration (key redacted)
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr, stdout carries packets)
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Keygen { tag, save } => {
            let material = KeyingMaterial::generate()?;
            println!("{}", material.crypto_line(tag, config.profile()?));
            if save {
                let updated = Config {
                    key: Some(material.to_base64()),
                    ..config
                };
                match &cli.config {
                    Some(path) => updated.save_to(path)?,
                    None => updated.save()?,
                }
                tracing::info!("Key saved to config");
            }
        }
        Commands::Protect { rtcp, crypto } => {
            run_pipe(&config, Direction::Protect, rtcp, crypto.as_deref())?;
        }
        Commands::Unprotect { rtcp, crypto } => {
            run_pipe(&config, Direction::Unprotect, rtcp, crypto.as_deref())?;
        }
        Commands::Config => {
            let shown = Config {
                key: config.key.as_ref().map(|_| "<redacted>".to_string()),
                ..config.clone()
            };
            print!(
                "{}",
                toml::to_string_pretty(&shown).context("Failed to serialize config")?
            );
        }
    }

    Ok(())
}

fn run_pipe(config: &Config, direction: Direction, rtcp: bool, crypto: Option<&str>) -> Result<()> {
    let context = match crypto {
        Some(line) => {
            let attr = parse_crypto_line(line)?;
            tracing::debug!("Using key from crypto line tag {}", attr.tag);
            let config = Config {
                profile: attr.profile.to_string(),
                ..config.clone()
            };
            config.build_context(Some(&attr.material))?
        }
        None => config.build_context(None)?,
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let stats = pipe::run(&context, direction, rtcp, stdin.lock(), stdout.lock())?;
    tracing::info!(
        "{} packets processed, {} dropped",
        stats.processed,
        stats.dropped
    );
    Ok(())
}
