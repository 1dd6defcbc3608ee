//! sign-release CLI
//!
//! `sign-release [OPTIONS] <SOURCE> <DESTINATION>`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sign_release::config::DetachedBackend;
use sign_release::{Pipeline, ReleaseResult, SigningConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sign-release")]
#[command(about = "Sign release artifacts, including files nested inside archives", version)]
struct Cli {
    /// Directory of unsigned release artifacts
    source: PathBuf,

    /// Directory to write the signed release into
    destination: PathBuf,

    /// TOML file with signing identities and the transform registry
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Identity for Apple codesign
    #[arg(long)]
    apple_codesign_identity: Option<String>,

    /// GPG key used for detached signatures
    #[arg(long)]
    gpg_identity: Option<String>,

    /// PKCS#12 file for Authenticode signing
    #[arg(long)]
    private_key_pkcs12: Option<PathBuf>,

    /// Destination-relative source tarball to detached-sign
    #[arg(long)]
    source_tarball: Option<String>,

    /// Backend for detached signatures
    #[arg(long, value_parser = ["gpg", "ed25519"])]
    detached_backend: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Flags as the highest-precedence config layer; unset flags are null.
    fn overrides(&self) -> serde_json::Value {
        serde_json::json!({
            "apple_codesign_identity": self.apple_codesign_identity,
            "gpg_identity": self.gpg_identity,
            "private_key_pkcs12": self.private_key_pkcs12,
            "source_tarball": self.source_tarball,
            "detached_backend": self.detached_backend,
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("sign-release: {}", e);
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> ReleaseResult<()> {
    let config = SigningConfig::load(cli.config.as_deref(), Some(cli.overrides()))?;
    if config.detached_backend == DetachedBackend::Ed25519 {
        info!("using native Ed25519 detached signatures");
    }
    let summary = Pipeline::from_config(&config)?.run(&cli.source, &cli.destination)?;
    info!(
        manifest = %summary.manifest.display(),
        signature = %summary.manifest_signature.display(),
        "done"
    );
    Ok(())
}
