//! Agent registry - command line entry point

use agent_registry::config::RegistryConfig;
use agent_registry::observability::init_default_logging;
use agent_registry::signing::{
    sign_submission, verify_submission, AgentSubmission, CanonicalMessage, KeypairWallet,
    MessageVersion, WalletSigner,
};
use agent_registry::submission::SignedSubmission;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, warn};

/// Catalog service for wallet-signed agent listings
#[derive(Parser)]
#[command(name = "agent-registry")]
#[command(about = "Catalog service for wallet-signed agent listings")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "REGISTRY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP query and submission surface
    Serve,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the canonical message for a submission
    Encode {
        /// Submission JSON file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Message format (v1 or v1-text)
        #[arg(short, long, default_value = "v1")]
        format: MessageVersion,
    },
    /// Sign a submission with a local keypair and print the request body
    Sign {
        /// Submission JSON file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Keypair file (JSON array of 64 bytes)
        #[arg(short, long, value_name = "FILE")]
        keypair: PathBuf,
        /// Message format (v1 or v1-text)
        #[arg(short, long, default_value = "v1")]
        format: MessageVersion,
    },
    /// Check a signature against the submission's owner wallet
    Verify {
        /// Submission JSON file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
        /// Base58 or base64 signature
        #[arg(short, long)]
        signature: String,
        /// Message format (v1 or v1-text)
        #[arg(short, long, default_value = "v1")]
        format: MessageVersion,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let result = match cli.command {
        Commands::Serve => match load_configuration(cli.config.as_deref()) {
            Ok(config) => run_server(config).await,
            Err(e) => Err(e),
        },
        Commands::Config { show } => match load_configuration(cli.config.as_deref()) {
            Ok(config) => handle_config_command(&config, show),
            Err(e) => Err(e),
        },
        Commands::Encode { input, format } => encode_command(&input, format),
        Commands::Sign {
            input,
            keypair,
            format,
        } => sign_command(&input, &keypair, format).await,
        Commands::Verify {
            input,
            signature,
            format,
        } => verify_command(&input, &signature, format),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: Option<&Path>,
) -> Result<RegistryConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(RegistryConfig::load_from_file(path)?);
    }

    for path_str in ["registry.toml", "config/registry.toml"] {
        let path = Path::new(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(RegistryConfig::load_from_file(path)?);
        }
    }

    info!("No configuration file found, using defaults and environment");
    Ok(RegistryConfig::from_env()?)
}

async fn run_server(config: RegistryConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting agent registry v{} ({} data)",
        env!("CARGO_PKG_VERSION"),
        config.data.mode.as_str()
    );
    agent_registry::serve(config).await?;
    info!("Application shutdown complete");
    Ok(())
}

fn handle_config_command(
    config: &RegistryConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

fn read_submission(path: &Path) -> Result<AgentSubmission, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn encode_command(input: &Path, format: MessageVersion) -> Result<(), Box<dyn std::error::Error>> {
    let submission = read_submission(input)?;
    println!("{}", CanonicalMessage::encode(&submission, format));
    Ok(())
}

async fn sign_command(
    input: &Path,
    keypair: &Path,
    format: MessageVersion,
) -> Result<(), Box<dyn std::error::Error>> {
    let submission = read_submission(input)?;
    let wallet = KeypairWallet::load(keypair)?;
    if wallet.address() != submission.owner_wallet {
        warn!(
            wallet = %wallet.address(),
            owner = %submission.owner_wallet,
            "Keypair does not match the submission's owner wallet; the signature will not verify"
        );
    }

    let (_, signature) = sign_submission(&wallet, &submission, format).await?;
    let body = SignedSubmission {
        submission,
        version: format,
        signature: signature.signature_base58(),
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn verify_command(
    input: &Path,
    signature: &str,
    format: MessageVersion,
) -> Result<(), Box<dyn std::error::Error>> {
    let submission = read_submission(input)?;
    verify_submission(&submission, format, signature)?;
    println!("Signature valid for {}", submission.owner_wallet);
    Ok(())
}
