//! Token Ledger CLI
//!
//! Thin caller of the library: parses arguments, loads configuration and a
//! local keypair, runs one catalog operation and prints the result.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use token_ledger::{
    config::Config,
    metrics::metrics,
    signer::{LocalSigner, WalletSigner},
    TokenCatalog, TokenOpError,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Override the RPC endpoint
    #[arg(long, env = "LEDGER_RPC_URL")]
    rpc_url: Option<String>,

    /// Override the keypair file
    #[arg(long, env = "LEDGER_KEYPAIR")]
    keypair: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics after the command
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve (creating if absent) the associated account of OWNER for MINT
    Resolve { mint: String, owner: String },
    /// Issue a new mint with the wallet as authority
    Issue {
        #[arg(long, default_value_t = 9)]
        decimals: u8,
    },
    /// Mint whole units to OWNER
    Mint {
        mint: String,
        owner: String,
        amount: u64,
        #[arg(long)]
        decimals: u8,
    },
    /// Transfer whole units from the wallet to TO
    Transfer {
        mint: String,
        to: String,
        amount: u64,
        #[arg(long)]
        decimals: u8,
    },
    /// Burn whole units from the wallet's account
    Burn {
        mint: String,
        amount: u64,
        #[arg(long)]
        decimals: u8,
    },
    /// Lock the wallet's holding of MINT in escrow
    Lock { mint: String },
    /// Release a previous escrow lock
    Unlock { mint: String },
    /// Show mint supply, decimals and authorities
    Info { mint: String },
    /// Native balance of ADDRESS (defaults to the wallet)
    Balance { address: Option<String> },
    /// Token balance of OWNER (defaults to the wallet) for MINT
    TokenBalance { mint: String, owner: Option<String> },
    /// Send lamports from the wallet
    SendNative { to: String, lamports: u64 },
    /// Show the metadata address of MINT and the size of its record
    Metadata { mint: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    let mut config = load_config(&args.config)?;
    if let Some(url) = &args.rpc_url {
        config.rpc.endpoint = url.clone();
    }
    if let Some(path) = &args.keypair {
        config.wallet.keypair_path = path.clone();
    }
    config.validate().context("Invalid configuration")?;

    let catalog = TokenCatalog::from_config(&config).context("Failed to build catalog")?;
    let keypair_path = config.keypair_path();
    let signer = LocalSigner::from_keypair_file(&keypair_path)
        .with_context(|| format!("Failed to load wallet from {}", keypair_path.display()))?;
    let wallet = signer
        .pubkey()
        .context("Wallet keypair has no public key")?;
    info!(wallet = %wallet, endpoint = %config.rpc.endpoint, "Wallet loaded");

    run(&catalog, &signer, wallet, args.command).await?;

    if args.print_metrics {
        print!("{}", metrics().gather_text()?);
    }
    Ok(())
}

async fn run(
    catalog: &TokenCatalog,
    signer: &LocalSigner,
    wallet: Pubkey,
    command: Command,
) -> Result<()> {
    let parse = |input: &str| catalog.parse_address(input);

    match command {
        Command::Resolve { mint, owner } => {
            let sub = catalog.resolve(&parse(&mint)?, &parse(&owner)?, signer).await?;
            println!("{} (amount {}, frozen {})", sub.address, sub.amount, sub.is_frozen);
        }
        Command::Issue { decimals } => match catalog.issue_resource_class(decimals, signer).await {
            Ok(mint) => println!("{}", mint),
            Err(err @ TokenOpError::TimedOut {
                created: Some(mint),
                ..
            }) => {
                println!("{}", mint);
                return Err(err).context("Issuance unconfirmed; re-query before reissuing");
            }
            Err(err) => return Err(err.into()),
        },
        Command::Mint {
            mint,
            owner,
            amount,
            decimals,
        } => {
            let confirmation = catalog
                .mint_units(&parse(&mint)?, &parse(&owner)?, amount, decimals, signer)
                .await?;
            println!("{}", confirmation.signature);
        }
        Command::Transfer {
            mint,
            to,
            amount,
            decimals,
        } => {
            let confirmation = catalog
                .transfer_units(&parse(&mint)?, &wallet, &parse(&to)?, amount, decimals, signer)
                .await?;
            println!("{}", confirmation.signature);
        }
        Command::Burn {
            mint,
            amount,
            decimals,
        } => {
            let confirmation = catalog
                .burn_units(&parse(&mint)?, &wallet, amount, decimals, signer)
                .await?;
            println!("{}", confirmation.signature);
        }
        Command::Lock { mint } => {
            let confirmation = catalog.lock_resource(&parse(&mint)?, signer).await?;
            println!("{}", confirmation.signature);
        }
        Command::Unlock { mint } => {
            let confirmation = catalog.unlock_resource(&parse(&mint)?, signer).await?;
            println!("{}", confirmation.signature);
        }
        Command::Info { mint } => {
            let info = catalog.get_resource_class_info(&parse(&mint)?).await?;
            println!("address:          {}", info.address);
            println!("decimals:         {}", info.decimals);
            println!("supply:           {}", info.supply);
            println!("mint authority:   {}", display_authority(info.mint_authority));
            println!("freeze authority: {}", display_authority(info.freeze_authority));
            println!("initialized:      {}", info.is_initialized);
        }
        Command::Balance { address } => {
            let address = match address {
                Some(a) => parse(&a)?,
                None => wallet,
            };
            println!("{}", catalog.get_balance(&address).await?);
        }
        Command::TokenBalance { mint, owner } => {
            let owner = match owner {
                Some(o) => parse(&o)?,
                None => wallet,
            };
            let balance = catalog.get_token_balance(&parse(&mint)?, &owner, signer).await?;
            println!("{} ({} base units)", balance.ui_amount, balance.amount);
        }
        Command::SendNative { to, lamports } => {
            let confirmation = catalog.transfer_native(&parse(&to)?, lamports, signer).await?;
            println!("{}", confirmation.signature);
        }
        Command::Metadata { mint } => {
            let mint = parse(&mint)?;
            let address = catalog.metadata_address(&mint)?;
            println!("address: {} (bump {})", address.address, address.bump);
            match catalog.get_metadata_raw(&mint).await {
                Ok(data) => println!("record:  {} bytes", data.len()),
                Err(e) => warn!(error = %e, "Metadata record unavailable"),
            }
        }
    }
    Ok(())
}

fn display_authority(authority: Option<Pubkey>) -> String {
    authority.map_or_else(|| "none".to_string(), |key| key.to_string())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "token_ledger=debug,info"
    } else {
        "token_ledger=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }
    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        let mut config = Config::default();
        dotenvy::dotenv().ok();
        config.apply_env_overrides();
        Ok(config)
    }
}
