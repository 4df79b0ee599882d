//! Cart CLI - Drive the cart sync engine against a running cart server.
//!
//! # Usage
//!
//! ```bash
//! # Show the local cart (after syncing with the server)
//! cart-cli show
//!
//! # Add two medium tees as user alice
//! cart-cli --user alice add tee --variant m --qty 2
//!
//! # Compare local and server state
//! cart-cli debug
//! ```
//!
//! # Commands
//!
//! - `show` - Print the local cart
//! - `add`, `qty`, `remove`, `clear` - Mutate the cart and push
//! - `sync` - Push pending changes
//! - `reload` - Replace the local cart with the server cart
//! - `debug` - Print local vs server cart and sync status
//! - `discard` - Delete the server cart and reset local state
//!
//! # Environment Variables
//!
//! See `cart_sync_client::config` (`CART_API_URL` is required).

#![cfg_attr(not(test), forbid(unsafe_code))]

use cart_sync_client::{CartEngine, ClientConfig, HttpCartApi};
use cart_sync_core::{Identity, UserId};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;
mod render;

use commands::{CliError, LineArgs};

#[derive(Parser)]
#[command(name = "cart-cli")]
#[command(author, version, about = "Cart sync engine CLI")]
struct Cli {
    /// Sign in as this user (development login) before running the command
    #[arg(short, long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the local cart
    Show,
    /// Add a product to the cart
    Add {
        /// Product ID
        product: String,

        /// Variant ID
        #[arg(short, long)]
        variant: Option<String>,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1)]
        qty: u32,

        /// Display name (defaults to the server's name for the line, if known)
        #[arg(long)]
        name: Option<String>,

        /// Unit price (defaults to the server's price for the line, if known)
        #[arg(long)]
        price: Option<Decimal>,
    },
    /// Set the quantity of a line (values below 1 become 1)
    Qty {
        /// Product ID
        product: String,

        /// New quantity
        #[arg(allow_hyphen_values = true)]
        quantity: i64,

        /// Variant ID
        #[arg(short, long)]
        variant: Option<String>,
    },
    /// Remove a line from the cart
    Remove {
        /// Product ID
        product: String,

        /// Variant ID
        #[arg(short, long)]
        variant: Option<String>,
    },
    /// Empty the cart
    Clear,
    /// Push pending changes now
    Sync,
    /// Replace the local cart with the server cart
    Reload,
    /// Print local and server carts side by side
    Debug,
    /// Delete the server cart and reset local state
    Discard,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cart_sync_client=info,cart_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig::from_env()?;
    let api = HttpCartApi::new(&config)?;

    let identity = match cli.user {
        Some(user) => {
            let user_id = UserId::new(user);
            api.dev_login(&user_id).await?;
            Identity::user(user_id)
        }
        None => Identity::Anonymous,
    };

    let engine = CartEngine::from_config(api, &config)?;
    let outcome = engine.bootstrap(&identity).await;
    tracing::debug!(?outcome, "Bootstrapped");

    match cli.command {
        Commands::Show => commands::show(&engine),
        Commands::Add {
            product,
            variant,
            qty,
            name,
            price,
        } => {
            let line = LineArgs::new(product, variant);
            commands::add(&engine, &line, qty, name, price).await;
        }
        Commands::Qty {
            product,
            quantity,
            variant,
        } => {
            let line = LineArgs::new(product, variant);
            commands::set_quantity(&engine, &line, quantity).await?;
        }
        Commands::Remove { product, variant } => {
            let line = LineArgs::new(product, variant);
            commands::remove(&engine, &line).await?;
        }
        Commands::Clear => commands::clear(&engine).await,
        Commands::Sync => commands::sync(&engine).await,
        Commands::Reload => commands::reload(&engine).await,
        Commands::Debug => commands::debug(&engine).await?,
        Commands::Discard => commands::discard(&engine).await,
    }
    Ok(())
}
