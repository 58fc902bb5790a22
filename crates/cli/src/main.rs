//! Shopfront CLI - session, cart and access gate from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (tokens are kept in SHOPFRONT_TOKEN_FILE)
//! shopfront login -e ana@example.com -p hunter22
//!
//! # Show and change the cart
//! shopfront cart show
//! shopfront cart add --variant 42 --quantity 2
//! shopfront discount apply SAVE10
//!
//! # Ask the access gate about a route, and keep watching it
//! shopfront gate /products --watch
//! ```
//!
//! Every command boots the storefront first: the stored session is
//! restored, maintenance status is fetched and the cart is loaded.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use shopfront_client::config::{ClientConfig, ConfigError};
use shopfront_client::session::SessionError;
use shopfront_client::{ApiError, Storefront};
use shopfront_core::EmailError;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "shopfront")]
#[command(author, version, about = "Shopfront storefront client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        /// Account email
        #[arg(short, long)]
        email: String,

        /// Account password
        #[arg(short, long)]
        password: String,

        /// Requested role (e.g., `admin`)
        #[arg(short, long)]
        role: Option<String>,
    },
    /// Sign out and forget stored tokens
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Exchange the refresh token for a new token pair
    RefreshToken,
    /// Show or change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Apply or remove a discount code
    Discount {
        #[command(subcommand)]
        action: DiscountAction,
    },
    /// Show the access decision for a route
    Gate {
        /// Route path (e.g., `/products`)
        path: String,

        /// Keep re-evaluating as maintenance status changes
        #[arg(short, long)]
        watch: bool,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the cart
    Show,
    /// Add a product variant
    Add {
        /// Product variant ID
        #[arg(short, long)]
        variant: i64,

        /// Quantity to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set the quantity of a cart line
    Update {
        /// Cart line ID
        #[arg(short, long)]
        item: i64,

        /// New quantity
        #[arg(short, long)]
        quantity: u32,
    },
    /// Remove a cart line
    Remove {
        /// Cart line ID
        #[arg(short, long)]
        item: i64,
    },
    /// Remove every line
    Clear,
}

#[derive(Subcommand)]
enum DiscountAction {
    /// Apply a discount code
    Apply {
        /// Discount code
        code: String,
    },
    /// Remove the applied discount code
    Remove,
}

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Invalid email: {0}")]
    Email(#[from] EmailError),
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = ClientConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Logs go to stderr so command output stays pipeable
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopfront_cli=info,shopfront_client=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), CliError> {
    let storefront = Storefront::new(config)?;
    storefront.boot().await;

    match cli.command {
        Commands::Login { email, password } => {
            commands::auth::login(&storefront, &email, &password).await?;
        }
        Commands::Register {
            email,
            password,
            role,
        } => {
            commands::auth::register(&storefront, &email, &password, role).await?;
        }
        Commands::Logout => commands::auth::logout(&storefront),
        Commands::Whoami => commands::auth::whoami(&storefront),
        Commands::RefreshToken => commands::auth::refresh_token(&storefront).await?,
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&storefront),
            CartAction::Add { variant, quantity } => {
                commands::cart::add(&storefront, variant, quantity).await?;
            }
            CartAction::Update { item, quantity } => {
                commands::cart::update(&storefront, item, quantity).await?;
            }
            CartAction::Remove { item } => commands::cart::remove(&storefront, item).await?,
            CartAction::Clear => commands::cart::clear(&storefront).await?,
        },
        Commands::Discount { action } => match action {
            DiscountAction::Apply { code } => {
                commands::cart::apply_discount(&storefront, &code).await?;
            }
            DiscountAction::Remove => commands::cart::remove_discount(&storefront).await?,
        },
        Commands::Gate { path, watch } => {
            if watch {
                commands::gate::watch(&storefront, &path, config.maintenance_poll).await;
            } else {
                commands::gate::check(&storefront, &path);
            }
        }
    }
    Ok(())
}
