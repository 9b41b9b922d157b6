//! FeedMe CLI - drive the storefront from a terminal.
//!
//! Commands:
//! - `feedme cart` - Anonymous or per-user cart lines
//! - `feedme login` - Log in and merge the anonymous cart
//! - `feedme offer` - Limited-slot offers
//! - `feedme voucher` - Discount codes
//! - `feedme wallet` - Wallet balance and ledger
//! - `feedme referral` - Referral codes
//! - `feedme order` - Checkout and order lifecycle
//! - `feedme stats` - Email campaign rates
//! - `feedme prices` - Price list import

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{
    CartArgs, LoginArgs, OfferArgs, OrderArgs, PricesArgs, ReferralArgs, StatsArgs, VoucherArgs,
    WalletArgs,
};

/// FeedMe CLI - run the grocery storefront locally
#[derive(Parser)]
#[command(name = "feedme")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Directory holding backend.json and local-storage.json
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// Named environment from the config file
    #[arg(short, long, global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage cart lines
    Cart(CartArgs),

    /// Log in and merge the anonymous cart
    Login(LoginArgs),

    /// Manage limited-slot offers
    Offer(OfferArgs),

    /// Issue and check vouchers
    Voucher(VoucherArgs),

    /// Wallet balance and history
    Wallet(WalletArgs),

    /// Referral codes
    Referral(ReferralArgs),

    /// Place and manage orders
    Order(OrderArgs),

    /// Email campaign open and click rates
    Stats(StatsArgs),

    /// Import a price list
    Prices(PricesArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = output::Output::new(cli.verbose, cli.json);

    let ctx = context::Context::load(
        cli.config.as_deref(),
        cli.data_dir.as_deref(),
        cli.env.as_deref(),
        output,
    )?;

    let result = match cli.command {
        Commands::Cart(args) => commands::cart::run(args, &ctx).await,
        Commands::Login(args) => commands::login::run(args, &ctx).await,
        Commands::Offer(args) => commands::offer::run(args, &ctx).await,
        Commands::Voucher(args) => commands::voucher::run(args, &ctx).await,
        Commands::Wallet(args) => commands::wallet::run(args, &ctx).await,
        Commands::Referral(args) => commands::referral::run(args, &ctx).await,
        Commands::Order(args) => commands::order::run(args, &ctx).await,
        Commands::Stats(args) => commands::stats::run(args, &ctx).await,
        Commands::Prices(args) => commands::prices::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&e);
        std::process::exit(1);
    }

    Ok(())
}
