//! CLI command implementations.

pub mod cart;
pub mod login;
pub mod offer;
pub mod order;
pub mod prices;
pub mod referral;
pub mod stats;
pub mod voucher;
pub mod wallet;

use clap::{Args, Subcommand, ValueEnum};

/// Arguments for the cart command.
#[derive(Args)]
pub struct CartArgs {
    /// Work on this user's server cart instead of the anonymous cart.
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: CartCommand,
}

#[derive(Subcommand)]
pub enum CartCommand {
    /// Add a line.
    Add {
        /// Product id.
        #[arg(long, conflicts_with_all = ["bundle", "offer"])]
        product: Option<String>,

        /// Bundle id.
        #[arg(long, conflicts_with = "offer")]
        bundle: Option<String>,

        /// Offer id.
        #[arg(long)]
        offer: Option<String>,

        /// Quantity.
        #[arg(short, long, default_value = "1")]
        quantity: i64,

        /// Unit price. Defaults to the offer price for offer lines.
        #[arg(short, long)]
        price: Option<String>,

        /// Option payload as JSON, e.g. '{"size":"5kg"}'.
        #[arg(long)]
        option: Option<String>,
    },
    /// Change a line's quantity. Zero or less removes it.
    Update {
        /// Line id.
        line: String,
        /// New quantity.
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a line.
    Remove {
        /// Line id.
        line: String,
    },
    /// List lines and the total.
    List,
    /// Remove every line.
    Clear {
        /// Skip confirmation.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the login command.
#[derive(Args)]
pub struct LoginArgs {
    /// User id to log in as.
    pub user: String,
}

/// Arguments for the offer command.
#[derive(Args)]
pub struct OfferArgs {
    #[command(subcommand)]
    pub command: OfferCommand,
}

#[derive(Subcommand)]
pub enum OfferCommand {
    /// Create an offer.
    Create {
        /// Offer title.
        title: String,

        /// Price of one slot.
        #[arg(short, long)]
        price: String,

        /// Number of slots.
        #[arg(short, long)]
        slots: i64,

        /// Description.
        #[arg(short, long)]
        description: Option<String>,

        /// Close the offer after this many days.
        #[arg(long)]
        days: Option<i64>,
    },
    /// List open offers. Offers past their window are expired first.
    List,
    /// Buy slots directly.
    Purchase {
        /// Offer id.
        offer: String,

        /// Buyer.
        #[arg(short, long)]
        user: String,

        /// Slots to buy.
        #[arg(short, long, default_value = "1")]
        quantity: i64,
    },
}

/// Arguments for the voucher command.
#[derive(Args)]
pub struct VoucherArgs {
    #[command(subcommand)]
    pub command: VoucherCommand,
}

#[derive(Subcommand)]
pub enum VoucherCommand {
    /// Issue a welcome voucher for a newsletter sign-up.
    Welcome {
        /// Recipient email.
        email: String,
    },
    /// Issue an exit-intent voucher.
    Exit {
        /// Recipient email.
        email: String,
    },
    /// Create a voucher with a chosen code.
    Create {
        /// Voucher code.
        code: String,

        /// Percentage off.
        #[arg(long, conflicts_with = "amount", required_unless_present = "amount")]
        percent: Option<u32>,

        /// Fixed amount off.
        #[arg(long)]
        amount: Option<String>,

        /// Maximum redemptions.
        #[arg(long)]
        max_uses: Option<i64>,

        /// Minimum subtotal.
        #[arg(long)]
        min_order: Option<String>,

        /// Valid for this many days.
        #[arg(long)]
        days: Option<i64>,
    },
    /// Check a code against a subtotal without redeeming it.
    Validate {
        /// Voucher code.
        code: String,

        /// Order subtotal.
        #[arg(short, long)]
        subtotal: String,
    },
}

/// Arguments for the wallet command.
#[derive(Args)]
pub struct WalletArgs {
    #[command(subcommand)]
    pub command: WalletCommand,
}

#[derive(Subcommand)]
pub enum WalletCommand {
    /// Show a balance.
    Balance {
        /// User id.
        user: String,
    },
    /// Credit a wallet manually.
    Credit {
        /// User id.
        user: String,

        /// Amount to credit.
        amount: String,

        /// Reference shown in the ledger.
        #[arg(short, long)]
        reference: Option<String>,
    },
    /// Show ledger entries, newest first.
    History {
        /// User id.
        user: String,

        /// Show only the last N entries.
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

/// Arguments for the referral command.
#[derive(Args)]
pub struct ReferralArgs {
    #[command(subcommand)]
    pub command: ReferralCommand,
}

#[derive(Subcommand)]
pub enum ReferralCommand {
    /// Show (or create) a user's referral code and who they referred.
    Code {
        /// User id.
        user: String,
    },
    /// Register a new user under a referral code.
    Register {
        /// The new user.
        user: String,

        /// Referral code.
        code: String,
    },
}

/// Arguments for the order command.
#[derive(Args)]
pub struct OrderArgs {
    #[command(subcommand)]
    pub command: OrderCommand,
}

#[derive(Subcommand)]
pub enum OrderCommand {
    /// Check out a user's server cart.
    Place {
        /// User id.
        user: String,

        /// Voucher code.
        #[arg(long)]
        voucher: Option<String>,

        /// Amount to pay from the wallet.
        #[arg(long)]
        wallet: Option<String>,

        /// Delivery address.
        #[arg(short, long)]
        address: Option<String>,

        /// Note for the rider.
        #[arg(short, long)]
        note: Option<String>,
    },
    /// Record payment for an order.
    Pay {
        /// Order id.
        order: String,
    },
    /// Move an order along fulfilment.
    Advance {
        /// Order id.
        order: String,

        /// Next status.
        #[arg(value_enum)]
        status: FulfilmentStatus,
    },
    /// Cancel an order.
    Cancel {
        /// Order id.
        order: String,

        /// Skip confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// List a user's orders.
    List {
        /// User id.
        user: String,
    },
}

/// Fulfilment steps reachable from the command line.
#[derive(Clone, Copy, ValueEnum)]
pub enum FulfilmentStatus {
    Processing,
    OutForDelivery,
    Delivered,
}

/// Arguments for the stats command.
#[derive(Args)]
pub struct StatsArgs {
    /// JSON file with an array of email events.
    pub file: String,

    /// Store the events before computing rates over everything stored.
    #[arg(long)]
    pub record: bool,
}

/// Arguments for the prices command.
#[derive(Args)]
pub struct PricesArgs {
    #[command(subcommand)]
    pub command: PricesCommand,
}

#[derive(Subcommand)]
pub enum PricesCommand {
    /// Import a CSV or TSV price list.
    Import {
        /// Price list file.
        file: String,

        /// Show what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// List stored prices.
    List,
}
