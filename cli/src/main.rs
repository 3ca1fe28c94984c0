//! yalls: operator CLI for the earnings core.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use yalls_commission::{
    attribute_split, referral_code, referral_link, split_commission, CommissionCredit,
    CommissionSplit, Rank, UplineChain,
};
use yalls_earnings::{EarningsService, PayoutRequest, Stores, DEFAULT_TREE_DEPTH};
use yalls_store_lmdb::LmdbEnvironment;
use yalls_types::{
    IdempotencyKey, Money, PayoutGateway, PayoutId, PayoutStatus, SystemClock, UserId,
};
use yalls_utils::LogFormat;

use crate::config::YallsConfig;

#[derive(Parser)]
#[command(name = "yalls", about = "y'alls earnings core: commissions, referrals and payouts")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// flags and env vars override them.
    #[arg(long, env = "YALLS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the LMDB environment.
    #[arg(long, env = "YALLS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, env = "YALLS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "YALLS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute a commission split without touching storage.
    Split {
        #[arg(long)]
        amount: Money,
        /// Upline ids, nearest referrer first (comma-separated, at most 3).
        #[arg(long, value_delimiter = ',')]
        upline: Vec<String>,
    },
    /// Referral links between members.
    Referral {
        #[command(subcommand)]
        action: ReferralAction,
    },
    /// Sales that generate residual earnings.
    Sale {
        #[command(subcommand)]
        action: SaleAction,
    },
    /// Show a member's residual earnings and available balance.
    Residuals {
        #[arg(long)]
        user: UserId,
    },
    /// List a member's individual commissions, newest first.
    Commissions {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show a member's progress toward the next rank.
    Rank {
        #[arg(long)]
        user: UserId,
        #[arg(long, default_value = "unranked")]
        current_rank: Rank,
        /// Personal sales volume for the current period.
        #[arg(long, default_value = "0")]
        personal_volume: Money,
    },
    /// Payout requests.
    Payout {
        #[command(subcommand)]
        action: PayoutAction,
    },
}

#[derive(Subcommand)]
enum ReferralAction {
    /// Record the direct referrer of a member.
    Register {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        referrer: UserId,
    },
    /// Print a member's referral code and sign-up link.
    Code {
        #[arg(long)]
        user: UserId,
    },
    /// List members a user enrolled directly, newest first.
    List {
        #[arg(long)]
        user: UserId,
    },
    /// Print the referral tree below a member.
    Tree {
        #[arg(long)]
        user: UserId,
        #[arg(long, default_value_t = DEFAULT_TREE_DEPTH)]
        depth: u32,
    },
}

#[derive(Subcommand)]
enum SaleAction {
    /// Record a sale and credit the seller's upline.
    Record {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        amount: Money,
    },
}

#[derive(Subcommand)]
enum PayoutAction {
    /// Request a payout of residual earnings.
    Request {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        amount: Money,
        #[arg(long)]
        gateway: Option<PayoutGateway>,
        /// Reusing a key returns the payout created under it.
        #[arg(long)]
        idempotency_key: Option<IdempotencyKey>,
    },
    /// List a member's payouts, newest first.
    List {
        #[arg(long)]
        user: UserId,
    },
    /// Advance a payout's status (pending → processing → completed, or failed).
    Settle {
        #[arg(long)]
        id: PayoutId,
        #[arg(long)]
        status: PayoutStatus,
    },
}

#[derive(Serialize)]
struct SplitOutput {
    split: CommissionSplit,
    credits: Vec<CommissionCredit>,
}

#[derive(Serialize)]
struct ReferralOutput {
    user: UserId,
    code: String,
    link: String,
}

#[derive(Serialize)]
struct ResidualsOutput {
    user: UserId,
    residuals: Money,
    available: Money,
}

fn resolve_config(cli: &Cli) -> anyhow::Result<YallsConfig> {
    let mut config = match cli.config {
        Some(ref path) => YallsConfig::from_toml_file(path)?,
        None => YallsConfig::default(),
    };
    if let Some(ref data_dir) = cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if let Some(ref level) = cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_service(config: &YallsConfig) -> anyhow::Result<EarningsService> {
    let env = LmdbEnvironment::open(&config.data_dir, config.map_size_bytes())
        .with_context(|| format!("failed to open store at {}", config.data_dir.display()))?;
    let stores = Stores {
        payouts: Arc::new(env.payout_store()),
        residuals: Arc::new(env.residual_store()),
        uplines: Arc::new(env.upline_directory()),
    };
    Ok(EarningsService::new(
        stores,
        Arc::new(SystemClock),
        &config.earnings,
    ))
}

fn log_counters(service: &EarningsService) {
    tracing::info!(counters = ?service.stats().snapshot(), "session counters");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    yalls_utils::init_logging(config.log_format, &config.log_level);

    match cli.command {
        Command::Split { amount, upline } => {
            let chain = UplineChain::parse(&upline)?;
            let split = split_commission(amount, &chain)?;
            let credits = attribute_split(&split, &chain);
            print_json(&SplitOutput { split, credits })?;
        }
        Command::Referral { action } => match action {
            ReferralAction::Code { user } => {
                let code = referral_code(&user);
                let link = referral_link(&config.referral_base_url, &code);
                print_json(&ReferralOutput { user, code, link })?;
            }
            ReferralAction::Register { user, referrer } => {
                let service = open_service(&config)?;
                service.register_referral(&user, &referrer).await?;
                print_json(&serde_json::json!({ "user": user, "referrer": referrer }))?;
                log_counters(&service);
            }
            ReferralAction::List { user } => {
                let service = open_service(&config)?;
                print_json(&service.direct_referrals(&user).await?)?;
                log_counters(&service);
            }
            ReferralAction::Tree { user, depth } => {
                let service = open_service(&config)?;
                print_json(&service.fetch_downline(&user, depth).await?)?;
                log_counters(&service);
            }
        },
        Command::Sale {
            action: SaleAction::Record { user, amount },
        } => {
            let service = open_service(&config)?;
            print_json(&service.record_sale(&user, amount).await?)?;
            log_counters(&service);
        }
        Command::Residuals { user } => {
            let service = open_service(&config)?;
            let residuals = service.fetch_residuals(&user).await?;
            let available = service.available_balance(&user).await?;
            print_json(&ResidualsOutput {
                user,
                residuals,
                available,
            })?;
            log_counters(&service);
        }
        Command::Commissions { user, limit } => {
            let service = open_service(&config)?;
            print_json(&service.fetch_commissions(&user, limit).await?)?;
            log_counters(&service);
        }
        Command::Rank {
            user,
            current_rank,
            personal_volume,
        } => {
            if config.rank_requirements.is_empty() {
                anyhow::bail!("no rank_requirements configured");
            }
            let service = open_service(&config)?;
            let progress = service
                .rank_progress(&user, current_rank, personal_volume, &config.rank_requirements)
                .await?;
            print_json(&progress)?;
            log_counters(&service);
        }
        Command::Payout { action } => {
            let service = open_service(&config)?;
            match action {
                PayoutAction::Request {
                    user,
                    amount,
                    gateway,
                    idempotency_key,
                } => {
                    let request = PayoutRequest {
                        user_id: user,
                        amount,
                        gateway,
                        idempotency_key,
                    };
                    print_json(&service.request_payout(request).await?)?;
                }
                PayoutAction::List { user } => {
                    print_json(&service.fetch_payouts(&user).await?)?;
                }
                PayoutAction::Settle { id, status } => {
                    print_json(&service.settle_payout(&id, status).await?)?;
                }
            }
            log_counters(&service);
        }
    }
    Ok(())
}
