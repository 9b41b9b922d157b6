//! Wallet balance and ledger.

use anyhow::{bail, Result};
use feedme_commerce::rewards::{TransactionKind, TransactionReason};
use feedme_commerce::UserId;
use serde_json::json;

use super::{WalletArgs, WalletCommand};
use crate::context::Context;

/// Run the wallet command.
pub async fn run(args: WalletArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open().await?;

    match args.command {
        WalletCommand::Balance { user } => {
            let user = UserId::new(user);
            let balance = store.wallets.balance(&user).await?;

            ctx.output.json(&json!({ "user_id": user, "balance": balance }));
            ctx.output.kv(&format!("{} balance", user), &balance.display());
        }

        WalletCommand::Credit {
            user,
            amount,
            reference,
        } => {
            let user = UserId::new(user);
            let amount = ctx.money(&amount)?;
            if !amount.is_positive() {
                bail!("Amount must be greater than zero");
            }

            let tx = store
                .wallets
                .credit(&user, amount, TransactionReason::Adjustment, reference)
                .await?;
            ctx.save(&store).await?;

            ctx.output.json(&tx);
            ctx.output
                .success(&format!("Credited {} to {}", tx.amount.display(), user));
            ctx.output.kv("Balance", &tx.balance_after.display());
        }

        WalletCommand::History { user, limit } => {
            let user = UserId::new(user);
            let mut history = store.wallets.history(&user).await?;
            if let Some(limit) = limit {
                history.truncate(limit);
            }

            if ctx.output.is_json() {
                ctx.output.json(&history);
                return Ok(());
            }

            ctx.output.header(&format!("Wallet history for {}", user));
            if history.is_empty() {
                ctx.output.info("No transactions");
                return Ok(());
            }
            let widths = [16, 15, 14, 14, 20];
            ctx.output
                .table_row(&["DATE", "REASON", "AMOUNT", "BALANCE", "REFERENCE"], &widths);
            for tx in &history {
                let amount = match tx.kind {
                    TransactionKind::Credit => format!("+{}", tx.amount.display()),
                    TransactionKind::Debit => format!("-{}", tx.amount.display()),
                };
                ctx.output.table_row(
                    &[
                        &tx.created_at.format("%Y-%m-%d %H:%M").to_string(),
                        tx.reason.as_str(),
                        &amount,
                        &tx.balance_after.display(),
                        tx.reference.as_deref().unwrap_or("-"),
                    ],
                    &widths,
                );
            }
        }
    }

    Ok(())
}
