//! Discount vouchers.

use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use feedme_commerce::promotions::{DiscountValue, Voucher, VoucherKind};

use super::{VoucherArgs, VoucherCommand};
use crate::context::Context;

/// Run the voucher command.
pub async fn run(args: VoucherArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open().await?;

    match args.command {
        VoucherCommand::Welcome { email } => {
            let voucher = store.vouchers.issue_welcome(&email).await?;
            ctx.save(&store).await?;
            print_voucher(ctx, &voucher, &format!("Welcome voucher for {}", email));
        }

        VoucherCommand::Exit { email } => {
            let voucher = store.vouchers.issue_exit_intent(&email).await?;
            ctx.save(&store).await?;
            print_voucher(ctx, &voucher, &format!("Exit-intent voucher for {}", email));
        }

        VoucherCommand::Create {
            code,
            percent,
            amount,
            max_uses,
            min_order,
            days,
        } => {
            let discount = match (percent, amount) {
                (Some(percent), _) => {
                    if percent == 0 || percent > 100 {
                        bail!("--percent must be between 1 and 100");
                    }
                    DiscountValue::Percentage(percent)
                }
                (None, Some(amount)) => DiscountValue::Fixed(ctx.money(&amount)?),
                (None, None) => bail!("One of --percent or --amount is required"),
            };

            let mut voucher = Voucher::new(&code, VoucherKind::Manual, discount);
            if let Some(max_uses) = max_uses {
                voucher = voucher.with_max_uses(max_uses);
            }
            if let Some(min_order) = min_order {
                voucher = voucher.with_min_order(ctx.money(&min_order)?);
            }
            if let Some(days) = days {
                voucher = voucher.valid_until(Utc::now() + Duration::days(days));
            }

            let voucher = store.vouchers.create(voucher).await?;
            ctx.save(&store).await?;
            print_voucher(ctx, &voucher, "Created voucher");
        }

        VoucherCommand::Validate { code, subtotal } => {
            let subtotal = ctx.money(&subtotal)?;
            let quote = store.vouchers.validate(&code, &subtotal, Utc::now()).await?;

            ctx.output.json(&quote);
            ctx.output.success(&format!("{} is valid", quote.code));
            ctx.output.kv("Discount", &quote.label);
            ctx.output.kv("Saves", &quote.discount.display());
            if let Some(rest) = subtotal.try_subtract(&quote.discount) {
                ctx.output.kv("New subtotal", &rest.display());
            }
        }
    }

    Ok(())
}

fn print_voucher(ctx: &Context, voucher: &Voucher, title: &str) {
    ctx.output.json(voucher);
    ctx.output.success(title);
    ctx.output.kv("Code", &voucher.code);
    ctx.output.kv("Discount", &voucher.discount.label());
    if let Some(min_order) = voucher.min_order {
        ctx.output.kv("Minimum order", &min_order.display());
    }
    if let Some(max_uses) = voucher.max_uses {
        ctx.output.kv("Uses", &format!("{}/{}", voucher.used_count, max_uses));
    }
    if let Some(until) = voucher.valid_until {
        ctx.output.kv("Valid until", &until.format("%Y-%m-%d").to_string());
    }
}
