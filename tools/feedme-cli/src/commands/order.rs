//! Checkout and the order lifecycle.

use anyhow::Result;
use feedme_commerce::checkout::{Order, OrderStatus, PlaceOrder};
use feedme_commerce::{OrderId, UserId};
use serde_json::json;

use super::{FulfilmentStatus, OrderArgs, OrderCommand};
use crate::context::Context;
use crate::output::status_badge;

impl From<FulfilmentStatus> for OrderStatus {
    fn from(status: FulfilmentStatus) -> Self {
        match status {
            FulfilmentStatus::Processing => OrderStatus::Processing,
            FulfilmentStatus::OutForDelivery => OrderStatus::OutForDelivery,
            FulfilmentStatus::Delivered => OrderStatus::Delivered,
        }
    }
}

/// Run the order command.
pub async fn run(args: OrderArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open().await?;

    match args.command {
        OrderCommand::Place {
            user,
            voucher,
            wallet,
            address,
            note,
        } => {
            let user = UserId::new(user);
            let mut request = PlaceOrder::new();
            if let Some(code) = voucher {
                request = request.with_voucher(code);
            }
            if let Some(amount) = wallet {
                request = request.with_wallet(ctx.money(&amount)?);
            }
            if let Some(address) = address {
                request = request.deliver_to(address);
            }
            if let Some(note) = note {
                request = request.with_note(note);
            }

            let spinner = ctx.output.spinner("Placing order");
            let placed = store.checkout.place_order(&user, request).await;
            spinner.finish_and_clear();
            let placed = placed?;
            ctx.save(&store).await?;

            ctx.output.json(&placed);
            ctx.output
                .success(&format!("Placed order {}", placed.order.order_number));
            print_order(ctx, &placed.order);
            ctx.output.kv("Lines", &placed.items.len().to_string());
            if placed.referral_activated {
                ctx.output.info("Referral bonus paid to both wallets");
            }
            if let Some(cashback) = &placed.cashback {
                ctx.output.kv("Cashback", &cashback.amount.display());
            }
        }

        OrderCommand::Pay { order } => {
            let (order, cashback) = store.checkout.mark_paid(&OrderId::new(order)).await?;
            ctx.save(&store).await?;

            ctx.output.json(&json!({ "order": order, "cashback": cashback }));
            ctx.output.success(&format!("Order {} paid", order.order_number));
            if let Some(cashback) = cashback {
                ctx.output.kv("Cashback", &cashback.amount.display());
            }
        }

        OrderCommand::Advance { order, status } => {
            let order = store
                .checkout
                .advance(&OrderId::new(order), status.into())
                .await?;
            ctx.save(&store).await?;

            ctx.output.json(&order);
            ctx.output.success(&format!(
                "Order {} is now {}",
                order.order_number,
                order.status.display_name()
            ));
        }

        OrderCommand::Cancel { order, yes } => {
            let order_id = OrderId::new(order);
            let current = store.checkout.get(&order_id).await?;
            let prompt = format!("Cancel order {}?", current.order_number);
            if !ctx.output.confirm(&prompt, yes)? {
                ctx.output.warn("Cancellation aborted");
                return Ok(());
            }

            let order = store.checkout.cancel(&order_id).await?;
            ctx.save(&store).await?;

            ctx.output.json(&order);
            ctx.output
                .success(&format!("Order {} cancelled", order.order_number));
            if order.wallet_used.is_positive() {
                ctx.output
                    .kv("Refunded to wallet", &order.wallet_used.display());
            }
        }

        OrderCommand::List { user } => {
            let user = UserId::new(user);
            let orders = store.checkout.orders_for(&user).await?;
            if ctx.output.is_json() {
                ctx.output.json(&orders);
                return Ok(());
            }

            ctx.output.header(&format!("Orders for {}", user));
            if orders.is_empty() {
                ctx.output.info("No orders");
                return Ok(());
            }
            let widths = [36, 12, 17, 14, 16];
            ctx.output
                .table_row(&["ID", "NUMBER", "STATUS", "TOTAL", "PLACED"], &widths);
            for order in &orders {
                ctx.output.table_row(
                    &[
                        order.id.as_str(),
                        &order.order_number,
                        &status_badge(order.status.as_str()),
                        &order.total.display(),
                        &order.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    ],
                    &widths,
                );
            }
        }
    }

    Ok(())
}

fn print_order(ctx: &Context, order: &Order) {
    ctx.output.kv("ID", order.id.as_str());
    ctx.output.kv("Status", &status_badge(order.status.as_str()));
    ctx.output.kv("Subtotal", &order.subtotal.display());
    if order.discount.is_positive() {
        let code = order.voucher_code.as_deref().unwrap_or("-");
        ctx.output.kv(
            "Discount",
            &format!("{} ({})", order.discount.display(), code),
        );
    }
    if order.wallet_used.is_positive() {
        ctx.output.kv("Wallet", &order.wallet_used.display());
    }
    ctx.output.kv("To pay", &order.amount_payable.display());
}
