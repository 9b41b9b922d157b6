//! Cart lines, anonymous or per user.

use anyhow::{bail, Context as _, Result};
use feedme_commerce::cart::{self, CartLine};
use feedme_commerce::{BundleId, LineItemId, Money, OfferId, ProductId, Storefront, UserId};
use serde_json::json;

use super::{CartArgs, CartCommand};
use crate::context::Context;

/// Run the cart command.
pub async fn run(args: CartArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open().await?;
    let user = args.user.map(UserId::new);

    match args.command {
        CartCommand::Add {
            product,
            bundle,
            offer,
            quantity,
            price,
            option,
        } => {
            let price = match price {
                Some(raw) => Some(ctx.money(&raw)?),
                None => None,
            };
            let line = build_line(&store, product, bundle, offer, quantity, price).await?;
            let line = match option {
                Some(raw) => line.with_option(
                    serde_json::from_str(&raw).context("--option must be valid JSON")?,
                ),
                None => line,
            };

            let stored = match &user {
                Some(user) => store.carts.add_line(user, line).await?,
                None => store.anonymous.add_item(line, &store.offers).await?,
            };
            ctx.save(&store).await?;

            ctx.output.json(&stored);
            ctx.output.success(&format!(
                "Added {} x{} ({})",
                stored.describe(),
                quantity,
                stored.id
            ));
            ctx.output.kv("Line quantity", &stored.quantity.to_string());
        }

        CartCommand::Update { line, quantity } => {
            let line_id = LineItemId::new(line);
            let updated = match &user {
                Some(user) => store.carts.update_quantity(user, &line_id, quantity).await?,
                None => {
                    store
                        .anonymous
                        .update_quantity(&line_id, quantity, &store.offers)
                        .await?
                }
            };
            ctx.save(&store).await?;

            ctx.output.json(&json!({ "line_id": line_id, "line": updated }));
            match updated {
                Some(line) => ctx
                    .output
                    .success(&format!("{} now x{}", line.describe(), line.quantity)),
                None => ctx.output.success(&format!("Removed {}", line_id)),
            }
        }

        CartCommand::Remove { line } => {
            let line_id = LineItemId::new(line);
            match &user {
                Some(user) => store.carts.remove_line(user, &line_id).await?,
                None => {
                    if !store.anonymous.remove_item(&line_id)? {
                        bail!("Line '{}' is not in the cart", line_id);
                    }
                }
            }
            ctx.save(&store).await?;

            ctx.output.json(&json!({ "removed": line_id }));
            ctx.output.success(&format!("Removed {}", line_id));
        }

        CartCommand::List => {
            let lines = match &user {
                Some(user) => store.carts.lines(user).await?,
                None => store.anonymous.lines()?,
            };
            let total = cart::total(&lines, store.config.currency)?;
            print_lines(ctx, user.as_ref(), &lines, total);
        }

        CartCommand::Clear { yes } => {
            let whose = user
                .as_ref()
                .map(|u| format!("{}'s cart", u))
                .unwrap_or_else(|| "the anonymous cart".to_string());
            if !ctx.output.confirm(&format!("Remove every line from {}?", whose), yes)? {
                ctx.output.warn("Clear cancelled");
                return Ok(());
            }

            let removed = match &user {
                Some(user) => store.carts.clear(user).await?,
                None => {
                    let count = store.anonymous.lines()?.len();
                    store.anonymous.clear()?;
                    count
                }
            };
            ctx.save(&store).await?;

            ctx.output.json(&json!({ "removed": removed }));
            ctx.output.success(&format!("Removed {} line(s) from {}", removed, whose));
        }
    }

    Ok(())
}

async fn build_line(
    store: &Storefront,
    product: Option<String>,
    bundle: Option<String>,
    offer: Option<String>,
    quantity: i64,
    price: Option<Money>,
) -> Result<CartLine> {
    if let Some(offer) = offer {
        let offer_id = OfferId::new(offer);
        let price = match price {
            Some(price) => price,
            None => store.offers.get(&offer_id).await?.price,
        };
        return Ok(CartLine::offer(offer_id, quantity, price));
    }

    let Some(price) = price else {
        bail!("--price is required for product and bundle lines");
    };
    match (product, bundle) {
        (Some(product), _) => Ok(CartLine::product(ProductId::new(product), quantity, price)),
        (_, Some(bundle)) => Ok(CartLine::bundle(BundleId::new(bundle), quantity, price)),
        _ => bail!("One of --product, --bundle or --offer is required"),
    }
}

fn print_lines(ctx: &Context, user: Option<&UserId>, lines: &[CartLine], total: Money) {
    if ctx.output.is_json() {
        ctx.output.json(&json!({
            "user_id": user,
            "lines": lines,
            "item_count": cart::item_count(lines),
            "total": total,
        }));
        return;
    }

    match user {
        Some(user) => ctx.output.header(&format!("Cart for {}", user)),
        None => ctx.output.header("Anonymous cart"),
    }
    if lines.is_empty() {
        ctx.output.info("Cart is empty");
        return;
    }

    let widths = [36, 28, 5, 14];
    ctx.output.table_row(&["LINE", "ITEM", "QTY", "PRICE"], &widths);
    for line in lines {
        ctx.output.table_row(
            &[
                line.id.as_str(),
                &line.describe(),
                &line.quantity.to_string(),
                &line.price.display(),
            ],
            &widths,
        );
    }
    ctx.output.kv("Items", &cart::item_count(lines).to_string());
    ctx.output.kv("Total", &total.display());
}
