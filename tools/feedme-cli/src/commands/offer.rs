//! Limited-slot offers.

use anyhow::Result;
use chrono::{Duration, Utc};
use feedme_commerce::promotions::Offer;
use feedme_commerce::{OfferId, UserId};
use serde_json::json;

use super::{OfferArgs, OfferCommand};
use crate::context::Context;
use crate::output::status_badge;

/// Run the offer command.
pub async fn run(args: OfferArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open().await?;

    match args.command {
        OfferCommand::Create {
            title,
            price,
            slots,
            description,
            days,
        } => {
            let mut offer = Offer::new(title, ctx.money(&price)?, slots);
            offer.description = description;
            if let Some(days) = days {
                offer = offer.with_window(None, Some(Utc::now() + Duration::days(days)));
            }

            let offer = store.offers.create(offer).await?;
            ctx.save(&store).await?;

            ctx.output.json(&offer);
            ctx.output.success(&format!("Created offer {}", offer.title));
            ctx.output.kv("ID", offer.id.as_str());
            ctx.output.kv("Price", &offer.price.display());
            ctx.output.kv("Slots", &offer.total_slots.to_string());
            if let Some(ends_at) = offer.ends_at {
                ctx.output.kv("Ends", &ends_at.format("%Y-%m-%d %H:%M").to_string());
            }
        }

        OfferCommand::List => {
            let now = Utc::now();
            let expired = store.offers.expire_stale(now).await?;
            if expired > 0 {
                ctx.save(&store).await?;
                ctx.output.debug(&format!("Expired {} offer(s)", expired));
            }

            let offers = store.offers.list_active(now).await?;
            if ctx.output.is_json() {
                ctx.output.json(&offers);
                return Ok(());
            }

            ctx.output.header("Open offers");
            if offers.is_empty() {
                ctx.output.info("No open offers");
                return Ok(());
            }
            let widths = [36, 28, 14, 9, 10];
            ctx.output
                .table_row(&["ID", "TITLE", "PRICE", "SLOTS", "STATUS"], &widths);
            for offer in &offers {
                ctx.output.table_row(
                    &[
                        offer.id.as_str(),
                        &offer.title,
                        &offer.price.display(),
                        &format!("{}/{}", offer.available_slots, offer.total_slots),
                        &status_badge(offer.status.as_str()),
                    ],
                    &widths,
                );
            }
        }

        OfferCommand::Purchase {
            offer,
            user,
            quantity,
        } => {
            let offer_id = OfferId::new(offer);
            let user = UserId::new(user);
            let purchase = store.offers.purchase(&user, &offer_id, quantity).await?;
            let offer = store.offers.get(&offer_id).await?;
            ctx.save(&store).await?;

            ctx.output.json(&json!({ "purchase": purchase, "offer": offer }));
            ctx.output.success(&format!(
                "{} bought {} slot(s) of {}",
                user, quantity, offer.title
            ));
            ctx.output.kv("Purchase", purchase.id.as_str());
            ctx.output.kv(
                "Slots left",
                &format!("{}/{}", offer.available_slots, offer.total_slots),
            );
        }
    }

    Ok(())
}
