//! Log in and fold the anonymous cart into the user's server cart.
//!
//! Each run is a fresh login, so the in-process merge guard never reports
//! `AlreadyMerged` here. A merge empties the anonymous cart in local storage;
//! logging in again finds nothing to merge.

use anyhow::Result;
use feedme_commerce::cart::{self, CartQuery, MergeOutcome, Session};
use feedme_commerce::{CommerceError, Storefront, UserId};

use super::LoginArgs;
use crate::context::Context;

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open().await?;
    let user = UserId::new(args.user);

    let spinner = ctx.output.spinner(&format!("Loading cart for {}", user));
    let outcome = log_in(&store, &user).await;
    spinner.finish_and_clear();
    let outcome = outcome?;
    ctx.save(&store).await?;

    ctx.output.json(&outcome);
    match &outcome {
        MergeOutcome::Merged(report) => {
            ctx.output.success(&format!(
                "Logged in as {}, merged {} line(s) into the cart",
                user,
                report.applied()
            ));
            ctx.output.kv("Combined", &report.merged.to_string());
            ctx.output.kv("Added", &report.added.to_string());
            for skipped in &report.skipped {
                ctx.output.warn(&format!(
                    "Skipped {}: {}",
                    skipped.line.describe(),
                    skipped.reason
                ));
            }
        }
        MergeOutcome::NothingToMerge => {
            ctx.output.success(&format!("Logged in as {}", user));
            ctx.output.info("Anonymous cart was empty");
        }
        other => ctx.output.info(&format!("Logged in as {} ({:?})", user, other)),
    }

    if !ctx.output.is_json() {
        let lines = store.carts.lines(&user).await?;
        ctx.output.kv("Items in cart", &cart::item_count(&lines).to_string());
        ctx.output.kv("Cart total", &store.carts.total(&user).await?.display());
    }

    Ok(())
}

/// Load the user's server cart, then merge the anonymous cart into it.
async fn log_in(store: &Storefront, user: &UserId) -> Result<MergeOutcome, CommerceError> {
    let current = store.carts.lines(user).await?;
    store
        .merge_flow()
        .on_session_change(
            &Session::Authenticated(user.clone()),
            &CartQuery::Ready(current),
        )
        .await
}
