//! Referral codes.

use anyhow::Result;
use feedme_commerce::UserId;
use serde_json::json;

use super::{ReferralArgs, ReferralCommand};
use crate::context::Context;
use crate::output::status_badge;

/// Run the referral command.
pub async fn run(args: ReferralArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open().await?;

    match args.command {
        ReferralCommand::Code { user } => {
            let user = UserId::new(user);
            let code = store.referrals.code_for(&user).await?;
            let referrals = store.referrals.referrals_by(&user).await?;
            ctx.save(&store).await?;

            ctx.output.json(&json!({ "code": code, "referrals": referrals }));
            ctx.output.kv(&format!("{} referral code", user), &code.code);
            for referral in &referrals {
                ctx.output.list_item(&format!(
                    "{} {}",
                    referral.referred_id,
                    status_badge(referral.status.as_str())
                ));
            }
        }

        ReferralCommand::Register { user, code } => {
            let user = UserId::new(user);
            let referral = store.referrals.register(&user, &code).await?;
            ctx.save(&store).await?;

            ctx.output.json(&referral);
            ctx.output.success(&format!(
                "{} registered with {}'s code",
                user, referral.referrer_id
            ));
            ctx.output
                .info("Bonuses are paid when the first order is placed");
        }
    }

    Ok(())
}
