//! Email campaign open and click rates.

use anyhow::{Context as _, Result};
use feedme_commerce::analytics::{campaign_stats, CampaignStats, EmailEvent};

use super::StatsArgs;
use crate::context::Context;
use crate::output::format_rate;

/// Run the stats command.
pub async fn run(args: StatsArgs, ctx: &Context) -> Result<()> {
    let path = ctx.resolve_path(&args.file);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let events: Vec<EmailEvent> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse email events in {}", path.display()))?;
    ctx.output.debug(&format!("Read {} event(s)", events.len()));

    let stats = if args.record {
        let store = ctx.open().await?;
        for event in &events {
            store.email_stats.record(event).await?;
        }
        ctx.save(&store).await?;
        store.email_stats.all_stats().await?
    } else {
        campaign_stats(&events)
    };

    print_stats(ctx, &stats);
    Ok(())
}

fn print_stats(ctx: &Context, stats: &[CampaignStats]) {
    if ctx.output.is_json() {
        ctx.output.json(&stats);
        return;
    }

    ctx.output.header("Email campaigns");
    if stats.is_empty() {
        ctx.output.info("No events");
        return;
    }
    let widths = [20, 6, 9, 6, 7, 8, 8];
    ctx.output.table_row(
        &["CAMPAIGN", "SENT", "DELIVERED", "OPENS", "CLICKS", "OPEN %", "CLICK %"],
        &widths,
    );
    for s in stats {
        ctx.output.table_row(
            &[
                s.campaign_id.as_str(),
                &s.sent.to_string(),
                &s.delivered.to_string(),
                &s.unique_opens.to_string(),
                &s.unique_clicks.to_string(),
                &format_rate(s.open_rate),
                &format_rate(s.click_rate),
            ],
            &widths,
        );
    }
}
