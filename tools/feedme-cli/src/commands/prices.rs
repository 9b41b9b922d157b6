//! Price list import.

use anyhow::{bail, Context as _, Result};
use feedme_commerce::catalog::parse_price_list;
use serde_json::json;

use super::{PricesArgs, PricesCommand};
use crate::context::Context;

/// Run the prices command.
pub async fn run(args: PricesArgs, ctx: &Context) -> Result<()> {
    match args.command {
        PricesCommand::Import { file, dry_run } => {
            let path = ctx.resolve_path(&file);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let parsed = parse_price_list(&text, ctx.config.commerce.currency)?;

            for issue in &parsed.issues {
                ctx.output
                    .warn(&format!("Line {}: {}", issue.line, issue.reason));
            }
            if parsed.rows.is_empty() {
                bail!("No usable rows in {}", path.display());
            }

            if dry_run {
                ctx.output.json(&parsed);
                ctx.output.info(&format!(
                    "Dry run - {} row(s) read, {} issue(s), nothing written",
                    parsed.rows.len(),
                    parsed.issues.len()
                ));
                for row in &parsed.rows {
                    ctx.output
                        .list_item(&format!("{} {} {}", row.sku, row.name, row.price.display()));
                }
                return Ok(());
            }

            let store = ctx.open().await?;
            let pb = ctx.output.spinner(&format!("Applying {} price(s)", parsed.rows.len()));
            let report = store.prices.apply(&parsed.rows).await;
            pb.finish_and_clear();
            let report = report?;
            ctx.save(&store).await?;

            ctx.output.json(&json!({ "report": report, "issues": parsed.issues }));
            ctx.output.success(&format!("Imported {}", path.display()));
            ctx.output.kv("Created", &report.created.to_string());
            ctx.output.kv("Updated", &report.updated.to_string());
            ctx.output.kv("Unchanged", &report.unchanged.to_string());
            if !parsed.issues.is_empty() {
                ctx.output.kv("Skipped rows", &parsed.issues.len().to_string());
            }
        }

        PricesCommand::List => {
            let store = ctx.open().await?;
            let prices = store.prices.list().await?;
            if ctx.output.is_json() {
                ctx.output.json(&prices);
                return Ok(());
            }

            ctx.output.header("Prices");
            if prices.is_empty() {
                ctx.output.info("No prices imported");
                return Ok(());
            }
            let widths = [14, 30, 8, 14];
            ctx.output.table_row(&["SKU", "NAME", "UNIT", "PRICE"], &widths);
            for p in &prices {
                ctx.output.table_row(
                    &[
                        &p.sku,
                        &p.name,
                        p.unit.as_deref().unwrap_or("-"),
                        &p.price.display(),
                    ],
                    &widths,
                );
            }
        }
    }

    Ok(())
}
