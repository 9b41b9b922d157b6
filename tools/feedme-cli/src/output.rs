//! Terminal and JSON output for the CLI.

use console::style;
use dialoguer::Confirm;
use feedme_commerce::CommerceError;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Writes human-readable lines, or a single JSON document per command.
///
/// In JSON mode every human line is suppressed and only [`Output::json`]
/// prints to stdout.
#[derive(Clone)]
pub struct Output {
    verbose: bool,
    json: bool,
}

impl Output {
    pub fn new(verbose: bool, json: bool) -> Self {
        Self { verbose, json }
    }

    fn human(&self) -> bool {
        !self.json
    }

    pub fn info(&self, msg: &str) {
        if self.human() {
            println!("{} {}", style("ℹ").blue(), msg);
        }
    }

    pub fn success(&self, msg: &str) {
        if self.human() {
            println!("{} {}", style("✓").green(), msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        if self.human() {
            eprintln!("{} {}", style("⚠").yellow(), msg);
        }
    }

    /// Report a failed command on stderr.
    ///
    /// Storefront errors keep their code and HTTP status; in JSON mode they
    /// use the same error body as the API.
    pub fn error(&self, err: &anyhow::Error) {
        if self.json {
            eprintln!("{}", error_document(err));
            return;
        }

        let msg = format!("{:#}", err);
        match err.downcast_ref::<CommerceError>() {
            Some(e) => eprintln!(
                "{} {} {}",
                style("✗").red(),
                style(msg).red(),
                style(format!("[{} {}]", e.status_code().as_u16(), e.code())).dim()
            ),
            None => eprintln!("{} {}", style("✗").red(), style(msg).red()),
        }
    }

    /// Only shown with `--verbose`.
    pub fn debug(&self, msg: &str) {
        if self.verbose && self.human() {
            eprintln!("{} {}", style("→").dim(), style(msg).dim());
        }
    }

    pub fn header(&self, msg: &str) {
        if self.human() {
            println!("\n{}", style(msg).bold().underlined());
        }
    }

    /// The command's result document, printed only in JSON mode.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) {
        if self.json {
            if let Ok(doc) = serde_json::to_string_pretty(value) {
                println!("{}", doc);
            }
        }
    }

    pub fn kv(&self, key: &str, value: &str) {
        if self.human() {
            println!("  {}: {}", style(key).dim(), value);
        }
    }

    pub fn list_item(&self, item: &str) {
        if self.human() {
            println!("  {} {}", style("•").dim(), item);
        }
    }

    /// One row of a fixed-width table. Cells wider than their column push the rest right.
    pub fn table_row(&self, cols: &[&str], widths: &[usize]) {
        if !self.human() {
            return;
        }
        let cells: Vec<String> = cols
            .iter()
            .zip(widths)
            .map(|(col, width)| pad(col, *width))
            .collect();
        println!("  {}", cells.join("  ").trim_end());
    }

    /// Spinner for backend work; hidden in JSON mode.
    pub fn spinner(&self, msg: &str) -> ProgressBar {
        if !self.human() {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(template);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }

    /// Ask before a destructive step. `--yes` or JSON mode skips the prompt.
    pub fn confirm(&self, prompt: &str, yes: bool) -> anyhow::Result<bool> {
        if yes || self.json {
            return Ok(true);
        }
        Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
    }

    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// The `--json` error body. Errors from outside the storefront map to 500.
fn error_document(err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<CommerceError>() {
        Some(e) => {
            let body = e.to_body();
            serde_json::json!({
                "success": body.success,
                "status": e.status_code().as_u16(),
                "error": body.error,
            })
        }
        None => serde_json::json!({
            "success": false,
            "status": 500,
            "error": { "code": "cli_error", "message": format!("{:#}", err) },
        }),
    }
}

/// Pad by visible width so styled cells line up.
fn pad(cell: &str, width: usize) -> String {
    let visible = console::measure_text_width(cell);
    format!("{}{}", cell, " ".repeat(width.saturating_sub(visible)))
}

/// Colour an order, offer or referral status.
pub fn status_badge(status: &str) -> String {
    match status {
        "active" | "paid" | "delivered" => style(status).green().to_string(),
        "pending" | "pending_payment" | "processing" | "out_for_delivery" => {
            style(status).yellow().to_string()
        }
        "cancelled" | "sold_out" => style(status).red().to_string(),
        "expired" | "draft" => style(status).dim().to_string(),
        _ => status.to_string(),
    }
}

/// `0.5` -> `50.0%`.
pub fn format_rate(rate: f64) -> String {
    format!("{:.1}%", rate * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(0.5), "50.0%");
        assert_eq!(format_rate(0.0), "0.0%");
        assert_eq!(format_rate(1.0 / 3.0), "33.3%");
    }

    #[test]
    fn test_pad_ignores_ansi_codes() {
        console::set_colors_enabled(true);
        let badge = status_badge("paid");
        assert_eq!(console::measure_text_width(&pad(&badge, 8)), 8);
        assert_eq!(pad("abc", 2), "abc");
    }

    #[test]
    fn test_unknown_status_is_plain() {
        assert_eq!(status_badge("unknown"), "unknown");
    }

    #[test]
    fn test_error_document_carries_http_status() {
        let err = anyhow::Error::new(CommerceError::VoucherNotFound("SAVE10".into()));
        let doc = error_document(&err);
        assert_eq!(doc["success"], false);
        assert_eq!(doc["status"], 404);
        assert_eq!(doc["error"]["code"], "voucher_not_found");

        let doc = error_document(&anyhow::anyhow!("disk full"));
        assert_eq!(doc["status"], 500);
        assert_eq!(doc["error"]["code"], "cli_error");
    }
}
