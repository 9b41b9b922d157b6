//! Email campaign delivery events and open/click rates.

use crate::error::CommerceError;
use crate::ids::{CampaignId, EventId};
use crate::tables::EMAIL_EVENTS;
use chrono::{DateTime, Utc};
use feedme_db::{Db, Filter};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailEventKind {
    Sent,
    Delivered,
    Open,
    Click,
    Bounce,
}

/// One tracking event reported by the mail provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailEvent {
    #[serde(default = "EventId::generate")]
    pub id: EventId,
    pub campaign_id: CampaignId,
    pub recipient: String,
    pub kind: EmailEventKind,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl EmailEvent {
    pub fn new(campaign_id: CampaignId, recipient: impl Into<String>, kind: EmailEventKind) -> Self {
        Self {
            id: EventId::generate(),
            campaign_id,
            recipient: recipient.into(),
            kind,
            created_at: Utc::now(),
        }
    }
}

/// Aggregated numbers for one campaign.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignStats {
    pub campaign_id: CampaignId,
    pub sent: u64,
    pub delivered: u64,
    pub unique_opens: u64,
    pub unique_clicks: u64,
    pub bounces: u64,
    /// Unique openers over delivered (or sent when nothing was marked delivered).
    pub open_rate: f64,
    pub click_rate: f64,
}

#[derive(Default)]
struct Tally<'a> {
    sent: u64,
    delivered: u64,
    bounces: u64,
    openers: HashSet<&'a str>,
    clickers: HashSet<&'a str>,
}

fn rate(count: u64, base: u64) -> f64 {
    if base == 0 {
        0.0
    } else {
        count as f64 / base as f64
    }
}

/// Aggregate events per campaign, ordered by campaign id.
///
/// Recipients are compared case-insensitively after trimming.
pub fn campaign_stats(events: &[EmailEvent]) -> Vec<CampaignStats> {
    let recipients: Vec<String> = events
        .iter()
        .map(|e| e.recipient.trim().to_ascii_lowercase())
        .collect();

    let mut tallies: BTreeMap<&CampaignId, Tally<'_>> = BTreeMap::new();
    for (event, recipient) in events.iter().zip(&recipients) {
        let tally = tallies.entry(&event.campaign_id).or_default();
        match event.kind {
            EmailEventKind::Sent => tally.sent += 1,
            EmailEventKind::Delivered => tally.delivered += 1,
            EmailEventKind::Bounce => tally.bounces += 1,
            EmailEventKind::Open => {
                tally.openers.insert(recipient.as_str());
            }
            EmailEventKind::Click => {
                tally.clickers.insert(recipient.as_str());
            }
        }
    }

    tallies
        .into_iter()
        .map(|(campaign_id, t)| {
            let base = if t.delivered > 0 { t.delivered } else { t.sent };
            let unique_opens = t.openers.len() as u64;
            let unique_clicks = t.clickers.len() as u64;
            CampaignStats {
                campaign_id: campaign_id.clone(),
                sent: t.sent,
                delivered: t.delivered,
                unique_opens,
                unique_clicks,
                bounces: t.bounces,
                open_rate: rate(unique_opens, base),
                click_rate: rate(unique_clicks, base),
            }
        })
        .collect()
}

/// Stored email events.
#[derive(Clone)]
pub struct EmailStatsService {
    db: Db,
}

impl EmailStatsService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn record(&self, event: &EmailEvent) -> Result<(), CommerceError> {
        self.db.insert(EMAIL_EVENTS, event).await?;
        debug!(campaign_id = %event.campaign_id, kind = ?event.kind, "email event recorded");
        Ok(())
    }

    /// Stats for one campaign, `None` if it has no events.
    pub async fn stats_for(&self, campaign_id: &CampaignId) -> Result<Option<CampaignStats>, CommerceError> {
        let events: Vec<EmailEvent> = self
            .db
            .select(EMAIL_EVENTS, &Filter::all().eq("campaign_id", campaign_id))
            .await?;
        Ok(campaign_stats(&events).into_iter().next())
    }

    /// Stats for every campaign.
    pub async fn all_stats(&self) -> Result<Vec<CampaignStats>, CommerceError> {
        let events: Vec<EmailEvent> = self.db.select(EMAIL_EVENTS, &Filter::all()).await?;
        Ok(campaign_stats(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EmailEventKind::*;

    fn event(campaign: &str, recipient: &str, kind: EmailEventKind) -> EmailEvent {
        EmailEvent::new(CampaignId::new(campaign), recipient, kind)
    }

    #[test]
    fn test_unique_open_rate() {
        let events = vec![
            event("weekly", "a@x.ng", Sent),
            event("weekly", "b@x.ng", Sent),
            event("weekly", "c@x.ng", Sent),
            event("weekly", "d@x.ng", Sent),
            event("weekly", "a@x.ng", Open),
            event("weekly", "A@x.ng ", Open),
            event("weekly", "b@x.ng", Open),
            event("weekly", "a@x.ng", Click),
        ];
        let stats = campaign_stats(&events);
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.sent, 4);
        assert_eq!(s.unique_opens, 2);
        assert_eq!(s.unique_clicks, 1);
        assert!((s.open_rate - 0.5).abs() < f64::EPSILON);
        assert!((s.click_rate - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_delivered_is_preferred_base() {
        let events = vec![
            event("promo", "a@x.ng", Sent),
            event("promo", "b@x.ng", Sent),
            event("promo", "a@x.ng", Delivered),
            event("promo", "b@x.ng", Bounce),
            event("promo", "a@x.ng", Open),
        ];
        let s = &campaign_stats(&events)[0];
        assert_eq!(s.delivered, 1);
        assert_eq!(s.bounces, 1);
        assert!((s.open_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_denominator() {
        let s = &campaign_stats(&[event("ghost", "a@x.ng", Open)])[0];
        assert_eq!(s.open_rate, 0.0);
        assert!(campaign_stats(&[]).is_empty());
    }

    #[test]
    fn test_campaigns_are_separate() {
        let events = vec![event("b", "a@x.ng", Sent), event("a", "a@x.ng", Sent)];
        let stats = campaign_stats(&events);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].campaign_id, CampaignId::new("a"));
    }

    #[test]
    fn test_event_export_without_ids() {
        let events: Vec<EmailEvent> = serde_json::from_str(
            r#"[{ "campaign_id": "weekly", "recipient": "a@x.ng", "kind": "open" }]"#,
        )
        .unwrap();
        assert_eq!(events[0].kind, Open);
        assert!(!events[0].id.as_str().is_empty());
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let service = EmailStatsService::new(Db::new());
        service.record(&event("weekly", "a@x.ng", Sent)).await.unwrap();
        service.record(&event("weekly", "a@x.ng", Open)).await.unwrap();
        service.record(&event("other", "a@x.ng", Sent)).await.unwrap();

        let stats = service.stats_for(&CampaignId::new("weekly")).await.unwrap().unwrap();
        assert_eq!(stats.unique_opens, 1);
        assert!(service.stats_for(&CampaignId::new("none")).await.unwrap().is_none());
        assert_eq!(service.all_stats().await.unwrap().len(), 2);
    }
}
