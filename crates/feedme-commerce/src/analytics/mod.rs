//! Email campaign analytics.

mod email;

pub use email::{campaign_stats, CampaignStats, EmailEvent, EmailEventKind, EmailStatsService};
