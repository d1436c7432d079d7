//! Progress projection — point-in-time delivery stats and the push feed.
//!
//! [`ProgressProjector::snapshot`] is a pure read over log-entry counts; it
//! has no side effects and can be polled freely. [`subscribe`] wraps that
//! poll in an mpsc channel to present it as a push feed: every push carries
//! a full snapshot, `is_complete` never goes back to false, and the channel
//! closes after the first complete push.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use outreach_core::types::{CampaignStatus, DeliveryStatus, ProgressSnapshot};
use outreach_core::{OutreachError, OutreachResult};
use outreach_store::CampaignStore;

#[derive(Clone)]
pub struct ProgressProjector {
    store: Arc<dyn CampaignStore>,
}

impl ProgressProjector {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Current delivery snapshot for one campaign.
    pub fn snapshot(&self, campaign_id: Uuid) -> OutreachResult<ProgressSnapshot> {
        let campaign = self
            .store
            .get_campaign(campaign_id)?
            .ok_or(OutreachError::CampaignNotFound(campaign_id))?;
        let counts = self.store.count_by_status(campaign_id)?;

        let total = campaign.stats.total_audience;
        let sent = counts.get(&DeliveryStatus::Sent).copied().unwrap_or(0);
        let failed = counts.get(&DeliveryStatus::Failed).copied().unwrap_or(0);
        let pending = total.saturating_sub(sent + failed);

        let progress_pct = if total > 0 {
            (sent + failed) as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let terminal = matches!(
            campaign.status,
            CampaignStatus::Completed | CampaignStatus::Failed
        );
        // A zero-audience campaign reads complete only once its status is
        // terminal: a parked Scheduled campaign with an empty audience is
        // still awaiting dispatch.
        let is_complete = terminal || (total > 0 && sent + failed >= total);

        Ok(ProgressSnapshot {
            campaign_id,
            status: campaign.status,
            total,
            sent,
            failed,
            pending,
            progress_pct,
            is_complete,
            timestamp: Utc::now(),
        })
    }

    /// Poll-driven push feed. The receiver gets a snapshot every
    /// `poll_interval` and the channel closes after the first complete one
    /// (or if the campaign disappears).
    pub fn subscribe(
        &self,
        campaign_id: Uuid,
        poll_interval: Duration,
    ) -> mpsc::Receiver<ProgressSnapshot> {
        let (tx, rx) = mpsc::channel(16);
        let projector = self.clone();
        tokio::spawn(async move {
            loop {
                let snapshot = match projector.snapshot(campaign_id) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(campaign_id = %campaign_id, error = %e, "Progress feed ended");
                        break;
                    }
                };
                let complete = snapshot.is_complete;
                if tx.send(snapshot).await.is_err() {
                    break; // subscriber went away
                }
                if complete {
                    break;
                }
                tokio::time::sleep(poll_interval).await;
            }
        });
        rx
    }
}
