//! Campaign lifecycle state machine.
//!
//! Status is the single source of truth for lifecycle position. Every
//! mutation goes through the store's compare-and-set, so transitions are
//! validated against the table below and a campaign can never be dispatched
//! by two triggers at once: whoever wins the claim into `InProgress` owns
//! the dispatch, the loser gets `DoubleDispatchRejected` and skips.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use outreach_core::textgen::{TextGenerator, SUMMARY_FALLBACK};
use outreach_core::types::{Campaign, CampaignStats, CampaignStatus, DeliveryStatus};
use outreach_core::{OutreachError, OutreachResult};
use outreach_delivery::DeliveryPipeline;
use outreach_segmentation::AudienceResolver;
use outreach_store::CampaignStore;

/// Valid one-directional transitions. There is no resume from `Failed`
/// and no re-entry into `InProgress`.
pub fn allowed_transition(from: CampaignStatus, to: CampaignStatus) -> bool {
    use CampaignStatus::*;
    matches!(
        (from, to),
        (Draft, Scheduled)
            | (Draft, Running)
            | (Scheduled, InProgress)
            | (Running, InProgress)
            | (InProgress, Completed)
            | (InProgress, Failed)
    )
}

#[derive(Debug, Clone)]
pub struct CreateCampaignRequest {
    pub user_id: Uuid,
    pub name: String,
    pub segment_id: Uuid,
    pub message: String,
    pub schedule: Option<DateTime<Utc>>,
}

pub struct CampaignLifecycle {
    store: Arc<dyn CampaignStore>,
    pipeline: Arc<DeliveryPipeline>,
    resolver: AudienceResolver,
    textgen: Arc<dyn TextGenerator>,
}

impl CampaignLifecycle {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        pipeline: Arc<DeliveryPipeline>,
        resolver: AudienceResolver,
        textgen: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            store,
            pipeline,
            resolver,
            textgen,
        }
    }

    /// Create a campaign against an existing segment.
    ///
    /// A future schedule parks the campaign as `Scheduled` for the
    /// scheduler loop; an absent or past schedule dispatches inline before
    /// this call returns.
    pub async fn create_campaign(&self, req: CreateCampaignRequest) -> OutreachResult<Campaign> {
        let segment = self
            .store
            .get_segment(req.segment_id)?
            .ok_or(OutreachError::SegmentNotFound(req.segment_id))?;

        let now = Utc::now();
        let audience = self.resolver.resolve(&segment.rules, now)?;

        let campaign = Campaign {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            name: req.name,
            segment_id: req.segment_id,
            message: req.message,
            schedule: req.schedule,
            status: CampaignStatus::Draft,
            stats: CampaignStats {
                total_audience: audience.len() as u64,
                ..Default::default()
            },
            summary: None,
            created_at: now,
            updated_at: now,
        };
        let id = campaign.id;
        self.store.save_campaign(campaign)?;

        let future_schedule = req.schedule.map(|at| at > now).unwrap_or(false);
        if future_schedule {
            let scheduled = self.transition(id, CampaignStatus::Draft, CampaignStatus::Scheduled)?;
            info!(campaign_id = %id, schedule = ?req.schedule, "Campaign scheduled");
            return Ok(scheduled);
        }

        self.transition(id, CampaignStatus::Draft, CampaignStatus::Running)?;
        self.dispatch(id).await?;
        self.store
            .get_campaign(id)?
            .ok_or(OutreachError::CampaignNotFound(id))
    }

    /// Claim and dispatch one campaign. The sole entry point for both the
    /// scheduler loop and manual sends; duplicate triggers lose the claim.
    pub async fn dispatch(&self, id: Uuid) -> OutreachResult<CampaignStats> {
        let campaign = self
            .store
            .get_campaign(id)?
            .ok_or(OutreachError::CampaignNotFound(id))?;

        let from = match campaign.status {
            CampaignStatus::Scheduled | CampaignStatus::Running => campaign.status,
            CampaignStatus::Draft => {
                // Manual send of a draft: walk it through Running first.
                self.transition(id, CampaignStatus::Draft, CampaignStatus::Running)?;
                CampaignStatus::Running
            }
            status => {
                return Err(OutreachError::DoubleDispatchRejected {
                    campaign_id: id,
                    status,
                })
            }
        };

        // The atomic claim: exclusive dispatch rights or bust.
        let claimed = self.transition(id, from, CampaignStatus::InProgress)?;

        match self.pipeline.deliver(&claimed).await {
            Ok(stats) => {
                self.finalize_completed(id, stats.clone())?;
                Ok(stats)
            }
            Err(e) => {
                warn!(campaign_id = %id, error = %e, "Dispatch failed before delivery");
                self.finalize_failed(id)?;
                Err(e)
            }
        }
    }

    /// Validated status mutation through the store's compare-and-set.
    fn transition(
        &self,
        id: Uuid,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> OutreachResult<Campaign> {
        if !allowed_transition(from, to) {
            return Err(OutreachError::InvalidTransition { from, to });
        }
        self.store.claim_campaign(id, from, to)
    }

    fn finalize_completed(&self, id: Uuid, stats: CampaignStats) -> OutreachResult<()> {
        self.transition(id, CampaignStatus::InProgress, CampaignStatus::Completed)?;
        let mut campaign = self
            .store
            .get_campaign(id)?
            .ok_or(OutreachError::CampaignNotFound(id))?;

        if stats.total_audience > 0 {
            // Text generation is best-effort; its failure never fails the
            // dispatch.
            campaign.summary = Some(
                self.textgen
                    .summarize(&campaign.name, &stats)
                    .unwrap_or_else(|e| {
                        warn!(campaign_id = %id, error = %e, "Summary generation failed");
                        SUMMARY_FALLBACK.to_string()
                    }),
            );
        }
        campaign.stats = stats;
        campaign.updated_at = Utc::now();
        info!(
            campaign_id = %id,
            sent = campaign.stats.sent,
            failed = campaign.stats.failed,
            "Campaign completed"
        );
        self.store.save_campaign(campaign)
    }

    /// Best-effort bookkeeping when delivery aborted: stats reflect
    /// whatever partial progress was logged.
    fn finalize_failed(&self, id: Uuid) -> OutreachResult<()> {
        self.transition(id, CampaignStatus::InProgress, CampaignStatus::Failed)?;
        let mut campaign = self
            .store
            .get_campaign(id)?
            .ok_or(OutreachError::CampaignNotFound(id))?;

        let counts = self.store.count_by_status(id)?;
        campaign.stats.sent = counts.get(&DeliveryStatus::Sent).copied().unwrap_or(0);
        campaign.stats.failed = counts.get(&DeliveryStatus::Failed).copied().unwrap_or(0);
        campaign.updated_at = Utc::now();
        self.store.save_campaign(campaign)
    }
}
