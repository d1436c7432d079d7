//! The delivery pipeline: audience fan-out in bounded-concurrency batches.
//!
//! Each recipient becomes exactly one spawned send task and exactly one
//! communication log entry. A failing task is absorbed into its own entry
//! and never aborts siblings; a batch is fully joined before the next one
//! starts, which bounds in-flight vendor calls at the batch size.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use outreach_core::types::{
    Campaign, CampaignStats, CommunicationLogEntry, Customer, DeliveryStatus,
};
use outreach_core::{OutreachError, OutreachResult};
use outreach_segmentation::AudienceResolver;
use outreach_store::CampaignStore;

use crate::render::render_message;
use crate::vendor::VendorGateway;

pub struct DeliveryPipeline {
    store: Arc<dyn CampaignStore>,
    vendor: Arc<dyn VendorGateway>,
    resolver: AudienceResolver,
    batch_size: usize,
}

impl DeliveryPipeline {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        vendor: Arc<dyn VendorGateway>,
        resolver: AudienceResolver,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            vendor,
            resolver,
            batch_size: batch_size.max(1),
        }
    }

    /// Dispatch one claimed campaign: resolve the audience, send in
    /// batches, persist one log entry per recipient, and return the
    /// recomputed aggregate stats.
    ///
    /// Errors out of this function mean audience resolution failed before
    /// any send happened; per-recipient failures are recorded, not raised.
    pub async fn deliver(&self, campaign: &Campaign) -> OutreachResult<CampaignStats> {
        let segment = self
            .store
            .get_segment(campaign.segment_id)?
            .ok_or(OutreachError::SegmentNotFound(campaign.segment_id))?;

        let audience = self.resolver.resolve(&segment.rules, Utc::now())?;
        let total = audience.len() as u64;
        info!(
            campaign_id = %campaign.id,
            segment_id = %segment.id,
            audience = total,
            "Dispatching campaign"
        );

        let mut sent: u64 = 0;
        let mut failed: u64 = 0;

        for batch in audience.chunks(self.batch_size) {
            let handles: Vec<_> = batch
                .iter()
                .map(|customer| {
                    let vendor = self.vendor.clone();
                    let customer = customer.clone();
                    let campaign_id = campaign.id;
                    let template = campaign.message.clone();
                    tokio::spawn(async move {
                        send_one(vendor.as_ref(), campaign_id, &customer, &template)
                    })
                })
                .collect();

            let mut entries = Vec::with_capacity(batch.len());
            for (customer, handle) in batch.iter().zip(handles) {
                let entry = match handle.await {
                    Ok(entry) => entry,
                    Err(join_err) => {
                        warn!(
                            campaign_id = %campaign.id,
                            customer_id = customer.customer_id,
                            error = %join_err,
                            "Send task panicked"
                        );
                        failed_entry(
                            campaign.id,
                            customer,
                            &campaign.message,
                            format!("send task aborted: {join_err}"),
                        )
                    }
                };
                match entry.status {
                    DeliveryStatus::Sent => sent += 1,
                    _ => failed += 1,
                }
                entries.push(entry);
            }

            self.store.save_log_entries(entries)?;
            metrics::counter!("delivery.batches").increment(1);
        }

        // Recomputed from the finished entries, never incrementally guessed.
        let stats = CampaignStats {
            total_audience: total,
            sent,
            failed,
            success_rate: if total > 0 {
                sent as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        };

        info!(
            campaign_id = %campaign.id,
            sent = stats.sent,
            failed = stats.failed,
            success_rate = stats.success_rate,
            "Campaign dispatch finished"
        );
        Ok(stats)
    }
}

fn send_one(
    vendor: &dyn VendorGateway,
    campaign_id: Uuid,
    customer: &Customer,
    template: &str,
) -> CommunicationLogEntry {
    let rendered = render_message(template, customer);
    match vendor.send(customer, &rendered) {
        Ok(outcome) => CommunicationLogEntry {
            campaign_id,
            customer_id: customer.customer_id,
            message: rendered,
            status: if outcome.accepted {
                DeliveryStatus::Sent
            } else {
                DeliveryStatus::Failed
            },
            attempts: 1,
            last_attempt_at: Some(Utc::now()),
            failure_reason: outcome.error_reason,
            vendor_correlation_id: Some(outcome.correlation_id),
        },
        Err(e) => failed_entry(campaign_id, customer, &rendered, e.to_string()),
    }
}

fn failed_entry(
    campaign_id: Uuid,
    customer: &Customer,
    message: &str,
    reason: String,
) -> CommunicationLogEntry {
    CommunicationLogEntry {
        campaign_id,
        customer_id: customer.customer_id,
        message: message.to_string(),
        status: DeliveryStatus::Failed,
        attempts: 1,
        last_attempt_at: Some(Utc::now()),
        failure_reason: Some(reason),
        vendor_correlation_id: None,
    }
}
