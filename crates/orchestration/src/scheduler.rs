//! Scheduler loop — promotes due campaigns on a fixed interval.
//!
//! Each tick queries for `Scheduled` campaigns whose time has come and
//! pushes them through the lifecycle claim. Ticks are safe to overlap or
//! skip: the claim makes dispatch at-most-once per campaign, and a missed
//! campaign is simply picked up on the next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use outreach_core::OutreachError;
use outreach_store::CampaignStore;

use crate::lifecycle::CampaignLifecycle;

pub struct SchedulerLoop {
    store: Arc<dyn CampaignStore>,
    lifecycle: Arc<CampaignLifecycle>,
    tick_interval: Duration,
}

impl SchedulerLoop {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        lifecycle: Arc<CampaignLifecycle>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            store,
            lifecycle,
            tick_interval,
        }
    }

    /// Spawn the single-owner ticking task.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!(interval = ?self.tick_interval, "Scheduler loop started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.tick(Utc::now()).await;
            }
        })
    }

    /// Run one scheduling pass. Returns how many campaigns this tick
    /// actually dispatched (claim losers and failures excluded).
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let due = match self.store.find_campaigns_due(now) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "Scheduler query failed; will retry next tick");
                return 0;
            }
        };
        if due.is_empty() {
            return 0;
        }
        debug!(due = due.len(), "Scheduler tick found due campaigns");

        // Due campaigns dispatch concurrently; the per-campaign claim is
        // the only serialization needed.
        let handles: Vec<_> = due
            .into_iter()
            .map(|campaign| {
                let lifecycle = self.lifecycle.clone();
                tokio::spawn(async move {
                    let id = campaign.id;
                    match lifecycle.dispatch(id).await {
                        Ok(stats) => {
                            info!(campaign_id = %id, sent = stats.sent, "Scheduled campaign dispatched");
                            true
                        }
                        Err(OutreachError::DoubleDispatchRejected { .. }) => {
                            // Another trigger won the claim; benign.
                            debug!(campaign_id = %id, "Campaign already claimed");
                            false
                        }
                        Err(e) => {
                            warn!(campaign_id = %id, error = %e, "Scheduled dispatch failed");
                            false
                        }
                    }
                })
            })
            .collect();

        let mut dispatched = 0;
        for handle in handles {
            if matches!(handle.await, Ok(true)) {
                dispatched += 1;
            }
        }
        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::CreateCampaignRequest;
    use outreach_core::textgen::StubTextGenerator;
    use outreach_core::types::{CampaignStatus, Customer};
    use outreach_delivery::{DeliveryPipeline, SimulatedVendor};
    use outreach_segmentation::{AudienceResolver, CompareOp, CustomerField, Rule, Segment};
    use outreach_store::MemoryStore;
    use uuid::Uuid;

    fn build() -> (Arc<MemoryStore>, Arc<CampaignLifecycle>, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for i in 1..=6u64 {
            store
                .save_customer(Customer {
                    customer_id: i,
                    name: format!("customer-{i}"),
                    email: format!("c{i}@example.com"),
                    phone: None,
                    total_spend: 500.0,
                    visit_count: 2,
                    last_purchase: None,
                    created_at: now,
                })
                .unwrap();
        }
        let user_id = Uuid::new_v4();
        let segment = Segment {
            id: Uuid::new_v4(),
            user_id,
            name: "everyone".to_string(),
            rules: Rule::Condition {
                field: CustomerField::TotalSpend,
                operator: CompareOp::Gte,
                value: serde_json::json!(0),
            },
            audience_size: 6,
            created_at: now,
            updated_at: now,
        };
        let segment_id = segment.id;
        store.save_segment(segment).unwrap();

        let resolver = AudienceResolver::new(store.clone());
        let pipeline = Arc::new(DeliveryPipeline::new(
            store.clone(),
            Arc::new(SimulatedVendor::with_seed(1.0, 9)),
            resolver.clone(),
            50,
        ));
        let lifecycle = Arc::new(CampaignLifecycle::new(
            store.clone(),
            pipeline,
            resolver,
            Arc::new(StubTextGenerator),
        ));
        (store, lifecycle, user_id, segment_id)
    }

    async fn scheduled_campaign(
        lifecycle: &CampaignLifecycle,
        user_id: Uuid,
        segment_id: Uuid,
        offset: chrono::Duration,
    ) -> Uuid {
        lifecycle
            .create_campaign(CreateCampaignRequest {
                user_id,
                name: "Scheduled".to_string(),
                segment_id,
                message: "Hello {{name}}".to_string(),
                schedule: Some(Utc::now() + offset),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_due_campaign_dispatched_on_tick() {
        let (store, lifecycle, user_id, segment_id) = build();
        let id = scheduled_campaign(&lifecycle, user_id, segment_id, chrono::Duration::minutes(30))
            .await;

        let scheduler = SchedulerLoop::new(store.clone(), lifecycle, Duration::from_secs(60));

        // Not yet due.
        assert_eq!(scheduler.tick(Utc::now()).await, 0);
        assert_eq!(
            store.get_campaign(id).unwrap().unwrap().status,
            CampaignStatus::Scheduled
        );

        // Due once the clock passes the schedule.
        let later = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(scheduler.tick(later).await, 1);
        let after = store.get_campaign(id).unwrap().unwrap();
        assert_eq!(after.status, CampaignStatus::Completed);
        assert_eq!(after.stats.sent, 6);
    }

    #[tokio::test]
    async fn test_overlapping_ticks_dispatch_once() {
        let (store, lifecycle, user_id, segment_id) = build();
        let id = scheduled_campaign(&lifecycle, user_id, segment_id, chrono::Duration::minutes(5))
            .await;

        let scheduler = Arc::new(SchedulerLoop::new(
            store.clone(),
            lifecycle,
            Duration::from_secs(60),
        ));
        let later = Utc::now() + chrono::Duration::minutes(10);

        let (a, b) = tokio::join!(scheduler.tick(later), scheduler.tick(later));
        assert_eq!(a + b, 1);
        assert_eq!(store.logs_for_campaign(id, None).unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_tick_skips_completed_campaigns() {
        let (store, lifecycle, user_id, segment_id) = build();
        let id = scheduled_campaign(&lifecycle, user_id, segment_id, chrono::Duration::minutes(5))
            .await;
        let scheduler = SchedulerLoop::new(store.clone(), lifecycle, Duration::from_secs(60));

        let later = Utc::now() + chrono::Duration::minutes(10);
        assert_eq!(scheduler.tick(later).await, 1);
        // A later tick finds nothing left to do.
        assert_eq!(scheduler.tick(later + chrono::Duration::minutes(1)).await, 0);
        assert_eq!(store.logs_for_campaign(id, None).unwrap().len(), 6);
    }
}
