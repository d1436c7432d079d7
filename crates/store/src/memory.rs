//! In-memory store backed by DashMap.
//!
//! Production deployments replace this with a PostgreSQL or document store
//! implementing the same trait; this provides the full API surface for
//! development and testing. The claim compare-and-set relies on DashMap's
//! per-entry locking: `get_mut` holds the shard lock for the whole
//! check-then-write.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use outreach_core::types::{
    Campaign, CampaignStatus, CommunicationLogEntry, Customer, DeliveryStatus, StatusCounts,
};
use outreach_core::{OutreachError, OutreachResult};
use outreach_segmentation::{eval, AudienceFilter, CustomerQuery, Segment};

use crate::CampaignStore;

/// Thread-safe in-memory store for customers, segments, campaigns, and
/// delivery logs.
#[derive(Default)]
pub struct MemoryStore {
    customers: DashMap<u64, Customer>,
    segments: DashMap<Uuid, Segment>,
    campaigns: DashMap<Uuid, Campaign>,
    /// Keyed by (campaign, customer) — the uniqueness invariant lives here.
    log_entries: DashMap<(Uuid, u64), CommunicationLogEntry>,
    /// Vendor correlation id → log entry key, for receipt reconciliation.
    correlation_index: DashMap<String, (Uuid, u64)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Memory store initialized (in-memory, development mode)");
        Self::default()
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }
}

impl CustomerQuery for MemoryStore {
    fn find_customers(&self, filter: &AudienceFilter) -> OutreachResult<Vec<Customer>> {
        Ok(self
            .customers
            .iter()
            .filter(|r| eval(filter, r.value()))
            .map(|r| r.value().clone())
            .collect())
    }
}

impl CampaignStore for MemoryStore {
    fn save_customer(&self, customer: Customer) -> OutreachResult<()> {
        self.customers.insert(customer.customer_id, customer);
        Ok(())
    }

    fn get_segment(&self, id: Uuid) -> OutreachResult<Option<Segment>> {
        Ok(self.segments.get(&id).map(|r| r.value().clone()))
    }

    fn save_segment(&self, segment: Segment) -> OutreachResult<()> {
        self.segments.insert(segment.id, segment);
        Ok(())
    }

    fn list_segments(&self, user_id: Uuid) -> OutreachResult<Vec<Segment>> {
        let mut segments: Vec<Segment> = self
            .segments
            .iter()
            .filter(|r| r.value().user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        segments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(segments)
    }

    fn get_campaign(&self, id: Uuid) -> OutreachResult<Option<Campaign>> {
        Ok(self.campaigns.get(&id).map(|r| r.value().clone()))
    }

    fn save_campaign(&self, campaign: Campaign) -> OutreachResult<()> {
        self.campaigns.insert(campaign.id, campaign);
        Ok(())
    }

    fn list_campaigns(&self, user_id: Uuid) -> OutreachResult<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| r.value().user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns)
    }

    fn find_campaigns_due(&self, now: DateTime<Utc>) -> OutreachResult<Vec<Campaign>> {
        let mut due: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|r| {
                let c = r.value();
                c.status == CampaignStatus::Scheduled
                    && c.schedule.map(|at| at <= now).unwrap_or(false)
            })
            .map(|r| r.value().clone())
            .collect();
        due.sort_by_key(|c| c.schedule);
        Ok(due)
    }

    fn claim_campaign(
        &self,
        id: Uuid,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> OutreachResult<Campaign> {
        let mut entry = self
            .campaigns
            .get_mut(&id)
            .ok_or(OutreachError::CampaignNotFound(id))?;
        if entry.status != from {
            return Err(OutreachError::DoubleDispatchRejected {
                campaign_id: id,
                status: entry.status,
            });
        }
        entry.status = to;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    fn save_log_entries(&self, entries: Vec<CommunicationLogEntry>) -> OutreachResult<usize> {
        let mut inserted = 0;
        for entry in entries {
            let key = (entry.campaign_id, entry.customer_id);
            match self.log_entries.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    // Duplicate (campaign, customer): first write wins.
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    if let Some(cid) = &entry.vendor_correlation_id {
                        self.correlation_index.insert(cid.clone(), key);
                    }
                    slot.insert(entry);
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    fn find_log_entry_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> OutreachResult<Option<CommunicationLogEntry>> {
        let Some(key) = self.correlation_index.get(correlation_id).map(|r| *r.value()) else {
            return Ok(None);
        };
        Ok(self.log_entries.get(&key).map(|r| r.value().clone()))
    }

    fn update_log_entry(&self, entry: CommunicationLogEntry) -> OutreachResult<()> {
        let key = (entry.campaign_id, entry.customer_id);
        let mut existing = self.log_entries.get_mut(&key).ok_or_else(|| {
            OutreachError::QueryFailed(format!(
                "no log entry for campaign {} customer {}",
                key.0, key.1
            ))
        })?;
        *existing = entry;
        Ok(())
    }

    fn logs_for_campaign(
        &self,
        campaign_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> OutreachResult<Vec<CommunicationLogEntry>> {
        let mut logs: Vec<CommunicationLogEntry> = self
            .log_entries
            .iter()
            .filter(|r| {
                let e = r.value();
                e.campaign_id == campaign_id && status.map(|s| e.status == s).unwrap_or(true)
            })
            .map(|r| r.value().clone())
            .collect();
        logs.sort_by_key(|e| e.customer_id);
        Ok(logs)
    }

    fn count_by_status(&self, campaign_id: Uuid) -> OutreachResult<StatusCounts> {
        let mut counts = StatusCounts::new();
        for entry in self.log_entries.iter() {
            if entry.value().campaign_id == campaign_id {
                *counts.entry(entry.value().status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn campaign(status: CampaignStatus, schedule: Option<DateTime<Utc>>) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Test".to_string(),
            segment_id: Uuid::new_v4(),
            message: "Hi {{name}}".to_string(),
            schedule,
            status,
            stats: Default::default(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn entry(campaign_id: Uuid, customer_id: u64, correlation: &str) -> CommunicationLogEntry {
        CommunicationLogEntry {
            campaign_id,
            customer_id,
            message: "hi".to_string(),
            status: DeliveryStatus::Sent,
            attempts: 1,
            last_attempt_at: Some(Utc::now()),
            failure_reason: None,
            vendor_correlation_id: Some(correlation.to_string()),
        }
    }

    #[test]
    fn test_claim_is_compare_and_set() {
        let store = MemoryStore::new();
        let c = campaign(CampaignStatus::Scheduled, Some(Utc::now()));
        let id = c.id;
        store.save_campaign(c).unwrap();

        let claimed = store
            .claim_campaign(id, CampaignStatus::Scheduled, CampaignStatus::InProgress)
            .unwrap();
        assert_eq!(claimed.status, CampaignStatus::InProgress);

        let err = store
            .claim_campaign(id, CampaignStatus::Scheduled, CampaignStatus::InProgress)
            .unwrap_err();
        assert!(matches!(
            err,
            OutreachError::DoubleDispatchRejected { .. }
        ));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let c = campaign(CampaignStatus::Scheduled, Some(Utc::now()));
        let id = c.id;
        store.save_campaign(c).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .claim_campaign(id, CampaignStatus::Scheduled, CampaignStatus::InProgress)
                        .is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().expect("claim thread panicked"))
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_log_entry_uniqueness() {
        let store = MemoryStore::new();
        let campaign_id = Uuid::new_v4();

        let inserted = store
            .save_log_entries(vec![
                entry(campaign_id, 1, "msg-a"),
                entry(campaign_id, 2, "msg-b"),
                entry(campaign_id, 1, "msg-c"), // duplicate pair
            ])
            .unwrap();
        assert_eq!(inserted, 2);

        let logs = store.logs_for_campaign(campaign_id, None).unwrap();
        assert_eq!(logs.len(), 2);
        // First write won for customer 1.
        assert_eq!(
            logs[0].vendor_correlation_id.as_deref(),
            Some("msg-a")
        );
    }

    #[test]
    fn test_correlation_lookup_and_counts() {
        let store = MemoryStore::new();
        let campaign_id = Uuid::new_v4();
        let mut failed = entry(campaign_id, 2, "msg-b");
        failed.status = DeliveryStatus::Failed;
        store
            .save_log_entries(vec![entry(campaign_id, 1, "msg-a"), failed])
            .unwrap();

        let found = store
            .find_log_entry_by_correlation_id("msg-b")
            .unwrap()
            .unwrap();
        assert_eq!(found.customer_id, 2);
        assert!(store
            .find_log_entry_by_correlation_id("msg-zzz")
            .unwrap()
            .is_none());

        let counts = store.count_by_status(campaign_id).unwrap();
        assert_eq!(counts.get(&DeliveryStatus::Sent), Some(&1));
        assert_eq!(counts.get(&DeliveryStatus::Failed), Some(&1));
    }

    #[test]
    fn test_find_campaigns_due() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let past = campaign(CampaignStatus::Scheduled, Some(now - chrono::Duration::minutes(5)));
        let future = campaign(CampaignStatus::Scheduled, Some(now + chrono::Duration::hours(1)));
        let done = campaign(CampaignStatus::Completed, Some(now - chrono::Duration::hours(1)));
        let past_id = past.id;
        store.save_campaign(past).unwrap();
        store.save_campaign(future).unwrap();
        store.save_campaign(done).unwrap();

        let due = store.find_campaigns_due(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past_id);
    }
}
