//! Storage collaborator contract and the in-memory development store.

pub mod memory;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use outreach_core::types::{
    Campaign, CampaignStatus, CommunicationLogEntry, Customer, DeliveryStatus, StatusCounts,
};
use outreach_core::OutreachResult;
use outreach_segmentation::{CustomerQuery, Segment};

pub use memory::MemoryStore;

/// Storage/query collaborator for the orchestration engine.
///
/// Implementations must support the composable predicate shape produced by
/// rule compilation (see [`CustomerQuery`]) and are expected to surface
/// infrastructure failures as `QueryFailed`.
pub trait CampaignStore: CustomerQuery {
    fn save_customer(&self, customer: Customer) -> OutreachResult<()>;

    fn get_segment(&self, id: Uuid) -> OutreachResult<Option<Segment>>;
    fn save_segment(&self, segment: Segment) -> OutreachResult<()>;
    fn list_segments(&self, user_id: Uuid) -> OutreachResult<Vec<Segment>>;

    fn get_campaign(&self, id: Uuid) -> OutreachResult<Option<Campaign>>;
    fn save_campaign(&self, campaign: Campaign) -> OutreachResult<()>;
    fn list_campaigns(&self, user_id: Uuid) -> OutreachResult<Vec<Campaign>>;

    /// Campaigns with status `Scheduled` whose schedule is at or before
    /// `now`, oldest schedule first.
    fn find_campaigns_due(&self, now: DateTime<Utc>) -> OutreachResult<Vec<Campaign>>;

    /// Atomic compare-and-set on campaign status: the claim that grants
    /// exclusive dispatch rights. Fails with `DoubleDispatchRejected` when
    /// the campaign is no longer in `from`.
    fn claim_campaign(
        &self,
        id: Uuid,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> OutreachResult<Campaign>;

    /// Bulk-insert delivery log entries, enforcing at most one entry per
    /// (campaign, customer) pair. Returns how many were actually inserted;
    /// duplicates are dropped, not overwritten.
    fn save_log_entries(&self, entries: Vec<CommunicationLogEntry>) -> OutreachResult<usize>;

    fn find_log_entry_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> OutreachResult<Option<CommunicationLogEntry>>;

    /// Overwrite an existing entry, keyed by (campaign, customer). Used by
    /// receipt reconciliation only.
    fn update_log_entry(&self, entry: CommunicationLogEntry) -> OutreachResult<()>;

    fn logs_for_campaign(
        &self,
        campaign_id: Uuid,
        status: Option<DeliveryStatus>,
    ) -> OutreachResult<Vec<CommunicationLogEntry>>;

    /// Entry counts for one campaign grouped by delivery status.
    fn count_by_status(&self, campaign_id: Uuid) -> OutreachResult<StatusCounts>;
}
