//! Shared domain types for the outreach platform.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer record as ingested from the CRM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: u64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub total_spend: f64,
    pub visit_count: u64,
    pub last_purchase: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Attribute lookup used for message personalization. Unknown keys
    /// return `None`; the renderer substitutes an empty string.
    pub fn attribute(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            "email" => Some(self.email.clone()),
            "phone" => self.phone.clone(),
            "totalSpend" => Some(format!("{:.2}", self.total_spend)),
            "visitCount" => Some(self.visit_count.to_string()),
            _ => None,
        }
    }
}

/// Campaign lifecycle position. Transitions are one-directional and
/// validated by the lifecycle engine; there is no resume from `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Running,
    InProgress,
    Completed,
    Failed,
}

/// Aggregate delivery counters owned exclusively by the campaign.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total_audience: u64,
    pub sent: u64,
    pub failed: u64,
    pub success_rate: f64,
}

/// A scheduled or immediate message send targeting one segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub segment_id: Uuid,
    pub message: String,
    pub schedule: Option<DateTime<Utc>>,
    pub status: CampaignStatus,
    pub stats: CampaignStats,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-recipient delivery state. `Pending` entries exist only between
/// entry creation and the synchronous vendor outcome; receipts may later
/// flip `Failed` findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// One delivery record per (campaign, customer) pair.
///
/// Created in bulk by the delivery pipeline; individual entries are later
/// mutated (never re-created) by receipt reconciliation, addressed by
/// `vendor_correlation_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationLogEntry {
    pub campaign_id: Uuid,
    pub customer_id: u64,
    pub message: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub vendor_correlation_id: Option<String>,
}

/// Asynchronous delivery-outcome notification from the vendor, correlated
/// to a prior send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub correlation_id: String,
    pub status: DeliveryStatus,
    pub error_reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Point-in-time projection of delivery progress for one campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub campaign_id: Uuid,
    pub status: CampaignStatus,
    pub total: u64,
    pub sent: u64,
    pub failed: u64,
    pub pending: u64,
    pub progress_pct: f64,
    pub is_complete: bool,
    pub timestamp: DateTime<Utc>,
}

/// Per-status entry counts as returned by the store's group-by query.
pub type StatusCounts = HashMap<DeliveryStatus, u64>;
