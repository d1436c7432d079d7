use uuid::Uuid;

use thiserror::Error;

use crate::types::CampaignStatus;

pub type OutreachResult<T> = Result<T, OutreachError>;

#[derive(Error, Debug)]
pub enum OutreachError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Segment {0} not found")]
    SegmentNotFound(Uuid),

    #[error("Campaign {0} not found")]
    CampaignNotFound(Uuid),

    #[error("Storage query failed: {0}")]
    QueryFailed(String),

    #[error("Vendor call failed: {0}")]
    VendorCallFailed(String),

    #[error("No log entry for correlation id {0}")]
    UnknownReceipt(String),

    #[error("Campaign {campaign_id} already claimed (status {status:?})")]
    DoubleDispatchRejected {
        campaign_id: Uuid,
        status: CampaignStatus,
    },

    #[error("Invalid campaign transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
