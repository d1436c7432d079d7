//! Receipt reconciliation — applies asynchronous delivery-outcome
//! callbacks to existing log entries, idempotently.
//!
//! Receipts are keyed by vendor correlation id and ordered by their own
//! `occurred_at`, not by processing time, so a receipt stream can be
//! replayed or reordered: last-write-wins on `occurred_at`, and an exact
//! replay leaves the entry unchanged.

use std::sync::Arc;

use tracing::{debug, warn};

use outreach_core::types::{CommunicationLogEntry, DeliveryReceipt, DeliveryStatus};
use outreach_core::{OutreachError, OutreachResult};
use outreach_store::CampaignStore;

/// Per-item result of a receipt batch. One bad item never fails the batch.
#[derive(Debug)]
pub enum ReceiptOutcome {
    /// Entry updated (or identically re-applied).
    Updated(CommunicationLogEntry),
    /// Receipt is older than the entry's recorded attempt; ignored.
    Stale(String),
    /// No entry carries this correlation id.
    Unknown(String),
    /// Receipt malformed (e.g. a PENDING status).
    Rejected { correlation_id: String, reason: String },
}

#[derive(Clone)]
pub struct ReceiptReconciler {
    store: Arc<dyn CampaignStore>,
}

impl ReceiptReconciler {
    pub fn new(store: Arc<dyn CampaignStore>) -> Self {
        Self { store }
    }

    /// Apply one receipt. Returns the entry's final state; `UnknownReceipt`
    /// if no entry matches the correlation id.
    pub fn apply(&self, receipt: &DeliveryReceipt) -> OutreachResult<CommunicationLogEntry> {
        match self.apply_inner(receipt)? {
            ReceiptOutcome::Updated(entry) => Ok(entry),
            ReceiptOutcome::Stale(_) => {
                // Stale still resolves to the entry's current state.
                self.store
                    .find_log_entry_by_correlation_id(&receipt.correlation_id)?
                    .ok_or_else(|| OutreachError::UnknownReceipt(receipt.correlation_id.clone()))
            }
            ReceiptOutcome::Unknown(id) => Err(OutreachError::UnknownReceipt(id)),
            ReceiptOutcome::Rejected { reason, .. } => {
                Err(OutreachError::Internal(anyhow::anyhow!(reason)))
            }
        }
    }

    /// Apply a batch, reporting one outcome per item.
    pub fn apply_batch(&self, receipts: &[DeliveryReceipt]) -> Vec<ReceiptOutcome> {
        receipts
            .iter()
            .map(|r| match self.apply_inner(r) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(correlation_id = %r.correlation_id, error = %e, "Receipt failed");
                    ReceiptOutcome::Rejected {
                        correlation_id: r.correlation_id.clone(),
                        reason: e.to_string(),
                    }
                }
            })
            .collect()
    }

    fn apply_inner(&self, receipt: &DeliveryReceipt) -> OutreachResult<ReceiptOutcome> {
        if receipt.status == DeliveryStatus::Pending {
            return Ok(ReceiptOutcome::Rejected {
                correlation_id: receipt.correlation_id.clone(),
                reason: "receipt status must be SENT or FAILED".to_string(),
            });
        }

        let Some(mut entry) = self
            .store
            .find_log_entry_by_correlation_id(&receipt.correlation_id)?
        else {
            debug!(correlation_id = %receipt.correlation_id, "Receipt for unknown message");
            return Ok(ReceiptOutcome::Unknown(receipt.correlation_id.clone()));
        };

        if let Some(last) = entry.last_attempt_at {
            if receipt.occurred_at < last {
                return Ok(ReceiptOutcome::Stale(receipt.correlation_id.clone()));
            }
        }

        entry.status = receipt.status;
        entry.failure_reason = receipt.error_reason.clone();
        // Receipt time, not wall clock, so replays converge.
        entry.last_attempt_at = Some(receipt.occurred_at);
        self.store.update_log_entry(entry.clone())?;

        debug!(
            correlation_id = %receipt.correlation_id,
            status = ?receipt.status,
            "Receipt applied"
        );
        Ok(ReceiptOutcome::Updated(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use outreach_store::MemoryStore;
    use uuid::Uuid;

    fn seeded_store(correlations: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let campaign_id = Uuid::new_v4();
        let entries = correlations
            .iter()
            .enumerate()
            .map(|(i, c)| CommunicationLogEntry {
                campaign_id,
                customer_id: i as u64 + 1,
                message: "hi".to_string(),
                status: DeliveryStatus::Failed,
                attempts: 1,
                last_attempt_at: Some(Utc::now() - Duration::minutes(10)),
                failure_reason: Some("Simulated delivery failure".to_string()),
                vendor_correlation_id: Some(c.to_string()),
            })
            .collect();
        store.save_log_entries(entries).unwrap();
        store
    }

    fn receipt(correlation: &str, status: DeliveryStatus) -> DeliveryReceipt {
        DeliveryReceipt {
            correlation_id: correlation.to_string(),
            status,
            error_reason: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_receipt_revises_failed_finding() {
        let store = seeded_store(&["msg-1"]);
        let reconciler = ReceiptReconciler::new(store);

        let updated = reconciler
            .apply(&receipt("msg-1", DeliveryStatus::Sent))
            .unwrap();
        assert_eq!(updated.status, DeliveryStatus::Sent);
        assert!(updated.failure_reason.is_none());
        assert_eq!(updated.attempts, 1);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let store = seeded_store(&["msg-1"]);
        let reconciler = ReceiptReconciler::new(store);
        let r = receipt("msg-1", DeliveryStatus::Sent);

        let once = reconciler.apply(&r).unwrap();
        let twice = reconciler.apply(&r).unwrap();
        assert_eq!(once.status, twice.status);
        assert_eq!(once.last_attempt_at, twice.last_attempt_at);
        assert_eq!(once.attempts, twice.attempts);
        assert_eq!(once.failure_reason, twice.failure_reason);
    }

    #[test]
    fn test_stale_receipt_ignored() {
        let store = seeded_store(&["msg-1"]);
        let reconciler = ReceiptReconciler::new(store.clone());

        let fresh = receipt("msg-1", DeliveryStatus::Sent);
        reconciler.apply(&fresh).unwrap();

        let mut stale = receipt("msg-1", DeliveryStatus::Failed);
        stale.occurred_at = fresh.occurred_at - Duration::hours(1);
        stale.error_reason = Some("late bounce".to_string());

        let outcomes = reconciler.apply_batch(&[stale]);
        assert!(matches!(outcomes[0], ReceiptOutcome::Stale(_)));

        let entry = store
            .find_log_entry_by_correlation_id("msg-1")
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, DeliveryStatus::Sent);
    }

    #[test]
    fn test_unknown_receipt_reported() {
        let store = seeded_store(&["msg-1"]);
        let reconciler = ReceiptReconciler::new(store);
        let err = reconciler
            .apply(&receipt("msg-nope", DeliveryStatus::Sent))
            .unwrap_err();
        assert!(matches!(err, OutreachError::UnknownReceipt(_)));
    }

    #[test]
    fn test_batch_reports_per_item_outcomes() {
        let store = seeded_store(&["msg-1", "msg-2", "msg-3", "msg-4"]);
        let reconciler = ReceiptReconciler::new(store);

        let batch = vec![
            receipt("msg-1", DeliveryStatus::Sent),
            receipt("msg-2", DeliveryStatus::Sent),
            receipt("msg-unknown", DeliveryStatus::Sent),
            receipt("msg-3", DeliveryStatus::Failed),
            receipt("msg-4", DeliveryStatus::Sent),
        ];
        let outcomes = reconciler.apply_batch(&batch);

        assert_eq!(outcomes.len(), 5);
        let updated = outcomes
            .iter()
            .filter(|o| matches!(o, ReceiptOutcome::Updated(_)))
            .count();
        assert_eq!(updated, 4);
        assert!(matches!(&outcomes[2], ReceiptOutcome::Unknown(id) if id == "msg-unknown"));
    }

    #[test]
    fn test_pending_receipt_rejected() {
        let store = seeded_store(&["msg-1"]);
        let reconciler = ReceiptReconciler::new(store);
        let outcomes = reconciler.apply_batch(&[receipt("msg-1", DeliveryStatus::Pending)]);
        assert!(matches!(outcomes[0], ReceiptOutcome::Rejected { .. }));
    }
}
