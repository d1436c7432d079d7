//! Audience resolution — materializes the recipient set for a segment.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use outreach_core::types::Customer;
use outreach_core::OutreachResult;

use crate::rules::{compile, AudienceFilter, Rule};

/// Named audience definition: a rule tree plus a cached size.
///
/// `audience_size` is recomputed whenever the rules change. Campaigns
/// re-evaluate the rules against live data at send time; the cache only
/// feeds list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub rules: Rule,
    pub audience_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer-query collaborator. The full store implements this; the
/// resolver needs nothing else.
pub trait CustomerQuery: Send + Sync {
    /// All customers matching the compiled predicate. May paginate
    /// internally but must return the complete set or fail with
    /// `QueryFailed` — never a silently truncated one.
    fn find_customers(&self, filter: &AudienceFilter) -> OutreachResult<Vec<Customer>>;
}

/// Resolves segment rules into an ordered, duplicate-free recipient list.
#[derive(Clone)]
pub struct AudienceResolver {
    store: Arc<dyn CustomerQuery>,
}

impl AudienceResolver {
    pub fn new(store: Arc<dyn CustomerQuery>) -> Self {
        Self { store }
    }

    /// Materialize the recipient set for `rules` as of `now`.
    ///
    /// The result is sorted by customer id and deduplicated, so repeated
    /// resolution over an unchanged store yields an identical sequence.
    pub fn resolve(&self, rules: &Rule, now: DateTime<Utc>) -> OutreachResult<Vec<Customer>> {
        let filter = compile(rules, now)?;
        let mut customers = self.store.find_customers(&filter)?;
        customers.sort_by_key(|c| c.customer_id);
        customers.dedup_by_key(|c| c.customer_id);
        debug!(matched = customers.len(), "Audience resolved");
        Ok(customers)
    }

    /// Audience size preview for a rule tree, without persisting anything.
    pub fn preview_size(&self, rules: &Rule, now: DateTime<Utc>) -> OutreachResult<u64> {
        Ok(self.resolve(rules, now)?.len() as u64)
    }
}
