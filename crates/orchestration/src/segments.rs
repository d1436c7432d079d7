//! Segment management — CRUD with a cached, eagerly recomputed audience
//! size, plus natural-language rule translation through the text-generation
//! collaborator.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use outreach_core::textgen::TextGenerator;
use outreach_core::{OutreachError, OutreachResult};
use outreach_segmentation::{compile, AudienceResolver, Rule, Segment};
use outreach_store::CampaignStore;

pub struct SegmentService {
    store: Arc<dyn CampaignStore>,
    resolver: AudienceResolver,
    textgen: Arc<dyn TextGenerator>,
}

impl SegmentService {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        resolver: AudienceResolver,
        textgen: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            store,
            resolver,
            textgen,
        }
    }

    /// Create a segment. The rule tree is compiled up front so malformed
    /// rules are rejected before anything is stored, and the audience size
    /// cache is populated from a live count.
    pub fn create_segment(&self, user_id: Uuid, name: &str, rules: Rule) -> OutreachResult<Segment> {
        let now = Utc::now();
        compile(&rules, now)?;
        let audience_size = self.resolver.preview_size(&rules, now)?;

        let segment = Segment {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            rules,
            audience_size,
            created_at: now,
            updated_at: now,
        };
        info!(segment_id = %segment.id, name, audience_size, "Segment created");
        self.store.save_segment(segment.clone())?;
        Ok(segment)
    }

    /// Replace a segment's rules, invalidating and recomputing the cached
    /// audience size.
    pub fn update_segment_rules(&self, id: Uuid, rules: Rule) -> OutreachResult<Segment> {
        let mut segment = self
            .store
            .get_segment(id)?
            .ok_or(OutreachError::SegmentNotFound(id))?;

        let now = Utc::now();
        compile(&rules, now)?;
        segment.audience_size = self.resolver.preview_size(&rules, now)?;
        segment.rules = rules;
        segment.updated_at = now;
        info!(
            segment_id = %id,
            audience_size = segment.audience_size,
            "Segment rules updated"
        );
        self.store.save_segment(segment.clone())?;
        Ok(segment)
    }

    /// Audience size preview for an unsaved rule tree.
    pub fn preview_audience(&self, rules: &Rule) -> OutreachResult<u64> {
        self.resolver.preview_size(rules, Utc::now())
    }

    /// Build a segment from a free-text description. Returns `None` when
    /// the text-generation collaborator cannot translate the query.
    pub fn segment_from_text(
        &self,
        user_id: Uuid,
        name: &str,
        query: &str,
    ) -> OutreachResult<Option<Segment>> {
        let translated = self
            .textgen
            .rules_from_text(query)
            .map_err(OutreachError::Internal)?;
        let Some(raw) = translated else {
            return Ok(None);
        };
        let rules = Rule::from_value(raw)?;
        Ok(Some(self.create_segment(user_id, name, rules)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_core::textgen::StubTextGenerator;
    use outreach_core::types::Customer;
    use outreach_segmentation::{CompareOp, CustomerField, GroupOperator};
    use outreach_store::MemoryStore;

    fn service_with_customers(spends: &[f64]) -> SegmentService {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for (i, spend) in spends.iter().enumerate() {
            store
                .save_customer(Customer {
                    customer_id: i as u64 + 1,
                    name: format!("customer-{}", i + 1),
                    email: format!("c{}@example.com", i + 1),
                    phone: None,
                    total_spend: *spend,
                    visit_count: 0,
                    last_purchase: None,
                    created_at: now,
                })
                .unwrap();
        }
        let resolver = AudienceResolver::new(store.clone());
        SegmentService::new(store, resolver, Arc::new(StubTextGenerator))
    }

    fn spend_over(value: f64) -> Rule {
        Rule::Group {
            operator: GroupOperator::And,
            conditions: vec![Rule::Condition {
                field: CustomerField::TotalSpend,
                operator: CompareOp::Gt,
                value: serde_json::json!(value),
            }],
        }
    }

    #[test]
    fn test_create_caches_audience_size() {
        let service = service_with_customers(&[100.0, 2000.0, 3000.0]);
        let segment = service
            .create_segment(Uuid::new_v4(), "big", spend_over(1000.0))
            .unwrap();
        assert_eq!(segment.audience_size, 2);
    }

    #[test]
    fn test_update_recomputes_audience_size() {
        let service = service_with_customers(&[100.0, 2000.0, 3000.0]);
        let segment = service
            .create_segment(Uuid::new_v4(), "big", spend_over(1000.0))
            .unwrap();

        let updated = service
            .update_segment_rules(segment.id, spend_over(0.0))
            .unwrap();
        assert_eq!(updated.audience_size, 3);
    }

    #[test]
    fn test_update_missing_segment() {
        let service = service_with_customers(&[]);
        let err = service
            .update_segment_rules(Uuid::new_v4(), spend_over(0.0))
            .unwrap_err();
        assert!(matches!(err, OutreachError::SegmentNotFound(_)));
    }

    #[test]
    fn test_invalid_rules_rejected_before_save() {
        let service = service_with_customers(&[100.0]);
        let bad = Rule::Condition {
            field: CustomerField::VisitCount,
            operator: CompareOp::Since,
            value: serde_json::json!(30),
        };
        assert!(matches!(
            service.create_segment(Uuid::new_v4(), "bad", bad),
            Err(OutreachError::InvalidRule(_))
        ));
    }

    #[test]
    fn test_untranslatable_text_yields_none() {
        let service = service_with_customers(&[100.0]);
        let result = service
            .segment_from_text(Uuid::new_v4(), "nl", "people who love us")
            .unwrap();
        assert!(result.is_none());
    }
}
