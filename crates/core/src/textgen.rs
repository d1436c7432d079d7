//! Text-generation collaborator — trait seam for campaign summaries and
//! natural-language rule translation.
//!
//! The engine calls this only at the `Completed` transition and treats any
//! failure as non-fatal: a fallback message is stored instead.

use std::sync::Arc;

use crate::types::CampaignStats;
use anyhow::Result;

/// Fallback stored when summary generation fails.
pub const SUMMARY_FALLBACK: &str = "Summary unavailable.";

/// Trait for the opaque text-generation collaborator.
pub trait TextGenerator: Send + Sync {
    /// One-paragraph delivery summary for a completed campaign.
    fn summarize(&self, campaign_name: &str, stats: &CampaignStats) -> Result<String>;

    /// Translate a free-text audience description into a rule tree in wire
    /// form. `None` means the text could not be translated.
    fn rules_from_text(&self, query: &str) -> Result<Option<serde_json::Value>>;
}

/// Deterministic template-based generator. Stands in for a hosted model in
/// development and tests.
pub struct StubTextGenerator;

impl TextGenerator for StubTextGenerator {
    fn summarize(&self, campaign_name: &str, stats: &CampaignStats) -> Result<String> {
        Ok(format!(
            "Campaign \"{}\" reached {} customers: {} delivered, {} failed ({:.1}% success).",
            campaign_name, stats.total_audience, stats.sent, stats.failed, stats.success_rate
        ))
    }

    fn rules_from_text(&self, _query: &str) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

/// Generator that always errors, for exercising the fallback path.
pub struct FailingTextGenerator;

impl TextGenerator for FailingTextGenerator {
    fn summarize(&self, _campaign_name: &str, _stats: &CampaignStats) -> Result<String> {
        Err(anyhow::anyhow!("text generation backend unavailable"))
    }

    fn rules_from_text(&self, _query: &str) -> Result<Option<serde_json::Value>> {
        Err(anyhow::anyhow!("text generation backend unavailable"))
    }
}

/// Convenience: the stub generator as a trait object.
pub fn stub_generator() -> Arc<dyn TextGenerator> {
    Arc::new(StubTextGenerator)
}
