//! Outreach — campaign orchestration engine demo.
//!
//! Seeds a customer base, defines a high-value segment, then runs one
//! immediate and one scheduled campaign end to end: delivery simulation,
//! receipt reconciliation, and the live progress feed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use uuid::Uuid;

use outreach_core::config::AppConfig;
use outreach_core::textgen::stub_generator;
use outreach_core::types::{Customer, DeliveryReceipt, DeliveryStatus};
use outreach_delivery::{DeliveryPipeline, ReceiptReconciler, SimulatedVendor};
use outreach_orchestration::{
    CampaignLifecycle, CreateCampaignRequest, ProgressProjector, SchedulerLoop, SegmentService,
};
use outreach_segmentation::{AudienceResolver, Rule};
use outreach_store::{CampaignStore, MemoryStore};

#[derive(Parser, Debug)]
#[command(name = "outreach")]
#[command(about = "Customer outreach campaign orchestration engine")]
#[command(version)]
struct Cli {
    /// Number of demo customers to seed
    #[arg(long, default_value_t = 40)]
    customers: usize,

    /// RNG seed for demo data and delivery simulation
    #[arg(long, env = "OUTREACH__VENDOR__SEED")]
    seed: Option<u64>,

    /// Delivery batch size (overrides config)
    #[arg(long, env = "OUTREACH__DELIVERY__BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Scheduler tick interval in seconds (overrides config)
    #[arg(long, env = "OUTREACH__SCHEDULER__TICK_INTERVAL_SECS")]
    tick_secs: Option<u64>,

    /// Delay in seconds for the scheduled demo campaign
    #[arg(long, default_value_t = 3)]
    schedule_delay_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outreach=info".into()),
        )
        .init();

    let cli = Cli::parse();

    info!("Outreach starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(seed) = cli.seed {
        config.vendor.seed = Some(seed);
    }
    if let Some(batch_size) = cli.batch_size {
        config.delivery.batch_size = batch_size;
    }
    if let Some(tick_secs) = cli.tick_secs {
        config.scheduler.tick_interval_secs = tick_secs;
    }

    info!(
        batch_size = config.delivery.batch_size,
        tick_interval_secs = config.scheduler.tick_interval_secs,
        success_rate = config.vendor.success_rate,
        "Configuration loaded"
    );

    // Wire the engine: store, vendor, resolver, pipeline, lifecycle.
    let store = Arc::new(MemoryStore::new());
    let vendor = Arc::new(SimulatedVendor::new(&config.vendor));
    let resolver = AudienceResolver::new(store.clone());
    let pipeline = Arc::new(DeliveryPipeline::new(
        store.clone(),
        vendor,
        resolver.clone(),
        config.delivery.batch_size,
    ));
    let textgen = stub_generator();
    let lifecycle = Arc::new(CampaignLifecycle::new(
        store.clone(),
        pipeline,
        resolver.clone(),
        textgen.clone(),
    ));
    let segments = SegmentService::new(store.clone(), resolver, textgen);
    let projector = ProgressProjector::new(store.clone());
    let reconciler = ReceiptReconciler::new(store.clone());

    seed_customers(store.as_ref(), cli.customers, cli.seed.unwrap_or(1));

    // Win-back segment: spent over 5000 but last purchased at least 180
    // days ago.
    let user_id = Uuid::new_v4();
    let rules = Rule::from_value(serde_json::json!({
        "operator": "AND",
        "conditions": [
            { "field": "totalSpend", "operator": ">=", "value": 5000 },
            { "field": "lastPurchase", "operator": "since", "value": "180d" }
        ]
    }))?;
    let segment = segments.create_segment(user_id, "High-value lapsed buyers", rules)?;
    info!(
        segment_id = %segment.id,
        audience_size = segment.audience_size,
        "Demo segment ready"
    );

    // Immediate campaign: dispatched inline before create returns.
    let immediate = lifecycle
        .create_campaign(CreateCampaignRequest {
            user_id,
            name: "Winback offer".to_string(),
            segment_id: segment.id,
            message: "We miss you {{name}}, here's 10% off your next order!".to_string(),
            schedule: None,
        })
        .await?;
    info!(
        campaign_id = %immediate.id,
        status = ?immediate.status,
        sent = immediate.stats.sent,
        failed = immediate.stats.failed,
        summary = immediate.summary.as_deref().unwrap_or("-"),
        "Immediate campaign finished"
    );

    // Demo receipt flow: the vendor retries one failed delivery and
    // confirms it asynchronously.
    if let Some(entry) = store
        .logs_for_campaign(immediate.id, Some(DeliveryStatus::Failed))?
        .first()
    {
        if let Some(correlation_id) = &entry.vendor_correlation_id {
            let receipt = DeliveryReceipt {
                correlation_id: correlation_id.clone(),
                status: DeliveryStatus::Sent,
                error_reason: None,
                occurred_at: Utc::now(),
            };
            let updated = reconciler.apply(&receipt)?;
            info!(
                correlation_id = %receipt.correlation_id,
                status = ?updated.status,
                "Receipt reconciled"
            );
        }
    }

    // Scheduled campaign, picked up by the scheduler loop once due.
    let scheduled = lifecycle
        .create_campaign(CreateCampaignRequest {
            user_id,
            name: "Weekend reminder".to_string(),
            segment_id: segment.id,
            message: "{{name}}, your {{visitCount}} visits earned you a reward.".to_string(),
            schedule: Some(Utc::now() + chrono::Duration::seconds(cli.schedule_delay_secs as i64)),
        })
        .await?;
    info!(campaign_id = %scheduled.id, schedule = ?scheduled.schedule, "Campaign scheduled");

    let scheduler = Arc::new(SchedulerLoop::new(
        store.clone(),
        lifecycle,
        // Demo run: keep ticks fast regardless of the production default.
        Duration::from_secs(config.scheduler.tick_interval_secs.clamp(1, 5)),
    ));
    let scheduler_task = scheduler.start();

    // Stream progress until the scheduled campaign completes.
    let mut feed = projector.subscribe(
        scheduled.id,
        Duration::from_millis(config.delivery.progress_poll_secs * 100),
    );
    while let Some(snapshot) = feed.recv().await {
        info!(
            campaign_id = %snapshot.campaign_id,
            status = ?snapshot.status,
            sent = snapshot.sent,
            failed = snapshot.failed,
            pending = snapshot.pending,
            progress_pct = %format!("{:.0}", snapshot.progress_pct),
            "Progress"
        );
    }
    scheduler_task.abort();

    let final_state = store
        .get_campaign(scheduled.id)?
        .expect("scheduled campaign exists");
    info!(
        campaign_id = %final_state.id,
        status = ?final_state.status,
        success_rate = %format!("{:.1}", final_state.stats.success_rate),
        summary = final_state.summary.as_deref().unwrap_or("-"),
        "Scheduled campaign finished"
    );

    Ok(())
}

/// Seed a reproducible demo customer base.
fn seed_customers(store: &MemoryStore, count: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let now = Utc::now();
    for i in 1..=count as u64 {
        let last_purchase_days: i64 = rng.gen_range(1..400);
        let customer = Customer {
            customer_id: i,
            name: format!("Customer {i}"),
            email: format!("customer{i}@example.com"),
            phone: rng
                .gen_bool(0.7)
                .then(|| format!("+91-98{:08}", rng.gen_range(0..100_000_000u64))),
            total_spend: rng.gen_range(0.0..20_000.0),
            visit_count: rng.gen_range(0..50),
            last_purchase: rng
                .gen_bool(0.8)
                .then(|| now - chrono::Duration::days(last_purchase_days)),
            created_at: now - chrono::Duration::days(rng.gen_range(30..1000)),
        };
        if let Err(e) = store.save_customer(customer) {
            warn!(customer_id = i, error = %e, "Failed to seed customer");
        }
    }
    info!(customers = count, seed, "Demo customers seeded");
}
