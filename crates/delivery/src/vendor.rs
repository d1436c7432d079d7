//! Vendor gateway — boundary to the external delivery endpoint.
//!
//! The simulated vendor models both failure modes of a real provider: the
//! outbound call itself can error (network, timeout), and an accepted call
//! can still be marked undeliverable. "Accepted for delivery" is not
//! "confirmed delivered" — asynchronous receipts may revise the outcome
//! later.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use uuid::Uuid;

use outreach_core::config::VendorConfig;
use outreach_core::types::Customer;
use outreach_core::{OutreachError, OutreachResult};

/// Synchronous outcome of one vendor call.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub accepted: bool,
    pub correlation_id: String,
    pub error_reason: Option<String>,
}

/// Boundary trait for the external delivery endpoint.
pub trait VendorGateway: Send + Sync {
    /// Submit one rendered message. `Err` means the call itself failed;
    /// `Ok` with `accepted == false` means the vendor rejected delivery.
    fn send(&self, customer: &Customer, message: &str) -> OutreachResult<DeliveryOutcome>;
}

/// Simulated vendor with configurable success and call-failure rates.
///
/// The RNG is injectable via `VendorConfig::seed`, making a whole dispatch
/// run reproducible in tests.
pub struct SimulatedVendor {
    success_rate: f64,
    call_failure_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedVendor {
    pub fn new(config: &VendorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            success_rate: config.success_rate.clamp(0.0, 1.0),
            call_failure_rate: config.call_failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    pub fn with_seed(success_rate: f64, seed: u64) -> Self {
        Self::new(&VendorConfig {
            success_rate,
            call_failure_rate: 0.0,
            seed: Some(seed),
        })
    }
}

impl VendorGateway for SimulatedVendor {
    fn send(&self, customer: &Customer, _message: &str) -> OutreachResult<DeliveryOutcome> {
        let (call_failed, accepted) = {
            let mut rng = self.rng.lock();
            (
                rng.gen_bool(self.call_failure_rate),
                rng.gen_bool(self.success_rate),
            )
        };

        metrics::counter!("vendor.calls").increment(1);

        if call_failed {
            metrics::counter!("vendor.call_failures").increment(1);
            return Err(OutreachError::VendorCallFailed(format!(
                "timeout delivering to {}",
                customer.email
            )));
        }

        let correlation_id = format!("msg-{}", Uuid::new_v4());
        debug!(
            customer_id = customer.customer_id,
            correlation_id = %correlation_id,
            accepted,
            "Vendor call completed"
        );

        Ok(DeliveryOutcome {
            accepted,
            correlation_id,
            error_reason: (!accepted).then(|| "Simulated delivery failure".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn customer() -> Customer {
        Customer {
            customer_id: 1,
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone: None,
            total_spend: 100.0,
            visit_count: 1,
            last_purchase: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_seeded_vendor_is_deterministic() {
        let run = |seed| {
            let vendor = SimulatedVendor::with_seed(0.9, seed);
            (0..100)
                .map(|_| vendor.send(&customer(), "hi").unwrap().accepted)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
        assert_ne!(run(7), run(8));
    }

    #[test]
    fn test_rates_at_extremes() {
        let all = SimulatedVendor::with_seed(1.0, 1);
        assert!(all.send(&customer(), "hi").unwrap().accepted);

        let none = SimulatedVendor::with_seed(0.0, 1);
        let outcome = none.send(&customer(), "hi").unwrap();
        assert!(!outcome.accepted);
        assert!(outcome.error_reason.is_some());
    }

    #[test]
    fn test_call_failure_surfaces_as_error() {
        let vendor = SimulatedVendor::new(&VendorConfig {
            success_rate: 1.0,
            call_failure_rate: 1.0,
            seed: Some(3),
        });
        let err = vendor.send(&customer(), "hi").unwrap_err();
        assert!(matches!(err, OutreachError::VendorCallFailed(_)));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let vendor = SimulatedVendor::with_seed(1.0, 5);
        let a = vendor.send(&customer(), "hi").unwrap().correlation_id;
        let b = vendor.send(&customer(), "hi").unwrap().correlation_id;
        assert_ne!(a, b);
        assert!(a.starts_with("msg-"));
    }
}
