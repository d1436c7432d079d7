//! Message delivery: the vendor boundary, per-recipient rendering, the
//! batched dispatch pipeline, and receipt reconciliation.

pub mod pipeline;
pub mod receipts;
pub mod render;
pub mod vendor;

pub use pipeline::DeliveryPipeline;
pub use receipts::{ReceiptOutcome, ReceiptReconciler};
pub use render::render_message;
pub use vendor::{DeliveryOutcome, SimulatedVendor, VendorGateway};
