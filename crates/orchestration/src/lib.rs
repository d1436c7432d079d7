//! Campaign orchestration: the lifecycle state machine, segment
//! management, the scheduling loop, and progress projection.

pub mod lifecycle;
pub mod progress;
pub mod scheduler;
pub mod segments;

pub use lifecycle::{CampaignLifecycle, CreateCampaignRequest};
pub use progress::ProgressProjector;
pub use scheduler::SchedulerLoop;
pub use segments::SegmentService;
