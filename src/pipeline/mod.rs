// src/pipeline/mod.rs

pub mod clock;
pub mod event_bus;
pub mod frame_context;
pub mod metrics;
pub mod orchestrator;

pub use clock::SessionClock;
pub use event_bus::{EventBus, PipelineEvent};
pub use frame_context::{FrameContext, IdentityView, SideView};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::{ControlCommand, FrameInput, ViolationPipeline};
