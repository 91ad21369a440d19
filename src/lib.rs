// src/lib.rs
//
// Multi-subject boundary violation tracking.
//
//   detections ─▶ identity tracker ─▶ ground contact ─▶ boundary ─▶ violation state
//                                                                      │
//                                                evidence recorder ◀───┘

pub mod analysis;
pub mod boundary;
pub mod config;
pub mod error;
pub mod evidence;
pub mod pipeline;
pub mod replay;
pub mod types;

pub use boundary::{BoundaryConfig, BoundaryMethod, BoundaryModel};
pub use error::{Result, WatchError};
pub use pipeline::{FrameContext, FrameInput, PipelineEvent, ViolationPipeline};
pub use types::Config;
