pub mod lifecycle;
pub mod visitor;

pub use lifecycle::SessionLifecycleService;
pub use visitor::{VisitorOutcome, VisitorService, should_track_path};
