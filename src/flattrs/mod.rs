pub mod api;
pub mod coordinator;
pub mod queue;

pub use api::{FlattrApi, OutboundFlattr, SubmitOutcome};
pub use coordinator::FlattrCoordinator;
pub use queue::{QueueState, SubmissionQueue};
