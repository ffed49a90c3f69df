pub mod conditions;
pub mod engine;
pub mod schedule;
pub mod source;

pub use conditions::{qualifying_entities, EntityVisit, VisitCondition};
pub use engine::{HistoryEngine, HistoryRun};
pub use schedule::{day_boundary_after, day_boundary_at_or_before, spawn_scheduler};
pub use source::{HistoryLog, HistorySource, HistoryVisit, Transition};
