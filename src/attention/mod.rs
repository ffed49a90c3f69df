pub mod ledger;
pub mod threshold;

pub use ledger::PageLedger;
pub use threshold::{progress, remaining, Schedule, ThresholdError, MAX_ATTENTION_SECS};
