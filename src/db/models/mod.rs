pub mod flattr;
pub mod page;
pub mod submission;

pub use flattr::{FlattrRecord, FlattrRequest, FlattrType};
pub use page::PageRecord;
pub use submission::PendingSubmission;
