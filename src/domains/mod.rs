pub mod categories;
pub mod presets;
pub mod resolver;

pub use categories::{is_multi_author, Category};
pub use presets::{DomainStatus, PresetNode, PresetTree};
pub use resolver::{Classification, DomainResolver};
