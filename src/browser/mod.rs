pub mod events;
pub mod router;

pub use events::{BrowserEvent, IdleState, TabId, TabInfo, WindowId};
pub use router::BrowserRouter;
