pub mod drag;
pub mod editing;
pub mod editor;
pub mod error;
pub mod history;
pub mod resolve;
pub mod snapping;
pub mod state;
pub mod types;

pub use error::{CoreError, Result};
pub use state::TimelineState;
