//! Round history module.
//!
//! Keeps the bounded time-series of sealed rounds and its JSON file.

mod models;
mod retention;
mod store;

pub use models::*;
pub use retention::*;
pub use store::*;
