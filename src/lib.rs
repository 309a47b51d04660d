pub mod core;
pub mod dashboard;
pub mod features;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use core::config;
pub use core::types;
pub use core::types::*;
pub use core::AppState;

pub use features::{catalog, persistence, progress};
pub use tools::harvest;
