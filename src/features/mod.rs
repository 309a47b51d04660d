pub mod catalog;
pub mod persistence;
pub mod progress;
