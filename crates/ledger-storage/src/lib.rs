//! Persistence for mined blocks.

pub mod sled_store;

pub use sled_store::SledStore;
