//! `KvClient` adapters for the stores a region can sit on

pub mod foyer_store;
pub mod moka_store;
pub mod sled_store;

pub use foyer_store::FoyerKvClient;
pub use moka_store::MokaKvClient;
pub use sled_store::SledKvClient;
