//! On-disk storage for learned policies.

mod store;

pub use store::{PolicyStore, StoreConfig};
