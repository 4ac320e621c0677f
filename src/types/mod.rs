pub mod errors;
pub mod models;

pub use errors::{StoreError, StoreResult};
