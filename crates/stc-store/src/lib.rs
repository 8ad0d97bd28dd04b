//! stc-store
//!
//! Local metadata store on redb: collection configs, bookmarks and search
//! latency samples, in two independently versioned collections.
pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{MetaStore, METRICS_RETENTION, META_SCHEMA_VERSION, USER_SCHEMA_VERSION};
