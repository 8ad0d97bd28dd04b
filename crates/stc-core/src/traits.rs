use async_trait::async_trait;

use crate::query::{CollectorOutput, SearchRequest};
use crate::types::IndexConfig;

/// Local full-text engine the distributed provider registers downloaded
/// collections with and forwards compiled requests to.
#[async_trait]
pub trait IndexEngine: Send + Sync {
    async fn register(&self, config: &IndexConfig) -> crate::Result<()>;
    async fn search(&self, request: &SearchRequest) -> crate::Result<Vec<CollectorOutput>>;
}
