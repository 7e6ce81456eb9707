//! Sink boundary
//!
//! A sink accepts a batch of values and acknowledges receipt. Sinks appear
//! twice in a pipeline's life: as a declared `Dependency` of a function
//! unit and as the terminal consumer `to_sink` forwards batches to.

use alembic_core::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Accepts a batch of values. An empty batch must be a no-op.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn accept(&self, batch: Vec<serde_json::Value>) -> Result<()>;
}

/// Sink that buffers every accepted batch in memory. Useful for local
/// wiring and tests.
#[derive(Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<Vec<serde_json::Value>>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every accepted batch, in arrival order.
    pub fn batches(&self) -> Vec<Vec<serde_json::Value>> {
        self.batches.lock().clone()
    }

    /// All accepted values, flattened in arrival order.
    pub fn values(&self) -> Vec<serde_json::Value> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl RecordSink for CollectingSink {
    async fn accept(&self, batch: Vec<serde_json::Value>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.batches.lock().push(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collecting_sink_preserves_batch_order() {
        let sink = CollectingSink::new();
        sink.accept(vec![serde_json::json!(1), serde_json::json!(2)])
            .await
            .unwrap();
        sink.accept(vec![serde_json::json!(3)]).await.unwrap();

        assert_eq!(sink.batches().len(), 2);
        assert_eq!(
            sink.values(),
            vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]
        );
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let sink = CollectingSink::new();
        sink.accept(vec![]).await.unwrap();
        assert!(sink.batches().is_empty());
    }
}
