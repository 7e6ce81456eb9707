//! Deployable function units
//!
//! Terminal stage operations materialize a chain into a `FunctionUnit`:
//! one trigger descriptor, one ordered dependency list, and one handler
//! closure that drains the chain for a single event. The unit is the
//! deployment boundary — a host wires the trigger, resolves the
//! dependencies into clients, and invokes the handler per firing.

use crate::dependency::{Client, ClientResolver, DependencyList};
use crate::event::{Event, TriggerDescriptor};
use alembic_core::{AlembicError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

/// Deployment-facing properties of one function unit.
#[derive(Debug, Clone)]
pub struct FunctionProps {
    pub name: String,
    pub timeout: Duration,
    pub memory_mb: u32,
    /// How many messages or records the trigger delivers per event.
    pub batch_size: usize,
}

impl Default for FunctionProps {
    fn default() -> Self {
        Self {
            name: "handler".into(),
            timeout: Duration::from_secs(30),
            memory_mb: 128,
            batch_size: 10,
        }
    }
}

impl FunctionProps {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_memory_mb(mut self, memory_mb: u32) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Handler closure: drains the chain for one event given positionally
/// matched clients.
pub type UnitHandler =
    Arc<dyn Fn(Event, Vec<Client>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A materialized chain, ready for a host to deploy and invoke.
#[derive(Clone)]
pub struct FunctionUnit {
    props: FunctionProps,
    trigger: TriggerDescriptor,
    deps: DependencyList,
    handler: UnitHandler,
}

impl FunctionUnit {
    pub(crate) fn new(
        props: FunctionProps,
        trigger: TriggerDescriptor,
        deps: DependencyList,
        handler: UnitHandler,
    ) -> Self {
        Self {
            props,
            trigger,
            deps,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.props.name
    }

    pub fn props(&self) -> &FunctionProps {
        &self.props
    }

    pub fn trigger(&self) -> &TriggerDescriptor {
        &self.trigger
    }

    /// Dependencies in positional order: index 0 is the most recently
    /// declared.
    pub fn dependencies(&self) -> DependencyList {
        Arc::clone(&self.deps)
    }

    /// Invoke with an explicit client list. The list must match the
    /// dependency list positionally in both count and kind.
    pub async fn invoke_with(&self, event: Event, clients: Vec<Client>) -> Result<()> {
        if clients.len() != self.deps.len() {
            return Err(AlembicError::DependencyShape {
                expected: format!("{} clients", self.deps.len()),
                got: format!("{} clients", clients.len()),
            });
        }
        for (dep, client) in self.deps.iter().zip(&clients) {
            if dep.kind() != client.kind() {
                return Err(AlembicError::DependencyShape {
                    expected: format!("{} '{}'", dep.kind(), dep.target()),
                    got: client.kind().to_string(),
                });
            }
        }

        tracing::info!(unit = %self.props.name, event = event.kind(), "invoking function unit");
        let result = (self.handler)(event, clients).await;
        if let Err(e) = &result {
            tracing::error!(unit = %self.props.name, error = %e, "function unit failed");
        }
        result
    }

    /// Resolve every dependency through `resolver`, yielding a unit that
    /// can be invoked with an event alone.
    pub fn bind(&self, resolver: &dyn ClientResolver) -> Result<BoundUnit> {
        let clients = self
            .deps
            .iter()
            .map(|dep| resolver.resolve(dep))
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundUnit {
            unit: self.clone(),
            clients,
        })
    }
}

impl std::fmt::Debug for FunctionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionUnit")
            .field("props", &self.props)
            .field("trigger", &self.trigger)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// A function unit with its dependency list already resolved.
pub struct BoundUnit {
    unit: FunctionUnit,
    clients: Vec<Client>,
}

impl BoundUnit {
    pub fn name(&self) -> &str {
        self.unit.name()
    }

    pub async fn invoke(&self, event: Event) -> Result<()> {
        self.unit.invoke_with(event, self.clients.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{Dependency, StaticResolver};
    use crate::sink::CollectingSink;
    use crate::stage::Stage;

    fn forwarding_unit() -> FunctionUnit {
        Stage::<i64>::from_queue("numbers").for_each(
            Some(Dependency::sink("out")),
            FunctionProps::named("forward"),
            |n: i64, client| async move {
                let sink = client.ok_or_else(|| anyhow::anyhow!("missing client"))?.as_sink()?;
                sink.accept(vec![serde_json::json!(n)]).await
            },
        )
    }

    #[tokio::test]
    async fn test_invoke_with_rejects_wrong_count() {
        let unit = forwarding_unit();
        let err = unit
            .invoke_with(Event::Queue { messages: vec![] }, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, AlembicError::DependencyShape { .. }));
    }

    #[tokio::test]
    async fn test_invoke_with_rejects_wrong_kind() {
        let unit = forwarding_unit();
        let store = Client::Store(Arc::new(crate::mem::MemoryStore::new()));
        let err = unit
            .invoke_with(Event::Queue { messages: vec![] }, vec![store])
            .await
            .unwrap_err();
        assert!(matches!(err, AlembicError::DependencyShape { .. }));
    }

    #[tokio::test]
    async fn test_bind_resolves_and_invokes() {
        let unit = forwarding_unit();
        let sink = Arc::new(CollectingSink::new());
        let resolver =
            StaticResolver::new().with(Dependency::sink("out"), Client::Sink(sink.clone()));

        let bound = unit.bind(&resolver).unwrap();
        bound
            .invoke(Event::Queue {
                messages: vec![serde_json::json!(4), serde_json::json!(5)],
            })
            .await
            .unwrap();

        assert_eq!(sink.values(), vec![serde_json::json!(4), serde_json::json!(5)]);
    }

    #[test]
    fn test_bind_fails_on_unregistered_dependency() {
        let unit = forwarding_unit();
        let resolver = StaticResolver::new();
        assert!(unit.bind(&resolver).is_err());
    }
}
