//! Dependency and client model
//!
//! A pipeline stage declares the runtime capabilities it needs as an
//! ordered list of `Dependency` values; at invocation the host resolves
//! each into a live `Client` handle. Lists are tail-first: every stage that
//! declares a dependency prepends it, so index 0 is always the most
//! recently added. A stage that declares nothing shares its predecessor's
//! list by `Arc` identity — that identity is what `run` uses to decide
//! whether to strip a client before recursing.

use crate::sink::RecordSink;
use crate::store::StoreBackend;
use alembic_core::{AlembicError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// The closed set of runtime capability kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Store,
    Queue,
    Topic,
    Sink,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Store => "store",
            Capability::Queue => "queue",
            Capability::Topic => "topic",
            Capability::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// A declared need for a runtime capability, resolved to a `Client` at
/// invocation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    kind: Capability,
    target: String,
}

impl Dependency {
    pub fn store(target: impl Into<String>) -> Self {
        Self {
            kind: Capability::Store,
            target: target.into(),
        }
    }

    pub fn queue(target: impl Into<String>) -> Self {
        Self {
            kind: Capability::Queue,
            target: target.into(),
        }
    }

    pub fn topic(target: impl Into<String>) -> Self {
        Self {
            kind: Capability::Topic,
            target: target.into(),
        }
    }

    pub fn sink(target: impl Into<String>) -> Self {
        Self {
            kind: Capability::Sink,
            target: target.into(),
        }
    }

    pub fn kind(&self) -> Capability {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Ordered, shared dependency list. Sharing the same `Arc` means "no new
/// dependency was added at this stage".
pub type DependencyList = Arc<Vec<Dependency>>;

/// Merge by prepending: the new dependency lands at index 0.
pub fn prepend(list: &DependencyList, dep: Dependency) -> DependencyList {
    let mut merged = Vec::with_capacity(list.len() + 1);
    merged.push(dep);
    merged.extend(list.iter().cloned());
    Arc::new(merged)
}

/// Sends single messages to a queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn send(&self, message: serde_json::Value) -> Result<()>;
}

/// Publishes single messages to a topic.
#[async_trait]
pub trait TopicClient: Send + Sync {
    async fn publish(&self, message: serde_json::Value) -> Result<()>;
}

/// A live handle to a resolved capability.
#[derive(Clone)]
pub enum Client {
    Store(Arc<dyn StoreBackend>),
    Queue(Arc<dyn QueueClient>),
    Topic(Arc<dyn TopicClient>),
    Sink(Arc<dyn RecordSink>),
}

impl Client {
    pub fn kind(&self) -> Capability {
        match self {
            Client::Store(_) => Capability::Store,
            Client::Queue(_) => Capability::Queue,
            Client::Topic(_) => Capability::Topic,
            Client::Sink(_) => Capability::Sink,
        }
    }

    /// Extract as a store handle
    pub fn as_store(&self) -> Result<Arc<dyn StoreBackend>> {
        match self {
            Client::Store(s) => Ok(Arc::clone(s)),
            other => Err(wrong_kind(Capability::Store, other.kind())),
        }
    }

    /// Extract as a queue handle
    pub fn as_queue(&self) -> Result<Arc<dyn QueueClient>> {
        match self {
            Client::Queue(q) => Ok(Arc::clone(q)),
            other => Err(wrong_kind(Capability::Queue, other.kind())),
        }
    }

    /// Extract as a topic handle
    pub fn as_topic(&self) -> Result<Arc<dyn TopicClient>> {
        match self {
            Client::Topic(t) => Ok(Arc::clone(t)),
            other => Err(wrong_kind(Capability::Topic, other.kind())),
        }
    }

    /// Extract as a sink handle
    pub fn as_sink(&self) -> Result<Arc<dyn RecordSink>> {
        match self {
            Client::Sink(s) => Ok(Arc::clone(s)),
            other => Err(wrong_kind(Capability::Sink, other.kind())),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({})", self.kind())
    }
}

fn wrong_kind(expected: Capability, got: Capability) -> AlembicError {
    AlembicError::DependencyShape {
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

/// Constructs a live handle for a dependency descriptor. Provided by the
/// host; the engine only consumes it.
pub trait ClientResolver: Send + Sync {
    fn resolve(&self, dep: &Dependency) -> Result<Client>;
}

/// Resolver over a fixed dependency-to-client table. Useful for local
/// hosting and tests.
#[derive(Default)]
pub struct StaticResolver {
    entries: Vec<(Dependency, Client)>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dep: Dependency, client: Client) -> Self {
        self.entries.push((dep, client));
        self
    }
}

impl ClientResolver for StaticResolver {
    fn resolve(&self, dep: &Dependency) -> Result<Client> {
        self.entries
            .iter()
            .find(|(d, _)| d == dep)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| {
                AlembicError::DependencyShape {
                    expected: format!("{} '{}'", dep.kind(), dep.target()),
                    got: "no client registered".into(),
                }
            })
    }
}
