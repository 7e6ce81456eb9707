//! Alembic: lazy stream pipelines over a typed key-value store
//!
//! Alembic provides two layers that meet at the deployment boundary:
//! - **Pipeline engine**: chainable `Stage` transformations rooted at a
//!   trigger, materialized into deployable `FunctionUnit`s
//! - **Data access**: `KeyValueClient` with typed records, structured keys,
//!   and compiled condition/update expressions
//! - **Local hosting**: `MemoryStore` and friends run the full wire
//!   protocol in-process
//!
//! # Quick Start
//!
//! ```no_run
//! use alembic::prelude::*;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Signup {
//!     email: String,
//! }
//!
//! // Define the pipeline once; nothing runs until a trigger fires.
//! let unit = Stage::<Signup>::from_queue("signups")
//!     .map(Some(Dependency::store("accounts")), |signup, client| async move {
//!         let _store = client.ok_or_else(|| anyhow::anyhow!("missing store"))?.as_store()?;
//!         Ok(signup.email)
//!     })
//!     .for_each(None, FunctionProps::named("register"), |email, _| async move {
//!         tracing::info!(%email, "registered");
//!         Ok(())
//!     });
//!
//! // A host resolves the dependency list and invokes per event.
//! assert_eq!(unit.dependencies().len(), 1);
//! ```

pub mod client;
pub mod dependency;
pub mod event;
pub mod function_unit;
pub mod mem;
pub mod prelude;
pub mod sink;
pub mod stage;
pub mod store;

// Re-export core types
pub use alembic_core::{
    read_key, write_key, AlembicError, AttrValue, JsonMapper, Key, KeyDef, Mapper, Result,
    WireExpression, WireItem, WireKey,
};

// Re-export the expression DSL
pub use alembic_expr::{
    fields, CmpOp, Condition, Field, Namespace, Path, UpdateExpr,
};

// Re-export main types from this crate
pub use client::{KeyValueClient, QueryOptions, QueryPage};
pub use dependency::{
    Capability, Client, ClientResolver, Dependency, DependencyList, QueueClient, StaticResolver,
    TopicClient,
};
pub use event::{Event, Schedule, StartingPosition, TriggerDescriptor};
pub use function_unit::{BoundUnit, FunctionProps, FunctionUnit};
pub use mem::{MemoryQueue, MemoryStore, MemoryTopic};
pub use sink::{CollectingSink, RecordSink};
pub use stage::Stage;
pub use store::{QueryOutput, QueryRequest, StoreBackend};
