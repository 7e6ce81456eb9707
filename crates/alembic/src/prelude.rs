//! Alembic Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use alembic::prelude::*;
//! ```

// Core types
pub use crate::{AlembicError, AttrValue, Key, KeyDef, Result, WireItem, WireKey};

// Pipeline engine
pub use crate::{
    Dependency, Event, FunctionProps, FunctionUnit, Schedule, Stage, StartingPosition,
};

// Clients and resolution
pub use crate::{Capability, Client, ClientResolver, StaticResolver};

// Data access
pub use crate::{JsonMapper, KeyValueClient, Mapper, QueryOptions, QueryPage};

// Expressions
pub use crate::{CmpOp, Condition, Field, Path, UpdateExpr};

// Boundaries
pub use crate::{QueueClient, RecordSink, StoreBackend, TopicClient};

// Local hosting
pub use crate::{CollectingSink, MemoryQueue, MemoryStore, MemoryTopic};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;
