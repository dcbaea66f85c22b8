//! Nebula Explorer (nebula-explorer)
//!
//! Asynchronous project resource explorer built on `nebula-tree`:
//! 1. **Lazy Loader**: on-demand children with in-flight deduplication
//! 2. **Mutation Engine**: create/rename/delete/move/copy confirmed by a
//!    [`ProjectBackend`], tracked per node by a small state machine
//! 3. **Explorer Controller**: expand/collapse, search and the visible
//!    projection handed to a renderer
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use nebula_explorer::prelude::*;
//! use std::sync::Arc;
//!
//! let explorer = Explorer::new(Arc::new(MemoryBackend::instant()), ExplorerConfig::default());
//! explorer.load_all().await?;
//!
//! let tables = NodeId::new("db_main_tables");
//! explorer.expand(&tables).await?;
//! for row in explorer.visible(Namespace::Models) {
//!     println!("{}{}", "  ".repeat(row.depth), row.name);
//! }
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod loader;
pub mod memory;
pub mod mutation;
pub mod ops;
mod workspace;

// Re-exports
pub use backend::{BackendError, NodeDraft, ProjectBackend, RemoteNode};
pub use config::{ConfigError, ExplorerConfig, MemoryBackendConfig, NebulaConfig};
pub use controller::{Explorer, OpenEvent};
pub use error::{ConflictReason, ErrorKind, ExplorerError};
pub use loader::LazyLoader;
pub use memory::MemoryBackend;
pub use mutation::MutationEngine;
pub use ops::{OpKind, OpPhase, OpRecord};

/// Common imports
pub mod prelude {
    pub use crate::backend::{BackendError, NodeDraft, ProjectBackend, RemoteNode};
    pub use crate::config::{ExplorerConfig, MemoryBackendConfig, NebulaConfig};
    pub use crate::controller::{Explorer, OpenEvent};
    pub use crate::error::{ConflictReason, ErrorKind, ExplorerError};
    pub use crate::memory::MemoryBackend;
    pub use nebula_tree::prelude::*;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
