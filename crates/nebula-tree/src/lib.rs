//! Nebula Tree (nebula-tree)
//!
//! Canonical data model for the project resource explorer:
//! 1. **Store**: one arena holding the five namespace forests, with
//!    id-based parent links and structural checks on every mutation
//! 2. **Search**: case-insensitive name filtering that keeps ancestors
//! 3. **Projection**: flattened rows for rendering
//!
//! # Quick Start
//!
//! ```rust
//! use nebula_tree::prelude::*;
//!
//! let mut store = Store::new();
//! let home = store
//!     .insert(
//!         Namespace::Pages,
//!         None,
//!         NewNode::container("home", "Home", NodeKind::Folder, vec![
//!             NewNode::leaf("index", "index.tsx", NodeKind::Frontend),
//!         ]),
//!     )
//!     .unwrap();
//!
//! let rows = project(&store, Namespace::Pages, &SearchFilter::new("index"), &ExpansionState::new());
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[0].id, home);
//! ```

pub mod error;
pub mod filter;
pub mod kind;
pub mod node;
pub mod projection;
pub mod store;
pub mod types;

// Re-exports
pub use error::{InvariantViolation, MoveRejection, StoreError};
pub use filter::{FilteredForest, FilteredNode, SearchFilter};
pub use kind::{DbGroupKind, KindCategory, NodeKind};
pub use node::{LoadState, NewNode, TreeNode};
pub use projection::{flatten, project, ExpansionState, VisibleRow};
pub use store::Store;
pub use types::{Namespace, NodeId, UnknownNamespace};

/// Common imports
pub mod prelude {
    pub use crate::error::{MoveRejection, StoreError};
    pub use crate::filter::SearchFilter;
    pub use crate::kind::{DbGroupKind, NodeKind};
    pub use crate::node::{LoadState, NewNode, TreeNode};
    pub use crate::projection::{project, ExpansionState, VisibleRow};
    pub use crate::store::Store;
    pub use crate::types::{Namespace, NodeId};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
