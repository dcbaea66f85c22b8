//! Node kinds and the fixed database schema
//!
//! [`NodeKind`] classifies every node. The classification decides whether
//! a node holds children, whether those children are fetched lazily, and
//! which sibling names collide.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Kind of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// Generic folder
    Folder,
    /// Generic file
    File,
    /// Frontend unit (page or app component)
    Frontend,
    /// Backend unit (API handler)
    Backend,
    /// Database connection; always holds the six schema groups
    DbConnection,
    /// Schema group under a connection; children load on demand
    DbGroup(DbGroupKind),
    /// Database table
    DbTable,
    /// Database view
    DbView,
    /// Stored function
    DbFunction,
    /// Stored procedure
    DbProcedure,
    /// Trigger
    DbTrigger,
    /// Saved query
    DbQuery,
    /// External system
    ExternalSystem,
    /// Endpoint of an external system
    ExternalApi,
}

/// Sibling collision class
///
/// Two siblings collide when they share a name and a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindCategory {
    /// Holds children
    Container,
    /// Holds no children
    Leaf,
}

impl NodeKind {
    /// Whether nodes of this kind hold children
    #[inline]
    #[must_use]
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Folder | NodeKind::DbConnection | NodeKind::DbGroup(_) | NodeKind::ExternalSystem
        )
    }

    /// Whether children are fetched on demand
    #[inline]
    #[must_use]
    pub fn is_lazy(self) -> bool {
        matches!(self, NodeKind::DbGroup(_))
    }

    /// Whether the user may rename, delete, move or copy this node
    #[inline]
    #[must_use]
    pub fn is_protected(self) -> bool {
        matches!(self, NodeKind::DbGroup(_))
    }

    /// Whether the child list is fixed at creation
    #[inline]
    #[must_use]
    pub fn has_fixed_schema(self) -> bool {
        matches!(self, NodeKind::DbConnection)
    }

    /// Collision class
    #[inline]
    #[must_use]
    pub fn category(self) -> KindCategory {
        if self.is_container() {
            KindCategory::Container
        } else {
            KindCategory::Leaf
        }
    }

    /// Short lowercase label used in logs and CLI output
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Folder => "folder",
            NodeKind::File => "file",
            NodeKind::Frontend => "frontend",
            NodeKind::Backend => "backend",
            NodeKind::DbConnection => "db-connection",
            NodeKind::DbGroup(_) => "db-group",
            NodeKind::DbTable => "db-table",
            NodeKind::DbView => "db-view",
            NodeKind::DbFunction => "db-function",
            NodeKind::DbProcedure => "db-procedure",
            NodeKind::DbTrigger => "db-trigger",
            NodeKind::DbQuery => "db-query",
            NodeKind::ExternalSystem => "external-system",
            NodeKind::ExternalApi => "external-api",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed schema groups of a database connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbGroupKind {
    /// Tables
    Tables,
    /// Views
    Views,
    /// Functions
    Functions,
    /// Procedures
    Procedures,
    /// Triggers
    Triggers,
    /// Saved queries
    Queries,
}

impl DbGroupKind {
    /// Schema order of the groups under a connection
    pub const ALL: [DbGroupKind; 6] = [
        DbGroupKind::Tables,
        DbGroupKind::Views,
        DbGroupKind::Functions,
        DbGroupKind::Procedures,
        DbGroupKind::Triggers,
        DbGroupKind::Queries,
    ];

    /// Display name of the group node
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            DbGroupKind::Tables => "Tables",
            DbGroupKind::Views => "Views",
            DbGroupKind::Functions => "Functions",
            DbGroupKind::Procedures => "Procedures",
            DbGroupKind::Triggers => "Triggers",
            DbGroupKind::Queries => "Queries",
        }
    }

    /// Suffix appended to the connection id to form the group id
    #[must_use]
    pub fn id_suffix(self) -> &'static str {
        match self {
            DbGroupKind::Tables => "tables",
            DbGroupKind::Views => "views",
            DbGroupKind::Functions => "funcs",
            DbGroupKind::Procedures => "procs",
            DbGroupKind::Triggers => "trigs",
            DbGroupKind::Queries => "queries",
        }
    }

    /// Kind of the leaves held by this group
    #[must_use]
    pub fn child_kind(self) -> NodeKind {
        match self {
            DbGroupKind::Tables => NodeKind::DbTable,
            DbGroupKind::Views => NodeKind::DbView,
            DbGroupKind::Functions => NodeKind::DbFunction,
            DbGroupKind::Procedures => NodeKind::DbProcedure,
            DbGroupKind::Triggers => NodeKind::DbTrigger,
            DbGroupKind::Queries => NodeKind::DbQuery,
        }
    }
}
