//! # modgraph-compose
//!
//! Static phases of the module graph: everything that happens before any
//! module executes.
//!
//! Handles:
//! - **Parser**: Lexing, AST construction, and validation of declarations.
//! - **Expander**: `for_each`/`count` expansion into keyed instances.
//! - **Registry**: The read-only arena of expanded instances.
//! - **Resolver**: Attribute reference discovery and dependency edges.
//! - **Graph**: Dependency graph and cycle-detecting topological order.
//! - **Eval**: Expression evaluation over recorded instance outputs.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod eval;
pub mod expander;
pub mod graph;
pub mod parser;
pub mod registry;
pub mod resolver;

pub use expander::{expand, expand_with_variables};
pub use graph::DependencyGraph;
pub use resolver::resolve;
