//! # weft
//!
//! A concept-oriented backend engine. State and behavior live in small,
//! isolated **concepts** (user accounts, sessions, a document library, a
//! progress tracker, a dictionary); cross-concept behavior is expressed
//! entirely as declarative **rules** that watch completed operations and
//! dispatch new ones, run to fixpoint per incoming request.
//!
//! ## Architecture
//!
//! - **Records and frames** (`record`, `frame`): interned operation
//!   records and the variable-binding environments rules run under
//! - **Patterns and rules** (`pattern`, `rule`): unification against
//!   records, multi-clause joins, query/guard/filter refinement
//! - **Engine** (`engine`): the cascade executor — admits records,
//!   evaluates every rule against each, dispatches to fixpoint
//! - **Concepts** (`concept`, `concepts`): the action/query trait and
//!   the built-in concept suite
//! - **Rules** (`syncs`): the route wiring, one rule family per route
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use weft::concept::ConceptRegistry;
//! use weft::concepts::{Dictionary, FileTracker, Library, PasswordAuthentication, Sessioning};
//! use weft::engine::{Engine, DEFAULT_MAX_DEPTH};
//! use weft::estimate::{HeuristicCompletion, IndexEstimator};
//! use weft::record::FieldMap;
//! use weft::requesting::Requesting;
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let estimator = Arc::new(IndexEstimator::new(Arc::new(HeuristicCompletion)));
//!     let registry = ConceptRegistry::new();
//!     registry.register(Arc::new(Requesting::new()))?;
//!     registry.register(Arc::new(PasswordAuthentication::new()))?;
//!     registry.register(Arc::new(Sessioning::new()))?;
//!     registry.register(Arc::new(Library::new()))?;
//!     registry.register(Arc::new(FileTracker::new(estimator)))?;
//!     registry.register(Arc::new(Dictionary::new()))?;
//!
//!     let engine = Engine::new(registry, weft::syncs::all(), DEFAULT_MAX_DEPTH)?;
//!     let cascade = engine.handle_request("/Library/create", FieldMap::new()).await?;
//!     println!("{:?}", cascade.response());
//!     Ok(())
//! }
//! ```

pub mod concept;
pub mod concepts;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod frame;
pub mod pattern;
pub mod record;
pub mod requesting;
pub mod rule;
#[cfg(feature = "server")]
pub mod server;
pub mod symbol;
pub mod syncs;
