//! Strata core library: graph store, upsert, cross-reference resolution
//! and incremental sync.
//!
//! The main entry point is [`sync::SyncEngine`], which keeps a
//! [`store::GraphStore`] consistent with one or more source trees: it runs
//! an initial scan, then applies coalesced filesystem events and re-runs the
//! [`resolve::Resolver`] after every batch.

pub mod config;
pub mod error;
pub mod progress;
pub mod resolve;
pub mod store;
pub mod sync;
pub mod types;
pub mod upsert;
pub mod verify;
pub mod watch;

pub use config::StrataConfig;
pub use error::{Result, StrataError};
pub use store::{GraphStore, SqliteStore};
pub use sync::{SyncEngine, SyncReport};
