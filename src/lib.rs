//! # termql
//!
//! Compose independently defined SQL queries with a small term language:
//!
//! ```text
//! user(orders,addresses)    nest each user's orders and addresses
//! active|inactive           union of two queries over one entity
//! user+profile              left-join profile fields onto users
//! vip:user                  users also returned by vip
//! ```
//!
//! A [`Resolver`] owns the artifact store (leaf interfaces, compiled SQL,
//! JSON definitions) and the database handle. `resolve` parses a term and
//! builds its node tree; the returned [`Query`] executes it.

pub mod build;
pub mod config;
pub mod database;
pub mod error;
pub mod fragments;
pub mod interface;
pub mod keys;
pub mod node;
pub mod parser;
pub mod postprocess;
pub mod query;
pub mod render;
pub mod resolver;
pub mod rows;
pub mod store;
pub mod term;
pub mod value;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use database::{Bound, Cursor, Database, DatabaseError};
pub use error::{QueryError, Result};
pub use interface::{Cardinality, Direction, Interface, OrderBy};
pub use keys::KeyFields;
pub use parser::{AliasLookup, ParseError, parse, parse_with};
pub use postprocess::Callbacks;
pub use query::{Outcome, Query};
pub use resolver::Resolver;
pub use store::{ArtifactStore, FileStore, MemoryStore, StoreError};
pub use term::Term;
pub use value::{Params, Row, Shaped, Value};
