use tracing::info;

use crate::build::{self, StoreAliases};
use crate::config::Config;
use crate::database::Database;
use crate::error::Result;
use crate::node::ExecContext;
use crate::parser::{self, ParseError};
use crate::postprocess::Callbacks;
use crate::query::Query;
use crate::store::ArtifactStore;
use crate::term::Term;

/// Entry point: owns the artifact store, the database handle, the callback
/// registry and the configuration, and turns term strings into [`Query`]
/// handles.
///
/// Callbacks and configuration are fixed once the resolver is built.
pub struct Resolver {
    store: Box<dyn ArtifactStore>,
    db: Box<dyn Database>,
    callbacks: Callbacks,
    config: Config,
}

impl Resolver {
    pub fn new(store: impl ArtifactStore + 'static, db: impl Database + 'static) -> Self {
        Resolver {
            store: Box::new(store),
            db: Box::new(db),
            callbacks: Callbacks::new(),
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &dyn ArtifactStore {
        self.store.as_ref()
    }

    pub fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }

    /// Parse a term, substituting the aliases leaves declare.
    pub fn parse(&self, raw: &str) -> std::result::Result<Term, ParseError> {
        parser::parse_with(raw, &StoreAliases { store: self.store() })
    }

    /// Parse and build a term.
    pub fn resolve(&self, raw: &str) -> Result<Query<'_>> {
        let term = self.parse(raw)?;
        let tree = build::build(&term, self.store())?;
        info!(term = %term, nodes = tree.len(), "resolved term");
        Ok(Query::new(self, term, tree))
    }

    pub(crate) fn context(&self) -> ExecContext<'_> {
        ExecContext {
            db: self.db.as_ref(),
            store: self.store.as_ref(),
            callbacks: &self.callbacks,
            config: &self.config,
        }
    }
}
