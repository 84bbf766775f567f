//! Application context
//!
//! Opens the store once and wires the engine, confirmation workflow, trust
//! registry, and ingestion pipeline over it. Missing config file means
//! defaults (no operators, so mutating commands are rejected until one is
//! configured).

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tally_core::{Actor, TallyConfig};
use tally_ingest::{IngestPipeline, LogNotifier};
use tally_ledger::{ConfirmationWorkflow, LedgerEngine};
use tally_store::Store;
use tally_trust::TrustRegistry;

pub struct AppContext {
    pub config: TallyConfig,
    pub store: Store,
    pub engine: LedgerEngine,
    pub workflow: ConfirmationWorkflow,
    pub trust: TrustRegistry,
    pub pipeline: IngestPipeline,
}

impl AppContext {
    pub fn new(config_path: &Path, db_path: &Path) -> Result<Self, anyhow::Error> {
        let config = if config_path.exists() {
            TallyConfig::from_file(config_path)
                .with_context(|| format!("loading config from {}", config_path.display()))?
        } else {
            TallyConfig::default()
        };
        let store = Store::open(db_path)
            .with_context(|| format!("opening store at {}", db_path.display()))?;

        let engine = LedgerEngine::new(store.clone(), &config);
        let workflow = ConfirmationWorkflow::new(store.clone());
        let trust = TrustRegistry::new(store.clone(), config.auto_promote_window());
        let pipeline = IngestPipeline::new(store.clone(), &config, Arc::new(LogNotifier));

        Ok(Self {
            config,
            store,
            engine,
            workflow,
            trust,
            pipeline,
        })
    }

    /// Enforce the operator allow-list before a mutating command.
    pub fn require_operator(&self, id: i64) -> Result<Actor, anyhow::Error> {
        if self.config.is_operator(id) {
            Ok(Actor::Operator(id))
        } else {
            anyhow::bail!("User {id} is not on the operator allow-list")
        }
    }
}
