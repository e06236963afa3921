//! Database handle
//!
//! Bundles a storage engine with the kind registry, the query pipeline and
//! the change-log settings. Every write goes through a `UnitOfWork` begun
//! here; every read goes through the pipeline.

use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::audit::ChangeLog;
use crate::config::{AuditPaths, AuditSettings, Settings};
use crate::error::{AuditError, AuditResult};
use crate::models::{ActorContext, EntityId, Record, Row, ID_COLUMN};
use crate::query::{ExecutionOptions, Query, QueryPipeline, QueryRow};
use crate::registry::Registry;
use crate::storage::{StorageEngine, Store};
use crate::uow::UnitOfWork;

/// Entry point for reads and units of work
pub struct Database {
    engine: Box<dyn StorageEngine>,
    registry: Registry,
    pipeline: QueryPipeline,
    audit: AuditSettings,
}

impl Database {
    pub fn new(engine: Box<dyn StorageEngine>, registry: Registry, audit: AuditSettings) -> Self {
        Self {
            engine,
            registry,
            pipeline: QueryPipeline::new(),
            audit,
        }
    }

    /// Volatile database with default settings
    pub fn in_memory(registry: Registry) -> Self {
        Self::new(
            Box::new(Store::in_memory()),
            registry,
            AuditSettings::default(),
        )
    }

    /// Open the file-backed store under `paths`, registering the dynamic
    /// kinds declared in `settings`
    pub fn open(paths: &AuditPaths, settings: &Settings) -> AuditResult<Self> {
        paths.ensure_directories()?;
        let store = Store::open(&paths.data_dir(), settings.store_options())?;
        Ok(Self::new(
            Box::new(store),
            Registry::from_settings(settings),
            settings.audit.clone(),
        ))
    }

    /// Replace the query pipeline; the soft-delete filter stays in it
    pub fn with_pipeline(mut self, pipeline: QueryPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn audit_settings(&self) -> &AuditSettings {
        &self.audit
    }

    /// Start a unit of work attributed to `actor`
    pub fn begin(&self, actor: impl Into<ActorContext>) -> AuditResult<UnitOfWork<'_>> {
        let tx = self.engine.begin()?;
        Ok(UnitOfWork::new(
            tx,
            actor.into(),
            &self.registry,
            &self.pipeline,
            &self.audit,
        ))
    }

    /// Run `f` inside a unit of work
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err` or
    /// panics (the panic is resumed afterwards).
    pub fn with_unit_of_work<T, F>(&self, actor: impl Into<ActorContext>, f: F) -> AuditResult<T>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> AuditResult<T>,
    {
        let mut uow = self.begin(actor)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&mut uow)));

        match outcome {
            Ok(Ok(value)) => {
                uow.commit()?;
                Ok(value)
            }
            Ok(Err(e)) => {
                debug!(error = %e, "unit of work body failed");
                uow.rollback();
                Err(e)
            }
            Err(payload) => {
                uow.rollback();
                panic::resume_unwind(payload)
            }
        }
    }

    /// Run a query outside any unit of work
    pub fn query(&self, query: Query) -> AuditResult<Vec<QueryRow>> {
        let tx = self.engine.begin()?;
        let result = self.pipeline.execute(tx.as_ref(), query);
        tx.rollback();
        result
    }

    /// Root rows of a query, without joins
    pub fn rows(&self, query: Query) -> AuditResult<Vec<Row>> {
        Ok(self.query(query)?.into_iter().map(|r| r.row).collect())
    }

    /// Query a typed kind
    pub fn query_as<T: Record>(&self, query: Query) -> AuditResult<Vec<T>> {
        if query.kind() != T::KIND {
            return Err(AuditError::Validation(format!(
                "query on '{}' cannot produce {} records",
                query.kind(),
                T::KIND
            )));
        }

        self.rows(query)?
            .into_iter()
            .map(|row| {
                serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
                    AuditError::Storage(format!("Failed to load {} row: {}", T::KIND, e))
                })
            })
            .collect()
    }

    /// Fetch one typed record by id
    pub fn get<T: Record>(&self, id: EntityId, options: ExecutionOptions) -> AuditResult<Option<T>> {
        let query = Query::new(T::KIND).eq(ID_COLUMN, id).with_options(options);
        Ok(self.query_as::<T>(query)?.into_iter().next())
    }

    /// Fetch one row of any kind by id
    pub fn get_row(
        &self,
        kind: &str,
        id: EntityId,
        options: ExecutionOptions,
    ) -> AuditResult<Option<Row>> {
        let query = Query::new(kind).eq(ID_COLUMN, id).with_options(options);
        Ok(self.rows(query)?.into_iter().next())
    }

    /// Rows reachable from a stored entity along one of its relations
    pub fn related(
        &self,
        kind: &str,
        id: EntityId,
        relation: &str,
        options: ExecutionOptions,
    ) -> AuditResult<Vec<Row>> {
        let mut uow = self.begin(ActorContext::system())?;
        let rows = uow.related(kind, id, relation, options);
        uow.rollback();
        rows
    }

    /// Read access to the committed change log
    pub fn change_log(&self) -> ChangeLog<'_> {
        ChangeLog::new(
            self.engine.as_ref(),
            &self.pipeline,
            &self.audit.change_log_kind,
        )
    }

    /// Fold the journal into a snapshot
    pub fn compact(&self) -> AuditResult<()> {
        self.engine.compact()
    }
}
