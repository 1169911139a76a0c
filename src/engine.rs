//! Request engine
//!
//! `GraphOrm` ties the layers together for one request:
//!
//! 1. compile the root statement (sync, nothing awaited while building),
//! 2. fetch the root rows,
//! 3. repeatedly compile and fetch the follow-up statements of every
//!    many-relation whose parents are now known; all follow-ups of one
//!    round are issued concurrently, a child round only starts once its
//!    parent rows are in the arena,
//! 4. finalize every root node (children, JSON parsing, transforms).
//!
//! The engine holds no per-request state. Dropping the returned future
//! abandons every in-flight statement of that request.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::try_join_all;
use log::{debug, info};
use serde_json::Value;

use crate::context::Context;
use crate::errors::GraphOrmError;
use crate::query_planner::{CompiledQuery, PlannerSettings, QueryPlanner, RequestedNode};
use crate::result_assembler::{PendingGroup, ResultArena};
use crate::sql_builder::Statement;
use crate::storage::Storage;
use crate::type_catalog::{FilterFn, TypeRegistry};

/// Wall-clock breakdown of one request.
#[derive(Debug, Clone, Default)]
pub struct QueryTimings {
    pub total_time: f64,
    pub planning_time: f64,
    pub execution_time: f64,
    pub assembly_time: f64,
    pub statements: usize,
    pub rows: usize,
    pub root_type: String,
}

impl QueryTimings {
    pub fn new(root_type: &str) -> Self {
        Self {
            root_type: root_type.to_string(),
            ..Default::default()
        }
    }

    pub fn log_performance(&self) {
        info!(
            "Query performance - Total: {:.3}ms, Planning: {:.3}ms, Exec: {:.3}ms, Assembly: {:.3}ms, Type: {}, Statements: {}, Rows: {}",
            self.total_time * 1000.0,
            self.planning_time * 1000.0,
            self.execution_time * 1000.0,
            self.assembly_time * 1000.0,
            self.root_type,
            self.statements,
            self.rows
        );
    }
}

#[derive(Clone)]
pub struct GraphOrm {
    registry: Arc<TypeRegistry>,
    storage: Arc<dyn Storage>,
    settings: PlannerSettings,
}

impl GraphOrm {
    pub fn new(registry: Arc<TypeRegistry>, storage: Arc<dyn Storage>) -> Self {
        let settings = PlannerSettings {
            dialect: storage.dialect(),
            ..PlannerSettings::default()
        };
        Self {
            registry,
            storage,
            settings,
        }
    }

    pub fn with_settings(mut self, settings: PlannerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// A request context bound to this engine's storage.
    pub fn context(&self) -> Context {
        Context::new(self.storage.clone())
    }

    fn planner(&self) -> QueryPlanner<'_> {
        QueryPlanner::new(&self.registry, self.settings)
    }

    /// Compile the root statement of a request without executing it.
    pub fn compile_sql(&self, ctx: &Context, request: &RequestedNode) -> Result<Statement, GraphOrmError> {
        Ok(self.planner().compile_root(ctx, request, None)?.statement)
    }

    pub async fn query(&self, ctx: &Context, request: &RequestedNode) -> Result<Vec<Value>, GraphOrmError> {
        self.query_with(ctx, request, None).await
    }

    /// Run a request with an extra caller filter on the root type, applied
    /// after the type's own additional filter.
    pub async fn query_with(
        &self,
        ctx: &Context,
        request: &RequestedNode,
        filter: Option<FilterFn>,
    ) -> Result<Vec<Value>, GraphOrmError> {
        let started = Instant::now();
        let mut timings = QueryTimings::new(&request.type_name);
        let planner = self.planner();

        let plan_start = Instant::now();
        let root = planner.compile_root(ctx, request, filter.as_ref())?;
        timings.planning_time += plan_start.elapsed().as_secs_f64();

        let exec_start = Instant::now();
        let rows = self.storage.fetch_all(&root.statement).await?;
        timings.execution_time += exec_start.elapsed().as_secs_f64();
        timings.statements += 1;
        timings.rows += rows.len();

        let mut arena = ResultArena::new();
        let roots = arena.add_rows(&root.plan, rows)?;

        let mut round = 1;
        loop {
            let groups = arena.take_pending();
            if groups.is_empty() {
                break;
            }
            round += 1;

            let plan_start = Instant::now();
            let mut compiled: Vec<(PendingGroup, CompiledQuery)> = Vec::new();
            for group in groups {
                let keys = arena.parent_keys(&group);
                if keys.is_empty() {
                    arena.attach_empty(&group);
                    continue;
                }
                let query = planner.compile_many_relation(ctx, group.relation(), &keys)?;
                compiled.push((group, query));
            }
            timings.planning_time += plan_start.elapsed().as_secs_f64();

            if compiled.is_empty() {
                continue;
            }
            debug!("Round {}: issuing {} follow-up statements", round, compiled.len());

            let exec_start = Instant::now();
            let results = try_join_all(
                compiled
                    .iter()
                    .map(|(_, query)| self.storage.fetch_all(&query.statement)),
            )
            .await?;
            timings.execution_time += exec_start.elapsed().as_secs_f64();
            timings.statements += compiled.len();

            for ((group, query), rows) in compiled.iter().zip(results) {
                timings.rows += rows.len();
                arena.attach_many(group, &query.plan, &query.partition_labels, query.page_size, rows)?;
            }
        }

        let assembly_start = Instant::now();
        let finals = try_join_all(roots.iter().map(|id| arena.finalize(ctx, *id))).await?;
        timings.assembly_time = assembly_start.elapsed().as_secs_f64();
        timings.total_time = started.elapsed().as_secs_f64();
        timings.log_performance();

        Ok(finals
            .into_iter()
            .map(|node| Value::Object(node.output))
            .collect())
    }
}

impl std::fmt::Debug for GraphOrm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphOrm")
            .field("types", &self.registry.type_names())
            .field("settings", &self.settings)
            .finish()
    }
}
