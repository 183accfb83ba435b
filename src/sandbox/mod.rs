//! Sandbox
//!
//! Runs compiled artifacts against in-memory tables so their behavior can
//! be checked without a database. Routines execute the way the generated
//! PL/pgSQL does: action bodies run in a subtransaction that turns raised
//! errors and constraint violations into an error result, triggers fire
//! before each row write, and every public call is one atomic statement.
//!
//! ## Structure
//!
//! - `schema` - tables, checks, keys and triggers collected from artifacts
//! - `value` - SQL comparison, three-valued logic and range semantics
//! - `store` - row writes with defaults, triggers and constraint checks
//! - `exec` - routine bodies and expression evaluation
//!
//! The clock is logical: every statement sees one fixed `now()` and the
//! clock moves one second after it. Generated UUIDs count up from one.

mod exec;
mod schema;
mod store;
mod value;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::application::CompileOutput;
use crate::domain::actions::RoutineBody;
use crate::domain::entities::Artifact;
use crate::domain::value_objects::QualifiedName;

use schema::Schema;

/// One table row, keyed by column name.
pub type Row = Map<String, Value>;

/// 2024-01-01T00:00:00Z
const EPOCH: i64 = 1_704_067_200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// `RAISE EXCEPTION` from a guard or generated check.
    #[error("raised '{0}'")]
    Raised(String),

    /// A named guard failed; `code` is what the action reports.
    #[error("guard '{guard}' raised '{code}'")]
    GuardFailed { guard: String, code: String },

    /// Integrity constraint violation; the name is empty for NOT NULL.
    #[error("violates constraint '{constraint}'")]
    Violation { constraint: String },

    #[error("invalid data: {0}")]
    Data(String),

    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("unknown routine '{0}'")]
    UnknownRoutine(String),

    #[error("no row with id '{id}' in {entity}")]
    RowNotFound { entity: String, id: String },

    #[error("argument error: {0}")]
    Argument(String),

    #[error("cannot evaluate: {0}")]
    Unsupported(String),
}

impl SandboxError {
    /// Message of the error result an action returns for this failure, if
    /// an action's exception handler catches it.
    pub(crate) fn caught_message(&self) -> Option<String> {
        match self {
            SandboxError::Raised(message) => Some(message.clone()),
            SandboxError::GuardFailed { code, .. } => Some(code.clone()),
            SandboxError::Violation { constraint } if constraint.is_empty() => {
                Some("constraint_violation".to_string())
            }
            SandboxError::Violation { constraint } => Some(constraint.clone()),
            _ => None,
        }
    }

    pub(crate) fn failed_guard(&self) -> Option<&str> {
        match self {
            SandboxError::GuardFailed { guard, .. } => Some(guard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// The shared mutation result every action routine returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationResult {
    pub status: Status,
    pub message: Option<String>,
    pub id: Option<String>,
    pub data: Option<Value>,
}

impl MutationResult {
    pub(crate) fn success(message: Option<String>, id: Option<String>, data: Option<Value>) -> Self {
        Self {
            status: Status::Success,
            message,
            id,
            data,
        }
    }

    pub(crate) fn error(message: String, id: Option<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message),
            id,
            data: None,
        }
    }

    /// Error results of a failed named guard carry `{"guard": name}`.
    pub(crate) fn with_guard(mut self, guard: Option<&str>) -> Self {
        if let Some(guard) = guard {
            self.data = Some(serde_json::json!({ "guard": guard }));
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// The guard that failed, when the error came from a named guard.
    pub fn guard(&self) -> Option<&str> {
        match self.status {
            Status::Error => self.field("guard").and_then(Value::as_str),
            Status::Success => None,
        }
    }

    /// The message of an error result.
    pub fn error_code(&self) -> Option<&str> {
        match self.status {
            Status::Error => self.message.as_deref(),
            Status::Success => None,
        }
    }

    /// Column of the returned row snapshot.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(name))
    }
}

/// What a routine hands back, by body kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
    Result(MutationResult),
    /// Resolved template values
    Document(Row),
    /// External ids, ordered
    Ids(Vec<String>),
    Scalar(Value),
}

/// A `pg_notify` sent by a committed statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub channel: String,
    pub payload: Row,
}

/// Mutable state; a snapshot of it is a savepoint.
#[derive(Debug, Clone, Default)]
struct Data {
    rows: BTreeMap<QualifiedName, BTreeMap<i64, Row>>,
    next_pk: BTreeMap<QualifiedName, i64>,
    views: BTreeMap<QualifiedName, Vec<Row>>,
    notifications: Vec<Notification>,
    uuids: u64,
}

impl Data {
    fn row(&self, table: &QualifiedName, pk: i64) -> Option<&Row> {
        self.rows.get(table).and_then(|rows| rows.get(&pk))
    }

    fn table(&self, table: &QualifiedName) -> impl Iterator<Item = (&i64, &Row)> {
        self.rows.get(table).into_iter().flatten()
    }
}

/// In-memory database loaded with one compile run's artifacts.
pub struct Sandbox {
    schema: Arc<Schema>,
    data: Data,
    clock: DateTime<Utc>,
}

impl Sandbox {
    pub fn new(artifacts: &[Artifact]) -> Self {
        let schema = Arc::new(Schema::build(artifacts));
        let mut sandbox = Self {
            schema: Arc::clone(&schema),
            data: Data::default(),
            clock: DateTime::from_timestamp(EPOCH, 0).unwrap_or_default(),
        };
        for view in schema.views.keys() {
            sandbox.refresh(view);
        }
        sandbox
    }

    pub fn from_output(output: &CompileOutput) -> Self {
        Self::new(&output.artifacts)
    }

    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = now;
        self
    }

    pub fn advance(&mut self, by: Duration) {
        self.clock += by;
    }

    /// `now()` of the next statement, as stored in timestamp columns.
    pub fn now(&self) -> String {
        self.clock.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub(crate) fn today(&self) -> String {
        self.clock.format("%Y-%m-%d").to_string()
    }

    /// Client `INSERT`; returns the stored row.
    pub fn insert(&mut self, entity: &str, values: Value) -> Result<Row, SandboxError> {
        let table = self.schema.table_of(entity)?.name.clone();
        let values = object(values)?;
        let pk = self.statement(|sb| {
            let pk = sb.insert_row(&table, values)?;
            sb.after_statement(&table);
            Ok(pk)
        })?;
        Ok(self.data.row(&table, pk).cloned().unwrap_or_default())
    }

    /// Client `UPDATE ... WHERE id = ...`; returns the stored row.
    pub fn update(&mut self, entity: &str, id: &str, values: Value) -> Result<Row, SandboxError> {
        let table = self.schema.table_of(entity)?.name.clone();
        let pk = self.pk_of(entity, id).ok_or_else(|| SandboxError::RowNotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })?;
        let values = object(values)?;
        self.statement(|sb| {
            sb.update_row(&table, pk, values)?;
            sb.after_statement(&table);
            Ok(())
        })?;
        Ok(self.data.row(&table, pk).cloned().unwrap_or_default())
    }

    /// Client `DELETE ... WHERE id = ...`, bypassing soft delete.
    pub fn delete(&mut self, entity: &str, id: &str) -> Result<(), SandboxError> {
        let table = self.schema.table_of(entity)?.name.clone();
        let pk = self.pk_of(entity, id).ok_or_else(|| SandboxError::RowNotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        })?;
        self.statement(|sb| {
            sb.delete_row(&table, pk)?;
            sb.after_statement(&table);
            Ok(())
        })
    }

    pub fn row(&self, entity: &str, id: &str) -> Option<&Row> {
        let table = &self.schema.table_of(entity).ok()?.name;
        self.data
            .table(table)
            .map(|(_, row)| row)
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id))
    }

    /// Every row of the entity's table in key order, deleted ones included.
    pub fn rows(&self, entity: &str) -> Vec<&Row> {
        match self.schema.table_of(entity) {
            Ok(def) => self.data.table(&def.name).map(|(_, row)| row).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn pk_of(&self, entity: &str, id: &str) -> Option<i64> {
        let def = self.schema.table_of(entity).ok()?;
        self.row(entity, id)
            .and_then(|row| row.get(&def.pk_column))
            .and_then(Value::as_i64)
    }

    /// Rows of a materialized view, by bare or qualified name.
    pub fn view_rows(&self, name: &str) -> Option<&[Row]> {
        self.data
            .views
            .iter()
            .find(|(view, _)| view.name == name || view.to_string() == name)
            .map(|(_, rows)| rows.as_slice())
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.data.notifications
    }

    /// Call a routine of `entity` by name.
    ///
    /// `id` is the external id of the row the routine targets; `args` is
    /// an object of parameter values without the `p_` prefix.
    pub fn call(
        &mut self,
        entity: &str,
        routine: &str,
        id: Option<&str>,
        args: Value,
    ) -> Result<Returned, SandboxError> {
        let name = self.schema.routine_of(entity, routine)?.qualified_name();
        let args = object(args)?;
        let id = id.map(|id| Value::String(id.to_string()));
        self.statement(|sb| sb.invoke_routine(&name, id, args))
    }

    /// Run an action and return its mutation result.
    pub fn invoke(
        &mut self,
        entity: &str,
        action: &str,
        id: Option<&str>,
        args: Value,
    ) -> Result<MutationResult, SandboxError> {
        match self.call(entity, action, id, args)? {
            Returned::Result(result) => Ok(result),
            other => Err(SandboxError::Unsupported(format!(
                "'{}' does not return a mutation result: {:?}",
                action, other
            ))),
        }
    }

    /// Inherited values of a row through its template chain.
    pub fn resolve_template(&mut self, entity: &str, id: &str) -> Result<Row, SandboxError> {
        let routine = self.generated(entity, |body| matches!(body, RoutineBody::ResolveTemplate(_)))?;
        match self.call(entity, &routine, Some(id), Value::Object(Map::new()))? {
            Returned::Document(doc) => Ok(doc),
            other => Err(SandboxError::Unsupported(format!("unexpected {:?}", other))),
        }
    }

    /// External ids of everything the row transitively depends on.
    pub fn dependencies(&mut self, entity: &str, id: &str) -> Result<Vec<String>, SandboxError> {
        let routine =
            self.generated(entity, |body| matches!(body, RoutineBody::DependencyClosure(_)))?;
        match self.call(entity, &routine, Some(id), Value::Object(Map::new()))? {
            Returned::Ids(ids) => Ok(ids),
            other => Err(SandboxError::Unsupported(format!("unexpected {:?}", other))),
        }
    }

    /// Record a version through the entity's upsert routine.
    pub fn upsert_version(&mut self, entity: &str, args: Value) -> Result<MutationResult, SandboxError> {
        let routine = self.generated(entity, |body| matches!(body, RoutineBody::UpsertVersion(_)))?;
        self.invoke(entity, &routine, None, args)
    }

    fn generated(&self, entity: &str, wanted: impl Fn(&RoutineBody) -> bool) -> Result<String, SandboxError> {
        self.schema
            .routines
            .values()
            .find(|r| r.entity == entity && wanted(&r.body))
            .map(|r| r.name.clone())
            .ok_or_else(|| SandboxError::UnknownRoutine(format!("{} has no such routine", entity)))
    }

    /// Run `f` as one statement: all of it or none of it.
    fn statement<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SandboxError>,
    ) -> Result<T, SandboxError> {
        let savepoint = self.data.clone();
        let result = f(self);
        if let Err(error) = &result {
            tracing::debug!(%error, "statement rolled back");
            self.data = savepoint;
        }
        self.clock += Duration::seconds(1);
        result
    }

    fn next_uuid(&mut self) -> String {
        self.data.uuids += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.data.uuids)
    }
}

fn object(value: Value) -> Result<Row, SandboxError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(SandboxError::Argument(format!("expected an object, got {}", other))),
    }
}
