//! Routine execution.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::schema::TableDef;
use super::value::{self, column, same, sql_eq, truth, RangeValue};
use super::{MutationResult, Notification, Returned, Row, Sandbox, SandboxError};
use crate::domain::actions::{
    BinaryOp, ChainWalk, DependencyLink, DependencyWalk, Expr, Func, LookupDirection, Op,
    RangeSpec, Routine, RoutineBody, RoutineKind, RowFilter, Scope, TableRef, UnaryOp,
    VersionSpec, CYCLIC_DEPENDENCY,
    CYCLIC_TEMPLATE, DEPENDENCY_DEPTH_EXCEEDED, NOT_FOUND, TEMPLATE_DEPTH_EXCEEDED,
};
use crate::domain::entities::{DELETED_AT, EXTERNAL_ID};
use crate::domain::patterns::recursive_dependency;
use crate::domain::patterns::scd_type2::{classify, VersionChange};
use crate::domain::patterns::template_inheritance::merge_chain;
use crate::domain::services::{CyclePolicy, DepthFirst, TraversalError};
use crate::domain::value_objects::QualifiedName;

/// Locals of one routine invocation.
struct Frame<'r> {
    routine: &'r Routine,
    params: Map<String, Value>,
    row: Option<Row>,
    pk: Option<i64>,
    /// Loop variables of enclosing `ForEach` ops
    vars: BTreeMap<String, Row>,
}

impl Sandbox {
    pub(super) fn invoke_routine(
        &mut self,
        name: &QualifiedName,
        id: Option<Value>,
        args: Map<String, Value>,
    ) -> Result<Returned, SandboxError> {
        let schema = Arc::clone(&self.schema);
        let routine = schema
            .routines
            .get(name)
            .ok_or_else(|| SandboxError::UnknownRoutine(name.to_string()))?;
        if routine.kind == RoutineKind::Trigger {
            return Err(SandboxError::Unsupported(format!(
                "{} can only be called as a trigger",
                name
            )));
        }
        let params = bind(routine, args)?;
        let id = match (routine.targets_row, id) {
            (true, Some(id)) => Some(id),
            (true, None) => return Err(SandboxError::Argument(format!("{} needs p_id", name))),
            (false, _) => None,
        };
        tracing::trace!(routine = %name, "invoke");

        match &routine.body {
            RoutineBody::Steps(ops) => self.run_action(routine, ops, id, params).map(Returned::Result),
            RoutineBody::ResolveTemplate(walk) => self.resolve(&routine.table, walk, id).map(Returned::Document),
            RoutineBody::DependencyClosure(walk) => self.closure(&routine.table, walk, id).map(Returned::Ids),
            RoutineBody::UpsertVersion(spec) => self.upsert(&routine.table, spec, &params).map(Returned::Result),
            RoutineBody::RefreshView(view) => {
                self.refresh(view);
                Ok(Returned::Result(MutationResult::success(None, None, None)))
            }
            RoutineBody::IdentityLookup(direction) => {
                let argument = routine
                    .params
                    .first()
                    .and_then(|p| params.get(&p.name))
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(Returned::Scalar(self.lookup(&routine.table, *direction, &argument)))
            }
            RoutineBody::ValidateTemplate(_)
            | RoutineBody::ValidateDependencies(_)
            | RoutineBody::FlagOverlap(_) => Err(SandboxError::Unsupported(format!(
                "{} can only be called as a trigger",
                name
            ))),
        }
    }

    /// Steps body: load the row, run the ops in a subtransaction and turn
    /// raised errors and violations into an error result.
    fn run_action(
        &mut self,
        routine: &Routine,
        ops: &[Op],
        id: Option<Value>,
        params: Map<String, Value>,
    ) -> Result<MutationResult, SandboxError> {
        let id_text = id.as_ref().and_then(Value::as_str).map(str::to_string);
        let mut frame = Frame {
            routine,
            params,
            row: None,
            pk: None,
            vars: BTreeMap::new(),
        };
        if routine.targets_row {
            let found = id.as_ref().and_then(|id| self.find_by_id(&routine.table, id, true));
            let Some((pk, row)) = found else {
                return Ok(MutationResult::error(NOT_FOUND.to_string(), id_text));
            };
            frame.pk = Some(pk);
            frame.row = Some(row);
        }

        let savepoint = self.data.clone();
        match self.run_ops(&mut frame, ops) {
            Ok(()) => {
                let data = frame.row.map(Value::Object);
                Ok(MutationResult::success(None, id_text, data))
            }
            Err(error) => {
                self.data = savepoint;
                match error.caught_message() {
                    Some(message) => {
                        let guard = error.failed_guard();
                        tracing::debug!(routine = %routine.qualified_name(), %message, ?guard, "action failed");
                        Ok(MutationResult::error(message, id_text).with_guard(guard))
                    }
                    None => Err(error),
                }
            }
        }
    }

    fn run_ops(&mut self, frame: &mut Frame<'_>, ops: &[Op]) -> Result<(), SandboxError> {
        for op in ops {
            self.run_op(frame, op)?;
        }
        Ok(())
    }

    fn run_op(&mut self, frame: &mut Frame<'_>, op: &Op) -> Result<(), SandboxError> {
        match op {
            Op::Guard {
                guard,
                condition,
                error,
            } => {
                if !self.holds(frame, condition)? {
                    return Err(match guard {
                        Some(guard) => SandboxError::GuardFailed {
                            guard: guard.clone(),
                            code: error.clone(),
                        },
                        None => SandboxError::Raised(error.clone()),
                    });
                }
            }
            Op::Update {
                table,
                assignments,
                filter,
            } => {
                let targets: Vec<i64> = match filter {
                    RowFilter::Current => frame.pk.into_iter().collect(),
                    RowFilter::Where(condition) => self.select(frame, table, condition)?,
                };
                for pk in targets {
                    let Some(old) = self.data.row(&table.table, pk).cloned() else {
                        continue;
                    };
                    let mut changes = Row::new();
                    for (name, expr) in assignments {
                        changes.insert(name.clone(), self.eval(frame, expr, Some(&old))?);
                    }
                    self.update_row(&table.table, pk, changes)?;
                }
                self.after_statement(&table.table);
                if matches!(filter, RowFilter::Current) {
                    self.reload(frame);
                }
            }
            Op::Insert { table, values } => {
                let mut row = Row::new();
                for (name, expr) in values {
                    row.insert(name.clone(), self.eval(frame, expr, None)?);
                }
                self.insert_row(&table.table, row)?;
                self.after_statement(&table.table);
            }
            Op::Delete { table, filter } => {
                let targets: Vec<i64> = match filter {
                    RowFilter::Current => frame
                        .pk
                        .filter(|pk| !table.soft_delete || self.is_live(&table.table, *pk))
                        .into_iter()
                        .collect(),
                    RowFilter::Where(condition) => self.select(frame, table, condition)?,
                };
                for pk in targets {
                    if table.soft_delete {
                        let mut changes = Row::new();
                        changes.insert(DELETED_AT.to_string(), Value::String(self.now()));
                        self.update_row(&table.table, pk, changes)?;
                    } else {
                        self.delete_row(&table.table, pk)?;
                    }
                }
                self.after_statement(&table.table);
            }
            Op::Call {
                routine,
                row,
                args,
                mutation,
                ..
            } => {
                let id = row.as_ref().map(|e| self.eval(frame, e, None)).transpose()?;
                let mut bound = Map::new();
                for (name, expr) in args {
                    bound.insert(name.clone(), self.eval(frame, expr, None)?);
                }
                let returned = self.invoke_routine(routine, id, bound)?;
                if let (true, Returned::Result(result)) = (*mutation, &returned) {
                    if !result.is_success() {
                        let code = result.message.clone().unwrap_or_default();
                        return Err(match result.guard() {
                            Some(guard) => SandboxError::GuardFailed {
                                guard: guard.to_string(),
                                code,
                            },
                            None => SandboxError::Raised(code),
                        });
                    }
                }
                if frame.routine.targets_row {
                    self.reload(frame);
                }
            }
            Op::Notify { event, payload } => {
                let mut body = Row::new();
                for (name, expr) in payload {
                    body.insert(name.clone(), self.eval(frame, expr, None)?);
                }
                self.data.notifications.push(Notification {
                    channel: event.clone(),
                    payload: body,
                });
            }
            Op::ForEach {
                var,
                source,
                link_column,
                body,
            } => {
                let Some(pk) = frame.pk else {
                    return Ok(());
                };
                let members: Vec<Row> = self
                    .data
                    .table(&source.table)
                    .map(|(_, row)| row)
                    .filter(|row| value::as_pk(row.get(link_column)) == Some(pk))
                    .filter(|row| !source.soft_delete || column(row, DELETED_AT).is_null())
                    .cloned()
                    .collect();
                for member in members {
                    frame.vars.insert(var.clone(), member);
                    self.run_ops(frame, body)?;
                }
            }
            Op::Branch {
                condition,
                then,
                otherwise,
            } => {
                let branch = if self.holds(frame, condition)? { then } else { otherwise };
                self.run_ops(frame, branch)?;
            }
            Op::Refresh { view } => self.refresh(view),
        }
        Ok(())
    }

    /// `coalesce(condition, FALSE)`
    fn holds(&self, frame: &Frame<'_>, condition: &Expr) -> Result<bool, SandboxError> {
        Ok(truth(&self.eval(frame, condition, None)?)?.unwrap_or(false))
    }

    /// Keys of the live rows of `table` matching `condition`.
    fn select(&self, frame: &Frame<'_>, table: &TableRef, condition: &Expr) -> Result<Vec<i64>, SandboxError> {
        let mut keys = Vec::new();
        for (pk, row) in self.data.table(&table.table) {
            if table.soft_delete && !column(row, DELETED_AT).is_null() {
                continue;
            }
            if truth(&self.eval(frame, condition, Some(row))?)? == Some(true) {
                keys.push(*pk);
            }
        }
        Ok(keys)
    }

    /// Re-read the invocation's row after a write.
    fn reload(&self, frame: &mut Frame<'_>) {
        let Some(pk) = frame.pk else {
            return;
        };
        let table = &frame.routine.table.table;
        frame.row = Some(match self.data.row(table, pk) {
            Some(row) => row.clone(),
            None => self
                .schema
                .tables
                .get(table)
                .map(TableDef::empty_row)
                .unwrap_or_default(),
        });
    }

    fn is_live(&self, table: &QualifiedName, pk: i64) -> bool {
        self.data
            .row(table, pk)
            .is_some_and(|row| column(row, DELETED_AT).is_null())
    }

    /// Row whose external id is `id`, optionally skipping deleted rows.
    pub(super) fn find_by_id(&self, table: &TableRef, id: &Value, live: bool) -> Option<(i64, Row)> {
        self.data
            .table(&table.table)
            .find(|(_, row)| {
                sql_eq(column(row, EXTERNAL_ID), id) == Some(true)
                    && !(live
                        && table.soft_delete
                        && !column(row, DELETED_AT).is_null())
            })
            .map(|(pk, row)| (*pk, row.clone()))
    }

    fn eval(&self, frame: &Frame<'_>, expr: &Expr, target: Option<&Row>) -> Result<Value, SandboxError> {
        match expr {
            Expr::Literal(literal) => Ok(literal.to_json()),
            Expr::Path(path) => Err(SandboxError::Unsupported(format!("unresolved name '{}'", path.join(".")))),
            Expr::Input(name) => Ok(frame.params.get(name).cloned().unwrap_or(Value::Null)),
            Expr::Column { scope, column: name } => {
                let row = match scope {
                    Scope::Row => frame.row.as_ref(),
                    Scope::Target => target,
                    Scope::Var(var) => frame.vars.get(var),
                };
                row.map(|r| column(r, name).clone())
                    .ok_or_else(|| SandboxError::Unsupported(format!("no row in scope for '{}'", name)))
            }
            Expr::Unary { op, expr } => {
                let value = self.eval(frame, expr, target)?;
                match op {
                    UnaryOp::Not => Ok(value::from_truth(truth(&value)?.map(|b| !b))),
                    UnaryOp::Neg => value::negate(&value),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let a = self.eval(frame, lhs, target)?;
                let b = self.eval(frame, rhs, target)?;
                if op.is_logical() {
                    Ok(value::from_truth(value::logical(*op, truth(&a)?, truth(&b)?)))
                } else if op.is_comparison() {
                    value::comparison(*op, &a, &b)
                } else {
                    value::arithmetic(*op, &a, &b)
                }
            }
            Expr::InList { expr, list, negated } => {
                let needle = self.eval(frame, expr, target)?;
                let mut found = Some(false);
                for item in list {
                    let item = self.eval(frame, item, target)?;
                    found = value::logical(BinaryOp::Or, found, sql_eq(&needle, &item));
                }
                let found = if *negated { found.map(|b| !b) } else { found };
                Ok(value::from_truth(found))
            }
            Expr::IsNull { expr, negated } => {
                let value = self.eval(frame, expr, target)?;
                Ok(Value::Bool(value.is_null() != *negated))
            }
            Expr::Call { func, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(frame, arg, target)?);
                }
                Ok(match func {
                    Func::Now => Value::String(self.now()),
                    Func::Today => Value::String(self.today()),
                    Func::Coalesce => values.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null),
                    Func::Lower | Func::Upper => match values.first() {
                        Some(Value::String(s)) if *func == Func::Lower => Value::String(s.to_lowercase()),
                        Some(Value::String(s)) => Value::String(s.to_uppercase()),
                        _ => Value::Null,
                    },
                })
            }
            Expr::KeyOf { table, id } => {
                let id = self.eval(frame, id, target)?;
                Ok(self
                    .find_by_id(table, &id, false)
                    .map_or(Value::Null, |(pk, _)| Value::from(pk)))
            }
        }
    }

    /// Inherited values, nearest template first.
    fn resolve(&self, table: &TableRef, walk: &ChainWalk, id: Option<Value>) -> Result<Row, SandboxError> {
        let start = id
            .and_then(|id| self.find_by_id(table, &id, true))
            .map(|(pk, _)| pk)
            .ok_or_else(|| SandboxError::Raised(NOT_FOUND.to_string()))?;

        let mut seen: Vec<i64> = Vec::new();
        let mut chain: Vec<Row> = Vec::new();
        let mut next = Some(start);
        while let Some(pk) = next {
            if seen.contains(&pk) {
                return Err(SandboxError::Raised(CYCLIC_TEMPLATE.to_string()));
            }
            if seen.len() > walk.max_depth {
                return Err(SandboxError::Raised(TEMPLATE_DEPTH_EXCEEDED.to_string()));
            }
            let row = self.data.row(&table.table, pk).cloned().unwrap_or_default();
            next = value::as_pk(row.get(&walk.link_column));
            seen.push(pk);
            chain.push(row);
        }

        let links: Vec<&Row> = chain.iter().collect();
        let mut merged = merge_chain(&links, &walk.fields);
        merged.retain(|_, v| !v.is_null());
        Ok(merged)
    }

    /// Row trigger of the template pattern: reject a link that closes a
    /// cycle or makes the chain too deep.
    pub(super) fn validate_chain(&self, def: &TableDef, walk: &ChainWalk, row: &Row) -> Result<(), SandboxError> {
        let mut seen: Vec<i64> = value::as_pk(row.get(&def.pk_column)).into_iter().collect();
        let mut next = value::as_pk(row.get(&walk.link_column));
        let mut depth = 0;
        while let Some(pk) = next {
            if seen.contains(&pk) {
                return Err(SandboxError::Raised(CYCLIC_TEMPLATE.to_string()));
            }
            depth += 1;
            if depth > walk.max_depth {
                return Err(SandboxError::Raised(TEMPLATE_DEPTH_EXCEEDED.to_string()));
            }
            seen.push(pk);
            next = self
                .data
                .row(&def.name, pk)
                .and_then(|r| value::as_pk(r.get(&walk.link_column)));
        }
        Ok(())
    }

    /// Row trigger of the dependency pattern. `def` is the owning table for
    /// a link column and the link table for edges; the written row is
    /// taken as already stored.
    pub(super) fn validate_dependencies(
        &self,
        def: &TableDef,
        walk: &DependencyWalk,
        row: &Row,
    ) -> Result<(), SandboxError> {
        let own = value::as_pk(row.get(&def.pk_column));
        let mut dfs = DepthFirst::new()
            .with_policy(CyclePolicy::Reject)
            .with_max_depth(walk.max_depth);
        let visited = match &walk.link {
            DependencyLink::Column(link) => {
                let Some(start) = own else {
                    return Ok(());
                };
                dfs.visit(&start, &mut |pk: &i64| {
                    let next = if *pk == start {
                        value::as_pk(row.get(link))
                    } else {
                        self.data.row(&def.name, *pk).and_then(|r| value::as_pk(r.get(link)))
                    };
                    next.into_iter().collect::<Vec<_>>()
                })
            }
            DependencyLink::Edges {
                table,
                from_column,
                to_column,
            } => {
                let (Some(from), Some(to)) = (value::as_pk(row.get(from_column)), value::as_pk(row.get(to_column)))
                else {
                    return Ok(());
                };
                dfs.visit(&from, &mut |pk: &i64| {
                    let mut next = self.edges_from(table, from_column, to_column, *pk, own);
                    if *pk == from {
                        next.push(to);
                    }
                    next
                })
            }
        };
        visited.map_err(dependency_error)
    }

    /// Targets of the live edges leaving `pk`, skipping the edge row `except`.
    fn edges_from(
        &self,
        table: &TableRef,
        from_column: &str,
        to_column: &str,
        pk: i64,
        except: Option<i64>,
    ) -> Vec<i64> {
        self.data
            .table(&table.table)
            .filter(|(edge, _)| Some(**edge) != except)
            .filter(|(_, r)| !(table.soft_delete && !column(r, DELETED_AT).is_null()))
            .filter(|(_, r)| value::as_pk(r.get(from_column)) == Some(pk))
            .filter_map(|(_, r)| value::as_pk(r.get(to_column)))
            .collect()
    }

    /// External ids reachable from the row, the row itself excluded.
    fn closure(&self, table: &TableRef, walk: &DependencyWalk, id: Option<Value>) -> Result<Vec<String>, SandboxError> {
        let (start, _) = id
            .and_then(|id| self.find_by_id(table, &id, true))
            .ok_or_else(|| SandboxError::Raised(NOT_FOUND.to_string()))?;

        let successors = |pk: &i64| -> Vec<i64> {
            match &walk.link {
                DependencyLink::Column(link) => self
                    .data
                    .row(&table.table, *pk)
                    .and_then(|r| value::as_pk(r.get(link)))
                    .into_iter()
                    .collect(),
                DependencyLink::Edges {
                    table: edges,
                    from_column,
                    to_column,
                } => self.edges_from(edges, from_column, to_column, *pk, None),
            }
        };
        let reached = recursive_dependency::closure(&start, successors, walk.policy, walk.max_depth)
            .map_err(dependency_error)?;

        let mut ids: Vec<String> = reached
            .iter()
            .filter_map(|pk| self.data.row(&table.table, *pk))
            .filter_map(|r| r.get(EXTERNAL_ID).and_then(Value::as_str).map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Warning-mode row trigger: flag the row when a live row in the same
    /// scope overlaps it.
    pub(super) fn flag_overlap(
        &self,
        def: &TableDef,
        range: &RangeSpec,
        soft_delete: bool,
        row: &mut Row,
    ) -> Result<(), SandboxError> {
        let own = RangeValue::of(row, &range.start, &range.end, &range.bounds)?;
        let own_pk = value::as_pk(row.get(&def.pk_column));
        let mut flagged = false;
        for (pk, other) in self.data.table(&def.name) {
            if Some(*pk) == own_pk {
                continue;
            }
            if soft_delete && !column(other, DELETED_AT).is_null() {
                continue;
            }
            let same_scope = range
                .scope_columns
                .iter()
                .all(|c| sql_eq(column(other, c), column(row, c)) == Some(true));
            if same_scope && RangeValue::of(other, &range.start, &range.end, &range.bounds)?.overlaps(&own) {
                flagged = true;
                break;
            }
        }
        row.insert(range.flag_column.clone(), Value::Bool(flagged));
        Ok(())
    }

    /// Type 2 upsert: keep, supersede or start the current version.
    fn upsert(
        &mut self,
        table: &TableRef,
        spec: &VersionSpec,
        params: &Map<String, Value>,
    ) -> Result<MutationResult, SandboxError> {
        let param = |name: &str| params.get(name).cloned().unwrap_or(Value::Null);
        let current: Option<(i64, Row)> = self
            .data
            .table(&table.table)
            .find(|(_, row)| {
                spec.natural_key
                    .iter()
                    .all(|k| sql_eq(column(row, k), &param(k)) == Some(true))
                    && column(row, &spec.is_current) == &Value::Bool(true)
                    && !(table.soft_delete && !column(row, DELETED_AT).is_null())
            })
            .map(|(pk, row)| (*pk, row.clone()));

        // Unset tracked values keep the current ones.
        let incoming: Row = spec
            .tracked
            .iter()
            .filter(|t| !param(t).is_null())
            .map(|t| (t.clone(), param(t)))
            .collect();
        let unchanged = current.as_ref().is_some_and(|(_, row)| {
            incoming.iter().all(|(t, v)| same(v, column(row, t)))
        });
        let change = if unchanged {
            VersionChange::Unchanged
        } else {
            classify(current.as_ref().map(|(_, row)| row), &incoming, &spec.tracked)
        };

        match (change, &current) {
            (VersionChange::Unchanged, Some((_, row))) => {
                let id = row.get(EXTERNAL_ID).and_then(Value::as_str).map(str::to_string);
                return Ok(MutationResult::success(Some("unchanged".to_string()), id, None));
            }
            (VersionChange::Supersede, Some((pk, _))) => {
                let mut close = Row::new();
                close.insert(spec.effective_to.clone(), Value::String(self.now()));
                close.insert(spec.is_current.clone(), Value::Bool(false));
                self.update_row(&table.table, *pk, close)?;
            }
            _ => {}
        }

        let mut values = Row::new();
        for key in &spec.natural_key {
            values.insert(key.clone(), param(key));
        }
        for tracked in &spec.tracked {
            let value = match (param(tracked), &current) {
                (Value::Null, Some((_, row))) => column(row, tracked).clone(),
                (value, _) => value,
            };
            values.insert(tracked.clone(), value);
        }
        values.insert(spec.effective_from.clone(), Value::String(self.now()));
        values.insert(spec.is_current.clone(), Value::Bool(true));
        let pk = self.insert_row(&table.table, values)?;
        self.after_statement(&table.table);

        let id = self
            .data
            .row(&table.table, pk)
            .and_then(|row| row.get(EXTERNAL_ID))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = if current.is_some() { "superseded" } else { "inserted" };
        Ok(MutationResult::success(Some(message.to_string()), id, None))
    }

    fn lookup(&self, table: &TableRef, direction: LookupDirection, argument: &Value) -> Value {
        match direction {
            LookupDirection::PkFromId => self
                .find_by_id(table, argument, false)
                .map_or(Value::Null, |(pk, _)| Value::from(pk)),
            LookupDirection::IdFromPk => value::as_pk(Some(argument))
                .and_then(|pk| self.data.row(&table.table, pk))
                .map_or(Value::Null, |row| column(row, EXTERNAL_ID).clone()),
        }
    }
}

fn dependency_error(error: TraversalError<i64>) -> SandboxError {
    let code = match error {
        TraversalError::Cycle { .. } => CYCLIC_DEPENDENCY,
        TraversalError::DepthExceeded { .. } => DEPENDENCY_DEPTH_EXCEEDED,
    };
    SandboxError::Raised(code.to_string())
}

/// Named arguments to parameters; unset optional ones are NULL.
fn bind(routine: &Routine, args: Map<String, Value>) -> Result<Map<String, Value>, SandboxError> {
    if let Some(unknown) = args.keys().find(|k| routine.param(k).is_none()) {
        return Err(SandboxError::Argument(format!(
            "{} has no parameter p_{}",
            routine.qualified_name(),
            unknown
        )));
    }
    let mut bound = Map::new();
    for param in &routine.params {
        match args.get(&param.name) {
            Some(value) => {
                bound.insert(param.name.clone(), value.clone());
            }
            None if param.required => {
                return Err(SandboxError::Argument(format!(
                    "{} requires {}",
                    routine.qualified_name(),
                    param.sql_name()
                )))
            }
            None => {
                bound.insert(param.name.clone(), Value::Null);
            }
        }
    }
    Ok(bound)
}
