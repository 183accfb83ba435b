//! Row writes.
//!
//! A write builds the new row, fires the table's row triggers in name
//! order, computes generated range columns and the identifier, then
//! checks NOT NULL, CHECK, unique, exclusion and foreign key constraints
//! in that order.

use std::sync::Arc;

use serde_json::Value;

use super::schema::TableDef;
use super::value::{self, column, matches_predicate, same, sql_eq, RangeValue};
use super::{Row, Sandbox, SandboxError};
use crate::domain::actions::RoutineBody;
use crate::domain::entities::{ColumnDefault, Field, FieldRole};
use crate::domain::value_objects::QualifiedName;

impl Sandbox {
    /// `INSERT`; returns the new row's key.
    pub(super) fn insert_row(&mut self, table: &QualifiedName, values: Row) -> Result<i64, SandboxError> {
        let schema = Arc::clone(&self.schema);
        let def = schema.table(table)?;
        reject_unknown_columns(def, &values)?;

        let mut values = values;
        let mut row = Row::new();
        for field in &def.fields {
            let value = match values.remove(&field.name) {
                Some(_) if matches!(field.role, FieldRole::ComputedRange(_)) => {
                    return Err(SandboxError::Data(format!(
                        "cannot insert a value into generated column '{}'",
                        field.name
                    )))
                }
                Some(value) => value,
                None => self.default_value(field),
            };
            row.insert(field.name.clone(), value);
        }

        let pk = match value::as_pk(row.get(&def.pk_column)) {
            Some(pk) => pk,
            None => {
                let next = self.data.next_pk.entry(table.clone()).or_insert(0);
                *next += 1;
                *next
            }
        };
        row.insert(def.pk_column.clone(), Value::from(pk));

        self.before_row(def, &mut row)?;
        self.write_row(def, pk, row, false)?;
        Ok(pk)
    }

    /// `UPDATE` of one row by key. A missing row is a no-op.
    pub(super) fn update_row(
        &mut self,
        table: &QualifiedName,
        pk: i64,
        changes: Row,
    ) -> Result<(), SandboxError> {
        let schema = Arc::clone(&self.schema);
        let def = schema.table(table)?;
        reject_unknown_columns(def, &changes)?;
        let Some(mut row) = self.data.row(table, pk).cloned() else {
            return Ok(());
        };
        for (name, value) in changes {
            let generated = def
                .field(&name)
                .is_some_and(|f| matches!(f.role, FieldRole::ComputedRange(_)));
            if generated {
                return Err(SandboxError::Data(format!("column '{}' can only be updated to DEFAULT", name)));
            }
            if name == def.pk_column && value.as_i64() != Some(pk) {
                return Err(SandboxError::Unsupported(format!("changing the key of {}", table)));
            }
            row.insert(name, value);
        }
        self.before_row(def, &mut row)?;
        self.write_row(def, pk, row, true)
    }

    /// `DELETE` of one row by key; fails while other rows reference it.
    pub(super) fn delete_row(&mut self, table: &QualifiedName, pk: i64) -> Result<(), SandboxError> {
        let schema = Arc::clone(&self.schema);
        for (other, field) in schema.referencing(table) {
            let referenced = self.data.table(&other.name).any(|(other_pk, row)| {
                value::as_pk(row.get(&field.name)) == Some(pk)
                    && !(other.name == *table && *other_pk == pk)
            });
            if referenced {
                return Err(SandboxError::Violation {
                    constraint: other.fkey_name(&field.name),
                });
            }
        }
        if let Some(rows) = self.data.rows.get_mut(table) {
            rows.remove(&pk);
        }
        Ok(())
    }

    /// Statement-level triggers: refresh the views built on `table`.
    pub(super) fn after_statement(&mut self, table: &QualifiedName) {
        let schema = Arc::clone(&self.schema);
        if let Some(def) = schema.tables.get(table) {
            for view in &def.refreshers {
                self.refresh(view);
            }
        }
    }

    /// Recompute a materialized view from its source table.
    pub(super) fn refresh(&mut self, view: &QualifiedName) {
        let schema = Arc::clone(&self.schema);
        let Some(def) = schema.views.get(view) else {
            return;
        };
        let rows: Vec<&Row> = self
            .data
            .table(&def.source)
            .map(|(_, row)| row)
            .filter(|row| def.view.predicate.as_ref().map_or(true, |p| matches_predicate(row, p)))
            .collect();
        let result = crate::domain::patterns::aggregate_view::aggregate(&rows, &def.view);
        self.data.views.insert(view.clone(), result);
    }

    fn default_value(&mut self, field: &Field) -> Value {
        match &field.default {
            Some(ColumnDefault::Literal(value)) => value.clone(),
            Some(ColumnDefault::Now) => Value::String(self.now()),
            Some(ColumnDefault::RandomUuid) => Value::String(self.next_uuid()),
            None => Value::Null,
        }
    }

    /// BEFORE INSERT OR UPDATE row triggers.
    fn before_row(&mut self, def: &TableDef, row: &mut Row) -> Result<(), SandboxError> {
        let schema = Arc::clone(&self.schema);
        for name in &def.triggers {
            let Some(routine) = schema.routines.get(name) else {
                continue;
            };
            match &routine.body {
                RoutineBody::ValidateTemplate(walk) => self.validate_chain(def, walk, row)?,
                RoutineBody::ValidateDependencies(walk) => self.validate_dependencies(def, walk, row)?,
                RoutineBody::FlagOverlap(range) => {
                    self.flag_overlap(def, range, routine.table.soft_delete, row)?
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn write_row(&mut self, def: &TableDef, pk: i64, mut row: Row, replacing: bool) -> Result<(), SandboxError> {
        for field in &def.fields {
            match &field.role {
                FieldRole::ComputedRange(range) => {
                    let text = RangeValue::computed(&row, range)?.to_text();
                    row.insert(field.name.clone(), Value::String(text));
                }
                FieldRole::Identifier(rule) => {
                    let identifier = rule.derive(pk, |c| value::column_text(&row, c));
                    row.insert(field.name.clone(), Value::String(identifier));
                }
                _ => {}
            }
        }

        if def.fields.iter().any(|f| !f.nullable && column(&row, &f.name).is_null()) {
            return Err(SandboxError::Violation {
                constraint: String::new(),
            });
        }

        for (name, rule) in &def.checks {
            if !value::check_holds(&row, rule)? {
                return Err(SandboxError::Violation {
                    constraint: name.clone(),
                });
            }
        }

        let others: Vec<&Row> = self
            .data
            .table(&def.name)
            .filter(|(other_pk, _)| !replacing || **other_pk != pk)
            .map(|(_, other)| other)
            .collect();

        for key in &def.uniques {
            let applies = |r: &Row| key.predicate.as_ref().map_or(true, |p| matches_predicate(r, p));
            if !applies(&row) || key.columns.iter().any(|c| column(&row, c).is_null()) {
                continue;
            }
            let clash = others.iter().any(|&other| {
                applies(other)
                    && key
                        .columns
                        .iter()
                        .all(|c| sql_eq(column(&row, c), column(other, c)) == Some(true))
            });
            if clash {
                return Err(SandboxError::Violation {
                    constraint: key.name.clone(),
                });
            }
        }

        for exclusion in &def.exclusions {
            let applies = |r: &Row| {
                exclusion
                    .predicate
                    .as_ref()
                    .map_or(true, |p| matches_predicate(r, p))
            };
            if !applies(&row) {
                continue;
            }
            for &other in &others {
                if !applies(other) {
                    continue;
                }
                let mut conflict = true;
                for element in &exclusion.elements {
                    conflict &= self.excludes(def, &element.column, &element.operator, &row, other)?;
                }
                if conflict {
                    return Err(SandboxError::Violation {
                        constraint: exclusion.name.clone(),
                    });
                }
            }
        }

        for field in &def.fields {
            let Some(fk) = field.foreign_key() else {
                continue;
            };
            let target = column(&row, &field.name);
            if target.is_null() {
                continue;
            }
            let self_reference = fk.table == def.name && value::as_pk(Some(target)) == Some(pk);
            let exists = self_reference
                || self
                    .data
                    .table(&fk.table)
                    .any(|(_, r)| same(column(r, &fk.column), target));
            if !exists {
                return Err(SandboxError::Violation {
                    constraint: def.fkey_name(&field.name),
                });
            }
        }

        self.data.rows.entry(def.name.clone()).or_default().insert(pk, row);
        Ok(())
    }

    /// Whether one exclusion element conflicts between two rows.
    fn excludes(
        &self,
        def: &TableDef,
        name: &str,
        operator: &str,
        row: &Row,
        other: &Row,
    ) -> Result<bool, SandboxError> {
        match operator {
            "=" => Ok(sql_eq(column(row, name), column(other, name)) == Some(true)),
            "&&" => match def.field(name).map(|f| &f.role) {
                Some(FieldRole::ComputedRange(range)) => {
                    Ok(RangeValue::computed(row, range)?.overlaps(&RangeValue::computed(other, range)?))
                }
                _ => Err(SandboxError::Unsupported(format!("'&&' on non-range column '{}'", name))),
            },
            other => Err(SandboxError::Unsupported(format!("exclusion operator '{}'", other))),
        }
    }
}

fn reject_unknown_columns(def: &TableDef, values: &Row) -> Result<(), SandboxError> {
    match values.keys().find(|c| def.field(c).is_none()) {
        Some(column) => Err(SandboxError::Data(format!(
            "column '{}' of {} does not exist",
            column, def.name
        ))),
        None => Ok(()),
    }
}
