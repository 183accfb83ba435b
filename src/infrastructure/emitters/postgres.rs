//! PostgreSQL Emitter
//!
//! Renders artifacts as DDL and PL/pgSQL:
//! - result type and extension prelude
//! - `CREATE TABLE` with identity, foreign keys and generated range columns
//! - `ALTER TABLE ... ADD CONSTRAINT` for checks, unique and exclusion constraints
//! - `CREATE INDEX` and `CREATE MATERIALIZED VIEW`
//! - one function per routine, plus `CREATE TRIGGER` for trigger routines
//!
//! Action routines run their steps inside a nested block. A raised
//! `P0001` exception or an integrity violation unwinds the block, so no
//! effect of an earlier step survives a failed invocation.

use serde_json::Value;

use crate::domain::actions::{
    ChainWalk, DependencyLink, DependencyWalk, Expr, Func, Literal, LookupDirection, Op, Param,
    RangeSpec, Routine, RoutineBody, RoutineKind, RowFilter, Scope, TableRef, UnaryOp,
    VersionSpec, CYCLIC_DEPENDENCY,
    CYCLIC_TEMPLATE, DEPENDENCY_DEPTH_EXCEEDED, NOT_FOUND, TEMPLATE_DEPTH_EXCEEDED,
};
use crate::domain::entities::{
    Aggregate, Artifact, ArtifactBody, CheckRule, ColumnDefault, Constraint, ConstraintRule,
    Field, FieldRole, Index, IndexMethod, RowPredicate, TableSpec, View, DELETED_AT,
};
use crate::domain::ports::{EmitError, TargetEmitter};
use crate::domain::services::CyclePolicy;
use crate::domain::value_objects::{ArtifactId, ModelSettings, QualifiedName, Target};

const RAISED: &str = "P0001";

/// PostgreSQL DDL and PL/pgSQL emitter
pub struct PostgresEmitter {
    result_type: QualifiedName,
}

impl PostgresEmitter {
    pub fn new() -> Self {
        Self::with_settings(&ModelSettings::default())
    }

    pub fn with_settings(settings: &ModelSettings) -> Self {
        Self {
            result_type: settings.result_type.clone(),
        }
    }

    fn result_type_sql(&self, name: &QualifiedName) -> String {
        let mut sql = String::new();
        sql.push_str("CREATE EXTENSION IF NOT EXISTS btree_gist;\n");
        sql.push_str(&format!("CREATE SCHEMA IF NOT EXISTS {};\n", name.schema));
        sql.push_str(&format!(
            "CREATE TYPE {} AS (\n    status TEXT,\n    message TEXT,\n    id UUID,\n    data JSONB\n);\n",
            name
        ));
        sql
    }

    fn table_sql(&self, name: &QualifiedName, spec: &TableSpec) -> String {
        let mut sql = format!("CREATE SCHEMA IF NOT EXISTS {};\n\n", name.schema);
        sql.push_str(&format!("CREATE TABLE {} (\n", name));
        let columns: Vec<String> = spec.fields.iter().map(|f| format!("    {}", column(f))).collect();
        sql.push_str(&columns.join(",\n"));
        sql.push_str("\n);\n");
        if let Some(description) = &spec.description {
            sql.push_str(&format!(
                "COMMENT ON TABLE {} IS {};\n",
                name,
                quote(description)
            ));
        }
        for field in spec.fields.iter().filter(|f| f.description.is_some()) {
            if let Some(description) = &field.description {
                sql.push_str(&format!(
                    "COMMENT ON COLUMN {}.{} IS {};\n",
                    name,
                    field.name,
                    quote(description)
                ));
            }
        }
        if let Some(identifier) = identifier_trigger(name, spec) {
            sql.push('\n');
            sql.push_str(&identifier);
        }
        sql
    }

    fn routine_sql(&self, id: &ArtifactId, routine: &Routine) -> Result<String, EmitError> {
        let mut writer = RoutineWriter {
            id,
            routine,
            result_type: &self.result_type,
            body: Lines::new(),
        };
        let mut sql = writer.render()?;
        if let Some(description) = &routine.description {
            sql.push_str(&format!(
                "COMMENT ON FUNCTION {}({}) IS {};\n",
                routine.qualified_name(),
                signature_types(routine),
                quote(description)
            ));
        }
        Ok(sql)
    }
}

impl Default for PostgresEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetEmitter for PostgresEmitter {
    fn target(&self) -> Target {
        Target::Postgres
    }

    fn header(&self, unit: &str) -> String {
        format!("-- Generated by strata from {}. Do not edit.\n", unit)
    }

    fn render(&self, artifact: &Artifact) -> Result<Option<String>, EmitError> {
        let sql = match artifact.body() {
            ArtifactBody::ResultType => self.result_type_sql(artifact.name()),
            ArtifactBody::Table(spec) => self.table_sql(artifact.name(), spec),
            ArtifactBody::Constraint { table, constraint } => constraint_sql(table, constraint),
            ArtifactBody::Index { table, index } => index_sql(table, index),
            ArtifactBody::View { source, view } => view_sql(artifact.name(), source, view),
            ArtifactBody::Routine(routine) => self.routine_sql(artifact.id(), routine)?,
        };
        Ok(Some(sql))
    }
}

/// Single-quoted SQL string literal.
pub(crate) fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        other => format!("{}::jsonb", quote(&other.to_string())),
    }
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn column(field: &Field) -> String {
    match &field.role {
        FieldRole::SurrogateKey => {
            return format!(
                "{} {} GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
                field.name, field.target
            );
        }
        FieldRole::ComputedRange(range) => {
            return format!(
                "{} {} GENERATED ALWAYS AS ({}({}, {}, {})) STORED",
                field.name,
                field.target,
                range.range_type,
                range.start,
                range.end,
                quote(&range.bounds)
            );
        }
        _ => {}
    }
    let mut sql = format!("{} {}", field.name, field.target);
    if !field.nullable {
        sql.push_str(" NOT NULL");
    }
    match &field.default {
        Some(ColumnDefault::Now) => sql.push_str(" DEFAULT now()"),
        Some(ColumnDefault::RandomUuid) => sql.push_str(" DEFAULT gen_random_uuid()"),
        Some(ColumnDefault::Literal(value)) => {
            sql.push_str(&format!(" DEFAULT {}", value_literal(value)))
        }
        None => {}
    }
    if field.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(fk) = field.foreign_key() {
        sql.push_str(&format!(" REFERENCES {} ({})", fk.table, fk.column));
    }
    sql
}

/// Row trigger that rewrites the identifier from the rule on every write.
fn identifier_trigger(table: &QualifiedName, spec: &TableSpec) -> Option<String> {
    let (column, rule) = spec.fields.iter().find_map(|f| match &f.role {
        FieldRole::Identifier(rule) => Some((f.name.as_str(), rule)),
        _ => None,
    })?;
    let pk = spec.fields.iter().find(|f| matches!(f.role, FieldRole::SurrogateKey))?;
    let fallback = format!("{} || NEW.{}", quote(&format!("{}-", rule.prefix)), pk.name);
    let value = if rule.components.is_empty() {
        fallback
    } else {
        let slugs: Vec<String> = rule
            .components
            .iter()
            .map(|c| {
                format!(
                    "nullif(trim(both '-' from lower(regexp_replace(NEW.{}::text, '[^A-Za-z0-9]+', '-', 'g'))), '')",
                    c
                )
            })
            .collect();
        format!(
            "coalesce(nullif(concat_ws({}, {}), ''), {})",
            quote(&rule.separator),
            slugs.join(", "),
            fallback
        )
    };
    let function = QualifiedName::new(&table.schema, format!("set_{}_{}", table.name, column));
    let trigger = format!("trg_set_{}_{}", table.name, column);
    Some(format!(
        "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger\nLANGUAGE plpgsql\nAS $$\nBEGIN\n    NEW.{column} := {value};\n    RETURN NEW;\nEND;\n$$;\nDROP TRIGGER IF EXISTS {trigger} ON {table};\nCREATE TRIGGER {trigger}\n    BEFORE INSERT OR UPDATE ON {table}\n    FOR EACH ROW EXECUTE FUNCTION {function}();\n",
        function = function,
        column = column,
        value = value,
        trigger = trigger,
        table = table,
    ))
}

fn predicate(p: &RowPredicate) -> String {
    match p {
        RowPredicate::IsNull(column) => format!("{} IS NULL", column),
        RowPredicate::IsTrue(column) => column.clone(),
        RowPredicate::All(parts) => parts.iter().map(predicate).collect::<Vec<_>>().join(" AND "),
    }
}

fn check(rule: &CheckRule) -> String {
    match rule {
        CheckRule::Matches { column, pattern } => format!("{} ~ {}", column, quote(pattern)),
        CheckRule::Between { column, min, max } => {
            let mut parts = Vec::new();
            if let Some(min) = min {
                parts.push(format!("{} >= {}", column, number(*min)));
            }
            if let Some(max) = max {
                parts.push(format!("{} <= {}", column, number(*max)));
            }
            if parts.is_empty() {
                "TRUE".to_string()
            } else {
                parts.join(" AND ")
            }
        }
        CheckRule::OneOf { column, values } => {
            let values: Vec<String> = values.iter().map(|v| quote(v)).collect();
            format!("{} IN ({})", column, values.join(", "))
        }
        CheckRule::NotNull { column } => format!("{} IS NOT NULL", column),
        CheckRule::Ordered {
            start,
            end,
            allow_equal,
        } => format!(
            "{end} IS NULL OR {start} {op} {end}",
            start = start,
            end = end,
            op = if *allow_equal { "<=" } else { "<" }
        ),
    }
}

fn constraint_sql(table: &QualifiedName, constraint: &Constraint) -> String {
    let body = match &constraint.rule {
        ConstraintRule::Check(rule) => format!("CHECK ({})", check(rule)),
        ConstraintRule::Unique { columns } => format!("UNIQUE ({})", columns.join(", ")),
        ConstraintRule::Exclusion {
            elements,
            predicate: filter,
        } => {
            let elements: Vec<String> = elements
                .iter()
                .map(|e| format!("{} WITH {}", e.column, e.operator))
                .collect();
            let mut sql = format!("EXCLUDE USING gist ({})", elements.join(", "));
            if let Some(filter) = filter {
                sql.push_str(&format!(" WHERE ({})", predicate(filter)));
            }
            sql
        }
    };
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} {};\n",
        table, constraint.name, body
    )
}

fn index_sql(table: &QualifiedName, index: &Index) -> String {
    let mut sql = String::from("CREATE ");
    if index.unique {
        sql.push_str("UNIQUE ");
    }
    sql.push_str(&format!("INDEX {} ON {}", index.name, table));
    if index.method == IndexMethod::Gist {
        sql.push_str(" USING gist");
    }
    sql.push_str(&format!(" ({})", index.columns.join(", ")));
    if let Some(filter) = &index.predicate {
        sql.push_str(&format!(" WHERE {}", predicate(filter)));
    }
    sql.push_str(";\n");
    sql
}

fn aggregate(a: &Aggregate) -> String {
    let argument = a.column.as_deref().unwrap_or("*");
    format!("{}({}) AS {}", a.function.as_str(), argument, a.alias)
}

fn view_sql(name: &QualifiedName, source: &QualifiedName, view: &View) -> String {
    let mut select: Vec<String> = view.group_by.clone();
    select.extend(view.aggregates.iter().map(aggregate));
    let mut sql = format!(
        "CREATE MATERIALIZED VIEW {} AS\nSELECT {}\nFROM {}",
        name,
        select.join(", "),
        source
    );
    if let Some(filter) = &view.predicate {
        sql.push_str(&format!("\nWHERE {}", predicate(filter)));
    }
    if !view.group_by.is_empty() {
        sql.push_str(&format!("\nGROUP BY {}", view.group_by.join(", ")));
    }
    sql.push_str(";\n");
    sql
}

/// Argument types of the rendered function, for `COMMENT ON FUNCTION`.
pub(crate) fn signature_types(routine: &Routine) -> String {
    if routine.kind == RoutineKind::Trigger {
        return String::new();
    }
    let mut types = Vec::new();
    if routine.targets_row {
        types.push("UUID".to_string());
    }
    types.extend(routine.params.iter().map(|p| p.target.to_string()));
    types.join(", ")
}

fn live(table: &TableRef) -> &'static str {
    if table.soft_delete {
        " AND deleted_at IS NULL"
    } else {
        ""
    }
}

fn live_as(table: &TableRef, alias: &str) -> String {
    if table.soft_delete {
        format!(" AND {}.deleted_at IS NULL", alias)
    } else {
        String::new()
    }
}

/// Locals of the single-link chain triggers.
fn chain_locals(table: &TableRef, link: &str) -> Vec<String> {
    vec![
        format!("v_seen INTEGER[] := ARRAY[NEW.{}];", table.pk_column),
        format!("v_next INTEGER := NEW.{};", link),
        "v_depth INTEGER := 0;".to_string(),
    ]
}

/// Indented line buffer for routine bodies.
struct Lines {
    text: String,
    indent: usize,
}

impl Lines {
    fn new() -> Self {
        Self {
            text: String::new(),
            indent: 1,
        }
    }

    fn line(&mut self, line: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.text.push_str("    ");
        }
        self.text.push_str(line.as_ref());
        self.text.push('\n');
    }

    fn nest(&mut self) {
        self.indent += 1;
    }

    fn unnest(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }
}

struct RoutineWriter<'r> {
    id: &'r ArtifactId,
    routine: &'r Routine,
    result_type: &'r QualifiedName,
    body: Lines,
}

impl<'r> RoutineWriter<'r> {
    fn render(&mut self) -> Result<String, EmitError> {
        let r = self.routine;
        let (returns, language, declare) = match &r.body {
            RoutineBody::Steps(ops) => {
                let declare = self.steps(ops)?;
                (self.result_type.to_string(), "plpgsql", declare)
            }
            RoutineBody::ResolveTemplate(walk) => {
                self.resolve_template(walk);
                (
                    "JSONB".to_string(),
                    "plpgsql STABLE",
                    vec![
                        "v_result JSONB := '{}'::jsonb;".to_string(),
                        "v_seen INTEGER[] := ARRAY[]::INTEGER[];".to_string(),
                        "v_depth INTEGER := 0;".to_string(),
                        "v_pk INTEGER;".to_string(),
                        format!("v_row {}%ROWTYPE;", r.table.table),
                    ],
                )
            }
            RoutineBody::ValidateTemplate(walk) => {
                self.validate_chain(&walk.link_column, walk.max_depth, CYCLIC_TEMPLATE, TEMPLATE_DEPTH_EXCEEDED);
                ("trigger".to_string(), "plpgsql", chain_locals(&r.table, &walk.link_column))
            }
            RoutineBody::ValidateDependencies(walk) => match &walk.link {
                DependencyLink::Column(link) => {
                    self.validate_chain(link, walk.max_depth, CYCLIC_DEPENDENCY, DEPENDENCY_DEPTH_EXCEEDED);
                    ("trigger".to_string(), "plpgsql", chain_locals(&r.table, link))
                }
                DependencyLink::Edges {
                    table,
                    from_column,
                    to_column,
                } => {
                    self.validate_edges(walk, table, from_column, to_column);
                    (
                        "trigger".to_string(),
                        "plpgsql",
                        vec!["v_cyclic BOOLEAN;".to_string(), "v_too_deep BOOLEAN;".to_string()],
                    )
                }
            },
            RoutineBody::DependencyClosure(walk) => {
                let mut locals = vec!["v_seen INTEGER[] := ARRAY[]::INTEGER[];".to_string(), "v_pk INTEGER;".to_string()];
                match &walk.link {
                    DependencyLink::Column(link) => {
                        self.dependency_closure(walk, link);
                        locals.push("v_next INTEGER;".to_string());
                        locals.push("v_depth INTEGER := 0;".to_string());
                    }
                    DependencyLink::Edges {
                        table,
                        from_column,
                        to_column,
                    } => {
                        self.edge_closure(walk, table, from_column, to_column);
                        locals.push("v_node INTEGER;".to_string());
                        locals.push("v_depth INTEGER;".to_string());
                        locals.push("v_cyclic BOOLEAN;".to_string());
                    }
                }
                ("SETOF UUID".to_string(), "plpgsql STABLE", locals)
            }
            RoutineBody::FlagOverlap(range) => {
                self.flag_overlap(range);
                ("trigger".to_string(), "plpgsql", Vec::new())
            }
            RoutineBody::UpsertVersion(spec) => {
                self.upsert_version(spec);
                (
                    self.result_type.to_string(),
                    "plpgsql",
                    vec![
                        format!("v_current {}%ROWTYPE;", r.table.table),
                        "v_id UUID;".to_string(),
                    ],
                )
            }
            RoutineBody::RefreshView(view) => {
                self.body.line(format!("REFRESH MATERIALIZED VIEW {};", view));
                if r.kind == RoutineKind::Trigger {
                    self.body.line("RETURN NULL;");
                    ("trigger".to_string(), "plpgsql", Vec::new())
                } else {
                    let done = self.result("'success'", "NULL", "NULL");
                    self.body.line(format!("RETURN {};", done));
                    (self.result_type.to_string(), "plpgsql", Vec::new())
                }
            }
            RoutineBody::IdentityLookup(direction) => return Ok(self.identity_lookup(*direction)),
        };

        let mut sql = format!(
            "CREATE OR REPLACE FUNCTION {}({}) RETURNS {}\nLANGUAGE {}\nAS $$\n",
            r.qualified_name(),
            self.parameters(),
            returns,
            language
        );
        if !declare.is_empty() {
            sql.push_str("DECLARE\n");
            for line in &declare {
                sql.push_str(&format!("    {}\n", line));
            }
        }
        sql.push_str("BEGIN\n");
        sql.push_str(&self.body.text);
        sql.push_str("END;\n$$;\n");
        if r.kind == RoutineKind::Trigger {
            sql.push_str(&self.trigger());
        }
        Ok(sql)
    }

    fn parameters(&self) -> String {
        let r = self.routine;
        if r.kind == RoutineKind::Trigger {
            return String::new();
        }
        let mut params = Vec::new();
        if r.targets_row {
            params.push("p_id UUID".to_string());
        }
        params.extend(r.params.iter().map(param));
        if params.is_empty() {
            String::new()
        } else {
            format!("\n    {}\n", params.join(",\n    "))
        }
    }

    fn trigger(&self) -> String {
        let r = self.routine;
        let name = format!("trg_{}", r.name);
        let timing = match r.body {
            RoutineBody::RefreshView(_) => "AFTER INSERT OR UPDATE OR DELETE",
            _ => "BEFORE INSERT OR UPDATE",
        };
        let each = match r.body {
            RoutineBody::RefreshView(_) => "STATEMENT",
            _ => "ROW",
        };
        format!(
            "DROP TRIGGER IF EXISTS {name} ON {table};\nCREATE TRIGGER {name}\n    {timing} ON {table}\n    FOR EACH {each} EXECUTE FUNCTION {function}();\n",
            name = name,
            table = r.table.table,
            timing = timing,
            each = each,
            function = r.qualified_name()
        )
    }

    fn result(&self, status: &str, message: &str, data: &str) -> String {
        let id = if self.routine.targets_row { "p_id" } else { "NULL" };
        format!(
            "ROW({}, {}, {}, {})::{}",
            status, message, id, data, self.result_type
        )
    }

    fn raise(&mut self, code: &str) {
        self.body.line(format!(
            "RAISE EXCEPTION USING ERRCODE = '{}', MESSAGE = {};",
            RAISED,
            quote(code)
        ));
    }

    fn unrenderable(&self, reason: String) -> EmitError {
        EmitError::Unrenderable {
            target: Target::Postgres,
            id: self.id.clone(),
            reason,
        }
    }

    /// Compiled action body. Returns the DECLARE lines.
    fn steps(&mut self, ops: &[Op]) -> Result<Vec<String>, EmitError> {
        let r = self.routine;
        let table = &r.table;
        let mut declare = vec![
            format!("v_result {};", self.result_type),
            "v_constraint TEXT;".to_string(),
        ];
        if r.targets_row {
            declare.push(format!("v_row {}%ROWTYPE;", table.table));
            declare.push("v_pk INTEGER;".to_string());
            self.body.line(format!(
                "SELECT * INTO v_row FROM {} WHERE id = p_id{};",
                table.table,
                live(table)
            ));
            let missing = self.result("'error'", &quote(NOT_FOUND), "NULL");
            self.body.line("IF NOT FOUND THEN");
            self.body.nest();
            self.body.line(format!("RETURN {};", missing));
            self.body.unnest();
            self.body.line("END IF;");
            self.body.line(format!("v_pk := v_row.{};", table.pk_column));
        }
        let mut vars = Vec::new();
        collect_vars(ops, &mut vars);
        declare.extend(vars.iter().map(|v| format!("r_{} RECORD;", v)));

        let names_guards = reports_guard(ops);
        if names_guards {
            declare.push("v_guard TEXT;".to_string());
        }
        let raised = if names_guards {
            self.result(
                "'error'",
                "SQLERRM",
                "CASE WHEN v_guard <> '' THEN jsonb_build_object('guard', v_guard) END",
            )
        } else {
            self.result("'error'", "SQLERRM", "NULL")
        };
        let violated = self.result(
            "'error'",
            "coalesce(nullif(v_constraint, ''), 'constraint_violation')",
            "NULL",
        );
        let data = if r.targets_row { "to_jsonb(v_row)" } else { "NULL" };
        let done = self.result("'success'", "NULL", data);

        self.body.line("BEGIN");
        self.body.nest();
        for op in ops {
            self.op(op)?;
        }
        self.body.unnest();
        self.body.line("EXCEPTION");
        self.body.nest();
        self.body.line(format!("WHEN SQLSTATE '{}' THEN", RAISED));
        self.body.nest();
        if names_guards {
            self.body.line("GET STACKED DIAGNOSTICS v_guard = PG_EXCEPTION_HINT;");
        }
        self.body.line(format!("RETURN {};", raised));
        self.body.unnest();
        self.body.line("WHEN integrity_constraint_violation THEN");
        self.body.nest();
        self.body.line("GET STACKED DIAGNOSTICS v_constraint = CONSTRAINT_NAME;");
        self.body.line(format!("RETURN {};", violated));
        self.body.unnest();
        self.body.unnest();
        self.body.line("END;");
        self.body.line(format!("RETURN {};", done));
        Ok(declare)
    }

    fn reload_row(&mut self) {
        let table = &self.routine.table;
        self.body.line(format!(
            "SELECT * INTO v_row FROM {} WHERE {} = v_pk;",
            table.table, table.pk_column
        ));
    }

    fn op(&mut self, op: &Op) -> Result<(), EmitError> {
        match op {
            Op::Guard {
                guard,
                condition,
                error,
            } => {
                let condition = self.expr(condition)?;
                self.body.line(format!("IF NOT coalesce({}, FALSE) THEN", condition));
                self.body.nest();
                match guard {
                    // The hint carries the guard name into the error result.
                    Some(guard) => self.body.line(format!(
                        "RAISE EXCEPTION USING ERRCODE = '{}', MESSAGE = {}, HINT = {};",
                        RAISED,
                        quote(error),
                        quote(guard)
                    )),
                    None => self.raise(error),
                }
                self.body.unnest();
                self.body.line("END IF;");
            }
            Op::Update {
                table,
                assignments,
                filter,
            } => {
                let set = assignments
                    .iter()
                    .map(|(c, e)| Ok(format!("{} = {}", c, self.expr(e)?)))
                    .collect::<Result<Vec<_>, EmitError>>()?;
                match filter {
                    RowFilter::Current => {
                        self.body.line(format!(
                            "UPDATE {} SET {} WHERE {} = v_pk;",
                            table.table,
                            set.join(", "),
                            table.pk_column
                        ));
                        self.reload_row();
                    }
                    RowFilter::Where(filter) => {
                        let filter = self.expr(filter)?;
                        self.body.line(format!(
                            "UPDATE {} SET {} WHERE {}{};",
                            table.table,
                            set.join(", "),
                            filter,
                            live(table)
                        ));
                    }
                }
            }
            Op::Insert { table, values } => {
                let columns: Vec<&str> = values.iter().map(|(c, _)| c.as_str()).collect();
                let exprs = values
                    .iter()
                    .map(|(_, e)| self.expr(e))
                    .collect::<Result<Vec<_>, EmitError>>()?;
                self.body.line(format!(
                    "INSERT INTO {} ({}) VALUES ({});",
                    table.table,
                    columns.join(", "),
                    exprs.join(", ")
                ));
            }
            Op::Delete { table, filter } => {
                let filter = match filter {
                    RowFilter::Current => format!("{} = v_pk", table.pk_column),
                    RowFilter::Where(filter) => self.expr(filter)?,
                };
                if table.soft_delete {
                    self.body.line(format!(
                        "UPDATE {} SET {} = now() WHERE {}{};",
                        table.table,
                        DELETED_AT,
                        filter,
                        live(table)
                    ));
                } else {
                    self.body.line(format!("DELETE FROM {} WHERE {};", table.table, filter));
                }
            }
            Op::Call {
                routine,
                row,
                args,
                mutation,
                ..
            } => {
                let mut named = Vec::new();
                if let Some(row) = row {
                    named.push(format!("p_id => {}", self.expr(row)?));
                }
                for (name, value) in args {
                    named.push(format!("p_{} => {}", name, self.expr(value)?));
                }
                let call = format!("{}({})", routine, named.join(", "));
                if *mutation {
                    self.body.line(format!("v_result := {};", call));
                    self.body.line("IF v_result.status <> 'success' THEN");
                    self.body.nest();
                    self.body.line(format!(
                        "RAISE EXCEPTION USING ERRCODE = '{}', MESSAGE = v_result.message, HINT = coalesce(v_result.data->>'guard', '');",
                        RAISED
                    ));
                    self.body.unnest();
                    self.body.line("END IF;");
                } else {
                    self.body.line(format!("PERFORM {};", call));
                }
                if self.routine.targets_row {
                    self.reload_row();
                }
            }
            Op::Notify { event, payload } => {
                let mut pairs = Vec::new();
                for (key, value) in payload {
                    pairs.push(quote(key));
                    pairs.push(self.expr(value)?);
                }
                self.body.line(format!(
                    "PERFORM pg_notify({}, jsonb_build_object({})::text);",
                    quote(event),
                    pairs.join(", ")
                ));
            }
            Op::ForEach {
                var,
                source,
                link_column,
                body,
            } => {
                self.body.line(format!(
                    "FOR r_{} IN SELECT * FROM {} WHERE {} = v_pk{} ORDER BY {} LOOP",
                    var,
                    source.table,
                    link_column,
                    live(source),
                    source.pk_column
                ));
                self.body.nest();
                for op in body {
                    self.op(op)?;
                }
                self.body.unnest();
                self.body.line("END LOOP;");
            }
            Op::Branch {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.expr(condition)?;
                self.body.line(format!("IF coalesce({}, FALSE) THEN", condition));
                self.body.nest();
                for op in then {
                    self.op(op)?;
                }
                self.body.unnest();
                if !otherwise.is_empty() {
                    self.body.line("ELSE");
                    self.body.nest();
                    for op in otherwise {
                        self.op(op)?;
                    }
                    self.body.unnest();
                }
                self.body.line("END IF;");
            }
            Op::Refresh { view } => {
                self.body.line(format!("REFRESH MATERIALIZED VIEW {};", view));
            }
        }
        Ok(())
    }

    fn expr(&self, e: &Expr) -> Result<String, EmitError> {
        Ok(match e {
            Expr::Literal(lit) => literal(lit),
            Expr::Path(path) => {
                return Err(self.unrenderable(format!("unresolved name '{}'", path.join("."))))
            }
            Expr::Input(name) => format!("p_{}", name),
            Expr::Column { scope, column } => match scope {
                Scope::Row => format!("v_row.{}", column),
                Scope::Target => column.clone(),
                Scope::Var(var) => format!("r_{}.{}", var, column),
            },
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => format!("NOT {}", self.expr(expr)?),
                UnaryOp::Neg => format!("-{}", self.expr(expr)?),
            },
            Expr::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(lhs)?, op.symbol(), self.expr(rhs)?)
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let items = list
                    .iter()
                    .map(|i| self.expr(i))
                    .collect::<Result<Vec<_>, EmitError>>()?;
                format!(
                    "({} {}IN ({}))",
                    self.expr(expr)?,
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            Expr::IsNull { expr, negated } => format!(
                "({} IS {}NULL)",
                self.expr(expr)?,
                if *negated { "NOT " } else { "" }
            ),
            Expr::Call { func, args } => match func {
                Func::Now => "now()".to_string(),
                Func::Today => "current_date".to_string(),
                Func::Coalesce | Func::Lower | Func::Upper => {
                    let args = args
                        .iter()
                        .map(|a| self.expr(a))
                        .collect::<Result<Vec<_>, EmitError>>()?;
                    format!("{}({})", func.name(), args.join(", "))
                }
            },
            Expr::KeyOf { table, id } => format!(
                "(SELECT {} FROM {} WHERE id = {})",
                table.pk_column,
                table.table,
                self.expr(id)?
            ),
        })
    }

    fn resolve_template(&mut self, walk: &ChainWalk) {
        let table = &self.routine.table;
        let pairs: Vec<String> = walk
            .fields
            .iter()
            .map(|f| format!("{}, v_row.{}", quote(f), f))
            .collect();
        self.body.line(format!(
            "SELECT {} INTO v_pk FROM {} WHERE id = p_id{};",
            table.pk_column,
            table.table,
            live(table)
        ));
        self.body.line("IF v_pk IS NULL THEN");
        self.body.nest();
        self.raise(NOT_FOUND);
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("WHILE v_pk IS NOT NULL LOOP");
        self.body.nest();
        self.chain_checks(walk);
        self.body.line(format!(
            "SELECT * INTO v_row FROM {} WHERE {} = v_pk;",
            table.table, table.pk_column
        ));
        self.body.line(format!(
            "v_result := jsonb_strip_nulls(jsonb_build_object({})) || v_result;",
            pairs.join(", ")
        ));
        self.body.line("v_seen := v_seen || v_pk;");
        self.body.line("v_depth := v_depth + 1;");
        self.body.line(format!("v_pk := v_row.{};", walk.link_column));
        self.body.unnest();
        self.body.line("END LOOP;");
        self.body.line("RETURN v_result;");
    }

    /// Revisit and depth checks for the template in `v_pk` at hop `v_depth`.
    fn chain_checks(&mut self, walk: &ChainWalk) {
        self.body.line("IF v_pk = ANY(v_seen) THEN");
        self.body.nest();
        self.raise(CYCLIC_TEMPLATE);
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line(format!("IF v_depth > {} THEN", walk.max_depth));
        self.body.nest();
        self.raise(TEMPLATE_DEPTH_EXCEEDED);
        self.body.unnest();
        self.body.line("END IF;");
    }

    fn validate_chain(&mut self, link: &str, max_depth: usize, cyclic: &str, too_deep: &str) {
        let table = &self.routine.table;
        self.body.line("WHILE v_next IS NOT NULL LOOP");
        self.body.nest();
        self.body.line("IF v_next = ANY(v_seen) THEN");
        self.body.nest();
        self.raise(cyclic);
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("v_depth := v_depth + 1;");
        self.body.line(format!("IF v_depth > {} THEN", max_depth));
        self.body.nest();
        self.raise(too_deep);
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("v_seen := v_seen || v_next;");
        self.body.line(format!(
            "SELECT {} INTO v_next FROM {} WHERE {} = v_next;",
            link, table.table, table.pk_column
        ));
        self.body.unnest();
        self.body.line("END LOOP;");
        self.body.line("RETURN NEW;");
    }

    /// Trigger on the link table: walk the edges from the new target and
    /// fail when they lead back to the new source.
    fn validate_edges(&mut self, walk: &DependencyWalk, edges: &TableRef, from: &str, to: &str) {
        self.body.line(format!("IF NEW.{} IS NULL OR NEW.{} IS NULL THEN", from, to));
        self.body.nest();
        self.body.line("RETURN NEW;");
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("WITH RECURSIVE walk(node, depth, path) AS (");
        self.body.nest();
        self.body.line(format!("SELECT NEW.{}, 1, ARRAY[NEW.{}]", to, to));
        self.body.line("UNION ALL");
        self.body.line(format!("SELECT e.{}, w.depth + 1, w.path || e.{}", to, to));
        self.body.line(format!("FROM walk w JOIN {} e ON e.{} = w.node", edges.table, from));
        self.body.line(format!(
            "WHERE e.{} <> NEW.{}{} AND e.{} <> ALL(w.path) AND w.node <> NEW.{} AND w.depth <= {}",
            edges.pk_column,
            edges.pk_column,
            live_as(edges, "e"),
            to,
            from,
            walk.max_depth
        ));
        self.body.unnest();
        self.body.line(")");
        self.body.line(format!(
            "SELECT bool_or(node = NEW.{}), bool_or(depth > {}) INTO v_cyclic, v_too_deep FROM walk;",
            from, walk.max_depth
        ));
        self.body.line("IF v_cyclic THEN");
        self.body.nest();
        self.raise(CYCLIC_DEPENDENCY);
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("IF v_too_deep THEN");
        self.body.nest();
        self.raise(DEPENDENCY_DEPTH_EXCEEDED);
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("RETURN NEW;");
    }

    /// Start row of a closure into `v_pk`, or `not_found`.
    fn closure_start(&mut self, extra: Option<&str>) {
        let table = &self.routine.table;
        let (columns, into) = match extra {
            Some(link) => (format!("{}, {}", table.pk_column, link), "v_pk, v_next"),
            None => (table.pk_column.clone(), "v_pk"),
        };
        self.body.line(format!(
            "SELECT {} INTO {} FROM {} WHERE id = p_id{};",
            columns,
            into,
            table.table,
            live(table)
        ));
        self.body.line("IF NOT FOUND THEN");
        self.body.nest();
        self.raise(NOT_FOUND);
        self.body.unnest();
        self.body.line("END IF;");
    }

    fn closure_result(&mut self) {
        let table = &self.routine.table;
        self.body.line(format!(
            "RETURN QUERY SELECT id FROM {} WHERE {} = ANY(v_seen) AND {} <> v_pk ORDER BY id;",
            table.table, table.pk_column, table.pk_column
        ));
    }

    fn dependency_closure(&mut self, walk: &DependencyWalk, link: &str) {
        let table = &self.routine.table;
        self.closure_start(Some(link));
        self.body.line("v_seen := ARRAY[v_pk];");
        self.body.line("WHILE v_next IS NOT NULL LOOP");
        self.body.nest();
        self.body.line("IF v_next = ANY(v_seen) THEN");
        self.body.nest();
        match walk.policy {
            CyclePolicy::Reject => self.raise(CYCLIC_DEPENDENCY),
            CyclePolicy::Allow => self.body.line("EXIT;"),
        }
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("v_depth := v_depth + 1;");
        self.body.line(format!("IF v_depth > {} THEN", walk.max_depth));
        self.body.nest();
        self.raise(DEPENDENCY_DEPTH_EXCEEDED);
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("v_seen := v_seen || v_next;");
        self.body.line(format!(
            "SELECT {} INTO v_next FROM {} WHERE {} = v_next;",
            link, table.table, table.pk_column
        ));
        self.body.unnest();
        self.body.line("END LOOP;");
        self.closure_result();
    }

    /// Every simple path out of the start row through the link table. A
    /// path that revisits one of its own nodes is cyclic and not extended.
    fn edge_closure(&mut self, walk: &DependencyWalk, edges: &TableRef, from: &str, to: &str) {
        self.closure_start(None);
        self.body.line("FOR v_node, v_depth, v_cyclic IN");
        self.body.nest();
        self.body.line("WITH RECURSIVE walk(node, depth, path, cyclic) AS (");
        self.body.nest();
        self.body.line(format!("SELECT e.{}, 1, ARRAY[v_pk, e.{}], e.{} = v_pk", to, to, to));
        self.body.line(format!("FROM {} e WHERE e.{} = v_pk{}", edges.table, from, live_as(edges, "e")));
        self.body.line("UNION ALL");
        self.body.line(format!(
            "SELECT e.{}, w.depth + 1, w.path || e.{}, e.{} = ANY(w.path)",
            to, to, to
        ));
        self.body.line(format!("FROM walk w JOIN {} e ON e.{} = w.node{}", edges.table, from, live_as(edges, "e")));
        self.body.line(format!("WHERE NOT w.cyclic AND w.depth <= {}", walk.max_depth));
        self.body.unnest();
        self.body.line(")");
        self.body.line("SELECT node, depth, cyclic FROM walk");
        self.body.unnest();
        self.body.line("LOOP");
        self.body.nest();
        self.body.line("IF v_cyclic THEN");
        self.body.nest();
        match walk.policy {
            CyclePolicy::Reject => self.raise(CYCLIC_DEPENDENCY),
            CyclePolicy::Allow => self.body.line("CONTINUE;"),
        }
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line(format!("IF v_depth > {} THEN", walk.max_depth));
        self.body.nest();
        self.raise(DEPENDENCY_DEPTH_EXCEEDED);
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line("v_seen := v_seen || v_node;");
        self.body.unnest();
        self.body.line("END LOOP;");
        self.closure_result();
    }

    fn flag_overlap(&mut self, range: &RangeSpec) {
        let table = &self.routine.table;
        self.body.line(format!("NEW.{} := EXISTS (", range.flag_column));
        self.body.nest();
        self.body.line(format!("SELECT 1 FROM {}", table.table));
        self.body.line(format!("WHERE {} <> NEW.{}", table.pk_column, table.pk_column));
        for column in &range.scope_columns {
            self.body.line(format!("AND {} = NEW.{}", column, column));
        }
        self.body.line(format!(
            "AND {} && {}(NEW.{}, NEW.{}, {})",
            range.range_column,
            range.range_type,
            range.start,
            range.end,
            quote(&range.bounds)
        ));
        if table.soft_delete {
            self.body.line("AND deleted_at IS NULL");
        }
        self.body.unnest();
        self.body.line(");");
        self.body.line("RETURN NEW;");
    }

    fn upsert_version(&mut self, spec: &VersionSpec) {
        let r = self.routine;
        let table = &r.table;
        let key: Vec<String> = spec
            .natural_key
            .iter()
            .map(|k| format!("{} = p_{}", k, k))
            .collect();
        self.body.line(format!(
            "SELECT * INTO v_current FROM {} WHERE {} AND {}{} FOR UPDATE;",
            table.table,
            key.join(" AND "),
            spec.is_current,
            live(table)
        ));
        self.body.line("IF FOUND THEN");
        self.body.nest();
        let unchanged: Vec<String> = spec
            .tracked
            .iter()
            .map(|t| format!("(p_{t} IS NULL OR p_{t} IS NOT DISTINCT FROM v_current.{t})", t = t))
            .collect();
        self.body.line(format!("IF {} THEN", unchanged.join(" AND ")));
        self.body.nest();
        self.body.line(format!(
            "RETURN ROW('success', 'unchanged', v_current.id, NULL)::{};",
            self.result_type
        ));
        self.body.unnest();
        self.body.line("END IF;");
        self.body.line(format!(
            "UPDATE {} SET {} = now(), {} = FALSE WHERE {} = v_current.{};",
            table.table, spec.effective_to, spec.is_current, table.pk_column, table.pk_column
        ));
        self.body.unnest();
        self.body.line("END IF;");

        let mut columns: Vec<String> = spec.natural_key.clone();
        let mut values: Vec<String> = spec.natural_key.iter().map(|k| format!("p_{}", k)).collect();
        for t in &spec.tracked {
            columns.push(t.clone());
            values.push(format!("coalesce(p_{t}, v_current.{t})", t = t));
        }
        columns.push(spec.effective_from.clone());
        values.push("now()".to_string());
        columns.push(spec.is_current.clone());
        values.push("TRUE".to_string());
        self.body.line(format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING id INTO v_id;",
            table.table,
            columns.join(", "),
            values.join(", ")
        ));
        self.body.line(format!(
            "RETURN ROW('success', CASE WHEN v_current.id IS NULL THEN 'inserted' ELSE 'superseded' END, v_id, NULL)::{};",
            self.result_type
        ));
    }

    fn identity_lookup(&self, direction: LookupDirection) -> String {
        let r = self.routine;
        let table = &r.table;
        let (returns, select, argument) = match direction {
            LookupDirection::PkFromId => ("INTEGER", table.pk_column.as_str(), "id"),
            LookupDirection::IdFromPk => ("UUID", "id", table.pk_column.as_str()),
        };
        let param_name = r
            .params
            .first()
            .map(Param::sql_name)
            .unwrap_or_else(|| "p_id".to_string());
        format!(
            "CREATE OR REPLACE FUNCTION {}({}) RETURNS {}\nLANGUAGE sql STABLE\nAS $$\n    SELECT {} FROM {} WHERE {} = {}\n$$;\n",
            r.qualified_name(),
            r.params.iter().map(param).collect::<Vec<_>>().join(", "),
            returns,
            select,
            table.table,
            argument,
            param_name
        )
    }
}

fn param(p: &Param) -> String {
    if p.required {
        format!("{} {}", p.sql_name(), p.target)
    } else {
        format!("{} {} DEFAULT NULL", p.sql_name(), p.target)
    }
}

fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Bool(true) => "TRUE".to_string(),
        Literal::Bool(false) => "FALSE".to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Decimal(d) => d.clone(),
        Literal::Text(s) => quote(s),
    }
}

/// Whether a raise in `ops` can name a failed guard.
fn reports_guard(ops: &[Op]) -> bool {
    let mut found = false;
    crate::domain::actions::walk_ops(ops, &mut |op| {
        if matches!(op, Op::Guard { guard: Some(_), .. } | Op::Call { mutation: true, .. }) {
            found = true;
        }
    });
    found
}

fn collect_vars(ops: &[Op], out: &mut Vec<String>) {
    crate::domain::actions::walk_ops(ops, &mut |op| {
        if let Op::ForEach { var, .. } = op {
            if !out.contains(var) {
                out.push(var.clone());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ExclusionElement, IdentifierRule, Origin};
    use crate::domain::types::{PrimitiveKind, TargetType};

    fn table() -> TableRef {
        TableRef {
            entity: "Order".to_string(),
            table: QualifiedName::new("sales", "tb_order"),
            pk_column: "pk_order".to_string(),
            soft_delete: true,
        }
    }

    fn routine(name: &str, body: RoutineBody) -> Routine {
        Routine {
            name: name.to_string(),
            schema: "sales".to_string(),
            entity: "Order".to_string(),
            table: table(),
            action: Some(name.to_string()),
            description: None,
            kind: RoutineKind::Function,
            targets_row: true,
            params: Vec::new(),
            body,
            events: Vec::new(),
            origin: Origin::Declared,
        }
    }

    fn render(artifact: Artifact) -> String {
        PostgresEmitter::new().render(&artifact).unwrap().unwrap()
    }

    fn routine_sql(routine: Routine) -> String {
        render(Artifact::new(routine.qualified_name(), ArtifactBody::Routine(routine)))
    }

    #[test]
    fn emitter_targets_postgres() {
        assert_eq!(PostgresEmitter::default().target(), Target::Postgres);
        assert!(PostgresEmitter::new().header("crm.yaml").contains("crm.yaml"));
    }

    #[test]
    fn result_type_creates_prelude() {
        let sql = render(Artifact::new(
            QualifiedName::new("app", "mutation_result"),
            ArtifactBody::ResultType,
        ));
        assert!(sql.contains("CREATE EXTENSION IF NOT EXISTS btree_gist;"));
        assert!(sql.contains("CREATE SCHEMA IF NOT EXISTS app;"));
        assert!(sql.contains("CREATE TYPE app.mutation_result AS ("));
    }

    #[test]
    fn columns_render_roles() {
        let pk = Field::new("pk_order", "integer", PrimitiveKind::Integer, TargetType::new("INTEGER"))
            .required()
            .with_role(FieldRole::SurrogateKey);
        assert_eq!(
            column(&pk),
            "pk_order INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
        );

        let id = Field::new("id", "uuid", PrimitiveKind::Uuid, TargetType::new("UUID"))
            .required()
            .unique()
            .with_default(ColumnDefault::RandomUuid);
        assert_eq!(column(&id), "id UUID NOT NULL DEFAULT gen_random_uuid() UNIQUE");

        let status = Field::new("status", "enum", PrimitiveKind::Text, TargetType::new("TEXT"))
            .with_default(ColumnDefault::Literal(Value::String("it's".into())));
        assert_eq!(column(&status), "status TEXT DEFAULT 'it''s'");
    }

    #[test]
    fn constraints_render_rules() {
        let table = QualifiedName::new("sales", "tb_order");
        let between = Constraint {
            name: "chk_total".into(),
            rule: ConstraintRule::Check(CheckRule::Between {
                column: "total".into(),
                min: Some(0.0),
                max: None,
            }),
            origin: Origin::Declared,
        };
        assert_eq!(
            constraint_sql(&table, &between),
            "ALTER TABLE sales.tb_order ADD CONSTRAINT chk_total CHECK (total >= 0);\n"
        );

        let ordered = CheckRule::Ordered {
            start: "starts_on".into(),
            end: "ends_on".into(),
            allow_equal: false,
        };
        assert_eq!(check(&ordered), "ends_on IS NULL OR starts_on < ends_on");

        let exclusion = Constraint {
            name: "excl_booking".into(),
            rule: ConstraintRule::Exclusion {
                elements: vec![
                    ExclusionElement::new("fk_room", "="),
                    ExclusionElement::new("span", "&&"),
                ],
                predicate: Some(RowPredicate::IsNull("deleted_at".into())),
            },
            origin: Origin::Declared,
        };
        assert!(constraint_sql(&table, &exclusion)
            .contains("EXCLUDE USING gist (fk_room WITH =, span WITH &&) WHERE (deleted_at IS NULL)"));
    }

    #[test]
    fn guard_raises_its_error_code() {
        let op = Op::Guard {
            guard: None,
            condition: Expr::Binary {
                op: crate::domain::actions::BinaryOp::Eq,
                lhs: Box::new(Expr::column(Scope::Row, "status")),
                rhs: Box::new(Expr::text("draft")),
            },
            error: "not_draft".to_string(),
        };
        let sql = routine_sql(routine("send", RoutineBody::Steps(vec![op])));
        assert!(sql.contains("IF NOT coalesce((v_row.status = 'draft'), FALSE) THEN"));
        assert!(sql.contains("MESSAGE = 'not_draft'"));
        assert!(sql.contains("SELECT * INTO v_row FROM sales.tb_order WHERE id = p_id AND deleted_at IS NULL;"));
        assert!(sql.contains("WHEN SQLSTATE 'P0001' THEN"));
    }

    #[test]
    fn named_guard_reports_its_name() {
        let op = Op::Guard {
            guard: Some("budget_available".to_string()),
            condition: Expr::column(Scope::Row, "approved"),
            error: "over_budget".to_string(),
        };
        let sql = routine_sql(routine("approve", RoutineBody::Steps(vec![op])));
        assert!(sql.contains("MESSAGE = 'over_budget', HINT = 'budget_available';"));
        assert!(sql.contains("GET STACKED DIAGNOSTICS v_guard = PG_EXCEPTION_HINT;"));
        assert!(sql.contains("CASE WHEN v_guard <> '' THEN jsonb_build_object('guard', v_guard) END"));
    }

    #[test]
    fn own_row_update_reloads_the_row() {
        let op = Op::Update {
            table: table(),
            assignments: vec![("status".into(), Expr::text("sent"))],
            filter: RowFilter::Current,
        };
        let sql = routine_sql(routine("send", RoutineBody::Steps(vec![op])));
        let update = sql.find("UPDATE sales.tb_order SET status = 'sent' WHERE pk_order = v_pk;").unwrap();
        let reload = sql.rfind("SELECT * INTO v_row FROM sales.tb_order WHERE pk_order = v_pk;").unwrap();
        assert!(update < reload);
    }

    #[test]
    fn unresolved_paths_are_unrenderable() {
        let op = Op::Guard {
            guard: None,
            condition: Expr::Path(vec!["ghost".into()]),
            error: "x".into(),
        };
        let r = routine("send", RoutineBody::Steps(vec![op]));
        let artifact = Artifact::new(r.qualified_name(), ArtifactBody::Routine(r));
        let err = PostgresEmitter::new().render(&artifact).unwrap_err();
        assert_eq!(err.code(), "unrenderable-artifact");
    }

    #[test]
    fn trigger_routines_create_triggers() {
        let mut r = routine(
            "flag_booking_starts_on_ends_on_overlap",
            RoutineBody::FlagOverlap(RangeSpec {
                scope_columns: vec!["fk_room".into()],
                start: "starts_on".into(),
                end: "ends_on".into(),
                range_column: "starts_on_ends_on_range".into(),
                range_type: "daterange".into(),
                bounds: "[)".into(),
                flag_column: "starts_on_ends_on_overlap".into(),
            }),
        );
        r.kind = RoutineKind::Trigger;
        r.targets_row = false;
        let sql = routine_sql(r);
        assert!(sql.contains("RETURNS trigger"));
        assert!(sql.contains("AND starts_on_ends_on_range && daterange(NEW.starts_on, NEW.ends_on, '[)')"));
        assert!(sql.contains("BEFORE INSERT OR UPDATE ON sales.tb_order"));
        assert!(sql.contains("FOR EACH ROW EXECUTE FUNCTION sales.flag_booking_starts_on_ends_on_overlap();"));
    }

    fn requirement_edges() -> DependencyWalk {
        DependencyWalk {
            link: DependencyLink::Edges {
                table: TableRef {
                    entity: "OrderLink".to_string(),
                    table: QualifiedName::new("sales", "tb_order_link"),
                    pk_column: "pk_order_link".to_string(),
                    soft_delete: true,
                },
                from_column: "fk_order".to_string(),
                to_column: "fk_requires".to_string(),
            },
            max_depth: 5,
            policy: CyclePolicy::Reject,
        }
    }

    #[test]
    fn edge_closure_walks_every_path() {
        let sql = routine_sql(routine("dependencies_of_order", RoutineBody::DependencyClosure(requirement_edges())));
        assert!(sql.contains("RETURNS SETOF UUID"));
        assert!(sql.contains("WITH RECURSIVE walk(node, depth, path, cyclic) AS ("));
        assert!(sql.contains("FROM sales.tb_order_link e WHERE e.fk_order = v_pk AND e.deleted_at IS NULL"));
        assert!(sql.contains("FROM walk w JOIN sales.tb_order_link e ON e.fk_order = w.node AND e.deleted_at IS NULL"));
        assert!(sql.contains("MESSAGE = 'cyclic_dependency'"));
        assert!(sql.contains("RETURN QUERY SELECT id FROM sales.tb_order WHERE pk_order = ANY(v_seen)"));
    }

    #[test]
    fn edge_validator_fires_on_the_link_table() {
        let walk = requirement_edges();
        let mut r = routine("validate_dependencies_order", RoutineBody::ValidateDependencies(walk.clone()));
        r.kind = RoutineKind::Trigger;
        r.targets_row = false;
        r.table = walk.edge_table().cloned().unwrap();
        let sql = routine_sql(r);
        assert!(sql.contains("SELECT NEW.fk_requires, 1, ARRAY[NEW.fk_requires]"));
        assert!(sql.contains("SELECT bool_or(node = NEW.fk_order), bool_or(depth > 5) INTO v_cyclic, v_too_deep FROM walk;"));
        assert!(sql.contains("BEFORE INSERT OR UPDATE ON sales.tb_order_link"));
    }

    #[test]
    fn identifier_column_is_maintained_by_trigger() {
        let name = QualifiedName::new("crm", "tb_lead");
        let pk = Field::new("pk_lead", "integer", PrimitiveKind::Integer, TargetType::new("INTEGER"))
            .required()
            .with_role(FieldRole::SurrogateKey);
        let mut rule = IdentifierRule::new("lead");
        let identifier = |rule: IdentifierRule| {
            Field::new("identifier", "text", PrimitiveKind::Text, TargetType::new("TEXT"))
                .required()
                .unique()
                .with_role(FieldRole::Identifier(rule))
        };
        let spec = |fields: Vec<Field>| TableSpec {
            entity: "Lead".to_string(),
            description: None,
            fields,
        };

        let sql = identifier_trigger(&name, &spec(vec![pk.clone(), identifier(rule.clone())])).unwrap();
        assert!(sql.contains("NEW.identifier := 'lead-' || NEW.pk_lead;"));
        assert!(sql.contains("CREATE TRIGGER trg_set_tb_lead_identifier"));
        assert!(sql.contains("FOR EACH ROW EXECUTE FUNCTION crm.set_tb_lead_identifier();"));

        rule.components = vec!["email".to_string()];
        let sql = identifier_trigger(&name, &spec(vec![pk, identifier(rule)])).unwrap();
        assert!(sql.contains("coalesce(nullif(concat_ws('-', nullif(trim(both '-' from lower(regexp_replace(NEW.email::text"));
        assert_eq!(column(&identifier(IdentifierRule::new("x"))), "identifier TEXT NOT NULL UNIQUE");
    }

    #[test]
    fn optional_parameters_default_to_null() {
        let p = Param::new("note", "text", PrimitiveKind::Text, TargetType::new("TEXT")).optional();
        assert_eq!(param(&p), "p_note TEXT DEFAULT NULL");
        let mut r = routine("annotate", RoutineBody::Steps(Vec::new()));
        r.params = vec![p];
        assert_eq!(signature_types(&r), "UUID, TEXT");
    }
}
