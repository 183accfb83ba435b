//! Action Compiler
//!
//! Lowers each declared action into a [`Routine`]. Names in expressions are
//! bound to columns of the action's row, of the row a step targets, or of a
//! `foreach` variable, and every operand is type checked against the
//! column or parameter it flows into.
//!
//! Compilation only reads the model, so routines for different entities can
//! be compiled in any order; the pipeline attaches them afterwards.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use super::expr::{BinaryOp, Expr, Func, Literal, Scope, UnaryOp};
use super::ir::{EventDescriptor, Op, Param, Routine, RoutineBody, RoutineKind, RowFilter, TableRef};
use crate::domain::entities::{Action, Cardinality, Entity, Field, Step, UPDATED_AT};
use crate::domain::services::EntityModel;
use crate::domain::types::{PrimitiveKind, TargetType, TypeError, TypeRegistry};
use crate::domain::value_objects::{ModelSettings, QualifiedName, SourceLocation};

pub const CALLER_ID: &str = "caller_id";
const VALIDATION_FAILED: &str = "validation_failed";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileErrorKind {
    #[error("unknown field '{0}'")]
    UnresolvedField(String),

    #[error("unknown guard '{0}'")]
    UnresolvedGuard(String),

    #[error("unknown entity '{0}'")]
    UnresolvedEntity(String),

    #[error("unknown action or routine '{0}'")]
    UnresolvedCall(String),

    #[error("unknown artifact '{0}'")]
    UnresolvedArtifact(String),

    #[error("call to '{target}': {reason}")]
    ParameterMismatch { target: String, reason: String },

    #[error("{context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("invalid literal for '{field}': {reason}")]
    InvalidLiteral { field: String, reason: String },

    #[error("'{0}' cannot be assigned")]
    ReadOnlyField(String),

    #[error("insert into '{entity}' has no value for required field '{field}'")]
    MissingValue { entity: String, field: String },

    #[error("cannot parse '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("{0}")]
    InvalidStep(String),

    #[error("input '{name}': {reason}")]
    InvalidInput { name: String, reason: String },
}

impl CompileErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            CompileErrorKind::UnresolvedField(_) => "unresolved-field",
            CompileErrorKind::UnresolvedGuard(_) => "unresolved-guard",
            CompileErrorKind::UnresolvedEntity(_) => "unresolved-entity",
            CompileErrorKind::UnresolvedCall(_) => "unresolved-call",
            CompileErrorKind::UnresolvedArtifact(_) => "unresolved-artifact",
            CompileErrorKind::ParameterMismatch { .. } => "parameter-mismatch",
            CompileErrorKind::TypeMismatch { .. } => "type-mismatch",
            CompileErrorKind::InvalidLiteral { .. } => "invalid-literal",
            CompileErrorKind::ReadOnlyField(_) => "read-only-field",
            CompileErrorKind::MissingValue { .. } => "missing-value",
            CompileErrorKind::InvalidExpression { .. } => "invalid-expression",
            CompileErrorKind::InvalidStep(_) => "invalid-step",
            CompileErrorKind::InvalidInput { .. } => "invalid-input",
        }
    }
}

/// An action that failed to compile.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub entity: String,
    pub action: String,
    pub location: Option<SourceLocation>,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.entity, self.action, self.kind)
    }
}

impl std::error::Error for CompileError {}

/// What a `call` step needs to know about its callee.
struct Signature {
    routine: QualifiedName,
    targets_row: bool,
    mutation: bool,
    /// Compiled action: forward the caller id.
    action: bool,
    params: Vec<Param>,
}

pub struct ActionCompiler<'a> {
    model: &'a EntityModel,
    registry: &'a TypeRegistry,
}

impl<'a> ActionCompiler<'a> {
    pub fn new(model: &'a EntityModel, registry: &'a TypeRegistry) -> Self {
        Self { model, registry }
    }

    fn settings(&self) -> &'a ModelSettings {
        self.model.settings()
    }

    /// Every action of every entity, entities in lexical order.
    pub fn compile_all(&self) -> Result<Vec<Routine>, CompileError> {
        let mut routines = Vec::new();
        for entity in self.model.entities() {
            for action in entity.actions() {
                routines.push(self.compile(entity, action)?);
            }
        }
        Ok(routines)
    }

    pub fn compile(&self, entity: &'a Entity, action: &'a Action) -> Result<Routine, CompileError> {
        let err = |kind| CompileError {
            entity: entity.name().to_string(),
            action: action.name.clone(),
            location: action.location.clone(),
            kind,
        };

        let mut params = self.params(action).map_err(err)?;
        params.push(caller_param());

        let mut lowering = Lowering {
            compiler: self,
            entity,
            action,
            params: &params,
            vars: Vec::new(),
            events: Vec::new(),
        };
        let ops = lowering.lower(&action.steps).map_err(err)?;
        let events = lowering.events;

        tracing::debug!(
            entity = entity.name(),
            action = action.name.as_str(),
            ops = ops.len(),
            "compiled action"
        );

        Ok(Routine {
            name: action.name.clone(),
            schema: entity.schema().to_string(),
            entity: entity.name().to_string(),
            table: TableRef::of(entity, self.settings()),
            action: Some(action.name.clone()),
            description: action.description.clone(),
            kind: RoutineKind::Function,
            targets_row: targets_row(self.model, entity, action),
            params,
            body: RoutineBody::Steps(ops),
            events,
            origin: action.origin.clone(),
        })
    }

    /// Declared inputs as parameters, required first, the caller id excluded.
    fn params(&self, action: &Action) -> Result<Vec<Param>, CompileErrorKind> {
        let mut params: Vec<Param> = Vec::with_capacity(action.inputs.len());
        for input in &action.inputs {
            let invalid = |reason: &str| CompileErrorKind::InvalidInput {
                name: input.name.clone(),
                reason: reason.to_string(),
            };
            if input.name == "id" || input.name == CALLER_ID {
                return Err(invalid("the name is reserved"));
            }
            if params.iter().any(|p| p.name == input.name) {
                return Err(invalid("declared more than once"));
            }
            let ty = self
                .registry
                .resolve(&input.type_name)
                .map_err(|e| invalid(&e.to_string()))?;
            let param = Param::new(&input.name, &input.type_name, ty.kind(), ty.target());
            params.push(if input.required { param } else { param.optional() });
        }
        // Optional parameters carry defaults, so they must trail.
        params.sort_by_key(|p| !p.required);
        Ok(params)
    }

    /// Callable `name` on `entity`: an action or a generated function.
    fn signature(&self, entity: &Entity, name: &str) -> Result<Option<Signature>, CompileErrorKind> {
        if let Some(action) = entity.action(name) {
            return Ok(Some(Signature {
                routine: entity.qualified(name),
                targets_row: targets_row(self.model, entity, action),
                mutation: true,
                action: true,
                params: self.params(action)?,
            }));
        }
        Ok(entity
            .routine(name)
            .filter(|r| r.kind == RoutineKind::Function)
            .map(|r| Signature {
                routine: r.qualified_name(),
                targets_row: r.targets_row,
                mutation: r.returns_mutation_result(),
                action: false,
                params: r.params.clone(),
            }))
    }
}

fn caller_param() -> Param {
    let kind = PrimitiveKind::Uuid;
    let target = kind.default_target().unwrap_or_else(|| TargetType::new("UUID"));
    Param::new(CALLER_ID, "uuid", kind, target).optional()
}

/// Where unqualified names resolve.
#[derive(Clone, Copy)]
enum Frame<'a> {
    Row,
    Target(&'a Entity),
}

struct Lowering<'c, 'a> {
    compiler: &'c ActionCompiler<'a>,
    entity: &'a Entity,
    action: &'a Action,
    params: &'c [Param],
    vars: Vec<(String, &'a Entity)>,
    events: Vec<EventDescriptor>,
}

type Lowered<T> = Result<T, CompileErrorKind>;

impl<'c, 'a> Lowering<'c, 'a> {
    fn model(&self) -> &'a EntityModel {
        self.compiler.model
    }

    fn settings(&self) -> &'a ModelSettings {
        self.compiler.settings()
    }

    fn lower(&mut self, steps: &'a [Step]) -> Lowered<Vec<Op>> {
        let mut ops = Vec::with_capacity(steps.len());
        for step in steps {
            self.lower_step(step, &mut ops)?;
        }
        Ok(ops)
    }

    fn lower_step(&mut self, step: &'a Step, ops: &mut Vec<Op>) -> Lowered<()> {
        match step {
            Step::Validate {
                condition,
                guard,
                error,
            } => ops.push(self.validate(condition.as_deref(), guard.as_deref(), error.as_deref())?),

            Step::Update {
                entity,
                set,
                filter,
            } => {
                let target = self.target_entity(entity.as_deref())?;
                if set.is_empty() {
                    return Err(CompileErrorKind::InvalidStep(format!(
                        "update of '{}' sets no fields",
                        target.name()
                    )));
                }
                let (frame, filter) = self.row_filter(target, filter.as_deref(), "update")?;
                let mut assignments = set
                    .iter()
                    .map(|(column, value)| self.assign(target, column, value, frame))
                    .collect::<Lowered<Vec<_>>>()?;
                if self.settings().audit_fields
                    && target.field(UPDATED_AT).is_some()
                    && !assignments.iter().any(|(c, _)| c == UPDATED_AT)
                {
                    assignments.push((UPDATED_AT.to_string(), Expr::now()));
                }
                ops.push(Op::Update {
                    table: TableRef::of(target, self.settings()),
                    assignments,
                    filter,
                });
            }

            Step::Insert { entity, values } => {
                let target = self.target_entity(Some(entity))?;
                let values = values
                    .iter()
                    .map(|(column, value)| self.assign(target, column, value, Frame::Row))
                    .collect::<Lowered<Vec<_>>>()?;
                if let Some(missing) = target
                    .fields()
                    .iter()
                    .find(|f| f.needs_value() && !values.iter().any(|(c, _)| *c == f.name))
                {
                    return Err(CompileErrorKind::MissingValue {
                        entity: target.name().to_string(),
                        field: missing.name.clone(),
                    });
                }
                ops.push(Op::Insert {
                    table: TableRef::of(target, self.settings()),
                    values,
                });
            }

            Step::Delete { entity, filter } => {
                let target = self.target_entity(entity.as_deref())?;
                let (_, filter) = self.row_filter(target, filter.as_deref(), "delete")?;
                ops.push(Op::Delete {
                    table: TableRef::of(target, self.settings()),
                    filter,
                });
            }

            Step::Call { target, args } => ops.push(self.call(target, args)?),

            Step::Notify { event, payload } => {
                let mut values = Vec::with_capacity(payload.len());
                let mut shape = Vec::with_capacity(payload.len());
                for (key, source) in payload {
                    let (expr, kind) = self.typed(source, Frame::Row)?;
                    shape.push((key.clone(), kind));
                    values.push((key.clone(), expr));
                }
                let descriptor = EventDescriptor {
                    name: event.clone(),
                    payload: shape,
                };
                if !self.events.contains(&descriptor) {
                    self.events.push(descriptor);
                }
                ops.push(Op::Notify {
                    event: event.clone(),
                    payload: values,
                });
            }

            Step::Foreach {
                var,
                collection,
                steps,
            } => {
                let relation = self
                    .entity
                    .relation(collection)
                    .filter(|r| r.cardinality == Cardinality::Many)
                    .ok_or_else(|| CompileErrorKind::UnresolvedField(collection.clone()))?;
                if var == "self" || self.vars.iter().any(|(v, _)| v == var) {
                    return Err(CompileErrorKind::InvalidStep(format!(
                        "loop variable '{}' shadows another name",
                        var
                    )));
                }
                let source = self
                    .model()
                    .entity(&relation.target)
                    .ok_or_else(|| CompileErrorKind::UnresolvedEntity(relation.target.clone()))?;
                self.vars.push((var.clone(), source));
                let body = self.lower(steps);
                self.vars.pop();
                ops.push(Op::ForEach {
                    var: var.clone(),
                    source: TableRef::of(source, self.settings()),
                    link_column: relation.column.clone(),
                    body: body?,
                });
            }

            Step::Conditional {
                condition,
                then,
                otherwise,
            } => match self.condition(condition, Frame::Row)? {
                Expr::Literal(Literal::Bool(true)) => ops.extend(self.lower(then)?),
                Expr::Literal(Literal::Bool(false)) => ops.extend(self.lower(otherwise)?),
                condition => ops.push(Op::Branch {
                    condition,
                    then: self.lower(then)?,
                    otherwise: self.lower(otherwise)?,
                }),
            },

            Step::Refresh { artifact } => {
                let view = QualifiedName::parse(artifact, self.entity.schema());
                let known = self
                    .model()
                    .entities()
                    .any(|e| e.views().iter().any(|v| e.qualified(&v.name) == view));
                if !known {
                    return Err(CompileErrorKind::UnresolvedArtifact(artifact.clone()));
                }
                ops.push(Op::Refresh { view });
            }
        }
        Ok(())
    }

    fn validate(
        &self,
        condition: Option<&str>,
        guard: Option<&str>,
        error: Option<&str>,
    ) -> Lowered<Op> {
        match (condition, guard) {
            (Some(condition), None) => Ok(Op::Guard {
                guard: None,
                condition: self.condition(condition, Frame::Row)?,
                error: error.unwrap_or(VALIDATION_FAILED).to_string(),
            }),
            (None, Some(name)) => {
                let guard = self
                    .entity
                    .guard(name)
                    .ok_or_else(|| CompileErrorKind::UnresolvedGuard(name.to_string()))?;
                let error = error
                    .map(str::to_string)
                    .or_else(|| guard.error.clone())
                    .unwrap_or_else(|| guard.name.clone());
                Ok(Op::Guard {
                    guard: Some(guard.name.clone()),
                    condition: self.condition(&guard.condition, Frame::Row)?,
                    error,
                })
            }
            _ => Err(CompileErrorKind::InvalidStep(
                "validate needs exactly one of 'condition' and 'guard'".to_string(),
            )),
        }
    }

    fn target_entity(&self, name: Option<&str>) -> Lowered<&'a Entity> {
        match name {
            None => Ok(self.entity),
            Some(name) => self
                .model()
                .entity(name)
                .ok_or_else(|| CompileErrorKind::UnresolvedEntity(name.to_string())),
        }
    }

    /// The action's own row when no filter is given, otherwise the filter.
    fn row_filter(
        &self,
        target: &'a Entity,
        filter: Option<&str>,
        verb: &str,
    ) -> Lowered<(Frame<'a>, RowFilter)> {
        match filter {
            None if target.name() == self.entity.name() => Ok((Frame::Row, RowFilter::Current)),
            None => Err(CompileErrorKind::InvalidStep(format!(
                "{} of '{}' needs a 'where' clause",
                verb,
                target.name()
            ))),
            Some(filter) => {
                let frame = Frame::Target(target);
                Ok((frame, RowFilter::Where(self.condition(filter, frame)?)))
            }
        }
    }

    fn call(
        &self,
        target: &str,
        args: &'a std::collections::BTreeMap<String, String>,
    ) -> Lowered<Op> {
        let (callee, name) = match target.split_once('.') {
            Some((entity, name)) => (
                self.model()
                    .entity(entity)
                    .ok_or_else(|| CompileErrorKind::UnresolvedCall(target.to_string()))?,
                name,
            ),
            None => (self.entity, target),
        };
        if callee.name() == self.entity.name() && name == self.action.name {
            return Err(CompileErrorKind::InvalidStep(format!(
                "'{}' calls itself",
                self.action.name
            )));
        }
        let signature = self
            .compiler
            .signature(callee, name)?
            .ok_or_else(|| CompileErrorKind::UnresolvedCall(target.to_string()))?;
        let mismatch = |reason: String| CompileErrorKind::ParameterMismatch {
            target: target.to_string(),
            reason,
        };

        let mut row = None;
        let mut bound = Vec::with_capacity(args.len());
        for (key, source) in args {
            let (expr, kind) = self.typed(source, Frame::Row)?;
            if key == "id" {
                if !signature.targets_row {
                    return Err(mismatch("it does not take an 'id'".to_string()));
                }
                if !fits(PrimitiveKind::Uuid, &expr, kind) {
                    return Err(mismatch(format!("'id' must be a uuid, found {}", found(kind))));
                }
                row = Some(expr);
                continue;
            }
            let param = signature
                .params
                .iter()
                .find(|p| p.name == *key && p.name != CALLER_ID)
                .ok_or_else(|| mismatch(format!("unknown parameter '{}'", key)))?;
            if let Some(reason) = self.literal_problem(&param.type_name, &expr) {
                return Err(mismatch(format!("'{}': {}", key, reason)));
            }
            if !fits(param.kind, &expr, kind) {
                return Err(mismatch(format!(
                    "'{}' expects {}, found {}",
                    key,
                    param.kind,
                    found(kind)
                )));
            }
            bound.push((key.clone(), expr));
        }

        if let Some(missing) = signature
            .params
            .iter()
            .find(|p| p.required && !args.contains_key(&p.name))
        {
            return Err(mismatch(format!("missing required parameter '{}'", missing.name)));
        }
        if signature.targets_row && row.is_none() {
            if callee.name() != self.entity.name() {
                return Err(mismatch("it needs an 'id' argument".to_string()));
            }
            row = Some(Expr::Column {
                scope: Scope::Row,
                column: "id".to_string(),
            });
        }
        if signature.action {
            bound.push((CALLER_ID.to_string(), Expr::Input(CALLER_ID.to_string())));
        }

        Ok(Op::Call {
            routine: signature.routine,
            entity: callee.name().to_string(),
            row,
            args: bound,
            mutation: signature.mutation,
        })
    }

    /// `column = value` on `target`, with `value` read in `frame`.
    fn assign(
        &self,
        target: &'a Entity,
        column: &str,
        source: &str,
        frame: Frame<'a>,
    ) -> Lowered<(String, Expr)> {
        let (expr, kind) = self.typed(source, frame)?;

        // A one relation takes either the surrogate key or the external id.
        if let Some(relation) = target
            .relation(column)
            .filter(|r| r.cardinality == Cardinality::One)
        {
            let field = target
                .field(&relation.column)
                .ok_or_else(|| CompileErrorKind::UnresolvedField(relation.column.clone()))?;
            if matches!(expr, Expr::Literal(Literal::Null)) && !relation.nullable {
                return Err(CompileErrorKind::InvalidLiteral {
                    field: column.to_string(),
                    reason: "relation is required".to_string(),
                });
            }
            if kind.is_some() && fits(PrimitiveKind::Uuid, &expr, kind) {
                let related = self
                    .model()
                    .entity(&relation.target)
                    .ok_or_else(|| CompileErrorKind::UnresolvedEntity(relation.target.clone()))?;
                let key = Expr::KeyOf {
                    table: TableRef::of(related, self.settings()),
                    id: Box::new(expr),
                };
                return Ok((field.name.clone(), key));
            }
            return self.store(field, expr, kind).map(|e| (field.name.clone(), e));
        }

        let field = target
            .field(column)
            .ok_or_else(|| CompileErrorKind::UnresolvedField(column.to_string()))?;
        if !field.is_writable() {
            return Err(CompileErrorKind::ReadOnlyField(column.to_string()));
        }
        self.store(field, expr, kind).map(|e| (field.name.clone(), e))
    }

    /// Check that `expr` may be stored in `field`.
    fn store(&self, field: &Field, expr: Expr, kind: Option<PrimitiveKind>) -> Lowered<Expr> {
        let invalid = |reason: String| CompileErrorKind::InvalidLiteral {
            field: field.name.clone(),
            reason,
        };
        match &expr {
            Expr::Literal(Literal::Null) => {
                if !field.nullable {
                    return Err(invalid("field is required".to_string()));
                }
            }
            Expr::Literal(literal) => {
                if let Some(values) = &field.enum_values {
                    let member = matches!(literal, Literal::Text(s) if values.contains(s));
                    if !member {
                        return Err(invalid(format!("not one of {}", values.join(", "))));
                    }
                } else if let Some(reason) = self.literal_problem(&field.type_name, &expr) {
                    return Err(invalid(reason));
                }
            }
            _ => {
                if !fits(field.kind, &expr, kind) {
                    return Err(CompileErrorKind::TypeMismatch {
                        context: format!("assignment to '{}'", field.name),
                        expected: field.kind.to_string(),
                        found: found(kind),
                    });
                }
            }
        }
        Ok(expr)
    }

    /// Why a literal does not validate against `type_name`, if it does not.
    fn literal_problem(&self, type_name: &str, expr: &Expr) -> Option<String> {
        let literal = expr.as_literal()?;
        if matches!(literal, Literal::Null) {
            return None;
        }
        match self.compiler.registry.validate(type_name, &literal.to_json()) {
            Ok(()) => None,
            Err(TypeError::InvalidValue { report, .. }) => Some(report.to_string()),
            Err(TypeError::UnknownType { .. }) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    fn parse(&self, source: &str) -> Lowered<Expr> {
        Expr::parse(source).map_err(|e| CompileErrorKind::InvalidExpression {
            expression: source.to_string(),
            message: e.to_string(),
        })
    }

    /// Parse, bind and type one operand.
    fn typed(&self, source: &str, frame: Frame<'a>) -> Lowered<(Expr, Option<PrimitiveKind>)> {
        let expr = self.resolve(self.parse(source)?, frame)?;
        let kind = self.check(&expr, frame)?;
        Ok((expr, kind))
    }

    /// An operand that must be boolean.
    fn condition(&self, source: &str, frame: Frame<'a>) -> Lowered<Expr> {
        let (expr, kind) = self.typed(source, frame)?;
        match kind {
            Some(PrimitiveKind::Boolean) => Ok(expr),
            other => Err(CompileErrorKind::TypeMismatch {
                context: format!("condition '{}'", source),
                expected: "boolean".to_string(),
                found: found(other),
            }),
        }
    }

    fn resolve(&self, expr: Expr, frame: Frame<'a>) -> Lowered<Expr> {
        let boxed = |e: Box<Expr>| self.resolve(*e, frame).map(Box::new);
        Ok(match expr {
            Expr::Path(segments) => self.resolve_path(&segments, frame)?,
            Expr::Input(name) => {
                if !self.params.iter().any(|p| p.name == name) {
                    return Err(CompileErrorKind::UnresolvedField(format!("${}", name)));
                }
                Expr::Input(name)
            }
            Expr::Unary { op, expr } => Expr::Unary {
                op,
                expr: boxed(expr)?,
            },
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op,
                lhs: boxed(lhs)?,
                rhs: boxed(rhs)?,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => Expr::InList {
                expr: boxed(expr)?,
                list: list
                    .into_iter()
                    .map(|e| self.resolve(e, frame))
                    .collect::<Lowered<_>>()?,
                negated,
            },
            Expr::IsNull { expr, negated } => Expr::IsNull {
                expr: boxed(expr)?,
                negated,
            },
            Expr::Call { func, args } => Expr::Call {
                func,
                args: args
                    .into_iter()
                    .map(|e| self.resolve(e, frame))
                    .collect::<Lowered<_>>()?,
            },
            Expr::KeyOf { table, id } => Expr::KeyOf {
                table,
                id: boxed(id)?,
            },
            resolved @ (Expr::Literal(_) | Expr::Column { .. }) => resolved,
        })
    }

    fn resolve_path(&self, segments: &[String], frame: Frame<'a>) -> Lowered<Expr> {
        let unresolved = || CompileErrorKind::UnresolvedField(segments.join("."));
        let (entity, scope, name) = match segments {
            [name] => match frame {
                Frame::Row => (self.entity, Scope::Row, name),
                Frame::Target(target) => (target, Scope::Target, name),
            },
            [head, name] if head == "self" => (self.entity, Scope::Row, name),
            [head, name] => {
                let (_, entity) = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(v, _)| v == head)
                    .ok_or_else(unresolved)?;
                (*entity, Scope::Var(head.clone()), name)
            }
            _ => return Err(unresolved()),
        };
        let column = column_of(entity, name).ok_or_else(unresolved)?;
        Ok(Expr::Column { scope, column })
    }

    fn scope_entity(&self, scope: &Scope, frame: Frame<'a>) -> Option<&'a Entity> {
        match (scope, frame) {
            (Scope::Row, _) => Some(self.entity),
            (Scope::Target, Frame::Target(target)) => Some(target),
            (Scope::Target, Frame::Row) => None,
            (Scope::Var(var), _) => self
                .vars
                .iter()
                .rev()
                .find(|(v, _)| v == var)
                .map(|(_, e)| *e),
        }
    }

    fn column_field(&self, expr: &Expr, frame: Frame<'a>) -> Option<&'a Field> {
        match expr {
            Expr::Column { scope, column } => self.scope_entity(scope, frame)?.field(column),
            _ => None,
        }
    }

    /// Kind of a bound expression; `None` for a bare null.
    fn check(&self, expr: &Expr, frame: Frame<'a>) -> Lowered<Option<PrimitiveKind>> {
        use PrimitiveKind as K;
        let mismatch = |context: &str, expected: &str, kind: Option<K>| {
            Err(CompileErrorKind::TypeMismatch {
                context: context.to_string(),
                expected: expected.to_string(),
                found: found(kind),
            })
        };
        match expr {
            Expr::Literal(literal) => Ok(literal.kind()),
            Expr::Path(segments) => Err(CompileErrorKind::UnresolvedField(segments.join("."))),
            Expr::Input(name) => Ok(self
                .params
                .iter()
                .find(|p| p.name == *name)
                .map(|p| p.kind)),
            Expr::Column { column, .. } => self
                .column_field(expr, frame)
                .map(|f| Some(f.kind))
                .ok_or_else(|| CompileErrorKind::UnresolvedField(column.clone())),
            Expr::KeyOf { id, .. } => {
                self.check(id, frame)?;
                Ok(Some(K::Integer))
            }
            Expr::Unary { op, expr: inner } => {
                let kind = self.check(inner, frame)?;
                match op {
                    UnaryOp::Not if matches!(kind, Some(K::Boolean) | None) => Ok(Some(K::Boolean)),
                    UnaryOp::Not => mismatch("operand of 'not'", "boolean", kind),
                    UnaryOp::Neg if kind.map_or(true, |k| k.is_numeric()) => Ok(kind),
                    UnaryOp::Neg => mismatch("operand of '-'", "a number", kind),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.check(lhs, frame)?;
                let r = self.check(rhs, frame)?;
                if op.is_logical() {
                    for kind in [l, r] {
                        if !matches!(kind, Some(K::Boolean) | None) {
                            return mismatch(&format!("operand of '{}'", op.symbol()), "boolean", kind);
                        }
                    }
                    return Ok(Some(K::Boolean));
                }
                if op.is_comparison() {
                    self.comparable(lhs, l, rhs, r, frame)?;
                    return Ok(Some(K::Boolean));
                }
                arithmetic(*op, l, r).ok_or_else(|| CompileErrorKind::TypeMismatch {
                    context: format!("operands of '{}'", op.symbol()),
                    expected: "numbers".to_string(),
                    found: format!("{} and {}", found(l), found(r)),
                })
            }
            Expr::InList { expr: inner, list, .. } => {
                let kind = self.check(inner, frame)?;
                for item in list {
                    let item_kind = self.check(item, frame)?;
                    self.comparable(inner, kind, item, item_kind, frame)?;
                }
                Ok(Some(K::Boolean))
            }
            Expr::IsNull { expr: inner, .. } => {
                self.check(inner, frame)?;
                Ok(Some(K::Boolean))
            }
            Expr::Call { func, args } => {
                let kinds = args
                    .iter()
                    .map(|a| self.check(a, frame))
                    .collect::<Lowered<Vec<_>>>()?;
                let arity = |n: usize| {
                    if kinds.len() == n {
                        Ok(())
                    } else {
                        Err(CompileErrorKind::TypeMismatch {
                            context: format!("{}()", func.name()),
                            expected: format!("{} argument(s)", n),
                            found: kinds.len().to_string(),
                        })
                    }
                };
                match func {
                    Func::Now => arity(0).map(|_| Some(K::Timestamp)),
                    Func::Today => arity(0).map(|_| Some(K::Date)),
                    Func::Lower | Func::Upper => {
                        arity(1)?;
                        match kinds[0] {
                            Some(K::Text) | None => Ok(Some(K::Text)),
                            other => mismatch(&format!("{}()", func.name()), "text", other),
                        }
                    }
                    Func::Coalesce => {
                        if kinds.is_empty() {
                            return mismatch("coalesce()", "at least one argument", None);
                        }
                        let mut result: Option<K> = None;
                        for (arg, kind) in args.iter().zip(&kinds) {
                            let Some(kind) = kind else { continue };
                            match result {
                                None => result = Some(*kind),
                                Some(r) if r.accepts(*kind) => {}
                                Some(r) if kind.accepts(r) => result = Some(*kind),
                                Some(r) if fits(r, arg, Some(*kind)) => {}
                                Some(r) => return mismatch("coalesce()", r.as_str(), Some(*kind)),
                            }
                        }
                        Ok(result)
                    }
                }
            }
        }
    }

    /// Both sides of a comparison must be comparable; a text literal
    /// compared against an enum column must be one of its values.
    fn comparable(
        &self,
        lhs: &Expr,
        l: Option<PrimitiveKind>,
        rhs: &Expr,
        r: Option<PrimitiveKind>,
        frame: Frame<'a>,
    ) -> Lowered<()> {
        for (column, literal) in [(lhs, rhs), (rhs, lhs)] {
            if let (Some(field), Expr::Literal(Literal::Text(value))) =
                (self.column_field(column, frame), literal)
            {
                if let Some(values) = &field.enum_values {
                    if !values.contains(value) {
                        return Err(CompileErrorKind::InvalidLiteral {
                            field: field.name.clone(),
                            reason: format!("'{}' is not one of {}", value, values.join(", ")),
                        });
                    }
                }
            }
        }
        let ok = match (l, r) {
            (None, _) | (_, None) => true,
            (Some(a), Some(b)) => {
                a.comparable_with(b) || fits(a, rhs, Some(b)) || fits(b, lhs, Some(a))
            }
        };
        if ok {
            Ok(())
        } else {
            Err(CompileErrorKind::TypeMismatch {
                context: "comparison".to_string(),
                expected: found(l),
                found: found(r),
            })
        }
    }
}

/// Whether a value of `kind` produced by `expr` may flow into a `slot`.
///
/// Text literals are accepted wherever their content has the slot's shape,
/// so `'2024-01-01'` fits a date.
fn fits(slot: PrimitiveKind, expr: &Expr, kind: Option<PrimitiveKind>) -> bool {
    match kind {
        None => true,
        Some(kind) if slot.accepts(kind) => true,
        Some(PrimitiveKind::Text) => match expr {
            Expr::Literal(Literal::Text(s)) => slot
                .check_shape(&serde_json::Value::String(s.clone()))
                .is_ok(),
            _ => false,
        },
        Some(_) => false,
    }
}

fn arithmetic(
    op: BinaryOp,
    l: Option<PrimitiveKind>,
    r: Option<PrimitiveKind>,
) -> Option<Option<PrimitiveKind>> {
    use PrimitiveKind as K;
    match (l, r) {
        (None, other) | (other, None) => Some(other),
        (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() => {
            Some(Some(if a.accepts(b) { a } else { b }))
        }
        (Some(K::Timestamp), Some(K::Interval)) | (Some(K::Date), Some(K::Interval))
            if matches!(op, BinaryOp::Add | BinaryOp::Sub) =>
        {
            Some(Some(K::Timestamp))
        }
        (Some(K::Date), Some(K::Integer)) if matches!(op, BinaryOp::Add | BinaryOp::Sub) => {
            Some(Some(K::Date))
        }
        _ => None,
    }
}

fn found(kind: Option<PrimitiveKind>) -> String {
    kind.map_or_else(|| "null".to_string(), |k| k.to_string())
}

/// Column a single name refers to: a field, or a one relation's key.
fn column_of(entity: &Entity, name: &str) -> Option<String> {
    if entity.field(name).is_some() {
        return Some(name.to_string());
    }
    entity
        .relation(name)
        .filter(|r| r.cardinality == Cardinality::One)
        .map(|r| r.column.clone())
}

/// Whether `action` reads or writes the row it is invoked on.
///
/// Decided from the declaration alone so that callers can be checked
/// before the callee is compiled.
pub fn targets_row(model: &EntityModel, entity: &Entity, action: &Action) -> bool {
    let mut visiting = BTreeSet::from([action.name.clone()]);
    steps_touch_row(model, entity, &action.steps, &mut visiting)
}

fn steps_touch_row(
    model: &EntityModel,
    entity: &Entity,
    steps: &[Step],
    visiting: &mut BTreeSet<String>,
) -> bool {
    let own = |name: &Option<String>| name.as_deref().map_or(true, |n| n == entity.name());
    steps.iter().any(|step| match step {
        Step::Validate {
            condition, guard, ..
        } => {
            condition.as_deref().is_some_and(|c| reads_row(c, true))
                || guard
                    .as_deref()
                    .and_then(|g| entity.guard(g))
                    .is_some_and(|g| reads_row(&g.condition, true))
        }
        Step::Update {
            entity: target,
            set,
            filter,
        } => {
            (own(target) && filter.is_none())
                || set.values().chain(filter.iter()).any(|s| reads_row(s, false))
        }
        Step::Insert { values, .. } => values.values().any(|s| reads_row(s, true)),
        Step::Delete {
            entity: target,
            filter,
        } => (own(target) && filter.is_none()) || filter.as_deref().is_some_and(|f| reads_row(f, false)),
        Step::Call { target, args } => {
            args.values().any(|s| reads_row(s, true))
                || (!target.contains('.')
                    && !args.contains_key("id")
                    && callee_touches_row(model, entity, target, visiting))
        }
        Step::Notify { payload, .. } => payload.values().any(|s| reads_row(s, true)),
        Step::Foreach { .. } => true,
        Step::Conditional {
            condition,
            then,
            otherwise,
        } => {
            reads_row(condition, true)
                || steps_touch_row(model, entity, then, visiting)
                || steps_touch_row(model, entity, otherwise, visiting)
        }
        Step::Refresh { .. } => false,
    })
}

fn callee_touches_row(
    model: &EntityModel,
    entity: &Entity,
    name: &str,
    visiting: &mut BTreeSet<String>,
) -> bool {
    if let Some(routine) = entity.routine(name) {
        return routine.targets_row;
    }
    match entity.action(name) {
        Some(action) if visiting.insert(name.to_string()) => {
            steps_touch_row(model, entity, &action.steps, visiting)
        }
        _ => false,
    }
}

/// Whether an expression mentions the invoked row. Unqualified names count
/// only where they resolve against that row.
fn reads_row(source: &str, unqualified_is_row: bool) -> bool {
    Expr::parse(source).is_ok_and(|expr| {
        expr.paths().iter().any(|path| match *path {
            [head, ..] if head == "self" => true,
            [_] => unqualified_is_row,
            _ => false,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ActionInput, EntityDecl, FieldDecl, Guard, RelationDecl};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn registry() -> TypeRegistry {
        TypeRegistry::builtin().unwrap()
    }

    fn build(decls: Vec<EntityDecl>) -> EntityModel {
        let reg = registry();
        let mut model = EntityModel::new(ModelSettings::default());
        for decl in &decls {
            model.declare(decl, &reg).unwrap();
        }
        model.wire().unwrap();
        model
    }

    fn order(actions: Vec<Action>) -> EntityDecl {
        let mut decl = EntityDecl::new("Order", "sales")
            .field(FieldDecl::enumeration("status", &["draft", "sent", "paid"]).with_default(json!("draft")))
            .field(FieldDecl::new("total", "money"))
            .field(FieldDecl::new("note", "text"))
            .relation(RelationDecl::many("lines", "OrderLine"))
            .guard(Guard {
                name: "has_total".into(),
                condition: "total > 0".into(),
                error: Some("empty_order".into()),
            });
        for action in actions {
            decl = decl.action(action);
        }
        decl
    }

    fn line() -> EntityDecl {
        EntityDecl::new("OrderLine", "sales")
            .field(FieldDecl::new("qty", "integer").required())
            .relation(RelationDecl::one("order", "Order"))
    }

    fn compile(action: Action) -> Result<Routine, CompileError> {
        let model = build(vec![order(vec![action.clone()]), line()]);
        let reg = registry();
        let entity = model.entity("Order").unwrap();
        let action = entity.action(&action.name).unwrap();
        ActionCompiler::new(&model, &reg).compile(entity, action)
    }

    fn code(action: Action) -> &'static str {
        compile(action).unwrap_err().code()
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn validate_then_update_of_own_row() {
        let routine = compile(Action::new(
            "send",
            vec![Step::validate("status = 'draft'", "not_draft"), Step::update(&[("status", "'sent'")])],
        ))
        .unwrap();

        assert!(routine.targets_row);
        assert_eq!(routine.qualified_name().to_string(), "sales.send");
        let names: Vec<&str> = routine.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["caller_id"]);

        let Op::Update { assignments, filter, .. } = &routine.ops()[1] else {
            panic!("expected update");
        };
        assert_eq!(*filter, RowFilter::Current);
        let columns: Vec<&str> = assignments.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(columns, vec!["status", "updated_at"]);
    }

    #[test]
    fn guard_error_code_precedence() {
        let routine = compile(Action::new("check", vec![Step::guard("has_total")])).unwrap();
        let Op::Guard { error, guard, .. } = &routine.ops()[0] else {
            panic!("expected guard");
        };
        assert_eq!(error, "empty_order");
        assert_eq!(guard.as_deref(), Some("has_total"));

        let step = Step::Validate {
            condition: Some("total > 0".into()),
            guard: None,
            error: None,
        };
        let routine = compile(Action::new("check", vec![step])).unwrap();
        assert!(matches!(&routine.ops()[0], Op::Guard { error, .. } if error == "validation_failed"));
    }

    #[test]
    fn validate_needs_exactly_one_source() {
        let both = Step::Validate {
            condition: Some("true".into()),
            guard: Some("has_total".into()),
            error: None,
        };
        assert_eq!(code(Action::new("a", vec![both])), "invalid-step");
        assert_eq!(code(Action::new("a", vec![Step::guard("missing")])), "unresolved-guard");
    }

    #[test]
    fn name_and_type_errors() {
        assert_eq!(code(Action::new("a", vec![Step::validate("colour = 'x'", "e")])), "unresolved-field");
        assert_eq!(code(Action::new("a", vec![Step::validate("status = 'void'", "e")])), "invalid-literal");
        assert_eq!(code(Action::new("a", vec![Step::validate("total", "e")])), "type-mismatch");
        assert_eq!(code(Action::new("a", vec![Step::update(&[("total", "'abc'")])])), "invalid-literal");
        assert_eq!(code(Action::new("a", vec![Step::update(&[("note", "total + 1")])])), "type-mismatch");
        assert_eq!(code(Action::new("a", vec![Step::update(&[("id", "null")])])), "read-only-field");
        assert_eq!(code(Action::new("a", vec![Step::validate("total >", "e")])), "invalid-expression");
    }

    #[test]
    fn inputs_are_parameters() {
        let action = Action::new("set_note", vec![Step::update(&[("note", "$text")])])
            .with_inputs(vec![ActionInput::new("text", "text", true)]);
        let routine = compile(action).unwrap();
        assert_eq!(routine.params[0].sql_name(), "p_text");
        assert!(routine.params[0].required);
        assert!(!routine.param("caller_id").unwrap().required);

        let action = Action::new("a", vec![]).with_inputs(vec![ActionInput::new("id", "uuid", true)]);
        assert_eq!(code(action), "invalid-input");
        let action = Action::new("a", vec![]).with_inputs(vec![ActionInput::new("x", "float", true)]);
        assert_eq!(code(action), "invalid-input");
    }

    #[test]
    fn insert_requires_values_and_resolves_relations_by_id() {
        let insert = Step::Insert {
            entity: "OrderLine".into(),
            values: map(&[("order", "self.id"), ("qty", "1")]),
        };
        let routine = compile(Action::new("add_line", vec![insert])).unwrap();
        let Op::Insert { values, table } = &routine.ops()[0] else {
            panic!("expected insert");
        };
        assert_eq!(table.table.to_string(), "sales.tb_order_line");
        assert_eq!(values[0].0, "fk_order");
        assert!(matches!(values[0].1, Expr::KeyOf { .. }));

        let insert = Step::Insert {
            entity: "OrderLine".into(),
            values: map(&[("order", "self.id")]),
        };
        assert_eq!(code(Action::new("add_line", vec![insert])), "missing-value");
    }

    #[test]
    fn foreign_update_needs_where() {
        let update = Step::Update {
            entity: Some("OrderLine".into()),
            set: map(&[("qty", "0")]),
            filter: None,
        };
        assert_eq!(code(Action::new("a", vec![update])), "invalid-step");

        let update = Step::Update {
            entity: Some("OrderLine".into()),
            set: map(&[("qty", "qty + 1")]),
            filter: Some("order = self.pk_order".into()),
        };
        let routine = compile(Action::new("a", vec![update])).unwrap();
        let Op::Update { filter: RowFilter::Where(_), .. } = &routine.ops()[0] else {
            panic!("expected filtered update");
        };
    }

    #[test]
    fn foreach_binds_its_variable() {
        let step = Step::Foreach {
            var: "line".into(),
            collection: "lines".into(),
            steps: vec![Step::validate("line.qty > 0", "bad_qty")],
        };
        let routine = compile(Action::new("check_lines", vec![step])).unwrap();
        let Op::ForEach { link_column, body, .. } = &routine.ops()[0] else {
            panic!("expected foreach");
        };
        assert_eq!(link_column, "fk_order");
        assert_eq!(body.len(), 1);

        let step = Step::Foreach {
            var: "line".into(),
            collection: "note".into(),
            steps: vec![],
        };
        assert_eq!(code(Action::new("a", vec![step])), "unresolved-field");
    }

    #[test]
    fn literal_conditionals_fold() {
        let step = Step::Conditional {
            condition: "false".into(),
            then: vec![Step::update(&[("note", "'then'")])],
            otherwise: vec![Step::update(&[("note", "'else'")])],
        };
        let routine = compile(Action::new("a", vec![step])).unwrap();
        assert_eq!(routine.ops().len(), 1);
        let Op::Update { assignments, .. } = &routine.ops()[0] else {
            panic!("expected update");
        };
        assert_eq!(assignments[0].1, Expr::text("else"));

        let step = Step::Conditional {
            condition: "total > 100".into(),
            then: vec![Step::Notify {
                event: "large_order".into(),
                payload: map(&[("total", "total")]),
            }],
            otherwise: vec![],
        };
        let routine = compile(Action::new("a", vec![step])).unwrap();
        assert!(matches!(routine.ops()[0], Op::Branch { .. }));
        assert_eq!(routine.events[0].name, "large_order");
    }

    #[test]
    fn calls_check_their_arguments() {
        let reg = registry();
        let note = Action::new("set_note", vec![Step::update(&[("note", "$text")])])
            .with_inputs(vec![ActionInput::new("text", "text", true)]);
        let call = |args: &[(&str, &str)]| {
            Action::new(
                "annotate",
                vec![Step::Call {
                    target: "set_note".into(),
                    args: map(args),
                }],
            )
        };

        let model = build(vec![order(vec![note.clone(), call(&[("text", "'hi'")])]), line()]);
        let entity = model.entity("Order").unwrap();
        let compiler = ActionCompiler::new(&model, &reg);
        let routine = compiler.compile(entity, entity.action("annotate").unwrap()).unwrap();
        let Op::Call {
            routine: callee,
            row,
            args,
            mutation,
            ..
        } = &routine.ops()[0]
        else {
            panic!("expected call");
        };
        assert_eq!(callee.to_string(), "sales.set_note");
        assert!(row.is_some());
        assert!(*mutation);
        assert_eq!(args.last().map(|(k, _)| k.as_str()), Some(CALLER_ID));
        assert!(routine.targets_row);

        for (args, expected) in [
            (vec![], "parameter-mismatch"),
            (vec![("text", "'hi'"), ("extra", "1")], "parameter-mismatch"),
            (vec![("text", "1")], "parameter-mismatch"),
        ] {
            let model = build(vec![order(vec![note.clone(), call(&args)]), line()]);
            let entity = model.entity("Order").unwrap();
            let err = ActionCompiler::new(&model, &reg)
                .compile(entity, entity.action("annotate").unwrap())
                .unwrap_err();
            assert_eq!(err.code(), expected, "{:?}", args);
        }
    }

    #[test]
    fn unknown_call_and_refresh_targets() {
        let call = Step::Call {
            target: "Invoice.send".into(),
            args: BTreeMap::new(),
        };
        assert_eq!(code(Action::new("a", vec![call])), "unresolved-call");
        let refresh = Step::Refresh {
            artifact: "mv_missing".into(),
        };
        assert_eq!(code(Action::new("a", vec![refresh])), "unresolved-artifact");
    }

    #[test]
    fn error_display_names_the_action() {
        let err = compile(Action::new("a", vec![Step::guard("missing")])).unwrap_err();
        assert_eq!(err.to_string(), "Order.a: unknown guard 'missing'");
    }

    #[test]
    fn actions_without_row_references_do_not_target_a_row() {
        let insert = Step::Insert {
            entity: "OrderLine".into(),
            values: map(&[("qty", "$qty")]),
        };
        let action = Action::new("new_line", vec![insert])
            .with_inputs(vec![ActionInput::new("qty", "integer", true)]);
        let routine = compile(action).unwrap();
        assert!(!routine.targets_row);
    }
}
