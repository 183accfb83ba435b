//! Routine intermediate representation.
//!
//! Every stored routine, whether compiled from an action or generated by a
//! pattern, is one [`Routine`]. Emitters render it; the sandbox runs it.

use std::collections::BTreeSet;

use super::expr::Expr;
use crate::domain::entities::{Entity, Origin};
use crate::domain::services::CyclePolicy;
use crate::domain::types::{PrimitiveKind, TargetType};
use crate::domain::value_objects::{ModelSettings, QualifiedName};

pub const NOT_FOUND: &str = "not_found";
pub const CYCLIC_TEMPLATE: &str = "cyclic_template";
pub const TEMPLATE_DEPTH_EXCEEDED: &str = "template_depth_exceeded";
pub const CYCLIC_DEPENDENCY: &str = "cyclic_dependency";
pub const DEPENDENCY_DEPTH_EXCEEDED: &str = "dependency_depth_exceeded";

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
    pub kind: PrimitiveKind,
    pub target: TargetType,
    pub required: bool,
}

impl Param {
    pub fn new(name: &str, type_name: &str, kind: PrimitiveKind, target: TargetType) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            kind,
            target,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Parameter name in generated code, `p_<name>`.
    pub fn sql_name(&self) -> String {
        format!("p_{}", self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Function,
    /// Fires before insert or update on the owning table.
    Trigger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub name: String,
    pub schema: String,
    pub entity: String,
    pub table: TableRef,
    /// Action this routine was compiled from.
    pub action: Option<String>,
    pub description: Option<String>,
    pub kind: RoutineKind,
    /// Takes the external id of an existing row as its first parameter.
    pub targets_row: bool,
    pub params: Vec<Param>,
    pub body: RoutineBody,
    pub events: Vec<EventDescriptor>,
    pub origin: Origin,
}

impl Routine {
    /// Routine generated for `entity` rather than compiled from an action.
    pub fn generated(
        entity: &Entity,
        settings: &ModelSettings,
        name: impl Into<String>,
        kind: RoutineKind,
        body: RoutineBody,
        origin: Origin,
    ) -> Self {
        Self {
            name: name.into(),
            schema: entity.schema().to_string(),
            entity: entity.name().to_string(),
            table: TableRef::of(entity, settings),
            action: None,
            description: None,
            kind,
            targets_row: false,
            params: Vec::new(),
            body,
            events: Vec::new(),
            origin,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    /// First parameter is the external id of an existing row.
    pub fn targeting_row(mut self) -> Self {
        self.targets_row = true;
        self
    }

    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::new(&self.schema, &self.name)
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn ops(&self) -> &[Op] {
        match &self.body {
            RoutineBody::Steps(ops) => ops,
            _ => &[],
        }
    }

    /// Tables the body reads or writes, the owning table included.
    pub fn tables(&self) -> BTreeSet<QualifiedName> {
        let mut out = BTreeSet::from([self.table.table.clone()]);
        walk_ops(self.ops(), &mut |op| match op {
            Op::Update { table, .. } | Op::Insert { table, .. } | Op::Delete { table, .. } => {
                out.insert(table.table.clone());
            }
            Op::ForEach { source, .. } => {
                out.insert(source.table.clone());
            }
            _ => {}
        });
        if let RoutineBody::DependencyClosure(walk) | RoutineBody::ValidateDependencies(walk) = &self.body {
            if let Some(edges) = walk.edge_table() {
                out.insert(edges.table.clone());
            }
        }
        out
    }

    /// Routines invoked by `call` steps.
    pub fn calls(&self) -> BTreeSet<QualifiedName> {
        let mut out = BTreeSet::new();
        walk_ops(self.ops(), &mut |op| {
            if let Op::Call { routine, .. } = op {
                out.insert(routine.clone());
            }
        });
        out
    }

    /// Views refreshed by the body.
    pub fn refreshes(&self) -> BTreeSet<QualifiedName> {
        let mut out = BTreeSet::new();
        if let RoutineBody::RefreshView(view) = &self.body {
            out.insert(view.clone());
        }
        walk_ops(self.ops(), &mut |op| {
            if let Op::Refresh { view } = op {
                out.insert(view.clone());
            }
        });
        out
    }

    /// Whether the routine returns the shared mutation result.
    pub fn returns_mutation_result(&self) -> bool {
        self.kind == RoutineKind::Function
            && matches!(
                self.body,
                RoutineBody::Steps(_) | RoutineBody::UpsertVersion(_) | RoutineBody::RefreshView(_)
            )
    }
}

/// Calls `f` on every op, descending into loops and branches.
pub fn walk_ops<'o>(ops: &'o [Op], f: &mut impl FnMut(&'o Op)) {
    for op in ops {
        f(op);
        match op {
            Op::ForEach { body, .. } => walk_ops(body, f),
            Op::Branch {
                then, otherwise, ..
            } => {
                walk_ops(then, f);
                walk_ops(otherwise, f);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutineBody {
    /// Compiled action steps.
    Steps(Vec<Op>),
    /// Walk `link_column` up the template chain and coalesce `fields`.
    ResolveTemplate(ChainWalk),
    /// Trigger: reject template cycles and over-deep chains.
    ValidateTemplate(ChainWalk),
    /// Transitive closure over the dependency links, start row excluded.
    DependencyClosure(DependencyWalk),
    /// Trigger: reject dependency cycles.
    ValidateDependencies(DependencyWalk),
    /// Trigger: set the overlap flag column instead of rejecting.
    FlagOverlap(RangeSpec),
    /// Close the current version and open a new one.
    UpsertVersion(VersionSpec),
    RefreshView(QualifiedName),
    IdentityLookup(LookupDirection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainWalk {
    pub link_column: String,
    pub fields: Vec<String>,
    pub max_depth: usize,
    pub policy: CyclePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyWalk {
    pub link: DependencyLink,
    pub max_depth: usize,
    pub policy: CyclePolicy,
}

/// Where the dependency edges of a row are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyLink {
    /// A nullable self foreign key: at most one dependency per row.
    Column(String),
    /// One row per edge in a link table, `from_column` depends on
    /// `to_column`. Both point at the owning table.
    Edges {
        table: TableRef,
        from_column: String,
        to_column: String,
    },
}

impl DependencyWalk {
    pub fn edge_table(&self) -> Option<&TableRef> {
        match &self.link {
            DependencyLink::Edges { table, .. } => Some(table),
            DependencyLink::Column(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSpec {
    pub scope_columns: Vec<String>,
    pub start: String,
    pub end: String,
    pub range_column: String,
    pub range_type: String,
    pub bounds: String,
    pub flag_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub natural_key: Vec<String>,
    pub tracked: Vec<String>,
    pub effective_from: String,
    pub effective_to: String,
    pub is_current: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupDirection {
    /// External id to surrogate key.
    PkFromId,
    /// Surrogate key to external id.
    IdFromPk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub name: String,
    pub payload: Vec<(String, Option<PrimitiveKind>)>,
}

/// Table touched by an op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub entity: String,
    pub table: QualifiedName,
    pub pk_column: String,
    /// Deletes become `deleted_at = now()` and reads skip deleted rows.
    pub soft_delete: bool,
}

impl TableRef {
    pub fn of(entity: &Entity, settings: &ModelSettings) -> Self {
        Self {
            entity: entity.name().to_string(),
            table: entity.table(),
            pk_column: entity.pk_column(),
            soft_delete: settings.soft_delete_enabled(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    /// The row the routine was invoked on.
    Current,
    Where(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Guard {
        guard: Option<String>,
        condition: Expr,
        error: String,
    },
    Update {
        table: TableRef,
        assignments: Vec<(String, Expr)>,
        filter: RowFilter,
    },
    Insert {
        table: TableRef,
        values: Vec<(String, Expr)>,
    },
    Delete {
        table: TableRef,
        filter: RowFilter,
    },
    Call {
        routine: QualifiedName,
        entity: String,
        /// External id of the callee's row, when it targets one.
        row: Option<Expr>,
        args: Vec<(String, Expr)>,
        /// The callee returns the mutation result and its status is checked.
        mutation: bool,
    },
    Notify {
        event: String,
        payload: Vec<(String, Expr)>,
    },
    /// Rows of `source` whose `link_column` points at the current row.
    ForEach {
        var: String,
        source: TableRef,
        link_column: String,
        body: Vec<Op>,
    },
    Branch {
        condition: Expr,
        then: Vec<Op>,
        otherwise: Vec<Op>,
    },
    Refresh {
        view: QualifiedName,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Guard { .. } => "guard",
            Op::Update { .. } => "update",
            Op::Insert { .. } => "insert",
            Op::Delete { .. } => "delete",
            Op::Call { .. } => "call",
            Op::Notify { .. } => "notify",
            Op::ForEach { .. } => "foreach",
            Op::Branch { .. } => "branch",
            Op::Refresh { .. } => "refresh",
        }
    }
}
