//! Entity - the normalized form of one business entity.
//!
//! An entity is created from its declaration, extended by relation wiring
//! and pattern expansion, receives its compiled routines, and is read-only
//! from then on.

use super::{
    Action, Constraint, Field, FieldRole, Guard, Index, Origin, PatternDecl, Relation, View,
};
use crate::domain::actions::Routine;
use crate::domain::value_objects::{snake_case, QualifiedName, SourceLocation};

pub const EXTERNAL_ID: &str = "id";
pub const IDENTIFIER: &str = "identifier";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    name: String,
    schema: String,
    table: String,
    description: Option<String>,
    fields: Vec<Field>,
    relations: Vec<Relation>,
    guards: Vec<Guard>,
    patterns: Vec<PatternDecl>,
    actions: Vec<Action>,
    constraints: Vec<Constraint>,
    indexes: Vec<Index>,
    views: Vec<View>,
    routines: Vec<Routine>,
    location: Option<SourceLocation>,
}

impl Entity {
    /// Empty entity; identity columns are added by the model.
    pub fn new(name: impl Into<String>, schema: impl Into<String>, table_prefix: &str) -> Self {
        let name = name.into();
        let table = format!("{}{}", table_prefix, snake_case(&name));
        Self {
            name,
            schema: schema.into(),
            table,
            description: None,
            fields: Vec::new(),
            relations: Vec::new(),
            guards: Vec::new(),
            patterns: Vec::new(),
            actions: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            views: Vec::new(),
            routines: Vec::new(),
            location: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// `purchase_order` for `PurchaseOrder`.
    pub fn snake_name(&self) -> String {
        snake_case(&self.name)
    }

    pub fn table(&self) -> QualifiedName {
        QualifiedName::new(&self.schema, &self.table)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn qualified(&self, name: impl Into<String>) -> QualifiedName {
        QualifiedName::new(&self.schema, name)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// Surrogate key column name, `pk_<entity>`.
    pub fn pk_column(&self) -> String {
        format!("pk_{}", self.snake_name())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Identity trio in order: surrogate key, external id, identifier.
    pub fn identity(&self) -> Vec<&Field> {
        let mut trio: Vec<&Field> = self.fields.iter().filter(|f| f.is_identity()).collect();
        trio.sort_by_key(|f| match f.role {
            FieldRole::SurrogateKey => 0,
            FieldRole::ExternalId => 1,
            _ => 2,
        });
        trio
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn guard(&self, name: &str) -> Option<&Guard> {
        self.guards.iter().find(|g| g.name == name)
    }

    /// Pattern instances declared on this entity, in declaration order.
    pub fn patterns(&self) -> &[PatternDecl] {
        &self.patterns
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn routines(&self) -> &[Routine] {
        &self.routines
    }

    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.iter().find(|r| r.name == name)
    }

    /// Name of the member that already uses `name`, if any.
    ///
    /// Columns and relations share one namespace; constraints, indexes and
    /// views share another; actions and routines a third.
    pub fn column_owner(&self, name: &str) -> Option<&Origin> {
        self.field(name)
            .map(|f| &f.origin)
            .or_else(|| self.relation(name).map(|r| &r.origin))
    }

    pub fn relation_owner(&self, name: &str) -> Option<&Origin> {
        self.constraints
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.origin)
            .or_else(|| self.indexes.iter().find(|i| i.name == name).map(|i| &i.origin))
            .or_else(|| self.views.iter().find(|v| v.name == name).map(|v| &v.origin))
    }

    pub fn routine_owner(&self, name: &str) -> Option<&Origin> {
        self.action(name)
            .map(|a| &a.origin)
            .or_else(|| self.routine(name).map(|r| &r.origin))
    }

    pub(crate) fn push_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub(crate) fn push_relation(&mut self, relation: Relation) {
        self.relations.push(relation);
    }

    pub(crate) fn push_guard(&mut self, guard: Guard) {
        self.guards.push(guard);
    }

    pub(crate) fn push_pattern(&mut self, pattern: PatternDecl) {
        self.patterns.push(pattern);
    }

    pub(crate) fn push_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub(crate) fn push_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub(crate) fn push_index(&mut self, index: Index) {
        self.indexes.push(index);
    }

    pub(crate) fn push_view(&mut self, view: View) {
        self.views.push(view);
    }

    pub(crate) fn push_routine(&mut self, routine: Routine) {
        self.routines.push(routine);
    }
}
