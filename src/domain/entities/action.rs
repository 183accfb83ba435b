//! Actions, their steps and named guards.
//!
//! Expressions inside steps are kept as source text here; the action
//! compiler parses and resolves them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Origin;
use crate::domain::value_objects::SourceLocation;

/// A declarative, transactional routine on one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<ActionInput>,
    pub steps: Vec<Step>,
    #[serde(skip)]
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl Action {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            inputs: Vec::new(),
            steps,
            origin: Origin::Declared,
            location: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<ActionInput>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn input(&self, name: &str) -> Option<&ActionInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Number of steps including nested ones.
    pub fn step_count(&self) -> usize {
        fn count(steps: &[Step]) -> usize {
            steps
                .iter()
                .map(|s| {
                    1 + match s {
                        Step::Foreach { steps, .. } => count(steps),
                        Step::Conditional { then, otherwise, .. } => {
                            count(then) + count(otherwise)
                        }
                        _ => 0,
                    }
                })
                .sum()
        }
        count(&self.steps)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInput {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
}

impl ActionInput {
    pub fn new(name: &str, type_name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            required,
        }
    }
}

/// A named boolean predicate declared on an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    pub name: String,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One declarative step. Each kind carries only its own operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Exactly one of `condition` and `guard` is given.
    Validate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Without `entity` and `where` the step updates the action's own row.
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<String>,
        set: BTreeMap<String, String>,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    Insert {
        entity: String,
        values: BTreeMap<String, String>,
    },
    Delete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<String>,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    /// `target` is `action` on the same entity or `Entity.action`.
    Call {
        target: String,
        #[serde(default)]
        args: BTreeMap<String, String>,
    },
    Notify {
        event: String,
        #[serde(default)]
        payload: BTreeMap<String, String>,
    },
    /// `collection` names a `many` relation of the action's entity.
    Foreach {
        var: String,
        collection: String,
        steps: Vec<Step>,
    },
    Conditional {
        condition: String,
        then: Vec<Step>,
        #[serde(rename = "else", default)]
        otherwise: Vec<Step>,
    },
    Refresh {
        artifact: String,
    },
}

impl Step {
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Validate { .. } => "validate",
            Step::Update { .. } => "update",
            Step::Insert { .. } => "insert",
            Step::Delete { .. } => "delete",
            Step::Call { .. } => "call",
            Step::Notify { .. } => "notify",
            Step::Foreach { .. } => "foreach",
            Step::Conditional { .. } => "conditional",
            Step::Refresh { .. } => "refresh",
        }
    }

    pub fn validate(condition: &str, error: &str) -> Self {
        Step::Validate {
            condition: Some(condition.to_string()),
            guard: None,
            error: Some(error.to_string()),
        }
    }

    pub fn guard(name: &str) -> Self {
        Step::Validate {
            condition: None,
            guard: Some(name.to_string()),
            error: None,
        }
    }

    /// Update of the action's own row.
    pub fn update(set: &[(&str, &str)]) -> Self {
        Step::Update {
            entity: None,
            set: set
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            filter: None,
        }
    }
}
