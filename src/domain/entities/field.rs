//! Fields of an entity.

use serde_json::Value;

use crate::domain::types::{PrimitiveKind, TargetType};
use crate::domain::value_objects::QualifiedName;

/// Who introduced a member of an entity.
///
/// Used to tell a repeated, identical pattern expansion apart from a real
/// name conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Origin {
    /// Identity trio, audit columns and other members every entity gets.
    Synthesized,
    #[default]
    Declared,
    /// Foreign key column added while wiring the named relation.
    Relation(String),
    /// Added by the named pattern.
    Pattern(String),
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Synthesized => f.write_str("synthesized"),
            Origin::Declared => f.write_str("declaration"),
            Origin::Relation(name) => write!(f, "relation '{}'", name),
            Origin::Pattern(name) => write!(f, "pattern '{}'", name),
        }
    }
}

/// Where the column sits in the identity and reference scheme.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRole {
    SurrogateKey,
    ExternalId,
    /// Human-readable key, rewritten from the row on every write.
    Identifier(IdentifierRule),
    Audit,
    Data,
    ForeignKey(ForeignKeyRef),
    /// Stored range computed from two other columns.
    ComputedRange(ComputedRange),
    /// Maintained by a generated trigger.
    Derived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub entity: String,
    pub table: QualifiedName,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedRange {
    pub range_type: String,
    pub start: String,
    pub end: String,
    /// `[)` or `[]`.
    pub bounds: String,
}

/// How the `identifier` column is derived.
///
/// The slugs of the non-empty `components` joined by `separator`; with no
/// component value the identifier is `<prefix>-<surrogate key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierRule {
    pub prefix: String,
    pub components: Vec<String>,
    pub separator: String,
}

impl IdentifierRule {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            components: Vec::new(),
            separator: "-".to_string(),
        }
    }

    /// The identifier of the row with key `pk`, given the text of each
    /// component column (`None` for NULL).
    pub fn derive<F>(&self, pk: i64, mut text_of: F) -> String
    where
        F: FnMut(&str) -> Option<String>,
    {
        let parts: Vec<String> = self
            .components
            .iter()
            .filter_map(|c| text_of(c))
            .map(|t| slug(&t))
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            format!("{}-{}", self.prefix, pk)
        } else {
            parts.join(&self.separator)
        }
    }
}

/// Lowercase ASCII letters and digits, every other run collapsed to `-`.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Literal(Value),
    Now,
    RandomUuid,
}

impl ColumnDefault {
    /// `"now()"` in a declaration means the clock, anything else is a literal.
    pub fn from_declared(value: &Value) -> Self {
        match value.as_str() {
            Some("now()") => ColumnDefault::Now,
            Some("gen_random_uuid()") => ColumnDefault::RandomUuid,
            _ => ColumnDefault::Literal(value.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub kind: PrimitiveKind,
    pub target: TargetType,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    pub role: FieldRole,
    pub origin: Origin,
    pub enum_values: Option<Vec<String>>,
    pub description: Option<String>,
}

impl Field {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        kind: PrimitiveKind,
        target: TargetType,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            kind,
            target,
            nullable: true,
            unique: false,
            default: None,
            role: FieldRole::Data,
            origin: Origin::Declared,
            enum_values: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_role(mut self, role: FieldRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn is_identity(&self) -> bool {
        matches!(
            self.role,
            FieldRole::SurrogateKey | FieldRole::ExternalId | FieldRole::Identifier(_)
        )
    }

    /// Whether an action may assign this column. Only declared data and
    /// foreign keys are; the identity trio is maintained by the table.
    pub fn is_writable(&self) -> bool {
        matches!(self.role, FieldRole::Data | FieldRole::ForeignKey(_))
    }

    /// Whether an insert must supply a value.
    pub fn needs_value(&self) -> bool {
        self.is_writable() && !self.nullable && self.default.is_none()
    }

    /// Whether the query layer sees this column as a field.
    pub fn is_exposed(&self) -> bool {
        !matches!(
            self.role,
            FieldRole::SurrogateKey | FieldRole::ForeignKey(_) | FieldRole::ComputedRange(_)
        )
    }

    pub fn foreign_key(&self) -> Option<&ForeignKeyRef> {
        match &self.role {
            FieldRole::ForeignKey(fk) => Some(fk),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(name: &str) -> Field {
        Field::new(name, "text", PrimitiveKind::Text, TargetType::new("TEXT"))
    }

    #[test]
    fn writability_follows_role() {
        assert!(text("title").is_writable());
        let identifier = FieldRole::Identifier(IdentifierRule::new("order"));
        assert!(!text("identifier").with_role(identifier).is_writable());
        assert!(!text("id").with_role(FieldRole::ExternalId).is_writable());
        assert!(!text("created_at").with_role(FieldRole::Audit).is_writable());
    }

    #[test]
    fn identifier_from_components_or_key() {
        let mut rule = IdentifierRule::new("purchase-request");
        assert_eq!(rule.derive(7, |_| None), "purchase-request-7");

        rule.components = vec!["company".into(), "name".into()];
        let values = |c: &str| match c {
            "company" => Some("Acme Corp.".to_string()),
            "name" => Some("  Jane O'Neil ".to_string()),
            _ => None,
        };
        assert_eq!(rule.derive(7, values), "acme-corp-jane-o-neil");
        assert_eq!(rule.derive(7, |c| (c == "name").then(|| "--".to_string())), "purchase-request-7");
    }

    #[test]
    fn slug_collapses_separators() {
        assert_eq!(slug("Hello,  World!"), "hello-world");
        assert_eq!(slug("__x__"), "x");
        assert_eq!(slug("Ünïcode 42"), "n-code-42");
    }

    #[test]
    fn needs_value_only_for_required_without_default() {
        assert!(!text("title").needs_value());
        assert!(text("title").required().needs_value());
        assert!(!text("title")
            .required()
            .with_default(ColumnDefault::Literal(json!("x")))
            .needs_value());
    }

    #[test]
    fn declared_defaults() {
        assert_eq!(ColumnDefault::from_declared(&json!("now()")), ColumnDefault::Now);
        assert_eq!(
            ColumnDefault::from_declared(&json!("draft")),
            ColumnDefault::Literal(json!("draft"))
        );
    }
}
