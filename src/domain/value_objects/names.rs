//! Naming helpers: qualified database names and identifier casing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// `schema.name` pair for any database object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parse `schema.name`; a bare name takes `default_schema`.
    pub fn parse(text: &str, default_schema: &str) -> Self {
        match text.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Self::new(default_schema, text),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// `PurchaseOrder` -> `purchase_order`, `HTTPRoute` -> `http_route`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' {
            out.push('_');
            continue;
        }
        if c.is_uppercase() {
            let prev = if i > 0 { chars.get(i - 1) } else { None };
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `qualify_lead` -> `qualifyLead`.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in snake_case(name).chars() {
        if c == '_' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_handles_acronyms_and_digits() {
        assert_eq!(snake_case("PurchaseOrder"), "purchase_order");
        assert_eq!(snake_case("HTTPRoute"), "http_route");
        assert_eq!(snake_case("lead"), "lead");
        assert_eq!(snake_case("Order2Line"), "order2_line");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn camel_case_from_snake() {
        assert_eq!(camel_case("qualify_lead"), "qualifyLead");
        assert_eq!(camel_case("Lead"), "lead");
        assert_eq!(camel_case("PurchaseOrder"), "purchaseOrder");
    }

    #[test]
    fn qualified_name_parse() {
        assert_eq!(QualifiedName::parse("app.result", "crm").to_string(), "app.result");
        assert_eq!(QualifiedName::parse("result", "crm").to_string(), "crm.result");
    }
}
