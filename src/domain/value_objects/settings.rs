//! Compile-run settings visible to the domain layer.
//!
//! Built from [`crate::config::CompileConfig`]; the domain never reads
//! configuration files itself.

use super::QualifiedName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub table_prefix: String,
    pub view_prefix: String,
    pub result_type: QualifiedName,
    pub audit_fields: bool,
    pub soft_delete: bool,
    pub identity_helpers: bool,
    pub template_max_depth: usize,
    pub dependency_max_depth: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            table_prefix: "tb_".to_string(),
            view_prefix: "mv_".to_string(),
            result_type: QualifiedName::new("app", "mutation_result"),
            audit_fields: true,
            soft_delete: true,
            identity_helpers: true,
            template_max_depth: 5,
            dependency_max_depth: 10,
        }
    }
}

impl ModelSettings {
    /// Soft delete needs the `deleted_at` audit column.
    pub fn soft_delete_enabled(&self) -> bool {
        self.audit_fields && self.soft_delete
    }
}
