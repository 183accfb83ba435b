//! Every registered scalar type maps to a column type.

use strata::domain::types::TypeRegistry;

/// CONTRACT: `to_target_type` is defined for every builtin and stable
#[test]
fn contract_builtin_types_map_stably() {
    let registry = TypeRegistry::builtin().unwrap();
    assert!(!registry.is_empty());

    for name in registry.names() {
        let first = registry.to_target_type(name).unwrap();
        let again = registry.to_target_type(name).unwrap();
        assert_eq!(first, again, "{}", name);
        assert!(!first.to_string().is_empty(), "{}", name);
    }
}

/// CONTRACT: Separate registries agree
#[test]
fn contract_registries_are_independent_but_equal() {
    let a = TypeRegistry::builtin().unwrap();
    let b = TypeRegistry::builtin().unwrap();
    let names: Vec<&str> = a.names().collect();
    assert_eq!(names, b.names().collect::<Vec<_>>());
    for name in names {
        assert_eq!(a.to_target_type(name).unwrap(), b.to_target_type(name).unwrap());
    }
}

/// CONTRACT: Unknown names are errors, not defaults
#[test]
fn contract_unknown_type_is_error() {
    let registry = TypeRegistry::builtin().unwrap();
    assert!(registry.to_target_type("emial").is_err());
}
