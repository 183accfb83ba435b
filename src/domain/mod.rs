//! Domain Layer
//!
//! This is the core of Strata - pure compilation logic without I/O dependencies.
//!
//! ## Structure
//!
//! - `value_objects/` - Immutable value types (QualifiedName, ArtifactId, Diagnostic)
//! - `types/` - Type Registry
//! - `entities/` - Entities, actions, declarations and artifacts
//! - `services/` - Entity Model, artifact building and ordering
//! - `patterns/` - Closed pattern catalogue
//! - `actions/` - Expression language, routine IR and the Action Compiler
//! - `ports/` - Interface definitions for infrastructure
//!
//! ## Design Principles
//!
//! 1. **No I/O** - This layer never touches the file system or network directly
//! 2. **Explicit context** - The type registry and settings are passed in, never global
//! 3. **Ports & Adapters** - Rendering and observability go through trait-defined ports

pub mod actions;
pub mod entities;
pub mod patterns;
pub mod ports;
pub mod services;
pub mod types;
pub mod value_objects;
