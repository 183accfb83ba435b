//! Compile Module
//!
//! Orchestrates one compile run for Strata.
//!
//! ## Structure
//!
//! - `result` - Result types (`CompileOutput`, `CompileFailure`)
//! - `use_case` - Core use case logic (`CompilePipeline`)
//!
//! ## Usage
//!
//! ```ignore
//! use strata::application::compile::CompilePipeline;
//!
//! let pipeline = CompilePipeline::from_config(&config);
//! let output = pipeline.run(&bundle)?;
//! println!("{}", output.script(Target::Postgres));
//! ```

mod result;
mod use_case;

pub use result::{CompileFailure, CompileOutput};
pub use use_case::CompilePipeline;
