pub mod cli;
pub mod config;
pub mod deps;
pub mod error;
pub mod executor;
pub mod generate;
pub mod graph;
pub mod loader;
pub mod module;
pub mod modules;
pub mod ninja;
pub mod pattern;
pub mod rules;

// Convenience re-exports
pub use config::Config;
pub use error::{GraphError, ModuleError};
pub use generate::{generate_build_file, generate_graph, Generation, GenerationReport};
pub use graph::{BuildGraph, BuildParams, BuildStep, ModuleContext};
pub use module::{Module, ModuleFactory, ModuleRegistry, Named};
pub use modules::{GoBinary, GoBinaryProperties};
