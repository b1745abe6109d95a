use std::fmt;

use thiserror::Error;

/// Errors raised while turning module definitions into a build graph.
///
/// `PatternResolution` is scoped to one module and is normally converted
/// into a [`ModuleError`] by the module itself. The rest are structural and
/// abort the whole generation.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cannot resolve files that match pattern {pattern}: {reason}")]
    PatternResolution { pattern: String, reason: String },

    #[error("output {output} is declared by both module \"{first}\" and module \"{second}\"")]
    DuplicateOutput {
        output: String,
        first: String,
        second: String,
    },

    #[error("rule {rule}: no binding supplied for ${variable}")]
    MissingBinding {
        rule: &'static str,
        variable: &'static str,
    },

    #[error("rule {rule}: ${variable} is not a declared variable")]
    UnknownBinding { rule: &'static str, variable: String },

    #[error("module \"{0}\" is defined more than once")]
    DuplicateModule(String),

    #[error("cycle detected in module deps: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("failed to invoke {executor}: {reason}")]
    ExecutorInvocation { executor: String, reason: String },
}

impl GraphError {
    pub(crate) fn pattern(pattern: &str, reason: impl fmt::Display) -> Self {
        Self::PatternResolution {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A recoverable problem with one property of one module.
///
/// The module that reported it contributes no steps; sibling modules are
/// unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleError {
    pub file: String,
    pub module: String,
    pub property: String,
    pub message: String,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: module \"{}\": {}: {}",
            self.file, self.module, self.property, self.message
        )
    }
}
