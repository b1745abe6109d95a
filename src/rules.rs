use std::collections::BTreeMap;

use crate::error::GraphError;

/// A fixed executor command with named `$placeholders`.
///
/// Every placeholder listed in `variables` must be bound by each step that
/// uses the rule, and nothing else may be bound.
#[derive(Debug, PartialEq, Eq)]
pub struct RuleTemplate {
    pub name: &'static str,
    pub command: &'static str,
    pub description: &'static str,
    pub variables: &'static [&'static str],
}

/// Materialize a module's external dependencies before compiling.
pub static VENDOR: RuleTemplate = RuleTemplate {
    name: "go_vendor",
    command: "cd $workDir && go mod vendor",
    description: "vendor dependencies of $name",
    variables: &["workDir", "name"],
};

pub static BUILD: RuleTemplate = RuleTemplate {
    name: "go_build",
    command: "cd $workDir && go build -o $outputPath $pkg",
    description: "build go command $pkg",
    variables: &["workDir", "outputPath", "pkg"],
};

pub static TEST: RuleTemplate = RuleTemplate {
    name: "go_test",
    command: "cd $workDir && go test -v -bench=. -benchtime=100x $pkgTest > $outputFile",
    description: "go test $pkgTest",
    variables: &["workDir", "pkgTest", "outputFile"],
};

impl RuleTemplate {
    /// Check that `args` binds exactly the declared variables.
    pub fn check_bindings(&self, args: &BTreeMap<String, String>) -> Result<(), GraphError> {
        for var in self.variables {
            if !args.contains_key(*var) {
                return Err(GraphError::MissingBinding {
                    rule: self.name,
                    variable: var,
                });
            }
        }

        if let Some(extra) = args.keys().find(|k| !self.variables.iter().any(|v| *v == k.as_str())) {
            return Err(GraphError::UnknownBinding {
                rule: self.name,
                variable: extra.clone(),
            });
        }

        Ok(())
    }
}
