use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::Config,
    error::{GraphError, ModuleError},
    pattern,
    rules::RuleTemplate,
};

/// What a module asks for when it emits a step.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub rule: &'static RuleTemplate,
    pub description: String,
    pub outputs: Vec<String>,
    pub implicits: Vec<String>,
    pub optional: bool,
    pub args: BTreeMap<String, String>,
}

/// One unit of external work, owned by the graph once accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStep {
    pub module: String,
    pub rule: &'static RuleTemplate,
    pub description: String,
    pub outputs: Vec<String>,
    pub implicits: Vec<String>,
    pub optional: bool,
    pub args: BTreeMap<String, String>,
}

/// Accumulated steps for the whole project.
#[derive(Debug, Default)]
pub struct BuildGraph {
    steps: Vec<BuildStep>,
    owners: BTreeMap<String, String>,
    watched: BTreeSet<String>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a step. Outputs are unique across the whole graph.
    pub fn add(&mut self, step: BuildStep) -> Result<(), GraphError> {
        for out in &step.outputs {
            if let Some(first) = self.owners.get(out) {
                return Err(GraphError::DuplicateOutput {
                    output: out.clone(),
                    first: first.clone(),
                    second: step.module.clone(),
                });
            }
        }
        for out in &step.outputs {
            self.owners.insert(out.clone(), step.module.clone());
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    /// Module whose step produces `output`, if any.
    pub fn owner(&self, output: &str) -> Option<&str> {
        self.owners.get(output).map(String::as_str)
    }

    /// Rules in order of first use.
    pub fn rules(&self) -> Vec<&'static RuleTemplate> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for s in &self.steps {
            if seen.insert(s.rule.name) {
                out.push(s.rule);
            }
        }
        out
    }

    /// Outputs the executor builds when no target is named.
    pub fn default_targets(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !s.optional)
            .flat_map(|s| s.outputs.iter().map(String::as_str))
            .collect()
    }

    /// Record a path whose change means the build file must be regenerated.
    pub fn watch(&mut self, path: impl Into<String>) {
        self.watched.insert(path.into());
    }

    pub fn watched(&self) -> impl Iterator<Item = &str> {
        self.watched.iter().map(String::as_str)
    }
}

/// Per-module view of the graph handed to a module while it generates.
///
/// Steps and errors are buffered here; the caller commits the steps only if
/// the module reported no errors.
#[derive(Debug)]
pub struct ModuleContext<'a> {
    config: &'a Config,
    name: &'a str,
    dir: &'a str,
    file: &'a str,
    dep_outputs: Vec<String>,
    steps: Vec<BuildStep>,
    errors: Vec<ModuleError>,
    glob_dirs: BTreeSet<String>,
}

/// Everything a module produced during one generation pass.
#[derive(Debug, Default)]
pub struct ModuleOutcome {
    pub steps: Vec<BuildStep>,
    pub errors: Vec<ModuleError>,
    pub glob_dirs: BTreeSet<String>,
}

impl<'a> ModuleContext<'a> {
    pub fn new(config: &'a Config, name: &'a str, dir: &'a str, file: &'a str) -> Self {
        Self {
            config,
            name,
            dir,
            file,
            dep_outputs: Vec::new(),
            steps: Vec::new(),
            errors: Vec::new(),
            glob_dirs: BTreeSet::new(),
        }
    }

    pub fn with_dependency_outputs(mut self, outputs: Vec<String>) -> Self {
        self.dep_outputs = outputs;
        self
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn module_name(&self) -> &str {
        self.name
    }

    /// Root-relative directory of the module file (`.` for the root).
    pub fn module_dir(&self) -> &str {
        self.dir
    }

    /// Artifacts of the modules listed in this module's `deps`.
    pub fn dependency_outputs(&self) -> &[String] {
        &self.dep_outputs
    }

    /// Resolve a source pattern and register the searched directories as
    /// regeneration dependencies.
    pub fn glob_with_deps(
        &mut self,
        pattern: &str,
        excludes: &[String],
    ) -> Result<Vec<String>, GraphError> {
        let found = pattern::resolve(&self.config.root, self.dir, pattern, excludes)?;

        // Build outputs change on every run; watching them would regenerate
        // the build file after each build.
        let out_dir = self
            .config
            .base_output_dir
            .strip_prefix(&self.config.root)
            .ok()
            .map(|p| p.to_string_lossy().into_owned());
        self.glob_dirs.extend(found.dirs.into_iter().filter(|d| match &out_dir {
            Some(out) => !is_within(d, out),
            None => true,
        }));
        Ok(found.files)
    }

    /// Emit a step. Template bindings are checked here, not by the executor.
    ///
    /// A binding or path containing a line break cannot be written to the
    /// build file; it becomes a property error and the step is dropped.
    pub fn build(&mut self, params: BuildParams) -> Result<(), GraphError> {
        params.rule.check_bindings(&params.args)?;

        if let Some((var, _)) = params.args.iter().find(|(_, v)| has_line_break(v)) {
            self.property_error(var, format!("value bound to ${var} contains a line break"));
            return Ok(());
        }
        if let Some(path) = params
            .outputs
            .iter()
            .chain(params.implicits.iter())
            .find(|p| has_line_break(p))
        {
            self.property_error("srcs", format!("path {path:?} contains a line break"));
            return Ok(());
        }

        if let Some(dup) = params
            .outputs
            .iter()
            .find(|o| self.steps.iter().any(|s| s.outputs.contains(*o)))
        {
            return Err(GraphError::DuplicateOutput {
                output: dup.clone(),
                first: self.name.to_string(),
                second: self.name.to_string(),
            });
        }

        self.steps.push(BuildStep {
            module: self.name.to_string(),
            rule: params.rule,
            description: params.description,
            outputs: params.outputs,
            implicits: params.implicits,
            optional: params.optional,
            args: params.args,
        });
        Ok(())
    }

    pub fn property_error(&mut self, property: &str, message: impl Into<String>) {
        self.errors.push(ModuleError {
            file: self.file.to_string(),
            module: self.name.to_string(),
            property: property.to_string(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn finish(self) -> ModuleOutcome {
        ModuleOutcome {
            steps: self.steps,
            errors: self.errors,
            glob_dirs: self.glob_dirs,
        }
    }
}

fn is_within(dir: &str, ancestor: &str) -> bool {
    dir == ancestor
        || dir
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn has_line_break(s: &str) -> bool {
    s.contains(|c: char| c == '\n' || c == '\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules;
    use tempfile::TempDir;

    fn step(module: &str, out: &str, optional: bool) -> BuildStep {
        BuildStep {
            module: module.to_string(),
            rule: &rules::BUILD,
            description: format!("Build {module}"),
            outputs: vec![out.to_string()],
            implicits: vec![],
            optional,
            args: BTreeMap::new(),
        }
    }

    #[test]
    fn duplicate_outputs_across_modules_are_fatal() {
        let mut g = BuildGraph::new();
        g.add(step("a", "out/bin/x", false)).unwrap();

        let err = g.add(step("b", "out/bin/x", false)).unwrap_err();
        match err {
            GraphError::DuplicateOutput { output, first, second } => {
                assert_eq!(output, "out/bin/x");
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(g.steps().len(), 1);
    }

    #[test]
    fn optional_steps_are_not_default_targets() {
        let mut g = BuildGraph::new();
        g.add(step("a", "out/bin/a", false)).unwrap();
        g.add(step("b", "out/bin/b", true)).unwrap();

        assert_eq!(g.default_targets(), vec!["out/bin/a"]);
        assert_eq!(g.rules(), vec![&rules::BUILD]);
    }

    #[test]
    fn context_rejects_incomplete_bindings() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::new(tmp.path()).unwrap();
        let mut ctx = ModuleContext::new(&cfg, "app", ".", "build.toml");

        let mut args = BTreeMap::new();
        args.insert("workDir".to_string(), ".".to_string());

        let err = ctx
            .build(BuildParams {
                rule: &rules::VENDOR,
                description: "Vendor dependencies of app".to_string(),
                outputs: vec!["vendor".to_string()],
                implicits: vec!["go.mod".to_string()],
                optional: true,
                args,
            })
            .unwrap_err();

        assert!(matches!(err, GraphError::MissingBinding { variable: "name", .. }));
        assert!(ctx.finish().steps.is_empty());
    }

    #[test]
    fn line_breaks_in_bindings_become_property_errors() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::new(tmp.path()).unwrap();
        let mut ctx = ModuleContext::new(&cfg, "app", ".", "build.toml");

        let mut args = BTreeMap::new();
        args.insert("workDir".to_string(), ".".to_string());
        args.insert("outputPath".to_string(), "out/bin/app".to_string());
        args.insert("pkg".to_string(), "./cmd\nbuild evil: phony".to_string());

        ctx.build(BuildParams {
            rule: &rules::BUILD,
            description: "Build app as Go binary".to_string(),
            outputs: vec!["out/bin/app".to_string()],
            implicits: vec![],
            optional: false,
            args,
        })
        .unwrap();

        let outcome = ctx.finish();
        assert!(outcome.steps.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].property, "pkg");
    }

    #[test]
    fn output_dir_is_not_watched() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("main.go"), "package main\n").unwrap();
        std::fs::create_dir_all(tmp.path().join("out/bin")).unwrap();
        std::fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        let cfg = Config::new(tmp.path()).unwrap();
        let mut ctx = ModuleContext::new(&cfg, "app", ".", "build.toml");

        let files = ctx.glob_with_deps("**/*.go", &[]).unwrap();
        assert_eq!(files, vec!["main.go"]);

        let dirs: Vec<String> = ctx.finish().glob_dirs.into_iter().collect();
        assert_eq!(dirs, vec![".", "pkg"]);
    }

    #[test]
    fn owner_reports_the_producing_module() {
        let mut g = BuildGraph::new();
        g.add(step("gen", "out/bin/gen", false)).unwrap();

        assert_eq!(g.owner("out/bin/gen"), Some("gen"));
        assert_eq!(g.owner("out/bin/app"), None);
    }

    #[test]
    fn property_errors_carry_scope() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::new(tmp.path()).unwrap();
        let mut ctx = ModuleContext::new(&cfg, "app", "cmd/app", "cmd/app/build.toml");

        ctx.property_error("srcs", "bad pattern");
        assert!(ctx.has_errors());

        let outcome = ctx.finish();
        assert_eq!(
            outcome.errors[0].to_string(),
            "cmd/app/build.toml: module \"app\": srcs: bad pattern"
        );
    }
}
