use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::{
    config::Config,
    error::GraphError,
    graph::{BuildParams, ModuleContext},
    module::{self, Module, Named},
    pattern, rules,
};

pub const TYPE_NAME: &str = "go_binary";

/// Fields of a `[[go_binary]]` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GoBinaryProperties {
    /// Go package to build with `go build`.
    pub pkg: String,
    /// Package handed to `go test`.
    pub test_pkg: String,
    /// File name (under the bin dir) receiving test output.
    pub out_test_file: String,
    pub srcs: Vec<String>,
    pub srcs_exclude: Vec<String>,
    /// Test step is not a default target.
    pub optional: bool,
    /// Run `go mod vendor` before building.
    pub vendor_first: bool,
}

/// A Go command binary with an associated test run.
#[derive(Debug, Clone)]
pub struct GoBinary {
    name: String,
    properties: GoBinaryProperties,
}

pub fn factory(name: String, block: toml::Table) -> Result<Box<dyn Module>, toml::de::Error> {
    let properties = module::properties(block)?;
    Ok(Box::new(GoBinary::new(name, properties)))
}

impl GoBinary {
    pub fn new(name: impl Into<String>, properties: GoBinaryProperties) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    fn output_path(&self, config: &Config) -> String {
        config.bin_dir().join(&self.name).to_string_lossy().into_owned()
    }

    fn test_output_path(&self, config: &Config) -> String {
        let file = if self.properties.out_test_file.trim().is_empty() {
            format!("{}_test.log", self.name)
        } else {
            self.properties.out_test_file.clone()
        };
        config.bin_dir().join(file).to_string_lossy().into_owned()
    }
}

impl Named for GoBinary {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Module for GoBinary {
    fn generate_build_actions(&self, ctx: &mut ModuleContext<'_>) -> Result<(), GraphError> {
        let name = ctx.module_name().to_string();
        let work_dir = ctx.module_dir().to_string();
        debug!("Adding build actions for go binary module '{name}'");

        let output_path = self.output_path(ctx.config());
        let output_file = self.test_output_path(ctx.config());
        if output_file == output_path {
            ctx.property_error(
                "out_test_file",
                format!("test output {output_file} would overwrite the binary"),
            );
            return Ok(());
        }

        // 1) build inputs, exclusions applied
        let mut inputs = BTreeSet::new();
        let mut input_errors = false;
        for src in &self.properties.srcs {
            match ctx.glob_with_deps(src, &self.properties.srcs_exclude) {
                Ok(matches) => inputs.extend(matches),
                Err(err) => {
                    ctx.property_error("srcs", err.to_string());
                    input_errors = true;
                }
            }
        }
        if input_errors {
            return Ok(());
        }

        // 2) test inputs: same patterns, no exclusions
        let mut inputs_test = BTreeSet::new();
        for src in &self.properties.srcs {
            match ctx.glob_with_deps(src, &[]) {
                Ok(matches) => inputs_test.extend(matches),
                Err(err) => {
                    ctx.property_error("srcs", err.to_string());
                    return Ok(());
                }
            }
        }

        let mut inputs: Vec<String> = inputs.into_iter().collect();

        // 3) vendor
        if self.properties.vendor_first {
            let vendor_dir = pattern::join(&work_dir, "vendor");
            ctx.build(BuildParams {
                rule: &rules::VENDOR,
                description: format!("Vendor dependencies of {name}"),
                outputs: vec![vendor_dir.clone()],
                implicits: vec![pattern::join(&work_dir, "go.mod")],
                optional: true,
                args: bindings([("workDir", work_dir.as_str()), ("name", name.as_str())]),
            })?;
            inputs.push(vendor_dir);
        }

        // 4) build, only when there is something to build from
        if !inputs.is_empty() {
            for dep in ctx.dependency_outputs() {
                if !inputs.contains(dep) {
                    inputs.push(dep.clone());
                }
            }
            ctx.build(BuildParams {
                rule: &rules::BUILD,
                description: format!("Build {name} as Go binary"),
                outputs: vec![output_path.clone()],
                implicits: inputs,
                optional: false,
                args: bindings([
                    ("outputPath", output_path.as_str()),
                    ("workDir", work_dir.as_str()),
                    ("pkg", self.properties.pkg.as_str()),
                ]),
            })?;
        } else {
            debug!("No inputs for go binary module '{name}', skipping build step");
        }

        // 5) test, always
        ctx.build(BuildParams {
            rule: &rules::TEST,
            description: format!("Test {name}"),
            outputs: vec![output_file.clone()],
            implicits: inputs_test.into_iter().collect(),
            optional: self.properties.optional,
            args: bindings([
                ("outputFile", output_file.as_str()),
                ("workDir", work_dir.as_str()),
                ("pkgTest", self.properties.test_pkg.as_str()),
            ]),
        })?;

        Ok(())
    }

    fn outputs(&self, config: &Config) -> Vec<String> {
        vec![self.output_path(config)]
    }
}

fn bindings<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
