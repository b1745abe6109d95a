use anyhow::Result;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    deps::{self, DepNode},
    error::{GraphError, ModuleError},
    graph::{BuildGraph, ModuleContext},
    loader::{self, ModuleDef},
    module::ModuleRegistry,
    ninja::{self, Regenerate},
};

/// Result of one generation pass over every module.
#[derive(Debug, Default)]
pub struct Generation {
    pub graph: BuildGraph,
    /// Per-module problems; those modules contributed no steps.
    pub errors: Vec<ModuleError>,
    /// Modules whose steps made it into the graph.
    pub generated: Vec<String>,
}

/// Run every module's action generation and collect the accepted steps.
///
/// Property errors are recovered per module. Duplicate outputs, dependency
/// cycles and template contract violations abort the pass.
pub fn generate_graph(config: &Config, defs: &[ModuleDef]) -> Result<Generation, GraphError> {
    let nodes: Vec<DepNode> = defs
        .iter()
        .enumerate()
        .map(|(index, d)| DepNode {
            name: d.name.clone(),
            index,
            requires: d.deps.clone(),
        })
        .collect();
    let ordered = deps::topo_sort(nodes)?;

    let by_name: BTreeMap<&str, &ModuleDef> = defs.iter().map(|d| (d.name.as_str(), d)).collect();
    let known: BTreeSet<&str> = by_name.keys().copied().collect();

    let mut out = Generation::default();
    let mut failed: BTreeSet<String> = BTreeSet::new();

    for node in ordered {
        let def = &defs[node.index];

        let mut dep_outputs = Vec::new();
        let mut dep_problems = Vec::new();
        for unknown in deps::unknown_requires(&node, &known) {
            dep_problems.push(format!("unknown module \"{unknown}\""));
        }
        for dep in node.requires.iter() {
            let Some(dep_def) = by_name.get(dep.as_str()) else {
                continue;
            };
            if failed.contains(dep) {
                dep_problems.push(format!("depends on module \"{dep}\" which has errors"));
                continue;
            }
            // Only outputs some accepted step produces; anything else would
            // be an input the executor has no rule for.
            for output in dep_def.module.outputs(config) {
                if out.graph.owner(&output).is_some() {
                    dep_outputs.push(output);
                } else {
                    dep_problems.push(format!("module \"{dep}\" does not produce {output}"));
                }
            }
        }

        let mut ctx = ModuleContext::new(config, &def.name, &def.dir, &def.file)
            .with_dependency_outputs(dep_outputs);
        for p in dep_problems {
            ctx.property_error("deps", p);
        }

        if !ctx.has_errors() {
            debug!("Generating {} module '{}'", def.type_name, def.name);
            def.module.generate_build_actions(&mut ctx)?;
        }

        let outcome = ctx.finish();
        if !outcome.errors.is_empty() {
            debug!(
                "Module '{}' reported {} error(s); skipping its steps",
                def.name,
                outcome.errors.len()
            );
            failed.insert(def.name.clone());
            out.errors.extend(outcome.errors);
            continue;
        }

        for step in outcome.steps {
            out.graph.add(step)?;
        }
        for dir in outcome.glob_dirs {
            out.graph.watch(dir);
        }
        out.generated.push(def.name.clone());
    }

    Ok(out)
}

/// What `generate_build_file` wrote.
#[derive(Debug)]
pub struct GenerationReport {
    pub build_file: PathBuf,
    pub modules: usize,
    pub steps: usize,
    pub errors: Vec<ModuleError>,
}

impl GenerationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Load every module under the root, generate the graph and write the
/// executor build file.
///
/// `regenerate_command`, when given, adds a self-regeneration edge to the
/// build file.
pub fn generate_build_file(
    config: &Config,
    registry: &ModuleRegistry,
    regenerate_command: Option<String>,
) -> Result<GenerationReport> {
    let defs = loader::load_modules(config, registry)?;
    if defs.is_empty() {
        warn!(
            "No modules found in {} files under {}",
            config.module_file,
            config.root.display()
        );
    }

    let generation = generate_graph(config, &defs)?;

    let regenerate = regenerate_command.map(|command| Regenerate {
        command,
        inputs: defs
            .iter()
            .map(|d| d.file.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    });

    let build_file = config.build_file_path();
    ninja::write(
        &generation.graph,
        &build_file,
        &config.base_output_dir,
        regenerate.as_ref(),
    )?;

    info!(
        "Generated {} ({} steps from {} modules)",
        build_file.display(),
        generation.graph.steps().len(),
        generation.generated.len()
    );

    Ok(GenerationReport {
        build_file,
        modules: defs.len(),
        steps: generation.graph.steps().len(),
        errors: generation.errors,
    })
}
