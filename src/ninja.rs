use anyhow::{Context as _, Result};
use minijinja::Environment;
use serde::Serialize;
use serde_json::json;
use std::path::Path;

use crate::graph::BuildGraph;

const TEMPLATE: &str = r#"# Generated by modgraph. Do not edit.
ninja_required_version = 1.7
builddir = {{ builddir }}
{% for rule in rules %}

rule {{ rule.name }}
  command = {{ rule.command }}
  description = {{ rule.description }}
{% if rule.generator %}
  generator = 1
{% endif %}
{% endfor %}
{% for step in steps %}

{% if step.comment %}
# {{ step.comment }}
{% endif %}
{{ step.header }}
{% for b in step.bindings %}
  {{ b.key }} = {{ b.value }}
{% endfor %}
{% endfor %}

default {{ defaults }}
"#;

pub const REGENERATE_RULE: &str = "regenerate";

/// Default target used when every step is optional and there is no
/// regeneration edge to point at.
pub const NOTHING_TARGET: &str = "modgraph_nothing";

#[derive(Debug, Serialize)]
struct RuleView {
    name: String,
    command: String,
    description: String,
    generator: bool,
}

#[derive(Debug, Serialize)]
struct StepView {
    comment: String,
    header: String,
    bindings: Vec<Binding>,
}

#[derive(Debug, Serialize)]
struct Binding {
    key: String,
    value: String,
}

/// How the build file rebuilds itself when module files or searched
/// directories change.
#[derive(Debug, Clone)]
pub struct Regenerate {
    /// Shell command that rewrites the build file.
    pub command: String,
    /// Module files feeding the generation.
    pub inputs: Vec<String>,
}

/// Render the graph as a Ninja build file.
pub fn render(
    graph: &BuildGraph,
    build_file: &Path,
    builddir: &Path,
    regenerate: Option<&Regenerate>,
) -> Result<String> {
    let mut rules: Vec<RuleView> = graph
        .rules()
        .into_iter()
        .map(|r| RuleView {
            name: r.name.to_string(),
            command: r.command.to_string(),
            description: r.description.to_string(),
            generator: false,
        })
        .collect();

    let mut steps: Vec<StepView> = Vec::with_capacity(graph.steps().len() + 1);

    if let Some(regen) = regenerate {
        rules.push(RuleView {
            name: REGENERATE_RULE.to_string(),
            command: regen.command.clone(),
            description: "regenerate build file".to_string(),
            generator: true,
        });

        let mut implicits: Vec<&str> = regen.inputs.iter().map(String::as_str).collect();
        implicits.extend(graph.watched());
        implicits.sort_unstable();
        implicits.dedup();

        let target = build_file.to_string_lossy().into_owned();
        steps.push(StepView {
            comment: String::new(),
            header: header(&[target.as_str()], REGENERATE_RULE, &implicits),
            bindings: Vec::new(),
        });
    }

    for s in graph.steps() {
        let outputs: Vec<&str> = s.outputs.iter().map(String::as_str).collect();
        let implicits: Vec<&str> = s.implicits.iter().map(String::as_str).collect();

        let bindings = s
            .args
            .iter()
            .map(|(k, v)| Binding {
                key: k.clone(),
                value: escape_value(v),
            })
            .collect();

        steps.push(StepView {
            comment: s.description.replace(|c: char| c == '\n' || c == '\r', " "),
            header: header(&outputs, s.rule.name, &implicits),
            bindings,
        });
    }

    // Without a default statement the executor builds every top-level
    // output, optional steps included.
    let mut defaults: Vec<String> = graph.default_targets().into_iter().map(escape_path).collect();
    if defaults.is_empty() {
        if regenerate.is_some() {
            defaults.push(escape_path(&build_file.to_string_lossy()));
        } else {
            steps.push(StepView {
                comment: String::new(),
                header: header(&[NOTHING_TARGET], "phony", &[]),
                bindings: Vec::new(),
            });
            defaults.push(NOTHING_TARGET.to_string());
        }
    }
    let defaults = defaults.join(" ");

    let ctx = json!({
        "builddir": escape_path(&builddir.to_string_lossy()),
        "rules": rules,
        "steps": steps,
        "defaults": defaults,
    });

    render_minijinja(TEMPLATE, &ctx)
}

/// Render and write the build file, creating its directory.
pub fn write(
    graph: &BuildGraph,
    build_file: &Path,
    builddir: &Path,
    regenerate: Option<&Regenerate>,
) -> Result<()> {
    let text = render(graph, build_file, builddir, regenerate)?;
    if let Some(parent) = build_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    std::fs::write(build_file, text)
        .with_context(|| format!("failed to write {}", build_file.display()))?;
    Ok(())
}

fn header(outputs: &[&str], rule: &str, implicits: &[&str]) -> String {
    let mut out = String::from("build ");
    out.push_str(&join_paths(outputs));
    out.push_str(": ");
    out.push_str(rule);
    if !implicits.is_empty() {
        out.push_str(" | ");
        out.push_str(&join_paths(implicits));
    }
    out
}

fn join_paths(paths: &[&str]) -> String {
    paths
        .iter()
        .map(|p| escape_path(p))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape a path for use in a `build` or `default` line.
pub fn escape_path(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '$' => out.push_str("$$"),
            ' ' => out.push_str("$ "),
            ':' => out.push_str("$:"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape a variable value; only `$` is special there.
pub fn escape_value(s: &str) -> String {
    s.replace('$', "$$")
}

fn render_minijinja(source: &str, ctx_json: &serde_json::Value) -> Result<String> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);

    env.add_template("build.ninja", source)?;
    let tpl = env.get_template("build.ninja")?;
    let v = minijinja::value::Value::from_serialize(ctx_json);
    let mut text = tpl.render(v)?;
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}
