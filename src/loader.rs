use anyhow::{anyhow, bail, Context as _, Result};
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};
use tracing::debug;
use walkdir::WalkDir;

use crate::{config::Config, module::Module, module::ModuleRegistry};

/// One module block after loading.
#[derive(Debug)]
pub struct ModuleDef {
    pub type_name: String,
    pub name: String,
    pub deps: Vec<String>,
    /// Root-relative directory of the defining file (`.` for the root).
    pub dir: String,
    /// Root-relative path of the defining file.
    pub file: String,
    pub module: Box<dyn Module>,
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.+-]*$").expect("valid module name regex"))
}

/// Every module file under the root, in sorted order.
/// Hidden directories, `vendor/` and the output directory are skipped.
pub fn discover_module_files(config: &Config) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();

    let walker = WalkDir::new(&config.root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !(name.starts_with('.') || name == "vendor" || e.path() == config.base_output_dir)
        });

    for entry in walker {
        let entry = entry.with_context(|| {
            format!("failed to walk project root {}", config.root.display())
        })?;
        if entry.file_type().is_file() && entry.file_name() == config.module_file.as_str() {
            out.push(entry.into_path());
        }
    }

    Ok(out)
}

/// Parse one module file into module definitions, in file order.
pub fn load_module_file(
    config: &Config,
    registry: &ModuleRegistry,
    path: &Path,
) -> Result<Vec<ModuleDef>> {
    let file = relative(&config.root, path);
    let dir = path
        .parent()
        .map(|p| relative(&config.root, p))
        .unwrap_or_else(|| ".".to_string());

    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read module file {}", path.display()))?;
    let doc: toml::Table =
        toml::from_str(&text).with_context(|| format!("{file}: failed to parse module file"))?;

    let mut defs = Vec::new();

    for (type_name, blocks) in doc {
        let factory = registry.get(&type_name).ok_or_else(|| {
            anyhow!(
                "{file}: unknown module type '{type_name}' (known: {})",
                registry.type_names().collect::<Vec<_>>().join(", ")
            )
        })?;

        let toml::Value::Array(blocks) = blocks else {
            bail!("{file}: '{type_name}' must be an array of tables ([[{type_name}]])");
        };

        for (idx, block) in blocks.into_iter().enumerate() {
            let toml::Value::Table(mut block) = block else {
                bail!("{file}: {type_name}[{idx}] must be a table");
            };

            let name = match block.remove("name") {
                Some(toml::Value::String(s)) => s,
                Some(_) => bail!("{file}: {type_name}[{idx}]: name must be a string"),
                None => bail!("{file}: {type_name}[{idx}]: name is required"),
            };
            if !name_re().is_match(&name) {
                bail!("{file}: {type_name}[{idx}]: invalid module name '{name}'");
            }

            let deps: Vec<String> = match block.remove("deps") {
                Some(v) => v
                    .try_into()
                    .with_context(|| format!("{file}: module \"{name}\": deps must be a list of names"))?,
                None => Vec::new(),
            };

            let module = factory(name.clone(), block)
                .with_context(|| format!("{file}: module \"{name}\": invalid properties"))?;

            debug!("Loaded {type_name} module '{name}' from {file}");

            defs.push(ModuleDef {
                type_name: type_name.clone(),
                name,
                deps,
                dir: dir.clone(),
                file: file.clone(),
                module,
            });
        }
    }

    Ok(defs)
}

/// Discover and load every module under the root.
pub fn load_modules(config: &Config, registry: &ModuleRegistry) -> Result<Vec<ModuleDef>> {
    let mut defs = Vec::new();
    for path in discover_module_files(config)? {
        defs.extend(load_module_file(config, registry, &path)?);
    }
    Ok(defs)
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let s = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if s.is_empty() {
        ".".to_string()
    } else {
        s
    }
}
