use anyhow::{bail, Context as _, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "modgraph.toml";

/// Process-wide generation settings.
///
/// Loaded once before generation and only ever borrowed afterwards, so every
/// module sees the same values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where artifacts and the build file go. Relative values are taken
    /// against the project root.
    pub base_output_dir: PathBuf,

    /// File name holding declarative module blocks.
    pub module_file: String,

    /// File name of the generated executor build file.
    pub build_file: String,

    /// Executor binary invoked after generation.
    pub executor: String,

    #[serde(skip)]
    pub root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_output_dir: PathBuf::from("out"),
            module_file: "build.toml".to_string(),
            build_file: "build.ninja".to_string(),
            executor: "ninja".to_string(),
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Defaults anchored at `root`, without consulting files or env.
    pub fn new(root: &Path) -> Result<Self> {
        Self::default().anchor(root)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Config path precedence:
    /// 1) CLI --config (must exist)
    /// 2) MODGRAPH_CONFIG (must exist)
    /// 3) <root>/modgraph.toml (if present)
    /// 4) built-in defaults
    ///
    /// MODGRAPH_OUT_DIR overrides base_output_dir in every case.
    pub fn locate(root: &Path, cli_config: Option<&Path>) -> Result<Self> {
        let mut cfg = if let Some(p) = cli_config {
            if !p.exists() {
                bail!("--config was provided but file does not exist: {}", p.display());
            }
            Self::load_from_path(p)?
        } else if let Some(p) = env_path("MODGRAPH_CONFIG") {
            if !p.exists() {
                bail!(
                    "MODGRAPH_CONFIG is set but file does not exist: {}",
                    p.display()
                );
            }
            Self::load_from_path(&p)?
        } else {
            let p = root.join(CONFIG_FILE_NAME);
            if p.is_file() {
                Self::load_from_path(&p)?
            } else {
                Self::default()
            }
        };

        if let Some(out) = env_path("MODGRAPH_OUT_DIR") {
            cfg.base_output_dir = out;
        }

        cfg.anchor(root)
    }

    fn anchor(mut self, root: &Path) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("project root does not exist: {}", root.display()))?;

        if self.base_output_dir.is_relative() {
            self.base_output_dir = root.join(&self.base_output_dir);
        }
        if self.module_file.trim().is_empty() {
            bail!("module_file cannot be empty");
        }
        if self.build_file.trim().is_empty() {
            bail!("build_file cannot be empty");
        }

        self.root = root;
        Ok(self)
    }

    /// Directory receiving binaries and test logs.
    pub fn bin_dir(&self) -> PathBuf {
        self.base_output_dir.join("bin")
    }

    pub fn build_file_path(&self) -> PathBuf {
        self.base_output_dir.join(&self.build_file)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_anchored_at_root() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::new(tmp.path()).unwrap();
        let root = tmp.path().canonicalize().unwrap();

        assert_eq!(cfg.root, root);
        assert_eq!(cfg.base_output_dir, root.join("out"));
        assert_eq!(cfg.bin_dir(), root.join("out").join("bin"));
        assert_eq!(cfg.build_file_path(), root.join("out").join("build.ninja"));
        assert_eq!(cfg.executor, "ninja");
    }

    #[test]
    fn cli_config_overrides_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(
            &path,
            "base_output_dir = \"target/gen\"\nexecutor = \"samu\"\n",
        )
        .unwrap();

        let cfg = Config::locate(tmp.path(), Some(&path)).unwrap();
        let root = tmp.path().canonicalize().unwrap();

        assert_eq!(cfg.base_output_dir, root.join("target/gen"));
        assert_eq!(cfg.executor, "samu");
        assert_eq!(cfg.module_file, "build.toml");
    }

    #[test]
    fn missing_cli_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.toml");

        let err = Config::locate(tmp.path(), Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "base_output = \"out\"\n").unwrap();

        assert!(Config::load_from_path(&path).is_err());
    }
}
