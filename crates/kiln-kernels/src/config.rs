//! Adapter configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::KernelError;
use crate::Result;

pub const ENV_DEBUG: &str = "KILN_DEBUG";
pub const ENV_DEBUG_SKIP_LAUNCH: &str = "KILN_DEBUG_SKIP_LAUNCH";
pub const ENV_ARCH: &str = "KILN_ARCH";
pub const ENV_CODE_OBJECT_DIR: &str = "KILN_CODE_OBJECT_DIR";

/// Settings for one `HipAdapter`.
///
/// Lazy loading is armed at construction only when both `architecture` and
/// `code_object_dir` are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Adapter name used in reports and logs.
    pub name: String,

    /// Log the loaded-module report after every load.
    pub debug: bool,

    /// Resolve and validate launches but never submit them.
    pub debug_skip_launch: bool,

    /// Device architecture (e.g. "gfx90a") for lazy loading.
    pub architecture: Option<String>,

    /// Directory holding per-kernel and per-architecture code objects.
    pub code_object_dir: Option<PathBuf>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: "hip".into(),
            debug: false,
            debug_skip_launch: false,
            architecture: None,
            code_object_dir: None,
        }
    }
}

impl AdapterConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| KernelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text)
            .map_err(|e| KernelError::Config(format!("{}: {e}", path.display())))
    }

    /// Defaults overridden by `KILN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (an environment-like key → value source).
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup(ENV_DEBUG) {
            self.debug = parse_flag(ENV_DEBUG, &v)?;
        }
        if let Some(v) = lookup(ENV_DEBUG_SKIP_LAUNCH) {
            self.debug_skip_launch = parse_flag(ENV_DEBUG_SKIP_LAUNCH, &v)?;
        }
        if let Some(v) = lookup(ENV_ARCH).filter(|v| !v.is_empty()) {
            self.architecture = Some(v);
        }
        if let Some(v) = lookup(ENV_CODE_OBJECT_DIR).filter(|v| !v.is_empty()) {
            self.code_object_dir = Some(PathBuf::from(v));
        }
        Ok(self)
    }

    /// Architecture and directory, if both are configured.
    pub fn lazy_target(&self) -> Option<(&str, &Path)> {
        match (&self.architecture, &self.code_object_dir) {
            (Some(arch), Some(dir)) => Some((arch.as_str(), dir.as_path())),
            _ => None,
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(KernelError::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AdapterConfig::default();
        assert_eq!(cfg.name, "hip");
        assert!(!cfg.debug);
        assert!(cfg.lazy_target().is_none());
    }

    #[test]
    fn test_json_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.json");
        std::fs::write(&path, r#"{"debug": true, "architecture": "gfx942"}"#).unwrap();

        let cfg = AdapterConfig::from_json_file(&path).unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.architecture.as_deref(), Some("gfx942"));
        assert_eq!(cfg.name, "hip");
        assert!(cfg.lazy_target().is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = AdapterConfig {
            name: "gemm".into(),
            debug: true,
            debug_skip_launch: true,
            architecture: Some("gfx90a".into()),
            code_object_dir: Some(PathBuf::from("/opt/kernels")),
        };
        let text = serde_json::to_string(&cfg).unwrap();
        let back: AdapterConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cfg);
        assert_eq!(
            back.lazy_target(),
            Some(("gfx90a", Path::new("/opt/kernels")))
        );
    }

    #[test]
    fn test_json_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ debug: ").unwrap();
        let err = AdapterConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let cfg = AdapterConfig::default()
            .with_overrides(env(&[
                (ENV_DEBUG, "1"),
                (ENV_DEBUG_SKIP_LAUNCH, "off"),
                (ENV_ARCH, "gfx1100"),
                (ENV_CODE_OBJECT_DIR, "/tmp/co"),
            ]))
            .unwrap();
        assert!(cfg.debug);
        assert!(!cfg.debug_skip_launch);
        assert_eq!(cfg.lazy_target(), Some(("gfx1100", Path::new("/tmp/co"))));
    }

    #[test]
    fn test_env_bad_flag() {
        let err = AdapterConfig::default()
            .with_overrides(env(&[(ENV_DEBUG_SKIP_LAUNCH, "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_DEBUG_SKIP_LAUNCH));
    }
}
