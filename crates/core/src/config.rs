use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProberError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub rules_path: PathBuf,
    pub policies_path: PathBuf,
    pub collect_interval: Duration,
    pub reload_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let config_root = config_home().join("prober");
        Self {
            rules_path: config_root.join("rules.toml"),
            policies_path: config_root.join("policies.toml"),
            collect_interval: Duration::from_secs(10),
            reload_interval: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides();
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    rules_path: Option<PathBuf>,
    policies_path: Option<PathBuf>,
    collect_interval: Option<String>,
    reload_interval: Option<String>,
}

fn config_home() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"))
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("PROBER_CONFIG") {
        return PathBuf::from(path);
    }
    config_home().join("prober/config.toml")
}

fn load_file_overrides(path: &PathBuf) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| ProberError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| ProberError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides() -> ConfigOverrides {
    ConfigOverrides {
        rules_path: env::var("PROBER_RULES_PATH").ok().map(PathBuf::from),
        policies_path: env::var("PROBER_POLICIES_PATH").ok().map(PathBuf::from),
        collect_interval: env::var("PROBER_COLLECT_INTERVAL").ok(),
        reload_interval: env::var("PROBER_RELOAD_INTERVAL").ok(),
    }
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.rules_path {
        cfg.rules_path = v;
    }
    if let Some(v) = overrides.policies_path {
        cfg.policies_path = v;
    }
    if let Some(v) = overrides.collect_interval {
        cfg.collect_interval = parse_interval(&v, "collect_interval", source)?;
    }
    if let Some(v) = overrides.reload_interval {
        cfg.reload_interval = parse_interval(&v, "reload_interval", source)?;
    }
    Ok(())
}

fn parse_interval(raw: &str, field: &str, source: &str) -> Result<Duration> {
    let parsed = humantime::parse_duration(raw).map_err(|e| {
        ProberError::Config(format!("bad {field} in {source}: {e} (value={raw})"))
    })?;
    if parsed.is_zero() {
        return Err(ProberError::Config(format!(
            "bad {field} in {source}: must be greater than zero"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;

    use super::*;

    #[test]
    fn default_has_expected_intervals() {
        let cfg = Config::default();
        assert_eq!(cfg.collect_interval, Duration::from_secs(10));
        assert_eq!(cfg.reload_interval, Duration::from_secs(30));
        assert!(cfg.rules_path.ends_with("prober/rules.toml"));
    }

    #[test]
    fn apply_overrides_parses_intervals() {
        let mut cfg = Config::default();
        let file = ConfigOverrides {
            rules_path: Some(PathBuf::from("/etc/prober/rules.toml")),
            collect_interval: Some("15s".to_string()),
            reload_interval: Some("2m".to_string()),
            ..ConfigOverrides::default()
        };

        apply_overrides(&mut cfg, file, "config file").unwrap();

        assert_eq!(cfg.rules_path, PathBuf::from("/etc/prober/rules.toml"));
        assert_eq!(cfg.collect_interval, Duration::from_secs(15));
        assert_eq!(cfg.reload_interval, Duration::from_secs(120));
    }

    #[test]
    fn apply_overrides_rejects_bad_interval() {
        let mut cfg = Config::default();
        let bad = ConfigOverrides {
            collect_interval: Some("soon".to_string()),
            ..ConfigOverrides::default()
        };
        let err = apply_overrides(&mut cfg, bad, "environment").unwrap_err();
        assert!(err.to_string().contains("environment"));

        let zero = ConfigOverrides {
            reload_interval: Some("0s".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(apply_overrides(&mut cfg, zero, "config file").is_err());
    }

    #[test]
    #[serial]
    fn load_layers_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "collect_interval = \"20s\"").unwrap();
        writeln!(file, "policies_path = \"/srv/policies.toml\"").unwrap();

        // SAFETY: serialized with every other environment-mutating test.
        unsafe {
            env::set_var("PROBER_CONFIG", &path);
            env::set_var("PROBER_COLLECT_INTERVAL", "5s");
        }
        let cfg = Config::load();
        unsafe {
            env::remove_var("PROBER_CONFIG");
            env::remove_var("PROBER_COLLECT_INTERVAL");
        }

        let cfg = cfg.unwrap();
        assert_eq!(cfg.collect_interval, Duration::from_secs(5));
        assert_eq!(cfg.policies_path, PathBuf::from("/srv/policies.toml"));
    }
}
