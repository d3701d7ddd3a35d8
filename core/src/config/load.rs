use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default tajaa data directory: ~/.tajaa
pub fn get_tajaa_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".tajaa"))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)?;
    Ok(cfg)
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.tajaa/config.toml (highest)
    let user_config = get_tajaa_data_dir()?.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

/// Environment variable overrides (Priority 0: highest).
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("TAJAA_MAX_CONCURRENT") {
        match v.trim().parse::<usize>() {
            Ok(n) => cfg.supervisor.max_concurrent = n,
            Err(_) => tracing::warn!(key = "TAJAA_MAX_CONCURRENT", value = %v, "ignoring invalid override"),
        }
    }
    if let Some(v) = non_empty("TAJAA_PARALLEL_MAX") {
        match v.trim().parse::<usize>() {
            Ok(n) => cfg.parallel.max_concurrent = n,
            Err(_) => tracing::warn!(key = "TAJAA_PARALLEL_MAX", value = %v, "ignoring invalid override"),
        }
    }
    if let Some(v) = non_empty("TAJAA_LOG_LEVEL") {
        cfg.logging.level = v;
    }
}
