use crate::config::Config;
use crate::utils::{ensure_dir, get_charmcrab_home};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_charmcrab_home()?.join("config.json"))
}

pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    if path.exists() {
        // Shared lock: concurrent readers allowed, writers block
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open config at {}", path.display()))?;
        file.lock_shared()
            .with_context(|| "Failed to acquire shared lock on config file")?;

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        // Lock released when `file` drops at end of scope

        let mut data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;

        data = migrate_config(data);

        let mut config: Config =
            serde_json::from_value(data).with_context(|| "Failed to deserialize config")?;

        apply_env_overrides(&mut config);

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        return Ok(config);
    }

    let mut default_config = Config::default();
    apply_env_overrides(&mut default_config);
    default_config
        .validate()
        .with_context(|| "Default configuration validation failed")?;
    Ok(default_config)
}

/// Environment overrides for deployment-specific settings (env > config.json).
fn apply_env_overrides(config: &mut Config) {
    if let Ok(path) = std::env::var("CHARMCRAB_STORAGE_PATH")
        && !path.trim().is_empty()
    {
        config.storage.path = path;
    }
    if let Ok(host) = std::env::var("CHARMCRAB_HOST")
        && !host.trim().is_empty()
    {
        config.gateway.host = host;
    }
    if let Ok(port) = std::env::var("CHARMCRAB_PORT") {
        match port.parse::<u16>() {
            Ok(p) => config.gateway.port = p,
            Err(e) => warn!("ignoring CHARMCRAB_PORT={}: {}", port, e),
        }
    }
}

fn migrate_config(data: Value) -> Value {
    // Rename legacy top-level "character" → "persona"
    if let Value::Object(mut map) = data {
        if !map.contains_key("persona")
            && let Some(character) = map.remove("character")
        {
            map.insert("persona".to_string(), character);
        }
        // Legacy session key "max_messages" → persona.message_count
        if let Some(Value::Object(persona)) = map.get_mut("persona")
            && !persona.contains_key("message_count")
            && let Some(max) = persona.remove("max_messages")
        {
            persona.insert("message_count".to_string(), max);
        }
        Value::Object(map)
    } else {
        data
    }
}

pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<()> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    ensure_dir(path.parent().context("Config path has no parent")?)?;

    // Acquire exclusive lock via separate lockfile.
    // A separate file is needed because atomic_write() uses rename(), which
    // invalidates flock on the original inode. The .lock file survives renames.
    let lock_path = path.with_extension("json.lock");
    let lock_file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to create lock file at {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| "Failed to acquire exclusive lock on config lock file")?;

    let content = serde_json::to_string_pretty(config)?;
    crate::utils::atomic_write(path, &content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}
