use anyhow::{bail, Context, Result};
use camino::{Utf8Path as Path, Utf8PathBuf as PathBuf};
use tracing::{debug, warn};

/// Keys accepted in key files.
pub const API_KEY_VARS: [&str; 2] = ["RIPE_ATLAS_API", "RIPE_ATLAS_KEY"];
const HOME_KEY_FILE: &str = ".env.key";

/// Finds the API key: explicit value (flag or `RIPE_ATLAS_API`), then `~/.env.key`,
/// then the config file.
pub fn api_key(explicit: Option<String>, config: &Path) -> Result<String> {
    if let Some(key) = explicit.map(|k| k.trim().to_owned()).filter(|k| !k.is_empty()) {
        return Ok(key);
    }

    if let Some(path) = home_key_file().filter(|path| path.exists()) {
        match read_key_file(&path) {
            Ok(Some(key)) => return Ok(key),
            Ok(None) => debug!("No API key in {path}"),
            Err(e) => warn!("Couldn't read {path}: {e:?}"),
        }
    }

    if config.exists() {
        return read_key_file(config)?.with_context(|| {
            format!("RIPE_ATLAS_API or RIPE_ATLAS_KEY not found in {config}")
        });
    }

    bail!("RIPE Atlas API key not found. Please set RIPE_ATLAS_API environment variable or create ~/{HOME_KEY_FILE} file")
}

fn home_key_file() -> Option<PathBuf> {
    let home = PathBuf::from_path_buf(dirs::home_dir()?).ok()?;
    Some(home.join(HOME_KEY_FILE))
}

/// Reads a `KEY=VALUE` file and returns the first non-empty API key in it.
pub fn read_key_file(path: &Path) -> Result<Option<String>> {
    let entries = dotenv::from_path_iter(path)
        .with_context(|| format!("Couldn't open config file {path}"))?;
    for entry in entries {
        let (key, value) = entry.with_context(|| format!("Couldn't parse config file {path}"))?;
        if API_KEY_VARS.contains(&key.as_str()) && !value.is_empty() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
