//! Environment variable loading with alias fallback chains.

use std::env;
use std::path::Path;
use std::str::FromStr;

/// Load `<dir>/.env` into the process environment without overriding variables
/// that are already set. Runs at most once per process.
pub fn load_dotenv_from_dir(dir: &Path) {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let path = dir.join(".env");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return;
        };
        let mut loaded = 0usize;
        for (key, value) in parse_dotenv(&content) {
            if env::var(&key).is_err() {
                env::set_var(&key, &value);
                loaded += 1;
            }
        }
        tracing::debug!(path = %path.display(), loaded, "loaded .env");
    });
}

/// Parse `KEY=value` lines; `#` comments, blank lines and surrounding quotes are handled.
fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = line[..eq_pos].trim();
        let mut value = line[eq_pos + 1..].trim();
        // Strip inline comment (# not inside quotes)
        if let Some(hash_pos) = value.find('#') {
            let before_hash = value[..hash_pos].trim_end();
            if !before_hash.contains('"') && !before_hash.contains('\'') {
                value = before_hash;
            }
        }
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        if !key.is_empty() {
            out.push((key.to_string(), value.to_string()));
        }
    }
    out
}

/// Read the primary variable or the first set alias; empty counts as unset.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env_optional(primary, aliases).unwrap_or_else(default)
}

/// Like [`env_or`] but returns `None` when nothing is set.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    std::iter::once(primary)
        .chain(aliases.iter().copied())
        .find_map(|k| env::var(k).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 1/true/yes/on are true, 0/false/no/off are false; anything else falls back to true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    match env_optional(primary, aliases) {
        Some(s) => !matches!(
            s.to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// Parse a variable with `FromStr`, returning a readable error naming the key.
pub fn env_parse<T>(primary: &str, aliases: &[&str]) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_optional(primary, aliases) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("{}={}: {}", primary, raw, e)),
        None => Ok(None),
    }
}
