use std::fs;
use std::path::Path;

/// Parse one `KEY=value` line of a dotenv file. Comments, blanks and malformed lines yield `None`.
fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let unquoted = if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value.split(" #").next().unwrap_or("").trim()
    };
    Some((key, unquoted))
}

/// Load `.env` from the working directory. Variables already present in the environment win.
pub fn load_dot_env() {
    let path = Path::new(".env");
    if !path.exists() {
        return;
    }

    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ENV] Failed to read .env: {}", e);
            return;
        }
    };

    for (key, value) in content.lines().filter_map(parse_env_line) {
        if std::env::var_os(key).is_some() {
            continue;
        }
        std::env::set_var(key, value);
    }
}

pub fn harden_env_setup() {
    load_dot_env();
    if std::env::var("CHAIN_IDS").is_err() {
        eprintln!("[ENV] WARN: CHAIN_IDS is not set");
    }
}
