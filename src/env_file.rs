//! Minimal `.env` support: `KEY=value` lines, optional `export ` prefix, `#` comments, single-
//! and double-quoted values. Variables already set in the process environment win.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    /// Given with `--env-file` rather than found in the working directory
    pub explicit: bool,
}

/// Load `explicit` if given (it must exist), else `./.env` when present.
pub fn load(explicit: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    let (path, explicit) = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path, true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let path = cwd.join(".env");
            if !path.is_file() {
                return Ok(None);
            }
            (path, false)
        }
    };
    apply_file(&path)?;
    Ok(Some(LoadedEnvFile { path, explicit }))
}

fn apply_file(path: &Path) -> Result<(), String> {
    let text = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let entries = parse(&text).map_err(|(line, e)| format!("{}:{}: {}", path.display(), line, e))?;
    for (key, value) in entries {
        if std::env::var_os(&key).is_none() {
            // Mutating the process environment is unsafe on some targets; this runs before any
            // other thread exists.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

/// All assignments in `text`; errors carry the 1-based line number.
pub fn parse(text: &str) -> Result<Vec<(String, String)>, (usize, String)> {
    let mut entries = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(entry) = parse_line(line).map_err(|e| (index + 1, e))? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn parse_line(line: &str) -> Result<Option<(String, String)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=').ok_or_else(|| "missing '=' in assignment".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.contains(char::is_whitespace) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }
    Ok(Some((key.to_string(), parse_value(raw)?)))
}

fn parse_value(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    match raw.chars().next() {
        Some(q @ ('"' | '\'')) => parse_quoted(&raw[1..], q),
        Some(_) => Ok(raw.split('#').next().unwrap_or_default().trim_end().to_string()),
        None => Ok(String::new()),
    }
}

/// Body of a quoted value up to the closing `quote`; escapes only apply inside double quotes.
fn parse_quoted(body: &str, quote: char) -> Result<String, String> {
    let mut value = String::new();
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' if quote == '"' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "unterminated escape sequence in double-quoted value".to_string())?;
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
            }
            c if c == quote => {
                let rest = chars.as_str().trim();
                return if rest.is_empty() || rest.starts_with('#') {
                    Ok(value)
                } else {
                    Err(format!("unexpected characters after closing {} quote", quote))
                };
            }
            other => value.push(other),
        }
    }
    Err(format!("unterminated {}-quoted value", if quote == '"' { "double" } else { "single" }))
}
