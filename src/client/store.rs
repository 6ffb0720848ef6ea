//! Persisted token storage.
//!
//! The gateway issues long-lived bearer tokens, so callers that opt in can
//! keep the token across process restarts in a `.env`-style file, the same
//! layout the official tooling uses. Access is synchronous and
//! last-write-wins; no locking is attempted.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::info;

/// Key under which the bearer token is persisted.
pub const ESKIZ_TOKEN_KEY: &str = "ESKIZ_TOKEN";

/// Minimal key/value persistence the token manager reads and writes through.
pub trait TokenStore: Send + Sync {
    /// Look up a persisted value. A missing file or key is `Ok(None)`.
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    /// Persist a value, replacing any previous one for the same key.
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

#[derive(Debug, Clone)]
/// [`TokenStore`] backed by a `KEY=value` env file (default `.env`).
pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for EnvFileStore {
    fn default() -> Self {
        Self::new(".env")
    }
}

impl TokenStore for EnvFileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        let iter = match dotenvy::from_path_iter(&self.path) {
            Ok(iter) => iter,
            Err(err) if err.not_found() => return Ok(None),
            Err(err) => return Err(io::Error::other(err)),
        };
        for item in iter {
            let (name, value) = item.map_err(io::Error::other)?;
            if name == key {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err),
        };

        let prefix = format!("{key}=");
        let mut lines: Vec<String> = existing
            .lines()
            .filter(|line| {
                // also drop `export KEY=...` lines, which reads resolve too
                let line = line.trim_start();
                let line = line.strip_prefix("export ").unwrap_or(line);
                !line.trim_start().starts_with(&prefix)
            })
            .map(str::to_owned)
            .collect();
        lines.push(format!("{key}={value}"));

        fs::write(&self.path, lines.join("\n") + "\n")?;
        info!(path = %self.path.display(), "token saved to env file");
        Ok(())
    }
}
