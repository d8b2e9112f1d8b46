//! `$VLE_HOME` resolution and the `vle.conf` settings file (§6
//! Configuration): home directory precedence, typed INI accessors, and
//! unknown keys surviving a read-modify-write round trip.

use ini::Ini;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Resolves `$VLE_HOME`.
///
/// Precedence: an explicit `VLE_HOME` override, then `$HOME/.vle` on Unix
/// (`$HOMEDRIVE$HOMEPATH\vle` on Windows is the original's fallback; this
/// kernel only targets Unix-like hosts for the home lookup itself — the
/// `PATH`/`PKG_CONFIG_PATH`/`CMAKE_MODULE_PATH` augmentation described in
/// §6 only matters for spawned build sub-processes, which this kernel never
/// spawns, so it is a documented no-op here).
#[must_use]
pub fn resolve_home() -> PathBuf {
    if let Ok(home) = env::var("VLE_HOME") {
        return PathBuf::from(home);
    }
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".vle")
}

/// A typed value read from `vle.conf`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

impl ConfValue {
    fn parse(raw: &str) -> Self {
        if let Ok(b) = raw.parse::<bool>() {
            return ConfValue::Bool(b);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return ConfValue::Long(i);
        }
        if let Ok(d) = raw.parse::<f64>() {
            return ConfValue::Double(d);
        }
        ConfValue::String(raw.to_string())
    }

    fn render(&self) -> String {
        match self {
            ConfValue::Bool(b) => b.to_string(),
            ConfValue::Long(i) => i.to_string(),
            ConfValue::Double(d) => d.to_string(),
            ConfValue::String(s) => s.clone(),
        }
    }
}

/// The process-wide context: resolved home directory, package search roots
/// and the settings map loaded from `vle.conf`.
///
/// No module-level singleton (§9 "Configuration / global state"): every
/// component that needs a home path, a log level or a setting takes a
/// `&Context` explicitly.
#[derive(Debug, Clone)]
pub struct Context {
    home: PathBuf,
    settings: HashMap<(String, String), ConfValue>,
}

impl Context {
    /// Builds a context rooted at the resolved `$VLE_HOME`, loading
    /// `vle.conf` if present. A missing file is not an error — it simply
    /// yields an empty settings map, matching first-run behavior.
    pub fn load() -> Result<Self, ConfigError> {
        let home = resolve_home();
        let conf_path = home.join("vle.conf");
        let mut settings = HashMap::new();

        if conf_path.exists() {
            let ini = Ini::load_from_file(&conf_path)
                .map_err(|e| ConfigError::new(format!("failed to parse {}: {e}", conf_path.display())))?;
            for (section, props) in ini.iter() {
                let section = section.unwrap_or("").to_string();
                for (key, value) in props.iter() {
                    settings.insert((section.clone(), key.to_string()), ConfValue::parse(value));
                }
            }
        }

        Ok(Self { home, settings })
    }

    /// Builds a context directly from an explicit home path, without
    /// touching the filesystem. Useful for tests.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            settings: HashMap::new(),
        }
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Root directory under which packages (and their dynamics/output
    /// plugins) are searched, per §6 filesystem layout.
    #[must_use]
    pub fn pkgs_root(&self) -> PathBuf {
        self.home.join("pkgs")
    }

    pub fn set(&mut self, section: &str, key: &str, value: ConfValue) {
        self.settings.insert((section.to_string(), key.to_string()), value);
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&ConfValue> {
        self.settings.get(&(section.to_string(), key.to_string()))
    }

    #[must_use]
    pub fn get_bool(&self, section: &str, key: &str) -> Option<bool> {
        match self.get(section, key)? {
            ConfValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_long(&self, section: &str, key: &str) -> Option<i64> {
        match self.get(section, key)? {
            ConfValue::Long(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_double(&self, section: &str, key: &str) -> Option<f64> {
        match self.get(section, key)? {
            ConfValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.get(section, key).map(ConfValue::render)
    }

    /// Writes the settings map back to `vle.conf`, preserving every key
    /// (known or not) that was present at load time.
    pub fn save(&self) -> Result<(), ConfigError> {
        let mut ini = Ini::new();
        for ((section, key), value) in &self.settings {
            ini.with_section(Some(section.as_str())).set(key.as_str(), value.render());
        }
        let conf_path = self.home.join("vle.conf");
        if let Some(parent) = conf_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::new(format!("cannot create {}: {e}", parent.display())))?;
        }
        ini.write_to_file(&conf_path)
            .map_err(|e| ConfigError::new(format!("cannot write {}: {e}", conf_path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip() {
        let mut ctx = Context::with_home("/tmp/vle-test-home");
        ctx.set("simulator", "threads", ConfValue::Long(4));
        ctx.set("simulator", "verbose", ConfValue::Bool(true));
        assert_eq!(ctx.get_long("simulator", "threads"), Some(4));
        assert_eq!(ctx.get_bool("simulator", "verbose"), Some(true));
        assert_eq!(ctx.get_string("simulator", "threads"), Some("4".to_string()));
    }

    #[test]
    fn unknown_key_preserved_as_string() {
        let value = ConfValue::parse("not-a-number-or-bool");
        assert_eq!(value, ConfValue::String("not-a-number-or-bool".to_string()));
    }
}
