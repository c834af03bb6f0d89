// src/core/config_resolver.rs

//! # Settings Resolver
//!
//! Looks up dotted key paths (`executable.opensees`) in two layers of settings, the
//! project overrides first and the global defaults second, and resolves the value it
//! finds:
//!
//! - A table that has a branch for the current platform (`{ windows = ..., linux = ... }`)
//!   is replaced by that branch, resolved.
//! - Other tables and lists are resolved element by element.
//! - Strings get their environment variables expanded, then every `${other.key}`
//!   reference is replaced by the resolved value of that key. References may cross
//!   layers and may nest; cycles are reported instead of recursing forever.

use crate::constants::{MAX_RECURSION_DEPTH, PACKAGE_DIR_VAR};
use crate::core::{paths::PathError, platform::Platform};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

lazy_static! {
    // `${token}`, non-greedy, no nested braces.
    static ref TOKEN_RE: Regex = Regex::new(r"\$\{([^}]*)\}").expect("valid token pattern");
    // `%NAME%`, the Windows-native variable syntax.
    static ref PERCENT_VAR_RE: Regex = Regex::new(r"%([^%]+)%").expect("valid variable pattern");
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Filesystem Error while reading settings '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Error parsing TOML in '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Error parsing JSON in '{path}': {source}")]
    JsonParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Settings layer '{layer}' must be a table of keys.")]
    NotATable { layer: String },
    #[error("Setting key '{key}' is empty or contains an empty segment.")]
    EmptyKey { key: String },
    #[error("Setting '{key}' not found (no entry named '{segment}').")]
    KeyNotFound { key: String, segment: String },
    #[error("Setting '{key}' cannot be indexed with '{segment}': the value is neither a table nor a list.")]
    NotIndexable { key: String, segment: String },
    #[error("Setting '{key}' has no element '{segment}'.")]
    IndexOutOfRange { key: String, segment: String },
    #[error("Circular reference detected while resolving settings: {cycle}")]
    CyclicReference { cycle: String },
    #[error("Maximum recursion depth ({depth}) exceeded while resolving '{key}'.")]
    MaxRecursionDepth { depth: u32, key: String },
    #[error(transparent)]
    PackageDir(#[from] PathError),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

/// Everything a lookup needs besides the settings themselves.
///
/// `vars` replaces the process-wide `PackageDir` environment variable the settings
/// files historically relied on: it is consulted before the process environment when
/// expanding `$VAR`/`${VAR}` references (and `%VAR%` on Windows).
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub platform: Platform,
    vars: HashMap<String, String>,
}

impl ResolveContext {
    pub fn new(platform: Platform, package_dir: impl Into<PathBuf>) -> Self {
        let package_dir = package_dir.into();
        let mut vars = HashMap::new();
        vars.insert(
            PACKAGE_DIR_VAR.to_string(),
            package_dir.to_string_lossy().to_string(),
        );
        Self { platform, vars }
    }

    /// Adds (or replaces) a substitution variable.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    fn lookup_var(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .cloned()
            .or_else(|| env::var(name).ok())
    }

    /// Expands the variables of `template` the way the platform's shell would.
    /// Unknown variables are left untouched.
    fn expand_vars(&self, template: &str) -> String {
        let native = if self.platform.is_windows() {
            PERCENT_VAR_RE
                .replace_all(template, |caps: &regex::Captures<'_>| {
                    let whole = caps.get(0).map_or("", |m| m.as_str());
                    caps.get(1)
                        .and_then(|name| self.lookup_var(name.as_str()))
                        .unwrap_or_else(|| whole.to_string())
                })
                .into_owned()
        } else {
            template.to_string()
        };
        shellexpand::env_with_context_no_errors(&native, |name: &str| self.lookup_var(name)).into_owned()
    }
}

/// Two layers of settings plus the context used to resolve them.
#[derive(Debug, Clone)]
pub struct Settings {
    defaults: Map<String, Value>,
    project: Option<Map<String, Value>>,
    context: ResolveContext,
}

impl Settings {
    /// Builds a resolver. Both layers must be tables at the top level.
    pub fn new(
        defaults: Value,
        project: Option<Value>,
        context: ResolveContext,
    ) -> SettingsResult<Self> {
        let defaults = into_table(defaults, "defaults")?;
        let project = project.map(|p| into_table(p, "project")).transpose()?;
        Ok(Self {
            defaults,
            project,
            context,
        })
    }

    pub fn platform(&self) -> Platform {
        self.context.platform
    }

    /// Resolves a dotted key path to its fully substituted value.
    pub fn get(&self, key_path: &str) -> SettingsResult<Value> {
        let mut chain = Vec::new();
        self.get_in_chain(key_path, &mut chain)
    }

    /// Like [`Settings::get`], stringified the same way `${...}` references are.
    pub fn get_string(&self, key_path: &str) -> SettingsResult<String> {
        self.get(key_path).map(|value| value_to_string(&value))
    }

    /// Whether the key path exists in either layer (no substitution is performed).
    pub fn contains(&self, key_path: &str) -> bool {
        self.lookup_raw(key_path).is_ok()
    }

    fn get_in_chain(&self, key_path: &str, chain: &mut Vec<String>) -> SettingsResult<Value> {
        if chain.iter().any(|k| k == key_path) {
            let mut cycle = chain.clone();
            cycle.push(key_path.to_string());
            return Err(SettingsError::CyclicReference {
                cycle: cycle.join(" -> "),
            });
        }
        if chain.len() >= MAX_RECURSION_DEPTH as usize {
            return Err(SettingsError::MaxRecursionDepth {
                depth: MAX_RECURSION_DEPTH,
                key: key_path.to_string(),
            });
        }

        let raw = self.lookup_raw(key_path)?.clone();
        log::trace!("Resolving setting '{}' (depth {}).", key_path, chain.len());

        chain.push(key_path.to_string());
        let resolved = self.substitute(raw, chain);
        chain.pop();
        resolved
    }

    /// Walks the key path without substituting anything. The first segment picks the
    /// layer: a project override replaces the default entry wholesale.
    fn lookup_raw(&self, key_path: &str) -> SettingsResult<&Value> {
        let empty_key = || SettingsError::EmptyKey {
            key: key_path.to_string(),
        };
        let mut segments = key_path.split('.');
        let first = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(empty_key)?;

        let mut current = self
            .project
            .as_ref()
            .and_then(|project| project.get(first))
            .or_else(|| self.defaults.get(first))
            .ok_or_else(|| SettingsError::KeyNotFound {
                key: key_path.to_string(),
                segment: first.to_string(),
            })?;

        for segment in segments {
            if segment.is_empty() {
                return Err(empty_key());
            }
            current = match current {
                Value::Object(table) => {
                    table
                        .get(segment)
                        .ok_or_else(|| SettingsError::KeyNotFound {
                            key: key_path.to_string(),
                            segment: segment.to_string(),
                        })?
                }
                Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index))
                    .ok_or_else(|| SettingsError::IndexOutOfRange {
                        key: key_path.to_string(),
                        segment: segment.to_string(),
                    })?,
                _ => {
                    return Err(SettingsError::NotIndexable {
                        key: key_path.to_string(),
                        segment: segment.to_string(),
                    });
                }
            };
        }
        Ok(current)
    }

    fn substitute(&self, value: Value, chain: &mut Vec<String>) -> SettingsResult<Value> {
        match value {
            Value::Object(mut table) => {
                let branch = self
                    .context
                    .platform
                    .branch_keys()
                    .iter()
                    .find_map(|key| table.remove(*key));
                match branch {
                    Some(branch) => self.substitute(branch, chain),
                    None => {
                        let mut resolved = Map::with_capacity(table.len());
                        for (key, item) in table {
                            resolved.insert(key, self.substitute(item, chain)?);
                        }
                        Ok(Value::Object(resolved))
                    }
                }
            }
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.substitute(item, chain))
                .collect::<SettingsResult<Vec<_>>>()
                .map(Value::Array),
            Value::String(template) => self.expand_string(&template, chain).map(Value::String),
            other => Ok(other),
        }
    }

    fn expand_string(&self, template: &str, chain: &mut Vec<String>) -> SettingsResult<String> {
        // Unknown variables (including every `${dotted.key}`) are left untouched here.
        let with_env = self.context.expand_vars(template);

        let mut expanded = String::with_capacity(with_env.len());
        let mut last_index = 0;
        for caps in TOKEN_RE.captures_iter(&with_env) {
            let (Some(full_match), Some(token)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            expanded.push_str(
                with_env
                    .get(last_index..full_match.start())
                    .unwrap_or_default(),
            );
            let value = self.get_in_chain(token.as_str(), chain)?;
            expanded.push_str(&value_to_string(&value));
            last_index = full_match.end();
        }
        expanded.push_str(with_env.get(last_index..).unwrap_or_default());
        Ok(expanded)
    }
}

/// Renders a resolved value as the text inserted in place of a `${...}` reference.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn into_table(value: Value, layer: &str) -> SettingsResult<Map<String, Value>> {
    match value {
        Value::Object(table) => Ok(table),
        _ => Err(SettingsError::NotATable {
            layer: layer.to_string(),
        }),
    }
}
