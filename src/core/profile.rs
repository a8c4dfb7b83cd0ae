//! The composed compilation environment.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::util::hash::Fingerprint;

/// One exported variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// An ordered mapping of environment variable name to value.
///
/// Setting an existing name replaces its value in place, so the position of
/// a variable is fixed by its first assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentProfile {
    #[serde(default)]
    vars: Vec<EnvVar>,
}

impl EnvironmentProfile {
    pub fn new() -> Self {
        EnvironmentProfile::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.vars.iter_mut().find(|v| v.name == name) {
            Some(existing) => existing.value = value,
            None => self.vars.push(EnvVar { name, value }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|v| (v.name.as_str(), v.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Render as a POSIX shell script of `export` statements.
    pub fn to_shell_script(&self) -> String {
        self.vars
            .iter()
            .map(|var| format!("export {}={}\n", var.name, shell_quote(&var.value)))
            .collect()
    }

    /// Render as a JSON object, keeping variable order.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&OrderedVars(&self.vars))
            .unwrap_or_else(|e| format!(r#"{{"error": "failed to serialize profile: {}"}}"#, e))
    }

    /// SHA-256 over names and values in order.
    pub fn digest(&self) -> String {
        let mut fp = Fingerprint::new();
        for var in &self.vars {
            fp.update_str(&var.name).update_str(&var.value);
        }
        fp.finish()
    }
}

struct OrderedVars<'a>(&'a [EnvVar]);

impl Serialize for OrderedVars<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for var in self.0 {
            map.serialize_entry(&var.name, &var.value)?;
        }
        map.end()
    }
}

/// Quote a value for a POSIX shell using single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
