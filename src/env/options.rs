//! Sanitizer runtime option strings (`ASAN_OPTIONS` and friends).
//!
//! Options are `name=value` pairs joined with `:`. The sanitizer flag
//! parser accepts a value wrapped in `"` or `'`, which is how values that
//! contain the separator or whitespace are kept unambiguous.

use std::collections::BTreeMap;

use super::ComposeError;

pub const SEPARATOR: char = ':';

/// Render an option map as a `:`-separated string, sorted by option name.
pub fn render_options(
    var: &str,
    options: &BTreeMap<String, String>,
) -> Result<String, ComposeError> {
    let mut parts = Vec::with_capacity(options.len());
    for (name, value) in options {
        if name.is_empty()
            || name
                .chars()
                .any(|c| !(c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(ComposeError::InvalidOptionName {
                var: var.to_string(),
                name: name.clone(),
            });
        }
        parts.push(format!("{}={}", name, quote_value(var, name, value)?));
    }
    Ok(parts.join(&SEPARATOR.to_string()))
}

/// Merge option maps; later maps override earlier ones per option name.
pub fn merge_options<'a>(
    maps: impl IntoIterator<Item = &'a BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for map in maps {
        for (k, v) in map {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

fn quote_value(var: &str, name: &str, value: &str) -> Result<String, ComposeError> {
    let needs_quoting = value.is_empty()
        || value
            .chars()
            .any(|c| c == SEPARATOR || c == ',' || c.is_whitespace() || c == '"' || c == '\'');
    if !needs_quoting {
        return Ok(value.to_string());
    }

    match (value.contains('"'), value.contains('\'')) {
        (false, _) => Ok(format!("\"{}\"", value)),
        (true, false) => Ok(format!("'{}'", value)),
        (true, true) => Err(ComposeError::UnquotableOption {
            var: var.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
