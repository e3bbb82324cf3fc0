use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::error::{ApiError, Result};
use crate::params::{scalar_text, Params};

/// Matches `{name}` and `{name?}` placeholders
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_]+?)\??\}").expect("placeholder pattern is valid")
});

/// A URI pattern with `{name}` / `{name?}` path variables.
///
/// Both spellings behave the same way: a missing or null parameter is
/// substituted with an empty string and the surrounding segment is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    pattern: String,
    names: Vec<String>,
}

impl RouteTemplate {
    /// Parse a URI pattern and collect its placeholder names in order of
    /// occurrence (duplicates kept)
    pub fn parse(pattern: &str) -> Self {
        let names = PLACEHOLDER
            .captures_iter(pattern)
            .map(|caps| caps[1].to_string())
            .collect();

        RouteTemplate {
            pattern: pattern.to_string(),
            names,
        }
    }

    /// The raw pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Placeholder names found in the pattern
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Check if a parameter key is consumed by the path
    pub fn is_path_variable(&self, key: &str) -> bool {
        self.names.iter().any(|name| name == key)
    }

    /// Parameters left over once path variables are taken out
    pub fn residual(&self, params: &Params) -> Params {
        params
            .iter()
            .filter(|(key, _)| !self.is_path_variable(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Substitute every placeholder with the matching parameter's text
    pub fn compile(&self, params: &Params) -> Result<String> {
        if self.names.is_empty() {
            return Ok(self.pattern.clone());
        }

        let mut failed = None;
        let compiled = PLACEHOLDER.replace_all(&self.pattern, |caps: &Captures| {
            let name = &caps[1];
            match params.get(name) {
                None => String::new(),
                Some(value) => scalar_text(value).unwrap_or_else(|| {
                    failed.get_or_insert_with(|| name.to_string());
                    String::new()
                }),
            }
        });

        match failed {
            Some(name) => Err(ApiError::InvalidPathParam { name }),
            None => Ok(compiled.into_owned()),
        }
    }
}
