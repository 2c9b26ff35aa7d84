//! `${{ variable }}` placeholder rendering
//!
//! Step commands, environment values, declared outputs and changeset
//! templates may reference values known only at execution time, such as the
//! repository name or the stdout of the current step. Variables are dotted
//! names looked up in a flat [`TemplateContext`].

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::{Error, Result};

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Variables available to a template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    values: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable, builder style
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    /// Add every output as `outputs.<name>`
    pub fn with_outputs(mut self, outputs: &BTreeMap<String, String>) -> Self {
        for (name, value) in outputs {
            self.insert(&format!("outputs.{}", name), value.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Render all placeholders in `template`.
    ///
    /// Fails on the first variable that is not defined in this context.
    pub fn render(&self, template: &str) -> Result<String> {
        let mut missing: Option<String> = None;
        let rendered = placeholder().replace_all(template, |caps: &Captures| {
            let name = &caps[1];
            match self.values.get(name) {
                Some(value) => value.clone(),
                None => {
                    if missing.is_none() {
                        missing = Some(name.to_string());
                    }
                    String::new()
                }
            }
        });

        match missing {
            Some(variable) => Err(Error::Template {
                message: format!("Unknown variable in template '{}'", template),
                variable: Some(variable),
            }),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Render every value of a map, keeping the keys
    pub fn render_map(&self, map: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
        map.iter()
            .map(|(key, value)| Ok((key.clone(), self.render(value)?)))
            .collect()
    }
}
