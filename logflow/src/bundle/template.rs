//! `{{ .name }}` placeholder templates.

use crate::errors::RenderError;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}$").expect("placeholder pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Param(String),
}

/// A parsed template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    /// Parses a template body.
    ///
    /// # Errors
    ///
    /// Returns `Unterminated` for a `{{` without a closing `}}`, and
    /// `MalformedPlaceholder` for anything between braces that is not a
    /// single `.name` reference.
    pub fn parse(source: &str) -> Result<Self, RenderError> {
        let mut pieces = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                pieces.push(Piece::Text(rest[..open].to_string()));
            }
            let close = rest[open..]
                .find("}}")
                .ok_or(RenderError::Unterminated {
                    offset: offset + open,
                })?;
            let end = open + close + 2;
            let placeholder = &rest[open..end];
            let name = PLACEHOLDER
                .captures(placeholder)
                .and_then(|captures| captures.get(1))
                .ok_or_else(|| RenderError::MalformedPlaceholder {
                    placeholder: placeholder.to_string(),
                })?;
            pieces.push(Piece::Param(name.as_str().to_string()));

            offset += end;
            rest = &rest[end..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Text(rest.to_string()));
        }

        Ok(Self { pieces })
    }

    /// Returns the parameter names referenced by placeholders, in order of
    /// first appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for piece in &self.pieces {
            if let Piece::Param(name) = piece {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitutes every placeholder.
    ///
    /// Strings are inserted verbatim; other values as compact JSON, which is
    /// also valid YAML flow syntax. Names without a value render as `null`.
    #[must_use]
    pub fn render(&self, values: &BTreeMap<String, Value>) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Param(name) => match values.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str("null"),
                },
            }
        }
        out
    }
}
