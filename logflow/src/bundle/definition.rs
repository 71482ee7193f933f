//! Bundle definitions and rendering.

use super::template::Template;
use crate::config::value_kind;
use crate::errors::{BundleError, RenderError};
use figment::providers::{Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Kind of value a bundle parameter accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// A string.
    String,
    /// An integer.
    Int,
    /// A number, integer or not.
    Float,
    /// A boolean.
    Bool,
    /// A list.
    Array,
    /// A map.
    Map,
    /// Anything.
    #[default]
    Any,
}

impl ParamKind {
    /// Returns true if `value` is of this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Map => value.is_object(),
            Self::Any => true,
        }
    }

    /// Returns the kind name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Map => "map",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one bundle parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSpec {
    /// Accepted kind.
    #[serde(default, rename = "type")]
    pub kind: ParamKind,
    /// Whether a value must be supplied when there is no default.
    #[serde(default)]
    pub required: bool,
    /// Value used when none is supplied.
    #[serde(default)]
    pub default: Option<Value>,
    /// Human readable description.
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    bundle_type: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: BTreeMap<String, ParameterSpec>,
    template: String,
}

/// A reusable, parameterized plugin sub-graph.
///
/// The template is parsed and checked against the declared parameters when
/// the definition is created, so rendering can only fail on caller-supplied
/// parameters.
#[derive(Debug, Clone)]
pub struct BundleDefinition {
    bundle_type: String,
    description: Option<String>,
    parameters: BTreeMap<String, ParameterSpec>,
    template: Template,
}

impl BundleDefinition {
    /// Creates a definition from its parts.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` if the template does not parse, references
    /// an undeclared parameter, or a default does not match its kind.
    pub fn new(
        bundle_type: impl Into<String>,
        parameters: BTreeMap<String, ParameterSpec>,
        template: &str,
    ) -> Result<Self, BundleError> {
        let bundle_type = bundle_type.into();
        let invalid = |source| BundleError::InvalidDefinition {
            bundle_type: bundle_type.clone(),
            source,
        };

        let template = Template::parse(template).map_err(invalid)?;
        if let Some(name) = template
            .placeholders()
            .into_iter()
            .find(|name| !parameters.contains_key(*name))
        {
            return Err(invalid(RenderError::UndeclaredParameter {
                name: name.to_string(),
            }));
        }
        for (name, spec) in &parameters {
            if let Some(default) = &spec.default {
                check_kind(name, spec.kind, default).map_err(invalid)?;
            }
        }

        Ok(Self {
            bundle_type,
            description: None,
            parameters,
            template,
        })
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parses a YAML definition document.
    ///
    /// # Errors
    ///
    /// Returns `Load` if the document does not match the definition format,
    /// or `InvalidDefinition` if it is inconsistent.
    pub fn from_yaml_str(text: &str) -> Result<Self, BundleError> {
        Self::from_figment(Figment::from(Yaml::string(text)), Path::new("<inline>"))
    }

    /// Loads a YAML definition file.
    ///
    /// # Errors
    ///
    /// Returns `Load` if the file cannot be read or does not match the
    /// definition format, or `InvalidDefinition` if it is inconsistent.
    pub fn from_yaml_file(path: &Path) -> Result<Self, BundleError> {
        if !path.is_file() {
            return Err(BundleError::Load {
                path: path.to_path_buf(),
                message: "not a readable file".to_string(),
            });
        }
        Self::from_figment(Figment::from(Yaml::file_exact(path)), path)
    }

    fn from_figment(figment: Figment, path: &Path) -> Result<Self, BundleError> {
        let raw: RawDefinition = figment.extract().map_err(|err| BundleError::Load {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let definition = Self::new(raw.bundle_type, raw.parameters, &raw.template)?;
        Ok(match raw.description {
            Some(description) => definition.with_description(description),
            None => definition,
        })
    }

    /// Returns the bundle type.
    #[must_use]
    pub fn bundle_type(&self) -> &str {
        &self.bundle_type
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the declared parameters.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, ParameterSpec> {
        &self.parameters
    }

    /// Renders the template with caller-supplied parameters.
    ///
    /// Absent parameters take their default. Rendering is pure: the same
    /// parameters always produce the same text.
    ///
    /// # Errors
    ///
    /// Returns `UnknownParameter` for a parameter that is not declared,
    /// `WrongKind` for a value of the wrong kind, and `MissingParameter` for
    /// a required parameter with neither value nor default.
    pub fn render(&self, params: &Map<String, Value>) -> Result<RenderedBundle, RenderError> {
        if let Some(name) = params.keys().find(|name| !self.parameters.contains_key(*name)) {
            return Err(RenderError::UnknownParameter { name: name.clone() });
        }

        let mut values = BTreeMap::new();
        for (name, spec) in &self.parameters {
            let value = match params.get(name).or(spec.default.as_ref()) {
                Some(value) => value,
                None if spec.required => {
                    return Err(RenderError::MissingParameter { name: name.clone() })
                }
                None => continue,
            };
            check_kind(name, spec.kind, value)?;
            values.insert(name.clone(), value.clone());
        }

        Ok(RenderedBundle {
            bundle_type: self.bundle_type.clone(),
            text: self.template.render(&values),
        })
    }
}

fn check_kind(name: &str, kind: ParamKind, value: &Value) -> Result<(), RenderError> {
    if kind.accepts(value) {
        Ok(())
    } else {
        Err(RenderError::WrongKind {
            name: name.to_string(),
            expected: kind.to_string(),
            found: value_kind(value),
        })
    }
}

/// The text a bundle definition rendered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBundle {
    bundle_type: String,
    text: String,
}

impl RenderedBundle {
    /// Returns the bundle type.
    #[must_use]
    pub fn bundle_type(&self) -> &str {
        &self.bundle_type
    }

    /// Returns the rendered configuration document.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the hex SHA-256 of the rendered text.
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.text.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SIMPLE: &str = r#"
bundle_type: tail
description: Tails one file
parameters:
  path:
    type: string
    required: true
  poll_ms:
    type: int
    default: 250
  labels:
    type: map
template: |
  plugins:
    - id: in
      type: bundle_input
      output: out
    - id: out
      type: bundle_output
  # path={{ .path }} poll={{ .poll_ms }} labels={{ .labels }}
"#;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_from_yaml_str() {
        let definition = BundleDefinition::from_yaml_str(SIMPLE).unwrap();
        assert_eq!(definition.bundle_type(), "tail");
        assert_eq!(definition.description(), Some("Tails one file"));
        assert_eq!(definition.parameters()["poll_ms"].kind, ParamKind::Int);
        assert_eq!(definition.parameters()["labels"].kind, ParamKind::Map);
    }

    #[test]
    fn test_render_uses_defaults_and_null_for_absent_optionals() {
        let definition = BundleDefinition::from_yaml_str(SIMPLE).unwrap();
        let rendered = definition
            .render(&params(json!({"path": "/var/log/syslog"})))
            .unwrap();

        assert!(rendered
            .text()
            .contains("# path=/var/log/syslog poll=250 labels=null"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let definition = BundleDefinition::from_yaml_str(SIMPLE).unwrap();
        let p = params(json!({"path": "/a", "labels": {"z": 1, "a": 2}}));

        let first = definition.render(&p).unwrap();
        let second = definition.render(&p).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.digest(), second.digest());
        assert_eq!(first.digest().len(), 64);

        let other = definition.render(&params(json!({"path": "/b"}))).unwrap();
        assert_ne!(first.digest(), other.digest());
    }

    #[test]
    fn test_render_failures() {
        let definition = BundleDefinition::from_yaml_str(SIMPLE).unwrap();

        assert_eq!(
            definition.render(&Map::new()).unwrap_err(),
            RenderError::MissingParameter {
                name: "path".to_string()
            }
        );
        assert_eq!(
            definition
                .render(&params(json!({"path": "/a", "bogus": 1})))
                .unwrap_err(),
            RenderError::UnknownParameter {
                name: "bogus".to_string()
            }
        );
        assert!(matches!(
            definition.render(&params(json!({"path": 5}))).unwrap_err(),
            RenderError::WrongKind { found: "int", .. }
        ));
    }

    #[test]
    fn test_undeclared_placeholder_rejected_at_load() {
        let err = BundleDefinition::new("broken", BTreeMap::new(), "x: {{ .nope }}").unwrap_err();
        assert!(matches!(
            err,
            BundleError::InvalidDefinition {
                source: RenderError::UndeclaredParameter { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_bad_default_rejected_at_load() {
        let parameters = BTreeMap::from([(
            "n".to_string(),
            ParameterSpec {
                kind: ParamKind::Int,
                default: Some(json!("ten")),
                ..ParameterSpec::default()
            },
        )]);
        let err = BundleDefinition::new("broken", parameters, "n: {{ .n }}").unwrap_err();
        assert!(err.to_string().contains("must be of type int"));
    }

    #[test]
    fn test_unknown_definition_field_rejected() {
        let err = BundleDefinition::from_yaml_str("bundle_type: x\ntemplate: ''\nextra: 1\n")
            .unwrap_err();
        assert!(matches!(err, BundleError::Load { .. }));
    }
}
