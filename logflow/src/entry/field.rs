//! Field paths addressing positions inside an entry's record.

use crate::errors::FieldParseError;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One step of a field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldSegment {
    /// A key into a map.
    Key(String),
    /// An index into a sequence.
    Index(usize),
}

impl From<&str> for FieldSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for FieldSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for FieldSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// An ordered path into an entry's record.
///
/// The empty path addresses the record itself. Paths are written as dotted
/// keys with bracketed indices or quoted keys, optionally prefixed with `$`
/// or `$record`:
///
/// ```
/// use logflow::entry::{Field, FieldSegment};
///
/// let field: Field = "$.message.tags[0]".parse().unwrap();
/// assert_eq!(
///     field.segments(),
///     &[
///         FieldSegment::Key("message".into()),
///         FieldSegment::Key("tags".into()),
///         FieldSegment::Index(0),
///     ]
/// );
/// assert_eq!(field.to_string(), "message.tags[0]");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Field {
    segments: Vec<FieldSegment>,
}

impl Field {
    /// Returns the field addressing the whole record.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Creates a field from explicit segments.
    #[must_use]
    pub fn new(segments: Vec<FieldSegment>) -> Self {
        Self { segments }
    }

    /// Returns a new field with one more segment appended.
    #[must_use]
    pub fn child(mut self, segment: impl Into<FieldSegment>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[FieldSegment] {
        &self.segments
    }

    /// Returns true if this field addresses the whole record.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parses a textual path expression.
    ///
    /// # Errors
    ///
    /// Returns `FieldParseError` for empty keys, unclosed brackets,
    /// non-numeric indices and unterminated quoted keys.
    pub fn parse(input: &str) -> Result<Self, FieldParseError> {
        let body = strip_root(input.trim()).map_err(|reason| FieldParseError::new(input, reason))?;
        let chars: Vec<char> = body.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        while pos < chars.len() {
            let (segment, next) = if chars[pos] == '[' {
                parse_bracket(&chars, pos)
            } else {
                parse_key(&chars, pos)
            }
            .map_err(|reason| FieldParseError::new(input, reason))?;
            segments.push(segment);
            pos = next;

            match chars.get(pos) {
                None | Some('[') => {}
                Some('.') => {
                    pos += 1;
                    match chars.get(pos) {
                        None => return Err(FieldParseError::new(input, "trailing '.'")),
                        Some('.') => return Err(FieldParseError::new(input, "empty key")),
                        Some('[') => {
                            return Err(FieldParseError::new(input, "expected a key after '.'"))
                        }
                        Some(_) => {}
                    }
                }
                Some(other) => {
                    return Err(FieldParseError::new(
                        input,
                        format!("unexpected character '{other}' at position {pos}"),
                    ))
                }
            }
        }

        Ok(Self { segments })
    }
}

fn strip_root(input: &str) -> Result<&str, String> {
    let rest = if let Some(rest) = input.strip_prefix("$record") {
        rest
    } else if let Some(rest) = input.strip_prefix('$') {
        rest
    } else {
        return Ok(input);
    };

    if rest.is_empty() || rest.starts_with('[') {
        Ok(rest)
    } else if let Some(after_dot) = rest.strip_prefix('.') {
        if after_dot.is_empty() {
            Err("trailing '.'".to_string())
        } else {
            Ok(after_dot)
        }
    } else {
        Err("expected '.' or '[' after the root marker".to_string())
    }
}

fn parse_key(chars: &[char], start: usize) -> Result<(FieldSegment, usize), String> {
    let mut end = start;
    while let Some(&c) = chars.get(end) {
        match c {
            '.' | '[' => break,
            ']' => return Err(format!("unexpected ']' at position {end}")),
            _ => end += 1,
        }
    }
    if end == start {
        return Err("empty key".to_string());
    }
    Ok((FieldSegment::Key(chars[start..end].iter().collect()), end))
}

fn parse_bracket(chars: &[char], start: usize) -> Result<(FieldSegment, usize), String> {
    let mut pos = start + 1;
    match chars.get(pos) {
        Some(&quote) if quote == '"' || quote == '\'' => {
            pos += 1;
            let mut key = String::new();
            loop {
                match chars.get(pos) {
                    None => return Err("unterminated quoted key".to_string()),
                    Some('\\') => {
                        let escaped = chars
                            .get(pos + 1)
                            .ok_or_else(|| "unterminated quoted key".to_string())?;
                        key.push(*escaped);
                        pos += 2;
                    }
                    Some(&c) if c == quote => {
                        pos += 1;
                        break;
                    }
                    Some(&c) => {
                        key.push(c);
                        pos += 1;
                    }
                }
            }
            if chars.get(pos) != Some(&']') {
                return Err("expected ']' after quoted key".to_string());
            }
            Ok((FieldSegment::Key(key), pos + 1))
        }
        _ => {
            let digits_start = pos;
            while chars.get(pos).is_some_and(char::is_ascii_digit) {
                pos += 1;
            }
            match chars.get(pos) {
                Some(']') if pos > digits_start => {
                    let digits: String = chars[digits_start..pos].iter().collect();
                    let index = digits
                        .parse::<usize>()
                        .map_err(|e| format!("invalid index '{digits}': {e}"))?;
                    Ok((FieldSegment::Index(index), pos + 1))
                }
                None => Err("unclosed '['".to_string()),
                _ => Err(format!(
                    "invalid index at position {digits_start}, expected digits or a quoted key"
                )),
            }
        }
    }
}

fn is_bare_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("$");
        }
        for (n, segment) in self.segments.iter().enumerate() {
            match segment {
                FieldSegment::Key(key) if is_bare_key(key) => {
                    if n > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                FieldSegment::Key(key) => {
                    let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "[\"{escaped}\"]")?;
                }
                FieldSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Field {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldVisitor)
    }
}

struct FieldVisitor;

impl<'de> Visitor<'de> for FieldVisitor {
    type Value = Field;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a field path string or a list of keys and indices")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Field, E> {
        Field::parse(v).map_err(E::custom)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Field, A::Error> {
        let mut segments = Vec::new();
        while let Some(value) = seq.next_element::<serde_json::Value>()? {
            let segment = match value {
                serde_json::Value::String(key) => FieldSegment::Key(key),
                serde_json::Value::Number(n) => n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .map(FieldSegment::Index)
                    .ok_or_else(|| de::Error::custom(format!("invalid field index {n}")))?,
                other => {
                    return Err(de::Error::custom(format!(
                        "field segments must be strings or indices, found {other}"
                    )))
                }
            };
            segments.push(segment);
        }
        Ok(Field::new(segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> FieldSegment {
        FieldSegment::Key(k.to_string())
    }

    #[test]
    fn test_parse_root_forms() {
        for input in ["", "$", "$record", "  $  "] {
            assert!(Field::parse(input).unwrap().is_root(), "{input:?}");
        }
    }

    #[test]
    fn test_parse_dotted_and_indexed() {
        let field = Field::parse("$record.a.b[2][0].c").unwrap();
        assert_eq!(
            field.segments(),
            &[key("a"), key("b"), FieldSegment::Index(2), FieldSegment::Index(0), key("c")]
        );
    }

    #[test]
    fn test_parse_quoted_keys() {
        let field = Field::parse(r#"["key.with.dots"]['single']["esc\"aped"]"#).unwrap();
        assert_eq!(
            field.segments(),
            &[key("key.with.dots"), key("single"), key("esc\"aped")]
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["a..b", "a.", "a[", "a[x]", "a[0", "[\"open", "a]b", "$x", "a.[0]", "$."] {
            assert!(Field::parse(input).is_err(), "{input:?} should fail");
        }
    }

    #[test]
    fn test_display_round_trips() {
        let field = Field::root()
            .child("message")
            .child("weird key")
            .child(3_usize)
            .child("0");
        let text = field.to_string();
        assert_eq!(text, r#"message["weird key"][3].0"#);
        assert_eq!(Field::parse(&text).unwrap(), field);
        assert_eq!(Field::root().to_string(), "$");
    }

    #[test]
    fn test_deserialize_from_string_and_list() {
        let from_str: Field = serde_json::from_value(serde_json::json!("a.b[1]")).unwrap();
        let from_list: Field = serde_json::from_value(serde_json::json!(["a", "b", 1])).unwrap();
        assert_eq!(from_str, from_list);

        assert!(serde_json::from_value::<Field>(serde_json::json!("a..b")).is_err());
        assert!(serde_json::from_value::<Field>(serde_json::json!(["a", -1])).is_err());
        assert!(serde_json::from_value::<Field>(serde_json::json!(true)).is_err());
    }

    #[test]
    fn test_serialize_as_string() {
        let field = Field::parse("a[0]").unwrap();
        assert_eq!(serde_json::to_value(&field).unwrap(), serde_json::json!("a[0]"));
    }
}
