//! Log entries and field addressing.
//!
//! An [`Entry`] is the unit of data flowing through a pipeline: a timestamp
//! plus a nested record. [`Field`] paths address positions inside the record.

mod field;

pub use field::{Field, FieldSegment};

use crate::errors::FieldSetError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The largest number of `null` slots [`Entry::set`] adds to reach an index.
pub const MAX_INDEX_PADDING: usize = 1024;

/// A single structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// When the entry was produced.
    pub timestamp: DateTime<Utc>,
    /// The nested record.
    pub record: Value,
}

impl Default for Entry {
    fn default() -> Self {
        Self::new()
    }
}

impl Entry {
    /// Creates an entry stamped now with an empty map record.
    #[must_use]
    pub fn new() -> Self {
        Self::with_record(Value::Object(Map::new()))
    }

    /// Creates an entry stamped now with the given record.
    #[must_use]
    pub fn with_record(record: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            record,
        }
    }

    /// Returns the value at `field`, or `None` if the path does not exist.
    #[must_use]
    pub fn get(&self, field: &Field) -> Option<&Value> {
        field
            .segments()
            .iter()
            .try_fold(&self.record, |value, segment| match segment {
                FieldSegment::Key(key) => value.as_object()?.get(key),
                FieldSegment::Index(index) => value.as_array()?.get(*index),
            })
    }

    /// Returns a mutable reference to the value at `field`, if it exists.
    pub fn get_mut(&mut self, field: &Field) -> Option<&mut Value> {
        lookup_mut(&mut self.record, field.segments())
    }

    /// Sets the value at `field`.
    ///
    /// Missing intermediate containers are created: maps for key segments and
    /// arrays (padded with `null`) for index segments. Scalars in the way are
    /// replaced. An index may point at most [`MAX_INDEX_PADDING`] slots past
    /// the end of its array.
    ///
    /// # Errors
    ///
    /// Returns `FieldSetError` if an index is too far past the end of its
    /// array. The record is left untouched in that case.
    pub fn set(&mut self, field: &Field, value: Value) -> Result<(), FieldSetError> {
        check_padding(&self.record, field)?;

        let mut current = &mut self.record;
        for segment in field.segments() {
            current = match segment {
                FieldSegment::Key(key) => ensure_object(current)
                    .entry(key.clone())
                    .or_insert(Value::Null),
                FieldSegment::Index(index) => {
                    let array = ensure_array(current);
                    if array.len() <= *index {
                        array.resize(index + 1, Value::Null);
                    }
                    &mut array[*index]
                }
            };
        }
        *current = value;
        Ok(())
    }

    /// Removes and returns the value at `field`.
    ///
    /// Deleting the root replaces the record with `null`.
    pub fn delete(&mut self, field: &Field) -> Option<Value> {
        let Some((last, parents)) = field.segments().split_last() else {
            return Some(std::mem::take(&mut self.record));
        };
        let parent = lookup_mut(&mut self.record, parents)?;
        match last {
            FieldSegment::Key(key) => parent.as_object_mut()?.remove(key),
            FieldSegment::Index(index) => {
                let array = parent.as_array_mut()?;
                (*index < array.len()).then(|| array.remove(*index))
            }
        }
    }
}

/// Walks the existing record along `field` and rejects any index segment
/// that would pad its array by more than [`MAX_INDEX_PADDING`] slots.
fn check_padding(record: &Value, field: &Field) -> Result<(), FieldSetError> {
    let mut current = Some(record);
    for segment in field.segments() {
        current = match segment {
            FieldSegment::Key(key) => current.and_then(Value::as_object).and_then(|map| map.get(key)),
            FieldSegment::Index(index) => {
                let array = current.and_then(Value::as_array);
                let len = array.map_or(0, Vec::len);
                if index.saturating_sub(len) > MAX_INDEX_PADDING {
                    return Err(FieldSetError {
                        field: field.to_string(),
                        index: *index,
                        len,
                        max_padding: MAX_INDEX_PADDING,
                    });
                }
                array.and_then(|array| array.get(*index))
            }
        };
    }
    Ok(())
}

fn lookup_mut<'a>(value: &'a mut Value, segments: &[FieldSegment]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(value, |value, segment| match segment {
            FieldSegment::Key(key) => value.as_object_mut()?.get_mut(key),
            FieldSegment::Index(index) => value.as_array_mut()?.get_mut(*index),
        })
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

fn ensure_array(value: &mut Value) -> &mut Vec<Value> {
    if !value.is_array() {
        *value = Value::Array(Vec::new());
    }
    match value {
        Value::Array(array) => array,
        _ => unreachable!("value was just replaced with an array"),
    }
}
