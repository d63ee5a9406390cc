//! Core data types for the load-testing harness

use crate::error::{CoreError, Result};
use crate::pool::Reset;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Nanosecond-precision Unix epoch timestamp
pub type Timestamp = i64;

/// Field value types emitted by the generators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Raw text bytes, written quoted on the wire
    Text(Bytes),
}

impl FieldValue {
    /// Get the type name of this field value
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Text(_) => "text",
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&'static str> for FieldValue {
    fn from(v: &'static str) -> Self {
        FieldValue::Text(Bytes::from_static(v.as_bytes()))
    }
}

impl From<Bytes> for FieldValue {
    fn from(v: Bytes) -> Self {
        FieldValue::Text(v)
    }
}

/// A data point: measurement name, tags, fields and a timestamp.
///
/// Tags and fields are kept as parallel key/value arrays in insertion order,
/// which is also the order a serializer emits them in. Integer-only fields
/// can go through a separate fast path that skips the `FieldValue` tag.
///
/// Keys and values are `Bytes`, so static names and entity identity tags are
/// shared rather than copied each time a point is filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Point {
    measurement: Bytes,
    tag_keys: Vec<Bytes>,
    tag_values: Vec<Bytes>,
    field_keys: Vec<Bytes>,
    field_values: Vec<FieldValue>,
    int_field_keys: Vec<Bytes>,
    int_field_values: Vec<i64>,
    timestamp: Option<Timestamp>,
}

impl Point {
    /// Create an empty point
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_measurement(&mut self, name: impl Into<Bytes>) {
        self.measurement = name.into();
    }

    pub fn measurement(&self) -> &[u8] {
        &self.measurement
    }

    pub fn append_tag(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.tag_keys.push(key.into());
        self.tag_values.push(value.into());
    }

    pub fn append_field(&mut self, key: impl Into<Bytes>, value: impl Into<FieldValue>) {
        self.field_keys.push(key.into());
        self.field_values.push(value.into());
    }

    /// Append an integer field through the fast path.
    pub fn append_int_field(&mut self, key: impl Into<Bytes>, value: i64) {
        self.int_field_keys.push(key.into());
        self.int_field_values.push(value);
    }

    pub fn set_timestamp(&mut self, ts: Timestamp) {
        self.timestamp = Some(ts);
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamp
    }

    /// Tag (key, value) pairs in emission order
    pub fn tags(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.tag_keys
            .iter()
            .zip(&self.tag_values)
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    /// Look up a tag value by key
    pub fn tag(&self, key: &[u8]) -> Option<&[u8]> {
        self.tags().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Polymorphic (key, value) fields in emission order
    pub fn fields(&self) -> impl Iterator<Item = (&[u8], &FieldValue)> {
        self.field_keys
            .iter()
            .zip(&self.field_values)
            .map(|(k, v)| (k.as_ref(), v))
    }

    /// Integer fast-path (key, value) fields in emission order
    pub fn int_fields(&self) -> impl Iterator<Item = (&[u8], i64)> {
        self.int_field_keys
            .iter()
            .zip(&self.int_field_values)
            .map(|(k, v)| (k.as_ref(), *v))
    }

    pub fn tag_count(&self) -> usize {
        self.tag_keys.len()
    }

    /// Number of fields across both the polymorphic list and the integer fast path
    pub fn field_count(&self) -> usize {
        self.field_keys.len() + self.int_field_keys.len()
    }

    /// Check the point is complete enough to serialize
    pub fn validate(&self) -> Result<()> {
        if self.measurement.is_empty() {
            return Err(CoreError::EmptyMeasurement);
        }
        if self.field_count() == 0 {
            return Err(CoreError::NoFields);
        }
        if self.timestamp.is_none() {
            return Err(CoreError::MissingTimestamp);
        }
        Ok(())
    }

    /// Clear every sequence and the timestamp, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.measurement = Bytes::new();
        self.tag_keys.clear();
        self.tag_values.clear();
        self.field_keys.clear();
        self.field_values.clear();
        self.int_field_keys.clear();
        self.int_field_values.clear();
        self.timestamp = None;
    }
}

impl Reset for Point {
    fn reset(&mut self) {
        Point::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point() -> Point {
        let mut p = Point::new();
        p.set_measurement("cpu");
        p.append_tag("host", "server01");
        p.append_tag("region", "us-west");
        p.append_field("usage", 64.5);
        p.append_field("online", true);
        p.append_int_field("cores", 8);
        p.set_timestamp(1_609_459_200_000_000_000);
        p
    }

    #[test]
    fn test_point_accessors() {
        let p = sample_point();
        assert_eq!(p.measurement(), b"cpu");
        assert_eq!(p.tag_count(), 2);
        assert_eq!(p.field_count(), 3);
        assert_eq!(p.tag(b"region"), Some(&b"us-west"[..]));
        assert_eq!(p.tag(b"zone"), None);

        let keys: Vec<&[u8]> = p.tags().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"host"[..], &b"region"[..]]);

        let ints: Vec<(&[u8], i64)> = p.int_fields().collect();
        assert_eq!(ints, vec![(&b"cores"[..], 8)]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_point_reset() {
        let mut p = sample_point();
        p.reset();
        assert!(p.measurement().is_empty());
        assert_eq!(p.tag_count(), 0);
        assert_eq!(p.field_count(), 0);
        assert_eq!(p.timestamp(), None);
        assert_eq!(p, Point::new());
    }

    #[test]
    fn test_point_validate() {
        let mut p = Point::new();
        assert!(matches!(p.validate(), Err(CoreError::EmptyMeasurement)));

        p.set_measurement("mem");
        assert!(matches!(p.validate(), Err(CoreError::NoFields)));

        p.append_int_field("used", 1);
        assert!(matches!(p.validate(), Err(CoreError::MissingTimestamp)));

        p.set_timestamp(0);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_field_value_conversions() {
        assert_eq!(FieldValue::from(3i64).as_i64(), Some(3));
        assert_eq!(FieldValue::from(3i64).as_f64(), Some(3.0));
        assert_eq!(FieldValue::from(true).type_name(), "boolean");
        assert_eq!(FieldValue::from("idle").type_name(), "text");
        assert_eq!(FieldValue::from(1.5).as_i64(), None);
    }
}
