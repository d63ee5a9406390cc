//! Point serialization for the write path.

use rusts_bench_core::{FieldValue, Point, Result};
use std::io::Write;

/// Appends the wire form of a point to a byte buffer.
pub trait Serializer: Send + Sync {
    fn serialize(&self, point: &Point, out: &mut Vec<u8>) -> Result<()>;
}

/// InfluxDB line protocol:
/// `measurement[,tag=value]* field=value[,field=value]* timestamp\n`
#[derive(Debug, Clone, Copy, Default)]
pub struct LineProtocol;

impl Serializer for LineProtocol {
    fn serialize(&self, point: &Point, out: &mut Vec<u8>) -> Result<()> {
        point.validate()?;

        escape_into(out, point.measurement(), b", ");
        for (key, value) in point.tags() {
            out.push(b',');
            escape_into(out, key, b",= ");
            out.push(b'=');
            escape_into(out, value, b",= ");
        }

        out.push(b' ');
        let mut first = true;
        for (key, value) in point.fields() {
            separator(out, &mut first);
            escape_into(out, key, b",= ");
            out.push(b'=');
            write_value(out, value);
        }
        for (key, value) in point.int_fields() {
            separator(out, &mut first);
            escape_into(out, key, b",= ");
            // Writing into a Vec cannot fail.
            let _ = write!(out, "={}i", value);
        }

        let _ = writeln!(out, " {}", point.timestamp().unwrap_or_default());
        Ok(())
    }
}

fn separator(out: &mut Vec<u8>, first: &mut bool) {
    if !*first {
        out.push(b',');
    }
    *first = false;
}

fn write_value(out: &mut Vec<u8>, value: &FieldValue) {
    match value {
        FieldValue::Integer(v) => {
            let _ = write!(out, "{}i", v);
        }
        FieldValue::Float(v) => {
            let _ = write!(out, "{}", v);
        }
        FieldValue::Boolean(v) => {
            let _ = write!(out, "{}", v);
        }
        FieldValue::Text(v) => {
            out.push(b'"');
            escape_into(out, v, b"\"\\");
            out.push(b'"');
        }
    }
}

/// Copy `raw` into `out`, backslash-escaping any byte in `special`.
fn escape_into(out: &mut Vec<u8>, raw: &[u8], special: &[u8]) {
    for &b in raw {
        if special.contains(&b) {
            out.push(b'\\');
        }
        out.push(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(point: &Point) -> String {
        let mut out = Vec::new();
        LineProtocol.serialize(point, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_point_to_line_protocol() {
        let mut p = Point::new();
        p.set_measurement("cpu");
        p.append_tag("host", "server01");
        p.append_field("usage", 64.5);
        p.set_timestamp(1609459200000000000);

        assert_eq!(line(&p), "cpu,host=server01 usage=64.5 1609459200000000000\n");
    }

    #[test]
    fn test_mixed_field_types() {
        let mut p = Point::new();
        p.set_measurement("vehicle");
        p.append_field("engine_on", true);
        p.append_field("status", "parked");
        p.append_int_field("mileage", 8192);
        p.set_timestamp(1000000000);

        assert_eq!(
            line(&p),
            "vehicle engine_on=true,status=\"parked\",mileage=8192i 1000000000\n"
        );
    }

    #[test]
    fn test_escape_special_chars() {
        let mut p = Point::new();
        p.set_measurement("my measurement");
        p.append_tag("os", "Windows 11");
        p.append_tag("k=v", "a,b");
        p.append_field("msg", bytes::Bytes::from_static(b"say \"hi\""));
        p.set_timestamp(1);

        assert_eq!(
            line(&p),
            "my\\ measurement,os=Windows\\ 11,k\\=v=a\\,b msg=\"say \\\"hi\\\"\" 1\n"
        );
    }

    #[test]
    fn test_invalid_point_is_rejected() {
        let mut out = Vec::new();
        assert!(LineProtocol.serialize(&Point::new(), &mut out).is_err());
        assert!(out.is_empty());
    }
}
