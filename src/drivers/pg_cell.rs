use std::error::Error as StdError;
use std::fmt::Write as _;
use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

type DecodeError = Box<dyn StdError + Sync + Send>;

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// One binary-format column value decoded to JSON.
///
/// Accepts every type. Numbers and booleans stay JSON scalars, `numeric` and
/// other exact or structured types become their Postgres text form, arrays
/// become JSON arrays, and types with no decoder here are rendered as
/// `\x`-prefixed hex of the raw payload.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JsonCell(pub Value);

impl JsonCell {
    pub(crate) fn into_value(cell: Option<JsonCell>) -> Value {
        cell.map_or(Value::Null, |c| c.0)
    }
}

impl<'a> FromSql<'a> for JsonCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let value = match ty.kind() {
            Kind::Array(_) => Value::Array(
                Vec::<Option<JsonCell>>::from_sql(ty, raw)?
                    .into_iter()
                    .map(JsonCell::into_value)
                    .collect(),
            ),
            Kind::Domain(inner) => return JsonCell::from_sql(inner, raw),
            Kind::Enum(_) => Value::String(std::str::from_utf8(raw)?.to_string()),
            _ => scalar(ty, raw)?,
        };
        Ok(Self(value))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn scalar(ty: &Type, raw: &[u8]) -> Result<Value, DecodeError> {
    let value = match *ty {
        Type::BOOL => Value::from(bool::from_sql(ty, raw)?),
        Type::INT2 => Value::from(i16::from_sql(ty, raw)?),
        Type::INT4 => Value::from(i32::from_sql(ty, raw)?),
        Type::INT8 => Value::from(i64::from_sql(ty, raw)?),
        Type::OID => Value::from(u32::from_sql(ty, raw)?),
        Type::FLOAT4 => Value::from(f32::from_sql(ty, raw)?),
        Type::FLOAT8 => Value::from(f64::from_sql(ty, raw)?),
        Type::NUMERIC => Value::String(numeric_text(raw)?),
        Type::JSON | Type::JSONB => Value::from_sql(ty, raw)?,
        Type::UUID => Value::String(Uuid::from_sql(ty, raw)?.to_string()),
        Type::INET => Value::String(IpAddr::from_sql(ty, raw)?.to_string()),
        Type::TIMESTAMPTZ => Value::String(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
        Type::TIMESTAMP => Value::String(
            NaiveDateTime::from_sql(ty, raw)?
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        ),
        Type::DATE => Value::String(NaiveDate::from_sql(ty, raw)?.to_string()),
        Type::TIME => Value::String(NaiveTime::from_sql(ty, raw)?.to_string()),
        Type::BYTEA => Value::String(hex(raw)),
        _ if <&str as FromSql>::accepts(ty) || *ty == Type::XML => {
            Value::String(std::str::from_utf8(raw)?.to_string())
        }
        _ => Value::String(hex(raw)),
    };
    Ok(value)
}

/// Postgres `bytea` hex output form, e.g. `\xdead`.
fn hex(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("\\x");
    for byte in raw {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn be_u16(raw: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([raw[at], raw[at + 1]])
}

/// Renders a binary `numeric` exactly as the server's text output would,
/// keeping the display scale (`1.50` stays `1.50`).
pub(crate) fn numeric_text(raw: &[u8]) -> Result<String, DecodeError> {
    if raw.len() < 8 {
        return Err("invalid numeric payload: header too short".into());
    }
    let ndigits = usize::from(be_u16(raw, 0));
    let weight = i32::from(be_u16(raw, 2) as i16);
    let sign = be_u16(raw, 4);
    let dscale = usize::from(be_u16(raw, 6));

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{other:04x}").into()),
    }
    if raw.len() < 8 + ndigits * 2 {
        return Err("invalid numeric payload: digits truncated".into());
    }

    let digits: Vec<u16> = (0..ndigits).map(|i| be_u16(raw, 8 + i * 2)).collect();
    if digits.iter().any(|&d| d > 9999) {
        return Err("invalid numeric payload: digit group out of range".into());
    }
    // Group `i` carries the base-10000 digit at position `weight - i`.
    let group = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        let _ = write!(out, "{}", group(0));
        for i in 1..=weight {
            let _ = write!(out, "{:04}", group(i));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", group(i));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}
