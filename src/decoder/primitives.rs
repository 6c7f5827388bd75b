//! Leaf decoders.

use std::time::Duration;

use serde_json::Value;
use stillwater::Validation;

use super::{mismatch, Decoder, DecoderContext};
use crate::describe::{FloatKind, TypeDesc};
use crate::error::{ConfigValidation, ConfigValidationExt};
use crate::node::{DotPath, Node};

fn fail(node: &Node, desc: &TypeDesc, path: &DotPath, message: impl Into<String>) -> ConfigValidation<Value> {
    ConfigValidation::fail_with(mismatch(node, desc, path, message))
}

pub struct BoolDecoder;

impl Decoder for BoolDecoder {
    fn name(&self) -> &str {
        "bool"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Bool)
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let parsed = match node {
            Node::Boolean { value, .. } => Some(*value),
            Node::Long { value: 1, .. } => Some(true),
            Node::Long { value: 0, .. } => Some(false),
            Node::String { value, .. } => match value.trim().to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        match parsed {
            Some(b) => Validation::Success(Value::Bool(b)),
            None => fail(node, desc, path, "expected a boolean (true/false, yes/no, on/off, 1/0)"),
        }
    }
}

pub struct IntegerDecoder;

impl Decoder for IntegerDecoder {
    fn name(&self) -> &str {
        "integer"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Integer(_))
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let TypeDesc::Integer(kind) = desc else {
            return fail(node, desc, path, "not an integer type");
        };
        let parsed: Option<i128> = match node {
            Node::Long { value, .. } => Some(i128::from(*value)),
            Node::Double { value, .. } if value.fract() == 0.0 && value.is_finite() => {
                Some(*value as i128)
            }
            Node::String { value, .. } => value.trim().parse::<i128>().ok(),
            _ => None,
        };
        let Some(n) = parsed else {
            return fail(node, desc, path, "expected an integer");
        };
        let (min, max) = kind.bounds();
        if n < min || n > max {
            return fail(
                node,
                desc,
                path,
                format!("{} is out of range for {} ({}..={})", n, kind.name(), min, max),
            );
        }
        let value = if n >= 0 {
            Value::from(n as u64)
        } else {
            Value::from(n as i64)
        };
        Validation::Success(value)
    }
}

pub struct FloatDecoder;

impl Decoder for FloatDecoder {
    fn name(&self) -> &str {
        "float"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Float(_))
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let parsed = match node {
            Node::Double { value, .. } => Some(*value),
            Node::Long { value, .. } => Some(*value as f64),
            Node::String { value, .. } => value.trim().parse::<f64>().ok(),
            _ => None,
        };
        let Some(f) = parsed else {
            return fail(node, desc, path, "expected a number");
        };
        if matches!(desc, TypeDesc::Float(FloatKind::F32)) && f.is_finite() && f.abs() > f32::MAX as f64 {
            return fail(node, desc, path, "out of range for f32");
        }
        match serde_json::Number::from_f64(f) {
            Some(n) => Validation::Success(Value::Number(n)),
            None => fail(node, desc, path, "expected a finite number"),
        }
    }
}

pub struct CharDecoder;

impl Decoder for CharDecoder {
    fn name(&self) -> &str {
        "char"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Char)
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let text = node.scalar_text().unwrap_or_default();
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Validation::Success(Value::String(c.to_string())),
            _ => fail(node, desc, path, "expected a single character"),
        }
    }
}

/// Strings and secrets. Numbers and booleans are accepted in their text form.
pub struct StringDecoder;

impl Decoder for StringDecoder {
    fn name(&self) -> &str {
        "string"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::String | TypeDesc::Secret)
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        match node {
            Node::String { .. } | Node::Long { .. } | Node::Double { .. } | Node::Boolean { .. } => {
                Validation::Success(Value::String(node.scalar_text().unwrap_or_default()))
            }
            _ => fail(node, desc, path, "expected a string"),
        }
    }
}

/// Durations as `{ secs, nanos }`, the shape serde reads `std::time::Duration` from.
pub struct DurationDecoder;

impl Decoder for DurationDecoder {
    fn name(&self) -> &str {
        "duration"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Duration)
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let parsed = match node {
            Node::Long { value, .. } if *value >= 0 => Ok(Duration::from_millis(*value as u64)),
            Node::Long { .. } => Err("durations cannot be negative".to_string()),
            Node::String { value, .. } => parse_duration(value),
            _ => Err("expected a duration such as '30s' or '1h30m'".to_string()),
        };
        match parsed {
            Ok(d) => Validation::Success(serde_json::json!({
                "secs": d.as_secs(),
                "nanos": d.subsec_nanos(),
            })),
            Err(message) => fail(node, desc, path, message),
        }
    }
}

/// Parse `250ms`, `10s`, `1h30m`, `2d`; a bare number is milliseconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(millis) = text.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }

    let mut total = Duration::ZERO;
    let mut rest = text;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("invalid duration '{}'", text));
        }
        let amount: f64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid number in duration '{}'", text))?;
        rest = rest[digits..].trim_start();
        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = rest[unit_len..].trim_start();

        let seconds = match unit {
            "ns" => amount / 1e9,
            "us" => amount / 1e6,
            "ms" => amount / 1e3,
            "s" | "sec" | "secs" => amount,
            "m" | "min" | "mins" => amount * 60.0,
            "h" | "hr" | "hrs" => amount * 3600.0,
            "d" | "day" | "days" => amount * 86400.0,
            "" => return Err(format!("missing unit in duration '{}'", text)),
            other => return Err(format!("unknown duration unit '{}'", other)),
        };
        let part = Duration::try_from_secs_f64(seconds)
            .map_err(|e| format!("invalid duration '{}': {}", text, e))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("duration '{}' overflows", text))?;
    }
    Ok(total)
}

/// Any `FromStr` type, checked by parsing and handed on as text.
pub struct ParsedDecoder;

impl Decoder for ParsedDecoder {
    fn name(&self) -> &str {
        "parsed"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Parsed { .. })
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let TypeDesc::Parsed { check, .. } = desc else {
            return fail(node, desc, path, "not a parsed type");
        };
        let Some(text) = node.scalar_text() else {
            return fail(node, desc, path, "expected a string");
        };
        match check(&text) {
            Ok(()) => Validation::Success(Value::String(text)),
            Err(message) => fail(node, desc, path, message),
        }
    }
}

/// Unit-only enums: exact variant name, then case-insensitive.
pub struct EnumDecoder;

impl Decoder for EnumDecoder {
    fn name(&self) -> &str {
        "enum"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Enum { .. })
    }

    fn decode(&self, node: &Node, desc: &TypeDesc, path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        let TypeDesc::Enum { variants, .. } = desc else {
            return fail(node, desc, path, "not an enum type");
        };
        let Some(text) = node.scalar_text() else {
            return fail(node, desc, path, "expected a variant name");
        };
        let text = text.trim();
        let found = variants
            .iter()
            .find(|v| v.as_str() == text)
            .or_else(|| variants.iter().find(|v| v.eq_ignore_ascii_case(text)));
        match found {
            Some(variant) => Validation::Success(Value::String(variant.clone())),
            None => fail(
                node,
                desc,
                path,
                format!("expected one of: {}", variants.join(", ")),
            ),
        }
    }
}

/// Raw structure, passed through unchanged.
pub struct AnyDecoder;

impl Decoder for AnyDecoder {
    fn name(&self) -> &str {
        "any"
    }

    fn supports(&self, desc: &TypeDesc) -> bool {
        matches!(desc, TypeDesc::Any)
    }

    fn decode(&self, node: &Node, _desc: &TypeDesc, _path: &DotPath, _ctx: &DecoderContext<'_>) -> ConfigValidation<Value> {
        Validation::Success(node.to_json())
    }
}
