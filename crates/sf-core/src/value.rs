use serde_json::{Map, Number, Value};

pub type ValueMap = Map<String, Value>;

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Renders a resolved value the way it appears inside surrounding text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number_to_text(number),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn number_to_text(number: &Number) -> String {
    if number.is_f64() {
        if let Some(float) = number.as_f64() {
            if float.is_finite() && float.fract() == 0.0 && float.abs() < 9.0e15 {
                return format!("{}", float as i64);
            }
        }
    }
    number.to_string()
}

pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|number| number.is_finite())
        }
        _ => None,
    }
}

/// Whole floats collapse to integers so `30.0` renders and compares as `30`.
pub fn number_value(number: f64) -> Option<Value> {
    if !number.is_finite() {
        return None;
    }
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        return Some(Value::Number(Number::from(number as i64)));
    }
    Number::from_f64(number).map(Value::Number)
}

pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !matches!(text.trim(), "" | "false" | "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Structural equality with numbers compared by value.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).map(|y| values_equal(x, y)).unwrap_or(false))
        }
        _ => left == right,
    }
}

pub fn parse_path(path: &str) -> Vec<String> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Descends object fields (and array indices) below `root`.
pub fn lookup_path<'a, S: AsRef<str>>(root: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        let segment = segment.as_ref();
        current = match current {
            Value::Object(entries) => entries.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn lookup_in_map<'a, S: AsRef<str>>(map: &'a ValueMap, path: &[S]) -> Option<&'a Value> {
    let (head, rest) = path.split_first()?;
    lookup_path(map.get(head.as_ref())?, rest)
}

/// Writes `value` at `path`, creating intermediate objects as needed.
pub fn assign_path(target: &mut ValueMap, path: &[String], value: Value) -> Result<(), String> {
    let Some((head, rest)) = path.split_first() else {
        return Err("empty path".to_string());
    };
    if rest.is_empty() {
        target.insert(head.clone(), value);
        return Ok(());
    }
    let entry = target
        .entry(head.clone())
        .or_insert_with(|| Value::Object(ValueMap::new()));
    if entry.is_null() {
        *entry = Value::Object(ValueMap::new());
    }
    let Value::Object(nested) = entry else {
        return Err(format!("\"{}\" is not an object", head));
    };
    assign_path(nested, rest, value)
}

pub fn remove_path(target: &mut ValueMap, path: &[String]) -> Option<Value> {
    let (head, rest) = path.split_first()?;
    if rest.is_empty() {
        return target.remove(head);
    }
    match target.get_mut(head)? {
        Value::Object(nested) => remove_path(nested, rest),
        _ => None,
    }
}
