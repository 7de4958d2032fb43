use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc,
};
use serde_json::{json, Value};
use sf_core::{coerce_number, value_to_text, ScenarioError, ValueMap};

use super::{
    required, text_param, to_number, FunctionExecutor, FunctionRegistry,
    FUNCTION_INVALID_ARGUMENT, FUNCTION_INVALID_DATE,
};
use crate::context::ExecutionContext;
use crate::engine::Engine;

const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl Unit {
    fn parse(raw: &str) -> Result<Self, ScenarioError> {
        let unit = match raw.trim().to_ascii_lowercase().trim_end_matches('s') {
            "second" | "sec" => Self::Seconds,
            "minute" | "min" => Self::Minutes,
            "hour" => Self::Hours,
            "day" => Self::Days,
            "week" => Self::Weeks,
            "month" => Self::Months,
            "year" => Self::Years,
            _ => {
                return Err(ScenarioError::evaluation(
                    FUNCTION_INVALID_ARGUMENT,
                    format!("unknown date unit \"{}\".", raw),
                ))
            }
        };
        Ok(unit)
    }

    fn millis(self) -> Option<f64> {
        match self {
            Self::Seconds => Some(1_000.0),
            Self::Minutes => Some(60_000.0),
            Self::Hours => Some(3_600_000.0),
            Self::Days => Some(86_400_000.0),
            Self::Weeks => Some(604_800_000.0),
            Self::Months | Self::Years => None,
        }
    }
}

fn invalid_date(function: &str, raw: &Value) -> ScenarioError {
    ScenarioError::evaluation(
        FUNCTION_INVALID_DATE,
        format!("{} cannot read \"{}\" as a date.", function, value_to_text(raw)),
    )
}

fn from_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// RFC 3339, `YYYY-MM-DD[ HH:MM[:SS]]` or unix milliseconds.
fn read_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(_) => coerce_number(value).and_then(from_millis),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            for format in NAIVE_FORMATS {
                if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                    return Some(naive.and_utc());
                }
            }
            if let Ok(day) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                return day.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
            }
            text.parse::<f64>().ok().and_then(from_millis)
        }
        _ => None,
    }
}

fn date_param(params: &ValueMap, name: &str, function: &str) -> Result<DateTime<Utc>, ScenarioError> {
    let raw = required(params, name, function)?;
    read_date(raw).ok_or_else(|| invalid_date(function, raw))
}

fn render(date: DateTime<Utc>) -> Value {
    Value::String(date.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn shift_months(date: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

/// Whole calendar months from `from` to `to`, truncated toward zero.
fn months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let mut months = i64::from(to.year() - from.year()) * 12 + i64::from(to.month())
        - i64::from(from.month());
    if months > 0 && shift_months(from, months).is_some_and(|shifted| shifted > to) {
        months -= 1;
    } else if months < 0 && shift_months(from, months).is_some_and(|shifted| shifted < to) {
        months += 1;
    }
    months
}

struct FormatDate;

impl FunctionExecutor for FormatDate {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let date = date_param(&params, "date", "FormatDate")?;
        let format = text_param(&params, "format").unwrap_or_else(|| DEFAULT_FORMAT.to_string());
        let mut out = String::new();
        write!(out, "{}", date.format(&format)).map_err(|_| {
            ScenarioError::evaluation(
                FUNCTION_INVALID_ARGUMENT,
                format!("FormatDate cannot use format \"{}\".", format),
            )
        })?;
        Ok(Value::String(out))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["date", "format"]
    }
}

struct ParseDate;

impl FunctionExecutor for ParseDate {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let raw = required(&params, "text", "ParseDate")?;
        let parsed = match text_param(&params, "format") {
            Some(format) => {
                let text = value_to_text(raw);
                NaiveDateTime::parse_from_str(text.trim(), &format)
                    .map(|naive| naive.and_utc())
                    .ok()
                    .or_else(|| {
                        NaiveDate::parse_from_str(text.trim(), &format)
                            .ok()
                            .and_then(|day| day.and_hms_opt(0, 0, 0))
                            .map(|naive| naive.and_utc())
                    })
            }
            None => read_date(raw),
        };
        parsed
            .map(render)
            .ok_or_else(|| invalid_date("ParseDate", raw))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["text", "format"]
    }
}

struct AddToDate;

impl FunctionExecutor for AddToDate {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let date = date_param(&params, "date", "AddToDate")?;
        let amount = to_number(required(&params, "amount", "AddToDate")?, "AddToDate")?;
        let unit = Unit::parse(&text_param(&params, "unit").unwrap_or_else(|| "days".to_string()))?;
        let shifted = match unit.millis() {
            Some(per_unit) => {
                let millis = amount * per_unit;
                if millis.is_finite() && millis.abs() < 1e15 {
                    date.checked_add_signed(Duration::milliseconds(millis as i64))
                } else {
                    None
                }
            }
            None => {
                let months = if unit == Unit::Years { amount * 12.0 } else { amount };
                if months.fract() != 0.0 {
                    return Err(ScenarioError::evaluation(
                        FUNCTION_INVALID_ARGUMENT,
                        "AddToDate needs a whole number of months or years.",
                    ));
                }
                shift_months(date, months as i64)
            }
        };
        shifted.map(render).ok_or_else(|| {
            ScenarioError::evaluation(FUNCTION_INVALID_DATE, "AddToDate result is out of range.")
        })
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["date", "amount", "unit"]
    }
}

/// Signed `to - from` in whole units.
struct DateDiff;

impl FunctionExecutor for DateDiff {
    fn execute(
        &self,
        _engine: &Engine,
        _ctx: &mut ExecutionContext,
        params: ValueMap,
    ) -> Result<Value, ScenarioError> {
        let from = date_param(&params, "from", "DateDiff")?;
        let to = date_param(&params, "to", "DateDiff")?;
        let unit = Unit::parse(&text_param(&params, "unit").unwrap_or_else(|| "days".to_string()))?;
        let difference = match unit {
            Unit::Seconds => (to - from).num_seconds(),
            Unit::Minutes => (to - from).num_minutes(),
            Unit::Hours => (to - from).num_hours(),
            Unit::Days => (to - from).num_days(),
            Unit::Weeks => (to - from).num_weeks(),
            Unit::Months => months_between(from, to),
            Unit::Years => months_between(from, to) / 12,
        };
        Ok(json!(difference))
    }

    fn keywords(&self) -> &'static [&'static str] {
        &["from", "to", "unit"]
    }
}

pub(super) fn register(registry: &FunctionRegistry) {
    registry.install("FormatDate", Arc::new(FormatDate));
    registry.install("ParseDate", Arc::new(ParseDate));
    registry.install("AddToDate", Arc::new(AddToDate));
    registry.install("DateDiff", Arc::new(DateDiff));
}

#[cfg(test)]
mod dates_tests {
    use super::*;
    use crate::test_support::*;

    fn call(name: &str, args: Value) -> Result<Value, ScenarioError> {
        let engine = test_engine(scenario(json!({})));
        let mut ctx = context_for(&engine, "dates");
        engine.evaluate_function_sync(&mut ctx, &with_function(name, args))
    }

    #[test]
    fn reads_every_accepted_input_shape() {
        let expected = "2024-03-05T10:20:30Z";
        for input in [
            json!("2024-03-05T10:20:30Z"),
            json!("2024-03-05T12:20:30+02:00"),
            json!("2024-03-05 10:20:30"),
            json!(1_709_634_030_000_i64),
        ] {
            assert_eq!(
                call("ParseDate", json!({"text": input})).expect("parse"),
                json!(expected),
                "input {}",
                input
            );
        }
        assert_eq!(
            call("ParseDate", json!({"text": "2024-03-05"})).expect("date only"),
            json!("2024-03-05T00:00:00Z")
        );
    }

    #[test]
    fn parse_with_explicit_format() {
        assert_eq!(
            call("ParseDate", json!({"text": "05/03/2024", "format": "%d/%m/%Y"})).expect("parse"),
            json!("2024-03-05T00:00:00Z")
        );
        let error = call("ParseDate", json!({"text": "yesterday"})).expect_err("invalid");
        assert_eq!(error.code, FUNCTION_INVALID_DATE);
    }

    #[test]
    fn format_date_uses_default_and_custom_patterns() {
        assert_eq!(
            call("FormatDate", json!({"date": "2024-03-05T10:20:30Z"})).expect("default"),
            json!("2024-03-05 10:20:30")
        );
        assert_eq!(
            call("FormatDate", json!({"date": "2024-03-05", "format": "%d.%m.%Y"})).expect("custom"),
            json!("05.03.2024")
        );
        let error = call("FormatDate", json!({"date": "not a date"})).expect_err("invalid");
        assert_eq!(error.code, FUNCTION_INVALID_DATE);
    }

    #[test]
    fn add_to_date_handles_fixed_and_calendar_units() {
        assert_eq!(
            call("AddToDate", json!({"date": "2024-03-05", "amount": 2, "unit": "days"})).expect("days"),
            json!("2024-03-07T00:00:00Z")
        );
        assert_eq!(
            call("AddToDate", json!({"date": "2024-03-05T10:00:00Z", "amount": -90, "unit": "minutes"}))
                .expect("minutes"),
            json!("2024-03-05T08:30:00Z")
        );
        assert_eq!(
            call("AddToDate", json!({"date": "2024-01-31", "amount": 1, "unit": "month"})).expect("month"),
            json!("2024-02-29T00:00:00Z")
        );
        assert_eq!(
            call("AddToDate", json!({"date": "2024-02-29", "amount": 1, "unit": "years"})).expect("year"),
            json!("2025-02-28T00:00:00Z")
        );
        let error = call("AddToDate", json!({"date": "2024-01-01", "amount": 1, "unit": "fortnight"}))
            .expect_err("unit");
        assert_eq!(error.code, FUNCTION_INVALID_ARGUMENT);
    }

    #[test]
    fn date_diff_truncates_toward_zero() {
        assert_eq!(
            call("DateDiff", json!({"from": "2024-03-01", "to": "2024-03-05T23:00:00Z"})).expect("days"),
            json!(4)
        );
        assert_eq!(
            call("DateDiff", json!({"from": "2024-03-05", "to": "2024-03-01", "unit": "hours"}))
                .expect("negative"),
            json!(-96)
        );
        assert_eq!(
            call("DateDiff", json!({"from": "2024-01-31", "to": "2024-03-30", "unit": "months"}))
                .expect("months"),
            json!(1)
        );
        assert_eq!(
            call("DateDiff", json!({"from": "2020-06-01", "to": "2024-05-31", "unit": "years"}))
                .expect("years"),
            json!(3)
        );
    }
}
