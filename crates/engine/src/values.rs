//! Dynamic value generation for init-stage variables.
//!
//! Each variable declared in the init stage is produced by one generator:
//! fixed literals, uniform numbers, random text, GUIDs, ULIDs, uniform
//! date/time values, or a monotonic sequence. Templated fields (`value`,
//! `from`, `to`) are resolved before generation, so a bound may reference an
//! input or an environment variable. Generated values are always strings.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use ulid::Ulid;
use uuid::Uuid;

use flowctl_types::{VariableKind, VariableSpec};

use crate::context::TemplateContext;
use crate::error::{EngineError, EngineResult};
use crate::template::resolve_template;

const DEFAULT_NUMBER_MIN: i64 = 1;
const DEFAULT_NUMBER_MAX: i64 = 100;
const DEFAULT_TEXT_LENGTH: usize = 16;

/// Generates values for init-stage variables. Sequence counters live here and
/// stay monotonic for as long as the service instance does, which is the
/// duration of one top-level run.
#[derive(Debug, Default)]
pub struct DynamicValueService {
    sequences: Mutex<HashMap<String, i64>>,
}

impl DynamicValueService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produces the value for one variable declaration.
    pub fn generate(&self, spec: &VariableSpec, context: &TemplateContext) -> EngineResult<String> {
        match spec.kind {
            VariableKind::Fixed => {
                let raw = spec.value.as_deref().ok_or_else(|| EngineError::InvalidVariableSpec {
                    name: spec.name.clone(),
                    reason: "fixed variables require a value".into(),
                })?;
                resolve_template(raw, context)
            }
            VariableKind::Number => {
                let (min, max) = ordered_bounds(spec.min.unwrap_or(DEFAULT_NUMBER_MIN), spec.max.unwrap_or(DEFAULT_NUMBER_MAX));
                let value = thread_rng().gen_range(min..=max);
                Ok(pad_value(value, spec.pad))
            }
            VariableKind::Text => {
                let length = spec.length.unwrap_or(DEFAULT_TEXT_LENGTH);
                let text: String = thread_rng().sample_iter(&Alphanumeric).take(length).map(char::from).collect();
                Ok(text)
            }
            VariableKind::Guid => Ok(Uuid::new_v4().to_string()),
            VariableKind::Ulid => Ok(Ulid::new().to_string()),
            VariableKind::DateTime => self.generate_datetime(spec, context),
            VariableKind::Date => self.generate_date(spec, context),
            VariableKind::Time => self.generate_time(spec, context),
            VariableKind::Sequence => {
                let start = spec.start.unwrap_or(1);
                let step = spec.step.unwrap_or(1);
                let mut sequences = self.sequences.lock().expect("sequence lock poisoned");
                let index = sequences.entry(spec.name.clone()).or_insert(0);
                *index += 1;
                let value = start.saturating_add((*index - 1).saturating_mul(step));
                Ok(pad_value(value, spec.pad))
            }
        }
    }

    fn generate_datetime(&self, spec: &VariableSpec, context: &TemplateContext) -> EngineResult<String> {
        let from = resolve_bound(spec, spec.from.as_deref(), context, parse_datetime)?;
        let to = resolve_bound(spec, spec.to.as_deref(), context, parse_datetime)?;

        let now = context.clock.now_utc();
        let (from, to) = match (from, to) {
            (Some(from), Some(to)) => (from, to),
            (Some(from), None) => (from, shift_months(from, 1)),
            (None, Some(to)) => (shift_months(to, -1), to),
            (None, None) => (shift_months(now, -1), shift_months(now, 1)),
        };
        let (from, to) = if from <= to { (from, to) } else { (to, from) };

        let seconds = thread_rng().gen_range(from.timestamp()..=to.timestamp());
        let instant = Utc.timestamp_opt(seconds, 0).single().ok_or_else(|| EngineError::InvalidVariableSpec {
            name: spec.name.clone(),
            reason: "generated timestamp is out of range".into(),
        })?;
        Ok(instant.to_rfc3339())
    }

    fn generate_date(&self, spec: &VariableSpec, context: &TemplateContext) -> EngineResult<String> {
        let from = resolve_bound(spec, spec.from.as_deref(), context, parse_date)?;
        let to = resolve_bound(spec, spec.to.as_deref(), context, parse_date)?;

        let today = context.clock.now_utc().date_naive();
        let (from, to) = match (from, to) {
            (Some(from), Some(to)) => (from, to),
            (Some(from), None) => (from, shift_date_months(from, 1)),
            (None, Some(to)) => (shift_date_months(to, -1), to),
            (None, None) => (shift_date_months(today, -1), shift_date_months(today, 1)),
        };
        let (from, to) = if from <= to { (from, to) } else { (to, from) };

        let span_days = (to - from).num_days();
        let offset = thread_rng().gen_range(0..=span_days);
        Ok((from + Duration::days(offset)).format("%Y-%m-%d").to_string())
    }

    fn generate_time(&self, spec: &VariableSpec, context: &TemplateContext) -> EngineResult<String> {
        let from = resolve_bound(spec, spec.from.as_deref(), context, parse_time)?
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight is valid"));
        let to = resolve_bound(spec, spec.to.as_deref(), context, parse_time)?
            .unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 59).expect("end of day is valid"));
        let (from, to) = if from <= to { (from, to) } else { (to, from) };

        let seconds = thread_rng().gen_range(from.num_seconds_from_midnight()..=to.num_seconds_from_midnight());
        let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).ok_or_else(|| EngineError::InvalidVariableSpec {
            name: spec.name.clone(),
            reason: "generated time is out of range".into(),
        })?;
        Ok(time.format("%H:%M:%S").to_string())
    }
}

fn ordered_bounds(first: i64, second: i64) -> (i64, i64) {
    if first <= second { (first, second) } else { (second, first) }
}

fn pad_value(value: i64, pad: Option<usize>) -> String {
    match pad {
        Some(width) => format!("{:0width$}", value, width = width),
        None => value.to_string(),
    }
}

fn resolve_bound<T>(
    spec: &VariableSpec,
    raw: Option<&str>,
    context: &TemplateContext,
    parse: fn(&str) -> Option<T>,
) -> EngineResult<Option<T>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let resolved = resolve_template(raw, context)?;
    parse(resolved.trim())
        .map(Some)
        .ok_or_else(|| EngineError::InvalidVariableSpec {
            name: spec.name.clone(),
            reason: format!("bound '{}' is not a recognized date/time", resolved),
        })
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    parse_date(text).map(|date| Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid")))
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S").ok()
}

fn shift_months(instant: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let shifted = if months >= 0 {
        instant.checked_add_months(Months::new(months as u32))
    } else {
        instant.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(instant)
}

fn shift_date_months(date: NaiveDate, months: i32) -> NaiveDate {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(date)
}
