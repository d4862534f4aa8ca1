use super::fields::{CronField, FieldKind, FieldRange};
use super::Schedule;
use crate::ParseError;

/// Turns crontab text into a [`Schedule`].
///
/// The six fields are, in input order: seconds, minutes, hours,
/// day-of-month, month, day-of-week. `?` is accepted as a synonym for `*`
/// anywhere. The evaluation order of the parsed fields is coarsest-first,
/// which is why the array below is built back to front.
pub(super) fn parse(expression: &str) -> Result<Schedule, ParseError> {
    if expression.is_empty() {
        return Err(ParseError::Empty);
    }
    let normalized = expression.replace('?', "*");
    let parts: Vec<&str> = normalized.split(' ').collect();
    if parts.len() != 6 {
        return Err(ParseError::WrongNumberOfFields { found: parts.len() });
    }

    let seconds = parse_field(parts[0], FieldKind::Second)?;
    let minutes = parse_field(parts[1], FieldKind::Minute)?;
    let hours = parse_field(parts[2], FieldKind::Hour)?;
    let days_of_month = parse_field(parts[3], FieldKind::DayOfMonth)?;
    let months = parse_field(parts[4], FieldKind::Month)?;
    let days_of_week = parse_field(parts[5], FieldKind::DayOfWeek)?;

    Ok(Schedule::new(
        [days_of_week, months, days_of_month, hours, minutes, seconds],
        normalized,
    ))
}

/// One field: a comma-separated list of items, each `range` or `range/step`.
fn parse_field(field: &str, kind: FieldKind) -> Result<CronField, ParseError> {
    if field.is_empty() {
        return Err(ParseError::EmptyField { field: kind });
    }
    let mut parsed = CronField::new(kind);
    for item in field.split(',') {
        match item.split_once('/') {
            None => {
                let range = parse_range(item, kind)?;
                parsed.set_range(range.min, range.max, 1);
            }
            Some((range_text, step_text)) => {
                let range = parse_range(range_text, kind)?;
                // A stepped bare value means "from here to the end of the
                // field", not a single value.
                let range = if range_text.contains('-') || range_text == "*" {
                    range
                } else {
                    FieldRange {
                        min: range.min,
                        max: kind.parse_range().max,
                    }
                };
                let step: u32 = step_text.parse().map_err(|_| ParseError::InvalidStep {
                    field: kind,
                    step: step_text.to_string(),
                })?;
                if step == 0 {
                    return Err(ParseError::InvalidStep {
                        field: kind,
                        step: step_text.to_string(),
                    });
                }
                parsed.set_range(range.min, range.max, step);
            }
        }
    }
    parsed.normalize();
    Ok(parsed)
}

/// `*`, a single value or name, or an inclusive `lo-hi` interval.
fn parse_range(text: &str, kind: FieldKind) -> Result<FieldRange, ParseError> {
    let bounds = kind.parse_range();
    if text == "*" {
        return Ok(bounds);
    }
    match text.split_once('-') {
        None => {
            let value = parse_value(text, kind)?;
            check_bounds(value, kind)?;
            Ok(FieldRange {
                min: value,
                max: value,
            })
        }
        Some((lo_text, hi_text)) => {
            let lo = parse_value(lo_text, kind)?;
            check_bounds(lo, kind)?;
            let hi = parse_value(hi_text, kind)?;
            check_bounds(hi, kind)?;
            if lo > hi {
                return Err(ParseError::InvalidInterval {
                    field: kind,
                    from: lo,
                    to: hi,
                });
            }
            Ok(FieldRange { min: lo, max: hi })
        }
    }
}

/// A decimal value, or a three-letter name in fields that have them.
fn parse_value(text: &str, kind: FieldKind) -> Result<u32, ParseError> {
    if let Some(names) = kind.names() {
        let lowered = text.to_ascii_lowercase();
        if let Some(&(_, value)) = names.iter().find(|(name, _)| *name == lowered) {
            return Ok(value);
        }
    }
    text.parse().map_err(|_| ParseError::InvalidValue {
        field: kind,
        value: text.to_string(),
    })
}

fn check_bounds(value: u32, kind: FieldKind) -> Result<(), ParseError> {
    let bounds = kind.parse_range();
    if value < bounds.min || value > bounds.max {
        return Err(ParseError::ValueOutOfRange {
            field: kind,
            value,
            min: bounds.min,
            max: bounds.max,
        });
    }
    Ok(())
}
