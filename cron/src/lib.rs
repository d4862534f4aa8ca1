pub use self::schedule::{Schedule, Upcoming};
pub use self::schedule::fields::FieldKind;
use thiserror::Error;

mod bits;
mod schedule;

/// Reasons a crontab expression can be rejected. Each variant names the
/// field it came from so the message can stand on its own.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("cron expression must not be empty")]
    Empty,
    #[error("cron expression must consist of 6 space-separated fields, found {found}")]
    WrongNumberOfFields { found: usize },
    #[error("{field} field is empty")]
    EmptyField { field: FieldKind },
    #[error("invalid value {value:?} in {field} field")]
    InvalidValue { field: FieldKind, value: String },
    #[error("value {value} in {field} field is outside {min}-{max}")]
    ValueOutOfRange {
        field: FieldKind,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("interval {from}-{to} in {field} field runs backwards")]
    InvalidInterval { field: FieldKind, from: u32, to: u32 },
    #[error("invalid step {step:?} in {field} field, steps must be positive integers")]
    InvalidStep { field: FieldKind, step: String },
}

fn days_in_month(month: u32, year: i32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => panic!("month has to be from 1 - 12, got {month}"),
    }
}

fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}
