use crate::{bits, days_in_month};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;

/// The six calendar units of a crontab expression, in fine-to-coarse order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Second,
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

/// Inclusive bounds on the values a field may hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FieldRange {
    pub min: u32,
    pub max: u32,
}

const MONTH_NAMES: [(&str, u32); 12] = [
    ("jan", 1),
    ("feb", 2),
    ("mar", 3),
    ("apr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("aug", 8),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dec", 12),
];

const DAY_NAMES: [(&str, u32); 7] = [
    ("sun", 0),
    ("mon", 1),
    ("tue", 2),
    ("wed", 3),
    ("thu", 4),
    ("fri", 5),
    ("sat", 6),
];

impl FieldKind {
    /// The range used by the calendar arithmetic. Day-of-week is canonical
    /// here: 0 through 6, Sunday first.
    pub(crate) fn range(self) -> FieldRange {
        match self {
            FieldKind::Second | FieldKind::Minute => FieldRange { min: 0, max: 59 },
            FieldKind::Hour => FieldRange { min: 0, max: 23 },
            FieldKind::DayOfMonth => FieldRange { min: 1, max: 31 },
            FieldKind::Month => FieldRange { min: 1, max: 12 },
            FieldKind::DayOfWeek => FieldRange { min: 0, max: 6 },
        }
    }

    /// The range the parser accepts. Day-of-week additionally admits 7 as a
    /// second spelling of Sunday; it is folded to 0 before evaluation.
    pub(crate) fn parse_range(self) -> FieldRange {
        match self {
            FieldKind::DayOfWeek => FieldRange { min: 0, max: 7 },
            kind => kind.range(),
        }
    }

    pub(crate) fn names(self) -> Option<&'static [(&'static str, u32)]> {
        match self {
            FieldKind::Month => Some(&MONTH_NAMES),
            FieldKind::DayOfWeek => Some(&DAY_NAMES),
            _ => None,
        }
    }

    /// Projects the instant onto this unit (second-of-minute, day-of-month,
    /// and so on). Day-of-week counts from Sunday = 0.
    pub(crate) fn part_of(self, date: NaiveDateTime) -> u32 {
        match self {
            FieldKind::Second => date.second(),
            FieldKind::Minute => date.minute(),
            FieldKind::Hour => date.hour(),
            FieldKind::DayOfMonth => date.day(),
            FieldKind::Month => date.month(),
            FieldKind::DayOfWeek => date.weekday().num_days_from_sunday(),
        }
    }

    /// Moves the instant forward by `amount` of this unit. Month arithmetic
    /// normalizes day overflow the way a calendar carry would, so
    /// Jan 31 plus one month lands in early March rather than failing.
    pub(crate) fn add(self, date: NaiveDateTime, amount: u32) -> NaiveDateTime {
        match self {
            FieldKind::Second => date + Duration::seconds(amount.into()),
            FieldKind::Minute => date + Duration::minutes(amount.into()),
            FieldKind::Hour => date + Duration::hours(amount.into()),
            FieldKind::DayOfMonth | FieldKind::DayOfWeek => date + Duration::days(amount.into()),
            FieldKind::Month => add_months(date, amount),
        }
    }

    /// Rolls the instant over to the start of the next higher unit, used
    /// when no allowed value at or after the current one exists.
    ///
    /// Day-of-week keeps the instant as is: the advance loop's wrap amount
    /// already carries the date into the following week, and moving it here
    /// first would overshoot targets that sit earlier in the week.
    pub(crate) fn shift(self, date: NaiveDateTime) -> NaiveDateTime {
        match self {
            FieldKind::Second => FieldKind::Minute.reset(date + Duration::minutes(1)),
            FieldKind::Minute => FieldKind::Hour.reset(date + Duration::hours(1)),
            FieldKind::Hour => FieldKind::DayOfMonth.reset(date + Duration::hours(24)),
            FieldKind::DayOfMonth => {
                let (year, month) = match date.month() {
                    12 => (date.year() + 1, 1),
                    month => (date.year(), month + 1),
                };
                first_of_month(year, month)
            }
            FieldKind::Month => first_of_month(date.year() + 1, 1),
            FieldKind::DayOfWeek => date,
        }
    }

    /// Truncates every unit finer than this one to its minimum.
    pub(crate) fn reset(self, date: NaiveDateTime) -> NaiveDateTime {
        match self {
            FieldKind::Second => truncate_subseconds(date),
            FieldKind::Minute => truncate_subseconds(date)
                .with_second(0)
                .expect("zero is a valid second"),
            FieldKind::Hour => truncate_subseconds(date)
                .with_second(0)
                .and_then(|date| date.with_minute(0))
                .expect("zero is a valid minute and second"),
            FieldKind::DayOfMonth | FieldKind::DayOfWeek => date.date().and_time(NaiveTime::MIN),
            FieldKind::Month => first_of_month(date.year(), date.month()),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Second => "seconds",
            FieldKind::Minute => "minutes",
            FieldKind::Hour => "hours",
            FieldKind::DayOfMonth => "day-of-month",
            FieldKind::Month => "month",
            FieldKind::DayOfWeek => "day-of-week",
        };
        f.write_str(name)
    }
}

/// One parsed field: the unit it describes plus the set of allowed values,
/// stored as a bitmask. Invariant: at least one bit inside the field's
/// range is set by the time evaluation starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CronField {
    kind: FieldKind,
    bits: u64,
}

impl CronField {
    pub fn new(kind: FieldKind) -> Self {
        Self { kind, bits: 0 }
    }

    /// Allows a single value. The value must lie within the field's parse
    /// range; anything else is a caller bug.
    pub fn set_bit(&mut self, value: u32) {
        let range = self.kind.parse_range();
        assert!(
            (range.min..=range.max).contains(&value),
            "{value} is outside the {} field's {}-{} range",
            self.kind,
            range.min,
            range.max,
        );
        self.bits = bits::set_bit(self.bits, value);
    }

    /// Allows every value `v` in `lo..=hi` with `(v - lo) % step == 0`.
    pub fn set_range(&mut self, lo: u32, hi: u32, step: u32) {
        assert!(step >= 1, "step must be positive, got {step}");
        assert!(lo <= hi, "range {lo}-{hi} runs backwards");
        if step == 1 {
            let range = self.kind.parse_range();
            assert!(
                range.min <= lo && hi <= range.max,
                "{lo}-{hi} is outside the {} field's {}-{} range",
                self.kind,
                range.min,
                range.max,
            );
            self.bits |= (!0u64 << lo) & (!0u64 >> (63 - hi));
        } else {
            for value in (lo..=hi).step_by(step as usize) {
                self.set_bit(value);
            }
        }
    }

    /// Folds the alternate Sunday spelling (7) into the canonical bit (0).
    /// A no-op for every field but day-of-week.
    pub fn normalize(&mut self) {
        if self.kind == FieldKind::DayOfWeek && bits::is_set(self.bits, 7) {
            self.bits &= !(1 << 7);
            self.bits = bits::set_bit(self.bits, 0);
        }
    }

    /// Smallest allowed value at or after `from`, if any. A `None` tells
    /// the caller to roll the next-higher unit over.
    pub fn next(&self, from: u32) -> Option<u32> {
        let masked = self.bits & (!0u64 << from);
        (masked != 0).then(|| bits::ntz64(masked))
    }

    fn first(&self) -> u32 {
        self.next(0)
            .expect("a cron field always has at least one allowed value")
    }

    /// Smallest instant at or after `date` whose projection onto this unit
    /// is allowed. When the unit changes, everything finer is reset to its
    /// minimum; when it already matches, the instant comes back untouched.
    pub fn next_or_same(&self, mut date: NaiveDateTime) -> NaiveDateTime {
        let current = self.kind.part_of(date);
        let mut next = match self.next(current) {
            Some(next) => next,
            None => {
                date = self.kind.shift(date);
                self.first()
            }
        };
        if next == current {
            return date;
        }

        let mut current = self.kind.part_of(date);
        let mut count = 0;
        while current != next && count < 366 {
            date = self.evaluate_next(date, next);
            current = self.kind.part_of(date);
            next = match self.next(current) {
                Some(next) => next,
                None => {
                    date = self.kind.shift(date);
                    self.first()
                }
            };
            count += 1;
        }
        self.kind.reset(date)
    }

    /// One advance step towards `next`: either the direct difference, or
    /// the wrap amount `max - current + next + 1 - min` that carries into
    /// the next higher unit.
    fn evaluate_next(&self, date: NaiveDateTime, next: u32) -> NaiveDateTime {
        let current = self.kind.part_of(date);
        if current < next {
            self.kind.add(date, next - current)
        } else {
            let range = self.kind.range();
            let amount = range.max - current + next + 1 - range.min;
            self.kind.add(date, amount)
        }
    }
}

fn add_months(date: NaiveDateTime, months: u32) -> NaiveDateTime {
    let total = date.month0() + months;
    let mut year = date.year() + (total / 12) as i32;
    let mut month = total % 12 + 1;
    let mut day = date.day();
    loop {
        let len = days_in_month(month, year);
        if day <= len {
            break;
        }
        day -= len;
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .expect("carry keeps the date on the calendar")
        .and_time(date.time())
}

fn first_of_month(year: i32, month: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, 1)
        .expect("the first of a month always exists")
        .and_time(NaiveTime::MIN)
}

fn truncate_subseconds(date: NaiveDateTime) -> NaiveDateTime {
    date.with_nanosecond(0)
        .expect("zero is a valid nanosecond")
}
