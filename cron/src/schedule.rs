use self::fields::CronField;
use crate::ParseError;
use chrono::{Duration, NaiveDateTime};
use std::{fmt, str::FromStr};

pub(crate) mod fields;
mod parser;

/// A parsed six-field crontab expression.
///
/// `next` answers the single question the scheduler asks: given an
/// instant, what is the earliest instant at or after it that satisfies
/// every field? Instants are naive and interpreted in whatever time zone
/// the caller's clock runs in.
///
/// ```
/// use cron::Schedule;
///
/// let schedule: Schedule = "0 0/15 * * * *".parse().unwrap();
/// let from = chrono::NaiveDate::from_ymd_opt(2012, 7, 9)
///     .unwrap()
///     .and_hms_opt(14, 46, 0)
///     .unwrap();
/// assert_eq!(schedule.next(from).time().to_string(), "15:00:00");
/// ```
#[derive(Clone, Debug)]
pub struct Schedule {
    /// Coarsest-first: day-of-week, month, day-of-month, hour, minute,
    /// second. Each pass of `next` applies them in this order.
    fields: [CronField; 6],
    source: String,
}

impl Schedule {
    pub(crate) fn new(fields: [CronField; 6], source: String) -> Self {
        Self { fields, source }
    }

    /// The smallest instant `t >= from` satisfying every field.
    ///
    /// Runs the per-field advance to a fixed point. Any field may roll a
    /// higher unit over and invalidate fields already applied, so the
    /// whole pass repeats until one leaves the candidate untouched. The
    /// iteration is capped at 366 passes; an unsatisfiable expression
    /// (`0 0 0 30 Feb *`) terminates and yields the last candidate.
    pub fn next(&self, from: NaiveDateTime) -> NaiveDateTime {
        let mut next = from;
        for _ in 0..366 {
            let mut candidate = next;
            for field in &self.fields {
                candidate = field.next_or_same(candidate);
            }
            if candidate == next {
                return next;
            }
            next = candidate;
        }
        next
    }

    /// An endless walk over the fire times at or after `from`.
    pub fn upcoming(&self, from: NaiveDateTime) -> Upcoming<'_> {
        Upcoming {
            schedule: self,
            from,
        }
    }

    /// The normalized expression text this schedule was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for Schedule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parser::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Iterator over successive fire times. Each step re-queries the schedule
/// from one second past the previous fire, so ties never repeat.
#[derive(Clone, Debug)]
pub struct Upcoming<'a> {
    schedule: &'a Schedule,
    from: NaiveDateTime,
}

impl Iterator for Upcoming<'_> {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<Self::Item> {
        let fire = self.schedule.next(self.from);
        self.from = fire + Duration::seconds(1);
        Some(fire)
    }
}

#[cfg(test)]
mod tests {
    use super::Schedule;
    use chrono::NaiveDateTime;

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M"))
            .unwrap_or_else(|err| panic!("bad test date {text:?}: {err}"))
    }

    #[track_caller]
    fn check(now: &str, expression: &str, expected: &str) {
        let schedule: Schedule = expression
            .parse()
            .unwrap_or_else(|err| panic!("{expression:?} failed to parse: {err}"));
        assert_eq!(
            schedule.next(at(now)),
            at(expected),
            "{expression:?} from {now}",
        );
    }

    #[test]
    fn within_the_same_hour() {
        check("2012-07-09 14:45", "0 0/15 * * * *", "2012-07-09 14:45");
        check("2012-07-09 14:46", "0 0/15 * * * *", "2012-07-09 15:00");
        check("2012-07-09 14:59", "0 0/15 * * * *", "2012-07-09 15:00");
        check("2012-07-09 14:59:59", "0 0/15 * * * *", "2012-07-09 15:00");
    }

    #[test]
    fn rolls_into_the_next_hour() {
        check("2012-07-09 15:45", "0 20-35/15 * * * *", "2012-07-09 16:20");
    }

    #[test]
    fn rolls_into_the_next_day() {
        check("2012-07-09 23:46", "0 */15 * * * *", "2012-07-10 00:00");
        check("2012-07-09 23:45", "0 20-35/15 * * * *", "2012-07-10 00:20");
        check(
            "2012-07-09 23:35:51",
            "15/35 20-35/15 * * * *",
            "2012-07-10 00:20:15",
        );
        check(
            "2012-07-09 23:35:51",
            "15/35 20-35/15 1/2 * * *",
            "2012-07-10 01:20:15",
        );
        check(
            "2012-07-09 23:35:51",
            "15/35 20-35/15 10-12 * * *",
            "2012-07-10 10:20:15",
        );
    }

    #[test]
    fn honors_day_and_month_restrictions() {
        check(
            "2012-07-09 23:35:51",
            "15/35 20-35/15 1/2 */2 * *",
            "2012-07-11 01:20:15",
        );
        check(
            "2012-07-09 23:35:51",
            "15/35 20-35/15 * 9-20 * *",
            "2012-07-10 00:20:15",
        );
        check(
            "2012-07-09 23:35:51",
            "15/35 20-35/15 * 9-20 Jul *",
            "2012-07-10 00:20:15",
        );
    }

    #[test]
    fn wraps_around_months() {
        check("2012-07-09 23:35", "0 0 0 9 Apr-Oct ?", "2012-08-09 00:00");
        check(
            "2012-07-09 23:35",
            "0 0 0 */5 Apr,Aug,Oct Mon",
            "2012-08-06 00:00",
        );
        check("2012-07-09 23:35", "0 0 0 */5 Oct Mon", "2012-10-01 00:00");
    }

    #[test]
    fn wraps_around_years() {
        check("2012-07-09 23:35", "0 0 0 * Feb Mon", "2013-02-04 00:00");
        check("2012-07-09 23:35", "0 0 0 * Feb Mon/2", "2013-02-01 00:00");
    }

    #[test]
    fn wraps_every_unit_at_once() {
        check("2012-12-31 23:59:45", "0 * * * * *", "2013-01-01 00:00:00");
    }

    #[test]
    fn waits_for_a_leap_year() {
        check("2012-07-09 23:35", "0 0 0 29 Feb ?", "2016-02-29 00:00");
    }

    #[test]
    fn every_second_fires_on_the_next_second() {
        check("2012-07-09 14:45:23", "* * * * * *", "2012-07-09 14:45:23");
        check("2012-07-09 23:59:59", "* * * * * *", "2012-07-09 23:59:59");
    }

    #[test]
    fn sunday_spellings_agree() {
        for expression in ["0 0 12 * * Sun", "0 0 12 * * 0", "0 0 12 * * 7"] {
            // 2012-07-15 is a Sunday.
            check("2012-07-09 23:35", expression, "2012-07-15 12:00");
        }
    }

    #[test]
    fn unsatisfiable_expressions_terminate() {
        let schedule: Schedule = "0 0 0 30 Feb *".parse().unwrap();
        // No Feb 30 exists; the only guarantee is that `next` returns.
        let _ = schedule.next(at("2012-07-09 23:35"));
    }

    #[test]
    fn upcoming_yields_increasing_fire_times() {
        let schedule: Schedule = "0 0/15 * * * *".parse().unwrap();
        let fires: Vec<_> = schedule.upcoming(at("2012-07-09 14:46")).take(4).collect();
        assert_eq!(
            fires,
            vec![
                at("2012-07-09 15:00"),
                at("2012-07-09 15:15"),
                at("2012-07-09 15:30"),
                at("2012-07-09 15:45"),
            ],
        );
    }

    #[test]
    fn source_text_round_trips_normalized() {
        let schedule: Schedule = "0 0 0 9 Apr-Oct ?".parse().unwrap();
        assert_eq!(schedule.to_string(), "0 0 0 9 Apr-Oct *");
    }
}
