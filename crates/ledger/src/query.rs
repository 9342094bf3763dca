use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};

/// An inclusive range of meal dates.
///
/// The end is always stretched to the last microsecond of its day, so a range
/// ending "on Sunday" includes Sunday dinner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    /// Creates a range from `start` to the end of the day containing `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end_of_day(end.date_naive()),
        }
    }

    /// Creates a range covering whole calendar days.
    pub fn days(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.and_time(NaiveTime::MIN).and_utc(),
            end: end_of_day(end),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    (date.and_time(NaiveTime::MIN) + TimeDelta::days(1) - TimeDelta::microseconds(1)).and_utc()
}
