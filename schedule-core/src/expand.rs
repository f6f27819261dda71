//! Walks a recurrence rule forward in time and materializes its occurrences.
//!
//! A rule is stepped one period at a time (`interval` units of its
//! frequency, counted from `start_date_time`). Inside a period every day that
//! satisfies all filters becomes a candidate, in ascending order, at the
//! anchor's UTC time of day. Filters finer than the period widen it the way
//! RFC 5545 does: a weekly rule with `by_day` yields each listed weekday of
//! the week, a monthly rule with `by_month_day` each listed day of the month.
//! Without such a filter a period yields the anchor's own weekday, day of
//! month or date. Days that do not exist in a period are skipped, never
//! clamped.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::{Appointment, ExpansionConfig, Frequency, RecurrenceRule, RuleRef, Weekday};

/// Every generated occurrence lasts exactly this long.
pub fn occurrence_duration() -> TimeDelta {
    TimeDelta::hours(1)
}

/// Expand `rule` over the inclusive window `[window_start, window_end]` with
/// the default configuration.
pub fn expand(
    rule: &RecurrenceRule,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<Appointment> {
    expand_with(rule, window_start, window_end, &ExpansionConfig::default())
}

/// Expand `rule` over the inclusive window `[window_start, window_end]`.
///
/// `count` bounds the whole lifetime series: members before the window are
/// still counted, so a narrower window always returns a subset of a wider
/// one. Rules without `count` emit at most `config.safety_cap` occurrences
/// per call; the rest is dropped with a warning.
pub fn expand_with(
    rule: &RecurrenceRule,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    config: &ExpansionConfig,
) -> Vec<Appointment> {
    let mut occurrences = Vec::new();
    if window_end < window_start {
        return occurrences;
    }

    let cap = match rule.count() {
        Some(_) => usize::MAX,
        None => config.safety_cap,
    };

    for (index, start) in Series::new(rule, config).bounded_by(window_end) {
        if start > window_end {
            break;
        }
        if start < window_start {
            continue;
        }
        if occurrences.len() >= cap {
            tracing::warn!(
                rule_id = rule.id(),
                cap,
                "safety cap reached, later occurrences are not returned"
            );
            break;
        }
        let Some(end) = start.checked_add_signed(occurrence_duration()) else {
            break;
        };

        occurrences.push(Appointment {
            id: format!("gen-{}-{index}", rule.id()),
            patient_id: rule.patient_id().to_string(),
            start_date_time: start,
            end_date_time: end,
            note: rule.note().map(str::to_string),
            recurrence_rule: Some(RuleRef::new(rule.id())),
            recurrence_id: Some(start),
            is_exception: false,
        });
    }

    tracing::debug!(
        rule_id = rule.id(),
        emitted = occurrences.len(),
        "expanded recurrence rule"
    );
    occurrences
}

/// Lazy walk over a rule's lifetime series, yielding `(index, start)` pairs
/// in ascending order. The index is the position in the series and is the
/// same whichever window a caller is interested in.
pub struct Series<'a> {
    rule: &'a RecurrenceRule,
    filter: DayFilter,
    anchor: NaiveDate,
    time: NaiveTime,
    horizon: Option<DateTime<Utc>>,
    scan_limit: u32,
    empty_periods: u32,
    period: u64,
    pending: VecDeque<NaiveDate>,
    index: u64,
    finished: bool,
}

impl<'a> Series<'a> {
    pub fn new(rule: &'a RecurrenceRule, config: &ExpansionConfig) -> Self {
        let start = rule.start_date_time().naive_utc();
        Self {
            rule,
            filter: DayFilter::for_rule(rule),
            anchor: start.date(),
            time: start.time(),
            horizon: None,
            scan_limit: config.scan_limit,
            empty_periods: 0,
            period: 0,
            pending: VecDeque::new(),
            index: 0,
            finished: false,
        }
    }

    /// Stop walking at the first period that begins after `horizon`.
    #[must_use]
    pub fn bounded_by(mut self, horizon: DateTime<Utc>) -> Self {
        self.horizon = Some(horizon);
        self
    }

    /// Queue the candidate days of the next period. Returns `false` once the
    /// walk is over.
    fn advance_period(&mut self) -> bool {
        if self.empty_periods >= self.scan_limit {
            tracing::warn!(
                rule_id = self.rule.id(),
                scan_limit = self.scan_limit,
                "no matching day in too many consecutive periods, giving up"
            );
            return false;
        }
        let Some((first, last)) = self.period_bounds(self.period) else {
            return false;
        };
        self.period += 1;

        let opening = first.and_time(NaiveTime::MIN).and_utc();
        if self.horizon.is_some_and(|horizon| opening > horizon)
            || self.rule.until().is_some_and(|until| opening > until)
        {
            return false;
        }

        let mut day = first;
        loop {
            if self.filter.matches(day) {
                self.pending.push_back(day);
            }
            if day >= last {
                break;
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        if self.pending.is_empty() {
            self.empty_periods += 1;
        } else {
            self.empty_periods = 0;
        }
        true
    }

    /// First and last day of period number `period`, or `None` once the
    /// calendar runs out of range.
    fn period_bounds(&self, period: u64) -> Option<(NaiveDate, NaiveDate)> {
        let step = period.checked_mul(u64::from(self.rule.interval()))?;
        match self.rule.frequency() {
            Frequency::Daily => {
                let day = self.anchor.checked_add_days(Days::new(step))?;
                Some((day, day))
            }
            Frequency::Weekly => {
                let into_week = days_since_week_start(self.anchor.weekday(), self.rule.week_start());
                let first = self
                    .anchor
                    .checked_sub_days(Days::new(into_week))?
                    .checked_add_days(Days::new(step.checked_mul(7)?))?;
                Some((first, first.checked_add_days(Days::new(6))?))
            }
            Frequency::Monthly => {
                let first = self
                    .anchor
                    .with_day(1)?
                    .checked_add_months(Months::new(u32::try_from(step).ok()?))?;
                let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
                Some((first, last))
            }
            Frequency::Yearly => {
                let year = i64::from(self.anchor.year()).checked_add(i64::try_from(step).ok()?)?;
                let year = i32::try_from(year).ok()?;
                Some((
                    NaiveDate::from_ymd_opt(year, 1, 1)?,
                    NaiveDate::from_ymd_opt(year, 12, 31)?,
                ))
            }
        }
    }
}

impl Iterator for Series<'_> {
    type Item = (u64, DateTime<Utc>);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            if self
                .rule
                .count()
                .is_some_and(|count| self.index >= u64::from(count))
            {
                break;
            }
            let Some(day) = self.pending.pop_front() else {
                if self.advance_period() {
                    continue;
                }
                break;
            };

            let start = day.and_time(self.time).and_utc();
            if start < self.rule.start_date_time() {
                continue;
            }
            if self.rule.until().is_some_and(|until| start > until) {
                break;
            }

            let index = self.index;
            self.index += 1;
            return Some((index, start));
        }
        self.finished = true;
        None
    }
}

impl FusedIterator for Series<'_> {}

fn days_since_week_start(day: chrono::Weekday, week_start: Weekday) -> u64 {
    let day = u64::from(day.num_days_from_monday());
    let start = u64::from(week_start.to_chrono().num_days_from_monday());
    (day + 7 - start) % 7
}

/// Conjunction of the rule's filters plus the anchor-derived defaults that
/// pin a period down to the anchor's position.
struct DayFilter {
    weekdays: Option<Vec<chrono::Weekday>>,
    month_days: Option<Vec<u32>>,
    months: Option<Vec<u32>>,
}

impl DayFilter {
    fn for_rule(rule: &RecurrenceRule) -> Self {
        let anchor = rule.start_date_time();
        let mut weekdays = rule
            .by_day()
            .map(|days| days.iter().map(|entry| entry.day.to_chrono()).collect::<Vec<_>>());
        let mut month_days = rule.by_month_day().map(<[u32]>::to_vec);
        let mut months = rule.by_month().map(<[u32]>::to_vec);

        match rule.frequency() {
            Frequency::Daily => {}
            Frequency::Weekly => {
                if weekdays.is_none() {
                    weekdays = Some(vec![anchor.weekday()]);
                }
            }
            Frequency::Monthly => {
                if weekdays.is_none() && month_days.is_none() {
                    month_days = Some(vec![anchor.day()]);
                }
            }
            Frequency::Yearly => {
                if weekdays.is_none() && month_days.is_none() {
                    month_days = Some(vec![anchor.day()]);
                    if months.is_none() {
                        months = Some(vec![anchor.month()]);
                    }
                }
            }
        }

        Self {
            weekdays,
            month_days,
            months,
        }
    }

    fn matches(&self, day: NaiveDate) -> bool {
        self.weekdays
            .as_ref()
            .map_or(true, |weekdays| weekdays.contains(&day.weekday()))
            && self
                .month_days
                .as_ref()
                .map_or(true, |days| days.contains(&day.day()))
            && self
                .months
                .as_ref()
                .map_or(true, |months| months.contains(&day.month()))
    }
}
