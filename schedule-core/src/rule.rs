use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Unit stepped by a rule's `interval`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }
}

impl FromStr for Frequency {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(ValidationError::UnknownFrequency(other.to_string())),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-letter weekday codes as used in RRULE text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Weekday {
    #[serde(rename = "SU")]
    Sunday,
    #[serde(rename = "MO")]
    Monday,
    #[serde(rename = "TU")]
    Tuesday,
    #[serde(rename = "WE")]
    Wednesday,
    #[serde(rename = "TH")]
    Thursday,
    #[serde(rename = "FR")]
    Friday,
    #[serde(rename = "SA")]
    Saturday,
}

impl Weekday {
    pub fn code(self) -> &'static str {
        match self {
            Self::Sunday => "SU",
            Self::Monday => "MO",
            Self::Tuesday => "TU",
            Self::Wednesday => "WE",
            Self::Thursday => "TH",
            Self::Friday => "FR",
            Self::Saturday => "SA",
        }
    }

    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Self::Sunday => chrono::Weekday::Sun,
            Self::Monday => chrono::Weekday::Mon,
            Self::Tuesday => chrono::Weekday::Tue,
            Self::Wednesday => chrono::Weekday::Wed,
            Self::Thursday => chrono::Weekday::Thu,
            Self::Friday => chrono::Weekday::Fri,
            Self::Saturday => chrono::Weekday::Sat,
        }
    }
}

impl FromStr for Weekday {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "SU" => Ok(Self::Sunday),
            "MO" => Ok(Self::Monday),
            "TU" => Ok(Self::Tuesday),
            "WE" => Ok(Self::Wednesday),
            "TH" => Ok(Self::Thursday),
            "FR" => Ok(Self::Friday),
            "SA" => Ok(Self::Saturday),
            other => Err(ValidationError::UnknownWeekday(other.to_string())),
        }
    }
}

/// Weekday filter entry. The ordinal ("2nd Tuesday") is kept on the rule and
/// rendered into RRULE text, but expansion only looks at the weekday.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ByDay {
    #[serde(default)]
    pub ordinal: Option<i32>,
    pub day: Weekday,
}

impl ByDay {
    pub fn every(day: Weekday) -> Self {
        Self { ordinal: None, day }
    }
}

/// Unvalidated rule fields. Turned into a [`RecurrenceRule`] with
/// [`RecurrenceRule::new`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRuleDraft {
    pub id: String,
    pub patient_id: String,
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    pub start_date_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_day: Option<Vec<ByDay>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_month_day: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_month: Option<Vec<u32>>,
    #[serde(default = "default_week_start")]
    pub week_start: Weekday,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_interval() -> u32 {
    1
}

fn default_week_start() -> Weekday {
    Weekday::Monday
}

impl RecurrenceRuleDraft {
    pub fn new(
        id: impl Into<String>,
        patient_id: impl Into<String>,
        frequency: Frequency,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            patient_id: patient_id.into(),
            frequency,
            interval: default_interval(),
            start_date_time: start,
            until: None,
            count: None,
            by_day: None,
            by_month_day: None,
            by_month: None,
            week_start: default_week_start(),
            note: None,
        }
    }

    #[must_use]
    pub fn interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn by_day(mut self, days: impl IntoIterator<Item = Weekday>) -> Self {
        self.by_day = Some(days.into_iter().map(ByDay::every).collect());
        self
    }

    #[must_use]
    pub fn by_month_day(mut self, days: impl IntoIterator<Item = u32>) -> Self {
        self.by_month_day = Some(days.into_iter().collect());
        self
    }

    #[must_use]
    pub fn by_month(mut self, months: impl IntoIterator<Item = u32>) -> Self {
        self.by_month = Some(months.into_iter().collect());
        self
    }

    #[must_use]
    pub fn week_start(mut self, day: Weekday) -> Self {
        self.week_start = day;
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Validate and freeze the draft.
    pub fn build(self) -> Result<RecurrenceRule, ValidationError> {
        RecurrenceRule::new(self)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::Empty { field: "id" });
        }
        if self.patient_id.trim().is_empty() {
            return Err(ValidationError::Empty { field: "patientId" });
        }
        if self.interval == 0 {
            return Err(ValidationError::NonPositiveInterval(0));
        }
        if self.count == Some(0) {
            return Err(ValidationError::NonPositiveCount(0));
        }
        if let Some(days) = &self.by_day {
            if days.is_empty() {
                return Err(ValidationError::Empty { field: "byDay" });
            }
        }
        if let Some(days) = &self.by_month_day {
            check_range("byMonthDay", days, 1, 31)?;
        }
        if let Some(months) = &self.by_month {
            check_range("byMonth", months, 1, 12)?;
        }
        if let (Some(months), Some(days)) = (&self.by_month, &self.by_month_day) {
            let reachable = months
                .iter()
                .any(|&month| days.iter().any(|&day| day <= longest_month(month)));
            if !reachable {
                return Err(ValidationError::UnsatisfiableFilters);
            }
        }
        Ok(())
    }
}

fn check_range(field: &'static str, values: &[u32], min: u32, max: u32) -> Result<(), ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    match values.iter().find(|&&value| value < min || value > max) {
        Some(&value) => Err(ValidationError::OutOfRange {
            field,
            value: i64::from(value),
            min: i64::from(min),
            max: i64::from(max),
        }),
        None => Ok(()),
    }
}

/// Longest possible length of `month`, counting leap years.
fn longest_month(month: u32) -> u32 {
    match month {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// A validated, immutable recurrence rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RecurrenceRuleDraft", into = "RecurrenceRuleDraft")]
pub struct RecurrenceRule {
    draft: RecurrenceRuleDraft,
}

impl RecurrenceRule {
    pub fn new(draft: RecurrenceRuleDraft) -> Result<Self, ValidationError> {
        draft.validate()?;
        Ok(Self { draft })
    }

    pub fn id(&self) -> &str {
        &self.draft.id
    }

    pub fn patient_id(&self) -> &str {
        &self.draft.patient_id
    }

    pub fn frequency(&self) -> Frequency {
        self.draft.frequency
    }

    pub fn interval(&self) -> u32 {
        self.draft.interval
    }

    pub fn start_date_time(&self) -> DateTime<Utc> {
        self.draft.start_date_time
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        self.draft.until
    }

    pub fn count(&self) -> Option<u32> {
        self.draft.count
    }

    pub fn by_day(&self) -> Option<&[ByDay]> {
        self.draft.by_day.as_deref()
    }

    pub fn by_month_day(&self) -> Option<&[u32]> {
        self.draft.by_month_day.as_deref()
    }

    pub fn by_month(&self) -> Option<&[u32]> {
        self.draft.by_month.as_deref()
    }

    pub fn week_start(&self) -> Weekday {
        self.draft.week_start
    }

    pub fn note(&self) -> Option<&str> {
        self.draft.note.as_deref()
    }

    /// RFC 5545 `RRULE` value describing this rule (without DTSTART).
    pub fn rrule_string(&self) -> String {
        self.to_string()
    }
}

impl TryFrom<RecurrenceRuleDraft> for RecurrenceRule {
    type Error = ValidationError;

    fn try_from(draft: RecurrenceRuleDraft) -> Result<Self, Self::Error> {
        Self::new(draft)
    }
}

impl From<RecurrenceRule> for RecurrenceRuleDraft {
    fn from(rule: RecurrenceRule) -> Self {
        rule.draft
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={};INTERVAL={}", self.frequency(), self.interval())?;
        if let Some(until) = self.until() {
            write!(f, ";UNTIL={}", until.format("%Y%m%dT%H%M%SZ"))?;
        }
        if let Some(count) = self.count() {
            write!(f, ";COUNT={count}")?;
        }
        if let Some(days) = self.by_day() {
            let codes: Vec<String> = days
                .iter()
                .map(|entry| match entry.ordinal {
                    Some(ordinal) => format!("{ordinal}{}", entry.day.code()),
                    None => entry.day.code().to_string(),
                })
                .collect();
            write!(f, ";BYDAY={}", codes.join(","))?;
        }
        if let Some(days) = self.by_month_day() {
            write!(f, ";BYMONTHDAY={}", join_numbers(days))?;
        }
        if let Some(months) = self.by_month() {
            write!(f, ";BYMONTH={}", join_numbers(months))?;
        }
        if self.week_start() != Weekday::Monday {
            write!(f, ";WKST={}", self.week_start().code())?;
        }
        Ok(())
    }
}

fn join_numbers(values: &[u32]) -> String {
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 20, 10, 0, 0).unwrap()
    }

    fn weekly() -> RecurrenceRuleDraft {
        RecurrenceRuleDraft::new("rule1", "1", Frequency::Weekly, start())
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = weekly().interval(0).build().unwrap_err();
        assert_eq!(err, ValidationError::NonPositiveInterval(0));
    }

    #[test]
    fn zero_count_is_rejected() {
        let err = weekly().count(0).build().unwrap_err();
        assert_eq!(err, ValidationError::NonPositiveCount(0));
    }

    #[test]
    fn empty_filters_are_rejected() {
        let err = weekly().by_day(Vec::new()).build().unwrap_err();
        assert_eq!(err, ValidationError::Empty { field: "byDay" });

        let err = weekly().by_month(Vec::new()).build().unwrap_err();
        assert_eq!(err, ValidationError::Empty { field: "byMonth" });
    }

    #[test]
    fn out_of_range_month_day_is_rejected() {
        let err = weekly().by_month_day([1, 32]).build().unwrap_err();
        assert_eq!(
            err,
            ValidationError::OutOfRange {
                field: "byMonthDay",
                value: 32,
                min: 1,
                max: 31
            }
        );
        assert!(weekly().by_month([0]).build().is_err());
        assert!(weekly().by_month([13]).build().is_err());
    }

    #[test]
    fn month_and_day_that_never_meet_are_rejected() {
        let err = weekly()
            .by_month([2])
            .by_month_day([30, 31])
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::UnsatisfiableFilters);

        assert!(weekly().by_month([2]).by_month_day([29]).build().is_ok());
    }

    #[test]
    fn unknown_codes_fail_to_parse() {
        assert_eq!(
            "HOURLY".parse::<Frequency>(),
            Err(ValidationError::UnknownFrequency("HOURLY".into()))
        );
        assert_eq!(
            "XX".parse::<Weekday>(),
            Err(ValidationError::UnknownWeekday("XX".into()))
        );
        assert_eq!("TU".parse::<Weekday>(), Ok(Weekday::Tuesday));
    }

    #[test]
    fn deserializing_runs_validation() {
        let json = r#"{
            "id": "rule9",
            "patientId": "1",
            "frequency": "DAILY",
            "interval": 0,
            "startDateTime": "2025-12-20T10:00:00Z"
        }"#;
        assert!(serde_json::from_str::<RecurrenceRule>(json).is_err());

        let json = json.replace("\"interval\": 0", "\"interval\": 3");
        let rule: RecurrenceRule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule.interval(), 3);
        assert_eq!(rule.week_start(), Weekday::Monday);
    }

    #[test]
    fn renders_rrule_text() {
        let rule = weekly()
            .until(Utc.with_ymd_and_hms(2026, 3, 20, 10, 0, 0).unwrap())
            .by_day([Weekday::Tuesday])
            .build()
            .unwrap();
        assert_eq!(
            rule.rrule_string(),
            "FREQ=WEEKLY;INTERVAL=1;UNTIL=20260320T100000Z;BYDAY=TU"
        );

        let mut draft = RecurrenceRuleDraft::new("rule3", "3", Frequency::Monthly, start())
            .count(4)
            .by_month_day([1, 15])
            .week_start(Weekday::Sunday);
        draft.by_day = Some(vec![ByDay {
            ordinal: Some(2),
            day: Weekday::Tuesday,
        }]);
        assert_eq!(
            draft.build().unwrap().to_string(),
            "FREQ=MONTHLY;INTERVAL=1;COUNT=4;BYDAY=2TU;BYMONTHDAY=1,15;WKST=SU"
        );
    }
}
