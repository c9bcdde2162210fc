use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Therapist {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub specialties: Vec<String>,
}

impl Therapist {
    pub fn specialty_summary(&self) -> String {
        self.specialties.join(", ")
    }

    pub fn has_specialty(&self, specialty: &str) -> bool {
        self.specialties
            .iter()
            .any(|s| s.eq_ignore_ascii_case(specialty))
    }
}

/// A bookable `[start, end)` interval of local clock time. The date comes from context.
///
/// An `end` of 00:00 means the end of the day, so `23:30-24:00` is a valid slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSlot")]
pub struct TimeSlot {
    #[serde(rename = "start_time", with = "clock_time")]
    start: NaiveTime,
    #[serde(rename = "end_time", with = "slot_end")]
    end: NaiveTime,
}

#[derive(Deserialize)]
struct RawTimeSlot {
    #[serde(with = "clock_time")]
    start_time: NaiveTime,
    #[serde(with = "slot_end")]
    end_time: NaiveTime,
}

impl TryFrom<RawTimeSlot> for TimeSlot {
    type Error = AppError;

    fn try_from(raw: RawTimeSlot) -> Result<Self, Self::Error> {
        TimeSlot::new(raw.start_time, raw.end_time)
    }
}

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

impl TimeSlot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, AppError> {
        if start.num_seconds_from_midnight() >= end_seconds(end) {
            return Err(AppError::ValidationError(format!(
                "Time slot start {} must be before end {}",
                start.format("%H:%M"),
                clock_time::format_end(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses `"HH:MM"` (or `"HH:MM:SS"`) bounds; the end may be `"24:00"`.
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        Self::new(clock_time::parse(start)?, clock_time::parse_end(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    /// 00:00 when the slot runs to the end of the day.
    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn ends_at_midnight(&self) -> bool {
        self.end == NaiveTime::default()
    }

    pub fn duration_minutes(&self) -> i64 {
        i64::from(end_seconds(self.end) - self.start.num_seconds_from_midnight()) / 60
    }

    pub fn period(&self) -> DayPeriod {
        DayPeriod::for_time(self.start)
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start.num_seconds_from_midnight() < end_seconds(other.end)
            && other.start.num_seconds_from_midnight() < end_seconds(self.end)
    }

    fn sort_key(&self) -> (NaiveTime, u32) {
        (self.start, end_seconds(self.end))
    }
}

fn end_seconds(end: NaiveTime) -> u32 {
    match end.num_seconds_from_midnight() {
        0 => SECONDS_PER_DAY,
        seconds => seconds,
    }
}

impl PartialOrd for TimeSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), clock_time::format_end(self.end))
    }
}

/// Display bucket for a slot, decided by its start hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
}

impl DayPeriod {
    pub const ALL: [DayPeriod; 3] = [DayPeriod::Morning, DayPeriod::Afternoon, DayPeriod::Evening];

    /// Morning also absorbs the few slots that start before 06:00.
    pub fn for_time(time: NaiveTime) -> Self {
        match time.hour() {
            0..=11 => DayPeriod::Morning,
            12..=16 => DayPeriod::Afternoon,
            _ => DayPeriod::Evening,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DayPeriod::Morning => "Morning",
            DayPeriod::Afternoon => "Afternoon",
            DayPeriod::Evening => "Evening",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotGroup {
    pub period: DayPeriod,
    pub slots: Vec<TimeSlot>,
}

/// Groups slots into Morning, Afternoon, Evening (in that order), omitting empty groups.
pub fn partition_slots(slots: &[TimeSlot]) -> Vec<SlotGroup> {
    DayPeriod::ALL
        .iter()
        .filter_map(|period| {
            let mut in_period: Vec<TimeSlot> = slots
                .iter()
                .filter(|slot| slot.period() == *period)
                .copied()
                .collect();

            if in_period.is_empty() {
                return None;
            }
            in_period.sort();
            Some(SlotGroup { period: *period, slots: in_period })
        })
        .collect()
}

/// Body for the availability RPC.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityQuery {
    pub p_therapist_id: Uuid,
    #[serde(with = "calendar_date")]
    pub p_date: NaiveDate,
}

pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use shared_models::error::AppError;

    pub const END_OF_DAY: &str = "24:00";

    pub fn parse(raw: &str) -> Result<NaiveTime, AppError> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|_| AppError::ValidationError(format!("Invalid clock time '{}'", raw)))
    }

    /// Like `parse`, but also accepts `24:00[:00]`, read as midnight.
    pub fn parse_end(raw: &str) -> Result<NaiveTime, AppError> {
        match raw.trim() {
            "24:00" | "24:00:00" => Ok(NaiveTime::default()),
            other => parse(other),
        }
    }

    /// Formats an interval end, writing midnight as `24:00`.
    pub fn format_end(time: NaiveTime) -> String {
        if time == NaiveTime::default() {
            END_OF_DAY.to_string()
        } else {
            time.format("%H:%M").to_string()
        }
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for interval ends: midnight travels as `"24:00"`.
pub mod slot_end {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::clock_time;

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&clock_time::format_end(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        clock_time::parse_end(&raw).map_err(serde::de::Error::custom)
    }
}

pub mod calendar_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(serde::de::Error::custom)
    }
}
