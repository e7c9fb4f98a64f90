//! Stored records and listing filters

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Timelike, Utc};
use contracts::MeasurementSubmission;
use serde::{Deserialize, Serialize};

/// Default window for summaries
pub const DEFAULT_SUMMARY_HOURS: u32 = 24;
/// Widest window a summary covers
pub const MAX_SUMMARY_HOURS: u32 = 24 * 31;

/// Default page size for listings
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Largest page a listing returns
pub const MAX_LIST_LIMIT: usize = 500;

/// A measurement as held by the central aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    #[serde(flatten)]
    pub measurement: MeasurementSubmission,
    /// Server clock at first acceptance
    pub received_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(measurement: MeasurementSubmission, received_at: DateTime<Utc>) -> Self {
        Self {
            measurement,
            received_at,
        }
    }
}

/// Listing filter, newest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub radar_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl RecordFilter {
    pub fn radar(radar_id: impl Into<String>) -> Self {
        Self {
            radar_id: Some(radar_id.into()),
            ..Default::default()
        }
    }

    pub(crate) fn matches(&self, record: &StoredRecord) -> bool {
        self.radar_id
            .as_deref()
            .is_none_or(|id| id == record.measurement.radar_id)
    }

    pub(crate) fn effective_limit(&self) -> usize {
        self.limit.min(MAX_LIST_LIMIT)
    }
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            radar_id: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

/// Result of a conditional insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Aggregates over records captured after `since`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub since: DateTime<Utc>,
    pub total: usize,
    pub over_limit: usize,
    pub avg_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    /// Distinct radars reporting in the window
    pub radars: usize,
    /// Busiest radar first
    pub per_radar: Vec<RadarSummary>,
    /// Oldest hour first
    pub hourly: Vec<HourlySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarSummary {
    pub radar_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radar_name: Option<String>,
    pub total: usize,
    pub over_limit: usize,
    pub avg_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySummary {
    /// Start of the hour, UTC
    pub hour: DateTime<Utc>,
    pub total: usize,
    pub avg_speed_kmh: Option<f64>,
}

#[derive(Debug, Default)]
struct SpeedTally {
    total: usize,
    over_limit: usize,
    sum: f64,
    max: Option<f64>,
}

impl SpeedTally {
    fn add(&mut self, m: &MeasurementSubmission) {
        self.total += 1;
        if m.over_limit {
            self.over_limit += 1;
        }
        self.sum += m.speed_kmh;
        self.max = Some(self.max.map_or(m.speed_kmh, |max| max.max(m.speed_kmh)));
    }

    fn avg(&self) -> Option<f64> {
        (self.total > 0).then(|| self.sum / self.total as f64)
    }
}

impl RecordSummary {
    /// Summarize `records` whose capture time is after `since`
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a StoredRecord>,
        since: DateTime<Utc>,
    ) -> Self {
        let mut overall = SpeedTally::default();
        let mut radars: HashMap<&str, (Option<&str>, SpeedTally)> = HashMap::new();
        let mut hours: BTreeMap<DateTime<Utc>, SpeedTally> = BTreeMap::new();

        for record in records {
            let m = &record.measurement;
            if m.captured_at <= since {
                continue;
            }
            overall.add(m);

            let (name, tally) = radars.entry(m.radar_id.as_str()).or_default();
            // Latest name reported wins
            if m.radar_name.is_some() {
                *name = m.radar_name.as_deref();
            }
            tally.add(m);

            hours.entry(start_of_hour(m.captured_at)).or_default().add(m);
        }

        let mut per_radar: Vec<RadarSummary> = radars
            .into_iter()
            .map(|(radar_id, (radar_name, tally))| RadarSummary {
                radar_id: radar_id.to_string(),
                radar_name: radar_name.map(str::to_string),
                total: tally.total,
                over_limit: tally.over_limit,
                avg_speed_kmh: tally.avg(),
                max_speed_kmh: tally.max,
            })
            .collect();
        per_radar.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.radar_id.cmp(&b.radar_id)));

        Self {
            since,
            total: overall.total,
            over_limit: overall.over_limit,
            avg_speed_kmh: overall.avg(),
            max_speed_kmh: overall.max,
            radars: per_radar.len(),
            per_radar,
            hourly: hours
                .into_iter()
                .map(|(hour, tally)| HourlySummary {
                    hour,
                    total: tally.total,
                    avg_speed_kmh: tally.avg(),
                })
                .collect(),
        }
    }
}

fn start_of_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use contracts::{Direction, Measurement};

    fn record_at(radar_id: &str, at: DateTime<Utc>, speed_kmh: f64) -> StoredRecord {
        let m = Measurement::new(radar_id, at, speed_kmh, Direction::AToB, speed_kmh > 40.0);
        StoredRecord::new(m.to_submission(Some("Gate")), at)
    }

    #[test]
    fn test_summary_groups_by_radar_and_hour() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 0).unwrap();
        let records = vec![
            record_at("north", t0 - Duration::hours(30), 99.0),
            record_at("north", t0, 30.0),
            record_at("north", t0 + Duration::minutes(20), 50.0),
            record_at("south", t0 + Duration::minutes(50), 40.0),
        ];

        let summary = RecordSummary::from_records(&records, t0 - Duration::hours(24));
        assert_eq!(summary.total, 3);
        assert_eq!(summary.over_limit, 1);
        assert_eq!(summary.radars, 2);
        assert_eq!(summary.max_speed_kmh, Some(50.0));
        assert!((summary.avg_speed_kmh.unwrap() - 40.0).abs() < 1e-9);

        assert_eq!(summary.per_radar[0].radar_id, "north");
        assert_eq!(summary.per_radar[0].total, 2);
        assert_eq!(summary.per_radar[0].radar_name.as_deref(), Some("Gate"));
        assert_eq!(summary.per_radar[1].radar_id, "south");

        let hours: Vec<_> = summary.hourly.iter().map(|h| (h.hour, h.total)).collect();
        assert_eq!(
            hours,
            vec![
                (Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(), 2),
                (Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap(), 1),
            ]
        );
    }

    #[test]
    fn test_empty_window() {
        let summary = RecordSummary::from_records(&Vec::new(), Utc::now());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.avg_speed_kmh, None);
        assert!(summary.per_radar.is_empty());
        assert!(summary.hourly.is_empty());
    }
}
