use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::ContactJob;

/// Accepted wall-clock formats for `scheduled_time` values.
const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Decide whether a claimed job is eligible to run now.
///
/// The scheduled time is interpreted as local wall-clock time in the job's
/// own IANA zone and compared against `now` converted into that zone.
/// Missing schedule means always eligible. An unparseable schedule or an
/// unknown zone fails open with a warning rather than blocking the pipeline.
pub fn is_due(scheduled_time: Option<&str>, time_zone: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(scheduled) = scheduled_time.map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };

    let zone = match time_zone.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                tracing::warn!(time_zone = %name, "unknown time zone; treating job as due");
                None
            }
        },
        None => None,
    };

    // Zone-aware timestamps compare as instants regardless of the job zone.
    if let Ok(aware) = DateTime::parse_from_rfc3339(scheduled) {
        return now >= aware.with_timezone(&Utc);
    }

    let Some(naive) = parse_naive(scheduled) else {
        tracing::warn!(scheduled_time = %scheduled, "unparseable scheduled_time; treating job as due");
        return true;
    };

    match zone {
        Some(tz) => match tz.from_local_datetime(&naive).earliest() {
            Some(scheduled_local) => now.with_timezone(&tz) >= scheduled_local,
            None => {
                // Nonexistent local time (DST gap): fail open.
                tracing::warn!(scheduled_time = %scheduled, "scheduled_time does not exist in zone; treating job as due");
                true
            }
        },
        // No usable zone: interpret the wall-clock time as UTC.
        None => now.naive_utc() >= naive,
    }
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    // Date-only schedules run from local midnight.
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Gate wrapper over a job record.
pub fn job_is_due(job: &ContactJob, now: DateTime<Utc>) -> bool {
    let due = is_due(job.scheduled_time.as_deref(), job.time_zone.as_deref(), now);
    if !due {
        tracing::info!(
            job_id = %job.id,
            scheduled_time = ?job.scheduled_time,
            time_zone = ?job.time_zone,
            "job not yet due"
        );
    }
    due
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_future_schedule_in_zone_is_not_due() {
        let now = at("2026-08-07T12:00:00Z");
        assert!(!is_due(
            Some("2099-01-01T00:00:00"),
            Some("America/New_York"),
            now
        ));
    }

    #[test]
    fn test_past_schedule_in_zone_is_due() {
        let now = at("2026-08-07T12:00:00Z");
        assert!(is_due(
            Some("2020-01-01T00:00:00"),
            Some("America/New_York"),
            now
        ));
    }

    #[test]
    fn test_local_interpretation_matters_near_boundary() {
        // 11:30 UTC is 07:30 in New York (EDT): a 08:00 local schedule is
        // still in the future even though 08:00 UTC has passed.
        let now = at("2026-08-07T11:30:00Z");
        assert!(!is_due(
            Some("2026-08-07T08:00:00"),
            Some("America/New_York"),
            now
        ));
        let later = at("2026-08-07T12:30:00Z");
        assert!(is_due(
            Some("2026-08-07T08:00:00"),
            Some("America/New_York"),
            later
        ));
    }

    #[test]
    fn test_missing_schedule_is_due() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        assert!(is_due(None, Some("America/New_York"), now));
        assert!(is_due(Some("   "), None, now));
    }

    #[test]
    fn test_unparseable_schedule_fails_open() {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        assert!(is_due(Some("not a timestamp"), Some("America/New_York"), now));
        assert!(is_due(Some("31/12/2099"), None, now));
    }

    #[test]
    fn test_unknown_zone_falls_back_to_utc() {
        let now = at("2026-08-07T12:00:00Z");
        // Unknown zone: wall clock read as UTC. A past UTC instant is due.
        assert!(is_due(
            Some("2026-08-07T11:00:00"),
            Some("Mars/Olympus_Mons"),
            now
        ));
        assert!(!is_due(
            Some("2026-08-07T13:00:00"),
            Some("Mars/Olympus_Mons"),
            now
        ));
    }

    #[test]
    fn test_aware_schedule_compares_as_instant() {
        let now = at("2026-08-07T12:00:00Z");
        assert!(is_due(
            Some("2026-08-07T07:59:00-04:00"),
            Some("America/New_York"),
            now
        ));
        assert!(!is_due(
            Some("2026-08-07T08:01:00-04:00"),
            Some("America/New_York"),
            now
        ));
    }

    #[test]
    fn test_date_only_schedule_runs_from_midnight() {
        let now = at("2026-08-07T12:00:00Z");
        assert!(is_due(Some("2026-08-07"), None, now));
        assert!(!is_due(Some("2099-01-01"), None, now));
    }
}
