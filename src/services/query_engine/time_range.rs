//! Time-range expressions to concrete `[start, end]` unix-second intervals
//!
//! Recognized forms, checked in this order:
//! - day-anchored phrases: `yesterday evening peak`, `today 9-11`, `前天下午`
//! - relative windows: `last_<N>_<min|hour|day>`
//! - explicit datetimes: `between:YYYY-MM-DD HH:MM:SS:YYYY-MM-DD HH:MM:SS`
//! - explicit timestamps: `timestamp:<start>:<end>`

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::TimeRangeError;

const SECONDS_PER_DAY: i64 = 86_400;
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static RELATIVE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^last_(\d+)_(min|hour|day)$").unwrap());

static BETWEEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^between:(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}):(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})$")
        .unwrap()
});

static TIMESTAMP_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^timestamp:(-?\d+):(-?\d+)$").unwrap());

static HOUR_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2})\s*(?:点|时|:00|h)?\s*(?:-|–|—|~|～|到|至|to)\s*(\d{1,2})\s*(?:点|时|:00|h)?",
    )
    .unwrap()
});

/// Hour span inside free text. The numbers must stand alone, so identifiers
/// like `edge-10-30` never read as hours.
static TEXT_HOUR_RANGE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|[^0-9a-z_\-])(\d{1,2})\s*(点|时|:00|h)?\s*(?:-|–|—|~|～|到|至|to)\s*(\d{1,2})\s*(点|时|:00|h)?",
    )
    .unwrap()
});

/// Day anchors, longest first so `day-before-yesterday` never reads as `yesterday`
const DAY_ANCHORS: &[(&[&str], i64)] = &[
    (&["day-before-yesterday", "day_before_yesterday", "day before yesterday", "前天"], 2),
    (&["yesterday", "昨天"], 1),
    (&["today", "今天"], 0),
];

/// Part-of-day qualifier: names, default hour span, whether explicit hours are afternoon clock hours
struct DayPart {
    names: &'static [&'static str],
    hours: (u32, u32),
    pm: bool,
}

const DAY_PARTS: &[DayPart] = &[
    DayPart { names: &["evening peak", "evening_peak", "晚高峰"], hours: (19, 23), pm: true },
    DayPart { names: &["evening", "晚上", "夜间"], hours: (19, 23), pm: true },
    DayPart { names: &["morning", "上午", "早上"], hours: (8, 12), pm: false },
    DayPart { names: &["afternoon", "下午"], hours: (12, 18), pm: true },
];

fn day_part(normalized: &str) -> Option<&'static DayPart> {
    DAY_PARTS.iter().find(|part| part.names.iter().any(|n| normalized.contains(n)))
}

/// Effective `[h1, h2]` hours, shifted to the afternoon clock when the qualifier
/// says so (`晚上8点到10点` is 20-22). None unless `0 <= h1 < h2 <= 24`.
fn hour_span(h1: u32, h2: u32, pm: bool) -> Option<(u32, u32)> {
    let (h1, h2) = if pm {
        let start = if h1 < 12 { h1 + 12 } else { h1 };
        let end = match h2 {
            h if h < 12 => h + 12,
            12 if start > 12 => 24,
            h => h,
        };
        (start, end)
    } else {
        (h1, h2)
    };
    (h1 < h2 && h2 <= 24).then_some((h1, h2))
}

/// Canonical day-anchored expression for free text, e.g. `昨天晚高峰` ->
/// `yesterday evening peak`. None when the text names no day.
pub fn canonical_day_expression(text: &str) -> Option<String> {
    let normalized = text.to_lowercase();
    let (anchors, _) = DAY_ANCHORS
        .iter()
        .find(|(names, _)| names.iter().any(|n| normalized.contains(n)))?;

    let mut expr = anchors[0].to_string();
    let part = day_part(&normalized);
    if let Some(part) = part {
        expr.push(' ');
        expr.push_str(part.names[0]);
    }

    // bare digit pairs only count as hours next to an hour marker or a day part
    let span = TEXT_HOUR_RANGE_REGEX.captures(&normalized).and_then(|caps| {
        if caps.get(2).is_none() && caps.get(4).is_none() && part.is_none() {
            return None;
        }
        let h1 = caps[1].parse::<u32>().ok()?;
        let h2 = caps[3].parse::<u32>().ok()?;
        hour_span(h1, h2, part.is_some_and(|p| p.pm)).map(|_| (h1, h2))
    });
    if let Some((h1, h2)) = span {
        expr.push_str(&format!(" {}-{}", h1, h2));
    }
    Some(expr)
}

/// Resolves time-range expressions in a fixed wall-clock offset
#[derive(Debug, Clone, Copy)]
pub struct TimeRangeResolver {
    offset: FixedOffset,
}

impl TimeRangeResolver {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    /// Resolve against the current time
    pub fn resolve(&self, expr: &str) -> Result<(i64, i64), TimeRangeError> {
        self.resolve_at(expr, self.now())
    }

    /// Resolve against a caller-supplied "now"
    pub fn resolve_at(
        &self,
        expr: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<(i64, i64), TimeRangeError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(TimeRangeError::Empty);
        }
        let normalized = trimmed.to_lowercase();

        let (start, end) = if let Some(days_back) = Self::day_anchor(&normalized) {
            self.resolve_day_anchored(trimmed, &normalized, days_back, now)?
        } else if normalized.starts_with("last_") {
            Self::resolve_relative(&normalized, now)?
        } else if normalized.starts_with("between:") {
            self.resolve_between(trimmed)?
        } else if normalized.starts_with("timestamp:") {
            Self::resolve_timestamps(&normalized)?
        } else {
            return Err(TimeRangeError::Unrecognized(trimmed.to_string()));
        };

        if start >= end {
            return Err(TimeRangeError::EmptyInterval { expr: trimmed.to_string(), start, end });
        }
        Ok((start, end))
    }

    fn day_anchor(normalized: &str) -> Option<i64> {
        DAY_ANCHORS
            .iter()
            .find(|(names, _)| names.iter().any(|n| normalized.contains(n)))
            .map(|(_, days_back)| *days_back)
    }

    fn resolve_day_anchored(
        &self,
        expr: &str,
        normalized: &str,
        days_back: i64,
        now: DateTime<FixedOffset>,
    ) -> Result<(i64, i64), TimeRangeError> {
        let day: NaiveDate = now.date_naive() - Duration::days(days_back);
        let day_start = self.local_timestamp(expr, day.and_time(chrono::NaiveTime::MIN))?;

        let part = day_part(normalized);
        let explicit = HOUR_RANGE_REGEX.captures(normalized).and_then(|caps| {
            let h1 = caps[1].parse::<u32>().ok()?;
            let h2 = caps[2].parse::<u32>().ok()?;
            let span = hour_span(h1, h2, part.is_some_and(|p| p.pm));
            if span.is_none() {
                tracing::warn!("Ignoring invalid hour range {}-{} in '{}'", h1, h2, expr);
            }
            span
        });

        match explicit.or(part.map(|p| p.hours)) {
            Some((h1, h2)) => {
                Ok((day_start + i64::from(h1) * 3600, day_start + i64::from(h2) * 3600))
            },
            // a day that has only just begun still spans one second
            None if days_back == 0 => Ok((day_start, now.timestamp().max(day_start + 1))),
            None => Ok((day_start, day_start + SECONDS_PER_DAY - 1)),
        }
    }

    fn resolve_relative(
        normalized: &str,
        now: DateTime<FixedOffset>,
    ) -> Result<(i64, i64), TimeRangeError> {
        let invalid = || TimeRangeError::InvalidRelative(normalized.to_string());
        let caps = RELATIVE_REGEX.captures(normalized).ok_or_else(invalid)?;

        let n: i64 = caps[1].parse().map_err(|_| invalid())?;
        if n < 1 {
            return Err(invalid());
        }
        let unit_secs = match &caps[2] {
            "min" => 60,
            "hour" => 3600,
            "day" => SECONDS_PER_DAY,
            _ => return Err(invalid()),
        };
        let span = n.checked_mul(unit_secs).ok_or_else(invalid)?;

        let end = now.timestamp();
        Ok((end - span, end))
    }

    fn resolve_between(&self, expr: &str) -> Result<(i64, i64), TimeRangeError> {
        let caps = BETWEEN_REGEX.captures(expr).ok_or_else(|| TimeRangeError::InvalidDatetime {
            expr: expr.to_string(),
            reason: format!("expected between:<{}>:<{}>", DATETIME_FORMAT, DATETIME_FORMAT),
        })?;

        let parse = |s: &str| {
            NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map_err(|e| {
                TimeRangeError::InvalidDatetime { expr: expr.to_string(), reason: e.to_string() }
            })
        };
        let start = self.local_timestamp(expr, parse(&caps[1])?)?;
        let end = self.local_timestamp(expr, parse(&caps[2])?)?;
        Ok((start, end))
    }

    fn resolve_timestamps(normalized: &str) -> Result<(i64, i64), TimeRangeError> {
        let invalid = || TimeRangeError::InvalidTimestamp(normalized.to_string());
        let caps = TIMESTAMP_REGEX.captures(normalized).ok_or_else(invalid)?;
        let start = caps[1].parse::<i64>().map_err(|_| invalid())?;
        let end = caps[2].parse::<i64>().map_err(|_| invalid())?;
        Ok((start, end))
    }

    fn local_timestamp(&self, expr: &str, naive: NaiveDateTime) -> Result<i64, TimeRangeError> {
        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| TimeRangeError::InvalidDatetime {
                expr: expr.to_string(),
                reason: format!("{} does not exist in offset {}", naive, self.offset),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TimeRangeResolver {
        TimeRangeResolver::new(FixedOffset::east_opt(8 * 3600).unwrap())
    }

    /// 2024-03-15 14:30:00 +08:00
    fn fixed_now() -> DateTime<FixedOffset> {
        resolver().offset().with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        resolver().offset().with_ymd_and_hms(y, m, d, h, mi, s).unwrap().timestamp()
    }

    #[test]
    fn test_relative_windows_have_exact_span() {
        let r = resolver();
        let now = fixed_now();
        for (unit, secs) in [("min", 60), ("hour", 3600), ("day", 86_400)] {
            for n in [1_i64, 5, 24, 90] {
                let (start, end) = r.resolve_at(&format!("last_{}_{}", n, unit), now).unwrap();
                assert_eq!(end - start, n * secs);
                assert_eq!(end, now.timestamp());
                assert!(start < end);
            }
        }
    }

    #[test]
    fn test_last_1_hour() {
        let now = fixed_now();
        let (start, end) = resolver().resolve_at("last_1_hour", now).unwrap();
        assert_eq!(end, now.timestamp());
        assert_eq!(end - start, 3600);
    }

    #[test]
    fn test_invalid_relative_windows() {
        let r = resolver();
        for expr in ["last_x_hour", "last_5_week", "last_0_min", "last__hour", "last_5"] {
            assert!(
                matches!(r.resolve_at(expr, fixed_now()), Err(TimeRangeError::InvalidRelative(_))),
                "{}",
                expr
            );
        }
    }

    #[test]
    fn test_between_is_exact() {
        let (start, end) = resolver()
            .resolve_at("between:2024-01-01 00:00:00:2024-01-01 23:59:59", fixed_now())
            .unwrap();
        assert_eq!(start, local(2024, 1, 1, 0, 0, 0));
        assert_eq!(end, local(2024, 1, 1, 23, 59, 59));
    }

    #[test]
    fn test_between_rejects_bad_datetimes() {
        let r = resolver();
        assert!(matches!(
            r.resolve_at("between:2024-13-01 00:00:00:2024-12-01 00:00:00", fixed_now()),
            Err(TimeRangeError::InvalidDatetime { .. })
        ));
        assert!(matches!(
            r.resolve_at("between:2024-01-01:2024-01-02", fixed_now()),
            Err(TimeRangeError::InvalidDatetime { .. })
        ));
        assert!(matches!(
            r.resolve_at("between:2024-01-02 00:00:00:2024-01-01 00:00:00", fixed_now()),
            Err(TimeRangeError::EmptyInterval { .. })
        ));
    }

    #[test]
    fn test_timestamp_range() {
        let r = resolver();
        assert_eq!(
            r.resolve_at("timestamp:1609459200:1609545600", fixed_now()).unwrap(),
            (1_609_459_200, 1_609_545_600)
        );
        assert!(matches!(
            r.resolve_at("timestamp:abc:1", fixed_now()),
            Err(TimeRangeError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_unqualified_days() {
        let r = resolver();
        let now = fixed_now();
        assert_eq!(r.resolve_at("today", now).unwrap(), (local(2024, 3, 15, 0, 0, 0), now.timestamp()));
        assert_eq!(
            r.resolve_at("yesterday", now).unwrap(),
            (local(2024, 3, 14, 0, 0, 0), local(2024, 3, 14, 23, 59, 59))
        );
        assert_eq!(
            r.resolve_at("前天", now).unwrap(),
            (local(2024, 3, 13, 0, 0, 0), local(2024, 3, 13, 23, 59, 59))
        );
    }

    #[test]
    fn test_day_before_yesterday_is_not_yesterday() {
        let (start, _) = resolver().resolve_at("day-before-yesterday", fixed_now()).unwrap();
        assert_eq!(start, local(2024, 3, 13, 0, 0, 0));
    }

    #[test]
    fn test_evening_peak_defaults() {
        let r = resolver();
        let expected = (local(2024, 3, 14, 19, 0, 0), local(2024, 3, 14, 23, 0, 0));
        assert_eq!(r.resolve_at("yesterday evening peak", fixed_now()).unwrap(), expected);
        assert_eq!(r.resolve_at("昨天晚高峰", fixed_now()).unwrap(), expected);
        assert_eq!(r.resolve_at("昨天晚上", fixed_now()).unwrap(), expected);
    }

    #[test]
    fn test_explicit_hours_override_qualifier() {
        let r = resolver();
        assert_eq!(
            r.resolve_at("昨天晚高峰20-22点", fixed_now()).unwrap(),
            (local(2024, 3, 14, 20, 0, 0), local(2024, 3, 14, 22, 0, 0))
        );
        assert_eq!(
            r.resolve_at("today 9~11", fixed_now()).unwrap(),
            (local(2024, 3, 15, 9, 0, 0), local(2024, 3, 15, 11, 0, 0))
        );
        assert_eq!(
            r.resolve_at("today morning", fixed_now()).unwrap(),
            (local(2024, 3, 15, 8, 0, 0), local(2024, 3, 15, 12, 0, 0))
        );
        assert_eq!(
            r.resolve_at("今天下午", fixed_now()).unwrap(),
            (local(2024, 3, 15, 12, 0, 0), local(2024, 3, 15, 18, 0, 0))
        );
    }

    #[test]
    fn test_invalid_hour_ranges_fall_back_to_day() {
        let r = resolver();
        let whole_day = (local(2024, 3, 14, 0, 0, 0), local(2024, 3, 14, 23, 59, 59));
        assert_eq!(r.resolve_at("yesterday 22-20", fixed_now()).unwrap(), whole_day);
        assert_eq!(r.resolve_at("yesterday 20-30", fixed_now()).unwrap(), whole_day);
        assert_eq!(
            r.resolve_at("yesterday evening 10-30", fixed_now()).unwrap(),
            (local(2024, 3, 14, 19, 0, 0), local(2024, 3, 14, 23, 0, 0))
        );
    }

    #[test]
    fn test_afternoon_and_evening_hours_use_pm_clock() {
        let r = resolver();
        assert_eq!(
            r.resolve_at("yesterday evening 8-10", fixed_now()).unwrap(),
            (local(2024, 3, 14, 20, 0, 0), local(2024, 3, 14, 22, 0, 0))
        );
        assert_eq!(
            r.resolve_at("yesterday evening 9-12", fixed_now()).unwrap(),
            (local(2024, 3, 14, 21, 0, 0), local(2024, 3, 15, 0, 0, 0))
        );
        assert_eq!(
            r.resolve_at("today morning 9-11", fixed_now()).unwrap(),
            (local(2024, 3, 15, 9, 0, 0), local(2024, 3, 15, 11, 0, 0))
        );

        let expr = canonical_day_expression("昨天晚上8点到10点的丢包").unwrap();
        assert_eq!(expr, "yesterday evening 8-10");
        assert_eq!(
            r.resolve_at(&expr, fixed_now()).unwrap(),
            (local(2024, 3, 14, 20, 0, 0), local(2024, 3, 14, 22, 0, 0))
        );
    }

    #[test]
    fn test_today_at_midnight_is_not_empty() {
        let midnight = resolver().offset().with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        let (start, end) = resolver().resolve_at("today", midnight).unwrap();
        assert_eq!(start, midnight.timestamp());
        assert_eq!(end, start + 1);
    }

    #[test]
    fn test_canonical_day_expression() {
        assert_eq!(canonical_day_expression("昨天晚高峰丢包"), Some("yesterday evening peak".into()));
        assert_eq!(canonical_day_expression("前天下午2到5点延迟"), Some("day-before-yesterday afternoon 2-5".into()));
        assert_eq!(canonical_day_expression("Today 9h-11h latency"), Some("today 9-11".into()));
        assert_eq!(canonical_day_expression("近1小时丢包"), None);

        let expr = canonical_day_expression("前天下午2到5点延迟").unwrap();
        assert_eq!(
            resolver().resolve_at(&expr, fixed_now()).unwrap(),
            (local(2024, 3, 13, 14, 0, 0), local(2024, 3, 13, 17, 0, 0))
        );
    }

    #[test]
    fn test_identifier_digits_are_not_hours() {
        let expr = canonical_day_expression("yesterday loss for task edge-10-30").unwrap();
        assert_eq!(expr, "yesterday");
        assert!(resolver().resolve_at(&expr, fixed_now()).is_ok());

        assert_eq!(canonical_day_expression("today 9-11 latency"), Some("today".into()));
        assert_eq!(canonical_day_expression("昨天10点到30点"), Some("yesterday".into()));
    }

    #[test]
    fn test_unrecognized_expressions() {
        let r = resolver();
        assert_eq!(r.resolve_at("  ", fixed_now()), Err(TimeRangeError::Empty));
        assert_eq!(
            r.resolve_at("next week", fixed_now()),
            Err(TimeRangeError::Unrecognized("next week".to_string()))
        );
    }
}
