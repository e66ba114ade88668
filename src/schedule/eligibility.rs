use crate::models::Frequency;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;

/// Decides which cadences are due on a given day
///
/// All date arithmetic happens in the trading timezone, never server-local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradingCalendar {
    tz: Tz,
    week_start: Weekday,
}

impl TradingCalendar {
    pub fn new(tz: Tz, week_start: Weekday) -> Self {
        Self { tz, week_start }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    /// Calendar date of `now` in the trading timezone
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Whether an order with this frequency should be placed on the day containing `now`
    ///
    /// Total over every value: unrecognized cadences are never due.
    pub fn is_due_today(&self, frequency: &Frequency, now: DateTime<Utc>) -> bool {
        let today = self.local_date(now);
        match frequency {
            Frequency::Daily => true,
            Frequency::Weekly => today.weekday() == self.week_start,
            Frequency::Monthly => today.day() == 1,
            Frequency::Unrecognized(text) => {
                tracing::warn!("Unknown frequency '{}', treating as not due", text);
                false
            }
        }
    }

    /// First date strictly after `today` on which the cadence is due
    pub fn next_due_date(&self, frequency: &Frequency, today: NaiveDate) -> Option<NaiveDate> {
        match frequency {
            Frequency::Daily => Some(today + Duration::days(1)),
            Frequency::Weekly => {
                let target = self.week_start.num_days_from_monday() as i64;
                let current = today.weekday().num_days_from_monday() as i64;
                let mut ahead = (7 + target - current) % 7;
                if ahead == 0 {
                    ahead = 7;
                }
                Some(today + Duration::days(ahead))
            }
            Frequency::Monthly => {
                if today.month() == 12 {
                    NaiveDate::from_ymd_opt(today.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(today.year(), today.month() + 1, 1)
                }
            }
            Frequency::Unrecognized(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn calendar() -> TradingCalendar {
        TradingCalendar::new(New_York, Weekday::Mon)
    }

    fn eastern(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_daily_is_always_due() {
        let cal = calendar();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for offset in 0..400 {
            let day = start + Duration::days(offset);
            let now = New_York
                .from_local_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
                .unwrap()
                .with_timezone(&Utc);
            assert!(cal.is_due_today(&Frequency::Daily, now), "not due on {}", day);
        }
    }

    #[test]
    fn test_weekly_matches_week_start_only() {
        let cal = calendar();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for offset in 0..60 {
            let day = start + Duration::days(offset);
            let now = New_York
                .from_local_datetime(&day.and_hms_opt(9, 0, 0).unwrap())
                .unwrap()
                .with_timezone(&Utc);
            assert_eq!(
                cal.is_due_today(&Frequency::Weekly, now),
                day.weekday() == Weekday::Mon,
                "wrong answer for {}",
                day
            );
        }
    }

    #[test]
    fn test_monthly_matches_first_day_only() {
        let cal = calendar();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for offset in 0..400 {
            let day = start + Duration::days(offset);
            let now = New_York
                .from_local_datetime(&day.and_hms_opt(9, 0, 0).unwrap())
                .unwrap()
                .with_timezone(&Utc);
            assert_eq!(cal.is_due_today(&Frequency::Monthly, now), day.day() == 1);
        }
    }

    #[test]
    fn test_uses_trading_timezone_not_utc() {
        let cal = calendar();
        // Monday 01:00 UTC is still Sunday evening in New York
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 1, 0, 0).unwrap();
        assert!(!cal.is_due_today(&Frequency::Weekly, now));

        // Feb 1st 02:00 UTC is still Jan 31st in New York
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 2, 0, 0).unwrap();
        assert!(!cal.is_due_today(&Frequency::Monthly, now));
    }

    #[test]
    fn test_unrecognized_is_never_due() {
        let cal = calendar();
        let monday_first = eastern(2024, 1, 1, 9);
        let freq = Frequency::Unrecognized("yearly".to_string());
        assert!(!cal.is_due_today(&freq, monday_first));
        assert_eq!(cal.next_due_date(&freq, cal.local_date(monday_first)), None);
    }

    #[test]
    fn test_custom_week_start() {
        let cal = TradingCalendar::new(New_York, Weekday::Fri);
        assert!(cal.is_due_today(&Frequency::Weekly, eastern(2024, 1, 5, 9)));
        assert!(!cal.is_due_today(&Frequency::Weekly, eastern(2024, 1, 8, 9)));
    }

    #[test]
    fn test_next_due_dates() {
        let cal = calendar();
        let wednesday = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let december = NaiveDate::from_ymd_opt(2024, 12, 15).unwrap();

        assert_eq!(
            cal.next_due_date(&Frequency::Daily, wednesday),
            NaiveDate::from_ymd_opt(2024, 1, 4)
        );
        assert_eq!(cal.next_due_date(&Frequency::Weekly, wednesday), Some(monday));
        // Due today means the next one is a week out
        assert_eq!(
            cal.next_due_date(&Frequency::Weekly, monday),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(
            cal.next_due_date(&Frequency::Monthly, wednesday),
            NaiveDate::from_ymd_opt(2024, 2, 1)
        );
        assert_eq!(
            cal.next_due_date(&Frequency::Monthly, december),
            NaiveDate::from_ymd_opt(2025, 1, 1)
        );
    }
}
