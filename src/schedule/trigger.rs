use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;

/// Result of waking up for a scheduled fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    Fire,
    /// Woke up past the grace window; wait for the next slot instead of catching up
    Misfired { late_by: Duration },
}

/// Cron-style trigger firing once a day at a wall-clock time in the trading timezone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyTrigger {
    hour: u32,
    minute: u32,
    tz: Tz,
    grace: Duration,
}

impl DailyTrigger {
    pub fn new(hour: u32, minute: u32, tz: Tz, grace: Duration) -> Self {
        Self {
            hour,
            minute,
            tz,
            grace,
        }
    }

    /// Next fire time strictly after `after`
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let start = after.with_timezone(&self.tz).date_naive();

        for offset in 0..3 {
            let date = start + Duration::days(offset);
            let Some(naive) = date.and_hms_opt(self.hour, self.minute, 0) else {
                continue;
            };
            // Spring-forward gap: the wall-clock time doesn't exist, fire an hour later
            let local = self
                .tz
                .from_local_datetime(&naive)
                .earliest()
                .or_else(|| self.tz.from_local_datetime(&(naive + Duration::hours(1))).earliest());

            if let Some(local) = local {
                let at = local.with_timezone(&Utc);
                if at > after {
                    return at;
                }
            }
        }

        after + Duration::days(1)
    }

    pub fn check_fire(&self, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> FireDecision {
        let late_by = now - scheduled;
        if late_by <= self.grace {
            FireDecision::Fire
        } else {
            FireDecision::Misfired { late_by }
        }
    }
}
