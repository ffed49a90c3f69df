//! Day boundaries and the task that runs the history engine once per day.
//!
//! A "day" starts at `day_start_hour` local time, so late-night browsing is
//! counted with the evening before.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::engine::{HistoryEngine, HistoryRun};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

/// Retry delay after a failed run.
const RETRY_SECS: u64 = 15 * 60;

fn boundary_on<Tz: TimeZone>(date: NaiveDate, hour: u32, tz: &Tz) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        // Skipped by a DST change; the UTC reading is close enough.
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// First day start strictly after `t`.
pub fn day_boundary_after<Tz: TimeZone>(t: DateTime<Utc>, hour: u32, tz: &Tz) -> DateTime<Utc> {
    let date = t.with_timezone(tz).date_naive();
    let today = boundary_on(date, hour, tz);
    if today > t {
        return today;
    }
    let tomorrow = date.succ_opt().unwrap_or(date);
    boundary_on(tomorrow, hour, tz)
}

/// Latest day start at or before `t`.
pub fn day_boundary_at_or_before<Tz: TimeZone>(
    t: DateTime<Utc>,
    hour: u32,
    tz: &Tz,
) -> DateTime<Utc> {
    let date = t.with_timezone(tz).date_naive();
    let today = boundary_on(date, hour, tz);
    if today <= t {
        return today;
    }
    let yesterday = date.pred_opt().unwrap_or(date);
    boundary_on(yesterday, hour, tz)
}

/// How long to wait before the first run. An overdue run still waits
/// `startup_delay` so the rest of the system can come up.
pub fn initial_delay(
    due: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    startup_delay: std::time::Duration,
) -> std::time::Duration {
    match due {
        Some(due) if due > now => (due - now).to_std().unwrap_or(startup_delay),
        _ => startup_delay,
    }
}

pub fn spawn_scheduler(
    engine: HistoryEngine,
    startup_delay: std::time::Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let due = match engine.next_due().await {
            Ok(due) => due,
            Err(err) => {
                log_error!("Failed to read history watermark: {err:#}");
                None
            }
        };
        let mut delay = initial_delay(due, Utc::now(), startup_delay);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => break,
            }

            let now = Utc::now();
            delay = match engine.run_scheduled(now).await {
                Ok(HistoryRun::NotDue { due }) => until(due, now),
                Ok(run) => {
                    log_info!("History run finished: {}", describe(&run));
                    match engine.next_due().await {
                        Ok(Some(due)) => until(due, now),
                        _ => std::time::Duration::from_secs(RETRY_SECS),
                    }
                }
                Err(err) => {
                    log_error!("History processing failed: {err:#}");
                    std::time::Duration::from_secs(RETRY_SECS)
                }
            };
        }
        log_info!("history scheduler shutting down");
    })
}

fn until(due: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (due - now)
        .max(Duration::seconds(1))
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(1))
}

fn describe(run: &HistoryRun) -> String {
    match run {
        HistoryRun::Initialized { watermark } => format!("initialized at {watermark}"),
        HistoryRun::NotDue { due } => format!("next run at {due}"),
        HistoryRun::Skipped { watermark } => format!("skipped up to {watermark}"),
        HistoryRun::Processed { watermark, flattrs } => {
            format!("{} visit flattrs up to {watermark}", flattrs.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn boundary_after_uses_day_start_hour() {
        assert_eq!(
            day_boundary_after(utc(2024, 3, 10, 2, 0), 4, &Utc),
            utc(2024, 3, 10, 4, 0)
        );
        assert_eq!(
            day_boundary_after(utc(2024, 3, 10, 4, 0), 4, &Utc),
            utc(2024, 3, 11, 4, 0)
        );
        assert_eq!(
            day_boundary_after(utc(2024, 3, 10, 23, 30), 4, &Utc),
            utc(2024, 3, 11, 4, 0)
        );
    }

    #[test]
    fn boundary_at_or_before() {
        assert_eq!(
            day_boundary_at_or_before(utc(2024, 3, 10, 2, 0), 4, &Utc),
            utc(2024, 3, 9, 4, 0)
        );
        assert_eq!(
            day_boundary_at_or_before(utc(2024, 3, 10, 4, 0), 4, &Utc),
            utc(2024, 3, 10, 4, 0)
        );
    }

    #[test]
    fn respects_fixed_offsets() {
        let tz = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        // 04:00 at +02:00 is 02:00 UTC.
        assert_eq!(
            day_boundary_after(utc(2024, 3, 10, 1, 0), 4, &tz),
            utc(2024, 3, 10, 2, 0)
        );
    }

    #[test]
    fn overdue_runs_wait_for_startup() {
        let now = utc(2024, 3, 10, 12, 0);
        let startup = std::time::Duration::from_secs(60);
        assert_eq!(initial_delay(Some(utc(2024, 3, 9, 4, 0)), now, startup), startup);
        assert_eq!(initial_delay(None, now, startup), startup);
        assert_eq!(
            initial_delay(Some(utc(2024, 3, 10, 13, 0)), now, startup),
            std::time::Duration::from_secs(3600)
        );
    }
}
