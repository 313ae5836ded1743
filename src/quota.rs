//! Daily publication quota, recomputed from the job store on every cycle.

use chrono::{DateTime, Local, LocalResult, NaiveTime, TimeZone, Utc};

use crate::error::StoreError;
use crate::store::JobStore;

/// Start of the calendar day containing `now`, in `now`'s own time zone.
///
/// If local midnight does not exist (a DST gap at 00:00), the earliest valid
/// instant of that day is used.
pub fn window_start<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let tz = now.timezone();
    let day = now.date_naive();
    let midnight = day.and_time(NaiveTime::MIN);

    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(start) => start.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Walk forward until the gap ends; gaps are at most a few hours.
            (1..=24 * 4)
                .map(|quarter| midnight + chrono::Duration::minutes(15 * quarter))
                .find_map(|t| tz.from_local_datetime(&t).earliest())
                .map(|start| start.with_timezone(&Utc))
                .unwrap_or_else(|| now.with_timezone(&Utc))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub published_today: u32,
    pub daily_limit: u32,
}

impl QuotaStatus {
    pub fn is_exhausted(&self) -> bool {
        self.published_today >= self.daily_limit
    }

    pub fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.published_today)
    }
}

impl std::fmt::Display for QuotaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.published_today, self.daily_limit)
    }
}

/// Derives quota usage from `Published` records; there is no stored counter.
pub struct QuotaLedger;

impl QuotaLedger {
    pub async fn status<S: JobStore>(store: &S, daily_limit: u32) -> Result<QuotaStatus, StoreError> {
        Self::status_at(store, daily_limit, &Local::now()).await
    }

    pub async fn status_at<S: JobStore, Tz: TimeZone>(
        store: &S,
        daily_limit: u32,
        now: &DateTime<Tz>,
    ) -> Result<QuotaStatus, StoreError> {
        let since = window_start(now);
        let published_today = store.count_published_since(since).await?;
        Ok(QuotaStatus {
            published_today,
            daily_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{NewJob, StateMachine, Transition};
    use crate::store::MemoryJobStore;
    use chrono::FixedOffset;

    #[test]
    fn window_starts_at_local_midnight() {
        let tz = FixedOffset::east_opt(5 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap();
        let start = window_start(&now);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 9, 19, 0, 0).unwrap());
    }

    #[test]
    fn window_in_utc() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 1).unwrap();
        assert_eq!(
            window_start(&now),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn status_exhaustion() {
        let status = QuotaStatus {
            published_today: 4,
            daily_limit: 4,
        };
        assert!(status.is_exhausted());
        assert_eq!(status.remaining(), 0);
        assert_eq!(status.to_string(), "4/4");

        let status = QuotaStatus {
            published_today: 1,
            daily_limit: 4,
        };
        assert!(!status.is_exhausted());
        assert_eq!(status.remaining(), 3);
    }

    #[tokio::test]
    async fn yesterdays_publications_do_not_count() {
        let store = MemoryJobStore::new();
        let now = Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap();
        for at in [
            Utc.with_ymd_and_hms(2024, 6, 1, 23, 59, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 2, 0, 5, 0).unwrap(),
        ] {
            let mut job = store.insert(NewJob::new("a")).await.unwrap();
            for transition in [
                Transition::BeginAcquisition,
                Transition::Acquired { artifact: "a.mp4".into() },
                Transition::BeginPublication,
                Transition::Published { at },
            ] {
                let update = StateMachine::plan(&job, transition).unwrap();
                job = store.compare_and_set_state(&job.id, job.state, update).await.unwrap();
            }
        }

        let status = QuotaLedger::status_at(&store, 4, &now).await.unwrap();
        assert_eq!(status.published_today, 1);
    }
}
