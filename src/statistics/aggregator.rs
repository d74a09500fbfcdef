//! Usage summary and time-bucketed trends

use chrono::FixedOffset;
use sqlx::Row;

use crate::error::AppResult;
use crate::store::Store;
use crate::types::{BranchUsage, Bucket, Granularity, MonthlySeries, Trend, UsageStatistics};
use crate::utils::time::DateWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    OldestFirst,
    NewestFirst,
}

impl Direction {
    fn sql(&self) -> &'static str {
        match self {
            Direction::OldestFirst => "ASC",
            Direction::NewestFirst => "DESC",
        }
    }
}

/// Computes counts over generation events and both download origins.
///
/// Buckets truncate timestamps in one fixed UTC offset so a day boundary
/// means the same thing for every query.
#[derive(Clone)]
pub struct StatisticsAggregator {
    store: Store,
    offset: FixedOffset,
}

impl StatisticsAggregator {
    pub fn new(store: Store, offset: FixedOffset) -> Self {
        Self { store, offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Counts, distinct users, branch ranking and monthly series for `window`
    pub async fn summary(&self, window: &DateWindow) -> AppResult<UsageStatistics> {
        let pool = self.store.pool();
        let (start, end) = (window.start_secs(), window.end_secs());

        let generation_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM generation_logs WHERE occurred_at BETWEEN ? AND ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;

        let download_count: i64 = sqlx::query_scalar(
            "SELECT
                (SELECT COUNT(*) FROM download_logs WHERE occurred_at BETWEEN ? AND ?)
              + (SELECT COUNT(*) FROM download_sessions WHERE created_at BETWEEN ? AND ?)",
        )
        .bind(start)
        .bind(end)
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;

        // UNION (not UNION ALL) so a user active in several origins counts once
        let distinct_user_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT user_id) FROM (
                SELECT user_id FROM generation_logs WHERE occurred_at BETWEEN ? AND ?
                UNION
                SELECT user_id FROM download_logs WHERE occurred_at BETWEEN ? AND ?
                UNION
                SELECT user_id FROM download_sessions WHERE created_at BETWEEN ? AND ?
            )",
        )
        .bind(start)
        .bind(end)
        .bind(start)
        .bind(end)
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;

        let branch_usage = sqlx::query(
            "SELECT branch, COUNT(*) AS count FROM generation_logs
             WHERE occurred_at BETWEEN ? AND ?
             GROUP BY branch ORDER BY count DESC, branch ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| {
            Ok(BranchUsage {
                branch: row.try_get("branch")?,
                count: row.try_get("count")?,
            })
        })
        .collect::<AppResult<Vec<_>>>()?;

        let monthly_series = MonthlySeries {
            generations: self
                .generation_buckets(Granularity::Monthly, window, Direction::OldestFirst, None)
                .await?
                .into_iter()
                .map(Into::into)
                .collect(),
            downloads: self
                .download_buckets(Granularity::Monthly, window, Direction::OldestFirst, None)
                .await?
                .into_iter()
                .map(Into::into)
                .collect(),
        };

        tracing::debug!(
            generation_count,
            download_count,
            distinct_user_count,
            branches = branch_usage.len(),
            "usage summary computed"
        );

        Ok(UsageStatistics {
            generation_count,
            download_count,
            distinct_user_count,
            branch_usage,
            monthly_series,
        })
    }

    /// Generation and download buckets, newest first, at most `limit` each
    pub async fn trend(
        &self,
        granularity: Granularity,
        window: &DateWindow,
        limit: Option<i64>,
    ) -> AppResult<Trend> {
        Ok(Trend {
            generations: self.generation_trend(granularity, window, limit).await?,
            downloads: self.download_trend(granularity, window, limit).await?,
        })
    }

    pub async fn generation_trend(
        &self,
        granularity: Granularity,
        window: &DateWindow,
        limit: Option<i64>,
    ) -> AppResult<Vec<Bucket>> {
        self.generation_buckets(granularity, window, Direction::NewestFirst, limit)
            .await
    }

    /// Simple file downloads and resource download sessions, summed per bucket
    pub async fn download_trend(
        &self,
        granularity: Granularity,
        window: &DateWindow,
        limit: Option<i64>,
    ) -> AppResult<Vec<Bucket>> {
        self.download_buckets(granularity, window, Direction::NewestFirst, limit)
            .await
    }

    async fn generation_buckets(
        &self,
        granularity: Granularity,
        window: &DateWindow,
        direction: Direction,
        limit: Option<i64>,
    ) -> AppResult<Vec<Bucket>> {
        let sql = format!(
            "SELECT strftime(?, occurred_at + ?, 'unixepoch') AS period, COUNT(*) AS count
             FROM generation_logs WHERE occurred_at BETWEEN ? AND ?
             GROUP BY period ORDER BY period {} LIMIT ?",
            direction.sql()
        );
        let rows = sqlx::query(&sql)
            .bind(granularity.strftime_pattern())
            .bind(self.shift_secs())
            .bind(window.start_secs())
            .bind(window.end_secs())
            .bind(sql_limit(limit))
            .fetch_all(self.store.pool())
            .await?;
        rows.iter().map(bucket_from_row).collect()
    }

    async fn download_buckets(
        &self,
        granularity: Granularity,
        window: &DateWindow,
        direction: Direction,
        limit: Option<i64>,
    ) -> AppResult<Vec<Bucket>> {
        let sql = format!(
            "SELECT period, SUM(count) AS count FROM (
                SELECT strftime(?, occurred_at + ?, 'unixepoch') AS period, COUNT(*) AS count
                FROM download_logs WHERE occurred_at BETWEEN ? AND ?
                GROUP BY period
                UNION ALL
                SELECT strftime(?, created_at + ?, 'unixepoch') AS period, COUNT(*) AS count
                FROM download_sessions WHERE created_at BETWEEN ? AND ?
                GROUP BY period
             ) GROUP BY period ORDER BY period {} LIMIT ?",
            direction.sql()
        );
        let pattern = granularity.strftime_pattern();
        let rows = sqlx::query(&sql)
            .bind(pattern)
            .bind(self.shift_secs())
            .bind(window.start_secs())
            .bind(window.end_secs())
            .bind(pattern)
            .bind(self.shift_secs())
            .bind(window.start_secs())
            .bind(window.end_secs())
            .bind(sql_limit(limit))
            .fetch_all(self.store.pool())
            .await?;
        rows.iter().map(bucket_from_row).collect()
    }

    fn shift_secs(&self) -> i64 {
        i64::from(self.offset.local_minus_utc())
    }
}

/// SQLite treats a negative LIMIT as unbounded
fn sql_limit(limit: Option<i64>) -> i64 {
    limit.filter(|n| *n >= 0).unwrap_or(-1)
}

fn bucket_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<Bucket> {
    Ok(Bucket {
        period: row.try_get("period")?,
        count: row.try_get("count")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::types::{NewGeneration, ParameterRanges, Role, UserStatus};
    use crate::utils::time::{parse_utc_offset, utc_offset};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    async fn open() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&DatabaseConfig::new(dir.path().join("stats.db")))
            .await
            .unwrap();
        (store, dir)
    }

    async fn user(store: &Store, name: &str) -> i64 {
        store
            .create_user(name, "x", Role::Operator, UserStatus::Active)
            .await
            .unwrap()
    }

    async fn generate(store: &Store, user_id: i64, branch: &str, at: DateTime<Utc>) {
        store
            .record_generation(&NewGeneration {
                user_id,
                branch: branch.to_string(),
                parameter_ranges: ParameterRanges::default(),
                file_name: "out.sql".to_string(),
                occurred_at: at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_users_counted_once() {
        let (store, _dir) = open().await;
        let alice = user(&store, "alice").await;
        let bob = user(&store, "bob").await;
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();

        generate(&store, alice, "north", at).await;
        store.record_download(alice, "north.zip", at).await.unwrap();
        store.record_download(bob, "north.zip", at).await.unwrap();

        let aggregator = StatisticsAggregator::new(store, utc_offset());
        let stats = aggregator
            .summary(&DateWindow::all_time(at + Duration::days(1)))
            .await
            .unwrap();

        assert_eq!(stats.generation_count, 1);
        assert_eq!(stats.download_count, 2);
        assert_eq!(stats.distinct_user_count, 2);
    }

    #[tokio::test]
    async fn test_branch_usage_ranking() {
        let (store, _dir) = open().await;
        let alice = user(&store, "alice").await;
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        for branch in ["south", "north", "south", "east", "north", "south"] {
            generate(&store, alice, branch, at).await;
        }

        let aggregator = StatisticsAggregator::new(store, utc_offset());
        let stats = aggregator
            .summary(&DateWindow::all_time(at + Duration::days(1)))
            .await
            .unwrap();

        let ranking: Vec<(&str, i64)> = stats
            .branch_usage
            .iter()
            .map(|b| (b.branch.as_str(), b.count))
            .collect();
        assert_eq!(ranking, vec![("south", 3), ("north", 2), ("east", 1)]);
    }

    #[tokio::test]
    async fn test_monthly_trend_counts_march() {
        let (store, _dir) = open().await;
        let alice = user(&store, "alice").await;
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        for i in 0..25 {
            generate(&store, alice, "north", base + Duration::hours(i * 20)).await;
        }
        for i in 0..10 {
            store
                .record_download(alice, "north.zip", base + Duration::days(i * 2))
                .await
                .unwrap();
        }

        let aggregator = StatisticsAggregator::new(store, utc_offset());
        let now = Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap();
        let trend = aggregator
            .trend(Granularity::Monthly, &DateWindow::all_time(now), Some(12))
            .await
            .unwrap();

        assert_eq!(
            trend.generations,
            vec![Bucket { period: "2024-03".to_string(), count: 25 }]
        );
        assert_eq!(
            trend.downloads,
            vec![Bucket { period: "2024-03".to_string(), count: 10 }]
        );
    }

    #[tokio::test]
    async fn test_daily_buckets_use_fixed_offset() {
        let (store, _dir) = open().await;
        let alice = user(&store, "alice").await;
        // 20:00 UTC on March 4th is already March 5th at +08:00
        let late = Utc.with_ymd_and_hms(2024, 3, 4, 20, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        generate(&store, alice, "north", late).await;
        generate(&store, alice, "north", early).await;

        let now = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        let aggregator = StatisticsAggregator::new(store, parse_utc_offset("+08:00").unwrap());
        let buckets = aggregator
            .generation_trend(Granularity::Daily, &DateWindow::all_time(now), None)
            .await
            .unwrap();

        let periods: Vec<&str> = buckets.iter().map(|b| b.period.as_str()).collect();
        assert_eq!(periods, vec!["2024-03-05", "2024-03-04"]);
    }

    #[tokio::test]
    async fn test_empty_window_yields_zeroes() {
        let (store, _dir) = open().await;
        let aggregator = StatisticsAggregator::new(store, utc_offset());
        let stats = aggregator
            .summary(&DateWindow::all_time(Utc::now()))
            .await
            .unwrap();

        assert_eq!(stats, UsageStatistics::default());
    }
}
