//! Merged activity feed over the three log origins

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use crate::error::{AppError, AppResult};
use crate::store::Store;
use crate::types::{
    DownloadEvent, GenerationEvent, LogRecord, OperationEvent, Origin, Page, ParameterRanges,
    RESERVED_OPERATION_TYPES,
};
use crate::utils::time::{from_unix, DateWindow};

use super::filter::{LogFilter, PageRequest};

/// Every sub-query projects to the same named columns, in the same order
const OPERATION_PROJECTION: &str = "SELECT 'operation' AS origin, 0 AS origin_rank, \
    o.id AS id, o.user_id AS user_id, u.username AS username, \
    o.operation_type AS operation_type, o.detail AS detail, o.result AS result, \
    NULL AS branch, NULL AS user_start_index, NULL AS user_max_index, \
    NULL AS department_index, NULL AS users_per_department, \
    NULL AS device_start_index, NULL AS device_max_index, \
    NULL AS file_name, o.occurred_at AS occurred_at \
    FROM operation_logs o LEFT JOIN users u ON u.id = o.user_id";

const GENERATION_PROJECTION: &str = "SELECT 'generation' AS origin, 1 AS origin_rank, \
    g.id AS id, g.user_id AS user_id, u.username AS username, \
    'script_generation' AS operation_type, NULL AS detail, NULL AS result, \
    g.branch AS branch, g.user_start_index AS user_start_index, \
    g.user_max_index AS user_max_index, g.department_index AS department_index, \
    g.users_per_department AS users_per_department, \
    g.device_start_index AS device_start_index, g.device_max_index AS device_max_index, \
    g.file_name AS file_name, g.occurred_at AS occurred_at \
    FROM generation_logs g LEFT JOIN users u ON u.id = g.user_id";

const DOWNLOAD_PROJECTION: &str = "SELECT 'download' AS origin, 2 AS origin_rank, \
    d.id AS id, d.user_id AS user_id, u.username AS username, \
    'download' AS operation_type, NULL AS detail, NULL AS result, \
    NULL AS branch, NULL AS user_start_index, NULL AS user_max_index, \
    NULL AS department_index, NULL AS users_per_department, \
    NULL AS device_start_index, NULL AS device_max_index, \
    d.file_name AS file_name, d.occurred_at AS occurred_at \
    FROM download_logs d LEFT JOIN users u ON u.id = d.user_id";

/// Newest first; equal timestamps fall back to origin rank then id
const FEED_ORDER: &str = " ORDER BY occurred_at DESC, origin_rank ASC, id DESC";

/// Read-only view that unifies operation, generation and download logs
#[derive(Clone)]
pub struct LogUnifier {
    store: Store,
}

impl LogUnifier {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// One page of the merged feed plus the total before pagination
    pub async fn query(&self, filter: &LogFilter, page: &PageRequest) -> AppResult<Page<LogRecord>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM (");
        push_union(&mut count, filter);
        count.push(") AS feed");
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.store.pool())
            .await?;

        if total == 0 || page.offset() >= total {
            return Ok(Page::new(Vec::new(), total, page.page(), page.page_size()));
        }

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM (");
        push_union(&mut select, filter);
        select.push(") AS feed");
        select.push(FEED_ORDER);
        select.push(" LIMIT ");
        select.push_bind(page.page_size());
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let rows = select.build().fetch_all(self.store.pool()).await?;
        let entries = rows
            .iter()
            .map(record_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        tracing::debug!(
            total,
            page = page.page(),
            returned = entries.len(),
            origins = filter.origins().len(),
            "activity feed queried"
        );
        Ok(Page::new(entries, total, page.page(), page.page_size()))
    }

    /// Generation events, newest first, optionally restricted to one branch
    pub async fn generation_history(
        &self,
        branch: Option<&str>,
        window: &DateWindow,
        page: &PageRequest,
    ) -> AppResult<Page<GenerationEvent>> {
        let branch = branch.map(str::trim).filter(|b| !b.is_empty());

        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM generation_logs g WHERE g.occurred_at BETWEEN ",
        );
        push_history_filters(&mut count, branch, window);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(self.store.pool())
            .await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT g.*, u.username AS username FROM generation_logs g \
             LEFT JOIN users u ON u.id = g.user_id WHERE g.occurred_at BETWEEN ",
        );
        push_history_filters(&mut select, branch, window);
        select.push(" ORDER BY g.occurred_at DESC, g.id DESC LIMIT ");
        select.push_bind(page.page_size());
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let rows = select.build().fetch_all(self.store.pool()).await?;
        let entries = rows
            .iter()
            .map(generation_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Page::new(entries, total, page.page(), page.page_size()))
    }
}

/// Push the filtered UNION ALL of every origin selected by `filter`
fn push_union(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
    for (i, origin) in filter.origins().iter().enumerate() {
        if i > 0 {
            qb.push(" UNION ALL ");
        }
        let alias = match origin {
            Origin::Operation => {
                qb.push(OPERATION_PROJECTION);
                qb.push(" WHERE o.operation_type NOT IN (");
                let mut reserved = qb.separated(", ");
                for kind in RESERVED_OPERATION_TYPES {
                    reserved.push_bind(kind);
                }
                reserved.push_unseparated(")");
                if let Some(operation_type) = filter.operation_type() {
                    qb.push(" AND o.operation_type = ");
                    qb.push_bind(operation_type.to_string());
                }
                "o"
            }
            Origin::Generation => {
                qb.push(GENERATION_PROJECTION);
                qb.push(" WHERE 1 = 1");
                "g"
            }
            Origin::Download => {
                qb.push(DOWNLOAD_PROJECTION);
                qb.push(" WHERE 1 = 1");
                "d"
            }
        };

        qb.push(format!(" AND {}.occurred_at BETWEEN ", alias));
        qb.push_bind(filter.window.start_secs());
        qb.push(" AND ");
        qb.push_bind(filter.window.end_secs());
        if let Some(user_id) = filter.user_id {
            qb.push(format!(" AND {}.user_id = ", alias));
            qb.push_bind(user_id);
        }
        if let Some(username) = filter.username() {
            qb.push(" AND u.username = ");
            qb.push_bind(username.to_string());
        }
    }
}

fn push_history_filters(qb: &mut QueryBuilder<'_, Sqlite>, branch: Option<&str>, window: &DateWindow) {
    qb.push_bind(window.start_secs());
    qb.push(" AND ");
    qb.push_bind(window.end_secs());
    if let Some(branch) = branch {
        qb.push(" AND g.branch = ");
        qb.push_bind(branch.to_string());
    }
}

fn record_from_row(row: &SqliteRow) -> AppResult<LogRecord> {
    let origin: String = row.try_get("origin")?;
    let origin: Origin = origin.parse().map_err(AppError::Internal)?;

    let id: i64 = row.try_get("id")?;
    let user_id: i64 = row.try_get("user_id")?;
    let username: Option<String> = row.try_get("username")?;
    let occurred_at = from_unix(row.try_get("occurred_at")?);

    let record = match origin {
        Origin::Operation => LogRecord::Operation(OperationEvent {
            id,
            user_id,
            username,
            operation_type: row.try_get("operation_type")?,
            detail: row.try_get("detail")?,
            result: row.try_get("result")?,
            occurred_at,
        }),
        Origin::Generation => LogRecord::Generation(GenerationEvent {
            id,
            user_id,
            username,
            branch: row.try_get("branch")?,
            parameter_ranges: ranges_from_row(row)?,
            file_name: row.try_get("file_name")?,
            occurred_at,
        }),
        Origin::Download => LogRecord::Download(DownloadEvent {
            id,
            user_id,
            username,
            file_name: row.try_get("file_name")?,
            occurred_at,
        }),
    };
    Ok(record)
}

fn ranges_from_row(row: &SqliteRow) -> AppResult<ParameterRanges> {
    Ok(ParameterRanges {
        user_start_index: row.try_get("user_start_index")?,
        user_max_index: row.try_get("user_max_index")?,
        department_index: row.try_get("department_index")?,
        users_per_department: row.try_get("users_per_department")?,
        device_start_index: row.try_get("device_start_index")?,
        device_max_index: row.try_get("device_max_index")?,
    })
}

pub(crate) fn generation_from_row(row: &SqliteRow) -> AppResult<GenerationEvent> {
    Ok(GenerationEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        branch: row.try_get("branch")?,
        parameter_ranges: ranges_from_row(row)?,
        file_name: row.try_get("file_name")?,
        occurred_at: from_unix(row.try_get("occurred_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::types::{NewGeneration, NewOperation, Role, UserStatus};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    struct Fixture {
        store: Store,
        unifier: LogUnifier,
        alice: i64,
        bob: i64,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Store::open(&DatabaseConfig::new(dir.path().join("feed.db")))
            .await
            .unwrap();
        let alice = store
            .create_user("alice", "x", Role::Operator, UserStatus::Active)
            .await
            .unwrap();
        let bob = store
            .create_user("bob", "x", Role::NormalUser, UserStatus::Active)
            .await
            .unwrap();
        Fixture {
            unifier: LogUnifier::new(store.clone()),
            store,
            alice,
            bob,
            _dir: dir,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()
    }

    fn all(now: DateTime<Utc>) -> LogFilter {
        LogFilter::within(DateWindow::all_time(now))
    }

    async fn generate(store: &Store, user_id: i64, branch: &str, at: DateTime<Utc>) {
        store
            .record_generation(&NewGeneration {
                user_id,
                branch: branch.to_string(),
                parameter_ranges: ParameterRanges {
                    user_start_index: 1,
                    user_max_index: 50,
                    department_index: 2,
                    users_per_department: 10,
                    device_start_index: 100,
                    device_max_index: 150,
                },
                file_name: format!("{}.zip", branch),
                occurred_at: at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reserved_generic_operations_are_hidden() {
        let f = fixture().await;
        // A download writes both a specialized and a generic row
        f.store.record_download(f.alice, "a.zip", t0()).await.unwrap();
        f.store
            .record_operation(&NewOperation::succeeded(f.alice, "download", "a.zip").at(t0()))
            .await
            .unwrap();
        generate(&f.store, f.alice, "north", t0()).await;
        f.store
            .record_operation(
                &NewOperation::succeeded(f.alice, "script_generation", "north").at(t0()),
            )
            .await
            .unwrap();
        f.store
            .record_operation(&NewOperation::succeeded(f.bob, "login", "ok").at(t0()))
            .await
            .unwrap();

        let page = PageRequest::new(1, 10).unwrap();
        let result = f.unifier.query(&all(t0()), &page).await.unwrap();

        assert_eq!(result.total, 3);
        let generic: Vec<_> = result
            .entries
            .iter()
            .filter(|r| r.origin() == Origin::Operation)
            .collect();
        assert_eq!(generic.len(), 1);
        assert_eq!(generic[0].operation_type(), "login");
    }

    #[tokio::test]
    async fn test_ordering_is_newest_first_with_stable_ties() {
        let f = fixture().await;
        f.store.record_download(f.alice, "a.zip", t0()).await.unwrap();
        generate(&f.store, f.alice, "north", t0()).await;
        f.store
            .record_operation(&NewOperation::succeeded(f.alice, "login", "ok").at(t0()))
            .await
            .unwrap();
        f.store
            .record_download(f.bob, "later.zip", t0() + Duration::hours(1))
            .await
            .unwrap();

        let now = t0() + Duration::days(1);
        let page = PageRequest::new(1, 10).unwrap();
        let result = f.unifier.query(&all(now), &page).await.unwrap();

        let origins: Vec<Origin> = result.entries.iter().map(LogRecord::origin).collect();
        assert_eq!(
            origins,
            vec![Origin::Download, Origin::Operation, Origin::Generation, Origin::Download]
        );
        for pair in result.entries.windows(2) {
            assert!(pair[0].occurred_at() >= pair[1].occurred_at());
        }
    }

    #[tokio::test]
    async fn test_pages_partition_the_feed() {
        let f = fixture().await;
        for i in 0..7 {
            let at = t0() + Duration::minutes(i);
            f.store.record_download(f.alice, "a.zip", at).await.unwrap();
            generate(&f.store, f.bob, "south", at).await;
            f.store
                .record_operation(&NewOperation::succeeded(f.alice, "login", "ok").at(at))
                .await
                .unwrap();
        }

        let now = t0() + Duration::days(1);
        let full = f
            .unifier
            .query(&all(now), &PageRequest::new(1, 100).unwrap())
            .await
            .unwrap();
        assert_eq!(full.total, 21);

        let mut stitched = Vec::new();
        for p in 1..=5 {
            let page = f
                .unifier
                .query(&all(now), &PageRequest::new(p, 5).unwrap())
                .await
                .unwrap();
            assert_eq!(page.total, 21);
            assert_eq!(page.total_pages, 5);
            stitched.extend(page.entries);
        }
        assert_eq!(stitched, full.entries);
    }

    #[tokio::test]
    async fn test_filters_are_conjunctive() {
        let f = fixture().await;
        f.store.record_download(f.alice, "a.zip", t0()).await.unwrap();
        f.store.record_download(f.bob, "b.zip", t0()).await.unwrap();
        generate(&f.store, f.alice, "north", t0()).await;
        f.store
            .record_operation(&NewOperation::succeeded(f.alice, "login", "ok").at(t0()))
            .await
            .unwrap();

        let page = PageRequest::new(1, 10).unwrap();

        let downloads = f
            .unifier
            .query(&all(t0()).with_operation_type("download"), &page)
            .await
            .unwrap();
        assert_eq!(downloads.total, 2);
        assert!(downloads.entries.iter().all(|r| r.origin() == Origin::Download));

        let alice_downloads = f
            .unifier
            .query(
                &all(t0()).with_operation_type("download").with_username("alice"),
                &page,
            )
            .await
            .unwrap();
        assert_eq!(alice_downloads.total, 1);
        assert_eq!(alice_downloads.entries[0].user_id(), f.alice);

        let bob_only = f
            .unifier
            .query(&all(t0()).with_user_id(f.bob), &page)
            .await
            .unwrap();
        assert_eq!(bob_only.total, 1);

        let logins = f
            .unifier
            .query(&all(t0()).with_operation_type("login"), &page)
            .await
            .unwrap();
        assert_eq!(logins.total, 1);
        assert_eq!(logins.entries[0].origin(), Origin::Operation);
    }

    #[tokio::test]
    async fn test_date_window_and_empty_result() {
        let f = fixture().await;
        f.store.record_download(f.alice, "a.zip", t0()).await.unwrap();

        let page = PageRequest::new(1, 10).unwrap();
        let offset = crate::utils::time::utc_offset();
        let march_10 =
            DateWindow::from_dates(Some("2024-03-10"), Some("2024-03-10"), offset, t0()).unwrap();
        let hit = f
            .unifier
            .query(&LogFilter::within(march_10), &page)
            .await
            .unwrap();
        assert_eq!(hit.total, 1);

        let march_11 =
            DateWindow::from_dates(Some("2024-03-11"), Some("2024-03-12"), offset, t0()).unwrap();
        let miss = f
            .unifier
            .query(&LogFilter::within(march_11), &page)
            .await
            .unwrap();
        assert_eq!(miss.total, 0);
        assert!(miss.entries.is_empty());
        assert_eq!(miss.total_pages, 0);
    }

    #[tokio::test]
    async fn test_generation_history_by_branch() {
        let f = fixture().await;
        generate(&f.store, f.alice, "north", t0()).await;
        generate(&f.store, f.alice, "south", t0() + Duration::minutes(1)).await;
        generate(&f.store, f.bob, "north", t0() + Duration::minutes(2)).await;

        let now = t0() + Duration::days(1);
        let window = DateWindow::all_time(now);
        let page = PageRequest::new(1, 10).unwrap();

        let north = f
            .unifier
            .generation_history(Some("north"), &window, &page)
            .await
            .unwrap();
        assert_eq!(north.total, 2);
        assert_eq!(north.entries[0].username.as_deref(), Some("bob"));
        assert_eq!(north.entries[0].parameter_ranges.device_max_index, 150);

        let everything = f
            .unifier
            .generation_history(None, &window, &page)
            .await
            .unwrap();
        assert_eq!(everything.total, 3);
    }
}
