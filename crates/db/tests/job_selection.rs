//! Integration tests for the eligibility cascade and job lifecycle queries.
//!
//! Every test pins `now` to a fixed instant and writes job timestamps
//! relative to it, so tier membership never depends on the wall clock.

use chrono::{Duration, TimeZone, Utc};
use fanout_core::eligibility::{select_due, Tier, TierPolicy};
use fanout_core::status::{SubjobKind, TaskStatus};
use fanout_core::types::{DbId, Timestamp};
use fanout_db::models::job::{CreateJob, JobKind, SentMark};
use fanout_db::models::subjob::CreateSubjob;
use fanout_db::repositories::{JobRepo, SubjobRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn new_job(priority: Option<i32>) -> CreateJob {
    CreateJob {
        interval_minutes: 60,
        retro: now() - Duration::days(7),
        until_time: None,
        enabled: None,
        priority,
    }
}

async fn keyword_job(pool: &PgPool, keyword: &str, priority: Option<i32>) -> DbId {
    let (job, _) = JobRepo::create_keyword_job(pool, &new_job(priority), keyword)
        .await
        .unwrap()
        .expect("keyword should be new");
    job.id
}

async fn source_job(pool: &PgPool, source: &str, priority: Option<i32>) -> DbId {
    let (job, _) = JobRepo::create_source_job(pool, &new_job(priority), source)
        .await
        .unwrap()
        .expect("source should be new");
    job.id
}

async fn set_state(
    pool: &PgPool,
    id: DbId,
    status: Option<TaskStatus>,
    received_time: Option<Timestamp>,
    finish_time: Option<Timestamp>,
) {
    sqlx::query(
        "UPDATE jobs SET status_id = $2, received_time = $3, finish_time = $4 WHERE id = $1",
    )
    .bind(id)
    .bind(status.map(TaskStatus::id))
    .bind(received_time)
    .bind(finish_time)
    .execute(pool)
    .await
    .unwrap();
}

/// A job that last succeeded `hours_ago` hours before `now()`.
async fn finished_ok(pool: &PgPool, id: DbId, hours_ago: i64) {
    let finish = now() - Duration::hours(hours_ago);
    set_state(
        pool,
        id,
        Some(TaskStatus::Success),
        Some(finish - Duration::minutes(10)),
        Some(finish),
    )
    .await;
}

async fn select(pool: &PgPool) -> Option<(Tier, Vec<DbId>)> {
    JobRepo::select_due_job_ids(pool, now(), &TierPolicy::default(), 100)
        .await
        .unwrap()
        .map(|selection| (selection.tier, selection.job_ids))
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn empty_table_selects_nothing(pool: PgPool) {
    assert_eq!(select(&pool).await, None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn new_jobs_shadow_every_later_tier(pool: PgPool) {
    let fresh = keyword_job(&pool, "fresh", None).await;
    let retrying = keyword_job(&pool, "retrying", None).await;
    set_state(
        &pool,
        retrying,
        Some(TaskStatus::Retry),
        Some(now() - Duration::hours(2)),
        Some(now() - Duration::hours(1)),
    )
    .await;
    let recurring = source_job(&pool, "recurring", None).await;
    finished_ok(&pool, recurring, 72).await;

    assert_eq!(select(&pool).await, Some((Tier::New, vec![fresh])));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn new_tier_is_ordered_by_id(pool: PgPool) {
    let a = keyword_job(&pool, "a", None).await;
    let b = source_job(&pool, "b", Some(1)).await;
    let c = keyword_job(&pool, "c", Some(3)).await;

    assert_eq!(select(&pool).await, Some((Tier::New, vec![a, b, c])));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn regular_priority_new_job_respects_staleness_floor(pool: PgPool) {
    let id = keyword_job(&pool, "recent", Some(2)).await;
    set_state(&pool, id, None, None, Some(now() - Duration::hours(1))).await;
    assert_eq!(select(&pool).await, None);

    set_state(&pool, id, None, None, Some(now() - Duration::hours(49))).await;
    assert_eq!(select(&pool).await, Some((Tier::New, vec![id])));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn urgent_priority_bypasses_staleness_floor(pool: PgPool) {
    let id = keyword_job(&pool, "urgent", Some(1)).await;
    set_state(&pool, id, None, None, Some(now() - Duration::minutes(1))).await;

    assert_eq!(select(&pool).await, Some((Tier::New, vec![id])));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_priority_never_passes_guard(pool: PgPool) {
    keyword_job(&pool, "odd", Some(7)).await;
    assert_eq!(select(&pool).await, None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_waits_for_delay(pool: PgPool) {
    let id = keyword_job(&pool, "retry", None).await;
    set_state(
        &pool,
        id,
        Some(TaskStatus::Retry),
        Some(now() - Duration::minutes(5)),
        Some(now() - Duration::minutes(2)),
    )
    .await;
    assert_eq!(select(&pool).await, None);

    set_state(
        &pool,
        id,
        Some(TaskStatus::Retry),
        Some(now() - Duration::minutes(8)),
        Some(now() - Duration::minutes(4)),
    )
    .await;
    assert_eq!(select(&pool).await, Some((Tier::Retry, vec![id])));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retry_tier_orders_by_received_time_nulls_last(pool: PgPool) {
    let never_received = keyword_job(&pool, "never", None).await;
    let late = keyword_job(&pool, "late", None).await;
    let early = keyword_job(&pool, "early", None).await;
    let finish = Some(now() - Duration::hours(1));

    set_state(&pool, never_received, Some(TaskStatus::Retry), None, finish).await;
    set_state(
        &pool,
        late,
        Some(TaskStatus::Retry),
        Some(now() - Duration::hours(2)),
        finish,
    )
    .await;
    set_state(
        &pool,
        early,
        Some(TaskStatus::Retry),
        Some(now() - Duration::hours(3)),
        finish,
    )
    .await;

    assert_eq!(
        select(&pool).await,
        Some((Tier::Retry, vec![early, late, never_received]))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn recurring_job_is_due_exactly_at_interval(pool: PgPool) {
    let id = keyword_job(&pool, "boundary", Some(1)).await;
    // interval is 60 minutes: finishing exactly an hour ago makes it due now.
    let finish = now() - Duration::minutes(60);
    set_state(&pool, id, Some(TaskStatus::Success), Some(finish), Some(finish)).await;
    assert_eq!(select(&pool).await, Some((Tier::RecurringDue, vec![id])));

    let finish = now() - Duration::minutes(59);
    set_state(&pool, id, Some(TaskStatus::Success), Some(finish), Some(finish)).await;
    assert_eq!(select(&pool).await, None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn disabled_or_unreceived_jobs_do_not_recur(pool: PgPool) {
    let disabled = keyword_job(&pool, "disabled", None).await;
    finished_ok(&pool, disabled, 72).await;
    JobRepo::set_enabled(&pool, disabled, false).await.unwrap();

    let unreceived = keyword_job(&pool, "unreceived", None).await;
    set_state(
        &pool,
        unreceived,
        Some(TaskStatus::Success),
        None,
        Some(now() - Duration::hours(72)),
    )
    .await;

    assert_eq!(select(&pool).await, None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn fallback_tier_relaxes_staleness_floor(pool: PgPool) {
    let id = keyword_job(&pool, "fallback", Some(2)).await;
    finished_ok(&pool, id, 30).await;

    assert_eq!(
        select(&pool).await,
        Some((Tier::FallbackRecurringDue, vec![id]))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn recurring_tier_orders_by_finish_time(pool: PgPool) {
    let newer = keyword_job(&pool, "newer", None).await;
    let older = source_job(&pool, "older", None).await;
    finished_ok(&pool, newer, 50).await;
    finished_ok(&pool, older, 90).await;

    assert_eq!(
        select(&pool).await,
        Some((Tier::RecurringDue, vec![older, newer]))
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn sql_cascade_agrees_with_in_memory_cascade(pool: PgPool) {
    let policy = TierPolicy::default();
    let mut ids = Vec::new();
    for (n, priority) in [None, Some(1), Some(2), Some(3), Some(9)].into_iter().enumerate() {
        ids.push(keyword_job(&pool, &format!("k{n}"), priority).await);
        ids.push(source_job(&pool, &format!("s{n}"), priority).await);
    }
    // Walk every job out of tier 1 so the later tiers get exercised too.
    for (n, id) in ids.iter().enumerate() {
        let hours = [30_i64, 50, 72, 1, 100][n % 5];
        finished_ok(&pool, *id, hours).await;
    }
    set_state(
        &pool,
        ids[3],
        Some(TaskStatus::Retry),
        Some(now() - Duration::hours(5)),
        Some(now() - Duration::hours(4)),
    )
    .await;

    for round in 0..3 {
        let snapshots: Vec<_> = JobRepo::list_all(&pool)
            .await
            .unwrap()
            .iter()
            .map(|job| job.snapshot())
            .collect();
        let expected = select_due(&snapshots, now(), &policy);
        let actual = JobRepo::select_due_job_ids(&pool, now(), &policy, 100)
            .await
            .unwrap();
        assert_eq!(actual, expected, "round {round}");

        // Dispatch the winning tier and compare again on what remains.
        if let Some(selection) = actual {
            for id in selection.job_ids {
                JobRepo::mark_sent(&pool, id, now()).await.unwrap();
            }
        }
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn kind_filter_keeps_tier_order(pool: PgPool) {
    let k1 = keyword_job(&pool, "k1", None).await;
    let s1 = source_job(&pool, "s1", None).await;
    let k2 = keyword_job(&pool, "k2", None).await;
    let policy = TierPolicy::default();

    let keywords =
        JobRepo::due_ids(&pool, Tier::New, now(), &policy, Some(JobKind::Keyword), 10)
            .await
            .unwrap();
    let sources = JobRepo::due_ids(&pool, Tier::New, now(), &policy, Some(JobKind::Source), 10)
        .await
        .unwrap();
    let limited = JobRepo::due_ids(&pool, Tier::New, now(), &policy, None, 2)
        .await
        .unwrap();

    assert_eq!(keywords, vec![k1, k2]);
    assert_eq!(sources, vec![s1]);
    assert_eq!(limited, vec![k1, s1]);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_keyword_and_source_are_rejected(pool: PgPool) {
    keyword_job(&pool, "dup", None).await;
    source_job(&pool, "dup", None).await;

    let again = JobRepo::create_keyword_job(&pool, &new_job(None), "dup")
        .await
        .unwrap();
    assert!(again.is_none());
    let again = JobRepo::create_source_job(&pool, &new_job(None), "dup")
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(JobRepo::list_all(&pool).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn job_kind_is_recorded(pool: PgPool) {
    let k = keyword_job(&pool, "kw", None).await;
    let s = source_job(&pool, "src", None).await;

    assert_eq!(JobRepo::kind_of(&pool, k).await.unwrap(), Some(JobKind::Keyword));
    assert_eq!(JobRepo::kind_of(&pool, s).await.unwrap(), Some(JobKind::Source));
    assert_eq!(JobRepo::kind_of(&pool, 9_999).await.unwrap(), None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn job_walks_through_lifecycle(pool: PgPool) {
    let id = keyword_job(&pool, "life", None).await;

    let prior = JobRepo::mark_sent(&pool, id, now()).await.unwrap();
    assert_eq!(
        prior,
        Some(SentMark {
            status_id: None,
            sent_time: None
        })
    );
    let job = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(TaskStatus::InQueue));
    assert_eq!(job.sent_time, Some(now()));
    assert_eq!(select(&pool).await, None);

    let received = now() + Duration::minutes(1);
    assert!(JobRepo::mark_received(&pool, id, received).await.unwrap());
    let job = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(TaskStatus::InProgress));
    assert_eq!(job.received_time, Some(received));

    let finished = now() + Duration::minutes(2);
    assert!(!JobRepo::mark_finished(&pool, id, TaskStatus::InQueue, finished)
        .await
        .unwrap());
    assert!(JobRepo::mark_finished(&pool, id, TaskStatus::Success, finished)
        .await
        .unwrap());
    let job = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(TaskStatus::Success));
    assert_eq!(job.finish_time, Some(finished));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_sent_is_not_exclusive(pool: PgPool) {
    // Two overlapping cycles that read the same tier both get their update
    // through; nothing in the row state prevents a double dispatch.
    let id = keyword_job(&pool, "race", None).await;
    let policy = TierPolicy::default();

    let first = JobRepo::select_due_job_ids(&pool, now(), &policy, 10)
        .await
        .unwrap();
    let second = JobRepo::select_due_job_ids(&pool, now(), &policy, 10)
        .await
        .unwrap();
    assert_eq!(first, second);

    assert!(JobRepo::mark_sent(&pool, id, now()).await.unwrap().is_some());
    assert!(JobRepo::mark_sent(&pool, id, now()).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_sent_on_missing_job_reports_none(pool: PgPool) {
    assert_eq!(JobRepo::mark_sent(&pool, 9_999, now()).await.unwrap(), None);
    assert_eq!(SubjobRepo::mark_sent(&pool, 9_999).await.unwrap(), None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unmark_sent_restores_retry_job(pool: PgPool) {
    let id = keyword_job(&pool, "undo", None).await;
    let finished = now() - Duration::minutes(10);
    JobRepo::mark_sent(&pool, id, finished - Duration::minutes(5))
        .await
        .unwrap();
    JobRepo::mark_finished(&pool, id, TaskStatus::Retry, finished)
        .await
        .unwrap();
    let before = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();

    let prior = JobRepo::mark_sent(&pool, id, now()).await.unwrap().unwrap();
    assert_eq!(prior.status_id, Some(TaskStatus::Retry.id()));
    assert_eq!(prior.sent_time, before.sent_time);
    assert_eq!(select(&pool).await, None);

    assert!(JobRepo::unmark_sent(&pool, id, &prior, now()).await.unwrap());
    let after = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(after.status(), Some(TaskStatus::Retry));
    assert_eq!(after.sent_time, before.sent_time);
    assert_eq!(select(&pool).await, Some((Tier::Retry, vec![id])));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unmark_sent_leaves_progressed_job_alone(pool: PgPool) {
    let id = keyword_job(&pool, "moved-on", None).await;
    let prior = JobRepo::mark_sent(&pool, id, now()).await.unwrap().unwrap();
    JobRepo::mark_received(&pool, id, now() + Duration::seconds(1))
        .await
        .unwrap();

    assert!(!JobRepo::unmark_sent(&pool, id, &prior, now()).await.unwrap());
    let job = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(job.status(), Some(TaskStatus::InProgress));
}

// ---------------------------------------------------------------------------
// Subjobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn ready_subjobs_are_newest_first_and_skip_sent(pool: PgPool) {
    let mut ids = Vec::new();
    for post_id in 1..=4 {
        let subjob = SubjobRepo::create(
            &pool,
            &CreateSubjob {
                post_id,
                kind_id: SubjobKind::Reaction.id(),
            },
        )
        .await
        .unwrap();
        ids.push(subjob.id);
    }
    SubjobRepo::create(
        &pool,
        &CreateSubjob {
            post_id: 1,
            kind_id: SubjobKind::Share.id(),
        },
    )
    .await
    .unwrap();

    SubjobRepo::mark_sent(&pool, ids[3]).await.unwrap();
    SubjobRepo::mark_finished(&pool, ids[0], TaskStatus::Retry, now())
        .await
        .unwrap();
    SubjobRepo::mark_finished(&pool, ids[1], TaskStatus::Success, now())
        .await
        .unwrap();

    let ready = SubjobRepo::ready_ids(&pool, SubjobKind::Reaction, 10)
        .await
        .unwrap();
    assert_eq!(ready, vec![ids[2], ids[0]]);

    let limited = SubjobRepo::ready_ids(&pool, SubjobKind::Reaction, 1)
        .await
        .unwrap();
    assert_eq!(limited, vec![ids[2]]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn subjob_records_start_and_end(pool: PgPool) {
    let subjob = SubjobRepo::create(
        &pool,
        &CreateSubjob {
            post_id: 42,
            kind_id: SubjobKind::Comment.id(),
        },
    )
    .await
    .unwrap();
    assert_eq!(subjob.kind(), Some(SubjobKind::Comment));
    assert_eq!(subjob.status(), None);

    SubjobRepo::mark_started(&pool, subjob.id, now()).await.unwrap();
    SubjobRepo::mark_finished(&pool, subjob.id, TaskStatus::Failed, now() + Duration::minutes(1))
        .await
        .unwrap();

    let subjob = SubjobRepo::find_by_id(&pool, subjob.id).await.unwrap().unwrap();
    assert_eq!(subjob.status(), Some(TaskStatus::Failed));
    assert_eq!(subjob.start_time, Some(now()));
    assert_eq!(subjob.end_time, Some(now() + Duration::minutes(1)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unmarked_subjob_is_ready_again(pool: PgPool) {
    let subjob = SubjobRepo::create(
        &pool,
        &CreateSubjob {
            post_id: 7,
            kind_id: SubjobKind::Share.id(),
        },
    )
    .await
    .unwrap();

    let prior = SubjobRepo::mark_sent(&pool, subjob.id).await.unwrap().unwrap();
    assert_eq!(prior.status_id, None);
    assert!(SubjobRepo::ready_ids(&pool, SubjobKind::Share, 10)
        .await
        .unwrap()
        .is_empty());

    assert!(SubjobRepo::unmark_sent(&pool, subjob.id, &prior).await.unwrap());
    let ready = SubjobRepo::ready_ids(&pool, SubjobKind::Share, 10)
        .await
        .unwrap();
    assert_eq!(ready, vec![subjob.id]);
}
