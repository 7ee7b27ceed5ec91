use campaign_dispatch::{
    config::AppConfig,
    db::{self, campaign_queries, line_queries},
    models::campaign::{DispatchStatus, NewCampaignRecord},
    models::contact::Contact,
    services::queue::{JobQueue, SendJob},
    services::scheduler::{self, DeliveryMode, DispatchParams},
};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

const TEST_DB_CONNECTIONS: u32 = 5;

/// Integration test: record lifecycle and delayed queue behavior.
///
/// Covers:
/// 1. Database connection and schema
/// 2. Campaign record creation and status transitions
/// 3. Delayed queue visibility (due vs. not-yet-due jobs)
/// 4. Pause and delete flows, including queue cancellation
///
/// Note: This requires a running PostgreSQL and Redis instance
/// configured via environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    // Load config from environment
    let config = AppConfig::from_env().expect("Failed to load config");

    // Initialize database
    let db_pool = db::init_pool(&config.database_url, TEST_DB_CONNECTIONS)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize queue");

    // 1. Seed a line for the test campaign
    let campaign = format!("it-{}", Uuid::new_v4());
    let instance = format!("it-line-{}", Uuid::new_v4());
    let line_id: Uuid = sqlx::query_scalar(
        "INSERT INTO lines (instance_name, segment) VALUES ($1, 'default') RETURNING id",
    )
    .bind(&instance)
    .fetch_one(&db_pool)
    .await
    .expect("Failed to seed line");

    let line = line_queries::get_line(&db_pool, line_id)
        .await
        .expect("Failed to get line")
        .expect("Line not found");
    assert!(line.active);
    assert_eq!(line.age_days(Utc::now()), 0);

    // 2. Create a scheduled record
    let record = campaign_queries::create_record(
        &db_pool,
        &NewCampaignRecord {
            campaign_name: campaign.clone(),
            contact_name: Some("Maria".to_string()),
            phone: "5511987654321".to_string(),
            segment: Some("default".to_string()),
            line_id,
            message: "Ola!".to_string(),
            use_template: false,
            template_id: None,
            template_variables: None,
            scheduled_at: Utc::now(),
        },
    )
    .await
    .expect("Failed to create record");

    assert!(matches!(record.status, DispatchStatus::Scheduled { .. }));
    assert_eq!(record.retry_count, 0);

    // 3. A job delayed into the future is not yet visible
    let job = SendJob {
        record_id: record.id,
        campaign_name: campaign.clone(),
        attempt: 0,
    };
    queue
        .enqueue(&job, Duration::from_secs(3600))
        .await
        .expect("Failed to enqueue delayed job");

    // The queue may hold unrelated due jobs from other runs; what matters is
    // that ours keeps its campaign out of any claim we make here.
    if let Some(claimed) = queue.dequeue_due().await.expect("dequeue failed") {
        assert_ne!(claimed.campaign_name, campaign, "delayed job became visible early");
        queue.complete(&claimed).await.expect("Failed to complete stray job");
    }

    // 4. Cancel removes the pending job
    let cancelled = queue
        .cancel_campaign(&campaign)
        .await
        .expect("Failed to cancel");
    assert_eq!(cancelled, 1);

    // 5. A zero-delay job is claimable immediately
    queue
        .enqueue(&job, Duration::ZERO)
        .await
        .expect("Failed to enqueue due job");

    let mut claimed = None;
    for _ in 0..10 {
        if let Some(got) = queue.dequeue_due().await.expect("dequeue failed") {
            if got.campaign_name == campaign {
                claimed = Some(got);
                break;
            }
            queue.complete(&got).await.expect("Failed to complete stray job");
        }
    }
    let claimed = claimed.expect("Due job never became claimable");
    assert_eq!(claimed.record_id, record.id);
    queue.complete(&claimed).await.expect("Failed to complete");

    // 6. Dispatch stamping: greeting send keeps the record pending
    campaign_queries::mark_dispatched(&db_pool, record.id, "WAMID-1", false)
        .await
        .expect("Failed to mark greeting dispatch");
    let after_greeting = campaign_queries::get_record(&db_pool, record.id)
        .await
        .expect("Failed to get record")
        .expect("Record not found");
    assert!(matches!(after_greeting.status, DispatchStatus::Scheduled { .. }));
    assert_eq!(after_greeting.external_message_id.as_deref(), Some("WAMID-1"));
    assert!(after_greeting.dispatched_at.is_some());

    // 7. Terminal dispatch flips to sent
    campaign_queries::mark_dispatched(&db_pool, record.id, "WAMID-2", true)
        .await
        .expect("Failed to mark terminal dispatch");
    let after_send = campaign_queries::get_record(&db_pool, record.id)
        .await
        .expect("Failed to get record")
        .expect("Record not found");
    assert!(matches!(after_send.status, DispatchStatus::Sent { .. }));
    assert!(after_send.status.is_terminal());

    // 8. Pause only touches still-scheduled records
    let paused = campaign_queries::pause_campaign(&db_pool, &campaign)
        .await
        .expect("Failed to pause");
    assert_eq!(paused, 0, "sent records must not be paused");

    // 9. Status counts reflect the lifecycle
    let counts = campaign_queries::status_counts(&db_pool, &campaign)
        .await
        .expect("Failed to count");
    assert_eq!(counts.get("sent"), Some(&1));

    // Cleanup
    let deleted = campaign_queries::delete_campaign(&db_pool, &campaign)
        .await
        .expect("Failed to delete campaign");
    assert_eq!(deleted, 1);

    sqlx::query("DELETE FROM lines WHERE id = $1")
        .bind(line_id)
        .execute(&db_pool)
        .await
        .expect("Failed to remove seeded line");

    println!("✅ All integration tests passed!");
}

/// Rate-window counting against real dispatched records.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_sent_window_counts() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let db_pool = db::init_pool(&config.database_url, TEST_DB_CONNECTIONS)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let campaign = format!("it-rate-{}", Uuid::new_v4());
    let instance = format!("it-line-{}", Uuid::new_v4());
    let line_id: Uuid = sqlx::query_scalar(
        "INSERT INTO lines (instance_name, segment) VALUES ($1, 'default') RETURNING id",
    )
    .bind(&instance)
    .fetch_one(&db_pool)
    .await
    .expect("Failed to seed line");

    let (today_before, hour_before) = line_queries::sent_window_counts(&db_pool, line_id)
        .await
        .expect("Failed to count");
    assert_eq!((today_before, hour_before), (0, 0));

    // One dispatched now, one two hours ago (today but outside the hour)
    for hours_ago in [0i32, 2] {
        sqlx::query(
            r#"
            INSERT INTO campaign_records
                (campaign_name, phone, line_id, message, status, dispatched_at)
            VALUES ($1, '5511987654321', $2, 'x', 'sent', NOW() - make_interval(hours => $3))
            "#,
        )
        .bind(&campaign)
        .bind(line_id)
        .bind(hours_ago)
        .execute(&db_pool)
        .await
        .expect("Failed to seed record");
    }

    let (today, last_hour) = line_queries::sent_window_counts(&db_pool, line_id)
        .await
        .expect("Failed to count");
    // The two-hour-old record may fall before UTC midnight on runs shortly
    // after 00:00 UTC; it never counts toward the trailing hour.
    assert!(today >= 1);
    assert_eq!(last_hour, 1);

    campaign_queries::delete_campaign(&db_pool, &campaign)
        .await
        .expect("Failed to clean records");
    sqlx::query("DELETE FROM lines WHERE id = $1")
        .bind(line_id)
        .execute(&db_pool)
        .await
        .expect("Failed to remove seeded line");
}

/// Batch dispatch keeps records and queue jobs consistent.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_dispatch_schedules_batch() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let db_pool = db::init_pool(&config.database_url, TEST_DB_CONNECTIONS)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize queue");

    let campaign = format!("it-batch-{}", Uuid::new_v4());
    let instance = format!("it-line-{}", Uuid::new_v4());
    let line_id: Uuid = sqlx::query_scalar(
        "INSERT INTO lines (instance_name, segment) VALUES ($1, 'default') RETURNING id",
    )
    .bind(&instance)
    .fetch_one(&db_pool)
    .await
    .expect("Failed to seed line");

    let contacts: Vec<(Contact, Option<String>)> = (0..3)
        .map(|i| {
            (
                Contact {
                    phone: format!("551198765432{i}"),
                    name: Some(format!("Contato {i}")),
                    document: None,
                    variables: HashMap::new(),
                },
                Some(format!("Ola, contato {i}!")),
            )
        })
        .collect();

    let params = DispatchParams {
        campaign_name: campaign.clone(),
        segment: "default".to_string(),
        mode: DeliveryMode::Text,
        template_id: None,
        template_variables: None,
    };

    let outcome = scheduler::dispatch(&db_pool, &queue, "default", &params, &contacts)
        .await
        .expect("Dispatch failed");
    assert_eq!(outcome.total_contacts, 3);
    assert_eq!(outcome.lines_used, 1);

    // Every persisted record has a matching queued job: no orphans either way
    let counts = campaign_queries::status_counts(&db_pool, &campaign)
        .await
        .expect("Failed to count");
    assert_eq!(counts.get("scheduled"), Some(&3));

    let cancelled = queue
        .cancel_campaign(&campaign)
        .await
        .expect("Failed to cancel");
    assert_eq!(cancelled, 3);

    // Cleanup
    campaign_queries::delete_campaign(&db_pool, &campaign)
        .await
        .expect("Failed to delete campaign");
    sqlx::query("DELETE FROM lines WHERE id = $1")
        .bind(line_id)
        .execute(&db_pool)
        .await
        .expect("Failed to remove seeded line");
}
