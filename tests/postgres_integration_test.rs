// ABOUTME: Integration tests against two live PostgreSQL databases
// ABOUTME: Requires TEST_BEFORE_URL and TEST_AFTER_URL; run with --ignored

use db_insert_diff::sink::CollectingSink;
use db_insert_diff::snapshot::{postgres, PostgresSnapshot};
use db_insert_diff::{DiffConfig, DiffPipeline};
use std::env;

const SCHEMA: &str = "db_insert_diff_test";

/// Helper to get test database URLs from environment
fn get_test_urls() -> Option<(String, String)> {
    let before = env::var("TEST_BEFORE_URL").ok()?;
    let after = env::var("TEST_AFTER_URL").ok()?;
    Some((before, after))
}

async fn reset_schema(client: &tokio_postgres::Client, extra: &str) -> anyhow::Result<()> {
    let ddl = format!(
        r#"
        DROP SCHEMA IF EXISTS {schema} CASCADE;
        CREATE SCHEMA {schema};
        CREATE TABLE {schema}.orders (
            id INTEGER PRIMARY KEY,
            total NUMERIC(10,2),
            paid BOOLEAN,
            note TEXT,
            placed_at TIMESTAMP
        );
        CREATE TABLE {schema}.order_tags (order_id INTEGER, tag TEXT);
        CREATE TABLE {schema}."Audit Log" (id INTEGER PRIMARY KEY, payload BYTEA);
        INSERT INTO {schema}.orders VALUES (1, 5.00, false, 'first', '2024-01-01 00:00:00');
        INSERT INTO {schema}.order_tags VALUES (1, 'gift');
        {extra}
        "#,
        schema = SCHEMA,
        extra = extra
    );
    client.batch_execute(&ddl).await?;
    Ok(())
}

async fn drop_schema(client: &tokio_postgres::Client) -> anyhow::Result<()> {
    client
        .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", SCHEMA))
        .await?;
    Ok(())
}

#[tokio::test]
#[ignore]
async fn test_postgres_new_rows_emitted() {
    let Some((before_url, after_url)) = get_test_urls() else {
        eprintln!("Skipping test: TEST_BEFORE_URL and TEST_AFTER_URL not set");
        return;
    };

    let before_client = postgres::connect(&before_url, false).await.unwrap();
    let after_client = postgres::connect(&after_url, false).await.unwrap();
    reset_schema(&before_client, "").await.unwrap();
    reset_schema(
        &after_client,
        &format!(
            "INSERT INTO {s}.orders VALUES (2, 19.90, true, NULL, '2024-01-02 03:04:05');
             INSERT INTO {s}.order_tags VALUES (2, 'it''s new');
             INSERT INTO {s}.\"Audit Log\" VALUES (1, '\\xcafe');",
            s = SCHEMA
        ),
    )
    .await
    .unwrap();

    let before = PostgresSnapshot::connect(&before_url, SCHEMA, false)
        .await
        .unwrap();
    let after = PostgresSnapshot::connect(&after_url, SCHEMA, false)
        .await
        .unwrap();
    let config = DiffConfig {
        schema: SCHEMA.to_string(),
        ..DiffConfig::default()
    };
    let mut sink = CollectingSink::default();
    let summary = DiffPipeline::new(&before, &after, &config)
        .run(&mut sink)
        .await
        .unwrap();

    assert_eq!(
        sink.statements,
        vec![
            "INSERT INTO order_tags (order_id,tag) VALUES (2,'it''s new');",
            "INSERT INTO orders (id,paid,placed_at,total) VALUES (2,TRUE,'2024-01-02 03:04:05',19.90);",
        ]
    );
    let skipped: Vec<&str> = summary.skipped().map(|o| o.table()).collect();
    assert_eq!(skipped, vec!["Audit Log"]);
    assert!(summary.is_success());

    drop_schema(&before_client).await.unwrap();
    drop_schema(&after_client).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_postgres_output_replays_cleanly() {
    let Some((before_url, after_url)) = get_test_urls() else {
        eprintln!("Skipping test: TEST_BEFORE_URL and TEST_AFTER_URL not set");
        return;
    };

    let before_client = postgres::connect(&before_url, false).await.unwrap();
    let after_client = postgres::connect(&after_url, false).await.unwrap();
    reset_schema(&before_client, "").await.unwrap();
    reset_schema(
        &after_client,
        &format!(
            "INSERT INTO {s}.orders VALUES (2, 1.50, NULL, 'x', NULL);
             INSERT INTO {s}.orders VALUES (3, NULL, true, NULL, NULL);",
            s = SCHEMA
        ),
    )
    .await
    .unwrap();

    let config = DiffConfig {
        schema: SCHEMA.to_string(),
        ..DiffConfig::default()
    };

    let statements = {
        let before = PostgresSnapshot::connect(&before_url, SCHEMA, false)
            .await
            .unwrap();
        let after = PostgresSnapshot::connect(&after_url, SCHEMA, false)
            .await
            .unwrap();
        let mut sink = CollectingSink::default();
        DiffPipeline::new(&before, &after, &config)
            .run(&mut sink)
            .await
            .unwrap();
        sink.statements
    };
    assert_eq!(statements.len(), 2);

    before_client
        .batch_execute(&format!("SET search_path TO {}; {}", SCHEMA, statements.join("\n")))
        .await
        .unwrap();

    let before = PostgresSnapshot::connect(&before_url, SCHEMA, false)
        .await
        .unwrap();
    let after = PostgresSnapshot::connect(&after_url, SCHEMA, false)
        .await
        .unwrap();
    let mut sink = CollectingSink::default();
    let summary = DiffPipeline::new(&before, &after, &config)
        .run(&mut sink)
        .await
        .unwrap();
    assert!(sink.statements.is_empty());
    assert_eq!(summary.tables_changed, 0);

    drop_schema(&before_client).await.unwrap();
    drop_schema(&after_client).await.unwrap();
}
