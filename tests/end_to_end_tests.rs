//! End-to-end tests: client proxies against a live server
//!
//! Covers:
//! - Batched result streaming and cascade close
//! - Prepared statements and transactions
//! - Database errors surfacing verbatim
//! - Direct vs directory addressing
//! - Concurrent calls over one shared link

mod common;

use async_trait::async_trait;
use common::{start_server, CATALOG, SLOW_QUERY, SLOW_QUERY_COUNT, USER_ROWS};
use dbagent_client::protocol::SqlType;
use dbagent_client::{
    AgentDriver, AgentError, ConnectProperties, ConnectionBuilder, DirectoryLookup, ErrorKind,
    Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[tokio::test]
async fn test_query_streams_in_batches_of_100() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url()).connect().await.unwrap();
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query("SELECT * FROM t_user ORDER BY id")
        .await
        .unwrap();

    let meta = rs.metadata().await.unwrap();
    let names: Vec<_> = meta.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "gender", "email", "sys_time"]);
    assert_eq!(meta[1].sql_type, SqlType::Varchar);
    assert_eq!(meta[1].precision, 64);
    assert_eq!(meta[4].sql_type, SqlType::Timestamp);

    let mut sizes = Vec::new();
    let mut flags = Vec::new();
    let mut ids = Vec::new();
    loop {
        let batch = rs.fetch_batch(100).await.unwrap();
        sizes.push(batch.rows.len());
        flags.push(batch.exhausted);
        ids.extend(batch.rows.iter().map(|row| row[0].as_i64().unwrap()));
        if batch.exhausted {
            break;
        }
    }
    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(flags, vec![false, false, true]);
    assert_eq!(ids, (1..=USER_ROWS).collect::<Vec<_>>());

    rs.close().await.unwrap();
    stmt.close().await.unwrap();
    assert_eq!(server.live_objects(), 1);
    conn.close().await.unwrap();
    assert_eq!(server.live_objects(), 0);
}

#[tokio::test]
async fn test_row_iteration_and_value_types() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url())
        .fetch_size(64)
        .connect()
        .await
        .unwrap();
    let stmt = conn.create_statement().await.unwrap();
    let mut rs = stmt
        .execute_query("SELECT id, name, email, sys_time FROM t_user ORDER BY id")
        .await
        .unwrap();

    assert_eq!(rs.column_index("EMAIL").await.unwrap(), Some(2));
    assert_eq!(rs.column_index("missing").await.unwrap(), None);

    let rows = rs.collect_rows().await.unwrap();
    assert_eq!(rows.len() as i64, USER_ROWS);
    assert!(rs.is_exhausted());

    let first = &rows[0];
    assert_eq!(first.get(0), Some(&Value::Int(1)));
    assert_eq!(first.get(1), Some(&Value::from("user1")));
    let Some(Value::Timestamp(ts)) = first.get(3) else {
        panic!("sys_time should decode as a timestamp, got {:?}", first.get(3));
    };
    assert_eq!(ts.to_rfc3339(), "2024-01-01T08:30:00+00:00");

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_close_connection_cascades_to_children() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url()).connect().await.unwrap();
    let stmt = conn.create_statement().await.unwrap();
    let ps = conn
        .prepare_statement("SELECT name FROM t_user WHERE id = ?")
        .await
        .unwrap();
    let rs = stmt.execute_query("SELECT * FROM t_user").await.unwrap();
    assert_eq!(server.live_objects(), 4);

    conn.close().await.unwrap();
    assert_eq!(server.live_objects(), 0);

    let err = stmt.execute_query("SELECT 1").await.err().expect("statement is stale");
    assert!(err.is_stale_reference(), "unexpected error: {}", err);
    let err = ps.set_int(1, 5).await.unwrap_err();
    assert!(err.is_stale_reference());
    let err = rs.fetch_batch(10).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::StaleReference));
}

#[tokio::test]
async fn test_prepared_statement_binds_and_counts() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url()).connect().await.unwrap();

    let lookup = conn
        .prepare_statement("SELECT name, gender FROM t_user WHERE id = ?")
        .await
        .unwrap();
    lookup.set_int(1, 42).await.unwrap();
    let rows = lookup.execute_query().await.unwrap().collect_rows().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values(), &[Value::from("user42"), Value::from("F")]);

    let insert = conn
        .prepare_statement("INSERT INTO t_user (id, name, gender, email, sys_time) VALUES (?, ?, ?, ?, ?)")
        .await
        .unwrap();
    insert.set_long(1, 1000).await.unwrap();
    insert.set_string(2, "newcomer").await.unwrap();
    insert.set_value(3, "M").await.unwrap();
    insert.set_null(4).await.unwrap();
    insert
        .set_timestamp(5, chrono::Utc::now())
        .await
        .unwrap();
    assert_eq!(insert.execute_update().await.unwrap(), 1);
    assert_eq!(insert.update_count().await.unwrap(), 1);

    insert.clear_parameters().await.unwrap();
    let err = insert.execute_update().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::OperationFailure));

    let stmt = conn.create_statement().await.unwrap();
    let count = stmt
        .execute_query("SELECT COUNT(*) FROM t_user")
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(count[0].get(0).and_then(Value::as_i64), Some(USER_ROWS + 1));

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_execute_then_get_result_set() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url()).connect().await.unwrap();
    let stmt = conn.create_statement().await.unwrap();

    assert!(stmt.execute("SELECT id FROM t_user WHERE id <= 3").await.unwrap());
    let mut rs = stmt.result_set().await.unwrap().expect("result set");
    assert_eq!(rs.collect_rows().await.unwrap().len(), 3);
    assert!(stmt.result_set().await.unwrap().is_none());

    assert!(!stmt.execute("UPDATE t_user SET gender = 'X' WHERE id <= 3").await.unwrap());
    assert_eq!(stmt.update_count().await.unwrap(), 3);
    assert!(stmt.result_set().await.unwrap().is_none());

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_max_rows_and_fetch_size() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url()).connect().await.unwrap();
    let stmt = conn.create_statement().await.unwrap();

    stmt.set_max_rows(10).await.unwrap();
    assert_eq!(stmt.max_rows().await.unwrap(), 10);
    stmt.set_fetch_size(4).await.unwrap();
    assert_eq!(stmt.fetch_size(), 4);

    let mut rs = stmt.execute_query("SELECT id FROM t_user").await.unwrap();
    assert_eq!(rs.collect_rows().await.unwrap().len(), 10);

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_transactions_commit_and_rollback() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url()).connect().await.unwrap();
    let stmt = conn.create_statement().await.unwrap();
    assert!(conn.auto_commit().await.unwrap());

    conn.set_auto_commit(false).await.unwrap();
    assert!(!conn.auto_commit().await.unwrap());
    stmt.execute_update("DELETE FROM t_user").await.unwrap();
    conn.rollback().await.unwrap();

    stmt.execute_update("UPDATE counter SET n = 7").await.unwrap();
    conn.commit().await.unwrap();
    conn.set_auto_commit(true).await.unwrap();

    let other = ConnectionBuilder::new(&server.url()).connect().await.unwrap();
    let check = other.create_statement().await.unwrap();
    let users = check
        .execute_query("SELECT COUNT(*) FROM t_user")
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(users[0].get(0).and_then(Value::as_i64), Some(USER_ROWS));
    let counter = check
        .execute_query("SELECT n FROM counter")
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(counter[0].get(0).and_then(Value::as_i64), Some(7));

    conn.close().await.unwrap();
    other.close().await.unwrap();
}

#[tokio::test]
async fn test_database_error_surfaces_verbatim() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url()).connect().await.unwrap();
    let stmt = conn.create_statement().await.unwrap();

    let err = stmt
        .execute_query("SELECT * FROM t_missing")
        .await
        .err()
        .expect("query on a missing table fails");
    match err {
        AgentError::OperationFailure { message, code } => {
            assert!(message.contains("no such table: t_missing"), "{}", message);
            assert_eq!(code, Some(1));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(conn.is_valid().await.unwrap());
    assert_eq!(conn.remote_catalog().await.unwrap(), CATALOG);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_failures() {
    let server = start_server().await;
    let url = format!("jdbc:agent:{}/no_such_catalog", server.addr);
    let err = ConnectionBuilder::new(&url).connect().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::BootstrapFailure));

    let err = ConnectionBuilder::new("jdbc:agent:127.0.0.1:1/mytest")
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ConnectionError(_)));
    assert_eq!(server.live_objects(), 0);
}

#[tokio::test]
async fn test_credentials_are_checked() {
    let server = common::start_server_with(|config| {
        if let Some(catalog) = config.catalogs.get_mut(CATALOG) {
            catalog.user = Some("root".into());
            catalog.password = Some("secret".into());
        }
    })
    .await;

    let denied = ConnectionBuilder::new(&server.url())
        .auth("root", "wrong")
        .connect()
        .await
        .unwrap_err();
    assert_eq!(denied.kind(), Some(ErrorKind::BootstrapFailure));

    let conn = ConnectionBuilder::new(&server.url())
        .auth("root", "secret")
        .connect()
        .await
        .unwrap();
    assert!(conn.is_valid().await.unwrap());
    conn.close().await.unwrap();
}

/// Directory that records how often it was asked
struct CountingDirectory {
    address: String,
    lookups: AtomicUsize,
}

#[async_trait]
impl DirectoryLookup for CountingDirectory {
    async fn resolve(&self, catalog: &str, servers: &[String]) -> Result<String, AgentError> {
        assert_eq!(catalog, CATALOG);
        assert_eq!(servers, ["zkServers".to_string()]);
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.address.clone())
    }
}

#[tokio::test]
async fn test_directory_url_resolves_once_per_connect() {
    let server = start_server().await;
    let directory = Arc::new(CountingDirectory {
        address: server.addr.to_string(),
        lookups: AtomicUsize::new(0),
    });
    let driver = Arc::new(AgentDriver::with_directory(directory.clone()));

    let conn = ConnectionBuilder::new("jdbc:agent:zkServers/mytest")
        .driver(driver.clone())
        .connect()
        .await
        .unwrap();
    assert_eq!(directory.lookups.load(Ordering::SeqCst), 1);

    let stmt = conn.create_statement().await.unwrap();
    stmt.execute_query("SELECT 1").await.unwrap();
    assert_eq!(directory.lookups.load(Ordering::SeqCst), 1);

    let direct = ConnectionBuilder::new(&server.url())
        .driver(driver)
        .connect()
        .await
        .unwrap();
    assert_eq!(directory.lookups.load(Ordering::SeqCst), 1);

    conn.close().await.unwrap();
    direct.close().await.unwrap();
}

#[tokio::test]
async fn test_directory_url_without_lookup_fails() {
    let err = ConnectionBuilder::new("jdbc:agent:zk1,zk2/mytest")
        .connect()
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::DirectoryLookup(_)));
}

#[tokio::test]
async fn test_concurrent_sessions_share_one_link() {
    let server = start_server().await;
    let driver = Arc::new(AgentDriver::new());
    let url = server.url();

    let mut tasks = JoinSet::new();
    for i in 0..8i64 {
        let driver = driver.clone();
        let url = url.clone();
        tasks.spawn(async move {
            let conn = driver
                .connect(&url, &ConnectProperties::default())
                .await
                .unwrap();
            let ps = conn
                .prepare_statement("SELECT id FROM t_user WHERE id > ? ORDER BY id")
                .await
                .unwrap();
            ps.set_long(1, i * 10).await.unwrap();
            let rows = ps.execute_query().await.unwrap().collect_rows().await.unwrap();
            conn.close().await.unwrap();
            (i, rows.len() as i64)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (i, n) = joined.unwrap();
        assert_eq!(n, USER_ROWS - i * 10);
    }
    assert_eq!(server.live_objects(), 0);
}

#[tokio::test]
async fn test_concurrent_calls_on_one_statement_are_serialized() {
    let server = start_server().await;
    let conn = ConnectionBuilder::new(&server.url()).connect().await.unwrap();
    let stmt = Arc::new(conn.create_statement().await.unwrap());

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let stmt = stmt.clone();
        tasks.spawn(async move { stmt.execute_update("UPDATE counter SET n = n + 1").await });
    }
    while let Some(joined) = tasks.join_next().await {
        assert_eq!(joined.unwrap().unwrap(), 1);
    }

    let rows = stmt
        .execute_query("SELECT n FROM counter")
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(rows[0].get(0).and_then(Value::as_i64), Some(20));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_slow_call_does_not_delay_other_session_on_same_link() {
    let server = start_server().await;
    let driver = Arc::new(AgentDriver::new());
    let slow = ConnectionBuilder::new(&server.url())
        .driver(driver.clone())
        .connect()
        .await
        .unwrap();
    let fast = ConnectionBuilder::new(&server.url())
        .driver(driver.clone())
        .connect()
        .await
        .unwrap();
    assert_eq!(driver.open_links(), 1);

    let stmt = slow.create_statement().await.unwrap();
    let mut rs = stmt.execute_query(SLOW_QUERY).await.unwrap();
    let slow_call = tokio::spawn(async move {
        let row = rs.next().await.unwrap().unwrap();
        row.get(0).and_then(Value::as_i64)
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(fast.is_valid().await.unwrap());
    let rows = fast
        .create_statement()
        .await
        .unwrap()
        .execute_query("SELECT count(*) FROM t_user")
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(rows[0].get(0).and_then(Value::as_i64), Some(USER_ROWS));
    assert!(!slow_call.is_finished());

    let counted = tokio::time::timeout(Duration::from_secs(60), slow_call)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(counted, Some(SLOW_QUERY_COUNT));
    slow.close().await.unwrap();
    fast.close().await.unwrap();
}
