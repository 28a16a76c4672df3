//! Common test utilities for end-to-end tests
//!
//! Starts a dbagent server on an ephemeral port with one SQLite catalog,
//! `mytest`, whose `t_user` table is seeded with [`USER_ROWS`] rows.

#![allow(dead_code)]

use dbagent::{AgentContext, AgentServer, CatalogConfig, Config};
use rusqlite::params;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::oneshot;

pub const CATALOG: &str = "mytest";
pub const USER_ROWS: i64 = 250;

/// Rows counted by [`SLOW_QUERY`]
pub const SLOW_QUERY_COUNT: i64 = 3_000_000;

/// Read-only query whose first fetch keeps the database busy for a while
pub const SLOW_QUERY: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 3000000) SELECT count(*) FROM c";

pub struct TestServer {
    pub addr: SocketAddr,
    pub context: Arc<AgentContext>,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: TempDir,
}

impl TestServer {
    /// Direct-address connection string for the seeded catalog
    pub fn url(&self) -> String {
        format!("jdbc:agent:{}/{}", self.addr, CATALOG)
    }

    pub fn live_objects(&self) -> usize {
        self.context.registry.len()
    }

    /// Poll until `cond` holds, for at most two seconds
    pub async fn wait_until(&self, cond: impl Fn(&AgentContext) -> bool) -> bool {
        for _ in 0..200 {
            if cond(&self.context) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond(&self.context)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(configure: impl FnOnce(&mut Config)) -> TestServer {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("mytest.db");
    seed_users(&db_path);

    let mut config = Config::default();
    config.server.listen = "127.0.0.1:0".to_string();
    config.catalogs.insert(
        CATALOG.to_string(),
        CatalogConfig::sqlite(db_path.to_string_lossy()),
    );
    configure(&mut config);

    let context = Arc::new(AgentContext::from_config(&config).expect("Failed to build context"));
    let server = AgentServer::bind(context.clone(), &config.server.listen)
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().unwrap();

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    TestServer {
        addr,
        context,
        shutdown: Some(tx),
        _dir: dir,
    }
}

fn seed_users(path: &Path) {
    let mut conn = rusqlite::Connection::open(path).expect("Failed to open seed database");
    conn.execute_batch(
        "CREATE TABLE t_user (
            id INTEGER PRIMARY KEY,
            name VARCHAR(64) NOT NULL,
            gender CHAR(1),
            email TEXT,
            sys_time TIMESTAMP
        );
        CREATE TABLE counter (n INTEGER NOT NULL);
        INSERT INTO counter (n) VALUES (0);",
    )
    .unwrap();

    let tx = conn.transaction().unwrap();
    for id in 1..=USER_ROWS {
        tx.execute(
            "INSERT INTO t_user (id, name, gender, email, sys_time) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                format!("user{}", id),
                if id % 2 == 0 { "F" } else { "M" },
                format!("user{}@example.com", id),
                "2024-01-01 08:30:00",
            ],
        )
        .unwrap();
    }
    tx.commit().unwrap();
}
