//! Postgres fixtures for chef integration tests.
//!
//! One server is shared by every test in a binary; each test gets a fresh
//! database with the embedded migrations applied. Set `CHEF_TEST_PG_URL`
//! (server root, no database name) to reuse an already running server,
//! otherwise a container is started on first use.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use chef_db::pool;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

struct Server {
    root_url: String,
    _container: Option<ContainerAsync<Postgres>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(root_url) = std::env::var("CHEF_TEST_PG_URL") {
        return Server {
            root_url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("17")
        .start()
        .await
        .expect("postgres container should start");
    let host = container.get_host().await.expect("container host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("container port");

    Server {
        root_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

async fn root_url() -> &'static str {
    &SERVER.get_or_init(start_server).await.root_url
}

async fn admin_pool() -> PgPool {
    let url = format!("{}/postgres", root_url().await);
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(&url)
        .await
        .expect("admin connection should open")
}

/// A migrated, uniquely named database. Call [`TestDb::cleanup`] at the end
/// of the test.
pub struct TestDb {
    pub pool: PgPool,
    pub name: String,
}

impl TestDb {
    pub async fn create() -> Self {
        let name = format!("chef_test_{}", Uuid::new_v4().simple());
        let admin = admin_pool().await;
        admin
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .unwrap_or_else(|e| panic!("CREATE DATABASE {name} failed: {e}"));
        admin.close().await;

        let url = format!("{}/{name}", root_url().await);
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(&url)
            .await
            .unwrap_or_else(|e| panic!("connect to {name} failed: {e}"));

        pool::run_migrations(&pool)
            .await
            .expect("migrations should apply to a fresh database");

        Self { pool, name }
    }

    /// Close the pool and drop the database, kicking any stray sessions.
    pub async fn cleanup(self) {
        self.pool.close().await;

        let admin = admin_pool().await;
        let kick = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = '{}' AND pid <> pg_backend_pid()",
            self.name
        );
        let _ = admin.execute(kick.as_str()).await;
        let _ = admin
            .execute(format!("DROP DATABASE IF EXISTS {}", self.name).as_str())
            .await;
        admin.close().await;
    }
}
