use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;

/// Connection pool shared by all workers. Check-in bursts at shift start are
/// short, so a request waits at most a few seconds for a connection.
pub async fn init_db(database_url: &str) -> MySqlPool {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!(max_connections = 10, "Database pool ready");
    pool
}
