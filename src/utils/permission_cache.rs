use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::OnceCell;
use sqlx::MySqlPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub type Permissions = Arc<HashSet<String>>;

/// role id => permission slugs granted to that role
static PERMISSION_CACHE: OnceCell<Cache<u8, Permissions>> = OnceCell::new();

/// Sizes the cache from config. Only the first call has an effect.
pub fn init(capacity: u64, ttl: Duration) {
    let _ = PERMISSION_CACHE.set(build(capacity, ttl));
}

fn build(capacity: u64, ttl: Duration) -> Cache<u8, Permissions> {
    Cache::builder()
        .max_capacity(capacity)
        .time_to_live(ttl)
        .build()
}

fn cache() -> &'static Cache<u8, Permissions> {
    PERMISSION_CACHE.get_or_init(|| build(64, Duration::from_secs(300)))
}

/// Cached permissions of a role, if present.
pub async fn cached(role_id: u8) -> Option<Permissions> {
    cache().get(&role_id).await
}

pub async fn store(role_id: u8, permissions: HashSet<String>) {
    cache().insert(role_id, Arc::new(permissions)).await;
}

async fn load_role(pool: &MySqlPool, role_id: u8) -> Result<HashSet<String>, sqlx::Error> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT permission FROM role_permissions WHERE role_id = ?",
    )
    .bind(role_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Permissions of a role, from cache or, on a miss, from the database.
pub async fn permissions_for(pool: &MySqlPool, role_id: u8) -> Result<Permissions, sqlx::Error> {
    if let Some(permissions) = cached(role_id).await {
        return Ok(permissions);
    }

    let permissions = Arc::new(load_role(pool, role_id).await?);
    cache().insert(role_id, permissions.clone()).await;
    tracing::debug!(role_id, count = permissions.len(), "Loaded role permissions");

    Ok(permissions)
}

pub async fn has_permission(pool: &MySqlPool, role_id: u8, slug: &str) -> Result<bool, sqlx::Error> {
    Ok(permissions_for(pool, role_id).await?.contains(slug))
}

/// Preloads every role's permissions by streaming `role_permissions`.
pub async fn warmup_permission_cache(pool: &MySqlPool) -> Result<()> {
    let mut stream =
        sqlx::query_as::<_, (u8, String)>("SELECT role_id, permission FROM role_permissions")
            .fetch(pool);

    let mut by_role: HashMap<u8, HashSet<String>> = HashMap::new();
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (role_id, permission) = row?;
        by_role.entry(role_id).or_default().insert(permission);
        total += 1;
    }

    let roles = by_role.len();
    for (role_id, permissions) in by_role {
        store(role_id, permissions).await;
    }

    log::info!(
        "Permission cache warmup complete: {} grants across {} roles",
        total,
        roles
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(slugs: &[&str]) -> HashSet<String> {
        slugs.iter().map(|s| s.to_string()).collect()
    }

    // role ids 200+ are not real roles, so tests do not collide with each other
    #[actix_web::test]
    async fn stores_and_reads_back() {
        store(201, set(&["leave:approve_any"])).await;
        let permissions = cached(201).await.unwrap();
        assert!(permissions.contains("leave:approve_any"));
        assert!(!permissions.contains("overtime:approve_any"));
    }

    #[actix_web::test]
    async fn unknown_role_is_a_miss() {
        assert!(cached(250).await.is_none());
    }
}
