use std::env;
use std::str::FromStr;

use dotenvy::dotenv;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_checkin_per_min: u32,

    /// Let disabled check-in points take part in nearest-point selection.
    pub checkin_include_disabled: bool,

    // Permission cache
    pub permission_cache_ttl_secs: u64,
    pub permission_cache_capacity: u64,

    pub api_prefix: String,
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} has an invalid value: {raw}")),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),

            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", 1000),
            rate_checkin_per_min: var_or("RATE_CHECKIN_PER_MIN", 10),

            checkin_include_disabled: var_or("CHECKIN_INCLUDE_DISABLED", false),

            permission_cache_ttl_secs: var_or("PERMISSION_CACHE_TTL_SECS", 300), // 5 min
            permission_cache_capacity: var_or("PERMISSION_CACHE_CAPACITY", 64),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
        }
    }
}
