pub mod permission_cache;
