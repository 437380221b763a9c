//! C9: layered configuration — built-in defaults overridden by environment
//! variables, read once at startup.

use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub render_service_url: String,
    pub storage_backend: String,
    pub storage_base_path: String,
    pub public_host: String,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/certify".to_string()),
            render_service_url: env::var("RENDER_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            storage_backend: env::var("STORAGE_BACKEND").unwrap_or_else(|_| "file".to_string()),
            storage_base_path: env::var("STORAGE_BASE_PATH")
                .unwrap_or_else(|_| "./certificates".to_string()),
            public_host: env::var("PUBLIC_HOST")
                .unwrap_or_else(|_| "http://localhost:8080/".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        }
    }
}
