//! C3: the abstract registry contract for templates and certificates,
//! plus the two implementations that sit behind it — [`direct::DirectRegistry`]
//! (C4, against Postgres) and [`cached::CachedRegistry`] (C5, memoizing
//! reads and invalidating precisely on writes).

pub mod cached;
pub mod direct;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A certificate record as stored by the registry. Never carries rendered
/// PDF bytes — those live in [`crate::storage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    pub id: String,
    pub template_pk: i64,
    pub timestamp: DateTime<Utc>,
    pub student: String,
    pub issue_date: String,
    pub course: String,
    pub mentors: String,
}

/// The eleven operations of §6.1. Implementors generate the certificate id
/// and assign/advance the timestamp; callers never set either directly.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn add_template(&self, name: &str, content: &str) -> Result<()>;
    async fn list_templates(&self) -> Result<Vec<String>>;
    async fn delete_template(&self, pk: i64) -> Result<()>;
    async fn get_template_pk(&self, name: &str) -> Result<i64>;
    async fn get_template_content(&self, pk: i64) -> Result<String>;
    async fn certificates_by_template_pk(&self, pk: i64) -> Result<Vec<String>>;
    async fn update_template(&self, pk: i64, changes: &HashMap<String, String>) -> Result<()>;
    async fn add_certificate(
        &self,
        template_name: &str,
        student: &str,
        issue_date: &str,
        course: &str,
        mentors: &str,
    ) -> Result<Certificate>;
    async fn delete_certificate(&self, id: &str) -> Result<()>;
    async fn get_certificate(&self, id: &str) -> Result<Certificate>;
    async fn update_certificate(&self, id: &str, changes: &HashMap<String, String>) -> Result<()>;
}

/// Normalizes a change-map key to its canonical lowercase form, accepting
/// either `name`/`Name` or `content`/`Content` per §6.1, and rejecting
/// anything else with [`crate::error::Error::IllegalKey`].
pub(crate) fn canonical_key(key: &str, accepted: &[&str]) -> Result<String> {
    let lower = key.to_ascii_lowercase();
    if accepted.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(crate::error::Error::IllegalKey(key.to_string()))
    }
}
