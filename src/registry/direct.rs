//! C4: the `Registry` implementation backed by a relational store. The SQL
//! dialect and schema migrations are an external collaborator (§1); this
//! module only issues the handful of statements the registry contract
//! requires against the assumed schema:
//!
//! ```sql
//! CREATE TABLE template_content (id SERIAL PRIMARY KEY, content TEXT NOT NULL);
//! CREATE TABLE template (id SERIAL PRIMARY KEY, name TEXT UNIQUE NOT NULL, content INTEGER NOT NULL REFERENCES template_content(id));
//! CREATE TABLE certificate (
//!     id TEXT PRIMARY KEY,
//!     template INTEGER NOT NULL REFERENCES template(id),
//!     timestamp TIMESTAMPTZ NOT NULL,
//!     student TEXT NOT NULL,
//!     issue_date TEXT NOT NULL,
//!     course TEXT NOT NULL,
//!     mentors TEXT NOT NULL
//! );
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use sqlx::{PgPool, Row};

use crate::error::{Error, Result};
use super::{canonical_key, Certificate, Registry};

pub struct DirectRegistry {
    pool: PgPool,
}

impl DirectRegistry {
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let pool = PgPool::connect(connection_string)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn new_certificate_id() -> String {
        let bytes: [u8; 4] = rand::thread_rng().gen();
        hex::encode(bytes)
    }
}

#[async_trait]
impl Registry for DirectRegistry {
    async fn add_template(&self, name: &str, content: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| Error::RegistryBackend(e.into()))?;

        let content_id: i32 = sqlx::query_scalar(
            "INSERT INTO template_content (content) VALUES ($1) RETURNING id",
        )
        .bind(content)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::RegistryBackend(e.into()))?;

        sqlx::query("INSERT INTO template (name, content) VALUES ($1, $2)")
            .bind(name)
            .bind(content_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?;

        tx.commit().await.map_err(|e| Error::RegistryBackend(e.into()))?;
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM template")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?;
        Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
    }

    async fn delete_template(&self, pk: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| Error::RegistryBackend(e.into()))?;

        let content_id: i32 = sqlx::query_scalar("SELECT content FROM template WHERE id = $1")
            .bind(pk as i32)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?
            .ok_or_else(|| Error::NotFound(format!("template pk {pk}")))?;

        let deleted = sqlx::query("DELETE FROM template WHERE id = $1")
            .bind(pk as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?;
        if deleted.rows_affected() != 1 {
            return Err(Error::NotFound(format!("template pk {pk}")));
        }

        let deleted = sqlx::query("DELETE FROM template_content WHERE id = $1")
            .bind(content_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?;
        if deleted.rows_affected() != 1 {
            return Err(Error::NotFound(format!("template_content id {content_id}")));
        }

        tx.commit().await.map_err(|e| Error::RegistryBackend(e.into()))?;
        Ok(())
    }

    async fn get_template_pk(&self, name: &str) -> Result<i64> {
        let pk: i32 = sqlx::query_scalar("SELECT id FROM template WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?
            .ok_or_else(|| Error::NotFound(format!("template {name}")))?;
        Ok(pk as i64)
    }

    async fn get_template_content(&self, pk: i64) -> Result<String> {
        let content_id: i32 = sqlx::query_scalar("SELECT content FROM template WHERE id = $1")
            .bind(pk as i32)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?
            .ok_or_else(|| Error::NotFound(format!("template pk {pk}")))?;

        let content: String =
            sqlx::query_scalar("SELECT content FROM template_content WHERE id = $1")
                .bind(content_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::RegistryBackend(e.into()))?
                .ok_or_else(|| Error::NotFound(format!("template_content {content_id}")))?;
        Ok(content)
    }

    async fn certificates_by_template_pk(&self, pk: i64) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM certificate WHERE template = $1")
            .bind(pk as i32)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?;
        Ok(rows.iter().map(|r| r.get::<String, _>("id")).collect())
    }

    async fn update_template(&self, pk: i64, changes: &HashMap<String, String>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| Error::RegistryBackend(e.into()))?;

        for (k, v) in changes {
            match canonical_key(k, &["name", "content"])?.as_str() {
                "name" => {
                    let updated = sqlx::query("UPDATE template SET name = $1 WHERE id = $2")
                        .bind(v)
                        .bind(pk as i32)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| Error::RegistryBackend(e.into()))?;
                    if updated.rows_affected() != 1 {
                        return Err(Error::NotFound(format!("template pk {pk}")));
                    }
                }
                "content" => {
                    let updated = sqlx::query(
                        "UPDATE template_content SET content = $1 \
                         WHERE id = (SELECT content FROM template WHERE id = $2)",
                    )
                    .bind(v)
                    .bind(pk as i32)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| Error::RegistryBackend(e.into()))?;
                    if updated.rows_affected() != 1 {
                        return Err(Error::NotFound(format!("template pk {pk}")));
                    }
                }
                _ => unreachable!("canonical_key already validated"),
            }
        }

        tx.commit().await.map_err(|e| Error::RegistryBackend(e.into()))?;
        Ok(())
    }

    async fn add_certificate(
        &self,
        template_name: &str,
        student: &str,
        issue_date: &str,
        course: &str,
        mentors: &str,
    ) -> Result<Certificate> {
        let template_pk = self.get_template_pk(template_name).await?;
        let id = Self::new_certificate_id();
        let timestamp = Utc::now();

        sqlx::query(
            "INSERT INTO certificate (id, template, timestamp, student, issue_date, course, mentors) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&id)
        .bind(template_pk as i32)
        .bind(timestamp)
        .bind(student)
        .bind(issue_date)
        .bind(course)
        .bind(mentors)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::RegistryBackend(e.into()))?;

        Ok(Certificate {
            id,
            template_pk,
            timestamp,
            student: student.to_string(),
            issue_date: issue_date.to_string(),
            course: course.to_string(),
            mentors: mentors.to_string(),
        })
    }

    async fn delete_certificate(&self, id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM certificate WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("certificate {id}")));
        }
        Ok(())
    }

    async fn get_certificate(&self, id: &str) -> Result<Certificate> {
        let row = sqlx::query(
            "SELECT template, timestamp, student, issue_date, course, mentors \
             FROM certificate WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::RegistryBackend(e.into()))?
        .ok_or_else(|| Error::NotFound(format!("certificate {id}")))?;

        Ok(Certificate {
            id: id.to_string(),
            template_pk: row.get::<i32, _>("template") as i64,
            timestamp: row.get("timestamp"),
            student: row.get("student"),
            issue_date: row.get("issue_date"),
            course: row.get("course"),
            mentors: row.get("mentors"),
        })
    }

    async fn update_certificate(&self, id: &str, changes: &HashMap<String, String>) -> Result<()> {
        const FIELDS: &[&str] = &["template", "student", "issue_date", "course", "mentors"];
        let mut text_fields: Vec<(String, String)> = Vec::new();
        let mut new_template_pk = None;
        for (k, v) in changes {
            let key = canonical_key(k, FIELDS)?;
            match key.as_str() {
                "template" => new_template_pk = Some(self.get_template_pk(v).await?),
                _ => text_fields.push((key.clone(), v.clone())),
            }
        }

        let mut builder = sqlx::QueryBuilder::new("UPDATE certificate SET ");
        let mut separated = builder.separated(", ");
        if let Some(pk) = new_template_pk {
            separated.push("template = ");
            separated.push_bind_unseparated(pk as i32);
        }
        for (field, value) in &text_fields {
            separated.push(format!("{field} = "));
            separated.push_bind_unseparated(value.clone());
        }
        separated.push("timestamp = now()");
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());

        let updated = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| Error::RegistryBackend(e.into()))?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("certificate {id}")));
        }
        Ok(())
    }
}
