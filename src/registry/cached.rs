//! C5: memoizes reads from an underlying [`Registry`] and invalidates
//! precisely on writes. Built on [`crate::safe_cache::SafeCache`] (C2) over
//! [`crate::lru::LruCache`] (C1), each configured unbounded (capacity 0) —
//! this tier trades memory for avoiding repeat trips to the relational
//! store, not for bounding memory use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::lru::{Cacheable, LruCache};
use crate::safe_cache::SafeCache;
use super::{canonical_key, Certificate, Registry};

#[derive(Clone)]
struct PkEntry(i64);
impl Cacheable for PkEntry {
    fn size(&self) -> u64 {
        1
    }
}

#[derive(Clone)]
struct ContentEntry(String);
impl Cacheable for ContentEntry {
    fn size(&self) -> u64 {
        1
    }
}

#[derive(Clone)]
struct CertEntry(Certificate);
impl Cacheable for CertEntry {
    fn size(&self) -> u64 {
        1
    }
}

pub struct CachedRegistry<R: Registry> {
    inner: Arc<R>,
    tmpl_pk_cache: SafeCache<String, PkEntry>,
    tmpl_content_cache: SafeCache<i64, ContentEntry>,
    certificate_cache: SafeCache<String, CertEntry>,
    // Guarded explicitly rather than left as a bare field — see the Open
    // Question decision in DESIGN.md.
    list_templates_cache: Mutex<Option<Vec<String>>>,
}

impl<R: Registry> CachedRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Arc::new(inner),
            tmpl_pk_cache: SafeCache::new(Box::new(LruCache::new(0, None).unwrap())),
            tmpl_content_cache: SafeCache::new(Box::new(LruCache::new(0, None).unwrap())),
            certificate_cache: SafeCache::new(Box::new(LruCache::new(0, None).unwrap())),
            list_templates_cache: Mutex::new(None),
        }
    }

    /// Finds and removes the `tmpl_pk_cache` entry whose value equals `pk`,
    /// via `peek` so the scan itself never perturbs recency.
    fn invalidate_name_for_pk(&self, pk: i64) {
        for name in self.tmpl_pk_cache.keys() {
            if let Some(entry) = self.tmpl_pk_cache.peek(&name) {
                if entry.0 == pk {
                    self.tmpl_pk_cache.remove(&name);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl<R: Registry> Registry for CachedRegistry<R> {
    async fn add_template(&self, name: &str, content: &str) -> Result<()> {
        self.inner.add_template(name, content).await?;
        *self.list_templates_cache.lock().unwrap() = None;
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<String>> {
        if let Some(names) = self.list_templates_cache.lock().unwrap().clone() {
            return Ok(names);
        }
        let names = self.inner.list_templates().await?;
        *self.list_templates_cache.lock().unwrap() = Some(names.clone());
        Ok(names)
    }

    async fn delete_template(&self, pk: i64) -> Result<()> {
        self.inner.delete_template(pk).await?;
        self.invalidate_name_for_pk(pk);
        self.tmpl_content_cache.remove(&pk);
        *self.list_templates_cache.lock().unwrap() = None;
        Ok(())
    }

    async fn get_template_pk(&self, name: &str) -> Result<i64> {
        if let Some(entry) = self.tmpl_pk_cache.get(&name.to_string()) {
            return Ok(entry.0);
        }
        let pk = self.inner.get_template_pk(name).await?;
        self.tmpl_pk_cache.add(name.to_string(), PkEntry(pk));
        Ok(pk)
    }

    async fn get_template_content(&self, pk: i64) -> Result<String> {
        if let Some(entry) = self.tmpl_content_cache.get(&pk) {
            return Ok(entry.0);
        }
        let content = self.inner.get_template_content(pk).await?;
        self.tmpl_content_cache.add(pk, ContentEntry(content.clone()));
        Ok(content)
    }

    async fn certificates_by_template_pk(&self, pk: i64) -> Result<Vec<String>> {
        self.inner.certificates_by_template_pk(pk).await
    }

    async fn update_template(&self, pk: i64, changes: &HashMap<String, String>) -> Result<()> {
        self.inner.update_template(pk, changes).await?;

        for key in changes.keys() {
            match canonical_key(key, &["name", "content"])?.as_str() {
                "name" => {
                    self.invalidate_name_for_pk(pk);
                    *self.list_templates_cache.lock().unwrap() = None;
                }
                "content" => {
                    self.tmpl_content_cache.remove(&pk);
                    match self.inner.certificates_by_template_pk(pk).await {
                        Ok(ids) => {
                            for id in ids {
                                self.certificate_cache.remove(&id);
                            }
                        }
                        Err(e) => {
                            self.certificate_cache.purge();
                            return Err(e);
                        }
                    }
                }
                _ => unreachable!("canonical_key already validated"),
            }
        }
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
        self.inner
            .add_certificate(template_name, student, issue_date, course, mentors)
            .await
    }

    async fn delete_certificate(&self, id: &str) -> Result<()> {
        self.inner.delete_certificate(id).await?;
        self.certificate_cache.remove(&id.to_string());
        Ok(())
    }

    async fn get_certificate(&self, id: &str) -> Result<Certificate> {
        if let Some(entry) = self.certificate_cache.get(&id.to_string()) {
            return Ok(entry.0);
        }
        let cert = self.inner.get_certificate(id).await?;
        self.certificate_cache.add(id.to_string(), CertEntry(cert.clone()));
        Ok(cert)
    }

    async fn update_certificate(&self, id: &str, changes: &HashMap<String, String>) -> Result<()> {
        self.inner.update_certificate(id, changes).await?;
        self.certificate_cache.remove(&id.to_string());
        Ok(())
    }
}
