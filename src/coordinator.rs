//! C8: the request coordinator that composes the registry (C3/C4/C5),
//! storage (C6), and templater (C7) into the render-or-serve decision
//! described in §4.6 — the only place in the crate all three collaborators
//! meet.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::{Certificate, Registry};
use crate::storage::ArtifactStorage;
use crate::templater::Templater;

pub struct Coordinator<R: Registry> {
    registry: R,
    storage: Arc<ArtifactStorage>,
    templater: Arc<dyn Templater>,
    public_host: String,
}

impl<R: Registry> Coordinator<R> {
    pub fn new(
        registry: R,
        storage: Arc<ArtifactStorage>,
        templater: Arc<dyn Templater>,
        public_host: String,
    ) -> Self {
        Self {
            registry,
            storage,
            templater,
            public_host,
        }
    }

    /// `<host>certificate/<id>` — the host is expected to already carry a
    /// trailing slash, matching the original's plain string concatenation.
    fn compose_link(&self, id: &str) -> String {
        format!("{}certificate/{id}", self.public_host)
    }

    pub async fn add_template(&self, name: &str, content: &str) -> Result<()> {
        self.registry.add_template(name, content).await
    }

    pub async fn list_templates(&self) -> Result<Vec<String>> {
        self.registry.list_templates().await
    }

    pub async fn get_template(&self, name: &str) -> Result<String> {
        let pk = self.registry.get_template_pk(name).await?;
        self.registry.get_template_content(pk).await
    }

    pub async fn delete_template(&self, name: &str) -> Result<()> {
        let pk = self.registry.get_template_pk(name).await?;
        self.registry.delete_template(pk).await
    }

    pub async fn update_template(
        &self,
        name: &str,
        new_name: Option<String>,
        new_content: Option<String>,
    ) -> Result<()> {
        let pk = self.registry.get_template_pk(name).await?;
        let mut changes = HashMap::new();
        if let Some(content) = new_content {
            changes.insert("content".to_string(), content);
        }
        if let Some(name) = new_name {
            changes.insert("name".to_string(), name);
        }
        if changes.is_empty() {
            return Err(Error::NothingToUpdate);
        }
        self.registry.update_template(pk, &changes).await
    }

    /// s0: look up the certificate. s1: if a fresh artifact is already
    /// cached, serve it directly (s4). s2: otherwise load the template this
    /// certificate was issued against. s3: render a fresh artifact, cache
    /// it for next time, then serve it (s4).
    pub async fn get_certificate(&self, id: &str) -> Result<Vec<u8>> {
        let cert = self.registry.get_certificate(id).await?;

        if self.storage.contains(&cert.id, cert.timestamp) {
            return self.storage.get(&cert.id, cert.timestamp).await;
        }

        let template = self.registry.get_template_content(cert.template_pk).await?;
        let link = self.compose_link(&cert.id);
        let pdf = self.templater.generate_certificate(&template, &cert, &link).await?;
        self.storage.add(&cert.id, cert.timestamp, pdf.clone()).await?;
        Ok(pdf)
    }

    pub async fn get_certificate_link(&self, id: &str) -> Result<String> {
        let cert = self.registry.get_certificate(id).await?;
        Ok(self.compose_link(&cert.id))
    }

    /// Renders against live template content without touching the
    /// certificate registry or the artifact cache — a dry run for template
    /// authors to preview formatting before publishing.
    pub async fn test_template(
        &self,
        name: &str,
        preview: &Certificate,
    ) -> Result<Vec<u8>> {
        let pk = self.registry.get_template_pk(name).await?;
        let template = self.registry.get_template_content(pk).await?;
        let link = self.compose_link(&preview.id);
        self.templater.generate_certificate(&template, preview, &link).await
    }

    pub async fn add_certificate(
        &self,
        template_name: &str,
        student: &str,
        issue_date: &str,
        course: &str,
        mentors: &str,
    ) -> Result<Certificate> {
        self.registry
            .add_certificate(template_name, student, issue_date, course, mentors)
            .await
    }

    pub async fn delete_certificate(&self, id: &str) -> Result<()> {
        let cert = self.registry.get_certificate(id).await?;
        self.registry.delete_certificate(id).await?;
        self.storage.delete(&cert.id, cert.timestamp);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_certificate(
        &self,
        id: &str,
        new_template: Option<String>,
        new_student: Option<String>,
        new_issue_date: Option<String>,
        new_course: Option<String>,
        new_mentors: Option<String>,
    ) -> Result<()> {
        let mut changes = HashMap::new();
        if let Some(v) = new_template {
            changes.insert("template".to_string(), v);
        }
        if let Some(v) = new_student {
            changes.insert("student".to_string(), v);
        }
        if let Some(v) = new_issue_date {
            changes.insert("issue_date".to_string(), v);
        }
        if let Some(v) = new_course {
            changes.insert("course".to_string(), v);
        }
        if let Some(v) = new_mentors {
            changes.insert("mentors".to_string(), v);
        }
        if changes.is_empty() {
            return Err(Error::NothingToUpdate);
        }
        self.registry.update_certificate(id, &changes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use object_store::memory::InMemory;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubRegistry {
        cert: Certificate,
        template_content: String,
        get_certificate_calls: AtomicUsize,
    }

    #[async_trait]
    impl Registry for StubRegistry {
        async fn add_template(&self, _name: &str, _content: &str) -> Result<()> {
            Ok(())
        }
        async fn list_templates(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn delete_template(&self, _pk: i64) -> Result<()> {
            Ok(())
        }
        async fn get_template_pk(&self, _name: &str) -> Result<i64> {
            Ok(self.cert.template_pk)
        }
        async fn get_template_content(&self, _pk: i64) -> Result<String> {
            Ok(self.template_content.clone())
        }
        async fn certificates_by_template_pk(&self, _pk: i64) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn update_template(&self, _pk: i64, _changes: &HashMap<String, String>) -> Result<()> {
            Ok(())
        }
        async fn add_certificate(
            &self,
            _t: &str,
            _s: &str,
            _i: &str,
            _c: &str,
            _m: &str,
        ) -> Result<Certificate> {
            Ok(self.cert.clone())
        }
        async fn delete_certificate(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn get_certificate(&self, _id: &str) -> Result<Certificate> {
            self.get_certificate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.cert.clone())
        }
        async fn update_certificate(&self, _id: &str, _changes: &HashMap<String, String>) -> Result<()> {
            Ok(())
        }
    }

    struct StubTemplater {
        calls: AtomicUsize,
        last_link: Mutex<Option<String>>,
    }

    #[async_trait]
    impl Templater for StubTemplater {
        async fn generate_certificate(
            &self,
            _template: &str,
            _certificate: &Certificate,
            link: &str,
        ) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_link.lock().unwrap() = Some(link.to_string());
            Ok(b"%PDF-fake".to_vec())
        }
    }

    fn sample_cert() -> Certificate {
        Certificate {
            id: "ab12cd34".to_string(),
            template_pk: 1,
            timestamp: Utc::now(),
            student: "Ada".to_string(),
            issue_date: "2024-01-01".to_string(),
            course: "Rust".to_string(),
            mentors: "Grace".to_string(),
        }
    }

    fn coordinator(cert: Certificate) -> (Coordinator<StubRegistry>, Arc<StubTemplater>) {
        let registry = StubRegistry {
            cert,
            template_content: "<h1>{{cert.student}}</h1>".to_string(),
            get_certificate_calls: AtomicUsize::new(0),
        };
        let storage = Arc::new(ArtifactStorage::with_store(Arc::new(InMemory::new()), "certs"));
        let templater = Arc::new(StubTemplater {
            calls: AtomicUsize::new(0),
            last_link: Mutex::new(None),
        });
        (
            Coordinator::new(registry, storage, templater.clone(), "https://example.com/".to_string()),
            templater,
        )
    }

    #[tokio::test]
    async fn first_request_renders_and_caches_second_serves_from_storage() {
        let (coordinator, templater) = coordinator(sample_cert());

        let first = coordinator.get_certificate("ab12cd34").await.unwrap();
        assert_eq!(first, b"%PDF-fake");
        assert_eq!(templater.calls.load(Ordering::SeqCst), 1);

        let second = coordinator.get_certificate("ab12cd34").await.unwrap();
        assert_eq!(second, b"%PDF-fake");
        assert_eq!(templater.calls.load(Ordering::SeqCst), 1, "second request must hit storage, not re-render");
    }

    #[tokio::test]
    async fn link_is_host_plus_certificate_plus_id() {
        let (coordinator, _templater) = coordinator(sample_cert());
        let link = coordinator.get_certificate_link("ab12cd34").await.unwrap();
        assert_eq!(link, "https://example.com/certificate/ab12cd34");
    }

    #[tokio::test]
    async fn render_uses_composed_link() {
        let (coordinator, templater) = coordinator(sample_cert());
        coordinator.get_certificate("ab12cd34").await.unwrap();
        assert_eq!(
            templater.last_link.lock().unwrap().as_deref(),
            Some("https://example.com/certificate/ab12cd34")
        );
    }

    #[tokio::test]
    async fn update_template_with_no_fields_is_rejected() {
        let (coordinator, _templater) = coordinator(sample_cert());
        let result = coordinator.update_template("course-101", None, None).await;
        assert!(matches!(result, Err(Error::NothingToUpdate)));
    }

    #[tokio::test]
    async fn update_certificate_with_no_fields_is_rejected() {
        let (coordinator, _templater) = coordinator(sample_cert());
        let result = coordinator
            .update_certificate("ab12cd34", None, None, None, None, None)
            .await;
        assert!(matches!(result, Err(Error::NothingToUpdate)));
    }

    #[tokio::test]
    async fn test_template_does_not_touch_the_certificate_registry() {
        let (coordinator, templater) = coordinator(sample_cert());
        let preview = sample_cert();
        let pdf = coordinator.test_template("course-101", &preview).await.unwrap();
        assert_eq!(pdf, b"%PDF-fake");
        assert_eq!(templater.calls.load(Ordering::SeqCst), 1);
    }
}
