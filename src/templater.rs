//! C7: turns a certificate, a public link, and an HTML template into a
//! rendered PDF. QR encoding and HTML templating happen in-process;
//! HTML→PDF conversion is delegated to an external rendering service over
//! HTTP, matching the external-collaborator boundary drawn in §1.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use handlebars::Handlebars;
use image::codecs::png::PngEncoder;
use image::ImageEncoder;
use qrcode::{EcLevel, QrCode};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::registry::Certificate;

#[async_trait]
pub trait Templater: Send + Sync {
    async fn generate_certificate(
        &self,
        template: &str,
        certificate: &Certificate,
        link: &str,
    ) -> Result<Vec<u8>>;
}

#[derive(Serialize)]
struct TemplateData<'a> {
    cert: &'a Certificate,
    link: &'a str,
    qr: String,
}

/// Encodes `link` as a QR code (high error correction, matching the
/// original's choice so the symbol tolerates print/scan degradation) and
/// returns it as a base64 PNG data payload, ready to drop into an `<img
/// src="data:image/png;base64,...">`.
fn link_to_qr_base64(link: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(link, EcLevel::H)
        .map_err(|e| Error::QrEncode(anyhow::anyhow!(e.to_string())))?;
    let image = code
        .render::<image::Luma<u8>>()
        .min_dimensions(256, 256)
        .build();

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&image, image.width(), image.height(), image::ColorType::L8)
        .map_err(|e| Error::QrEncode(e.into()))?;

    Ok(BASE64.encode(png))
}

pub struct HttpTemplater {
    client: reqwest::Client,
    render_service_url: String,
}

impl HttpTemplater {
    pub fn new(render_service_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            render_service_url: render_service_url.into(),
        }
    }

    fn render_html(template: &str, data: &TemplateData) -> Result<String> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string("certificate", template)
            .map_err(|e| Error::TemplateParse(e.into()))?;
        registry
            .render("certificate", data)
            .map_err(|e| Error::TemplateExecute(e.into()))
    }

    async fn render_pdf(&self, html: String) -> Result<Vec<u8>> {
        let part = reqwest::multipart::Part::bytes(html.into_bytes())
            .file_name("index.html")
            .mime_str("text/html")
            .map_err(|e| Error::RenderService(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("files", part)
            .text("preferCssPageSize", "true");

        let response = self
            .client
            .post(format!("{}/forms/chromium/convert/html", self.render_service_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::RenderService(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::RenderService(format!(
                "render service returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::RenderService(e.to_string()))
    }
}

#[async_trait]
impl Templater for HttpTemplater {
    async fn generate_certificate(
        &self,
        template: &str,
        certificate: &Certificate,
        link: &str,
    ) -> Result<Vec<u8>> {
        let qr = link_to_qr_base64(link)?;
        let data = TemplateData {
            cert: certificate,
            link,
            qr,
        };
        let html = Self::render_html(template, &data)?;
        self.render_pdf(html).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_cert() -> Certificate {
        Certificate {
            id: "ab12cd34".to_string(),
            template_pk: 1,
            timestamp: Utc::now(),
            student: "Ada Lovelace".to_string(),
            issue_date: "2024-01-01".to_string(),
            course: "Rust Fundamentals".to_string(),
            mentors: "Grace Hopper".to_string(),
        }
    }

    #[test]
    fn qr_encoding_produces_valid_base64_png() {
        let encoded = link_to_qr_base64("https://example.com/certificate/ab12cd34").unwrap();
        let png = BASE64.decode(encoded).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    }

    #[test]
    fn html_template_interpolates_certificate_fields() {
        let cert = sample_cert();
        let data = TemplateData {
            cert: &cert,
            link: "https://example.com/certificate/ab12cd34",
            qr: "deadbeef".to_string(),
        };
        let html = HttpTemplater::render_html(
            "<h1>{{cert.student}}</h1><p>{{cert.course}}</p><a href=\"{{link}}\">{{link}}</a>",
            &data,
        )
        .unwrap();
        assert!(html.contains("Ada Lovelace"));
        assert!(html.contains("Rust Fundamentals"));
        assert!(html.contains("https://example.com/certificate/ab12cd34"));
    }

    #[test]
    fn malformed_template_reports_parse_error() {
        let cert = sample_cert();
        let data = TemplateData {
            cert: &cert,
            link: "https://example.com",
            qr: String::new(),
        };
        let result = HttpTemplater::render_html("{{#each}}{{/if}}", &data);
        assert!(matches!(result, Err(Error::TemplateParse(_))));
    }

    #[test]
    fn template_referencing_missing_helper_reports_execute_error() {
        let cert = sample_cert();
        let data = TemplateData {
            cert: &cert,
            link: "https://example.com",
            qr: String::new(),
        };
        let result = HttpTemplater::render_html("{{no_such_helper cert.student}}", &data);
        assert!(matches!(result, Err(Error::TemplateExecute(_))));
    }
}
