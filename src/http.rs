//! C10: the REST/JSON gateway. The original system exposes this surface
//! over gRPC (§1); axum stands in as the idiomatic Rust equivalent, with
//! the same operations addressed by HTTP verb + path instead of RPC method
//! name (§6.2).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::coordinator::Coordinator;
use crate::error::Error;
use crate::registry::{cached::CachedRegistry, direct::DirectRegistry, Certificate};

pub type AppRegistry = CachedRegistry<DirectRegistry>;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator<AppRegistry>>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::IllegalKey(_) | Error::InvalidCapacity(_) | Error::NothingToUpdate => {
                StatusCode::BAD_REQUEST
            }
            Error::StorageIo(_)
            | Error::TemplateParse(_)
            | Error::TemplateExecute(_)
            | Error::QrEncode(_)
            | Error::RenderService(_)
            | Error::RegistryBackend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/templates", get(list_templates))
        .route("/template", post(add_template))
        .route("/template/:name", get(get_template).delete(delete_template).patch(update_template))
        .route("/template/:name/test", post(test_template))
        .route("/certificate", post(add_certificate))
        .route(
            "/certificate/:id",
            get(get_certificate).delete(delete_certificate).patch(update_certificate),
        )
        .route("/certificate/:id/link", get(get_certificate_link))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024))
        .with_state(state)
}

fn pdf_response(bytes: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .body(axum::body::Body::from(bytes))
        .unwrap()
}

#[derive(Deserialize)]
struct AddTemplateRequest {
    name: String,
    content: String,
}

async fn add_template(
    State(state): State<AppState>,
    Json(req): Json<AddTemplateRequest>,
) -> Result<StatusCode, Error> {
    state.coordinator.add_template(&req.name, &req.content).await?;
    Ok(StatusCode::CREATED)
}

async fn list_templates(State(state): State<AppState>) -> Result<Json<Vec<String>>, Error> {
    Ok(Json(state.coordinator.list_templates().await?))
}

#[derive(Serialize)]
struct TemplateResponse {
    content: String,
}

async fn get_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TemplateResponse>, Error> {
    let content = state.coordinator.get_template(&name).await?;
    Ok(Json(TemplateResponse { content }))
}

async fn delete_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, Error> {
    state.coordinator.delete_template(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct UpdateTemplateRequest {
    new_name: Option<String>,
    new_content: Option<String>,
}

async fn update_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpdateTemplateRequest>,
) -> Result<StatusCode, Error> {
    state
        .coordinator
        .update_template(&name, req.new_name, req.new_content)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct TestTemplateRequest {
    id: Option<String>,
    student: String,
    issue_date: String,
    course: String,
    mentors: String,
}

async fn test_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<TestTemplateRequest>,
) -> Result<Response, Error> {
    let preview = Certificate {
        id: req.id.unwrap_or_default(),
        template_pk: 0,
        timestamp: Utc::now(),
        student: req.student,
        issue_date: req.issue_date,
        course: req.course,
        mentors: req.mentors,
    };
    let pdf = state.coordinator.test_template(&name, &preview).await?;
    Ok(pdf_response(pdf))
}

#[derive(Deserialize)]
struct AddCertificateRequest {
    template_name: String,
    student: String,
    issue_date: String,
    course: String,
    mentors: String,
}

#[derive(Serialize)]
struct AddCertificateResponse {
    id: String,
}

async fn add_certificate(
    State(state): State<AppState>,
    Json(req): Json<AddCertificateRequest>,
) -> Result<Json<AddCertificateResponse>, Error> {
    let cert = state
        .coordinator
        .add_certificate(&req.template_name, &req.student, &req.issue_date, &req.course, &req.mentors)
        .await?;
    Ok(Json(AddCertificateResponse { id: cert.id }))
}

async fn get_certificate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, Error> {
    let pdf = state.coordinator.get_certificate(&id).await?;
    Ok(pdf_response(pdf))
}

async fn delete_certificate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, Error> {
    state.coordinator.delete_certificate(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct UpdateCertificateRequest {
    new_template: Option<String>,
    new_student: Option<String>,
    new_issue_date: Option<String>,
    new_course: Option<String>,
    new_mentors: Option<String>,
}

async fn update_certificate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCertificateRequest>,
) -> Result<StatusCode, Error> {
    state
        .coordinator
        .update_certificate(
            &id,
            req.new_template,
            req.new_student,
            req.new_issue_date,
            req.new_course,
            req.new_mentors,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct LinkResponse {
    link: String,
}

async fn get_certificate_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LinkResponse>, Error> {
    let link = state.coordinator.get_certificate_link(&id).await?;
    Ok(Json(LinkResponse { link }))
}
