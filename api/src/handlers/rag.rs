use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use lexi_rag::models::MatchedChunk;
use lexi_rag::query_service::{AskResult, SearchOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub context: Option<Vec<ContextItem>>,
}

/// A retrieved passage: plain text, or a `search-documents` result whose
/// `content` carries the text.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ContextItem {
    Text(String),
    Chunk { content: String },
}

impl ContextItem {
    fn into_content(self) -> String {
        match self {
            ContextItem::Text(text) | ContextItem::Chunk { content: text } => text,
        }
    }
}

fn read_body(body: Result<Json<QueryBody>, JsonRejection>) -> ApiResult<QueryBody> {
    body.map(|Json(body)| body)
        .map_err(|e| ApiError::bad_request(e.body_text()))
}

fn required_query(body: &QueryBody) -> ApiResult<String> {
    body.query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request(r#"Missing or invalid "query" in request body"#))
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub documents: Vec<MatchedChunk>,
}

pub async fn search_documents(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> ApiResult<Json<SearchResults>> {
    let body = read_body(body)?;
    let query = required_query(&body)?;
    log::info!("[/api/search-documents] Searching for user {}", user.id);

    let options = SearchOptions { user_id: Some(user.id) };
    let documents = state
        .pipeline
        .search(&query, &options)
        .await
        .map_err(|e| ApiError::internal("Error al buscar documentos", format!("{e:#}")))?;
    Ok(Json(SearchResults { documents }))
}

#[derive(Debug, Serialize)]
pub struct GeneratedAnswer {
    pub response: String,
}

pub async fn generate_answer(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> ApiResult<Json<GeneratedAnswer>> {
    let body = read_body(body)?;
    let query = required_query(&body)?;
    let context: Vec<String> = body
        .context
        .unwrap_or_default()
        .into_iter()
        .map(ContextItem::into_content)
        .collect();
    if context.is_empty() {
        return Err(ApiError::bad_request(
            r#"Missing or invalid "context" (retrieved documents) in request body"#,
        ));
    }

    let response = state
        .pipeline
        .answer(&query, &context)
        .await
        .map_err(|e| ApiError::internal("Error al generar respuesta", format!("{e:#}")))?;
    Ok(Json(GeneratedAnswer { response }))
}

pub async fn ask(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> ApiResult<Json<AskResult>> {
    let body = read_body(body)?;
    let query = required_query(&body)?;
    log::info!("[/api/ask] Question from user {}", user.id);

    let options = SearchOptions { user_id: Some(user.id) };
    let result = state
        .pipeline
        .ask(&query, &options)
        .await
        .map_err(|e| ApiError::internal("Error al generar respuesta", format!("{e:#}")))?;
    Ok(Json(result))
}
