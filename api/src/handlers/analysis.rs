use super::MultipartBody;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection, Multipart, State},
    Json,
};
use lexi_rag::entities::{extract_legal_entities, find_important_dates, ImportantDate, LegalEntity};
use lexi_rag::transcription::AudioUpload;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct EntitiesBody {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesReply {
    pub entities: Vec<LegalEntity>,
    pub important_dates: Vec<ImportantDate>,
}

pub async fn extract_entities(
    body: Result<Json<EntitiesBody>, JsonRejection>,
) -> ApiResult<Json<EntitiesReply>> {
    let Json(body) = body.map_err(|_| ApiError::bad_request("El texto es requerido"))?;
    let Some(text) = body.text.filter(|t| !t.is_empty()) else {
        return Err(ApiError::bad_request("El texto es requerido"));
    };

    Ok(Json(EntitiesReply {
        entities: extract_legal_entities(&text),
        important_dates: find_important_dates(&text),
    }))
}

#[derive(Debug, Serialize)]
pub struct Transcript {
    pub transcript: String,
}

pub async fn transcribe(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Transcript>> {
    let no_audio = || ApiError::bad_request("No audio file provided");
    let multipart = multipart.map_err(|_| no_audio())?;
    let mut body = MultipartBody::read(multipart).await.map_err(|_| no_audio())?;
    let Some(file) = body.take_file("audio") else {
        return Err(no_audio());
    };
    log::info!(
        "[/api/transcribe] {} ({} bytes, {})",
        file.file_name,
        file.bytes.len(),
        file.content_type
    );

    let transcript = state
        .transcriber
        .transcribe(AudioUpload {
            file_name: file.file_name,
            content_type: file.content_type,
            bytes: file.bytes,
        })
        .await
        .map_err(|e| {
            log::error!("Transcription error: {:#}", e);
            ApiError::Upstream {
                status: axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                message: "Error transcribing audio".to_string(),
                details: None,
            }
        })?;

    Ok(Json(Transcript { transcript }))
}
