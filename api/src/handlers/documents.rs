use super::MultipartBody;
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use lexi_rag::document_processor::{extract_pdf_text as extract_text, ExtractionError};
use lexi_rag::models::{Document, DocumentFilter, DocumentStatus, NewDocument};
use lexi_rag::query_service::{document_bucket, user_storage_path, IngestReport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const SCANNED_PDF_MESSAGE: &str =
    "No se pudo extraer texto seleccionable del PDF. Podría ser un documento escaneado.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfText {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub requires_ocr: bool,
}

fn is_pdf(content_type: &str) -> bool {
    content_type.eq_ignore_ascii_case("application/pdf")
}

pub async fn extract_pdf_text(
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<PdfText>> {
    log::info!("[/api/extract-pdf-text] Received POST request");
    let invalid_form =
        || ApiError::bad_request("Formato de solicitud inválido. Se espera multipart/form-data.");
    let multipart = multipart.map_err(|_| invalid_form())?;
    let mut body = MultipartBody::read(multipart).await.map_err(|_| invalid_form())?;

    let Some(file) = body.take_file("file") else {
        return Err(ApiError::bad_request("No se proporcionó ningún archivo."));
    };
    if !is_pdf(&file.content_type) {
        return Err(ApiError::bad_request("Se requiere un archivo PDF válido (.pdf)"));
    }
    log::info!(
        "[/api/extract-pdf-text] Processing {} ({} bytes)",
        file.file_name,
        file.bytes.len()
    );

    match extract_text(file.bytes).await {
        Ok(extraction) if extraction.requires_ocr => {
            log::warn!("[/api/extract-pdf-text] {} has no selectable text", file.file_name);
            Ok(Json(PdfText {
                text: String::new(),
                message: Some(SCANNED_PDF_MESSAGE.to_string()),
                requires_ocr: true,
            }))
        }
        Ok(extraction) => {
            log::info!(
                "[/api/extract-pdf-text] Extracted {} chars ({} before cleanup)",
                extraction.text.chars().count(),
                extraction.raw_length
            );
            Ok(Json(PdfText {
                text: extraction.text,
                message: None,
                requires_ocr: false,
            }))
        }
        Err(e @ ExtractionError::InvalidPdf(_)) => Err(ApiError::internal(
            "El archivo PDF parece estar dañado o tiene una estructura inválida.",
            e,
        )),
        Err(e) => Err(ApiError::internal("Error interno al procesar el archivo PDF.", e)),
    }
}

pub async fn upload_document(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let invalid_form =
        || ApiError::bad_request("Formato de solicitud inválido. Se espera multipart/form-data.");
    let multipart = multipart.map_err(|_| invalid_form())?;
    let mut body = MultipartBody::read(multipart).await.map_err(|_| invalid_form())?;

    let Some(file) = body.take_file("file") else {
        return Err(ApiError::bad_request("No se proporcionó ningún archivo."));
    };
    let source = body.field("source").map(str::to_string);
    let document_type = body.field("documentType").map(str::to_string);

    let bucket = document_bucket(source.as_deref());
    let path = user_storage_path(&user.id, &file.file_name);
    log::info!("[/api/documents] Uploading {} to {}/{}", file.file_name, bucket, path);
    state
        .blobs
        .upload(bucket, &path, file.bytes, &file.content_type, false)
        .await
        .map_err(|e| ApiError::internal("Error al subir el documento", e))?;

    let document = state
        .store
        .insert_document(NewDocument {
            user_id: user.id.clone(),
            file_name: file.file_name,
            file_path: path,
            document_type,
            source,
            status: DocumentStatus::Uploaded,
        })
        .await
        .map_err(|e| ApiError::internal("Error al registrar el documento", e))?;

    Ok((StatusCode::CREATED, Json(json!({ "document": document }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub document_type: Option<String>,
    pub status: Option<String>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(DocumentStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request(format!("Estado de documento inválido: {raw}"))
        })?),
        None => None,
    };
    let filter = DocumentFilter {
        document_type: query.document_type,
        status,
    };

    let documents: Vec<Document> = state
        .store
        .list_documents(&user.id, &filter)
        .await
        .map_err(|e| ApiError::internal("Error al obtener los documentos", e))?;
    Ok(Json(json!({ "documents": documents })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    pub document_id: String,
    #[serde(flatten)]
    pub report: IngestReport,
}

pub async fn process_stored_document(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ProcessedDocument>> {
    let document = state
        .store
        .get_document(&id)
        .await
        .map_err(|e| ApiError::internal("Error al obtener el documento", e))?;
    match document {
        Some(document) if document.user_id == user.id => {}
        _ => return Err(ApiError::NotFound("Documento no encontrado".to_string())),
    }

    let report = state
        .pipeline
        .ingest_document(&id)
        .await
        .map_err(|e| ApiError::internal("Error al procesar el documento", format!("{e:#}")))?;

    Ok(Json(ProcessedDocument {
        document_id: id,
        report,
    }))
}
