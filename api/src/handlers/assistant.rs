//! Chat-style endpoints backed by OpenAI and Perplexity.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use lexi_rag::completion_service::{
    ChatMessage, CompletionError, CompletionRequest, OPENAI_CHAT_MODEL, PERPLEXITY_SEARCH_MODEL,
};
use lexi_rag::prompts::{self, CHAT_SYSTEM_PROMPT, SEARCH_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_MESSAGES: usize = 100;
pub const MAX_MESSAGE_CHARS: usize = 50_000;
pub const MAX_PDF_TEXT_CHARS: usize = 1_000_000;
pub const MAX_PROMPT_CHARS: usize = 6_000;

const FALLBACK_ANSWER: &str = "Lo siento, estoy experimentando problemas de conexión con mi servicio de IA en este momento.";
const FALLBACK_SUGGESTIONS: &str = "Puedo sugerirle:
1. Intentar de nuevo en unos minutos
2. Verificar que su pregunta sea clara y específica
3. Si el problema persiste, contacte al administrador del sistema para verificar la configuración de la API

Gracias por su paciencia.";

#[derive(Debug, Serialize)]
pub struct AssistantReply {
    pub content: String,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A chat request that passed validation.
#[derive(Debug, PartialEq)]
pub struct ChatInput {
    pub last_message: String,
    pub pdf_text: Option<String>,
    pub has_pdf: bool,
    pub system_prompt: Option<String>,
}

/// Validates a raw `/api/chat` body. Limits: at most 100 messages of at most
/// 50000 characters each, no script injection, PDF text up to 1,000,000
/// characters.
pub fn parse_chat_request(body: &Value) -> ApiResult<ChatInput> {
    let Some(body) = body.as_object() else {
        return Err(ApiError::bad_request("Cuerpo de solicitud inválido."));
    };

    let pdf_text = body
        .get("attachedPdfText")
        .and_then(Value::as_str)
        .map(str::to_string);
    if pdf_text
        .as_ref()
        .is_some_and(|text| text.chars().count() > MAX_PDF_TEXT_CHARS)
    {
        return Err(ApiError::bad_request("Texto de PDF demasiado grande (máximo 1MB)."));
    }

    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        log::error!("[/api/chat] Invalid message format in request body");
        return Err(ApiError::bad_request("Formato de mensajes inválido."));
    };

    for (i, message) in messages.iter().enumerate() {
        let Some(content) = message.get("content").and_then(Value::as_str) else {
            return Err(ApiError::bad_request(format!("Mensaje {i} tiene formato inválido.")));
        };
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ApiError::bad_request(format!(
                "Mensaje {i} es demasiado largo (máximo 50KB)."
            )));
        }
        if content.contains("<script>") || content.contains("javascript:") {
            return Err(ApiError::bad_request("Contenido potencialmente malicioso detectado."));
        }
    }
    if messages.len() > MAX_MESSAGES {
        return Err(ApiError::bad_request(
            "Demasiados mensajes en la conversación (máximo 100).",
        ));
    }

    let last_message = messages
        .last()
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let pdf_text = pdf_text.filter(|text| !text.trim().is_empty());
    let has_pdf = body.get("hasPDF").and_then(Value::as_bool).unwrap_or(false)
        || pdf_text.is_some()
        || last_message.contains("CONTENIDO DEL PDF ADJUNTO")
        || last_message.contains("Análisis del PDF adjunto")
        || last_message.chars().count() > 1000;

    Ok(ChatInput {
        last_message,
        pdf_text,
        has_pdf,
        system_prompt: body
            .get("systemPrompt")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .map(str::to_string),
    })
}

pub fn chat_prompt(input: &ChatInput) -> String {
    let mut prompt = String::new();
    if let Some(pdf_text) = &input.pdf_text {
        prompt.push_str(&format!(
            "Contexto del Documento PDF Adjunto:\n---\n{pdf_text}\n---\n\n"
        ));
    }
    prompt.push_str(&format!("Consulta del Usuario:\n{}", input.last_message));
    prompt
}

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<AssistantReply>> {
    log::info!("[/api/chat] Received POST request");
    let Json(body) = body.map_err(|_| ApiError::bad_request("Cuerpo de solicitud inválido."))?;
    let input = parse_chat_request(&body)?;
    log::info!(
        "[/api/chat] Has PDF? {}, message length: {}, PDF text length: {}",
        input.has_pdf,
        input.last_message.chars().count(),
        input.pdf_text.as_ref().map_or(0, |t| t.chars().count())
    );

    let system = input
        .system_prompt
        .clone()
        .unwrap_or_else(|| CHAT_SYSTEM_PROMPT.to_string());
    let request = CompletionRequest::new(vec![
        ChatMessage::system(system),
        ChatMessage::user(chat_prompt(&input)),
    ])
    .model(OPENAI_CHAT_MODEL)
    .max_tokens(2000)
    .temperature(0.7);

    let completion = state
        .chat_model
        .complete(request)
        .await
        .map_err(|e| ApiError::internal("Error al procesar la solicitud con la IA.", e))?;

    log::info!("[/api/chat] Sending response back to client");
    Ok(Json(AssistantReply {
        content: completion.content,
        sources: Vec::new(),
        model: None,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn search_error(e: CompletionError) -> ApiError {
    let upstream = |status: u16| ApiError::Upstream {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
        message: format!("Error al contactar el servicio de búsqueda ({status})"),
        details: None,
    };
    match e {
        CompletionError::Unauthorized(status) | CompletionError::Api { status, .. } => {
            upstream(status)
        }
        CompletionError::NonJson { status, .. } if !(200..300).contains(&status) => {
            upstream(status)
        }
        CompletionError::EmptyResponse => ApiError::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Respuesta inesperada del servicio de búsqueda.".to_string(),
            details: None,
        },
        other => ApiError::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Error interno del servidor: {other}"),
            details: None,
        },
    }
}

pub async fn perplexity_search(
    State(state): State<AppState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> ApiResult<Json<AssistantReply>> {
    let Some(model) = state.search_model.clone() else {
        log::error!("PERPLEXITY_API_KEY is not configured");
        return Err(ApiError::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Error de configuración del servidor: La clave API no está disponible."
                .to_string(),
            details: None,
        });
    };

    let Json(body) = body.map_err(|e| ApiError::Upstream {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("Error interno del servidor: {e}"),
        details: None,
    })?;
    let Some(query) = body.query.filter(|q| !q.trim().is_empty()) else {
        return Err(ApiError::bad_request("La consulta (query) es requerida."));
    };
    log::info!("[/api/perplexity-search] Query of {} chars", query.chars().count());

    let request = CompletionRequest::new(vec![
        ChatMessage::system(
            body.system_prompt
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| SEARCH_SYSTEM_PROMPT.to_string()),
        ),
        ChatMessage::user(query),
    ])
    .model(body.model.unwrap_or_else(|| PERPLEXITY_SEARCH_MODEL.to_string()))
    .temperature(0.2)
    .max_tokens(2000);

    let completion = model.complete(request).await.map_err(|e| {
        log::error!("[/api/perplexity-search] {}", e);
        search_error(e)
    })?;

    Ok(Json(AssistantReply {
        content: completion.content,
        sources: completion.sources,
        model: None,
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "filePath")]
    pub file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDocumentBody {
    #[serde(default)]
    pub input_text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub search_mode: Option<bool>,
    #[serde(default)]
    pub research_mode: Option<bool>,
    #[serde(default)]
    pub selected_model: Option<String>,
}

fn describe_attachment(attachment: &Attachment) -> Option<String> {
    match attachment.kind.as_str() {
        "document" if attachment.file_path.is_some() => {
            Some(format!("[Documento adjunto: {}]", attachment.name))
        }
        "image" => Some(format!("[Imagen adjunta: {}]", attachment.name)),
        "audio" => Some(format!("[Audio adjunto: {}]", attachment.name)),
        _ => None,
    }
}

pub fn attachment_descriptions(attachments: &[Attachment]) -> Vec<String> {
    attachments.iter().filter_map(describe_attachment).collect()
}

/// User text plus attachment placeholders, cut to [`MAX_PROMPT_CHARS`].
pub fn combined_prompt(input_text: &str, descriptions: &[String]) -> String {
    let mut combined = input_text.to_string();
    if !descriptions.is_empty() {
        combined.push_str("\n\n--- Contenido de Documentos Adjuntos ---\n");
        combined.push_str(&descriptions.join("\n\n---\n"));
    }

    if combined.chars().count() > MAX_PROMPT_CHARS {
        let truncated: String = combined.chars().take(MAX_PROMPT_CHARS).collect();
        format!("{truncated}\n\n[Texto truncado debido a limitaciones de tamaño]")
    } else {
        combined
    }
}

fn fallback_reply(has_attachment_text: bool) -> AssistantReply {
    let extracted = if has_attachment_text {
        "He detectado contenido en los documentos adjuntos, pero no puedo analizarlos en detalle en este momento."
    } else {
        ""
    };
    AssistantReply {
        content: format!("{FALLBACK_ANSWER}\n\n{extracted}\n\n{FALLBACK_SUGGESTIONS}"),
        sources: Vec::new(),
        model: Some("fallback".to_string()),
    }
}

pub async fn process_document(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<ProcessDocumentBody>, JsonRejection>,
) -> ApiResult<Json<AssistantReply>> {
    log::info!("[/api/process-document] Request from user {}", user.id);
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let input_text = body.input_text.unwrap_or_default();
    if input_text.is_empty() && body.attachments.is_empty() {
        return Err(ApiError::bad_request("Se requiere texto o adjuntos"));
    }
    let (Some(search_mode), Some(research_mode), Some(selected_model)) = (
        body.search_mode,
        body.research_mode,
        body.selected_model.filter(|m| !m.is_empty()),
    ) else {
        return Err(ApiError::bad_request(
            "Faltan parámetros: searchMode, researchMode o selectedModel",
        ));
    };

    let descriptions = attachment_descriptions(&body.attachments);
    let prompt = combined_prompt(&input_text, &descriptions);
    let has_documents = body.attachments.iter().any(|a| a.kind == "document");
    let system = prompts::active_features(search_mode, research_mode, has_documents)
        .iter()
        .map(|feature| feature.system_prompt())
        .collect::<Vec<_>>()
        .join("\n\n");
    log::info!(
        "[/api/process-document] Prompt of {} chars, model {}",
        prompt.chars().count(),
        selected_model
    );

    let Some(model) = state.search_model.clone() else {
        return Err(llm_auth_error());
    };
    let request = CompletionRequest::new(vec![
        ChatMessage::system(system),
        ChatMessage::user(prompt),
    ])
    .model(selected_model.clone())
    .max_tokens(800)
    .temperature(0.7);

    match model.complete(request).await {
        Ok(completion) => Ok(Json(AssistantReply {
            content: completion.content,
            sources: Vec::new(),
            model: Some(selected_model),
        })),
        Err(CompletionError::NonJson { preview, .. }) => {
            log::error!("HTML answer from the LLM provider, using fallback reply: {}", preview);
            Ok(Json(fallback_reply(!descriptions.is_empty())))
        }
        Err(CompletionError::Unauthorized(_)) => Err(llm_auth_error()),
        Err(e) => Err(ApiError::internal("Error al generar respuesta del asistente", e)),
    }
}

fn llm_auth_error() -> ApiError {
    ApiError::Upstream {
        status: StatusCode::UNAUTHORIZED,
        message: "Error al generar respuesta del asistente".to_string(),
        details: Some(
            "Error de autenticación con el proveedor de LLM. Verifique la configuración del API key."
                .to_string(),
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub analysis: String,
    pub document_type: String,
}

pub async fn analyze_document(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> ApiResult<Json<Analysis>> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let Some(text) = body.text.filter(|t| !t.trim().is_empty()) else {
        return Err(ApiError::bad_request("El texto es requerido"));
    };
    let document_type = body
        .document_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "general".to_string());

    let request = CompletionRequest::new(vec![
        ChatMessage::system(prompts::analysis_prompt(&document_type)),
        ChatMessage::user(prompts::analysis_request(&text, &document_type)),
    ])
    .model(OPENAI_CHAT_MODEL)
    .temperature(0.3);

    let completion = state.chat_model.complete(request).await.map_err(|e| {
        ApiError::internal(
            "No se pudo analizar el documento. Por favor, intenta de nuevo.",
            e,
        )
    })?;

    Ok(Json(Analysis {
        analysis: completion.content,
        document_type,
    }))
}
