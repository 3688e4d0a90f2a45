//! Router configuration for the API server.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::auth::require_job_token;
use crate::handlers;
use crate::state::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let jobs = Router::new()
        .route("/generate-embeddings", post(handlers::generate_embeddings))
        .route("/monitor-legal-deadlines", post(handlers::monitor_legal_deadlines))
        .route("/cron-scheduler", post(handlers::cron_scheduler))
        .route("/scrape-gaceta-oficial", post(handlers::scrape_gaceta_oficial))
        .route("/scrape-organo-judicial", post(handlers::scrape_organo_judicial))
        .route("/gaceta-crawler", post(handlers::gaceta_crawler))
        .route("/legal-crawler", post(handlers::legal_crawler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_job_token));

    Router::new()
        .route("/health", get(handlers::health))
        // Assistant
        .route("/api/chat", post(handlers::chat))
        .route("/api/perplexity-search", post(handlers::perplexity_search))
        .route("/api/process-document", post(handlers::process_document))
        .route("/api/analyze-document", post(handlers::analyze_document))
        // Text and media analysis
        .route("/api/extract-pdf-text", post(handlers::extract_pdf_text))
        .route("/api/extract-entities", post(handlers::extract_entities))
        .route("/api/transcribe", post(handlers::transcribe))
        // Documents and retrieval
        .route(
            "/api/documents",
            get(handlers::list_documents).post(handlers::upload_document),
        )
        .route(
            "/api/documents/:id/process",
            post(handlers::process_stored_document),
        )
        .route("/api/search-documents", post(handlers::search_documents))
        .route("/api/generate-answer", post(handlers::generate_answer))
        .route("/api/ask", post(handlers::ask))
        .route("/api/env-check", get(handlers::env_check))
        .nest("/jobs", jobs)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_settings, TestApp, OWNER_TOKEN};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use lexi_rag::models::{DocumentStatus, NewDocument};
    use lexi_rag::{CompletionError, LegalStore};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn multipart(
        uri: &str,
        field: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Request<Body> {
        let boundary = "lexi-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn chat_returns_model_content() {
        let test = TestApp::new().chat_reply("Según la Ley 8, el plazo es de 30 días.");
        let (status, json) = send(
            test.router(),
            post_json(
                "/api/chat",
                None,
                json!({ "messages": [{"role": "user", "content": "¿Cuál es el plazo?"}] }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["content"], "Según la Ley 8, el plazo es de 30 días.");
        assert_eq!(json["sources"], json!([]));
    }

    #[tokio::test]
    async fn chat_rejects_script_content() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            post_json(
                "/api/chat",
                None,
                json!({ "messages": [{"role": "user", "content": "javascript:alert(1)"}] }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Contenido potencialmente malicioso detectado.");
    }

    #[tokio::test]
    async fn chat_model_failure_reports_details() {
        let test = TestApp::new()
            .chat_error(|| CompletionError::Transport("connection reset".to_string()));
        let (status, json) = send(
            test.router(),
            post_json("/api/chat", None, json!({ "messages": [{"content": "hola"}] })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Error al procesar la solicitud con la IA.");
        assert!(json["details"].as_str().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn search_requires_query_and_configured_key() {
        let test = TestApp::new();
        let (status, json) = send(
            test.router(),
            post_json("/api/perplexity-search", None, json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "La consulta (query) es requerida.");

        let unconfigured = TestApp::new().without_search_model();
        let (status, json) = send(
            unconfigured.router(),
            post_json("/api/perplexity-search", None, json!({ "query": "Ley 8" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json["error"],
            "Error de configuración del servidor: La clave API no está disponible."
        );
    }

    #[tokio::test]
    async fn search_mirrors_upstream_status() {
        let test = TestApp::new().search_error(|| CompletionError::Api {
            status: 429,
            message: "rate limited".to_string(),
        });
        let (status, json) = send(
            test.router(),
            post_json("/api/perplexity-search", None, json!({ "query": "Ley 8" })),
        )
        .await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], "Error al contactar el servicio de búsqueda (429)");
    }

    #[tokio::test]
    async fn process_document_requires_a_session() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            post_json("/api/process-document", None, json!({ "inputText": "hola" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "No autorizado");
    }

    #[tokio::test]
    async fn process_document_validates_parameters() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            post_json("/api/process-document", Some(OWNER_TOKEN), json!({ "inputText": "hola" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"],
            "Faltan parámetros: searchMode, researchMode o selectedModel"
        );
    }

    #[tokio::test]
    async fn process_document_falls_back_on_html_upstream() {
        let test = TestApp::new().search_error(|| CompletionError::NonJson {
            status: 200,
            preview: "<!DOCTYPE html>".to_string(),
        });
        let (status, json) = send(
            test.router(),
            post_json(
                "/api/process-document",
                Some(OWNER_TOKEN),
                json!({
                    "inputText": "Resume el contrato",
                    "attachments": [],
                    "searchMode": false,
                    "researchMode": false,
                    "selectedModel": "sonar-pro"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["model"], "fallback");
        assert!(json["content"].as_str().unwrap().contains("Intentar de nuevo"));
    }

    #[tokio::test]
    async fn process_document_sends_the_selected_model() {
        let test = TestApp::new().search_reply("Resumen del contrato");
        let (status, json) = send(
            test.router(),
            post_json(
                "/api/process-document",
                Some(OWNER_TOKEN),
                json!({
                    "inputText": "Resume el contrato",
                    "searchMode": false,
                    "researchMode": false,
                    "selectedModel": "sonar"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["model"], "sonar");
        let requests = test.search_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model.as_deref(), Some("sonar"));
        assert_eq!(requests[0].max_tokens, Some(800));
    }

    #[tokio::test]
    async fn fallback_mentions_attachments_only_when_described() {
        let html_upstream = || CompletionError::NonJson {
            status: 200,
            preview: "<!DOCTYPE html>".to_string(),
        };
        let request = |attachment: Value| {
            post_json(
                "/api/process-document",
                Some(OWNER_TOKEN),
                json!({
                    "inputText": "Revisa el adjunto",
                    "attachments": [attachment],
                    "searchMode": false,
                    "researchMode": false,
                    "selectedModel": "sonar-pro"
                }),
            )
        };
        let detected = "He detectado contenido en los documentos adjuntos";

        let test = TestApp::new().search_error(html_upstream);
        let (status, json) = send(
            test.router(),
            request(json!({ "type": "document", "name": "contrato.pdf" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!json["content"].as_str().unwrap().contains(detected));

        let (status, json) = send(
            test.router(),
            request(json!({
                "type": "document",
                "name": "contrato.pdf",
                "filePath": "owner/contrato.pdf"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["content"].as_str().unwrap().contains(detected));
    }

    #[tokio::test]
    async fn process_document_reports_llm_auth_failure() {
        let test = TestApp::new().search_error(|| CompletionError::Unauthorized(401));
        let (status, json) = send(
            test.router(),
            post_json(
                "/api/process-document",
                Some(OWNER_TOKEN),
                json!({
                    "inputText": "Resume",
                    "searchMode": true,
                    "researchMode": false,
                    "selectedModel": "sonar-pro"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Error al generar respuesta del asistente");
    }

    #[tokio::test]
    async fn extract_entities_returns_laws_and_dates() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            post_json(
                "/api/extract-entities",
                None,
                json!({
                    "text": "Conforme a la Ley N° 8, el plazo vence el 15 de marzo de 2025."
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let entities = json["entities"].as_array().unwrap();
        assert!(entities.iter().any(|e| e["type"] == "LAWS"));
        assert_eq!(json["importantDates"][0]["isDeadline"], true);
    }

    #[tokio::test]
    async fn extract_pdf_text_rejects_non_pdf_uploads() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            multipart("/api/extract-pdf-text", "file", "nota.txt", "text/plain", b"hola"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Se requiere un archivo PDF válido (.pdf)");
    }

    #[tokio::test]
    async fn extract_pdf_text_reports_damaged_files() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            multipart(
                "/api/extract-pdf-text",
                "file",
                "roto.pdf",
                "application/pdf",
                b"definitely not a pdf",
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["details"].is_string());
    }

    #[tokio::test]
    async fn transcribe_returns_transcript() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            multipart("/api/transcribe", "audio", "nota.webm", "audio/webm", b"\x1a\x45\xdf\xa3"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["transcript"], "transcripción de nota.webm");
    }

    #[tokio::test]
    async fn transcribe_without_audio_is_rejected() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            multipart("/api/transcribe", "file", "nota.webm", "audio/webm", b"x"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No audio file provided");
    }

    #[tokio::test]
    async fn documents_are_listed_per_owner() {
        let test = TestApp::new();
        for user in ["owner", "someone-else"] {
            test.store
                .insert_document(NewDocument {
                    user_id: user.to_string(),
                    file_name: "contrato.pdf".to_string(),
                    file_path: format!("{user}/contrato.pdf"),
                    document_type: Some("contrato".to_string()),
                    source: None,
                    status: DocumentStatus::Uploaded,
                })
                .await
                .unwrap();
        }

        let request = Request::builder()
            .uri("/api/documents?status=uploaded")
            .header(header::AUTHORIZATION, format!("Bearer {OWNER_TOKEN}"))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(test.router(), request).await;

        assert_eq!(status, StatusCode::OK);
        let documents = json["documents"].as_array().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["user_id"], "owner");
    }

    #[tokio::test]
    async fn processing_someone_elses_document_is_not_found() {
        let test = TestApp::new();
        let document = test
            .store
            .insert_document(NewDocument {
                user_id: "someone-else".to_string(),
                file_name: "contrato.pdf".to_string(),
                file_path: "someone-else/contrato.pdf".to_string(),
                document_type: None,
                source: None,
                status: DocumentStatus::Uploaded,
            })
            .await
            .unwrap();

        let (status, json) = send(
            test.router(),
            post_json(
                &format!("/api/documents/{}/process", document.id),
                Some(OWNER_TOKEN),
                json!({}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Documento no encontrado");
    }

    #[tokio::test]
    async fn search_documents_requires_query() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            post_json("/api/search-documents", Some(OWNER_TOKEN), json!({ "query": "  " })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], r#"Missing or invalid "query" in request body"#);
    }

    #[tokio::test]
    async fn generate_answer_uses_given_context() {
        let test = TestApp::new().search_reply("El plazo es de 30 días.");
        let (status, json) = send(
            test.router(),
            post_json(
                "/api/generate-answer",
                Some(OWNER_TOKEN),
                json!({ "query": "¿Plazo?", "context": ["El plazo es de 30 días."] }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["response"], "El plazo es de 30 días.");
    }

    #[tokio::test]
    async fn generate_answer_accepts_search_results_as_context() {
        let test = TestApp::new().search_reply("Según el Artículo 5, son 30 días.");
        let (status, json) = send(
            test.router(),
            post_json(
                "/api/generate-answer",
                Some(OWNER_TOKEN),
                json!({
                    "query": "¿Plazo?",
                    "context": [{
                        "id": "e1",
                        "document_id": "d1",
                        "content": "Artículo 5. El plazo es de 30 días.",
                        "similarity": 0.91
                    }]
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["response"], "Según el Artículo 5, son 30 días.");
        let requests = test.search_requests();
        assert_eq!(requests.len(), 1);
        let system = &requests[0].messages[0].content;
        assert!(system.contains("Artículo 5. El plazo es de 30 días."));
    }

    #[tokio::test]
    async fn generate_answer_rejects_empty_context() {
        let test = TestApp::new();
        let (status, json) = send(
            test.router(),
            post_json(
                "/api/generate-answer",
                Some(OWNER_TOKEN),
                json!({ "query": "¿Plazo?", "context": [] }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"],
            r#"Missing or invalid "context" (retrieved documents) in request body"#
        );
        assert!(test.search_requests().is_empty());
    }

    #[tokio::test]
    async fn env_check_reports_presence_only() {
        let app = TestApp::new().router();
        let request = Request::builder()
            .uri("/api/env-check")
            .header(header::AUTHORIZATION, format!("Bearer {OWNER_TOKEN}"))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["variables"]["OPENAI_API_KEY"], "Configurada");
        assert!(!json.to_string().contains(&sample_settings().openai_api_key));
    }

    #[tokio::test]
    async fn job_routes_require_the_job_token() {
        let test = TestApp::new().job_token("cron-secret");
        let (status, _) = send(
            test.router(),
            post_json("/jobs/monitor-legal-deadlines", Some("wrong"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = send(
            test.router(),
            post_json("/jobs/cron-scheduler", Some("cron-secret"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["sent"], 0);
    }

    #[tokio::test]
    async fn generate_embeddings_validates_parameters() {
        let app = TestApp::new().router();
        let (status, json) = send(
            app,
            post_json(
                "/jobs/generate-embeddings",
                Some("any"),
                json!({ "storagePath": "public/g.pdf" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"],
            "Missing required parameters: storagePath, bucketName, gacetaUrl"
        );
    }

    #[tokio::test]
    async fn legal_crawler_reports_missing_selector() {
        let test = TestApp::new().page(
            "https://example.gob.pa/",
            "<html><body><p>Sin noticias</p></body></html>",
        );
        let (status, json) = send(
            test.router(),
            post_json(
                "/jobs/legal-crawler?url=https://example.gob.pa/&selector=.noticias",
                Some("any"),
                json!({}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Content selector not found");
        assert_eq!(json["selector"], ".noticias");
    }

    #[tokio::test]
    async fn legal_crawler_records_first_check() {
        let test = TestApp::new().page(
            "https://example.gob.pa/",
            r#"<div class="noticias"><h3>Nuevo acuerdo</h3><a href="/acuerdo">Ver</a></div>"#,
        );
        let (status, json) = send(
            test.router(),
            post_json(
                "/jobs/legal-crawler?url=https://example.gob.pa/&selector=.noticias&source=Prueba",
                Some("any"),
                json!({}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["isFirstCheck"], true);
        assert_eq!(json["title"], "Nuevo acuerdo");
        assert_eq!(test.store.legal_updates().unwrap()[0].source, "Prueba");
    }
}
