use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::error::ApiError;
use super::types::*;
use super::TaxApi;
use crate::config::ClientConfig;
use crate::models::{
    ActivityEntry, ChatMessage, ChatSession, DashboardAlert, DashboardMetrics, Document,
    ExtractionResult, FieldMap, SessionKind, TaxForm,
};

/// reqwest client for the workspace-scoped REST API.
///
/// All paths live under `{base_url}/api/v1/workspaces/{workspace_id}`.
pub struct HttpTaxApi {
    base_url: String,
    workspace_prefix: String,
    api_token: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpTaxApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!(
                "{}/{}",
                crate::config::APP_NAME,
                crate::config::APP_VERSION
            ))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let workspace_prefix = format!("{}/api/v1/workspaces/{}", base_url, config.workspace_id);

        Ok(Self {
            base_url,
            workspace_prefix,
            api_token: config.api_token.clone(),
            client,
            timeout_secs: config.request_timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.workspace_prefix, path);
        let builder = self.client.request(method, url);
        match self.api_token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_connect() {
            ApiError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            ApiError::Timeout(self.timeout_secs)
        } else {
            ApiError::Transport(e.to_string())
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "API request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(e))?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Mutating call whose body is either empty or an [`ActionResponse`].
    async fn send_action(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        let response = self.send(builder).await?;
        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if body.trim().is_empty() {
            return Ok(());
        }
        let action: ActionResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        if action.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(
                action.message.unwrap_or_else(|| "no reason given".into()),
            ))
        }
    }
}

#[async_trait]
impl TaxApi for HttpTaxApi {
    async fn upload_document(&self, file: &UploadFile) -> Result<UploadReceipt, ApiError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        tracing::info!(filename = %file.filename, size = file.size(), "Uploading document");
        self.send_json(self.request(Method::POST, "/documents").multipart(form))
            .await
    }

    async fn list_documents(&self) -> Result<Vec<Document>, ApiError> {
        self.send_json(self.request(Method::GET, "/documents")).await
    }

    async fn get_document(&self, id: Uuid) -> Result<Document, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/documents/{id}")))
            .await
    }

    async fn reprocess_document(&self, id: Uuid) -> Result<UploadReceipt, ApiError> {
        self.send_json(self.request(Method::POST, &format!("/documents/{id}/reprocess")))
            .await
    }

    async fn archive_document(&self, id: Uuid) -> Result<(), ApiError> {
        self.send_action(self.request(Method::POST, &format!("/documents/{id}/archive")))
            .await
    }

    async fn delete_document(&self, id: Uuid) -> Result<(), ApiError> {
        self.send_action(self.request(Method::DELETE, &format!("/documents/{id}")))
            .await
    }

    async fn get_extraction(&self, document_id: Uuid) -> Result<ExtractionResult, ApiError> {
        self.send_json(self.request(Method::GET, &format!("/documents/{document_id}/extraction")))
            .await
    }

    async fn put_extraction(
        &self,
        document_id: Uuid,
        fields: &FieldMap,
    ) -> Result<ExtractionResult, ApiError> {
        let body = ExtractionUpdate {
            fields: fields.clone(),
        };
        self.send_json(
            self.request(Method::PUT, &format!("/documents/{document_id}/extraction"))
                .json(&body),
        )
        .await
    }

    async fn list_sessions(&self, kind: SessionKind) -> Result<Vec<ChatSession>, ApiError> {
        self.send_json(self.request(
            Method::GET,
            &format!("/chat/sessions?kind={}", kind.as_str()),
        ))
        .await
    }

    async fn create_session(&self, session: &NewSession) -> Result<ChatSession, ApiError> {
        self.send_json(self.request(Method::POST, "/chat/sessions").json(session))
            .await
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, ApiError> {
        self.send_json(self.request(
            Method::GET,
            &format!("/chat/sessions/{session_id}/messages"),
        ))
        .await
    }

    async fn send_message(
        &self,
        session_id: Uuid,
        message: &NewMessage,
    ) -> Result<SentMessage, ApiError> {
        self.send_json(
            self.request(
                Method::POST,
                &format!("/chat/sessions/{session_id}/messages"),
            )
            .json(message),
        )
        .await
    }

    async fn update_message(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        update: &MessageUpdate,
    ) -> Result<ChatMessage, ApiError> {
        self.send_json(
            self.request(
                Method::PUT,
                &format!("/chat/sessions/{session_id}/messages/{message_id}"),
            )
            .json(update),
        )
        .await
    }

    async fn invoke_agent(
        &self,
        kind: SessionKind,
        session_id: Uuid,
        request: &AgentRequest,
    ) -> Result<ChatMessage, ApiError> {
        tracing::info!(agent = kind.as_str(), session_id = %session_id, "Invoking agent");
        self.send_json(
            self.request(
                Method::POST,
                &format!("/agents/{}/sessions/{session_id}/invoke", kind.as_str()),
            )
            .json(request),
        )
        .await
    }

    async fn list_forms(&self) -> Result<Vec<TaxForm>, ApiError> {
        self.send_json(self.request(Method::GET, "/forms")).await
    }

    async fn batch_forms(&self, request: &BatchRequest) -> Result<BatchOutcome, ApiError> {
        self.send_json(self.request(Method::POST, "/forms/batch").json(request))
            .await
    }

    async fn dashboard_metrics(&self) -> Result<DashboardMetrics, ApiError> {
        self.send_json(self.request(Method::GET, "/dashboard/metrics"))
            .await
    }

    async fn dashboard_activity(&self) -> Result<Vec<ActivityEntry>, ApiError> {
        self.send_json(self.request(Method::GET, "/dashboard/activity"))
            .await
    }

    async fn dashboard_alerts(&self) -> Result<Vec<DashboardAlert>, ApiError> {
        self.send_json(self.request(Method::GET, "/dashboard/alerts"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::extract::{Multipart, Path};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use chrono::Utc;

    use crate::models::{DocumentStatus, ExtractedFieldValue, FieldType};

    const WS: &str = "/api/v1/workspaces/ws-1";

    fn sample_document(id: Uuid) -> Document {
        Document {
            id,
            filename: "w2-2024.pdf".into(),
            file_type: "pdf".into(),
            file_size: 2048,
            status: DocumentStatus::Processing,
            document_type: Some("w2".into()),
            extraction_confidence: None,
            error_message: None,
            created_at: Utc::now(),
            client_id: None,
        }
    }

    fn test_router() -> Router {
        Router::new()
            .route(
                &format!("{WS}/documents"),
                post(|mut multipart: Multipart| async move {
                    let mut name = String::new();
                    let mut size = 0usize;
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        if field.name() == Some("file") {
                            name = field.file_name().unwrap_or_default().to_string();
                            size = field.bytes().await.unwrap().len();
                        }
                    }
                    assert_eq!(name, "w2-2024.pdf");
                    assert_eq!(size, 9);
                    Json(UploadReceipt {
                        document_id: Uuid::nil(),
                        status: DocumentStatus::Pending,
                    })
                }),
            )
            .route(
                &format!("{WS}/documents/:id"),
                get(|Path(id): Path<Uuid>| async move { Json(sample_document(id)) }),
            )
            .route(
                &format!("{WS}/documents/:id/archive"),
                post(|| async {
                    Json(ActionResponse {
                        success: false,
                        message: Some("document is locked for filing".into()),
                    })
                }),
            )
            .route(
                &format!("{WS}/documents/:id/reprocess"),
                post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "ocr backlog") }),
            )
            .route(
                &format!("{WS}/documents/:id/extraction"),
                get(|| async { "{not json" }).put(
                    |Path(id): Path<Uuid>, Json(update): Json<ExtractionUpdate>| async move {
                        Json(ExtractionResult {
                            document_id: id,
                            form_type: "W-2".into(),
                            confidence: 0.9,
                            fields: update.fields,
                            validation_errors: vec![],
                        })
                    },
                ),
            )
            .route(
                &format!("{WS}/forms"),
                get(|headers: HeaderMap| async move {
                    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        Some("Bearer t0ken") => Ok(Json(Vec::<TaxForm>::new())),
                        _ => Err(StatusCode::UNAUTHORIZED),
                    }
                }),
            )
    }

    async fn serve() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, test_router()).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr, token: Option<&str>) -> HttpTaxApi {
        let config = ClientConfig {
            base_url: format!("http://{addr}/"),
            workspace_id: "ws-1".into(),
            api_token: token.map(str::to_string),
            ..ClientConfig::default()
        };
        HttpTaxApi::new(&config).unwrap()
    }

    #[tokio::test]
    async fn upload_sends_multipart_file() {
        let api = client_for(serve().await, None);
        let file = UploadFile::new("w2-2024.pdf", b"%PDF-1.7\n".to_vec());
        let receipt = api.upload_document(&file).await.unwrap();
        assert_eq!(receipt.document_id, Uuid::nil());
        assert_eq!(receipt.status, DocumentStatus::Pending);
    }

    #[tokio::test]
    async fn get_document_decodes_body() {
        let api = client_for(serve().await, None);
        let id = Uuid::new_v4();
        let doc = api.get_document(id).await.unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.status, DocumentStatus::Processing);
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let api = client_for(serve().await, None);
        let err = api.reprocess_document(Uuid::new_v4()).await.unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "ocr backlog");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsuccessful_action_is_rejected() {
        let api = client_for(serve().await, None);
        let err = api.archive_document(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "document is locked for filing"));
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let api = client_for(serve().await, None);
        let err = api.get_extraction(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(!err.is_network());
    }

    #[tokio::test]
    async fn put_extraction_sends_whole_field_map() {
        let api = client_for(serve().await, None);
        let mut fields = FieldMap::new();
        fields.insert(
            "box1_wages".into(),
            ExtractedFieldValue {
                value: "52000.00".into(),
                confidence: 0.62,
                field_type: FieldType::Currency,
                label: "Wages, tips, other comp.".into(),
            },
        );
        let id = Uuid::new_v4();
        let result = api.put_extraction(id, &fields).await.unwrap();
        assert_eq!(result.document_id, id);
        assert_eq!(result.fields, fields);
    }

    #[tokio::test]
    async fn bearer_token_is_attached() {
        let addr = serve().await;
        assert!(client_for(addr, Some("t0ken")).list_forms().await.unwrap().is_empty());
        let err = client_for(addr, None).list_forms().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = client_for(addr, None);
        let err = api.list_documents().await.unwrap_err();
        assert!(err.is_network(), "expected network error, got {err:?}");
    }
}
