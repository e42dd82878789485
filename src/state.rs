//! Shared client state handed to every screen.
//!
//! `DeskState` owns the API handle, the toast queue and the configuration,
//! and builds the per-screen controllers from them. Background pollers are
//! started here so their handles live as long as the state does.

use std::sync::Arc;

use uuid::Uuid;

use crate::api::{ApiError, HttpTaxApi, TaxApi};
use crate::chat::ChatThread;
use crate::config::ClientConfig;
use crate::dashboard::{Dashboard, DashboardRefresher};
use crate::documents::DocumentLibrary;
use crate::forms::FormsBoard;
use crate::models::{ChatSession, SessionKind};
use crate::notify::{NotificationSink, ToastQueue};
use crate::poller::PollerHandle;
use crate::upload::{spawn_status_poller, UploadController};

pub struct DeskState {
    pub config: ClientConfig,
    api: Arc<dyn TaxApi>,
    toasts: Arc<ToastQueue>,
    uploads: Arc<tokio::sync::Mutex<UploadController>>,
    upload_poller: tokio::sync::Mutex<Option<PollerHandle>>,
}

impl DeskState {
    /// State backed by the HTTP API described by `config`.
    pub fn connect(config: ClientConfig) -> Result<Self, ApiError> {
        let api = Arc::new(HttpTaxApi::new(&config)?);
        Ok(Self::with_api(config, api))
    }

    /// State over any [`TaxApi`] implementation.
    pub fn with_api(config: ClientConfig, api: Arc<dyn TaxApi>) -> Self {
        let toasts = Arc::new(ToastQueue::new());
        let uploads = UploadController::new(api.clone(), toasts.clone(), &config);
        tracing::info!(
            base_url = %config.base_url,
            workspace = %config.workspace_id,
            "Client state created"
        );
        Self {
            config,
            api,
            toasts,
            uploads: Arc::new(tokio::sync::Mutex::new(uploads)),
            upload_poller: tokio::sync::Mutex::new(None),
        }
    }

    pub fn api(&self) -> &Arc<dyn TaxApi> {
        &self.api
    }

    pub fn toasts(&self) -> &Arc<ToastQueue> {
        &self.toasts
    }

    fn sink(&self) -> Arc<dyn NotificationSink> {
        self.toasts.clone()
    }

    pub fn uploads(&self) -> &Arc<tokio::sync::Mutex<UploadController>> {
        &self.uploads
    }

    /// Start the upload status poller if it is not running.
    pub async fn start_upload_polling(&self) {
        let mut slot = self.upload_poller.lock().await;
        if slot.as_ref().is_some_and(PollerHandle::is_running) {
            return;
        }
        *slot = Some(spawn_status_poller(
            self.uploads.clone(),
            self.config.poll_interval(),
        ));
    }

    pub async fn stop_upload_polling(&self) {
        if let Some(handle) = self.upload_poller.lock().await.take() {
            handle.shutdown().await;
        }
    }

    pub fn document_library(&self) -> DocumentLibrary {
        DocumentLibrary::new(self.api.clone(), self.sink())
    }

    pub fn forms_board(&self) -> FormsBoard {
        FormsBoard::new(self.api.clone(), self.sink())
    }

    pub fn new_chat(&self, kind: SessionKind, client_id: Option<Uuid>) -> ChatThread {
        ChatThread::new(self.api.clone(), self.sink(), kind, client_id)
    }

    pub fn resume_chat(&self, session: ChatSession) -> ChatThread {
        ChatThread::resume(self.api.clone(), self.sink(), session)
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::new(self.api.clone(), self.sink())
    }

    /// Dashboard refreshed on the configured interval. The caller does the
    /// first load.
    pub fn dashboard_refresher(&self) -> DashboardRefresher {
        let dashboard = Arc::new(tokio::sync::Mutex::new(self.dashboard()));
        DashboardRefresher::start(dashboard, self.config.dashboard_refresh())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockTaxApi, UploadFile};
    use crate::models::DocumentStatus;
    use crate::upload::UploadState;
    use std::time::Duration;

    fn state() -> (Arc<MockTaxApi>, DeskState) {
        let api = Arc::new(MockTaxApi::new());
        let config = ClientConfig {
            poll_interval_secs: 1,
            ..ClientConfig::default()
        };
        (api.clone(), DeskState::with_api(config, api))
    }

    #[tokio::test]
    async fn controllers_share_the_toast_queue() {
        let (_api, state) = state();
        let mut thread = state.new_chat(SessionKind::General, None);
        assert!(thread.send("").await.is_err());
        let mut library = state.document_library();
        assert!(library.delete_selected().await.is_err());
        assert_eq!(state.toasts().len(), 2);
    }

    #[tokio::test]
    async fn upload_polling_can_restart() {
        let (api, state) = state();
        let local_id = {
            let mut uploads = state.uploads().lock().await;
            uploads
                .upload(UploadFile::new("w2.pdf", b"%PDF-1.4".to_vec()))
                .await
                .unwrap()
        };
        let document_id = state
            .uploads()
            .lock()
            .await
            .get(local_id)
            .and_then(|u| u.document_id)
            .unwrap();
        api.set_document_status(document_id, DocumentStatus::Failed, Some("blank page"));

        state.start_upload_polling().await;
        state.start_upload_polling().await;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        state.stop_upload_polling().await;

        let uploads = state.uploads().lock().await;
        assert_eq!(
            uploads.get(local_id).unwrap().state(),
            &UploadState::Failed {
                reason: "blank page".into()
            }
        );
    }

    #[test]
    fn connect_builds_http_client() {
        assert!(DeskState::connect(ClientConfig::default()).is_ok());
    }
}
