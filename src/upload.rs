//! Document upload and processing-status tracking.
//!
//! Each selected file moves through
//! `Idle → Uploading → Processing → Completed | Failed`, and a failed upload
//! only comes back through an explicit `Retrying → Processing`. Processing
//! status is observed by refetching the document on a fixed interval
//! ([`spawn_status_poller`]); nothing is retried automatically.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::api::{TaxApi, UploadFile, UploadReceipt};
use crate::config::ClientConfig;
use crate::error::{InputError, WorkflowError};
use crate::models::{DocumentStatus, ExtractionResult};
use crate::notify::{Notification, NotificationSink};
use crate::poller::{spawn_periodic, PollerHandle};

// ---------------------------------------------------------------------------
// File validation
// ---------------------------------------------------------------------------

/// File kinds the extraction service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Jpeg,
    Png,
    Tiff,
    Heic,
    Csv,
    Spreadsheet,
    PlainText,
}

impl FileKind {
    pub fn needs_ocr(&self) -> bool {
        matches!(
            self,
            Self::Pdf | Self::Jpeg | Self::Png | Self::Tiff | Self::Heic
        )
    }
}

const HEIF_BRANDS: [&[u8]; 8] = [
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

/// Detect the file kind from magic bytes, falling back to the extension for
/// text and spreadsheet formats that have no reliable signature.
pub fn detect_file_kind(file: &UploadFile) -> Option<FileKind> {
    let header = &file.bytes[..file.bytes.len().min(12)];

    let by_magic = match header {
        [0x25, 0x50, 0x44, 0x46, ..] => Some(FileKind::Pdf),
        [0xFF, 0xD8, 0xFF, ..] => Some(FileKind::Jpeg),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(FileKind::Png),
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Some(FileKind::Tiff),
        // HEIC/HEIF: "ftyp" box at offset 4 with an image major brand.
        // MP4 and MOV share the box layout.
        _ if header.len() >= 12
            && &header[4..8] == b"ftyp"
            && HEIF_BRANDS.contains(&&header[8..12]) =>
        {
            Some(FileKind::Heic)
        }
        _ => None,
    };
    if by_magic.is_some() {
        return by_magic;
    }

    let mime = mime_guess::from_path(&file.filename).first()?;
    match mime.essence_str() {
        // xlsx is a zip container
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            if header.starts_with(b"PK\x03\x04") =>
        {
            Some(FileKind::Spreadsheet)
        }
        "text/csv" if is_text(&file.bytes) => Some(FileKind::Csv),
        "text/plain" if is_text(&file.bytes) => Some(FileKind::PlainText),
        _ => None,
    }
}

/// UTF-8 check on the first 8KB. A cut in the middle of a multi-byte
/// sequence at the boundary is tolerated.
fn is_text(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(8192)];
    match std::str::from_utf8(sample) {
        Ok(text) => !text.contains('\0'),
        Err(e) => e.error_len().is_none() && sample.len() == 8192,
    }
}

/// Client-side checks run before anything is sent.
pub fn validate_upload(file: &UploadFile, max_bytes: u64) -> Result<FileKind, InputError> {
    if file.bytes.is_empty() {
        return Err(InputError::EmptyFile(file.filename.clone()));
    }
    if file.size() > max_bytes {
        return Err(InputError::FileTooLarge {
            size_mb: file.size() as f64 / (1024.0 * 1024.0),
            max_mb: max_bytes / (1024 * 1024),
        });
    }
    detect_file_kind(file).ok_or_else(|| InputError::UnsupportedFormat(file.filename.clone()))
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadState {
    Idle,
    Uploading,
    Processing,
    Completed,
    Failed { reason: String },
    Retrying,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    FileSelected,
    /// The server accepted the upload or the reprocess request.
    Acknowledged,
    /// A refetch returned this status (and error message, if any).
    Observed(DocumentStatus, Option<String>),
    /// The upload or reprocess request itself failed.
    RequestFailed(String),
    RetryRequested,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot apply {event} while {from}")]
pub struct TransitionError {
    pub from: &'static str,
    pub event: &'static str,
}

impl UploadState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Retrying => "retrying",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// Next state for `event`, or an error leaving `self` unchanged.
    pub fn apply(&self, event: &UploadEvent) -> Result<UploadState, TransitionError> {
        use UploadEvent as E;

        let next = match (self, event) {
            (Self::Idle, E::FileSelected) => Self::Uploading,
            (Self::Uploading | Self::Retrying, E::Acknowledged) => Self::Processing,
            (Self::Uploading | Self::Retrying, E::RequestFailed(reason)) => Self::Failed {
                reason: reason.clone(),
            },
            (Self::Processing, E::Observed(status, message)) => match status {
                DocumentStatus::Pending | DocumentStatus::Processing => Self::Processing,
                DocumentStatus::Completed => Self::Completed,
                DocumentStatus::Failed => Self::Failed {
                    reason: message
                        .clone()
                        .unwrap_or_else(|| "Processing failed".to_string()),
                },
                DocumentStatus::Archived => Self::Failed {
                    reason: "Document was archived before processing finished".to_string(),
                },
            },
            (Self::Failed { .. }, E::RetryRequested) => Self::Retrying,
            _ => {
                return Err(TransitionError {
                    from: self.name(),
                    event: event.name(),
                })
            }
        };
        Ok(next)
    }
}

impl UploadEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::FileSelected => "file_selected",
            Self::Acknowledged => "acknowledged",
            Self::Observed(..) => "observed",
            Self::RequestFailed(_) => "request_failed",
            Self::RetryRequested => "retry_requested",
        }
    }
}

// ---------------------------------------------------------------------------
// Tracked uploads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TrackedUpload {
    pub local_id: Uuid,
    pub file: UploadFile,
    pub kind: FileKind,
    pub document_id: Option<Uuid>,
    pub extraction: Option<ExtractionResult>,
    pub updated_at: DateTime<Utc>,
    state: UploadState,
    history: Vec<UploadState>,
}

impl TrackedUpload {
    fn new(file: UploadFile, kind: FileKind) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            file,
            kind,
            document_id: None,
            extraction: None,
            updated_at: Utc::now(),
            state: UploadState::Idle,
            history: vec![UploadState::Idle],
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Every state this upload has been in, oldest first.
    pub fn history(&self) -> &[UploadState] {
        &self.history
    }

    fn transition(&mut self, event: UploadEvent) -> Result<bool, TransitionError> {
        let next = self.state.apply(&event)?;
        let changed = next != self.state;
        if changed {
            tracing::info!(
                local_id = %self.local_id,
                from = self.state.name(),
                to = next.name(),
                "Upload state changed"
            );
            self.history.push(next.clone());
            self.state = next;
            self.updated_at = Utc::now();
        }
        Ok(changed)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns every upload started from one screen.
///
/// API failures are reflected in the tracked state and pushed to the
/// notification sink; the `Result` of each method only carries client-side
/// rejections (validation, illegal transitions, unknown ids).
pub struct UploadController {
    api: Arc<dyn TaxApi>,
    notifier: Arc<dyn NotificationSink>,
    max_upload_bytes: u64,
    uploads: Vec<TrackedUpload>,
}

impl UploadController {
    pub fn new(
        api: Arc<dyn TaxApi>,
        notifier: Arc<dyn NotificationSink>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            api,
            notifier,
            max_upload_bytes: config.max_upload_bytes(),
            uploads: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[TrackedUpload] {
        &self.uploads
    }

    pub fn get(&self, local_id: Uuid) -> Option<&TrackedUpload> {
        self.uploads.iter().find(|u| u.local_id == local_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.uploads
            .iter()
            .filter(|u| !u.state.is_terminal() && u.state != UploadState::Idle)
            .count()
    }

    fn index_of(&self, local_id: Uuid) -> Result<usize, WorkflowError> {
        self.uploads
            .iter()
            .position(|u| u.local_id == local_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("upload {local_id}")))
    }

    /// Validate and upload one file. Returns the local id of the tracked entry.
    ///
    /// A file rejected by validation is not tracked. A failed request leaves
    /// the entry in `Failed`, ready for [`retry`](Self::retry).
    pub async fn upload(&mut self, file: UploadFile) -> Result<Uuid, WorkflowError> {
        let kind = match validate_upload(&file, self.max_upload_bytes) {
            Ok(kind) => kind,
            Err(e) => {
                let err = WorkflowError::from(e);
                self.notifier
                    .notify(Notification::failure("File not accepted", &err));
                return Err(err);
            }
        };

        let mut entry = TrackedUpload::new(file, kind);
        entry.transition(UploadEvent::FileSelected)?;
        let local_id = entry.local_id;
        self.uploads.push(entry);

        let idx = self.uploads.len() - 1;
        let result = self.api.upload_document(&self.uploads[idx].file).await;
        self.handle_ack(idx, result).await?;
        Ok(local_id)
    }

    /// Read `path` and [`upload`](Self::upload) it.
    pub async fn upload_path(&mut self, path: &Path) -> Result<Uuid, WorkflowError> {
        let file = match UploadFile::from_path(path) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read upload");
                let err = WorkflowError::from(e);
                self.notifier
                    .notify(Notification::failure("File not readable", &err));
                return Err(err);
            }
        };
        self.upload(file).await
    }

    /// Explicit user retry of a failed upload: reprocess by document id when
    /// the server already has the file, otherwise send the bytes again.
    pub async fn retry(&mut self, local_id: Uuid) -> Result<UploadState, WorkflowError> {
        let requested = self.index_of(local_id).and_then(|idx| {
            self.uploads[idx].transition(UploadEvent::RetryRequested)?;
            Ok(idx)
        });
        let idx = match requested {
            Ok(idx) => idx,
            Err(err) => {
                self.notifier
                    .notify(Notification::failure("Retry not possible", &err));
                return Err(err);
            }
        };

        let result = match self.uploads[idx].document_id {
            Some(document_id) => self.api.reprocess_document(document_id).await,
            None => self.api.upload_document(&self.uploads[idx].file).await,
        };
        self.handle_ack(idx, result).await?;
        Ok(self.uploads[idx].state.clone())
    }

    async fn handle_ack(
        &mut self,
        idx: usize,
        result: Result<UploadReceipt, crate::api::ApiError>,
    ) -> Result<(), WorkflowError> {
        let entry = &mut self.uploads[idx];
        match result {
            Ok(receipt) => {
                entry.document_id = Some(receipt.document_id);
                entry.transition(UploadEvent::Acknowledged)?;
                tracing::info!(
                    local_id = %entry.local_id,
                    document_id = %receipt.document_id,
                    "Upload acknowledged"
                );
                // The server may answer with an outcome already.
                if !receipt.status.is_in_flight() {
                    entry.transition(UploadEvent::Observed(receipt.status, None))?;
                    self.settle(idx, receipt.document_id).await;
                }
            }
            Err(e) => {
                entry.transition(UploadEvent::RequestFailed(e.to_string()))?;
                let err = WorkflowError::from(e);
                self.notifier.notify(Notification::failure(
                    format!("Upload of {} failed", entry.file.filename),
                    &err,
                ));
            }
        }
        Ok(())
    }

    /// Toast a final processing outcome; a completed document gets its
    /// extraction loaded.
    async fn settle(&mut self, idx: usize, document_id: Uuid) {
        let filename = self.uploads[idx].file.filename.clone();
        match self.uploads[idx].state.clone() {
            UploadState::Completed => {
                self.notifier.notify(Notification::success(
                    "Document processed",
                    format!("{filename} is ready for review"),
                ));
                self.load_extraction(idx, document_id).await;
            }
            UploadState::Failed { reason } => {
                self.notifier.notify(Notification::server_error(
                    format!("Processing of {filename} failed"),
                    reason,
                ));
            }
            _ => {}
        }
    }

    /// One refetch pass over every upload still processing.
    ///
    /// A failed refetch is logged and the entry stays `Processing`; the next
    /// pass tries again. Returns how many entries changed state.
    pub async fn poll(&mut self) -> usize {
        let mut changed = 0;

        for idx in 0..self.uploads.len() {
            let Some(document_id) = self.uploads[idx].document_id else {
                continue;
            };
            if self.uploads[idx].state != UploadState::Processing {
                continue;
            }

            let document = match self.api.get_document(document_id).await {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(document_id = %document_id, error = %e, "Status refetch failed");
                    continue;
                }
            };

            let entry = &mut self.uploads[idx];
            match entry.transition(UploadEvent::Observed(
                document.status,
                document.error_message.clone(),
            )) {
                Ok(true) => changed += 1,
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring status update");
                    continue;
                }
            }

            self.settle(idx, document_id).await;
        }

        tracing::debug!(changed, tracked = self.uploads.len(), "Upload poll pass");
        changed
    }

    async fn load_extraction(&mut self, idx: usize, document_id: Uuid) {
        match self.api.get_extraction(document_id).await {
            Ok(result) => self.uploads[idx].extraction = Some(result),
            Err(e) => {
                let err = WorkflowError::from(e);
                self.notifier
                    .notify(Notification::failure("Could not load extracted fields", &err));
            }
        }
    }

    /// Remove an entry from the list. Returns false for unknown ids.
    pub fn dismiss(&mut self, local_id: Uuid) -> bool {
        let before = self.uploads.len();
        self.uploads.retain(|u| u.local_id != local_id);
        self.uploads.len() != before
    }
}

/// Poll `controller` every `interval` in the background.
pub fn spawn_status_poller(
    controller: Arc<tokio::sync::Mutex<UploadController>>,
    interval: Duration,
) -> PollerHandle {
    spawn_periodic("upload-status", interval, move || {
        let controller = controller.clone();
        async move {
            let mut guard = controller.lock().await;
            if guard.in_flight_count() > 0 {
                guard.poll().await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockFailure, MockTaxApi};
    use crate::models::{ExtractedFieldValue, FieldMap, FieldType};
    use crate::notify::{NotificationLevel, ToastQueue};
    use proptest::prelude::*;

    fn pdf(name: &str) -> UploadFile {
        UploadFile::new(name, b"%PDF-1.7\n1 0 obj\n".to_vec())
    }

    fn setup() -> (Arc<MockTaxApi>, Arc<ToastQueue>, UploadController) {
        let api = Arc::new(MockTaxApi::new());
        let toasts = Arc::new(ToastQueue::new());
        let controller = UploadController::new(api.clone(), toasts.clone(), &ClientConfig::default());
        (api, toasts, controller)
    }

    fn extraction_for(document_id: Uuid) -> ExtractionResult {
        let mut fields = FieldMap::new();
        fields.insert(
            "employer_ein".into(),
            ExtractedFieldValue {
                value: "12-3456789".into(),
                confidence: 0.97,
                field_type: FieldType::Ein,
                label: "Employer EIN".into(),
            },
        );
        ExtractionResult {
            document_id,
            form_type: "W-2".into(),
            confidence: 0.97,
            fields,
            validation_errors: vec![],
        }
    }

    // --- file validation ---

    #[test]
    fn detects_magic_bytes_regardless_of_extension() {
        let file = UploadFile::new("scan.dat", vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0]);
        assert_eq!(detect_file_kind(&file), Some(FileKind::Jpeg));
        let file = UploadFile::new("x", vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]);
        assert_eq!(detect_file_kind(&file), Some(FileKind::Png));
        let mut heic = vec![0, 0, 0, 0x18];
        heic.extend_from_slice(b"ftypheic");
        assert_eq!(detect_file_kind(&UploadFile::new("p.heic", heic)), Some(FileKind::Heic));
    }

    #[test]
    fn video_containers_are_not_heic() {
        for brand in [b"isom", b"qt  ", b"3gp4"] {
            let mut bytes = vec![0, 0, 0, 0x20];
            bytes.extend_from_slice(b"ftyp");
            bytes.extend_from_slice(brand);
            bytes.extend_from_slice(&[0; 8]);
            let clip = UploadFile::new("clip.mp4", bytes);
            assert!(detect_file_kind(&clip).is_none());
            assert!(matches!(
                validate_upload(&clip, 1024),
                Err(InputError::UnsupportedFormat(_))
            ));
        }
        let mut heif = vec![0, 0, 0, 0x18];
        heif.extend_from_slice(b"ftypmif1");
        assert_eq!(detect_file_kind(&UploadFile::new("p.heif", heif)), Some(FileKind::Heic));
    }

    #[test]
    fn text_formats_use_extension() {
        let csv = UploadFile::new("ledger.csv", b"date,amount\n2024-01-02,10.00\n".to_vec());
        assert_eq!(detect_file_kind(&csv), Some(FileKind::Csv));
        let txt = UploadFile::new("notes.txt", b"mileage log".to_vec());
        assert_eq!(detect_file_kind(&txt), Some(FileKind::PlainText));
        let xlsx = UploadFile::new("book.xlsx", b"PK\x03\x04rest".to_vec());
        assert_eq!(detect_file_kind(&xlsx), Some(FileKind::Spreadsheet));
    }

    #[test]
    fn rejects_unknown_binary() {
        let exe = UploadFile::new("setup.exe", vec![0x4D, 0x5A, 0x90, 0x00]);
        assert!(matches!(
            validate_upload(&exe, 1024),
            Err(InputError::UnsupportedFormat(_))
        ));
        let fake_csv = UploadFile::new("data.csv", vec![0x00, 0xFF, 0xFE, 0x00]);
        assert!(detect_file_kind(&fake_csv).is_none());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(matches!(
            validate_upload(&UploadFile::new("a.pdf", vec![]), 1024),
            Err(InputError::EmptyFile(_))
        ));
        let big = UploadFile::new("big.pdf", vec![0x25; 3 * 1024 * 1024]);
        assert!(matches!(
            validate_upload(&big, 2 * 1024 * 1024),
            Err(InputError::FileTooLarge { max_mb: 2, .. })
        ));
    }

    // --- state machine ---

    #[test]
    fn happy_path_transitions() {
        let s = UploadState::Idle;
        let s = s.apply(&UploadEvent::FileSelected).unwrap();
        assert_eq!(s, UploadState::Uploading);
        let s = s.apply(&UploadEvent::Acknowledged).unwrap();
        let s = s
            .apply(&UploadEvent::Observed(DocumentStatus::Processing, None))
            .unwrap();
        assert_eq!(s, UploadState::Processing);
        let s = s
            .apply(&UploadEvent::Observed(DocumentStatus::Completed, None))
            .unwrap();
        assert_eq!(s, UploadState::Completed);
    }

    #[test]
    fn failed_cannot_jump_to_completed_or_processing() {
        let failed = UploadState::Failed {
            reason: "ocr".into(),
        };
        assert!(failed
            .apply(&UploadEvent::Observed(DocumentStatus::Completed, None))
            .is_err());
        assert!(failed.apply(&UploadEvent::Acknowledged).is_err());
        let retrying = failed.apply(&UploadEvent::RetryRequested).unwrap();
        assert_eq!(retrying, UploadState::Retrying);
        assert!(retrying
            .apply(&UploadEvent::Observed(DocumentStatus::Completed, None))
            .is_err());
    }

    #[test]
    fn failure_reason_comes_from_server_message() {
        let s = UploadState::Processing
            .apply(&UploadEvent::Observed(
                DocumentStatus::Failed,
                Some("Unreadable scan".into()),
            ))
            .unwrap();
        assert_eq!(
            s,
            UploadState::Failed {
                reason: "Unreadable scan".into()
            }
        );
        let archived = UploadState::Processing
            .apply(&UploadEvent::Observed(DocumentStatus::Archived, None))
            .unwrap();
        assert!(archived.is_failed());
    }

    #[test]
    fn transition_error_names_state_and_event() {
        let err = UploadState::Completed
            .apply(&UploadEvent::RetryRequested)
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot apply retry_requested while completed");
    }

    fn arb_event() -> impl Strategy<Value = UploadEvent> {
        prop_oneof![
            Just(UploadEvent::FileSelected),
            Just(UploadEvent::Acknowledged),
            Just(UploadEvent::RequestFailed("network".into())),
            Just(UploadEvent::RetryRequested),
            prop::sample::select(vec![
                DocumentStatus::Pending,
                DocumentStatus::Processing,
                DocumentStatus::Completed,
                DocumentStatus::Failed,
                DocumentStatus::Archived,
            ])
            .prop_map(|s| UploadEvent::Observed(s, None)),
        ]
    }

    proptest! {
        #[test]
        fn failed_reaches_completed_only_through_retry(events in prop::collection::vec(arb_event(), 0..40)) {
            let mut state = UploadState::Idle;
            let mut path = vec![state.clone()];
            for event in &events {
                if let Ok(next) = state.apply(event) {
                    state = next;
                    path.push(state.clone());
                }
            }
            for window in path.windows(2) {
                if window[0].is_failed() && !window[1].is_failed() {
                    prop_assert_eq!(&window[1], &UploadState::Retrying);
                }
                if window[1] == UploadState::Completed {
                    prop_assert_eq!(&window[0], &UploadState::Processing);
                }
                if window[0] == UploadState::Retrying {
                    prop_assert!(window[1] == UploadState::Processing || window[1].is_failed());
                }
            }
        }
    }

    // --- controller ---

    #[tokio::test]
    async fn upload_poll_complete_loads_extraction() {
        let (api, toasts, mut controller) = setup();
        let local_id = controller.upload(pdf("w2.pdf")).await.unwrap();

        let entry = controller.get(local_id).unwrap();
        assert_eq!(entry.state(), &UploadState::Processing);
        let document_id = entry.document_id.unwrap();

        // Still pending server-side: nothing changes.
        assert_eq!(controller.poll().await, 0);

        api.set_document_status(document_id, DocumentStatus::Completed, None);
        api.set_extraction(extraction_for(document_id));
        assert_eq!(controller.poll().await, 1);

        let entry = controller.get(local_id).unwrap();
        assert_eq!(entry.state(), &UploadState::Completed);
        assert_eq!(entry.extraction.as_ref().unwrap().form_type, "W-2");
        let toasts = toasts.drain();
        assert_eq!(toasts.last().unwrap().level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn invalid_file_is_not_tracked() {
        let (api, toasts, mut controller) = setup();
        let err = controller
            .upload(UploadFile::new("empty.pdf", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Input(InputError::EmptyFile(_))));
        assert!(controller.entries().is_empty());
        assert_eq!(api.call_count("upload_document"), 0);
        assert_eq!(toasts.len(), 1);
    }

    #[tokio::test]
    async fn failed_upload_retries_by_reuploading() {
        let (api, toasts, mut controller) = setup();
        api.fail_next("upload_document", MockFailure::Network);

        let local_id = controller.upload(pdf("1099.pdf")).await.unwrap();
        let entry = controller.get(local_id).unwrap();
        assert!(entry.state().is_failed());
        assert!(entry.document_id.is_none());
        assert_eq!(toasts.drain().len(), 1);

        let state = controller.retry(local_id).await.unwrap();
        assert_eq!(state, UploadState::Processing);
        assert_eq!(api.call_count("upload_document"), 2);
        assert_eq!(api.call_count("reprocess_document"), 0);
    }

    #[tokio::test]
    async fn processing_failure_is_surfaced_and_retried_by_reprocess() {
        let (api, toasts, mut controller) = setup();
        let local_id = controller.upload(pdf("k1.pdf")).await.unwrap();
        let document_id = controller.get(local_id).unwrap().document_id.unwrap();

        api.set_document_status(document_id, DocumentStatus::Failed, Some("Low resolution"));
        controller.poll().await;
        assert_eq!(
            controller.get(local_id).unwrap().state(),
            &UploadState::Failed {
                reason: "Low resolution".into()
            }
        );
        assert_eq!(toasts.drain()[0].level, NotificationLevel::Error);

        // The server finishing on its own does not move a failed entry.
        api.set_document_status(document_id, DocumentStatus::Completed, None);
        assert_eq!(controller.poll().await, 0);
        assert!(controller.get(local_id).unwrap().state().is_failed());

        controller.retry(local_id).await.unwrap();
        assert_eq!(api.call_count("reprocess_document"), 1);
        api.set_document_status(document_id, DocumentStatus::Completed, None);
        api.set_extraction(extraction_for(document_id));
        controller.poll().await;

        let history: Vec<&str> = controller
            .get(local_id)
            .unwrap()
            .history()
            .iter()
            .map(UploadState::name)
            .collect();
        assert_eq!(
            history,
            vec!["idle", "uploading", "processing", "failed", "retrying", "processing", "completed"]
        );
    }

    #[tokio::test]
    async fn failed_retry_request_returns_to_failed() {
        let (api, _toasts, mut controller) = setup();
        let local_id = controller.upload(pdf("k1.pdf")).await.unwrap();
        let document_id = controller.get(local_id).unwrap().document_id.unwrap();
        api.set_document_status(document_id, DocumentStatus::Failed, None);
        controller.poll().await;

        api.fail_next("reprocess_document", MockFailure::Status(503));
        let state = controller.retry(local_id).await.unwrap();
        assert!(state.is_failed());
    }

    #[tokio::test]
    async fn retry_of_processing_entry_is_rejected() {
        let (_api, toasts, mut controller) = setup();
        let local_id = controller.upload(pdf("a.pdf")).await.unwrap();
        let err = controller.retry(local_id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Transition(_)));
        assert_eq!(controller.get(local_id).unwrap().state(), &UploadState::Processing);
        assert_eq!(toasts.len(), 1);
    }

    #[tokio::test]
    async fn refetch_failure_keeps_processing() {
        let (api, toasts, mut controller) = setup();
        let local_id = controller.upload(pdf("a.pdf")).await.unwrap();
        api.fail_next("get_document", MockFailure::Network);
        assert_eq!(controller.poll().await, 0);
        assert_eq!(controller.get(local_id).unwrap().state(), &UploadState::Processing);
        assert!(toasts.is_empty());
    }

    #[tokio::test]
    async fn outcome_in_upload_receipt_is_surfaced() {
        let (api, toasts, mut controller) = setup();
        api.answer_uploads_with(DocumentStatus::Failed);
        let local_id = controller.upload(pdf("blank.pdf")).await.unwrap();
        assert!(controller.get(local_id).unwrap().state().is_failed());
        let drained = toasts.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].level, NotificationLevel::Error);
        assert_eq!(drained[0].title, "Processing of blank.pdf failed");

        api.answer_uploads_with(DocumentStatus::Completed);
        let local_id = controller.upload(pdf("w2.pdf")).await.unwrap();
        assert_eq!(controller.get(local_id).unwrap().state(), &UploadState::Completed);
        assert_eq!(api.call_count("get_extraction"), 1);
        assert_eq!(toasts.drain()[0].level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn completed_reprocess_receipt_loads_extraction() {
        let (api, _toasts, mut controller) = setup();
        let local_id = controller.upload(pdf("k1.pdf")).await.unwrap();
        let document_id = controller.get(local_id).unwrap().document_id.unwrap();
        api.set_document_status(document_id, DocumentStatus::Failed, None);
        controller.poll().await;

        api.set_extraction(extraction_for(document_id));
        api.answer_uploads_with(DocumentStatus::Completed);
        let state = controller.retry(local_id).await.unwrap();
        assert_eq!(state, UploadState::Completed);

        let entry = controller.get(local_id).unwrap();
        assert_eq!(entry.extraction.as_ref().unwrap().form_type, "W-2");
        // Nothing left for the poller.
        assert_eq!(controller.poll().await, 0);
        assert_eq!(api.call_count("get_document"), 1);
    }

    #[tokio::test]
    async fn upload_from_disk() {
        let (_api, toasts, mut controller) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brokerage-1099.pdf");
        std::fs::write(&path, b"%PDF-1.6 statement").unwrap();

        let local_id = controller.upload_path(&path).await.unwrap();
        let entry = controller.get(local_id).unwrap();
        assert_eq!(entry.file.filename, "brokerage-1099.pdf");
        assert_eq!(entry.kind, FileKind::Pdf);

        let missing = dir.path().join("missing.pdf");
        let err = controller.upload_path(&missing).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Io(_)));
        assert_eq!(toasts.len(), 1);
    }

    #[tokio::test]
    async fn dismiss_removes_entry() {
        let (_api, toasts, mut controller) = setup();
        let local_id = controller.upload(pdf("a.pdf")).await.unwrap();
        assert!(controller.dismiss(local_id));
        assert!(!controller.dismiss(local_id));
        assert!(matches!(
            controller.retry(local_id).await,
            Err(WorkflowError::NotFound(_))
        ));
        assert_eq!(toasts.drain()[0].title, "Retry not possible");
    }

    #[tokio::test]
    async fn background_poller_completes_uploads() {
        let (api, _toasts, mut controller) = setup();
        let local_id = controller.upload(pdf("a.pdf")).await.unwrap();
        let document_id = controller.get(local_id).unwrap().document_id.unwrap();
        api.set_document_status(document_id, DocumentStatus::Completed, None);
        api.set_extraction(extraction_for(document_id));

        let controller = Arc::new(tokio::sync::Mutex::new(controller));
        let poller = spawn_status_poller(controller.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        poller.shutdown().await;

        let guard = controller.lock().await;
        assert_eq!(guard.get(local_id).unwrap().state(), &UploadState::Completed);
    }
}
