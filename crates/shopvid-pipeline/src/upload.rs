//! Upload coordinator.
//!
//! Drives one file at a time through allocate, transfer and confirm:
//!
//! ```text
//! Idle -> FileSelected -> RequestingUrl -> TransferringBytes -> Confirming
//!      -> Succeeded | Failed
//! ```
//!
//! Each network step runs under its own deadline and can be interrupted with
//! a [`CancelHandle`]. Nothing is retried automatically; after a failed
//! confirmation the session and its order claim are kept so the operator can
//! confirm again.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

use shopvid_client::{ApiResult, UploadAllocation, VideoApiClient};
use shopvid_models::{
    validate_file, SelectedFile, UploadState, UploadStep, ValidationError, VideoId, VideoRecord,
    VideoStatus,
};

use crate::config::PipelineConfig;
use crate::error::{UploadError, UploadResult};
use crate::logging::OperationLogger;
use crate::metrics::{record_upload_bytes, record_upload_outcome};
use crate::preview::{PreviewHandle, PreviewId, PreviewProvider};
use crate::repository::VideoRepository;

// ============================================================================
// Order locks
// ============================================================================

/// Orders with an upload sequence in flight.
///
/// Clones share the same set, so every coordinator working on the same
/// dashboard should be built with one `OrderLocks`.
#[derive(Debug, Clone, Default)]
pub struct OrderLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an order. `None` if another sequence holds it.
    pub fn try_acquire(&self, order_id: &str) -> Option<OrderGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(order_id.to_string()) {
            return None;
        }
        Some(OrderGuard {
            order_id: order_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_locked(&self, order_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(order_id)
    }
}

/// Releases the order claim on drop.
#[derive(Debug)]
pub struct OrderGuard {
    order_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl OrderGuard {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }
}

impl Drop for OrderGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.order_id);
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cancels the in-flight step of the current sequence from anywhere.
///
/// Once fired, the handle stays cancelled; the coordinator swaps in a fresh
/// one when the next file is selected.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============================================================================
// Session
// ============================================================================

/// Local resources of one upload: the file, its preview, and the allocation
/// once the backend has handed one out.
#[derive(Debug)]
pub struct UploadSession {
    order_id: String,
    file: SelectedFile,
    preview: Option<PreviewHandle>,
    allocation: Option<UploadAllocation>,
    transferred: bool,
    logger: OperationLogger,
}

impl UploadSession {
    fn new(order_id: &str, file: SelectedFile, preview: PreviewHandle) -> Self {
        Self {
            order_id: order_id.to_string(),
            file,
            preview: Some(preview),
            allocation: None,
            transferred: false,
            logger: OperationLogger::new("upload", order_id),
        }
    }

    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn file(&self) -> &SelectedFile {
        &self.file
    }

    pub fn preview_id(&self) -> Option<PreviewId> {
        self.preview.as_ref().map(PreviewHandle::id)
    }

    pub fn allocation(&self) -> Option<&UploadAllocation> {
        self.allocation.as_ref()
    }

    pub fn video_id(&self) -> Option<&VideoId> {
        self.allocation.as_ref().map(|a| &a.video_id)
    }

    pub fn is_transferred(&self) -> bool {
        self.transferred
    }

    fn release_preview(&mut self) {
        if let Some(preview) = self.preview.take() {
            preview.release();
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Orchestrates uploads for one upload widget.
pub struct UploadCoordinator {
    client: VideoApiClient,
    repo: Arc<dyn VideoRepository>,
    previews: Arc<dyn PreviewProvider>,
    locks: OrderLocks,
    config: PipelineConfig,
    state: watch::Sender<UploadState>,
    session: Option<UploadSession>,
    order_guard: Option<OrderGuard>,
    cancel: CancelHandle,
}

impl UploadCoordinator {
    pub fn new(
        client: VideoApiClient,
        repo: Arc<dyn VideoRepository>,
        previews: Arc<dyn PreviewProvider>,
        config: PipelineConfig,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        Self {
            client,
            repo,
            previews,
            locks: OrderLocks::new(),
            config,
            state,
            session: None,
            order_guard: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Share order claims with other coordinators.
    pub fn with_order_locks(mut self, locks: OrderLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn state(&self) -> UploadState {
        self.state.borrow().clone()
    }

    /// Follow state changes, e.g. to re-render the upload widget.
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Pick a file for an order.
    ///
    /// Any previous session is torn down first. The file is validated here,
    /// before anything touches the network.
    pub fn select_file(&mut self, order_id: &str, file: SelectedFile) -> UploadResult<()> {
        if self.state.borrow().is_busy() && self.session.is_some() {
            debug!(order_id, "Replacing active upload session");
        }
        self.teardown();
        if self.cancel.is_cancelled() {
            self.cancel = CancelHandle::new();
        }

        if let Err(e) = validate_file(&file, self.config.max_upload_bytes) {
            let err = UploadError::from(e);
            record_upload_outcome("rejected", "validate");
            self.set_failed(&err);
            return Err(err);
        }

        let preview = PreviewHandle::create(Arc::clone(&self.previews), &file);
        let session = UploadSession::new(order_id, file, preview);
        session.logger.log_start(&format!(
            "selected {} ({} bytes)",
            session.file.name, session.file.size_bytes
        ));
        self.session = Some(session);
        self.set_state(UploadState::FileSelected);
        Ok(())
    }

    /// Allocate a write URL and video id for the selected file.
    pub async fn begin_upload(&mut self) -> UploadResult<UploadAllocation> {
        let (order_id, file) = {
            let state = self.state.borrow();
            match &self.session {
                Some(s) if !state.is_busy() && !state.is_success() => {
                    (s.order_id.clone(), s.file.clone())
                }
                _ => return Err(UploadError::invalid_state("no file selected")),
            }
        };

        // Starting over abandons any pending confirm retry.
        self.order_guard = None;

        let max_bytes = self.config.max_upload_bytes;
        let checked = measure(&file)
            .await
            .and_then(|measured| validate_file(&measured, max_bytes).map(|()| measured));
        let file = match checked {
            Ok(file) => file,
            Err(e) => {
                let err = UploadError::from(e);
                record_upload_outcome("rejected", "validate");
                self.set_failed(&err);
                return Err(err);
            }
        };
        if let Err(err) = self.claim_order(&order_id) {
            self.set_failed(&err);
            return Err(err);
        }

        if let Some(session) = self.session.as_mut() {
            session.file = file;
            session.allocation = None;
            session.transferred = false;
            session.logger.log_step(UploadStep::Allocate);
        }
        self.set_state(UploadState::RequestingUrl);

        let result = self
            .run_step(
                UploadStep::Allocate,
                self.client.request_upload_url(&order_id),
            )
            .await;

        match result {
            Ok(allocation) => {
                info!(
                    order_id = %order_id,
                    video_id = %allocation.video_id,
                    "Upload allocated"
                );
                if let Some(session) = self.session.as_mut() {
                    session.logger.set_video(allocation.video_id.clone());
                    session.allocation = Some(allocation.clone());
                }
                Ok(allocation)
            }
            Err(err) => Err(self.settle(err, UploadStep::Allocate)),
        }
    }

    /// Stream the file to its write URL.
    pub async fn transfer_bytes(&mut self) -> UploadResult<()> {
        let (upload_url, file) = match &self.session {
            Some(UploadSession {
                allocation: Some(allocation),
                transferred: false,
                file,
                ..
            }) if *self.state.borrow() == UploadState::RequestingUrl => {
                (allocation.upload_url.clone(), file.clone())
            }
            _ => return Err(UploadError::invalid_state("no allocation awaiting transfer")),
        };

        if let Some(session) = &self.session {
            session.logger.log_step(UploadStep::Transfer);
        }
        self.set_state(UploadState::TransferringBytes);

        let result = self
            .run_step(
                UploadStep::Transfer,
                self.client.put_file(&upload_url, &file),
            )
            .await;

        match result {
            Ok(()) => {
                record_upload_bytes(file.size_bytes);
                if let Some(session) = self.session.as_mut() {
                    session.transferred = true;
                }
                Ok(())
            }
            Err(err) => Err(self.settle(err, UploadStep::Transfer)),
        }
    }

    /// Mark the transferred video as uploaded.
    ///
    /// Also the manual retry after a failed confirmation. The order claim taken
    /// by [`begin_upload`](Self::begin_upload) is held until the confirmation
    /// goes through or the session is dropped, so a retry cannot be locked out
    /// by another sequence for the same order.
    pub async fn confirm_upload(&mut self) -> UploadResult<VideoId> {
        let (order_id, allocation) = {
            let state = self.state.borrow();
            let retrying = state.failure().is_some_and(|f| f.can_retry_confirm());
            match &self.session {
                Some(UploadSession {
                    allocation: Some(allocation),
                    transferred: true,
                    order_id,
                    ..
                }) if *state == UploadState::TransferringBytes || retrying => {
                    (order_id.clone(), allocation.clone())
                }
                _ => return Err(UploadError::invalid_state("nothing to confirm")),
            }
        };
        let video_id = allocation.video_id.clone();

        // Normally still held from begin_upload.
        if self.order_guard.is_none() {
            self.claim_order(&order_id)?;
        }
        if let Some(session) = &self.session {
            session.logger.log_step(UploadStep::Confirm);
        }
        self.set_state(UploadState::Confirming);

        let result = self
            .run_step(UploadStep::Confirm, self.client.confirm_upload(&allocation))
            .await;

        if let Err(err) = result {
            return Err(self.settle(err, UploadStep::Confirm));
        }

        self.order_guard = None;
        self.sync_confirmed(&order_id, &video_id).await;

        if let Some(mut session) = self.session.take() {
            session
                .logger
                .log_completion(&format!("video {} uploaded", video_id));
            session.release_preview();
        }
        record_upload_outcome("succeeded", UploadStep::Confirm.as_str());
        self.set_state(UploadState::Succeeded {
            video_id: video_id.clone(),
        });
        Ok(video_id)
    }

    /// Select, allocate, transfer and confirm in one go.
    pub async fn run(&mut self, order_id: &str, file: SelectedFile) -> UploadResult<VideoId> {
        self.select_file(order_id, file)?;
        self.begin_upload().await?;
        self.transfer_bytes().await?;
        self.confirm_upload().await
    }

    /// Drop the current sequence and return to `Idle`.
    ///
    /// Bytes already sent to storage stay there. After `Succeeded` this does
    /// nothing.
    pub fn cancel_upload(&mut self) {
        if self.state.borrow().is_success() {
            return;
        }
        if let Some(session) = &self.session {
            session.logger.log_warning("cancelled by operator");
        }
        self.cancel.cancel();
        self.reset_to_idle();
    }

    /// Reload an order's records from the backend into the repository.
    pub async fn refresh_order(&self, order_id: &str) -> ApiResult<Vec<VideoRecord>> {
        let records = self.client.list_by_order(order_id).await?;
        self.repo.replace_order(order_id, records.clone());
        Ok(records)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn run_step<T, F>(&self, step: UploadStep, fut: F) -> UploadResult<T>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let token = self.cancel.token.clone();
        let timeout = self.config.step_timeout;
        let span = self
            .session
            .as_ref()
            .map_or_else(Span::none, |s| s.logger.span());

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(UploadError::Cancelled),
            outcome = tokio::time::timeout(timeout, fut).instrument(span) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(UploadError::from_api(step, e)),
                Err(_) => Err(UploadError::Timeout { step, timeout }),
            },
        }
    }

    /// Make the repository reflect a confirmed upload, even if the listing
    /// could not be fetched.
    async fn sync_confirmed(&self, order_id: &str, video_id: &VideoId) {
        match tokio::time::timeout(self.config.step_timeout, self.refresh_order(order_id)).await {
            Ok(Ok(records)) => debug!(order_id, count = records.len(), "Order refreshed"),
            Ok(Err(e)) => warn!(order_id, error = %e, "Failed to refresh order after upload"),
            Err(_) => warn!(order_id, "Timed out refreshing order after upload"),
        }

        let mut record = match self.repo.get(video_id) {
            Some(existing) if existing.status != VideoStatus::Unknown => return,
            Some(existing) => existing,
            None => VideoRecord::new(video_id.clone(), order_id),
        };
        record.status = VideoStatus::Uploaded;
        self.repo.upsert(record);
    }

    /// Take the order claim. Leaves the upload state alone on failure.
    fn claim_order(&mut self, order_id: &str) -> UploadResult<()> {
        match self.locks.try_acquire(order_id) {
            Some(guard) => {
                self.order_guard = Some(guard);
                Ok(())
            }
            None => {
                record_upload_outcome("rejected", "claim");
                Err(UploadError::OrderBusy(order_id.to_string()))
            }
        }
    }

    /// Apply a step failure to local state and hand the error back.
    fn settle(&mut self, err: UploadError, step: UploadStep) -> UploadError {
        if matches!(err, UploadError::Cancelled) {
            record_upload_outcome("cancelled", step.as_str());
            self.reset_to_idle();
            return err;
        }

        let video_id = self.session.as_ref().and_then(|s| s.video_id().cloned());
        let retryable = err
            .to_failure(video_id)
            .is_some_and(|f| f.can_retry_confirm());
        if !retryable {
            self.order_guard = None;
        }
        if let Some(session) = &self.session {
            session.logger.log_step_failed(step, &err);
            if let Some(video_id) = session.video_id() {
                warn!(
                    video_id = %video_id,
                    order_id = %session.order_id,
                    step = %step,
                    "Allocated video left unconfirmed"
                );
            }
        }
        record_upload_outcome("failed", step.as_str());
        self.set_failed(&err);
        err
    }

    fn set_failed(&mut self, err: &UploadError) {
        let video_id = self.session.as_ref().and_then(|s| s.video_id().cloned());
        if let Some(failure) = err.to_failure(video_id) {
            self.set_state(UploadState::Failed(failure));
        }
    }

    fn set_state(&self, next: UploadState) {
        debug!(state = next.label(), "Upload state changed");
        self.state.send_replace(next);
    }

    fn reset_to_idle(&mut self) {
        self.teardown();
        self.set_state(UploadState::Idle);
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.release_preview();
        }
        self.order_guard = None;
    }
}

/// The selection with its size read from disk instead of the picker.
async fn measure(file: &SelectedFile) -> Result<SelectedFile, ValidationError> {
    let unreadable = |reason: String| ValidationError::Unreadable {
        name: file.name.clone(),
        reason,
    };
    let meta = tokio::fs::metadata(&file.path)
        .await
        .map_err(|e| unreadable(e.to_string()))?;
    if !meta.is_file() {
        return Err(unreadable("not a regular file".to_string()));
    }
    if meta.len() != file.size_bytes {
        debug!(
            file = %file.name,
            declared = file.size_bytes,
            actual = meta.len(),
            "Selected file size differs from the picker"
        );
    }
    Ok(SelectedFile {
        size_bytes: meta.len(),
        ..file.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::PreviewRegistry;
    use crate::repository::InMemoryVideoRepository;
    use shopvid_client::ApiClientConfig;
    use shopvid_models::FailureKind;

    fn coordinator(registry: Arc<PreviewRegistry>) -> UploadCoordinator {
        let client = VideoApiClient::new(ApiClientConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..Default::default()
        })
        .unwrap();
        UploadCoordinator::new(
            client,
            Arc::new(InMemoryVideoRepository::new()),
            registry,
            PipelineConfig::default(),
        )
    }

    fn mp4(size: u64) -> SelectedFile {
        SelectedFile::new("/tmp/clip.mp4", "video/mp4", size)
    }

    fn mp4_on_disk(dir: &tempfile::TempDir, size: usize) -> SelectedFile {
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, vec![0u8; size]).unwrap();
        SelectedFile::new(path, "video/mp4", size as u64)
    }

    #[test]
    fn test_order_locks_are_exclusive() {
        let locks = OrderLocks::new();
        let guard = locks.try_acquire("RO-1").unwrap();
        assert!(locks.try_acquire("RO-1").is_none());
        assert!(locks.try_acquire("RO-2").is_some());

        drop(guard);
        assert!(!locks.is_locked("RO-1"));
        assert!(locks.try_acquire("RO-1").is_some());
    }

    #[test]
    fn test_select_oversized_file_fails_synchronously() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry.clone());

        let err = coordinator
            .select_file("RO-1", mp4(150 * 1024 * 1024))
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));

        let state = coordinator.state();
        assert_eq!(state.failure().unwrap().kind, FailureKind::Validation);
        assert!(coordinator.session().is_none());
        assert_eq!(registry.created_count(), 0);
    }

    #[test]
    fn test_select_non_video_fails() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry);
        let file = SelectedFile::new("/tmp/report.pdf", "application/pdf", 10);
        assert!(coordinator.select_file("RO-1", file).is_err());
    }

    #[test]
    fn test_replacing_file_releases_previous_preview() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry.clone());

        coordinator.select_file("RO-1", mp4(10)).unwrap();
        let first = coordinator.session().unwrap().preview_id().unwrap();

        coordinator.select_file("RO-1", mp4(20)).unwrap();
        let second = coordinator.session().unwrap().preview_id().unwrap();

        assert_eq!(registry.release_count(first), 1);
        assert!(registry.is_live(second));
        assert_eq!(coordinator.state(), UploadState::FileSelected);
    }

    #[test]
    fn test_cancel_resets_and_releases_once() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry.clone());

        coordinator.select_file("RO-1", mp4(10)).unwrap();
        let id = coordinator.session().unwrap().preview_id().unwrap();

        coordinator.cancel_upload();
        coordinator.cancel_upload();

        assert_eq!(coordinator.state(), UploadState::Idle);
        assert_eq!(registry.release_count(id), 1);
    }

    #[test]
    fn test_dropping_coordinator_releases_preview() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry.clone());
        coordinator.select_file("RO-1", mp4(10)).unwrap();

        drop(coordinator);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_steps_out_of_order_are_rejected() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry);

        assert!(matches!(
            coordinator.begin_upload().await,
            Err(UploadError::InvalidState(_))
        ));

        coordinator.select_file("RO-1", mp4(10)).unwrap();
        assert!(matches!(
            coordinator.transfer_bytes().await,
            Err(UploadError::InvalidState(_))
        ));
        assert!(matches!(
            coordinator.confirm_upload().await,
            Err(UploadError::InvalidState(_))
        ));
        assert_eq!(coordinator.state(), UploadState::FileSelected);
    }

    #[tokio::test]
    async fn test_busy_order_fails_fast() {
        let registry = Arc::new(PreviewRegistry::new());
        let locks = OrderLocks::new();
        let _held = locks.try_acquire("RO-1").unwrap();

        let mut coordinator = coordinator(registry).with_order_locks(locks);
        let dir = tempfile::tempdir().unwrap();
        coordinator.select_file("RO-1", mp4_on_disk(&dir, 10)).unwrap();

        let err = coordinator.begin_upload().await.unwrap_err();
        assert!(matches!(err, UploadError::OrderBusy(_)));
        assert_eq!(
            coordinator.state().failure().unwrap().kind,
            FailureKind::OrderBusy
        );
    }

    #[tokio::test]
    async fn test_cancel_handle_interrupts_step() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry.clone());
        let dir = tempfile::tempdir().unwrap();
        coordinator.select_file("RO-1", mp4_on_disk(&dir, 10)).unwrap();

        coordinator.cancel_handle().cancel();
        let err = coordinator.begin_upload().await.unwrap_err();

        assert!(matches!(err, UploadError::Cancelled));
        assert_eq!(coordinator.state(), UploadState::Idle);
        assert_eq!(registry.live_count(), 0);
    }

    #[tokio::test]
    async fn test_actual_file_size_is_checked_before_any_call() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry);
        coordinator.config.max_upload_bytes = 1024;

        let dir = tempfile::tempdir().unwrap();
        let mut file = mp4_on_disk(&dir, 4096);
        file.size_bytes = 100;
        coordinator.select_file("RO-1", file).unwrap();

        let err = coordinator.begin_upload().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Validation(ValidationError::TooLarge { size: 4096, .. })
        ));
        assert_eq!(
            coordinator.state().failure().unwrap().kind,
            FailureKind::Validation
        );
        assert!(!coordinator.locks.is_locked("RO-1"));
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected_at_begin() {
        let registry = Arc::new(PreviewRegistry::new());
        let mut coordinator = coordinator(registry);
        let dir = tempfile::tempdir().unwrap();
        let gone = SelectedFile::new(dir.path().join("gone.mp4"), "video/mp4", 10);
        coordinator.select_file("RO-1", gone).unwrap();

        let err = coordinator.begin_upload().await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Validation(ValidationError::Unreadable { .. })
        ));
    }
}
