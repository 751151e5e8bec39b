//! Local preview handles for selected files.
//!
//! A preview is a short-lived local resource (an object URL, a decoded
//! thumbnail) created when a file is picked. [`PreviewHandle`] owns one and
//! releases it exactly once: explicitly through [`PreviewHandle::release`] or
//! implicitly on drop, whichever happens first.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use shopvid_models::SelectedFile;

/// Identifier of a live preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewId(Uuid);

impl PreviewId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PreviewId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PreviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Creates and frees previews.
pub trait PreviewProvider: Send + Sync {
    fn create(&self, file: &SelectedFile) -> PreviewId;

    fn release(&self, id: PreviewId);
}

/// Owned preview. Not `Clone`: there is exactly one owner.
pub struct PreviewHandle {
    id: PreviewId,
    provider: Arc<dyn PreviewProvider>,
    released: bool,
}

impl PreviewHandle {
    pub fn create(provider: Arc<dyn PreviewProvider>, file: &SelectedFile) -> Self {
        let id = provider.create(file);
        debug!(preview_id = %id, file = %file.name, "Preview created");
        Self {
            id,
            provider,
            released: false,
        }
    }

    pub fn id(&self) -> PreviewId {
        self.id
    }

    /// Release now. Consuming the handle makes a second release impossible.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.provider.release(self.id);
            debug!(preview_id = %self.id, "Preview released");
        }
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

/// In-process preview registry.
///
/// Tracks which previews are live and how often each was released, so a
/// double free or a leak shows up in [`PreviewRegistry::release_count`] and
/// [`PreviewRegistry::live_count`].
#[derive(Debug, Default)]
pub struct PreviewRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    live: HashMap<PreviewId, String>,
    releases: HashMap<PreviewId, u32>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .len()
    }

    pub fn is_live(&self, id: PreviewId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .contains_key(&id)
    }

    pub fn release_count(&self, id: PreviewId) -> u32 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .releases
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of previews ever created.
    pub fn created_count(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.live.len() + state.releases.len()
    }
}

impl PreviewProvider for PreviewRegistry {
    fn create(&self, file: &SelectedFile) -> PreviewId {
        let id = PreviewId::new();
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .live
            .insert(id, file.name.clone());
        id
    }

    fn release(&self, id: PreviewId) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.live.remove(&id).is_none() {
            warn!(preview_id = %id, "Release of a preview that is not live");
        }
        *state.releases.entry(id).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> SelectedFile {
        SelectedFile::new("/tmp/clip.mp4", "video/mp4", 1024)
    }

    #[test]
    fn test_explicit_release_happens_once() {
        let registry = Arc::new(PreviewRegistry::new());
        let handle = PreviewHandle::create(registry.clone(), &file());
        let id = handle.id();
        assert!(registry.is_live(id));

        handle.release();
        assert!(!registry.is_live(id));
        assert_eq!(registry.release_count(id), 1);
    }

    #[test]
    fn test_drop_releases() {
        let registry = Arc::new(PreviewRegistry::new());
        let id = {
            let handle = PreviewHandle::create(registry.clone(), &file());
            handle.id()
        };
        assert_eq!(registry.release_count(id), 1);
        assert_eq!(registry.live_count(), 0);
        assert_eq!(registry.created_count(), 1);
    }
}
