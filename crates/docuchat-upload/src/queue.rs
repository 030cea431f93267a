//! Upload queue: admits items and drives their simulated progress.
//!
//! Every uploading item owns one ticker that adds a random increment each
//! tick until the item completes, fails or is removed. Item state changes and
//! their events are published under the items lock, so a removed item never
//! emits again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use rand::Rng;

use docuchat_core::config::UploadConfig;
use docuchat_core::{
    spawn_ticker, EventBus, SessionEvent, SourceKind, TickControl, TickerHandle, UploadId,
    UploadStatus,
};

use crate::cloud::{CloudImportRequest, CloudImportResponse, CloudImporter, CloudPick};
use crate::error::UploadError;
use crate::item::UploadItem;

/// Supplies the per-tick progress increment, in percent.
pub trait IncrementSource: Send + Sync {
    fn next_increment(&self) -> f64;
}

/// Uniform random increment in `[0, max)`.
#[derive(Debug, Clone, Copy)]
pub struct RandomIncrement {
    max: f64,
}

impl RandomIncrement {
    /// A non-finite `max` falls back to the configured default.
    pub fn new(max: f64) -> Self {
        if max.is_finite() {
            return Self { max };
        }
        let fallback = UploadConfig::default().max_increment;
        tracing::warn!(max, fallback, "Non-finite upload increment replaced");
        Self { max: fallback }
    }
}

impl IncrementSource for RandomIncrement {
    fn next_increment(&self) -> f64 {
        if !(self.max.is_finite() && self.max > 0.0) {
            return 0.0;
        }
        rand::rng().random_range(0.0..self.max)
    }
}

/// A file chosen from disk or dropped onto the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub size_bytes: Option<u64>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, size_bytes: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }
}

struct Inner {
    items: Mutex<Vec<UploadItem>>,
    tickers: Mutex<HashMap<UploadId, TickerHandle>>,
    increments: Arc<dyn IncrementSource>,
    tick: Duration,
    events: EventBus,
}

impl Inner {
    fn items(&self) -> MutexGuard<'_, Vec<UploadItem>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tickers(&self) -> MutexGuard<'_, HashMap<UploadId, TickerHandle>> {
        self.tickers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn announce(&self, item: &UploadItem) {
        self.events.publish(SessionEvent::UploadChanged {
            item_id: item.id,
            status: item.status,
            progress_percent: item.progress_percent,
        });
    }

    fn stop_ticker(&self, id: UploadId) -> bool {
        let handle = self.tickers().remove(&id);
        handle.is_some_and(|handle| handle.stop())
    }

    /// One progress tick for `id`.
    fn tick(&self, id: UploadId) -> TickControl {
        let increment = self.increments.next_increment();
        let mut items = self.items();
        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            return TickControl::Stop;
        };
        if item.status != UploadStatus::Uploading {
            return TickControl::Stop;
        }
        let completed = item.advance(increment);
        tracing::trace!(item = %id.short(), progress = item.progress_percent, "Upload tick");
        self.announce(item);
        if completed {
            tracing::info!(item = %id.short(), name = %item.display_name, "Upload completed");
            TickControl::Stop
        } else {
            TickControl::Continue
        }
    }
}

/// Owns the set of tracked upload items.
///
/// Cloning the queue shares the same items.
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field("items", &self.len())
            .field("active_timers", &self.active_timers())
            .finish()
    }
}

impl UploadQueue {
    /// Queue with random increments in `[0, config.max_increment)`.
    pub fn new(config: &UploadConfig, events: EventBus) -> Self {
        Self::with_increments(
            config,
            events,
            Arc::new(RandomIncrement::new(config.max_increment)),
        )
    }

    pub fn with_increments(
        config: &UploadConfig,
        events: EventBus,
        increments: Arc<dyn IncrementSource>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                items: Mutex::new(Vec::new()),
                tickers: Mutex::new(HashMap::new()),
                increments,
                tick: config.tick(),
                events,
            }),
        }
    }

    /// Admit local files. Each starts uploading immediately, independently
    /// of the others; this does not wait for any of them.
    pub fn admit_local_files(&self, files: Vec<LocalFile>) -> Result<Vec<UploadId>, UploadError> {
        files
            .into_iter()
            .map(|file| {
                self.start(UploadItem::pending(
                    file.name,
                    file.size_bytes,
                    SourceKind::LocalFile,
                ))
            })
            .collect()
    }

    /// Admit a URL for ingestion.
    pub fn admit_url(&self, text: &str) -> Result<UploadId, UploadError> {
        let url = text.trim();
        if url.is_empty() {
            tracing::debug!("Empty URL ignored");
            return Err(UploadError::EmptyUrl);
        }
        self.start(UploadItem::pending(url, None, SourceKind::Url))
    }

    /// Record a document the backend already imported from a cloud provider.
    pub fn admit_cloud_result(&self, response: CloudImportResponse) -> UploadId {
        let item = UploadItem::completed(response.file_name, SourceKind::CloudProvider);
        let id = item.id;
        tracing::info!(item = %id.short(), name = %item.display_name, "Cloud document admitted");
        let mut items = self.inner.items();
        self.inner.announce(&item);
        items.push(item);
        id
    }

    /// Forward a cloud pick to the backend and admit the result.
    ///
    /// On failure no item is created.
    pub async fn import_from_cloud(
        &self,
        importer: &dyn CloudImporter,
        project_id: i64,
        pick: CloudPick,
    ) -> Result<UploadId, UploadError> {
        let request = CloudImportRequest::google(project_id, pick);
        match importer.import(&request).await {
            Ok(response) => Ok(self.admit_cloud_result(response)),
            Err(e) => {
                tracing::warn!(file = %request.file_name, error = %e, "Cloud import failed");
                Err(e)
            }
        }
    }

    fn start(&self, mut item: UploadItem) -> Result<UploadId, UploadError> {
        let id = item.id;
        {
            let mut items = self.inner.items();
            self.inner.announce(&item);
            item.begin()?;
            self.inner.announce(&item);
            tracing::info!(
                item = %id.short(),
                name = %item.display_name,
                kind = ?item.source_kind,
                "Upload started"
            );
            items.push(item);
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = spawn_ticker(self.inner.tick, move |_| match weak.upgrade() {
            Some(inner) => inner.tick(id),
            None => TickControl::Stop,
        });

        let mut tickers = self.inner.tickers();
        tickers.retain(|_, handle| !handle.is_stopped());
        tickers.insert(id, handle);
        Ok(id)
    }

    /// Remove an item whatever its status, stopping its progress.
    ///
    /// Returns whether the item was present. Removing twice is harmless.
    pub fn remove_item(&self, id: UploadId) -> bool {
        let removed = {
            let mut items = self.inner.items();
            match items.iter().position(|item| item.id == id) {
                Some(index) => {
                    let item = items.remove(index);
                    self.inner
                        .events
                        .publish(SessionEvent::UploadRemoved { item_id: id });
                    tracing::info!(item = %id.short(), name = %item.display_name, status = %item.status, "Upload removed");
                    true
                }
                None => false,
            }
        };
        if self.inner.stop_ticker(id) {
            tracing::debug!(item = %id.short(), "Upload timer stopped");
        }
        removed
    }

    /// Move an uploading item to `error` and stop its progress.
    pub fn mark_failed(&self, id: UploadId, reason: &str) -> Result<(), UploadError> {
        {
            let mut items = self.inner.items();
            let item = items
                .iter_mut()
                .find(|item| item.id == id)
                .ok_or(UploadError::UnknownItem(id))?;
            item.fail(reason)?;
            tracing::warn!(item = %id.short(), name = %item.display_name, reason, "Upload failed");
            self.inner.announce(item);
        }
        self.inner.stop_ticker(id);
        Ok(())
    }

    /// Snapshot of all items in admission order.
    pub fn items(&self) -> Vec<UploadItem> {
        self.inner.items().clone()
    }

    pub fn get(&self, id: UploadId) -> Option<UploadItem> {
        self.inner.items().iter().find(|item| item.id == id).cloned()
    }

    /// Find the item whose id starts with `prefix`, if exactly one does.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<UploadId> {
        let prefix = prefix.trim().to_ascii_lowercase();
        if prefix.is_empty() {
            return None;
        }
        let items = self.inner.items();
        let mut matches = items
            .iter()
            .filter(|item| item.id.0.simple().to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(item), None) => Some(item.id),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of progress timers still running.
    pub fn active_timers(&self) -> usize {
        self.inner
            .tickers()
            .values()
            .filter(|handle| !handle.is_stopped())
            .count()
    }

    /// Stop every progress timer. Items keep their current state.
    pub fn shutdown(&self) {
        let handles: Vec<TickerHandle> = self.inner.tickers().drain().map(|(_, h)| h).collect();
        let stopped = handles.iter().filter(|handle| handle.stop()).count();
        tracing::debug!(stopped, "Upload queue shut down");
    }
}
