//! Watches the music source directory and keeps the read cache in sync with disk.
//!
//! Two concerns are deliberately kept apart: a `notify` watcher thread that only listens for
//! filesystem events and enqueues them, and an event-processing loop that debounces and dispatches
//! them. Collage and playlist changes are handled immediately; a release change is given a short
//! delay before its directory is re-scanned, since a release edit touches several files in
//! sequence (tags, then a cover, then the datafile) and scanning after the first write alone would
//! see a half-finished directory.

use crate::cache_update::{
    update_cache_evict_nonexistent_collages, update_cache_evict_nonexistent_playlists,
    update_cache_evict_nonexistent_releases, update_cache_for_collages, update_cache_for_playlists,
    update_cache_for_releases,
};
use crate::config::Config;
use crate::error::{Result, RoseError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);
const RELEASE_EVENT_DELAY: Duration = Duration::from_secs(2);

/// What a single filesystem path change maps onto in the domain model. At most one variant is
/// produced per raw event; anything outside `!collages/*.toml`, `!playlists/*.toml`, or a release
/// subdirectory is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AffectedEntity {
    Collage(String),
    Playlist(String),
    Release(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ChangeKind {
    CreatedOrModified,
    Removed,
    Renamed,
}

#[derive(Debug, Clone)]
struct WatchEvent {
    kind: ChangeKind,
    entity: AffectedEntity,
}

fn parse_affected_entity(config: &Config, path: &Path) -> Option<AffectedEntity> {
    let relative = path.strip_prefix(&config.music_source_dir).ok()?;
    let mut components = relative.components();
    let first = components.next()?.as_os_str().to_str()?;

    if first == "!collages" {
        let file_name = relative.file_stem()?.to_str()?.to_string();
        if relative.extension().and_then(|e| e.to_str()) != Some("toml") {
            return None;
        }
        return Some(AffectedEntity::Collage(file_name));
    }
    if first == "!playlists" {
        let file_name = relative.file_stem()?.to_str()?.to_string();
        if relative.extension().and_then(|e| e.to_str()) != Some("toml") {
            return None;
        }
        return Some(AffectedEntity::Playlist(file_name));
    }
    Some(AffectedEntity::Release(config.music_source_dir.join(first)))
}

fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Data(_)) => Some(ChangeKind::CreatedOrModified),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        EventKind::Modify(_) => Some(ChangeKind::CreatedOrModified),
        _ => None,
    }
}

fn handle_event(config: &Config, event: &WatchEvent) {
    match (&event.entity, event.kind) {
        (AffectedEntity::Collage(name), ChangeKind::CreatedOrModified) => {
            let _ = update_cache_for_collages(config, Some(vec![name.clone()]), false);
        }
        (AffectedEntity::Collage(_), ChangeKind::Removed) => {
            let _ = update_cache_evict_nonexistent_collages(config);
        }
        (AffectedEntity::Collage(name), ChangeKind::Renamed) => {
            let _ = update_cache_for_collages(config, Some(vec![name.clone()]), false);
            let _ = update_cache_evict_nonexistent_collages(config);
        }
        (AffectedEntity::Playlist(name), ChangeKind::CreatedOrModified) => {
            let _ = update_cache_for_playlists(config, Some(vec![name.clone()]), false);
        }
        (AffectedEntity::Playlist(_), ChangeKind::Removed) => {
            let _ = update_cache_evict_nonexistent_playlists(config);
        }
        (AffectedEntity::Playlist(name), ChangeKind::Renamed) => {
            let _ = update_cache_for_playlists(config, Some(vec![name.clone()]), false);
            let _ = update_cache_evict_nonexistent_playlists(config);
        }
        (AffectedEntity::Release(dir), ChangeKind::CreatedOrModified) => {
            let _ = update_cache_for_releases(config, Some(vec![dir.clone()]), false);
        }
        (AffectedEntity::Release(_), ChangeKind::Removed) => {
            let _ = update_cache_evict_nonexistent_releases(config);
        }
        (AffectedEntity::Release(dir), ChangeKind::Renamed) => {
            let _ = update_cache_for_releases(config, Some(vec![dir.clone()]), false);
            let _ = update_cache_evict_nonexistent_releases(config);
        }
    }
}

/// Reads raw `notify` events off `rx`, debounces by `(entity, kind)` within [`DEBOUNCE_WINDOW`],
/// and dispatches collage/playlist events immediately; release events are delayed
/// [`RELEASE_EVENT_DELAY`] on their own thread so a burst of per-file writes settles before the
/// release directory gets rescanned.
fn event_processor(config: Config, rx: Receiver<WatchEvent>) {
    let mut debounce_times: HashMap<(AffectedEntity, ChangeKind), Instant> = HashMap::new();
    loop {
        let event = match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        };

        let key = (event.entity.clone(), event.kind);
        if let Some(last) = debounce_times.get(&key) {
            if last.elapsed() < DEBOUNCE_WINDOW {
                debug!("Skipped event on {:?} due to debouncer", event.entity);
                continue;
            }
        }
        debounce_times.insert(key, Instant::now());

        match &event.entity {
            AffectedEntity::Collage(name) => {
                debug!("Updating cache in response to {:?} event on collage {name}", event.kind);
                handle_event(&config, &event);
            }
            AffectedEntity::Playlist(name) => {
                debug!("Updating cache in response to {:?} event on playlist {name}", event.kind);
                handle_event(&config, &event);
            }
            AffectedEntity::Release(dir) => {
                debug!("Updating cache in response to {:?} event on release {:?}", event.kind, dir);
                let config = config.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(RELEASE_EVENT_DELAY);
                    handle_event(&config, &event);
                });
            }
        }
    }
}

/// A running watcher: the `notify` filesystem listener plus its background processing thread.
/// Dropping this stops the filesystem listener; the processing thread exits once the channel it
/// reads from disconnects.
pub struct WatcherHandle {
    _fs_watcher: RecommendedWatcher,
    processor: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Blocks until the processing thread exits, which only happens once the filesystem listener
    /// (and with it, the sending half of the event channel) is dropped.
    pub fn join(mut self) {
        if let Some(handle) = self.processor.take() {
            let _ = handle.join();
        }
    }
}

fn start_notify_watcher(config: &Config, tx: Sender<WatchEvent>) -> Result<RecommendedWatcher> {
    let watch_config = config.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!("Filesystem watcher error: {e}");
                return;
            }
        };
        let Some(kind) = classify(&event.kind) else { return };
        for path in &event.paths {
            debug!("Notified of {:?} event for {:?}", event.kind, path);
            let Some(entity) = parse_affected_entity(&watch_config, path) else { continue };
            if tx.send(WatchEvent { kind, entity }).is_err() {
                return;
            }
        }
    })
    .map_err(|e| RoseError::Generic(format!("Failed to start filesystem watcher: {e}")))?;

    watcher
        .watch(&config.music_source_dir, RecursiveMode::Recursive)
        .map_err(|e| RoseError::Generic(format!("Failed to watch {:?}: {e}", config.music_source_dir)))?;
    Ok(watcher)
}

/// Start the cache watcher: a `notify` listener thread plus an event-processing thread. Returns
/// immediately; call [`WatcherHandle::join`] to block the caller (e.g. a `rose cache watch`
/// foreground invocation).
pub fn start_watcher(config: Config) -> Result<WatcherHandle> {
    info!("Starting cache watchdog");
    let (tx, rx) = channel();
    let fs_watcher = start_notify_watcher(&config, tx)?;
    let processor = std::thread::spawn(move || event_processor(config, rx));
    Ok(WatcherHandle { _fs_watcher: fs_watcher, processor: Some(processor) })
}
