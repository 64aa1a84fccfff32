//! The logical core of the virtual filesystem: a pure, FUSE-independent view over the read cache.
//!
//! This module knows nothing about inodes, file handles, or `fuser`; it only knows how to turn a
//! parsed [`VirtualPath`] into an existence check, a directory listing, or a mutation. The `fuser`
//! trait implementation in [`crate::vfs_bridge`] is the thin adapter that talks to the kernel and
//! delegates every real decision here.

use crate::cache::{
    self, artist_exists, descriptor_exists, genre_exists, get_collage, get_playlist, get_playlist_tracks,
    get_release, get_track, label_exists, list_collage_releases, list_collages, list_new_releases, list_playlists,
    list_releases, list_releases_by_artist, list_releases_by_descriptor, list_releases_by_genre,
    list_releases_by_label, release_within_collage, track_within_playlist, track_within_release, CachedRelease,
    CachedTrack,
};
use crate::common::sanitize_dirname;
use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::sanitize::Sanitizer;
use crate::templates::{evaluate_release_template, evaluate_track_template, PathContext};
use std::collections::HashMap;
use std::collections::HashSet;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

pub const ALL_TRACKS: &str = "!All Tracks";

const BLACKLISTED_PATH_COMPONENTS: &[&str] = &[".git", ".DS_Store", ".Trash", ".Trash-1000", "HEAD", ".envrc"];

/// Which top-level listing a path falls under. Each has its own facet, its own path templates,
/// and (except `Playlists`) an `!All Tracks` pseudo-directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Root,
    Releases,
    ReleasesNew,
    ReleasesAddedOn,
    ReleasesReleasedOn,
    Artists,
    Genres,
    Descriptors,
    Labels,
    Collages,
    Playlists,
}

impl View {
    fn top_level_name(self) -> &'static str {
        match self {
            View::Root => "",
            View::Releases => "1. Releases",
            View::ReleasesNew => "1. Releases - New",
            View::ReleasesAddedOn => "1. Releases - Added On",
            View::ReleasesReleasedOn => "1. Releases - Released On",
            View::Artists => "2. Artists",
            View::Genres => "3. Genres",
            View::Descriptors => "4. Descriptors",
            View::Labels => "5. Labels",
            View::Collages => "6. Collages",
            View::Playlists => "7. Playlists",
        }
    }

    fn from_top_level_name(name: &str) -> Option<View> {
        [
            View::Releases,
            View::ReleasesNew,
            View::ReleasesAddedOn,
            View::ReleasesReleasedOn,
            View::Artists,
            View::Genres,
            View::Descriptors,
            View::Labels,
            View::Collages,
            View::Playlists,
        ]
        .into_iter()
        .find(|v| v.top_level_name() == name)
    }
}

/// A parsed virtual filesystem path. At most one of `artist`/`genre`/`descriptor`/`label`/
/// `collage`/`playlist` is set (the facet). `release` may be the [`ALL_TRACKS`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VirtualPath {
    pub view: Option<View>,
    pub artist: Option<String>,
    pub genre: Option<String>,
    pub descriptor: Option<String>,
    pub label: Option<String>,
    pub collage: Option<String>,
    pub playlist: Option<String>,
    pub release: Option<String>,
    pub file: Option<String>,
}

impl VirtualPath {
    pub fn root() -> VirtualPath {
        VirtualPath { view: Some(View::Root), ..Default::default() }
    }

    /// The path identifying the directory that lists `self`'s releases (clears `release`/`file`).
    pub fn release_parent(&self) -> VirtualPath {
        VirtualPath { release: None, file: None, ..self.clone() }
    }

    /// The path identifying the directory that lists `self`'s tracks (clears `file` only; the
    /// release, which may be [`ALL_TRACKS`], stays).
    pub fn track_parent(&self) -> VirtualPath {
        VirtualPath { file: None, ..self.clone() }
    }

    fn facet(&self) -> Option<&str> {
        self.artist
            .as_deref()
            .or(self.genre.as_deref())
            .or(self.descriptor.as_deref())
            .or(self.label.as_deref())
            .or(self.collage.as_deref())
            .or(self.playlist.as_deref())
    }

    /// Parse a `/`-separated FUSE path into a [`VirtualPath`]. Errors with `FileNotFound` for
    /// anything that doesn't map onto the fixed view hierarchy.
    pub fn parse(path: &str) -> Result<VirtualPath> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Ok(VirtualPath::root());
        }
        if let Some(last) = parts.last() {
            if BLACKLISTED_PATH_COMPONENTS.contains(last) {
                return Err(not_found(path));
            }
        }

        let view = View::from_top_level_name(parts[0]).ok_or_else(|| not_found(path))?;
        let rest = &parts[1..];

        let mut vp = VirtualPath { view: Some(view), ..Default::default() };
        match view {
            View::Releases | View::ReleasesNew | View::ReleasesAddedOn | View::ReleasesReleasedOn => {
                parse_release_like(&mut vp, rest, path)?;
            }
            View::Artists => parse_faceted(&mut vp, rest, path, |vp, v| vp.artist = Some(v))?,
            View::Genres => parse_faceted(&mut vp, rest, path, |vp, v| vp.genre = Some(v))?,
            View::Descriptors => parse_faceted(&mut vp, rest, path, |vp, v| vp.descriptor = Some(v))?,
            View::Labels => parse_faceted(&mut vp, rest, path, |vp, v| vp.label = Some(v))?,
            View::Collages => parse_faceted(&mut vp, rest, path, |vp, v| vp.collage = Some(v))?,
            View::Playlists => parse_playlist(&mut vp, rest, path)?,
            View::Root => return Err(not_found(path)),
        }
        Ok(vp)
    }
}

fn not_found(path: &str) -> RoseError {
    RoseError::Expected(RoseExpectedError::FileNotFound { path: PathBuf::from(path) })
}

fn parse_release_like(vp: &mut VirtualPath, rest: &[&str], path: &str) -> Result<()> {
    match rest.len() {
        0 => Ok(()),
        1 => {
            vp.release = Some(rest[0].to_string());
            Ok(())
        }
        2 => {
            vp.release = Some(rest[0].to_string());
            vp.file = Some(rest[1].to_string());
            Ok(())
        }
        _ => Err(not_found(path)),
    }
}

fn parse_faceted(vp: &mut VirtualPath, rest: &[&str], path: &str, set_facet: impl FnOnce(&mut VirtualPath, String)) -> Result<()> {
    match rest.len() {
        0 => Ok(()),
        1 => {
            set_facet(vp, rest[0].to_string());
            Ok(())
        }
        2 => {
            set_facet(vp, rest[0].to_string());
            vp.release = Some(rest[1].to_string());
            Ok(())
        }
        3 => {
            set_facet(vp, rest[0].to_string());
            vp.release = Some(rest[1].to_string());
            vp.file = Some(rest[2].to_string());
            Ok(())
        }
        _ => Err(not_found(path)),
    }
}

fn parse_playlist(vp: &mut VirtualPath, rest: &[&str], path: &str) -> Result<()> {
    match rest.len() {
        0 => Ok(()),
        1 => {
            vp.playlist = Some(rest[0].to_string());
            Ok(())
        }
        2 => {
            vp.playlist = Some(rest[0].to_string());
            vp.file = Some(rest[1].to_string());
            Ok(())
        }
        _ => Err(not_found(path)),
    }
}

/// A process-wide cache that forgets entries after `ttl` has elapsed. Unlike a typical LRU, there
/// is no active eviction thread; expired entries are simply skipped (and overwritten) on access.
/// This relies on churn staying small, which holds for the handful of (parent, name) keys a VFS
/// session actually touches.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().unwrap();
        let (inserted, value) = entries.get(key)?;
        if inserted.elapsed() > self.ttl {
            return None;
        }
        Some(value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().unwrap().insert(key, (Instant::now(), value));
    }

    pub fn remove(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Whitelist/blacklist membership checks for the Artists/Genres/Descriptors/Labels views.
#[derive(Default)]
pub struct CanShower {
    artists: FacetFilter,
    genres: FacetFilter,
    descriptors: FacetFilter,
    labels: FacetFilter,
}

#[derive(Default)]
struct FacetFilter {
    whitelist: Option<HashSet<String>>,
    blacklist: Option<HashSet<String>>,
}

impl FacetFilter {
    fn new(whitelist: &Option<Vec<String>>, blacklist: &Option<Vec<String>>) -> Self {
        Self {
            whitelist: whitelist.as_ref().map(|v| v.iter().cloned().collect()),
            blacklist: blacklist.as_ref().map(|v| v.iter().cloned().collect()),
        }
    }

    fn allows(&self, name: &str) -> bool {
        if let Some(w) = &self.whitelist {
            return w.contains(name);
        }
        if let Some(b) = &self.blacklist {
            return !b.contains(name);
        }
        true
    }
}

impl CanShower {
    pub fn new(config: &Config) -> Self {
        Self {
            artists: FacetFilter::new(&config.vfs.artists_whitelist, &config.vfs.artists_blacklist),
            genres: FacetFilter::new(&config.vfs.genres_whitelist, &config.vfs.genres_blacklist),
            descriptors: FacetFilter::new(&config.vfs.descriptors_whitelist, &config.vfs.descriptors_blacklist),
            labels: FacetFilter::new(&config.vfs.labels_whitelist, &config.vfs.labels_blacklist),
        }
    }

    pub fn artist(&self, name: &str) -> bool {
        self.artists.allows(name)
    }
    pub fn genre(&self, name: &str) -> bool {
        self.genres.allows(name)
    }
    pub fn descriptor(&self, name: &str) -> bool {
        self.descriptors.allows(name)
    }
    pub fn label(&self, name: &str) -> bool {
        self.labels.allows(name)
    }
}

/// Renders virtual directory/file names for releases and tracks, and remembers every name it has
/// handed out so that a later `lookup_*` can map it back to an entity id — even a couple of hours
/// after the entity's "real" name has since changed underneath it, so a still-open file handle
/// keeps working.
pub struct VirtualNameGenerator {
    release_store: TtlCache<(VirtualPath, String), String>,
    track_store: TtlCache<(VirtualPath, String), String>,
}

const NAME_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 2);

impl Default for VirtualNameGenerator {
    fn default() -> Self {
        Self { release_store: TtlCache::new(NAME_CACHE_TTL), track_store: TtlCache::new(NAME_CACHE_TTL) }
    }
}

impl VirtualNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn release_template<'c>(config: &'c Config, view: View) -> &'c crate::config::TemplateTriad {
        let t = &config.path_templates;
        match view {
            View::Releases => &t.releases,
            View::ReleasesNew => &t.releases_new,
            View::ReleasesAddedOn => &t.releases_added_on,
            View::ReleasesReleasedOn => &t.releases_released_on,
            View::Artists => &t.artists,
            View::Genres => &t.genres,
            View::Descriptors => &t.descriptors,
            View::Labels => &t.labels,
            View::Collages => &t.collages,
            _ => &t.releases,
        }
    }

    fn path_context(parent: &VirtualPath) -> PathContext {
        PathContext {
            artist: parent.artist.clone(),
            genre: parent.genre.clone(),
            descriptor: parent.descriptor.clone(),
            label: parent.label.clone(),
            collage: parent.collage.clone(),
            playlist: parent.playlist.clone(),
        }
    }

    /// Render one virtual name per release under `release_parent`, resolving `[2]`, `[3]`, ...
    /// collisions within the listing and recording `(release_parent, vname) -> release.id`.
    pub fn list_release_paths(
        &self,
        config: &Config,
        release_parent: &VirtualPath,
        releases: &[CachedRelease],
    ) -> Result<Vec<(CachedRelease, String)>> {
        let view = release_parent.view.unwrap_or(View::Releases);
        let template = Self::release_template(config, view);
        let context = Self::path_context(release_parent);
        let mut seen: HashSet<String> = HashSet::from([ALL_TRACKS.to_string()]);
        let prefix_pad_size = releases.len().to_string().len();

        let mut out = Vec::with_capacity(releases.len());
        for (i, release) in releases.iter().enumerate() {
            let position = release_parent
                .collage
                .as_ref()
                .map(|_| format!("{:0width$}", i + 1, width = prefix_pad_size));
            let rendered = evaluate_release_template(template, release, Some(&context), position.as_deref())?;
            let mut vname = sanitize_dirname(config, &rendered, false);
            let mut n = 2;
            while seen.contains(&vname) {
                vname = format!("{rendered} [{n}]");
                vname = sanitize_dirname(config, &vname, false);
                n += 1;
            }
            seen.insert(vname.clone());
            self.release_store.insert((release_parent.clone(), vname.clone()), release.id.clone());
            out.push((release.clone(), vname));
        }
        Ok(out)
    }

    /// Render one virtual name per track under `track_parent` (a release directory, the
    /// `!All Tracks` pseudo-directory, or a playlist), same collision/record behavior as
    /// [`list_release_paths`].
    pub fn list_track_paths(
        &self,
        config: &Config,
        track_parent: &VirtualPath,
        tracks: &[CachedTrack],
    ) -> Result<Vec<(CachedTrack, String)>> {
        let all_tracks = track_parent.release.as_deref() == Some(ALL_TRACKS);
        let is_playlist = track_parent.view == Some(View::Playlists);
        let context = Self::path_context(track_parent);
        let prefix_pad_size = tracks.len().to_string().len();

        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(tracks.len());
        for (i, track) in tracks.iter().enumerate() {
            let template = if is_playlist {
                &config.path_templates.playlists
            } else if all_tracks {
                &config.path_templates.releases.all_tracks
            } else {
                &config.path_templates.releases.track
            };
            let position = track_parent.playlist.as_ref().map(|_| format!("{:0width$}", i + 1, width = prefix_pad_size));
            let rendered = evaluate_track_template(template, track, Some(&context), position.as_deref())?;

            let (stem, suffix) = match rendered.rfind('.') {
                Some(idx) => (rendered[..idx].to_string(), rendered[idx..].to_string()),
                None => (rendered.clone(), String::new()),
            };
            let mut vname = sanitize_dirname(config, &rendered, false);
            let mut n = 2;
            while seen.contains(&vname) {
                vname = sanitize_dirname(config, &format!("{stem} [{n}]{suffix}"), false);
                n += 1;
            }
            seen.insert(vname.clone());
            self.track_store.insert((track_parent.clone(), vname.clone()), track.id.clone());
            out.push((track.clone(), vname));
        }
        Ok(out)
    }

    pub fn lookup_release(&self, release_parent: &VirtualPath, vname: &str) -> Option<String> {
        self.release_store.get(&(release_parent.clone(), vname.to_string()))
    }

    pub fn lookup_track(&self, track_parent: &VirtualPath, vname: &str) -> Option<String> {
        self.track_store.get(&(track_parent.clone(), vname.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
}

/// A `getattr`-equivalent result: enough for the bridge to build a `fuser::FileAttr`.
#[derive(Debug, Clone)]
pub struct Stat {
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: SystemTime,
    /// Set when this entry passes through to a real file on disk (the VFS opens `realpath`
    /// directly rather than synthesizing content).
    pub realpath: Option<PathBuf>,
}

impl Stat {
    fn dir() -> Stat {
        Stat { kind: EntryKind::Dir, size: 4096, mtime: SystemTime::UNIX_EPOCH, realpath: None }
    }

    fn file(realpath: PathBuf) -> Stat {
        let meta = std::fs::metadata(&realpath).ok();
        Stat {
            kind: EntryKind::File,
            size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
            mtime: meta.and_then(|m| m.modified().ok()).unwrap_or(SystemTime::UNIX_EPOCH),
            realpath: Some(realpath),
        }
    }
}

/// The logical core: every VFS decision funnels through here. Holds no FUSE state — inodes, file
/// handles, and kernel-facing caches live in [`crate::vfs_bridge`].
pub struct RoseLogicalCore {
    pub config: Config,
    pub names: VirtualNameGenerator,
    pub sanitizer: Sanitizer,
    pub can_show: CanShower,
}

impl RoseLogicalCore {
    pub fn new(config: Config) -> RoseLogicalCore {
        let can_show = CanShower::new(&config);
        RoseLogicalCore { config, names: VirtualNameGenerator::new(), sanitizer: Sanitizer::new(), can_show }
    }

    fn unsanitize(&self, sanitized: &str, parent: &VirtualPath) -> Result<String> {
        let parent = parent.clone();
        self.sanitizer.unsanitize(sanitized, || self.readdir(&parent).map(|_| ()))
    }

    fn resolve_release_id(&self, release_parent: &VirtualPath, vname: &str) -> Result<String> {
        if let Some(id) = self.names.lookup_release(release_parent, vname) {
            return Ok(id);
        }
        self.readdir_resolved(release_parent)?;
        self.names.lookup_release(release_parent, vname).ok_or_else(|| not_found(vname))
    }

    fn resolve_track_id(&self, track_parent: &VirtualPath, vname: &str) -> Result<String> {
        if let Some(id) = self.names.lookup_track(track_parent, vname) {
            return Ok(id);
        }
        self.readdir_resolved(track_parent)?;
        self.names.lookup_track(track_parent, vname).ok_or_else(|| not_found(vname))
    }

    /// Resolve a release's virtual directory name to its cache id. Exposed for
    /// [`crate::vfs_bridge`], which needs it to figure out which release to refresh in the cache
    /// once a writable open on one of its files closes.
    pub fn resolve_release_id_pub(&self, release_parent: &VirtualPath, vname: &str) -> Result<String> {
        self.resolve_release_id(release_parent, vname)
    }

    /// Track-id equivalent of [`Self::resolve_release_id_pub`].
    pub fn resolve_track_id_pub(&self, track_parent: &VirtualPath, vname: &str) -> Result<String> {
        self.resolve_track_id(track_parent, vname)
    }

    /// The releases to list under `release_parent`, already filtered by its facet.
    fn releases_for(&self, release_parent: &VirtualPath) -> Result<Vec<CachedRelease>> {
        let view = release_parent.view.unwrap_or(View::Releases);
        match view {
            View::Releases => list_releases(&self.config),
            View::ReleasesNew => list_new_releases(&self.config),
            View::ReleasesAddedOn | View::ReleasesReleasedOn => list_releases(&self.config),
            View::Artists => {
                let artist = release_parent.artist.as_deref().unwrap_or_default();
                list_releases_by_artist(&self.config, artist)
            }
            View::Genres => {
                let genre = release_parent.genre.as_deref().unwrap_or_default();
                list_releases_by_genre(&self.config, genre)
            }
            View::Descriptors => {
                let d = release_parent.descriptor.as_deref().unwrap_or_default();
                list_releases_by_descriptor(&self.config, d)
            }
            View::Labels => {
                let l = release_parent.label.as_deref().unwrap_or_default();
                list_releases_by_label(&self.config, l)
            }
            View::Collages => {
                let name = release_parent.collage.as_deref().unwrap_or_default();
                Ok(list_collage_releases(&self.config, name)?.into_iter().map(|(r, _)| r).collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn release_belongs_to_facet(&self, release: &CachedRelease, release_parent: &VirtualPath) -> bool {
        if let Some(artist) = &release_parent.artist {
            return release.releaseartists.all().iter().any(|a| &a.name == artist);
        }
        if let Some(genre) = &release_parent.genre {
            return release.genres.contains(genre)
                || release.secondary_genres.contains(genre)
                || release.parent_genres.contains(genre)
                || release.parent_secondary_genres.contains(genre);
        }
        if let Some(d) = &release_parent.descriptor {
            return release.descriptors.contains(d);
        }
        if let Some(l) = &release_parent.label {
            return release.labels.contains(l);
        }
        true
    }

    /// Resolve the single sanitized facet/collage/playlist name component of `p` (if any) back to
    /// the raw string the cache stores, via the [`Sanitizer`]. Every public entrypoint calls this
    /// exactly once on its way in; internal recursive calls operate on the already-resolved path
    /// directly instead of re-resolving, since a name that's already unsanitized generally isn't
    /// a key in the sanitized→unsanitized map and a second pass would misfire.
    fn resolve(&self, p: &VirtualPath) -> Result<VirtualPath> {
        let mut resolved = p.clone();
        if let Some(playlist) = &p.playlist {
            let parent = VirtualPath { view: Some(View::Playlists), ..Default::default() };
            resolved.playlist = Some(self.unsanitize(playlist, &parent)?);
        } else if let Some(collage) = &p.collage {
            let parent = VirtualPath { view: Some(View::Collages), ..Default::default() };
            resolved.collage = Some(self.unsanitize(collage, &parent)?);
        } else if let Some(artist) = &p.artist {
            let parent = VirtualPath { view: Some(View::Artists), ..Default::default() };
            resolved.artist = Some(self.unsanitize(artist, &parent)?);
        } else if let Some(genre) = &p.genre {
            let parent = VirtualPath { view: Some(View::Genres), ..Default::default() };
            resolved.genre = Some(self.unsanitize(genre, &parent)?);
        } else if let Some(d) = &p.descriptor {
            let parent = VirtualPath { view: Some(View::Descriptors), ..Default::default() };
            resolved.descriptor = Some(self.unsanitize(d, &parent)?);
        } else if let Some(l) = &p.label {
            let parent = VirtualPath { view: Some(View::Labels), ..Default::default() };
            resolved.label = Some(self.unsanitize(l, &parent)?);
        }
        Ok(resolved)
    }

    pub fn getattr(&self, p: &VirtualPath) -> Result<Stat> {
        let resolved = self.resolve(p)?;
        self.getattr_resolved(&resolved)
    }

    fn getattr_resolved(&self, p: &VirtualPath) -> Result<Stat> {
        if let Some(playlist) = &p.playlist {
            let playlist_data = get_playlist(&self.config, playlist)?.ok_or_else(|| not_found(playlist))?;
            if p.file.is_none() {
                return Ok(Stat::dir());
            }
            let file = p.file.as_deref().unwrap();
            if let Some(cover) = &playlist_data.cover_path {
                if Some(file) == cover.file_name().and_then(|f| f.to_str()) {
                    return Ok(Stat::file(cover.clone()));
                }
            }
            let track_parent = p.track_parent();
            let track_id = self.resolve_track_id(&track_parent, file)?;
            if !track_within_playlist(&self.config, &track_id, playlist)? {
                return Err(not_found(file));
            }
            let track = get_track(&self.config, &track_id)?.ok_or_else(|| not_found(&track_id))?;
            return Ok(Stat::file(track.source_path));
        }

        if let Some(collage) = &p.collage {
            get_collage(&self.config, collage)?.ok_or_else(|| not_found(collage))?;
            return self.getattr_under_release_facet(p);
        }
        if let Some(label) = &p.label {
            if !(label_exists(&self.config, label)? && self.can_show.label(label)) {
                return Err(not_found(label));
            }
            return self.getattr_under_release_facet(p);
        }
        if let Some(d) = &p.descriptor {
            if !(descriptor_exists(&self.config, d)? && self.can_show.descriptor(d)) {
                return Err(not_found(d));
            }
            return self.getattr_under_release_facet(p);
        }
        if let Some(genre) = &p.genre {
            if !(genre_exists(&self.config, genre)? && self.can_show.genre(genre)) {
                return Err(not_found(genre));
            }
            return self.getattr_under_release_facet(p);
        }
        if let Some(artist) = &p.artist {
            if !(artist_exists(&self.config, artist)? && self.can_show.artist(artist)) {
                return Err(not_found(artist));
            }
            return self.getattr_under_release_facet(p);
        }
        if p.view.is_some() && p.view != Some(View::Root) {
            return self.getattr_under_release_facet(p);
        }
        if p.view == Some(View::Root) {
            return Ok(Stat::dir());
        }
        Err(not_found("/"))
    }

    fn getattr_under_release_facet(&self, p: &VirtualPath) -> Result<Stat> {
        let Some(release) = &p.release else { return Ok(Stat::dir()) };
        let release_parent = p.release_parent();

        if release.as_str() == ALL_TRACKS {
            if p.file.is_none() {
                return Ok(Stat::dir());
            }
            let track_parent = p.track_parent();
            let track_id = self.resolve_track_id(&track_parent, p.file.as_deref().unwrap())?;
            let track = get_track(&self.config, &track_id)?.ok_or_else(|| not_found(&track_id))?;
            if !self.release_belongs_to_facet(&track.release, &release_parent) {
                return Err(not_found("release no longer in facet"));
            }
            return Ok(Stat::file(track.source_path));
        }

        let release_id = self.resolve_release_id(&release_parent, release)?;
        let release_data = get_release(&self.config, &release_id)?.ok_or_else(|| not_found(&release_id))?;

        if let Some(collage) = &release_parent.collage {
            if !release_within_collage(&self.config, &release_id, collage)? {
                return Err(not_found(&release_id));
            }
        } else if !self.release_belongs_to_facet(&release_data, &release_parent) {
            return Err(not_found(&release_id));
        }

        let Some(file) = &p.file else { return Ok(Stat::dir()) };

        if let Some(cover) = &release_data.cover_image_path {
            if Some(file.as_str()) == cover.file_name().and_then(|f| f.to_str()) {
                return Ok(Stat::file(cover.clone()));
            }
        }
        if cache::STORED_DATA_FILE_REGEX.is_match(file) {
            return Ok(Stat::file(release_data.source_path.join(file)));
        }
        let track_parent = p.track_parent();
        let track_id = self.resolve_track_id(&track_parent, file)?;
        if !track_within_release(&self.config, &track_id, &release_id)? {
            return Err(not_found(file));
        }
        let track = get_track(&self.config, &track_id)?.ok_or_else(|| not_found(&track_id))?;
        Ok(Stat::file(track.source_path))
    }

    pub fn readdir(&self, p: &VirtualPath) -> Result<Vec<(String, Stat)>> {
        let resolved = self.resolve(p)?;
        self.readdir_resolved(&resolved)
    }

    fn readdir_resolved(&self, p: &VirtualPath) -> Result<Vec<(String, Stat)>> {
        self.getattr_resolved(p)?;
        let mut entries = vec![(".".to_string(), Stat::dir()), ("..".to_string(), Stat::dir())];

        if p.view == Some(View::Root) {
            for view in [
                View::Releases,
                View::ReleasesNew,
                View::ReleasesAddedOn,
                View::ReleasesReleasedOn,
                View::Artists,
                View::Genres,
                View::Descriptors,
                View::Labels,
                View::Collages,
                View::Playlists,
            ] {
                entries.push((view.top_level_name().to_string(), Stat::dir()));
            }
            return Ok(entries);
        }

        if p.view == Some(View::Playlists) && p.playlist.is_none() {
            for playlist in list_playlists(&self.config)? {
                let vname = self.sanitizer.sanitize(&self.config, &playlist.name);
                entries.push((vname, Stat::dir()));
            }
            return Ok(entries);
        }
        if let Some(playlist) = &p.playlist {
            let playlist_data = get_playlist(&self.config, playlist)?.ok_or_else(|| not_found(playlist))?;
            if let Some(cover) = &playlist_data.cover_path {
                entries.push((cover.file_name().unwrap().to_string_lossy().into_owned(), Stat::file(cover.clone())));
            }
            let tracks: Vec<CachedTrack> = get_playlist_tracks(&self.config, playlist)?.into_iter().map(|(t, _)| t).collect();
            let track_parent = p.track_parent();
            for (track, vname) in self.names.list_track_paths(&self.config, &track_parent, &tracks)? {
                entries.push((vname, Stat::file(track.source_path)));
            }
            return Ok(entries);
        }

        if p.view == Some(View::Collages) && p.collage.is_none() {
            for collage in list_collages(&self.config)? {
                let vname = self.sanitizer.sanitize(&self.config, &collage.name);
                entries.push((vname, Stat::dir()));
            }
            return Ok(entries);
        }
        for (facet_name, facet_value) in [
            (View::Artists, &p.artist),
            (View::Genres, &p.genre),
            (View::Descriptors, &p.descriptor),
            (View::Labels, &p.label),
        ] {
            if p.view == Some(facet_name) && facet_value.is_none() {
                let names = match facet_name {
                    View::Artists => cache::list_artists(&self.config)?,
                    View::Genres => cache::list_genres(&self.config)?,
                    View::Descriptors => cache::list_descriptors(&self.config)?,
                    View::Labels => cache::list_labels(&self.config)?,
                    _ => unreachable!(),
                };
                for name in names {
                    let vname = self.sanitizer.sanitize(&self.config, &name);
                    entries.push((vname, Stat::dir()));
                }
                return Ok(entries);
            }
        }

        // A release-bearing directory: a facet's release listing, a collage's release listing,
        // or a plain `1. Releases`-family listing.
        if p.release.is_none() {
            let release_parent = p.release_parent();
            let releases = self.releases_for(&release_parent)?;
            entries.push((ALL_TRACKS.to_string(), Stat::dir()));
            for (release, vname) in self.names.list_release_paths(&self.config, &release_parent, &releases)? {
                entries.push((vname, Stat::dir()));
            }
            return Ok(entries);
        }

        // A release directory (or the `!All Tracks` pseudo-directory): list its tracks.
        let release_parent = p.release_parent();
        let tracks: Vec<CachedTrack> = if p.release.as_deref() == Some(ALL_TRACKS) {
            self.releases_for(&release_parent)?
                .into_iter()
                .flat_map(|r| cache::get_tracks_of_release(&self.config, &r.id).unwrap_or_default())
                .map(|(t, _)| t)
                .collect()
        } else {
            let release_id = self.resolve_release_id(&release_parent, p.release.as_deref().unwrap())?;
            let release_data = get_release(&self.config, &release_id)?.ok_or_else(|| not_found(&release_id))?;
            if let Some(cover) = &release_data.cover_image_path {
                entries.push((cover.file_name().unwrap().to_string_lossy().into_owned(), Stat::file(cover.clone())));
            }
            let sidecar_name = format!(".rose.{release_id}.toml");
            entries.push((sidecar_name.clone(), Stat::file(release_data.source_path.join(&sidecar_name))));
            cache::get_tracks_of_release(&self.config, &release_id)?.into_iter().map(|(t, _)| t).collect()
        };
        let track_parent = p.track_parent();
        for (track, vname) in self.names.list_track_paths(&self.config, &track_parent, &tracks)? {
            entries.push((vname, Stat::file(track.source_path)));
        }
        Ok(entries)
    }

    pub fn mkdir(&self, p: &VirtualPath) -> Result<()> {
        if p.view == Some(View::Collages) && p.collage.is_some() && p.release.is_none() {
            let name = self.unsanitize_best_effort(p.collage.as_deref().unwrap(), p);
            crate::collages::create_collage(&self.config, &name)?;
            return Ok(());
        }
        if p.view == Some(View::Playlists) && p.playlist.is_some() {
            let name = self.unsanitize_best_effort(p.playlist.as_deref().unwrap(), p);
            crate::playlists::create_playlist(&self.config, &name)?;
            return Ok(());
        }
        Err(RoseError::Expected(RoseExpectedError::Generic("mkdir not permitted here".to_string())))
    }

    pub fn rmdir(&self, p: &VirtualPath) -> Result<()> {
        if p.view == Some(View::Collages) {
            if let (Some(collage), Some(release)) = (&p.collage, &p.release) {
                let collage_name = self.unsanitize(collage, &VirtualPath { view: Some(View::Collages), ..Default::default() })?;
                let release_parent = p.release_parent();
                let release_id = self.resolve_release_id(&release_parent, release)?;
                crate::collages::remove_release_from_collage(&self.config, &collage_name, &release_id)?;
                return Ok(());
            }
            if let Some(collage) = &p.collage {
                let name = self.unsanitize(collage, &VirtualPath { view: Some(View::Collages), ..Default::default() })?;
                crate::collages::delete_collage(&self.config, &name)?;
                return Ok(());
            }
        }
        if p.view == Some(View::Playlists) {
            if let Some(playlist) = &p.playlist {
                let name = self.unsanitize(playlist, &VirtualPath { view: Some(View::Playlists), ..Default::default() })?;
                crate::playlists::delete_playlist(&self.config, &name)?;
                return Ok(());
            }
        }
        if p.view != Some(View::Collages) && p.release.is_some() && p.release.as_deref() != Some(ALL_TRACKS) {
            let release_parent = p.release_parent();
            let release_id = self.resolve_release_id(&release_parent, p.release.as_deref().unwrap())?;
            crate::releases::delete_release(&self.config, &release_id)?;
            return Ok(());
        }
        Err(RoseError::Expected(RoseExpectedError::Generic("rmdir not permitted here".to_string())))
    }

    pub fn unlink(&self, p: &VirtualPath) -> Result<()> {
        if let (Some(playlist), Some(file)) = (&p.playlist, &p.file) {
            let name = self.unsanitize(playlist, &VirtualPath { view: Some(View::Playlists), ..Default::default() })?;
            if let Some(playlist_data) = get_playlist(&self.config, &name)? {
                if let Some(cover) = &playlist_data.cover_path {
                    if Some(file.as_str()) == cover.file_name().and_then(|f| f.to_str()) {
                        crate::playlists::delete_playlist_cover_art(&self.config, &name)?;
                        return Ok(());
                    }
                }
            }
            let track_parent = p.track_parent();
            let track_id = self.resolve_track_id(&track_parent, file)?;
            crate::playlists::remove_track_from_playlist(&self.config, &name, &track_id)?;
            return Ok(());
        }
        // Everywhere else, `unlink` is a no-op so that `rm -r` finishes via the matching `rmdir`.
        Ok(())
    }

    pub fn rename(&self, old: &VirtualPath, new: &VirtualPath) -> Result<()> {
        if old.view == Some(View::Collages)
            && new.view == Some(View::Collages)
            && old.release.is_none()
            && new.release.is_none()
        {
            let old_name = self.unsanitize(old.collage.as_deref().unwrap(), &VirtualPath { view: Some(View::Collages), ..Default::default() })?;
            let new_name = self.unsanitize_best_effort(new.collage.as_deref().unwrap(), new);
            crate::collages::rename_collage(&self.config, &old_name, &new_name)?;
            return Ok(());
        }
        if old.view == Some(View::Playlists) && new.view == Some(View::Playlists) && old.file.is_none() && new.file.is_none() {
            let old_name = self.unsanitize(old.playlist.as_deref().unwrap(), &VirtualPath { view: Some(View::Playlists), ..Default::default() })?;
            let new_name = self.unsanitize_best_effort(new.playlist.as_deref().unwrap(), new);
            crate::playlists::rename_playlist(&self.config, &old_name, &new_name)?;
            return Ok(());
        }
        Err(RoseError::Expected(RoseExpectedError::Generic("rename not permitted here".to_string())))
    }

    /// Like `unsanitize`, but for a name that may not exist in the cache yet (the destination of
    /// a rename/mkdir) — falls back to the sanitized string itself rather than erroring.
    fn unsanitize_best_effort(&self, sanitized: &str, parent: &VirtualPath) -> String {
        self.unsanitize(sanitized, parent).unwrap_or_else(|_| sanitized.to_string())
    }

    /// What creating a brand-new file at `p` (an `O_CREAT` open against a path with no existing
    /// backing entry) means. The bridge buffers the written bytes in memory and, once the file is
    /// closed, hands them to [`Self::finish_creation`] to actually act on.
    pub fn classify_create(&self, p: &VirtualPath) -> Result<CreationIntent> {
        let resolved = self.resolve(p)?;
        let p = &resolved;

        if let (Some(collage), Some(release), Some(file)) = (&p.collage, &p.release, &p.file) {
            if let Some(caps) = cache::STORED_DATA_FILE_REGEX.captures(file) {
                return Ok(CreationIntent::AddReleaseToCollage {
                    collage: collage.clone(),
                    release_id: caps[1].to_string(),
                });
            }
            let _ = release;
        }

        if let (Some(release), Some(file)) = (&p.release, &p.file) {
            if release.as_str() != ALL_TRACKS && p.collage.is_none() {
                let release_parent = p.release_parent();
                if let Ok(release_id) = self.resolve_release_id(&release_parent, release) {
                    if self.config.valid_cover_arts().iter().any(|c| c.eq_ignore_ascii_case(file)) {
                        let suffix = std::path::Path::new(file).extension().and_then(|e| e.to_str()).unwrap_or("jpg").to_string();
                        return Ok(CreationIntent::NewReleaseCoverArt { release_id, suffix });
                    }
                }
            }
        }

        if let (Some(playlist), Some(file)) = (&p.playlist, &p.file) {
            get_playlist(&self.config, playlist)?.ok_or_else(|| not_found(playlist))?;
            let ext = std::path::Path::new(file).extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase());
            if let Some(ext) = &ext {
                if crate::audiotags::SUPPORTED_AUDIO_EXTENSIONS.contains(&format!(".{ext}").as_str()) {
                    return Ok(CreationIntent::AddTrackToPlaylist { playlist: playlist.clone(), suffix: ext.clone() });
                }
            }
            if self.config.valid_cover_arts().iter().any(|c| c.eq_ignore_ascii_case(file)) {
                let suffix = std::path::Path::new(file).extension().and_then(|e| e.to_str()).unwrap_or("jpg").to_string();
                return Ok(CreationIntent::NewPlaylistCoverArt { playlist: playlist.clone(), suffix });
            }
        }

        Err(RoseError::Expected(RoseExpectedError::Generic(format!("cannot create {p:?}"))))
    }

    /// Act on a buffered file-creation special op once the file handle that collected its bytes
    /// has been closed. A no-op (matching the original's behavior) if no bytes were ever written,
    /// except for a collage addition: the uuid lives in the filename, not the file's contents, so
    /// it fires regardless of what (if anything) got written to the handle.
    pub fn finish_creation(&self, intent: &CreationIntent, bytes: &[u8]) -> Result<()> {
        if let CreationIntent::AddReleaseToCollage { collage, release_id } = intent {
            return crate::collages::add_release_to_collage(&self.config, collage, release_id);
        }
        if bytes.is_empty() {
            return Ok(());
        }
        match intent {
            CreationIntent::AddReleaseToCollage { .. } => unreachable!(),
            CreationIntent::NewReleaseCoverArt { release_id, suffix } => {
                let tmp = tempfile::Builder::new().suffix(&format!(".{suffix}")).tempfile()?;
                std::fs::write(tmp.path(), bytes)?;
                crate::releases::set_release_cover_art(&self.config, release_id, tmp.path())
            }
            CreationIntent::NewPlaylistCoverArt { playlist, suffix } => {
                let tmp = tempfile::Builder::new().suffix(&format!(".{suffix}")).tempfile()?;
                std::fs::write(tmp.path(), bytes)?;
                crate::playlists::set_playlist_cover_art(&self.config, playlist, tmp.path())
            }
            CreationIntent::AddTrackToPlaylist { playlist, suffix } => {
                let tmp = tempfile::Builder::new().suffix(&format!(".{suffix}")).tempfile()?;
                std::fs::write(tmp.path(), bytes)?;
                let tags = crate::audiotags::AudioTags::from_file(tmp.path())?;
                let Some(track_id) = tags.id else {
                    return Err(RoseError::Expected(RoseExpectedError::Generic(
                        "uploaded track has no id3/vorbis/mp4 rose id tag".to_string(),
                    )));
                };
                crate::playlists::add_track_to_playlist(&self.config, playlist, &track_id)
            }
        }
    }
}

/// A decision about what an `O_CREAT` open against a not-yet-existing virtual path is for. See
/// [`RoseLogicalCore::classify_create`] / [`RoseLogicalCore::finish_creation`].
#[derive(Debug, Clone)]
pub enum CreationIntent {
    AddReleaseToCollage { collage: String, release_id: String },
    NewReleaseCoverArt { release_id: String, suffix: String },
    NewPlaylistCoverArt { playlist: String, suffix: String },
    AddTrackToPlaylist { playlist: String, suffix: String },
}
