// The cache updater: walks the music source directory (or a subset of release directories), reads
// tags off disk, and upserts the read cache to match. See `cache.rs` for the schema this writes
// against and `locking.rs` for the per-release/collage/playlist advisory locks that keep concurrent
// updaters (CLI, watcher, FUSE) from clobbering each other.

use crate::audiotags::{AudioTags, SUPPORTED_AUDIO_EXTENSIONS};
use crate::cache::{
    cached_release_from_view, collage_lock_name, connect, pack_artists, playlist_lock_name,
    process_string_for_fts, release_lock_name, CachedRelease, SQL_ARRAY_DELIMITER,
};
use crate::common::uniq;
use crate::config::Config;
use crate::datafiles::read_or_create_datafile;
use crate::error::Result;
use crate::locking::lock;
use rayon::prelude::*;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

/// Update the read cache to match the data for all releases in the music source directory. Delete
/// any cached releases, collages, or playlists that are no longer present on disk.
pub fn update_cache(config: &Config, force: bool) -> Result<()> {
    update_cache_for_releases(config, None, force)?;
    update_cache_evict_nonexistent_releases(config)?;
    update_cache_for_collages(config, None, force)?;
    update_cache_evict_nonexistent_collages(config)?;
    update_cache_for_playlists(config, None, force)?;
    update_cache_evict_nonexistent_playlists(config)?;
    Ok(())
}

pub fn update_cache_evict_nonexistent_releases(config: &Config) -> Result<()> {
    debug!("Evicting cached releases that are not on disk");

    let mut dirs = Vec::new();
    for entry in fs::read_dir(&config.music_source_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path().canonicalize()?);
        }
    }

    let conn = connect(config)?;
    if dirs.is_empty() {
        let mut stmt = conn.prepare("DELETE FROM releases RETURNING source_path")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let source_path: String = row.get(0)?;
            info!("Evicted missing release {} from cache", source_path);
        }
        return Ok(());
    }
    let placeholders = vec!["?"; dirs.len()].join(",");
    let sql = format!("DELETE FROM releases WHERE source_path NOT IN ({placeholders}) RETURNING source_path");

    let mut stmt = conn.prepare(&sql)?;
    let dir_strs: Vec<String> = dirs.iter().map(|d| d.to_string_lossy().to_string()).collect();
    let query_params: Vec<&dyn rusqlite::ToSql> = dir_strs.iter().map(|s| s as &dyn rusqlite::ToSql).collect();

    let mut rows = stmt.query(&query_params[..])?;
    while let Some(row) = rows.next()? {
        let source_path: String = row.get(0)?;
        info!("Evicted missing release {} from cache", source_path);
    }

    Ok(())
}

/// Update the read cache to match the data for any passed-in releases. If a directory lacks a
/// `.rose.{uuid}.toml` datafile, the datafile is minted and the release is marked new.
pub fn update_cache_for_releases(config: &Config, release_dirs: Option<Vec<PathBuf>>, force: bool) -> Result<()> {
    let release_dirs = match release_dirs {
        Some(dirs) => dirs,
        None => {
            let mut dirs = Vec::new();
            for entry in fs::read_dir(&config.music_source_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    dirs.push(entry.path());
                }
            }
            dirs
        }
    };

    let release_dirs: Vec<PathBuf> = release_dirs
        .into_iter()
        .filter(|d| {
            if let Some(name) = d.file_name().and_then(|n| n.to_str()) {
                name != "!collages" && name != "!playlists" && !config.ignore_release_directories.contains(&name.to_string())
            } else {
                true
            }
        })
        .collect();

    if release_dirs.is_empty() {
        debug!("No-Op: No whitelisted releases passed into update_cache_for_releases");
        return Ok(());
    }

    debug!("Refreshing the read cache for {} releases", release_dirs.len());
    if release_dirs.len() < 10 {
        let names: Vec<String> = release_dirs
            .iter()
            .filter_map(|r| r.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        debug!("Refreshing cached data for {}", names.join(", "));
    }

    // Below a threshold, don't bother spinning up a thread pool: the fan-out cost dominates.
    if release_dirs.len() < 50 {
        for dir in &release_dirs {
            update_cache_for_release(config, dir, force)?;
        }
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_proc.max(1))
        .build()
        .map_err(|e| crate::error::RoseError::Unexpected(format!("Failed to build thread pool: {e}")))?;

    let results: Vec<Result<()>> = pool.install(|| release_dirs.par_iter().map(|dir| update_cache_for_release(config, dir, force)).collect());
    for result in results {
        result?;
    }

    Ok(())
}

fn mtime_to_string(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)?;
    let modified = metadata.modified()?;
    let dur = modified.duration_since(UNIX_EPOCH).unwrap_or_default();
    Ok(format!("{}.{:09}", dur.as_secs(), dur.subsec_nanos()))
}

fn scan_audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let ext_with_dot = format!(".{}", ext.to_lowercase());
        if SUPPORTED_AUDIO_EXTENSIONS.contains(&ext_with_dot.as_str()) {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn find_cover_art(config: &Config, dir: &Path) -> Result<Option<PathBuf>> {
    let valid = config.valid_cover_arts();
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().to_lowercase();
        if valid.iter().any(|v| v.to_lowercase() == filename) {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn parse_track_number(s: &str) -> i32 {
    s.chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().unwrap_or(1)
}

/// Canonical, field-sorted content hashed into a release/track's `metahash`. Deliberately excludes
/// identity fields (`id`, `source_path`, `added_at`) so that renames and re-tagging the same values
/// don't appear as "changed".
#[derive(Serialize)]
struct ReleaseMetahashInput<'a> {
    releasetitle: &'a str,
    releasetype: &'a str,
    releasedate: Option<String>,
    originaldate: Option<String>,
    compositiondate: Option<String>,
    catalognumber: &'a Option<String>,
    edition: &'a Option<String>,
    disctotal: i32,
    new: bool,
    genres: &'a [String],
    secondary_genres: &'a [String],
    descriptors: &'a [String],
    labels: &'a [String],
    releaseartist_names: &'a [String],
    releaseartist_roles: &'a [String],
    cover_image_path: Option<String>,
}

#[derive(Serialize)]
struct TrackMetahashInput<'a> {
    tracktitle: &'a str,
    tracknumber: &'a str,
    tracktotal: i32,
    discnumber: &'a str,
    duration_seconds: i32,
    trackartist_names: &'a [String],
    trackartist_roles: &'a [String],
}

struct TrackData {
    id: String,
    source_path: PathBuf,
    source_mtime: String,
    tracktitle: String,
    tracknumber: String,
    tracktotal: i32,
    discnumber: String,
    duration_seconds: i32,
    trackartist_names: Vec<String>,
    trackartist_roles: Vec<String>,
    metahash: String,
}

/// Processes a single release directory: reads tags (honoring the mtime shortcut unless `force`),
/// aggregates release-level fields, and upserts the release + its tracks into the cache. A release
/// directory with no supported audio files is evicted (if cached) and otherwise ignored, per the
/// "in-progress `cp -r`" accommodation: an empty directory is assumed to still be filling up.
fn update_cache_for_release(config: &Config, dir: &Path, force: bool) -> Result<()> {
    if !dir.is_dir() {
        debug!("Skipping {:?}: not a directory", dir);
        return Ok(());
    }
    let canon = dir.canonicalize()?;
    let audio_files = scan_audio_files(&canon)?;

    let conn = connect(config)?;

    if audio_files.is_empty() {
        let deleted = conn.execute("DELETE FROM releases WHERE source_path = ?1", params![canon.to_string_lossy().to_string()])?;
        if deleted > 0 {
            info!("Evicted empty release directory {:?} from cache", canon);
        }
        return Ok(());
    }

    let (datafile_path, uuid, datafile) = read_or_create_datafile(&canon)?;
    let release_id = uuid.to_string();
    let _lock = lock(config, &release_lock_name(&release_id), 60.0)?;
    let datafile_mtime = mtime_to_string(&datafile_path)?;

    let existing_release: Option<CachedRelease> = {
        let mut stmt = conn.prepare("SELECT * FROM releases_view WHERE id = ?1")?;
        stmt.query_row([&release_id], |row| {
            cached_release_from_view(config, row, false).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
        })
        .optional()?
    };

    let mut existing_tracks: std::collections::HashMap<String, (String, String)> = std::collections::HashMap::new();
    {
        let mut stmt = conn.prepare("SELECT id, source_path, source_mtime FROM tracks WHERE release_id = ?1")?;
        let mut rows = stmt.query([&release_id])?;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let source_path: String = row.get(1)?;
            let source_mtime: String = row.get(2)?;
            existing_tracks.insert(source_path, (id, source_mtime));
        }
    }

    // Fast path: nothing on disk changed since the last scan, and the set of audio files is the same.
    if !force {
        if let Some(existing) = &existing_release {
            if existing.datafile_mtime == datafile_mtime {
                let mut all_unchanged = existing_tracks.len() == audio_files.len();
                if all_unchanged {
                    for f in &audio_files {
                        let key = f.to_string_lossy().to_string();
                        let Some((_, cached_mtime)) = existing_tracks.get(&key) else {
                            all_unchanged = false;
                            break;
                        };
                        let current_mtime = mtime_to_string(f)?;
                        if &current_mtime != cached_mtime {
                            all_unchanged = false;
                            break;
                        }
                    }
                }
                if all_unchanged {
                    debug!("No-Op: release {:?} unchanged since last scan", canon);
                    return Ok(());
                }
            }
        }
    }

    let mut track_data: Vec<TrackData> = Vec::new();
    let mut all_tags: Vec<AudioTags> = Vec::new();

    for f in &audio_files {
        let current_mtime = mtime_to_string(f)?;

        let mut tags = AudioTags::from_file(f)?;

        // ID injection: every track must carry its own id and point back at its release's id.
        let mut needs_flush = false;
        if tags.id.is_none() {
            tags.id = Some(uuid::Uuid::now_v7().to_string());
            needs_flush = true;
        }
        if tags.release_id.as_deref() != Some(release_id.as_str()) {
            tags.release_id = Some(release_id.clone());
            needs_flush = true;
        }
        if needs_flush {
            tags.flush(config, false)?;
        }

        let (artist_names, artist_roles) = pack_artists(&tags.trackartists);
        track_data.push(TrackData {
            id: tags.id.clone().unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
            source_path: f.clone(),
            source_mtime: current_mtime,
            tracktitle: tags.tracktitle.clone().unwrap_or_default(),
            tracknumber: tags.tracknumber.clone().unwrap_or_default(),
            tracktotal: tags.tracktotal.unwrap_or(1),
            discnumber: tags.discnumber.clone().unwrap_or_else(|| "1".to_string()),
            duration_seconds: tags.duration_sec,
            trackartist_names: artist_names,
            trackartist_roles: artist_roles,
            metahash: String::new(), // filled in below, once we know the final field values
        });
        all_tags.push(tags);
    }

    for (data, tags) in track_data.iter_mut().zip(all_tags.iter()) {
        let _ = tags;
        let input = TrackMetahashInput {
            tracktitle: &data.tracktitle,
            tracknumber: &data.tracknumber,
            tracktotal: data.tracktotal,
            discnumber: &data.discnumber,
            duration_seconds: data.duration_seconds,
            trackartist_names: &data.trackartist_names,
            trackartist_roles: &data.trackartist_roles,
        };
        data.metahash = crate::common::sha256_dataclass(&input);
    }

    // Release-level fields are aggregated from the first track (by sorted path) for singular fields,
    // and unioned across all tracks for list fields.
    let first = &all_tags[0];
    let releasetitle = first.releasetitle.clone().unwrap_or_default();
    let releasetype = first.releasetype.clone();
    let releasedate = first.releasedate;
    let originaldate = first.originaldate;
    let compositiondate = first.compositiondate;
    let edition = first.edition.clone();
    let catalognumber = first.catalognumber.clone();
    let releaseartists = first.releaseartists.clone();

    let disctotal = all_tags.iter().map(|t| parse_track_number(t.discnumber.as_deref().unwrap_or("1"))).max().unwrap_or(1);

    let genres = uniq(all_tags.iter().flat_map(|t| t.genre.clone()).collect());
    let secondary_genres = uniq(all_tags.iter().flat_map(|t| t.secondarygenre.clone()).collect());
    let descriptors = uniq(all_tags.iter().flat_map(|t| t.descriptor.clone()).collect());
    let labels = uniq(all_tags.iter().flat_map(|t| t.label.clone()).collect());

    let cover_image_path = find_cover_art(config, &canon)?;

    let (release_artist_names, release_artist_roles) = pack_artists(&releaseartists);

    let metahash_input = ReleaseMetahashInput {
        releasetitle: &releasetitle,
        releasetype: &releasetype,
        releasedate: releasedate.map(|d| d.to_string()),
        originaldate: originaldate.map(|d| d.to_string()),
        compositiondate: compositiondate.map(|d| d.to_string()),
        catalognumber: &catalognumber,
        edition: &edition,
        disctotal,
        new: datafile.new,
        genres: &genres,
        secondary_genres: &secondary_genres,
        descriptors: &descriptors,
        labels: &labels,
        releaseartist_names: &release_artist_names,
        releaseartist_roles: &release_artist_roles,
        cover_image_path: cover_image_path.as_ref().map(|p| p.to_string_lossy().to_string()),
    };
    let metahash = crate::common::sha256_dataclass(&metahash_input);

    if !force {
        if let Some(existing) = &existing_release {
            if existing.metahash == metahash {
                debug!("No-Op: release {:?} content unchanged (metahash match)", canon);
                return Ok(());
            }
        }
    }

    let added_at = existing_release.as_ref().map(|r| r.added_at.clone()).unwrap_or_else(|| datafile.added_at.clone());

    let mut conn = conn;
    let txn = conn.transaction()?;

    txn.execute(
        "INSERT INTO releases (
            id, source_path, cover_image_path, added_at, datafile_mtime, title, releasetype,
            releasedate, originaldate, compositiondate, catalognumber, edition, disctotal, new, metahash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(id) DO UPDATE SET
            source_path = excluded.source_path,
            cover_image_path = excluded.cover_image_path,
            datafile_mtime = excluded.datafile_mtime,
            title = excluded.title,
            releasetype = excluded.releasetype,
            releasedate = excluded.releasedate,
            originaldate = excluded.originaldate,
            compositiondate = excluded.compositiondate,
            catalognumber = excluded.catalognumber,
            edition = excluded.edition,
            disctotal = excluded.disctotal,
            new = excluded.new,
            metahash = excluded.metahash",
        params![
            release_id,
            canon.to_string_lossy().to_string(),
            cover_image_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            added_at,
            datafile_mtime,
            releasetitle,
            releasetype,
            releasedate.map(|d| d.to_string()),
            originaldate.map(|d| d.to_string()),
            compositiondate.map(|d| d.to_string()),
            catalognumber,
            edition,
            disctotal,
            datafile.new,
            metahash,
        ],
    )?;

    txn.execute("DELETE FROM releases_genres WHERE release_id = ?1", params![release_id])?;
    for (i, genre) in genres.iter().enumerate() {
        txn.execute(
            "INSERT INTO releases_genres (release_id, genre, position) VALUES (?1, ?2, ?3)",
            params![release_id, genre, i as i64],
        )?;
    }
    txn.execute("DELETE FROM releases_secondary_genres WHERE release_id = ?1", params![release_id])?;
    for (i, genre) in secondary_genres.iter().enumerate() {
        txn.execute(
            "INSERT INTO releases_secondary_genres (release_id, genre, position) VALUES (?1, ?2, ?3)",
            params![release_id, genre, i as i64],
        )?;
    }
    txn.execute("DELETE FROM releases_descriptors WHERE release_id = ?1", params![release_id])?;
    for (i, descriptor) in descriptors.iter().enumerate() {
        txn.execute(
            "INSERT INTO releases_descriptors (release_id, descriptor, position) VALUES (?1, ?2, ?3)",
            params![release_id, descriptor, i as i64],
        )?;
    }
    txn.execute("DELETE FROM releases_labels WHERE release_id = ?1", params![release_id])?;
    for (i, label) in labels.iter().enumerate() {
        txn.execute(
            "INSERT INTO releases_labels (release_id, label, position) VALUES (?1, ?2, ?3)",
            params![release_id, label, i as i64],
        )?;
    }
    txn.execute("DELETE FROM releases_artists WHERE release_id = ?1", params![release_id])?;
    for (i, (name, role)) in release_artist_names.iter().zip(release_artist_roles.iter()).enumerate() {
        txn.execute(
            "INSERT INTO releases_artists (release_id, artist, role, position) VALUES (?1, ?2, ?3, ?4)",
            params![release_id, name, role, i as i64],
        )?;
    }

    let current_paths: HashSet<String> = track_data.iter().map(|t| t.source_path.to_string_lossy().to_string()).collect();
    for (source_path, (track_id, _)) in &existing_tracks {
        if !current_paths.contains(source_path) {
            txn.execute("DELETE FROM tracks WHERE id = ?1", params![track_id])?;
            txn.execute("DELETE FROM rules_engine_fts WHERE rowid = (SELECT rowid FROM tracks WHERE id = ?1)", params![track_id]).ok();
        }
    }

    for data in &track_data {
        txn.execute(
            "INSERT INTO tracks (
                id, source_path, source_mtime, title, release_id, tracknumber, tracktotal,
                discnumber, duration_seconds, metahash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                source_path = excluded.source_path,
                source_mtime = excluded.source_mtime,
                title = excluded.title,
                release_id = excluded.release_id,
                tracknumber = excluded.tracknumber,
                tracktotal = excluded.tracktotal,
                discnumber = excluded.discnumber,
                duration_seconds = excluded.duration_seconds,
                metahash = excluded.metahash",
            params![
                data.id,
                data.source_path.to_string_lossy().to_string(),
                data.source_mtime,
                data.tracktitle,
                release_id,
                data.tracknumber,
                data.tracktotal,
                data.discnumber,
                data.duration_seconds,
                data.metahash,
            ],
        )?;

        txn.execute("DELETE FROM tracks_artists WHERE track_id = ?1", params![data.id])?;
        for (i, (name, role)) in data.trackartist_names.iter().zip(data.trackartist_roles.iter()).enumerate() {
            txn.execute(
                "INSERT INTO tracks_artists (track_id, artist, role, position) VALUES (?1, ?2, ?3, ?4)",
                params![data.id, name, role, i as i64],
            )?;
        }

        let rowid: i64 = txn.query_row("SELECT rowid FROM tracks WHERE id = ?1", params![data.id], |row| row.get(0))?;
        txn.execute("DELETE FROM rules_engine_fts WHERE rowid = ?1", params![rowid])?;
        txn.execute(
            "INSERT INTO rules_engine_fts (
                rowid, tracktitle, tracknumber, tracktotal, discnumber, disctotal, releasetitle,
                releasetype, releasedate, originaldate, compositiondate, catalognumber, edition, new,
                genre, secondarygenre, descriptor, label, releaseartist, trackartist
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                rowid,
                process_string_for_fts(&data.tracktitle),
                process_string_for_fts(&data.tracknumber),
                process_string_for_fts(&data.tracktotal.to_string()),
                process_string_for_fts(&data.discnumber),
                process_string_for_fts(&disctotal.to_string()),
                process_string_for_fts(&releasetitle),
                process_string_for_fts(&releasetype),
                process_string_for_fts(&releasedate.map(|d| d.to_string()).unwrap_or_default()),
                process_string_for_fts(&originaldate.map(|d| d.to_string()).unwrap_or_default()),
                process_string_for_fts(&compositiondate.map(|d| d.to_string()).unwrap_or_default()),
                process_string_for_fts(&catalognumber.clone().unwrap_or_default()),
                process_string_for_fts(&edition.clone().unwrap_or_default()),
                process_string_for_fts(&datafile.new.to_string()),
                process_string_for_fts(&genres.join(SQL_ARRAY_DELIMITER)),
                process_string_for_fts(&secondary_genres.join(SQL_ARRAY_DELIMITER)),
                process_string_for_fts(&descriptors.join(SQL_ARRAY_DELIMITER)),
                process_string_for_fts(&labels.join(SQL_ARRAY_DELIMITER)),
                process_string_for_fts(&release_artist_names.join(SQL_ARRAY_DELIMITER)),
                process_string_for_fts(&data.trackartist_names.join(SQL_ARRAY_DELIMITER)),
            ],
        )?;
    }

    txn.commit()?;
    info!("Updated cached data for release {:?}", canon);

    Ok(())
}

pub(crate) fn collage_path(config: &Config, name: &str) -> PathBuf {
    config.music_source_dir.join("!collages").join(format!("{name}.toml"))
}

pub(crate) fn playlist_path(config: &Config, name: &str) -> PathBuf {
    config.music_source_dir.join("!playlists").join(format!("{name}.toml"))
}

#[derive(Debug, serde::Deserialize, serde::Serialize, Default)]
pub(crate) struct CollageEntry {
    pub(crate) uuid: String,
    pub(crate) description_meta: String,
    #[serde(default)]
    pub(crate) missing: bool,
}

#[derive(Debug, serde::Deserialize, serde::Serialize, Default)]
pub(crate) struct CollageToml {
    #[serde(default)]
    pub(crate) releases: Vec<CollageEntry>,
}

#[derive(Debug, serde::Deserialize, serde::Serialize, Default)]
pub(crate) struct PlaylistEntry {
    pub(crate) uuid: String,
    pub(crate) description_meta: String,
    #[serde(default)]
    pub(crate) missing: bool,
}

#[derive(Debug, serde::Deserialize, serde::Serialize, Default)]
pub(crate) struct PlaylistToml {
    #[serde(default)]
    pub(crate) tracks: Vec<PlaylistEntry>,
}

fn release_exists(conn: &Connection, release_id: &str) -> Result<bool> {
    Ok(conn.query_row("SELECT EXISTS(SELECT 1 FROM releases WHERE id = ?1)", params![release_id], |row| row.get::<_, bool>(0))?)
}

fn track_exists(conn: &Connection, track_id: &str) -> Result<bool> {
    Ok(conn.query_row("SELECT EXISTS(SELECT 1 FROM tracks WHERE id = ?1)", params![track_id], |row| row.get::<_, bool>(0))?)
}

/// Refreshes the cache rows for the named collages (or every `!collages/*.toml` file if `None`).
/// Entries whose release no longer exists are kept in the file but flagged `missing = true`, rather
/// than pruned outright, so that a release that's merely unmounted or in the process of being
/// restored doesn't silently lose its place in the collage.
pub fn update_cache_for_collages(config: &Config, collage_names: Option<Vec<String>>, force: bool) -> Result<()> {
    let collages_dir = config.music_source_dir.join("!collages");
    if !collages_dir.is_dir() {
        return Ok(());
    }

    let names = match collage_names {
        Some(names) => names,
        None => {
            let mut names = Vec::new();
            for entry in fs::read_dir(&collages_dir)? {
                let entry = entry?;
                if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                    if entry.path().extension().and_then(|e| e.to_str()) == Some("toml") {
                        names.push(stem.to_string());
                    }
                }
            }
            names
        }
    };

    for name in names {
        update_cache_for_collage(config, &name, force)?;
    }
    Ok(())
}

fn update_cache_for_collage(config: &Config, name: &str, force: bool) -> Result<()> {
    let path = collage_path(config, name);
    if !path.is_file() {
        debug!("Skipping collage {:?}: file does not exist", name);
        return Ok(());
    }

    let _lock = lock(config, &collage_lock_name(name), 60.0)?;
    let source_mtime = mtime_to_string(&path)?;

    let conn = connect(config)?;

    if !force {
        let existing_mtime: Option<String> = conn
            .query_row("SELECT source_mtime FROM collages WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        if existing_mtime.as_deref() == Some(source_mtime.as_str()) {
            debug!("No-Op: collage {:?} unchanged since last scan", name);
            return Ok(());
        }
    }

    let contents = fs::read_to_string(&path)?;
    let mut data: CollageToml = toml::from_str(&contents).unwrap_or_default();

    let mut changed = false;
    for entry in &mut data.releases {
        let exists = release_exists(&conn, &entry.uuid)?;
        if entry.missing == exists {
            entry.missing = !exists;
            changed = true;
        }
    }
    if changed {
        let serialized = toml::to_string_pretty(&data)?;
        fs::write(&path, serialized)?;
    }

    conn.execute(
        "INSERT INTO collages (name, source_mtime) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET source_mtime = excluded.source_mtime",
        params![name, source_mtime],
    )?;
    conn.execute("DELETE FROM collages_releases WHERE collage_name = ?1", params![name])?;
    for (i, entry) in data.releases.iter().enumerate() {
        conn.execute(
            "INSERT INTO collages_releases (collage_name, release_id, position, missing) VALUES (?1, ?2, ?3, ?4)",
            params![name, entry.uuid, i as i64, entry.missing],
        )?;
    }

    info!("Updated cached data for collage {:?}", name);
    Ok(())
}

pub fn update_cache_evict_nonexistent_collages(config: &Config) -> Result<()> {
    debug!("Evicting cached collages that are not on disk");
    let collages_dir = config.music_source_dir.join("!collages");
    let mut names = Vec::new();
    if collages_dir.is_dir() {
        for entry in fs::read_dir(&collages_dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("toml") {
                if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
    }

    let conn = connect(config)?;
    if names.is_empty() {
        let mut stmt = conn.prepare("DELETE FROM collages RETURNING name")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            info!("Evicted missing collage {} from cache", name);
        }
        return Ok(());
    }
    let placeholders = vec!["?"; names.len()].join(",");
    let sql = format!("DELETE FROM collages WHERE name NOT IN ({placeholders}) RETURNING name");
    let mut stmt = conn.prepare(&sql)?;
    let query_params: Vec<&dyn rusqlite::ToSql> = names.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    let mut rows = stmt.query(&query_params[..])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        info!("Evicted missing collage {} from cache", name);
    }
    Ok(())
}

/// Refreshes the cache rows for the named playlists (or every `!playlists/*.toml` file if `None`).
/// Same missing-entry semantics as collages; the playlist's cover art is whichever file under
/// `!playlists/` shares its stem with the playlist name.
pub fn update_cache_for_playlists(config: &Config, playlist_names: Option<Vec<String>>, force: bool) -> Result<()> {
    let playlists_dir = config.music_source_dir.join("!playlists");
    if !playlists_dir.is_dir() {
        return Ok(());
    }

    let names = match playlist_names {
        Some(names) => names,
        None => {
            let mut names = Vec::new();
            for entry in fs::read_dir(&playlists_dir)? {
                let entry = entry?;
                if entry.path().extension().and_then(|e| e.to_str()) == Some("toml") {
                    if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
            }
            names
        }
    };

    for name in names {
        update_cache_for_playlist(config, &name, force)?;
    }
    Ok(())
}

fn update_cache_for_playlist(config: &Config, name: &str, force: bool) -> Result<()> {
    let path = playlist_path(config, name);
    if !path.is_file() {
        debug!("Skipping playlist {:?}: file does not exist", name);
        return Ok(());
    }

    let _lock = lock(config, &playlist_lock_name(name), 60.0)?;
    let source_mtime = mtime_to_string(&path)?;

    let conn = connect(config)?;

    if !force {
        let existing_mtime: Option<String> = conn
            .query_row("SELECT source_mtime FROM playlists WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        if existing_mtime.as_deref() == Some(source_mtime.as_str()) {
            debug!("No-Op: playlist {:?} unchanged since last scan", name);
            return Ok(());
        }
    }

    let contents = fs::read_to_string(&path)?;
    let mut data: PlaylistToml = toml::from_str(&contents).unwrap_or_default();

    let mut changed = false;
    for entry in &mut data.tracks {
        let exists = track_exists(&conn, &entry.uuid)?;
        if entry.missing == exists {
            entry.missing = !exists;
            changed = true;
        }
    }
    if changed {
        let serialized = toml::to_string_pretty(&data)?;
        fs::write(&path, serialized)?;
    }

    let cover_path = {
        let mut found = None;
        if let Ok(read_dir) = fs::read_dir(&playlists_dir_for(config)) {
            for entry in read_dir.flatten() {
                let p = entry.path();
                if p.file_stem().and_then(|s| s.to_str()) == Some(name) && p.extension().and_then(|e| e.to_str()) != Some("toml") {
                    let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
                    if config.valid_art_exts.iter().any(|e| e.to_lowercase() == ext) {
                        found = Some(p);
                        break;
                    }
                }
            }
        }
        found
    };

    conn.execute(
        "INSERT INTO playlists (name, source_mtime, cover_path) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET source_mtime = excluded.source_mtime, cover_path = excluded.cover_path",
        params![name, source_mtime, cover_path.as_ref().map(|p| p.to_string_lossy().to_string())],
    )?;
    conn.execute("DELETE FROM playlists_tracks WHERE playlist_name = ?1", params![name])?;
    for (i, entry) in data.tracks.iter().enumerate() {
        conn.execute(
            "INSERT INTO playlists_tracks (playlist_name, track_id, position, missing) VALUES (?1, ?2, ?3, ?4)",
            params![name, entry.uuid, i as i64, entry.missing],
        )?;
    }

    info!("Updated cached data for playlist {:?}", name);
    Ok(())
}

fn playlists_dir_for(config: &Config) -> PathBuf {
    config.music_source_dir.join("!playlists")
}

pub fn update_cache_evict_nonexistent_playlists(config: &Config) -> Result<()> {
    debug!("Evicting cached playlists that are not on disk");
    let playlists_dir = playlists_dir_for(config);
    let mut names = Vec::new();
    if playlists_dir.is_dir() {
        for entry in fs::read_dir(&playlists_dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("toml") {
                if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
    }

    let conn = connect(config)?;
    if names.is_empty() {
        let mut stmt = conn.prepare("DELETE FROM playlists RETURNING name")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            info!("Evicted missing playlist {} from cache", name);
        }
        return Ok(());
    }
    let placeholders = vec!["?"; names.len()].join(",");
    let sql = format!("DELETE FROM playlists WHERE name NOT IN ({placeholders}) RETURNING name");
    let mut stmt = conn.prepare(&sql)?;
    let query_params: Vec<&dyn rusqlite::ToSql> = names.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    let mut rows = stmt.query(&query_params[..])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        info!("Evicted missing playlist {} from cache", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtime_format_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"hello").unwrap();
        let a = mtime_to_string(&path).unwrap();
        let b = mtime_to_string(&path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parse_track_number_handles_suffixes() {
        assert_eq!(parse_track_number("3"), 3);
        assert_eq!(parse_track_number("03"), 3);
        assert_eq!(parse_track_number(""), 1);
        assert_eq!(parse_track_number("2/5"), 2);
    }

    #[test]
    fn scan_audio_files_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("02.mp3"), b"").unwrap();
        fs::write(dir.path().join("01.flac"), b"").unwrap();
        fs::write(dir.path().join("readme.txt"), b"").unwrap();
        let files = scan_audio_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0] < files[1]);
    }
}
