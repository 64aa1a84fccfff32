//! Functions for interacting with playlists.

use crate::cache::{get_track_logtext, playlist_lock_name};
use crate::cache_update::{
    playlist_path, update_cache_evict_nonexistent_playlists, update_cache_for_playlists, PlaylistEntry, PlaylistToml,
};
use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::locking::lock;
use std::fs;
use std::process::Command;
use tracing::{debug, info};

const DEFAULT_LOCK_TIMEOUT: f64 = 1.0;

pub fn create_playlist(config: &Config, name: &str) -> Result<()> {
    fs::create_dir_all(config.music_source_dir.join("!playlists"))?;
    let path = playlist_path(config, name);
    {
        let _lock = lock(config, &playlist_lock_name(name), DEFAULT_LOCK_TIMEOUT)?;
        if path.exists() {
            return Err(RoseError::Expected(RoseExpectedError::PlaylistAlreadyExists { name: name.to_string() }));
        }
        fs::write(&path, "")?;
    }
    info!("Created playlist {} in source directory", name);
    update_cache_for_playlists(config, Some(vec![name.to_string()]), true)?;
    Ok(())
}

pub fn delete_playlist(config: &Config, name: &str) -> Result<()> {
    let path = playlist_path(config, name);
    {
        let _lock = lock(config, &playlist_lock_name(name), DEFAULT_LOCK_TIMEOUT)?;
        if !path.exists() {
            return Err(RoseError::Expected(RoseExpectedError::PlaylistDoesNotExist { name: name.to_string() }));
        }
        trash::delete(&path).map_err(|e| RoseError::Generic(format!("Failed to send playlist to trash: {e}")))?;

        // The cover art, if any, shares the playlist's stem and lives alongside it.
        let playlists_dir = config.music_source_dir.join("!playlists");
        if let Ok(read_dir) = fs::read_dir(&playlists_dir) {
            for entry in read_dir.flatten() {
                let candidate = entry.path();
                if candidate.file_stem().map(|s| s.to_string_lossy().into_owned()) == Some(name.to_string())
                    && candidate != path
                {
                    trash::delete(&candidate)
                        .map_err(|e| RoseError::Generic(format!("Failed to send cover art to trash: {e}")))?;
                }
            }
        }
    }
    info!("Deleted playlist {} from source directory", name);
    update_cache_evict_nonexistent_playlists(config)?;
    Ok(())
}

pub fn rename_playlist(config: &Config, old_name: &str, new_name: &str) -> Result<()> {
    let old_path = playlist_path(config, old_name);
    let new_path = playlist_path(config, new_name);
    {
        let _old_lock = lock(config, &playlist_lock_name(old_name), DEFAULT_LOCK_TIMEOUT)?;
        let _new_lock = lock(config, &playlist_lock_name(new_name), DEFAULT_LOCK_TIMEOUT)?;
        if !old_path.exists() {
            return Err(RoseError::Expected(RoseExpectedError::PlaylistDoesNotExist { name: old_name.to_string() }));
        }
        if new_path.exists() {
            return Err(RoseError::Expected(RoseExpectedError::PlaylistAlreadyExists { name: new_name.to_string() }));
        }
        fs::rename(&old_path, &new_path)?;

        // Rename any adjacent files sharing the old stem (e.g. cover art).
        let playlists_dir = config.music_source_dir.join("!playlists");
        let old_stem = old_path.file_stem().map(|s| s.to_os_string());
        for entry in fs::read_dir(&playlists_dir)?.flatten() {
            let adjacent = entry.path();
            if adjacent.file_stem().map(|s| s.to_os_string()) != old_stem {
                continue;
            }
            let new_adjacent = adjacent.with_file_name(format!(
                "{}{}",
                new_path.file_stem().unwrap().to_string_lossy(),
                adjacent.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default()
            ));
            if new_adjacent.exists() {
                continue;
            }
            fs::rename(&adjacent, &new_adjacent)?;
            debug!("Renaming playlist-adjacent file {:?} to {:?}", adjacent, new_adjacent);
        }
    }
    info!("Renamed playlist {} to {}", old_name, new_name);
    update_cache_for_playlists(config, Some(vec![new_name.to_string()]), true)?;
    update_cache_evict_nonexistent_playlists(config)?;
    Ok(())
}

pub fn remove_track_from_playlist(config: &Config, playlist_name: &str, track_id: &str) -> Result<()> {
    let track_logtext = get_track_logtext(config, track_id)?
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::TrackDoesNotExist { id: track_id.to_string() }))?;

    let path = playlist_path(config, playlist_name);
    if !path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::PlaylistDoesNotExist { name: playlist_name.to_string() }));
    }
    {
        let _lock = lock(config, &playlist_lock_name(playlist_name), DEFAULT_LOCK_TIMEOUT)?;
        let contents = fs::read_to_string(&path)?;
        let mut data: PlaylistToml = toml::from_str(&contents).unwrap_or_default();
        let old_len = data.tracks.len();
        data.tracks.retain(|t| t.uuid != track_id);
        if data.tracks.len() == old_len {
            info!("No-Op: Track {} not in playlist {}", track_logtext, playlist_name);
            return Ok(());
        }
        fs::write(&path, toml::to_string_pretty(&data)?)?;
    }
    info!("Removed track {} from playlist {}", track_logtext, playlist_name);
    update_cache_for_playlists(config, Some(vec![playlist_name.to_string()]), true)?;
    Ok(())
}

pub fn add_track_to_playlist(config: &Config, playlist_name: &str, track_id: &str) -> Result<()> {
    let track_logtext = get_track_logtext(config, track_id)?
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::TrackDoesNotExist { id: track_id.to_string() }))?;

    let path = playlist_path(config, playlist_name);
    if !path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::PlaylistDoesNotExist { name: playlist_name.to_string() }));
    }

    {
        let _lock = lock(config, &playlist_lock_name(playlist_name), DEFAULT_LOCK_TIMEOUT)?;
        let contents = fs::read_to_string(&path)?;
        let mut data: PlaylistToml = toml::from_str(&contents).unwrap_or_default();

        // We don't support duplicate playlist entries.
        if data.tracks.iter().any(|t| t.uuid == track_id) {
            info!("No-Op: Track {} already in playlist {}", track_logtext, playlist_name);
            return Ok(());
        }
        data.tracks.push(PlaylistEntry {
            uuid: track_id.to_string(),
            description_meta: track_logtext.clone(),
            missing: false,
        });
        fs::write(&path, toml::to_string_pretty(&data)?)?;
    }
    info!("Added track {} to playlist {}", track_logtext, playlist_name);
    update_cache_for_playlists(config, Some(vec![playlist_name.to_string()]), true)?;
    Ok(())
}

pub fn edit_playlist_in_editor(config: &Config, playlist_name: &str) -> Result<()> {
    let path = playlist_path(config, playlist_name);
    if !path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::PlaylistDoesNotExist { name: playlist_name.to_string() }));
    }

    let _lock = lock(config, &playlist_lock_name(playlist_name), 60.0)?;
    let contents = fs::read_to_string(&path)?;
    let data: PlaylistToml = toml::from_str(&contents).unwrap_or_default();

    let original_descriptions: Vec<String> = data.tracks.iter().map(|t| t.description_meta.clone()).collect();
    let original_text = original_descriptions.join("\n");

    let temp_file = config.cache_dir.join(format!("rose-edit-playlist-{playlist_name}.txt"));
    fs::write(&temp_file, &original_text)?;

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());
    let status = Command::new(&editor).arg(&temp_file).status()?;
    if !status.success() {
        fs::remove_file(&temp_file).ok();
        return Err(RoseError::Generic("Editor exited with non-zero status".to_string()));
    }

    let edited_text = fs::read_to_string(&temp_file)?;
    fs::remove_file(&temp_file).ok();

    if edited_text == original_text {
        info!("Aborting: metadata file not submitted.");
        return Ok(());
    }

    let uuid_by_description: std::collections::HashMap<&str, &str> =
        data.tracks.iter().map(|t| (t.description_meta.as_str(), t.uuid.as_str())).collect();

    let mut edited_tracks = Vec::new();
    for desc in edited_text.trim().split('\n') {
        if desc.is_empty() {
            continue;
        }
        let uuid = uuid_by_description.get(desc).ok_or_else(|| {
            RoseError::Expected(RoseExpectedError::DescriptionMismatch(format!(
                "Track {desc} does not match a known track in the playlist. Was the line edited?"
            )))
        })?;
        edited_tracks.push(PlaylistEntry { uuid: uuid.to_string(), description_meta: desc.to_string(), missing: false });
    }

    fs::write(&path, toml::to_string_pretty(&PlaylistToml { tracks: edited_tracks })?)?;
    info!("Edited playlist {} from EDITOR", playlist_name);
    update_cache_for_playlists(config, Some(vec![playlist_name.to_string()]), true)?;
    Ok(())
}

pub fn set_playlist_cover_art(config: &Config, playlist_name: &str, new_cover_art_path: &std::path::Path) -> Result<()> {
    let path = playlist_path(config, playlist_name);
    if !path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::PlaylistDoesNotExist { name: playlist_name.to_string() }));
    }
    let ext = new_cover_art_path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !config.valid_cover_arts().contains(&ext) {
        return Err(RoseError::Expected(RoseExpectedError::InvalidCoverArtFile(format!(
            "File format {ext} not allowed for cover arts: must be one of {:?}",
            config.valid_cover_arts()
        ))));
    }

    let _lock = lock(config, &playlist_lock_name(playlist_name), DEFAULT_LOCK_TIMEOUT)?;
    let playlists_dir = config.music_source_dir.join("!playlists");
    for entry in fs::read_dir(&playlists_dir)?.flatten() {
        let candidate = entry.path();
        if candidate.file_stem().map(|s| s.to_string_lossy().into_owned()) == Some(playlist_name.to_string())
            && candidate != path
        {
            fs::remove_file(&candidate)?;
        }
    }
    fs::copy(new_cover_art_path, playlists_dir.join(format!("{playlist_name}.{ext}")))?;
    info!("Set the cover art of playlist {} to {:?}", playlist_name, new_cover_art_path);
    update_cache_for_playlists(config, Some(vec![playlist_name.to_string()]), true)?;
    Ok(())
}

pub fn delete_playlist_cover_art(config: &Config, playlist_name: &str) -> Result<()> {
    let path = playlist_path(config, playlist_name);
    if !path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::PlaylistDoesNotExist { name: playlist_name.to_string() }));
    }

    let _lock = lock(config, &playlist_lock_name(playlist_name), DEFAULT_LOCK_TIMEOUT)?;
    let playlists_dir = config.music_source_dir.join("!playlists");
    let mut found = false;
    for entry in fs::read_dir(&playlists_dir)?.flatten() {
        let candidate = entry.path();
        if candidate.file_stem().map(|s| s.to_string_lossy().into_owned()) == Some(playlist_name.to_string())
            && candidate != path
        {
            fs::remove_file(&candidate)?;
            found = true;
        }
    }
    if found {
        info!("Deleted cover art of playlist {}", playlist_name);
    } else {
        info!("No-Op: No cover art found for playlist {}", playlist_name);
    }
    update_cache_for_playlists(config, Some(vec![playlist_name.to_string()]), true)?;
    Ok(())
}
