// The releases module provides functions for interacting with releases.

use crate::audiotags::AudioTags;
use crate::cache::{connect, get_release, get_tracks_of_release, release_lock_name, CachedRelease, CachedTrack};
use crate::cache_update::{
    update_cache_evict_nonexistent_releases, update_cache_for_collages, update_cache_for_playlists,
    update_cache_for_releases,
};
use crate::config::Config;
use crate::datafiles::{read_datafile, write_datafile, StoredDataFile};
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::locking::lock;
use crate::rule_parser::{Action, ActionBehavior, Matcher, Tag};
use crate::rules::{
    execute_metadata_actions, fast_search_for_matching_releases,
    filter_release_false_positives_using_read_cache,
};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::info;
use uuid::Uuid;

// Python: def delete_release(c: Config, release_id: str) -> None:
pub fn delete_release(config: &Config, release_id: &str) -> Result<()> {
    let release = get_release(config, release_id)?.ok_or_else(|| {
        RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist {
            id: release_id.to_string(),
        })
    })?;

    let _lock = lock(config, &release_lock_name(release_id), 60.0)?;

    trash::delete(&release.source_path)
        .map_err(|e| RoseError::Generic(format!("Failed to send release to trash: {e}")))?;

    info!("Trashed release {}", release.releasetitle);

    update_cache_evict_nonexistent_releases(config)?;
    // Update all collages and playlists so that the release is removed from whichever it was in.
    update_cache_for_collages(config, None, true)?;
    update_cache_for_playlists(config, None, true)?;

    Ok(())
}

// Python: def toggle_release_new(c: Config, release_id: str) -> None:
pub fn toggle_release_new(config: &Config, release_id: &str) -> Result<()> {
    let release = get_release(config, release_id)?.ok_or_else(|| {
        RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist {
            id: release_id.to_string(),
        })
    })?;

    let _lock = lock(config, &release_lock_name(release_id), 60.0)?;

    // Find and update the datafile
    let datafile_path = release
        .source_path
        .join(format!(".rose.{}.toml", release_id));
    let mut datafile = read_datafile(&datafile_path)?;
    datafile.new = !datafile.new;

    write_datafile(&datafile_path, &datafile)?;

    let status = if datafile.new { "new" } else { "not new" };
    info!("Toggled release {} to {}", release.releasetitle, status);

    // Update cache for this release
    update_cache_for_releases(config, Some(vec![release.source_path.clone()]), false)?;

    Ok(())
}

// Python: def create_release(
pub fn create_release(
    config: &Config,
    source_dir: &Path,
    title: &str,
    _artists: Vec<(String, String)>, // (name, role)
) -> Result<String> {
    // Create the directory
    fs::create_dir_all(source_dir)?;

    // Generate a new release ID
    let release_id = Uuid::now_v7().to_string();

    // Create initial datafile
    let datafile = StoredDataFile {
        new: true,
        added_at: Utc::now().to_rfc3339(),
    };

    let datafile_path = source_dir.join(format!(".rose.{}.toml", release_id));
    write_datafile(&datafile_path, &datafile)?;

    // Create a placeholder audio file if none exists
    // This ensures the release is recognized during cache update

    info!("Created release {} at {:?}", title, source_dir);

    // Update cache for this release
    update_cache_for_releases(config, Some(vec![source_dir.to_path_buf()]), false)?;

    Ok(release_id)
}

// Structure for TOML editing
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EditableRelease {
    title: String,
    release_type: String,
    release_year: Option<i32>,
    original_year: Option<i32>,
    composition_year: Option<i32>,
    edition: Option<String>,
    catalog_number: Option<String>,
    genres: Vec<String>,
    secondary_genres: Vec<String>,
    descriptors: Vec<String>,
    labels: Vec<String>,
    artists: HashMap<String, Vec<String>>, // role -> names
}

// Python: def edit_release(
pub fn edit_release(config: &Config, release_id: &str, _resume_file: Option<&Path>) -> Result<()> {
    let release = get_release(config, release_id)?.ok_or_else(|| {
        RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist {
            id: release_id.to_string(),
        })
    })?;

    // Lock the release
    let _lock = lock(config, &release_lock_name(release_id), 300.0)?; // 5 minute timeout for editing

    // Convert release to editable format
    let mut artists_map: HashMap<String, Vec<String>> = HashMap::new();
    artists_map.insert(
        "main".to_string(),
        release
            .releaseartists
            .main
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    );
    artists_map.insert(
        "guest".to_string(),
        release
            .releaseartists
            .guest
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    );
    artists_map.insert(
        "remixer".to_string(),
        release
            .releaseartists
            .remixer
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    );
    artists_map.insert(
        "producer".to_string(),
        release
            .releaseartists
            .producer
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    );
    artists_map.insert(
        "composer".to_string(),
        release
            .releaseartists
            .composer
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    );
    artists_map.insert(
        "conductor".to_string(),
        release
            .releaseartists
            .conductor
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    );
    artists_map.insert(
        "djmixer".to_string(),
        release
            .releaseartists
            .djmixer
            .iter()
            .map(|a| a.name.clone())
            .collect(),
    );

    // Remove empty artist lists
    artists_map.retain(|_, v| !v.is_empty());

    let editable = EditableRelease {
        title: release.releasetitle.clone(),
        release_type: release.releasetype.clone(),
        release_year: release.releasedate.as_ref().map(|d| d.year),
        original_year: release.originaldate.as_ref().map(|d| d.year),
        composition_year: release.compositiondate.as_ref().map(|d| d.year),
        edition: release.edition.clone(),
        catalog_number: release.catalognumber.clone(),
        genres: release.genres.clone(),
        secondary_genres: release.secondary_genres.clone(),
        descriptors: release.descriptors.clone(),
        labels: release.labels.clone(),
        artists: artists_map,
    };

    // Write to temporary file
    let temp_file = config
        .cache_dir
        .join(format!("rose-edit-{}.toml", release_id));
    let toml_string = toml::to_string_pretty(&editable)
        .map_err(|e| RoseError::Generic(format!("Failed to serialize to TOML: {}", e)))?;
    fs::write(&temp_file, &toml_string)?;

    // Open in editor
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());
    let status = Command::new(&editor).arg(&temp_file).status()?;

    if !status.success() {
        fs::remove_file(&temp_file).ok();
        return Err(RoseError::Expected(RoseExpectedError::Generic(
            "Editor exited with non-zero status".to_string(),
        )));
    }

    // Read back and parse
    let edited_toml = fs::read_to_string(&temp_file)?;
    let edited: EditableRelease = toml::from_str(&edited_toml)
        .map_err(|e| RoseError::Generic(format!("Failed to parse edited TOML: {}", e)))?;

    // Apply changes to all tracks
    let tracks = get_tracks_of_release(config, release_id)?;
    let actions = create_edit_actions(&release, &edited);

    if !actions.is_empty() {
        execute_metadata_actions(config, &actions, &tracks, false)?;

        // Update cache for this release
        update_cache_for_releases(config, Some(vec![release.source_path.clone()]), false)?;
    }

    fs::remove_file(&temp_file).ok();

    info!("Successfully edited release {}", release.releasetitle);

    Ok(())
}

fn replace_action(tag: Tag, replacement: String) -> Action {
    Action {
        tags: vec![tag],
        behavior: ActionBehavior::Replace(crate::rule_parser::ReplaceAction { replacement }),
        pattern: None,
    }
}

// Create actions to apply edits. Each changed field becomes a whole-value Replace action (scoped
// to that one tag, with no restricting pattern) rather than a diff of individual list entries,
// since the edit happens via a single TOML document round-trip rather than incremental rule-like
// changes.
fn create_edit_actions(original: &CachedRelease, edited: &EditableRelease) -> Vec<Action> {
    let mut actions = Vec::new();

    if original.releasetitle != edited.title {
        actions.push(replace_action(Tag::ReleaseTitle, edited.title.clone()));
    }
    if original.releasetype != edited.release_type {
        actions.push(replace_action(Tag::ReleaseType, edited.release_type.clone()));
    }
    if original.releasedate.as_ref().map(|d| d.year) != edited.release_year {
        actions.push(replace_action(Tag::ReleaseDate, edited.release_year.map(|y| y.to_string()).unwrap_or_default()));
    }
    if original.originaldate.as_ref().map(|d| d.year) != edited.original_year {
        actions.push(replace_action(Tag::OriginalDate, edited.original_year.map(|y| y.to_string()).unwrap_or_default()));
    }
    if original.compositiondate.as_ref().map(|d| d.year) != edited.composition_year {
        actions.push(replace_action(Tag::CompositionDate, edited.composition_year.map(|y| y.to_string()).unwrap_or_default()));
    }
    if original.edition != edited.edition {
        actions.push(replace_action(Tag::Edition, edited.edition.clone().unwrap_or_default()));
    }
    if original.catalognumber != edited.catalog_number {
        actions.push(replace_action(Tag::CatalogNumber, edited.catalog_number.clone().unwrap_or_default()));
    }
    if original.genres != edited.genres {
        actions.push(replace_action(Tag::Genre, edited.genres.join(";")));
    }
    if original.secondary_genres != edited.secondary_genres {
        actions.push(replace_action(Tag::SecondaryGenre, edited.secondary_genres.join(";")));
    }
    if original.descriptors != edited.descriptors {
        actions.push(replace_action(Tag::Descriptor, edited.descriptors.join(";")));
    }
    if original.labels != edited.labels {
        actions.push(replace_action(Tag::Label, edited.labels.join(";")));
    }

    let role_tags: &[(&str, Tag)] = &[
        ("main", Tag::ReleaseArtistMain),
        ("guest", Tag::ReleaseArtistGuest),
        ("remixer", Tag::ReleaseArtistRemixer),
        ("producer", Tag::ReleaseArtistProducer),
        ("composer", Tag::ReleaseArtistComposer),
        ("conductor", Tag::ReleaseArtistConductor),
        ("djmixer", Tag::ReleaseArtistDjMixer),
    ];
    for (role, tag) in role_tags {
        let original_names: Vec<String> = match *tag {
            Tag::ReleaseArtistMain => original.releaseartists.main.iter().map(|a| a.name.clone()).collect(),
            Tag::ReleaseArtistGuest => original.releaseartists.guest.iter().map(|a| a.name.clone()).collect(),
            Tag::ReleaseArtistRemixer => original.releaseartists.remixer.iter().map(|a| a.name.clone()).collect(),
            Tag::ReleaseArtistProducer => original.releaseartists.producer.iter().map(|a| a.name.clone()).collect(),
            Tag::ReleaseArtistComposer => original.releaseartists.composer.iter().map(|a| a.name.clone()).collect(),
            Tag::ReleaseArtistConductor => original.releaseartists.conductor.iter().map(|a| a.name.clone()).collect(),
            Tag::ReleaseArtistDjMixer => original.releaseartists.djmixer.iter().map(|a| a.name.clone()).collect(),
            _ => unreachable!(),
        };
        let edited_names = edited.artists.get(*role).cloned().unwrap_or_default();
        if original_names != edited_names {
            actions.push(replace_action(*tag, edited_names.join(";")));
        }
    }

    actions
}

// Python: def set_release_cover_art(
pub fn set_release_cover_art(
    config: &Config,
    release_id: &str,
    cover_art_path: &Path,
) -> Result<()> {
    let release = get_release(config, release_id)?.ok_or_else(|| {
        RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist {
            id: release_id.to_string(),
        })
    })?;

    // Validate the cover art file
    if !cover_art_path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::InvalidCoverArtFile(format!(
            "Cover art file does not exist: {:?}",
            cover_art_path
        ))));
    }

    let extension = cover_art_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    if !config
        .valid_art_exts
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
    {
        return Err(RoseError::Expected(RoseExpectedError::InvalidCoverArtFile(format!(
            "Invalid cover art file extension: {}",
            extension
        ))));
    }

    // Lock the release
    let _lock = lock(config, &release_lock_name(release_id), 60.0)?;

    // Copy the cover art to the release directory
    let dest_filename = format!("cover.{}", extension);
    let dest_path = release.source_path.join(&dest_filename);

    fs::copy(cover_art_path, &dest_path)?;

    info!(
        "Set cover art for release {} to {}",
        release.releasetitle, dest_filename
    );

    // Update cache for this release
    update_cache_for_releases(config, Some(vec![release.source_path.clone()]), false)?;

    Ok(())
}

// Python: def delete_release_cover_art(
pub fn delete_release_cover_art(config: &Config, release_id: &str) -> Result<()> {
    let release = get_release(config, release_id)?.ok_or_else(|| {
        RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist {
            id: release_id.to_string(),
        })
    })?;

    if release.cover_image_path.is_none() {
        return Err(RoseError::Expected(RoseExpectedError::Generic(format!(
            "Release {} has no cover art",
            release_id
        ))));
    }

    // Lock the release
    let _lock = lock(config, &release_lock_name(release_id), 60.0)?;

    if let Some(cover_path) = &release.cover_image_path {
        fs::remove_file(cover_path)?;
        info!("Deleted cover art for release {}", release.releasetitle);
    }

    // Update cache for this release
    update_cache_for_releases(config, Some(vec![release.source_path.clone()]), false)?;

    Ok(())
}

// Python: def run_actions_on_release(
pub fn run_actions_on_release(
    config: &Config,
    release_id: &str,
    actions: &[Action],
    dry_run: bool,
    confirm_yes: bool,
) -> Result<()> {
    let release = get_release(config, release_id)?.ok_or_else(|| {
        RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist {
            id: release_id.to_string(),
        })
    })?;

    // Get all tracks for the release
    let tracks = get_tracks_of_release(config, release_id)?;

    // Compute the diff first, regardless of dry_run, so we can show/confirm it.
    let changes = execute_metadata_actions(config, actions, &tracks, true)?;
    if changes.is_empty() {
        info!("No changes to apply");
        return Ok(());
    }
    for (track, changed_tags) in &changes {
        for (tag, values) in changed_tags {
            info!("{}: {} -> {:?}", track.source_path.display(), tag, values);
        }
    }
    if dry_run {
        info!("Dry run: would have made {} changes", changes.len());
        return Ok(());
    }
    if !confirm_yes && !crate::rules::confirm_changes(changes.len(), 25)? {
        info!("Aborting: changes not confirmed");
        return Ok(());
    }

    // Execute the actions for real this time.
    execute_metadata_actions(config, actions, &tracks, false)?;

    // Update cache for this release
    update_cache_for_releases(config, Some(vec![release.source_path.clone()]), false)?;

    Ok(())
}

// Python: def create_single_release(
pub fn create_single_release(
    config: &Config,
    track_id: &str,
    title: Option<&str>,
    artist: Option<&str>,
) -> Result<String> {
    // Get the track
    let track = get_track(config, track_id)?.ok_or_else(|| {
        RoseError::Expected(RoseExpectedError::TrackDoesNotExist {
            id: track_id.to_string(),
        })
    })?;

    // Determine title and artist. Trim the title the way the original strips whitespace off
    // of `af.tracktitle` before using it as a directory component.
    let single_title = title.unwrap_or(&track.tracktitle).trim();
    let single_artist = artist.unwrap_or_else(|| {
        // Use main artist from track or release
        track
            .trackartists
            .main
            .first()
            .or_else(|| track.release.releaseartists.main.first())
            .map(|a| a.name.as_str())
            .unwrap_or("Unknown Artist")
    });

    // Create directory for single, resolving name collisions with a numeric suffix.
    let original_dirname = format!("{} - {}", single_artist, single_title);
    let mut dirname = original_dirname.clone();
    let mut collision_no = 2;
    while config.music_source_dir.join(&dirname).exists() {
        dirname = format!("{original_dirname} [{collision_no}]");
        collision_no += 1;
    }
    let single_dir = config.music_source_dir.join(&dirname);

    // Create the release
    let release_id = create_release(
        config,
        &single_dir,
        single_title,
        vec![(single_artist.to_string(), "main".to_string())],
    )?;

    // Copy the track to the new directory
    let source_path = &track.source_path;
    let filename = source_path.file_name().unwrap();
    let dest_path = single_dir.join(filename);

    fs::copy(source_path, &dest_path)?;

    // Update the track metadata to reflect it's a single
    let mut tags = AudioTags::from_file(&dest_path)?;
    tags.releasetype = "single".to_string();
    tags.releasetitle = Some(single_title.to_string());
    tags.release_id = Some(release_id.clone());
    tags.flush(config, true)?;

    info!(
        "Created single release {} from track {}",
        single_title, track_id
    );

    // Update cache for the new release
    update_cache_for_releases(config, Some(vec![single_dir]), false)?;

    Ok(release_id)
}

// Python: def find_releases_matching_rule(
pub fn find_releases_matching_rule(
    config: &Config,
    matcher: &Matcher,
) -> Result<Vec<CachedRelease>> {
    // Use the rules engine to find matching releases
    let releases = fast_search_for_matching_releases(config, matcher)?;
    let filtered = filter_release_false_positives_using_read_cache(config, matcher, &releases)?;

    Ok(filtered)
}

// Helper function to get a track (not in Python, but needed)
fn get_track(config: &Config, track_id: &str) -> Result<Option<CachedTrack>> {
    let conn = connect(config)?;
    let mut stmt = conn.prepare(
        "SELECT tv.*, rv.*
         FROM tracks_view tv
         JOIN releases_view rv ON rv.id = tv.release_id
         WHERE tv.id = ?1",
    )?;

    let track = stmt
        .query_row([track_id], |row| {
            let release = crate::cache::cached_release_from_view(config, row, true)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            let track = crate::cache::cached_track_from_view(config, row, release, true)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok(track)
        })
        .optional()?;

    Ok(track)
}
