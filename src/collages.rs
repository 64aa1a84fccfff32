//! Functions for interacting with collages.

use crate::cache::{collage_lock_name, get_release_logtext};
use crate::cache_update::{collage_path, update_cache_evict_nonexistent_collages, update_cache_for_collages, CollageEntry, CollageToml};
use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::locking::lock;
use std::fs;
use std::process::Command;
use tracing::{debug, info};

const DEFAULT_LOCK_TIMEOUT: f64 = 1.0;

pub fn create_collage(config: &Config, name: &str) -> Result<()> {
    fs::create_dir_all(config.music_source_dir.join("!collages"))?;
    let path = collage_path(config, name);
    {
        let _lock = lock(config, &collage_lock_name(name), DEFAULT_LOCK_TIMEOUT)?;
        if path.exists() {
            return Err(RoseError::Expected(RoseExpectedError::CollageAlreadyExists { name: name.to_string() }));
        }
        fs::write(&path, "")?;
    }
    info!("Created collage {} in source directory", name);
    update_cache_for_collages(config, Some(vec![name.to_string()]), true)?;
    Ok(())
}

pub fn delete_collage(config: &Config, name: &str) -> Result<()> {
    let path = collage_path(config, name);
    {
        let _lock = lock(config, &collage_lock_name(name), DEFAULT_LOCK_TIMEOUT)?;
        if !path.exists() {
            return Err(RoseError::Expected(RoseExpectedError::CollageDoesNotExist { name: name.to_string() }));
        }
        trash::delete(&path).map_err(|e| RoseError::Generic(format!("Failed to send collage to trash: {e}")))?;
    }
    info!("Deleted collage {} from source directory", name);
    update_cache_evict_nonexistent_collages(config)?;
    Ok(())
}

pub fn rename_collage(config: &Config, old_name: &str, new_name: &str) -> Result<()> {
    let old_path = collage_path(config, old_name);
    let new_path = collage_path(config, new_name);
    {
        let _old_lock = lock(config, &collage_lock_name(old_name), DEFAULT_LOCK_TIMEOUT)?;
        let _new_lock = lock(config, &collage_lock_name(new_name), DEFAULT_LOCK_TIMEOUT)?;
        if !old_path.exists() {
            return Err(RoseError::Expected(RoseExpectedError::CollageDoesNotExist { name: old_name.to_string() }));
        }
        if new_path.exists() {
            return Err(RoseError::Expected(RoseExpectedError::CollageAlreadyExists { name: new_name.to_string() }));
        }
        fs::rename(&old_path, &new_path)?;

        // Rename any adjacent files sharing the old stem (e.g. cover art).
        let collages_dir = config.music_source_dir.join("!collages");
        let old_stem = old_path.file_stem().map(|s| s.to_os_string());
        for entry in fs::read_dir(&collages_dir)?.flatten() {
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
            debug!("Renaming collage-adjacent file {:?} to {:?}", adjacent, new_adjacent);
        }
    }
    info!("Renamed collage {} to {}", old_name, new_name);
    update_cache_for_collages(config, Some(vec![new_name.to_string()]), true)?;
    update_cache_evict_nonexistent_collages(config)?;
    Ok(())
}

pub fn remove_release_from_collage(config: &Config, collage_name: &str, release_id: &str) -> Result<()> {
    let release_logtext = get_release_logtext(config, release_id)?
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist { id: release_id.to_string() }))?;

    let path = collage_path(config, collage_name);
    if !path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::CollageDoesNotExist { name: collage_name.to_string() }));
    }
    {
        let _lock = lock(config, &collage_lock_name(collage_name), DEFAULT_LOCK_TIMEOUT)?;
        let contents = fs::read_to_string(&path)?;
        let mut data: CollageToml = toml::from_str(&contents).unwrap_or_default();
        let old_len = data.releases.len();
        data.releases.retain(|r| r.uuid != release_id);
        if data.releases.len() == old_len {
            info!("No-Op: Release {} not in collage {}", release_logtext, collage_name);
            return Ok(());
        }
        fs::write(&path, toml::to_string_pretty(&data)?)?;
    }
    info!("Removed release {} from collage {}", release_logtext, collage_name);
    update_cache_for_collages(config, Some(vec![collage_name.to_string()]), true)?;
    Ok(())
}

pub fn add_release_to_collage(config: &Config, collage_name: &str, release_id: &str) -> Result<()> {
    let release_logtext = get_release_logtext(config, release_id)?
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist { id: release_id.to_string() }))?;

    let path = collage_path(config, collage_name);
    if !path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::CollageDoesNotExist { name: collage_name.to_string() }));
    }

    {
        let _lock = lock(config, &collage_lock_name(collage_name), DEFAULT_LOCK_TIMEOUT)?;
        let contents = fs::read_to_string(&path)?;
        let mut data: CollageToml = toml::from_str(&contents).unwrap_or_default();

        // We don't support duplicate collage entries.
        if data.releases.iter().any(|r| r.uuid == release_id) {
            info!("No-Op: Release {} already in collage {}", release_logtext, collage_name);
            return Ok(());
        }
        data.releases.push(CollageEntry {
            uuid: release_id.to_string(),
            description_meta: release_logtext.clone(),
            missing: false,
        });
        fs::write(&path, toml::to_string_pretty(&data)?)?;
    }
    info!("Added release {} to collage {}", release_logtext, collage_name);
    update_cache_for_collages(config, Some(vec![collage_name.to_string()]), true)?;
    Ok(())
}

pub fn edit_collage_in_editor(config: &Config, collage_name: &str) -> Result<()> {
    let path = collage_path(config, collage_name);
    if !path.exists() {
        return Err(RoseError::Expected(RoseExpectedError::CollageDoesNotExist { name: collage_name.to_string() }));
    }

    let _lock = lock(config, &collage_lock_name(collage_name), 60.0)?;
    let contents = fs::read_to_string(&path)?;
    let data: CollageToml = toml::from_str(&contents).unwrap_or_default();

    let original_descriptions: Vec<String> = data.releases.iter().map(|r| r.description_meta.clone()).collect();
    let original_text = original_descriptions.join("\n");

    let temp_file = config.cache_dir.join(format!("rose-edit-collage-{collage_name}.txt"));
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
        data.releases.iter().map(|r| (r.description_meta.as_str(), r.uuid.as_str())).collect();

    let mut edited_releases = Vec::new();
    for desc in edited_text.trim().split('\n') {
        let uuid = uuid_by_description.get(desc).ok_or_else(|| {
            RoseError::Expected(RoseExpectedError::DescriptionMismatch(format!(
                "Release {desc} does not match a known release in the collage. Was the line edited?"
            )))
        })?;
        edited_releases.push(CollageEntry {
            uuid: uuid.to_string(),
            description_meta: desc.to_string(),
            missing: false,
        });
    }

    fs::write(&path, toml::to_string_pretty(&CollageToml { releases: edited_releases })?)?;
    info!("Edited collage {} from EDITOR", collage_name);
    update_cache_for_collages(config, Some(vec![collage_name.to_string()]), true)?;
    Ok(())
}
