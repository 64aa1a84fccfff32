//! JSON shapes for the `print`/`print-all` CLI commands. Kept separate from [`crate::cache`] so
//! that cache queries and their on-the-wire representation can evolve independently.

use crate::cache::{CachedRelease, CachedTrack};
use crate::common::ArtistMapping;
use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::rule_parser::Matcher;
use serde_json::{json, Value};

fn artists_json(mapping: &ArtistMapping) -> Value {
    json!({
        "main": mapping.main,
        "guest": mapping.guest,
        "remixer": mapping.remixer,
        "producer": mapping.producer,
        "composer": mapping.composer,
        "conductor": mapping.conductor,
        "djmixer": mapping.djmixer,
    })
}

fn release_json(r: &CachedRelease) -> Value {
    json!({
        "id": r.id,
        "source_path": r.source_path,
        "cover_image_path": r.cover_image_path,
        "added_at": r.added_at,
        "releasetitle": r.releasetitle,
        "releasetype": r.releasetype,
        "releasedate": r.releasedate.map(|d| d.to_string()),
        "originaldate": r.originaldate.map(|d| d.to_string()),
        "compositiondate": r.compositiondate.map(|d| d.to_string()),
        "catalognumber": r.catalognumber,
        "edition": r.edition,
        "new": r.new,
        "disctotal": r.disctotal,
        "genres": r.genres,
        "parent_genres": r.parent_genres,
        "secondary_genres": r.secondary_genres,
        "parent_secondary_genres": r.parent_secondary_genres,
        "descriptors": r.descriptors,
        "labels": r.labels,
        "releaseartists": artists_json(&r.releaseartists),
    })
}

fn track_json(t: &CachedTrack, with_release_info: bool) -> Value {
    let mut obj = json!({
        "id": t.id,
        "source_path": t.source_path,
        "tracktitle": t.tracktitle,
        "tracknumber": t.tracknumber,
        "tracktotal": t.tracktotal,
        "discnumber": t.discnumber,
        "duration_seconds": t.duration_seconds,
        "trackartists": artists_json(&t.trackartists),
    });
    if with_release_info {
        let release = &t.release;
        let map = obj.as_object_mut().unwrap();
        map.insert("release_id".to_string(), json!(release.id));
        map.insert("added_at".to_string(), json!(release.added_at));
        map.insert("releasetitle".to_string(), json!(release.releasetitle));
        map.insert("releasetype".to_string(), json!(release.releasetype));
        map.insert("disctotal".to_string(), json!(release.disctotal));
        map.insert("releasedate".to_string(), json!(release.releasedate.map(|d| d.to_string())));
        map.insert("originaldate".to_string(), json!(release.originaldate.map(|d| d.to_string())));
        map.insert("compositiondate".to_string(), json!(release.compositiondate.map(|d| d.to_string())));
        map.insert("catalognumber".to_string(), json!(release.catalognumber));
        map.insert("edition".to_string(), json!(release.edition));
        map.insert("new".to_string(), json!(release.new));
        map.insert("genres".to_string(), json!(release.genres));
        map.insert("parent_genres".to_string(), json!(release.parent_genres));
        map.insert("secondary_genres".to_string(), json!(release.secondary_genres));
        map.insert("parent_secondary_genres".to_string(), json!(release.parent_secondary_genres));
        map.insert("descriptors".to_string(), json!(release.descriptors));
        map.insert("labels".to_string(), json!(release.labels));
        map.insert("releaseartists".to_string(), artists_json(&release.releaseartists));
    }
    obj
}

pub fn dump_release(config: &Config, release_id: &str) -> Result<String> {
    let release = crate::cache::get_release(config, release_id)?
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist { id: release_id.to_string() }))?;
    let tracks = crate::cache::get_tracks_of_release(config, release_id)?;
    let mut obj = release_json(&release);
    let tracks_json: Vec<Value> = tracks.iter().map(|(t, _)| track_json(t, false)).collect();
    obj.as_object_mut().unwrap().insert("tracks".to_string(), json!(tracks_json));
    Ok(serde_json::to_string(&obj)?)
}

pub fn dump_all_releases(config: &Config, matcher: Option<&Matcher>) -> Result<String> {
    let releases = match matcher {
        Some(m) => crate::releases::find_releases_matching_rule(config, m)?,
        None => crate::cache::list_releases(config)?,
    };
    let mut out = Vec::with_capacity(releases.len());
    for release in &releases {
        let tracks = crate::cache::get_tracks_of_release(config, &release.id)?;
        let mut obj = release_json(release);
        let tracks_json: Vec<Value> = tracks.iter().map(|(t, _)| track_json(t, false)).collect();
        obj.as_object_mut().unwrap().insert("tracks".to_string(), json!(tracks_json));
        out.push(obj);
    }
    Ok(serde_json::to_string(&out)?)
}

pub fn dump_track(config: &Config, track_id: &str) -> Result<String> {
    let track = crate::cache::get_track(config, track_id)?
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::TrackDoesNotExist { id: track_id.to_string() }))?;
    Ok(serde_json::to_string(&track_json(&track, true))?)
}

pub fn dump_all_tracks(config: &Config, matcher: Option<&Matcher>) -> Result<String> {
    let tracks = match matcher {
        Some(m) => crate::tracks::find_tracks_matching_rule(config, m)?,
        None => crate::cache::list_tracks(config)?,
    };
    let out: Vec<Value> = tracks.iter().map(|t| track_json(t, true)).collect();
    Ok(serde_json::to_string(&out)?)
}

fn collage_json(config: &Config, name: &str) -> Result<Value> {
    let releases = crate::cache::list_collage_releases(config, name)?;
    let releases_json: Vec<Value> = releases
        .iter()
        .enumerate()
        .map(|(idx, (release, _missing))| {
            let mut obj = release_json(release);
            obj.as_object_mut().unwrap().insert("position".to_string(), json!(idx + 1));
            obj
        })
        .collect();
    Ok(json!({ "name": name, "releases": releases_json }))
}

pub fn dump_collage(config: &Config, collage_name: &str) -> Result<String> {
    crate::cache::get_collage(config, collage_name)?
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::CollageDoesNotExist { name: collage_name.to_string() }))?;
    Ok(serde_json::to_string(&collage_json(config, collage_name)?)?)
}

pub fn dump_all_collages(config: &Config) -> Result<String> {
    let collages = crate::cache::list_collages(config)?;
    let mut out = Vec::with_capacity(collages.len());
    for collage in &collages {
        out.push(collage_json(config, &collage.name)?);
    }
    Ok(serde_json::to_string(&out)?)
}

fn playlist_json(config: &Config, name: &str, cover_path: Option<&std::path::Path>) -> Result<Value> {
    let tracks = crate::cache::get_playlist_tracks(config, name)?;
    let tracks_json: Vec<Value> = tracks
        .iter()
        .enumerate()
        .map(|(idx, (track, _missing))| {
            let mut obj = track_json(track, true);
            obj.as_object_mut().unwrap().insert("position".to_string(), json!(idx + 1));
            obj
        })
        .collect();
    Ok(json!({
        "name": name,
        "cover_image_path": cover_path,
        "tracks": tracks_json,
    }))
}

pub fn dump_playlist(config: &Config, playlist_name: &str) -> Result<String> {
    let playlist = crate::cache::get_playlist(config, playlist_name)?
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::PlaylistDoesNotExist { name: playlist_name.to_string() }))?;
    Ok(serde_json::to_string(&playlist_json(config, playlist_name, playlist.cover_path.as_deref())?)?)
}

pub fn dump_all_playlists(config: &Config) -> Result<String> {
    let playlists = crate::cache::list_playlists(config)?;
    let mut out = Vec::with_capacity(playlists.len());
    for playlist in &playlists {
        out.push(playlist_json(config, &playlist.name, playlist.cover_path.as_deref())?);
    }
    Ok(serde_json::to_string(&out)?)
}

pub fn dump_artist(config: &Config, artist: &str) -> Result<String> {
    if !crate::cache::artist_exists(config, artist)? {
        return Err(RoseError::Expected(RoseExpectedError::ArtistDoesNotExist { name: artist.to_string() }));
    }
    let releases = crate::cache::list_releases_by_artist(config, artist)?;
    Ok(serde_json::to_string(&json!({
        "name": artist,
        "releases": releases.iter().map(release_json).collect::<Vec<_>>(),
    }))?)
}

pub fn dump_all_artists(config: &Config) -> Result<String> {
    Ok(serde_json::to_string(&crate::cache::list_artists(config)?)?)
}

pub fn dump_genre(config: &Config, genre: &str) -> Result<String> {
    if !crate::cache::genre_exists(config, genre)? {
        return Err(RoseError::Expected(RoseExpectedError::GenreDoesNotExist { name: genre.to_string() }));
    }
    let releases = crate::cache::list_releases_by_genre(config, genre)?;
    Ok(serde_json::to_string(&json!({
        "name": genre,
        "parent_genres": crate::genre_hierarchy::get_parent_genres(genre),
        "releases": releases.iter().map(release_json).collect::<Vec<_>>(),
    }))?)
}

pub fn dump_all_genres(config: &Config) -> Result<String> {
    Ok(serde_json::to_string(&crate::cache::list_genres(config)?)?)
}

pub fn dump_label(config: &Config, label: &str) -> Result<String> {
    if !crate::cache::label_exists(config, label)? {
        return Err(RoseError::Expected(RoseExpectedError::LabelDoesNotExist { name: label.to_string() }));
    }
    let releases = crate::cache::list_releases_by_label(config, label)?;
    Ok(serde_json::to_string(&json!({
        "name": label,
        "releases": releases.iter().map(release_json).collect::<Vec<_>>(),
    }))?)
}

pub fn dump_all_labels(config: &Config) -> Result<String> {
    Ok(serde_json::to_string(&crate::cache::list_labels(config)?)?)
}

pub fn dump_descriptor(config: &Config, descriptor: &str) -> Result<String> {
    if !crate::cache::descriptor_exists(config, descriptor)? {
        return Err(RoseError::Expected(RoseExpectedError::DescriptorDoesNotExist { name: descriptor.to_string() }));
    }
    let releases = crate::cache::list_releases_by_descriptor(config, descriptor)?;
    Ok(serde_json::to_string(&json!({
        "name": descriptor,
        "releases": releases.iter().map(release_json).collect::<Vec<_>>(),
    }))?)
}

pub fn dump_all_descriptors(config: &Config) -> Result<String> {
    Ok(serde_json::to_string(&crate::cache::list_descriptors(config)?)?)
}
