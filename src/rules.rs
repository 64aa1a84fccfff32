// The rules module implements the Rules Engine, which provides performant substring tag querying and
// bulk metadata updating.
//
// The first part of this file implements the Rule Engine pipeline, which:
//
// 1. Fetches a superset of possible tracks from the Read Cache.
// 2. Filters out false positives via tags.
// 3. Executes actions to update metadata.
//
// The second part of this file provides performant release/track querying entirely from the read
// cache, which is used by other modules to provide release/track filtering capabilities.

use crate::audiotags::{AudioTags, RoseDate};
use crate::cache::{connect, cached_release_from_view, cached_track_from_view, CachedRelease, CachedTrack};
use crate::common::{Artist, ArtistMapping, uniq};
use crate::config::Config;
use crate::datafiles::StoredDataFile;
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::rule_parser::{
    is_single_valued, Action, ActionBehavior, AddAction, DeleteAction, Matcher, Pattern, ReplaceAction, Rule,
    SedAction, SplitAction, Tag,
};
use regex::Regex;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug)]
pub struct TrackTagNotAllowedError(pub String);

impl std::fmt::Display for TrackTagNotAllowedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Track tag not allowed: {}", self.0)
    }
}

impl std::error::Error for TrackTagNotAllowedError {}

#[derive(Debug)]
pub struct InvalidReplacementValueError(pub String);

impl std::fmt::Display for InvalidReplacementValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid replacement value: {}", self.0)
    }
}

impl std::error::Error for InvalidReplacementValueError {}

// Python: def execute_stored_metadata_rules(
pub fn execute_stored_metadata_rules(
    config: &Config,
    dry_run: bool,
    confirm_yes: bool,
) -> Result<()> {
    for config_rule in &config.stored_metadata_rules {
        info!("Executing stored metadata rule {:?}", config_rule);
        
        // Parse the rule from config
        let matcher = Matcher::parse(&config_rule.matcher)
            .map_err(|e| RoseError::Generic(format!("Failed to parse matcher: {}", e)))?;
            
        let mut actions = Vec::new();
        for (i, action_str) in config_rule.actions.iter().enumerate() {
            let action = Action::parse(action_str, i + 1, Some(&matcher))
                .map_err(|e| RoseError::Generic(format!("Failed to parse action: {}", e)))?;
            actions.push(action);
        }
        
        let rule = Rule {
            matcher,
            actions,
            ignore: Vec::new(),
        };
        
        execute_metadata_rule(config, &rule, dry_run, confirm_yes, 25)?;
    }
    Ok(())
}

// Python: def execute_metadata_rule(
pub fn execute_metadata_rule(
    config: &Config,
    rule: &Rule,
    dry_run: bool,
    confirm_yes: bool,
    enter_number_to_confirm_above_count: usize,
) -> Result<()> {
    // This function executes a metadata update rule. It runs in five parts:
    //
    // 1. Run a search query on our Full Text Search index. This is far more performant than the SQL
    //    LIKE operation; however, it is also less precise. It produces false positives, but should not
    //    produce false negatives. So we then run:
    // 2. Read the files returned from the search query and remove all false positives.
    // 3. We then run the actions on each valid matched file and store all the intended changes
    //    in-memory. No changes are written to disk.
    // 4. We then prompt the user to confirm the changes, assuming confirm_yes is True.
    // 5. We then flush the intended changes to disk.
    
    info!("Executing metadata rule: {:?}", rule);
    
    let fast_search_results = fast_search_for_matching_tracks(config, &rule.matcher)?;
    if fast_search_results.is_empty() {
        info!("No matching tracks found");
        return Ok(());
    }
    
    debug!("Fast search found {} potential matching tracks", fast_search_results.len());
    
    let matching_tracks = filter_track_false_positives_using_tags(
        config,
        &rule.matcher,
        &rule.ignore,
        &fast_search_results,
    )?;
    
    if matching_tracks.is_empty() {
        info!("No tracks remaining after filtering false positives");
        return Ok(());
    }
    
    info!("Matched {} tracks", matching_tracks.len());

    // Compute the diff without touching disk, regardless of `dry_run`: we need to show the user
    // what would change before asking them to confirm it.
    let changes = execute_metadata_actions(
        config,
        &rule.actions,
        &matching_tracks,
        true,
    )?;

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

    if !confirm_yes {
        if !confirm_changes(changes.len(), enter_number_to_confirm_above_count)? {
            info!("Aborting: changes not confirmed");
            return Ok(());
        }
    }

    // Re-run the action pipeline, this time actually flushing tags to disk.
    execute_metadata_actions(config, &rule.actions, &matching_tracks, false)?;

    // Targeted cache refresh: only the releases whose tracks were touched need rescanning, and
    // the subsequent refresh must observe the writes we just made.
    let mut release_dirs: Vec<std::path::PathBuf> = matching_tracks
        .iter()
        .map(|(_, release)| release.source_path.clone())
        .collect();
    release_dirs.sort();
    release_dirs.dedup();
    crate::cache_update::update_cache_for_releases(config, Some(release_dirs), true)?;

    Ok(())
}

/// Prompts on stdin for confirmation before flushing a batch of rule-engine changes. Above
/// `enter_number_to_confirm_above_count`, the user must retype the exact count rather than just
/// answering yes/no, to make large accidental bulk edits harder to rubber-stamp.
pub(crate) fn confirm_changes(count: usize, enter_number_to_confirm_above_count: usize) -> Result<bool> {
    use std::io::{self, Write};
    if count > enter_number_to_confirm_above_count {
        print!("This will affect {count} tracks. Type {count} to confirm: ");
        io::stdout().flush().ok();
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(input.trim() == count.to_string())
    } else {
        print!("Write {count} changes to disk? [y/N] ");
        io::stdout().flush().ok();
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

// Python: def fast_search_for_matching_tracks(
pub fn fast_search_for_matching_tracks(
    config: &Config,
    matcher: &Matcher,
) -> Result<Vec<(CachedTrack, CachedRelease)>> {
    let conn = connect(config)?;
    
    // Build the FTS query
    let fts_query = build_fts_query(matcher)?;
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }
    
    debug!("FTS query: {}", fts_query);
    
    // Execute the search
    let sql = r#"
        SELECT DISTINCT 
            tv.*, 
            rv.*
        FROM rules_engine_fts fts
        JOIN tracks_view tv ON tv.rowid = fts.rowid
        JOIN releases_view rv ON rv.id = tv.release_id
        WHERE rules_engine_fts MATCH ?1
    "#;
    
    let mut stmt = conn.prepare(sql)?;
    let results = stmt.query_map(params![fts_query], |row| {
        // Need to parse both track and release from the joined view
        let release = cached_release_from_view(config, row, false)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let track = cached_track_from_view(config, row, release.clone(), false)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok((track, release))
    })?;
    
    let mut tracks = Vec::new();
    for result in results {
        tracks.push(result?);
    }
    
    Ok(tracks)
}

// Build FTS query from matcher
fn build_fts_query(matcher: &Matcher) -> Result<String> {
    // In the actual implementation, Matcher has a single pattern and a list of tags
    let fts_pattern = pattern_to_fts_pattern(&matcher.pattern)?;
    if fts_pattern.is_empty() {
        return Ok(String::new());
    }

    let mut parts = Vec::new();
    for tag in &matcher.tags {
        let fts_column = tag_to_fts_column(tag)?;
        parts.push(format!("{}: {}", fts_column, fts_pattern));
    }

    Ok(parts.join(" OR "))
}

// Map tag names to FTS column names
fn tag_to_fts_column(tag: &Tag) -> Result<&'static str> {
    Ok(match tag {
        Tag::TrackTitle => "tracktitle",
        Tag::TrackNumber => "tracknumber",
        Tag::TrackTotal => "tracktotal",
        Tag::DiscNumber => "discnumber",
        Tag::DiscTotal => "disctotal",
        Tag::ReleaseTitle => "releasetitle",
        Tag::ReleaseType => "releasetype",
        Tag::ReleaseDate => "releasedate",
        Tag::OriginalDate => "originaldate",
        Tag::CompositionDate => "compositiondate",
        Tag::Edition => "edition",
        Tag::CatalogNumber => "catalognumber",
        Tag::Genre => "genre",
        Tag::SecondaryGenre => "secondarygenre",
        Tag::Descriptor => "descriptor",
        Tag::Label => "label",
        Tag::ReleaseArtistMain | Tag::ReleaseArtistGuest | Tag::ReleaseArtistRemixer |
        Tag::ReleaseArtistProducer | Tag::ReleaseArtistComposer | Tag::ReleaseArtistConductor |
        Tag::ReleaseArtistDjMixer => "releaseartist",
        Tag::TrackArtistMain | Tag::TrackArtistGuest | Tag::TrackArtistRemixer |
        Tag::TrackArtistProducer | Tag::TrackArtistComposer | Tag::TrackArtistConductor |
        Tag::TrackArtistDjMixer => "trackartist",
        Tag::New => "new",
    })
}

// Convert pattern to FTS query.
//
// The FTS columns are tokenized one character per token (`process_string_for_fts` joins every
// character with the U+00AC separator, which the `unicode61` tokenizer then splits on). To search
// for a substring we mirror that tokenization on the query side and wrap it in a `NEAR` so that the
// characters must appear contiguously (within some slop) and in order. `strict_start`/`strict_end`
// can't be expressed in FTS5 at all, so this is only ever a fast pre-filter: every hit still gets
// re-checked against the real tag value by `filter_track_false_positives_using_tags` /
// `filter_release_false_positives_using_read_cache`.
fn pattern_to_fts_pattern(pattern: &Pattern) -> Result<String> {
    let chars: Vec<char> = pattern.needle.chars().collect();
    if chars.is_empty() {
        return Ok(String::new());
    }

    let tokens: Vec<String> = chars
        .iter()
        .map(|c| format!("\"{}\"", c.to_string().replace('"', "\"\"")))
        .collect();

    if tokens.len() == 1 {
        return Ok(tokens.into_iter().next().unwrap());
    }

    let slop = tokens.len().saturating_sub(2);
    Ok(format!("NEAR({}, {})", tokens.join(" "), slop))
}

// Python: def filter_track_false_positives_using_tags(
pub fn filter_track_false_positives_using_tags(
    config: &Config,
    matcher: &Matcher,
    ignore: &[Matcher],
    tracks: &[(CachedTrack, CachedRelease)],
) -> Result<Vec<(CachedTrack, CachedRelease)>> {
    let mut filtered = Vec::new();

    'track: for (track, release) in tracks {
        // Read the actual tags from the file
        let tags = AudioTags::from_file(&track.source_path)?;

        // Check if any of the tags match the pattern
        let mut any_match = false;
        for tag in &matcher.tags {
            let values = get_tag_value(&tags, track, release, tag)?;
            if matches_pattern(&values, &matcher.pattern, tag)? {
                any_match = true;
                break;
            }
        }

        if !any_match {
            continue;
        }

        // An ignore-matcher hit discards the entire track, even though it matched above.
        for ignore_matcher in ignore {
            for tag in &ignore_matcher.tags {
                let values = get_tag_value(&tags, track, release, tag)?;
                if matches_pattern(&values, &ignore_matcher.pattern, tag)? {
                    continue 'track;
                }
            }
        }

        filtered.push((track.clone(), release.clone()));
    }

    Ok(filtered)
}

// Get the value of a tag from AudioTags or cached data
fn get_tag_value(
    tags: &AudioTags,
    track: &CachedTrack,
    release: &CachedRelease,
    tag: &Tag,
) -> Result<Vec<String>> {
    Ok(match tag {
        Tag::TrackTitle => vec![tags.tracktitle.clone().unwrap_or_default()],
        Tag::TrackNumber => vec![tags.tracknumber.clone().unwrap_or_default()],
        Tag::TrackTotal => vec![track.tracktotal.to_string()],
        Tag::DiscNumber => vec![tags.discnumber.clone().unwrap_or_default()],
        Tag::DiscTotal => vec![release.disctotal.to_string()],
        
        Tag::TrackArtistMain => tags.trackartists.main.iter().map(|a| a.name.clone()).collect(),
        Tag::TrackArtistGuest => tags.trackartists.guest.iter().map(|a| a.name.clone()).collect(),
        Tag::TrackArtistRemixer => tags.trackartists.remixer.iter().map(|a| a.name.clone()).collect(),
        Tag::TrackArtistProducer => tags.trackartists.producer.iter().map(|a| a.name.clone()).collect(),
        Tag::TrackArtistComposer => tags.trackartists.composer.iter().map(|a| a.name.clone()).collect(),
        Tag::TrackArtistConductor => tags.trackartists.conductor.iter().map(|a| a.name.clone()).collect(),
        Tag::TrackArtistDjMixer => tags.trackartists.djmixer.iter().map(|a| a.name.clone()).collect(),
        
        // Release tags from cached data
        Tag::ReleaseTitle => vec![release.releasetitle.clone()],
        Tag::ReleaseType => vec![release.releasetype.clone()],
        Tag::ReleaseDate => vec![release.releasedate.as_ref().map(|d| d.to_string()).unwrap_or_default()],
        Tag::OriginalDate => vec![release.originaldate.as_ref().map(|d| d.to_string()).unwrap_or_default()],
        Tag::CompositionDate => vec![release.compositiondate.as_ref().map(|d| d.to_string()).unwrap_or_default()],
        Tag::Edition => vec![release.edition.clone().unwrap_or_default()],
        Tag::CatalogNumber => vec![release.catalognumber.clone().unwrap_or_default()],
        Tag::Genre => release.genres.clone(),
        Tag::SecondaryGenre => release.secondary_genres.clone(),
        Tag::Descriptor => release.descriptors.clone(),
        Tag::Label => release.labels.clone(),
        
        Tag::ReleaseArtistMain => release.releaseartists.main.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistGuest => release.releaseartists.guest.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistRemixer => release.releaseartists.remixer.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistProducer => release.releaseartists.producer.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistComposer => release.releaseartists.composer.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistConductor => release.releaseartists.conductor.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistDjMixer => release.releaseartists.djmixer.iter().map(|a| a.name.clone()).collect(),
        
        Tag::New => vec![if release.new { "true" } else { "false" }.to_string()],
    })
}

// Python: def matches_pattern(
pub fn matches_pattern(values: &[String], pattern: &Pattern, tag: &Tag) -> Result<bool> {
    // For multi-value fields, ANY value matching means success
    for value in values {
        let value_to_check = if pattern.case_insensitive || matches!(tag, Tag::Genre | Tag::SecondaryGenre) {
            value.to_lowercase()
        } else {
            value.clone()
        };
        
        let needle = if pattern.case_insensitive || matches!(tag, Tag::Genre | Tag::SecondaryGenre) {
            pattern.needle.to_lowercase()
        } else {
            pattern.needle.clone()
        };
        
        let matches = if pattern.strict_start && pattern.strict_end {
            value_to_check == needle
        } else if pattern.strict_start {
            value_to_check.starts_with(&needle)
        } else if pattern.strict_end {
            value_to_check.ends_with(&needle)
        } else {
            value_to_check.contains(&needle)
        };
        
        if matches {
            return Ok(true);
        }
    }
    
    Ok(false)
}

// Python: def execute_metadata_actions(
pub fn execute_metadata_actions(
    config: &Config,
    actions: &[Action],
    tracks: &[(CachedTrack, CachedRelease)],
    dry_run: bool,
) -> Result<Vec<(CachedTrack, HashMap<String, Vec<String>>)>> {
    let mut changes = Vec::new();
    // Sidecar ("new" flag) state, keyed by release source dir. Shared and mutated across every
    // track of the same release so that repeated reads see each other's writes, and flushed once
    // per release rather than once per track.
    let mut release_datafiles: HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)> = HashMap::new();

    for (track, release) in tracks {
        let mut tags = AudioTags::from_file(&track.source_path)?;
        let mut modified = false;
        let mut changes_map = HashMap::new();

        // Apply each action
        for action in actions {
            let (action_modified, action_changes) = execute_single_action(
                config,
                action,
                &mut tags,
                track,
                release,
                &mut release_datafiles,
            )?;

            if action_modified {
                modified = true;
                for (tag, values) in action_changes {
                    changes_map.insert(tag, values);
                }
            }
        }

        if modified {
            // Only the audio-tag-backed fields need a write through the tagging layer; a pure
            // "new" change is flushed separately to the sidecar below.
            let audio_tags_modified = changes_map.keys().any(|k| k.as_str() != Tag::New.as_str());
            if !dry_run && audio_tags_modified {
                tags.flush(config, true)?;
            }
            changes.push((track.clone(), changes_map));
        }
    }

    if !dry_run {
        for (path, datafile) in release_datafiles.values() {
            crate::datafiles::write_datafile(path, datafile)?;
        }
    }

    Ok(changes)
}

// Python: def execute_single_action(
fn execute_single_action(
    config: &Config,
    action: &Action,
    tags: &mut AudioTags,
    track: &CachedTrack,
    release: &CachedRelease,
    release_datafiles: &mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
) -> Result<(bool, HashMap<String, Vec<String>>)> {
    let mut changes = HashMap::new();
    let pattern = action.pattern.as_ref();
    let modified = match &action.behavior {
        ActionBehavior::Replace(replace_action) => {
            execute_replace_action(replace_action, tags, track, release, release_datafiles, &action.tags, pattern, &mut changes)?
        }
        ActionBehavior::Sed(sed_action) => {
            execute_sed_action(sed_action, tags, track, release, release_datafiles, &action.tags, &mut changes)?
        }
        ActionBehavior::Split(split_action) => {
            execute_split_action(split_action, tags, track, release, release_datafiles, &action.tags, pattern, &mut changes)?
        }
        ActionBehavior::Add(add_action) => {
            execute_add_action(add_action, tags, track, release, release_datafiles, &action.tags, &mut changes)?
        }
        ActionBehavior::Delete(delete_action) => {
            execute_delete_action(delete_action, tags, track, release, release_datafiles, &action.tags, pattern, &mut changes)?
        }
    };

    Ok((modified, changes))
}

/// Load (and cache) the sidecar datafile for a release, keyed by its source directory, so that
/// every track belonging to the same release shares one in-memory copy.
fn load_release_datafile<'a>(
    release: &CachedRelease,
    release_datafiles: &'a mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
) -> Result<&'a mut (std::path::PathBuf, StoredDataFile)> {
    if !release_datafiles.contains_key(&release.source_path) {
        let (path, _uuid) = crate::datafiles::find_release_datafile(&release.source_path)?
            .ok_or_else(|| RoseError::Generic(format!("Release data file not found in {:?}", release.source_path)))?;
        let datafile = crate::datafiles::read_datafile(&path)?;
        release_datafiles.insert(release.source_path.clone(), (path, datafile));
    }
    Ok(release_datafiles.get_mut(&release.source_path).unwrap())
}

fn role_vec(mapping: &ArtistMapping, tag: &Tag) -> Option<&Vec<Artist>> {
    match tag {
        Tag::TrackArtistMain | Tag::ReleaseArtistMain => Some(&mapping.main),
        Tag::TrackArtistGuest | Tag::ReleaseArtistGuest => Some(&mapping.guest),
        Tag::TrackArtistRemixer | Tag::ReleaseArtistRemixer => Some(&mapping.remixer),
        Tag::TrackArtistProducer | Tag::ReleaseArtistProducer => Some(&mapping.producer),
        Tag::TrackArtistComposer | Tag::ReleaseArtistComposer => Some(&mapping.composer),
        Tag::TrackArtistConductor | Tag::ReleaseArtistConductor => Some(&mapping.conductor),
        Tag::TrackArtistDjMixer | Tag::ReleaseArtistDjMixer => Some(&mapping.djmixer),
        _ => None,
    }
}

fn role_vec_mut<'a>(mapping: &'a mut ArtistMapping, tag: &Tag) -> Option<&'a mut Vec<Artist>> {
    match tag {
        Tag::TrackArtistMain | Tag::ReleaseArtistMain => Some(&mut mapping.main),
        Tag::TrackArtistGuest | Tag::ReleaseArtistGuest => Some(&mut mapping.guest),
        Tag::TrackArtistRemixer | Tag::ReleaseArtistRemixer => Some(&mut mapping.remixer),
        Tag::TrackArtistProducer | Tag::ReleaseArtistProducer => Some(&mut mapping.producer),
        Tag::TrackArtistComposer | Tag::ReleaseArtistComposer => Some(&mut mapping.composer),
        Tag::TrackArtistConductor | Tag::ReleaseArtistConductor => Some(&mut mapping.conductor),
        Tag::TrackArtistDjMixer | Tag::ReleaseArtistDjMixer => Some(&mut mapping.djmixer),
        _ => None,
    }
}

fn is_track_artist_tag(tag: &Tag) -> bool {
    matches!(
        tag,
        Tag::TrackArtistMain | Tag::TrackArtistGuest | Tag::TrackArtistRemixer | Tag::TrackArtistProducer | Tag::TrackArtistComposer | Tag::TrackArtistConductor | Tag::TrackArtistDjMixer
    )
}

fn is_release_artist_tag(tag: &Tag) -> bool {
    matches!(
        tag,
        Tag::ReleaseArtistMain | Tag::ReleaseArtistGuest | Tag::ReleaseArtistRemixer | Tag::ReleaseArtistProducer | Tag::ReleaseArtistComposer | Tag::ReleaseArtistConductor | Tag::ReleaseArtistDjMixer
    )
}

/// Read the current value(s) of a modifiable tag, as a list (always length 1 for single-valued
/// tags). Every tag except `new` lives on the in-memory `AudioTags`; `new` is sidecar-backed, so
/// it is read through the per-release datafile cache instead.
fn tag_get(
    tags: &AudioTags,
    release: &CachedRelease,
    release_datafiles: &mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
    tag: &Tag,
) -> Result<Vec<String>> {
    if is_track_artist_tag(tag) {
        if let Some(artists) = role_vec(&tags.trackartists, tag) {
            return Ok(artists.iter().map(|a| a.name.clone()).collect());
        }
    }
    if is_release_artist_tag(tag) {
        if let Some(artists) = role_vec(&tags.releaseartists, tag) {
            return Ok(artists.iter().map(|a| a.name.clone()).collect());
        }
    }
    Ok(match tag {
        Tag::TrackTitle => tags.tracktitle.clone().into_iter().collect(),
        Tag::TrackNumber => tags.tracknumber.clone().into_iter().collect(),
        Tag::DiscNumber => tags.discnumber.clone().into_iter().collect(),
        Tag::ReleaseTitle => tags.releasetitle.clone().into_iter().collect(),
        Tag::ReleaseType => vec![tags.releasetype.clone()],
        Tag::ReleaseDate => tags.releasedate.as_ref().map(|d| d.to_string()).into_iter().collect(),
        Tag::OriginalDate => tags.originaldate.as_ref().map(|d| d.to_string()).into_iter().collect(),
        Tag::CompositionDate => tags.compositiondate.as_ref().map(|d| d.to_string()).into_iter().collect(),
        Tag::Edition => tags.edition.clone().into_iter().collect(),
        Tag::CatalogNumber => tags.catalognumber.clone().into_iter().collect(),
        Tag::Genre => tags.genre.clone(),
        Tag::SecondaryGenre => tags.secondarygenre.clone(),
        Tag::Descriptor => tags.descriptor.clone(),
        Tag::Label => tags.label.clone(),
        Tag::New => {
            let (_, datafile) = load_release_datafile(release, release_datafiles)?;
            vec![if datafile.new { "true" } else { "false" }.to_string()]
        }
        _ => vec![],
    })
}

/// Write new value(s) for a modifiable tag. `new` is written to the per-release datafile cache
/// (flushed to the sidecar once all tracks have been processed); every other tag is written onto
/// the in-memory `AudioTags` (flushed to the file when the caller is done with it).
fn tag_set(
    tags: &mut AudioTags,
    release: &CachedRelease,
    release_datafiles: &mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
    tag: &Tag,
    values: Vec<String>,
) -> Result<()> {
    if is_track_artist_tag(tag) {
        if let Some(v) = role_vec_mut(&mut tags.trackartists, tag) {
            *v = values.into_iter().map(Artist::new).collect();
        }
        return Ok(());
    }
    if is_release_artist_tag(tag) {
        if let Some(v) = role_vec_mut(&mut tags.releaseartists, tag) {
            *v = values.into_iter().map(Artist::new).collect();
        }
        return Ok(());
    }
    match tag {
        Tag::TrackTitle => tags.tracktitle = values.into_iter().next(),
        Tag::TrackNumber => tags.tracknumber = values.into_iter().next(),
        Tag::DiscNumber => tags.discnumber = values.into_iter().next(),
        Tag::ReleaseTitle => tags.releasetitle = values.into_iter().next(),
        Tag::ReleaseType => tags.releasetype = values.into_iter().next().unwrap_or_default(),
        Tag::ReleaseDate => {
            let v = values.into_iter().next();
            tags.releasedate = parse_replacement_date(v.as_deref(), "releasedate")?;
        }
        Tag::OriginalDate => {
            let v = values.into_iter().next();
            tags.originaldate = parse_replacement_date(v.as_deref(), "originaldate")?;
        }
        Tag::CompositionDate => {
            let v = values.into_iter().next();
            tags.compositiondate = parse_replacement_date(v.as_deref(), "compositiondate")?;
        }
        Tag::Edition => tags.edition = values.into_iter().next(),
        Tag::CatalogNumber => tags.catalognumber = values.into_iter().next(),
        Tag::Genre => tags.genre = values,
        Tag::SecondaryGenre => tags.secondarygenre = values,
        Tag::Descriptor => tags.descriptor = values,
        Tag::Label => tags.label = values,
        Tag::New => {
            let value = values.into_iter().next().unwrap_or_default();
            let new_value = match value.as_str() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(RoseError::Expected(RoseExpectedError::InvalidReplacementValue(format!(
                        "Failed to assign new value {other} to new: value must be string `true` or `false`"
                    ))))
                }
            };
            let (_, datafile) = load_release_datafile(release, release_datafiles)?;
            datafile.new = new_value;
        }
        _ => {}
    }
    Ok(())
}

/// A failed date parse on a rule-engine replacement value is a user error (`§7
/// InvalidReplacementValue`), not a silent clear of the field.
fn parse_replacement_date(value: Option<&str>, field: &str) -> Result<Option<RoseDate>> {
    match value {
        None | Some("") => Ok(None),
        Some(v) => RoseDate::parse(Some(v)).map(Some).ok_or_else(|| {
            RoseError::Expected(RoseExpectedError::InvalidReplacementValue(format!(
                "Failed to assign new value {v} to {field}: value must be a date string"
            )))
        }),
    }
}

fn record_change(changes: &mut HashMap<String, Vec<String>>, tag: &Tag, values: Vec<String>) {
    changes.insert(tag.as_str().to_string(), values);
}

// Execute a replace action
fn execute_replace_action(
    action: &ReplaceAction,
    tags: &mut AudioTags,
    _track: &CachedTrack,
    release: &CachedRelease,
    release_datafiles: &mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
    action_tags: &[Tag],
    pattern: Option<&Pattern>,
    changes: &mut HashMap<String, Vec<String>>,
) -> Result<bool> {
    let mut modified = false;
    for tag in action_tags {
        let current = tag_get(tags, release, release_datafiles, tag)?;
        if current.is_empty() {
            continue;
        }
        let new_values: Vec<String> = if is_single_valued(*tag) {
            vec![action.replacement.clone()]
        } else {
            let replacement: Vec<String> = action.replacement.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            match pattern {
                None => replacement,
                Some(p) => {
                    let mut next = Vec::new();
                    let mut replaced = false;
                    for v in &current {
                        if value_matches(v, p) {
                            if !replaced {
                                next.extend(replacement.iter().cloned());
                                replaced = true;
                            }
                        } else {
                            next.push(v.clone());
                        }
                    }
                    next
                }
            }
        };
        if new_values != current {
            tag_set(tags, release, release_datafiles, tag, new_values.clone())?;
            record_change(changes, tag, new_values);
            modified = true;
        }
    }
    Ok(modified)
}

// Execute a sed action
fn execute_sed_action(
    action: &SedAction,
    tags: &mut AudioTags,
    _track: &CachedTrack,
    release: &CachedRelease,
    release_datafiles: &mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
    action_tags: &[Tag],
    changes: &mut HashMap<String, Vec<String>>,
) -> Result<bool> {
    let mut modified = false;
    for tag in action_tags {
        let current = tag_get(tags, release, release_datafiles, tag)?;
        if current.is_empty() {
            continue;
        }
        let new_values: Vec<String> = current.iter().map(|v| action.src.replace_all(v, action.dst.as_str()).into_owned()).collect();
        if new_values != current {
            tag_set(tags, release, release_datafiles, tag, new_values.clone())?;
            record_change(changes, tag, new_values);
            modified = true;
        }
    }
    Ok(modified)
}

// Execute a split action
fn execute_split_action(
    action: &SplitAction,
    tags: &mut AudioTags,
    _track: &CachedTrack,
    release: &CachedRelease,
    release_datafiles: &mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
    action_tags: &[Tag],
    pattern: Option<&Pattern>,
    changes: &mut HashMap<String, Vec<String>>,
) -> Result<bool> {
    let mut modified = false;
    for tag in action_tags {
        if is_single_valued(*tag) {
            continue;
        }
        let current = tag_get(tags, release, release_datafiles, tag)?;
        if current.is_empty() {
            continue;
        }
        let mut new_values = Vec::new();
        let mut changed = false;
        for v in &current {
            if pattern.is_some_and(|p| !value_matches(v, p)) {
                new_values.push(v.clone());
                continue;
            }
            if v.contains(action.delimiter.as_str()) {
                changed = true;
                for piece in v.split(action.delimiter.as_str()) {
                    if !piece.is_empty() {
                        new_values.push(piece.to_string());
                    }
                }
            } else {
                new_values.push(v.clone());
            }
        }
        if changed {
            tag_set(tags, release, release_datafiles, tag, new_values.clone())?;
            record_change(changes, tag, new_values);
            modified = true;
        }
    }
    Ok(modified)
}

// Execute an add action
fn execute_add_action(
    action: &AddAction,
    tags: &mut AudioTags,
    _track: &CachedTrack,
    release: &CachedRelease,
    release_datafiles: &mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
    action_tags: &[Tag],
    changes: &mut HashMap<String, Vec<String>>,
) -> Result<bool> {
    let mut modified = false;
    for tag in action_tags {
        if is_single_valued(*tag) {
            continue;
        }
        let mut current = tag_get(tags, release, release_datafiles, tag)?;
        if current.iter().any(|v| v == &action.value) {
            continue;
        }
        current.push(action.value.clone());
        tag_set(tags, release, release_datafiles, tag, current.clone())?;
        record_change(changes, tag, current);
        modified = true;
    }
    Ok(modified)
}

// Execute a delete action
fn execute_delete_action(
    _action: &DeleteAction,
    tags: &mut AudioTags,
    _track: &CachedTrack,
    release: &CachedRelease,
    release_datafiles: &mut HashMap<std::path::PathBuf, (std::path::PathBuf, StoredDataFile)>,
    action_tags: &[Tag],
    pattern: Option<&Pattern>,
    changes: &mut HashMap<String, Vec<String>>,
) -> Result<bool> {
    let mut modified = false;
    for tag in action_tags {
        let current = tag_get(tags, release, release_datafiles, tag)?;
        if current.is_empty() {
            continue;
        }
        let new_values: Vec<String> = match pattern {
            None => Vec::new(),
            Some(p) => current.iter().filter(|v| !value_matches(v, p)).cloned().collect(),
        };
        if new_values != current {
            tag_set(tags, release, release_datafiles, tag, new_values.clone())?;
            record_change(changes, tag, new_values);
            modified = true;
        }
    }
    Ok(modified)
}

fn value_matches(value: &str, pattern: &Pattern) -> bool {
    let value = if pattern.case_insensitive { value.to_lowercase() } else { value.to_string() };
    let needle = if pattern.case_insensitive { pattern.needle.to_lowercase() } else { pattern.needle.clone() };
    if pattern.strict_start && pattern.strict_end {
        value == needle
    } else if pattern.strict_start {
        value.starts_with(&needle)
    } else if pattern.strict_end {
        value.ends_with(&needle)
    } else {
        value.contains(&needle)
    }
}

// Python: def fast_search_for_matching_releases(
pub fn fast_search_for_matching_releases(
    config: &Config,
    matcher: &Matcher,
) -> Result<Vec<CachedRelease>> {
    let conn = connect(config)?;
    
    // Build the FTS query
    let fts_query = build_fts_query(matcher)?;
    if fts_query.is_empty() {
        return Ok(Vec::new());
    }
    
    debug!("FTS query for releases: {}", fts_query);
    
    // Execute the search - releases are found via their tracks in the FTS index
    let sql = r#"
        SELECT DISTINCT rv.*
        FROM rules_engine_fts fts
        JOIN tracks_view tv ON tv.rowid = fts.rowid
        JOIN releases_view rv ON rv.id = tv.release_id
        WHERE rules_engine_fts MATCH ?1
    "#;
    
    let mut stmt = conn.prepare(sql)?;
    let results = stmt.query_map(params![fts_query], |row| {
        cached_release_from_view(config, row, false)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    })?;
    
    let mut releases = Vec::new();
    for result in results {
        releases.push(result?);
    }
    
    Ok(releases)
}

// Python: def filter_release_false_positives_using_read_cache(
pub fn filter_release_false_positives_using_read_cache(
    config: &Config,
    matcher: &Matcher,
    releases: &[CachedRelease],
) -> Result<Vec<CachedRelease>> {
    let mut filtered = Vec::new();
    
    for release in releases {
        // Check if any of the tags match the pattern using cached data
        let mut any_match = false;
        for tag in &matcher.tags {
            let values = get_release_tag_value(release, tag)?;
            if matches_pattern(&values, &matcher.pattern, tag)? {
                any_match = true;
                break;
            }
        }
        
        if any_match {
            filtered.push(release.clone());
        }
    }
    
    Ok(filtered)
}

// Get the value of a tag from cached release data
fn get_release_tag_value(release: &CachedRelease, tag: &Tag) -> Result<Vec<String>> {
    Ok(match tag {
        Tag::ReleaseTitle => vec![release.releasetitle.clone()],
        Tag::ReleaseType => vec![release.releasetype.clone()],
        Tag::ReleaseDate => vec![release.releasedate.as_ref().map(|d| d.to_string()).unwrap_or_default()],
        Tag::OriginalDate => vec![release.originaldate.as_ref().map(|d| d.to_string()).unwrap_or_default()],
        Tag::CompositionDate => vec![release.compositiondate.as_ref().map(|d| d.to_string()).unwrap_or_default()],
        Tag::Edition => vec![release.edition.clone().unwrap_or_default()],
        Tag::CatalogNumber => vec![release.catalognumber.clone().unwrap_or_default()],
        Tag::Genre => release.genres.clone(),
        Tag::SecondaryGenre => release.secondary_genres.clone(),
        Tag::Descriptor => release.descriptors.clone(),
        Tag::Label => release.labels.clone(),
        Tag::ReleaseArtistMain => release.releaseartists.main.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistGuest => release.releaseartists.guest.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistRemixer => release.releaseartists.remixer.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistProducer => release.releaseartists.producer.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistComposer => release.releaseartists.composer.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistConductor => release.releaseartists.conductor.iter().map(|a| a.name.clone()).collect(),
        Tag::ReleaseArtistDjMixer => release.releaseartists.djmixer.iter().map(|a| a.name.clone()).collect(),
        Tag::New => vec![if release.new { "true" } else { "false" }.to_string()],
        Tag::DiscTotal => vec![release.disctotal.to_string()],
        _ => return Err(RoseError::Generic(format!("Tag {:?} not available for releases", tag))),
    })
}

// Python: def filter_track_false_positives_using_read_cache(
pub fn filter_track_false_positives_using_read_cache(
    config: &Config,
    matcher: &Matcher,
    tracks: &[CachedTrack],
) -> Result<Vec<CachedTrack>> {
    let mut result = Vec::new();
    
    for track in tracks {
        let mut matched = false;
        
        for tag in &matcher.tags {
            let values = match tag {
                Tag::TrackTitle => vec![track.tracktitle.clone()],
                Tag::TrackNumber => vec![track.tracknumber.clone()],
                Tag::DiscNumber => vec![track.discnumber.clone()],
                Tag::TrackArtistMain => track.trackartists.main.iter().map(|a| a.name.clone()).collect(),
                Tag::TrackArtistGuest => track.trackartists.guest.iter().map(|a| a.name.clone()).collect(),
                Tag::TrackArtistRemixer => track.trackartists.remixer.iter().map(|a| a.name.clone()).collect(),
                Tag::TrackArtistProducer => track.trackartists.producer.iter().map(|a| a.name.clone()).collect(),
                Tag::TrackArtistComposer => track.trackartists.composer.iter().map(|a| a.name.clone()).collect(),
                Tag::TrackArtistConductor => track.trackartists.conductor.iter().map(|a| a.name.clone()).collect(),
                Tag::TrackArtistDjMixer => track.trackartists.djmixer.iter().map(|a| a.name.clone()).collect(),
                // Release tags
                Tag::ReleaseTitle => vec![track.release.releasetitle.clone()],
                Tag::ReleaseType => vec![track.release.releasetype.clone()],
                Tag::ReleaseDate => track.release.releasedate.as_ref().map(|d| vec![d.to_string()]).unwrap_or_default(),
                Tag::OriginalDate => track.release.originaldate.as_ref().map(|d| vec![d.to_string()]).unwrap_or_default(),
                Tag::CompositionDate => track.release.compositiondate.as_ref().map(|d| vec![d.to_string()]).unwrap_or_default(),
                Tag::Edition => track.release.edition.as_ref().map(|e| vec![e.clone()]).unwrap_or_default(),
                Tag::CatalogNumber => track.release.catalognumber.as_ref().map(|c| vec![c.clone()]).unwrap_or_default(),
                Tag::Genre => track.release.genres.clone(),
                Tag::SecondaryGenre => track.release.secondary_genres.clone(),
                Tag::Descriptor => track.release.descriptors.clone(),
                Tag::Label => track.release.labels.clone(),
                Tag::ReleaseArtistMain => track.release.releaseartists.main.iter().map(|a| a.name.clone()).collect(),
                Tag::ReleaseArtistGuest => track.release.releaseartists.guest.iter().map(|a| a.name.clone()).collect(),
                Tag::ReleaseArtistRemixer => track.release.releaseartists.remixer.iter().map(|a| a.name.clone()).collect(),
                Tag::ReleaseArtistProducer => track.release.releaseartists.producer.iter().map(|a| a.name.clone()).collect(),
                Tag::ReleaseArtistComposer => track.release.releaseartists.composer.iter().map(|a| a.name.clone()).collect(),
                Tag::ReleaseArtistConductor => track.release.releaseartists.conductor.iter().map(|a| a.name.clone()).collect(),
                Tag::ReleaseArtistDjMixer => track.release.releaseartists.djmixer.iter().map(|a| a.name.clone()).collect(),
                Tag::New => vec![if track.release.new { "true" } else { "false" }.to_string()],
                Tag::DiscTotal => vec![track.release.disctotal.to_string()],
                Tag::TrackTotal => vec![track.tracktotal.to_string()],
            };
            
            if matches_pattern(&values, &matcher.pattern, tag)? {
                matched = true;
                break;
            }
        }
        
        if matched {
            result.push(track.clone());
        }
    }
    
    Ok(result)
}