//! Functions for interacting with individual tracks outside of a full release context: matching
//! tracks against a rule's matcher, and running ad hoc rule actions against a single track.

use crate::audiotags::AudioTags;
use crate::cache::{get_track, CachedTrack};
use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::rule_parser::Matcher;
use crate::rules::{
    execute_metadata_actions, fast_search_for_matching_tracks, filter_track_false_positives_using_read_cache,
};

/// Find every track whose tags satisfy `matcher`. Uses the FTS candidate search (§4.6) as a cheap
/// superset filter, then verifies precisely against the cached tag values.
pub fn find_tracks_matching_rule(config: &Config, matcher: &Matcher) -> Result<Vec<CachedTrack>> {
    let candidates = fast_search_for_matching_tracks(config, matcher)?;
    let tracks: Vec<CachedTrack> = candidates.into_iter().map(|(track, _)| track).collect();
    filter_track_false_positives_using_read_cache(config, matcher, &tracks)
}

/// Run a one-off set of rule actions against a single track, outside of the full rules-engine
/// confirm/flush flow. Used by `rose tracks run-rule`.
pub fn run_actions_on_track(
    config: &Config,
    track_id: &str,
    actions: &[crate::rule_parser::Action],
    dry_run: bool,
    confirm_yes: bool,
) -> Result<()> {
    let track = get_track(config, track_id)?.ok_or_else(|| {
        RoseError::Expected(RoseExpectedError::TrackDoesNotExist { id: track_id.to_string() })
    })?;
    let release = track.release.clone();
    let _ = AudioTags::from_file(&track.source_path)?;

    let changes = execute_metadata_actions(config, actions, &[(track.clone(), release.clone())], true)?;
    if changes.is_empty() {
        return Ok(());
    }
    if dry_run {
        return Ok(());
    }
    if !confirm_yes && !crate::rules::confirm_changes(changes.len(), 25)? {
        return Ok(());
    }

    execute_metadata_actions(config, actions, &[(track, release.clone())], false)?;
    crate::cache_update::update_cache_for_releases(config, Some(vec![release.source_path.clone()]), false)?;
    Ok(())
}
