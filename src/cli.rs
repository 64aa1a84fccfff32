//! The cli module defines Rosé's command-line interface. It does not carry any domain logic of
//! its own: it is dedicated to parsing, resolving arguments, and delegating to the appropriate
//! module. See [`run`] for the process entrypoint.

use crate::cache_update::update_cache;
use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::rule_parser::{Action, Matcher, Rule};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rose", about = "A music manager with a virtual filesystem.", disable_version_flag = true)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Emit verbose logging.")]
    pub verbose: bool,
    #[arg(short, long, global = true, value_name = "PATH", help = "Override the config file location.")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print version.
    Version,
    /// Utilities for configuring Rosé.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage the read cache.
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Manage the virtual filesystem.
    #[command(subcommand)]
    Fs(FsCommand),
    /// Manage releases.
    #[command(subcommand)]
    Releases(ReleasesCommand),
    /// Manage tracks.
    #[command(subcommand)]
    Tracks(TracksCommand),
    /// Manage collages.
    #[command(subcommand)]
    Collages(CollagesCommand),
    /// Manage playlists.
    #[command(subcommand)]
    Playlists(PlaylistsCommand),
    /// Manage artists.
    #[command(subcommand)]
    Artists(ArtistsCommand),
    /// Manage genres.
    #[command(subcommand)]
    Genres(GenresCommand),
    /// Manage labels.
    #[command(subcommand)]
    Labels(LabelsCommand),
    /// Manage descriptors.
    #[command(subcommand)]
    Descriptors(DescriptorsCommand),
    /// Run metadata update rules on the entire library.
    #[command(subcommand)]
    Rules(RulesCommand),
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Generate a shell completion script.
    GenerateCompletion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Preview the configured path templates with sample data.
    PreviewTemplates,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Synchronize the read cache with new changes in the source directory.
    Update {
        #[arg(short, long, help = "Force re-read all data from disk, even for unchanged files.")]
        force: bool,
    },
    /// Start a watchdog to auto-update the cache when the source directory changes.
    Watch {
        #[arg(short, long, help = "Run the filesystem watcher in the foreground (default: daemon).")]
        foreground: bool,
    },
    /// Stop the running watchdog.
    Unwatch,
}

#[derive(Subcommand)]
pub enum FsCommand {
    /// Mount the virtual filesystem.
    Mount {
        #[arg(short, long, help = "Run the FUSE controller in the foreground (default: daemon).")]
        foreground: bool,
    },
    /// Unmount the virtual filesystem.
    Unmount,
}

#[derive(clap::Args)]
pub struct RunRuleArgs {
    #[arg(short, long, help = "Display intended changes without applying them.")]
    pub dry_run: bool,
    #[arg(short, long, help = "Bypass confirmation prompts.")]
    pub yes: bool,
}

#[derive(Subcommand)]
pub enum ReleasesCommand {
    /// Print a single release (in JSON). Accepts a release's UUID/path.
    Print { release: String },
    /// Print all releases (in JSON). Accepts an optional rules matcher to filter the releases.
    #[command(name = "print-all")]
    PrintAll { matcher: Option<String> },
    /// Edit a release's metadata in $EDITOR. Accepts a release's UUID/path.
    Edit {
        release: String,
        #[arg(short, long, help = "Resume a failed release edit.")]
        resume: Option<PathBuf>,
    },
    /// Toggle a release's "new"-ness. Accepts a release's UUID/path.
    #[command(name = "toggle-new")]
    ToggleNew { release: String },
    /// Delete a release from the library. The release is moved to the trash bin.
    Delete { release: String },
    /// Set/replace the cover art of a release. Accepts a release's UUID/path.
    #[command(name = "set-cover")]
    SetCover { release: String, cover: PathBuf },
    /// Delete the cover art of a release.
    #[command(name = "delete-cover")]
    DeleteCover { release: String },
    /// Run rule engine actions on all tracks in a release. Accepts a release's UUID/path.
    #[command(name = "run-rule")]
    RunRule {
        release: String,
        actions: Vec<String>,
        #[command(flatten)]
        opts: RunRuleArgs,
    },
    /// Create a single release for the given track, and copy the track into it.
    #[command(name = "create-single")]
    CreateSingle { track_path: PathBuf },
}

#[derive(Subcommand)]
pub enum TracksCommand {
    /// Print a single track (in JSON). Accepts a track's UUID/path.
    Print { track: String },
    /// Print all tracks (in JSON). Accepts an optional rules matcher to filter the tracks.
    #[command(name = "print-all")]
    PrintAll { matcher: Option<String> },
    /// Run rule engine actions on a single track. Accepts a track's UUID/path.
    #[command(name = "run-rule")]
    RunRule {
        track: String,
        actions: Vec<String>,
        #[command(flatten)]
        opts: RunRuleArgs,
    },
}

#[derive(Subcommand)]
pub enum CollagesCommand {
    /// Create a new collage.
    Create { name: String },
    /// Rename a collage.
    Rename { old_name: String, new_name: String },
    /// Delete a collage.
    Delete { collage: String },
    /// Add a release to a collage. Accepts a collage's name and a release's UUID/path.
    #[command(name = "add-release")]
    AddRelease { collage: String, release: String },
    /// Remove a release from a collage. Accepts a collage's name and a release's UUID/path.
    #[command(name = "remove-release")]
    RemoveRelease { collage: String, release: String },
    /// Edit (reorder/remove releases from) a collage in $EDITOR. Accepts a collage's name.
    Edit { collage: String },
    /// Print a collage (in JSON). Accepts a collage's name.
    Print { collage: String },
    /// Print all collages (in JSON).
    #[command(name = "print-all")]
    PrintAll,
}

#[derive(Subcommand)]
pub enum PlaylistsCommand {
    /// Create a new playlist.
    Create { name: String },
    /// Rename a playlist. Accepts a playlist's name.
    Rename { old_name: String, new_name: String },
    /// Delete a playlist. Accepts a playlist's name.
    Delete { playlist: String },
    /// Add a track to a playlist. Accepts a playlist name and a track's UUID/path.
    #[command(name = "add-track")]
    AddTrack { playlist: String, track: String },
    /// Remove a track from a playlist. Accepts a playlist name and a track's UUID/path.
    #[command(name = "remove-track")]
    RemoveTrack { playlist: String, track: String },
    /// Edit a playlist in $EDITOR. Reorder lines to reorder tracks; delete lines to remove them.
    Edit { playlist: String },
    /// Print a playlist (in JSON). Accepts a playlist's name.
    Print { playlist: String },
    /// Print all playlists (in JSON).
    #[command(name = "print-all")]
    PrintAll,
    /// Set the cover art of a playlist. Accepts a playlist name and a path to an image.
    #[command(name = "set-cover")]
    SetCover { playlist: String, cover: PathBuf },
    /// Delete the cover art of a playlist. Accepts a playlist name.
    #[command(name = "delete-cover")]
    DeleteCover { playlist: String },
}

#[derive(Subcommand)]
pub enum ArtistsCommand {
    /// Print an artist (in JSON). Accepts an artist's name.
    Print { artist: String },
    /// Print all artists (in JSON).
    #[command(name = "print-all")]
    PrintAll,
}

#[derive(Subcommand)]
pub enum GenresCommand {
    /// Print a genre (in JSON). Accepts a genre's name.
    Print { genre: String },
    /// Print all genres (in JSON).
    #[command(name = "print-all")]
    PrintAll,
}

#[derive(Subcommand)]
pub enum LabelsCommand {
    /// Print a label (in JSON). Accepts a label's name.
    Print { label: String },
    /// Print all labels (in JSON).
    #[command(name = "print-all")]
    PrintAll,
}

#[derive(Subcommand)]
pub enum DescriptorsCommand {
    /// Print a descriptor (in JSON). Accepts a descriptor's name.
    Print { descriptor: String },
    /// Print all descriptors (in JSON).
    #[command(name = "print-all")]
    PrintAll,
}

#[derive(Subcommand)]
pub enum RulesCommand {
    /// Run an ad hoc rule.
    Run {
        matcher: String,
        actions: Vec<String>,
        #[command(flatten)]
        opts: RunRuleArgs,
        #[arg(short, long, help = "Ignore tracks matching this matcher.")]
        ignore: Vec<String>,
    },
    /// Run the rules stored in the config.
    #[command(name = "run-stored")]
    RunStored {
        #[arg(short, long, help = "Display intended changes without applying them.")]
        dry_run: bool,
        #[arg(short, long, help = "Bypass confirmation prompts.")]
        yes: bool,
    },
}

/// Parses `rose`'s argv, dispatches to the appropriate domain function, and returns the process
/// exit code: 0 on success, 1 for an expected (user-facing) error, >1 for anything unexpected.
pub fn run() -> i32 {
    let cli = Cli::parse();

    if cli.verbose && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    let _ = crate::common::initialize_logging(None, "stderr");

    match dispatch(&cli) {
        Ok(()) => 0,
        Err(RoseError::Expected(e)) => {
            eprintln!("{e}");
            1
        }
        Err(e) => {
            error!("{e:?}");
            2
        }
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    let config = Config::parse(cli.config.as_deref())?;
    crate::cache::maybe_invalidate_cache_database(&config)?;

    match &cli.command {
        Command::Version => {
            println!("{}", crate::common::VERSION);
            Ok(())
        }
        Command::Config(cmd) => dispatch_config(&config, cmd),
        Command::Cache(cmd) => dispatch_cache(&config, cmd),
        Command::Fs(cmd) => dispatch_fs(&config, cmd),
        Command::Releases(cmd) => dispatch_releases(&config, cmd),
        Command::Tracks(cmd) => dispatch_tracks(&config, cmd),
        Command::Collages(cmd) => dispatch_collages(&config, cmd),
        Command::Playlists(cmd) => dispatch_playlists(&config, cmd),
        Command::Artists(cmd) => dispatch_artists(&config, cmd),
        Command::Genres(cmd) => dispatch_genres(&config, cmd),
        Command::Labels(cmd) => dispatch_labels(&config, cmd),
        Command::Descriptors(cmd) => dispatch_descriptors(&config, cmd),
        Command::Rules(cmd) => dispatch_rules(&config, cmd),
    }
}

fn dispatch_config(config: &Config, cmd: &ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::GenerateCompletion { shell } => {
            use clap::CommandFactory;
            let mut command = Cli::command();
            clap_complete::generate(*shell, &mut command, "rose", &mut std::io::stdout());
            Ok(())
        }
        ConfigCommand::PreviewTemplates => preview_path_templates(config),
    }
}

fn dispatch_cache(config: &Config, cmd: &CacheCommand) -> Result<()> {
    match cmd {
        CacheCommand::Update { force } => update_cache(config, *force),
        CacheCommand::Watch { foreground } => {
            if !*foreground {
                daemonize(Some(&config.watchdog_pid_path()))?;
            }
            let handle = crate::watcher::start_watcher(config.clone())?;
            handle.join();
            Ok(())
        }
        CacheCommand::Unwatch => match unwatch(config)? {
            true => Ok(()),
            false => Err(RoseError::Expected(RoseExpectedError::Generic("No-Op: No known watchdog running".to_string()))),
        },
    }
}

/// Returns `Ok(true)` if a watchdog was killed, `Ok(false)` if there was nothing to do.
fn unwatch(config: &Config) -> Result<bool> {
    let pid_path = config.watchdog_pid_path();
    if !pid_path.exists() {
        info!("No-Op: No known watchdog running");
        return Ok(false);
    }
    let contents = std::fs::read_to_string(&pid_path)?;
    let pid: i32 = contents
        .trim()
        .parse()
        .map_err(|_| RoseError::Generic(format!("Malformed watchdog pid file at {:?}", pid_path)))?;
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        info!("Killed watchdog at process {pid}");
    } else {
        info!("No-Op: Process {pid} not found");
    }
    std::fs::remove_file(&pid_path)?;
    Ok(true)
}

fn dispatch_fs(config: &Config, cmd: &FsCommand) -> Result<()> {
    match cmd {
        FsCommand::Mount { foreground } => {
            if !*foreground {
                daemonize(None)?;
            }
            let bg_config = config.clone();
            let refresh = std::thread::spawn(move || {
                if let Err(e) = update_cache(&bg_config, false) {
                    error!("Background cache refresh on mount failed: {e}");
                }
            });
            let result = crate::vfs_bridge::mount(config.clone());
            let _ = refresh.join();
            result
        }
        FsCommand::Unmount => crate::vfs_bridge::unmount(config),
    }
}

/// Forks into a background daemon and returns in the child. The parent process exits.
/// Mirrors the watchdog/FUSE-controller daemonization used by the original CLI.
fn daemonize(pid_path: Option<&Path>) -> Result<()> {
    if let Some(p) = pid_path {
        if p.exists() {
            if let Ok(contents) = std::fs::read_to_string(p) {
                if let Ok(existing_pid) = contents.trim().parse::<i32>() {
                    if unsafe { libc::kill(existing_pid, 0) } == 0 {
                        return Err(RoseError::Expected(RoseExpectedError::DaemonAlreadyRunning));
                    }
                }
            }
        }
    }

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(RoseError::Generic("fork() failed".to_string()));
    }
    if pid == 0 {
        unsafe {
            libc::setsid();
        }
        return Ok(());
    }
    if let Some(p) = pid_path {
        std::fs::write(p, pid.to_string())?;
    }
    std::process::exit(0);
}

fn dispatch_releases(config: &Config, cmd: &ReleasesCommand) -> Result<()> {
    match cmd {
        ReleasesCommand::Print { release } => {
            let id = parse_release_argument(release)?;
            println!("{}", crate::dump::dump_release(config, &id)?);
            Ok(())
        }
        ReleasesCommand::PrintAll { matcher } => {
            let parsed = matcher.as_deref().map(Matcher::parse).transpose()?;
            println!("{}", crate::dump::dump_all_releases(config, parsed.as_ref())?);
            Ok(())
        }
        ReleasesCommand::Edit { release, resume } => {
            let id = parse_release_argument(release)?;
            crate::releases::edit_release(config, &id, resume.as_deref())
        }
        ReleasesCommand::ToggleNew { release } => {
            let id = parse_release_argument(release)?;
            crate::releases::toggle_release_new(config, &id)
        }
        ReleasesCommand::Delete { release } => {
            let id = parse_release_argument(release)?;
            crate::releases::delete_release(config, &id)
        }
        ReleasesCommand::SetCover { release, cover } => {
            let id = parse_release_argument(release)?;
            crate::releases::set_release_cover_art(config, &id, cover)
        }
        ReleasesCommand::DeleteCover { release } => {
            let id = parse_release_argument(release)?;
            crate::releases::delete_release_cover_art(config, &id)
        }
        ReleasesCommand::RunRule { release, actions, opts } => {
            let id = parse_release_argument(release)?;
            let parsed_actions = parse_actions(actions)?;
            crate::releases::run_actions_on_release(config, &id, &parsed_actions, opts.dry_run, opts.yes)
        }
        ReleasesCommand::CreateSingle { track_path } => {
            let track_id = parse_track_argument(&track_path.to_string_lossy())?;
            crate::releases::create_single_release(config, &track_id, None, None).map(|_| ())
        }
    }
}

fn dispatch_tracks(config: &Config, cmd: &TracksCommand) -> Result<()> {
    match cmd {
        TracksCommand::Print { track } => {
            let id = parse_track_argument(track)?;
            println!("{}", crate::dump::dump_track(config, &id)?);
            Ok(())
        }
        TracksCommand::PrintAll { matcher } => {
            let parsed = matcher.as_deref().map(Matcher::parse).transpose()?;
            println!("{}", crate::dump::dump_all_tracks(config, parsed.as_ref())?);
            Ok(())
        }
        TracksCommand::RunRule { track, actions, opts } => {
            let id = parse_track_argument(track)?;
            let parsed_actions = parse_actions(actions)?;
            crate::tracks::run_actions_on_track(config, &id, &parsed_actions, opts.dry_run, opts.yes)
        }
    }
}

fn dispatch_collages(config: &Config, cmd: &CollagesCommand) -> Result<()> {
    match cmd {
        CollagesCommand::Create { name } => crate::collages::create_collage(config, name),
        CollagesCommand::Rename { old_name, new_name } => crate::collages::rename_collage(config, old_name, new_name),
        CollagesCommand::Delete { collage } => crate::collages::delete_collage(config, &parse_collage_argument(collage)),
        CollagesCommand::AddRelease { collage, release } => {
            let id = parse_release_argument(release)?;
            crate::collages::add_release_to_collage(config, &parse_collage_argument(collage), &id)
        }
        CollagesCommand::RemoveRelease { collage, release } => {
            let id = parse_release_argument(release)?;
            crate::collages::remove_release_from_collage(config, &parse_collage_argument(collage), &id)
        }
        CollagesCommand::Edit { collage } => crate::collages::edit_collage_in_editor(config, &parse_collage_argument(collage)),
        CollagesCommand::Print { collage } => {
            println!("{}", crate::dump::dump_collage(config, &parse_collage_argument(collage))?);
            Ok(())
        }
        CollagesCommand::PrintAll => {
            println!("{}", crate::dump::dump_all_collages(config)?);
            Ok(())
        }
    }
}

fn dispatch_playlists(config: &Config, cmd: &PlaylistsCommand) -> Result<()> {
    match cmd {
        PlaylistsCommand::Create { name } => crate::playlists::create_playlist(config, name),
        PlaylistsCommand::Rename { old_name, new_name } => crate::playlists::rename_playlist(config, old_name, new_name),
        PlaylistsCommand::Delete { playlist } => crate::playlists::delete_playlist(config, &parse_playlist_argument(playlist)),
        PlaylistsCommand::AddTrack { playlist, track } => {
            let id = parse_track_argument(track)?;
            crate::playlists::add_track_to_playlist(config, &parse_playlist_argument(playlist), &id)
        }
        PlaylistsCommand::RemoveTrack { playlist, track } => {
            let id = parse_track_argument(track)?;
            crate::playlists::remove_track_from_playlist(config, &parse_playlist_argument(playlist), &id)
        }
        PlaylistsCommand::Edit { playlist } => crate::playlists::edit_playlist_in_editor(config, &parse_playlist_argument(playlist)),
        PlaylistsCommand::Print { playlist } => {
            println!("{}", crate::dump::dump_playlist(config, &parse_playlist_argument(playlist))?);
            Ok(())
        }
        PlaylistsCommand::PrintAll => {
            println!("{}", crate::dump::dump_all_playlists(config)?);
            Ok(())
        }
        PlaylistsCommand::SetCover { playlist, cover } => {
            crate::playlists::set_playlist_cover_art(config, &parse_playlist_argument(playlist), cover)
        }
        PlaylistsCommand::DeleteCover { playlist } => {
            crate::playlists::delete_playlist_cover_art(config, &parse_playlist_argument(playlist))
        }
    }
}

fn dispatch_artists(config: &Config, cmd: &ArtistsCommand) -> Result<()> {
    match cmd {
        ArtistsCommand::Print { artist } => {
            println!("{}", crate::dump::dump_artist(config, artist)?);
            Ok(())
        }
        ArtistsCommand::PrintAll => {
            println!("{}", crate::dump::dump_all_artists(config)?);
            Ok(())
        }
    }
}

fn dispatch_genres(config: &Config, cmd: &GenresCommand) -> Result<()> {
    match cmd {
        GenresCommand::Print { genre } => {
            println!("{}", crate::dump::dump_genre(config, genre)?);
            Ok(())
        }
        GenresCommand::PrintAll => {
            println!("{}", crate::dump::dump_all_genres(config)?);
            Ok(())
        }
    }
}

fn dispatch_labels(config: &Config, cmd: &LabelsCommand) -> Result<()> {
    match cmd {
        LabelsCommand::Print { label } => {
            println!("{}", crate::dump::dump_label(config, label)?);
            Ok(())
        }
        LabelsCommand::PrintAll => {
            println!("{}", crate::dump::dump_all_labels(config)?);
            Ok(())
        }
    }
}

fn dispatch_descriptors(config: &Config, cmd: &DescriptorsCommand) -> Result<()> {
    match cmd {
        DescriptorsCommand::Print { descriptor } => {
            println!("{}", crate::dump::dump_descriptor(config, descriptor)?);
            Ok(())
        }
        DescriptorsCommand::PrintAll => {
            println!("{}", crate::dump::dump_all_descriptors(config)?);
            Ok(())
        }
    }
}

fn dispatch_rules(config: &Config, cmd: &RulesCommand) -> Result<()> {
    match cmd {
        RulesCommand::Run { matcher, actions, opts, ignore } => {
            if actions.is_empty() {
                info!("No-Op: No actions passed");
                return Ok(());
            }
            let action_refs: Vec<&str> = actions.iter().map(String::as_str).collect();
            let ignore_refs: Vec<&str> = ignore.iter().map(String::as_str).collect();
            let rule = Rule::parse_with_ignore(matcher, action_refs, ignore_refs)?;
            crate::rules::execute_metadata_rule(config, &rule, opts.dry_run, opts.yes, 25)
        }
        RulesCommand::RunStored { dry_run, yes } => crate::rules::execute_stored_metadata_rules(config, *dry_run, *yes),
    }
}

fn parse_actions(actions: &[String]) -> Result<Vec<Action>> {
    actions
        .iter()
        .enumerate()
        .map(|(i, a)| Action::parse(a, i + 1, None))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(RoseError::from)
}

/// Takes in a release argument and normalizes it to the release ID: a bare UUID, the path to a
/// release's source directory, or its path in any virtual filesystem view.
fn parse_release_argument(r: &str) -> Result<String> {
    if uuid::Uuid::parse_str(r).is_ok() {
        return Ok(r.to_string());
    }
    if let Ok(resolved) = Path::new(r).canonicalize() {
        if let Ok(entries) = std::fs::read_dir(&resolved) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(caps) = crate::cache::STORED_DATA_FILE_REGEX.captures(&name) {
                    return Ok(caps[1].to_string());
                }
            }
        }
    }
    Err(RoseError::Expected(RoseExpectedError::Generic(format!(
        "{r} is not a valid release argument. Release arguments must be one of: \
         (1) the release UUID, (2) the path of the source directory of a release, or \
         (3) the path of the release in the virtual filesystem (from any view)."
    ))))
}

/// Takes in a track argument and normalizes it to the track ID: a bare UUID, the path to a track
/// in the source directory, or its path in any virtual filesystem view.
fn parse_track_argument(t: &str) -> Result<String> {
    if uuid::Uuid::parse_str(t).is_ok() {
        return Ok(t.to_string());
    }
    if let Ok(tags) = crate::audiotags::AudioTags::from_file(Path::new(t)) {
        if let Some(id) = tags.id {
            return Ok(id);
        }
    }
    Err(RoseError::Expected(RoseExpectedError::Generic(format!(
        "{t} is not a valid track argument. Track arguments must be one of: \
         (1) the track UUID, (2) the path of the track in the source directory, or \
         (3) the path of the track in the virtual filesystem (from any view)."
    ))))
}

/// Takes in a collage argument and normalizes it to the collage name.
fn parse_collage_argument(c: &str) -> String {
    resolve_name_argument(c, "!collages")
}

/// Takes in a playlist argument and normalizes it to the playlist name.
fn parse_playlist_argument(p: &str) -> String {
    resolve_name_argument(p, "!playlists")
}

fn resolve_name_argument(arg: &str, container_dirname: &str) -> String {
    let Ok(path) = Path::new(arg).canonicalize() else {
        return arg.to_string();
    };
    if path.is_dir() {
        if let Some(name) = path.file_name() {
            return name.to_string_lossy().to_string();
        }
    }
    if path.is_file() && path.parent().and_then(|p| p.file_name()) == Some(std::ffi::OsStr::new(container_dirname)) {
        if let Some(stem) = path.file_stem() {
            return stem.to_string_lossy().to_string();
        }
    }
    arg.to_string()
}

fn preview_path_templates(config: &Config) -> Result<()> {
    let templates = &config.path_templates;
    preview_pair(config, "Source Directory", &templates.source)?;
    preview_pair(config, "1. Releases", &templates.releases)?;
    preview_pair(config, "1. Releases (New)", &templates.releases_new)?;
    preview_pair(config, "1. Releases (Added On)", &templates.releases_added_on)?;
    preview_pair(config, "1. Releases (Released On)", &templates.releases_released_on)?;
    preview_pair(config, "2. Artists", &templates.artists)?;
    preview_pair(config, "3. Genres", &templates.genres)?;
    preview_pair(config, "4. Descriptors", &templates.descriptors)?;
    preview_pair(config, "5. Labels", &templates.labels)?;
    preview_pair(config, "6. Collages", &templates.collages)?;
    preview_track(config, "7. Playlists - Track", &templates.playlists)?;
    Ok(())
}

fn preview_pair(config: &Config, label: &str, triad: &crate::config::TemplateTriad) -> Result<()> {
    preview_release(config, &format!("{label} - Release"), &triad.release)?;
    preview_track(config, &format!("{label} - Track"), &triad.track)?;
    println!();
    Ok(())
}

fn preview_release(config: &Config, label: &str, template: &crate::config::PathTemplate) -> Result<()> {
    let ((kimlip, _), (young_forever, _), (debussy, _)) = crate::templates::get_sample_music(&config.music_source_dir);
    println!("{label}:");
    println!("  Sample 1: {}", crate::templates::evaluate_release_template(template, &kimlip, None, Some("1"))?);
    println!("  Sample 2: {}", crate::templates::evaluate_release_template(template, &young_forever, None, Some("2"))?);
    println!("  Sample 3: {}", crate::templates::evaluate_release_template(template, &debussy, None, Some("3"))?);
    Ok(())
}

fn preview_track(config: &Config, label: &str, template: &crate::config::PathTemplate) -> Result<()> {
    let ((_, kimlip), (_, young_forever), (_, debussy)) = crate::templates::get_sample_music(&config.music_source_dir);
    println!("{label}:");
    println!("  Sample 1: {}", crate::templates::evaluate_track_template(template, &kimlip, None, Some("1"))?);
    println!("  Sample 2: {}", crate::templates::evaluate_track_template(template, &young_forever, None, Some("2"))?);
    println!("  Sample 3: {}", crate::templates::evaluate_track_template(template, &debussy, None, Some("3"))?);
    Ok(())
}
