// The config module parses `~/.config/rose/config.toml` (or an override path) into the `Config`
// value that every other module threads through its operations. There is no ambient/global config;
// callers always hold an explicit `&Config`.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Configuration file not found ({0})")]
    NotFound(PathBuf),
    #[error("Failed to decode configuration file: {0}")]
    Decode(String),
    #[error("Missing key in configuration file: {0}")]
    MissingKey(String),
    #[error("Invalid value for {key} in configuration file: {reason}")]
    InvalidValue { key: String, reason: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn default_config_path() -> PathBuf {
    let xdg_config_home = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default().join(".config"));
    xdg_config_home.join("rose").join("config.toml")
}

fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// One named path-producing template used by the VFS for a given view and slot. Stored as a plain
/// string (not pre-compiled) so that `Config` stays cheaply cloneable and serializable; templates
/// are compiled on demand by the templates module.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct PathTemplate(pub String);

impl Default for PathTemplate {
    fn default() -> Self {
        PathTemplate(String::new())
    }
}

impl std::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A view's three rendering slots: the release directory name, a track's filename inside that
/// directory, and a track's filename under the view's `!All Tracks` pseudo-directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemplateTriad {
    pub release: PathTemplate,
    pub track: PathTemplate,
    pub all_tracks: PathTemplate,
}

impl Default for TemplateTriad {
    fn default() -> Self {
        Self {
            release: PathTemplate("{{ releaseartists | artistsfmt }} - {% if releasedate %}{{ releasedate.year }}. {% endif %}{{ releasetitle }}{% if releasetype == \"single\" %} - {{ releasetype | releasetypefmt }}{% endif %}{% if new %} [NEW]{% endif %}".to_string()),
            track: PathTemplate("{% if disctotal > 1 %}{{ discnumber | rjust(width=2, fillchar=\"0\") }}-{% endif %}{{ tracknumber | rjust(width=2, fillchar=\"0\") }}. {{ tracktitle }}{% if trackartists.guest %} (feat. {{ trackartists.guest | artistsarrayfmt }}){% endif %}".to_string()),
            all_tracks: PathTemplate("{{ trackartists | artistsfmt }} - {% if releasedate %}{{ releasedate.year }}. {% endif %}{{ releasetitle }} - {{ tracktitle }}".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathTemplates {
    pub source: TemplateTriad,
    pub releases: TemplateTriad,
    pub releases_new: TemplateTriad,
    pub releases_added_on: TemplateTriad,
    pub releases_released_on: TemplateTriad,
    pub artists: TemplateTriad,
    pub genres: TemplateTriad,
    pub descriptors: TemplateTriad,
    pub labels: TemplateTriad,
    pub collages: TemplateTriad,
    pub playlists: PathTemplate,
}

impl Default for PathTemplates {
    fn default() -> Self {
        Self {
            source: TemplateTriad::default(),
            releases: TemplateTriad::default(),
            releases_new: TemplateTriad::default(),
            releases_added_on: TemplateTriad::default(),
            releases_released_on: TemplateTriad::default(),
            artists: TemplateTriad::default(),
            genres: TemplateTriad::default(),
            descriptors: TemplateTriad::default(),
            labels: TemplateTriad::default(),
            collages: TemplateTriad::default(),
            playlists: PathTemplate("{{ position }}. {{ trackartists | artistsfmt }} - {{ tracktitle }}".to_string()),
        }
    }
}

impl PathTemplates {
    /// All per-view triads, keyed by the view name used in error messages and template validation.
    pub fn all_triads(&self) -> Vec<(&'static str, &TemplateTriad)> {
        vec![
            ("source", &self.source),
            ("releases", &self.releases),
            ("releases_new", &self.releases_new),
            ("releases_added_on", &self.releases_added_on),
            ("releases_released_on", &self.releases_released_on),
            ("artists", &self.artists),
            ("genres", &self.genres),
            ("descriptors", &self.descriptors),
            ("labels", &self.labels),
            ("collages", &self.collages),
        ]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoredRule {
    pub matcher: String,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualFSConfig {
    pub mount_dir: PathBuf,
    pub artists_whitelist: Option<Vec<String>>,
    pub artists_blacklist: Option<Vec<String>>,
    pub genres_whitelist: Option<Vec<String>>,
    pub genres_blacklist: Option<Vec<String>>,
    pub descriptors_whitelist: Option<Vec<String>>,
    pub descriptors_blacklist: Option<Vec<String>>,
    pub labels_whitelist: Option<Vec<String>>,
    pub labels_blacklist: Option<Vec<String>>,
    pub hide_artists_with_only_new_releases: bool,
    pub hide_genres_with_only_new_releases: bool,
    pub hide_descriptors_with_only_new_releases: bool,
    pub hide_labels_with_only_new_releases: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub music_source_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub max_proc: usize,
    pub ignore_release_directories: Vec<String>,
    pub rename_source_files: bool,
    pub max_filename_bytes: usize,
    pub cover_art_stems: Vec<String>,
    pub valid_art_exts: Vec<String>,
    pub write_parent_genres: bool,
    pub artist_aliases_map: HashMap<String, Vec<String>>,
    pub artist_aliases_parents_map: HashMap<String, Vec<String>>,
    pub path_templates: PathTemplates,
    pub stored_metadata_rules: Vec<StoredRule>,
    pub vfs: VirtualFSConfig,
}

// --- Raw deserialization shape. Kept separate from `Config` so that out-of-range values (e.g. a
// negative max_proc) can be caught and reported as `ConfigError::InvalidValue` rather than a bare
// TOML type error. ---

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawArtistAlias {
    artist: String,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawVirtualFSConfig {
    mount_dir: Option<String>,
    #[serde(default)]
    artists_whitelist: Option<Vec<String>>,
    #[serde(default)]
    artists_blacklist: Option<Vec<String>>,
    #[serde(default)]
    genres_whitelist: Option<Vec<String>>,
    #[serde(default)]
    genres_blacklist: Option<Vec<String>>,
    #[serde(default)]
    descriptors_whitelist: Option<Vec<String>>,
    #[serde(default)]
    descriptors_blacklist: Option<Vec<String>>,
    #[serde(default)]
    labels_whitelist: Option<Vec<String>>,
    #[serde(default)]
    labels_blacklist: Option<Vec<String>>,
    #[serde(default)]
    hide_artists_with_only_new_releases: bool,
    #[serde(default)]
    hide_genres_with_only_new_releases: bool,
    #[serde(default)]
    hide_descriptors_with_only_new_releases: bool,
    #[serde(default)]
    hide_labels_with_only_new_releases: bool,
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    music_source_dir: Option<String>,
    cache_dir: Option<String>,
    max_proc: Option<i64>,
    #[serde(default)]
    ignore_release_directories: Vec<String>,
    #[serde(default)]
    rename_source_files: bool,
    max_filename_bytes: Option<i64>,
    #[serde(default)]
    cover_art_stems: Option<Vec<String>>,
    #[serde(default)]
    valid_art_exts: Option<Vec<String>>,
    #[serde(default)]
    write_parent_genres: bool,
    #[serde(default)]
    artist_aliases: Vec<RawArtistAlias>,
    #[serde(default)]
    path_templates: PathTemplates,
    #[serde(default)]
    stored_metadata_rules: Vec<StoredRule>,
    vfs: Option<RawVirtualFSConfig>,
}

impl Config {
    /// Parse the configuration file at `config_path_override`, or the default
    /// `$XDG_CONFIG_HOME/rose/config.toml`.
    pub fn parse(config_path_override: Option<&Path>) -> ConfigResult<Config> {
        let cfg_path = config_path_override
            .map(|p| p.to_path_buf())
            .unwrap_or_else(default_config_path);

        let raw_text = std::fs::read_to_string(&cfg_path)
            .map_err(|_| ConfigError::NotFound(cfg_path.clone()))?;
        let raw: RawConfig =
            toml::from_str(&raw_text).map_err(|e| ConfigError::Decode(e.to_string()))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> ConfigResult<Config> {
        let music_source_dir = raw
            .music_source_dir
            .as_deref()
            .map(expand_tilde)
            .ok_or_else(|| ConfigError::MissingKey("music_source_dir".to_string()))?;

        let cache_dir = match raw.cache_dir.as_deref() {
            Some(c) => expand_tilde(c),
            None => directories::ProjectDirs::from("", "", "rose")
                .map(|p| p.cache_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".cache/rose")),
        };
        let _ = std::fs::create_dir_all(&cache_dir);

        let max_proc = match raw.max_proc {
            Some(n) if n >= 1 => n as usize,
            Some(n) => {
                return Err(ConfigError::InvalidValue {
                    key: "max_proc".to_string(),
                    reason: format!("must be a positive integer, got {n}"),
                })
            }
            None => std::cmp::max(1, num_cpus::get() / 2),
        };

        let max_filename_bytes = match raw.max_filename_bytes {
            Some(n) if n >= 1 => n as usize,
            Some(n) => {
                return Err(ConfigError::InvalidValue {
                    key: "max_filename_bytes".to_string(),
                    reason: format!("must be a positive integer, got {n}"),
                })
            }
            None => 180,
        };

        let cover_art_stems = raw.cover_art_stems.unwrap_or_else(|| {
            vec![
                "folder".to_string(),
                "cover".to_string(),
                "art".to_string(),
                "front".to_string(),
            ]
        });
        let valid_art_exts = raw
            .valid_art_exts
            .unwrap_or_else(|| vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]);

        let mut artist_aliases_map: HashMap<String, Vec<String>> = HashMap::new();
        let mut artist_aliases_parents_map: HashMap<String, Vec<String>> = HashMap::new();
        for entry in &raw.artist_aliases {
            artist_aliases_map.insert(entry.artist.clone(), entry.aliases.clone());
            for alias in &entry.aliases {
                artist_aliases_parents_map
                    .entry(alias.clone())
                    .or_default()
                    .push(entry.artist.clone());
            }
        }

        let raw_vfs = raw
            .vfs
            .ok_or_else(|| ConfigError::MissingKey("vfs".to_string()))?;
        let mount_dir = raw_vfs
            .mount_dir
            .as_deref()
            .map(expand_tilde)
            .ok_or_else(|| ConfigError::MissingKey("vfs.mount_dir".to_string()))?;

        check_whitelist_blacklist("vfs.artists", &raw_vfs.artists_whitelist, &raw_vfs.artists_blacklist)?;
        check_whitelist_blacklist("vfs.genres", &raw_vfs.genres_whitelist, &raw_vfs.genres_blacklist)?;
        check_whitelist_blacklist(
            "vfs.descriptors",
            &raw_vfs.descriptors_whitelist,
            &raw_vfs.descriptors_blacklist,
        )?;
        check_whitelist_blacklist("vfs.labels", &raw_vfs.labels_whitelist, &raw_vfs.labels_blacklist)?;

        let vfs = VirtualFSConfig {
            mount_dir,
            artists_whitelist: raw_vfs.artists_whitelist,
            artists_blacklist: raw_vfs.artists_blacklist,
            genres_whitelist: raw_vfs.genres_whitelist,
            genres_blacklist: raw_vfs.genres_blacklist,
            descriptors_whitelist: raw_vfs.descriptors_whitelist,
            descriptors_blacklist: raw_vfs.descriptors_blacklist,
            labels_whitelist: raw_vfs.labels_whitelist,
            labels_blacklist: raw_vfs.labels_blacklist,
            hide_artists_with_only_new_releases: raw_vfs.hide_artists_with_only_new_releases,
            hide_genres_with_only_new_releases: raw_vfs.hide_genres_with_only_new_releases,
            hide_descriptors_with_only_new_releases: raw_vfs.hide_descriptors_with_only_new_releases,
            hide_labels_with_only_new_releases: raw_vfs.hide_labels_with_only_new_releases,
        };

        Ok(Config {
            music_source_dir,
            cache_dir,
            max_proc,
            ignore_release_directories: raw.ignore_release_directories,
            rename_source_files: raw.rename_source_files,
            max_filename_bytes,
            cover_art_stems,
            valid_art_exts,
            write_parent_genres: raw.write_parent_genres,
            artist_aliases_map,
            artist_aliases_parents_map,
            path_templates: raw.path_templates,
            stored_metadata_rules: raw.stored_metadata_rules,
            vfs,
        })
    }

    /// The cross product of `cover_art_stems` and `valid_art_exts`, e.g. `folder.jpg`.
    pub fn valid_cover_arts(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.cover_art_stems.len() * self.valid_art_exts.len());
        for stem in &self.cover_art_stems {
            for ext in &self.valid_art_exts {
                out.push(format!("{stem}.{ext}"));
            }
        }
        out
    }

    pub fn cache_database_path(&self) -> PathBuf {
        self.cache_dir.join("cache.sqlite3")
    }

    pub fn watchdog_pid_path(&self) -> PathBuf {
        self.cache_dir.join("watchdog.pid")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.cache_dir.join("locks")
    }

    /// Compiles every configured template with Tera to catch syntax errors eagerly, rather than at
    /// first render. Expensive relative to the rest of parsing, so callers that don't need strict
    /// validation (e.g. tests constructing ad hoc configs) may skip it.
    pub fn validate_path_templates_expensive(&self) -> ConfigResult<()> {
        let mut tera = tera::Tera::default();
        let mut templates: Vec<(String, &str)> = Vec::new();
        for (view, triad) in self.path_templates.all_triads() {
            templates.push((format!("{view}.release"), triad.release.0.as_str()));
            templates.push((format!("{view}.track"), triad.track.0.as_str()));
            templates.push((format!("{view}.all_tracks"), triad.all_tracks.0.as_str()));
        }
        templates.push(("playlists".to_string(), self.path_templates.playlists.0.as_str()));

        for (name, src) in &templates {
            tera.add_raw_template(name, src).map_err(|e| ConfigError::InvalidValue {
                key: format!("path_templates.{name}"),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn default_for_test() -> Config {
        Config {
            music_source_dir: PathBuf::from("/tmp/rose-test/music"),
            cache_dir: PathBuf::from("/tmp/rose-test/cache"),
            max_proc: 4,
            ignore_release_directories: Vec::new(),
            rename_source_files: false,
            max_filename_bytes: 180,
            cover_art_stems: vec!["cover".to_string(), "folder".to_string()],
            valid_art_exts: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            write_parent_genres: false,
            artist_aliases_map: HashMap::new(),
            artist_aliases_parents_map: HashMap::new(),
            path_templates: PathTemplates::default(),
            stored_metadata_rules: Vec::new(),
            vfs: VirtualFSConfig::default(),
        }
    }
}

fn check_whitelist_blacklist(
    key: &str,
    whitelist: &Option<Vec<String>>,
    blacklist: &Option<Vec<String>>,
) -> ConfigResult<()> {
    if whitelist.is_some() && blacklist.is_some() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "whitelist and blacklist are mutually exclusive".to_string(),
        });
    }
    Ok(())
}
