use std::path::PathBuf;
use thiserror::Error;

/// The single error type threaded through every fallible core operation.
///
/// `Expected` errors are user-facing: the CLI prints them without a
/// traceback and exits 1. Everything else is an `Unexpected` failure —
/// logged at `error!` and surfaced as EIO across the VFS boundary.
#[derive(Error, Debug)]
pub enum RoseError {
    #[error("Rose error: {0}")]
    Generic(String),
    #[error(transparent)]
    Expected(#[from] RoseExpectedError),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("System time error: {0}")]
    SystemTime(#[from] std::time::SystemTimeError),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Cache update error: {0}")]
    CacheUpdateError(String),
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<crate::config::ConfigError> for RoseError {
    fn from(e: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError as CE;
        match e {
            CE::NotFound(p) => RoseError::Expected(RoseExpectedError::ConfigNotFound { path: p }),
            CE::Decode(msg) => RoseError::Expected(RoseExpectedError::ConfigDecode(msg)),
            CE::MissingKey(key) => RoseError::Expected(RoseExpectedError::MissingConfigKey(key)),
            CE::InvalidValue { key, reason } => {
                RoseError::Expected(RoseExpectedError::InvalidConfigValue { key, reason })
            }
        }
    }
}

/// These errors are printed without traceback: the stable error taxonomy of the user-facing surface.
#[derive(Error, Debug, Clone)]
pub enum RoseExpectedError {
    #[error("{0}")]
    Generic(String),

    #[error("Configuration file not found ({path})")]
    ConfigNotFound { path: PathBuf },
    #[error("Failed to decode configuration file: {0}")]
    ConfigDecode(String),
    #[error("Missing key in configuration file: {0}")]
    MissingConfigKey(String),
    #[error("Invalid value for {key} in configuration file: {reason}")]
    InvalidConfigValue { key: String, reason: String },

    #[error("Failed to parse rule: {0}")]
    RuleSyntax(String),
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Unsupported filetype: {0}")]
    UnsupportedFiletype(String),
    #[error("Unsupported tag value: {0}")]
    UnsupportedTagValue(String),

    #[error("Genre does not exist: {name}")]
    GenreDoesNotExist { name: String },
    #[error("Label does not exist: {name}")]
    LabelDoesNotExist { name: String },
    #[error("Descriptor does not exist: {name}")]
    DescriptorDoesNotExist { name: String },
    #[error("Artist does not exist: {name}")]
    ArtistDoesNotExist { name: String },
    #[error("Invalid UUID: {uuid}")]
    InvalidUuid { uuid: String },
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },
    #[error("Invalid file format: {format}")]
    InvalidFileFormat { format: String },
    #[error("Release does not exist: {id}")]
    ReleaseDoesNotExist { id: String },
    #[error("Track does not exist: {id}")]
    TrackDoesNotExist { id: String },
    #[error("Collage does not exist: {name}")]
    CollageDoesNotExist { name: String },
    #[error("Collage already exists: {name}")]
    CollageAlreadyExists { name: String },
    #[error("Playlist does not exist: {name}")]
    PlaylistDoesNotExist { name: String },
    #[error("Playlist already exists: {name}")]
    PlaylistAlreadyExists { name: String },
    #[error("Description mismatch: {0}")]
    DescriptionMismatch(String),
    #[error("Invalid cover art file: {0}")]
    InvalidCoverArtFile(String),
    #[error("Invalid release edit resume file: {0}")]
    InvalidReleaseEditResumeFile(String),
    #[error("Release edit failed: {0}")]
    ReleaseEditFailed(String),
    #[error("Unknown artist role: {0}")]
    UnknownArtistRole(String),
    #[error("Track tag not allowed: {0}")]
    TrackTagNotAllowed(String),
    #[error("Invalid replacement value: {0}")]
    InvalidReplacementValue(String),
    #[error("Invalid path template: {0}")]
    InvalidPathTemplate(String),
    #[error("Daemon is already running")]
    DaemonAlreadyRunning,
}

pub type Result<T> = std::result::Result<T, RoseError>;
