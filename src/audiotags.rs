//! The audiotags module abstracts over tag reading and writing for five different audio formats,
//! exposing a single standard interface for all audio files.
//!
//! The audiotags module also handles Rose-specific tagging semantics, such as multi-valued tags,
//! normalization, artist formatting, and enum validation.

use crate::common::{flatten, uniq, Artist, ArtistMapping};
use crate::config::Config;
use crate::error::{Result, RoseError, RoseExpectedError};
use crate::genre_hierarchy::GenreHierarchy;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".m4a", ".ogg", ".opus", ".flac"];

pub const SUPPORTED_RELEASE_TYPES: &[&str] = &[
    "album",
    "single",
    "ep",
    "compilation",
    "anthology",
    "soundtrack",
    "live",
    "remix",
    "djmix",
    "mixtape",
    "other",
    "bootleg",
    "loosetrack",
    "demo",
    "unknown",
];

static TAG_SPLITTER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r" \\\\ | / |; ?| vs\. ").unwrap());
static DATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").unwrap());

pub(crate) fn normalize_rtype(x: Option<&str>) -> String {
    match x {
        None => "unknown".to_string(),
        Some(x) if x.is_empty() => "unknown".to_string(),
        Some(x) => {
            let lower = x.to_lowercase();
            if SUPPORTED_RELEASE_TYPES.contains(&lower.as_str()) {
                lower
            } else {
                "unknown".to_string()
            }
        }
    }
}

/// A partial date: a release can be dated down to the year, the month, or the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct RoseDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl RoseDate {
    pub fn new(year: i32, month: Option<u32>, day: Option<u32>) -> Self {
        RoseDate { year, month, day }
    }

    pub fn year_only(year: i32) -> Self {
        RoseDate { year, month: None, day: None }
    }

    pub fn parse(value: Option<&str>) -> Option<RoseDate> {
        let value = value?;
        if value.is_empty() {
            return None;
        }
        if let Ok(year) = value.parse::<i32>() {
            return Some(RoseDate { year, month: None, day: None });
        }
        // There may be a time value after the date... allow that and other crap.
        if let Some(caps) = DATE_REGEX.captures(value) {
            let year = caps[1].parse().ok()?;
            let month = caps[2].parse().ok();
            let day = caps[3].parse().ok();
            return Some(RoseDate { year, month, day });
        }
        None
    }
}

impl std::fmt::Display for RoseDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.month, self.day) {
            (None, None) => write!(f, "{:04}", self.year),
            _ => write!(f, "{:04}-{:02}-{:02}", self.year, self.month.unwrap_or(1), self.day.unwrap_or(1)),
        }
    }
}

/// The standard, format-agnostic view of an audio file's tags.
#[derive(Debug, Clone)]
pub struct AudioTags {
    pub id: Option<String>,
    pub release_id: Option<String>,

    pub tracktitle: Option<String>,
    pub tracknumber: Option<String>,
    pub tracktotal: Option<i32>,
    pub discnumber: Option<String>,
    pub disctotal: Option<i32>,
    pub trackartists: ArtistMapping,

    pub releasetitle: Option<String>,
    pub releasetype: String,
    pub releasedate: Option<RoseDate>,
    pub originaldate: Option<RoseDate>,
    pub compositiondate: Option<RoseDate>,
    pub genre: Vec<String>,
    pub secondarygenre: Vec<String>,
    pub descriptor: Vec<String>,
    pub edition: Option<String>,
    pub label: Vec<String>,
    pub catalognumber: Option<String>,
    pub releaseartists: ArtistMapping,

    pub duration_sec: i32,
    pub path: PathBuf,
}

pub(crate) fn split_tag(t: Option<&str>) -> Vec<String> {
    match t {
        Some(t) if !t.is_empty() => TAG_SPLITTER_REGEX.split(t).map(|s| s.to_string()).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn split_genre_tag(t: Option<&str>) -> Vec<String> {
    match t {
        Some(t) if !t.is_empty() => {
            let body = t.split("\\\\PARENTS:\\\\").next().unwrap_or(t);
            TAG_SPLITTER_REGEX.split(body).map(|s| s.to_string()).collect()
        }
        _ => Vec::new(),
    }
}

pub(crate) fn format_genre_tag(c: &Config, t: &[String]) -> String {
    let joined = t.join(";");
    if !c.write_parent_genres {
        return joined;
    }
    let seen: HashSet<&String> = t.iter().collect();
    let parents: HashSet<String> = flatten(
        t.iter()
            .map(|g| GenreHierarchy::transitive_parents(g).cloned().unwrap_or_default())
            .collect(),
    )
    .into_iter()
    .filter(|p| !seen.contains(p))
    .collect();
    if parents.is_empty() {
        return joined;
    }
    let mut sorted: Vec<String> = parents.into_iter().collect();
    sorted.sort();
    format!("{joined}\\\\PARENTS:\\\\{}", sorted.join(";"))
}

impl AudioTags {
    /// Read the tags of an audio file on disk.
    pub fn from_file(p: &Path) -> Result<AudioTags> {
        let ext = p
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        if !SUPPORTED_AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            return Err(RoseError::Expected(RoseExpectedError::UnsupportedFiletype(format!(
                "{ext} not a supported filetype"
            ))));
        }

        match ext.as_str() {
            ".mp3" => read_mp3(p),
            ".m4a" => read_m4a(p),
            ".flac" => read_flac(p),
            ".ogg" | ".opus" => read_vorbis(p),
            _ => unreachable!(),
        }
    }

    /// Flush the current tags to the file on disk.
    pub fn flush(&mut self, c: &Config, validate: bool) -> Result<()> {
        self.releasetype = normalize_rtype(Some(&self.releasetype));
        if validate && !SUPPORTED_RELEASE_TYPES.contains(&self.releasetype.as_str()) {
            return Err(RoseError::Expected(RoseExpectedError::UnsupportedTagValue(format!(
                "Release type {} is not a supported release type.\nSupported release types: {}",
                self.releasetype,
                SUPPORTED_RELEASE_TYPES.join(", ")
            ))));
        }

        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        match ext.as_str() {
            ".mp3" => write_mp3(self, c),
            ".m4a" => write_m4a(self, c),
            ".flac" => write_flac(self, c),
            ".ogg" | ".opus" => write_vorbis(self, c),
            _ => Err(RoseError::Expected(RoseExpectedError::UnsupportedFiletype(ext))),
        }
    }
}

fn parse_int(x: Option<&str>) -> Option<i32> {
    x.and_then(|s| s.parse::<i32>().ok())
}

// --- MP3 (id3) ---

fn read_mp3(p: &Path) -> Result<AudioTags> {
    let tag = id3::Tag::read_from_path(p)
        .map_err(|e| RoseError::Expected(RoseExpectedError::UnsupportedFiletype(format!("Failed to open file: {e}"))))?;

    let txxx = |desc: &str| -> Option<String> {
        tag.extended_texts().find(|t| t.description.eq_ignore_ascii_case(desc)).map(|t| t.value.clone())
    };

    let (mut tracknumber, mut tracktotal) = (tag.track().map(|n| n.to_string()), tag.total_tracks().map(|n| n as i32));
    if tracknumber.is_none() {
        tracknumber = None;
    }
    let _ = &mut tracktotal;
    let (discnumber, disctotal) = (tag.disc().map(|n| n.to_string()), tag.total_discs().map(|n| n as i32));

    let duration_sec = mp3_duration::from_path(p).map(|d| d.as_secs() as i32).unwrap_or(0);

    Ok(AudioTags {
        id: txxx("ROSEID"),
        release_id: txxx("ROSERELEASEID"),
        tracktitle: tag.title().map(|s| s.to_string()),
        releasedate: RoseDate::parse(tag.date_recorded().map(|d| d.to_string()).as_deref()),
        originaldate: RoseDate::parse(tag.date_released().map(|d| d.to_string()).as_deref()),
        compositiondate: RoseDate::parse(txxx("COMPOSITIONDATE").as_deref()),
        tracknumber,
        tracktotal,
        discnumber: Some(discnumber.unwrap_or_default()).filter(|s| !s.is_empty()),
        disctotal,
        releasetitle: tag.album().map(|s| s.to_string()),
        genre: split_genre_tag(tag.genre()),
        secondarygenre: split_genre_tag(txxx("SECONDARYGENRE").as_deref()),
        descriptor: split_tag(txxx("DESCRIPTOR").as_deref()),
        label: split_tag(tag.get("TPUB").and_then(|f| f.content().text()).map(|s| s)),
        catalognumber: txxx("CATALOGNUMBER"),
        edition: txxx("EDITION"),
        releasetype: normalize_rtype(txxx("RELEASETYPE").as_deref()),
        releaseartists: parse_artist_string(tag.album_artist(), None, None, None, None, None),
        trackartists: parse_artist_string(tag.artist(), None, None, None, None, None),
        duration_sec,
        path: p.to_path_buf(),
    })
}

fn write_mp3(t: &AudioTags, c: &Config) -> Result<()> {
    let mut tag = id3::Tag::read_from_path(&t.path).unwrap_or_default();

    let set_txxx = |tag: &mut id3::Tag, desc: &str, value: Option<&str>| {
        tag.remove_extended_text(Some(desc), None);
        if let Some(v) = value {
            if !v.is_empty() {
                tag.add_frame(id3::frame::ExtendedText { description: desc.to_string(), value: v.to_string() });
            }
        }
    };

    set_txxx(&mut tag, "ROSEID", t.id.as_deref());
    set_txxx(&mut tag, "ROSERELEASEID", t.release_id.as_deref());
    tag.set_title(t.tracktitle.clone().unwrap_or_default());
    tag.set_date_recorded(id3::Timestamp {
        year: t.releasedate.map(|d| d.year).unwrap_or(0),
        month: t.releasedate.and_then(|d| d.month).map(|m| m as u8),
        day: t.releasedate.and_then(|d| d.day).map(|d| d as u8),
        hour: None,
        minute: None,
        second: None,
    });
    set_txxx(&mut tag, "COMPOSITIONDATE", t.compositiondate.map(|d| d.to_string()).as_deref());
    if let Some(tn) = &t.tracknumber {
        if let Ok(n) = tn.parse::<u32>() {
            tag.set_track(n);
        }
    }
    if let Some(dn) = &t.discnumber {
        if let Ok(n) = dn.parse::<u32>() {
            tag.set_disc(n);
        }
    }
    tag.set_album(t.releasetitle.clone().unwrap_or_default());
    tag.set_genre(format_genre_tag(c, &t.genre));
    set_txxx(&mut tag, "SECONDARYGENRE", Some(&format_genre_tag(c, &t.secondarygenre)));
    set_txxx(&mut tag, "DESCRIPTOR", Some(&t.descriptor.join(";")));
    tag.remove("TPUB");
    tag.add_frame(id3::frame::Frame::text("TPUB", t.label.join(";")));
    set_txxx(&mut tag, "CATALOGNUMBER", t.catalognumber.as_deref());
    set_txxx(&mut tag, "EDITION", t.edition.as_deref());
    set_txxx(&mut tag, "RELEASETYPE", Some(&t.releasetype));
    tag.set_album_artist(format_artist_string(&t.releaseartists));
    tag.set_artist(format_artist_string(&t.trackartists));

    tag.write_to_path(&t.path, tag.version()).map_err(|e| {
        RoseError::Expected(RoseExpectedError::UnsupportedTagValue(format!("failed to write mp3 tags: {e}")))
    })?;
    Ok(())
}

// --- M4A (mp4ameta) ---

fn read_m4a(p: &Path) -> Result<AudioTags> {
    let tag = mp4ameta::Tag::read_from_path(p)
        .map_err(|e| RoseError::Expected(RoseExpectedError::UnsupportedFiletype(format!("Failed to open file: {e}"))))?;

    let freeform = |name: &str| -> Option<String> {
        tag.strings_of(&mp4ameta::FreeformIdent::new("net.sunsetglow.rose", name)).next().map(|s| s.to_string())
    };
    let itunes_freeform = |name: &str| -> Option<String> {
        tag.strings_of(&mp4ameta::FreeformIdent::new("com.apple.iTunes", name)).next().map(|s| s.to_string())
    };

    let (tracknumber, tracktotal) = tag.track();
    let (discnumber, disctotal) = tag.disc();

    Ok(AudioTags {
        id: freeform("ID"),
        release_id: freeform("RELEASEID"),
        tracktitle: tag.title().map(|s| s.to_string()),
        releasedate: RoseDate::parse(tag.year()),
        originaldate: RoseDate::parse(freeform("ORIGINALDATE").as_deref().or(itunes_freeform("ORIGINALDATE").as_deref())),
        compositiondate: RoseDate::parse(freeform("COMPOSITIONDATE").as_deref()),
        tracknumber: tracknumber.map(|n| n.to_string()),
        tracktotal: tracktotal.map(|n| n as i32),
        discnumber: discnumber.map(|n| n.to_string()),
        disctotal: disctotal.map(|n| n as i32),
        releasetitle: tag.album().map(|s| s.to_string()),
        genre: split_genre_tag(tag.genre()),
        secondarygenre: split_genre_tag(freeform("SECONDARYGENRE").as_deref()),
        descriptor: split_tag(freeform("DESCRIPTOR").as_deref()),
        label: split_tag(itunes_freeform("LABEL").as_deref()),
        catalognumber: itunes_freeform("CATALOGNUMBER"),
        edition: freeform("EDITION"),
        releasetype: normalize_rtype(itunes_freeform("RELEASETYPE").as_deref()),
        releaseartists: parse_artist_string(tag.album_artist(), None, None, None, None, None),
        trackartists: parse_artist_string(
            tag.artist(),
            None,
            tag.composer(),
            None,
            itunes_freeform("PRODUCER").as_deref(),
            itunes_freeform("DJMIXER").as_deref(),
        ),
        duration_sec: tag.duration().map(|d| d.as_secs() as i32).unwrap_or(0),
        path: p.to_path_buf(),
    })
}

fn write_m4a(t: &AudioTags, c: &Config) -> Result<()> {
    let mut tag = mp4ameta::Tag::read_from_path(&t.path).unwrap_or_default();

    let set_freeform = |tag: &mut mp4ameta::Tag, owner: &str, name: &str, value: &str| {
        let ident = mp4ameta::FreeformIdent::new(owner, name);
        tag.remove_data_of(&ident);
        if !value.is_empty() {
            tag.add_data(ident.into_owned(), mp4ameta::Data::Utf8(value.to_string()));
        }
    };

    set_freeform(&mut tag, "net.sunsetglow.rose", "ID", t.id.as_deref().unwrap_or(""));
    set_freeform(&mut tag, "net.sunsetglow.rose", "RELEASEID", t.release_id.as_deref().unwrap_or(""));
    tag.set_title(t.tracktitle.clone().unwrap_or_default());
    tag.set_year(t.releasedate.map(|d| d.to_string()).unwrap_or_default());
    set_freeform(&mut tag, "net.sunsetglow.rose", "ORIGINALDATE", &t.originaldate.map(|d| d.to_string()).unwrap_or_default());
    set_freeform(&mut tag, "net.sunsetglow.rose", "COMPOSITIONDATE", &t.compositiondate.map(|d| d.to_string()).unwrap_or_default());
    tag.set_album(t.releasetitle.clone().unwrap_or_default());
    tag.set_genre(format_genre_tag(c, &t.genre));
    set_freeform(&mut tag, "net.sunsetglow.rose", "SECONDARYGENRE", &format_genre_tag(c, &t.secondarygenre));
    set_freeform(&mut tag, "net.sunsetglow.rose", "DESCRIPTOR", &t.descriptor.join(";"));
    set_freeform(&mut tag, "com.apple.iTunes", "LABEL", &t.label.join(";"));
    set_freeform(&mut tag, "com.apple.iTunes", "CATALOGNUMBER", t.catalognumber.as_deref().unwrap_or(""));
    set_freeform(&mut tag, "net.sunsetglow.rose", "EDITION", t.edition.as_deref().unwrap_or(""));
    set_freeform(&mut tag, "com.apple.iTunes", "RELEASETYPE", &t.releasetype);
    tag.set_album_artist(format_artist_string(&t.releaseartists));
    tag.set_artist(format_artist_string(&t.trackartists));
    // Wipe the alt. role artist tags, since we encode the full artist into the main tag.
    tag.remove_data_of(&mp4ameta::FreeformIdent::new("com.apple.iTunes", "REMIXER"));
    tag.remove_data_of(&mp4ameta::FreeformIdent::new("com.apple.iTunes", "PRODUCER"));
    tag.remove_data_of(&mp4ameta::FreeformIdent::new("com.apple.iTunes", "CONDUCTOR"));
    tag.remove_data_of(&mp4ameta::FreeformIdent::new("com.apple.iTunes", "DJMIXER"));
    tag.set_composer("");

    let (_, prev_tracktotal) = tag.track();
    let (_, prev_disctotal) = tag.disc();
    let tracknumber: u16 = t.tracknumber.as_deref().unwrap_or("0").parse().map_err(|_| {
        RoseError::Expected(RoseExpectedError::UnsupportedTagValue(format!(
            "Could not write m4a trackno tag: must be an integer. Got: {:?}",
            t.tracknumber
        )))
    })?;
    let discnumber: u16 = t.discnumber.as_deref().unwrap_or("0").parse().map_err(|_| {
        RoseError::Expected(RoseExpectedError::UnsupportedTagValue(format!(
            "Could not write m4a discno tag: must be an integer. Got: {:?}",
            t.discnumber
        )))
    })?;
    tag.set_track(tracknumber, prev_tracktotal.unwrap_or(1));
    tag.set_disc(discnumber, prev_disctotal.unwrap_or(1));

    tag.write_to_path(&t.path).map_err(|e| {
        RoseError::Expected(RoseExpectedError::UnsupportedTagValue(format!("failed to write m4a tags: {e}")))
    })?;
    Ok(())
}

// --- FLAC (metaflac) ---

fn read_flac(p: &Path) -> Result<AudioTags> {
    let tag = metaflac::Tag::read_from_path(p)
        .map_err(|e| RoseError::Expected(RoseExpectedError::UnsupportedFiletype(format!("Failed to open file: {e}"))))?;
    let comments = tag
        .vorbis_comments()
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::UnsupportedFiletype("FLAC file has no vorbis comments".to_string())))?;

    let get = |key: &str| -> Option<String> { comments.get(key).and_then(|v| v.first()).cloned() };
    let join = |key: &str| -> Option<String> {
        comments.get(key).map(|v| v.join(" \\\\ ")).filter(|s| !s.is_empty())
    };

    let stream_info = tag.get_streaminfo();
    let duration_sec = stream_info.map(|si| (si.total_samples as f64 / si.sample_rate as f64) as i32).unwrap_or(0);

    Ok(AudioTags {
        id: get("roseid"),
        release_id: get("rosereleaseid"),
        tracktitle: get("title"),
        releasedate: RoseDate::parse(get("date").or_else(|| get("year")).as_deref()),
        originaldate: RoseDate::parse(get("originaldate").or_else(|| get("originalyear")).as_deref()),
        compositiondate: RoseDate::parse(get("compositiondate").as_deref()),
        tracknumber: get("tracknumber"),
        tracktotal: parse_int(get("tracktotal").as_deref()),
        discnumber: get("discnumber"),
        disctotal: parse_int(get("disctotal").as_deref()),
        releasetitle: get("album"),
        genre: split_genre_tag(join("genre").as_deref()),
        secondarygenre: split_genre_tag(join("secondarygenre").as_deref()),
        descriptor: split_tag(join("descriptor").as_deref()),
        label: split_tag(
            join("label")
                .or_else(|| join("organization"))
                .or_else(|| join("recordlabel"))
                .as_deref(),
        ),
        catalognumber: get("catalognumber"),
        edition: get("edition"),
        releasetype: normalize_rtype(get("releasetype").as_deref()),
        releaseartists: parse_artist_string(join("albumartist").as_deref(), None, None, None, None, None),
        trackartists: parse_artist_string(
            join("artist").as_deref(),
            join("remixer").as_deref(),
            join("composer").as_deref(),
            join("conductor").as_deref(),
            join("producer").as_deref(),
            join("djmixer").as_deref(),
        ),
        duration_sec,
        path: p.to_path_buf(),
    })
}

fn write_flac(t: &AudioTags, c: &Config) -> Result<()> {
    let mut tag = metaflac::Tag::read_from_path(&t.path).unwrap_or_default();

    tag.set_vorbis_comment("roseid", vec![t.id.clone().unwrap_or_default()]);
    tag.set_vorbis_comment("rosereleaseid", vec![t.release_id.clone().unwrap_or_default()]);
    tag.set_vorbis_comment("title", vec![t.tracktitle.clone().unwrap_or_default()]);
    tag.set_vorbis_comment("date", vec![t.releasedate.map(|d| d.to_string()).unwrap_or_default()]);
    tag.set_vorbis_comment("originaldate", vec![t.originaldate.map(|d| d.to_string()).unwrap_or_default()]);
    tag.set_vorbis_comment("compositiondate", vec![t.compositiondate.map(|d| d.to_string()).unwrap_or_default()]);
    tag.set_vorbis_comment("tracknumber", vec![t.tracknumber.clone().unwrap_or_default()]);
    tag.set_vorbis_comment("discnumber", vec![t.discnumber.clone().unwrap_or_default()]);
    tag.set_vorbis_comment("album", vec![t.releasetitle.clone().unwrap_or_default()]);
    tag.set_vorbis_comment("genre", vec![format_genre_tag(c, &t.genre)]);
    tag.set_vorbis_comment("secondarygenre", vec![format_genre_tag(c, &t.secondarygenre)]);
    tag.set_vorbis_comment("descriptor", vec![t.descriptor.join(";")]);
    tag.set_vorbis_comment("label", vec![t.label.join(";")]);
    tag.set_vorbis_comment("catalognumber", vec![t.catalognumber.clone().unwrap_or_default()]);
    tag.set_vorbis_comment("edition", vec![t.edition.clone().unwrap_or_default()]);
    tag.set_vorbis_comment("releasetype", vec![t.releasetype.clone()]);
    tag.set_vorbis_comment("albumartist", vec![format_artist_string(&t.releaseartists)]);
    tag.set_vorbis_comment("artist", vec![format_artist_string(&t.trackartists)]);
    // Wipe the alt. role artist tags, since we encode the full artist into the main tag.
    tag.remove_vorbis_comment("remixer");
    tag.remove_vorbis_comment("producer");
    tag.remove_vorbis_comment("composer");
    tag.remove_vorbis_comment("conductor");
    tag.remove_vorbis_comment("djmixer");

    tag.save().map_err(|e| {
        RoseError::Expected(RoseExpectedError::UnsupportedTagValue(format!("failed to write flac tags: {e}")))
    })?;
    Ok(())
}

// --- Ogg Vorbis / Opus ---
//
// Neither the `ogg` nor `opus_headers` crates expose a write path for Vorbis comments, so for
// these two container formats we fall back to `lofty`'s unified tag API.

fn read_vorbis(p: &Path) -> Result<AudioTags> {
    use lofty::file::TaggedFileExt;
    use lofty::prelude::{Accessor, ItemKey, TagExt};

    let tagged_file = lofty::read_from_path(p)
        .map_err(|e| RoseError::Expected(RoseExpectedError::UnsupportedFiletype(format!("Failed to open file: {e}"))))?;
    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
        .ok_or_else(|| RoseError::Expected(RoseExpectedError::UnsupportedFiletype(format!("{} has no tags", p.display()))))?;

    let get_unknown = |key: &str| -> Option<String> {
        tag.get_string(&ItemKey::Unknown(key.to_string())).map(|s| s.to_string())
    };
    let _ = TagExt::len(tag);

    Ok(AudioTags {
        id: get_unknown("ROSEID"),
        release_id: get_unknown("ROSERELEASEID"),
        tracktitle: tag.title().map(|s| s.to_string()),
        releasedate: RoseDate::parse(tag.year().map(|y| y.to_string()).as_deref()),
        originaldate: RoseDate::parse(get_unknown("ORIGINALDATE").as_deref()),
        compositiondate: RoseDate::parse(get_unknown("COMPOSITIONDATE").as_deref()),
        tracknumber: tag.track().map(|n| n.to_string()),
        tracktotal: tag.track_total().map(|n| n as i32),
        discnumber: tag.disk().map(|n| n.to_string()),
        disctotal: tag.disk_total().map(|n| n as i32),
        releasetitle: tag.album().map(|s| s.to_string()),
        genre: split_genre_tag(tag.genre().as_deref()),
        secondarygenre: split_genre_tag(get_unknown("SECONDARYGENRE").as_deref()),
        descriptor: split_tag(get_unknown("DESCRIPTOR").as_deref()),
        label: split_tag(
            tag.get_string(&ItemKey::Label)
                .or_else(|| tag.get_string(&ItemKey::Unknown("ORGANIZATION".to_string())))
                .map(|s| s.to_string())
                .as_deref(),
        ),
        catalognumber: get_unknown("CATALOGNUMBER"),
        edition: get_unknown("EDITION"),
        releasetype: normalize_rtype(get_unknown("RELEASETYPE").as_deref()),
        releaseartists: parse_artist_string(tag.album_artist().as_deref(), None, None, None, None, None),
        trackartists: parse_artist_string(
            tag.artist().as_deref(),
            get_unknown("REMIXER").as_deref(),
            get_unknown("COMPOSER").as_deref(),
            get_unknown("CONDUCTOR").as_deref(),
            get_unknown("PRODUCER").as_deref(),
            get_unknown("DJMIXER").as_deref(),
        ),
        duration_sec: tagged_file.properties().duration().as_secs() as i32,
        path: p.to_path_buf(),
    })
}

fn write_vorbis(t: &AudioTags, c: &Config) -> Result<()> {
    use lofty::file::TaggedFileExt;
    use lofty::prelude::{Accessor, ItemKey, TagItem};
    use lofty::tag::{Tag as LoftyTag, TagType};

    let mut tagged_file = lofty::read_from_path(&t.path)
        .map_err(|e| RoseError::Expected(RoseExpectedError::UnsupportedFiletype(format!("Failed to open file: {e}"))))?;

    let tag_type = if tagged_file.primary_tag().is_some() {
        tagged_file.primary_tag_type()
    } else {
        tagged_file.file_type().primary_tag_type()
    };
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(LoftyTag::new(tag_type));
    }
    let tag = tagged_file.tag_mut(tag_type).expect("tag inserted above");

    let set_unknown = |tag: &mut LoftyTag, key: &str, value: &str| {
        tag.remove_key(&ItemKey::Unknown(key.to_string()));
        if !value.is_empty() {
            tag.insert_text(ItemKey::Unknown(key.to_string()), value.to_string());
        }
    };

    set_unknown(tag, "ROSEID", t.id.as_deref().unwrap_or(""));
    set_unknown(tag, "ROSERELEASEID", t.release_id.as_deref().unwrap_or(""));
    tag.set_title(t.tracktitle.clone().unwrap_or_default());
    if let Some(d) = t.releasedate {
        tag.set_year(d.year as u32);
    }
    set_unknown(tag, "ORIGINALDATE", &t.originaldate.map(|d| d.to_string()).unwrap_or_default());
    set_unknown(tag, "COMPOSITIONDATE", &t.compositiondate.map(|d| d.to_string()).unwrap_or_default());
    tag.set_album(t.releasetitle.clone().unwrap_or_default());
    tag.set_genre(format_genre_tag(c, &t.genre));
    set_unknown(tag, "SECONDARYGENRE", &format_genre_tag(c, &t.secondarygenre));
    set_unknown(tag, "DESCRIPTOR", &t.descriptor.join(";"));
    tag.remove_key(&ItemKey::Label);
    if !t.label.is_empty() {
        tag.insert_text(ItemKey::Label, t.label.join(";"));
    }
    set_unknown(tag, "CATALOGNUMBER", t.catalognumber.as_deref().unwrap_or(""));
    set_unknown(tag, "EDITION", t.edition.as_deref().unwrap_or(""));
    set_unknown(tag, "RELEASETYPE", &t.releasetype);
    tag.set_album_artist(format_artist_string(&t.releaseartists));
    tag.set_artist(format_artist_string(&t.trackartists));
    // Wipe the alt. role artist tags, since we encode the full artist into the main tag.
    for key in ["REMIXER", "PRODUCER", "COMPOSER", "CONDUCTOR", "DJMIXER"] {
        tag.remove_key(&ItemKey::Unknown(key.to_string()));
    }
    if let Some(tn) = &t.tracknumber {
        if let Ok(n) = tn.parse::<u32>() {
            tag.set_track(n);
        }
    }
    if let Some(dn) = &t.discnumber {
        if let Ok(n) = dn.parse::<u32>() {
            tag.set_disk(n);
        }
    }

    tag.save_to_path(&t.path, lofty::config::WriteOptions::default()).map_err(|e| {
        RoseError::Expected(RoseExpectedError::UnsupportedTagValue(format!("failed to write vorbis comments: {e}")))
    })?;
    Ok(())
}

/// Parse a formatted artist string (as written by [`format_artist_string`]) into an
/// [`ArtistMapping`]. Each optional parameter is a raw per-role tag value read straight from the
/// file, which gets merged with role markers detected inside `main` (e.g. `"X feat. Y"`).
pub fn parse_artist_string(
    main: Option<&str>,
    remixer: Option<&str>,
    composer: Option<&str>,
    conductor: Option<&str>,
    producer: Option<&str>,
    dj: Option<&str>,
) -> ArtistMapping {
    let mut li_conductor = split_tag(conductor);
    let mut li_remixer = split_tag(remixer);
    let mut li_composer = split_tag(composer);
    let mut li_producer = split_tag(producer);
    let mut li_dj = split_tag(dj);
    let mut li_guests: Vec<String> = Vec::new();
    let mut li_main: Vec<String> = Vec::new();

    let mut main = main.map(|s| s.to_string());

    if let Some(m) = &main {
        if let Some(idx) = m.find("produced by ") {
            let (before, after) = (&m[..idx], &m[idx + "produced by ".len()..]);
            li_producer.extend(split_tag(Some(after)));
            main = Some(before.trim_end().to_string());
        }
    }
    if let Some(m) = &main {
        if let Some(idx) = m.find("remixed by ") {
            let (before, after) = (&m[..idx], &m[idx + "remixed by ".len()..]);
            li_remixer.extend(split_tag(Some(after)));
            main = Some(before.trim_end().to_string());
        }
    }
    if let Some(m) = &main {
        if let Some(idx) = m.find("feat. ") {
            let (before, after) = (&m[..idx], &m[idx + "feat. ".len()..]);
            li_guests.extend(split_tag(Some(after)));
            main = Some(before.trim_end().to_string());
        }
    }
    if let Some(m) = &main {
        if let Some(idx) = m.find("pres. ") {
            let (before, after) = (&m[..idx], &m[idx + "pres. ".len()..]);
            li_dj.extend(split_tag(Some(before.trim_end())));
            main = Some(after.to_string());
        }
    }
    if let Some(m) = &main {
        if let Some(idx) = m.find("performed by ") {
            let (before, after) = (&m[..idx], &m[idx + "performed by ".len()..]);
            li_composer.extend(split_tag(Some(before.trim_end())));
            main = Some(after.to_string());
        }
    }
    if let Some(m) = &main {
        if let Some(idx) = m.find("under. ") {
            let (before, after) = (&m[..idx], &m[idx + "under. ".len()..]);
            li_conductor.extend(split_tag(Some(after)));
            main = Some(before.trim_end().to_string());
        }
    }
    if let Some(m) = &main {
        li_main.extend(split_tag(Some(m)));
    }

    fn to_artist(xs: Vec<String>) -> Vec<Artist> {
        uniq(xs).into_iter().map(Artist::new).collect()
    }

    ArtistMapping {
        main: to_artist(li_main),
        guest: to_artist(li_guests),
        remixer: to_artist(li_remixer),
        producer: to_artist(li_producer),
        composer: to_artist(li_composer),
        conductor: to_artist(li_conductor),
        djmixer: to_artist(li_dj),
    }
}

/// The one-line, parseable round-trip encoding of an [`ArtistMapping`] used when Rose writes
/// artist tags back to disk.
pub fn format_artist_string(mapping: &ArtistMapping) -> String {
    fn format_role(xs: &[Artist]) -> String {
        xs.iter().filter(|x| !x.alias).map(|x| x.name.as_str()).collect::<Vec<_>>().join(";")
    }

    let mut r = format_role(&mapping.main);
    if !mapping.composer.is_empty() {
        r = format!("{} performed by {}", format_role(&mapping.composer), r);
    }
    if !mapping.djmixer.is_empty() {
        r = format!("{} pres. {}", format_role(&mapping.djmixer), r);
    }
    if !mapping.conductor.is_empty() {
        r = format!("{r} under. {}", format_role(&mapping.conductor));
    }
    if !mapping.guest.is_empty() {
        r = format!("{r} feat. {}", format_role(&mapping.guest));
    }
    if !mapping.remixer.is_empty() {
        r = format!("{r} remixed by {}", format_role(&mapping.remixer));
    }
    if !mapping.producer.is_empty() {
        r = format!("{r} produced by {}", format_role(&mapping.producer));
    }
    r
}
