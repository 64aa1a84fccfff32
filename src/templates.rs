//! The templates module provides the ability to customize paths in the source directory and
//! virtual filesystem via Tera templates. Users can specify different templates for different
//! views in the virtual filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Serialize;
use tera::{Tera, Value};

pub use crate::audiotags::RoseDate;
pub use crate::cache::{CachedRelease as Release, CachedTrack as Track};
use crate::common::{Artist, ArtistMapping};
use crate::config::PathTemplate;
use crate::error::{Result, RoseError, RoseExpectedError};

const RELEASE_TYPE_FORMATTER: &[(&str, &str)] = &[
    ("album", "Album"),
    ("single", "Single"),
    ("ep", "EP"),
    ("compilation", "Compilation"),
    ("anthology", "Anthology"),
    ("soundtrack", "Soundtrack"),
    ("live", "Live"),
    ("remix", "Remix"),
    ("djmix", "DJ-Mix"),
    ("mixtape", "Mixtape"),
    ("other", "Other"),
    ("demo", "Demo"),
    ("unknown", "Unknown"),
];

fn titlecase(x: &str) -> String {
    x.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn releasetypefmt(x: &str) -> String {
    RELEASE_TYPE_FORMATTER
        .iter()
        .find(|(k, _)| *k == x)
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| titlecase(x))
}

/// Formats an array as "x, y & z".
pub fn arrayfmt(xs: &[String]) -> String {
    match xs.len() {
        0 => String::new(),
        1 => xs[0].clone(),
        _ => format!("{} & {}", xs[..xs.len() - 1].join(", "), xs[xs.len() - 1]),
    }
}

/// Formats an array of artists, filtering out aliases.
pub fn artistsarrayfmt(xs: &[Artist]) -> String {
    let names: Vec<String> = xs.iter().filter(|a| !a.alias).map(|a| a.name.clone()).collect();
    if names.len() <= 3 {
        arrayfmt(&names)
    } else {
        format!("{} et al.", names[0])
    }
}

/// Formats a mapping of artists, e.g. "DJ pres. Main (feat. Guest) (prod. Producer)".
pub fn artistsfmt(a: &ArtistMapping, omit: Option<&[String]>) -> String {
    let omit = omit.unwrap_or(&[]);
    let has = |role: &str| !omit.iter().any(|o| o == role);

    let mut r = artistsarrayfmt(&a.main);
    if !a.djmixer.is_empty() && has("djmixer") {
        r = format!("{} pres. {}", artistsarrayfmt(&a.djmixer), r);
    } else if !a.composer.is_empty() && has("composer") {
        r = format!("{} performed by {}", artistsarrayfmt(&a.composer), r);
    }
    if !a.conductor.is_empty() && has("conductor") {
        r = format!("{r} under {}", artistsarrayfmt(&a.conductor));
    }
    if !a.guest.is_empty() && has("guest") {
        r = format!("{r} (feat. {})", artistsarrayfmt(&a.guest));
    }
    if !a.producer.is_empty() && has("producer") {
        r = format!("{r} (prod. {})", artistsarrayfmt(&a.producer));
    }
    if r.is_empty() {
        "Unknown Artists".to_string()
    } else {
        r
    }
}

/// "Claude Debussy" -> "Debussy, Claude". Names with no space are returned unchanged.
pub fn sortorder(x: &str) -> String {
    match x.rsplit_once(' ') {
        Some((first, last)) => format!("{last}, {first}"),
        None => x.to_string(),
    }
}

/// "Claude Debussy" -> "Debussy". Names with no space are returned unchanged.
pub fn lastname(x: &str) -> String {
    match x.rsplit_once(' ') {
        Some((_, last)) => last.to_string(),
        None => x.to_string(),
    }
}

/// Collapses all runs of whitespace (including newlines from multi-line templates) into a single
/// space and trims the result.
pub fn collapse_spacing(x: &str) -> String {
    x.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn arrayfmt_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let xs: Vec<String> = serde_json::from_value(value.clone()).map_err(|e| tera::Error::msg(e.to_string()))?;
    Ok(Value::String(arrayfmt(&xs)))
}

fn artistsarrayfmt_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let xs: Vec<Artist> = serde_json::from_value(value.clone()).map_err(|e| tera::Error::msg(e.to_string()))?;
    Ok(Value::String(artistsarrayfmt(&xs)))
}

fn artistsfmt_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let mapping: ArtistMapping = serde_json::from_value(value.clone()).map_err(|e| tera::Error::msg(e.to_string()))?;
    let omit: Option<Vec<String>> = match args.get("omit") {
        Some(v) => Some(serde_json::from_value(v.clone()).map_err(|e| tera::Error::msg(e.to_string()))?),
        None => None,
    };
    Ok(Value::String(artistsfmt(&mapping, omit.as_deref())))
}

fn releasetypefmt_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value.as_str().ok_or_else(|| tera::Error::msg("releasetypefmt: expected a string"))?;
    Ok(Value::String(releasetypefmt(s)))
}

fn sortorder_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value.as_str().ok_or_else(|| tera::Error::msg("sortorder: expected a string"))?;
    Ok(Value::String(sortorder(s)))
}

fn lastname_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value.as_str().ok_or_else(|| tera::Error::msg("lastname: expected a string"))?;
    Ok(Value::String(lastname(s)))
}

fn rjust_filter(value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
    let s = value.as_str().ok_or_else(|| tera::Error::msg("rjust: expected a string"))?;
    let width = args
        .get("width")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| tera::Error::msg("rjust: missing `width` argument"))? as usize;
    let fillchar = args.get("fillchar").and_then(|v| v.as_str()).and_then(|s| s.chars().next()).unwrap_or('0');

    let len = s.chars().count();
    let padded = if len >= width {
        s.to_string()
    } else {
        let pad: String = std::iter::repeat(fillchar).take(width - len).collect();
        format!("{pad}{s}")
    };
    Ok(Value::String(padded))
}

fn base_environment() -> Tera {
    let mut tera = Tera::default();
    tera.register_filter("arrayfmt", arrayfmt_filter);
    tera.register_filter("artistsarrayfmt", artistsarrayfmt_filter);
    tera.register_filter("artistsfmt", artistsfmt_filter);
    tera.register_filter("releasetypefmt", releasetypefmt_filter);
    tera.register_filter("sortorder", sortorder_filter);
    tera.register_filter("lastname", lastname_filter);
    tera.register_filter("rjust", rjust_filter);
    tera
}

/// Lazily constructed: building the Tera environment and registering its filters is cheap but
/// unnecessary work for CLI invocations that never render a template.
fn environment() -> &'static Tera {
    static ENV: OnceLock<Tera> = OnceLock::new();
    ENV.get_or_init(base_environment)
}

fn render(name: &str, source: &str, ctx: &tera::Context) -> Result<String> {
    let mut tera = environment().clone();
    tera.add_raw_template(name, source)
        .map_err(|e| RoseError::Expected(RoseExpectedError::InvalidPathTemplate(format!("Failed to compile template: {e}"))))?;
    tera.render(name, ctx)
        .map_err(|e| RoseError::Expected(RoseExpectedError::InvalidPathTemplate(format!("Failed to render template: {e}"))))
}

/// Identifies which virtual-filesystem listing directory a template is being rendered for, so
/// that templates can customize their output (e.g. omit the genre from a release's path when
/// already browsing inside that genre's directory).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathContext {
    pub genre: Option<String>,
    pub artist: Option<String>,
    pub label: Option<String>,
    pub descriptor: Option<String>,
    pub collage: Option<String>,
    pub playlist: Option<String>,
}

fn insert_context(ctx: &mut tera::Context, context: Option<&PathContext>) {
    if let Some(c) = context {
        ctx.insert("context", c);
    } else {
        ctx.insert("context", &Option::<PathContext>::None);
    }
}

fn release_context(release: &Release, position: Option<&str>) -> tera::Context {
    let mut ctx = tera::Context::new();
    ctx.insert("added_at", &release.added_at);
    ctx.insert("releasetitle", &release.releasetitle);
    ctx.insert("releasetype", &release.releasetype);
    ctx.insert("releasedate", &release.releasedate);
    ctx.insert("originaldate", &release.originaldate);
    ctx.insert("compositiondate", &release.compositiondate);
    ctx.insert("edition", &release.edition);
    ctx.insert("catalognumber", &release.catalognumber);
    ctx.insert("new", &release.new);
    ctx.insert("disctotal", &release.disctotal);
    ctx.insert("genres", &release.genres);
    ctx.insert("parentgenres", &release.parent_genres);
    ctx.insert("secondarygenres", &release.secondary_genres);
    ctx.insert("parentsecondarygenres", &release.parent_secondary_genres);
    ctx.insert("descriptors", &release.descriptors);
    ctx.insert("labels", &release.labels);
    ctx.insert("releaseartists", &release.releaseartists);
    ctx.insert("position", &position);
    ctx
}

fn track_context(track: &Track, position: Option<&str>) -> tera::Context {
    let mut ctx = tera::Context::new();
    ctx.insert("added_at", &track.release.added_at);
    ctx.insert("tracktitle", &track.tracktitle);
    ctx.insert("tracknumber", &track.tracknumber);
    ctx.insert("tracktotal", &track.tracktotal);
    ctx.insert("discnumber", &track.discnumber);
    ctx.insert("disctotal", &track.release.disctotal);
    ctx.insert("duration_seconds", &track.duration_seconds);
    ctx.insert("trackartists", &track.trackartists);
    ctx.insert("releasetitle", &track.release.releasetitle);
    ctx.insert("releasetype", &track.release.releasetype);
    ctx.insert("releasedate", &track.release.releasedate);
    ctx.insert("originaldate", &track.release.originaldate);
    ctx.insert("compositiondate", &track.release.compositiondate);
    ctx.insert("edition", &track.release.edition);
    ctx.insert("catalognumber", &track.release.catalognumber);
    ctx.insert("new", &track.release.new);
    ctx.insert("genres", &track.release.genres);
    ctx.insert("parentgenres", &track.release.parent_genres);
    ctx.insert("secondarygenres", &track.release.secondary_genres);
    ctx.insert("parentsecondarygenres", &track.release.parent_secondary_genres);
    ctx.insert("descriptors", &track.release.descriptors);
    ctx.insert("labels", &track.release.labels);
    ctx.insert("releaseartists", &track.release.releaseartists);
    ctx.insert("position", &position);
    ctx
}

pub fn evaluate_release_template(template: &PathTemplate, release: &Release, context: Option<&PathContext>, position: Option<&str>) -> Result<String> {
    let mut ctx = release_context(release, position);
    insert_context(&mut ctx, context);
    let rendered = render("release", &template.0, &ctx)?;
    Ok(collapse_spacing(&rendered))
}

pub fn evaluate_track_template(template: &PathTemplate, track: &Track, context: Option<&PathContext>, position: Option<&str>) -> Result<String> {
    let mut ctx = track_context(track, position);
    insert_context(&mut ctx, context);
    let rendered = render("track", &template.0, &ctx)?;
    let suffix = track.source_path.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
    Ok(format!("{}{}", collapse_spacing(&rendered), suffix))
}

/// Three hard-coded releases/tracks (a K-pop single, a K-pop album, and a classical recording)
/// used to preview path templates in the config validator and documentation.
#[allow(clippy::type_complexity)]
pub fn get_sample_music(music_source_dir: &Path) -> ((Release, Track), (Release, Track), (Release, Track)) {
    let kimlip_rls = Release {
        id: "018b268e-ff1e-7a0c-9ac8-7bbb282761f2".to_string(),
        source_path: music_source_dir.join("LOONA - 2017. Kim Lip"),
        cover_image_path: None,
        added_at: "2023-04-20:23:45Z".to_string(),
        datafile_mtime: "999".to_string(),
        releasetitle: "Kim Lip".to_string(),
        releasetype: "single".to_string(),
        releasedate: Some(RoseDate::new(2017, Some(5), Some(23))),
        originaldate: Some(RoseDate::new(2017, Some(5), Some(23))),
        compositiondate: None,
        edition: None,
        catalognumber: Some("CMCC11088".to_string()),
        new: true,
        disctotal: 1,
        genres: vec!["K-Pop".to_string(), "Dance-Pop".to_string(), "Contemporary R&B".to_string()],
        parent_genres: vec!["Pop".to_string(), "R&B".to_string()],
        secondary_genres: vec!["Synth Funk".to_string(), "Synthpop".to_string(), "Future Bass".to_string()],
        parent_secondary_genres: vec!["Funk".to_string(), "Pop".to_string()],
        descriptors: vec![
            "Female Vocalist".to_string(),
            "Mellow".to_string(),
            "Sensual".to_string(),
            "Ethereal".to_string(),
            "Love".to_string(),
            "Lush".to_string(),
            "Romantic".to_string(),
            "Warm".to_string(),
            "Melodic".to_string(),
            "Passionate".to_string(),
            "Nocturnal".to_string(),
            "Summer".to_string(),
        ],
        labels: vec!["BlockBerryCreative".to_string()],
        releaseartists: ArtistMapping { main: vec![Artist::new("Kim Lip".to_string())], ..ArtistMapping::new() },
        metahash: "0".to_string(),
    };

    let bts_rls = Release {
        id: "018b6021-f1e5-7d4b-b796-440fbbea3b13".to_string(),
        source_path: music_source_dir.join("BTS - 2016. Young Forever (花樣年華)"),
        cover_image_path: None,
        added_at: "2023-06-09:23:45Z".to_string(),
        datafile_mtime: "999".to_string(),
        releasetitle: "Young Forever (花樣年華)".to_string(),
        releasetype: "album".to_string(),
        releasedate: Some(RoseDate::year_only(2016)),
        originaldate: Some(RoseDate::year_only(2016)),
        compositiondate: None,
        edition: Some("Deluxe".to_string()),
        catalognumber: Some("L200001238".to_string()),
        new: false,
        disctotal: 2,
        genres: vec!["K-Pop".to_string()],
        parent_genres: vec!["Pop".to_string()],
        secondary_genres: vec!["Pop Rap".to_string(), "Electropop".to_string()],
        parent_secondary_genres: vec!["Hip Hop".to_string(), "Electronic".to_string()],
        descriptors: vec![
            "Autumn".to_string(),
            "Passionate".to_string(),
            "Melodic".to_string(),
            "Romantic".to_string(),
            "Eclectic".to_string(),
            "Melancholic".to_string(),
            "Male Vocalist".to_string(),
            "Sentimental".to_string(),
            "Uplifting".to_string(),
            "Breakup".to_string(),
            "Love".to_string(),
            "Anthemic".to_string(),
            "Lush".to_string(),
            "Bittersweet".to_string(),
            "Spring".to_string(),
        ],
        labels: vec!["BIGHIT".to_string()],
        releaseartists: ArtistMapping { main: vec![Artist::new("BTS".to_string())], ..ArtistMapping::new() },
        metahash: "0".to_string(),
    };

    let debussy_rls = Release {
        id: "018b268e-de0c-7cb2-8ffa-bcc2083c94e6".to_string(),
        source_path: music_source_dir.join("Debussy - 1907. Images performed by Cleveland Orchestra under Pierre Boulez (1992)"),
        cover_image_path: None,
        added_at: "2023-09-06:23:45Z".to_string(),
        datafile_mtime: "999".to_string(),
        releasetitle: "Images".to_string(),
        releasetype: "album".to_string(),
        releasedate: Some(RoseDate::year_only(1992)),
        originaldate: Some(RoseDate::year_only(1991)),
        compositiondate: Some(RoseDate::year_only(1907)),
        edition: None,
        catalognumber: Some("435-766 2".to_string()),
        new: false,
        disctotal: 2,
        genres: vec!["Impressionism, Orchestral".to_string()],
        parent_genres: vec!["Modern Classical".to_string()],
        secondary_genres: vec!["Tone Poem".to_string()],
        parent_secondary_genres: vec!["Orchestral Music".to_string()],
        descriptors: vec!["Orchestral Music".to_string()],
        labels: vec!["Deustche Grammophon".to_string()],
        releaseartists: ArtistMapping {
            main: vec![Artist::new("Cleveland Orchestra".to_string())],
            composer: vec![Artist::new("Claude Debussy".to_string())],
            conductor: vec![Artist::new("Pierre Boulez".to_string())],
            ..ArtistMapping::new()
        },
        metahash: "0".to_string(),
    };

    let kimlip_trk = Track {
        id: "018b268e-ff1e-7a0c-9ac8-7bbb282761f1".to_string(),
        source_path: music_source_dir.join("LOONA - 2017. Kim Lip").join("01. Eclipse.opus"),
        source_mtime: "999".to_string(),
        tracktitle: "Eclipse".to_string(),
        tracknumber: "1".to_string(),
        tracktotal: 2,
        discnumber: "1".to_string(),
        duration_seconds: 230,
        trackartists: ArtistMapping { main: vec![Artist::new("Kim Lip".to_string())], ..ArtistMapping::new() },
        metahash: "0".to_string(),
        release: kimlip_rls.clone(),
    };

    let bts_trk = Track {
        id: "018b6021-f1e5-7d4b-b796-440fbbea3b15".to_string(),
        source_path: music_source_dir.join("BTS - 2016. Young Forever (花樣年華)").join("02-05. House of Cards.opus"),
        source_mtime: "999".to_string(),
        tracktitle: "House of Cards".to_string(),
        tracknumber: "5".to_string(),
        tracktotal: 8,
        discnumber: "2".to_string(),
        duration_seconds: 226,
        trackartists: ArtistMapping { main: vec![Artist::new("BTS".to_string())], ..ArtistMapping::new() },
        metahash: "0".to_string(),
        release: bts_rls.clone(),
    };

    let debussy_trk = Track {
        id: "018b6514-6e65-78cc-94a5-fdb17418f090".to_string(),
        source_path: music_source_dir
            .join("Debussy - 1907. Images performed by Cleveland Orchestra under Pierre Boulez (1992)")
            .join("01. Gigues: Modéré.opus"),
        source_mtime: "999".to_string(),
        tracktitle: "Gigues: Modéré".to_string(),
        tracknumber: "1".to_string(),
        tracktotal: 6,
        discnumber: "1".to_string(),
        duration_seconds: 444,
        trackartists: ArtistMapping {
            main: vec![Artist::new("Cleveland Orchestra".to_string())],
            composer: vec![Artist::new("Claude Debussy".to_string())],
            conductor: vec![Artist::new("Pierre Boulez".to_string())],
            ..ArtistMapping::new()
        },
        metahash: "0".to_string(),
        release: debussy_rls.clone(),
    };

    ((kimlip_rls, kimlip_trk), (bts_rls, bts_trk), (debussy_rls, debussy_trk))
}
