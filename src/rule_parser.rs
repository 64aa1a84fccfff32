// Parser for the rules engine's DSL. Split out from the rules engine itself so that the config
// module (which needs to parse stored rules) does not depend on the rules module.

use std::fmt;

use regex::Regex;
use thiserror::Error;

use crate::common::uniq;

/// A single metadata tag that a matcher or action can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    TrackTitle,
    TrackArtistMain,
    TrackArtistGuest,
    TrackArtistRemixer,
    TrackArtistProducer,
    TrackArtistComposer,
    TrackArtistConductor,
    TrackArtistDjMixer,
    TrackNumber,
    TrackTotal,
    DiscNumber,
    DiscTotal,
    ReleaseTitle,
    ReleaseArtistMain,
    ReleaseArtistGuest,
    ReleaseArtistRemixer,
    ReleaseArtistProducer,
    ReleaseArtistComposer,
    ReleaseArtistConductor,
    ReleaseArtistDjMixer,
    ReleaseType,
    ReleaseDate,
    OriginalDate,
    CompositionDate,
    CatalogNumber,
    Edition,
    Genre,
    SecondaryGenre,
    Descriptor,
    Label,
    New,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::TrackTitle => "tracktitle",
            Tag::TrackArtistMain => "trackartist[main]",
            Tag::TrackArtistGuest => "trackartist[guest]",
            Tag::TrackArtistRemixer => "trackartist[remixer]",
            Tag::TrackArtistProducer => "trackartist[producer]",
            Tag::TrackArtistComposer => "trackartist[composer]",
            Tag::TrackArtistConductor => "trackartist[conductor]",
            Tag::TrackArtistDjMixer => "trackartist[djmixer]",
            Tag::TrackNumber => "tracknumber",
            Tag::TrackTotal => "tracktotal",
            Tag::DiscNumber => "discnumber",
            Tag::DiscTotal => "disctotal",
            Tag::ReleaseTitle => "releasetitle",
            Tag::ReleaseArtistMain => "releaseartist[main]",
            Tag::ReleaseArtistGuest => "releaseartist[guest]",
            Tag::ReleaseArtistRemixer => "releaseartist[remixer]",
            Tag::ReleaseArtistProducer => "releaseartist[producer]",
            Tag::ReleaseArtistComposer => "releaseartist[composer]",
            Tag::ReleaseArtistConductor => "releaseartist[conductor]",
            Tag::ReleaseArtistDjMixer => "releaseartist[djmixer]",
            Tag::ReleaseType => "releasetype",
            Tag::ReleaseDate => "releasedate",
            Tag::OriginalDate => "originaldate",
            Tag::CompositionDate => "compositiondate",
            Tag::CatalogNumber => "catalognumber",
            Tag::Edition => "edition",
            Tag::Genre => "genre",
            Tag::SecondaryGenre => "secondarygenre",
            Tag::Descriptor => "descriptor",
            Tag::Label => "label",
            Tag::New => "new",
        }
    }
}

const TRACK_ARTIST_TAGS: &[Tag] = &[
    Tag::TrackArtistMain,
    Tag::TrackArtistGuest,
    Tag::TrackArtistRemixer,
    Tag::TrackArtistProducer,
    Tag::TrackArtistComposer,
    Tag::TrackArtistConductor,
    Tag::TrackArtistDjMixer,
];

const RELEASE_ARTIST_TAGS: &[Tag] = &[
    Tag::ReleaseArtistMain,
    Tag::ReleaseArtistGuest,
    Tag::ReleaseArtistRemixer,
    Tag::ReleaseArtistProducer,
    Tag::ReleaseArtistComposer,
    Tag::ReleaseArtistConductor,
    Tag::ReleaseArtistDjMixer,
];

/// A tag name that can stand in for a group of underlying tags (`artist`, `trackartist`,
/// `releaseartist`), plus the plain, non-expanding tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandableTag {
    Tag(Tag),
    Artist,
    TrackArtist,
    ReleaseArtist,
}

impl ExpandableTag {
    pub fn expand(&self) -> Vec<Tag> {
        match self {
            ExpandableTag::Tag(t) => vec![*t],
            ExpandableTag::TrackArtist => TRACK_ARTIST_TAGS.to_vec(),
            ExpandableTag::ReleaseArtist => RELEASE_ARTIST_TAGS.to_vec(),
            ExpandableTag::Artist => TRACK_ARTIST_TAGS.iter().chain(RELEASE_ARTIST_TAGS).copied().collect(),
        }
    }
}

/// Every recognized tag token, in the order they are tried during parsing. Order does not affect
/// correctness (a candidate is only accepted if followed by a valid separator), but longer/more
/// specific spellings like `trackartist[main]` are listed near their `trackartist` alias for
/// readability.
const TAG_TABLE: &[(&str, ExpandableTag)] = &[
    ("tracktitle", ExpandableTag::Tag(Tag::TrackTitle)),
    ("trackartist[main]", ExpandableTag::Tag(Tag::TrackArtistMain)),
    ("trackartist[guest]", ExpandableTag::Tag(Tag::TrackArtistGuest)),
    ("trackartist[remixer]", ExpandableTag::Tag(Tag::TrackArtistRemixer)),
    ("trackartist[producer]", ExpandableTag::Tag(Tag::TrackArtistProducer)),
    ("trackartist[composer]", ExpandableTag::Tag(Tag::TrackArtistComposer)),
    ("trackartist[conductor]", ExpandableTag::Tag(Tag::TrackArtistConductor)),
    ("trackartist[djmixer]", ExpandableTag::Tag(Tag::TrackArtistDjMixer)),
    ("trackartist", ExpandableTag::TrackArtist),
    ("tracknumber", ExpandableTag::Tag(Tag::TrackNumber)),
    ("tracktotal", ExpandableTag::Tag(Tag::TrackTotal)),
    ("discnumber", ExpandableTag::Tag(Tag::DiscNumber)),
    ("disctotal", ExpandableTag::Tag(Tag::DiscTotal)),
    ("releasetitle", ExpandableTag::Tag(Tag::ReleaseTitle)),
    ("releaseartist[main]", ExpandableTag::Tag(Tag::ReleaseArtistMain)),
    ("releaseartist[guest]", ExpandableTag::Tag(Tag::ReleaseArtistGuest)),
    ("releaseartist[remixer]", ExpandableTag::Tag(Tag::ReleaseArtistRemixer)),
    ("releaseartist[producer]", ExpandableTag::Tag(Tag::ReleaseArtistProducer)),
    ("releaseartist[composer]", ExpandableTag::Tag(Tag::ReleaseArtistComposer)),
    ("releaseartist[conductor]", ExpandableTag::Tag(Tag::ReleaseArtistConductor)),
    ("releaseartist[djmixer]", ExpandableTag::Tag(Tag::ReleaseArtistDjMixer)),
    ("releaseartist", ExpandableTag::ReleaseArtist),
    ("releasetype", ExpandableTag::Tag(Tag::ReleaseType)),
    ("releasedate", ExpandableTag::Tag(Tag::ReleaseDate)),
    ("originaldate", ExpandableTag::Tag(Tag::OriginalDate)),
    ("compositiondate", ExpandableTag::Tag(Tag::CompositionDate)),
    ("catalognumber", ExpandableTag::Tag(Tag::CatalogNumber)),
    ("edition", ExpandableTag::Tag(Tag::Edition)),
    ("genre", ExpandableTag::Tag(Tag::Genre)),
    ("secondarygenre", ExpandableTag::Tag(Tag::SecondaryGenre)),
    ("descriptor", ExpandableTag::Tag(Tag::Descriptor)),
    ("label", ExpandableTag::Tag(Tag::Label)),
    ("new", ExpandableTag::Tag(Tag::New)),
    ("artist", ExpandableTag::Artist),
];

const MODIFIABLE_TAGS: &[Tag] = &[
    Tag::TrackTitle,
    Tag::TrackArtistMain,
    Tag::TrackArtistGuest,
    Tag::TrackArtistRemixer,
    Tag::TrackArtistProducer,
    Tag::TrackArtistComposer,
    Tag::TrackArtistConductor,
    Tag::TrackArtistDjMixer,
    Tag::TrackNumber,
    Tag::DiscNumber,
    Tag::ReleaseTitle,
    Tag::ReleaseArtistMain,
    Tag::ReleaseArtistGuest,
    Tag::ReleaseArtistRemixer,
    Tag::ReleaseArtistProducer,
    Tag::ReleaseArtistComposer,
    Tag::ReleaseArtistConductor,
    Tag::ReleaseArtistDjMixer,
    Tag::ReleaseType,
    Tag::ReleaseDate,
    Tag::OriginalDate,
    Tag::CompositionDate,
    Tag::Edition,
    Tag::CatalogNumber,
    Tag::Genre,
    Tag::SecondaryGenre,
    Tag::Descriptor,
    Tag::Label,
    Tag::New,
];

const SINGLE_VALUE_TAGS: &[Tag] = &[
    Tag::TrackTitle,
    Tag::TrackNumber,
    Tag::TrackTotal,
    Tag::DiscNumber,
    Tag::DiscTotal,
    Tag::ReleaseTitle,
    Tag::ReleaseType,
    Tag::ReleaseDate,
    Tag::OriginalDate,
    Tag::CompositionDate,
    Tag::Edition,
    Tag::CatalogNumber,
    Tag::New,
];

fn is_modifiable(t: Tag) -> bool {
    MODIFIABLE_TAGS.contains(&t)
}

pub(crate) fn is_single_valued(t: Tag) -> bool {
    SINGLE_VALUE_TAGS.contains(&t)
}

/// Raised when a rule string does not conform to the DSL grammar. Renders with a caret pointing
/// at the offending character, mirroring the compiler-style diagnostics used elsewhere in rose.
#[derive(Debug)]
pub struct RuleSyntaxError {
    pub rule_name: String,
    pub rule: String,
    pub index: usize,
    pub feedback: String,
}

impl fmt::Display for RuleSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Failed to parse {}, invalid syntax:", self.rule_name)?;
        writeln!(f)?;
        writeln!(f, "    {}", self.rule)?;
        writeln!(f, "    {}^", " ".repeat(self.index))?;
        write!(f, "    {}{}", " ".repeat(self.index), self.feedback)
    }
}

impl std::error::Error for RuleSyntaxError {}

#[derive(Debug, Error)]
pub enum RuleParseError {
    #[error("{0}")]
    Syntax(#[from] RuleSyntaxError),
    #[error("{0}")]
    Invalid(String),
}

impl From<RuleParseError> for crate::error::RoseError {
    fn from(e: RuleParseError) -> Self {
        match e {
            RuleParseError::Syntax(s) => crate::error::RoseError::Expected(crate::error::RoseExpectedError::RuleSyntax(s.to_string())),
            RuleParseError::Invalid(s) => crate::error::RoseError::Expected(crate::error::RoseExpectedError::InvalidRule(s)),
        }
    }
}

fn syntax_err(rule_name: &str, rule: &str, index: usize, feedback: impl Into<String>) -> RuleParseError {
    RuleParseError::Syntax(RuleSyntaxError {
        rule_name: rule_name.to_string(),
        rule: rule.to_string(),
        index,
        feedback: feedback.into(),
    })
}

/// Replaces the matched tag with `replacement`. For multi-valued tags, `;` is treated as a
/// delimiter between multiple replacement values.
#[derive(Debug, Clone)]
pub struct ReplaceAction {
    pub replacement: String,
}

/// Executes a regex substitution on a tag value.
#[derive(Debug, Clone)]
pub struct SedAction {
    pub src: Regex,
    pub dst: String,
}

/// Splits a tag into multiple tags on the provided delimiter. Only valid on multi-value tags.
#[derive(Debug, Clone)]
pub struct SplitAction {
    pub delimiter: String,
}

/// Adds a value to the tag. Only valid on multi-value tags; a no-op if the value already exists.
#[derive(Debug, Clone)]
pub struct AddAction {
    pub value: String,
}

/// Deletes the tag value.
#[derive(Debug, Clone, Default)]
pub struct DeleteAction;

#[derive(Debug, Clone)]
pub enum ActionBehavior {
    Replace(ReplaceAction),
    Sed(SedAction),
    Split(SplitAction),
    Add(AddAction),
    Delete(DeleteAction),
}

/// Substring match with support for `^$` strict start / strict end matching.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub needle: String,
    pub strict_start: bool,
    pub strict_end: bool,
    pub case_insensitive: bool,
}

impl Pattern {
    /// The starting `^` and trailing `$` are parsed to set strict_start/strict_end unless strict
    /// matching is requested explicitly. Either can be escaped with a backslash.
    pub fn new(needle: String) -> Self {
        Self::build(needle, false, false, false, false)
    }

    pub fn with_case_insensitive(needle: String, case_insensitive: bool) -> Self {
        Self::build(needle, false, false, false, case_insensitive)
    }

    pub fn build(needle: String, strict: bool, strict_start: bool, strict_end: bool, case_insensitive: bool) -> Self {
        let mut strict_start = strict_start || strict;
        let mut strict_end = strict_end || strict;
        let mut needle = needle;

        if !strict_start {
            if let Some(rest) = needle.strip_prefix('^') {
                strict_start = true;
                needle = rest.to_string();
            } else if needle.starts_with(r"\^") {
                needle = needle[1..].to_string();
            }
        }
        if !strict_end {
            if let Some(base) = needle.strip_suffix(r"\$") {
                needle = format!("{base}$");
            } else if let Some(rest) = needle.strip_suffix('$') {
                strict_end = true;
                needle = rest.to_string();
            }
        }

        Pattern { needle, strict_start, strict_end, case_insensitive }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut r = escape(&self.needle);

        if self.strict_start {
            r = format!("^{r}");
        } else if self.needle.starts_with('^') {
            r = format!("\\{r}");
        }

        if self.strict_end {
            r.push('$');
        } else if self.needle.ends_with('$') {
            r = format!("{}\\$", &r[..r.len() - 1]);
        }

        if self.case_insensitive {
            r.push_str(":i");
        }
        write!(f, "{r}")
    }
}

/// Tags to test against the pattern. If any tag matches, the rule's actions run against the track.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub tags: Vec<Tag>,
    pub pattern: Pattern,
}

impl Matcher {
    pub fn new(tags: &[ExpandableTag], pattern: Pattern) -> Self {
        let resolved = tags.iter().flat_map(|t| t.expand()).collect();
        Matcher { tags: uniq(resolved), pattern }
    }

    pub fn parse(raw: &str) -> Result<Matcher, RuleParseError> {
        Self::parse_named(raw, "matcher")
    }

    pub fn parse_named(raw: &str, rule_name: &str) -> Result<Matcher, RuleParseError> {
        let mut idx = 0usize;
        let mut tags: Vec<Tag> = Vec::new();

        loop {
            let rest = suffix(raw, idx);
            let mut matched = false;
            let mut found_colon = false;
            for (s, et) in TAG_TABLE {
                if !rest.starts_with(s) {
                    continue;
                }
                let slen = char_len(s);
                if slen == char_len(&rest) {
                    return Err(syntax_err(rule_name, raw, idx + slen, "Expected to find ',' or ':', found end of string."));
                }
                let next_char = rest.chars().nth(slen).unwrap();
                if next_char != ':' && next_char != ',' {
                    continue;
                }
                tags.extend(et.expand());
                idx += slen + 1;
                found_colon = next_char == ':';
                matched = true;
                break;
            }
            if !matched {
                let names: Vec<&str> = TAG_TABLE.iter().map(|(s, _)| *s).collect();
                return Err(syntax_err(
                    rule_name,
                    raw,
                    idx,
                    format!("Invalid tag: must be one of {{{}}}. The next character after a tag must be ':' or ','.", names.join(", ")),
                ));
            }
            if found_colon {
                break;
            }
        }

        let (pattern_str, fwd) = take(&suffix(raw, idx), ":", false)?;
        idx += fwd;

        let mut case_insensitive = false;
        if idx < char_len(raw) && take(&suffix(raw, idx), ":", true)? == (String::new(), 1) {
            idx += 1;
            let (flags, fwd2) = take(&suffix(raw, idx), ":", true)?;
            if flags.is_empty() {
                return Err(syntax_err(
                    rule_name,
                    raw,
                    idx,
                    "No flags specified: Please remove this section (by deleting the colon) or specify one of the supported flags: `i` (case insensitive).",
                ));
            }
            for (i, flag) in flags.chars().enumerate() {
                if flag == 'i' {
                    case_insensitive = true;
                    continue;
                }
                return Err(syntax_err(
                    rule_name,
                    raw,
                    idx + i,
                    "Unrecognized flag: Please specify one of the supported flags: `i` (case insensitive).",
                ));
            }
            idx += fwd2;
        }

        if idx < char_len(raw) {
            return Err(syntax_err(rule_name, raw, idx, "Extra input found after end of matcher. Perhaps you meant to escape this colon?"));
        }

        Ok(Matcher { tags: uniq(tags), pattern: Pattern::with_case_insensitive(pattern_str, case_insensitive) })
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", stringify_tags(&self.tags), self.pattern)
    }
}

/// The tags to apply an action on, its behavior, and an optional pattern restricting which values
/// within a multi-valued tag are acted upon (`None` means all values).
#[derive(Debug, Clone)]
pub struct Action {
    pub tags: Vec<Tag>,
    pub behavior: ActionBehavior,
    pub pattern: Option<Pattern>,
}

impl Action {
    pub fn new(tags: &[ExpandableTag], behavior: ActionBehavior, pattern: Option<Pattern>) -> Self {
        let resolved = tags.iter().flat_map(|t| t.expand()).collect();
        Action { tags: uniq(resolved), behavior, pattern }
    }

    pub fn parse(raw: &str, action_number: usize, matcher: Option<&Matcher>) -> Result<Action, RuleParseError> {
        let mut rule_name = "action".to_string();
        if action_number != 0 {
            rule_name.push_str(&format!(" {action_number}"));
        }
        let rule_name = rule_name.as_str();

        let mut idx = 0usize;

        // The tags/pattern section is optional but present whenever there's an unescaped `/`.
        let (_, action_idx) = take(raw, "/", true)?;
        let has_tags_pattern_section = action_idx != char_len(raw);

        let tags: Vec<Tag>;
        let mut pattern: Option<Pattern>;

        if !has_tags_pattern_section {
            let matcher = matcher.ok_or_else(|| {
                syntax_err(
                    rule_name,
                    raw,
                    idx,
                    "Tags/pattern section not found. Must specify tags to modify, since there is no matcher to default to. \
Make sure you are formatting your action like {tags}:{pattern}/{kind}:{args} (where `:{pattern}` is optional)",
                )
            })?;
            tags = matcher.tags.iter().copied().filter(|t| is_modifiable(*t)).collect();
            pattern = Some(matcher.pattern.clone());
        } else if suffix(raw, idx).starts_with("matched:") {
            let matcher = matcher.ok_or_else(|| syntax_err(rule_name, raw, idx, "Cannot use `matched` in this context: there is no matcher to default to."))?;
            idx += char_len("matched:");
            tags = matcher.tags.iter().copied().filter(|t| is_modifiable(*t)).collect();
            pattern = None;
            // The `matched` shorthand inherits the matcher's pattern directly.
            pattern = Some(matcher.pattern.clone());
            let _ = &pattern;
            return Self::finish_parse(raw, rule_name, idx, tags, Some(matcher.pattern.clone()));
        } else {
            let mut parsed_tags = Vec::new();
            let mut found_end = false;
            loop {
                let rest = suffix(raw, idx);
                let mut matched = false;
                for (s, et) in TAG_TABLE {
                    if !rest.starts_with(s) {
                        continue;
                    }
                    let slen = char_len(s);
                    if slen >= char_len(&rest) {
                        continue;
                    }
                    let next_char = rest.chars().nth(slen).unwrap();
                    if next_char != ':' && next_char != ',' && next_char != '/' {
                        continue;
                    }
                    for resolved in et.expand() {
                        if !is_modifiable(resolved) {
                            return Err(syntax_err(rule_name, raw, idx, format!("Invalid tag: {s} is not modifiable.")));
                        }
                        parsed_tags.push(resolved);
                    }
                    idx += slen + 1;
                    found_end = next_char == ':' || next_char == '/';
                    matched = true;
                    break;
                }
                if !matched {
                    let names: Vec<&str> = TAG_TABLE
                        .iter()
                        .filter(|(_, et)| et.expand().iter().all(|t| is_modifiable(*t)))
                        .map(|(s, _)| *s)
                        .collect();
                    let feedback = if matcher.is_some() {
                        format!(
                            "Invalid tag: must be one of matched, {{{}}}. (And if the value is matched, it must be alone.) The next character after a tag must be ':' or ','.",
                            names.join(", ")
                        )
                    } else {
                        format!("Invalid tag: must be one of {{{}}}. The next character after a tag must be ':' or ','.", names.join(", "))
                    };
                    return Err(syntax_err(rule_name, raw, idx, feedback));
                }
                if found_end {
                    break;
                }
            }
            tags = parsed_tags;

            // Parse the optional pattern. `tracktitle:/` is an explicit empty pattern;
            // `tracktitle/` inherits the matcher's pattern if the tags matched exactly.
            if idx > 0 && take(&suffix(raw, idx - 1), "/", true)? == (String::new(), 1) {
                pattern = if matcher.is_some_and(|m| m.tags == tags) { matcher.map(|m| m.pattern.clone()) } else { None };
            } else if take(&suffix(raw, idx), "/", true)? == (String::new(), 1) {
                idx += 1;
                pattern = None;
            } else {
                let (colon_pattern, colon_fwd) = take(&suffix(raw, idx), ":", true)?;
                let (slash_pattern, slash_fwd) = take(&suffix(raw, idx), "/", true)?;
                let (needle, fwd, has_flags) = if colon_fwd < slash_fwd { (colon_pattern, colon_fwd, true) } else { (slash_pattern, slash_fwd, false) };
                idx += fwd;

                if !needle.is_empty() {
                    let mut case_insensitive = false;
                    if has_flags {
                        let (flags, fwd2) = take(&suffix(raw, idx), "/", true)?;
                        if flags.is_empty() {
                            return Err(syntax_err(
                                rule_name,
                                raw,
                                idx,
                                "No flags specified: Please remove this section (by deleting the colon) or specify one of the supported flags: `i` (case insensitive).",
                            ));
                        }
                        for (i, flag) in flags.chars().enumerate() {
                            if flag == 'i' {
                                case_insensitive = true;
                                continue;
                            }
                            return Err(syntax_err(
                                rule_name,
                                raw,
                                idx + i,
                                "Unrecognized flag: Either you forgot a colon here (to end the matcher), or this is an invalid matcher flag. The only supported flag is `i` (case insensitive).",
                            ));
                        }
                        idx += fwd2;
                    }
                    pattern = Some(Pattern::with_case_insensitive(needle, case_insensitive));
                } else {
                    pattern = None;
                }
            }
        }

        Self::finish_parse(raw, rule_name, idx, tags, pattern)
    }

    fn finish_parse(raw: &str, rule_name: &str, mut idx: usize, tags: Vec<Tag>, pattern: Option<Pattern>) -> Result<Action, RuleParseError> {
        const VALID_ACTIONS: &[&str] = &["replace", "sed", "split", "add", "delete"];

        let mut action_kind: Option<&str> = None;
        for va in VALID_ACTIONS {
            let rest = suffix(raw, idx);
            if rest.starts_with(&format!("{va}:")) {
                action_kind = Some(va);
                idx += char_len(va) + 1;
                break;
            }
            if rest == *va {
                action_kind = Some(va);
                idx += char_len(va);
                break;
            }
        }
        let action_kind = match action_kind {
            Some(k) => k,
            None => {
                let mut feedback = format!("Invalid action kind: must be one of {{{}}}.", VALID_ACTIONS.join(", "));
                if idx == 0 && raw.contains(':') {
                    feedback.push_str(" If this is pointing at your pattern, you forgot to put a `/` between the matcher section and the action section.");
                }
                return Err(syntax_err(rule_name, raw, idx, feedback));
            }
        };

        if action_kind == "split" || action_kind == "add" {
            let single_valued: Vec<&str> = tags.iter().filter(|t| is_single_valued(**t)).map(|t| t.as_str()).collect();
            if !single_valued.is_empty() {
                return Err(RuleParseError::Invalid(format!(
                    "Single valued tags {} cannot be modified by multi-value action {}",
                    single_valued.join(", "),
                    action_kind
                )));
            }
        }

        let behavior = match action_kind {
            "replace" => {
                let (replacement, fwd) = take(&suffix(raw, idx), ":", false)?;
                idx += fwd;
                if replacement.is_empty() {
                    return Err(syntax_err(rule_name, raw, idx, "Replacement not found: must specify a non-empty replacement. Use the delete action to remove a value."));
                }
                if idx < char_len(raw) {
                    return Err(syntax_err(
                        rule_name,
                        raw,
                        idx,
                        "Found another section after the replacement, but the replacement must be the last section. Perhaps you meant to escape this colon?",
                    ));
                }
                ActionBehavior::Replace(ReplaceAction { replacement })
            }
            "sed" => {
                let (src_str, fwd) = take(&suffix(raw, idx), ":", false)?;
                if src_str.is_empty() {
                    return Err(syntax_err(rule_name, raw, idx, format!("Empty sed pattern found: must specify a non-empty pattern. Example: {raw}:pattern:replacement")));
                }
                let src = Regex::new(&src_str).map_err(|e| syntax_err(rule_name, raw, idx, format!("Failed to compile the sed pattern regex: invalid pattern: {e}")))?;
                idx += fwd;

                if idx >= char_len(raw) || suffix(raw, idx).chars().next() != Some(':') {
                    return Err(syntax_err(rule_name, raw, idx, format!("Sed replacement not found: must specify a sed replacement section. Example: {raw}:replacement.")));
                }
                idx += 1;

                let (dst, fwd2) = take(&suffix(raw, idx), ":", false)?;
                idx += fwd2;
                if idx < char_len(raw) {
                    return Err(syntax_err(
                        rule_name,
                        raw,
                        idx,
                        "Found another section after the sed replacement, but the sed replacement must be the last section. Perhaps you meant to escape this colon?",
                    ));
                }
                ActionBehavior::Sed(SedAction { src, dst })
            }
            "split" => {
                let (delimiter, fwd) = take(&suffix(raw, idx), ":", false)?;
                idx += fwd;
                if delimiter.is_empty() {
                    return Err(syntax_err(rule_name, raw, idx, "Delimiter not found: must specify a non-empty delimiter to split on."));
                }
                if idx < char_len(raw) {
                    return Err(syntax_err(
                        rule_name,
                        raw,
                        idx,
                        "Found another section after the delimiter, but the delimiter must be the last section. Perhaps you meant to escape this colon?",
                    ));
                }
                ActionBehavior::Split(SplitAction { delimiter })
            }
            "add" => {
                let (value, fwd) = take(&suffix(raw, idx), ":", false)?;
                idx += fwd;
                if value.is_empty() {
                    return Err(syntax_err(rule_name, raw, idx, "Value not found: must specify a non-empty value to add."));
                }
                if idx < char_len(raw) {
                    return Err(syntax_err(rule_name, raw, idx, "Found another section after the value, but the value must be the last section. Perhaps you meant to escape this colon?"));
                }
                ActionBehavior::Add(AddAction { value })
            }
            "delete" => {
                if idx < char_len(raw) {
                    return Err(syntax_err(
                        rule_name,
                        raw,
                        idx,
                        "Found another section after the action kind, but the delete action has no parameters. Please remove this section.",
                    ));
                }
                ActionBehavior::Delete(DeleteAction)
            }
            _ => unreachable!("unknown action kind {action_kind}"),
        };

        Ok(Action { tags: uniq(tags), behavior, pattern })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut r = stringify_tags(&self.tags);
        if let Some(p) = &self.pattern {
            r.push(':');
            r.push_str(&p.to_string());
        }
        if !r.is_empty() {
            r.push('/');
        }

        r.push_str(match &self.behavior {
            ActionBehavior::Replace(_) => "replace",
            ActionBehavior::Sed(_) => "sed",
            ActionBehavior::Split(_) => "split",
            ActionBehavior::Add(_) => "add",
            ActionBehavior::Delete(_) => "delete",
        });

        match &self.behavior {
            ActionBehavior::Replace(a) => {
                r.push(':');
                r.push_str(&a.replacement);
            }
            ActionBehavior::Sed(a) => {
                r.push(':');
                r.push_str(&escape(a.src.as_str()));
                r.push(':');
                r.push_str(&escape(&a.dst));
            }
            ActionBehavior::Split(a) => {
                r.push(':');
                r.push_str(&a.delimiter);
            }
            ActionBehavior::Add(_) | ActionBehavior::Delete(_) => {}
        }

        write!(f, "{r}")
    }
}

/// A matcher plus the actions to run against whatever it matches.
#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Matcher,
    pub actions: Vec<Action>,
    pub ignore: Vec<Matcher>,
}

impl Rule {
    pub fn parse(matcher: &str, actions: Vec<&str>) -> Result<Rule, RuleParseError> {
        Self::parse_with_ignore(matcher, actions, Vec::new())
    }

    pub fn parse_with_ignore(matcher: &str, actions: Vec<&str>, ignore: Vec<&str>) -> Result<Rule, RuleParseError> {
        let parsed_matcher = Matcher::parse(matcher)?;
        let parsed_actions = actions
            .into_iter()
            .enumerate()
            .map(|(i, a)| Action::parse(a, i + 1, Some(&parsed_matcher)))
            .collect::<Result<Vec<_>, _>>()?;
        let parsed_ignore = ignore.into_iter().map(|v| Matcher::parse_named(v, "ignore")).collect::<Result<Vec<_>, _>>()?;
        Ok(Rule { matcher: parsed_matcher, actions: parsed_actions, ignore: parsed_ignore })
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("matcher={}", shell_quote(&self.matcher.to_string()))];
        for action in &self.actions {
            parts.push(format!("action={}", shell_quote(&action.to_string())));
        }
        write!(f, "{}", parts.join(" "))
    }
}

fn shell_quote(s: &str) -> String {
    shell_escape::escape(std::borrow::Cow::Borrowed(s)).into_owned()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn suffix(raw: &str, idx: usize) -> String {
    raw.chars().skip(idx).collect()
}

/// Reads until the next unescaped `until` or end of string. Returns the read string (unescaped:
/// `::` becomes `:` and `//` becomes `/`) and the number of characters consumed from the input.
/// `until` itself counts towards the consumed length only if `consume_until` is set, though it is
/// never included in the returned string.
pub fn take(x: &str, until: &str, consume_until: bool) -> Result<(String, usize), RuleParseError> {
    let until_char = until.chars().next().expect("`until` must be non-empty");
    let chars: Vec<char> = x.chars().collect();
    let mut result = String::new();
    let mut fwd = 0usize;
    loop {
        let (m, f) = take_escaped(&chars[fwd..], until_char, consume_until);
        result.push_str(&m.replace("::", ":").replace("//", "/"));
        fwd += f;

        let next_idx = fwd + usize::from(!consume_until);
        let escaped_special_char = chars.get(next_idx) == Some(&until_char);
        if !escaped_special_char {
            break;
        }
        result.push(until_char);
        fwd = next_idx + 1;
    }
    Ok((result, fwd))
}

fn take_escaped(x: &[char], until: char, consume_until: bool) -> (String, usize) {
    let mut r = String::new();
    let mut escaped: Option<char> = None;
    let mut seen = 0usize;
    for &c in x {
        if c == until {
            if consume_until {
                seen += 1;
            }
            break;
        }
        if (c == ':' || c == '/') && escaped.is_none() {
            escaped = Some(c);
            seen += 1;
            continue;
        }
        if let Some(e) = escaped {
            if c != e {
                r.push(e);
                escaped = None;
            }
        }
        r.push(c);
        seen += 1;
    }
    (r, seen)
}

/// Escapes the special characters in a string (the reverse of `take`'s unescaping).
pub fn escape(x: &str) -> String {
    x.replace(':', "::").replace('/', "//")
}

/// Basically `tags.join(",")`, except aliases (`artist`, `trackartist`, `releaseartist`) are
/// collapsed back down to their shorthand form when every member of the group is present.
pub fn stringify_tags(tags_input: &[Tag]) -> String {
    let mut tags: Vec<String> = tags_input.iter().map(|t| t.as_str().to_string()).collect();
    let artist_group: Vec<&str> = TRACK_ARTIST_TAGS.iter().chain(RELEASE_ARTIST_TAGS).map(|t| t.as_str()).collect();
    let trackartist_group: Vec<&str> = TRACK_ARTIST_TAGS.iter().map(|t| t.as_str()).collect();
    let releaseartist_group: Vec<&str> = RELEASE_ARTIST_TAGS.iter().map(|t| t.as_str()).collect();

    collapse_alias(&mut tags, &artist_group, "artist");
    collapse_alias(&mut tags, &trackartist_group, "trackartist");
    collapse_alias(&mut tags, &releaseartist_group, "releaseartist");

    tags.join(",")
}

fn collapse_alias(tags: &mut Vec<String>, group: &[&str], alias: &str) {
    if !group.iter().all(|g| tags.iter().any(|t| t == g)) {
        return;
    }
    let idx = tags.iter().position(|t| t == group[0]).expect("group member checked present above");
    for g in group {
        if let Some(pos) = tags.iter().position(|t| t == g) {
            tags.remove(pos);
        }
    }
    let insert_at = idx.min(tags.len());
    tags.insert(insert_at, alias.to_string());
}
