use once_cell::sync::Lazy;
use std::collections::HashMap;

// Load genre hierarchy from JSON at compile time
#[allow(dead_code)]
const GENRE_HIERARCHY_JSON: &str = include_str!("genre_hierarchy.json");

#[allow(dead_code)]
pub static TRANSITIVE_PARENT_GENRES: Lazy<HashMap<String, Vec<String>>> = Lazy::new(|| {
    let hierarchy: HashMap<String, Vec<String>> = serde_json::from_str(GENRE_HIERARCHY_JSON).expect("Failed to parse genre_hierarchy.json");

    let mut transitive_parents: HashMap<String, Vec<String>> = HashMap::new();

    // Build transitive parent relationships
    for (genre, parents) in &hierarchy {
        let mut all_parents = Vec::new();
        let mut to_process = parents.clone();
        let mut seen = std::collections::HashSet::new();

        while let Some(parent) = to_process.pop() {
            if seen.insert(parent.clone()) {
                all_parents.push(parent.clone());
                if let Some(grandparents) = hierarchy.get(&parent) {
                    to_process.extend(grandparents.clone());
                }
            }
        }

        transitive_parents.insert(genre.clone(), all_parents);
    }

    transitive_parents
});

#[allow(dead_code)]
pub static TRANSITIVE_CHILD_GENRES: Lazy<HashMap<String, Vec<String>>> = Lazy::new(|| {
    let mut transitive_children: HashMap<String, Vec<String>> = HashMap::new();

    // Build from transitive parents
    for (child, parents) in TRANSITIVE_PARENT_GENRES.iter() {
        for parent in parents {
            transitive_children.entry(parent.clone()).or_default().push(child.clone());
        }
    }

    transitive_children
});

#[allow(dead_code)]
pub static IMMEDIATE_CHILD_GENRES: Lazy<HashMap<String, Vec<String>>> = Lazy::new(|| {
    let hierarchy: HashMap<String, Vec<String>> = serde_json::from_str(GENRE_HIERARCHY_JSON).expect("Failed to parse genre_hierarchy.json");

    let mut immediate_children: HashMap<String, Vec<String>> = HashMap::new();

    // Build immediate child relationships
    for (child, parents) in &hierarchy {
        for parent in parents {
            immediate_children.entry(parent.clone()).or_default().push(child.clone());
        }
    }

    immediate_children
});

// Case-insensitive lookup from lowercased genre name to its canonical (as-written-in-JSON) form.
// A genre counts as known whether it appears as a hierarchy key or only as someone else's parent.
static CANONICAL_NAMES: Lazy<HashMap<String, String>> = Lazy::new(|| {
    let hierarchy: HashMap<String, Vec<String>> = serde_json::from_str(GENRE_HIERARCHY_JSON).expect("Failed to parse genre_hierarchy.json");

    let mut canonical = HashMap::new();
    for (genre, parents) in &hierarchy {
        canonical.entry(genre.to_lowercase()).or_insert_with(|| genre.clone());
        for parent in parents {
            canonical.entry(parent.to_lowercase()).or_insert_with(|| parent.clone());
        }
    }
    canonical
});

fn canonical_name(genre: &str) -> Option<&'static str> {
    CANONICAL_NAMES.get(&genre.to_lowercase()).map(|s| s.as_str())
}

/// Returns whether `genre` is a known genre name, case-insensitively.
pub fn is_valid_genre(genre: &str) -> bool {
    !genre.is_empty() && canonical_name(genre).is_some()
}

/// Returns the transitive parent genres of `genre`, or `None` if `genre` is unknown.
/// Lookup is case-insensitive; an empty `Vec` means the genre is known but has no parents.
pub fn get_parent_genres(genre: &str) -> Option<Vec<String>> {
    let canon = canonical_name(genre)?;
    Some(TRANSITIVE_PARENT_GENRES.get(canon).cloned().unwrap_or_default())
}

/// Alias for [`get_parent_genres`], named to match cache.rs's call site.
pub fn get_transitive_parent_genres(genre: &str) -> Option<Vec<String>> {
    get_parent_genres(genre)
}

/// Transitive parent closure over several genres at once, deduplicated, sorted,
/// and excluding any genre already present in `genres`.
pub fn get_all_parent_genres(genres: &[String]) -> Vec<String> {
    let input_lower: std::collections::HashSet<String> = genres.iter().map(|g| g.to_lowercase()).collect();
    let mut all = std::collections::HashSet::new();
    for genre in genres {
        if let Some(parents) = get_parent_genres(genre) {
            for parent in parents {
                if !input_lower.contains(&parent.to_lowercase()) {
                    all.insert(parent);
                }
            }
        }
    }
    let mut result: Vec<String> = all.into_iter().collect();
    result.sort();
    result
}

/// Wrapper for genre hierarchy operations
pub struct GenreHierarchy;

impl GenreHierarchy {
    /// Get the transitive parent genres for a given genre
    pub fn transitive_parents(genre: &str) -> Option<&Vec<String>> {
        TRANSITIVE_PARENT_GENRES.get(genre)
    }

    /// Get the parent genres for a given genre (alias for transitive_parents)
    pub fn parents(genre: &str) -> Option<&Vec<String>> {
        Self::transitive_parents(genre)
    }

    /// Get the transitive child genres for a given genre
    pub fn transitive_children(genre: &str) -> Option<&Vec<String>> {
        TRANSITIVE_CHILD_GENRES.get(genre)
    }

    /// Get the immediate child genres for a given genre
    pub fn immediate_children(genre: &str) -> Option<&Vec<String>> {
        IMMEDIATE_CHILD_GENRES.get(genre)
    }
}

// Create a static instance for convenience
pub static GENRE_HIERARCHY: GenreHierarchy = GenreHierarchy;
