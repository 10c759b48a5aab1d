//! Global ranking and per-source diversification

use super::request::{stringify, truthy};
use super::Candidate;
use crate::store::Metadata;
use ahash::AHashMap;

/// Sort key standing in for a missing distance
pub const MISSING_DISTANCE: f64 = 1e9;

/// Metadata keys identifying the source document, in priority order
const SOURCE_KEYS: [&str; 5] = ["source_file", "source", "file", "path", "folder_path"];

/// Source document of a passage
///
/// The first key in [`SOURCE_KEYS`] holding a non-empty value wins; all
/// passages without one share the `"unknown"` bucket.
pub fn source_key(metadata: &Metadata) -> String {
    SOURCE_KEYS
        .iter()
        .filter_map(|key| metadata.get(*key))
        .find(|v| truthy(v))
        .map(stringify)
        .unwrap_or_else(|| "unknown".to_string())
}

/// Stable ascending sort by distance, missing distances last
pub fn sort_by_distance(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        let da = a.distance.unwrap_or(MISSING_DISTANCE);
        let db = b.distance.unwrap_or(MISSING_DISTANCE);
        da.total_cmp(&db)
    });
}

/// Walk a ranked list once, keeping at most `max_per_source` passages per
/// source and at most `final_n` overall
pub fn diversify(ranked: Vec<Candidate>, final_n: usize, max_per_source: usize) -> Vec<Candidate> {
    let mut chosen = Vec::with_capacity(final_n.min(ranked.len()));
    let mut per_source: AHashMap<String, usize> = AHashMap::new();

    for candidate in ranked {
        if chosen.len() >= final_n {
            break;
        }

        let count = per_source.entry(source_key(&candidate.metadata)).or_insert(0);
        if *count >= max_per_source {
            continue;
        }
        *count += 1;
        chosen.push(candidate);
    }

    chosen
}
