//! Merge per-query hit lists into one candidate list

use super::{Candidate, DuplicatePolicy};
use crate::filtering::{fingerprint, normalize, JunkFilter};
use crate::store::Hit;
use ahash::AHashMap;

/// Merge hits in query order, then in each query's rank order
///
/// Each passage is normalized; junk is dropped before it can claim a
/// fingerprint. Duplicates resolve according to `policy`. Every kept
/// candidate records which query found it.
pub fn merge_hits(
    queries: &[String],
    hits: Vec<Vec<Hit>>,
    junk: &JunkFilter,
    policy: DuplicatePolicy,
) -> Vec<Candidate> {
    let mut merged: Vec<Candidate> = Vec::new();
    let mut seen: AHashMap<String, usize> = AHashMap::new();

    for (qi, (query, query_hits)) in queries.iter().zip(hits).enumerate() {
        for hit in query_hits {
            let content = normalize(hit.document.as_deref().unwrap_or_default());
            if junk.is_junk(&content) {
                continue;
            }

            let candidate = Candidate {
                content,
                metadata: hit.metadata,
                distance: hit.distance,
                hit_query: Some(query.clone()),
                hit_query_i: Some(qi),
            };

            let fp = fingerprint(&candidate.content);
            match seen.get(&fp) {
                Some(&slot) => {
                    if policy == DuplicatePolicy::Closest
                        && closer(candidate.distance, merged[slot].distance)
                    {
                        merged[slot] = candidate;
                    }
                }
                None => {
                    seen.insert(fp, merged.len());
                    merged.push(candidate);
                }
            }
        }
    }

    merged
}

fn closer(new: Option<f64>, old: Option<f64>) -> bool {
    match (new, old) {
        (Some(n), Some(o)) => n < o,
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Metadata;

    fn passage(tag: &str) -> String {
        format!("{} facioscapulohumeral muscular dystrophy passage", tag)
    }

    fn hit(text: &str, distance: Option<f64>) -> Hit {
        Hit {
            document: Some(text.to_string()),
            metadata: Metadata::new(),
            distance,
        }
    }

    fn junk() -> JunkFilter {
        JunkFilter::new(30, &["目录".to_string()]).unwrap()
    }

    fn queries() -> Vec<String> {
        vec!["q0".to_string(), "q1".to_string()]
    }

    #[test]
    fn test_first_seen_wins() {
        let hits = vec![
            vec![hit(&passage("a"), Some(0.5))],
            vec![hit(&format!("  {}  ", passage("a")), Some(0.1))],
        ];
        let merged = merge_hits(&queries(), hits, &junk(), DuplicatePolicy::FirstSeen);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].distance, Some(0.5));
        assert_eq!(merged[0].hit_query.as_deref(), Some("q0"));
        assert_eq!(merged[0].hit_query_i, Some(0));
    }

    #[test]
    fn test_closest_policy_keeps_smaller_distance() {
        let hits = vec![
            vec![hit(&passage("a"), Some(0.5))],
            vec![hit(&passage("a"), Some(0.1))],
        ];
        let merged = merge_hits(&queries(), hits, &junk(), DuplicatePolicy::Closest);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].distance, Some(0.1));
        assert_eq!(merged[0].hit_query_i, Some(1));
    }

    #[test]
    fn test_junk_and_missing_documents_dropped() {
        let hits = vec![vec![
            hit("too short", Some(0.1)),
            hit(&format!("目录 {}", passage("x")), Some(0.2)),
            Hit::default(),
            hit(&passage("kept"), None),
        ]];
        let merged = merge_hits(&queries(), hits, &junk(), DuplicatePolicy::FirstSeen);

        assert_eq!(merged.len(), 1);
        assert!(merged[0].content.starts_with("kept"));
        assert_eq!(merged[0].distance, None);
    }

    #[test]
    fn test_content_is_normalized() {
        let hits = vec![vec![hit("FSHD   is\n\na   genetic\tmuscle disorder of adults", None)]];
        let merged = merge_hits(&queries(), hits, &junk(), DuplicatePolicy::FirstSeen);
        assert_eq!(merged[0].content, "FSHD is a genetic muscle disorder of adults");
    }
}
