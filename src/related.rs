use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeSet};

use crate::{
    error::VaultError,
    links::{link_key, LinkResolver, ResolvedLink},
    paths,
    store::NoteStore,
};

pub const SHARED_LINK_WEIGHT: f64 = 2.0;
pub const SHARED_TAG_WEIGHT: f64 = 1.0;
pub const DIRECT_LINK_BONUS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedNote {
    pub path: String,
    pub score: f64,
}

/// Link and tag profile of one note, as seen by the ranker.
struct Profile {
    link_keys: BTreeSet<String>,
    outgoing: BTreeSet<String>,
    tags: BTreeSet<String>,
}

impl Profile {
    fn new(links: &[ResolvedLink], tags: Vec<String>, extensions: &[String]) -> Self {
        Profile {
            link_keys: links.iter().map(|link| link_key(link, extensions)).collect(),
            outgoing: links
                .iter()
                .filter_map(|link| link.resolution.path().map(str::to_string))
                .collect(),
            tags: tags.into_iter().collect(),
        }
    }
}

/// Ranks corpus notes by how related they are to a target note:
///
/// ```text
/// 2.0 per shared link + 1.0 per shared tag
///   + 3.0 if the target links to the candidate + 3.0 if the candidate links to the target
/// ```
///
/// Only the first `related_scan_limit` notes of the corpus are considered. Candidates scoring
/// zero are left out and ties keep corpus enumeration order.
pub struct SimilarityRanker<'s, S: NoteStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: NoteStore + ?Sized> SimilarityRanker<'s, S> {
    pub fn new(store: &'s S) -> Self {
        SimilarityRanker { store }
    }

    pub fn related(&self, target: &str, limit: usize) -> Result<Vec<RelatedNote>, VaultError> {
        let target = paths::normalize(target)?;
        let extensions = &self.store.config().file_extensions;
        let target_note = self.store.read(&target)?;

        let corpus = self.store.enumerate()?;
        let candidates = corpus
            .iter()
            .take(self.store.config().related_scan_limit)
            .filter(|meta| meta.path != target)
            .map(|meta| meta.path.clone())
            .collect::<Vec<String>>();
        let resolver = LinkResolver::with_corpus(self.store, corpus);

        let target_profile = Profile::new(
            &resolver.resolve_all(target_note.body(), &target),
            target_note.tags(),
            extensions,
        );

        let mut related = Vec::new();
        for candidate in candidates {
            let note = match self.store.read(&candidate) {
                Ok(note) => note,
                Err(e) => {
                    tracing::debug!("Error calculating similarity for {}: {e}", candidate);
                    continue;
                }
            };
            let profile = Profile::new(
                &resolver.resolve_all(note.body(), &candidate),
                note.tags(),
                extensions,
            );
            let score = score(&target, &target_profile, &candidate, &profile);
            if score > 0.0 {
                related.push(RelatedNote {
                    path: candidate,
                    score,
                });
            }
        }

        // stable: equal scores stay in enumeration order
        related.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        related.truncate(limit);
        Ok(related)
    }
}

fn score(target: &str, target_profile: &Profile, candidate: &str, profile: &Profile) -> f64 {
    let shared_links = target_profile
        .link_keys
        .intersection(&profile.link_keys)
        .count();
    let shared_tags = target_profile.tags.intersection(&profile.tags).count();
    let mut score =
        SHARED_LINK_WEIGHT * shared_links as f64 + SHARED_TAG_WEIGHT * shared_tags as f64;
    if target_profile.outgoing.contains(candidate) {
        score += DIRECT_LINK_BONUS;
    }
    if profile.outgoing.contains(target) {
        score += DIRECT_LINK_BONUS;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(keys: &[&str], outgoing: &[&str], tags: &[&str]) -> Profile {
        Profile {
            link_keys: keys.iter().map(|s| s.to_string()).collect(),
            outgoing: outgoing.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn score_weights() {
        let target = profile(&["B.md", "Ghost", "E.md"], &["B.md", "E.md"], &["x", "y"]);
        let shares_links = profile(&["B.md", "Ghost"], &["B.md"], &[]);
        assert_eq!(score("A.md", &target, "C.md", &shares_links), 4.0);

        let shares_tags = profile(&[], &[], &["x", "y", "z"]);
        assert_eq!(score("A.md", &target, "D.md", &shares_tags), 2.0);

        let linked = profile(&[], &[], &[]);
        assert_eq!(score("A.md", &target, "E.md", &linked), 3.0);

        let mutual = profile(&["A.md"], &["A.md"], &[]);
        assert_eq!(score("A.md", &target, "E.md", &mutual), 6.0);

        let unrelated = profile(&["Q.md"], &["Q.md"], &["q"]);
        assert_eq!(score("A.md", &target, "Z.md", &unrelated), 0.0);
    }
}
