//! Similarity ranking against a real vault directory

use super::helpers::*;
use crate::related::RelatedNote;
use test_log::test;

fn ranked(related: &[RelatedNote]) -> Vec<(&str, f64)> {
    related.iter().map(|r| (r.path.as_str(), r.score)).collect()
}

#[test]
fn test_direct_link_outranks_shared_tags() {
    let tv = TestVault::new();
    tv.write("A.md", "---\ntags: [x, y]\n---\nSee [[E]].")
        .write("D.md", "---\ntags:\n  - x\n  - y\n---\nNo links.")
        .write("E.md", "Nothing here.");

    let related = tv.vault.related("A.md", 5).unwrap();
    assert_eq!(ranked(&related), vec![("E.md", 3.0), ("D.md", 2.0)]);
}

#[test]
fn test_ties_keep_enumeration_order() {
    let tv = TestVault::new();
    tv.write("A.md", "#topic")
        .write("C.md", "#topic")
        .write("B.md", "#topic")
        .write("Z.md", "#unrelated");

    let related = tv.vault.related("A.md", 10).unwrap();
    assert_eq!(ranked(&related), vec![("B.md", 1.0), ("C.md", 1.0)]);
}

#[test]
fn test_target_and_zero_scores_are_excluded() {
    let tv = TestVault::new();
    tv.write("A.md", "[[B]] #shared")
        .write("B.md", "")
        .write("Loner.md", "#other");

    let related = tv.vault.related("A.md", 10).unwrap();
    assert!(related.iter().all(|r| r.path != "A.md"));
    assert!(related.iter().all(|r| r.score > 0.0));
    assert_eq!(ranked(&related), vec![("B.md", 3.0)]);
}

#[test]
fn test_mutual_links_and_shared_targets() {
    let tv = TestVault::new();
    tv.write("A.md", "[[B]] [[Hub]] [[Ghost]]")
        .write("B.md", "[[A]] [[Hub]]")
        .write("C.md", "[[Hub]] [[Ghost.md]]")
        .write("Hub.md", "");

    let related = tv.vault.related("A.md", 10).unwrap();
    // B: shared Hub (2) + A->B (3) + B->A (3)
    // C: shared Hub and unresolved Ghost (4)
    // Hub: A->Hub (3)
    assert_eq!(
        ranked(&related),
        vec![("B.md", 8.0), ("C.md", 4.0), ("Hub.md", 3.0)]
    );
}

#[test]
fn test_limit_and_scan_cap() {
    let tv = TestVault::with_config(|config| config.related_scan_limit = 2);
    tv.write("A.md", "#t").write("B.md", "#t").write("C.md", "#t");

    // only A and B are scanned, and A is the target
    let related = tv.vault.related("A.md", 10).unwrap();
    assert_eq!(ranked(&related), vec![("B.md", 1.0)]);

    let related = tv.vault.related("C.md", 1).unwrap();
    assert_eq!(ranked(&related), vec![("A.md", 1.0)]);
}
