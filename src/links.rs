//! Wikilink extraction and resolution.
//!
//! A reference token is the target part of a `[[target#heading|alias]]` link. Resolution maps a
//! token onto a note identity by trying, in order: the token as a vault-relative path, the token
//! relative to the linking note's folder, and finally a scan of the corpus for a note whose name
//! or path matches. A token that matches nothing is simply unresolved, which is normal for links
//! to notes that have not been written yet.
use once_cell::{sync::Lazy, unsync::OnceCell};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    paths,
    store::{NoteMeta, NoteStore},
};

static WIKILINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\[([^\]|#]+)(?:#[^\]|]+)?(?:\|[^\]]+)?\]\]")
        .expect("wikilink pattern is a valid regex")
});

/// A link as written in a note: the whole `[[...]]` span and the target it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkToken<'a> {
    pub raw: &'a str,
    pub target: &'a str,
}

/// Reference tokens in `text`, in the order they appear. Heading anchors and display aliases are
/// dropped; duplicates are kept.
pub fn extract(text: &str) -> impl Iterator<Item = LinkToken<'_>> {
    WIKILINK_PATTERN.captures_iter(text).filter_map(|capture| {
        let raw = capture.get(0)?.as_str();
        let target = capture.get(1)?.as_str().trim();
        if target.is_empty() {
            None
        } else {
            Some(LinkToken { raw, target })
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Resolved(String),
    Unresolved,
}

impl Resolution {
    pub fn path(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(path) => Some(path),
            Resolution::Unresolved => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLink {
    pub token: String,
    pub resolution: Resolution,
}

/// Identity used when comparing links between notes: the resolved path, or for unresolved links
/// the token text without a note extension.
pub fn link_key(link: &ResolvedLink, extensions: &[String]) -> String {
    match &link.resolution {
        Resolution::Resolved(path) => path.clone(),
        Resolution::Unresolved => paths::strip_extension(&link.token, extensions).to_string(),
    }
}

/// Resolves tokens against a store. The corpus listing for the final fallback step is loaded at
/// most once per resolver, so a resolver should live for a single query and no longer.
pub struct LinkResolver<'s, S: NoteStore + ?Sized> {
    store: &'s S,
    corpus: OnceCell<Vec<NoteMeta>>,
}

impl<'s, S: NoteStore + ?Sized> LinkResolver<'s, S> {
    pub fn new(store: &'s S) -> Self {
        LinkResolver {
            store,
            corpus: OnceCell::new(),
        }
    }

    /// Reuse a corpus listing the caller already holds.
    pub fn with_corpus(store: &'s S, corpus: Vec<NoteMeta>) -> Self {
        LinkResolver {
            store,
            corpus: OnceCell::with_value(corpus),
        }
    }

    pub fn corpus(&self) -> &[NoteMeta] {
        self.corpus.get_or_init(|| {
            self.store.enumerate().unwrap_or_else(|e| {
                tracing::debug!("Corpus enumeration failed during link resolution: {e}");
                Vec::new()
            })
        })
    }

    pub fn resolve(&self, token: &str, source: &str) -> Resolution {
        let config = self.store.config();
        let token = token.trim();
        let with_ext = if paths::has_extension(token, &config.file_extensions) {
            token.to_string()
        } else {
            format!("{token}.{}", config.default_extension)
        };

        // 1. vault-relative
        if let Ok(candidate) = paths::normalize(&with_ext) {
            if self.store.exists(&candidate) {
                return Resolution::Resolved(candidate);
            }
        }

        // 2. relative to the linking note
        let source_dir = paths::parent(source);
        if !source_dir.is_empty() {
            if let Ok(candidate) = paths::normalize(&paths::join(source_dir, &with_ext)) {
                if self.store.exists(&candidate) {
                    return Resolution::Resolved(candidate);
                }
            }
        }

        // 3. first name or path match in enumeration order
        let name = paths::strip_extension(token, &config.file_extensions);
        let token_ext = (name.len() < token.len()).then(|| &token[name.len() + 1..]);
        let name_matches = |meta: &NoteMeta| {
            meta.name == name
                && token_ext.map_or(true, |ext| meta.extension.eq_ignore_ascii_case(ext))
        };
        if let Some(meta) = self
            .corpus()
            .iter()
            .find(|meta| name_matches(meta) || meta.path == with_ext)
        {
            return Resolution::Resolved(meta.path.clone());
        }

        tracing::debug!("Unresolved link [[{}]] in {}", token, source);
        Resolution::Unresolved
    }

    /// Every token in `text`, resolved relative to `source`.
    pub fn resolve_all(&self, text: &str, source: &str) -> Vec<ResolvedLink> {
        extract(text)
            .map(|token| ResolvedLink {
                token: token.target.to_string(),
                resolution: self.resolve(token.target, source),
            })
            .collect()
    }

    /// Resolved targets of every token in `text`, in order, with unresolved tokens dropped.
    pub fn outgoing(&self, text: &str, source: &str) -> Vec<String> {
        extract(text)
            .filter_map(|token| match self.resolve(token.target, source) {
                Resolution::Resolved(path) => Some(path),
                Resolution::Unresolved => None,
            })
            .collect()
    }
}
