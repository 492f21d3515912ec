//! Forward/backward link adjacency, orphans and the whole-vault link graph.
//!
//! Nothing here is cached. Every query enumerates the corpus and re-reads the notes it needs, so
//! results always reflect what is on disk at call time, and a backlink query costs a read and a
//! parse of every scanned note.
use petgraph::{graph::NodeIndex, Direction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::VaultError,
    frontmatter,
    links::{extract, LinkResolver},
    paths,
    store::NoteStore,
};

/// Result of a backlink query together with how much of the corpus it looked at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklinkScan {
    pub backlinks: Vec<String>,
    pub scanned: usize,
    pub corpus_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub total_nodes: usize,
    pub total_edges: usize,
}

/// Directed note-to-note graph, one edge per distinct (source, target) pair.
#[derive(Debug, Clone, Default)]
pub struct LinkAdjacency {
    graph: petgraph::Graph<String, ()>,
    index: BTreeMap<String, NodeIndex>,
    corpus: Vec<String>,
}

impl LinkAdjacency {
    pub fn as_graph(&self) -> &petgraph::Graph<String, ()> {
        &self.graph
    }

    pub fn add_note(&mut self, path: &str) -> NodeIndex {
        if let Some(idx) = self.index.get(path) {
            return *idx;
        }
        let idx = self.graph.add_node(path.to_string());
        self.index.insert(path.to_string(), idx);
        idx
    }

    pub fn add_link(&mut self, source: &str, target: &str) {
        let source = self.add_note(source);
        let target = self.add_note(target);
        self.graph.update_edge(source, target, ());
    }

    /// Corpus notes the adjacency was built from, in enumeration order. Link targets outside
    /// the corpus are graph nodes but are not listed here.
    pub fn corpus(&self) -> &[String] {
        &self.corpus
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    fn neighbors(&self, path: &str, direction: Direction) -> Vec<String> {
        let Some(idx) = self.index.get(path) else {
            return Vec::new();
        };
        let mut found = self
            .graph
            .neighbors_directed(*idx, direction)
            .collect::<Vec<NodeIndex>>();
        found.sort();
        found.dedup();
        found
            .into_iter()
            .map(|n| self.graph[n].clone())
            .collect()
    }

    /// Notes `path` links to, in the order they were first added to the graph.
    pub fn forward(&self, path: &str) -> Vec<String> {
        self.neighbors(path, Direction::Outgoing)
    }

    /// Notes linking to `path`, in the order they were first added to the graph.
    pub fn backward(&self, path: &str) -> Vec<String> {
        self.neighbors(path, Direction::Incoming)
    }
}

pub struct GraphIndex<'s, S: NoteStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: NoteStore + ?Sized> GraphIndex<'s, S> {
    pub fn new(store: &'s S) -> Self {
        GraphIndex { store }
    }

    /// Resolved forward links of `path` in the order they appear; unresolved tokens are dropped.
    pub fn outgoing(&self, path: &str) -> Result<Vec<String>, VaultError> {
        let path = paths::normalize(path)?;
        let note = self.store.read(&path)?;
        Ok(LinkResolver::new(self.store).outgoing(note.body(), &path))
    }

    pub fn backlinks(
        &self,
        target: &str,
        scan_limit: Option<usize>,
    ) -> Result<Vec<String>, VaultError> {
        Ok(self.backlink_scan(target, scan_limit)?.backlinks)
    }

    /// Scan up to `scan_limit` notes (all of them when `None`) for links resolving to `target`.
    #[tracing::instrument(skip(self))]
    pub fn backlink_scan(
        &self,
        target: &str,
        scan_limit: Option<usize>,
    ) -> Result<BacklinkScan, VaultError> {
        let target = paths::normalize(target)?;
        if !self.store.exists(&target) {
            return Err(VaultError::NotFound(format!("Note not found: {target}")));
        }
        let corpus = self.store.enumerate()?;
        let corpus_size = corpus.len();
        let threshold = self.store.config().backlink_warn_threshold;
        if scan_limit.is_none() && corpus_size > threshold {
            tracing::warn!(
                "Backlink scan for {} reads all {} notes; pass a scan limit to bound it",
                target,
                corpus_size
            );
        }
        let candidates = corpus
            .iter()
            .take(scan_limit.unwrap_or(usize::MAX))
            .map(|meta| meta.path.clone())
            .collect::<Vec<String>>();
        let resolver = LinkResolver::with_corpus(self.store, corpus);

        let mut backlinks = Vec::new();
        let mut scanned = 0;
        for candidate in candidates.iter() {
            scanned += 1;
            let content = match self.store.read_raw(candidate) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!("Error checking backlinks in {}: {e}", candidate);
                    continue;
                }
            };
            let links_here = extract(frontmatter::body(&content)).any(|token| {
                resolver.resolve(token.target, candidate).path() == Some(target.as_str())
            });
            if links_here {
                backlinks.push(candidate.clone());
            }
        }
        Ok(BacklinkScan {
            backlinks,
            scanned,
            corpus_size,
        })
    }

    /// Full forward/backward adjacency of the corpus. Every corpus note is a node, whether or
    /// not it has links.
    pub fn adjacency(&self) -> Result<LinkAdjacency, VaultError> {
        let corpus = self.store.enumerate()?;
        let notes = corpus
            .iter()
            .map(|meta| meta.path.clone())
            .collect::<Vec<String>>();
        let resolver = LinkResolver::with_corpus(self.store, corpus);
        let mut adjacency = LinkAdjacency::default();
        for path in notes.iter() {
            adjacency.add_note(path);
        }
        for path in notes.iter() {
            match self.store.read_raw(path) {
                Ok(content) => {
                    for target in resolver.outgoing(frontmatter::body(&content), path) {
                        adjacency.add_link(path, &target);
                    }
                }
                Err(e) => tracing::debug!("Skipping {} while building adjacency: {e}", path),
            }
        }
        adjacency.corpus = notes;
        Ok(adjacency)
    }

    /// Notes with no resolved forward links and no backlinks, in corpus enumeration order.
    pub fn orphans(&self) -> Result<Vec<String>, VaultError> {
        let adjacency = self.adjacency()?;
        Ok(adjacency
            .corpus()
            .iter()
            .filter(|path| {
                adjacency.forward(path).is_empty() && adjacency.backward(path).is_empty()
            })
            .cloned()
            .collect())
    }

    /// The first `max_notes` corpus notes and the links between them. Links leaving that node
    /// set are dropped.
    pub fn graph(&self, max_notes: usize) -> Result<LinkGraph, VaultError> {
        let corpus = self.store.enumerate()?;
        let selected = corpus
            .iter()
            .take(max_notes)
            .cloned()
            .collect::<Vec<_>>();
        let node_set = selected
            .iter()
            .map(|meta| meta.path.clone())
            .collect::<BTreeSet<String>>();
        let resolver = LinkResolver::with_corpus(self.store, corpus);

        let mut graph = LinkGraph::default();
        let mut seen_edges = BTreeSet::new();
        for meta in selected {
            let (tags, targets) = match self.store.read(&meta.path) {
                Ok(note) => (note.tags(), resolver.outgoing(note.body(), &meta.path)),
                Err(e) => {
                    tracing::debug!("Error building graph for {}: {e}", meta.path);
                    (Vec::new(), Vec::new())
                }
            };
            for target in targets {
                let edge = (meta.path.clone(), target.clone());
                if node_set.contains(&target) && seen_edges.insert(edge) {
                    graph.edges.push(GraphEdge {
                        source: meta.path.clone(),
                        target,
                    });
                }
            }
            graph.nodes.push(GraphNode {
                id: meta.path,
                name: meta.name,
                size: meta.size,
                tags,
            });
        }
        graph.total_nodes = graph.nodes.len();
        graph.total_edges = graph.edges.len();
        Ok(graph)
    }
}
