//! Crawl tree arena.
//!
//! Nodes live in a `Vec` in the order discovery appended them, indexed by
//! URL. A node's id is its position in that vector, so ids double as the
//! append sequence used to rebuild the frontier after a restart.

use clonr_scanner::{NormalizedUrl, UrlNormalizer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlNode {
    pub id: NodeId,
    pub url: NormalizedUrl,
    pub depth: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlTree {
    nodes: Vec<CrawlNode>,
    index: HashMap<NormalizedUrl, NodeId>,
}

/// On-disk shape of a tree node: `{url, depth, seq, children}` recursively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub url: String,
    pub depth: usize,
    #[serde(default)]
    pub seq: Option<usize>,
    #[serde(default)]
    pub children: Vec<TreeRecord>,
}

impl CrawlTree {
    pub fn with_root(url: NormalizedUrl) -> Self {
        let mut tree = CrawlTree::default();
        tree.index.insert(url.clone(), 0);
        tree.nodes.push(CrawlNode {
            id: 0,
            url,
            depth: 0,
            parent: None,
            children: Vec::new(),
        });
        tree
    }

    pub fn root(&self) -> Option<&CrawlNode> {
        self.nodes.first()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, url: &NormalizedUrl) -> bool {
        self.index.contains_key(url)
    }

    pub fn get(&self, url: &NormalizedUrl) -> Option<NodeId> {
        self.index.get(url).copied()
    }

    pub fn node(&self, id: NodeId) -> Option<&CrawlNode> {
        self.nodes.get(id)
    }

    /// Append `url` under `parent` at `parent.depth + 1`. Returns `None` when
    /// the URL is already in the tree or the parent does not exist.
    pub fn add_child(&mut self, parent: NodeId, url: NormalizedUrl) -> Option<NodeId> {
        if self.index.contains_key(&url) {
            return None;
        }
        let depth = self.nodes.get(parent)?.depth + 1;
        let id = self.nodes.len();
        self.index.insert(url.clone(), id);
        self.nodes.push(CrawlNode {
            id,
            url,
            depth,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        Some(id)
    }

    /// Nodes in append order.
    pub fn insertion_order(&self) -> impl Iterator<Item = &CrawlNode> {
        self.nodes.iter()
    }

    /// Pre-order walk: every parent before its children, siblings in
    /// discovery order.
    pub fn depth_first(&self) -> Vec<&CrawlNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let Some(root) = self.root() else {
            return out;
        };
        let mut stack = vec![root.id];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn to_record(&self) -> Option<TreeRecord> {
        self.root().map(|root| self.record_for(root.id))
    }

    fn record_for(&self, id: NodeId) -> TreeRecord {
        let node = &self.nodes[id];
        TreeRecord {
            url: node.url.to_string(),
            depth: node.depth,
            seq: Some(node.id),
            children: node.children.iter().map(|c| self.record_for(*c)).collect(),
        }
    }

    /// Rebuild the arena from its persisted form.
    ///
    /// URLs are passed through `normalizer` again (normalization is
    /// idempotent), depths must chain from 0, and each URL may appear only
    /// once. Records without `seq` fall back to level order, which is the
    /// append order of a breadth-first discovery.
    pub fn from_record(record: &TreeRecord, normalizer: &UrlNormalizer) -> Result<Self, String> {
        struct Flat<'a> {
            record: &'a TreeRecord,
            parent: Option<usize>,
        }

        let mut flat: Vec<Flat> = Vec::new();
        let mut queue = VecDeque::from([(record, None::<usize>)]);
        while let Some((rec, parent)) = queue.pop_front() {
            let me = flat.len();
            flat.push(Flat { record: rec, parent });
            for child in &rec.children {
                queue.push_back((child, Some(me)));
            }
        }

        // Stable sort keeps level order among records missing a sequence.
        let mut order: Vec<usize> = (0..flat.len()).collect();
        order.sort_by_key(|&i| flat[i].record.seq.unwrap_or(usize::MAX));
        if order.first() != Some(&0) {
            return Err("root must come first in discovery order".to_string());
        }

        let mut new_id = vec![0usize; flat.len()];
        for (position, &i) in order.iter().enumerate() {
            new_id[i] = position;
        }

        let mut tree = CrawlTree::default();
        for &i in &order {
            let entry = &flat[i];
            let url = normalizer
                .normalize(&entry.record.url)
                .map_err(|e| e.to_string())?;
            let parent = entry.parent.map(|p| new_id[p]);
            let expected_depth = match parent {
                None => 0,
                Some(p) => {
                    let parent_node = tree
                        .nodes
                        .get(p)
                        .ok_or_else(|| format!("{} listed before its parent", url))?;
                    parent_node.depth + 1
                }
            };
            if entry.record.depth != expected_depth {
                return Err(format!(
                    "{} has depth {} but its parent implies {}",
                    url, entry.record.depth, expected_depth
                ));
            }
            if tree.index.contains_key(&url) {
                return Err(format!("{} appears more than once", url));
            }

            let id = tree.nodes.len();
            tree.index.insert(url.clone(), id);
            tree.nodes.push(CrawlNode {
                id,
                url,
                depth: expected_depth,
                parent,
                children: Vec::new(),
            });
        }

        // Children in sibling order, which level order preserves.
        for (i, entry) in flat.iter().enumerate() {
            if let Some(p) = entry.parent {
                let child = new_id[i];
                tree.nodes[new_id[p]].children.push(child);
            }
        }

        Ok(tree)
    }
}
