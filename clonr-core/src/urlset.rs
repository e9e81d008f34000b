use clonr_scanner::NormalizedUrl;
use std::collections::HashSet;

/// Insertion-ordered set of normalized URLs. Backs both the visited set
/// (discovery) and the done set (mirroring).
#[derive(Debug, Clone, Default)]
pub struct UrlSet {
    order: Vec<NormalizedUrl>,
    members: HashSet<NormalizedUrl>,
}

impl UrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the URL was already present.
    pub fn insert(&mut self, url: NormalizedUrl) -> bool {
        if self.members.contains(&url) {
            return false;
        }
        self.members.insert(url.clone());
        self.order.push(url);
        true
    }

    pub fn contains(&self, url: &NormalizedUrl) -> bool {
        self.members.contains(url)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedUrl> {
        self.order.iter()
    }
}

impl FromIterator<NormalizedUrl> for UrlSet {
    fn from_iter<I: IntoIterator<Item = NormalizedUrl>>(iter: I) -> Self {
        let mut set = UrlSet::new();
        for url in iter {
            set.insert(url);
        }
        set
    }
}

pub type VisitedSet = UrlSet;
pub type DoneSet = UrlSet;
