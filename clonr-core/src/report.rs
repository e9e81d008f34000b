// Run and state reports

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::crawl::RunSummary;
use crate::store::{StateSnapshot, atomic_write};
use crate::tree::{CrawlTree, NodeId};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub seed: String,
    pub pages_discovered: usize,
    pub pages_visited: usize,
    pub pages_done: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunInfo>,
    pub sitemap: Vec<SitemapEntry>,
}

/// Counts that only exist for a run that just finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub newly_visited: usize,
    pub newly_mirrored: usize,
    pub collect_only: bool,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub url: String,
    pub depth: usize,
    pub visited: bool,
    pub done: bool,
    #[serde(skip)]
    branch: String,
}

impl ReportData {
    pub fn from_state(seed: &str, state: &StateSnapshot, summary: Option<&RunSummary>) -> Self {
        let sitemap = state
            .tree
            .as_ref()
            .map(|tree| build_sitemap(tree, state))
            .unwrap_or_default();

        ReportData {
            seed: seed.to_string(),
            pages_discovered: sitemap.len(),
            pages_visited: sitemap.iter().filter(|e| e.visited).count(),
            pages_done: sitemap.iter().filter(|e| e.done).count(),
            run: summary.map(|s| RunInfo {
                newly_visited: s.newly_visited,
                newly_mirrored: s.newly_mirrored,
                collect_only: s.collect_only,
                skipped: s.skipped.clone(),
            }),
            sitemap,
        }
    }

    fn pending(&self) -> usize {
        self.pages_discovered - self.pages_done
    }
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                            CLONR MIRROR REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!("Seed:         {}\n", data.seed));
    report.push_str(&format!("Discovered:   {}\n", data.pages_discovered));
    report.push_str(&format!("Visited:      {}\n", data.pages_visited));
    report.push_str(&format!("Mirrored:     {}\n", data.pages_done));
    report.push_str(&format!("Pending:      {}\n", data.pending()));

    if let Some(ref run) = data.run {
        report.push('\n');
        report.push_str(&format!("This run:     {} visited, {} mirrored", run.newly_visited, run.newly_mirrored));
        if run.collect_only {
            report.push_str(" (collect only)");
        }
        report.push('\n');

        if !run.skipped.is_empty() {
            report.push_str(&format!("Skipped:      {}\n", run.skipped.len()));
            for url in &run.skipped {
                report.push_str(&format!("  ✗ {}\n", url));
            }
        }
    }
    report.push('\n');

    report.push_str(RULE);
    report.push_str("SITE MAP\n");
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&generate_sitemap_tree(&data.sitemap));
    report.push('\n');
    report.push_str("  ✓ mirrored   · discovered   ? not yet visited\n\n");

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "clonr",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "seed": data.seed,
            "summary": {
                "pages_discovered": data.pages_discovered,
                "pages_visited": data.pages_visited,
                "pages_done": data.pages_done,
                "pages_pending": data.pending()
            },
            "run": data.run,
            "sitemap": data.sitemap
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_report(data: &ReportData, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    atomic_write(path, content.as_bytes())
}

fn build_sitemap(tree: &CrawlTree, state: &StateSnapshot) -> Vec<SitemapEntry> {
    let mut entries = Vec::with_capacity(tree.len());
    if let Some(root) = tree.root() {
        walk(tree, state, root.id, "", None, &mut entries);
    }
    entries
}

/// Pre-order walk; `last` is `None` for the root.
fn walk(
    tree: &CrawlTree,
    state: &StateSnapshot,
    id: NodeId,
    prefix: &str,
    last: Option<bool>,
    out: &mut Vec<SitemapEntry>,
) {
    let Some(node) = tree.node(id) else {
        return;
    };

    let (branch, child_prefix) = match last {
        None => (String::new(), String::new()),
        Some(true) => (format!("{}└── ", prefix), format!("{}    ", prefix)),
        Some(false) => (format!("{}├── ", prefix), format!("{}│   ", prefix)),
    };

    out.push(SitemapEntry {
        url: node.url.to_string(),
        depth: node.depth,
        visited: state.visited.contains(&node.url),
        done: state.done.contains(&node.url),
        branch,
    });

    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        walk(tree, state, *child, &child_prefix, Some(i + 1 == count), out);
    }
}

fn generate_sitemap_tree(entries: &[SitemapEntry]) -> String {
    if entries.is_empty() {
        return "  (empty)\n".to_string();
    }

    let mut result = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let marker = if entry.done {
            "✓"
        } else if entry.visited {
            "·"
        } else {
            "?"
        };
        let label = if i == 0 {
            entry.url.clone()
        } else {
            display_path(&entry.url)
        };
        result.push_str(&format!("{}{}  [{}]\n", entry.branch, label, marker));
    }
    result
}

fn display_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}
