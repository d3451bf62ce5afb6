//! Folder structure review
//!
//! Finds folders whose names differ only in case, spacing, `-` or `_`, and
//! proposes merges for empty, almost empty and single-child folders.

use crate::report::{FolderCount, ReportFormat};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;

/// Sub-folders below this many messages are merge candidates
pub const ALMOST_EMPTY_LIMIT: usize = 5;
/// A lone child below this many messages can move into its parent
pub const SINGLE_CHILD_LIMIT: usize = 50;

const MAILBOX_ROOT: &str = "INBOX";

/// `INBOX/Online-Shopping` and `online shopping` both become `onlineshopping`
pub fn normalize_folder_name(name: &str) -> String {
    name.replace("INBOX/", "")
        .to_lowercase()
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == '-' || *c == '_'))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarFolders {
    pub normalized: String,
    pub folders: Vec<String>,
}

/// Groups of two or more folders sharing a normalized name, first-seen order
pub fn find_similar_folders(folders: &[FolderCount]) -> Vec<SimilarFolders> {
    let mut groups: Vec<SimilarFolders> = Vec::new();
    for f in folders {
        let normalized = normalize_folder_name(&f.folder);
        match groups.iter_mut().find(|g| g.normalized == normalized) {
            Some(group) => group.folders.push(f.folder.clone()),
            None => groups.push(SimilarFolders {
                normalized,
                folders: vec![f.folder.clone()],
            }),
        }
    }
    groups.retain(|g| g.folders.len() > 1);
    groups
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Consolidation {
    SingleChild {
        parent: String,
        child: String,
        count: usize,
    },
    Empty {
        folder: String,
    },
    AlmostEmpty {
        folder: String,
        count: usize,
    },
}

impl Consolidation {
    pub fn suggestion(&self) -> String {
        match self {
            Consolidation::SingleChild { parent, .. } => {
                format!("move its messages into \"{parent}\" and delete the sub-folder")
            }
            Consolidation::Empty { .. } => "delete the folder".to_string(),
            Consolidation::AlmostEmpty { .. } => "consider merging it into its parent".to_string(),
        }
    }
}

impl fmt::Display for Consolidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consolidation::SingleChild {
                parent,
                child,
                count,
            } => write!(
                f,
                "\"{parent}\" has a single sub-folder \"{child}\" with {count} emails"
            ),
            Consolidation::Empty { folder } => write!(f, "\"{folder}\" is empty"),
            Consolidation::AlmostEmpty { folder, count } => {
                write!(f, "\"{folder}\" holds only {count} emails")
            }
        }
    }
}

/// Single-child parents first, then empty and almost empty folders in input
/// order. The mailbox root is never proposed.
pub fn suggest_consolidation(folders: &[FolderCount]) -> Vec<Consolidation> {
    let mut children: Vec<(&str, Vec<&FolderCount>)> = Vec::new();
    for f in folders {
        let Some((parent, _)) = f.folder.rsplit_once('/') else {
            continue;
        };
        match children.iter_mut().find(|(p, _)| *p == parent) {
            Some((_, kids)) => kids.push(f),
            None => children.push((parent, vec![f])),
        }
    }

    let mut suggestions = Vec::new();
    for (parent, kids) in &children {
        if let [only] = kids.as_slice() {
            if only.count < SINGLE_CHILD_LIMIT {
                suggestions.push(Consolidation::SingleChild {
                    parent: parent.to_string(),
                    child: only.folder.clone(),
                    count: only.count,
                });
            }
        }
    }

    for f in folders.iter().filter(|f| f.folder != MAILBOX_ROOT) {
        if f.count == 0 {
            suggestions.push(Consolidation::Empty {
                folder: f.folder.clone(),
            });
        } else if f.count < ALMOST_EMPTY_LIMIT && f.folder.contains('/') {
            suggestions.push(Consolidation::AlmostEmpty {
                folder: f.folder.clone(),
                count: f.count,
            });
        }
    }
    suggestions
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderAnalysis {
    pub total_folders: usize,
    pub total_emails: usize,
    /// Most messages first
    pub folders: Vec<FolderCount>,
    pub duplicates: Vec<SimilarFolders>,
    pub empty_folders: Vec<String>,
    pub suggestions: Vec<Consolidation>,
}

impl FolderAnalysis {
    pub fn analyze(mut folders: Vec<FolderCount>) -> Self {
        folders.sort_by(|a, b| b.count.cmp(&a.count));
        let duplicates = find_similar_folders(&folders);
        let suggestions = suggest_consolidation(&folders);
        let empty_folders = folders
            .iter()
            .filter(|f| f.count == 0)
            .map(|f| f.folder.clone())
            .collect();

        Self {
            total_folders: folders.len(),
            total_emails: folders.iter().map(|f| f.count).sum(),
            folders,
            duplicates,
            empty_folders,
            suggestions,
        }
    }

    fn count_of(&self, folder: &str) -> usize {
        self.folders
            .iter()
            .find(|f| f.folder == folder)
            .map(|f| f.count)
            .unwrap_or(0)
    }

    fn small_folders(&self) -> impl Iterator<Item = &FolderCount> {
        self.folders.iter().filter(|f| f.count < ALMOST_EMPTY_LIMIT)
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Json => {
                let mut json = serde_json::to_string_pretty(self)?;
                json.push('\n');
                Ok(json)
            }
        }
    }

    fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "📁 Folders (most emails first):");
        for f in &self.folders {
            let _ = writeln!(out, "  {:>5}  {}", f.count, f.folder);
        }
        let _ = writeln!(
            out,
            "\nTotal: {} folders with {} emails",
            self.total_folders, self.total_emails
        );

        let _ = writeln!(out, "\n🔍 Possible duplicates:");
        if self.duplicates.is_empty() {
            let _ = writeln!(out, "  ✅ No obvious duplicates");
        }
        for group in &self.duplicates {
            let _ = writeln!(out, "  ⚠️  Similar: {}", self.describe_group(group));
        }

        let _ = writeln!(out, "\n📭 Empty or almost empty folders:");
        let mut any_small = false;
        for f in self.small_folders() {
            any_small = true;
            if f.count == 0 {
                let _ = writeln!(out, "  🗑️  {}: empty", f.folder);
            } else {
                let _ = writeln!(out, "  ⚠️  {}: {} emails", f.folder, f.count);
            }
        }
        if !any_small {
            let _ = writeln!(
                out,
                "  ✅ Every folder has at least {} emails",
                ALMOST_EMPTY_LIMIT
            );
        }

        let _ = writeln!(out, "\n💡 Consolidation suggestions:");
        if self.suggestions.is_empty() {
            let _ = writeln!(out, "  ✅ Nothing to consolidate");
        }
        for (i, s) in self.suggestions.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, s);
            let _ = writeln!(out, "     → {}", s.suggestion());
        }
        out
    }

    fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "## 📁 Folder Analysis\n");
        let _ = writeln!(
            md,
            "**{}** folders with **{}** emails\n",
            self.total_folders, self.total_emails
        );
        let _ = writeln!(md, "| Folder | Emails |");
        let _ = writeln!(md, "|---|---|");
        for f in &self.folders {
            let _ = writeln!(md, "| `{}` | {} |", f.folder, f.count);
        }

        if !self.duplicates.is_empty() {
            let _ = writeln!(md, "\n### 🔍 Possible duplicates\n");
            for group in &self.duplicates {
                let _ = writeln!(md, "- {}", self.describe_group(group));
            }
        }

        if !self.suggestions.is_empty() {
            let _ = writeln!(md, "\n### 💡 Consolidation suggestions\n");
            for s in &self.suggestions {
                let _ = writeln!(md, "- {}: {}", s, s.suggestion());
            }
        }
        md
    }

    fn describe_group(&self, group: &SimilarFolders) -> String {
        group
            .folders
            .iter()
            .map(|name| format!("{} ({} emails)", name, self.count_of(name)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
