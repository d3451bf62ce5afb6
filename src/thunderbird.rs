//! Import of Thunderbird message filters exported as JSON

use crate::rules::{Rule, RuleSet};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use url::Url;

const ACTION_MOVE: i64 = 1;
const ATTRIB_SUBJECT: i64 = 0;
const ATTRIB_FROM: i64 = 1;
const ATTRIB_TO_OR_CC: i64 = 6;

#[derive(Debug, Default, Deserialize)]
pub struct ThunderbirdExport {
    #[serde(default)]
    pub filters: Vec<ThunderbirdFilter>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThunderbirdFilter {
    #[serde(default)]
    pub enabled: bool,
    pub filter_name: Option<String>,
    #[serde(default)]
    pub action_list: Vec<FilterAction>,
    #[serde(default)]
    pub search_terms: Vec<SearchTerm>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterAction {
    #[serde(rename = "type")]
    pub action_type: Option<i64>,
    #[serde(default)]
    pub target_folder_uri: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchTerm {
    pub attrib: Option<i64>,
    #[serde(default)]
    pub value: SearchValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchValue {
    #[serde(default)]
    pub str: String,
}

/// Folder path of an IMAP folder URI.
///
/// `imap://me%40example.com@imap.example.com/INBOX/Shopping%20Sites` gives
/// `Shopping Sites`. Trash and Junk targets give `None`.
pub fn folder_from_uri(uri: &str) -> Option<String> {
    let url = match Url::parse(uri) {
        Ok(url) => url,
        Err(e) => {
            log::debug!("Ignoring unparseable folder URI {}: {}", uri, e);
            return None;
        }
    };
    let path = url.path().trim_matches('/');
    let decoded = urlencoding::decode(path).ok()?.into_owned();

    let folder = match decoded.strip_prefix("INBOX/") {
        Some(rest) => rest.to_string(),
        None => decoded,
    };
    if folder.is_empty() || folder.starts_with("Trash") || folder.starts_with("Junk") {
        return None;
    }
    Some(folder)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn convert_filter(filter: &ThunderbirdFilter) -> Option<Rule> {
    if !filter.enabled {
        return None;
    }
    let action = filter
        .action_list
        .iter()
        .find(|a| a.action_type == Some(ACTION_MOVE))?;
    let folder = folder_from_uri(&action.target_folder_uri)?;

    let name = filter
        .filter_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(&folder)
        .to_string();
    let mut rule = Rule::new(&name, &folder);

    for term in &filter.search_terms {
        let value = term.value.str.as_str();
        if value.is_empty() {
            continue;
        }
        match term.attrib {
            Some(ATTRIB_FROM) | Some(ATTRIB_TO_OR_CC) => {
                push_unique(&mut rule.conditions.from_contains, value)
            }
            Some(ATTRIB_SUBJECT) => push_unique(&mut rule.conditions.subject_contains, value),
            _ => {}
        }
    }

    if rule.conditions.is_empty() {
        log::debug!("Filter '{}' has no usable conditions", name);
        return None;
    }
    Some(rule)
}

/// Enabled move filters as rules, ordered by folder
pub fn convert_filters(export: &ThunderbirdExport) -> RuleSet {
    let mut rules: Vec<Rule> = export.filters.iter().filter_map(convert_filter).collect();
    rules.sort_by(|a, b| a.folder.cmp(&b.folder));
    log::info!(
        "Converted {} of {} Thunderbird filters",
        rules.len(),
        export.filters.len()
    );
    RuleSet::new(rules)
}

pub fn import_file<P: AsRef<Path>>(path: P) -> Result<RuleSet> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read Thunderbird export: {}", path.display()))?;
    let export: ThunderbirdExport = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse Thunderbird export: {}", path.display()))?;
    Ok(convert_filters(&export))
}
