use crate::engine::{ClassificationResult, Disposition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleStats {
    pub rule_name: String,
    pub matches: u64,
    pub moved: u64,
}

#[derive(Debug, Clone)]
pub enum StatEvent {
    Classified(ClassificationResult),
    Moved { folder: String },
    Error,
}

/// Counters of one sort run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: u64,
    pub moved: u64,
    pub spam: u64,
    pub matched: u64,
    pub unmatched: u64,
    pub errors: u64,
    /// Messages moved per target folder
    pub by_folder: BTreeMap<String, u64>,
    pub rules: Vec<RuleStats>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, event: StatEvent) {
        match event {
            StatEvent::Classified(result) => {
                self.processed += 1;
                match result.disposition {
                    Disposition::Spam => self.spam += 1,
                    Disposition::Unmatched => self.unmatched += 1,
                    Disposition::RuleMatch => {
                        self.matched += 1;
                        if let Some(name) = result.matched_rule_name {
                            self.rule_entry(&name).matches += 1;
                        }
                    }
                }
            }
            StatEvent::Moved { folder } => {
                self.moved += 1;
                *self.by_folder.entry(folder).or_insert(0) += 1;
            }
            StatEvent::Error => {
                self.errors += 1;
            }
        }
    }

    /// Count a completed move, attributing it to the rule that asked for it
    pub fn record_move(&mut self, result: &ClassificationResult) {
        if let Some(folder) = &result.target_folder {
            self.record_event(StatEvent::Moved {
                folder: folder.clone(),
            });
        }
        if let Some(name) = &result.matched_rule_name {
            self.rule_entry(name).moved += 1;
        }
    }

    fn rule_entry(&mut self, name: &str) -> &mut RuleStats {
        let pos = match self.rules.iter().position(|r| r.rule_name == name) {
            Some(pos) => pos,
            None => {
                self.rules.push(RuleStats {
                    rule_name: name.to_string(),
                    ..RuleStats::default()
                });
                self.rules.len() - 1
            }
        };
        &mut self.rules[pos]
    }

    /// Rules, in configured order, that matched nothing this run
    pub fn get_unmatched_rules(&self, all_rule_names: &[String]) -> Vec<String> {
        let matched_rules: HashSet<&str> = self
            .rules
            .iter()
            .filter(|r| r.matches > 0)
            .map(|r| r.rule_name.as_str())
            .collect();

        all_rule_names
            .iter()
            .filter(|rule_name| !matched_rules.contains(rule_name.as_str()))
            .cloned()
            .collect()
    }

    /// Per-rule counters, most matches first
    pub fn top_rules(&self) -> Vec<&RuleStats> {
        let mut rules: Vec<&RuleStats> = self.rules.iter().collect();
        rules.sort_by(|a, b| b.matches.cmp(&a.matches));
        rules
    }

    pub fn percentage(&self, count: u64) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            count as f64 / self.processed as f64 * 100.0
        }
    }
}
