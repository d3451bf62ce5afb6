pub mod aggregate;
pub mod config;
pub mod domain_utils;
pub mod engine;
pub mod folders;
pub mod maildir;
pub mod message;
pub mod report;
pub mod rules;
pub mod spam;
pub mod statistics;
pub mod suggest;
pub mod thunderbird;


pub use aggregate::{DomainAggregator, DomainGroup};
pub use config::Config;
pub use engine::{ClassificationEngine, ClassificationResult, Disposition};
pub use folders::FolderAnalysis;
pub use message::MessageRecord;
pub use rules::{Conditions, MergeOutcome, Rule, RuleSet};
pub use spam::{SpamClassifier, SpamConfig, SpamReason, SpamVerdict, WhitelistSet};
pub use statistics::{RunStats, StatEvent};
pub use suggest::{RuleSuggester, SuggestedRule};
