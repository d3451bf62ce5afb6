use crate::domain_utils::DomainUtils;
use crate::message::MessageRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_EXAMPLE_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleMessage {
    pub from: String,
    pub subject: String,
}

impl From<&MessageRecord> for ExampleMessage {
    fn from(message: &MessageRecord) -> Self {
        Self {
            from: message.sender.clone(),
            subject: message.subject.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainGroup {
    pub domain: String,
    pub count: usize,
    pub example_messages: Vec<ExampleMessage>,
}

/// Groups unmatched messages by sender domain
#[derive(Debug, Clone)]
pub struct DomainAggregator {
    example_limit: usize,
}

impl Default for DomainAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_EXAMPLE_LIMIT)
    }
}

impl DomainAggregator {
    pub fn new(example_limit: usize) -> Self {
        Self { example_limit }
    }

    /// Most frequent domain first; equal counts keep first-seen order.
    pub fn aggregate<'a, I>(&self, messages: I) -> Vec<DomainGroup>
    where
        I: IntoIterator<Item = &'a MessageRecord>,
    {
        let mut groups: Vec<DomainGroup> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for message in messages {
            let domain = DomainUtils::sender_domain(&message.sender);
            let slot = *index.entry(domain.clone()).or_insert_with(|| {
                groups.push(DomainGroup {
                    domain,
                    count: 0,
                    example_messages: Vec::new(),
                });
                groups.len() - 1
            });

            let group = &mut groups[slot];
            group.count += 1;
            if group.example_messages.len() < self.example_limit {
                group.example_messages.push(ExampleMessage::from(message));
            }
        }

        // sort_by is stable
        groups.sort_by(|a, b| b.count.cmp(&a.count));
        groups
    }
}
