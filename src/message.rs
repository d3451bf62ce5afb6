use crate::domain_utils::DomainUtils;
use base64::{engine::general_purpose, Engine as _};
use mail_parser::{Addr, Address, Header, HeaderValue, MessageParser};
use regex::bytes::{Captures as BytesCaptures, Regex as BytesRegex};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// One fetched message, reduced to the fields the classifier looks at.
///
/// Header names are stored lower-cased; lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Raw sender, usually `Display Name <user@example.com>`
    pub sender: String,
    pub subject: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Read state, carried through moves untouched
    #[serde(default)]
    pub seen: bool,
}

impl MessageRecord {
    pub fn new(sender: &str, subject: &str) -> Self {
        Self {
            sender: sender.to_string(),
            subject: subject.to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_seen(mut self, seen: bool) -> Self {
        self.seen = seen;
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .get(&name_lower)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(k, _)| k.to_lowercase() == name_lower)
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Recipient header, empty when absent
    pub fn to(&self) -> &str {
        self.header("to").unwrap_or_default()
    }

    /// Lower-cased sender domain, `None` for senders without an address
    pub fn sender_domain(&self) -> Option<String> {
        DomainUtils::extract_domain(&self.sender)
    }

    /// Parse an RFC 5322 message; only the header block is kept.
    ///
    /// Folded lines are unfolded, repeated headers are joined with a space,
    /// encoded words and charsets are decoded by `mail_parser`.
    pub fn parse(raw: &[u8]) -> Self {
        let merged = merge_split_words(raw);
        let bytes: &[u8] = &merged;
        let Some(message) = MessageParser::default().parse(bytes) else {
            log::debug!("No parsable header block in message");
            return Self::default();
        };

        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for header in message.headers() {
            let key = header.name.as_str().to_lowercase();
            let value = header_text(message.raw_message(), header);
            match headers.get_mut(&key) {
                Some(existing) => {
                    existing.push(' ');
                    existing.push_str(&value);
                }
                None => {
                    headers.insert(key, value);
                }
            }
        }

        Self {
            sender: headers.get("from").cloned().unwrap_or_default(),
            subject: headers.get("subject").cloned().unwrap_or_default(),
            headers,
            seen: false,
        }
    }
}

/// Decoded text of one header. Structured values the record does not model
/// (Received, Content-Type, unparsable dates) keep their raw text.
fn header_text(raw: &[u8], header: &Header<'_>) -> String {
    match &header.value {
        HeaderValue::Text(text) => text.trim().to_string(),
        HeaderValue::TextList(list) => list.join(", "),
        HeaderValue::Address(address) => address_text(address),
        HeaderValue::DateTime(date) => date.to_rfc822(),
        _ => {
            let start = (header.offset_start as usize).min(raw.len());
            let end = (header.offset_end as usize).clamp(start, raw.len());
            String::from_utf8_lossy(&raw[start..end])
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

/// `Name <addr>` entries joined with `, `
fn address_text(address: &Address<'_>) -> String {
    let addrs: Vec<&Addr<'_>> = match address {
        Address::List(list) => list.iter().collect(),
        Address::Group(groups) => groups.iter().flat_map(|g| g.addresses.iter()).collect(),
    };
    addrs
        .iter()
        .filter_map(|addr| match (addr.name.as_deref(), addr.address.as_deref()) {
            (Some(name), Some(email)) => Some(format!("{name} <{email}>")),
            (None, Some(email)) => Some(email.to_string()),
            (Some(name), None) => Some(name.to_string()),
            (None, None) => None,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn header_end(raw: &[u8]) -> usize {
    let lf = raw.windows(2).position(|w| w == b"\n\n");
    let crlf = raw.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => raw.len(),
    }
}

fn encoded_run_regex() -> &'static BytesRegex {
    static RE: OnceLock<BytesRegex> = OnceLock::new();
    RE.get_or_init(|| {
        BytesRegex::new(
            r"(?i)=\?[^?\s]+\?[bq]\?[^?\s]*\?=(?:\s+=\?[^?\s]+\?[bq]\?[^?\s]*\?=)+",
        )
        .expect("encoded word run regex is valid")
    })
}

fn encoded_word_regex() -> &'static BytesRegex {
    static RE: OnceLock<BytesRegex> = OnceLock::new();
    RE.get_or_init(|| {
        BytesRegex::new(r"(?i)=\?([^?\s]+)\?([bq])\?([^?\s]*)\?=")
            .expect("encoded word regex is valid")
    })
}

/// Join runs of adjacent encoded words sharing charset and encoding into one
/// word, so a multi-byte character split across words decodes whole.
fn merge_split_words(raw: &[u8]) -> Cow<'_, [u8]> {
    let end = header_end(raw);
    let block = &raw[..end];
    if !encoded_run_regex().is_match(block) {
        return Cow::Borrowed(raw);
    }

    let merged = encoded_run_regex()
        .replace_all(block, |caps: &BytesCaptures| merge_run(&caps[0]));
    let mut out = merged.into_owned();
    out.extend_from_slice(&raw[end..]);
    Cow::Owned(out)
}

fn merge_run(run: &[u8]) -> Vec<u8> {
    // (charset, encoding, payloads)
    let mut groups: Vec<(Vec<u8>, u8, Vec<&[u8]>)> = Vec::new();
    for caps in encoded_word_regex().captures_iter(run) {
        let charset = caps[1].to_ascii_lowercase();
        let encoding = caps[2][0].to_ascii_uppercase();
        let payload = caps.get(3).map(|m| m.as_bytes()).unwrap_or_default();
        match groups.last_mut() {
            Some((c, e, payloads)) if *c == charset && *e == encoding => payloads.push(payload),
            _ => groups.push((charset, encoding, vec![payload])),
        }
    }

    let words: Vec<Vec<u8>> = groups
        .into_iter()
        .map(|(charset, encoding, payloads)| encode_group(&charset, encoding, &payloads))
        .collect();
    words.join(&b' ')
}

fn encode_group(charset: &[u8], encoding: u8, payloads: &[&[u8]]) -> Vec<u8> {
    let word = |payload: &[u8]| {
        let mut w = b"=?".to_vec();
        w.extend_from_slice(charset);
        w.extend_from_slice(&[b'?', encoding, b'?']);
        w.extend_from_slice(payload);
        w.extend_from_slice(b"?=");
        w
    };

    if encoding == b'Q' {
        return word(payloads.concat().as_slice());
    }

    let mut bytes = Vec::new();
    for payload in payloads {
        match general_purpose::STANDARD.decode(payload) {
            Ok(decoded) => bytes.extend_from_slice(&decoded),
            Err(e) => {
                log::debug!("Leaving undecodable base64 words apart: {e}");
                let words: Vec<Vec<u8>> = payloads.iter().map(|&p| word(p)).collect();
                return words.join(&b' ');
            }
        }
    }
    word(general_purpose::STANDARD.encode(bytes).as_bytes())
}

/// Decode RFC 2047 encoded words in a single header value.
///
/// Undecodable words are left as they are.
pub fn decode_mime_header(value: &str) -> String {
    let raw = format!("Subject: {value}\r\n\r\n");
    MessageRecord::parse(raw.as_bytes())
        .header("subject")
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
