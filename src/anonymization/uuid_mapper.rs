use crate::error_handling::types::AnonymizeError;
use log::trace;
use regex::Regex;
use std::collections::BTreeMap;
use uuid::Uuid;

const UUID_PATTERN: &str =
    r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b";

/// Replaces UUIDs with `<prefix>-0000-0000-0000-<n>`, where `prefix` is
/// random per mapper and `n` counts distinct UUIDs in order of first
/// appearance. Originals are compared case-insensitively.
#[derive(Debug, Clone)]
pub struct UuidMapper {
    prefix: String,
    pattern: Regex,
    mapping: BTreeMap<String, String>,
}

impl UuidMapper {
    pub fn new() -> Result<Self, AnonymizeError> {
        let random = Uuid::new_v4().simple().to_string();
        Self::with_prefix(&random[..8])
    }

    pub fn with_prefix(prefix: &str) -> Result<Self, AnonymizeError> {
        Ok(Self {
            prefix: prefix.to_string(),
            pattern: Regex::new(UUID_PATTERN).map_err(AnonymizeError::InvalidPattern)?,
            mapping: BTreeMap::new(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Stand-in for `uuid`, allocating the next one on first sight.
    pub fn anonymize_uuid(&mut self, uuid: &str) -> String {
        let key = uuid.to_lowercase();
        if let Some(existing) = self.mapping.get(&key) {
            return existing.clone();
        }
        let replacement = format!(
            "{}-0000-0000-0000-{:012}",
            self.prefix,
            self.mapping.len() + 1
        );
        trace!("{} -> {}", key, replacement);
        self.mapping.insert(key, replacement.clone());
        replacement
    }

    /// Replaces every UUID occurring in `text`.
    pub fn anonymize_str(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        // Collected first: the replacement needs `&mut self`.
        let found: Vec<(usize, usize)> = self
            .pattern
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect();
        for (start, end) in found {
            out.push_str(&text[last..start]);
            let replacement = self.anonymize_uuid(&text[start..end]);
            out.push_str(&replacement);
            last = end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Original (lower-cased) to stand-in, sorted by original.
    pub fn mapping(&self) -> &BTreeMap<String, String> {
        &self.mapping
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
