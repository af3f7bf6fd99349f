//! Payer name resolution.
//!
//! Maps a free-text payer organization name (plus an optional partial id
//! hint) to the canonical trading partner service id the claims network
//! routes on. Matching is staged over the directory's display names and
//! aliases: exact, then substring, then keyword overlap. A miss is an empty
//! string, never an error, so request construction can proceed and let the
//! remote service reject the inquiry explicitly.

use anyhow::Result;
use std::collections::HashSet;

use crate::payers::{PayerDirectory, PayerRecord};

/// Tokens ignored during keyword extraction.
const STOP_WORDS: [&str; 11] = [
    "OF", "THE", "AND", "A", "AN", "IN", "FOR", "ON", "AT", "TO", "BY",
];

/// Strips everything but letters, digits, and whitespace, collapses
/// whitespace runs, trims, and uppercases.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Meaningful tokens of a normalized name: length >= 2, stop words excluded.
pub fn extract_keywords(name: &str) -> HashSet<String> {
    normalize_name(name)
        .split_whitespace()
        .filter(|word| word.len() >= 2 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}

pub struct PayerResolver<D> {
    directory: D,
}

impl<D: PayerDirectory> PayerResolver<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    /// Resolves an organization name to a trading partner service id, or an
    /// empty string when no directory record matches at any stage.
    pub fn resolve(&self, organization_name: &str, id_hint: &str) -> Result<String> {
        let candidates = self.directory.claim_status_payers(id_hint)?;
        Ok(resolve_against(organization_name, &candidates))
    }
}

fn candidate_fields(record: &PayerRecord) -> [&str; 2] {
    [&record.display_name, &record.aliases]
}

/// The staged matching itself, over an already-fetched candidate set.
/// First successful stage wins; ties within a stage keep directory order.
pub fn resolve_against(organization_name: &str, candidates: &[PayerRecord]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    let normalized_input = normalize_name(organization_name);
    let input_keywords = extract_keywords(organization_name);

    // Stage 1: exact match, display names across the whole set before aliases.
    for field_index in 0..2 {
        for record in candidates {
            if normalize_name(candidate_fields(record)[field_index]) == normalized_input {
                return record.payer_id.clone();
            }
        }
    }

    // Stage 2: substring containment in either direction.
    if !normalized_input.is_empty() {
        for field_index in 0..2 {
            for record in candidates {
                let normalized_candidate = normalize_name(candidate_fields(record)[field_index]);
                if normalized_candidate.is_empty() {
                    continue;
                }
                if normalized_candidate.contains(&normalized_input)
                    || normalized_input.contains(&normalized_candidate)
                {
                    return record.payer_id.clone();
                }
            }
        }
    }

    // Stage 3: keyword overlap, summed over both fields, max score wins.
    let mut best_index = None;
    let mut best_score = 0usize;
    for (index, record) in candidates.iter().enumerate() {
        let score: usize = candidate_fields(record)
            .iter()
            .map(|field| {
                extract_keywords(field)
                    .intersection(&input_keywords)
                    .count()
            })
            .sum();
        if score > best_score {
            best_score = score;
            best_index = Some(index);
        }
    }
    match best_index {
        Some(index) => candidates[index].payer_id.clone(),
        None => String::new(),
    }
}
