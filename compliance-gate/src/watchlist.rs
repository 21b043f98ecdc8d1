//! In-memory sanctions watchlists with fuzzy name matching

use dashmap::DashMap;
use payout_core::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Publisher of a watchlist
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchlistSource {
    /// US Office of Foreign Assets Control
    Ofac,
    /// European Union
    Eu,
    /// United Nations
    Un,
    /// UK His Majesty's Treasury
    UkHmt,
    /// Operator-maintained list
    Local(String),
}

impl WatchlistSource {
    /// List key
    pub fn as_str(&self) -> &str {
        match self {
            WatchlistSource::Ofac => "OFAC",
            WatchlistSource::Eu => "EU",
            WatchlistSource::Un => "UN",
            WatchlistSource::UkHmt => "UK_HMT",
            WatchlistSource::Local(name) => name,
        }
    }
}

/// Listed party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    /// Publisher's entry id
    pub id: String,
    /// Originating list
    pub source: WatchlistSource,
    /// Primary names
    pub names: Vec<String>,
    /// Known aliases
    pub aliases: Vec<String>,
    /// ISO country codes
    pub countries: Vec<String>,
    /// Passport, IBAN or wallet identifiers
    pub identifiers: Vec<String>,
}

/// Which part of an entry a name hit landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameField {
    /// Primary name
    Name,
    /// Alias
    Alias,
}

/// Watchlist holds several lists in memory and answers name/country/identifier lookups
pub struct Watchlist {
    // Map: source -> (entry_id -> WatchlistEntry)
    lists: Arc<DashMap<String, DashMap<String, WatchlistEntry>>>,
    fuzzy_threshold: f64,
    punctuation: Regex,
}

impl Watchlist {
    /// Create an empty watchlist; `fuzzy_threshold` is the minimum name similarity
    pub fn new(fuzzy_threshold: f64) -> Result<Self> {
        let punctuation = Regex::new(r"[^\w\s]")
            .map_err(|e| Error::Config(format!("invalid normalization pattern: {}", e)))?;
        Ok(Self {
            lists: Arc::new(DashMap::new()),
            fuzzy_threshold,
            punctuation,
        })
    }

    /// Replace a list's contents
    pub fn load_list(&self, source: WatchlistSource, entries: Vec<WatchlistEntry>) {
        let name = source.as_str().to_string();
        let map = DashMap::new();
        for entry in entries {
            map.insert(entry.id.clone(), entry);
        }
        let count = map.len();
        self.lists.insert(name.clone(), map);
        info!("Loaded {} watchlist with {} entries", name, count);
    }

    /// Entries whose names or aliases fuzzily match `name`
    pub fn check_name(&self, name: &str) -> Vec<(WatchlistEntry, NameField, f64)> {
        let normalized = self.normalize_name(name);
        let mut matches = Vec::new();
        if normalized.is_empty() {
            return matches;
        }

        for list in self.lists.iter() {
            for entry_ref in list.value().iter() {
                let entry = entry_ref.value();

                let name_hit = entry
                    .names
                    .iter()
                    .map(|n| similarity(&normalized, &self.normalize_name(n)))
                    .fold(0.0_f64, f64::max);
                if name_hit >= self.fuzzy_threshold {
                    debug!("Watchlist match in {}: {} ~ {}", list.key(), name, entry.id);
                    matches.push((entry.clone(), NameField::Name, name_hit));
                    continue;
                }

                let alias_hit = entry
                    .aliases
                    .iter()
                    .map(|a| similarity(&normalized, &self.normalize_name(a)))
                    .fold(0.0_f64, f64::max);
                if alias_hit >= self.fuzzy_threshold {
                    debug!("Watchlist alias match in {}: {} ~ {}", list.key(), name, entry.id);
                    matches.push((entry.clone(), NameField::Alias, alias_hit));
                }
            }
        }

        matches
    }

    /// Entries listing the country
    pub fn check_country(&self, country_code: &str) -> Vec<WatchlistEntry> {
        let country_upper = country_code.to_uppercase();
        self.lists
            .iter()
            .flat_map(|list| {
                list.value()
                    .iter()
                    .filter(|e| e.countries.iter().any(|c| c.to_uppercase() == country_upper))
                    .map(|e| e.value().clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Entries carrying the identifier (IBAN, passport, wallet address...)
    pub fn check_identifier(&self, id_value: &str) -> Vec<WatchlistEntry> {
        let normalized = normalize_identifier(id_value);
        self.lists
            .iter()
            .flat_map(|list| {
                list.value()
                    .iter()
                    .filter(|e| {
                        e.identifiers
                            .iter()
                            .any(|i| normalize_identifier(i) == normalized)
                    })
                    .map(|e| e.value().clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Entry count across lists
    pub fn total_entries(&self) -> usize {
        self.lists.iter().map(|l| l.value().len()).sum()
    }

    /// Keys of loaded lists
    pub fn loaded_lists(&self) -> Vec<String> {
        self.lists.iter().map(|l| l.key().clone()).collect()
    }

    // lowercase, strip punctuation, collapse whitespace
    fn normalize_name(&self, name: &str) -> String {
        let cleaned = self.punctuation.replace_all(name, "");
        cleaned
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

fn normalize_identifier(value: &str) -> String {
    value.replace(char::is_whitespace, "").to_uppercase()
}

/// 1 - levenshtein / max_len
fn similarity(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }
    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(s1, s2) as f64 / max_len as f64
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
