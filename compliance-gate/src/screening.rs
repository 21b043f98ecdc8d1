//! Watchlist-backed AML screener

use crate::watchlist::{NameField, Watchlist};
use async_trait::async_trait;
use payout_core::{AmlMatch, AmlProfile, AmlScreener, AmlScreening, AmlStatus, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// WatchlistScreener scores a payout against loaded watchlists
pub struct WatchlistScreener {
    watchlist: Arc<Watchlist>,
    high_risk_countries: Vec<String>,
    high_value_threshold: Option<Decimal>,
    auto_block_threshold: u8,
}

impl WatchlistScreener {
    /// Scores at or above `auto_block_threshold` are rejected outright
    pub fn new(
        watchlist: Arc<Watchlist>,
        high_risk_countries: Vec<String>,
        auto_block_threshold: u8,
    ) -> Self {
        Self {
            watchlist,
            high_risk_countries,
            high_value_threshold: None,
            auto_block_threshold,
        }
    }

    /// Add 10 points for payouts at or above `threshold`
    pub fn with_high_value_threshold(mut self, threshold: Decimal) -> Self {
        self.high_value_threshold = Some(threshold);
        self
    }
}

#[async_trait]
impl AmlScreener for WatchlistScreener {
    async fn screen(
        &self,
        profile: &AmlProfile,
        amount: Decimal,
        currency: &str,
    ) -> Result<AmlScreening> {
        let mut matches = Vec::new();
        let mut risk_score = 0u32;

        // 1. Name against names and aliases
        let name_hits = self.watchlist.check_name(&profile.full_name);
        if let Some(best) = name_hits.iter().map(|(_, field, _)| *field).min_by_key(|f| match f {
            NameField::Name => 0,
            NameField::Alias => 1,
        }) {
            risk_score += match best {
                NameField::Name => 80,
                NameField::Alias => 70,
            };
            warn!(account = %profile.account, "Watchlist name match for {}", profile.full_name);
        }
        for (entry, field, score) in name_hits {
            matches.push(AmlMatch {
                list: entry.source.as_str().to_string(),
                field: match field {
                    NameField::Name => "name".to_string(),
                    NameField::Alias => "alias".to_string(),
                },
                matched_value: entry.id.clone(),
                score,
            });
        }

        // 2. Country
        if let Some(country) = &profile.country {
            let country_hits = self.watchlist.check_country(country);
            if !country_hits.is_empty() {
                risk_score += 60;
                for entry in country_hits {
                    matches.push(AmlMatch {
                        list: entry.source.as_str().to_string(),
                        field: "country".to_string(),
                        matched_value: country.clone(),
                        score: 1.0,
                    });
                }
            } else if self
                .high_risk_countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(country))
            {
                // Raises the score without producing a watchlist match
                risk_score += 20;
            }
        }

        // 3. Identifiers (IBAN, passport, wallet address)
        let mut identifier_hit = false;
        for identifier in &profile.identifiers {
            for entry in self.watchlist.check_identifier(identifier) {
                identifier_hit = true;
                matches.push(AmlMatch {
                    list: entry.source.as_str().to_string(),
                    field: "identifier".to_string(),
                    matched_value: identifier.clone(),
                    score: 1.0,
                });
            }
        }
        if identifier_hit {
            risk_score += 90;
        }

        // 4. Amount
        if let Some(threshold) = self.high_value_threshold {
            if amount >= threshold {
                risk_score += 10;
            }
        }

        let risk_score = risk_score.min(100) as u8;

        let status = if risk_score >= self.auto_block_threshold {
            AmlStatus::Rejected
        } else if !matches.is_empty() {
            AmlStatus::Flagged
        } else {
            AmlStatus::Cleared
        };

        if status != AmlStatus::Cleared {
            info!(
                account = %profile.account,
                risk_score,
                matches = matches.len(),
                amount = %amount,
                currency,
                "AML screening {:?}",
                status
            );
        }

        Ok(AmlScreening {
            status,
            risk_score,
            matches,
        })
    }
}
