use std::collections::{HashMap, HashSet};

use crate::catalog::{CatalogError, FaqCatalog};
use crate::models::{CatalogOverview, IntentOverview, MatchResult};
use crate::normalize::{tokenize, Normalizer};

#[derive(Debug, Clone)]
struct CompiledVariant {
    raw: String,
    normalized: String,
    tokens: HashSet<String>,
}

#[derive(Debug, Clone)]
struct CompiledIntent {
    intent: String,
    answer: String,
    variants: Vec<CompiledVariant>,
}

/// Resolves free text to the first catalog intent whose variant phrase it contains.
///
/// Immutable once built. Intents are tried in declaration order, and within an
/// intent its variants are tried in declaration order; the first hit wins.
#[derive(Debug, Clone)]
pub struct IntentMatcher {
    normalizer: Normalizer,
    intents: Vec<CompiledIntent>,
    suggested_questions: Vec<String>,
}

impl IntentMatcher {
    pub fn new(catalog: FaqCatalog) -> Result<Self, CatalogError> {
        if catalog.entries.is_empty() {
            return Err(CatalogError::Empty);
        }

        let normalizer = Normalizer::new(&catalog.stopwords);
        let mut seen = HashMap::new();
        let mut intents = Vec::with_capacity(catalog.entries.len());

        for (index, entry) in catalog.entries.into_iter().enumerate() {
            let intent = entry.intent.trim().to_string();
            if intent.is_empty() {
                return Err(CatalogError::EmptyIntent { index });
            }
            if seen.insert(intent.to_lowercase(), index).is_some() {
                return Err(CatalogError::DuplicateIntent { intent });
            }
            if entry.answer.trim().is_empty() {
                return Err(CatalogError::MissingAnswer { intent });
            }
            if entry.variants.is_empty() {
                return Err(CatalogError::NoVariants { intent });
            }

            let mut variants = Vec::with_capacity(entry.variants.len());
            for raw in entry.variants {
                // Same pipeline as queries, otherwise a filler inside a variant could never match.
                let normalized = normalizer.normalize(&raw);
                if normalized.is_empty() {
                    return Err(CatalogError::EmptyVariant {
                        intent,
                        variant: raw,
                    });
                }
                let tokens = normalized
                    .split(' ')
                    .map(ToString::to_string)
                    .collect::<HashSet<_>>();
                variants.push(CompiledVariant {
                    raw,
                    normalized,
                    tokens,
                });
            }

            intents.push(CompiledIntent {
                intent,
                answer: entry.answer,
                variants,
            });
        }

        Ok(Self {
            normalizer,
            intents,
            suggested_questions: catalog.suggested_questions,
        })
    }

    pub fn normalize(&self, query: &str) -> String {
        self.normalizer.normalize(query)
    }

    pub fn match_normalized(&self, normalized: &str) -> MatchResult {
        if normalized.is_empty() {
            return MatchResult::NoMatch;
        }

        for compiled in &self.intents {
            if let Some(variant) = compiled
                .variants
                .iter()
                .find(|variant| normalized.contains(variant.normalized.as_str()))
            {
                return MatchResult::Matched {
                    intent: compiled.intent.clone(),
                    answer: compiled.answer.clone(),
                    variant: variant.raw.clone(),
                };
            }
        }

        MatchResult::NoMatch
    }

    pub fn resolve(&self, query: &str) -> MatchResult {
        self.match_normalized(&self.normalize(query))
    }

    /// Intents ranked by how many of a variant's tokens appear in the query.
    pub fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        let query_tokens = tokenize(&self.normalize(query))
            .into_iter()
            .collect::<HashSet<_>>();
        if query_tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored = self
            .intents
            .iter()
            .enumerate()
            .filter_map(|(order, compiled)| {
                let best = compiled
                    .variants
                    .iter()
                    .map(|variant| overlap_score(&query_tokens, &variant.tokens))
                    .fold(0.0_f32, f32::max);
                (best > 0.0).then_some((best, order, compiled.intent.clone()))
            })
            .collect::<Vec<_>>();

        scored.sort_by(|(a_score, a_order, _), (b_score, b_order, _)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a_order.cmp(b_order))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(_, _, intent)| intent)
            .collect()
    }

    pub fn suggested_questions(&self) -> &[String] {
        &self.suggested_questions
    }

    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }

    pub fn overview(&self) -> CatalogOverview {
        CatalogOverview {
            intents: self
                .intents
                .iter()
                .map(|compiled| IntentOverview {
                    intent: compiled.intent.clone(),
                    variants: compiled
                        .variants
                        .iter()
                        .map(|variant| variant.raw.clone())
                        .collect(),
                })
                .collect(),
            suggested_questions: self.suggested_questions.clone(),
        }
    }
}

fn overlap_score(query_tokens: &HashSet<String>, variant_tokens: &HashSet<String>) -> f32 {
    if variant_tokens.is_empty() {
        return 0.0;
    }

    let overlap = variant_tokens
        .iter()
        .filter(|token| query_tokens.contains(*token))
        .count() as f32;

    overlap / variant_tokens.len() as f32
}
