//! TF-IDF candidate generation over the whole corpus.
//!
//! Every question is normalized, tokenized and turned into a sparse,
//! L2-normalized vector of `count * idf` weights, with the smoothed
//! `idf(t) = ln((1 + n) / (1 + df(t))) + 1`. Scoring a query is a dot product
//! against every entry, so a search is exhaustive and exact.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::error::{FaqError, Result};
use crate::model::{Candidate, FaqEntry};
use crate::normalize::{normalize, tokenize};
use crate::similarity::{rank_top_k, TieBreak};

/// Sparse vector as `(term id, weight)` pairs sorted by term id.
type SparseVector = Vec<(usize, f32)>;

#[derive(Debug, Clone)]
struct IndexedQuestion {
    normalized: String,
    weights: SparseVector,
}

#[derive(Debug, Clone)]
pub struct LexicalIndex {
    entries: Vec<FaqEntry>,
    documents: Vec<IndexedQuestion>,
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl LexicalIndex {
    pub fn build(entries: Vec<FaqEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(FaqError::EmptyCorpus);
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.question.as_str()) {
                return Err(FaqError::DuplicateQuestion(entry.question.clone()));
            }
        }

        let normalized: Vec<String> = entries.iter().map(|e| normalize(&e.question)).collect();

        let terms: BTreeSet<&str> = normalized.iter().flat_map(|q| tokenize(q)).collect();
        let vocabulary: HashMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(id, term)| (term.to_string(), id))
            .collect();

        let mut df = vec![0usize; vocabulary.len()];
        for question in &normalized {
            let unique: HashSet<usize> = tokenize(question)
                .into_iter()
                .filter_map(|t| vocabulary.get(t).copied())
                .collect();
            for id in unique {
                df[id] += 1;
            }
        }

        let n = entries.len() as f32;
        let idf: Vec<f32> = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f32)).ln() + 1.0)
            .collect();

        if vocabulary.is_empty() {
            warn!(
                entries = entries.len(),
                "lexical vocabulary is empty; every query will score zero"
            );
        }

        let documents = normalized
            .into_iter()
            .map(|q| {
                let weights = weigh(&tokenize(&q), &vocabulary, &idf);
                IndexedQuestion {
                    normalized: q,
                    weights,
                }
            })
            .collect();

        info!(
            entries = entries.len(),
            vocabulary = vocabulary.len(),
            "built lexical index"
        );

        Ok(Self {
            entries,
            documents,
            vocabulary,
            idf,
        })
    }

    /// The `top_k` entries most similar to `query`, best first, ties in corpus
    /// order. Out-of-vocabulary query terms carry no weight.
    pub fn score(&self, query: &str, top_k: usize) -> Vec<Candidate<'_>> {
        let normalized = normalize(query);
        let query_weights = weigh(&tokenize(&normalized), &self.vocabulary, &self.idf);

        let scores: Vec<f32> = self
            .documents
            .iter()
            .map(|doc| sparse_dot(&query_weights, &doc.weights))
            .collect();

        let shortlist: Vec<Candidate<'_>> = rank_top_k(&scores, top_k, TieBreak::InputOrder)
            .into_iter()
            .map(|position| Candidate {
                position,
                entry: &self.entries[position],
                lexical_score: scores[position],
            })
            .collect();

        debug!(
            query = %normalized,
            query_terms = query_weights.len(),
            shortlist = shortlist.len(),
            best = shortlist.first().map(|c| c.lexical_score).unwrap_or(0.0),
            "lexical scoring done"
        );

        shortlist
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FaqEntry] {
        &self.entries
    }

    pub fn normalized_question(&self, position: usize) -> Option<&str> {
        self.documents.get(position).map(|d| d.normalized.as_str())
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn contains_question(&self, question: &str) -> bool {
        self.entries.iter().any(|e| e.question == question)
    }
}

fn weigh(tokens: &[&str], vocabulary: &HashMap<String, usize>, idf: &[f32]) -> SparseVector {
    let mut counts: HashMap<usize, f32> = HashMap::new();
    for token in tokens {
        if let Some(&id) = vocabulary.get(*token) {
            *counts.entry(id).or_insert(0.0) += 1.0;
        }
    }

    let mut weights: SparseVector = counts
        .into_iter()
        .map(|(id, count)| (id, count * idf[id]))
        .collect();
    weights.sort_unstable_by_key(|(id, _)| *id);

    let norm = weights.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
    if norm > 0.0 {
        for (_, w) in &mut weights {
            *w /= norm;
        }
    }
    weights
}

/// Dot product of two unit-length sparse vectors, i.e. their cosine.
fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let (mut i, mut j, mut dot) = (0, 0, 0.0f32);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<FaqEntry> {
        vec![
            FaqEntry::new("How do I track my order?", "tracking"),
            FaqEntry::new("How do I reset my password?", "reset"),
            FaqEntry::new("What is your return policy?", "returns"),
            FaqEntry::new("How long does shipping take?", "shipping"),
            FaqEntry::new("Can I change my shipping address?", "address"),
        ]
    }

    #[test]
    fn rejects_empty_corpus() {
        assert!(matches!(
            LexicalIndex::build(Vec::new()),
            Err(FaqError::EmptyCorpus)
        ));
    }

    #[test]
    fn rejects_duplicate_questions() {
        let mut entries = corpus();
        entries.push(FaqEntry::new("How do I track my order?", "again"));
        match LexicalIndex::build(entries) {
            Err(FaqError::DuplicateQuestion(q)) => assert_eq!(q, "How do I track my order?"),
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn verbatim_question_ranks_first_with_unit_score() {
        let index = LexicalIndex::build(corpus()).unwrap();
        let hits = index.score("How do I track my order?", 3);

        assert_eq!(hits[0].entry.question, "How do I track my order?");
        assert_eq!(hits[0].position, 0);
        assert!((hits[0].lexical_score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn returns_min_of_k_and_corpus_size_unique_and_sorted() {
        let index = LexicalIndex::build(corpus()).unwrap();

        for k in [0, 1, 3, 5, 50] {
            let hits = index.score("shipping address change", k);
            assert_eq!(hits.len(), k.min(index.len()));

            let positions: HashSet<usize> = hits.iter().map(|c| c.position).collect();
            assert_eq!(positions.len(), hits.len());

            for pair in hits.windows(2) {
                assert!(pair[0].lexical_score >= pair[1].lexical_score);
            }
        }
    }

    #[test]
    fn shared_term_is_downweighted_relative_to_distinctive_term() {
        let index = LexicalIndex::build(corpus()).unwrap();
        let hits = index.score("shipping address", 2);

        assert_eq!(hits[0].entry.question, "Can I change my shipping address?");
        assert_eq!(hits[1].entry.question, "How long does shipping take?");
    }

    #[test]
    fn out_of_vocabulary_query_scores_zero_in_corpus_order() {
        let index = LexicalIndex::build(corpus()).unwrap();
        let hits = index.score("quantum chromodynamics", 3);

        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|c| c.lexical_score == 0.0));
        let positions: Vec<usize> = hits.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn query_normalization_matches_corpus_normalization() {
        let index = LexicalIndex::build(corpus()).unwrap();
        let plain = index.score("how do i reset my password", 1);
        let shouty = index.score("HOW DO I RESET MY PASSWORD!!!", 1);

        assert_eq!(plain[0].position, shouty[0].position);
        assert_eq!(plain[0].lexical_score, shouty[0].lexical_score);
        assert_eq!(index.normalized_question(1), Some("how do i reset my password"));
    }

    #[test]
    fn stop_word_only_corpus_builds_with_empty_vocabulary() {
        let index = LexicalIndex::build(vec![FaqEntry::new("How?", "a"), FaqEntry::new("Why?", "b")])
            .unwrap();
        assert_eq!(index.vocabulary_size(), 0);
        assert!(index.score("how", 2).iter().all(|c| c.lexical_score == 0.0));
    }
}
