/*!
# BM25 chunk retrieval

Lexical ranking of document chunks against a question. Chunks are tokenized
and stemmed once when the index is built.
*/

use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_TOP_K: usize = 3;

pub struct Bm25Index {
    chunks: Vec<String>,
    term_freqs: Vec<HashMap<String, usize>>,
    doc_lens: Vec<usize>,
    doc_freqs: HashMap<String, usize>,
    avg_doc_len: f64,
    stemmer: Stemmer,
    k1: f64,
    b: f64,
}

impl Bm25Index {
    pub fn new(chunks: Vec<String>) -> Self {
        let stemmer = Stemmer::create(Algorithm::English);
        let mut term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_lens = Vec::with_capacity(chunks.len());
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();

        for chunk in &chunks {
            let terms = tokenize_and_stem(&stemmer, chunk);
            doc_lens.push(terms.len());
            let mut freqs = HashMap::new();
            for term in terms {
                *freqs.entry(term).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / doc_lens.len() as f64
        };

        Self {
            chunks,
            term_freqs,
            doc_lens,
            doc_freqs,
            avg_doc_len,
            stemmer,
            k1: 1.2,
            b: 0.75,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Returns up to `top_k` chunks, best first. Ties keep document order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(&str, f64)> {
        if self.chunks.is_empty() {
            return Vec::new();
        }

        let query_terms: HashSet<String> =
            tokenize_and_stem(&self.stemmer, query).into_iter().collect();

        let mut scores: Vec<(usize, f64)> = (0..self.chunks.len())
            .map(|idx| (idx, self.score(&query_terms, idx)))
            .collect();
        scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scores
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| (self.chunks[idx].as_str(), score))
            .collect()
    }

    fn score(&self, query_terms: &HashSet<String>, idx: usize) -> f64 {
        let doc_len = self.doc_lens[idx] as f64;
        let freqs = &self.term_freqs[idx];
        let norm = if self.avg_doc_len > 0.0 {
            doc_len / self.avg_doc_len
        } else {
            0.0
        };

        query_terms
            .iter()
            .map(|term| {
                let tf = *freqs.get(term).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                let idf = self.inverse_document_frequency(term);
                let numerator = tf * (self.k1 + 1.0);
                let denominator = tf + self.k1 * (1.0 - self.b + self.b * norm);
                idf * (numerator / denominator)
            })
            .sum()
    }

    fn inverse_document_frequency(&self, term: &str) -> f64 {
        let n = self.chunks.len() as f64;
        let df = *self.doc_freqs.get(term).unwrap_or(&0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

fn tokenize_and_stem(stemmer: &Stemmer, text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| word.chars().count() > 2)
        .map(|word| stemmer.stem(word).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "Refunds are issued within thirty days of purchase.".to_string(),
            "Shipping takes five business days across the country.".to_string(),
            "The warranty covers manufacturing defects for one year.".to_string(),
            "Contact support by email for refund questions.".to_string(),
        ]
    }

    #[test]
    fn ranks_matching_chunks_first() {
        let index = Bm25Index::new(corpus());
        let results = index.search("What is the refund policy?", 2);

        assert_eq!(results.len(), 2);
        assert!(results[0].0.contains("efund"));
        assert!(results[1].0.contains("efund"));
        assert!(results[0].1 > 0.0);
    }

    #[test]
    fn returns_all_chunks_when_fewer_than_top_k() {
        let index = Bm25Index::new(vec!["Only one chunk here.".to_string()]);
        assert_eq!(index.search("anything", DEFAULT_TOP_K).len(), 1);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = Bm25Index::new(Vec::new());
        assert!(index.is_empty());
        assert!(index.search("refund", 3).is_empty());
    }
}
