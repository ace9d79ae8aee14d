use std::collections::HashMap;
use uuid::Uuid;

/// BM25 parameters.
const K1: f32 = 1.2;
const B: f32 = 0.75;

/// A BM25 inverted index over pre-tokenized shape signatures.
///
/// Used as the candidate generator for similarity queries: it narrows the
/// pattern log to documents sharing rare tokens with the query before the
/// exact set similarity is computed.
#[derive(Debug, Clone, Default)]
pub struct SignatureIndex {
    /// term -> (pattern_id -> term_frequency)
    postings: HashMap<String, HashMap<Uuid, f32>>,
    doc_lengths: HashMap<Uuid, f32>,
    avg_doc_length: f32,
}

impl SignatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a pattern's tokens. Re-adding an id replaces its entry.
    pub fn add(&mut self, id: Uuid, tokens: &[String]) {
        self.remove(id);

        let mut term_freq: HashMap<&str, f32> = HashMap::new();
        for token in tokens {
            *term_freq.entry(token.as_str()).or_insert(0.0) += 1.0;
        }
        for (term, freq) in term_freq {
            self.postings
                .entry(term.to_string())
                .or_default()
                .insert(id, freq);
        }

        self.doc_lengths.insert(id, tokens.len() as f32);
        self.recompute_avg_doc_length();
    }

    pub fn remove(&mut self, id: Uuid) {
        if self.doc_lengths.remove(&id).is_none() {
            return;
        }
        self.postings.retain(|_, docs| {
            docs.remove(&id);
            !docs.is_empty()
        });
        self.recompute_avg_doc_length();
    }

    /// Up to `top_k` ids sorted by descending BM25 score.
    ///
    /// ```text
    /// score = Σ IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl / avgdl))
    /// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1.0)
    /// ```
    pub fn search(&self, query: &[String], top_k: usize) -> Vec<(Uuid, f32)> {
        if self.doc_lengths.is_empty() || query.is_empty() {
            return Vec::new();
        }

        let n = self.doc_lengths.len() as f32;
        let avgdl = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };
        let mut scores: HashMap<Uuid, f32> = HashMap::new();

        for token in query {
            let Some(docs) = self.postings.get(token) else {
                continue;
            };
            let df = docs.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (&id, &tf) in docs {
                let dl = self.doc_lengths.get(&id).copied().unwrap_or(0.0);
                let term_score = idf * tf * (K1 + 1.0) / (tf + K1 * (1.0 - B + B * dl / avgdl));
                *scores.entry(id).or_insert(0.0) += term_score;
            }
        }

        let mut results: Vec<(Uuid, f32)> = scores.into_iter().collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    pub fn len(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lengths.is_empty()
    }

    fn recompute_avg_doc_length(&mut self) {
        self.avg_doc_length = if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.doc_lengths.values().sum::<f32>() / self.doc_lengths.len() as f32
        };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_search_ranks_closer_shapes_first() {
        let mut index = SignatureIndex::new();
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        index.add(close, &toks("@task draft launch post"));
        index.add(far, &toks("@task audit invoices quarterly"));

        let results = index.search(&toks("@task draft post"), 10);
        assert_eq!(results[0].0, close);
    }

    #[test]
    fn test_readd_replaces_and_remove_cleans_up() {
        let mut index = SignatureIndex::new();
        let id = Uuid::new_v4();
        index.add(id, &toks("alpha beta"));
        index.add(id, &toks("gamma"));
        assert_eq!(index.len(), 1);
        assert!(index.search(&toks("alpha"), 5).is_empty());
        assert_eq!(index.search(&toks("gamma"), 5).len(), 1);

        index.remove(id);
        assert!(index.is_empty());
        assert!(index.search(&toks("gamma"), 5).is_empty());
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let mut index = SignatureIndex::new();
        index.add(Uuid::new_v4(), &toks("alpha"));
        assert!(index.search(&[], 5).is_empty());
    }
}
