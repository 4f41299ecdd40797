//! Maximal marginal relevance selection.
//!
//! `score = λ·sim(query, doc) - (1-λ)·max(sim(doc, selected))`
//!
//! λ = 1.0 ranks by relevance only, λ = 0.0 by diversity only.

use std::cmp::Ordering;

pub const DEFAULT_LAMBDA: f32 = 0.5;
pub const DEFAULT_FETCH_MULTIPLIER: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct MmrConfig {
    pub lambda: f32,
    /// Candidates fetched per requested result.
    pub fetch_multiplier: usize,
}

impl Default for MmrConfig {
    fn default() -> Self {
        Self {
            lambda: DEFAULT_LAMBDA,
            fetch_multiplier: DEFAULT_FETCH_MULTIPLIER,
        }
    }
}

impl MmrConfig {
    pub fn new(lambda: f32, fetch_multiplier: usize) -> Self {
        Self {
            lambda: lambda.clamp(0.0, 1.0),
            fetch_multiplier: fetch_multiplier.max(1),
        }
    }

    pub fn fetch_count(&self, k: usize) -> usize {
        k.saturating_mul(self.fetch_multiplier)
    }
}

/// Cosine similarity; 0.0 when either side has zero magnitude or the
/// dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = magnitude(a);
    let norm_b = magnitude(b);
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Pick up to `k` candidates balancing relevance against redundancy.
///
/// Returned items are in selection order. Ties go to the earlier candidate,
/// so callers should pass candidates sorted by relevance.
pub fn mmr_select<T>(query: &[f32], candidates: Vec<(T, Vec<f32>)>, k: usize, lambda: f32) -> Vec<T> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }
    let k = k.min(candidates.len());

    let mut remaining: Vec<(T, Vec<f32>, f32)> = candidates
        .into_iter()
        .map(|(item, vector)| {
            let relevance = cosine_similarity(query, &vector);
            (item, vector, relevance)
        })
        .collect();
    let mut selected_vectors: Vec<Vec<f32>> = Vec::with_capacity(k);
    let mut selected = Vec::with_capacity(k);

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (idx, (_, vector, relevance)) in remaining.iter().enumerate() {
            let redundancy = selected_vectors
                .iter()
                .map(|s| cosine_similarity(vector, s))
                .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
                .unwrap_or(0.0);
            let score = lambda * relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }
        let (item, vector, _) = remaining.remove(best_idx);
        selected_vectors.push(vector);
        selected.push(item);
    }
    selected
}
