//! Nearest vocabulary token for visual embeddings.
//!
//! [`EmbeddingNeighborLookup`] scores every query row against every token
//! embedding by raw inner product (no normalization) and picks the highest
//! scoring token. On exact ties the lowest token id wins. With the `rayon`
//! feature enabled, query rows are scored in parallel.

use ndarray::{Array2, ArrayView1, ArrayView2};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::error::PipelineError;

/// Token embedding table with its parallel token-string table.
#[derive(Debug, Clone)]
pub struct EmbeddingNeighborLookup {
    token_embeddings: Array2<f32>,
    tokens: Vec<String>,
}

impl EmbeddingNeighborLookup {
    /// Build a lookup. Row `i` of `token_embeddings` is the embedding of
    /// `tokens[i]`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DimensionMismatch`] if the tables differ in length or
    /// the vocabulary is empty.
    pub fn new(token_embeddings: Array2<f32>, tokens: Vec<String>) -> Result<Self, PipelineError> {
        if tokens.is_empty() || token_embeddings.nrows() != tokens.len() {
            return Err(PipelineError::DimensionMismatch {
                what: "token table".to_string(),
                expected: token_embeddings.nrows(),
                actual: tokens.len(),
            });
        }
        Ok(Self {
            token_embeddings,
            tokens,
        })
    }

    /// Width of every token embedding.
    pub fn dimension(&self) -> usize {
        self.token_embeddings.ncols()
    }

    /// Vocabulary size.
    pub fn vocabulary_size(&self) -> usize {
        self.tokens.len()
    }

    /// The nearest token for each row of `queries`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::DimensionMismatch`] if the query width differs from
    /// the token embedding width.
    pub fn find_neighbors_for(&self, queries: ArrayView2<'_, f32>) -> Result<Vec<String>, PipelineError> {
        if queries.ncols() != self.dimension() {
            return Err(PipelineError::DimensionMismatch {
                what: "query embeddings".to_string(),
                expected: self.dimension(),
                actual: queries.ncols(),
            });
        }

        let rows: Vec<ArrayView1<'_, f32>> = queries.rows().into_iter().collect();

        #[cfg(feature = "rayon")]
        let indices: Vec<usize> = rows.par_iter().map(|query| self.best_token(query)).collect();
        #[cfg(not(feature = "rayon"))]
        let indices: Vec<usize> = rows.iter().map(|query| self.best_token(query)).collect();

        Ok(indices
            .into_iter()
            .map(|index| self.tokens[index].clone())
            .collect())
    }

    /// Index of the first token row with the maximal inner product.
    fn best_token(&self, query: &ArrayView1<'_, f32>) -> usize {
        let mut best_index = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (index, token) in self.token_embeddings.rows().into_iter().enumerate() {
            let score = token.dot(query);
            if score > best_score {
                best_index = index;
                best_score = score;
            }
        }
        best_index
    }
}
