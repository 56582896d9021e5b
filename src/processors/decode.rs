//! Greedy CTC decoding of recognizer logits.
//!
//! The recognizer emits one class distribution per timestep; decoding
//! collapses that sequence by dropping blanks (class 0) and merging
//! immediately repeated symbols, then averages the surviving peak
//! probabilities into a confidence score.

use crate::core::Tensor3D;
use ndarray::ArrayView2;

/// A decoded text line with its confidence.
#[derive(Debug, Clone, Default)]
pub struct TextPrediction {
    /// Decoded string; empty when every timestep collapsed away.
    pub text: String,
    /// Mean probability of the emitted timesteps, `0.0` if none emitted.
    pub score: f32,
}

/// CTC decoder over a fixed symbol table.
///
/// The runtime table is `[""] + dictionary lines + [" "]`: index 0 is the
/// reserved blank and the appended space matches the recognizer's
/// training-time class layout.
#[derive(Debug, Clone)]
pub struct CtcDecoder {
    symbols: Vec<String>,
    blank_index: usize,
}

impl CtcDecoder {
    /// Builds the decoder from dictionary lines (one symbol per line, no
    /// header, no implicit blank).
    pub fn new(dict_lines: &[String]) -> Self {
        let mut symbols = Vec::with_capacity(dict_lines.len() + 2);
        symbols.push(String::new());
        symbols.extend(dict_lines.iter().cloned());
        symbols.push(" ".to_string());
        Self {
            symbols,
            blank_index: 0,
        }
    }

    /// Number of classes the recognizer must emit per timestep.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Decodes one `[timesteps, classes]` logit matrix.
    pub fn decode_sequence(&self, logits: ArrayView2<'_, f32>) -> TextPrediction {
        let mut text = String::new();
        let mut probs: Vec<f32> = Vec::new();
        // Sentinel: nothing collapses against the first timestep.
        let mut prev: Option<usize> = None;

        for row in logits.outer_iter() {
            let Some((idx, &prob)) = row
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            else {
                continue;
            };

            let emit = idx != self.blank_index && prev != Some(idx);
            if emit {
                if let Some(symbol) = self.symbols.get(idx) {
                    text.push_str(symbol);
                    probs.push(prob);
                }
            }
            // Repeats only merge across *consecutive* timesteps, so the
            // previous class updates on blanks too.
            prev = Some(idx);
        }

        let score = if probs.is_empty() {
            0.0
        } else {
            probs.iter().sum::<f32>() / probs.len() as f32
        };

        TextPrediction { text, score }
    }

    /// Decodes every sequence of a `[batch, timesteps, classes]` tensor.
    pub fn apply(&self, preds: &Tensor3D) -> Vec<TextPrediction> {
        (0..preds.shape()[0])
            .map(|n| self.decode_sequence(preds.index_axis(ndarray::Axis(0), n)))
            .collect()
    }
}
