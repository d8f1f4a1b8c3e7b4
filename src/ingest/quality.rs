// src/ingest/quality.rs
use super::normalize::{has_letter_or_cjk, is_all_upper, longest_char_run};

/// Multiplicative quality score of normalized text, clamped to [0,1].
pub fn quality_score(text: &str) -> f64 {
    let len = text.chars().count();
    let mut score: f64 = 1.0;

    if len < 10 {
        score *= 0.3;
    } else if len < 20 {
        score *= 0.6;
    } else if len > 2000 {
        score *= 0.8;
    }

    if !has_letter_or_cjk(text) {
        score *= 0.2;
    }

    // six or more of the same char in a row
    if longest_char_run(text) >= 6 {
        score *= 0.5;
    }

    if len > 20 && is_all_upper(text) {
        score *= 0.7;
    }

    score.clamp(0.0, 1.0)
}
