// Score aggregation and thresholding
// Top class is always labelled; any class at or above its threshold is too

use crate::classify::label_space::{LabelSpace, LabelSpaceError};
use crate::classify::types::{ClassDecision, InferenceResult};

/// Index of the highest score, first on ties
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

/// Per-class decision breakdown for a probability vector
pub fn decide(scores: &[f32], space: &LabelSpace) -> Result<Vec<ClassDecision>, LabelSpaceError> {
    if scores.len() != space.len() {
        return Err(LabelSpaceError::ScoreLength {
            expected: space.len(),
            found: scores.len(),
        });
    }

    let top = argmax(scores);

    let decisions = space
        .classes()
        .iter()
        .zip(space.thresholds())
        .zip(scores)
        .enumerate()
        .map(|(i, ((code, &threshold), &score))| {
            let by_argmax = top == Some(i);
            let by_threshold = score - threshold >= 0.0;
            // Sum of both rules, clamped to 1
            let votes = by_argmax as u8 + by_threshold as u8;
            ClassDecision {
                code: code.clone(),
                score,
                threshold,
                by_argmax,
                by_threshold,
                label: votes.min(1),
            }
        })
        .collect();

    Ok(decisions)
}

/// Turn ensemble probabilities into labels aligned with the taxonomy
pub fn aggregate(scores: &[f32], space: &LabelSpace) -> Result<InferenceResult, LabelSpaceError> {
    let decisions = decide(scores, space)?;
    Ok(InferenceResult {
        labels: decisions.iter().map(|d| d.label).collect(),
        scores: scores.to_vec(),
        classes: space.classes().to_vec(),
    })
}
