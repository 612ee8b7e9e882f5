//! Gap-based result cutoff.
//!
//! Scored hits are cut at a natural cluster boundary instead of a fixed
//! score threshold: among the drops between consecutive scores at or past
//! the minimum result count, the largest drop of at least `min_gap` wins
//! (first occurrence on ties), and everything below it is treated as tail
//! noise. With no qualifying drop the list is simply capped at
//! `max_results`.

use crate::types::RankedHit;

/// Never cut below this many results when more are available
pub const DEFAULT_MIN_RESULTS: usize = 3;
/// Hard ceiling regardless of score shape
pub const DEFAULT_MAX_RESULTS: usize = 10;
/// Smallest consecutive-score drop treated as a cluster boundary
pub const DEFAULT_MIN_GAP: f32 = 0.15;

/// Bounds clamping the adaptive gap threshold
const ADAPTIVE_GAP_FLOOR: f32 = 0.05;
const ADAPTIVE_GAP_CEIL: f32 = 0.3;

/// Gaps below this are omitted from [`ScoreStats`]
const STATS_GAP_FLOOR: f32 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct RankerParams {
    pub min_results: usize,
    pub max_results: usize,
    pub min_gap: f32,
}

impl Default for RankerParams {
    fn default() -> Self {
        Self {
            min_results: DEFAULT_MIN_RESULTS,
            max_results: DEFAULT_MAX_RESULTS,
            min_gap: DEFAULT_MIN_GAP,
        }
    }
}

/// Where and why the cut landed
#[derive(Debug, Clone, Copy)]
pub struct CutDecision {
    /// Number of results kept
    pub cut_index: usize,
    /// Whether a qualifying gap drove the cut (false means count limits did)
    pub gap_found: bool,
    /// Largest consecutive drop anywhere in the score list
    pub largest_gap: f32,
    /// Top score minus bottom score
    pub spread: f32,
}

/// Decide the cut for scores sorted descending.
///
/// Candidate positions start at `min_results`; among candidates with a drop
/// of at least `min_gap` the largest drop wins, strict comparison keeping
/// the first occurrence on ties. The cut never exceeds `max_results` and
/// never goes below `min(min_results, len)`.
pub fn plan_cut(scores: &[f32], params: RankerParams) -> CutDecision {
    let spread = match (scores.first(), scores.last()) {
        (Some(first), Some(last)) => first - last,
        _ => 0.0,
    };
    let mut largest_gap: f32 = 0.0;
    for window in scores.windows(2) {
        largest_gap = largest_gap.max(window[0] - window[1]);
    }

    let floor = scores.len().min(params.min_results);
    let ceiling = scores.len().min(params.max_results);
    if scores.len() <= params.min_results {
        return CutDecision {
            cut_index: scores.len(),
            gap_found: false,
            largest_gap,
            spread,
        };
    }

    let mut best: Option<(usize, f32)> = None;
    for i in params.min_results..scores.len() {
        let gap = scores[i - 1] - scores[i];
        if gap < params.min_gap {
            continue;
        }
        match best {
            Some((_, best_gap)) if gap <= best_gap => {}
            _ => best = Some((i, gap)),
        }
    }

    match best {
        Some((index, _)) => CutDecision {
            cut_index: index.clamp(floor, ceiling),
            gap_found: true,
            largest_gap,
            spread,
        },
        None => CutDecision {
            cut_index: ceiling.max(floor),
            gap_found: false,
            largest_gap,
            spread,
        },
    }
}

/// Truncate hits at the gap cutoff, re-sorting descending first.
pub fn cut(mut hits: Vec<RankedHit>, params: RankerParams) -> Vec<RankedHit> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
    let decision = plan_cut(&scores, params);
    hits.truncate(decision.cut_index);
    hits
}

/// Cut with a gap threshold scaled by score spread.
///
/// A wide spread means the tail is already far from the head, so a larger
/// drop is required to count as a boundary; a tight cluster lowers the bar.
/// The scaled threshold is clamped to [0.05, 0.3].
pub fn cut_adaptive(mut hits: Vec<RankedHit>, params: RankerParams) -> Vec<RankedHit> {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    let spread = match (hits.first(), hits.last()) {
        (Some(first), Some(last)) => first.score - last.score,
        _ => 0.0,
    };
    let adaptive = RankerParams {
        min_gap: adaptive_gap(params.min_gap, spread),
        ..params
    };
    let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
    let decision = plan_cut(&scores, adaptive);
    hits.truncate(decision.cut_index);
    hits
}

pub fn adaptive_gap(min_gap: f32, spread: f32) -> f32 {
    (min_gap * (1.0 + spread * 0.5)).clamp(ADAPTIVE_GAP_FLOOR, ADAPTIVE_GAP_CEIL)
}

/// Diagnostic score statistics, independent of cutting
#[derive(Debug, Clone, Default)]
pub struct ScoreStats {
    pub count: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub median: f32,
    /// (position, size) of every consecutive drop of at least 0.1
    pub gaps: Vec<(usize, f32)>,
}

pub fn analyze(scores: &[f32]) -> ScoreStats {
    if scores.is_empty() {
        return ScoreStats::default();
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let count = sorted.len();
    let mean = sorted.iter().sum::<f32>() / count as f32;
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };
    let gaps = sorted
        .windows(2)
        .enumerate()
        .filter_map(|(i, w)| {
            let gap = w[0] - w[1];
            (gap >= STATS_GAP_FLOOR).then_some((i + 1, gap))
        })
        .collect();

    ScoreStats {
        count,
        min: sorted[count - 1],
        max: sorted[0],
        mean,
        median,
        gaps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn hits(scores: &[f32]) -> Vec<RankedHit> {
        scores
            .iter()
            .map(|&score| RankedHit {
                score,
                collection: "Test".to_string(),
                properties: Map::new(),
            })
            .collect()
    }

    fn params(min_results: usize, max_results: usize, min_gap: f32) -> RankerParams {
        RankerParams {
            min_results,
            max_results,
            min_gap,
        }
    }

    #[test]
    fn test_cut_at_qualifying_gap() {
        let decision = plan_cut(&[0.9, 0.85, 0.5, 0.45], params(2, 10, 0.15));
        assert_eq!(decision.cut_index, 2);
        assert!(decision.gap_found);
        assert!((decision.largest_gap - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_largest_gap_wins_over_first() {
        // Both drops qualify; the later, larger one decides the cut
        let decision = plan_cut(&[0.9, 0.72, 0.7, 0.3, 0.28], params(1, 10, 0.15));
        assert_eq!(decision.cut_index, 3);
        assert!(decision.gap_found);
    }

    #[test]
    fn test_ties_keep_first_occurrence() {
        let decision = plan_cut(&[0.9, 0.7, 0.68, 0.48, 0.46], params(1, 10, 0.15));
        assert_eq!(decision.cut_index, 1);
    }

    #[test]
    fn test_no_gap_falls_back_to_max_results() {
        let decision = plan_cut(&[0.9, 0.88, 0.86, 0.84, 0.82], params(1, 3, 0.15));
        assert_eq!(decision.cut_index, 3);
        assert!(!decision.gap_found);
    }

    #[test]
    fn test_gap_before_min_results_is_ignored() {
        // Huge drop after the first hit, but the floor guarantees three
        let decision = plan_cut(&[0.95, 0.4, 0.38, 0.36], params(3, 10, 0.15));
        assert_eq!(decision.cut_index, 4);
        assert!(!decision.gap_found);
    }

    #[test]
    fn test_fewer_hits_than_floor_returned_whole() {
        let decision = plan_cut(&[0.9, 0.8], RankerParams::default());
        assert_eq!(decision.cut_index, 2);
        assert!(!decision.gap_found);
    }

    #[test]
    fn test_gap_cut_clamped_to_max_results() {
        let mut scores = vec![0.9; 12];
        scores.push(0.3);
        let decision = plan_cut(&scores, params(3, 10, 0.15));
        assert_eq!(decision.cut_index, DEFAULT_MAX_RESULTS);
    }

    #[test]
    fn test_empty_scores() {
        let decision = plan_cut(&[], RankerParams::default());
        assert_eq!(decision.cut_index, 0);
        assert_eq!(decision.spread, 0.0);
    }

    #[test]
    fn test_cut_resorts_and_truncates() {
        let result = cut(hits(&[0.5, 0.9, 0.45, 0.85]), params(2, 10, 0.15));
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.85);
    }

    #[test]
    fn test_adaptive_gap_scaling() {
        // Tight cluster: threshold stays near the base
        assert!((adaptive_gap(0.15, 0.1) - 0.1575).abs() < 1e-6);
        // Wide spread raises the bar
        assert!((adaptive_gap(0.15, 1.0) - 0.225).abs() < 1e-6);
        // Clamped at both ends
        assert_eq!(adaptive_gap(0.01, 0.0), 0.05);
        assert_eq!(adaptive_gap(0.5, 2.0), 0.3);
    }

    #[test]
    fn test_adaptive_cut_requires_bigger_gap_on_wide_spread() {
        // Spread 0.8 scales the threshold to 0.21, so the 0.18 drop no
        // longer qualifies and the 0.52 drop decides instead
        let scores = [0.95, 0.9, 0.72, 0.2, 0.15];
        let fixed = cut(hits(&scores), params(2, 10, 0.2));
        assert_eq!(fixed.len(), 3);

        let adaptive = cut_adaptive(hits(&scores), params(2, 10, 0.15));
        assert_eq!(adaptive.len(), 3);
    }

    #[test]
    fn test_analyze_reports_stats_and_gaps() {
        let stats = analyze(&[0.9, 0.85, 0.5, 0.45]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.max, 0.9);
        assert_eq!(stats.min, 0.45);
        assert!((stats.mean - 0.675).abs() < 1e-6);
        assert!((stats.median - 0.675).abs() < 1e-6);
        assert_eq!(stats.gaps.len(), 1);
        assert_eq!(stats.gaps[0].0, 2);
        assert!((stats.gaps[0].1 - 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_analyze_empty() {
        let stats = analyze(&[]);
        assert_eq!(stats.count, 0);
        assert!(stats.gaps.is_empty());
    }
}
