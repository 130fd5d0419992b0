//! Weighted synthesis of fetched knowledge
//!
//! Retained sources are tiered by confidence and assembled into a
//! deterministic markdown report; disagreement between sources is
//! flagged by a word-overlap heuristic rather than semantic analysis.

use crate::knowledge::{
    ApiFetchResult, Contradiction, SynthesisMetadata, SynthesisResult,
};
use std::collections::HashSet;

/// Tokens this short are too common to signal agreement.
const MIN_OVERLAP_TOKEN_LEN: usize = 4;
/// Below this similarity two sources are considered contradictory.
const CONTRADICTION_THRESHOLD: f64 = 0.3;

/// Confidence tier shown next to each retained source.
pub fn weight_label(confidence: f64) -> &'static str {
    if confidence > 0.7 {
        "High"
    } else if confidence > 0.5 {
        "Medium"
    } else {
        "Low"
    }
}

/// Word-overlap similarity between two bodies of text:
/// `|common tokens| / max(|tokens_a|, |tokens_b|)` over tokens longer
/// than three characters. Empty token sets compare as fully similar so
/// they never register as contradictions.
pub fn word_overlap_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = overlap_tokens(a);
    let tokens_b = overlap_tokens(b);
    let denominator = tokens_a.len().max(tokens_b.len());
    if denominator == 0 {
        return 1.0;
    }
    let common = tokens_a.intersection(&tokens_b).count();
    common as f64 / denominator as f64
}

fn overlap_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_ascii_lowercase)
        .filter(|t| t.len() >= MIN_OVERLAP_TOKEN_LEN)
        .collect()
}

/// Assemble the final synthesis from all per-source results.
pub fn synthesize(
    objective: &str,
    results: &[ApiFetchResult],
    confidence_threshold: f64,
    processing_time_ms: u64,
) -> SynthesisResult {
    let total = results.len();
    let successful = results.iter().filter(|r| r.success).count();
    let kept: Vec<&ApiFetchResult> = results
        .iter()
        .filter(|r| r.success && r.confidence >= confidence_threshold && !r.data.is_empty())
        .collect();

    if kept.is_empty() {
        return fallback_synthesis(objective, results, successful, processing_time_ms);
    }

    let avg_confidence =
        kept.iter().map(|r| r.confidence).sum::<f64>() / kept.len() as f64;
    let overall_confidence =
        (avg_confidence * kept.len() as f64 / total as f64).min(1.0);

    let contradictions = detect_contradictions(&kept);
    let sources_used: Vec<String> = kept.iter().map(|r| r.source.clone()).collect();

    let mut report = String::new();
    report.push_str(&format!("# Knowledge Synthesis: {objective}\n\n"));
    report.push_str(&format!(
        "## Sources ({} of {} responses retained)\n\n",
        kept.len(),
        total
    ));
    for result in &kept {
        report.push_str(&format!(
            "### {} — {} confidence ({:.2})\n\n{}\n\n",
            result.source,
            weight_label(result.confidence),
            result.confidence,
            result.data.trim()
        ));
    }

    report.push_str("## Quality Assessment\n\n");
    report.push_str(&format!("- Sources used: {}\n", sources_used.join(", ")));
    report.push_str(&format!("- Average confidence: {avg_confidence:.2}\n"));
    report.push_str(&format!("- Overall confidence: {overall_confidence:.2}\n"));
    if contradictions.is_empty() {
        report.push_str("- Contradictions: none detected\n");
    } else {
        report.push_str(&format!(
            "- Contradictions: {}\n",
            contradictions
                .iter()
                .map(|c| format!("{} vs {} (similarity {:.2})", c.source_a, c.source_b, c.similarity))
                .collect::<Vec<_>>()
                .join("; ")
        ));
    }

    SynthesisResult {
        synthesized_content: report,
        overall_confidence,
        sources_used,
        contradictions,
        metadata: SynthesisMetadata {
            total,
            successful,
            avg_confidence,
            processing_time_ms,
        },
    }
}

fn fallback_synthesis(
    objective: &str,
    results: &[ApiFetchResult],
    successful: usize,
    processing_time_ms: u64,
) -> SynthesisResult {
    let mut report = String::new();
    report.push_str(&format!("# Knowledge Synthesis: {objective}\n\n"));
    report.push_str("No source passed validation; automated synthesis is empty.\n\n");
    if !results.is_empty() {
        report.push_str("## Attempted sources\n\n");
        for result in results {
            report.push_str(&format!(
                "- {}: {}\n",
                result.source,
                result.error.as_deref().unwrap_or("below confidence threshold")
            ));
        }
    }

    SynthesisResult {
        synthesized_content: report,
        overall_confidence: 0.0,
        sources_used: Vec::new(),
        contradictions: Vec::new(),
        metadata: SynthesisMetadata {
            total: results.len(),
            successful,
            avg_confidence: 0.0,
            processing_time_ms,
        },
    }
}

fn detect_contradictions(kept: &[&ApiFetchResult]) -> Vec<Contradiction> {
    let mut contradictions = Vec::new();
    for (i, a) in kept.iter().enumerate() {
        for b in &kept[i + 1..] {
            let similarity = word_overlap_similarity(&a.data, &b.data);
            if similarity < CONTRADICTION_THRESHOLD {
                contradictions.push(Contradiction {
                    source_a: a.source.clone(),
                    source_b: b.source.clone(),
                    similarity,
                });
            }
        }
    }
    contradictions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_result(source: &str, data: &str, confidence: f64) -> ApiFetchResult {
        ApiFetchResult {
            source: source.to_string(),
            data: data.to_string(),
            confidence,
            success: true,
            duration_ms: 200,
            error: None,
        }
    }

    #[test]
    fn weight_tiers_match_the_boundaries() {
        assert_eq!(weight_label(0.71), "High");
        assert_eq!(weight_label(0.7), "Medium");
        assert_eq!(weight_label(0.51), "Medium");
        assert_eq!(weight_label(0.5), "Low");
        assert_eq!(weight_label(0.2), "Low");
    }

    #[test]
    fn similarity_counts_only_meaningful_tokens() {
        let a = "cats sleep sixteen hours every single day";
        let b = "cats sleep sixteen hours every single day";
        assert!((word_overlap_similarity(a, b) - 1.0).abs() < f64::EPSILON);

        let c = "quantum chromodynamics governs strong interactions";
        assert!(word_overlap_similarity(a, c) < 0.3);
        assert!((word_overlap_similarity("", "") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn report_labels_sources_by_tier() {
        let results = vec![
            ok_result("alpha.example", "alpha shares plenty of feline wisdom today", 0.9),
            ok_result("beta.example", "alpha shares plenty of feline wisdom today", 0.6),
            ok_result("gamma.example", "alpha shares plenty of feline wisdom today", 0.45),
        ];
        let synthesis = synthesize("cats", &results, 0.4, 10);
        assert!(synthesis.synthesized_content.contains("alpha.example — High confidence"));
        assert!(synthesis.synthesized_content.contains("beta.example — Medium confidence"));
        assert!(synthesis.synthesized_content.contains("gamma.example — Low confidence"));
        assert!(synthesis.contradictions.is_empty());
    }

    #[test]
    fn disagreeing_sources_are_flagged() {
        let results = vec![
            ok_result("alpha.example", "cats sleep sixteen hours every single day", 0.9),
            ok_result(
                "beta.example",
                "quantum chromodynamics governs strong nuclear interactions",
                0.8,
            ),
        ];
        let synthesis = synthesize("facts", &results, 0.4, 10);
        assert_eq!(synthesis.contradictions.len(), 1);
        assert_eq!(synthesis.contradictions[0].source_a, "alpha.example");
        assert_eq!(synthesis.contradictions[0].source_b, "beta.example");
    }

    #[test]
    fn overall_confidence_scales_with_kept_ratio() {
        let results = vec![
            ok_result("alpha.example", "useful body of shared content", 0.8),
            ApiFetchResult::failure("beta.example", 100, "http status 500"),
        ];
        let synthesis = synthesize("x", &results, 0.4, 10);
        // avg 0.8 over kept, scaled by 1/2 kept ratio.
        assert!((synthesis.overall_confidence - 0.4).abs() < 1e-9);
        assert_eq!(synthesis.metadata.total, 2);
        assert_eq!(synthesis.metadata.successful, 1);
    }

    #[test]
    fn empty_results_fall_back_with_zero_confidence() {
        let synthesis = synthesize("x", &[], 0.4, 5);
        assert!((synthesis.overall_confidence - 0.0).abs() < f64::EPSILON);
        assert!(synthesis.sources_used.is_empty());
        assert!(synthesis
            .synthesized_content
            .contains("No source passed validation"));
    }

    #[test]
    fn below_threshold_sources_are_dropped() {
        let results = vec![ok_result("alpha.example", "body text here", 0.2)];
        let synthesis = synthesize("x", &results, 0.4, 5);
        assert!(synthesis.sources_used.is_empty());
        assert!((synthesis.overall_confidence - 0.0).abs() < f64::EPSILON);
    }
}
