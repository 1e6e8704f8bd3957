// src/analyze/report.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::label::Label;
use super::response::{AnalysisResponse, Claim, ClaimBuster};

/// Normalized outcome of one remote classification plus everything else the service
/// sent back. Badges only need `label`; the rest is for detail views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub label: Label,
    pub received_at: DateTime<Utc>,
    pub response: AnalysisResponse,
}

impl AnalysisReport {
    pub fn from_response(response: AnalysisResponse) -> Self {
        Self {
            label: response.primary_label(),
            received_at: Utc::now(),
            response,
        }
    }

    /// First fact-check claim: the top-level search result, else the first sentence's.
    pub fn first_claim(&self) -> Option<&Claim> {
        self.response
            .fact_check_claims
            .as_ref()
            .and_then(|c| c.first())
            .or_else(|| {
                self.response
                    .detailed_analysis
                    .first()
                    .and_then(|s| s.google.first())
            })
    }

    pub fn claimbuster(&self) -> Option<&ClaimBuster> {
        self.response.claimbuster.as_ref().or_else(|| {
            self.response
                .detailed_analysis
                .first()
                .and_then(|s| s.claimbuster.as_ref())
        })
    }

    /// Plain-text detail block for the manual "analyze" path.
    pub fn detail_lines(&self) -> Vec<String> {
        let mut out = vec![format!("Verdict: {}", self.label.as_str().to_uppercase())];

        out.push("Classification:".to_string());
        match self.response.label_scores().map(|s| s.pairs()) {
            Some(pairs) if !pairs.is_empty() => {
                for (label, score) in pairs {
                    out.push(format!(" - {label}: {:.2}%", score * 100.0));
                }
            }
            _ => out.push(" - No result".to_string()),
        }

        out.push("Fact check:".to_string());
        match self.first_claim() {
            Some(claim) => {
                out.push(format!(" - Claim: {}", claim.text.as_deref().unwrap_or("No text")));
                out.push(format!("   Rating: {}", claim.best_rating().unwrap_or("N/A")));
                if let Some(review) = claim.reviews.first() {
                    out.push(format!(
                        "   Publisher: {}",
                        review.publisher.as_deref().unwrap_or("Unknown")
                    ));
                }
            }
            None => out.push(" - No claims found.".to_string()),
        }

        out.push("ClaimBuster:".to_string());
        match self.claimbuster() {
            Some(cb) if cb.score.is_some() => {
                out.push(format!(" - Score: {:.2}%", cb.score.unwrap_or(0.0) * 100.0));
                out.push(format!(" - Verdict: {}", cb.verdict.as_deref().unwrap_or("Unknown")));
            }
            _ => out.push(" - No result".to_string()),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(v: serde_json::Value) -> AnalysisReport {
        AnalysisReport::from_response(AnalysisResponse::from_value(&v).expect("object"))
    }

    #[test]
    fn detail_lines_cover_every_section() {
        let r = report(json!({
            "classification": {"labels": ["misinformation", "opinion"], "scores": [0.92, 0.08]},
            "google_fact_check": {"claims": [{"text": "Vaccines cause autism",
                "claimReview": [{"textualRating": "False", "publisher": {"name": "PolitiFact"}}]}]},
            "claimbuster": {"score": 0.81, "verdict": "Highly Checkworthy"}
        }));
        let lines = r.detail_lines();
        assert_eq!(lines[0], "Verdict: MISINFORMATION");
        assert!(lines.contains(&" - misinformation: 92.00%".to_string()));
        assert!(lines.contains(&"   Rating: False".to_string()));
        assert!(lines.contains(&"   Publisher: PolitiFact".to_string()));
        assert!(lines.contains(&" - Score: 81.00%".to_string()));
    }

    #[test]
    fn empty_response_reports_no_results() {
        let lines = report(json!({})).detail_lines();
        assert_eq!(lines[0], "Verdict: UNKNOWN");
        assert!(lines.contains(&" - No result".to_string()));
        assert!(lines.contains(&" - No claims found.".to_string()));
    }

    #[test]
    fn sentence_breakdown_backs_missing_top_level_sections() {
        let r = report(json!({
            "summary": "opinion",
            "detailed_analysis": [{"sentence": "s", "google": [{"rating": "Unproven"}],
                "claimbuster": {"score": 0.5, "verdict": "Somewhat Checkworthy"}}]
        }));
        assert_eq!(r.label, Label::Opinion);
        assert_eq!(r.first_claim().and_then(|c| c.best_rating()), Some("Unproven"));
        assert_eq!(r.claimbuster().and_then(|c| c.verdict.as_deref()), Some("Somewhat Checkworthy"));
    }
}
