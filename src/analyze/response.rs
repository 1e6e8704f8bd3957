// src/analyze/response.rs
//! Partial view of the classification service response.
//!
//! Every field is optional and read once here; a field with an unexpected type is treated
//! as absent instead of failing the whole response. Only a body that is not a JSON object
//! is a protocol error.

use serde::Serialize;
use serde_json::{Map, Value};

use super::label::Label;
use super::AnalysisError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabelScores {
    /// Non-string entries are kept as empty strings so positions still pair with scores.
    pub labels: Option<Vec<String>>,
    pub scores: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClaimReview {
    pub textual_rating: Option<String>,
    pub publisher: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Claim {
    pub text: Option<String>,
    /// Flat rating used by the per-sentence breakdown.
    pub rating: Option<String>,
    pub reviews: Vec<ClaimReview>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClaimBuster {
    pub score: Option<f64>,
    pub verdict: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SentenceAnalysis {
    pub sentence: Option<String>,
    pub google: Vec<Claim>,
    pub claimbuster: Option<ClaimBuster>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisResponse {
    pub summary: Option<String>,
    pub classification: Option<LabelScores>,
    pub huggingface: Option<LabelScores>,
    pub fact_check_claims: Option<Vec<Claim>>,
    pub claimbuster: Option<ClaimBuster>,
    pub detailed_analysis: Vec<SentenceAnalysis>,
}

impl AnalysisResponse {
    pub fn parse(body: &str) -> Result<Self, AnalysisError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| AnalysisError::Protocol(format!("invalid JSON: {e}")))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, AnalysisError> {
        let obj = value
            .as_object()
            .ok_or_else(|| AnalysisError::Protocol("response is not a JSON object".into()))?;

        Ok(Self {
            summary: string_at(obj, "summary"),
            classification: object_at(obj, "classification").map(LabelScores::from_obj),
            huggingface: object_at(obj, "huggingface").map(LabelScores::from_obj),
            fact_check_claims: object_at(obj, "google_fact_check")
                .and_then(|g| array_at(g, "claims"))
                .map(|claims| objects(claims).map(Claim::from_obj).collect()),
            claimbuster: object_at(obj, "claimbuster").map(ClaimBuster::from_obj),
            detailed_analysis: array_at(obj, "detailed_analysis")
                .map(|rows| objects(rows).map(SentenceAnalysis::from_obj).collect())
                .unwrap_or_default(),
        })
    }

    /// Primary label: first entry of `classification.labels`. Without a `classification`
    /// object, `huggingface` is read the same way, then the top-level `summary`.
    pub fn primary_label(&self) -> Label {
        if let Some(c) = &self.classification {
            return c.first_label();
        }
        if let Some(h) = &self.huggingface {
            return h.first_label();
        }
        self.summary
            .as_deref()
            .map(Label::normalize)
            .unwrap_or(Label::Unknown)
    }

    /// Label/score pairs of whichever object produced the primary label.
    pub fn label_scores(&self) -> Option<&LabelScores> {
        self.classification.as_ref().or(self.huggingface.as_ref())
    }
}

impl LabelScores {
    fn from_obj(obj: &Map<String, Value>) -> Self {
        Self {
            labels: array_at(obj, "labels").map(|a| {
                a.iter()
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .collect()
            }),
            scores: array_at(obj, "scores")
                .map(|a| a.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect()),
        }
    }

    pub fn first_label(&self) -> Label {
        self.labels
            .as_ref()
            .and_then(|l| l.first())
            .map(|s| Label::normalize(s))
            .unwrap_or(Label::Unknown)
    }

    /// Pairs labels with scores; a missing score reads as 0.
    pub fn pairs(&self) -> Vec<(String, f64)> {
        let Some(labels) = &self.labels else {
            return Vec::new();
        };
        let scores = self.scores.as_deref().unwrap_or(&[]);
        labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), scores.get(i).copied().unwrap_or(0.0)))
            .collect()
    }
}

impl Claim {
    fn from_obj(obj: &Map<String, Value>) -> Self {
        Self {
            text: string_at(obj, "text"),
            rating: string_at(obj, "rating"),
            reviews: array_at(obj, "claimReview")
                .map(|rs| {
                    objects(rs)
                        .map(|r| ClaimReview {
                            textual_rating: string_at(r, "textualRating"),
                            publisher: object_at(r, "publisher").and_then(|p| string_at(p, "name")),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Rating from the first review, falling back to the flat `rating`.
    pub fn best_rating(&self) -> Option<&str> {
        self.reviews
            .first()
            .and_then(|r| r.textual_rating.as_deref())
            .or(self.rating.as_deref())
    }
}

impl ClaimBuster {
    fn from_obj(obj: &Map<String, Value>) -> Self {
        Self {
            score: obj.get("score").and_then(Value::as_f64),
            verdict: string_at(obj, "verdict"),
        }
    }
}

impl SentenceAnalysis {
    fn from_obj(obj: &Map<String, Value>) -> Self {
        Self {
            sentence: string_at(obj, "sentence"),
            google: array_at(obj, "google")
                .map(|cs| objects(cs).map(Claim::from_obj).collect())
                .unwrap_or_default(),
            claimbuster: object_at(obj, "claimbuster").map(ClaimBuster::from_obj),
        }
    }
}

fn string_at(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn object_at<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}

fn array_at<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Vec<Value>> {
    obj.get(key).and_then(Value::as_array)
}

fn objects<'a>(values: &'a [Value]) -> impl Iterator<Item = &'a Map<String, Value>> + 'a {
    values.iter().filter_map(Value::as_object)
}
