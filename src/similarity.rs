//! Embedding vector math for the recommendation operation.

use crate::api::Response;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One ranked recommendation: a candidate item and its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// The candidate text, verbatim.
    pub item: String,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f64,
}

/// The full result of a recommend call.
///
/// Carries the ranked list together with the usage metadata and opaque
/// payload of the underlying embeddings response, so cost accounting
/// survives the composite call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendResponse {
    /// Ranked candidates, best first.
    pub recommendations: Vec<Recommendation>,
    /// Token/cost metadata reported by the embeddings call.
    pub usage: Map<String, Value>,
    /// Opaque provider payload of the embeddings response.
    pub raw: Value,
}

impl RecommendResponse {
    /// The generic-response rendition: the ranked list lands under
    /// `raw.recommendations`, where [`crate::dto::TypedResponse::project`]
    /// picks it up for the typed shape.
    pub fn into_response(self) -> Response {
        Response {
            raw: json!({
                "recommendations": self.recommendations,
                "raw": self.raw,
            }),
            usage: self.usage,
            ..Response::default()
        }
    }
}

/// Extract plain `f64` vectors from provider embedding payloads.
///
/// Providers return either bare arrays of numbers or `{embedding: [...]}`
/// envelopes; both shapes normalize to the same vector. Anything else
/// normalizes to an empty vector rather than failing the whole request.
pub fn normalize_embeddings(values: &[Value]) -> Vec<Vec<f64>> {
    values.iter().map(normalize_one).collect()
}

fn normalize_one(value: &Value) -> Vec<f64> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("embedding") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    items.iter().filter_map(Value::as_f64).collect()
}

/// Cosine similarity over the common prefix of `a` and `b`.
///
/// Vectors of unequal length are compared up to the shorter length instead of
/// being rejected. Returns 0.0 when either norm is zero.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for i in 0..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score `candidates` against `query` and return `(index, score)` pairs in
/// stable descending score order.
pub fn rank_by_similarity(query: &[f64], candidates: &[Vec<f64>]) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| (i, cosine_similarity(query, candidate)))
        .collect();
    // sort_by is stable: ties keep input order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}
