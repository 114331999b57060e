//! Typed projections of the generic [`Response`].

use crate::api::{Operation, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A [`Response`] narrowed to the payload shape of its operation.
///
/// Built on demand when the `dto` option (or the config default) asks for a
/// typed result; the generic response remains the canonical cached form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypedResponse {
    /// Text-bearing operations: text, chat, summarize.
    Text {
        /// Generated text.
        content: String,
        /// Tool invocations requested by the model, if any.
        tool_calls: Option<Vec<Value>>,
        /// Opaque provider payload.
        raw: Value,
        /// Token/cost metadata.
        usage: Map<String, Value>,
    },
    /// Image generation.
    Image {
        /// Generated images.
        images: Vec<Value>,
    },
    /// Embedding generation.
    Embeddings {
        /// Embedding vectors or envelopes, one per input.
        embeddings: Vec<Value>,
    },
    /// Image understanding.
    Vision {
        /// Generated description.
        content: String,
    },
    /// Audio transcription.
    Transcribe {
        /// Transcribed text.
        text: String,
    },
    /// Speech synthesis.
    Speak {
        /// Encoded audio payload.
        audio: Option<String>,
        /// Audio container format.
        format: Option<String>,
    },
    /// Similarity-ranked recommendations.
    Recommend {
        /// `{item, score}` objects, best first.
        recommendations: Vec<Value>,
    },
    /// Operations without a dedicated shape.
    Other {
        /// Opaque provider payload.
        raw: Value,
        /// Token/cost metadata.
        usage: Map<String, Value>,
    },
}

impl TypedResponse {
    /// Project a generic response into the typed shape for `op`. Missing
    /// payload fields project to their empty form rather than failing.
    pub fn project(op: Operation, response: Response) -> Self {
        match op {
            Operation::Text | Operation::Chat | Operation::Summarize | Operation::SummarizeFile => {
                Self::Text {
                    content: response.content.unwrap_or_default(),
                    tool_calls: response.tool_calls,
                    raw: response.raw,
                    usage: response.usage,
                }
            }
            Operation::Image => Self::Image {
                images: response.images.unwrap_or_default(),
            },
            Operation::Embeddings | Operation::EmbeddingsFile => Self::Embeddings {
                embeddings: response.embeddings.unwrap_or_default(),
            },
            Operation::Vision => Self::Vision {
                content: response.content.unwrap_or_default(),
            },
            Operation::Transcribe => Self::Transcribe {
                text: response.text.unwrap_or_default(),
            },
            Operation::Speak => Self::Speak {
                audio: response.audio,
                format: response.format,
            },
            Operation::Recommend => Self::Recommend {
                recommendations: response
                    .raw
                    .get("recommendations")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            },
            Operation::StreamText | Operation::StreamChat => Self::Other {
                raw: response.raw,
                usage: response.usage,
            },
        }
    }

    /// Rebuild the generic response carrying this projection's payload.
    pub fn into_response(self) -> Response {
        match self {
            Self::Text {
                content,
                tool_calls,
                raw,
                usage,
            } => Response {
                content: Some(content),
                tool_calls,
                raw,
                usage,
                ..Response::default()
            },
            Self::Image { images } => Response {
                images: Some(images),
                ..Response::default()
            },
            Self::Embeddings { embeddings } => Response {
                embeddings: Some(embeddings),
                ..Response::default()
            },
            Self::Vision { content } => Response {
                content: Some(content),
                ..Response::default()
            },
            Self::Transcribe { text } => Response {
                text: Some(text),
                ..Response::default()
            },
            Self::Speak { audio, format } => Response {
                audio,
                format,
                ..Response::default()
            },
            Self::Recommend { recommendations } => Response {
                raw: json!({ "recommendations": recommendations }),
                ..Response::default()
            },
            Self::Other { raw, usage } => Response {
                raw,
                usage,
                ..Response::default()
            },
        }
    }
}
