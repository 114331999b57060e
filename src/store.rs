//! Record-store collaborator: append-only usage logs and versioned prompt
//! templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One usage log entry, appended after every successful dispatch that
/// reported usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Store-assigned record identifier.
    pub id: String,
    /// Provider that served the request.
    pub provider: String,
    /// Operation name.
    pub method: String,
    /// Token/cost metadata as reported by the provider.
    pub usage: Map<String, Value>,
    /// Free-form metadata (e.g. redacted options).
    pub meta: Map<String, Value>,
    /// Append timestamp.
    pub recorded_at: DateTime<Utc>,
}

/// A versioned prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name; versions share a name.
    pub name: String,
    /// Monotonically increasing version, starting at 1.
    pub version: u32,
    /// Template body with `{key}` placeholders.
    pub content: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Inactive versions are skipped by lookups.
    pub active: bool,
}

/// Append-only usage writes plus read-by-name-and-version prompt templates.
pub trait RecordStore: Send + Sync {
    /// Append a usage record.
    fn append_usage(&self, record: UsageRecord);

    /// Store a new version of `name`, auto-incrementing from the highest
    /// existing version.
    fn create_prompt(&self, name: &str, content: &str, tags: Vec<String>) -> PromptTemplate;

    /// The highest-versioned active template for `name`, if any.
    fn latest_prompt(&self, name: &str) -> Option<PromptTemplate>;
}

/// In-memory reference implementation of [`RecordStore`].
#[derive(Default)]
pub struct MemoryRecordStore {
    usage: Mutex<Vec<UsageRecord>>,
    prompts: Mutex<HashMap<String, Vec<PromptTemplate>>>,
}

impl MemoryRecordStore {
    /// Fresh empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all appended usage records, oldest first.
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage.lock().unwrap().clone()
    }
}

impl RecordStore for MemoryRecordStore {
    fn append_usage(&self, record: UsageRecord) {
        self.usage.lock().unwrap().push(record);
    }

    fn create_prompt(&self, name: &str, content: &str, tags: Vec<String>) -> PromptTemplate {
        let mut prompts = self.prompts.lock().unwrap();
        let versions = prompts.entry(name.to_string()).or_default();
        let next = versions.iter().map(|t| t.version).max().unwrap_or(0) + 1;
        let template = PromptTemplate {
            name: name.to_string(),
            version: next,
            content: content.to_string(),
            tags,
            active: true,
        };
        versions.push(template.clone());
        template
    }

    fn latest_prompt(&self, name: &str) -> Option<PromptTemplate> {
        let prompts = self.prompts.lock().unwrap();
        prompts
            .get(name)?
            .iter()
            .filter(|t| t.active)
            .max_by_key(|t| t.version)
            .cloned()
    }
}

/// Store-backed prompt registry with `{key}` substitution.
pub struct PromptRegistry {
    store: Arc<dyn RecordStore>,
}

impl PromptRegistry {
    /// Wrap a record store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Store a new version of `name`.
    pub fn create(&self, name: &str, content: &str, tags: Vec<String>) -> PromptTemplate {
        self.store.create_prompt(name, content, tags)
    }

    /// The latest active version of `name`.
    pub fn latest(&self, name: &str) -> Option<PromptTemplate> {
        self.store.latest_prompt(name)
    }

    /// Render the latest version of `name`, substituting `{key}`
    /// placeholders. Unknown templates render to the empty string.
    pub fn render(&self, name: &str, vars: &HashMap<String, String>) -> String {
        let Some(template) = self.latest(name) else {
            return String::new();
        };
        render_template(&template.content, vars)
    }
}

/// Substitute `{key}` placeholders in a template body.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut content = template.to_string();
    for (key, value) in vars {
        content = content.replace(&format!("{{{}}}", key), value);
    }
    content
}
