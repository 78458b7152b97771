use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// How sure the model (or the heuristic pass) is about a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl Confidence {
    /// Lenient parse of what a model writes in a `confidence` field.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "medium" | "moderate" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

/// Value of an extracted attribute: either a scalar (anything JSON that is not an object,
/// lists included) or a nested record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Record(Map<String, Value>),
    Scalar(Value),
}

impl AttributeValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar(Value::String(value.into()))
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Record(map),
            other => Self::Scalar(other),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Value {
        match self {
            Self::Record(map) => Value::Object(map.clone()),
            Self::Scalar(value) => value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedAttribute {
    pub name: String,
    pub value: AttributeValue,
    pub confidence: Confidence,
    pub source: Option<String>,
    /// Free text the model put where a source URL was expected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ExtractedAttribute {
    pub fn new(name: impl Into<String>, value: AttributeValue, confidence: Confidence) -> Self {
        Self {
            name: name.into(),
            value,
            confidence,
            source: None,
            note: None,
        }
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

/// Provenance channel of a citation, listed in merge priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// Citations the model reports from its own grounding metadata.
    ModelGrounding,
    /// Results from the external web-search call.
    ExternalSearch,
    /// URLs the model listed in the `sources` array of its JSON answer.
    ResponseCitation,
}

impl Channel {
    /// Fixed merge order used by the source reconciler.
    pub const PRIORITY: [Channel; 3] = [
        Channel::ModelGrounding,
        Channel::ExternalSearch,
        Channel::ResponseCitation,
    ];

    pub fn rank(self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|c| *c == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelGrounding => "model-grounding",
            Self::ExternalSearch => "external-search",
            Self::ResponseCitation => "response-citation",
        }
    }
}

/// A grounding citation as reported by the model: a URL and maybe a display title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// A channel-tagged citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub channel: Channel,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, title: impl Into<String>, channel: Channel) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippet: None,
            channel,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

impl From<Citation> for SearchResult {
    fn from(citation: Citation) -> Self {
        Self {
            url: citation.url,
            title: citation.title.unwrap_or_default(),
            snippet: None,
            channel: Channel::ModelGrounding,
        }
    }
}

/// Raw payload handed back by the LLM client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    pub text: String,
    #[serde(default)]
    pub grounding: Vec<Citation>,
    /// Set when the upstream call failed; `text` is then usually empty.
    #[serde(default)]
    pub error: Option<String>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            grounding: Vec::new(),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            grounding: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn with_grounding(mut self, grounding: Vec<Citation>) -> Self {
        self.grounding = grounding;
        self
    }

    pub fn grounding_results(&self) -> Vec<SearchResult> {
        self.grounding.iter().cloned().map(SearchResult::from).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledSource {
    pub url: String,
    pub title: String,
    pub channel: Channel,
}

/// Distinct source URLs in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReconciledSourceList(Vec<ReconciledSource>);

impl ReconciledSourceList {
    pub fn new(entries: Vec<ReconciledSource>) -> Self {
        Self(entries)
    }

    pub fn first_url(&self) -> Option<&str> {
        self.0.first().map(|s| s.url.as_str())
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.url.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReconciledSource> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One instrument of a maturity schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MaturityEntry {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub years_to_maturity: Option<f64>,
    #[serde(default)]
    pub principal_amount: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

impl MaturityEntry {
    /// Read one schedule row as the model wrote it. Field names vary between answers, so
    /// a few spellings are accepted; numbers may be quoted and formatted.
    pub fn from_json(value: &Value) -> Option<Self> {
        let row = value.as_object()?;
        let field = |names: &[&str]| {
            row.iter()
                .find(|(k, _)| names.contains(&crate::normalizer::normalize_key(k).as_str()))
                .map(|(_, v)| v)
        };
        let text = |names: &[&str]| {
            field(names)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let number = |names: &[&str]| field(names).and_then(crate::normalizer::lenient_f64);

        let entry = Self {
            date: text(&["date", "maturity_date"]),
            years_to_maturity: number(&["years_to_maturity", "years", "maturity_years"]),
            principal_amount: number(&["principal_amount", "principal", "amount"]),
            source: text(&["source", "url"]),
        };

        let empty = entry.date.is_none()
            && entry.years_to_maturity.is_none()
            && entry.principal_amount.is_none();
        (!empty).then_some(entry)
    }

    /// Rows of a JSON array that look like schedule entries.
    pub fn list_from_json(value: &Value) -> Vec<Self> {
        value
            .as_array()
            .map(|rows| rows.iter().filter_map(Self::from_json).collect())
            .unwrap_or_default()
    }

    /// `(years, principal)` when both are present.
    pub fn weight_pair(&self) -> Option<(f64, f64)> {
        Some((self.years_to_maturity?, self.principal_amount?))
    }
}

/// Which extraction strategy produced the attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Structured,
    Heuristic,
    #[default]
    None,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Heuristic => "heuristic",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub identifier: String,
    pub attributes: BTreeMap<String, ExtractedAttribute>,
    pub sources: ReconciledSourceList,
    pub derived_metrics: BTreeMap<String, f64>,
    pub raw_response: String,
    pub error: Option<String>,
    pub strategy: Strategy,
    #[serde(default)]
    pub maturities: Vec<MaturityEntry>,
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        !self.attributes.is_empty() && self.error.is_none()
    }

    pub fn wam_years(&self) -> Option<f64> {
        self.derived_metrics.get(crate::assembler::WAM_YEARS).copied()
    }
}
