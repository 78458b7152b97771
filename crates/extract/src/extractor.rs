use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, VecDeque};

use crate::attributes::AttributeSchema;
use crate::heuristic;
use crate::json_scan::{self, JsonCandidate};
use crate::normalizer::{is_url, lenient_f64, normalize_key};
use crate::schema::{AttributeValue, Confidence, ExtractedAttribute, MaturityEntry, Strategy};
use crate::trace::{Stage, Tracer};

/// How many container levels below the top-level object are searched for schema keys.
const MAX_CONTAINER_DEPTH: usize = 3;

const MATURITY_KEYS: &[&str] = &["maturities", "maturity_schedule"];
const SOURCE_LIST_KEYS: &[&str] = &["sources"];
const REPORTED_WAM_KEYS: &[&str] = &["calculated_wam_years", "wam_years"];

/// Everything the extractor could get out of one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub attributes: BTreeMap<String, ExtractedAttribute>,
    pub strategy: Strategy,
    /// Maturity schedule rows from the response JSON.
    pub maturities: Vec<MaturityEntry>,
    /// URLs the model listed in its own `sources` array.
    pub cited_sources: Vec<String>,
    /// WAM the model computed itself, if it reported one.
    pub reported_wam_years: Option<f64>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

pub struct StructuredExtractor<'a> {
    schema: &'a AttributeSchema,
}

impl<'a> StructuredExtractor<'a> {
    pub fn new(schema: &'a AttributeSchema) -> Self {
        Self { schema }
    }

    /// Run `structured → heuristic → none`. Never fails; the strategy tag records which
    /// pass produced the attributes.
    pub fn extract(&self, text: &str, tracer: &Tracer<'_>) -> Extraction {
        let mut extraction = Extraction::default();

        match json_scan::find_first_object(text) {
            Some(candidate) => {
                self.read_object(&candidate, &mut extraction);
                tracer.emit(
                    Stage::StructuredPass,
                    json!({
                        "found_json": true,
                        "repaired": candidate.repaired,
                        "span": [candidate.span.start, candidate.span.end],
                        "matched_keys": extraction.attributes.len(),
                        "maturities": extraction.maturities.len(),
                    }),
                );
            }
            None => tracer.emit(
                Stage::StructuredPass,
                json!({ "found_json": false, "matched_keys": 0 }),
            ),
        }

        if !extraction.attributes.is_empty() {
            extraction.strategy = Strategy::Structured;
            return extraction;
        }

        extraction.attributes = heuristic::extract_lines(text, self.schema);
        tracer.emit(
            Stage::HeuristicPass,
            json!({ "matched_keys": extraction.attributes.len() }),
        );

        extraction.strategy = if extraction.attributes.is_empty() {
            Strategy::None
        } else {
            Strategy::Heuristic
        };
        extraction
    }

    fn read_object(&self, candidate: &JsonCandidate, extraction: &mut Extraction) {
        let object = &candidate.object;
        extraction.attributes = self.match_keys(object);

        for (key, value) in object {
            let key = normalize_key(key);
            if MATURITY_KEYS.contains(&key.as_str()) && extraction.maturities.is_empty() {
                extraction.maturities = MaturityEntry::list_from_json(value);
            } else if SOURCE_LIST_KEYS.contains(&key.as_str()) && extraction.cited_sources.is_empty()
            {
                extraction.cited_sources = source_list(value);
            } else if REPORTED_WAM_KEYS.contains(&key.as_str())
                && extraction.reported_wam_years.is_none()
            {
                extraction.reported_wam_years = lenient_f64(value);
            }
        }
    }

    /// Top-level keys first, then container objects breadth-first, so a top-level
    /// occurrence always beats a nested one.
    fn match_keys(&self, object: &Map<String, Value>) -> BTreeMap<String, ExtractedAttribute> {
        let mut found = BTreeMap::new();
        let mut queue: VecDeque<(&Map<String, Value>, usize)> = VecDeque::new();
        queue.push_back((object, 0));

        while let Some((map, depth)) = queue.pop_front() {
            for (raw_key, value) in map {
                let key = normalize_key(raw_key);
                if self.schema.contains(&key) {
                    found
                        .entry(key.clone())
                        .or_insert_with(|| to_attribute(&key, value));
                    continue;
                }
                if depth < MAX_CONTAINER_DEPTH {
                    if let Value::Object(inner) = value {
                        if !is_wrapper(inner) {
                            queue.push_back((inner, depth + 1));
                        }
                    }
                }
            }
        }

        found
    }
}

/// An object shaped like `{value, confidence, source}`.
fn is_wrapper(map: &Map<String, Value>) -> bool {
    field(map, "value").is_some()
}

fn field<'m>(map: &'m Map<String, Value>, name: &str) -> Option<&'m Value> {
    map.iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

fn to_attribute(key: &str, value: &Value) -> ExtractedAttribute {
    let Value::Object(map) = value else {
        return ExtractedAttribute::new(key, AttributeValue::from_json(value.clone()), Confidence::Unknown);
    };
    let Some(inner) = field(map, "value") else {
        return ExtractedAttribute::new(key, AttributeValue::Record(map.clone()), Confidence::Unknown);
    };

    let confidence = field(map, "confidence")
        .and_then(Value::as_str)
        .map(Confidence::parse)
        .unwrap_or_default();

    let source_text = field(map, "source")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let (source, note) = match source_text {
        Some(s) if is_url(s) => (Some(s.to_string()), None),
        Some(s) => (None, Some(s.to_string())),
        None => (None, None),
    };

    ExtractedAttribute::new(key, AttributeValue::from_json(inner.clone()), confidence)
        .with_source(source)
        .with_note(note)
}

fn source_list(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => field(map, "url")
                .or_else(|| field(map, "uri"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
