use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::normalizer::normalize_key;

/// One requested attribute: the schema key and the phrase the caller used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeField {
    pub key: String,
    pub display: String,
}

/// Ordered, deduplicated set of requested attributes.
///
/// Shared by the prompt builder (what to ask for) and the extractor (what to look for).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    fields: Vec<AttributeField>,
}

impl AttributeSchema {
    /// Build a schema from display names. On key collisions the first name wins.
    pub fn build<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();

        for name in names {
            let display = name.as_ref().trim();
            let key = normalize_key(display);
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            fields.push(AttributeField {
                key,
                display: display.to_string(),
            });
        }

        Self { fields }
    }

    /// Attributes requested when the caller does not name any.
    pub fn default_attributes() -> Vec<String> {
        [
            "maturity date",
            "weighted average maturity (WAM)",
            "coupon rate",
            "yield",
            "credit rating",
            "issuer name",
            "security type",
            "par value",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Attributes needed to compute a weighted average maturity.
    pub fn wam_only() -> Vec<String> {
        [
            "weighted average maturity (WAM)",
            "maturity dates",
            "principal amounts",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn fields(&self) -> &[AttributeField] {
        &self.fields
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&AttributeField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_first_occurrence_order() {
        let schema = AttributeSchema::build(["Coupon Rate", "issuer", "coupon  rate", "Yield"]);
        let keys: Vec<&str> = schema.keys().collect();
        assert_eq!(keys, vec!["coupon_rate", "issuer", "yield"]);
        assert_eq!(schema.get("coupon_rate").unwrap().display, "Coupon Rate");
    }

    #[test]
    fn test_empty_request_is_empty_schema() {
        let schema = AttributeSchema::build(Vec::<String>::new());
        assert!(schema.is_empty());
        assert_eq!(schema.keys().count(), 0);
    }

    #[test]
    fn test_blank_names_are_skipped() {
        let schema = AttributeSchema::build(["", "  ", "--", "par value"]);
        assert_eq!(schema.len(), 1);
        assert!(schema.contains("par_value"));
    }

    #[test]
    fn test_no_duplicate_keys_for_arbitrary_phrasing() {
        let names = [
            "Yield to Maturity",
            "yield-to-maturity",
            "YIELD TO MATURITY",
            "yield_to_maturity",
            "credit rating",
            "Credit Rating!",
        ];
        let schema = AttributeSchema::build(names);
        let keys: Vec<&str> = schema.keys().collect();
        assert_eq!(keys, vec!["yield_to_maturity", "credit_rating"]);
    }

    #[test]
    fn test_non_ascii_names_are_distinct_keys() {
        let schema = AttributeSchema::build(["利率", "Émetteur", "Ämetteur", "émetteur"]);
        let keys: Vec<&str> = schema.keys().collect();
        assert_eq!(keys, vec!["利率", "émetteur", "ämetteur"]);
        assert_eq!(schema.get("利率").unwrap().display, "利率");
    }

    #[test]
    fn test_presets() {
        let defaults = AttributeSchema::build(AttributeSchema::default_attributes());
        assert_eq!(defaults.len(), 8);
        assert!(defaults.contains("weighted_average_maturity_wam"));

        let wam = AttributeSchema::build(AttributeSchema::wam_only());
        assert_eq!(
            wam.keys().collect::<Vec<_>>(),
            vec!["weighted_average_maturity_wam", "maturity_dates", "principal_amounts"]
        );
    }
}
