//! Line-oriented fallback used when the response carries no usable JSON.

use regex::Regex;
use std::collections::BTreeMap;

use crate::attributes::{AttributeField, AttributeSchema};
use crate::normalizer::normalize_key;
use crate::schema::{AttributeValue, Confidence, ExtractedAttribute};

/// Extra phrasings for common attributes. `strict` phrases still need a separator after
/// them; `connectors` ("issued by") already carry one.
struct Alias {
    key: &'static str,
    strict: &'static [&'static str],
    connectors: &'static [&'static str],
}

const ALIASES: &[Alias] = &[
    Alias { key: "issuer", strict: &[], connectors: &["issued by"] },
    Alias { key: "issuer_name", strict: &["issuer"], connectors: &["issued by"] },
    Alias { key: "maturity_date", strict: &[], connectors: &["matures on"] },
    Alias { key: "yield", strict: &["ytm"], connectors: &[] },
    Alias { key: "par_value", strict: &["face value"], connectors: &[] },
    Alias { key: "coupon_rate", strict: &["coupon"], connectors: &[] },
    Alias { key: "credit_rating", strict: &["rating"], connectors: &[] },
];

/// Scan `text` line by line for `<phrase><separator><value>` for every schema field.
///
/// Never fails: a field with no matching line is simply absent.
pub fn extract_lines(text: &str, schema: &AttributeSchema) -> BTreeMap<String, ExtractedAttribute> {
    let mut found = BTreeMap::new();

    for field in schema.fields() {
        let Some(pattern) = field_pattern(field) else {
            continue;
        };

        let value = text.lines().find_map(|line| {
            let captures = pattern.captures(line)?;
            let value = clean_value(captures.get(1)?.as_str());
            (!value.is_empty()).then_some(value)
        });

        if let Some(value) = value {
            found.insert(
                field.key.clone(),
                ExtractedAttribute::new(&field.key, AttributeValue::text(value), Confidence::Low),
            );
        }
    }

    found
}

fn field_pattern(field: &AttributeField) -> Option<Regex> {
    let alias = ALIASES.iter().find(|a| a.key == field.key);

    let mut strict = vec![phrase_pattern(&field.display), phrase_pattern(&field.key)];
    let mut connectors = Vec::new();
    if let Some(alias) = alias {
        strict.extend(alias.strict.iter().map(|p| phrase_pattern(p)));
        connectors.extend(alias.connectors.iter().map(|p| phrase_pattern(p)));
    }
    strict.retain(|p| !p.is_empty());
    strict.dedup();
    if strict.is_empty() {
        return None;
    }

    // A dash only separates when spaced off the label, so "Yield-to-maturity" is not "yield".
    let mut head = format!(
        r"(?:{})\)?[*_]*(?:\s*:|\s+[\-–—]|\s+is\b\s*:?)",
        strict.join("|")
    );
    if !connectors.is_empty() {
        head = format!(r"(?:{head}|(?:{})\s*:?\s)", connectors.join("|"));
    }
    let pattern = format!(r"(?i)(?:^|[^\p{{Alphabetic}}\p{{N}}]){head}\s*(.+)$");

    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(key = %field.key, error = %e, "could not build line pattern");
            None
        }
    }
}

/// Words of a phrase, escaped, joined by a loose separator so that "coupon rate",
/// "coupon_rate", "Coupon-Rate" and "weighted average maturity (WAM)" all match.
fn phrase_pattern(phrase: &str) -> String {
    normalize_key(phrase)
        .split('_')
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[\s_\-/()]+")
}

fn clean_value(raw: &str) -> String {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '*' || c == '`')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(names: &[&str]) -> AttributeSchema {
        AttributeSchema::build(names.iter().copied())
    }

    fn value_of(found: &BTreeMap<String, ExtractedAttribute>, key: &str) -> Option<String> {
        found.get(key).and_then(|a| a.value.as_str()).map(str::to_string)
    }

    #[test]
    fn test_colon_separator() {
        let found = extract_lines("Coupon Rate: 4.125%", &schema(&["coupon_rate"]));
        let attr = &found["coupon_rate"];
        assert_eq!(attr.value.as_str(), Some("4.125%"));
        assert_eq!(attr.confidence, Confidence::Low);
        assert_eq!(attr.source, None);
    }

    #[test]
    fn test_dash_and_is_separators() {
        let text = "Summary\nIssuer - Acme Corp\nThe credit rating is AA+\n";
        let found = extract_lines(text, &schema(&["issuer", "credit rating"]));
        assert_eq!(value_of(&found, "issuer").as_deref(), Some("Acme Corp"));
        assert_eq!(value_of(&found, "credit_rating").as_deref(), Some("AA+"));
    }

    #[test]
    fn test_markdown_bullets_and_bold() {
        let text = "- **Maturity Date:** 2030-12-15\n* **Par Value**: $1,000";
        let found = extract_lines(text, &schema(&["maturity date", "par value"]));
        assert_eq!(value_of(&found, "maturity_date").as_deref(), Some("2030-12-15"));
        assert_eq!(value_of(&found, "par_value").as_deref(), Some("$1,000"));
    }

    #[test]
    fn test_parenthetical_display_phrase() {
        let text = "Weighted Average Maturity (WAM): 5.2 years";
        let found = extract_lines(text, &schema(&["weighted average maturity (WAM)"]));
        assert_eq!(
            value_of(&found, "weighted_average_maturity_wam").as_deref(),
            Some("5.2 years")
        );
    }

    #[test]
    fn test_aliases() {
        let text = "The bond was issued by Example Holdings Inc\nIt matures on June 1, 2031";
        let found = extract_lines(text, &schema(&["issuer", "maturity date"]));
        assert_eq!(
            value_of(&found, "issuer").as_deref(),
            Some("Example Holdings Inc")
        );
        assert_eq!(value_of(&found, "maturity_date").as_deref(), Some("June 1, 2031"));
    }

    #[test]
    fn test_phrase_must_be_followed_by_separator() {
        let text = "Yield to maturity: 4.5%";
        let found = extract_lines(text, &schema(&["yield"]));
        assert!(found.is_empty());
    }

    #[test]
    fn test_hyphenated_label_is_not_a_separator() {
        let found = extract_lines("Yield-to-maturity: 4.5%", &schema(&["yield"]));
        assert!(found.is_empty());

        let found = extract_lines("Yield - 4.5%", &schema(&["yield"]));
        assert_eq!(value_of(&found, "yield").as_deref(), Some("4.5%"));
    }

    #[test]
    fn test_is_followed_by_colon() {
        let found = extract_lines("Coupon rate is: 4%", &schema(&["coupon rate"]));
        assert_eq!(value_of(&found, "coupon_rate").as_deref(), Some("4%"));
    }

    #[test]
    fn test_non_ascii_label() {
        let text = "Résumé\nÉmetteur : Société Générale\n利率: 2.5%";
        let found = extract_lines(text, &schema(&["Émetteur", "利率"]));
        assert_eq!(
            value_of(&found, "émetteur").as_deref(),
            Some("Société Générale")
        );
        assert_eq!(value_of(&found, "利率").as_deref(), Some("2.5%"));
    }

    #[test]
    fn test_absent_keys_do_not_fail() {
        let found = extract_lines("nothing useful here", &schema(&["coupon rate", "issuer"]));
        assert!(found.is_empty());

        let found = extract_lines("", &schema(&["coupon rate"]));
        assert!(found.is_empty());
    }

    #[test]
    fn test_empty_value_line_is_skipped() {
        let text = "Coupon Rate:\nCoupon Rate: 3%";
        let found = extract_lines(text, &schema(&["coupon rate"]));
        assert_eq!(value_of(&found, "coupon_rate").as_deref(), Some("3%"));
    }
}
