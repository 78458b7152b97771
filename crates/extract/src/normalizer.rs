use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use url::Url;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Alphabetic}\p{N}]+").expect("valid regex"));

/// Normalize an attribute name into a schema key: lowercase, every run of whitespace or
/// punctuation collapsed to a single `_`, no leading or trailing `_`.
///
/// `"Weighted Average Maturity (WAM)"` becomes `weighted_average_maturity_wam`. Letters and
/// digits of any script are kept.
pub fn normalize_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Identity of a URL for deduplication: scheme and host lowercased, path without trailing
/// slash, query pairs sorted, fragment dropped.
///
/// Returns `None` for anything that is not an absolute http(s) URL with a host.
pub fn normalize_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();

    let mut key = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        key.push_str(&format!(":{port}"));
    }
    key.push_str(parsed.path().trim_end_matches('/'));

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.is_empty() {
        pairs.sort();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter())
            .finish();
        key.push('?');
        key.push_str(&query);
    }

    Some(key)
}

/// True when `raw` can serve as a source attribution.
pub fn is_url(raw: &str) -> bool {
    normalize_url(raw).is_some()
}

/// Read a number the way models write them: `1000000`, `"1,000,000"`, `"$1,000,000"`,
/// `"4.5%"`, `"3.2 years"`.
pub fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
                .chars()
                .filter(|c| !matches!(c, ',' | '$' | '%' | ' '))
                .collect();
            cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}
