use serde_json::json;
use std::collections::HashSet;

use crate::normalizer::normalize_url;
use crate::schema::{Channel, ReconciledSource, ReconciledSourceList, SearchResult};
use crate::trace::{Stage, Tracer};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub sources: ReconciledSourceList,
    /// Entries dropped because their URL could not be parsed.
    pub malformed: usize,
    /// Entries dropped because an earlier entry had the same normalized URL.
    pub duplicates: usize,
}

/// Merge channel-tagged citations into one deduplicated list.
///
/// Channels are concatenated in [`Channel::PRIORITY`] order (stable within a channel), so
/// the order in which the caller hands the results over does not matter.
pub fn reconcile(results: &[SearchResult], tracer: &Tracer<'_>) -> Reconciliation {
    let mut ordered: Vec<&SearchResult> = results.iter().collect();
    ordered.sort_by_key(|r| r.channel.rank());

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    let mut malformed = 0;
    let mut duplicates = 0;

    for result in ordered {
        let Some(key) = normalize_url(&result.url) else {
            malformed += 1;
            continue;
        };
        if !seen.insert(key) {
            duplicates += 1;
            continue;
        }
        entries.push(ReconciledSource {
            url: result.url.trim().to_string(),
            title: result.title.trim().to_string(),
            channel: result.channel,
        });
    }

    let per_channel: serde_json::Map<String, serde_json::Value> = Channel::PRIORITY
        .iter()
        .map(|channel| {
            let count = entries.iter().filter(|e| e.channel == *channel).count();
            (channel.as_str().to_string(), json!(count))
        })
        .collect();

    tracer.emit(
        Stage::SourcesReconciled,
        json!({
            "input": results.len(),
            "kept": entries.len(),
            "malformed": malformed,
            "duplicates": duplicates,
            "per_channel": per_channel,
        }),
    );
    if malformed > 0 {
        tracing::debug!(malformed, "dropped unparsable source URLs");
    }

    Reconciliation {
        sources: ReconciledSourceList::new(entries),
        malformed,
        duplicates,
    }
}

/// Tag plain URLs with a channel.
pub fn tag_urls<I, S>(urls: I, channel: Channel) -> Vec<SearchResult>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    urls.into_iter()
        .map(|url| SearchResult::new(url, "", channel))
        .collect()
}
