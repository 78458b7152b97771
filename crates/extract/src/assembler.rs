use serde_json::json;
use std::collections::BTreeMap;

use crate::extractor::Extraction;
use crate::schema::{AnalysisResult, MaturityEntry, ReconciledSourceList, Strategy};
use crate::trace::{Stage, Tracer};

pub const WAM_YEARS: &str = "wam_years";
pub const WAM_MONTHS: &str = "wam_months";
pub const TOTAL_PRINCIPAL: &str = "total_principal";
pub const MATURITY_COUNT: &str = "maturity_count";
pub const REPORTED_WAM_YEARS: &str = "reported_wam_years";

/// Principal-weighted mean maturity: `Σ(years·principal) / Σ(principal)`.
///
/// `None` when there are no pairs, when any weight is negative or not finite, when all
/// weights are zero, or when the sums overflow. A computed WAM of `0.0` years is a real value, not an absence.
pub fn weighted_average_maturity(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }
    if pairs
        .iter()
        .any(|&(years, principal)| !years.is_finite() || !principal.is_finite() || principal < 0.0)
    {
        return None;
    }

    let total: f64 = pairs.iter().map(|&(_, principal)| principal).sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let weighted: f64 = pairs.iter().map(|&(years, principal)| years * principal).sum();
    let wam = weighted / total;
    wam.is_finite().then_some(wam)
}

/// Inputs of one assembly, all borrowed: the result gets its own copies.
pub struct Assembly<'a> {
    pub identifier: &'a str,
    pub extraction: &'a Extraction,
    pub sources: &'a ReconciledSourceList,
    pub raw_response: &'a str,
    /// Error reported by the upstream model call, if it failed.
    pub upstream_error: Option<&'a str>,
}

impl Assembly<'_> {
    pub fn assemble(&self, tracer: &Tracer<'_>) -> AnalysisResult {
        let fallback_source = self.sources.first_url();

        let attributes: BTreeMap<_, _> = self
            .extraction
            .attributes
            .iter()
            .map(|(key, attr)| {
                let attr = if attr.source.is_none() {
                    attr.clone().with_source(fallback_source.map(str::to_string))
                } else {
                    attr.clone()
                };
                (key.clone(), attr)
            })
            .collect();

        let maturities = self.maturity_schedule();
        let derived_metrics = self.derived_metrics(&maturities);

        let error = match self.upstream_error {
            Some(e) => Some(format!("model call failed: {e}")),
            None if self.extraction.strategy == Strategy::None && attributes.is_empty() => Some(
                "no attributes could be extracted from the model response: \
                 no usable JSON object and no matching labelled lines"
                    .to_string(),
            ),
            None => None,
        };

        tracer.emit(
            Stage::ResultAssembled,
            json!({
                "attributes": attributes.len(),
                "sources": self.sources.len(),
                "derived_metrics": derived_metrics.keys().collect::<Vec<_>>(),
                "strategy": self.extraction.strategy.as_str(),
                "error": error.is_some(),
            }),
        );

        AnalysisResult {
            identifier: self.identifier.to_string(),
            attributes,
            sources: self.sources.clone(),
            derived_metrics,
            raw_response: self.raw_response.to_string(),
            error,
            strategy: self.extraction.strategy,
            maturities,
        }
    }

    /// Schedule rows from the response's `maturities` array, or failing that from any
    /// extracted attribute whose value is a list of maturity records.
    fn maturity_schedule(&self) -> Vec<MaturityEntry> {
        if !self.extraction.maturities.is_empty() {
            return self.extraction.maturities.clone();
        }
        self.extraction
            .attributes
            .values()
            .flat_map(|attr| MaturityEntry::list_from_json(&attr.value.as_json()))
            .collect()
    }

    fn derived_metrics(&self, maturities: &[MaturityEntry]) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();

        let pairs: Vec<(f64, f64)> = maturities.iter().filter_map(MaturityEntry::weight_pair).collect();
        if let Some(wam) = weighted_average_maturity(&pairs) {
            metrics.insert(WAM_YEARS.to_string(), wam);
            metrics.insert(WAM_MONTHS.to_string(), wam * 12.0);
            metrics.insert(
                TOTAL_PRINCIPAL.to_string(),
                pairs.iter().map(|&(_, principal)| principal).sum(),
            );
            metrics.insert(MATURITY_COUNT.to_string(), pairs.len() as f64);
        } else if !pairs.is_empty() {
            tracing::debug!(pairs = pairs.len(), "maturity weights not usable, WAM omitted");
        }

        if let Some(reported) = self.extraction.reported_wam_years {
            metrics.insert(REPORTED_WAM_YEARS.to_string(), reported);
        }

        metrics
    }
}
