//! Resolve a search-grounded model answer about a security into a structured result.
//!
//! The core is synchronous and pure per call: [`resolve`] takes the model text, the requested
//! attribute schema and the channel-tagged citations, and always produces an
//! [`AnalysisResult`]. [`Analyzer`] is the async shell that fetches those inputs
//! (web search, prompt, Gemini call) before handing them to the core.

pub mod assembler;
pub mod attributes;
pub mod extractor;
pub mod heuristic;
pub mod json_scan;
pub mod llm;
pub mod normalizer;
pub mod prompt;
pub mod schema;
pub mod search;
pub mod sources;
pub mod trace;

pub use attributes::{AttributeField, AttributeSchema};
pub use extractor::{Extraction, StructuredExtractor};
pub use llm::GeminiClient;
pub use schema::{
    AnalysisResult, AttributeValue, Channel, Citation, Confidence, ExtractedAttribute,
    MaturityEntry, ModelResponse, ReconciledSourceList, SearchResult, Strategy,
};
pub use search::CustomSearchClient;
pub use trace::{FnSink, MemorySink, NoopSink, Stage, TraceRecord, TraceSink, Tracer};

use anyhow::Result;
use serde_json::json;

use crate::assembler::Assembly;

/// Caller contract violations. Model misbehaviour is never reported this way.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("identifier must not be empty")]
    EmptyIdentifier,
}

/// Inputs of one resolution.
pub struct ResolveRequest<'a> {
    pub identifier: &'a str,
    pub schema: &'a AttributeSchema,
    pub response: &'a ModelResponse,
    /// Results of the external search call; may be empty.
    pub search_results: &'a [SearchResult],
}

/// Run extraction, source reconciliation and assembly, reporting to `sink`.
pub fn resolve(
    request: &ResolveRequest<'_>,
    sink: &dyn TraceSink,
) -> Result<AnalysisResult, ResolveError> {
    resolve_traced(request, &Tracer::new(sink))
}

/// Same as [`resolve`], continuing an existing trace sequence.
pub fn resolve_traced(
    request: &ResolveRequest<'_>,
    tracer: &Tracer<'_>,
) -> Result<AnalysisResult, ResolveError> {
    let identifier = request.identifier.trim();
    if identifier.is_empty() {
        return Err(ResolveError::EmptyIdentifier);
    }

    tracer.emit(
        Stage::SchemaBuilt,
        json!({ "keys": request.schema.keys().collect::<Vec<_>>() }),
    );

    let extraction = StructuredExtractor::new(request.schema).extract(&request.response.text, tracer);
    tracer.emit(
        Stage::ExtractionComplete,
        json!({
            "strategy": extraction.strategy.as_str(),
            "attributes": extraction.attributes.len(),
        }),
    );

    let mut candidates = request.response.grounding_results();
    candidates.extend(request.search_results.iter().cloned());
    candidates.extend(sources::tag_urls(
        extraction.cited_sources.iter().cloned(),
        Channel::ResponseCitation,
    ));
    let reconciliation = sources::reconcile(&candidates, tracer);

    let result = Assembly {
        identifier,
        extraction: &extraction,
        sources: &reconciliation.sources,
        raw_response: &request.response.text,
        upstream_error: request.response.error.as_deref(),
    }
    .assemble(tracer);

    tracing::debug!(
        identifier,
        strategy = extraction.strategy.as_str(),
        attributes = result.attributes.len(),
        sources = result.sources.len(),
        "response resolved"
    );

    Ok(result)
}

/// Search → prompt → Gemini → resolve, for one identifier at a time.
#[derive(Clone)]
pub struct Analyzer {
    llm_client: GeminiClient,
    search_client: Option<CustomSearchClient>,
}

impl Analyzer {
    pub fn new(llm_client: GeminiClient) -> Self {
        Self {
            llm_client,
            search_client: None,
        }
    }

    /// Fetch external search results first and put them in the prompt.
    pub fn with_search(mut self, search_client: CustomSearchClient) -> Self {
        self.search_client = Some(search_client);
        self
    }

    pub fn uses_custom_search(&self) -> bool {
        self.search_client.is_some()
    }

    pub fn model(&self) -> &str {
        self.llm_client.model()
    }

    /// Analyze `identifier`. `attributes = None` asks for the default attribute set; an
    /// explicit empty list is respected.
    pub async fn analyze(
        &self,
        identifier: &str,
        attributes: Option<&[String]>,
        sink: &dyn TraceSink,
    ) -> Result<AnalysisResult> {
        let identifier = identifier.trim().to_uppercase();
        if identifier.is_empty() {
            return Err(ResolveError::EmptyIdentifier.into());
        }

        let names = match attributes {
            Some(names) => names.to_vec(),
            None => AttributeSchema::default_attributes(),
        };
        let schema = AttributeSchema::build(&names);
        let tracer = Tracer::new(sink);

        tracing::info!(
            identifier = %identifier,
            attributes = schema.len(),
            custom_search = self.uses_custom_search(),
            "starting analysis"
        );

        let search_results = match &self.search_client {
            Some(client) => {
                let query = prompt::build_search_query(&identifier, &schema);
                let results = client.search(&query, search::MAX_RESULTS).await;
                tracer.emit(
                    Stage::SearchComplete,
                    json!({ "query": query, "results": results.len() }),
                );
                results
            }
            None => Vec::new(),
        };

        let prompt = prompt::build_query_prompt(&identifier, &schema, &search_results);
        tracer.emit(
            Stage::PromptBuilt,
            json!({ "chars": prompt.chars().count(), "search_results": search_results.len() }),
        );

        let response = match self.llm_client.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(identifier = %identifier, error = %e, "model call failed");
                ModelResponse::failed(format!("{e:#}"))
            }
        };
        tracer.emit(
            Stage::ModelResponse,
            json!({
                "chars": response.text.chars().count(),
                "grounding": response.grounding.len(),
                "error": response.error,
            }),
        );

        let result = resolve_traced(
            &ResolveRequest {
                identifier: &identifier,
                schema: &schema,
                response: &response,
                search_results: &search_results,
            },
            &tracer,
        )?;

        tracing::info!(
            identifier = %identifier,
            strategy = result.strategy.as_str(),
            attributes = result.attributes.len(),
            sources = result.sources.len(),
            "analysis complete"
        );

        Ok(result)
    }

    /// Analyze with the weighted-average-maturity preset.
    pub async fn analyze_wam(
        &self,
        identifier: &str,
        sink: &dyn TraceSink,
    ) -> Result<AnalysisResult> {
        let names = AttributeSchema::wam_only();
        self.analyze(identifier, Some(&names), sink).await
    }
}
