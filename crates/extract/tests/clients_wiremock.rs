use extract::{
    Analyzer, Channel, CustomSearchClient, GeminiClient, MemorySink, NoopSink, Stage, Strategy,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn gemini_body(text: &str, uris: &[&str]) -> serde_json::Value {
    let chunks: Vec<_> = uris
        .iter()
        .map(|uri| json!({"web": {"uri": uri, "title": "grounding"}}))
        .collect();
    json!({
        "candidates": [{
            "content": {"parts": [{"text": text}], "role": "model"},
            "groundingMetadata": {"groundingChunks": chunks}
        }]
    })
}

fn gemini(server: &MockServer) -> GeminiClient {
    GeminiClient::with_base_url(server.uri(), "test-key".into(), "gemini-2.0-flash".into())
}

#[tokio::test]
async fn gemini_returns_text_and_grounding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(query_param("key", "test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(gemini_body("{\"yield\": \"4%\"}", &["https://g.example/1"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = gemini(&server).generate("prompt").await.unwrap();
    assert_eq!(response.text, "{\"yield\": \"4%\"}");
    assert_eq!(response.grounding.len(), 1);
    assert_eq!(response.grounding[0].url, "https://g.example/1");
}

#[tokio::test]
async fn gemini_error_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .expect(1)
        .mount(&server)
        .await;

    let err = gemini(&server).generate("prompt").await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("429"), "{message}");
    assert!(message.contains("quota exceeded"), "{message}");
}

#[tokio::test]
async fn custom_search_maps_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .and(query_param("cx", "engine"))
        .and(query_param("num", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "searchInformation": {"totalResults": "2", "searchTime": 0.1},
            "items": [
                {"title": "FINRA", "link": "https://finra.example/bond", "snippet": "coupon 4%"},
                {"title": "no link", "link": ""}
            ]
        })))
        .mount(&server)
        .await;

    let client = CustomSearchClient::with_base_url(server.uri(), "key".into(), "engine".into());
    let results = client.search("CUSIP 912828Z29", 25).await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].channel, Channel::ExternalSearch);
    assert_eq!(results[0].snippet.as_deref(), Some("coupon 4%"));
}

#[tokio::test]
async fn custom_search_failure_degrades_to_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = CustomSearchClient::with_base_url(server.uri(), "key".into(), "engine".into());
    assert!(client.search("anything", 10).await.is_empty());
}

#[tokio::test]
async fn analyzer_end_to_end_with_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"title": "Search hit", "link": "https://search.example/hit", "snippet": "s"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_body(
            "Sure! {\"attributes\": {\"coupon_rate\": {\"value\": \"4.125%\", \"confidence\": \"high\"}}}",
            &["https://grounding.example/a"],
        )))
        .mount(&server)
        .await;

    let search = CustomSearchClient::with_base_url(server.uri(), "key".into(), "engine".into());
    let analyzer = Analyzer::new(gemini(&server)).with_search(search);
    let names = vec!["coupon rate".to_string()];
    let sink = MemorySink::new();

    let result = analyzer
        .analyze(" 912828z29 ", Some(&names), &sink)
        .await
        .unwrap();

    assert_eq!(result.identifier, "912828Z29");
    assert_eq!(result.strategy, Strategy::Structured);
    assert_eq!(
        result.attributes["coupon_rate"].source.as_deref(),
        Some("https://grounding.example/a")
    );
    let urls: Vec<&str> = result.sources.urls().collect();
    assert_eq!(urls, vec!["https://grounding.example/a", "https://search.example/hit"]);

    let stages = sink.stages();
    assert_eq!(&stages[..3], &[Stage::SearchComplete, Stage::PromptBuilt, Stage::ModelResponse]);
    assert_eq!(stages.last(), Some(&Stage::ResultAssembled));
}

#[tokio::test]
async fn analyzer_model_failure_keeps_search_sources() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"title": "Search hit", "link": "https://search.example/hit"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let search = CustomSearchClient::with_base_url(server.uri(), "key".into(), "engine".into());
    let analyzer = Analyzer::new(gemini(&server)).with_search(search);

    let result = analyzer.analyze_wam("912828Z29", &NoopSink).await.unwrap();
    assert!(result.attributes.is_empty());
    assert!(result.error.as_deref().unwrap().contains("503"));
    assert_eq!(result.sources.len(), 1);
}

#[tokio::test]
async fn analyzer_rejects_empty_identifier() {
    let server = MockServer::start().await;
    let analyzer = Analyzer::new(gemini(&server));
    assert!(analyzer.analyze("  ", None, &NoopSink).await.is_err());
}
