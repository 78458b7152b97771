use crate::attributes::AttributeSchema;
use crate::schema::SearchResult;

/// JSON skeleton the model is asked to fill. Keys come from the schema, so the extractor
/// can look for exactly these names.
fn json_skeleton(identifier: &str, schema: &AttributeSchema) -> String {
    let fields: Vec<String> = schema
        .keys()
        .map(|key| {
            format!(
                r#"    "{}": {{"value": "...", "source": "...", "confidence": "high/medium/low"}}"#,
                key
            )
        })
        .collect();

    format!(
        r#"{{
  "cusip": "{}",
  "attributes": {{
{}
  }},
  "maturities": [
    {{"date": "YYYY-MM-DD", "years_to_maturity": 0.0, "principal_amount": 0.0, "source": "..."}}
  ],
  "sources": ["list of all source URLs used"]
}}"#,
        identifier,
        fields.join(",\n")
    )
}

fn attribute_list(schema: &AttributeSchema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| f.display.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn search_context(results: &[SearchResult]) -> String {
    let mut context = String::from(
        "\n## Search Results Provided:\n\nHere are relevant search results to help you extract the information:\n\n",
    );
    for (i, result) in results.iter().enumerate() {
        context.push_str(&format!("{}. **{}**\n", i + 1, result.title));
        context.push_str(&format!("   URL: {}\n", result.url));
        if let Some(snippet) = &result.snippet {
            context.push_str(&format!("   Snippet: {}\n", snippet));
        }
        context.push('\n');
    }
    context.push_str(
        "Use these search results to extract the requested information. Cite the specific URLs in your response.\n",
    );
    context
}

/// Prompt for a search-grounded attribute query.
///
/// With `search_results` the model is told to work from the provided results; without, it
/// is told to search the web itself.
pub fn build_query_prompt(
    identifier: &str,
    schema: &AttributeSchema,
    search_results: &[SearchResult],
) -> String {
    let skeleton = json_skeleton(identifier, schema);
    let attributes = attribute_list(schema);

    if search_results.is_empty() {
        format!(
            r#"You are a financial data expert. Search the web for comprehensive information about the following CUSIP security.

CUSIP: {identifier}

Please search for and extract the following information for this CUSIP:
{attributes}

INSTRUCTIONS:
1. Search reliable financial data sources (FINRA, SEC, Bloomberg, Reuters, bond marketplaces, etc.)
2. Look for PDF documents, official filings, prospectuses, and fact sheets that may contain this information
3. Extract each requested attribute with its specific value
4. For maturity-related attributes:
   - If multiple maturities exist, extract ALL of them into "maturities"
   - Include maturity dates, years to maturity and corresponding principal amounts
   - Calculate WAM if requested: WAM = Σ(Maturity_i × Principal_i) / Σ(Principal_i)
5. Provide specific values with units (e.g., "5.25%", "$1,000,000", "2030-12-15")
6. Cite the exact source URL or document name for each piece of information

Format your response as a JSON object with the requested attributes:
{skeleton}

RULES:
- Only include the attributes that were requested
- If you cannot find information for an attribute, set value to "Not Available" and explain why in the source field
- If you find information in PDF documents, include the PDF URL in sources"#
        )
    } else {
        let context = search_context(search_results);
        format!(
            r#"You are a financial data expert. Extract comprehensive information about the following CUSIP security from the search results provided below.

CUSIP: {identifier}

Please extract the following information for this CUSIP:
{attributes}
{context}
INSTRUCTIONS:
1. Analyze the search results provided above
2. Extract each requested attribute with its specific value from the search results
3. For maturity-related attributes:
   - If multiple maturities exist, extract ALL of them into "maturities"
   - Include maturity dates, years to maturity and corresponding principal amounts
   - Calculate WAM if requested: WAM = Σ(Maturity_i × Principal_i) / Σ(Principal_i)
4. Provide specific values with units (e.g., "5.25%", "$1,000,000", "2030-12-15")
5. Cite the exact source URL from the search results for each piece of information

Format your response as a JSON object with the requested attributes:
{skeleton}

RULES:
- Only include the attributes that were requested
- If you cannot find information for an attribute in the search results, set value to "Not Available" and explain why in the source field
- Always cite specific URLs from the search results provided"#
        )
    }
}

/// Query string for the external search call.
pub fn build_search_query(identifier: &str, schema: &AttributeSchema) -> String {
    let mut query = format!("CUSIP {}", identifier);
    for field in schema.fields() {
        query.push(' ');
        query.push_str(&field.display);
    }
    query
}
