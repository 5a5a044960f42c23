//! Prompt templates for every stage of a consultation.
//!
//! All builders are pure: the same inputs always produce byte-identical prompts.
//! Interpolated values are opaque text and are never interpreted here.

use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;

use crate::config::BusinessProfile;
use crate::services::SearchResponse;
use crate::session::{ExtractedValue, FieldSpec, FieldValue, RetrievedCase};

const PERSONA: &str = "You are an experienced strategy consulting case coach from a top-tier firm (McKinsey, Bain, BCG).
Your goal is to help analyze business problems using consulting frameworks and methodologies.";

const DATA_REQUIREMENTS_EXAMPLE: &str = r#"{
    "market_size": {
        "description": "Total market size in USD millions",
        "type": "number",
        "required": true
    },
    "competitor_count": {
        "description": "Number of direct competitors in target market",
        "type": "number",
        "required": true
    }
}"#;

const EXTRACTION_SCHEMA: &str = r#"{
    "found": true/false,
    "value": "Extracted value or null if not found",
    "confidence": "HIGH/MEDIUM/LOW",
    "source": "Excerpt from the context that supports the value",
    "explanation": "Your reasoning for deriving the value"
}"#;

fn pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn context_block(body: &str) -> String {
    format!("<context>\n{body}\n</context>")
}

/// Retrieved cases as a JSON document, or nothing when there are none
fn cases_context(cases: &[RetrievedCase]) -> String {
    if cases.is_empty() {
        return String::new();
    }
    pretty_json(&json!({ "results": cases }))
}

fn business_blurb(business: &BusinessProfile) -> String {
    format!(
        "Context: You're advising {}, {} in the {} industry in {}.",
        business.name, business.description, business.industry, business.location
    )
}

fn preamble(cases: &[RetrievedCase], business: &BusinessProfile) -> String {
    format!(
        "{PERSONA}\n\nBelow are similar cases you can use as reference. Do not make up data values from them:\n{}\n\n{}",
        context_block(&cases_context(cases)),
        business_blurb(business)
    )
}

/// Stage 1: frame the challenge as a markdown consulting framework
pub fn problem_definition_prompt(
    challenge: &str,
    cases: &[RetrievedCase],
    business: &BusinessProfile,
) -> String {
    format!(
        "{}\n\nAnalyze the following business challenge using consulting frameworks and methodologies.\n\
Structure your response in markdown format with a clear header (using # or ##) for each major section.\n\n\
Business Challenge: {challenge}\n\n\
Use markdown formatting for clear structure, and feel free to add any other relevant sections.",
        preamble(cases, business)
    )
}

/// Stage 2: list the data points to collect, as a JSON object keyed by field name
pub fn data_requirements_prompt(
    challenge: &str,
    cases: &[RetrievedCase],
    business: &BusinessProfile,
) -> String {
    format!(
        "{}\n\nFor {}'s challenge: {challenge}\n\n\
List exactly what data points we need to collect from the client. \
Format your response as a valid JSON object like this:\n{DATA_REQUIREMENTS_EXAMPLE}\n\n\
Each \"type\" must be one of \"number\", \"text\" or \"date\".\n\
Only return the JSON object, no other text. Ensure all JSON keys and values are properly quoted.",
        preamble(cases, business),
        business.name
    )
}

/// Stage 3: recommendations grounded in the collected data
pub fn analysis_prompt(
    challenge: &str,
    fields: &[FieldSpec],
    collected: &BTreeMap<String, Option<FieldValue>>,
    cases: &[RetrievedCase],
    business: &BusinessProfile,
) -> String {
    // Same order the fields were requested in
    let mut ordered = serde_json::Map::new();
    for field in fields {
        if let Some(value) = collected.get(&field.name) {
            ordered.insert(field.name.clone(), json!(value));
        }
    }
    for (name, value) in collected {
        if !ordered.contains_key(name) {
            ordered.insert(name.clone(), json!(value));
        }
    }

    format!(
        "{}\n\nBased on the following data for {}:\nChallenge: {challenge}\nCollected Data: {}\n\n\
Provide a detailed analysis and specific recommendations. \
Structure your response in markdown format with a clear header (using # or ##) for each major section.",
        preamble(cases, business),
        business.name,
        pretty_json(&ordered)
    )
}

/// Rewrite one section according to user feedback, optionally grounded in fresh research
pub fn refinement_prompt(
    title: &str,
    content: &str,
    feedback: &str,
    research: Option<&SearchResponse>,
) -> String {
    let mut prompt = format!(
        "You are an expert business consultant tasked with refining an analysis section.\n\n\
Original section: {title}\n\nContent:\n{content}\n\nUser feedback:\n{feedback}\n"
    );

    if let Some(research) = research {
        prompt.push_str(&format!(
            "\nAdditional context from research:\n{}\n",
            context_block(&pretty_json(research))
        ));
    }

    prompt.push_str(
        "\nPlease revise this section based on the user's feedback and the available context.\n\
Maintain the same analytical structure but incorporate the user's suggestions and concerns.\n\
If <context> is provided, also use relevant insights, data points and evidence from it to support the analysis.\n\
Only return the revised content for this specific section. Do not repeat the section title.",
    );
    prompt
}

/// Estimate one field's value from retrieved web pages, optionally revising an earlier answer
pub fn field_extraction_prompt(
    field: &FieldSpec,
    research: &SearchResponse,
    previous: Option<&ExtractedValue>,
    feedback: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are an expert business consultant. Estimate the value of the following data point using the context provided in the <context> tags.\n\
You may make an estimate if the context does not give an exact value. Otherwise, stick to the data.\n\n\
<field>\nName: {}\nDescription: {}\nType: {}\n</field>\n",
        field.name,
        field.description,
        field.kind.as_str()
    );

    if let Some(previous) = previous {
        let value = previous
            .value
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "Not found".to_string());
        prompt.push_str(&format!(
            "\nPrevious analysis:\nValue: {value}\nConfidence: {}\nSource: {}\nExplanation: {}\n",
            previous.confidence.as_str(),
            previous.source,
            previous.explanation
        ));
    }

    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\nUser feedback:\n{feedback}\n\n\
Please revise your analysis based on the user's feedback and the previous analysis while still grounding your answer in the provided context.\n"
        ));
    }

    prompt.push_str(&format!(
        "\n{}\n\nReturn only a JSON object with this structure:\n{EXTRACTION_SCHEMA}",
        context_block(&pretty_json(research))
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SearchHit;
    use crate::session::{Confidence, ValueKind};

    fn business() -> BusinessProfile {
        BusinessProfile {
            name: "MyTea".into(),
            description: "a ready-to-drink tea company".into(),
            industry: "Beverages".into(),
            location: "Indonesia".into(),
            user: None,
            quarter: None,
            motivation: None,
            task_cards: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn market_size() -> FieldSpec {
        FieldSpec {
            name: "market_size".into(),
            description: "Restaurant tea market in USD millions".into(),
            kind: ValueKind::Number,
            required: true,
        }
    }

    fn research() -> SearchResponse {
        SearchResponse {
            results: vec![SearchHit {
                chunk: "The restaurant beverage market reached 1,200 million USD.".into(),
                relative_path: "web/market.html".into(),
                category: "market".into(),
            }],
        }
    }

    #[test]
    fn framework_prompt_with_no_cases_has_empty_context() {
        let prompt =
            problem_definition_prompt("Should we expand into X market?", &[], &business());

        assert!(prompt.contains("<context>\n\n</context>"));
        assert!(prompt.contains("Business Challenge: Should we expand into X market?"));
        assert!(prompt.contains("You're advising MyTea, a ready-to-drink tea company"));
        assert!(prompt.contains("in the Beverages industry in Indonesia."));
    }

    #[test]
    fn cases_are_serialized_into_the_context_block() {
        let cases = vec![RetrievedCase {
            path: "cases/bubble_tea.pdf".into(),
            content: "Case text".into(),
        }];
        let prompt = data_requirements_prompt("Grow B2B", &cases, &business());

        assert!(prompt.contains("\"relative_path\": \"cases/bubble_tea.pdf\""));
        assert!(prompt.contains("\"content\": \"Case text\""));
        assert!(prompt.contains("Only return the JSON object"));
        assert!(prompt.contains("For MyTea's challenge: Grow B2B"));
    }

    #[test]
    fn analysis_prompt_embeds_collected_values() {
        let collected = BTreeMap::from([
            ("market_size".to_string(), Some(FieldValue::Number(1200.0))),
            ("notes".to_string(), None),
        ]);
        let prompt = analysis_prompt("Grow B2B", &[], &collected, &[], &business());

        assert!(prompt.contains("Challenge: Grow B2B"));
        assert!(prompt.contains("\"market_size\": 1200.0"));
        assert!(prompt.contains("\"notes\": null"));
    }

    #[test]
    fn analysis_prompt_lists_data_in_requested_order() {
        let field = |name: &str| FieldSpec {
            name: name.into(),
            description: String::new(),
            kind: ValueKind::Text,
            required: false,
        };
        let fields = vec![field("zone"), field("average_price"), field("market_size")];
        let collected = BTreeMap::from([
            ("average_price".to_string(), Some(FieldValue::Text("4 EUR".into()))),
            ("market_size".to_string(), None),
            ("zone".to_string(), Some(FieldValue::Text("EU".into()))),
        ]);

        let prompt = analysis_prompt("Grow B2B", &fields, &collected, &[], &business());

        let zone = prompt.find("\"zone\"").unwrap();
        let price = prompt.find("\"average_price\"").unwrap();
        let size = prompt.find("\"market_size\"").unwrap();
        assert!(zone < price && price < size);
    }

    #[test]
    fn refinement_prompt_is_deterministic() {
        let first = refinement_prompt("Risks", "Competition", "Add pricing risk", Some(&research()));
        let second = refinement_prompt("Risks", "Competition", "Add pricing risk", Some(&research()));
        assert_eq!(first, second);
        assert!(first.contains("Original section: Risks"));
        assert!(first.contains("Additional context from research"));
    }

    #[test]
    fn refinement_without_research_has_no_context_block() {
        let prompt = refinement_prompt("Risks", "Competition", "Shorter please", None);
        assert!(!prompt.contains("Additional context from research"));
        assert!(prompt.contains("User feedback:\nShorter please"));
    }

    #[test]
    fn extraction_prompt_includes_previous_answer_and_feedback() {
        let previous = ExtractedValue {
            value: Some(FieldValue::Number(1200.0)),
            source: "restaurant beverage market".into(),
            confidence: Confidence::Low,
            explanation: "broad market".into(),
            refinements: 0,
        };
        let prompt = field_extraction_prompt(
            &market_size(),
            &research(),
            Some(&previous),
            Some("Only count tea"),
        );

        assert!(prompt.contains("Name: market_size"));
        assert!(prompt.contains("Type: number"));
        assert!(prompt.contains("Value: 1200\nConfidence: LOW"));
        assert!(prompt.contains("User feedback:\nOnly count tea"));
        assert!(prompt.contains("\"found\": true/false"));
    }

    #[test]
    fn first_extraction_has_no_previous_section() {
        let prompt = field_extraction_prompt(&market_size(), &research(), None, None);
        assert!(!prompt.contains("Previous analysis"));
        assert!(!prompt.contains("User feedback"));
        assert!(prompt.contains("web/market.html"));
    }
}
