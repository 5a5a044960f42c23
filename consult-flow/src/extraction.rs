//! Per-field value extraction with provenance, and the refinement loop on top of it.
//!
//! A field moves `Unresolved -> Extracted -> (Refined)* -> Final`. Extraction never
//! fails the whole form: a field that cannot be resolved keeps whatever it had
//! before and the user can still type a value in.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::ConsultConfig;
use crate::error::{ConsultError, Result};
use crate::prompts::field_extraction_prompt;
use crate::response::parse_model_json;
use crate::services::{CompletionRequest, SearchRequest, Services};
use crate::session::{Confidence, ExtractedValue, FieldSpec, FieldValue, Session, ValueKind};

/// What happened to one field during extraction or refinement
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Extracted { field: String },
    Refined { field: String },
    /// The model answered, but no usable value came out of it
    Unresolved { field: String, reason: String },
    /// Retrieval found nothing to extract from
    NoContext { field: String },
    /// A call or the response parsing failed; stored state is unchanged
    Failed { field: String, error: String },
}

impl FieldOutcome {
    pub fn field(&self) -> &str {
        match self {
            FieldOutcome::Extracted { field }
            | FieldOutcome::Refined { field }
            | FieldOutcome::Unresolved { field, .. }
            | FieldOutcome::NoContext { field }
            | FieldOutcome::Failed { field, .. } => field,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            FieldOutcome::Extracted { .. } | FieldOutcome::Refined { .. }
        )
    }

    /// A user-facing note for outcomes that need attention
    pub fn warning(&self) -> Option<String> {
        match self {
            FieldOutcome::Unresolved { field, reason } => {
                Some(format!("Could not determine '{field}': {reason}"))
            }
            FieldOutcome::Failed { field, error } => {
                Some(format!("Extraction failed for '{field}': {error}"))
            }
            _ => None,
        }
    }
}

/// The fixed JSON object the extraction prompt asks for
#[derive(Debug, Deserialize)]
struct ExtractionAnswer {
    #[serde(default)]
    found: Option<bool>,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
}

enum Extraction {
    Resolved(ExtractedValue),
    Unresolved(String),
    NoContext,
}

/// Strip thousands separators and parse the first whitespace-delimited token.
/// NaN and infinities are rejected since they cannot be stored as JSON numbers.
pub fn coerce_number(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    cleaned
        .split_whitespace()
        .next()?
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Convert the model's `value` into a typed field value, `None` if unusable
fn normalize_value(value: &Value, kind: ValueKind) -> std::result::Result<Option<FieldValue>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => match kind {
            ValueKind::Number => Ok(n.as_f64().map(FieldValue::Number)),
            _ => Ok(Some(FieldValue::Text(n.to_string()))),
        },
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
                return Ok(None);
            }
            match kind {
                ValueKind::Number => coerce_number(trimmed)
                    .map(|n| Some(FieldValue::Number(n)))
                    .ok_or_else(|| format!("'{trimmed}' is not a number")),
                _ => Ok(Some(FieldValue::Text(trimmed.to_string()))),
            }
        }
        Value::Bool(b) => match kind {
            ValueKind::Number => Err(format!("'{b}' is not a number")),
            _ => Ok(Some(FieldValue::Text(b.to_string()))),
        },
        other => match kind {
            ValueKind::Number => Err("expected a single number".to_string()),
            _ => Ok(Some(FieldValue::Text(other.to_string()))),
        },
    }
}

/// Drives one retrieval plus one completion per field
pub struct FieldExtractor<'a> {
    services: &'a Services,
    config: &'a ConsultConfig,
}

impl<'a> FieldExtractor<'a> {
    pub fn new(services: &'a Services, config: &'a ConsultConfig) -> Self {
        Self { services, config }
    }

    async fn extract(
        &self,
        field: &FieldSpec,
        category: Option<&str>,
        previous: Option<&ExtractedValue>,
        feedback: Option<&str>,
    ) -> Result<Extraction> {
        let query = format!("{} {}", field.name, field.description);
        let request =
            SearchRequest::new(query, self.config.limits.webpages).with_category(category);
        let research = self.services.webpages.search(&request).await?;

        if research.is_empty() {
            debug!(field = %field.name, "no web page results");
            return Ok(Extraction::NoContext);
        }

        let prompt = field_extraction_prompt(field, &research, previous, feedback);
        let completion = self
            .services
            .completions
            .complete(&CompletionRequest {
                model: self.config.model.clone(),
                prompt,
                temperature: Some(self.config.temperatures.extraction),
            })
            .await?;

        let answer: ExtractionAnswer = parse_model_json(&completion.text)?;

        if answer.found == Some(false) {
            return Ok(Extraction::Unresolved(
                answer
                    .explanation
                    .unwrap_or_else(|| "value not found in context".to_string()),
            ));
        }

        let value = match normalize_value(&answer.value, field.kind) {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(Extraction::Unresolved("no value returned".to_string())),
            Err(reason) => return Ok(Extraction::Unresolved(reason)),
        };

        Ok(Extraction::Resolved(ExtractedValue {
            value: Some(value),
            source: answer.source.unwrap_or_else(|| "N/A".to_string()),
            confidence: Confidence::from_model(answer.confidence.as_deref()),
            explanation: answer.explanation.unwrap_or_else(|| "N/A".to_string()),
            refinements: 0,
        }))
    }

    /// Run extraction for one field and record the result on the session
    async fn resolve(
        &self,
        session: &mut Session,
        field: &FieldSpec,
        feedback: Option<&str>,
    ) -> FieldOutcome {
        let name = field.name.clone();
        let previous = feedback.and_then(|_| session.extracted_values.get(&name).cloned());
        let category = session.category.clone();

        let result = self
            .extract(field, category.as_deref(), previous.as_ref(), feedback)
            .await;
        let outcome = match result {
            Ok(Extraction::Resolved(mut extracted)) => {
                if feedback.is_some() {
                    extracted.refinements = previous.as_ref().map_or(0, |p| p.refinements) + 1;
                }
                session.extracted_values.insert(name.clone(), extracted);
                if feedback.is_some() {
                    FieldOutcome::Refined { field: name.clone() }
                } else {
                    FieldOutcome::Extracted { field: name.clone() }
                }
            }
            Ok(Extraction::Unresolved(reason)) => FieldOutcome::Unresolved {
                field: name.clone(),
                reason,
            },
            Ok(Extraction::NoContext) => FieldOutcome::NoContext { field: name.clone() },
            Err(e) => {
                if let Some(raw) = e.raw_response() {
                    debug!(field = %name, raw = %raw, "unparseable extraction response");
                }
                FieldOutcome::Failed {
                    field: name.clone(),
                    error: e.to_string(),
                }
            }
        };

        match outcome.warning() {
            Some(warning) => {
                warn!(field = %name, "{}", warning);
                session.field_errors.insert(name, warning);
            }
            None => {
                session.field_errors.remove(&name);
            }
        }
        outcome
    }

    /// Initial pass over every required field, one at a time in listing order
    pub async fn extract_all(&self, session: &mut Session) -> Vec<FieldOutcome> {
        let fields = session.required_fields.clone();
        let mut outcomes = Vec::with_capacity(fields.len());

        for field in &fields {
            outcomes.push(self.resolve(session, field, None).await);
        }
        session.extraction_started = true;

        let resolved = outcomes.iter().filter(|o| o.is_resolved()).count();
        info!(resolved, total = fields.len(), "initial field extraction finished");
        outcomes
    }

    /// Re-run extraction for one field with the user's feedback and the previous answer
    pub async fn refine(
        &self,
        session: &mut Session,
        field_name: &str,
        feedback: &str,
    ) -> Result<FieldOutcome> {
        let field = session
            .field(field_name)
            .cloned()
            .ok_or_else(|| ConsultError::Validation(format!("unknown field '{field_name}'")))?;

        info!(field = %field_name, "refining field");
        Ok(self.resolve(session, &field, Some(feedback)).await)
    }
}

/// Check a submitted form against the field list.
///
/// Rejects the submission when any required field is empty, naming every such
/// field. Optional empty fields are kept as `None`. Numbers given as text are
/// coerced and dates must be `YYYY-MM-DD`.
pub fn validate_submission(
    fields: &[FieldSpec],
    submitted: &BTreeMap<String, Option<FieldValue>>,
) -> Result<BTreeMap<String, Option<FieldValue>>> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|field| field.required)
        .filter(|field| match submitted.get(&field.name) {
            Some(Some(value)) => value.is_blank(),
            _ => true,
        })
        .map(|field| field.name.clone())
        .collect();

    if !missing.is_empty() {
        return Err(ConsultError::MissingRequiredFields(missing));
    }

    let mut collected = BTreeMap::new();
    for field in fields {
        let value = match submitted.get(&field.name).cloned().flatten() {
            Some(value) if value.is_blank() => None,
            Some(value) => Some(typed_value(field, value)?),
            None => None,
        };
        collected.insert(field.name.clone(), value);
    }
    Ok(collected)
}

fn typed_value(field: &FieldSpec, value: FieldValue) -> Result<FieldValue> {
    match (field.kind, value) {
        (ValueKind::Number, FieldValue::Text(text)) => coerce_number(&text)
            .map(FieldValue::Number)
            .ok_or_else(|| {
                ConsultError::Validation(format!("'{}' must be a number, got '{text}'", field.name))
            }),
        (ValueKind::Date, FieldValue::Text(text)) => {
            let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| {
                ConsultError::Validation(format!(
                    "'{}' must be a date (YYYY-MM-DD), got '{text}'",
                    field.name
                ))
            })?;
            Ok(FieldValue::Text(date.format("%Y-%m-%d").to_string()))
        }
        (ValueKind::Date, FieldValue::Number(n)) => Err(ConsultError::Validation(format!(
            "'{}' must be a date (YYYY-MM-DD), got {n}",
            field.name
        ))),
        (ValueKind::Text, FieldValue::Number(n)) => Ok(FieldValue::Text(n.to_string())),
        (_, FieldValue::Number(n)) if !n.is_finite() => Err(ConsultError::Validation(format!(
            "'{}' must be a finite number",
            field.name
        ))),
        (_, value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockServices, hit};

    fn spec(name: &str, kind: ValueKind, required: bool) -> FieldSpec {
        FieldSpec {
            name: name.into(),
            description: format!("{name} description"),
            kind,
            required,
        }
    }

    fn session_with(fields: Vec<FieldSpec>) -> Session {
        let mut session = Session::new();
        session.required_fields = fields;
        session
    }

    #[test]
    fn numbers_are_coerced_from_text() {
        assert_eq!(coerce_number("1,234 units"), Some(1234.0));
        assert_eq!(coerce_number(" 12.5 million"), Some(12.5));
        assert_eq!(coerce_number("abc"), None);
        assert_eq!(coerce_number(""), None);
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        assert_eq!(coerce_number("NaN"), None);
        assert_eq!(coerce_number("inf"), None);
        assert_eq!(coerce_number("-infinity units"), None);
    }

    #[tokio::test]
    async fn extracted_nan_leaves_field_unresolved() {
        let mock = MockServices::new();
        mock.webpages.push(vec![hit("web/a.html", "outlet count unknown")]);
        mock.completions
            .push(r#"{"found": true, "value": "NaN", "confidence": "LOW", "source": "", "explanation": ""}"#);
        let services = mock.services();
        let config = ConsultConfig::default();
        let mut session = session_with(vec![spec("outlets", ValueKind::Number, true)]);

        let outcomes = FieldExtractor::new(&services, &config)
            .extract_all(&mut session)
            .await;

        assert!(matches!(outcomes[0], FieldOutcome::Unresolved { .. }));
        assert!(!session.extracted_values.contains_key("outlets"));
        assert!(session.field_errors.contains_key("outlets"));
    }

    #[test]
    fn submitted_nan_or_infinity_is_not_a_number() {
        let fields = vec![spec("size", ValueKind::Number, true)];
        for raw in ["NaN", "inf"] {
            let submitted = BTreeMap::from([("size".to_string(), Some(FieldValue::Text(raw.into())))]);
            let err = validate_submission(&fields, &submitted).unwrap_err();
            assert!(matches!(err, ConsultError::Validation(_)), "{raw}: {err:?}");
        }

        let submitted = BTreeMap::from([("size".to_string(), Some(FieldValue::Number(f64::NAN)))]);
        assert!(validate_submission(&fields, &submitted).is_err());
    }

    #[tokio::test]
    async fn extracts_and_coerces_a_numeric_field() {
        let mock = MockServices::new();
        mock.webpages.push(vec![hit("web/a.html", "There are 1,234 outlets")]);
        mock.completions.push(
            r#"```json
{"found": true, "value": "1,234 units", "confidence": "high", "source": "There are 1,234 outlets", "explanation": "stated"}
```"#,
        );
        let services = mock.services();
        let config = ConsultConfig::default();
        let mut session = session_with(vec![spec("outlets", ValueKind::Number, true)]);

        let outcomes = FieldExtractor::new(&services, &config)
            .extract_all(&mut session)
            .await;

        assert_eq!(outcomes, vec![FieldOutcome::Extracted { field: "outlets".into() }]);
        let extracted = &session.extracted_values["outlets"];
        assert_eq!(extracted.value, Some(FieldValue::Number(1234.0)));
        assert_eq!(extracted.confidence, Confidence::High);
        assert_eq!(extracted.source, "There are 1,234 outlets");
        assert!(session.extraction_started);

        let searches = mock.webpages.requests();
        assert_eq!(searches[0].query, "outlets outlets description");
        assert_eq!(searches[0].limit, config.limits.webpages);
        assert_eq!(mock.completions.requests()[0].temperature, Some(0.1));
    }

    #[tokio::test]
    async fn unparseable_number_leaves_field_unresolved() {
        let mock = MockServices::new();
        mock.webpages.push(vec![hit("web/a.html", "many outlets")]);
        mock.completions
            .push(r#"{"found": true, "value": "abc", "confidence": "LOW", "source": "", "explanation": ""}"#);
        let services = mock.services();
        let config = ConsultConfig::default();
        let mut session = session_with(vec![spec("outlets", ValueKind::Number, true)]);

        let outcomes = FieldExtractor::new(&services, &config)
            .extract_all(&mut session)
            .await;

        assert!(matches!(outcomes[0], FieldOutcome::Unresolved { .. }));
        assert!(!session.extracted_values.contains_key("outlets"));
        assert!(session.field_errors.contains_key("outlets"));
    }

    #[tokio::test]
    async fn one_failing_field_does_not_stop_the_others() {
        let mock = MockServices::new();
        mock.webpages.fail("search service unavailable");
        mock.webpages.push(vec![hit("web/b.html", "Average price is 15000 IDR")]);
        mock.completions.push(
            r#"{"found": true, "value": 15000, "confidence": "MEDIUM", "source": "Average price", "explanation": "direct"}"#,
        );
        let services = mock.services();
        let config = ConsultConfig::default();
        let mut session = session_with(vec![
            spec("market_size", ValueKind::Number, true),
            spec("avg_price", ValueKind::Number, false),
        ]);

        let outcomes = FieldExtractor::new(&services, &config)
            .extract_all(&mut session)
            .await;

        assert!(matches!(outcomes[0], FieldOutcome::Failed { .. }));
        assert_eq!(outcomes[1], FieldOutcome::Extracted { field: "avg_price".into() });
        assert_eq!(
            session.extracted_values["avg_price"].value,
            Some(FieldValue::Number(15000.0))
        );
    }

    #[tokio::test]
    async fn empty_retrieval_skips_the_completion() {
        let mock = MockServices::new();
        mock.webpages.push(vec![]);
        let services = mock.services();
        let config = ConsultConfig::default();
        let mut session = session_with(vec![spec("notes", ValueKind::Text, false)]);

        let outcomes = FieldExtractor::new(&services, &config)
            .extract_all(&mut session)
            .await;

        assert_eq!(outcomes, vec![FieldOutcome::NoContext { field: "notes".into() }]);
        assert!(mock.completions.requests().is_empty());
    }

    #[tokio::test]
    async fn refinement_overwrites_and_sends_previous_answer() {
        let mock = MockServices::new();
        mock.webpages.push(vec![hit("web/a.html", "Tea segment is 300 million")]);
        mock.completions.push(
            r#"{"found": true, "value": 300, "confidence": "HIGH", "source": "Tea segment", "explanation": "narrowed"}"#,
        );
        let services = mock.services();
        let config = ConsultConfig::default();
        let mut session = session_with(vec![spec("market_size", ValueKind::Number, true)]);
        session.extracted_values.insert(
            "market_size".into(),
            ExtractedValue {
                value: Some(FieldValue::Number(1200.0)),
                source: "beverages".into(),
                confidence: Confidence::Low,
                explanation: "whole market".into(),
                refinements: 0,
            },
        );

        let outcome = FieldExtractor::new(&services, &config)
            .refine(&mut session, "market_size", "Only tea, please")
            .await
            .unwrap();

        assert_eq!(outcome, FieldOutcome::Refined { field: "market_size".into() });
        let refined = &session.extracted_values["market_size"];
        assert_eq!(refined.value, Some(FieldValue::Number(300.0)));
        assert_eq!(refined.refinements, 1);

        let prompt = &mock.completions.requests()[0].prompt;
        assert!(prompt.contains("Value: 1200"));
        assert!(prompt.contains("Only tea, please"));
    }

    #[tokio::test]
    async fn failed_refinement_keeps_previous_value() {
        let mock = MockServices::new();
        mock.webpages.push(vec![hit("web/a.html", "text")]);
        mock.completions.push("I could not find it, sorry.");
        let services = mock.services();
        let config = ConsultConfig::default();
        let mut session = session_with(vec![spec("market_size", ValueKind::Number, true)]);
        let previous = ExtractedValue {
            value: Some(FieldValue::Number(1200.0)),
            source: "beverages".into(),
            confidence: Confidence::Low,
            explanation: "whole market".into(),
            refinements: 0,
        };
        session
            .extracted_values
            .insert("market_size".into(), previous.clone());

        let outcome = FieldExtractor::new(&services, &config)
            .refine(&mut session, "market_size", "try again")
            .await
            .unwrap();

        assert!(matches!(outcome, FieldOutcome::Failed { .. }));
        assert_eq!(session.extracted_values["market_size"], previous);
        assert!(session.field_errors["market_size"].contains("Extraction failed"));
    }

    #[tokio::test]
    async fn refining_an_unknown_field_is_a_validation_error() {
        let mock = MockServices::new();
        let services = mock.services();
        let config = ConsultConfig::default();
        let mut session = session_with(vec![]);

        let err = FieldExtractor::new(&services, &config)
            .refine(&mut session, "nope", "feedback")
            .await
            .unwrap_err();
        assert!(matches!(err, ConsultError::Validation(_)));
    }

    #[test]
    fn submission_names_only_missing_required_fields() {
        let fields = vec![
            spec("a", ValueKind::Text, true),
            spec("b", ValueKind::Text, false),
        ];
        let submitted = BTreeMap::from([
            ("a".to_string(), Some(FieldValue::Text("".into()))),
            ("b".to_string(), Some(FieldValue::Text("".into()))),
        ]);

        let err = validate_submission(&fields, &submitted).unwrap_err();
        match err {
            ConsultError::MissingRequiredFields(missing) => assert_eq!(missing, vec!["a"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn accepted_submission_types_values_and_nulls_optional_blanks() {
        let fields = vec![
            spec("size", ValueKind::Number, true),
            spec("launch", ValueKind::Date, true),
            spec("notes", ValueKind::Text, false),
        ];
        let submitted = BTreeMap::from([
            ("size".to_string(), Some(FieldValue::Text("2,500".into()))),
            ("launch".to_string(), Some(FieldValue::Text("2025-03-01".into()))),
            ("notes".to_string(), Some(FieldValue::Text("  ".into()))),
        ]);

        let collected = validate_submission(&fields, &submitted).unwrap();
        assert_eq!(collected["size"], Some(FieldValue::Number(2500.0)));
        assert_eq!(collected["launch"], Some(FieldValue::Text("2025-03-01".into())));
        assert_eq!(collected["notes"], None);
    }

    #[test]
    fn zero_is_a_valid_required_number() {
        let fields = vec![spec("competitors", ValueKind::Number, true)];
        let submitted =
            BTreeMap::from([("competitors".to_string(), Some(FieldValue::Number(0.0)))]);
        assert!(validate_submission(&fields, &submitted).is_ok());
    }

    #[test]
    fn malformed_date_is_rejected() {
        let fields = vec![spec("launch", ValueKind::Date, true)];
        let submitted =
            BTreeMap::from([("launch".to_string(), Some(FieldValue::Text("next spring".into())))]);
        assert!(matches!(
            validate_submission(&fields, &submitted),
            Err(ConsultError::Validation(_))
        ));
    }

    #[test]
    fn collected_date_survives_a_session_round_trip() {
        let fields = vec![spec("launch", ValueKind::Date, true)];
        let submitted =
            BTreeMap::from([("launch".to_string(), Some(FieldValue::Text(" 2025-03-01 ".into())))]);
        let mut session = session_with(fields.clone());
        session.collected_values = validate_submission(&fields, &submitted).unwrap();

        let stored: Session = serde_json::from_str(&serde_json::to_string(&session).unwrap()).unwrap();
        assert_eq!(
            stored.collected_values["launch"],
            Some(FieldValue::Text("2025-03-01".into()))
        );
    }
}
