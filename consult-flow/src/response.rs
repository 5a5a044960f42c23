use serde::de::DeserializeOwned;

use crate::error::{ConsultError, Result};

/// Remove markdown code-fence markers wherever they appear
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```JSON", "").replace("```", "").trim().to_string()
}

/// Decode a JSON answer from the model.
///
/// Tries the raw text first, then the text with code fences stripped. Anything
/// else is a [`ConsultError::MalformedResponse`] carrying the raw output.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let first_attempt = match serde_json::from_str::<T>(raw.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let cleaned = strip_code_fences(raw);
    if cleaned == raw.trim() {
        return Err(ConsultError::malformed(first_attempt.to_string(), raw));
    }

    serde_json::from_str::<T>(&cleaned)
        .map_err(|e| ConsultError::malformed(e.to_string(), raw))
}
