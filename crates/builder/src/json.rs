use serde::de::DeserializeOwned;

use crate::error::{GenerationError, GenerationResult};

/// The span from the first `{` to the last `}`, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse the JSON object embedded in a model reply.
pub fn parse_embedded<T: DeserializeOwned>(text: &str) -> GenerationResult<T> {
    let json = extract_json_object(text)
        .ok_or_else(|| GenerationError::Parse("No JSON found in AI response".to_string()))?;
    serde_json::from_str(json).map_err(|e| GenerationError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_spans_outermost_braces() {
        let reply = "Sure! ```json\n{\"a\": {\"b\": 1}}\n``` done";
        assert_eq!(extract_json_object(reply), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_parse_embedded_errors() {
        let err = parse_embedded::<serde_json::Value>("nothing").unwrap_err();
        assert!(err.to_string().contains("No JSON found"));
        assert!(parse_embedded::<serde_json::Value>("{ broken").is_err());
    }
}
