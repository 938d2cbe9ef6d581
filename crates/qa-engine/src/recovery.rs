//! Best-effort extraction of a JSON object from free-form worker text.

use qa_core::report::Document;
use serde_json::Value;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty response")]
    Empty,
    #[error("no JSON object found")]
    NoObject,
    #[error("invalid JSON: {0}")]
    Invalid(String),
}

/// Two stages: parse the whole text strictly; failing that, parse the span
/// from the first `{` to the last `}`. Only a JSON object is accepted.
pub fn parse_document(text: &str) -> Result<Document, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }
    if let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(doc);
    }

    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(ParseError::NoObject);
    };
    if end <= start {
        return Err(ParseError::NoObject);
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(_) => Err(ParseError::NoObject),
        Err(e) => Err(ParseError::Invalid(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_object() {
        let doc = parse_document(r#"{"summary": "ok", "issues": []}"#).unwrap();
        assert_eq!(doc["summary"], "ok");
    }

    #[test]
    fn fenced_reply_is_recovered() {
        let text = "Here you go:\n```json\n{\"summary\": \"two errors\", \"issues\": [{\"title\": \"x\"}]}\n```";
        let doc = parse_document(text).unwrap();
        assert_eq!(doc["summary"], "two errors");
        assert_eq!(doc["issues"][0]["title"], "x");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_span() {
        let doc = parse_document("note {\"detail\": \"missing } brace\"} end").unwrap();
        assert_eq!(doc["detail"], "missing } brace");
    }

    #[test]
    fn failures_are_typed() {
        assert_eq!(parse_document("   "), Err(ParseError::Empty));
        assert_eq!(parse_document("no json here"), Err(ParseError::NoObject));
        assert_eq!(parse_document("} backwards {"), Err(ParseError::NoObject));
        assert!(matches!(parse_document("{\"summary\": }"), Err(ParseError::Invalid(_))));
    }

    #[test]
    fn non_object_json_is_rejected() {
        assert_eq!(parse_document("[1, 2, 3]"), Err(ParseError::NoObject));
        assert_eq!(parse_document("\"just a string\""), Err(ParseError::NoObject));
    }

    #[test]
    fn array_wrapping_an_object_yields_the_object_span() {
        let doc = parse_document(r#"[{"summary": "inner"}]"#).unwrap();
        assert_eq!(doc["summary"], "inner");
    }
}
