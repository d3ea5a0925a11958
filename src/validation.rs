use tracing::{debug, warn};

use crate::error::AppError;

pub const MIN_QUESTION_LENGTH: usize = 3;
pub const MAX_QUESTION_LENGTH: usize = 1000;
pub const MAX_DOCUMENTS: usize = 100;
pub const MIN_GENERATION_LENGTH: usize = 10;

const SUSPICIOUS_PATTERNS: [&str; 4] = ["<script", "javascript:", "onerror=", "onclick="];

/// Trim a user question and reject empty, out-of-bounds or script-bearing input
pub fn validate_question(question: &str) -> Result<String, AppError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Question cannot be empty".to_string()));
    }

    let length = question.chars().count();
    if length < MIN_QUESTION_LENGTH {
        return Err(AppError::Validation(format!(
            "Question too short (minimum {} characters, got {})",
            MIN_QUESTION_LENGTH, length
        )));
    }
    if length > MAX_QUESTION_LENGTH {
        return Err(AppError::Validation(format!(
            "Question too long (maximum {} characters, got {})",
            MAX_QUESTION_LENGTH, length
        )));
    }

    let lowered = question.to_lowercase();
    if let Some(pattern) = SUSPICIOUS_PATTERNS.iter().find(|p| lowered.contains(*p)) {
        warn!(pattern = %pattern, "Suspicious pattern detected in question");
        return Err(AppError::Validation(
            "Question contains suspicious content".to_string(),
        ));
    }

    debug!(question_length = length, "Question validated");
    Ok(question.to_string())
}

/// An empty list is accepted as-is; anything past the limit is dropped
pub fn validate_documents<T>(mut documents: Vec<T>) -> Vec<T> {
    if documents.is_empty() {
        warn!("Empty document list provided");
        return documents;
    }

    if documents.len() > MAX_DOCUMENTS {
        warn!(
            count = documents.len(),
            limit = MAX_DOCUMENTS,
            "Too many documents, truncating"
        );
        documents.truncate(MAX_DOCUMENTS);
    }

    debug!(count = documents.len(), "Documents validated");
    documents
}

pub fn validate_generation(generation: &str) -> Result<String, AppError> {
    let generation = generation.trim();
    if generation.is_empty() {
        return Err(AppError::Validation("Generation cannot be empty".to_string()));
    }

    let length = generation.chars().count();
    if length < MIN_GENERATION_LENGTH {
        return Err(AppError::Validation(format!(
            "Generation too short (minimum {} characters, got {})",
            MIN_GENERATION_LENGTH, length
        )));
    }

    debug!(length, "Generation validated");
    Ok(generation.to_string())
}

/// Strip NUL bytes, collapse whitespace runs into single spaces and trim.
/// `max_length` counts characters, not bytes.
pub fn sanitize_text(text: &str, max_length: Option<usize>) -> String {
    let collapsed = text
        .split(|c: char| c.is_whitespace())
        .map(|word| word.replace('\0', ""))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    match max_length {
        Some(max) if max > 0 && collapsed.chars().count() > max => {
            collapsed.chars().take(max).collect()
        }
        _ => collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_question_is_trimmed() {
        let question = validate_question("  What is RAG?  ").unwrap();
        assert_eq!(question, "What is RAG?");
    }

    #[test]
    fn test_question_length_bounds() {
        assert!(validate_question("").is_err());
        assert!(validate_question("   ").is_err());
        assert!(validate_question("hi").is_err());
        assert!(validate_question("why").is_ok());
        assert!(validate_question(&"a".repeat(MAX_QUESTION_LENGTH)).is_ok());
        assert!(validate_question(&"a".repeat(MAX_QUESTION_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_question_rejects_suspicious_content() {
        for input in [
            "tell me <SCRIPT>alert(1)</script>",
            "open JavaScript:void(0)",
            "img onerror=boom",
            "button onClick=go",
        ] {
            let err = validate_question(input).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{}", input);
        }
    }

    #[test]
    fn test_validate_documents() {
        let empty: Vec<u32> = Vec::new();
        assert!(validate_documents(empty).is_empty());

        let few = validate_documents(vec!["a", "b"]);
        assert_eq!(few, vec!["a", "b"]);

        let many = validate_documents((0..150).collect::<Vec<_>>());
        assert_eq!(many.len(), MAX_DOCUMENTS);
        assert_eq!(many[99], 99);
    }

    #[test]
    fn test_validate_generation() {
        assert!(validate_generation("").is_err());
        assert!(validate_generation("too short").is_err());
        assert_eq!(
            validate_generation("  long enough answer ").unwrap(),
            "long enough answer"
        );
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("", None), "");
        assert_eq!(sanitize_text("  a\0b \n\t c  ", None), "ab c");
        assert_eq!(sanitize_text("héllo wörld", Some(4)), "héll");
        assert_eq!(sanitize_text("short", Some(100)), "short");
    }
}
