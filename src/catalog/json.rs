//! Decoding helpers that turn serde failures into readable protocol errors.

use super::errors::CatalogError;

/// Deserialize `body`, reporting the serde path and a snippet of the offending
/// line when the payload does not match `T`.
pub fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, CatalogError> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(jd).map_err(|err| {
        let inner = err.inner();
        let (line, column) = (inner.line(), inner.column());
        let path = err.path().to_string();

        let msg = inner.to_string();
        let loc = format!(" at line {line} column {column}");
        let msg = msg.strip_suffix(&loc).unwrap_or(&msg);

        let mut out = String::new();
        if !path.is_empty() && path != "." {
            out.push_str(&format!("at path '{path}': "));
        }
        out.push_str(&format!(
            "{} (line {line} col {column})\n{}",
            describe_mismatch(msg),
            snippet(body, line, column, 24)
        ));
        CatalogError::Protocol(out)
    })
}

/// Rewrite "invalid type: X, expected Y" as "expected Y, got X".
fn describe_mismatch(msg: &str) -> String {
    if let Some(rest) = msg.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        return format!("expected {expected}, got {actual}");
    }
    msg.to_string()
}

/// A window of `width` characters around the error column with a caret under it.
/// Works on chars so multi-byte names never split mid-codepoint.
fn snippet(body: &str, line: usize, column: usize, width: usize) -> String {
    let target: Vec<char> = body
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .collect();
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    let at = column.saturating_sub(1).min(target.len());
    let start = at.saturating_sub(width / 2);
    let end = (at + width / 2).min(target.len());
    let slice: String = target[start..end].iter().collect();

    format!("...{slice}...\n   {}^", " ".repeat(at - start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Envelope {
        #[allow(dead_code)]
        success: bool,
        #[allow(dead_code)]
        data: Vec<Item>,
    }

    #[derive(Debug, Deserialize)]
    struct Item {
        #[allow(dead_code)]
        name: String,
    }

    #[test]
    fn mismatch_is_rewritten() {
        assert_eq!(
            describe_mismatch("invalid type: null, expected a string"),
            "expected a string, got null"
        );
        assert_eq!(describe_mismatch("EOF while parsing"), "EOF while parsing");
    }

    #[test]
    fn error_names_the_failing_path() {
        let body = r#"{"success": true, "data": [{"name": "ok"}, {"name": 5}]}"#;
        let err = decode::<Envelope>(body).unwrap_err();
        assert!(err.is_protocol());
        let msg = err.to_string();
        assert!(msg.contains("data[1].name"), "{msg}");
        assert!(msg.contains("expected a string"), "{msg}");
    }

    #[test]
    fn snippet_handles_multibyte_text() {
        let body = r#"{"name": "Ảnh & Video", "oops"}"#;
        let err = decode::<Item>(body).unwrap_err();
        assert!(err.to_string().contains('^'));
    }

    #[test]
    fn not_json_at_all() {
        let err = decode::<Envelope>("<html>Service unavailable</html>").unwrap_err();
        assert!(err.is_protocol());
    }
}
