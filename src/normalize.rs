use serde_json::{Value, json};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// How to treat stream lines that carry the data prefix but do not parse as
/// JSON. Lenient is the production default: noisy upstreams interleave
/// keep-alives and half-written lines, and salvaging the rest of the stream
/// beats failing the whole diagnostic. Strict fails on the first bad line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    #[default]
    Lenient,
    Strict,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("malformed stream line: {0}")]
    MalformedLine(String),
}

/// One parsed event line. Lives only for the duration of the reassembly pass.
#[derive(Debug, Default)]
pub struct StreamFragment {
    pub delta_content: Option<String>,
    pub is_terminal: bool,
    pub envelope: Option<Value>,
}

/// Normalizes a fully buffered upstream body into a single JSON value.
///
/// Event-stream and plain-text bodies go through line-by-line reassembly;
/// anything else is parsed as JSON and passed through unchanged, degrading to
/// an error-shaped wrapper around the raw text when parsing fails.
pub fn normalize(content_type: &str, text: &str, mode: ParseMode) -> Result<Value, NormalizeError> {
    if is_stream_content_type(content_type) {
        return reassemble_stream(text, mode);
    }
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::debug!(error = %err, "upstream body is not valid JSON, degrading to raw text");
            Ok(json!({ "error": "parse failed", "content": text }))
        }
    }
}

fn is_stream_content_type(raw: &str) -> bool {
    let Ok(parsed) = raw.parse::<mime::Mime>() else {
        return false;
    };
    parsed.type_() == mime::TEXT
        && (parsed.subtype() == mime::EVENT_STREAM || parsed.subtype() == mime::PLAIN)
}

/// Parses one line of a buffered event stream. Returns `None` for lines that
/// carry no data prefix (comments, `event:` fields, blanks) and an error for
/// data lines whose payload is not JSON; the caller decides whether that
/// error is fatal.
pub fn parse_fragment(line: &str) -> Result<Option<StreamFragment>, NormalizeError> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };
    if line.contains(DONE_MARKER) {
        return Ok(Some(StreamFragment {
            is_terminal: true,
            ..Default::default()
        }));
    }
    let parsed: Value = serde_json::from_str(payload)
        .map_err(|err| NormalizeError::MalformedLine(format!("{err}: {payload}")))?;

    let delta_content = parsed
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let has_choices = parsed
        .get("choices")
        .and_then(Value::as_array)
        .is_some_and(|choices| !choices.is_empty());

    Ok(Some(StreamFragment {
        delta_content,
        is_terminal: false,
        envelope: has_choices.then_some(parsed),
    }))
}

/// Reassembles buffered event-stream text into one completion object.
///
/// Data lines are processed in arrival order: incremental `delta.content`
/// fragments are concatenated, and the most recent envelope with a non-empty
/// `choices` array is kept as the metadata template. The synthesized result
/// replaces `choices[0].delta` with a full assistant `message`. When nothing
/// usable was found the raw text comes back under an explicit stream
/// sentinel so the caller can still show it.
pub fn reassemble_stream(text: &str, mode: ParseMode) -> Result<Value, NormalizeError> {
    let mut combined = String::new();
    let mut last_envelope: Option<Value> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fragment = match parse_fragment(line) {
            Ok(Some(fragment)) => fragment,
            Ok(None) => continue,
            Err(err) => match mode {
                ParseMode::Strict => return Err(err),
                ParseMode::Lenient => continue,
            },
        };
        if fragment.is_terminal {
            continue;
        }
        if let Some(delta) = fragment.delta_content {
            combined.push_str(&delta);
        }
        if let Some(envelope) = fragment.envelope {
            last_envelope = Some(envelope);
        }
    }

    match (combined.is_empty(), last_envelope) {
        (false, Some(mut envelope)) => {
            if let Some(choice) = envelope
                .get_mut("choices")
                .and_then(Value::as_array_mut)
                .and_then(|choices| choices.first_mut())
                .and_then(Value::as_object_mut)
            {
                choice.remove("delta");
                choice.insert(
                    "message".to_string(),
                    json!({ "role": "assistant", "content": combined }),
                );
            }
            Ok(envelope)
        }
        (true, Some(envelope)) => Ok(envelope),
        (_, None) => Ok(json!({ "content": text, "type": "stream" })),
    }
}

#[cfg(test)]
mod tests {
    use super::{NormalizeError, ParseMode, normalize, parse_fragment, reassemble_stream};
    use serde_json::json;

    fn data_line(value: serde_json::Value) -> String {
        format!("data: {value}")
    }

    #[test]
    fn reassembly_concatenates_fragments_in_arrival_order() {
        let text = [
            data_line(json!({"choices": [{"delta": {"content": "Hel"}}]})),
            data_line(json!({"choices": [{"delta": {"content": "lo"}}]})),
            "data: [DONE]".to_string(),
        ]
        .join("\n");

        let result = reassemble_stream(&text, ParseMode::Lenient).expect("reassemble");
        assert_eq!(result["choices"][0]["message"]["content"], "Hello");
        assert_eq!(result["choices"][0]["message"]["role"], "assistant");
        assert!(result["choices"][0].get("delta").is_none());
    }

    #[test]
    fn reassembly_skips_malformed_lines_in_lenient_mode() {
        let text = [
            data_line(json!({"choices": [{"delta": {"content": "Hel"}}]})),
            "data: {not json at all".to_string(),
            data_line(json!({"choices": [{"delta": {"content": "lo"}}]})),
        ]
        .join("\n");

        let result = reassemble_stream(&text, ParseMode::Lenient).expect("reassemble");
        assert_eq!(result["choices"][0]["message"]["content"], "Hello");
    }

    #[test]
    fn reassembly_fails_on_first_malformed_line_in_strict_mode() {
        let text = [
            data_line(json!({"choices": [{"delta": {"content": "Hel"}}]})),
            "data: {not json at all".to_string(),
        ]
        .join("\n");

        let err = reassemble_stream(&text, ParseMode::Strict).expect_err("strict mode");
        assert!(matches!(err, NormalizeError::MalformedLine(_)));
    }

    #[test]
    fn reassembly_tolerates_interleaved_non_data_lines() {
        let text = [
            ": keep-alive".to_string(),
            data_line(json!({"choices": [{"delta": {"content": "a"}}]})),
            "event: message".to_string(),
            data_line(json!({"choices": [{"delta": {"content": "b"}}]})),
            String::new(),
            "data: [DONE]".to_string(),
        ]
        .join("\n");

        let result = reassemble_stream(&text, ParseMode::Lenient).expect("reassemble");
        assert_eq!(result["choices"][0]["message"]["content"], "ab");
    }

    #[test]
    fn reassembly_keeps_last_envelope_as_metadata_template() {
        let text = [
            data_line(json!({
                "id": "early",
                "choices": [{"delta": {"content": "hi"}}]
            })),
            data_line(json!({
                "id": "final",
                "model": "gpt-test",
                "choices": [{"delta": {}, "finish_reason": "stop"}]
            })),
        ]
        .join("\n");

        let result = reassemble_stream(&text, ParseMode::Lenient).expect("reassemble");
        assert_eq!(result["id"], "final");
        assert_eq!(result["model"], "gpt-test");
        assert_eq!(result["choices"][0]["finish_reason"], "stop");
        assert_eq!(result["choices"][0]["message"]["content"], "hi");
    }

    #[test]
    fn reassembly_returns_envelope_unchanged_when_no_content_accumulated() {
        let envelope = json!({
            "id": "no-content",
            "choices": [{"delta": {}, "finish_reason": "stop"}]
        });
        let text = data_line(envelope.clone());

        let result = reassemble_stream(&text, ParseMode::Lenient).expect("reassemble");
        assert_eq!(result, envelope);
    }

    #[test]
    fn reassembly_falls_back_to_stream_sentinel() {
        let text = "some opaque upstream text\nwith no event lines";
        let result = reassemble_stream(text, ParseMode::Lenient).expect("reassemble");
        assert_eq!(result["type"], "stream");
        assert_eq!(result["content"], text);
    }

    #[test]
    fn fragment_parse_marks_done_as_terminal() {
        let fragment = parse_fragment("data: [DONE]")
            .expect("parse")
            .expect("data line");
        assert!(fragment.is_terminal);
        assert!(fragment.envelope.is_none());
    }

    #[test]
    fn fragment_parse_ignores_lines_without_data_prefix() {
        assert!(parse_fragment(": comment").expect("parse").is_none());
        assert!(parse_fragment("event: message").expect("parse").is_none());
    }

    #[test]
    fn json_content_type_passes_through_unchanged() {
        let body = json!({"object": "list", "data": [{"id": "m1"}]});
        let result = normalize("application/json", &body.to_string(), ParseMode::Lenient)
            .expect("normalize");
        assert_eq!(result, body);
    }

    #[test]
    fn json_parse_failure_degrades_to_raw_text() {
        let result =
            normalize("application/json", "<html>oops</html>", ParseMode::Lenient)
                .expect("normalize");
        assert_eq!(result["error"], "parse failed");
        assert_eq!(result["content"], "<html>oops</html>");
    }

    #[test]
    fn event_stream_content_type_triggers_reassembly() {
        let text = data_line(json!({"choices": [{"delta": {"content": "x"}}]}));
        let result = normalize(
            "text/event-stream; charset=utf-8",
            &text,
            ParseMode::Lenient,
        )
        .expect("normalize");
        assert_eq!(result["choices"][0]["message"]["content"], "x");
    }

    #[test]
    fn plain_text_content_type_triggers_reassembly() {
        let result =
            normalize("text/plain", "just text", ParseMode::Lenient).expect("normalize");
        assert_eq!(result["type"], "stream");
    }
}
