use serde_json::Value;

/// One extraction rule: a pure probe from a JSON value to a candidate entry
/// array. Rules are tried in priority order until one yields a non-empty
/// sequence, which keeps each heuristic independently testable.
type Strategy = fn(&Value) -> Option<&Vec<Value>>;

const STRATEGIES: &[Strategy] = &[
    data_field,
    root_array,
    models_field,
    list_envelope,
    first_array_field,
];

fn data_field(value: &Value) -> Option<&Vec<Value>> {
    value.get("data")?.as_array()
}

fn root_array(value: &Value) -> Option<&Vec<Value>> {
    value.as_array()
}

fn models_field(value: &Value) -> Option<&Vec<Value>> {
    value.get("models")?.as_array()
}

fn list_envelope(value: &Value) -> Option<&Vec<Value>> {
    if value.get("object").and_then(Value::as_str) != Some("list") {
        return None;
    }
    value.get("data")?.as_array()
}

fn first_array_field(value: &Value) -> Option<&Vec<Value>> {
    value.as_object()?.values().find_map(Value::as_array)
}

/// Locates the model entry array inside an arbitrary "list models" payload.
/// Returns an empty slice when no array-shaped field exists.
pub fn extract_entries(value: &Value) -> &[Value] {
    for strategy in STRATEGIES {
        if let Some(entries) = strategy(value) {
            if !entries.is_empty() {
                return entries;
            }
        }
    }
    &[]
}

/// Derives a display string for one model entry of unknown shape.
pub fn display_name(entry: &Value, index: usize) -> String {
    if let Some(text) = entry.as_str() {
        return text.to_string();
    }
    for key in ["id", "name"] {
        if let Some(text) = entry.get(key).and_then(Value::as_str) {
            return text.to_string();
        }
    }
    format!("model-{index}")
}

/// Shape-agnostic model-list extraction: finds the entry array and maps each
/// entry to a display name. Never fails; an empty result means no models
/// were discovered.
pub fn extract_model_ids(value: &Value) -> Vec<String> {
    extract_entries(value)
        .iter()
        .enumerate()
        .map(|(index, entry)| display_name(entry, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{display_name, extract_model_ids};
    use serde_json::json;

    #[test]
    fn extracts_from_data_field() {
        let payload = json!({"data": [{"id": "m1"}]});
        assert_eq!(extract_model_ids(&payload), vec!["m1"]);
    }

    #[test]
    fn extracts_from_root_array() {
        let payload = json!(["m1"]);
        assert_eq!(extract_model_ids(&payload), vec!["m1"]);
    }

    #[test]
    fn extracts_from_models_field() {
        let payload = json!({"models": [{"name": "m1"}]});
        assert_eq!(extract_model_ids(&payload), vec!["m1"]);
    }

    #[test]
    fn extracts_from_openai_list_envelope() {
        let payload = json!({"object": "list", "data": [{"id": "m1"}]});
        assert_eq!(extract_model_ids(&payload), vec!["m1"]);
    }

    #[test]
    fn falls_back_to_first_array_shaped_field() {
        let payload = json!({"meta": "x", "available": [{"id": "m1"}, {"id": "m2"}]});
        assert_eq!(extract_model_ids(&payload), vec!["m1", "m2"]);
    }

    #[test]
    fn empty_data_field_falls_through_to_later_strategies() {
        let payload = json!({"data": [], "models": ["m1"]});
        assert_eq!(extract_model_ids(&payload), vec!["m1"]);
    }

    #[test]
    fn returns_empty_list_when_nothing_array_shaped_exists() {
        assert!(extract_model_ids(&json!({})).is_empty());
        assert!(extract_model_ids(&json!({"unrelated": "x"})).is_empty());
        assert!(extract_model_ids(&json!("just a string")).is_empty());
    }

    #[test]
    fn display_name_prefers_string_then_id_then_name() {
        assert_eq!(display_name(&json!("plain"), 0), "plain");
        assert_eq!(display_name(&json!({"id": "by-id", "name": "by-name"}), 0), "by-id");
        assert_eq!(display_name(&json!({"name": "by-name"}), 0), "by-name");
    }

    #[test]
    fn display_name_synthesizes_positional_placeholder() {
        assert_eq!(display_name(&json!({"created": 123}), 4), "model-4");
    }

    #[test]
    fn mixed_entry_shapes_each_resolve_independently() {
        let payload = json!(["m1", {"id": "m2"}, {"name": "m3"}, {"created": 1}]);
        assert_eq!(extract_model_ids(&payload), vec!["m1", "m2", "m3", "model-3"]);
    }
}
