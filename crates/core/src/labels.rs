use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static INVALID_LABEL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]+").expect("Invalid label regex"));

/// Replace every run of characters not allowed in a label with `_`.
pub fn sanitize_label(value: &str) -> String {
    INVALID_LABEL_CHARS.replace_all(value, "_").into_owned()
}

/// Labels attached to every provisioned resource.
///
/// `global_labels` come from the service definition; the platform-derived
/// keys win on conflict.
pub fn default_labels(
    global_labels: &BTreeMap<String, String>,
    instance_id: &str,
    organization_guid: &str,
    space_guid: &str,
) -> Map<String, Value> {
    let mut labels: Map<String, Value> = global_labels
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    for (key, value) in [
        ("pcf-organization-guid", organization_guid),
        ("pcf-space-guid", space_guid),
        ("pcf-instance-id", instance_id),
    ] {
        labels.insert(key.to_string(), Value::String(sanitize_label(value)));
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitizes_runs_of_invalid_chars() {
        assert_eq!(sanitize_label("a.b..c d"), "a_b_c_d");
        assert_eq!(sanitize_label("ok-value_1"), "ok-value_1");
    }

    #[test]
    fn platform_labels_override_global_ones() {
        let globals = BTreeMap::from([
            ("team".to_string(), "data".to_string()),
            ("pcf-space-guid".to_string(), "stale".to_string()),
        ]);
        let labels = default_labels(&globals, "inst.1", "org", "space:1");
        assert_eq!(
            Value::Object(labels),
            json!({
                "team": "data",
                "pcf-organization-guid": "org",
                "pcf-space-guid": "space_1",
                "pcf-instance-id": "inst_1"
            })
        );
    }
}
