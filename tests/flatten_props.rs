use proptest::prelude::*;
use tracing_retention_buffer::{LogRecord, ScopeValue, Severity};

fn scope_value() -> impl Strategy<Value = ScopeValue> {
    // A tiny key alphabet forces plenty of collisions, including keys that
    // look like underscore markers.
    let key = prop_oneof![Just("k"), Just("_k"), Just("__k"), Just("_"), Just("id")];
    let value = "[a-z0-9]{1,4}";
    prop_oneof![
        prop::collection::vec((key.clone(), value), 0..4).prop_map(|entries| ScopeValue::map(entries)),
        (key, value).prop_map(|(k, v)| ScopeValue::pair(k, v)),
        value.prop_map(|v| ScopeValue::value(v)),
    ]
}

fn contributions(scopes: &[ScopeValue]) -> usize {
    scopes
        .iter()
        .map(|scope| match scope {
            ScopeValue::Map(entries) => entries.len(),
            ScopeValue::Pair(..) | ScopeValue::Value(_) => 1,
        })
        .sum()
}

fn all_values(scopes: &[ScopeValue]) -> Vec<String> {
    let mut values: Vec<String> = scopes
        .iter()
        .flat_map(|scope| match scope {
            ScopeValue::Map(entries) => entries.iter().map(|(_, v)| v.clone()).collect(),
            ScopeValue::Pair(_, v) | ScopeValue::Value(v) => vec![v.clone()],
        })
        .collect();
    values.sort();
    values
}

proptest! {
    #[test]
    fn flattening_never_loses_a_value(scopes in prop::collection::vec(scope_value(), 0..8)) {
        let record = LogRecord::new("props", Severity::Debug, "m", None, scopes.clone());
        let flat = record.flattened_scopes();

        prop_assert_eq!(flat.len(), contributions(&scopes));

        let mut flattened: Vec<String> = flat.values().cloned().collect();
        flattened.sort();
        prop_assert_eq!(flattened, all_values(&scopes));
    }

    #[test]
    fn flattening_is_deterministic(scopes in prop::collection::vec(scope_value(), 0..8)) {
        let record = LogRecord::new("props", Severity::Debug, "m", None, scopes);
        prop_assert_eq!(record.flattened_scopes(), record.flattened_scopes());
    }
}
