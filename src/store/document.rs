//! Document, query, and update representations for the store gateway.
//!
//! Persistent records are stored as JSON objects. Queries are expressed as a
//! small filter tree evaluated against a document, sorts as a list of keys,
//! and updates as a set/unset patch. This is the complete surface the job
//! queue needs; it is deliberately not a general query language.

use serde_json::Value;

/// A persisted document: a JSON object keyed by field name.
pub type Document = serde_json::Map<String, Value>;

/// A filter tree matched against a single document.
///
/// Field lookups are flat (top-level keys only); the queue never queries into
/// embedded records. A missing field and an explicit `null` are equivalent
/// for `Absent`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All sub-filters must match.
    All(Vec<Filter>),

    /// At least one sub-filter must match.
    Any(Vec<Filter>),

    /// Field equals the given value.
    Eq(String, Value),

    /// Field is missing or null.
    Absent(String),

    /// Field is present and orders less than or equal to the given value.
    Lte(String, Value),

    /// Field value is not one of the given values.
    ///
    /// A missing field trivially satisfies the filter.
    Nin(String, Vec<Value>),
}

impl Filter {
    /// Returns true if the document satisfies this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Any(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Eq(field, value) => doc.get(field).is_some_and(|v| v == value),
            Filter::Absent(field) => matches!(doc.get(field), None | Some(Value::Null)),
            Filter::Lte(field, value) => doc
                .get(field)
                .filter(|v| !v.is_null())
                .is_some_and(|v| compare_values(v, value) != std::cmp::Ordering::Greater),
            Filter::Nin(field, values) => match doc.get(field) {
                None | Some(Value::Null) => true,
                Some(v) => !values.contains(v),
            },
        }
    }
}

/// Sort direction for a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A single sort key; earlier keys dominate later ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    /// Ascending sort on the given field.
    pub fn asc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    /// Descending sort on the given field.
    pub fn desc(field: impl Into<String>) -> Self {
        SortKey {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Compares two documents under a list of sort keys.
///
/// Missing fields sort before present ones, which keeps the result total.
/// Callers must use a stable sort so that equal documents retain their
/// storage order.
pub fn compare_documents(a: &Document, b: &Document, keys: &[SortKey]) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    for key in keys {
        let left = a.get(&key.field);
        let right = b.get(&key.field);
        let ord = match (left, right) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(l), Some(r)) => compare_values(l, r),
        };
        let ord = match key.order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compares two JSON values for ordering purposes.
///
/// Numbers compare numerically. Strings that both parse as RFC 3339
/// timestamps compare chronologically; timestamps are persisted as strings
/// with varying sub-second precision, so a plain lexicographic comparison
/// would mis-order them. Everything else falls back to a string comparison
/// of the serialized form.
pub fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => {
            match (
                chrono::DateTime::parse_from_rfc3339(x),
                chrono::DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(tx), Ok(ty)) => tx.cmp(&ty),
                _ => x.cmp(y),
            }
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// A set/unset patch applied to a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    sets: Vec<(String, Value)>,
    unsets: Vec<String>,
}

impl Update {
    pub fn new() -> Self {
        Update::default()
    }

    /// Adds a field assignment to the patch.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((field.into(), value.into()));
        self
    }

    /// Adds a field removal to the patch.
    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unsets.push(field.into());
        self
    }

    /// Builds a patch that sets every field of `doc`.
    ///
    /// Used to persist a full post-image after a state transition.
    pub fn replacing(doc: &Document) -> Self {
        Update {
            sets: doc.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            unsets: Vec::new(),
        }
    }

    /// Applies the patch to a document in place.
    pub fn apply(&self, doc: &mut Document) {
        for (field, value) in &self.sets {
            doc.insert(field.clone(), value.clone());
        }
        for field in &self.unsets {
            doc.remove(field);
        }
    }

    /// The fields assigned by this patch.
    pub fn sets(&self) -> &[(String, Value)] {
        &self.sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    mod filter {
        use super::*;

        #[test]
        fn eq_matches_exact_value() {
            let d = doc(json!({"state": "queued"}));
            assert!(Filter::Eq("state".into(), json!("queued")).matches(&d));
            assert!(!Filter::Eq("state".into(), json!("running")).matches(&d));
        }

        #[test]
        fn absent_matches_missing_and_null() {
            let d = doc(json!({"run_at": null}));
            assert!(Filter::Absent("run_at".into()).matches(&d));
            assert!(Filter::Absent("expires_at".into()).matches(&d));

            let d = doc(json!({"run_at": "2024-01-01T00:00:00Z"}));
            assert!(!Filter::Absent("run_at".into()).matches(&d));
        }

        #[test]
        fn lte_compares_timestamps_chronologically() {
            // Mixed sub-second precision would break a lexicographic compare:
            // '.' sorts before 'Z' even though 00:00:00.5 > 00:00:00.
            let d = doc(json!({"run_at": "2024-01-01T00:00:00.500Z"}));
            assert!(
                !Filter::Lte("run_at".into(), json!("2024-01-01T00:00:00Z")).matches(&d),
                "00:00:00.5 is after 00:00:00"
            );
            assert!(
                Filter::Lte("run_at".into(), json!("2024-01-01T00:00:01Z")).matches(&d)
            );
        }

        #[test]
        fn lte_rejects_missing_field() {
            let d = doc(json!({}));
            assert!(!Filter::Lte("run_at".into(), json!("2024-01-01T00:00:00Z")).matches(&d));
        }

        #[test]
        fn nin_accepts_missing_field() {
            let d = doc(json!({}));
            assert!(Filter::Nin("id".into(), vec![json!("a")]).matches(&d));

            let d = doc(json!({"id": "a"}));
            assert!(!Filter::Nin("id".into(), vec![json!("a")]).matches(&d));
            assert!(Filter::Nin("id".into(), vec![json!("b")]).matches(&d));
        }

        #[test]
        fn all_and_any_compose() {
            let d = doc(json!({"state": "running", "sub_state": "processing"}));
            let dispatchable = Filter::Any(vec![
                Filter::Eq("state".into(), json!("queued")),
                Filter::All(vec![
                    Filter::Eq("state".into(), json!("running")),
                    Filter::Eq("sub_state".into(), json!("processing")),
                ]),
            ]);
            assert!(dispatchable.matches(&d));

            let d = doc(json!({"state": "running"}));
            assert!(!dispatchable.matches(&d));
        }
    }

    mod sorting {
        use super::*;

        #[test]
        fn primary_key_dominates() {
            let a = doc(json!({"priority": 30, "created_at": "2024-01-02T00:00:00Z"}));
            let b = doc(json!({"priority": 70, "created_at": "2024-01-01T00:00:00Z"}));
            let keys = [SortKey::asc("priority"), SortKey::asc("created_at")];
            assert_eq!(
                compare_documents(&a, &b, &keys),
                std::cmp::Ordering::Less
            );
        }

        #[test]
        fn secondary_key_breaks_ties() {
            let a = doc(json!({"priority": 30, "created_at": "2024-01-02T00:00:00Z"}));
            let b = doc(json!({"priority": 30, "created_at": "2024-01-01T00:00:00Z"}));
            let keys = [SortKey::asc("priority"), SortKey::asc("created_at")];
            assert_eq!(
                compare_documents(&a, &b, &keys),
                std::cmp::Ordering::Greater
            );
        }
    }

    mod update {
        use super::*;

        #[test]
        fn set_and_unset_apply_in_order() {
            let mut d = doc(json!({"state": "queued", "worker_name": "w1"}));
            Update::new()
                .set("state", json!("running"))
                .unset("worker_name")
                .apply(&mut d);
            assert_eq!(d.get("state"), Some(&json!("running")));
            assert!(!d.contains_key("worker_name"));
        }

        #[test]
        fn replacing_sets_every_field() {
            let src = doc(json!({"a": 1, "b": "x"}));
            let mut dst = doc(json!({"a": 0}));
            Update::replacing(&src).apply(&mut dst);
            assert_eq!(dst, src);
        }
    }
}
