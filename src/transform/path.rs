//! Dotted-path access into documents.

use crate::document::{Document, Value};

/// Remove the value at `dotted` from `doc` and return it.
///
/// Every segment but the last must name a sub-document, otherwise nothing is
/// touched. Once the walk reaches the last segment, sub-documents left empty
/// along the path are removed too, even when nothing was found at the end.
pub fn take_dotted(doc: &mut Document, dotted: &str) -> Option<Value> {
    let segments: Vec<&str> = dotted.split('.').collect();
    take_segments(doc, &segments).flatten()
}

/// `None` when the walk stopped at a missing or non-document segment.
fn take_segments(doc: &mut Document, segments: &[&str]) -> Option<Option<Value>> {
    match segments {
        [] => None,
        [last] => Some(doc.remove(last)),
        [head, rest @ ..] => {
            let child = doc.get_mut(head)?.as_document_mut()?;
            let taken = take_segments(child, rest)?;
            if child.is_empty() {
                doc.remove(head);
            }
            Some(taken)
        }
    }
}

/// Whether `dotted` is present, even with a `null` value.
pub fn exists_dotted(doc: &Document, dotted: &str) -> bool {
    let mut segments = dotted.split('.').peekable();
    let mut current = doc;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            return current.contains_key(segment);
        }
        match current.get(segment).and_then(Value::as_document) {
            Some(child) => current = child,
            None => return false,
        }
    }
    false
}

/// The `index`-th element of the top-level array `field`.
pub fn array_element<'a>(doc: &'a Document, field: &str, index: usize) -> Option<&'a Value> {
    match doc.get(field)? {
        Value::Array(items) => items.get(index),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_extended_json(value).unwrap()
    }

    #[test]
    fn test_take_top_level() {
        let mut d = doc(json!({"a": 1, "b": 2}));
        assert_eq!(take_dotted(&mut d, "a"), Some(Value::Int(1)));
        assert_eq!(d, doc(json!({"b": 2})));
        assert_eq!(take_dotted(&mut d, "a"), None);
    }

    #[test]
    fn test_take_nested_keeps_siblings() {
        let mut d = doc(json!({"vars": {"a": 1, "c": 6}, "x": 0}));
        assert_eq!(take_dotted(&mut d, "vars.a"), Some(Value::Int(1)));
        assert_eq!(d, doc(json!({"vars": {"c": 6}, "x": 0})));
    }

    #[test]
    fn test_take_prunes_emptied_parents() {
        let mut d = doc(json!({"a": {"b": {"c": 1}}, "keep": true}));
        assert_eq!(take_dotted(&mut d, "a.b.c"), Some(Value::Int(1)));
        assert_eq!(d, doc(json!({"keep": true})));

        // Empty containers are pruned even when the leaf is missing.
        let mut d = doc(json!({"vars": {}}));
        assert_eq!(take_dotted(&mut d, "vars.b"), None);
        assert!(d.is_empty());
    }

    #[test]
    fn test_aborted_walk_leaves_empty_parents() {
        let mut d = doc(json!({"a": {}, "z": 1}));
        assert_eq!(take_dotted(&mut d, "a.b.c"), None);
        assert_eq!(d, doc(json!({"a": {}, "z": 1})));

        let mut d = doc(json!({"a": {"b": 5}}));
        assert_eq!(take_dotted(&mut d, "a.b.c"), None);
        assert_eq!(d, doc(json!({"a": {"b": 5}})));
    }

    #[test]
    fn test_take_through_non_document_is_not_found() {
        let mut d = doc(json!({"a": 5, "l": [{"b": 1}]}));
        assert_eq!(take_dotted(&mut d, "a.b"), None);
        assert_eq!(take_dotted(&mut d, "l.b"), None);
        assert_eq!(d, doc(json!({"a": 5, "l": [{"b": 1}]})));
    }

    #[test]
    fn test_exists() {
        let d = doc(json!({"a": {"b": null}, "s": "str"}));
        assert!(exists_dotted(&d, "a.b"));
        assert!(exists_dotted(&d, "a"));
        assert!(!exists_dotted(&d, "a.c"));
        assert!(!exists_dotted(&d, "s.b"));
        assert!(!exists_dotted(&d, "missing.b"));
    }

    #[test]
    fn test_array_element() {
        let d = doc(json!({"vars": ["{1}", 2], "s": "abc"}));
        assert_eq!(array_element(&d, "vars", 0), Some(&Value::String("{1}".into())));
        assert_eq!(array_element(&d, "vars", 5), None);
        assert_eq!(array_element(&d, "s", 0), None);
        assert_eq!(array_element(&d, "missing", 0), None);
    }
}
