//! Merge Module
//!
//! Pure functions computing a new document from the current document and a
//! partial update.
//!
//! ## Policies
//! - **Replace-fields** (`POST`): shallow union of top-level fields, the
//!   partial's value wins verbatim on collisions.
//! - **Recursive-merge** (`PATCH`): descends only where both sides hold an
//!   object; arrays and scalars in the partial replace wholesale.
//!
//! Neither policy rejects a non-object partial: when the two sides are not
//! both objects the partial simply becomes the result.

use serde_json::Value;

/// A stored JSON document
pub type Document = Value;

/// Shallow overlay of `partial`'s top-level fields onto `current`
pub fn merge_replace(current: Document, partial: Document) -> Document {
    match (current, partial) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            base.extend(overlay);
            Value::Object(base)
        }
        (_, partial) => partial,
    }
}

/// Deep merge of `partial` into `current`
pub fn merge_recursive(current: Document, partial: Document) -> Document {
    match (current, partial) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, incoming) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => {
                        let existing = slot.take();
                        *slot = merge_recursive(existing, incoming);
                    }
                    None => {
                        base.insert(key, incoming);
                    }
                }
            }
            Value::Object(base)
        }
        // Arrays, scalars, null, or a scalar current under an object partial
        (_, partial) => partial,
    }
}
