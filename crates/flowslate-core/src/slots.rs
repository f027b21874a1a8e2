//! Drag-into-slots progress.
//!
//! A drag-into-slots embed is configured with `slot=` and `piece=` parameters,
//! each a JSON object with a `name`. Learners report placements as
//! `filledSlots: [{slot, piece}]`. Before showing the embed again, each
//! placement is written back into its slot so the learner sees where they
//! left off.

use serde_json::Value;

use crate::query::{CanonicalQuery, encode_pairs, parse_pairs};

/// Response id under which drag-into-slots reports placements.
pub const FILLED_SLOTS: &str = "filledSlots";

/// Splice `filled_slots` into the `slot=` parameters of `query`.
///
/// Placements whose slot or piece cannot be found by name are dropped. Slots
/// move to the end of the query, after every other parameter; with no
/// placements the query is returned unchanged.
pub fn merge_filled_slots(query: &str, filled_slots: Option<&Value>) -> CanonicalQuery {
    let placements = match filled_slots.and_then(Value::as_array) {
        Some(list) if !list.is_empty() => list,
        _ => return CanonicalQuery::from_encoded(query),
    };

    let pairs = parse_pairs(query);
    let pieces: Vec<Value> = pairs
        .iter()
        .filter(|(k, _)| k == "piece")
        .filter_map(|(_, v)| serde_json::from_str(v).ok())
        .collect();
    let mut slots: Vec<Result<Value, &str>> = pairs
        .iter()
        .filter(|(k, _)| k == "slot")
        .map(|(_, v)| serde_json::from_str(v).map_err(|_| v.as_str()))
        .collect();

    for placement in placements {
        let piece = pieces
            .iter()
            .find(|p| same_name(p.get("name"), placement.get("piece")));
        let slot = slots
            .iter_mut()
            .filter_map(|s| s.as_mut().ok())
            .find(|s| same_name(s.get("name"), placement.get("slot")));
        match (slot, piece) {
            (Some(Value::Object(slot)), Some(piece)) => {
                slot.insert("piece".into(), piece.clone());
            }
            _ => tracing::trace!(?placement, "placement has no matching slot or piece"),
        }
    }

    let rendered: Vec<String> = slots
        .iter()
        .map(|s| match s {
            Ok(value) => value.to_string(),
            Err(raw) => (*raw).to_owned(),
        })
        .collect();
    encode_pairs(
        pairs
            .iter()
            .filter(|(k, _)| k != "slot")
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(rendered.iter().map(|s| ("slot", s.as_str()))),
    )
}

fn same_name(name: Option<&Value>, reported: Option<&Value>) -> bool {
    matches!((name, reported), (Some(a), Some(b)) if a == b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(slots: &[Value], pieces: &[Value]) -> String {
        let slots: Vec<String> = slots.iter().map(Value::to_string).collect();
        let pieces: Vec<String> = pieces.iter().map(Value::to_string).collect();
        encode_pairs(
            std::iter::once(("image", "bg.png"))
                .chain(slots.iter().map(|s| ("slot", s.as_str())))
                .chain(pieces.iter().map(|p| ("piece", p.as_str()))),
        )
        .into_string()
    }

    #[test]
    fn test_placement_fills_matching_slot() {
        let q = query(
            &[json!({ "name": "s1" }), json!({ "name": "s2" })],
            &[json!({ "name": "p1", "text": "cat" })],
        );
        let merged = merge_filled_slots(&q, Some(&json!([{ "slot": "s2", "piece": "p1" }])));
        let slots: Vec<Value> = merged
            .get_all("slot")
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect();
        assert_eq!(
            slots,
            [
                json!({ "name": "s1" }),
                json!({ "name": "s2", "piece": { "name": "p1", "text": "cat" } }),
            ]
        );
        assert_eq!(merged.get_all("image"), ["bg.png"]);
        assert_eq!(merged.get_all("piece").len(), 1);
        // slots are re-appended after the other parameters
        assert_eq!(merged.pairs().last().map(|(k, _)| k.as_str()), Some("slot"));
    }

    #[test]
    fn test_unmatched_placement_dropped() {
        let q = query(&[json!({ "name": "s1" })], &[json!({ "name": "p1" })]);
        let merged = merge_filled_slots(
            &q,
            Some(&json!([
                { "slot": "missing", "piece": "p1" },
                { "slot": "s1", "piece": "missing" },
            ])),
        );
        let slots = merged.get_all("slot");
        assert_eq!(slots.len(), 1);
        assert_eq!(serde_json::from_str::<Value>(&slots[0]).unwrap(), json!({ "name": "s1" }));
    }

    #[test]
    fn test_no_placements_leaves_query() {
        let q = query(&[json!({ "name": "s1" })], &[]);
        assert_eq!(merge_filled_slots(&q, None).as_str(), q);
        assert_eq!(merge_filled_slots(&q, Some(&json!([]))).as_str(), q);
    }
}
