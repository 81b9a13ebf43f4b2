//! Property-based tests for session state storage
//!
//! Reconciliation must always converge on the newest row, and merges must
//! only touch the keys they supply.

use super::*;
use chrono::Duration;
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_data() -> impl Strategy<Value = BTreeMap<String, String>> {
    proptest::collection::btree_map("[a-e]", "[a-z0-9]{1,6}", 0..5)
}

/// Distinct second offsets for duplicate rows, in arbitrary insertion order
fn arb_offsets() -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::btree_set(0i64..10_000, 1..12)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

proptest! {
    /// Any number of duplicates collapses to the single newest row
    #[test]
    fn prop_reconcile_keeps_max_updated_at(offsets in arb_offsets()) {
        let db = Database::open_in_memory().unwrap();
        let key = SessionKey::new("thread", "agent");
        let base = Utc::now();

        let mut newest: Option<(i64, i64)> = None;
        for offset in &offsets {
            let row = db.insert_session_at(&key, base + Duration::seconds(*offset)).unwrap();
            if newest.map_or(true, |(best, _)| *offset > best) {
                newest = Some((*offset, row.row_id));
            }
        }

        let removed = db.reconcile(&key).unwrap();
        prop_assert_eq!(removed, offsets.len() - 1);

        let rows = db.list_session_rows(&key).unwrap();
        prop_assert_eq!(rows.len(), 1);
        prop_assert_eq!(Some(rows[0].row_id), newest.map(|(_, id)| id));
    }

    /// A merge never loses keys it did not supply
    #[test]
    fn prop_merge_only_touches_supplied_keys(first in arb_data(), second in arb_data()) {
        let db = Database::open_in_memory().unwrap();
        let key = SessionKey::new("thread", "agent");

        db.merge_write(&key, &StateDelta::data(first.clone(), BTreeMap::new(), true)).unwrap();
        let rec = db.merge_write(&key, &StateDelta::data(second.clone(), BTreeMap::new(), true)).unwrap();

        let mut expected = first;
        expected.extend(second);
        prop_assert_eq!(rec.collected_data, expected);
    }

    /// Replace leaves exactly the supplied payload
    #[test]
    fn prop_replace_is_exact(first in arb_data(), second in arb_data()) {
        let db = Database::open_in_memory().unwrap();
        let key = SessionKey::new("thread", "agent");

        db.merge_write(&key, &StateDelta::data(first, BTreeMap::new(), true)).unwrap();
        db.merge_write(&key, &StateDelta::data(second.clone(), BTreeMap::new(), false)).unwrap();

        let stored = db.get_session(&key).unwrap().unwrap();
        prop_assert_eq!(stored.collected_data, second);
    }

    /// Success rate stays a percentage
    #[test]
    fn prop_success_rate_bounded(
        outcomes in proptest::collection::vec(any::<bool>(), 1..40)
    ) {
        let mut rate = 0.0;
        for (count, success) in outcomes.iter().enumerate() {
            rate = next_success_rate(rate, count as i64, *success);
            prop_assert!((0.0..=100.0).contains(&rate));
        }
    }
}
