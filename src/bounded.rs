//! Size policies for the ordered collections kept in storage.
//!
//! Prompts and history are newest-first and evict from the tail. Model configs
//! are append-only and refuse new entries once full. Position is the only
//! ordering used here; nothing is re-sorted by timestamp.

use crate::error::{StoreError, StoreResult};

/// Inserts `item` at the front and drops tail entries past `max_size`.
pub fn insert_front<T>(mut collection: Vec<T>, item: T, max_size: usize) -> Vec<T> {
    collection.insert(0, item);
    enforce_cap(&mut collection, max_size);
    collection
}

/// Truncates from the tail so that at most `max_size` entries remain.
///
/// A cap of zero is treated as one, the smallest well-formed size.
pub fn enforce_cap<T>(collection: &mut Vec<T>, max_size: usize) {
    collection.truncate(max_size.max(1));
}

/// Appends `item` unless the collection already holds `max_size` entries.
///
/// On rejection the collection is left untouched.
pub fn push_back_or_reject<T>(
    collection: &mut Vec<T>,
    item: T,
    max_size: usize,
    kind: &'static str,
) -> StoreResult<()> {
    if collection.len() >= max_size {
        return Err(StoreError::CapacityReached {
            kind,
            max: max_size,
        });
    }
    collection.push(item);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_front_keeps_newest_first() {
        let list = insert_front(vec![2, 1], 3, 5);
        assert_eq!(list, vec![3, 2, 1]);
    }

    #[test]
    fn test_insert_front_evicts_oldest_past_cap() {
        let mut list = Vec::new();
        for i in 0..50 {
            list = insert_front(list, i, 20);
            assert!(list.len() <= 20);
        }
        let expected: Vec<i32> = (30..50).rev().collect();
        assert_eq!(list, expected);
    }

    #[test]
    fn test_eviction_is_positional_not_by_value() {
        // Values out of order must not be re-sorted at eviction time.
        let list = insert_front(vec![1, 9, 5], 0, 3);
        assert_eq!(list, vec![0, 1, 9]);
    }

    #[test]
    fn test_enforce_cap_shrinks_oversized_list() {
        let mut list: Vec<u8> = (0..10).collect();
        enforce_cap(&mut list, 4);
        assert_eq!(list, vec![0, 1, 2, 3]);

        enforce_cap(&mut list, 0);
        assert_eq!(list, vec![0]);
    }

    #[test]
    fn test_push_back_rejects_when_full() {
        let mut list = vec!["a", "b", "c", "d", "e"];
        let err = push_back_or_reject(&mut list, "f", 5, "model config").unwrap_err();
        assert!(matches!(err, StoreError::CapacityReached { max: 5, .. }));
        assert_eq!(list, vec!["a", "b", "c", "d", "e"]);

        list.pop();
        push_back_or_reject(&mut list, "f", 5, "model config").unwrap();
        assert_eq!(list.last(), Some(&"f"));
    }
}
