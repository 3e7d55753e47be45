//! Ordered collection of user-visible error notifications.
//!
//! Indices are assigned from a monotonic counter and double as the dismissal
//! key. Per-resource counts are derived from the entries on every read, so
//! they cannot drift from what the ledger actually holds.

use std::collections::BTreeMap;

use crate::vm_state::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub index: u64,
    pub resource_id: ResourceId,
    pub text: String,
    pub detail: String,
}

/// A notification before the ledger has assigned its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub resource_id: ResourceId,
    pub text: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeMap<u64, Notification>,
    next_index: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append and return the assigned index.
    pub fn add(&mut self, new: NewNotification) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        tracing::debug!(index, resource = %new.resource_id, text = %new.text, "notification added");
        self.entries.insert(
            index,
            Notification {
                index,
                resource_id: new.resource_id,
                text: new.text,
                detail: new.detail,
            },
        );
        index
    }

    /// Remove the entry with `index`. Unknown indices are ignored: a dismissal
    /// may race with something else clearing the ledger.
    pub fn dismiss(&mut self, index: u64) -> Option<Notification> {
        let removed = self.entries.remove(&index);
        if removed.is_none() {
            tracing::debug!(index, "dismissed unknown notification");
        }
        removed
    }

    /// Index the next `add` will assign.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn get(&self, index: u64) -> Option<&Notification> {
        self.entries.get(&index)
    }

    /// All held notifications in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.values()
    }

    /// Notifications for one resource, in insertion order.
    pub fn for_resource<'a>(
        &'a self,
        resource: &'a ResourceId,
    ) -> impl Iterator<Item = &'a Notification> + 'a {
        self.entries.values().filter(move |n| &n.resource_id == resource)
    }

    pub fn count(&self, resource: &ResourceId) -> usize {
        self.for_resource(resource).count()
    }

    pub fn has_errors(&self, resource: &ResourceId) -> bool {
        self.for_resource(resource).next().is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn note(resource: &str, text: &str) -> NewNotification {
        NewNotification {
            resource_id: ResourceId(resource.into()),
            text: text.into(),
            detail: String::new(),
        }
    }

    #[test]
    fn indices_are_sequential() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.add(note("a", "one")), 0);
        assert_eq!(ledger.add(note("b", "two")), 1);
        assert_eq!(ledger.add(note("a", "three")), 2);
    }

    #[test]
    fn indices_are_not_reused_after_dismissal() {
        let mut ledger = Ledger::new();
        let first = ledger.add(note("a", "one"));
        ledger.dismiss(first);
        assert_eq!(ledger.add(note("a", "two")), 1);
    }

    #[test]
    fn dismiss_unknown_index_is_noop() {
        let mut ledger = Ledger::new();
        ledger.add(note("a", "one"));
        let before = ledger.clone();
        assert!(ledger.dismiss(42).is_none());
        assert_eq!(ledger, before);
        assert_eq!(ledger.count(&ResourceId("a".into())), 1);
    }

    #[test]
    fn per_resource_queries_keep_insertion_order() {
        let mut ledger = Ledger::new();
        ledger.add(note("vm", "first"));
        ledger.add(note("net", "other"));
        ledger.add(note("vm", "second"));

        let vm = ResourceId("vm".into());
        let texts: Vec<_> = ledger.for_resource(&vm).map(|n| n.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert!(ledger.has_errors(&vm));
        assert!(!ledger.has_errors(&ResourceId("other".into())));
    }

    #[test]
    fn dismiss_decrements_resource_count() {
        let mut ledger = Ledger::new();
        let i = ledger.add(note("vm", "first"));
        ledger.add(note("vm", "second"));
        let vm = ResourceId("vm".into());
        assert_eq!(ledger.count(&vm), 2);
        let removed = ledger.dismiss(i).unwrap();
        assert_eq!(removed.text, "first");
        assert_eq!(ledger.count(&vm), 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Dismiss(u64),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![(0u8..4).prop_map(Op::Add), (0u64..40).prop_map(Op::Dismiss)]
    }

    proptest! {
        #[test]
        fn counts_match_held_entries(ops in prop::collection::vec(arb_op(), 0..64)) {
            let mut ledger = Ledger::new();
            let mut model: Vec<(u64, u8)> = Vec::new();
            for op in ops {
                match op {
                    Op::Add(r) => {
                        let index = ledger.add(note(&format!("r{r}"), "x"));
                        model.push((index, r));
                    }
                    Op::Dismiss(index) => {
                        ledger.dismiss(index);
                        model.retain(|(i, _)| *i != index);
                    }
                }
                for r in 0u8..4 {
                    let expected = model.iter().filter(|(_, m)| *m == r).count();
                    prop_assert_eq!(ledger.count(&ResourceId(format!("r{r}"))), expected);
                }
                prop_assert_eq!(ledger.len(), model.len());
            }
        }
    }
}
