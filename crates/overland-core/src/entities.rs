use std::collections::{BTreeMap, BTreeSet};

use overland_protocol::Urn;

/// Deterministic URN-keyed storage.
///
/// - Stable iteration order: ascending URN.
/// - Removed entries are tombstoned; their URNs are never handed out again.
#[derive(Clone, Debug)]
pub struct UrnTable<T> {
    live: BTreeMap<Urn, T>,
    tombstones: BTreeSet<Urn>,
}

impl<T> Default for UrnTable<T> {
    fn default() -> Self {
        Self {
            live: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }
}

impl<T> UrnTable<T> {
    pub fn insert(&mut self, urn: Urn, value: T) {
        debug_assert!(!self.tombstones.contains(&urn), "URN {urn} reused");
        self.live.insert(urn, value);
    }

    pub fn get(&self, urn: Urn) -> Option<&T> {
        self.live.get(&urn)
    }

    pub fn get_mut(&mut self, urn: Urn) -> Option<&mut T> {
        self.live.get_mut(&urn)
    }

    pub fn remove(&mut self, urn: Urn) -> Option<T> {
        let value = self.live.remove(&urn)?;
        self.tombstones.insert(urn);
        Some(value)
    }

    pub fn contains(&self, urn: Urn) -> bool {
        self.live.contains_key(&urn)
    }

    pub fn is_tombstoned(&self, urn: Urn) -> bool {
        self.tombstones.contains(&urn)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Urn, &T)> {
        self.live.iter().map(|(urn, v)| (*urn, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Urn, &mut T)> {
        self.live.iter_mut().map(|(urn, v)| (*urn, v))
    }

    pub fn urns(&self) -> impl Iterator<Item = Urn> + '_ {
        self.live.keys().copied()
    }
}

/// Hands out URNs for every entity kind of one session, in increasing order.
#[derive(Clone, Debug, Default)]
pub struct UrnAllocator {
    next: u64,
}

impl UrnAllocator {
    pub fn allocate(&mut self) -> Urn {
        self.next += 1;
        Urn(self.next)
    }

    pub fn last_issued(&self) -> Option<Urn> {
        (self.next > 0).then_some(Urn(self.next))
    }
}
