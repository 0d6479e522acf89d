use crate::{Error, Rank, Result};

use std::collections::btree_map::{BTreeMap, Entry};

/// Remote rank to channel. A rank is registered at most once.
pub struct RankMap<C> {
    entries: BTreeMap<Rank, C>,
}

impl<C> RankMap<C> {
    pub fn new() -> Self {
        RankMap { entries: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, rank: Rank) -> bool {
        self.entries.contains_key(&rank)
    }

    /// Registers `channel` for `rank`, rejecting negative and already registered ranks.
    pub fn register(&mut self, rank: Rank, channel: C) -> Result<()> {
        if rank < 0 {
            return Err(Error::InvalidRank(rank));
        }
        match self.entries.entry(rank) {
            Entry::Vacant(entry) => {
                entry.insert(channel);
                Ok(())
            }
            Entry::Occupied(_) => Err(Error::DuplicateRank(rank)),
        }
    }

    pub fn get(&self, rank: Rank) -> Option<&C> {
        self.entries.get(&rank)
    }

    pub fn get_mut(&mut self, rank: Rank) -> Option<&mut C> {
        self.entries.get_mut(&rank)
    }

    /// Registered ranks in ascending order.
    pub fn ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.entries.keys().cloned()
    }

    /// Empties the map, yielding every entry in ascending rank order.
    pub fn drain(&mut self) -> impl Iterator<Item = (Rank, C)> {
        std::mem::take(&mut self.entries).into_iter()
    }
}

impl<C> Default for RankMap<C> {
    fn default() -> Self {
        RankMap::new()
    }
}

impl<C> std::fmt::Debug for RankMap<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_duplicates_without_overwriting() {
        let mut map = RankMap::new();
        map.register(4, "first").unwrap();
        match map.register(4, "second") {
            Err(Error::DuplicateRank(4)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(map.get(4), Some(&"first"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn register_rejects_negative_ranks() {
        let mut map = RankMap::new();
        match map.register(-1, ()) {
            Err(Error::InvalidRank(-1)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(map.is_empty());
    }

    #[test]
    fn lookup_of_absent_rank_does_not_insert() {
        let mut map: RankMap<u8> = RankMap::new();
        map.register(1, 10).unwrap();
        assert!(map.get(2).is_none());
        assert!(map.get_mut(2).is_none());
        assert!(!map.contains(2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn ranks_ascend_and_drain_clears() {
        let mut map = RankMap::new();
        for rank in [9, 0, 5].iter() {
            map.register(*rank, rank * 2).unwrap();
        }
        assert_eq!(map.ranks().collect::<Vec<Rank>>(), vec![0, 5, 9]);
        assert_eq!(format!("{:?}", map), "{0, 5, 9}");

        let drained = map.drain().collect::<Vec<(Rank, i32)>>();
        assert_eq!(drained, vec![(0, 0), (5, 10), (9, 18)]);
        assert!(map.is_empty());
    }
}
