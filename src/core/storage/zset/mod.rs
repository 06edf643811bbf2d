// src/core/storage/zset/mod.rs

//! The sorted set value type: a member map for O(1) score lookup plus a
//! skip list ordered by (score, member). The two structures are kept in
//! lock-step by every mutation.

pub mod border;
pub mod skiplist;

pub use border::ScoreBorder;
pub use skiplist::SkipList;

use bytes::Bytes;
use std::collections::HashMap;

/// One member of a sorted set together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub member: Bytes,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    map: HashMap<Bytes, f64>,
    list: SkipList,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member, replacing its score if it already exists.
    /// Returns true when the member is new.
    pub fn add(&mut self, member: Bytes, score: f64) -> bool {
        match self.map.insert(member.clone(), score) {
            Some(old_score) => {
                if old_score != score {
                    self.list.remove(&member, old_score);
                    self.list.insert(member, score);
                }
                false
            }
            None => {
                self.list.insert(member, score);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn score(&self, member: &Bytes) -> Option<f64> {
        self.map.get(member).copied()
    }

    pub fn remove(&mut self, member: &Bytes) -> bool {
        if let Some(score) = self.map.remove(member) {
            self.list.remove(member, score);
            true
        } else {
            false
        }
    }

    /// 0-based ascending rank of a member.
    pub fn rank(&self, member: &Bytes) -> Option<u64> {
        let score = self.map.get(member)?;
        let rank = self.list.rank_of(member, *score);
        (rank > 0).then(|| rank - 1)
    }

    /// Elements whose 0-based rank lies in `[start, stop)`.
    pub fn range_by_rank(&self, start: u64, stop: u64) -> Vec<Element> {
        let mut out = Vec::new();
        if start >= stop {
            return out;
        }
        let mut rank = start + 1;
        while rank <= stop && rank <= self.list.len() {
            if let Some(element) = self.list.by_rank(rank) {
                out.push(element);
            }
            rank += 1;
        }
        out
    }

    /// Elements with scores inside `[min, max]` borders, with optional
    /// offset/limit, in (score, member) order.
    pub fn range_by_score(
        &self,
        min: &ScoreBorder,
        max: &ScoreBorder,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<Element> {
        self.list.range_by_score(min, max, offset, limit)
    }

    pub fn count(&self, min: &ScoreBorder, max: &ScoreBorder) -> usize {
        self.list.count_in_range(min, max)
    }

    /// Removes every element in score range and returns the removed elements,
    /// purging the member map in the same step.
    pub fn remove_range_by_score(&mut self, min: &ScoreBorder, max: &ScoreBorder) -> Vec<Element> {
        let removed = self.list.remove_range_by_score(min, max, 0);
        for element in &removed {
            self.map.remove(&element.member);
        }
        removed
    }

    /// Removes elements with 0-based rank in `[start, stop)` and returns them.
    pub fn remove_range_by_rank(&mut self, start: u64, stop: u64) -> Vec<Element> {
        let removed = self.list.remove_range_by_rank(start + 1, stop + 1);
        for element in &removed {
            self.map.remove(&element.member);
        }
        removed
    }

    /// In-order iteration over all elements.
    pub fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.list.iter()
    }
}
