// src/core/storage/zset/skiplist.rs

//! A probabilistic skip list ordered by (score ascending, member ascending),
//! carrying per-link spans so rank queries run in O(log n).
//!
//! Nodes live in an internal arena and refer to each other by index, so the
//! forward/backward links never share ownership.

use super::Element;
use super::border::{ScoreBorder, range_is_empty};
use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const MAX_LEVEL: usize = 16;
const PROMOTE_P: f32 = 0.25;

/// Arena index of the header node.
const HEADER: usize = 0;
/// Sentinel for "no node".
const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct LevelLink {
    forward: usize,
    /// Number of level-0 hops this link covers.
    span: u64,
}

impl Default for LevelLink {
    fn default() -> Self {
        Self {
            forward: NIL,
            span: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    member: Bytes,
    score: f64,
    backward: usize,
    levels: Vec<LevelLink>,
}

#[derive(Debug, Clone)]
pub struct SkipList {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    tail: usize,
    length: u64,
    level: usize,
    rng: SmallRng,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    pub fn new() -> Self {
        let header = Node {
            member: Bytes::new(),
            score: 0.0,
            backward: NIL,
            levels: vec![LevelLink::default(); MAX_LEVEL],
        };
        Self {
            nodes: vec![Some(header)],
            free: Vec::new(),
            tail: NIL,
            length: 0,
            level: 1,
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx].as_ref().unwrap()
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx].as_mut().unwrap()
    }

    fn alloc(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn dealloc(&mut self, idx: usize) {
        self.nodes[idx] = None;
        self.free.push(idx);
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.r#gen::<f32>() < PROMOTE_P {
            level += 1;
        }
        level
    }

    /// True when `(score, member)` orders strictly after the node at `idx`.
    fn orders_after(&self, idx: usize, member: &Bytes, score: f64) -> bool {
        let n = self.node(idx);
        n.score < score || (n.score == score && n.member < *member)
    }

    pub fn insert(&mut self, member: Bytes, score: f64) {
        let mut update = [HEADER; MAX_LEVEL];
        let mut rank = [0u64; MAX_LEVEL];

        // Walk down the levels, recording the rightmost node before the
        // insertion point and the rank accumulated to reach it.
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            loop {
                let link = self.node(x).levels[i];
                if link.forward != NIL && self.orders_after(link.forward, &member, score) {
                    rank[i] += link.span;
                    x = link.forward;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEADER;
                self.node_mut(HEADER).levels[i].span = self.length;
            }
            self.level = level;
        }

        let idx = self.alloc(Node {
            member,
            score,
            backward: NIL,
            levels: vec![LevelLink::default(); level],
        });

        for i in 0..level {
            let up = update[i];
            let up_link = self.node(up).levels[i];
            {
                let n = self.node_mut(idx);
                n.levels[i].forward = up_link.forward;
                n.levels[i].span = up_link.span - (rank[0] - rank[i]);
            }
            let u = self.node_mut(up);
            u.levels[i].forward = idx;
            u.levels[i].span = rank[0] - rank[i] + 1;
        }
        for i in level..self.level {
            self.node_mut(update[i]).levels[i].span += 1;
        }

        self.node_mut(idx).backward = if update[0] == HEADER { NIL } else { update[0] };
        let fwd0 = self.node(idx).levels[0].forward;
        if fwd0 != NIL {
            self.node_mut(fwd0).backward = idx;
        } else {
            self.tail = idx;
        }
        self.length += 1;
    }

    /// Unlinks `idx` given the per-level predecessors in `update`.
    fn remove_node(&mut self, idx: usize, update: &[usize; MAX_LEVEL]) {
        for i in 0..self.level {
            let up = update[i];
            if self.node(up).levels[i].forward == idx {
                let link = self.node(idx).levels[i];
                let u = self.node_mut(up);
                u.levels[i].span += link.span - 1;
                u.levels[i].forward = link.forward;
            } else {
                self.node_mut(up).levels[i].span -= 1;
            }
        }

        let fwd0 = self.node(idx).levels[0].forward;
        let back = self.node(idx).backward;
        if fwd0 != NIL {
            self.node_mut(fwd0).backward = back;
        } else {
            self.tail = back;
        }

        while self.level > 1 && self.node(HEADER).levels[self.level - 1].forward == NIL {
            self.level -= 1;
        }
        self.length -= 1;
        self.dealloc(idx);
    }

    /// Collects the per-level predecessors of `(member, score)`.
    fn predecessors(&self, member: &Bytes, score: f64) -> [usize; MAX_LEVEL] {
        let mut update = [HEADER; MAX_LEVEL];
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            loop {
                let link = self.node(x).levels[i];
                if link.forward != NIL && self.orders_after(link.forward, member, score) {
                    x = link.forward;
                } else {
                    break;
                }
            }
            update[i] = x;
        }
        update
    }

    pub fn remove(&mut self, member: &Bytes, score: f64) -> bool {
        let update = self.predecessors(member, score);
        let candidate = self.node(update[0]).levels[0].forward;
        if candidate != NIL {
            let n = self.node(candidate);
            if n.score == score && n.member == *member {
                self.remove_node(candidate, &update);
                return true;
            }
        }
        false
    }

    /// 1-based rank of `(member, score)`; 0 when the pair is not present.
    pub fn rank_of(&self, member: &Bytes, score: f64) -> u64 {
        let mut rank = 0u64;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            loop {
                let link = self.node(x).levels[i];
                if link.forward != NIL {
                    let fwd = self.node(link.forward);
                    if fwd.score < score || (fwd.score == score && fwd.member <= *member) {
                        rank += link.span;
                        x = link.forward;
                        continue;
                    }
                }
                break;
            }
            if x != HEADER && self.node(x).member == *member {
                return rank;
            }
        }
        0
    }

    /// The element at 1-based `rank`, when in range.
    pub fn by_rank(&self, rank: u64) -> Option<Element> {
        if rank == 0 || rank > self.length {
            return None;
        }
        let mut traversed = 0u64;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            loop {
                let link = self.node(x).levels[i];
                if link.forward != NIL && traversed + link.span <= rank {
                    traversed += link.span;
                    x = link.forward;
                } else {
                    break;
                }
            }
            if traversed == rank {
                let n = self.node(x);
                return Some(Element {
                    member: n.member.clone(),
                    score: n.score,
                });
            }
        }
        None
    }

    pub fn has_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> bool {
        if range_is_empty(min, max) {
            return false;
        }
        if self.tail == NIL || !min.lte(self.node(self.tail).score) {
            return false;
        }
        let first = self.node(HEADER).levels[0].forward;
        if first == NIL || !max.gte(self.node(first).score) {
            return false;
        }
        true
    }

    fn first_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> Option<usize> {
        if !self.has_in_range(min, max) {
            return None;
        }
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            loop {
                let link = self.node(x).levels[i];
                if link.forward != NIL && !min.lte(self.node(link.forward).score) {
                    x = link.forward;
                } else {
                    break;
                }
            }
        }
        let first = self.node(x).levels[0].forward;
        if first != NIL && max.gte(self.node(first).score) {
            Some(first)
        } else {
            None
        }
    }

    /// Elements with `min <= score <= max` in order, skipping `offset` and
    /// returning at most `limit` (`None` = unbounded).
    pub fn range_by_score(
        &self,
        min: &ScoreBorder,
        max: &ScoreBorder,
        offset: usize,
        limit: Option<usize>,
    ) -> Vec<Element> {
        let mut out = Vec::new();
        let Some(mut idx) = self.first_in_range(min, max) else {
            return out;
        };
        let mut skipped = 0;
        while idx != NIL {
            let n = self.node(idx);
            if !max.gte(n.score) {
                break;
            }
            if skipped < offset {
                skipped += 1;
            } else {
                out.push(Element {
                    member: n.member.clone(),
                    score: n.score,
                });
                if limit.is_some_and(|l| out.len() >= l) {
                    break;
                }
            }
            idx = n.levels[0].forward;
        }
        out
    }

    pub fn count_in_range(&self, min: &ScoreBorder, max: &ScoreBorder) -> usize {
        let mut count = 0;
        let Some(mut idx) = self.first_in_range(min, max) else {
            return 0;
        };
        while idx != NIL {
            let n = self.node(idx);
            if !max.gte(n.score) {
                break;
            }
            count += 1;
            idx = n.levels[0].forward;
        }
        count
    }

    /// Removes up to `limit` elements in score range (0 = unlimited) and
    /// returns them so the caller can purge its member map in lock-step.
    pub fn remove_range_by_score(
        &mut self,
        min: &ScoreBorder,
        max: &ScoreBorder,
        limit: usize,
    ) -> Vec<Element> {
        let mut removed = Vec::new();
        let mut update = [HEADER; MAX_LEVEL];
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            loop {
                let link = self.node(x).levels[i];
                if link.forward != NIL && !min.lte(self.node(link.forward).score) {
                    x = link.forward;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        let mut idx = self.node(x).levels[0].forward;
        while idx != NIL {
            let n = self.node(idx);
            if !max.gte(n.score) {
                break;
            }
            let next = n.levels[0].forward;
            removed.push(Element {
                member: n.member.clone(),
                score: n.score,
            });
            self.remove_node(idx, &update);
            if limit > 0 && removed.len() == limit {
                break;
            }
            idx = next;
        }
        removed
    }

    /// Removes elements whose 1-based rank lies in `[start, stop)`.
    pub fn remove_range_by_rank(&mut self, start: u64, stop: u64) -> Vec<Element> {
        let mut removed = Vec::new();
        let mut update = [HEADER; MAX_LEVEL];
        let mut traversed = 0u64;
        let mut x = HEADER;
        for i in (0..self.level).rev() {
            loop {
                let link = self.node(x).levels[i];
                if link.forward != NIL && traversed + link.span < start {
                    traversed += link.span;
                    x = link.forward;
                } else {
                    break;
                }
            }
            update[i] = x;
        }

        traversed += 1;
        let mut idx = self.node(x).levels[0].forward;
        while idx != NIL && traversed < stop {
            let n = self.node(idx);
            let next = n.levels[0].forward;
            removed.push(Element {
                member: n.member.clone(),
                score: n.score,
            });
            self.remove_node(idx, &update);
            idx = next;
            traversed += 1;
        }
        removed
    }

    /// In-order iteration over all elements.
    pub fn iter(&self) -> SkipListIter<'_> {
        SkipListIter {
            list: self,
            idx: self.node(HEADER).levels[0].forward,
        }
    }
}

pub struct SkipListIter<'a> {
    list: &'a SkipList,
    idx: usize,
}

impl Iterator for SkipListIter<'_> {
    type Item = Element;

    fn next(&mut self) -> Option<Element> {
        if self.idx == NIL {
            return None;
        }
        let n = self.list.node(self.idx);
        self.idx = n.levels[0].forward;
        Some(Element {
            member: n.member.clone(),
            score: n.score,
        })
    }
}
