//! Walks the commit graph backwards from a set of heads.
//!
//! The walk is iterative: each head seeds a queue of `(cid, generation)`
//! pairs and the queue is drained breadth-first before the next head is
//! taken. A visited set shared by all heads yields every commit once.

use std::collections::{HashSet, VecDeque};

use tracing::trace;

use crate::address::Cid;
use crate::query::context::QueryContext;
use crate::query::error::QueryResult;
use crate::query::operators::Operator;
use crate::query::result::CommitRecord;
use crate::storage::{CommitStore, KvReader};

/// Scan operator - yields the commits reachable from the roots.
pub struct DagScan<'a> {
    reader: &'a dyn KvReader,
    ctx: &'a QueryContext,
    roots: VecDeque<Cid>,
    queue: VecDeque<(Cid, u64)>,
    visited: HashSet<Cid>,
    /// generations to yield per root; `None` walks to the first commit
    depth: Option<u64>,
}

impl<'a> DagScan<'a> {
    pub fn new(
        reader: &'a dyn KvReader,
        ctx: &'a QueryContext,
        roots: impl IntoIterator<Item = Cid>,
        depth: Option<u64>,
    ) -> Self {
        Self {
            reader,
            ctx,
            roots: roots.into_iter().collect(),
            queue: VecDeque::new(),
            visited: HashSet::new(),
            depth,
        }
    }

    fn next_pending(&mut self) -> Option<(Cid, u64)> {
        if let Some(pending) = self.queue.pop_front() {
            return Some(pending);
        }
        self.roots.pop_front().map(|root| (root, 1))
    }
}

impl Operator for DagScan<'_> {
    type Item = CommitRecord;

    fn next_item(&mut self) -> QueryResult<Option<CommitRecord>> {
        while let Some((cid, generation)) = self.next_pending() {
            self.ctx.check()?;
            if !self.visited.insert(cid) {
                continue;
            }

            // a link without a stored target ends its branch
            let Some(commit) = CommitStore::get_by_cid(self.reader, &cid)? else {
                trace!(%cid, "link target missing");
                continue;
            };

            if self.depth.map_or(true, |depth| generation < depth) {
                self.queue
                    .extend(commit.heads().iter().map(|parent| (*parent, generation + 1)));
            }

            return Ok(Some(CommitRecord::from_commit(&commit)));
        }
        Ok(None)
    }
}
