//! The Merkle clock of one chain.

use std::collections::{HashSet, VecDeque};

use tracing::trace;

use crate::address::{Cid, DocId};
use crate::clock::error::{ClockError, ClockResult};
use crate::storage::{
    Chain, Commit, CommitLink, CommitStore, Delta, Head, HeadManager, HeadSet, HeadUpdate, KvReader,
    SealedCommit,
};

/// The next commit of a chain plus the head move that publishes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockTick {
    pub commit: SealedCommit,
    pub update: HeadUpdate,
}

impl ClockTick {
    pub fn head(&self) -> Head {
        self.update.next.head()
    }
}

/// A causal chain of one document: a single field, or the composite.
///
/// The clock only reads. The commits and head moves it produces are handed
/// to the commit store by the caller, inside the same transaction the heads
/// were read from.
pub struct FieldClock<'a> {
    reader: &'a dyn KvReader,
    doc_id: DocId,
    chain: Chain,
}

impl<'a> FieldClock<'a> {
    pub fn new(reader: &'a dyn KvReader, doc_id: DocId, chain: Chain) -> Self {
        Self {
            reader,
            doc_id,
            chain,
        }
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Get the current head of the chain, if it has any commit.
    ///
    /// With concurrent tips this is the one holding the chain's value.
    pub fn current_head(&self) -> ClockResult<Option<Head>> {
        Ok(self.current_heads()?.map(|heads| heads.head()))
    }

    /// Every tip of the chain.
    pub fn current_heads(&self) -> ClockResult<Option<HeadSet>> {
        Ok(HeadManager::get(self.reader, &self.doc_id, self.chain)?)
    }

    /// Build the next commit of the chain.
    ///
    /// The commit links to every current tip and sits one above the highest;
    /// the first commit of a chain has height 1.
    pub fn advance(&self, delta: Delta) -> ClockResult<ClockTick> {
        self.advance_with_links(delta, Vec::new())
    }

    /// Like [`advance`](Self::advance), also naming the commits this one
    /// aggregates. Only the composite chain uses named links.
    pub fn advance_with_links(&self, mut delta: Delta, links: Vec<CommitLink>) -> ClockResult<ClockTick> {
        self.check(delta.doc_id(), delta.chain())?;

        let previous = self.current_heads()?;
        let height = previous.as_ref().map_or(1, |heads| heads.height() + 1);
        delta.set_priority(height);

        let heads = previous.as_ref().map(HeadSet::cids).unwrap_or_default();
        let parents = heads.len();
        let sealed = Commit::seal(delta, heads, links)?;
        let next = HeadSet::single(Head::new(*sealed.commit.cid(), height));

        trace!(
            doc_id = %self.doc_id,
            chain = %self.chain,
            cid = %sealed.commit.cid(),
            height,
            parents,
            "clock advanced"
        );

        Ok(ClockTick {
            commit: sealed,
            update: HeadUpdate {
                doc_id: self.doc_id.clone(),
                chain: self.chain,
                previous,
                next,
            },
        })
    }

    /// Fold a commit from another replica into the tips of the chain.
    ///
    /// Tips the incoming commit descends from are replaced by it, and a
    /// commit some tip already descends from changes nothing. Otherwise it
    /// is concurrent with the current tips and joins them. Among the tips,
    /// the higher commit holds the value, or on equal height the greater CID.
    /// Returns the head move to apply, or `None` if the tips stay.
    pub fn merge(&self, remote: &Commit) -> ClockResult<Option<HeadUpdate>> {
        self.check(remote.doc_id(), remote.chain())?;

        let incoming = Head::new(*remote.cid(), remote.height());
        let current = self.current_heads()?;

        // each candidate tip with its direct predecessors
        let mut candidates = vec![(incoming, remote.heads().to_vec())];
        if let Some(heads) = &current {
            if heads.contains(&incoming.cid) {
                return Ok(None);
            }
            for tip in heads.tips() {
                candidates.push((tip, self.parents_of(&tip.cid)?));
            }
        }

        let mut tips = Vec::with_capacity(candidates.len());
        for (i, (tip, _)) in candidates.iter().enumerate() {
            let mut covered = false;
            for (j, (other, parents)) in candidates.iter().enumerate() {
                if i != j && self.reaches(other, parents, tip)? {
                    covered = true;
                    break;
                }
            }
            if !covered {
                tips.push(*tip);
            }
        }

        let Some(next) = HeadSet::from_tips(tips) else {
            return Ok(None);
        };
        let moved = current.as_ref() != Some(&next);

        trace!(
            doc_id = %self.doc_id,
            chain = %self.chain,
            cid = %incoming.cid,
            height = incoming.height,
            tips = next.len(),
            moved,
            "merging remote commit"
        );

        Ok(moved.then(|| HeadUpdate {
            doc_id: self.doc_id.clone(),
            chain: self.chain,
            previous: current,
            next,
        }))
    }

    fn parents_of(&self, cid: &Cid) -> ClockResult<Vec<Cid>> {
        Ok(CommitStore::get_by_cid(self.reader, cid)?
            .map(|commit| commit.heads().to_vec())
            .unwrap_or_default())
    }

    // whether `target` is an ancestor of `from`, walking back from its
    // parents; a missing block ends that branch
    fn reaches(&self, from: &Head, parents: &[Cid], target: &Head) -> ClockResult<bool> {
        if from.height <= target.height {
            return Ok(false);
        }

        let mut queue: VecDeque<Cid> = parents.iter().copied().collect();
        let mut visited = HashSet::new();
        while let Some(cid) = queue.pop_front() {
            if cid == target.cid {
                return Ok(true);
            }
            if !visited.insert(cid) {
                continue;
            }
            let Some(commit) = CommitStore::get_by_cid(self.reader, &cid)? else {
                continue;
            };
            if commit.height() > target.height {
                queue.extend(commit.heads().iter().copied());
            }
        }
        Ok(false)
    }

    fn check(&self, doc_id: &DocId, chain: Chain) -> ClockResult<()> {
        if *doc_id != self.doc_id {
            return Err(ClockError::DocumentMismatch {
                expected: self.doc_id.clone(),
                actual: doc_id.clone(),
            });
        }
        if chain != self.chain {
            return Err(ClockError::ChainMismatch {
                expected: self.chain,
                actual: chain,
            });
        }
        Ok(())
    }
}
