//! Commit query engine.
//!
//! Resolves the head set of a query, then runs the operator pipeline:
//!
//! ```text
//! DagScan ──▶ Filter ──▶ Sort ──▶ Group ──▶ Limit
//! ```
//!
//! Sort and Group are only added when the query orders or groups.

use tracing::debug;

use crate::address::{Cid, DocId};
use crate::query::context::QueryContext;
use crate::query::dagscan::DagScan;
use crate::query::error::QueryResult;
use crate::query::operators::{
    drain, FilterOperator, GroupOperator, LimitOperator, RecordSource, SortOperator,
};
use crate::query::request::{CommitQuery, FieldSelector};
use crate::query::result::{CommitRecord, QueryOutput};
use crate::storage::{Chain, CommitStore, HeadManager, HeadSet, KvReader};

/// Engine-wide query limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// caps the generations walked by queries without a depth
    pub max_depth: Option<u64>,
    /// applied when a query gives no limit
    pub default_limit: Option<usize>,
}

/// Answers commit queries against a consistent view of the store.
pub struct QueryEngine<'a> {
    reader: &'a dyn KvReader,
    options: QueryOptions,
}

impl<'a> QueryEngine<'a> {
    pub fn new(reader: &'a dyn KvReader) -> Self {
        Self::with_options(reader, QueryOptions::default())
    }

    pub fn with_options(reader: &'a dyn KvReader, options: QueryOptions) -> Self {
        Self { reader, options }
    }

    /// Run a query.
    ///
    /// Unknown documents, commits and fields give an empty result. Only
    /// malformed arguments, storage failures and the context end a query
    /// with an error.
    pub fn execute(&self, query: &CommitQuery, ctx: &QueryContext) -> QueryResult<QueryOutput> {
        ctx.check()?;
        let cid = query.parsed_cid()?;
        let doc_id = query.parsed_doc_id()?;
        let selectors: Vec<FieldSelector> = query
            .field
            .iter()
            .chain(query.field_id.iter())
            .cloned()
            .collect();

        let roots = self.resolve_roots(cid, doc_id.as_ref(), &selectors)?;
        let depth = self.depth_for(query, cid.is_some());
        debug!(roots = roots.len(), ?depth, "running commit query");

        let scan = DagScan::new(self.reader, ctx, roots, depth);
        let filter = FilterOperator::new(Box::new(scan), move |record| {
            doc_id.as_ref().map_or(true, |doc| record.doc_id == *doc)
                && selectors.iter().all(|selector| record_matches(record, selector))
        });

        let mut source: RecordSource<'_> = Box::new(filter);
        if !query.order.is_empty() {
            source = Box::new(SortOperator::new(source, query.order.clone()));
        }

        let limit = query.limit.or(self.options.default_limit);
        let offset = query.offset.unwrap_or(0);

        let output = if query.group_by.is_empty() {
            QueryOutput::Commits(drain(&mut LimitOperator::new(source, limit, offset))?)
        } else {
            let groups = GroupOperator::new(source, query.group_by.clone());
            QueryOutput::Groups(drain(&mut LimitOperator::new(groups, limit, offset))?)
        };

        debug!(results = output.len(), "commit query finished");
        Ok(output)
    }

    /// Without a CID or depth the whole history is walked; a CID alone
    /// selects just that commit. Depth 0 behaves as depth 1.
    fn depth_for(&self, query: &CommitQuery, has_cid: bool) -> Option<u64> {
        match (query.depth, has_cid) {
            (Some(depth), _) => Some(depth.max(1)),
            (None, true) => Some(1),
            (None, false) => self.options.max_depth,
        }
    }

    fn resolve_roots(
        &self,
        cid: Option<Cid>,
        doc_id: Option<&DocId>,
        selectors: &[FieldSelector],
    ) -> QueryResult<Vec<Cid>> {
        if let Some(cid) = cid {
            return Ok(vec![cid]);
        }

        // head key order: per document the field chains by ID, composite last
        let heads: Vec<(Chain, HeadSet)> = match doc_id {
            Some(doc_id) => {
                let heads = HeadManager::for_document(self.reader, doc_id)?;
                heads
                    .fields
                    .into_iter()
                    .chain(heads.composite.map(|head| (Chain::Composite, head)))
                    .collect()
            }
            None => HeadManager::list(self.reader)?
                .into_iter()
                .map(|(_, chain, head)| (chain, head))
                .collect(),
        };

        let mut roots = Vec::with_capacity(heads.len());
        for (chain, tips) in heads {
            // concurrent tips are all roots of their chain
            if self.head_matches(chain, &tips, selectors)? {
                roots.extend(tips.cids());
            }
        }
        Ok(roots)
    }

    fn head_matches(&self, chain: Chain, tips: &HeadSet, selectors: &[FieldSelector]) -> QueryResult<bool> {
        for selector in selectors {
            let matches = match selector {
                FieldSelector::Composite => chain.is_composite(),
                FieldSelector::Id(id) => chain == Chain::Field(*id),
                FieldSelector::Name(name) => {
                    !chain.is_composite()
                        && CommitStore::get_by_cid(self.reader, &tips.head().cid)?
                            .is_some_and(|commit| commit.field_name() == Some(name.as_str()))
                }
            };
            if !matches {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn record_matches(record: &CommitRecord, selector: &FieldSelector) -> bool {
    match selector {
        FieldSelector::Composite => record.is_composite(),
        FieldSelector::Id(id) => record.field_id == id.to_string(),
        FieldSelector::Name(name) => record.field_name.as_deref() == Some(name.as_str()),
    }
}
