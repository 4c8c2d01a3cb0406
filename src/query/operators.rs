//! Volcano-style operators for commit queries.
//!
//! Each operator implements the iterator model where items are pulled
//! one at a time through the tree. Sort and group materialize their input.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use crate::query::error::QueryResult;
use crate::query::request::{Direction, GroupField, OrderBy, OrderField};
use crate::query::result::{CommitGroup, CommitRecord};

/// Trait for all query operators.
pub trait Operator {
    type Item;

    /// Get the next item, or None if exhausted.
    fn next_item(&mut self) -> QueryResult<Option<Self::Item>>;
}

/// Boxed operator over commits.
pub type RecordSource<'a> = Box<dyn Operator<Item = CommitRecord> + 'a>;

/// Pull every remaining item.
pub fn drain<O: Operator + ?Sized>(op: &mut O) -> QueryResult<Vec<O::Item>> {
    let mut items = Vec::new();
    while let Some(item) = op.next_item()? {
        items.push(item);
    }
    Ok(items)
}

impl<O: Operator + ?Sized> Operator for Box<O> {
    type Item = O::Item;

    fn next_item(&mut self) -> QueryResult<Option<Self::Item>> {
        (**self).next_item()
    }
}

/// Filter operator - drops commits failing a predicate.
pub struct FilterOperator<'a> {
    source: RecordSource<'a>,
    predicate: Box<dyn Fn(&CommitRecord) -> bool + 'a>,
}

impl<'a> FilterOperator<'a> {
    pub fn new(source: RecordSource<'a>, predicate: impl Fn(&CommitRecord) -> bool + 'a) -> Self {
        Self {
            source,
            predicate: Box::new(predicate),
        }
    }
}

impl Operator for FilterOperator<'_> {
    type Item = CommitRecord;

    fn next_item(&mut self) -> QueryResult<Option<CommitRecord>> {
        while let Some(record) = self.source.next_item()? {
            if (self.predicate)(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

/// Sort operator - orders commits. Ties keep their input order.
pub struct SortOperator<'a> {
    source: RecordSource<'a>,
    order_by: Vec<OrderBy>,
    sorted: Option<std::vec::IntoIter<CommitRecord>>,
}

impl<'a> SortOperator<'a> {
    pub fn new(source: RecordSource<'a>, order_by: Vec<OrderBy>) -> Self {
        Self {
            source,
            order_by,
            sorted: None,
        }
    }

    fn materialize(&mut self) -> QueryResult<&mut std::vec::IntoIter<CommitRecord>> {
        if self.sorted.is_none() {
            let mut records = drain(&mut self.source)?;
            let order_by = &self.order_by;
            records.sort_by(|a, b| compare_records(a, b, order_by));
            self.sorted = Some(records.into_iter());
        }
        Ok(self.sorted.get_or_insert_with(|| Vec::new().into_iter()))
    }
}

impl Operator for SortOperator<'_> {
    type Item = CommitRecord;

    fn next_item(&mut self) -> QueryResult<Option<CommitRecord>> {
        Ok(self.materialize()?.next())
    }
}

fn compare_records(a: &CommitRecord, b: &CommitRecord, order_by: &[OrderBy]) -> Ordering {
    for term in order_by {
        let cmp = match term.field {
            OrderField::Height => a.height.cmp(&b.height),
            OrderField::Cid => a.cid.cmp(&b.cid),
            OrderField::DocId => a.doc_id.cmp(&b.doc_id),
        };
        if cmp != Ordering::Equal {
            return match term.direction {
                Direction::Asc => cmp,
                Direction::Desc => cmp.reverse(),
            };
        }
    }
    Ordering::Equal
}

/// Group operator - collects commits sharing the grouped fields.
///
/// Groups come out in the order their first member arrived.
pub struct GroupOperator<'a> {
    source: RecordSource<'a>,
    fields: Vec<GroupField>,
    grouped: Option<std::vec::IntoIter<CommitGroup>>,
}

impl<'a> GroupOperator<'a> {
    pub fn new(source: RecordSource<'a>, fields: Vec<GroupField>) -> Self {
        Self {
            source,
            fields,
            grouped: None,
        }
    }

    fn materialize(&mut self) -> QueryResult<&mut std::vec::IntoIter<CommitGroup>> {
        if self.grouped.is_none() {
            let mut groups: Vec<CommitGroup> = Vec::new();
            let mut index: HashMap<String, usize> = HashMap::new();

            while let Some(record) = self.source.next_item()? {
                let key: Vec<(&'static str, Value)> = self
                    .fields
                    .iter()
                    .map(|field| (field.name(), group_value(&record, *field)))
                    .collect();
                let lookup = Value::Array(key.iter().map(|(_, v)| v.clone()).collect()).to_string();

                match index.get(&lookup) {
                    Some(&position) => groups[position].members.push(record),
                    None => {
                        index.insert(lookup, groups.len());
                        groups.push(CommitGroup {
                            key,
                            members: vec![record],
                        });
                    }
                }
            }
            self.grouped = Some(groups.into_iter());
        }
        Ok(self.grouped.get_or_insert_with(|| Vec::new().into_iter()))
    }
}

impl Operator for GroupOperator<'_> {
    type Item = CommitGroup;

    fn next_item(&mut self) -> QueryResult<Option<CommitGroup>> {
        Ok(self.materialize()?.next())
    }
}

fn group_value(record: &CommitRecord, field: GroupField) -> Value {
    match field {
        GroupField::Height => Value::from(record.height),
        GroupField::Cid => Value::from(record.cid.to_string()),
        GroupField::DocId => Value::from(record.doc_id.to_string()),
        GroupField::FieldName => record.field_name.clone().map_or(Value::Null, Value::from),
        GroupField::FieldId => Value::from(record.field_id.clone()),
        GroupField::CollectionId => Value::from(record.collection_id.get()),
    }
}

/// Limit operator - skips `offset` items, then yields at most `limit`.
pub struct LimitOperator<O> {
    source: O,
    limit: Option<usize>,
    offset: usize,
    current: usize,
    skipped: usize,
}

impl<O: Operator> LimitOperator<O> {
    pub fn new(source: O, limit: Option<usize>, offset: usize) -> Self {
        Self {
            source,
            limit,
            offset,
            current: 0,
            skipped: 0,
        }
    }
}

impl<O: Operator> Operator for LimitOperator<O> {
    type Item = O::Item;

    fn next_item(&mut self) -> QueryResult<Option<O::Item>> {
        while self.skipped < self.offset {
            if self.source.next_item()?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }

        if self.limit.is_some_and(|limit| self.current >= limit) {
            return Ok(None);
        }
        let item = self.source.next_item()?;
        if item.is_some() {
            self.current += 1;
        }
        Ok(item)
    }
}
