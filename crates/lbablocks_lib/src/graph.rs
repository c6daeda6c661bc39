use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ValueKind;
use crate::script::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved {
    pub raw: i64,
    pub target: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Value(Value),
    Resolved(Resolved),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Value(Value::Text(s)) => f.write_str(s),
            FieldValue::Value(v) => write!(f, "{v}"),
            FieldValue::Flag(b) => write!(f, "{b}"),
            FieldValue::Resolved(r) => write!(f, "{} ({}@{})", r.label, r.raw, r.target),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Value(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Value(Value::Int(v))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Value(Value::Text(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ref", rename_all = "snake_case")]
pub enum Reference {
    Behaviour { raw: i64, actor: Option<i64> },
    Track { raw: i64, actor: Option<i64> },
    Operand { kind: ValueKind, actor: Option<i64> },
    BehaviourName { ordinal: usize },
}

impl Reference {
    pub fn field(&self) -> &'static str {
        match self {
            Reference::Behaviour { .. } | Reference::Track { .. } => "arg_0",
            Reference::Operand { .. } => "operand",
            Reference::BehaviourName { .. } => "name",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Reference::Behaviour { .. } => "behaviour",
            Reference::Track { .. } => "track",
            Reference::Operand { .. } => "operand",
            Reference::BehaviourName { .. } => "behaviour name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: String,
    pub source_index: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<BlockId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<BlockId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<BlockId>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub statements: BTreeMap<String, BlockId>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, BlockId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Root,
    Next(BlockId),
    Statement(BlockId, &'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockGraph {
    pub blocks: Vec<Block>,
    pub roots: Vec<BlockId>,
}

impl BlockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn new_block(&mut self, kind: &str, source_index: usize) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block {
            id,
            kind: kind.to_string(),
            source_index,
            fields: BTreeMap::new(),
            previous: None,
            next: None,
            parent: None,
            statements: BTreeMap::new(),
            values: BTreeMap::new(),
            reference: None,
        });
        id
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().map(|b| b.id)
    }

    pub fn set_field(&mut self, id: BlockId, name: &str, value: impl Into<FieldValue>) {
        if let Some(block) = self.get_mut(id) {
            block.fields.insert(name.to_string(), value.into());
        }
    }

    pub fn field(&self, id: BlockId, name: &str) -> Option<&FieldValue> {
        self.get(id)?.fields.get(name)
    }

    pub fn set_reference(&mut self, id: BlockId, reference: Reference) {
        if let Some(block) = self.get_mut(id) {
            block.reference = Some(reference);
        }
    }

    /// Changes the raw id of a behaviour or track reference, as an editor does
    /// when the user picks another target. The field falls back to the raw
    /// value until the graph is resolved again.
    pub fn set_reference_raw(&mut self, id: BlockId, raw: i64) -> bool {
        let Some(block) = self.get_mut(id) else {
            return false;
        };
        let field = match block.reference.as_mut() {
            Some(Reference::Behaviour { raw: r, .. }) | Some(Reference::Track { raw: r, .. }) => {
                *r = raw;
                "arg_0"
            }
            _ => return false,
        };
        block.fields.insert(field.to_string(), FieldValue::from(raw));
        true
    }

    pub fn connect_value(&mut self, parent: BlockId, slot: &str, child: BlockId) {
        if let Some(block) = self.get_mut(parent) {
            block.values.insert(slot.to_string(), child);
        }
        if let Some(block) = self.get_mut(child) {
            block.parent = Some(parent);
        }
    }

    pub fn attach(&mut self, at: Connection, id: BlockId) -> Connection {
        match at {
            Connection::Root => self.roots.push(id),
            Connection::Next(prev) => {
                if let Some(block) = self.get_mut(prev) {
                    block.next = Some(id);
                }
                if let Some(block) = self.get_mut(id) {
                    block.previous = Some(prev);
                }
            }
            Connection::Statement(parent, slot) => {
                if let Some(block) = self.get_mut(parent) {
                    block.statements.insert(slot.to_string(), id);
                }
                if let Some(block) = self.get_mut(id) {
                    block.parent = Some(parent);
                }
            }
        }
        Connection::Next(id)
    }

    pub fn statement(&self, id: BlockId, slot: &str) -> Option<BlockId> {
        self.get(id)?.statements.get(slot).copied()
    }

    pub fn value(&self, id: BlockId, slot: &str) -> Option<BlockId> {
        self.get(id)?.values.get(slot).copied()
    }

    pub fn chain(&self, head: BlockId) -> Chain<'_> {
        Chain {
            graph: self,
            cursor: Some(head),
        }
    }

    pub fn enclosing(&self, id: BlockId) -> Option<BlockId> {
        let mut cur = self.get(id)?;
        while let Some(prev) = cur.previous {
            cur = self.get(prev)?;
        }
        cur.parent
    }
}

pub struct Chain<'a> {
    graph: &'a BlockGraph,
    cursor: Option<BlockId>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.graph.get(self.cursor?)?;
        self.cursor = block.next;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_links_both_directions() {
        let mut g = BlockGraph::new();
        let a = g.new_block("lba_a", 0);
        let b = g.new_block("lba_b", 1);
        let conn = g.attach(Connection::Root, a);
        assert_eq!(conn, Connection::Next(a));
        g.attach(conn, b);
        assert_eq!(g.roots, vec![a]);
        assert_eq!(g.get(a).unwrap().next, Some(b));
        assert_eq!(g.get(b).unwrap().previous, Some(a));
        let kinds: Vec<_> = g.chain(a).map(|blk| blk.kind.as_str()).collect();
        assert_eq!(kinds, ["lba_a", "lba_b"]);
    }

    #[test]
    fn statement_slots_own_their_chain() {
        let mut g = BlockGraph::new();
        let outer = g.new_block("lba_if", 0);
        let inner = g.new_block("lba_a", 1);
        let tail = g.new_block("lba_b", 2);
        g.attach(Connection::Root, outer);
        let conn = g.attach(Connection::Statement(outer, "then_statements"), inner);
        g.attach(conn, tail);
        assert_eq!(g.statement(outer, "then_statements"), Some(inner));
        assert_eq!(g.enclosing(tail), Some(outer));
        assert_eq!(g.enclosing(outer), None);
    }

    #[test]
    fn set_reference_raw_only_touches_id_references() {
        let mut g = BlockGraph::new();
        let set = g.new_block("lba_set_behaviour", 0);
        g.set_reference(set, Reference::Behaviour { raw: 1, actor: None });
        let plain = g.new_block("lba_message", 1);

        assert!(g.set_reference_raw(set, 4));
        assert_eq!(
            g.get(set).unwrap().reference,
            Some(Reference::Behaviour { raw: 4, actor: None })
        );
        assert_eq!(g.field(set, "arg_0"), Some(&FieldValue::from(4_i64)));
        assert!(!g.set_reference_raw(plain, 4));
        assert!(!g.set_reference_raw(BlockId(99), 4));
    }
}
