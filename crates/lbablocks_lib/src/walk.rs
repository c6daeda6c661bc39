use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};

use crate::catalog::{self, OpClass, OpInfo};
use crate::extract::ExtractorTable;
use crate::graph::{BlockGraph, BlockId, Connection};
use crate::script::{Command, Script, ScriptKind};
use crate::{DecompileOptions, Diagnostic, LbaBlocksError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub connection: Connection,
    pub level: usize,
}

impl Context {
    pub fn root() -> Self {
        Self {
            connection: Connection::Root,
            level: 0,
        }
    }

    pub fn nested(self, parent: BlockId, slot: &'static str) -> Self {
        Self {
            connection: Connection::Statement(parent, slot),
            level: self.level + 1,
        }
    }

    pub fn after(self, block: BlockId) -> Self {
        Self {
            connection: Connection::Next(block),
            level: self.level,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Scope {
    pub cursor: usize,
    pub marker: Option<OpClass>,
    pub ctx: Context,
}

impl Scope {
    pub fn stopped_at(&self, classes: &[OpClass]) -> bool {
        self.marker.is_some_and(|m| classes.contains(&m))
    }
}

#[derive(Debug)]
pub struct Walked {
    pub graph: BlockGraph,
    pub behaviours: BTreeMap<i64, usize>,
    pub tracks: BTreeMap<i64, usize>,
    pub diagnostics: Vec<Diagnostic>,
    pub scopes_closed: usize,
}

pub struct Walker<'a> {
    script: &'a Script,
    table: &'a ExtractorTable,
    options: &'a DecompileOptions,
    graph: BlockGraph,
    behaviours: BTreeMap<i64, usize>,
    tracks: BTreeMap<i64, usize>,
    behaviours_seen: usize,
    headers: BTreeSet<i64>,
    diagnostics: Vec<Diagnostic>,
    scopes_closed: usize,
    stops: Vec<&'static [OpClass]>,
}

impl<'a> Walker<'a> {
    pub fn new(script: &'a Script, table: &'a ExtractorTable, options: &'a DecompileOptions) -> Self {
        Self {
            script,
            table,
            options,
            graph: BlockGraph::new(),
            behaviours: script.behaviour_map.clone(),
            tracks: script.track_map.clone(),
            behaviours_seen: 0,
            headers: BTreeSet::new(),
            diagnostics: Vec::new(),
            scopes_closed: 0,
            stops: Vec::new(),
        }
    }

    pub fn run(mut self) -> Result<Walked, LbaBlocksError> {
        let scope = self.walk(0, Context::root())?;
        debug_assert_eq!(scope.cursor, self.script.commands.len());
        Ok(Walked {
            graph: self.graph,
            behaviours: self.behaviours,
            tracks: self.tracks,
            diagnostics: self.diagnostics,
            scopes_closed: self.scopes_closed,
        })
    }

    pub fn kind(&self) -> ScriptKind {
        self.script.kind
    }

    pub fn options(&self) -> &DecompileOptions {
        self.options
    }

    pub fn len(&self) -> usize {
        self.script.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.commands.is_empty()
    }

    pub fn command(&self, cursor: usize) -> Result<&'a Command, LbaBlocksError> {
        let script = self.script;
        script
            .commands
            .get(cursor)
            .ok_or(LbaBlocksError::CursorOutOfRange(cursor))
    }

    pub fn info(&self, cursor: usize) -> Option<&'static OpInfo> {
        let cmd = self.script.commands.get(cursor)?;
        catalog::opcode_info(self.script.kind, &cmd.opcode)
    }

    pub fn class_of(&self, cursor: usize) -> Option<OpClass> {
        self.info(cursor).map(|i| i.class)
    }

    pub fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut BlockGraph {
        &mut self.graph
    }

    pub fn block_from(&mut self, kind: &str, cursor: usize) -> BlockId {
        let id = self.graph.new_block(kind, cursor);
        trace!("{} block {id} {kind} for command {cursor}", self.script.kind);
        id
    }

    /// Records a behaviour start and returns how many behaviours came before.
    /// A header without a number is keyed by that count.
    pub fn note_behaviour(&mut self, raw: Option<i64>, cursor: usize) -> Result<usize, LbaBlocksError> {
        let ordinal = self.behaviours_seen;
        self.behaviours_seen += 1;
        let raw = raw.unwrap_or(ordinal as i64);
        if !self.headers.insert(raw) {
            let cmd = self.command(cursor)?;
            self.report(Diagnostic::MalformedCommand {
                index: cmd.index,
                opcode: cmd.opcode.clone(),
                reason: format!("behaviour {raw} already declared"),
            });
        }
        self.behaviours.entry(raw).or_insert(cursor);
        Ok(ordinal)
    }

    pub fn note_track(&mut self, raw: i64, cursor: usize) {
        self.tracks.entry(raw).or_insert(cursor);
    }

    pub fn close_scope(&mut self, opener: usize, level: usize) {
        self.scopes_closed += 1;
        debug!(
            "{} scope opened at {opener} closed (level {level})",
            self.script.kind
        );
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        debug!("{}: {diagnostic}", self.script.kind);
        self.diagnostics.push(diagnostic);
    }

    /// Walks a nested scope until one of `stop` or an enclosing scope's
    /// terminator. The stopping command is not consumed.
    pub fn recurse(
        &mut self,
        cursor: usize,
        ctx: Context,
        stop: &'static [OpClass],
    ) -> Result<Scope, LbaBlocksError> {
        self.stops.push(stop);
        let scope = self.walk(cursor, ctx);
        self.stops.pop();
        scope
    }

    fn is_stop(&self, class: OpClass) -> bool {
        self.stops.iter().any(|s| s.contains(&class))
    }

    fn walk(&mut self, mut cursor: usize, mut ctx: Context) -> Result<Scope, LbaBlocksError> {
        let script = self.script;
        let table = self.table;
        while let Some(cmd) = script.commands.get(cursor) {
            let class = self.class_of(cursor);
            if let Some(class) = class.filter(|c| self.is_stop(*c)) {
                return Ok(Scope {
                    cursor,
                    marker: Some(class),
                    ctx,
                });
            }

            let Some(extractor) = table.lookup(script.kind, &cmd.opcode) else {
                let diagnostic = match class {
                    Some(c) if c.is_marker() && !c.ends_anywhere() => Diagnostic::StrayMarker {
                        index: cmd.index,
                        opcode: cmd.opcode.clone(),
                    },
                    _ => Diagnostic::UnrecognizedOpcode {
                        index: cmd.index,
                        opcode: cmd.opcode.clone(),
                    },
                };
                self.report(diagnostic);
                cursor += 1;
                continue;
            };

            let out = extractor(self, cursor, ctx)?;
            if out.next <= cursor {
                return Err(LbaBlocksError::NoForwardProgress {
                    index: cmd.index,
                    opcode: cmd.opcode.clone(),
                    next: out.next,
                });
            }
            self.graph.attach(ctx.connection, out.block);
            ctx = out.ctx;
            cursor = out.next;
        }
        Ok(Scope {
            cursor: script.commands.len(),
            marker: None,
            ctx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Command;

    fn life(commands: Vec<Command>) -> Script {
        Script::new(ScriptKind::Life, commands)
    }

    #[test]
    fn context_nesting_increments_level() {
        let root = Context::root();
        let nested = root.nested(BlockId(3), "statements");
        assert_eq!(nested.level, 1);
        assert_eq!(nested.connection, Connection::Statement(BlockId(3), "statements"));
        let after = nested.after(BlockId(4));
        assert_eq!(after.level, 1);
        assert_eq!(after.connection, Connection::Next(BlockId(4)));
    }

    #[test]
    fn hidden_opcodes_are_skipped() {
        let script = life(vec![
            Command::new(0, "NOP"),
            Command::new(1, "RETURN"),
            Command::new(2, "END"),
        ]);
        let options = DecompileOptions::default();
        let walked = Walker::new(&script, ExtractorTable::standard(), &options)
            .run()
            .unwrap();
        assert_eq!(walked.graph.len(), 1);
        assert_eq!(walked.graph.blocks[0].source_index, 1);
        assert_eq!(walked.diagnostics.len(), 2);
    }

    #[test]
    fn stray_terminator_is_reported() {
        let script = life(vec![Command::new(0, "ENDIF"), Command::new(1, "RETURN")]);
        let options = DecompileOptions::default();
        let walked = Walker::new(&script, ExtractorTable::standard(), &options)
            .run()
            .unwrap();
        assert!(matches!(
            walked.diagnostics.as_slice(),
            [Diagnostic::StrayMarker { index: 0, .. }]
        ));
        assert_eq!(walked.graph.roots.len(), 1);
    }

    #[test]
    fn supplied_maps_are_kept() {
        let mut script = life(vec![Command::new(0, "BEHAVIOUR").with_args([1])]);
        script.behaviour_map.insert(7, 0);
        let options = DecompileOptions::default();
        let walked = Walker::new(&script, ExtractorTable::standard(), &options)
            .run()
            .unwrap();
        assert_eq!(walked.behaviours.get(&7), Some(&0));
        assert_eq!(walked.behaviours.get(&1), Some(&0));
    }
}
