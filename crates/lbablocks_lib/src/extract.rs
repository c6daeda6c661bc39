use std::collections::HashMap;
use std::sync::OnceLock;

use crate::catalog::{self, OpClass, OpInfo, ValueKind};
use crate::graph::{BlockId, FieldValue, Reference};
use crate::script::{ScriptKind, Value};
use crate::walk::{Context, Walker};
use crate::{AngleUnit, Diagnostic, LbaBlocksError};

pub type Extractor = fn(&mut Walker<'_>, usize, Context) -> Result<Extraction, LbaBlocksError>;

#[derive(Debug, Clone, Copy)]
pub struct Extraction {
    pub block: BlockId,
    pub next: usize,
    pub ctx: Context,
}

impl Extraction {
    pub fn chained(block: BlockId, next: usize, ctx: Context) -> Self {
        Self {
            block,
            next,
            ctx: ctx.after(block),
        }
    }
}

#[derive(Clone, Default)]
pub struct ExtractorTable {
    life: HashMap<String, Extractor>,
    moves: HashMap<String, Extractor>,
}

impl ExtractorTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_catalog() -> Self {
        let mut table = Self::empty();
        for kind in [ScriptKind::Life, ScriptKind::Move] {
            for op in catalog::opcodes(kind) {
                if let Some(ex) = extractor_for(op.class) {
                    table.register(kind, op.name, ex);
                }
            }
        }
        table
    }

    pub fn standard() -> &'static ExtractorTable {
        static TABLE: OnceLock<ExtractorTable> = OnceLock::new();
        TABLE.get_or_init(Self::with_catalog)
    }

    pub fn register(&mut self, kind: ScriptKind, opcode: &str, extractor: Extractor) -> &mut Self {
        self.map_mut(kind).insert(opcode.to_string(), extractor);
        self
    }

    pub fn lookup(&self, kind: ScriptKind, opcode: &str) -> Option<Extractor> {
        self.map(kind).get(opcode).copied()
    }

    pub fn len(&self, kind: ScriptKind) -> usize {
        self.map(kind).len()
    }

    /// Every catalogued opcode that renders as a block must have a handler,
    /// and every registered scope opener must have its terminators in the
    /// catalog of the same script type.
    pub fn validate(&self) -> Result<(), LbaBlocksError> {
        for kind in [ScriptKind::Life, ScriptKind::Move] {
            for op in catalog::opcodes(kind) {
                if op.class.is_marker() || op.class == OpClass::HIDDEN {
                    continue;
                }
                if self.lookup(kind, op.name).is_none() {
                    return Err(LbaBlocksError::IncompleteTable(format!(
                        "{kind} opcode {} has no extractor",
                        op.name
                    )));
                }
            }

            let mut registered: Vec<&String> = self.map(kind).keys().collect();
            registered.sort();
            for name in registered {
                let Some(class) = any_catalog_class(kind, name) else {
                    continue;
                };
                for term in class.required_terminators() {
                    if !catalog::opcodes(kind).iter().any(|op| op.class == *term) {
                        return Err(LbaBlocksError::IncompleteTable(format!(
                            "{kind} opcode {name} opens a scope but no {term:?} terminator is catalogued"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn map(&self, kind: ScriptKind) -> &HashMap<String, Extractor> {
        match kind {
            ScriptKind::Life => &self.life,
            ScriptKind::Move => &self.moves,
        }
    }

    fn map_mut(&mut self, kind: ScriptKind) -> &mut HashMap<String, Extractor> {
        match kind {
            ScriptKind::Life => &mut self.life,
            ScriptKind::Move => &mut self.moves,
        }
    }
}

fn any_catalog_class(kind: ScriptKind, name: &str) -> Option<OpClass> {
    let other = match kind {
        ScriptKind::Life => ScriptKind::Move,
        ScriptKind::Move => ScriptKind::Life,
    };
    catalog::opcode_info(kind, name)
        .or_else(|| catalog::opcode_info(other, name))
        .map(|i| i.class)
}

fn extractor_for(class: OpClass) -> Option<Extractor> {
    let ex: Extractor = match class {
        OpClass::ACTION => extract_action,
        OpClass::ACTION_OBJ => extract_action_obj,
        OpClass::BEHAVIOUR => extract_behaviour,
        OpClass::SET_BEHAVIOUR => extract_set_behaviour,
        OpClass::SET_BEHAVIOUR_OBJ => extract_set_behaviour_obj,
        OpClass::TRACK => extract_track,
        OpClass::SET_TRACK => extract_set_track,
        OpClass::SET_TRACK_OBJ => extract_set_track_obj,
        OpClass::IF | OpClass::AND_IF | OpClass::OR_IF => extract_if,
        OpClass::SWITCH => extract_switch,
        _ => return None,
    };
    Some(ex)
}

const IF_STOPS: &[OpClass] = &[OpClass::ELSE, OpClass::ENDIF];
const ELSE_STOPS: &[OpClass] = &[OpClass::ENDIF];
const BEHAVIOUR_STOPS: &[OpClass] = &[OpClass::END_BEHAVIOUR, OpClass::BEHAVIOUR];
const TRACK_STOPS: &[OpClass] = &[OpClass::TRACK, OpClass::END_TRACK];
const CASE_STOPS: &[OpClass] = &[
    OpClass::CASE,
    OpClass::OR_CASE,
    OpClass::DEFAULT,
    OpClass::END_SWITCH,
];

fn block_kind(w: &Walker<'_>, cursor: usize, opcode: &str) -> String {
    match w.info(cursor) {
        Some(info) if info.block != "-" => info.block.to_string(),
        _ => format!("lba_{}", opcode.to_ascii_lowercase()),
    }
}

fn convert(w: &Walker<'_>, kind: ValueKind, value: &Value) -> Value {
    match (kind, w.options().angles, value.as_int()) {
        (ValueKind::Angle, AngleUnit::Degrees, Some(v)) => Value::Int(catalog::lba_to_degrees(v)),
        _ => value.clone(),
    }
}

fn set_args(w: &mut Walker<'_>, block: BlockId, cursor: usize, args: &[Value], info: Option<&OpInfo>) {
    for (i, arg) in args.iter().enumerate() {
        let kind = info
            .and_then(|info| info.args.get(i))
            .copied()
            .unwrap_or(ValueKind::Int);
        let value = convert(w, kind, arg);
        w.graph_mut().set_field(block, &format!("arg_{i}"), value);
    }
    if let Some(info) = info {
        if args.len() < info.args.len() {
            let cmd_index = w.command(cursor).map(|c| c.index).unwrap_or(cursor);
            let opcode = info.name.to_string();
            w.report(Diagnostic::MalformedCommand {
                index: cmd_index,
                opcode,
                reason: format!("expected {} argument(s), found {}", info.args.len(), args.len()),
            });
        }
    }
}

fn missing_arg(w: &mut Walker<'_>, cursor: usize, what: &str) -> Result<(), LbaBlocksError> {
    let cmd = w.command(cursor)?;
    w.report(Diagnostic::MalformedCommand {
        index: cmd.index,
        opcode: cmd.opcode.clone(),
        reason: format!("missing {what}"),
    });
    Ok(())
}

fn extract_action(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    let cmd = w.command(cursor)?;
    let kind = block_kind(w, cursor, &cmd.opcode);
    let block = w.block_from(&kind, cursor);
    let info = w.info(cursor);
    set_args(w, block, cursor, &cmd.args, info);
    Ok(Extraction::chained(block, cursor + 1, ctx))
}

fn extract_action_obj(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    let cmd = w.command(cursor)?;
    let kind = block_kind(w, cursor, &cmd.opcode);
    let block = w.block_from(&kind, cursor);
    match cmd.args.split_first() {
        Some((actor, rest)) => {
            w.graph_mut().set_field(block, "actor", actor.clone());
            let info = w.info(cursor);
            set_args(w, block, cursor, rest, info);
        }
        None => missing_arg(w, cursor, "actor")?,
    }
    Ok(Extraction::chained(block, cursor + 1, ctx))
}

/// Shared by the four id-setting opcodes. `obj` selects the `_OBJ` layout
/// where the first argument is the target actor.
fn extract_reference(
    w: &mut Walker<'_>,
    cursor: usize,
    ctx: Context,
    obj: bool,
    make: fn(i64, Option<i64>) -> Reference,
) -> Result<Extraction, LbaBlocksError> {
    let cmd = w.command(cursor)?;
    let kind = block_kind(w, cursor, &cmd.opcode);
    let block = w.block_from(&kind, cursor);
    let (actor, raw) = if obj {
        (cmd.int_arg(0), cmd.int_arg(1))
    } else {
        (None, cmd.int_arg(0))
    };
    if let Some(actor) = actor {
        w.graph_mut().set_field(block, "actor", actor);
    }
    match raw {
        Some(raw) if !obj || actor.is_some() => {
            let graph = w.graph_mut();
            graph.set_field(block, "arg_0", raw);
            graph.set_reference(block, make(raw, actor));
        }
        _ => missing_arg(w, cursor, "target id")?,
    }
    Ok(Extraction::chained(block, cursor + 1, ctx))
}

fn extract_set_behaviour(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    extract_reference(w, cursor, ctx, false, |raw, actor| Reference::Behaviour { raw, actor })
}

fn extract_set_behaviour_obj(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    extract_reference(w, cursor, ctx, true, |raw, actor| Reference::Behaviour { raw, actor })
}

fn extract_set_track(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    extract_reference(w, cursor, ctx, false, |raw, actor| Reference::Track { raw, actor })
}

fn extract_set_track_obj(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    extract_reference(w, cursor, ctx, true, |raw, actor| Reference::Track { raw, actor })
}

fn unterminated(w: &mut Walker<'_>, cursor: usize) -> Result<(), LbaBlocksError> {
    let cmd = w.command(cursor)?;
    w.report(Diagnostic::UnterminatedScope {
        index: cmd.index,
        opcode: cmd.opcode.clone(),
    });
    Ok(())
}

fn extract_behaviour(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    let cmd = w.command(cursor)?;
    let raw = cmd.int_arg(0);
    let ordinal = w.note_behaviour(raw, cursor)?;
    let kind = if ordinal == 0 {
        "lba_behaviour_init".to_string()
    } else {
        block_kind(w, cursor, &cmd.opcode)
    };
    let block = w.block_from(&kind, cursor);
    if let Some(raw) = raw {
        w.graph_mut().set_field(block, "arg_0", raw);
    }
    w.graph_mut().set_reference(block, Reference::BehaviourName { ordinal });

    let body = w.recurse(cursor + 1, ctx.nested(block, "statements"), BEHAVIOUR_STOPS)?;
    let next = match body.marker {
        Some(OpClass::END_BEHAVIOUR) => {
            w.close_scope(cursor, body.ctx.level);
            body.cursor + 1
        }
        Some(OpClass::BEHAVIOUR) | None => {
            w.close_scope(cursor, body.ctx.level);
            body.cursor
        }
        Some(_) => {
            unterminated(w, cursor)?;
            body.cursor
        }
    };
    Ok(Extraction::chained(block, next, ctx))
}

fn extract_track(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    let cmd = w.command(cursor)?;
    let kind = block_kind(w, cursor, &cmd.opcode);
    let block = w.block_from(&kind, cursor);
    match cmd.int_arg(0) {
        Some(raw) => {
            w.note_track(raw, cursor);
            w.graph_mut().set_field(block, "arg_0", raw);
        }
        None => missing_arg(w, cursor, "track number")?,
    }

    let body = w.recurse(cursor + 1, ctx.nested(block, "statements"), TRACK_STOPS)?;
    match body.marker {
        // END and STOP detach whatever follows from this track.
        Some(OpClass::END_TRACK) => {
            w.close_scope(cursor, body.ctx.level);
            let after = if ctx.level == 0 {
                Context::root()
            } else {
                ctx.after(block)
            };
            Ok(Extraction {
                block,
                next: body.cursor + 1,
                ctx: after,
            })
        }
        Some(OpClass::TRACK) | None => {
            w.close_scope(cursor, body.ctx.level);
            Ok(Extraction::chained(block, body.cursor, ctx))
        }
        Some(_) => {
            unterminated(w, cursor)?;
            Ok(Extraction::chained(block, body.cursor, ctx))
        }
    }
}

fn operand_kind(w: &Walker<'_>, cursor: usize) -> (ValueKind, Option<i64>) {
    let Ok(cmd) = w.command(cursor) else {
        return (ValueKind::Int, None);
    };
    let Some(cond) = &cmd.condition else {
        return (ValueKind::Int, None);
    };
    match catalog::condition_info(&cond.name) {
        Some(info) => {
            let actor = match info.param {
                Some("actor") => cond.param.as_ref().and_then(Value::as_int),
                _ => None,
            };
            (info.operand, actor)
        }
        None => (ValueKind::Int, None),
    }
}

/// `operator` and `operand` fields of the block owning the command at
/// `cursor`. The operand is displayed per `kind` once references resolve.
fn comparison_fields(
    w: &mut Walker<'_>,
    block: BlockId,
    cursor: usize,
    kind: ValueKind,
    actor: Option<i64>,
) -> Result<(), LbaBlocksError> {
    let cmd = w.command(cursor)?;
    match &cmd.operator {
        Some(op) => {
            let graph = w.graph_mut();
            graph.set_field(block, "operator", op.comparator.symbol());
            graph.set_field(block, "operand", op.operand.clone());
            graph.set_reference(block, Reference::Operand { kind, actor });
            Ok(())
        }
        None => missing_arg(w, cursor, "operator"),
    }
}

fn condition_label(name: &str) -> String {
    name.to_ascii_lowercase().replace('_', " ")
}

fn condition_block(w: &mut Walker<'_>, cursor: usize) -> Result<Option<BlockId>, LbaBlocksError> {
    let cmd = w.command(cursor)?;
    let Some(cond) = &cmd.condition else {
        missing_arg(w, cursor, "condition")?;
        return Ok(None);
    };
    let Some(info) = catalog::condition_info(&cond.name) else {
        let block = w.block_from("lba_unknown_cond", cursor);
        let graph = w.graph_mut();
        graph.set_field(block, "label", condition_label(&cond.name).as_str());
        if let Some(param) = &cond.param {
            graph.set_field(block, "param", param.clone());
        }
        return Ok(Some(block));
    };

    let block = w.block_from(info.block, cursor);
    match (info.param, &cond.param) {
        (Some(field), Some(param)) => w.graph_mut().set_field(block, field, param.clone()),
        (Some(field), None) => missing_arg(w, cursor, &format!("condition {field}"))?,
        (None, _) => {}
    }
    if info.block == "lba_var_value" {
        let scope = match (info.name, cond.param.as_ref().and_then(Value::as_int)) {
            ("VAR_CUBE", _) => "scene",
            (_, Some(v)) if v < 40 => "inventory",
            _ => "game",
        };
        w.graph_mut().set_field(block, "scope", scope);
    }
    Ok(Some(block))
}

fn logic_block(w: &mut Walker<'_>, cursor: usize, right: Option<BlockId>) -> Result<BlockId, LbaBlocksError> {
    let cmd = w.command(cursor)?;
    let kind = block_kind(w, cursor, &cmd.opcode);
    let block = w.block_from(&kind, cursor);
    let (operand, actor) = operand_kind(w, cursor);
    comparison_fields(w, block, cursor, operand, actor)?;
    if let Some(left) = condition_block(w, cursor)? {
        w.graph_mut().connect_value(block, "left", left);
    }
    if let Some(right) = right {
        w.graph_mut().connect_value(block, "right", right);
    }
    Ok(block)
}

/// IF, SWIF, ONEIF and their runtime forms. Also registered for AND_IF and
/// OR_IF so a run of logic operators is consumed with the IF ending it.
fn extract_if(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    let mut run = Vec::new();
    let mut head = cursor;
    while matches!(w.class_of(head), Some(OpClass::AND_IF | OpClass::OR_IF)) {
        run.push(head);
        head += 1;
    }

    let kind = if run.is_empty() {
        block_kind(w, head, &w.command(head)?.opcode)
    } else if w.class_of(head) == Some(OpClass::IF) {
        block_kind(w, head, &w.command(head)?.opcode)
    } else {
        head = run.pop().unwrap_or(cursor);
        let cmd = w.command(head)?;
        w.report(Diagnostic::MalformedCommand {
            index: cmd.index,
            opcode: cmd.opcode.clone(),
            reason: "logic operator not followed by IF".to_string(),
        });
        "lba_if".to_string()
    };

    let block = w.block_from(&kind, head);
    let (operand, actor) = operand_kind(w, head);
    comparison_fields(w, block, head, operand, actor)?;

    let mut condition = condition_block(w, head)?;
    for &logic in run.iter().rev() {
        condition = Some(logic_block(w, logic, condition)?);
    }
    if let Some(condition) = condition {
        w.graph_mut().connect_value(block, "condition", condition);
    }

    let then = w.recurse(head + 1, ctx.nested(block, "then_statements"), IF_STOPS)?;
    let mut end = then;
    if then.marker == Some(OpClass::ELSE) {
        w.graph_mut().set_field(block, "else", FieldValue::Flag(true));
        end = w.recurse(then.cursor + 1, ctx.nested(block, "else_statements"), ELSE_STOPS)?;
    }

    let next = if end.stopped_at(ELSE_STOPS) {
        w.close_scope(head, end.ctx.level);
        end.cursor + 1
    } else {
        unterminated(w, head)?;
        end.cursor
    };
    Ok(Extraction::chained(block, next, ctx))
}

fn extract_switch(w: &mut Walker<'_>, cursor: usize, ctx: Context) -> Result<Extraction, LbaBlocksError> {
    let cmd = w.command(cursor)?;
    let kind = block_kind(w, cursor, &cmd.opcode);
    let block = w.block_from(&kind, cursor);
    if let Some(condition) = condition_block(w, cursor)? {
        w.graph_mut().connect_value(block, "condition", condition);
    }
    let (operand, actor) = operand_kind(w, cursor);

    let mut inner = ctx.nested(block, "statements");
    let mut pos = cursor + 1;
    loop {
        if pos >= w.len() {
            unterminated(w, cursor)?;
            return Ok(Extraction::chained(block, pos, ctx));
        }
        match w.class_of(pos) {
            Some(OpClass::END_SWITCH) => {
                w.close_scope(cursor, inner.level);
                return Ok(Extraction::chained(block, pos + 1, ctx));
            }
            Some(class @ (OpClass::CASE | OpClass::OR_CASE | OpClass::DEFAULT)) => {
                let case_cmd = w.command(pos)?;
                let case_kind = block_kind(w, pos, &case_cmd.opcode);
                let case_block = w.block_from(&case_kind, pos);
                if class != OpClass::DEFAULT {
                    comparison_fields(w, case_block, pos, operand, actor)?;
                }
                w.graph_mut().attach(inner.connection, case_block);
                inner = inner.after(case_block);
                if class == OpClass::OR_CASE {
                    pos += 1;
                    continue;
                }
                let body = w.recurse(pos + 1, inner.nested(case_block, "statements"), CASE_STOPS)?;
                pos = body.cursor;
                if !body.stopped_at(CASE_STOPS) {
                    unterminated(w, cursor)?;
                    return Ok(Extraction::chained(block, pos, ctx));
                }
            }
            _ => {
                let body = w.recurse(pos, inner, CASE_STOPS)?;
                inner = body.ctx;
                pos = body.cursor;
                if !body.stopped_at(CASE_STOPS) {
                    unterminated(w, cursor)?;
                    return Ok(Extraction::chained(block, pos, ctx));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_is_complete() {
        let table = ExtractorTable::standard();
        assert!(table.validate().is_ok());
        assert!(table.lookup(ScriptKind::Life, "IF").is_some());
        assert!(table.lookup(ScriptKind::Life, "AND_IF").is_some());
        assert!(table.lookup(ScriptKind::Life, "ENDIF").is_none());
        assert!(table.lookup(ScriptKind::Life, "END").is_none());
        assert!(table.lookup(ScriptKind::Move, "TRACK").is_some());
        assert!(table.lookup(ScriptKind::Move, "IF").is_none());
    }

    #[test]
    fn empty_table_fails_validation() {
        match ExtractorTable::empty().validate() {
            Err(LbaBlocksError::IncompleteTable(msg)) => assert!(msg.contains("life")),
            other => panic!("expected IncompleteTable, got {other:?}"),
        }
    }

    #[test]
    fn scope_opener_without_terminators_fails_validation() {
        let mut table = ExtractorTable::with_catalog();
        table.register(ScriptKind::Move, "IF", extract_if);
        match table.validate() {
            Err(LbaBlocksError::IncompleteTable(msg)) => {
                assert!(msg.contains("move opcode IF"), "{msg}")
            }
            other => panic!("expected IncompleteTable, got {other:?}"),
        }
    }

    #[test]
    fn condition_labels_are_readable() {
        assert_eq!(condition_label("LIFE_POINT_OBJ"), "life point obj");
    }
}
