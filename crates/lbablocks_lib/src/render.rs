use crate::graph::{BlockGraph, BlockId};
use crate::script::{Command, Scene, Script};
use crate::{Decompilation, SceneBlocks};

fn fields_to_string(graph: &BlockGraph, id: BlockId) -> String {
    let Some(block) = graph.get(id) else {
        return String::new();
    };
    block
        .fields
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn value_expr(graph: &BlockGraph, id: BlockId) -> String {
    let Some(block) = graph.get(id) else {
        return format!("<missing {id}>");
    };
    let mut parts: Vec<String> = Vec::new();
    let fields = fields_to_string(graph, id);
    if !fields.is_empty() {
        parts.push(fields);
    }
    for (slot, child) in &block.values {
        parts.push(format!("{slot}={}", value_expr(graph, *child)));
    }
    if parts.is_empty() {
        block.kind.clone()
    } else {
        format!("{}({})", block.kind, parts.join(", "))
    }
}

fn slot_rank(slot: &str) -> u8 {
    match slot {
        "then_statements" => 0,
        "else_statements" => 1,
        _ => 2,
    }
}

fn chain_to_string(graph: &BlockGraph, head: BlockId, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    for block in graph.chain(head) {
        out.push_str(&format!("{pad}[{}] {}", block.source_index, block.kind));
        let fields = fields_to_string(graph, block.id);
        if !fields.is_empty() {
            out.push_str(&format!(" {fields}"));
        }
        for (slot, child) in &block.values {
            out.push_str(&format!(" {slot}={}", value_expr(graph, *child)));
        }
        out.push('\n');
        let mut slots: Vec<(&String, &BlockId)> = block.statements.iter().collect();
        slots.sort_by_key(|(slot, _)| slot_rank(slot));
        for (slot, child) in slots {
            out.push_str(&format!("{pad}  {slot}:\n"));
            chain_to_string(graph, *child, indent + 4, out);
        }
    }
}

fn tree_into(dec: &Decompilation, indent: usize, out: &mut String) {
    for root in &dec.graph.roots {
        chain_to_string(&dec.graph, *root, indent, out);
    }
    let pad = " ".repeat(indent);
    let mut diagnostics = dec.diagnostics().peekable();
    if diagnostics.peek().is_some() {
        out.push_str(&format!("{pad}diagnostics:\n"));
        for d in diagnostics {
            out.push_str(&format!("{pad}  {d}\n"));
        }
    }
}

pub fn render_tree(dec: &Decompilation) -> String {
    let mut out = String::new();
    tree_into(dec, 0, &mut out);
    out
}

pub fn render_scene_tree(scene: &SceneBlocks) -> String {
    let mut out = String::new();
    for actor in &scene.actors {
        out.push_str(&format!("actor {}\n", actor.index));
        for dec in actor.moves.iter().chain(actor.life.iter()) {
            out.push_str(&format!("  {}:\n", dec.kind));
            tree_into(dec, 4, &mut out);
        }
    }
    out
}

fn command_line(cmd: &Command) -> String {
    let mut line = format!("{:>5}  {}", cmd.index, cmd.opcode);
    if let Some(cond) = &cmd.condition {
        line.push(' ');
        line.push_str(&cond.name);
        if let Some(param) = &cond.param {
            line.push_str(&format!("({param})"));
        }
    }
    if let Some(op) = &cmd.operator {
        line.push_str(&format!(" {} {}", op.comparator, op.operand));
    }
    for arg in &cmd.args {
        line.push_str(&format!(" {arg}"));
    }
    line
}

pub fn render_listing(script: &Script) -> String {
    let mut out = String::new();
    for cmd in &script.commands {
        out.push_str(&command_line(cmd));
        out.push('\n');
    }
    out
}

pub fn render_scene_listing(scene: &Scene) -> String {
    let mut out = String::new();
    for actor in &scene.actors {
        out.push_str(&format!("actor {}\n", actor.index));
        for script in actor.moves.iter().chain(actor.life.iter()) {
            out.push_str(&format!("  {}:\n", script.kind));
            out.push_str(&render_listing(script));
        }
    }
    out
}
