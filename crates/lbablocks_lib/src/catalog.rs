use std::collections::HashMap;
use std::sync::OnceLock;

use crate::script::ScriptKind;

mod tables {
    include!(concat!(env!("OUT_DIR"), "/opcode_tables.rs"));
}

pub use tables::{CondInfo, OpClass, OpInfo, ValueKind};

impl OpClass {
    pub fn is_marker(self) -> bool {
        matches!(
            self,
            OpClass::ELSE
                | OpClass::ENDIF
                | OpClass::END_BEHAVIOUR
                | OpClass::END_TRACK
                | OpClass::CASE
                | OpClass::OR_CASE
                | OpClass::DEFAULT
                | OpClass::END_SWITCH
        )
    }

    pub fn ends_anywhere(self) -> bool {
        self == OpClass::END_TRACK
    }

    /// Markers that must exist in the same catalog for a scope opener to
    /// ever close.
    pub fn required_terminators(self) -> &'static [OpClass] {
        match self {
            OpClass::IF => &[OpClass::ENDIF],
            OpClass::SWITCH => &[OpClass::CASE, OpClass::END_SWITCH],
            _ => &[],
        }
    }
}

pub fn opcodes(kind: ScriptKind) -> &'static [OpInfo] {
    match kind {
        ScriptKind::Life => tables::LIFE_OPCODES,
        ScriptKind::Move => tables::MOVE_OPCODES,
    }
}

fn index(kind: ScriptKind) -> &'static HashMap<&'static str, &'static OpInfo> {
    static LIFE: OnceLock<HashMap<&'static str, &'static OpInfo>> = OnceLock::new();
    static MOVE: OnceLock<HashMap<&'static str, &'static OpInfo>> = OnceLock::new();
    let cell = match kind {
        ScriptKind::Life => &LIFE,
        ScriptKind::Move => &MOVE,
    };
    cell.get_or_init(|| opcodes(kind).iter().map(|op| (op.name, op)).collect())
}

pub fn opcode_info(kind: ScriptKind, name: &str) -> Option<&'static OpInfo> {
    index(kind).get(name).copied()
}

pub fn condition_info(name: &str) -> Option<&'static CondInfo> {
    static INDEX: OnceLock<HashMap<&'static str, &'static CondInfo>> = OnceLock::new();
    INDEX
        .get_or_init(|| tables::CONDITIONS.iter().map(|c| (c.name, c)).collect())
        .get(name)
        .copied()
}

pub fn lba_to_degrees(value: i64) -> i64 {
    (value as f64 * 360.0 / 4096.0).round() as i64
}
