use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::LbaBlocksError;
use crate::operator::Comparator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Life,
    Move,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptKind::Life => write!(f, "life"),
            ScriptKind::Move => write!(f, "move"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub comparator: Comparator,
    pub operand: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub index: usize,
    pub opcode: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
}

impl Command {
    pub fn new(index: usize, opcode: &str) -> Self {
        Self {
            index,
            opcode: opcode.to_string(),
            args: Vec::new(),
            condition: None,
            operator: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = i64>) -> Self {
        self.args = args.into_iter().map(Value::Int).collect();
        self
    }

    pub fn with_values(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_condition(mut self, name: &str, param: Option<i64>) -> Self {
        self.condition = Some(Condition {
            name: name.to_string(),
            param: param.map(Value::Int),
        });
        self
    }

    pub fn with_operator(mut self, comparator: Comparator, operand: i64) -> Self {
        self.operator = Some(Operator {
            comparator,
            operand: Value::Int(operand),
        });
        self
    }

    pub fn int_arg(&self, idx: usize) -> Option<i64> {
        self.args.get(idx).and_then(Value::as_int)
    }
}

/// One life or move script of an actor.
///
/// `behaviour_map` and `track_map` map raw ids to the index of the command
/// starting the behaviour/track. Entries supplied here are kept; the walker
/// adds the boundaries it finds in `commands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    #[serde(rename = "type")]
    pub kind: ScriptKind,
    pub commands: Vec<Command>,
    #[serde(default)]
    pub behaviour_map: BTreeMap<i64, usize>,
    #[serde(default)]
    pub track_map: BTreeMap<i64, usize>,
}

impl Script {
    pub fn new(kind: ScriptKind, commands: Vec<Command>) -> Self {
        Self {
            kind,
            commands,
            behaviour_map: BTreeMap::new(),
            track_map: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), LbaBlocksError> {
        for (position, cmd) in self.commands.iter().enumerate() {
            if cmd.index != position {
                return Err(LbaBlocksError::MalformedScript {
                    kind: self.kind,
                    position,
                    found: cmd.index,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub life: Option<Script>,
    #[serde(default, rename = "move", skip_serializing_if = "Option::is_none")]
    pub moves: Option<Script>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub actors: Vec<Actor>,
}

impl Scene {
    /// Reads a scene, a single actor or a single script from JSON.
    ///
    /// A lone script becomes actor 0 of a one-actor scene.
    pub fn from_json(bytes: &[u8]) -> Result<Self, LbaBlocksError> {
        // Integer map keys do not survive serde's untagged buffering, so probe
        // the shape first and parse the bytes again with the concrete type.
        let probe: serde_json::Value = serde_json::from_slice(bytes)?;
        if probe.get("actors").is_some() {
            return Ok(serde_json::from_slice(bytes)?);
        }
        if probe.get("type").is_some() {
            let script: Script = serde_json::from_slice(bytes)?;
            let (life, moves) = match script.kind {
                ScriptKind::Life => (Some(script), None),
                ScriptKind::Move => (None, Some(script)),
            };
            return Ok(Scene {
                actors: vec![Actor { index: 0, life, moves }],
            });
        }
        let actor: Actor = serde_json::from_slice(bytes)?;
        Ok(Scene { actors: vec![actor] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_gaps() {
        let script = Script::new(
            ScriptKind::Life,
            vec![Command::new(0, "NOP"), Command::new(2, "NOP")],
        );
        match script.validate() {
            Err(LbaBlocksError::MalformedScript { position, found, .. }) => {
                assert_eq!(position, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected MalformedScript, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_empty_script() {
        assert!(Script::new(ScriptKind::Move, Vec::new()).validate().is_ok());
    }

    #[test]
    fn script_json_uses_editor_field_names() {
        let json = r#"{
            "type": "life",
            "commands": [
                {"index": 0, "opcode": "SET_BEHAVIOUR", "args": [2]},
                {"index": 1, "opcode": "IF", "condition": {"name": "COL_OBJ", "param": 3},
                 "operator": {"comparator": ">=", "operand": 1}}
            ],
            "behaviourMap": {"2": 0}
        }"#;
        let script: Script = serde_json::from_str(json).unwrap();
        assert_eq!(script.kind, ScriptKind::Life);
        assert_eq!(script.behaviour_map.get(&2), Some(&0));
        assert!(script.track_map.is_empty());
        let cmd = &script.commands[1];
        assert_eq!(cmd.condition.as_ref().unwrap().param, Some(Value::Int(3)));
        assert_eq!(cmd.operator.as_ref().unwrap().comparator, Comparator::Ge);
    }

    #[test]
    fn lone_script_becomes_actor_zero() {
        let json = br#"{"type": "move", "commands": [{"index": 0, "opcode": "TRACK", "args": [0]}]}"#;
        let scene = Scene::from_json(json).unwrap();
        assert_eq!(scene.actors.len(), 1);
        assert_eq!(scene.actors[0].index, 0);
        assert!(scene.actors[0].life.is_none());
        assert!(scene.actors[0].moves.is_some());
    }

    #[test]
    fn text_values_parse_as_ints_when_numeric() {
        assert_eq!(Value::from("12").as_int(), Some(12));
        assert_eq!(Value::from("intro").as_int(), None);
    }
}
