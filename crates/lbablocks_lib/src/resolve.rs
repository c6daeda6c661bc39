use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::catalog::{self, ValueKind};
use crate::graph::{Block, BlockGraph, FieldValue, Reference, Resolved};
use crate::script::{Script, Value};
use crate::{AngleUnit, Diagnostic};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceMaps {
    pub behaviours: BTreeMap<i64, usize>,
    pub tracks: BTreeMap<i64, usize>,
}

impl ReferenceMaps {
    pub fn behaviour_ordinal(&self, index: usize) -> Option<usize> {
        let starts: BTreeSet<usize> = self.behaviours.values().copied().collect();
        starts.iter().position(|&s| s == index)
    }
}

pub fn behaviour_label(ordinal: usize) -> String {
    match ordinal {
        0 => "INIT".to_string(),
        1 => "NORMAL".to_string(),
        n => format!("BEHAVIOUR {}", n + 1),
    }
}

pub fn track_label(raw: i64) -> String {
    format!("TRACK {raw}")
}

pub struct Resolver<'a> {
    own: &'a ReferenceMaps,
    actors: Option<&'a BTreeMap<i64, ReferenceMaps>>,
    angles: AngleUnit,
}

impl<'a> Resolver<'a> {
    pub fn new(own: &'a ReferenceMaps, angles: AngleUnit) -> Self {
        Self {
            own,
            actors: None,
            angles,
        }
    }

    pub fn with_actors(mut self, actors: &'a BTreeMap<i64, ReferenceMaps>) -> Self {
        self.actors = Some(actors);
        self
    }

    fn maps_for(&self, actor: Option<i64>) -> Option<&'a ReferenceMaps> {
        match actor {
            None => Some(self.own),
            Some(a) => self.actors?.get(&a),
        }
    }

    /// Rewrites every referencing field of `graph`. Running it twice gives
    /// the same graph; raw ids are kept on the blocks.
    pub fn resolve(&self, graph: &mut BlockGraph, script: &Script) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for block in graph.blocks.iter_mut() {
            let Some(reference) = block.reference.clone() else {
                continue;
            };
            match self.resolve_one(block, &reference, script) {
                Some(Ok(value)) => {
                    block.fields.insert(reference.field().to_string(), value);
                }
                Some(Err((raw, actor))) => {
                    warn!(
                        "{} block {} at command {}: {} {raw} does not resolve",
                        script.kind,
                        block.id,
                        block.source_index,
                        reference.describe()
                    );
                    block
                        .fields
                        .insert(reference.field().to_string(), FieldValue::from(raw));
                    diagnostics.push(Diagnostic::DanglingReference {
                        block: block.id,
                        index: block.source_index,
                        reference: reference.describe().to_string(),
                        raw,
                        actor,
                    });
                }
                None => {}
            }
        }
        diagnostics
    }

    #[allow(clippy::type_complexity)]
    fn resolve_one(
        &self,
        block: &Block,
        reference: &Reference,
        script: &Script,
    ) -> Option<Result<FieldValue, (i64, Option<i64>)>> {
        let resolved = match *reference {
            Reference::Behaviour { raw, actor } => self
                .maps_for(actor)
                .and_then(|maps| {
                    let target = *maps.behaviours.get(&raw)?;
                    let ordinal = maps.behaviour_ordinal(target)?;
                    Some(FieldValue::Resolved(Resolved {
                        raw,
                        target,
                        label: behaviour_label(ordinal),
                    }))
                })
                .ok_or((raw, actor)),
            Reference::Track { raw, actor } => self.track(raw, actor).ok_or((raw, actor)),
            Reference::BehaviourName { ordinal } => Ok(FieldValue::from(behaviour_label(ordinal).as_str())),
            Reference::Operand { kind, actor } => {
                let operand = &script.commands.get(block.source_index)?.operator.as_ref()?.operand;
                match kind {
                    ValueKind::Track => {
                        let raw = operand.as_int()?;
                        self.track(raw, actor).ok_or((raw, actor))
                    }
                    ValueKind::Angle => Ok(FieldValue::Value(self.angle(operand))),
                    ValueKind::Int | ValueKind::Text => Ok(FieldValue::Value(operand.clone())),
                }
            }
        };
        Some(resolved)
    }

    fn track(&self, raw: i64, actor: Option<i64>) -> Option<FieldValue> {
        let target = *self.maps_for(actor)?.tracks.get(&raw)?;
        Some(FieldValue::Resolved(Resolved {
            raw,
            target,
            label: track_label(raw),
        }))
    }

    fn angle(&self, value: &Value) -> Value {
        match (self.angles, value.as_int()) {
            (AngleUnit::Degrees, Some(v)) => Value::Int(catalog::lba_to_degrees(v)),
            _ => value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BlockId;
    use crate::operator::Comparator;
    use crate::script::{Command, ScriptKind};

    fn maps(behaviours: &[(i64, usize)], tracks: &[(i64, usize)]) -> ReferenceMaps {
        ReferenceMaps {
            behaviours: behaviours.iter().copied().collect(),
            tracks: tracks.iter().copied().collect(),
        }
    }

    #[test]
    fn labels_follow_behaviour_order() {
        assert_eq!(behaviour_label(0), "INIT");
        assert_eq!(behaviour_label(1), "NORMAL");
        assert_eq!(behaviour_label(2), "BEHAVIOUR 3");
        let m = maps(&[(9, 40), (3, 0), (5, 12)], &[]);
        assert_eq!(m.behaviour_ordinal(0), Some(0));
        assert_eq!(m.behaviour_ordinal(12), Some(1));
        assert_eq!(m.behaviour_ordinal(40), Some(2));
        assert_eq!(m.behaviour_ordinal(7), None);
    }

    #[test]
    fn track_reference_resolves_against_other_actor() {
        let own = ReferenceMaps::default();
        let mut actors = BTreeMap::new();
        actors.insert(4, maps(&[], &[(2, 17)]));
        let resolver = Resolver::new(&own, AngleUnit::Raw).with_actors(&actors);

        let script = Script::new(ScriptKind::Life, vec![Command::new(0, "SET_TRACK_OBJ").with_args([4, 2])]);
        let mut graph = BlockGraph::new();
        let id = graph.new_block("lba_set_track_obj", 0);
        graph.set_reference(id, Reference::Track { raw: 2, actor: Some(4) });

        assert!(resolver.resolve(&mut graph, &script).is_empty());
        match graph.field(id, "arg_0") {
            Some(FieldValue::Resolved(r)) => {
                assert_eq!(r.target, 17);
                assert_eq!(r.label, "TRACK 2");
            }
            other => panic!("unexpected field {other:?}"),
        }
    }

    #[test]
    fn angle_operands_convert_in_degrees() {
        let own = ReferenceMaps::default();
        let resolver = Resolver::new(&own, AngleUnit::Degrees);
        let script = Script::new(
            ScriptKind::Life,
            vec![
                Command::new(0, "IF")
                    .with_condition("BETA", None)
                    .with_operator(Comparator::Eq, 1024),
            ],
        );
        let mut graph = BlockGraph::new();
        let id = graph.new_block("lba_if", 0);
        graph.set_reference(id, Reference::Operand { kind: ValueKind::Angle, actor: None });

        assert!(resolver.resolve(&mut graph, &script).is_empty());
        assert_eq!(graph.field(id, "operand"), Some(&FieldValue::from(90_i64)));
    }

    #[test]
    fn unknown_actor_is_dangling() {
        let own = ReferenceMaps::default();
        let resolver = Resolver::new(&own, AngleUnit::Raw);
        let script = Script::new(ScriptKind::Life, vec![Command::new(0, "SET_BEHAVIOUR_OBJ").with_args([2, 1])]);
        let mut graph = BlockGraph::new();
        let id = graph.new_block("lba_set_behaviour_obj", 0);
        graph.set_reference(id, Reference::Behaviour { raw: 1, actor: Some(2) });

        let diagnostics = resolver.resolve(&mut graph, &script);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::DanglingReference {
                block: BlockId(0),
                index: 0,
                reference: "behaviour".to_string(),
                raw: 1,
                actor: Some(2),
            }]
        );
        assert_eq!(graph.field(id, "arg_0"), Some(&FieldValue::from(1_i64)));
    }
}
