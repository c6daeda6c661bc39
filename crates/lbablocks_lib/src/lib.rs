use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod catalog;
pub mod extract;
pub mod graph;
pub mod operator;
pub mod render;
pub mod resolve;
pub mod script;
pub mod walk;

pub use extract::{Extraction, Extractor, ExtractorTable};
pub use graph::{Block, BlockGraph, BlockId, Connection, FieldValue, Reference, Resolved};
pub use operator::Comparator;
pub use resolve::{ReferenceMaps, Resolver};
pub use script::{Actor, Command, Condition, Operator, Scene, Script, ScriptKind, Value};
pub use walk::{Context, Walker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    Tree,
    Json,
    Listing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AngleUnit {
    Raw,
    Degrees,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompileOptions {
    pub mode: OutputMode,
    pub angles: AngleUnit,
    pub strict: bool,
    pub actor: Option<i64>,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            mode: OutputMode::Tree,
            angles: AngleUnit::Raw,
            strict: false,
            actor: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LbaBlocksError {
    #[error("malformed {kind} script: command at position {position} has index {found}")]
    MalformedScript {
        kind: ScriptKind,
        position: usize,
        found: usize,
    },

    #[error("no forward progress at command {index} ({opcode}): next cursor {next}")]
    NoForwardProgress {
        index: usize,
        opcode: String,
        next: usize,
    },

    #[error("cursor out of range: {0}")]
    CursorOutOfRange(usize),

    #[error("incomplete extractor table: {0}")]
    IncompleteTable(String),

    #[error("invalid input document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("expected a {expected} script, found a {found} script")]
    KindMismatch { expected: ScriptKind, found: ScriptKind },

    #[error("no actor with index {0}")]
    ActorNotFound(i64),

    #[error("{count} diagnostic(s) in strict mode, first: {first}")]
    Strict { count: usize, first: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    UnrecognizedOpcode {
        index: usize,
        opcode: String,
    },
    StrayMarker {
        index: usize,
        opcode: String,
    },
    UnterminatedScope {
        index: usize,
        opcode: String,
    },
    MalformedCommand {
        index: usize,
        opcode: String,
        reason: String,
    },
    DanglingReference {
        block: BlockId,
        index: usize,
        reference: String,
        raw: i64,
        actor: Option<i64>,
    },
}

impl Diagnostic {
    pub fn index(&self) -> usize {
        match self {
            Diagnostic::UnrecognizedOpcode { index, .. }
            | Diagnostic::StrayMarker { index, .. }
            | Diagnostic::UnterminatedScope { index, .. }
            | Diagnostic::MalformedCommand { index, .. }
            | Diagnostic::DanglingReference { index, .. } => *index,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnrecognizedOpcode { index, opcode } => {
                write!(f, "[{index}] {opcode}: no extractor, skipped")
            }
            Diagnostic::StrayMarker { index, opcode } => {
                write!(f, "[{index}] {opcode}: no open scope to close")
            }
            Diagnostic::UnterminatedScope { index, opcode } => {
                write!(f, "[{index}] {opcode}: scope never terminated")
            }
            Diagnostic::MalformedCommand {
                index,
                opcode,
                reason,
            } => write!(f, "[{index}] {opcode}: {reason}"),
            Diagnostic::DanglingReference {
                block,
                index,
                reference,
                raw,
                actor,
            } => {
                write!(f, "[{index}] block {block}: {reference} {raw} does not resolve")?;
                if let Some(actor) = actor {
                    write!(f, " in actor {actor}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decompilation {
    pub kind: ScriptKind,
    pub graph: BlockGraph,
    pub maps: ReferenceMaps,
    pub structure: Vec<Diagnostic>,
    pub references: Vec<Diagnostic>,
    pub scopes_closed: usize,
}

impl Decompilation {
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.structure.iter().chain(self.references.iter())
    }

    pub fn re_resolve(&mut self, script: &Script, angles: AngleUnit) {
        self.references = Resolver::new(&self.maps, angles).resolve(&mut self.graph, script);
    }

    pub fn re_resolve_in_scene(
        &mut self,
        script: &Script,
        actors: &BTreeMap<i64, ReferenceMaps>,
        angles: AngleUnit,
    ) {
        self.references = Resolver::new(&self.maps, angles)
            .with_actors(actors)
            .resolve(&mut self.graph, script);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorBlocks {
    pub index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub life: Option<Decompilation>,
    #[serde(rename = "move", skip_serializing_if = "Option::is_none")]
    pub moves: Option<Decompilation>,
}

impl ActorBlocks {
    pub fn maps(&self) -> ReferenceMaps {
        ReferenceMaps {
            behaviours: self
                .life
                .as_ref()
                .map(|d| d.maps.behaviours.clone())
                .unwrap_or_default(),
            tracks: self
                .moves
                .as_ref()
                .map(|d| d.maps.tracks.clone())
                .unwrap_or_default(),
        }
    }

    fn decompilations(&self) -> impl Iterator<Item = &Decompilation> {
        self.moves.iter().chain(self.life.iter())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneBlocks {
    pub actors: Vec<ActorBlocks>,
}

pub struct Decompiler<'t> {
    table: &'t ExtractorTable,
    options: DecompileOptions,
}

impl Decompiler<'static> {
    pub fn new(options: DecompileOptions) -> Result<Self, LbaBlocksError> {
        Decompiler::with_table(ExtractorTable::standard(), options)
    }
}

impl<'t> Decompiler<'t> {
    pub fn with_table(table: &'t ExtractorTable, options: DecompileOptions) -> Result<Self, LbaBlocksError> {
        table.validate()?;
        Ok(Self { table, options })
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    pub fn walk(&self, script: &Script) -> Result<Decompilation, LbaBlocksError> {
        script.validate()?;
        let walked = Walker::new(script, self.table, &self.options).run()?;
        debug!(
            "{} script: {} commands, {} blocks, {} scopes",
            script.kind,
            script.commands.len(),
            walked.graph.len(),
            walked.scopes_closed
        );
        Ok(Decompilation {
            kind: script.kind,
            graph: walked.graph,
            maps: ReferenceMaps {
                behaviours: walked.behaviours,
                tracks: walked.tracks,
            },
            structure: walked.diagnostics,
            references: Vec::new(),
            scopes_closed: walked.scopes_closed,
        })
    }

    pub fn decompile_script(&self, script: &Script) -> Result<Decompilation, LbaBlocksError> {
        let mut out = self.walk(script)?;
        out.re_resolve(script, self.options.angles);
        self.check_strict(out.diagnostics())?;
        Ok(out)
    }

    fn walk_actor(&self, actor: &Actor) -> Result<ActorBlocks, LbaBlocksError> {
        // Move first so the life script sees the completed track map.
        let moves = match &actor.moves {
            Some(script) => Some(self.walk_expecting(script, ScriptKind::Move)?),
            None => None,
        };
        let mut life = match &actor.life {
            Some(script) => Some(self.walk_expecting(script, ScriptKind::Life)?),
            None => None,
        };
        if let (Some(life), Some(moves)) = (life.as_mut(), moves.as_ref()) {
            for (raw, index) in &moves.maps.tracks {
                life.maps.tracks.entry(*raw).or_insert(*index);
            }
        }
        Ok(ActorBlocks {
            index: actor.index,
            life,
            moves,
        })
    }

    fn walk_expecting(&self, script: &Script, expected: ScriptKind) -> Result<Decompilation, LbaBlocksError> {
        if script.kind != expected {
            return Err(LbaBlocksError::KindMismatch {
                expected,
                found: script.kind,
            });
        }
        self.walk(script)
    }

    fn resolve_actor(&self, blocks: &mut ActorBlocks, actor: &Actor, actors: &BTreeMap<i64, ReferenceMaps>) {
        let angles = self.options.angles;
        if let (Some(out), Some(script)) = (blocks.moves.as_mut(), actor.moves.as_ref()) {
            out.re_resolve_in_scene(script, actors, angles);
        }
        if let (Some(out), Some(script)) = (blocks.life.as_mut(), actor.life.as_ref()) {
            out.re_resolve_in_scene(script, actors, angles);
        }
    }

    pub fn decompile_actor(&self, actor: &Actor) -> Result<ActorBlocks, LbaBlocksError> {
        let mut blocks = self.walk_actor(actor)?;
        let mut actors = BTreeMap::new();
        actors.insert(actor.index, blocks.maps());
        self.resolve_actor(&mut blocks, actor, &actors);
        self.check_strict(blocks.decompilations().flat_map(Decompilation::diagnostics))?;
        Ok(blocks)
    }

    /// Walks every actor, then resolves with all actors' maps so `_OBJ`
    /// commands see the scripts of the actor they target.
    pub fn decompile_scene(&self, scene: &Scene) -> Result<SceneBlocks, LbaBlocksError> {
        let mut walked = scene
            .actors
            .iter()
            .map(|actor| self.walk_actor(actor))
            .collect::<Result<Vec<_>, _>>()?;
        let actors: BTreeMap<i64, ReferenceMaps> =
            walked.iter().map(|blocks| (blocks.index, blocks.maps())).collect();
        for (blocks, actor) in walked.iter_mut().zip(&scene.actors) {
            self.resolve_actor(blocks, actor, &actors);
        }
        self.check_strict(
            walked
                .iter()
                .flat_map(ActorBlocks::decompilations)
                .flat_map(Decompilation::diagnostics),
        )?;
        info!("decompiled {} actor(s)", walked.len());
        Ok(SceneBlocks { actors: walked })
    }

    fn check_strict<'d>(&self, diagnostics: impl Iterator<Item = &'d Diagnostic>) -> Result<(), LbaBlocksError> {
        if !self.options.strict {
            return Ok(());
        }
        let escalated: Vec<&Diagnostic> = diagnostics
            .filter(|d| !matches!(d, Diagnostic::UnrecognizedOpcode { .. }))
            .collect();
        match escalated.first() {
            Some(first) => Err(LbaBlocksError::Strict {
                count: escalated.len(),
                first: first.to_string(),
            }),
            None => Ok(()),
        }
    }
}

pub fn decompile_script(script: &Script, options: DecompileOptions) -> Result<Decompilation, LbaBlocksError> {
    Decompiler::new(options)?.decompile_script(script)
}

fn select_actor(scene: Scene, actor: Option<i64>) -> Result<Scene, LbaBlocksError> {
    let Some(index) = actor else {
        return Ok(scene);
    };
    let actors: Vec<Actor> = scene.actors.into_iter().filter(|a| a.index == index).collect();
    if actors.is_empty() {
        return Err(LbaBlocksError::ActorNotFound(index));
    }
    Ok(Scene { actors })
}

pub fn decompile_with_mode(json: &[u8], mode: OutputMode) -> Result<String, LbaBlocksError> {
    decompile_with_options(
        json,
        DecompileOptions {
            mode,
            ..DecompileOptions::default()
        },
    )
}

pub fn decompile_with_options(json: &[u8], options: DecompileOptions) -> Result<String, LbaBlocksError> {
    let scene = Scene::from_json(json)?;
    let decompiler = Decompiler::new(options)?;

    match options.mode {
        OutputMode::Listing => {
            let scene = select_actor(scene, options.actor)?;
            for actor in &scene.actors {
                for script in actor.life.iter().chain(actor.moves.iter()) {
                    script.validate()?;
                }
            }
            Ok(render::render_scene_listing(&scene))
        }
        OutputMode::Tree | OutputMode::Json => {
            // The whole scene is resolved before filtering so `_OBJ`
            // commands of the selected actor still see their targets.
            let mut blocks = decompiler.decompile_scene(&scene)?;
            if let Some(index) = options.actor {
                blocks.actors.retain(|a| a.index == index);
                if blocks.actors.is_empty() {
                    return Err(LbaBlocksError::ActorNotFound(index));
                }
            }
            if options.mode == OutputMode::Json {
                Ok(serde_json::to_string_pretty(&blocks)?)
            } else {
                Ok(render::render_scene_tree(&blocks))
            }
        }
    }
}

pub fn decompile(json: &[u8]) -> Result<String, LbaBlocksError> {
    decompile_with_options(json, DecompileOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_mode_ignores_skipped_opcodes() {
        let script = Script::new(
            ScriptKind::Life,
            vec![Command::new(0, "RETURN"), Command::new(1, "END")],
        );
        let options = DecompileOptions {
            strict: true,
            ..DecompileOptions::default()
        };
        let out = decompile_script(&script, options).unwrap();
        assert_eq!(out.diagnostics().count(), 1);
    }

    #[test]
    fn actor_scripts_must_match_their_slot() {
        let actor = Actor {
            index: 1,
            life: Some(Script::new(ScriptKind::Move, Vec::new())),
            moves: None,
        };
        let decompiler = Decompiler::new(DecompileOptions::default()).unwrap();
        assert!(matches!(
            decompiler.decompile_actor(&actor),
            Err(LbaBlocksError::KindMismatch {
                expected: ScriptKind::Life,
                found: ScriptKind::Move
            })
        ));
    }

    #[test]
    fn diagnostics_display_their_index() {
        let d = Diagnostic::StrayMarker {
            index: 4,
            opcode: "ENDIF".to_string(),
        };
        assert_eq!(d.index(), 4);
        assert_eq!(d.to_string(), "[4] ENDIF: no open scope to close");
    }

    #[test]
    fn missing_actor_is_an_error() {
        let json = br#"{"actors": [{"index": 0}]}"#;
        let options = DecompileOptions {
            actor: Some(3),
            ..DecompileOptions::default()
        };
        assert!(matches!(
            decompile_with_options(json, options),
            Err(LbaBlocksError::ActorNotFound(3))
        ));
    }
}
