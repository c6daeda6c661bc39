use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root(crate_dir: &Path) -> PathBuf {
    crate_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("crate directory should be <root>/crates/<name>")
        .to_path_buf()
}

fn take_until_paren_close<'a>(s: &'a str) -> Option<&'a str> {
    let s = s.trim();
    let j = s.find(')')?;
    Some(s[..j].trim())
}

fn value_kind_ident(kind: &str, allow_track: bool) -> &'static str {
    match kind {
        "int" => "ValueKind::Int",
        "angle" => "ValueKind::Angle",
        "text" => "ValueKind::Text",
        "track" if allow_track => "ValueKind::Track",
        other => panic!("unknown value kind `{other}`"),
    }
}

struct OpDef {
    name: String,
    class: String,
    block: String,
    args: Vec<String>,
}

fn parse_opcodes(src: &str, classes: &[String]) -> Vec<OpDef> {
    let mut ops = Vec::new();
    for line in src.lines() {
        let l = line.trim();
        let (hidden, rest) = if let Some(rest) = l.strip_prefix("def(") {
            (true, rest)
        } else if let Some(rest) = l.strip_prefix("DEF(") {
            (false, rest)
        } else {
            continue;
        };

        let inner = match take_until_paren_close(rest) {
            Some(v) => v,
            None => continue,
        };
        let parts: Vec<&str> = inner.split(',').map(|p| p.trim()).collect();
        if hidden {
            ops.push(OpDef {
                name: parts[0].to_string(),
                class: "hidden".to_string(),
                block: "-".to_string(),
                args: Vec::new(),
            });
            continue;
        }
        if parts.len() < 3 {
            panic!("malformed opcode definition: {l}");
        }
        let class = parts[1].to_string();
        if !classes.contains(&class) {
            panic!("opcode {} uses undeclared class `{class}`", parts[0]);
        }
        ops.push(OpDef {
            name: parts[0].to_string(),
            class,
            block: parts[2].to_string(),
            args: parts[3..].iter().map(|a| a.to_string()).collect(),
        });
    }
    ops
}

fn emit_opcodes(out: &mut String, const_name: &str, ops: &[OpDef]) {
    out.push_str(&format!("pub const {const_name}: &[OpInfo] = &[\n"));
    for op in ops {
        let args: Vec<&str> = op.args.iter().map(|a| value_kind_ident(a, false)).collect();
        out.push_str(&format!(
            "    OpInfo {{ name: \"{}\", class: OpClass::{}, block: \"{}\", args: &[{}] }},\n",
            op.name,
            op.class.to_ascii_uppercase(),
            op.block,
            args.join(", ")
        ));
    }
    out.push_str("];\n\n");
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let root = workspace_root(&manifest_dir);

    let classes_path = root.join("opcodes").join("classes.def");
    let life_path = root.join("opcodes").join("life.def");
    let move_path = root.join("opcodes").join("move.def");
    let cond_path = root.join("opcodes").join("conditions.def");

    for p in [&classes_path, &life_path, &move_path, &cond_path] {
        println!("cargo:rerun-if-changed={}", p.display());
    }

    let classes_src = fs::read_to_string(&classes_path).expect("read classes.def");
    let life_src = fs::read_to_string(&life_path).expect("read life.def");
    let move_src = fs::read_to_string(&move_path).expect("read move.def");
    let cond_src = fs::read_to_string(&cond_path).expect("read conditions.def");

    let mut classes: Vec<String> = Vec::new();
    for line in classes_src.lines() {
        let l = line.trim();
        if let Some(rest) = l.strip_prefix("CLASS(") {
            if let Some(name) = take_until_paren_close(rest) {
                if !name.is_empty() {
                    classes.push(name.to_string());
                }
            }
        }
    }
    if !classes.iter().any(|c| c == "hidden") {
        panic!("classes.def must declare the `hidden` class");
    }

    let life_ops = parse_opcodes(&life_src, &classes);
    let move_ops = parse_opcodes(&move_src, &classes);

    let mut conds: Vec<(String, String, Option<String>, String)> = Vec::new();
    for line in cond_src.lines() {
        let l = line.trim();
        let rest = match l.strip_prefix("COND(") {
            Some(v) => v,
            None => continue,
        };
        let inner = match take_until_paren_close(rest) {
            Some(v) => v,
            None => continue,
        };
        let parts: Vec<&str> = inner.split(',').map(|p| p.trim()).collect();
        if parts.len() != 4 {
            panic!("malformed condition definition: {l}");
        }
        let param = if parts[2] == "-" { None } else { Some(parts[2].to_string()) };
        conds.push((parts[0].to_string(), parts[1].to_string(), param, parts[3].to_string()));
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let out_path = out_dir.join("opcode_tables.rs");

    let mut out = String::new();

    out.push_str("#[allow(non_camel_case_types)]\n");
    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]\n");
    out.push_str("pub enum OpClass {\n");
    for c in &classes {
        out.push_str(&format!("    {},\n", c.to_ascii_uppercase()));
    }
    out.push_str("}\n\n");

    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]\n");
    out.push_str("#[serde(rename_all = \"snake_case\")]\n");
    out.push_str("pub enum ValueKind {\n    Int,\n    Angle,\n    Text,\n    Track,\n}\n\n");

    out.push_str("#[derive(Debug, Clone, Copy)]\n");
    out.push_str("pub struct OpInfo {\n");
    out.push_str("    pub name: &'static str,\n");
    out.push_str("    pub class: OpClass,\n");
    out.push_str("    pub block: &'static str,\n");
    out.push_str("    pub args: &'static [ValueKind],\n");
    out.push_str("}\n\n");

    out.push_str("#[derive(Debug, Clone, Copy)]\n");
    out.push_str("pub struct CondInfo {\n");
    out.push_str("    pub name: &'static str,\n");
    out.push_str("    pub block: &'static str,\n");
    out.push_str("    pub param: Option<&'static str>,\n");
    out.push_str("    pub operand: ValueKind,\n");
    out.push_str("}\n\n");

    emit_opcodes(&mut out, "LIFE_OPCODES", &life_ops);
    emit_opcodes(&mut out, "MOVE_OPCODES", &move_ops);

    out.push_str("pub const CONDITIONS: &[CondInfo] = &[\n");
    for (name, block, param, operand) in &conds {
        let param = match param {
            Some(p) => format!("Some(\"{p}\")"),
            None => "None".to_string(),
        };
        out.push_str(&format!(
            "    CondInfo {{ name: \"{}\", block: \"{}\", param: {}, operand: {} }},\n",
            name,
            block,
            param,
            value_kind_ident(operand, true)
        ));
    }
    out.push_str("];\n");

    fs::write(out_path, out).expect("write generated opcode tables");
}
