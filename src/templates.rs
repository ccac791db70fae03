//! Fixed fragments of the emitted parser.
//!
//! Everything grammar-independent lives here as source text; `translate`
//! splices these around the generated pattern table and per-token/per-rule
//! helpers. The emitted file depends on `regex` and `serde_json` only.

/// Crate-level header of the emitted file, after the generated comment.
pub const TPL_PRELUDE: &str = r#"
use std::env;
use std::fs;
use std::path::Path;
use std::process;

use regex::Regex;
use serde_json::{Map, Value};
"#;

pub const TPL_VERBOSITY: &str = r#"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Verbosity {
    Error,
    Warning,
    Success,
    Debug1,
    Info,
    Debug2,
    Debug3,
    All,
}

impl Verbosity {
    fn parse(level: &str) -> Option<Verbosity> {
        Some(match level {
            "error" => Verbosity::Error,
            "warning" => Verbosity::Warning,
            "success" => Verbosity::Success,
            "debug1" => Verbosity::Debug1,
            "info" => Verbosity::Info,
            "debug2" => Verbosity::Debug2,
            "debug3" => Verbosity::Debug3,
            "all" => Verbosity::All,
            _ => return None,
        })
    }

    fn label(self) -> &'static str {
        match self {
            Verbosity::Error => "error",
            Verbosity::Warning => "warning",
            Verbosity::Success => "success",
            Verbosity::Debug1 => "debug1",
            Verbosity::Info => "info",
            Verbosity::Debug2 => "debug2",
            Verbosity::Debug3 => "debug3",
            Verbosity::All => "all",
        }
    }
}
"#;

/// Parser state and the grammar-independent half of its behavior.
pub const TPL_PARSER_CORE: &str = r#"
struct Parser {
    src: String,
    filename: String,
    pos: usize,
    pat: Patterns,
    scopes: Vec<Map<String, Value>>,
    verbs: Vec<Verbosity>,
    classifiers: Vec<String>,
    stream: Vec<Value>,
}

impl Parser {
    fn new(src: String, filename: &str, verbosity: Verbosity) -> Parser {
        Parser {
            src,
            filename: filename.to_string(),
            pos: 0,
            pat: Patterns::new(),
            scopes: Vec::new(),
            verbs: vec![verbosity],
            classifiers: Vec::new(),
            stream: Vec::new(),
        }
    }

    fn verbosity(&self) -> Verbosity {
        *self.verbs.last().unwrap_or(&Verbosity::Error)
    }

    fn location(&self) -> (u64, u64) {
        self.location_at(self.pos)
    }

    /// 1-based line and column of a byte offset, derived from the consumed
    /// prefix.
    fn location_at(&self, pos: usize) -> (u64, u64) {
        let consumed = &self.src[..pos];
        let line = consumed.matches('\n').count() as u64 + 1;
        let col = match consumed.rfind('\n') {
            Some(idx) => consumed[idx + 1..].chars().count() as u64 + 1,
            None => consumed.chars().count() as u64 + 1,
        };
        (line, col)
    }

    fn fail(&self, message: &str) -> ! {
        let (line, col) = self.location();
        eprintln!("error: {message} ({}:{line}:{col})", self.filename);
        process::exit(1);
    }

    fn log(&self, level: Verbosity, message: &str) {
        if level <= self.verbosity() {
            let (line, col) = self.location();
            eprintln!("{}: {message} ({}:{line}:{col})", level.label(), self.filename);
        }
    }

    /// Consumes skip tokens at the cursor until none applies.
    fn skip(&mut self) {
        loop {
            let mut advanced = false;
            for i in 0..self.pat.skip.len() {
                if let Some(m) = self.pat.skip[i].find(&self.src[self.pos..]) {
                    if !m.as_str().is_empty() {
                        self.pos += m.end();
                        advanced = true;
                        break;
                    }
                }
            }
            if !advanced {
                return;
            }
        }
    }

    /// Matches `re` at the cursor without advancing. Returns the whole match
    /// length and the text of capture group `group`.
    fn peek_pattern(&self, re: &Regex, group: usize) -> Option<(usize, String)> {
        let caps = re.captures(&self.src[self.pos..])?;
        let len = caps.get(0).map(|m| m.as_str().len())?;
        let value = caps
            .get(group)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        Some((len, value))
    }

    /// Commits a token match: builds its node, records it in the stream
    /// under the active classifier (falling back to the token's own tag),
    /// advances, and skips.
    fn take_token(&mut self, kind: &str, classifier: &str, len: usize, value: String) -> Value {
        let lc = self.location();
        self.pos += len;
        self.record(kind, classifier, &value, lc);
        self.skip();
        token_node(kind, &value, lc)
    }

    fn record(&mut self, kind: &str, classifier: &str, value: &str, lc: (u64, u64)) {
        let classifier = self
            .classifiers
            .last()
            .cloned()
            .unwrap_or_else(|| classifier.to_string());
        let mut map = Map::new();
        map.insert("kind".to_string(), Value::String(kind.to_string()));
        map.insert("value".to_string(), Value::String(value.to_string()));
        map.insert("lc".to_string(), lc_value(lc));
        map.insert("classifier".to_string(), Value::String(classifier));
        self.stream.push(Value::Object(map));
    }

    fn is_lit(&self, index: usize) -> bool {
        self.pat.lits[index].is_match(&self.src[self.pos..])
    }

    fn match_lit(&mut self, index: usize) -> Option<Value> {
        let (len, value) = self.peek_pattern(&self.pat.lits[index], 0)?;
        Some(self.take_token("TOKEN", "token", len, value))
    }

    fn expect_lit(&mut self, index: usize, what: &str) -> Value {
        match self.match_lit(index) {
            Some(tok) => tok,
            None => self.fail(&format!("expected {what}")),
        }
    }

    /// Field projection for dotted captures.
    fn project(&self, value: &Value, field: &str, what: &str) -> Value {
        match value.get(field) {
            Some(v) => v.clone(),
            None => self.fail(&format!("{what} match has no field `{field}`")),
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(Map::new());
    }

    fn pop_scope(&mut self) -> Map<String, Value> {
        self.scopes.pop().unwrap_or_default()
    }

    /// Registers `node[field]` in the topmost scope; a duplicate is fatal.
    fn declare(&mut self, node: &Map<String, Value>, field: &str) {
        let name = match node.get(field) {
            Some(Value::String(name)) => name.clone(),
            _ => self.fail(&format!("`declare` field `{field}` is not a string")),
        };
        if self.scopes.is_empty() {
            self.fail(&format!("`declare:{field}` outside any scope"));
        }
        let duplicate = self
            .scopes
            .last()
            .map_or(false, |scope| scope.contains_key(&name));
        if duplicate {
            self.fail(&format!("duplicate identifier `{name}`"));
        }
        let entry = Value::Object(node.clone());
        self.scopes.last_mut().expect("checked above").insert(name, entry);
    }

    fn push_classifier(&mut self, tag: &str) {
        self.classifiers.push(tag.to_string());
    }

    fn pop_classifier(&mut self) {
        self.classifiers.pop();
    }

    /// `reclassify`: replaces the whole classifier stack for the duration of
    /// a rule.
    fn swap_classifiers(&mut self, tag: &str) -> Vec<String> {
        let saved = std::mem::take(&mut self.classifiers);
        self.classifiers.push(tag.to_string());
        saved
    }

    fn restore_classifiers(&mut self, saved: Vec<String>) {
        self.classifiers = saved;
    }

    /// `retroclassify`: rewrites the tags of stream records emitted since
    /// `from`.
    fn retroclassify(&mut self, from: usize, tag: &str) {
        for record in &mut self.stream[from..] {
            if let Value::Object(map) = record {
                map.insert("classifier".to_string(), Value::String(tag.to_string()));
            }
        }
    }

    fn check_relative(&self, path: String) -> String {
        if Path::new(&path).is_absolute() {
            self.fail(&format!("expected a relative path, got `{path}`"));
        }
        path
    }

    fn check_absolute(&self, path: String) -> String {
        if !Path::new(&path).is_absolute() {
            self.fail(&format!("expected an absolute path, got `{path}`"));
        }
        path
    }

    fn ensure_relative(&self, path: String) -> String {
        let p = Path::new(&path);
        if !p.is_absolute() {
            return path;
        }
        env::current_dir()
            .ok()
            .and_then(|cwd| p.strip_prefix(&cwd).ok().map(|r| r.to_string_lossy().into_owned()))
            .unwrap_or(path)
    }

    fn ensure_absolute(&self, path: String) -> String {
        let p = Path::new(&path);
        if p.is_absolute() {
            return path;
        }
        match env::current_dir() {
            Ok(cwd) => cwd.join(p).to_string_lossy().into_owned(),
            Err(_) => path,
        }
    }

    fn warn_missing(&self, path: &str) {
        if !Path::new(path).exists() {
            self.log(Verbosity::Warning, &format!("path `{path}` does not exist"));
        }
    }
}
"#;

/// Free helpers for node assembly.
pub const TPL_NODE_HELPERS: &str = r#"
fn lc_value(lc: (u64, u64)) -> Value {
    Value::Array(vec![Value::from(lc.0), Value::from(lc.1)])
}

fn new_node(kind: &str, lc: (u64, u64)) -> Map<String, Value> {
    let mut node = Map::new();
    node.insert("kind".to_string(), Value::String(kind.to_string()));
    node.insert("lc".to_string(), lc_value(lc));
    node
}

fn token_node(kind: &str, value: &str, lc: (u64, u64)) -> Value {
    let mut node = new_node(kind, lc);
    node.insert("value".to_string(), Value::String(value.to_string()));
    Value::Object(node)
}

/// Captured tokens contribute their value string.
fn tok_value(tok: &Value) -> Value {
    tok.get("value").cloned().unwrap_or(Value::Null)
}

/// List captures: the list is created on the first append, so an empty one
/// never shadows `key` reduction.
fn append(node: &mut Map<String, Value>, key: &str, item: Value) {
    match node.get_mut(key) {
        Some(Value::Array(list)) => list.push(item),
        _ => {
            node.insert(key.to_string(), Value::Array(vec![item]));
        }
    }
}

/// Folds a merged sub-node into `node`: its kind replaces the node's, and its
/// fields other than `kind`/`lc` are copied in. With a capture name, the
/// sub-node's `value` lands under that name.
fn merge_into(node: &mut Map<String, Value>, sub: Value, capture: Option<&str>) {
    let Value::Object(sub) = sub else { return };
    for (field, value) in sub {
        match (field.as_str(), capture) {
            ("kind", _) => {
                node.insert("kind".to_string(), value);
            }
            ("lc", _) => {}
            ("value", Some(name)) => {
                node.insert(name.to_string(), value);
            }
            _ => {
                node.insert(field, value);
            }
        }
    }
}

/// `flip:P`: the child stored at `P` becomes the parent, receiving the
/// current node under `P`.
fn flipped(mut node: Map<String, Value>, field: &str) -> Value {
    match node.remove(field) {
        Some(Value::Object(mut child)) => {
            child.insert(field.to_string(), Value::Object(node));
            Value::Object(child)
        }
        Some(other) => {
            node.insert(field.to_string(), other);
            Value::Object(node)
        }
        None => Value::Object(node),
    }
}
"#;

/// CLI entry point of the emitted parser. Relies on the generated
/// `DEFAULT_START` constant and `parse` function.
pub const TPL_MAIN: &str = r#"
fn usage() -> ! {
    eprintln!("usage: parser <source_path> --out <ast_path> [--start <RuleName>] [-v|--verbosity <level>]");
    process::exit(2);
}

fn main() {
    let mut args = env::args().skip(1);
    let mut source_path: Option<String> = None;
    let mut out_path: Option<String> = None;
    let mut start: Option<String> = None;
    let mut verbosity = Verbosity::Error;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => out_path = args.next(),
            "--start" => start = args.next(),
            "-v" | "--verbosity" => {
                let level = args.next().unwrap_or_default();
                verbosity = match Verbosity::parse(&level) {
                    Some(v) => v,
                    None => {
                        eprintln!("error: unknown verbosity level `{level}`");
                        process::exit(2);
                    }
                };
            }
            _ if source_path.is_none() && !arg.starts_with('-') => source_path = Some(arg.clone()),
            other => {
                eprintln!("error: unexpected argument `{other}`");
                usage();
            }
        }
    }

    let Some(source_path) = source_path else { usage() };
    let Some(out_path) = out_path else { usage() };
    let start = match start.or_else(|| DEFAULT_START.map(str::to_string)) {
        Some(start) => start,
        None => {
            eprintln!("error: the grammar declares no start rule; pass --start");
            process::exit(2);
        }
    };

    let source = match fs::read_to_string(&source_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read `{source_path}`: {err}");
            process::exit(1);
        }
    };

    match parse(source, &source_path, &start, verbosity) {
        Some(ast) => {
            let json = serde_json::to_string_pretty(&ast).expect("AST is plain JSON");
            if let Err(err) = fs::write(&out_path, json) {
                eprintln!("error: cannot write `{out_path}`: {err}");
                process::exit(1);
            }
        }
        // No node: no output file.
        None => {}
    }
}
"#;
