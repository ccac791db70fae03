//! Lowers a validated grammar model into the source of a stand-alone
//! recursive-descent parser.
//!
//! The emitted file contains the compiled pattern table, `is_`/`match_`/
//! `expect_` helpers per token and token group, `is_`/`match_` per rule, a
//! `parse` entry point, and a small CLI. Rule look-ahead (`is_*`) is built
//! purely from FIRST-set tests over the next lexeme and never calls
//! `match_*`; `match_*` is transactional and restores the cursor on
//! no-match.

use std::collections::HashMap;

use crate::analysis::anchored;
use crate::ast::*;
use crate::templates::*;
use crate::writer::{quoted, RustWriter};

pub fn translate(grammar: &Grammar, grammar_filename: &str) -> String {
    let ctx = Ctx::new(grammar);
    let mut w = RustWriter::new();

    w.comment(&format!(
        "Parser generated by rsgrammer from `{grammar_filename}`."
    ));
    w.comment("Do not edit; regenerate instead.");
    w.line("#![allow(dead_code, unused_variables, unused_mut)]");
    w.template(TPL_PRELUDE);
    w.template(TPL_VERBOSITY);
    w.blank();
    emit_patterns(&mut w, &ctx);
    w.template(TPL_PARSER_CORE);
    w.template(TPL_NODE_HELPERS);
    w.blank();
    emit_token_helpers(&mut w, &ctx);
    w.blank();
    emit_rule_helpers(&mut w, &ctx);
    w.blank();
    emit_entry(&mut w, &ctx);
    w.template(TPL_MAIN);
    w.finish()
}

struct Ctx<'a> {
    grammar: &'a Grammar,
    /// Deduplicated inline literals: raw text and compiled-pattern source.
    lits: Vec<(String, String)>,
    lit_index: HashMap<String, usize>,
}

impl<'a> Ctx<'a> {
    fn new(grammar: &'a Grammar) -> Ctx<'a> {
        let mut ctx = Ctx {
            grammar,
            lits: Vec::new(),
            lit_index: HashMap::new(),
        };
        for rule in &grammar.rules {
            for def in &rule.definitions {
                for item in &def.items {
                    ctx.collect_literals(item);
                }
            }
        }
        ctx
    }

    fn collect_literals(&mut self, item: &Item) {
        match &item.kind {
            ItemKind::Literal(raw) => {
                if !self.lit_index.contains_key(raw) {
                    self.lit_index.insert(raw.clone(), self.lits.len());
                    self.lits.push((raw.clone(), literal_pattern(raw)));
                }
            }
            ItemKind::Group(group) => {
                for sub in &group.items {
                    self.collect_literals(sub);
                }
            }
            _ => {}
        }
    }

    fn lit(&self, raw: &str) -> usize {
        self.lit_index[raw]
    }

    fn is_merge_rule(&self, name: &str) -> bool {
        self.grammar
            .rule(name)
            .map_or(false, |rule| rule.has_directive(DirectiveFlag::Merge))
    }

    /// Tokens that get their own pattern field and helper trio.
    fn emitted_tokens(&self) -> impl Iterator<Item = &Token> {
        self.grammar
            .tokens
            .iter()
            .filter(|t| !t.has(Decorator::Internal) && !t.has(Decorator::Skip))
    }
}

// ---- pattern table ----

fn regex_new(pattern: &str) -> String {
    format!(
        "Regex::new({}).expect(\"pattern validated at generation\")",
        quoted(pattern)
    )
}

fn emit_patterns(w: &mut RustWriter, ctx: &Ctx) {
    w.block("struct Patterns", |w| {
        for token in ctx.emitted_tokens() {
            w.line(format!("t_{}: Regex,", snake_case(&token.name)));
            if !token.exclusions.is_empty() {
                w.line(format!("excl_{}: Vec<Regex>,", snake_case(&token.name)));
            }
        }
        for group in &ctx.grammar.groups {
            w.line(format!("g_{}: Regex,", snake_case(&group.name)));
        }
        w.line("lits: Vec<Regex>,");
        w.line("skip: Vec<Regex>,");
    });
    w.blank();
    w.block("impl Patterns", |w| {
        w.block("fn new() -> Patterns", |w| {
            w.block("Patterns", |w| {
                for token in ctx.emitted_tokens() {
                    w.line(format!(
                        "t_{}: {},",
                        snake_case(&token.name),
                        regex_new(&anchored(token.regex()))
                    ));
                    if !token.exclusions.is_empty() {
                        w.line(format!("excl_{}: vec![", snake_case(&token.name)));
                        w.indented(|w| {
                            for exclusion in &token.exclusions {
                                let group = ctx
                                    .grammar
                                    .group(exclusion)
                                    .expect("exclusions resolved in analysis");
                                let pattern = format!(r"\A(?:{})\z", group.pattern());
                                w.line(format!("{},", regex_new(&pattern)));
                            }
                        });
                        w.line("],");
                    }
                }
                for group in &ctx.grammar.groups {
                    w.line(format!(
                        "g_{}: {},",
                        snake_case(&group.name),
                        regex_new(&anchored(&group.pattern()))
                    ));
                }
                w.line("lits: vec![");
                w.indented(|w| {
                    for (_, pattern) in &ctx.lits {
                        w.line(format!("{},", regex_new(&anchored(pattern))));
                    }
                });
                w.line("],");
                w.line("skip: vec![");
                w.indented(|w| {
                    for token in ctx.grammar.tokens.iter().filter(|t| t.has(Decorator::Skip)) {
                        w.line(format!("{},", regex_new(&anchored(token.regex()))));
                    }
                });
                w.line("],");
            });
        });
    });
}

// ---- token helpers ----

fn emit_token_helpers(w: &mut RustWriter, ctx: &Ctx) {
    w.block("impl Parser", |w| {
        for token in ctx.emitted_tokens() {
            emit_token(w, token);
            w.blank();
        }
        for group in &ctx.grammar.groups {
            let snake = snake_case(&group.name);
            emit_matcher(
                w,
                &snake,
                &format!("self.pat.g_{snake}"),
                0,
                &group.name,
                &snake,
                false,
                &[],
            );
            w.blank();
        }
    });
}

fn emit_token(w: &mut RustWriter, token: &Token) {
    let snake = snake_case(&token.name);
    let field = format!("self.pat.t_{snake}");
    if token.has(Decorator::LoadAndParse) {
        emit_loadandparse_token(w, token, &snake, &field);
    } else {
        let classifier = token
            .classification
            .clone()
            .unwrap_or_else(|| snake.clone());
        emit_matcher(
            w,
            &snake,
            &field,
            token.group_index,
            &token.name,
            &classifier,
            !token.exclusions.is_empty(),
            &token.decorators,
        );
    }
}

fn emit_matcher(
    w: &mut RustWriter,
    snake: &str,
    field: &str,
    group_index: u32,
    kind: &str,
    classifier: &str,
    excluded: bool,
    decorators: &[Decorator],
) {
    w.block(&format!("fn is_{snake}(&self) -> bool"), |w| {
        if excluded {
            w.block(&format!("match self.peek_pattern(&{field}, {group_index})"), |w| {
                w.line(format!(
                    "Some((_, value)) => !self.pat.excl_{snake}.iter().any(|re| re.is_match(&value)),"
                ));
                w.line("None => false,");
            });
        } else {
            w.line(format!("self.peek_pattern(&{field}, {group_index}).is_some()"));
        }
    });
    w.blank();
    w.block(&format!("fn match_{snake}(&mut self) -> Option<Value>"), |w| {
        w.line(format!(
            "let (len, value) = self.peek_pattern(&{field}, {group_index})?;"
        ));
        if excluded {
            w.block(
                &format!("if self.pat.excl_{snake}.iter().any(|re| re.is_match(&value))"),
                |w| w.line("return None;"),
            );
        }
        emit_path_checks(w, decorators);
        w.line(format!(
            "Some(self.take_token({}, {}, len, value))",
            quoted(kind),
            quoted(classifier)
        ));
    });
    w.blank();
    w.block(&format!("fn expect_{snake}(&mut self) -> Value"), |w| {
        w.block(&format!("match self.match_{snake}()"), |w| {
            w.line("Some(tok) => tok,");
            w.line(format!("None => self.fail({}),", quoted(&format!("expected {kind}"))));
        });
    });
}

fn emit_path_checks(w: &mut RustWriter, decorators: &[Decorator]) {
    use Decorator::*;
    if decorators.contains(&RelFilePath) || decorators.contains(&RelDirPath) {
        w.line("let value = self.check_relative(value);");
    }
    if decorators.contains(&AbsFilePath) || decorators.contains(&AbsDirPath) {
        w.line("let value = self.check_absolute(value);");
    }
    if decorators.contains(&EnsureRelative) {
        w.line("let value = self.ensure_relative(value);");
    }
    if decorators.contains(&EnsureAbsolute) {
        w.line("let value = self.ensure_absolute(value);");
    }
    if decorators
        .iter()
        .any(|d| matches!(d, RelFilePath | AbsFilePath | RelDirPath | AbsDirPath))
    {
        w.line("self.warn_missing(&value);");
    }
}

fn emit_loadandparse_token(w: &mut RustWriter, token: &Token, snake: &str, field: &str) {
    let group_index = token.group_index;
    w.block(&format!("fn is_{snake}(&self) -> bool"), |w| {
        w.line(format!("self.peek_pattern(&{field}, {group_index}).is_some()"));
    });
    w.blank();
    w.block(&format!("fn match_{snake}(&mut self) -> Option<Value>"), |w| {
        w.line(format!(
            "let (len, value) = self.peek_pattern(&{field}, {group_index})?;"
        ));
        emit_path_checks(w, &token.decorators);
        w.line(format!(
            "let tok = self.take_token(\"SUBMODULE\", {}, len, value.clone());",
            quoted(snake)
        ));
        w.line("let ast = parse_file(&value, self.verbosity());");
        w.line("let Value::Object(mut map) = tok else { unreachable!() };");
        w.block("if let Some(ast) = ast", |w| {
            w.line("map.insert(\"ast\".to_string(), ast);");
        });
        w.line("Some(Value::Object(map))");
    });
    w.blank();
    w.block(&format!("fn expect_{snake}(&mut self) -> Value"), |w| {
        w.block(&format!("match self.match_{snake}()"), |w| {
            w.line("Some(tok) => tok,");
            w.line(format!(
                "None => self.fail({}),",
                quoted(&format!("expected {}", token.name))
            ));
        });
    });
}

// ---- look-ahead ----

/// Look-ahead test for a single item: a peek at the next lexeme only.
fn item_lookahead(ctx: &Ctx, item: &Item) -> String {
    match &item.kind {
        ItemKind::TokenRef(name) | ItemKind::GroupRef(name) | ItemKind::RuleRef(name) => {
            format!("self.is_{}()", snake_case(name))
        }
        ItemKind::Literal(raw) => format!("self.is_lit({})", ctx.lit(raw)),
        ItemKind::Group(group) => match group.mode {
            GroupMode::Alternative => group
                .items
                .iter()
                .map(|sub| item_lookahead(ctx, sub))
                .collect::<Vec<_>>()
                .join(" || "),
            GroupMode::Sequential | GroupMode::Optional => seq_lookahead(ctx, &group.items),
        },
        ItemKind::NameRef(_) => unreachable!("references bound during resolution"),
    }
}

/// Look-ahead for a sequence: the leading nullable items or-ed with the first
/// required one.
fn seq_lookahead(ctx: &Ctx, items: &[Item]) -> String {
    let mut parts = Vec::new();
    for item in items {
        parts.push(item_lookahead(ctx, item));
        if !item.is_nullable() {
            break;
        }
    }
    parts.join(" || ")
}

// ---- rule helpers ----

fn emit_rule_helpers(w: &mut RustWriter, ctx: &Ctx) {
    w.block("impl Parser", |w| {
        for rule in &ctx.grammar.rules {
            emit_rule(w, ctx, rule);
            w.blank();
        }
    });
}

fn verbosity_variant(level: &str) -> &'static str {
    match level {
        "error" => "Error",
        "warning" => "Warning",
        "success" => "Success",
        "debug1" => "Debug1",
        "info" => "Info",
        "debug2" => "Debug2",
        "debug3" => "Debug3",
        _ => "All",
    }
}

fn emit_rule(w: &mut RustWriter, ctx: &Ctx, rule: &Rule) {
    let snake = snake_case(&rule.name);
    let lookaheads: Vec<String> = rule
        .definitions
        .iter()
        .map(|def| seq_lookahead(ctx, &def.items))
        .collect();

    w.block(&format!("fn is_{snake}(&self) -> bool"), |w| {
        w.line(lookaheads.join(" || "));
    });
    w.blank();

    w.block(&format!("fn match_{snake}(&mut self) -> Option<Value>"), |w| {
        w.line("let start = self.pos;");
        w.line("let lc = self.location();");
        w.line(format!(
            "self.log(Verbosity::Debug3, {});",
            quoted(&format!("matching {}", rule.name))
        ));
        w.line(format!("let mut node = new_node({}, lc);", quoted(&rule.node_kind())));

        if let Some(level) = rule.attr_value(AttrKey::Verbosity) {
            w.line(format!("self.verbs.push(Verbosity::{});", verbosity_variant(level)));
        }
        if rule.attr(AttrKey::Retroclassify).is_some() {
            w.line("let stream_mark = self.stream.len();");
        }
        if let Some(tag) = rule.attr_value(AttrKey::Reclassify) {
            w.line(format!("let saved_classifiers = self.swap_classifiers({});", quoted(tag)));
        } else if let Some(tag) = rule.attr_value(AttrKey::Classify) {
            w.line(format!("self.push_classifier({});", quoted(tag)));
        }
        if rule.attr(AttrKey::Scope).is_some() {
            w.line("self.push_scope();");
        }

        w.line("let mut matched = true;");
        for (i, def) in rule.definitions.iter().enumerate() {
            let head = if i == 0 {
                format!("if {}", lookaheads[i])
            } else {
                format!("else if {}", lookaheads[i])
            };
            w.block(&head, |w| emit_definition_body(w, ctx, rule, def));
        }
        w.block("else", |w| w.line("matched = false;"));

        if let Some(scope) = rule.attr_value(AttrKey::Scope) {
            w.line("let frame = self.pop_scope();");
            w.block("if matched", |w| {
                w.line(format!(
                    "node.insert({}.to_string(), Value::Object(frame));",
                    quoted(scope)
                ));
            });
        }
        if rule.attr(AttrKey::Reclassify).is_some() {
            w.line("self.restore_classifiers(saved_classifiers);");
        } else if rule.attr(AttrKey::Classify).is_some() {
            w.line("self.pop_classifier();");
        }
        if rule.attr(AttrKey::Verbosity).is_some() {
            w.line("self.verbs.pop();");
        }

        w.block("if !matched", |w| {
            w.line("self.pos = start;");
            w.line("return None;");
        });

        if let Some(field) = rule.attr_value(AttrKey::Declare) {
            w.line(format!("self.declare(&node, {});", quoted(field)));
        }
        if let Some(tag) = rule.attr_value(AttrKey::Retroclassify) {
            w.line(format!("self.retroclassify(stream_mark, {});", quoted(tag)));
        }

        if let Some(key) = rule.attr_value(AttrKey::Key) {
            let key_q = quoted(key);
            w.block(
                &format!("if node.len() == 3 && node.contains_key({key_q})"),
                |w| {
                    w.line(format!(
                        "return Some(node.remove({key_q}).expect(\"key field present\"));"
                    ));
                },
            );
            if let Some(flip) = rule.attr_value(AttrKey::Flip) {
                w.line(format!("Some(flipped(node, {}))", quoted(flip)));
            } else {
                w.line("Some(Value::Object(node))");
            }
        } else {
            w.line("Some(Value::Object(node))");
        }
    });
}

fn emit_definition_body(w: &mut RustWriter, ctx: &Ctx, rule: &Rule, def: &Definition) {
    // A merge rule's single-item captureless definition adopts the sub-node.
    let adopt = rule.has_directive(DirectiveFlag::Merge)
        && def.items.len() == 1
        && def.items[0].capture.is_none()
        && !matches!(def.items[0].kind, ItemKind::Group(_));

    for item in &def.items {
        let action = if adopt {
            Action::Merge(None)
        } else {
            action_for(ctx, item)
        };
        emit_item(w, ctx, item, action);
    }
}

/// How a matched item's value lands in the node under assembly.
enum Action {
    Store,
    /// Reference to a `merge` rule (or adoption): fold the sub-node in.
    Merge(Option<String>),
}

fn action_for(ctx: &Ctx, item: &Item) -> Action {
    if let ItemKind::RuleRef(target) = &item.kind {
        if ctx.is_merge_rule(target) {
            return Action::Merge(item.capture.as_ref().map(|c| c.name.clone()));
        }
    }
    Action::Store
}

fn emit_item(w: &mut RustWriter, ctx: &Ctx, item: &Item, action: Action) {
    if let ItemKind::Group(group) = &item.kind {
        emit_group(w, ctx, item, group);
        return;
    }

    let (mcall, ecall) = calls(ctx, item);
    let stores = matches!(action, Action::Merge(_)) || item.capture.is_some();

    match item.count {
        Multiplicity::One => {
            if stores {
                w.line(format!("let m = {ecall};"));
                emit_store(w, item, &action);
            } else {
                w.line(format!("{ecall};"));
            }
        }
        Multiplicity::ZeroOrOne => {
            if stores {
                w.block(&format!("if let Some(m) = {mcall}"), |w| {
                    emit_store(w, item, &action);
                });
            } else {
                w.line(format!("let _ = {mcall};"));
            }
        }
        Multiplicity::ZeroOrMore => {
            if stores {
                w.block(&format!("while let Some(m) = {mcall}"), |w| {
                    emit_store(w, item, &action);
                });
            } else {
                w.line(format!("while {mcall}.is_some() {{}}"));
            }
        }
        Multiplicity::OneOrMore => {
            if stores {
                w.line(format!("let m = {ecall};"));
                emit_store(w, item, &action);
                w.block(&format!("while let Some(m) = {mcall}"), |w| {
                    emit_store(w, item, &action);
                });
            } else {
                w.line(format!("{ecall};"));
                w.line(format!("while {mcall}.is_some() {{}}"));
            }
        }
    }
}

fn calls(ctx: &Ctx, item: &Item) -> (String, String) {
    match &item.kind {
        ItemKind::TokenRef(name) | ItemKind::GroupRef(name) | ItemKind::RuleRef(name) => {
            let snake = snake_case(name);
            (format!("self.match_{snake}()"), format!("self.expect_{snake}()"))
        }
        ItemKind::Literal(raw) => {
            let index = ctx.lit(raw);
            let what = quoted(&format!("'{raw}'"));
            (
                format!("self.match_lit({index})"),
                format!("self.expect_lit({index}, {what})"),
            )
        }
        ItemKind::Group(_) | ItemKind::NameRef(_) => {
            unreachable!("groups handled separately, references bound during resolution")
        }
    }
}

fn item_what(item: &Item) -> String {
    match &item.kind {
        ItemKind::TokenRef(name) | ItemKind::GroupRef(name) | ItemKind::RuleRef(name) => {
            name.clone()
        }
        ItemKind::Literal(raw) => format!("'{raw}'"),
        ItemKind::Group(_) => "group".to_string(),
        ItemKind::NameRef(name) => name.clone(),
    }
}

fn emit_store(w: &mut RustWriter, item: &Item, action: &Action) {
    match action {
        Action::Merge(capture) => {
            let capture = match capture {
                Some(name) => format!("Some({})", quoted(name)),
                None => "None".to_string(),
            };
            w.line(format!("merge_into(&mut node, m, {capture});"));
        }
        Action::Store => {
            let capture = item.capture.as_ref().expect("caller checked");
            let value = match (&item.kind, &capture.field) {
                (_, Some(field)) => format!(
                    "self.project(&m, {}, {})",
                    quoted(field),
                    quoted(&item_what(item))
                ),
                (ItemKind::RuleRef(_), None) => "m".to_string(),
                (_, None) => "tok_value(&m)".to_string(),
            };
            if capture.list {
                w.line(format!("append(&mut node, {}, {value});", quoted(&capture.name)));
            } else {
                w.line(format!(
                    "node.insert({}.to_string(), {value});",
                    quoted(&capture.name)
                ));
            }
        }
    }
}

fn emit_group(w: &mut RustWriter, ctx: &Ctx, item: &Item, group: &InlineGroup) {
    match group.mode {
        GroupMode::Optional => {
            // Entered on the first item's look-ahead; past that, failure of a
            // required item is fatal rather than a backtrack.
            w.block(&format!("if {}", seq_lookahead(ctx, &group.items)), |w| {
                for sub in &group.items {
                    let action = action_for(ctx, sub);
                    emit_item(w, ctx, sub, action);
                }
            });
        }
        GroupMode::Sequential => {
            let look = seq_lookahead(ctx, &group.items);
            let body = |w: &mut RustWriter| {
                for sub in &group.items {
                    let action = action_for(ctx, sub);
                    emit_item(w, ctx, sub, action);
                }
            };
            match item.count {
                Multiplicity::ZeroOrOne => w.block(&format!("if {look}"), body),
                Multiplicity::ZeroOrMore => w.block(&format!("while {look}"), body),
                Multiplicity::OneOrMore => {
                    w.block("loop", |w| {
                        body(w);
                        w.block(&format!("if !({look})"), |w| w.line("break;"));
                    });
                }
                // Unreachable for well-formed grammars: the parser requires a
                // trailing multiplicity on `(...)` groups.
                Multiplicity::One => body(w),
            }
        }
        GroupMode::Alternative => emit_alternative(w, ctx, item, group),
    }
}

fn emit_alternative(w: &mut RustWriter, ctx: &Ctx, item: &Item, group: &InlineGroup) {
    let expected = quoted(&format!(
        "expected one of: {}",
        group
            .items
            .iter()
            .map(item_what)
            .collect::<Vec<_>>()
            .join(", ")
    ));

    let chain = |w: &mut RustWriter, fallback: &str| {
        for (i, alt) in group.items.iter().enumerate() {
            let head = if i == 0 {
                format!("if {}", item_lookahead(ctx, alt))
            } else {
                format!("else if {}", item_lookahead(ctx, alt))
            };
            w.block(&head, |w| {
                let action = action_for(ctx, alt);
                emit_item(w, ctx, alt, action);
            });
        }
        w.block("else", |w| w.line(fallback));
    };

    match item.count {
        Multiplicity::One => chain(w, &format!("self.fail({expected});")),
        Multiplicity::ZeroOrOne => {
            // No branch matching is fine for `(...)?`.
            for (i, alt) in group.items.iter().enumerate() {
                let head = if i == 0 {
                    format!("if {}", item_lookahead(ctx, alt))
                } else {
                    format!("else if {}", item_lookahead(ctx, alt))
                };
                w.block(&head, |w| {
                    let action = action_for(ctx, alt);
                    emit_item(w, ctx, alt, action);
                });
            }
        }
        Multiplicity::ZeroOrMore => {
            w.block("loop", |w| chain(w, "break;"));
        }
        Multiplicity::OneOrMore => {
            w.line("let mut matched_any = false;");
            w.block("loop", |w| {
                chain(w, "break;");
                w.line("matched_any = true;");
            });
            w.block("if !matched_any", |w| {
                w.line(format!("self.fail({expected});"));
            });
        }
    }
}

// ---- entry point ----

fn emit_entry(w: &mut RustWriter, ctx: &Ctx) {
    match &ctx.grammar.start {
        Some(name) => w.line(format!(
            "const DEFAULT_START: Option<&str> = Some({});",
            quoted(name)
        )),
        None => w.line("const DEFAULT_START: Option<&str> = None;"),
    }
    w.blank();

    w.block(
        "fn parse(source: String, filename: &str, start: &str, verbosity: Verbosity) -> Option<Value>",
        |w| {
            w.line("let mut parser = Parser::new(source, filename, verbosity);");
            w.line("parser.skip();");
            w.line("let node = match start {");
            w.indented(|w| {
                for rule in &ctx.grammar.rules {
                    w.line(format!(
                        "{} => parser.match_{}(),",
                        quoted(&rule.name),
                        snake_case(&rule.name)
                    ));
                }
                w.line("other => parser.fail(&format!(\"unknown start rule `{other}`\")),");
            });
            w.line("};");
            w.block("if node.is_some() && parser.pos < parser.src.len()", |w| {
                w.line("parser.fail(&format!(\"unexpected input after {start}\"));");
            });
            w.line("node");
        },
    );

    if ctx
        .grammar
        .tokens
        .iter()
        .any(|t| t.has(Decorator::LoadAndParse))
    {
        w.blank();
        w.block("fn parse_file(path: &str, verbosity: Verbosity) -> Option<Value>", |w| {
            w.line("let source = match fs::read_to_string(path) {");
            w.indented(|w| {
                w.line("Ok(source) => source,");
                w.line("Err(err) => {");
                w.indented(|w| {
                    w.line("eprintln!(\"error: cannot read `{path}`: {err}\");");
                    w.line("process::exit(1);");
                });
                w.line("}");
            });
            w.line("};");
            w.line(
                "parse(source, path, DEFAULT_START.expect(\"checked at generation\"), verbosity)",
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::{Reporter, Verbosity};
    use crate::{analysis, grammar};
    use indoc::indoc;

    fn emit(src: &str) -> String {
        let mut reporter = Reporter::new(Verbosity::Error, "test.grammar");
        let mut g = grammar::parse(src, &mut reporter);
        assert_eq!(reporter.end_batch(), 0, "parse: {:?}", reporter.messages());
        analysis::resolve(&mut g, &mut reporter).expect("grammar resolves");
        translate(&g, "test.grammar")
    }

    const NUMBERS: &str = indoc! {r#"
        .token
            WS `\s+` @skip
            INT `[0-9]+`
        .end
        .rules
            Number: @{start} = INT => v;
        .end
    "#};

    #[test]
    fn emits_pattern_table_and_token_helpers() {
        let code = emit(NUMBERS);
        assert!(code.contains(r#"t_int: Regex::new("\\A(?:[0-9]+)")"#));
        assert!(code.contains("fn is_int(&self) -> bool"));
        assert!(code.contains("fn match_int(&mut self) -> Option<Value>"));
        assert!(code.contains("fn expect_int(&mut self) -> Value"));
        // Skip tokens only feed the skip table.
        assert!(!code.contains("fn match_ws"));
        assert!(code.contains(r#"Regex::new("\\A(?:\\s+)")"#));
    }

    #[test]
    fn rule_lookahead_never_calls_match() {
        let code = emit(NUMBERS);
        let is_fn = code
            .split("fn is_number(&self) -> bool {")
            .nth(1)
            .and_then(|rest| rest.split('}').next())
            .expect("is_number emitted");
        assert!(is_fn.contains("self.is_int()"));
        assert!(!is_fn.contains("match_"));
    }

    #[test]
    fn token_captures_store_value_strings() {
        let code = emit(NUMBERS);
        assert!(code.contains(r#"node.insert("v".to_string(), tok_value(&m));"#));
    }

    #[test]
    fn key_reduction_and_repetition() {
        let code = emit(indoc! {r#"
            .token
                WS `\s+` @skip
                INT `[0-9]+`
            .end
            .rules
                Op: @{start, key:left} = Operand ( '+' Operand )* => left ( _ right );
                Operand: = INT => v;
            .end
        "#});
        assert!(code.contains(r#"if node.len() == 3 && node.contains_key("left")"#));
        assert!(code.contains(r#"return Some(node.remove("left").expect("key field present"));"#));
        assert!(code.contains("while self.is_lit(0)"));
        assert!(code.contains(r#"self.expect_lit(0, "'+'");"#));
    }

    #[test]
    fn optional_group_commits_hard() {
        let code = emit(indoc! {r#"
            .token
                WS `\s+` @skip
                INT `[0-9]+`
            .end
            .rules
                Assign: @{start} = [ '=' INT ] => ( _ v );
            .end
        "#});
        // Entry is guarded by the first item's look-ahead; the number is then
        // required, so a failure past `=` is fatal.
        assert!(code.contains("if self.is_lit(0)"));
        assert!(code.contains(r#"self.expect_lit(0, "'='");"#));
        assert!(code.contains("let m = self.expect_int();"));
    }

    #[test]
    fn merge_rules_fold_into_the_parent() {
        let code = emit(indoc! {r#"
            .token
                WS `\s+` @skip
                FLOAT `[0-9]+\.[0-9]+`
                INTEGER `[0-9]+`
            .end
            .rules
                Expr: @{start} = Number => val;
                Number: @{merge} = FLOAT | INTEGER;
            .end
        "#});
        // Reference site: fold with the capture name.
        assert!(code.contains(r#"merge_into(&mut node, m, Some("val"));"#));
        // Inside the merge rule: adoption of the lone token.
        assert!(code.contains("merge_into(&mut node, m, None);"));
    }

    #[test]
    fn scope_declare_and_attrs_lower_to_runtime_calls() {
        let code = emit(indoc! {r#"
            .token
                WS `\s+` @skip
                WORD `[a-zA-Z]+`
            .end
            .rules
                Block: @{start, scope:names, verbosity:debug2} = Let+ => *stmts;
                Let: @{declare:name, classify:binding} = 'let' WORD ';' => _ name.value _;
            .end
        "#});
        assert!(code.contains("self.push_scope();"));
        assert!(code.contains(r#"node.insert("names".to_string(), Value::Object(frame));"#));
        assert!(code.contains(r#"self.declare(&node, "name");"#));
        assert!(code.contains("self.verbs.push(Verbosity::Debug2);"));
        assert!(code.contains(r#"self.push_classifier("binding");"#));
        assert!(code.contains("self.pop_classifier();"));
        assert!(code.contains(r#"self.project(&m, "value", "WORD")"#));
    }

    #[test]
    fn exclusions_reject_group_members() {
        let code = emit(indoc! {r#"
            .token
                WS `\s+` @skip
                WORD `[a-zA-Z]+` ^KEYWORD
            .end
            .token: KEYWORD
                'if' 'else'
            .end
            .rules
                Name: @{start} = WORD => w;
            .end
        "#});
        assert!(code.contains("excl_word: vec!["));
        assert!(code.contains(r#"Regex::new("\\A(?:if|else)\\z")"#));
        assert!(code.contains("!self.pat.excl_word.iter().any(|re| re.is_match(&value))"));
    }

    #[test]
    fn entry_point_dispatches_by_rule_name() {
        let code = emit(NUMBERS);
        assert!(code.contains(r#"const DEFAULT_START: Option<&str> = Some("Number");"#));
        assert!(code.contains(r#""Number" => parser.match_number(),"#));
        assert!(code.contains("unexpected input after {start}"));
        // No @loadandparse token, so no recursive file parsing.
        assert!(!code.contains("fn parse_file"));
    }

    #[test]
    fn alternative_groups_lower_to_guarded_chains() {
        let code = emit(indoc! {r#"
            .token
                WS `\s+` @skip
                INT `[0-9]+`
                NAME `[a-z]+`
            .end
            .rules
                List: @{start} = ( INT | NAME )+ => *xs;
            .end
        "#});
        assert!(code.contains("let mut matched_any = false;"));
        assert!(code.contains(r#"self.fail("expected one of: INT, NAME");"#));
        assert!(code.contains(r#"append(&mut node, "xs", tok_value(&m));"#));
    }
}
