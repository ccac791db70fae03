//! Name resolution and validation of the grammar model.
//!
//! Four passes, each reporting a batch of diagnostics:
//!
//! 1. [`bind_names`] — every rule item reference resolves to a token, token
//!    group, or rule.
//! 2. [`expand_tokens`] — `@expand` substitution to a fixed point, then regex
//!    validation of every pattern the generated parser will compile.
//! 3. [`align_captures`] — distributes `=>` capture lists onto items and
//!    checks their structural shape.
//! 4. [`check_semantics`] — attribute/directive compatibility, scope/declare
//!    reachability, doubtful/uncertain groups, left recursion.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::ast::*;
use crate::reporting::{Reporter, Verbosity};

/// Runs all four passes. Stops after the first pass whose batch records an
/// error; returns the number of errors in that batch.
pub fn resolve(grammar: &mut Grammar, reporter: &mut Reporter) -> Result<(), usize> {
    bind_names(grammar, reporter);
    batch(reporter)?;
    expand_tokens(grammar, reporter);
    batch(reporter)?;
    align_captures(grammar, reporter);
    batch(reporter)?;
    check_semantics(grammar, reporter);
    batch(reporter)?;
    Ok(())
}

fn batch(reporter: &mut Reporter) -> Result<(), usize> {
    match reporter.end_batch() {
        0 => Ok(()),
        n => Err(n),
    }
}

// ---- pass 1: name binding ----

pub fn bind_names(grammar: &mut Grammar, reporter: &mut Reporter) {
    let token_names: HashSet<String> = grammar.tokens.iter().map(|t| t.name.clone()).collect();
    let group_names: HashSet<String> = grammar.groups.iter().map(|g| g.name.clone()).collect();
    let rule_names: HashSet<String> = grammar.rules.iter().map(|r| r.name.clone()).collect();
    let internal: HashSet<String> = grammar
        .tokens
        .iter()
        .filter(|t| t.has(Decorator::Internal))
        .map(|t| t.name.clone())
        .collect();
    let skipped: HashSet<String> = grammar
        .tokens
        .iter()
        .filter(|t| t.has(Decorator::Skip))
        .map(|t| t.name.clone())
        .collect();

    for token in &mut grammar.tokens {
        if token.classification.is_none() {
            token.classification = Some(snake_case(&token.name));
        }
        for exclusion in &token.exclusions {
            if !group_names.contains(exclusion) {
                reporter.error(
                    token.loc,
                    format!(
                        "token `{}` exclusion `^{exclusion}` does not name a token group",
                        token.name
                    ),
                );
            }
        }
    }

    for rule in &grammar.rules {
        if token_names.contains(&rule.name) || group_names.contains(&rule.name) {
            reporter.error(
                rule.loc,
                format!("name `{}` is defined as both a token and a rule", rule.name),
            );
        }
    }

    for rule in &mut grammar.rules {
        for def in &mut rule.definitions {
            for item in &mut def.items {
                bind_item(item, &token_names, &group_names, &rule_names, &internal, &skipped, reporter);
            }
        }
    }
}

fn bind_item(
    item: &mut Item,
    tokens: &HashSet<String>,
    groups: &HashSet<String>,
    rules: &HashSet<String>,
    internal: &HashSet<String>,
    skipped: &HashSet<String>,
    reporter: &mut Reporter,
) {
    match &mut item.kind {
        ItemKind::NameRef(name) => {
            let name = name.clone();
            if tokens.contains(&name) {
                if internal.contains(&name) {
                    reporter.error(
                        item.loc,
                        format!("`@internal` token `{name}` cannot be referenced in rules"),
                    );
                } else if skipped.contains(&name) {
                    reporter.error(
                        item.loc,
                        format!("`@skip` token `{name}` cannot be referenced in rules"),
                    );
                }
                item.kind = ItemKind::TokenRef(name);
            } else if groups.contains(&name) {
                item.kind = ItemKind::GroupRef(name);
            } else if rules.contains(&name) {
                item.kind = ItemKind::RuleRef(name);
            } else {
                reporter.error(item.loc, format!("reference to undefined name `{name}`"));
            }
        }
        ItemKind::Group(group) => {
            for sub in &mut group.items {
                bind_item(sub, tokens, groups, rules, internal, skipped, reporter);
            }
        }
        _ => {}
    }
}

// ---- pass 2: token expansion & pattern validation ----

pub fn expand_tokens(grammar: &mut Grammar, reporter: &mut Reporter) {
    let patterns: HashMap<String, (String, bool)> = grammar
        .tokens
        .iter()
        .map(|t| (t.name.clone(), (t.pattern.clone(), t.has(Decorator::Expand))))
        .collect();

    let mut expander = Expander {
        patterns: &patterns,
        done: HashMap::new(),
        stack: Vec::new(),
        reporter: &mut *reporter,
    };

    let mut expanded: HashMap<String, String> = HashMap::new();
    for token in &grammar.tokens {
        if token.has(Decorator::Expand) {
            expanded.insert(token.name.clone(), expander.value_of(&token.name, token.loc));
        }
    }
    for token in &mut grammar.tokens {
        if let Some(value) = expanded.remove(&token.name) {
            token.expanded = Some(value);
        }
    }

    // Everything the generated parser compiles must compile here first.
    for token in &grammar.tokens {
        if token.has(Decorator::Internal) {
            continue;
        }
        match Regex::new(&anchored(token.regex())) {
            Ok(re) => {
                if token.group_index as usize >= re.captures_len() {
                    reporter.error(
                        token.loc,
                        format!(
                            "`@{}` exceeds the capture groups of token `{}`",
                            token.group_index, token.name
                        ),
                    );
                }
            }
            Err(err) => reporter.error(
                token.loc,
                format!("token `{}` pattern does not compile: {err}", token.name),
            ),
        }
    }
    for group in &grammar.groups {
        if let Err(err) = Regex::new(&anchored(&group.pattern())) {
            reporter.error(
                group.loc,
                format!("token group `{}` pattern does not compile: {err}", group.name),
            );
        }
    }
    for rule in &grammar.rules {
        for def in &rule.definitions {
            for item in &def.items {
                validate_literals(item, reporter);
            }
        }
    }
}

/// The anchoring wrapper the emitted parser uses; `(?:…)` keeps `@N` group
/// numbering intact.
pub fn anchored(pattern: &str) -> String {
    format!(r"\A(?:{pattern})")
}

fn validate_literals(item: &Item, reporter: &mut Reporter) {
    match &item.kind {
        ItemKind::Literal(text) => {
            if let Err(err) = Regex::new(&anchored(&literal_pattern(text))) {
                reporter.error(
                    item.loc,
                    format!("literal `{text}` does not compile as a pattern: {err}"),
                );
            }
        }
        ItemKind::Group(group) => {
            for sub in &group.items {
                validate_literals(sub, reporter);
            }
        }
        _ => {}
    }
}

struct Expander<'a, 'rep> {
    patterns: &'a HashMap<String, (String, bool)>,
    done: HashMap<String, String>,
    stack: Vec<String>,
    reporter: &'rep mut Reporter,
}

impl Expander<'_, '_> {
    /// Post-expansion value of a token: expanded for `@expand` tokens, the
    /// raw pattern otherwise.
    fn value_of(&mut self, name: &str, loc: crate::reporting::Loc) -> String {
        if let Some(cached) = self.done.get(name) {
            return cached.clone();
        }
        let (pattern, expands) = self.patterns[name].clone();
        if !expands {
            return pattern;
        }
        if self.stack.iter().any(|n| n == name) {
            let mut cycle: Vec<&str> = self.stack.iter().map(String::as_str).collect();
            cycle.push(name);
            self.reporter.error(
                loc,
                format!("cyclic `@expand` reference: {}", cycle.join(" -> ")),
            );
            return pattern;
        }

        self.stack.push(name.to_string());
        let mut out = String::with_capacity(pattern.len());
        for piece in split_caps_words(&pattern) {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Word(word) => {
                    if self.patterns.contains_key(word) {
                        let sub = self.value_of(word, loc);
                        out.push_str("(?:");
                        out.push_str(&sub);
                        out.push(')');
                    } else {
                        self.reporter.error(
                            loc,
                            format!("unknown name `{word}` in regex expansion of token `{name}`"),
                        );
                        out.push_str(word);
                    }
                }
            }
        }
        self.stack.pop();
        self.done.insert(name.to_string(), out.clone());
        out
    }
}

enum Piece<'a> {
    Text(&'a str),
    Word(&'a str),
}

/// Splits a regex source into plain text and candidate token names: maximal
/// `[A-Z][A-Z0-9_]+` words (two or more characters) not adjacent to other
/// identifier characters, so character classes like `[A-Z]` survive.
fn split_caps_words(pattern: &str) -> Vec<Piece<'_>> {
    let bytes = pattern.as_bytes();
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let mut pieces = Vec::new();
    let mut plain_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_uppercase() && (i == 0 || !is_ident(bytes[i - 1])) {
            let mut j = i + 1;
            while j < bytes.len()
                && (bytes[j].is_ascii_uppercase() || bytes[j].is_ascii_digit() || bytes[j] == b'_')
            {
                j += 1;
            }
            let next_is_ident = j < bytes.len() && is_ident(bytes[j]);
            if j - i >= 2 && !next_is_ident {
                if plain_start < i {
                    pieces.push(Piece::Text(&pattern[plain_start..i]));
                }
                pieces.push(Piece::Word(&pattern[i..j]));
                plain_start = j;
                i = j;
                continue;
            }
            i = j;
            continue;
        }
        i += 1;
    }
    if plain_start < pattern.len() {
        pieces.push(Piece::Text(&pattern[plain_start..]));
    }
    pieces
}

// ---- pass 3: capture alignment ----

pub fn align_captures(grammar: &mut Grammar, reporter: &mut Reporter) {
    for rule in &mut grammar.rules {
        let rule_name = rule.name.clone();
        for def in &mut rule.definitions {
            if let Some(entries) = def.captures.take() {
                assign_captures(&rule_name, &mut def.items, &entries, false, reporter);
            }
        }
    }

    // Dotted captures need every rule's capture names assigned first.
    let mut provided: HashMap<String, HashSet<String>> = HashMap::new();
    for rule in &grammar.rules {
        let mut names = HashSet::new();
        for def in &rule.definitions {
            for item in &def.items {
                collect_capture_names(item, &mut names);
            }
        }
        provided.insert(rule.name.clone(), names);
    }
    for rule in &grammar.rules {
        for def in &rule.definitions {
            for item in &def.items {
                check_dotted(item, &provided, reporter);
            }
        }
    }
}

fn assign_captures(
    rule: &str,
    items: &mut [Item],
    entries: &[CaptureEntry],
    repeatable_ctx: bool,
    reporter: &mut Reporter,
) {
    if entries.len() > items.len() {
        let loc = entries[items.len()].loc();
        reporter.error(
            loc,
            format!("rule `{rule}` has more captures than items in this definition"),
        );
    }
    for (item, entry) in items.iter_mut().zip(entries) {
        let item_repeat = repeatable_ctx || item.count.is_repeatable();
        match entry {
            CaptureEntry::Ignore(_) => {}
            CaptureEntry::Name(capture) => match &mut item.kind {
                ItemKind::Group(group) if group.mode == GroupMode::Alternative => {
                    // One name for an alternative group captures whichever
                    // branch matched.
                    for sub in &mut group.items {
                        if matches!(sub.kind, ItemKind::Group(_)) {
                            reporter.error(
                                capture.loc,
                                "a nested group alternative needs a parenthesized capture list",
                            );
                        } else {
                            sub.capture = Some(capture.clone());
                            check_list_capture(sub, item_repeat || sub.count.is_repeatable(), reporter);
                        }
                    }
                }
                ItemKind::Group(_) => {
                    reporter.error(
                        capture.loc,
                        "an inline group capture must be a parenthesized list",
                    );
                }
                _ => {
                    item.capture = Some(capture.clone());
                    check_list_capture(item, item_repeat, reporter);
                }
            },
            CaptureEntry::List(sub, loc) => match &mut item.kind {
                ItemKind::Group(group) => {
                    assign_captures(rule, &mut group.items, sub, item_repeat, reporter);
                }
                _ => {
                    reporter.error(
                        *loc,
                        "parenthesized captures require an inline group at this position",
                    );
                }
            },
        }
    }
}

fn check_list_capture(item: &Item, repeatable: bool, reporter: &mut Reporter) {
    if let Some(capture) = &item.capture {
        if capture.list && !repeatable {
            reporter.error(
                capture.loc,
                format!(
                    "`*{}` requires its item or an enclosing group to be repeatable",
                    capture.name
                ),
            );
        }
    }
}

fn collect_capture_names(item: &Item, names: &mut HashSet<String>) {
    if let Some(capture) = &item.capture {
        names.insert(capture.name.clone());
    }
    if let ItemKind::Group(group) = &item.kind {
        for sub in &group.items {
            collect_capture_names(sub, names);
        }
    }
}

fn check_dotted(item: &Item, provided: &HashMap<String, HashSet<String>>, reporter: &mut Reporter) {
    if let Some(capture) = &item.capture {
        if let Some(field) = &capture.field {
            match &item.kind {
                ItemKind::RuleRef(target) => {
                    let has = provided
                        .get(target)
                        .map_or(false, |names| names.contains(field));
                    if !has {
                        reporter.warning(
                            capture.loc,
                            format!("rule `{target}` provides no field `{field}`"),
                        );
                    }
                }
                _ => {
                    if field != "value" {
                        reporter.warning(
                            capture.loc,
                            format!("only `value` is guaranteed on token matches, not `{field}`"),
                        );
                    }
                }
            }
        }
    }
    if let ItemKind::Group(group) = &item.kind {
        for sub in &group.items {
            check_dotted(sub, provided, reporter);
        }
    }
}

// ---- pass 4: semantic checks ----

pub fn check_semantics(grammar: &Grammar, reporter: &mut Reporter) {
    check_helper_collisions(grammar, reporter);
    check_attributes(grammar, reporter);
    check_scopes(grammar, reporter);
    check_groups(grammar, reporter);
    check_recursion(grammar, reporter);

    if grammar
        .tokens
        .iter()
        .any(|t| t.has(Decorator::LoadAndParse))
        && grammar.start.is_none()
    {
        reporter.error(None, "`@loadandparse` requires a rule with the `start` directive");
    }
    if grammar.start.is_none() {
        reporter.warning(
            None,
            "no rule carries the `start` directive; the generated parser will require --start",
        );
    }
}

fn check_helper_collisions(grammar: &Grammar, reporter: &mut Reporter) {
    let mut seen: HashMap<String, String> = HashMap::new();
    // The emitted parser reserves `match_lit` and friends for inline literals.
    seen.insert("lit".to_string(), "the built-in literal helper".to_string());
    let mut check = |snake: String, name: &str, loc, reporter: &mut Reporter| {
        if let Some(prev) = seen.get(&snake) {
            reporter.error(
                loc,
                format!("`{prev}` and `{name}` would generate the same parser function `match_{snake}`"),
            );
        } else {
            seen.insert(snake, name.to_string());
        }
    };
    for token in &grammar.tokens {
        if token.has(Decorator::Internal) || token.has(Decorator::Skip) {
            continue;
        }
        check(snake_case(&token.name), &token.name, token.loc, reporter);
    }
    for group in &grammar.groups {
        check(snake_case(&group.name), &group.name, group.loc, reporter);
    }
    for rule in &grammar.rules {
        check(snake_case(&rule.name), &rule.name, rule.loc, reporter);
    }
}

fn check_attributes(grammar: &Grammar, reporter: &mut Reporter) {
    for rule in &grammar.rules {
        let has_key = rule.attr(AttrKey::Key).is_some();
        if let Some(flip) = rule.attr(AttrKey::Flip) {
            if !has_key {
                reporter.error(
                    flip.loc,
                    format!("`flip` requires `key` on the same rule `{}`", rule.name),
                );
            }
        }
        if let Some(key) = rule.attr(AttrKey::Key) {
            let mut names = HashSet::new();
            for def in &rule.definitions {
                for item in &def.items {
                    collect_capture_names(item, &mut names);
                }
            }
            if !names.contains(&key.value) {
                reporter.error(
                    key.loc,
                    format!(
                        "`key:{}` requires a capture named `{}` in rule `{}`",
                        key.value, key.value, rule.name
                    ),
                );
            }
        }
        if rule.has_directive(DirectiveFlag::Merge)
            && (has_key || rule.attr(AttrKey::Flip).is_some())
        {
            reporter.error(
                rule.loc,
                format!("`merge` cannot be combined with `key` or `flip` on rule `{}`", rule.name),
            );
        }
        if let Some(verbosity) = rule.attr(AttrKey::Verbosity) {
            if verbosity.value.parse::<Verbosity>().is_err() {
                reporter.error(
                    verbosity.loc,
                    format!("unknown verbosity level `{}`", verbosity.value),
                );
            }
        }
        if let Some(declare) = rule.attr(AttrKey::Declare) {
            let mut names = HashSet::new();
            for def in &rule.definitions {
                for item in &def.items {
                    collect_capture_names(item, &mut names);
                }
            }
            if !names.contains(&declare.value) {
                reporter.warning(
                    declare.loc,
                    format!(
                        "`declare:{}` names a field rule `{}` never captures",
                        declare.value, rule.name
                    ),
                );
            }
        }

        // A merge rule folds into its parent node, so it must match at most once.
        for def in &rule.definitions {
            for item in &def.items {
                check_merge_refs(grammar, item, reporter);
            }
        }
    }
}

fn check_merge_refs(grammar: &Grammar, item: &Item, reporter: &mut Reporter) {
    match &item.kind {
        ItemKind::RuleRef(target) => {
            if let Some(rule) = grammar.rule(target) {
                if rule.has_directive(DirectiveFlag::Merge) && item.count.is_repeatable() {
                    reporter.error(
                        item.loc,
                        format!("merge rule `{target}` must occur at most once"),
                    );
                }
            }
        }
        ItemKind::Group(group) => {
            for sub in &group.items {
                check_merge_refs(grammar, sub, reporter);
            }
        }
        _ => {}
    }
}

fn check_scopes(grammar: &Grammar, reporter: &mut Reporter) {
    let declares: HashSet<&str> = grammar
        .rules
        .iter()
        .filter(|r| r.attr(AttrKey::Declare).is_some())
        .map(|r| r.name.as_str())
        .collect();
    let scopes: Vec<&Rule> = grammar
        .rules
        .iter()
        .filter(|r| r.attr(AttrKey::Scope).is_some())
        .collect();

    for rule in &scopes {
        let reachable = reachable_rules(grammar, &rule.name);
        if !reachable.iter().any(|name| declares.contains(name.as_str())) {
            let attr = rule.attr(AttrKey::Scope).expect("filtered");
            reporter.warning(
                attr.loc,
                format!("`scope:{}` has no reachable `declare` rule", attr.value),
            );
        }
    }

    for rule in &grammar.rules {
        let Some(attr) = rule.attr(AttrKey::Declare) else { continue };
        let enclosed = scopes
            .iter()
            .any(|scope| reachable_rules(grammar, &scope.name).contains(&rule.name));
        if !enclosed {
            reporter.warning(
                attr.loc,
                format!("`declare:{}` is outside any enclosing `scope`", attr.value),
            );
        }
    }
}

/// Rules reachable from `start` through item references, including `start`.
fn reachable_rules(grammar: &Grammar, start: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut work = vec![start.to_string()];
    while let Some(name) = work.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let Some(rule) = grammar.rule(&name) else { continue };
        for def in &rule.definitions {
            for item in &def.items {
                collect_rule_refs(item, &mut work);
            }
        }
    }
    seen
}

fn collect_rule_refs(item: &Item, out: &mut Vec<String>) {
    match &item.kind {
        ItemKind::RuleRef(name) => out.push(name.clone()),
        ItemKind::Group(group) => {
            for sub in &group.items {
                collect_rule_refs(sub, out);
            }
        }
        _ => {}
    }
}

// ---- doubtful / uncertain groups ----

fn check_groups(grammar: &Grammar, reporter: &mut Reporter) {
    for rule in &grammar.rules {
        for def in &rule.definitions {
            check_sequence(&def.items, def.loc, reporter);
            for item in &def.items {
                check_group_item(item, reporter);
            }
        }
    }
}

fn check_sequence(items: &[Item], loc: crate::reporting::Loc, reporter: &mut Reporter) {
    if !items.is_empty() && items.iter().all(Item::is_nullable) {
        reporter.warning(loc, "every item is optional (doubtful group)");
    } else if let Some(first) = items.first() {
        let first_is_nullable_group =
            matches!(first.kind, ItemKind::Group(_)) && first.is_nullable();
        if first_is_nullable_group {
            reporter.warning(
                first.loc,
                "leading optional group makes matching uncertain (uncertain group)",
            );
        }
    }
}

fn check_group_item(item: &Item, reporter: &mut Reporter) {
    if let ItemKind::Group(group) = &item.kind {
        match group.mode {
            GroupMode::Alternative => {
                if group.items.iter().all(Item::is_nullable) {
                    reporter.warning(item.loc, "every item is optional (doubtful group)");
                }
            }
            GroupMode::Sequential => check_sequence(&group.items, item.loc, reporter),
            GroupMode::Optional => {}
        }
        for sub in &group.items {
            check_group_item(sub, reporter);
        }
    }
}

// ---- left recursion ----

struct RecursionCheck<'a, 'rep> {
    grammar: &'a Grammar,
    stack: Vec<String>,
    /// Rules with a completed walk, mapped to their nullability.
    done: HashMap<String, bool>,
    reported: HashSet<String>,
    reporter: &'rep mut Reporter,
}

fn check_recursion(grammar: &Grammar, reporter: &mut Reporter) {
    let mut check = RecursionCheck {
        grammar,
        stack: Vec::new(),
        done: HashMap::new(),
        reported: HashSet::new(),
        reporter,
    };
    for rule in &grammar.rules {
        check.walk_rule(rule);
        debug_assert!(check.stack.is_empty());
    }
}

impl RecursionCheck<'_, '_> {
    /// Returns whether the rule is nullable. A rule re-entered through the
    /// leading (possibly nullable) items of one of its definitions is left
    /// recursive.
    fn walk_rule(&mut self, rule: &Rule) -> bool {
        if let Some(&nullable) = self.done.get(&rule.name) {
            return nullable;
        }
        self.stack.push(rule.name.clone());
        let mut rule_nullable = false;
        for def in &rule.definitions {
            let mut all_nullable = true;
            for item in &def.items {
                let item_nullable = self.walk_item(item);
                if !item_nullable {
                    all_nullable = false;
                    break;
                }
            }
            rule_nullable |= all_nullable;
        }
        self.stack.pop();
        self.done.insert(rule.name.clone(), rule_nullable);
        rule_nullable
    }

    fn walk_item(&mut self, item: &Item) -> bool {
        let base = match &item.kind {
            ItemKind::RuleRef(name) => {
                if let Some(pos) = self.stack.iter().position(|caller| caller == name) {
                    if self.reported.insert(name.clone()) {
                        let mut cycle = self.stack[pos..].to_vec();
                        cycle.push(name.clone());
                        self.reporter.error(
                            item.loc,
                            format!(
                                "left recursive rules create an infinite loop: {}",
                                cycle.join(" -> ")
                            ),
                        );
                    }
                    false
                } else {
                    match self.grammar.rule(name) {
                        Some(rule) => self.walk_rule(rule),
                        None => false,
                    }
                }
            }
            ItemKind::Group(group) => match group.mode {
                GroupMode::Optional => {
                    for sub in &group.items {
                        self.walk_item(sub);
                    }
                    true
                }
                GroupMode::Alternative => {
                    let mut any = false;
                    for sub in &group.items {
                        any |= self.walk_item(sub);
                    }
                    any
                }
                GroupMode::Sequential => {
                    let mut all = true;
                    for sub in &group.items {
                        if !self.walk_item(sub) {
                            all = false;
                            break;
                        }
                    }
                    all
                }
            },
            _ => false,
        };
        base || item.count.is_optional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar;
    use indoc::indoc;

    fn resolved(src: &str) -> (Grammar, Reporter) {
        let mut reporter = Reporter::new(Verbosity::Error, "test.grammar");
        let mut g = grammar::parse(src, &mut reporter);
        assert_eq!(reporter.end_batch(), 0, "parse errors: {:?}", reporter.messages());
        let _ = resolve(&mut g, &mut reporter);
        (g, reporter)
    }

    fn error_messages(reporter: &Reporter) -> Vec<String> {
        reporter
            .messages()
            .iter()
            .filter(|d| d.level == Verbosity::Error)
            .map(|d| d.message.clone())
            .collect()
    }

    fn warning_messages(reporter: &Reporter) -> Vec<String> {
        reporter
            .messages()
            .iter()
            .filter(|d| d.level == Verbosity::Warning)
            .map(|d| d.message.clone())
            .collect()
    }

    #[test]
    fn binds_references_by_kind() {
        let (g, reporter) = resolved(indoc! {r#"
            .token
                INT `[0-9]+`
            .end
            .token: KEYWORD
                'if'
            .end
            .rules
                Number: @{start} = INT => v;
                Guard: = KEYWORD Number => kw n;
            .end
        "#});
        assert_eq!(error_messages(&reporter), Vec::<String>::new());
        let def = &g.rule("Guard").unwrap().definitions[0];
        assert!(matches!(&def.items[0].kind, ItemKind::GroupRef(n) if n == "KEYWORD"));
        assert!(matches!(&def.items[1].kind, ItemKind::RuleRef(n) if n == "Number"));
    }

    #[test]
    fn undefined_and_reserved_references_error() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                WS `\s+` @skip
                FRAG `[0-9]` @internal
                INT `FRAG+` @expand
            .end
            .rules
                Bad: @{start} = WS FRAG MISSING;
            .end
        "#});
        let errors = error_messages(&reporter);
        assert!(errors.iter().any(|m| m.contains("`@skip` token `WS`")));
        assert!(errors.iter().any(|m| m.contains("`@internal` token `FRAG`")));
        assert!(errors.iter().any(|m| m.contains("undefined name `MISSING`")));
    }

    #[test]
    fn expansion_reaches_a_fixed_point() {
        let (g, reporter) = resolved(indoc! {r#"
            .token
                DIGIT `[0-9]` @internal
                HEX `[0-9a-f]` @internal
                INT `DIGIT+` @expand
                PAIR `INT-INT|HEX` @expand
            .end
            .rules
                Number: @{start} = INT => v;
            .end
        "#});
        assert_eq!(error_messages(&reporter), Vec::<String>::new());
        assert_eq!(g.token("INT").unwrap().regex(), "(?:[0-9])+");
        assert_eq!(
            g.token("PAIR").unwrap().regex(),
            "(?:(?:[0-9])+)-(?:(?:[0-9])+)|(?:[0-9a-f])"
        );
    }

    #[test]
    fn expansion_cycles_error() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                AA `BB` @expand
                BB `AA` @expand
            .end
            .rules
                Number: @{start} = AA;
            .end
        "#});
        assert!(error_messages(&reporter)
            .iter()
            .any(|m| m.contains("cyclic `@expand` reference")));
    }

    #[test]
    fn unknown_expansion_name_errors() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                INT `NOPE+` @expand
            .end
            .rules
                Number: @{start} = INT;
            .end
        "#});
        assert!(error_messages(&reporter)
            .iter()
            .any(|m| m.contains("unknown name `NOPE`")));
    }

    #[test]
    fn character_classes_survive_expansion() {
        let words: Vec<&str> = split_caps_words("[A-Z]+FRAG_X2(?:A)")
            .into_iter()
            .filter_map(|p| match p {
                Piece::Word(w) => Some(w),
                Piece::Text(_) => None,
            })
            .collect();
        assert_eq!(words, vec!["FRAG_X2"]);
    }

    #[test]
    fn bad_patterns_are_reported() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                BAD `([0-9]`
                IDX `([a-z])` @3
            .end
            .rules
                Number: @{start} = BAD IDX;
            .end
        "#});
        let errors = error_messages(&reporter);
        assert!(errors.iter().any(|m| m.contains("does not compile")));
        // Pattern validation aborts the pipeline before later passes, so the
        // `@3` check lands in the same batch.
        assert!(errors.iter().any(|m| m.contains("`@3` exceeds")));
    }

    #[test]
    fn capture_shape_mismatches_error() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                INT `[0-9]+`
            .end
            .rules
                Wide: @{start} = INT => a b;
                Flat: = INT ( INT INT )* => a b;
                Starred: = INT => *xs;
            .end
        "#});
        let errors = error_messages(&reporter);
        assert!(errors.iter().any(|m| m.contains("more captures than items")));
        assert!(errors.iter().any(|m| m.contains("must be a parenthesized list")));
        assert!(errors.iter().any(|m| m.contains("`*xs` requires")));
    }

    #[test]
    fn list_captures_allow_enclosing_repetition() {
        let (g, reporter) = resolved(indoc! {r#"
            .token
                INT `[0-9]+`
                COMMA `,`
            .end
            .rules
                List: @{start} = INT ( COMMA INT )* => head ( _ *xs );
            .end
        "#});
        assert_eq!(error_messages(&reporter), Vec::<String>::new());
        let def = &g.rule("List").unwrap().definitions[0];
        match &def.items[1].kind {
            ItemKind::Group(group) => {
                let capture = group.items[1].capture.as_ref().unwrap();
                assert!(capture.list);
                assert_eq!(capture.name, "xs");
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn dotted_capture_warnings() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                WORD `[a-z]+`
            .end
            .rules
                Let: @{start} = WORD Inner => w.text i.missing;
                Inner: = WORD => name;
            .end
        "#});
        let warnings = warning_messages(&reporter);
        assert!(warnings.iter().any(|m| m.contains("only `value` is guaranteed")));
        assert!(warnings.iter().any(|m| m.contains("provides no field `missing`")));
    }

    #[test]
    fn attribute_compatibility_checks() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                INT `[0-9]+`
            .end
            .rules
                Flip: @{start, flip:sub} = INT => v;
                Keyed: @{key:missing} = INT => v;
                Merged: @{merge, key:v} = INT => v;
                Verbose: @{verbosity:chatty} = INT => v;
            .end
        "#});
        let errors = error_messages(&reporter);
        assert!(errors.iter().any(|m| m.contains("`flip` requires `key`")));
        assert!(errors.iter().any(|m| m.contains("`key:missing` requires a capture")));
        assert!(errors.iter().any(|m| m.contains("`merge` cannot be combined")));
        assert!(errors.iter().any(|m| m.contains("unknown verbosity level `chatty`")));
    }

    #[test]
    fn scope_and_declare_reachability() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                WORD `[a-z]+`
            .end
            .rules
                Block: @{start, scope:names} = WORD;
                Let: @{declare:name} = WORD => name;
            .end
        "#});
        let warnings = warning_messages(&reporter);
        assert!(warnings.iter().any(|m| m.contains("no reachable `declare`")));
        assert!(warnings.iter().any(|m| m.contains("outside any enclosing `scope`")));
    }

    #[test]
    fn doubtful_and_uncertain_groups_warn() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                AA `a`
                BB `b`
            .end
            .rules
                Doubt: @{start} = AA? BB*;
                Unsure: = [ AA ] BB;
                Fine: = AA BB?;
            .end
        "#});
        let warnings = warning_messages(&reporter);
        assert_eq!(
            warnings.iter().filter(|m| m.contains("doubtful group")).count(),
            1
        );
        assert_eq!(
            warnings.iter().filter(|m| m.contains("uncertain group")).count(),
            1
        );
    }

    #[test]
    fn left_recursion_is_reported() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                PLUS `\+`
                INT `[0-9]+`
            .end
            .rules
                Expr: @{start} = Term PLUS INT;
                Term: = Expr? INT;
            .end
        "#});
        assert!(error_messages(&reporter)
            .iter()
            .any(|m| m.contains("left recursive rules create an infinite loop")));
    }

    #[test]
    fn helper_name_collisions_error() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                RGB_COLOR `#[0-9a-f]{6}`
            .end
            .rules
                RgbColor: @{start} = RGB_COLOR => v;
            .end
        "#});
        assert!(error_messages(&reporter)
            .iter()
            .any(|m| m.contains("same parser function `match_rgb_color`")));
    }

    #[test]
    fn loadandparse_requires_start() {
        let (_, reporter) = resolved(indoc! {r#"
            .token
                PATH `[a-z./]+` @loadandparse
            .end
            .rules
                Import: = PATH => file;
            .end
        "#});
        assert!(error_messages(&reporter)
            .iter()
            .any(|m| m.contains("`@loadandparse` requires")));
    }

    #[test]
    fn reachability_helper_is_transitive() {
        let (g, _) = resolved(indoc! {r#"
            .token
                INT `[0-9]+`
            .end
            .rules
                Aa: @{start} = Bb;
                Bb: = Cc;
                Cc: = INT;
            .end
        "#});
        let reached = reachable_rules(&g, "Aa");
        assert!(reached.contains("Cc"));
        assert!(!reachable_rules(&g, "Cc").contains("Aa"));
    }
}
