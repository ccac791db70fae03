//! Recursive-descent parser for the grammar description dialect.
//!
//! Consumes lexemes on demand, enforces the section order (`zero or one
//! .token`, then named token sections, then exactly one `.rules`), and builds
//! the [`crate::ast`] model. Errors are recorded in the reporter and parsing
//! continues where recovery is possible; the pipeline aborts after this pass
//! if any were recorded.

use crate::ast::*;
use crate::lexer::{Lexeme, Lexer, Spanned};
use crate::reporting::{Loc, Reporter};

pub fn parse(source: &str, reporter: &mut Reporter) -> Grammar {
    Parser::new(source, reporter).run()
}

struct Parser<'src, 'rep> {
    lexer: Lexer<'src>,
    peeked: Option<Option<Spanned>>,
    last_loc: Loc,
    reporter: &'rep mut Reporter,
}

/// Which section is currently open, between its marker and its `.end`.
#[derive(Debug, PartialEq)]
enum Section {
    None,
    Tokens,
    Group { name: String, members: Vec<String>, loc: Loc },
    Rules,
}

impl<'src, 'rep> Parser<'src, 'rep> {
    fn new(source: &'src str, reporter: &'rep mut Reporter) -> Parser<'src, 'rep> {
        Parser {
            lexer: Lexer::new(source),
            peeked: None,
            last_loc: Loc::new(1, 1),
            reporter,
        }
    }

    fn peek(&mut self) -> Option<&Spanned> {
        if self.peeked.is_none() {
            loop {
                match self.lexer.next_lexeme() {
                    Ok(next) => {
                        self.peeked = Some(next);
                        break;
                    }
                    Err(err) => self.reporter.error(err.loc, err.message),
                }
            }
        }
        self.peeked.as_ref().and_then(|p| p.as_ref())
    }

    fn bump(&mut self) -> Option<Spanned> {
        self.peek();
        let sp = self.peeked.take().flatten();
        if let Some(sp) = &sp {
            self.last_loc = sp.loc;
        }
        sp
    }

    fn at(&mut self, lexeme: &Lexeme) -> bool {
        self.peek().map_or(false, |sp| sp.lexeme == *lexeme)
    }

    fn eat(&mut self, lexeme: &Lexeme) -> bool {
        if self.at(lexeme) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: &Lexeme, what: &str) -> bool {
        if self.eat(lexeme) {
            return true;
        }
        let loc = self.loc();
        self.reporter.error(loc, format!("expected {what}"));
        false
    }

    fn loc(&mut self) -> Loc {
        self.peek().map(|sp| sp.loc).unwrap_or(self.last_loc)
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let loc = self.loc();
        self.reporter.error(loc, message.into());
    }

    /// Takes an identifier lexeme, or records `what` as missing.
    fn ident(&mut self, what: &str) -> Option<(String, Loc)> {
        match self.peek() {
            Some(Spanned { lexeme: Lexeme::Ident(_), .. }) => {
                let sp = self.bump().expect("peeked");
                match sp.lexeme {
                    Lexeme::Ident(name) => Some((name, sp.loc)),
                    _ => unreachable!(),
                }
            }
            _ => {
                self.error_here(format!("expected {what}"));
                None
            }
        }
    }

    fn at_item_start(&mut self) -> bool {
        matches!(
            self.peek().map(|sp| &sp.lexeme),
            Some(
                Lexeme::Ident(_)
                    | Lexeme::Str(_)
                    | Lexeme::Regex(_)
                    | Lexeme::LParen
                    | Lexeme::LBracket
            )
        )
    }

    // ---- sections ----

    fn run(mut self) -> Grammar {
        let mut grammar = Grammar::default();
        let mut open = Section::None;
        let mut had_tokens = false;
        let mut had_rules = false;

        loop {
            let Some(sp) = self.peek() else {
                if open != Section::None {
                    if open == Section::Rules {
                        had_rules = true;
                    }
                    let loc = self.last_loc;
                    self.reporter.error(loc, "expected `.end` before end of input");
                }
                break;
            };

            if sp.lexeme == Lexeme::Dot {
                let dot_loc = sp.loc;
                self.bump();
                let Some((name, _)) = self.ident("section name after `.`") else {
                    continue;
                };
                match name.as_str() {
                    "end" => {
                        let closed = std::mem::replace(&mut open, Section::None);
                        match closed {
                            Section::None => {
                                self.reporter.error(dot_loc, "unexpected `.end`");
                            }
                            Section::Group { name, members, loc } => {
                                self.close_group(&mut grammar, name, members, loc);
                            }
                            Section::Rules => {
                                had_rules = true;
                                // Text following the final `.end` is ignored.
                                break;
                            }
                            Section::Tokens => {}
                        }
                    }
                    "token" => {
                        if open != Section::None {
                            self.reporter
                                .error(dot_loc, "expected `.end` before a new section");
                            self.close_open_section(&mut grammar, &mut open);
                        }
                        if self.eat(&Lexeme::Colon) {
                            let Some((group_name, loc)) = self.ident("token group name") else {
                                continue;
                            };
                            if self.eat(&Lexeme::Colon) {
                                self.reporter.warning(
                                    loc,
                                    format!("trailing colon after token group name `{group_name}`"),
                                );
                            }
                            if !is_token_name(&group_name) {
                                self.reporter.error(
                                    loc,
                                    format!("token group name `{group_name}` must be ALL_CAPS"),
                                );
                            }
                            open = Section::Group { name: group_name, members: Vec::new(), loc };
                        } else {
                            if had_tokens {
                                self.reporter.error(dot_loc, "duplicate `.token` section");
                            } else if !grammar.groups.is_empty() {
                                self.reporter.error(
                                    dot_loc,
                                    "`.token` section must precede named token sections",
                                );
                            }
                            had_tokens = true;
                            open = Section::Tokens;
                        }
                    }
                    "rules" => {
                        if open != Section::None {
                            self.reporter
                                .error(dot_loc, "expected `.end` before a new section");
                            self.close_open_section(&mut grammar, &mut open);
                        }
                        open = Section::Rules;
                    }
                    other => {
                        self.reporter
                            .error(dot_loc, format!("unknown section `.{other}`"));
                        self.skip_to_section_marker();
                    }
                }
                continue;
            }

            match &mut open {
                Section::None => {
                    self.error_here("expected a section marker");
                    self.bump();
                }
                Section::Tokens => self.parse_token_entry(&mut grammar),
                Section::Group { members, .. } => {
                    let member = match self.peek().map(|sp| sp.lexeme.clone()) {
                        Some(Lexeme::Str(text)) | Some(Lexeme::Regex(text)) => {
                            self.bump();
                            Some(text)
                        }
                        _ => {
                            self.error_here("expected a quoted token group member");
                            self.bump();
                            None
                        }
                    };
                    if let Some(member) = member {
                        if members.contains(&member) {
                            let loc = self.last_loc;
                            self.reporter
                                .error(loc, format!("group member `{member}` already defined above"));
                        } else {
                            members.push(member);
                        }
                    }
                }
                Section::Rules => self.parse_rule(&mut grammar),
            }
        }

        if !had_rules {
            let loc = self.last_loc;
            self.reporter.error(loc, "missing `.rules` section");
        }
        grammar
    }

    fn close_open_section(&mut self, grammar: &mut Grammar, open: &mut Section) {
        if let Section::Group { name, members, loc } = std::mem::replace(open, Section::None) {
            self.close_group(grammar, name, members, loc);
        }
    }

    fn close_group(&mut self, grammar: &mut Grammar, name: String, members: Vec<String>, loc: Loc) {
        if members.is_empty() {
            self.reporter
                .error(loc, format!("token group `{name}` requires at least one member"));
            return;
        }
        if grammar.has_token_name(&name) {
            self.reporter
                .error(loc, format!("duplicate definition `{name}`"));
            return;
        }
        grammar.groups.push(TokenGroup { name, members, loc });
    }

    fn skip_to_section_marker(&mut self) {
        while let Some(sp) = self.peek() {
            if sp.lexeme == Lexeme::Dot {
                return;
            }
            self.bump();
        }
    }

    // ---- token entries ----

    fn parse_token_entry(&mut self, grammar: &mut Grammar) {
        let Some((name, loc)) = self.ident("token name") else {
            self.bump();
            return;
        };
        if !is_token_name(&name) {
            self.reporter
                .error(loc, format!("token name `{name}` must be ALL_CAPS"));
        }

        let pattern = match self.peek().map(|sp| sp.lexeme.clone()) {
            Some(Lexeme::Regex(text)) => {
                self.bump();
                text
            }
            _ => {
                self.error_here("expected token regular expression");
                return;
            }
        };

        let mut token = Token {
            name,
            pattern,
            expanded: None,
            decorators: Vec::new(),
            exclusions: Vec::new(),
            group_index: 0,
            classification: None,
            loc,
        };
        self.parse_decorators(&mut token);

        if grammar.has_token_name(&token.name) {
            self.reporter
                .error(loc, format!("duplicate definition `{}`", token.name));
            return;
        }
        grammar.tokens.push(token);
    }

    fn parse_decorators(&mut self, token: &mut Token) {
        let mut has_group_index = false;
        loop {
            match self.peek().map(|sp| sp.lexeme.clone()) {
                Some(Lexeme::Decorator(name)) => {
                    let sp = self.bump().expect("peeked");
                    if name.chars().all(|c| c.is_ascii_digit()) {
                        if has_group_index {
                            self.reporter
                                .error(sp.loc, "multiple match group indices");
                        } else if let Ok(index @ 1..=9) = name.parse::<u32>() {
                            has_group_index = true;
                            token.group_index = index;
                        } else {
                            self.reporter
                                .error(sp.loc, format!("match group index `@{name}` must be 1..9"));
                        }
                    } else if let Some(decorator) = Decorator::from_name(&name) {
                        if token.decorators.contains(&decorator) {
                            self.reporter.warning(
                                sp.loc,
                                format!("token `{}` already has `@{name}`", token.name),
                            );
                        } else {
                            token.decorators.push(decorator);
                        }
                    } else {
                        self.reporter
                            .error(sp.loc, format!("unknown decorator `@{name}`"));
                    }
                }
                Some(Lexeme::Exclusion(group)) => {
                    self.bump();
                    token.exclusions.push(group);
                }
                _ => break,
            }
        }
    }

    // ---- rules ----

    fn parse_rule(&mut self, grammar: &mut Grammar) {
        let Some((name, loc)) = self.ident("rule name") else {
            self.bump();
            return;
        };
        if !is_rule_name(&name) {
            self.reporter.error(
                loc,
                format!("rule name `{name}` must be strict PascalCase (`RgbColor`, not `RGBColor`)"),
            );
        }

        let mut rule = Rule {
            name,
            attrs: Vec::new(),
            directives: Vec::new(),
            definitions: Vec::new(),
            loc,
        };

        self.expect(&Lexeme::Colon, "`:` after rule name");
        if self.eat(&Lexeme::AttrOpen) {
            self.parse_attributes(&mut rule);
        }
        self.expect(&Lexeme::Assign, "`=` before rule definition");

        rule.definitions.push(self.parse_definition());
        while self.eat(&Lexeme::Pipe) {
            rule.definitions.push(self.parse_definition());
        }

        if !self.expect(&Lexeme::Semi, "`;` after rule definition") {
            self.sync_to_rule_end();
        }

        if rule.has_directive(DirectiveFlag::Start) {
            if grammar.start.is_some() {
                self.reporter
                    .error(rule.loc, "multiple starting rules selected");
            } else {
                grammar.start = Some(rule.name.clone());
            }
        }

        if grammar.rule(&rule.name).is_some() {
            self.reporter
                .error(loc, format!("rule `{}` already defined above", rule.name));
            return;
        }
        grammar.rules.push(rule);
    }

    fn sync_to_rule_end(&mut self) {
        while let Some(sp) = self.peek() {
            match sp.lexeme {
                Lexeme::Semi => {
                    self.bump();
                    return;
                }
                Lexeme::Dot => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn parse_attributes(&mut self, rule: &mut Rule) {
        loop {
            match self.peek().map(|sp| sp.lexeme.clone()) {
                Some(Lexeme::RBrace) => {
                    self.bump();
                    return;
                }
                Some(Lexeme::Ident(word)) => {
                    let sp = self.bump().expect("peeked");
                    if self.eat(&Lexeme::Colon) {
                        let Some(value) = self.dotted_value() else { continue };
                        match AttrKey::from_name(&word) {
                            Some(key) => {
                                if rule.attr(key).is_some() {
                                    self.reporter.warning(
                                        sp.loc,
                                        format!("rule `{}` already has `{word}` attribute", rule.name),
                                    );
                                } else {
                                    rule.attrs.push(Attribute { key, value, loc: sp.loc });
                                }
                            }
                            None => self
                                .reporter
                                .error(sp.loc, format!("unknown attribute `{word}`")),
                        }
                    } else {
                        match DirectiveFlag::from_name(&word) {
                            Some(flag) => {
                                if rule.has_directive(flag) {
                                    self.reporter.warning(
                                        sp.loc,
                                        format!("rule `{}` already has `{word}` directive", rule.name),
                                    );
                                } else {
                                    rule.directives.push((flag, sp.loc));
                                }
                            }
                            None => self
                                .reporter
                                .error(sp.loc, format!("unknown directive `{word}`")),
                        }
                    }
                    self.eat(&Lexeme::Comma);
                }
                _ => {
                    self.error_here("expected `}` to close the attribute block");
                    return;
                }
            }
        }
    }

    /// `word` or `dotted.word`, as used for attribute values.
    fn dotted_value(&mut self) -> Option<String> {
        let (mut value, _) = self.ident("attribute value")?;
        while self.eat(&Lexeme::Dot) {
            let (part, _) = self.ident("name after `.`")?;
            value.push('.');
            value.push_str(&part);
        }
        Some(value)
    }

    fn parse_definition(&mut self) -> Definition {
        let loc = self.loc();
        let mut items = Vec::new();
        while self.at_item_start() {
            items.push(self.parse_item());
        }
        if items.is_empty() {
            self.reporter
                .error(loc, "definition requires at least one item");
        }

        let captures = if self.eat(&Lexeme::Arrow) {
            Some(self.parse_captures(false))
        } else {
            None
        };

        Definition { items, captures, loc }
    }

    fn parse_item(&mut self) -> Item {
        let sp = self.peek().expect("caller checked at_item_start");
        let loc = sp.loc;
        match sp.lexeme.clone() {
            Lexeme::Ident(name) => {
                self.bump();
                if !is_token_name(&name) && !is_rule_name(&name) {
                    self.reporter.error(
                        loc,
                        format!("`{name}` is not a valid token or rule reference"),
                    );
                }
                Item {
                    kind: ItemKind::NameRef(name),
                    count: self.eat_multiplicity().unwrap_or(Multiplicity::One),
                    capture: None,
                    loc,
                }
            }
            Lexeme::Str(text) | Lexeme::Regex(text) => {
                self.bump();
                Item {
                    kind: ItemKind::Literal(text),
                    count: self.eat_multiplicity().unwrap_or(Multiplicity::One),
                    capture: None,
                    loc,
                }
            }
            Lexeme::LParen => {
                self.bump();
                self.parse_paren_group(loc)
            }
            Lexeme::LBracket => {
                self.bump();
                self.parse_optional_group(loc)
            }
            _ => unreachable!("at_item_start"),
        }
    }

    fn parse_paren_group(&mut self, loc: Loc) -> Item {
        let mut items = Vec::new();
        let mut mode = GroupMode::Sequential;

        if self.at_item_start() {
            items.push(self.parse_item());
        } else {
            self.error_here("group requires at least one item");
        }

        if self.at(&Lexeme::Pipe) {
            // One item then `|`: this is an alternative group, one item per branch.
            mode = GroupMode::Alternative;
            while self.eat(&Lexeme::Pipe) {
                if self.at_item_start() {
                    items.push(self.parse_item());
                } else {
                    self.error_here("expected item after `|`");
                    break;
                }
            }
        } else {
            while self.at_item_start() {
                items.push(self.parse_item());
            }
        }

        self.expect(&Lexeme::RParen, "`)` to close the group");
        let count = match self.eat_multiplicity() {
            Some(count) => count,
            None => {
                let here = self.loc();
                self.reporter
                    .error(here, "`(...)` group requires a trailing `?`, `+`, or `*`");
                Multiplicity::One
            }
        };

        Item {
            kind: ItemKind::Group(InlineGroup { mode, items }),
            count,
            capture: None,
            loc,
        }
    }

    fn parse_optional_group(&mut self, loc: Loc) -> Item {
        let mut items = Vec::new();
        loop {
            if self.at_item_start() {
                items.push(self.parse_item());
            } else if self.at(&Lexeme::Pipe) {
                self.error_here("`|` is not allowed inside an optional group");
                self.bump();
            } else {
                break;
            }
        }
        if items.is_empty() {
            self.reporter
                .error(loc, "group requires at least one item");
        }
        self.expect(&Lexeme::RBracket, "`]` to close the optional group");
        if self.eat_multiplicity().is_some() {
            self.reporter
                .error(loc, "optional group cannot carry a multiplicity");
        }

        Item {
            kind: ItemKind::Group(InlineGroup { mode: GroupMode::Optional, items }),
            count: Multiplicity::One,
            capture: None,
            loc,
        }
    }

    fn eat_multiplicity(&mut self) -> Option<Multiplicity> {
        let count = match self.peek().map(|sp| &sp.lexeme) {
            Some(Lexeme::Question) => Multiplicity::ZeroOrOne,
            Some(Lexeme::Star) => Multiplicity::ZeroOrMore,
            Some(Lexeme::Plus) => Multiplicity::OneOrMore,
            _ => return None,
        };
        self.bump();
        Some(count)
    }

    // ---- captures ----

    fn parse_captures(&mut self, inline: bool) -> Vec<CaptureEntry> {
        let mut entries = Vec::new();
        loop {
            match self.peek().map(|sp| sp.lexeme.clone()) {
                Some(Lexeme::Ident(name)) if name == "_" => {
                    let sp = self.bump().expect("peeked");
                    entries.push(CaptureEntry::Ignore(sp.loc));
                }
                Some(Lexeme::Ident(_)) => {
                    if let Some(capture) = self.parse_capture_name(false) {
                        entries.push(CaptureEntry::Name(capture));
                    }
                }
                Some(Lexeme::Star) => {
                    self.bump();
                    if let Some(capture) = self.parse_capture_name(true) {
                        entries.push(CaptureEntry::Name(capture));
                    }
                }
                Some(Lexeme::LParen) => {
                    let sp = self.bump().expect("peeked");
                    let sub = self.parse_captures(true);
                    entries.push(CaptureEntry::List(sub, sp.loc));
                }
                Some(Lexeme::RParen) => {
                    if inline {
                        self.bump();
                        return entries;
                    }
                    self.error_here("unexpected `)` in capture list");
                    self.bump();
                }
                _ => break,
            }
        }
        if inline {
            self.error_here("expected `)` to close the capture group");
        }
        entries
    }

    fn parse_capture_name(&mut self, list: bool) -> Option<Capture> {
        let (name, loc) = self.ident("capture name")?;
        if list && name == "_" {
            self.reporter.error(loc, "`_` cannot be a list capture");
            return None;
        }
        let field = if self.eat(&Lexeme::Dot) {
            let (field, _) = self.ident("field name after `.`")?;
            Some(field)
        } else {
            None
        };
        Some(Capture { list, name, field, loc })
    }
}
