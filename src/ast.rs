//! In-memory model of a grammar description.
//!
//! Built by [`crate::grammar`], annotated by [`crate::analysis`] (reference
//! binding, token expansion, capture assignment), and read-only for
//! [`crate::translate`].

use crate::reporting::Loc;

#[derive(Debug, Default)]
pub struct Grammar {
    pub tokens: Vec<Token>,
    pub groups: Vec<TokenGroup>,
    pub rules: Vec<Rule>,
    /// Name of the rule carrying the `start` directive, if any.
    pub start: Option<String>,
}

impl Grammar {
    pub fn token(&self, name: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&TokenGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// The token namespace covers tokens and token groups alike.
    pub fn has_token_name(&self, name: &str) -> bool {
        self.token(name).is_some() || self.group(name).is_some()
    }
}

#[derive(Debug)]
pub struct Token {
    pub name: String,
    /// Regex source as written in the grammar.
    pub pattern: String,
    /// Post-expansion regex, filled in by the resolver.
    pub expanded: Option<String>,
    pub decorators: Vec<Decorator>,
    /// Token-group names whose members this token must not match.
    pub exclusions: Vec<String>,
    /// Capture group whose text becomes the token value (`@N`, default 0).
    pub group_index: u32,
    /// Default classification tag for the emitted token stream.
    pub classification: Option<String>,
    pub loc: Loc,
}

impl Token {
    pub fn has(&self, decorator: Decorator) -> bool {
        self.decorators.contains(&decorator)
    }

    /// The pattern the generated parser will compile.
    pub fn regex(&self) -> &str {
        self.expanded.as_deref().unwrap_or(&self.pattern)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decorator {
    Skip,
    Internal,
    Expand,
    RelFilePath,
    AbsFilePath,
    RelDirPath,
    AbsDirPath,
    EnsureRelative,
    EnsureAbsolute,
    LoadAndParse,
}

impl Decorator {
    pub fn from_name(name: &str) -> Option<Decorator> {
        use Decorator::*;
        Some(match name {
            "skip" => Skip,
            "internal" => Internal,
            "expand" => Expand,
            "relfilepath" => RelFilePath,
            "absfilepath" => AbsFilePath,
            "reldirpath" => RelDirPath,
            "absdirpath" => AbsDirPath,
            "ensurerelative" => EnsureRelative,
            "ensureabsolute" => EnsureAbsolute,
            "loadandparse" => LoadAndParse,
            _ => return None,
        })
    }
}

#[derive(Debug)]
pub struct TokenGroup {
    pub name: String,
    /// Member regex fragments, in declaration order.
    pub members: Vec<String>,
    pub loc: Loc,
}

impl TokenGroup {
    /// The alternation the generated parser matches the group against.
    pub fn pattern(&self) -> String {
        self.members.join("|")
    }
}

#[derive(Debug)]
pub struct Rule {
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub directives: Vec<(DirectiveFlag, Loc)>,
    pub definitions: Vec<Definition>,
    pub loc: Loc,
}

impl Rule {
    pub fn attr(&self, key: AttrKey) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.key == key)
    }

    pub fn attr_value(&self, key: AttrKey) -> Option<&str> {
        self.attr(key).map(|a| a.value.as_str())
    }

    pub fn has_directive(&self, flag: DirectiveFlag) -> bool {
        self.directives.iter().any(|(d, _)| *d == flag)
    }

    /// `EXPR` for a rule named `Expr`; the emitted node's `kind`.
    pub fn node_kind(&self) -> String {
        snake_case(&self.name).to_uppercase()
    }
}

#[derive(Debug)]
pub struct Attribute {
    pub key: AttrKey,
    pub value: String,
    pub loc: Loc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKey {
    Key,
    Flip,
    Scope,
    Declare,
    Verbosity,
    Classify,
    Reclassify,
    Retroclassify,
}

impl AttrKey {
    pub fn from_name(name: &str) -> Option<AttrKey> {
        use AttrKey::*;
        Some(match name {
            "key" => Key,
            "flip" => Flip,
            "scope" => Scope,
            "declare" => Declare,
            "verbosity" => Verbosity,
            "classify" => Classify,
            "reclassify" => Reclassify,
            "retroclassify" => Retroclassify,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveFlag {
    Merge,
    Start,
}

impl DirectiveFlag {
    pub fn from_name(name: &str) -> Option<DirectiveFlag> {
        match name {
            "merge" => Some(DirectiveFlag::Merge),
            "start" => Some(DirectiveFlag::Start),
            _ => None,
        }
    }
}

/// One alternative of a rule.
#[derive(Debug)]
pub struct Definition {
    pub items: Vec<Item>,
    /// The raw `=>` tail as parsed; the resolver distributes it onto items.
    pub captures: Option<Vec<CaptureEntry>>,
    pub loc: Loc,
}

#[derive(Debug)]
pub struct Item {
    pub kind: ItemKind,
    pub count: Multiplicity,
    /// Assigned by the resolver from the definition's capture list.
    pub capture: Option<Capture>,
    pub loc: Loc,
}

impl Item {
    /// Whether this item can succeed without consuming input: `?`/`*`
    /// multiplicity, an optional group, or a group all of whose items are
    /// nullable.
    pub fn is_nullable(&self) -> bool {
        if self.count.is_optional() {
            return true;
        }
        match &self.kind {
            ItemKind::Group(group) => match group.mode {
                GroupMode::Optional => true,
                GroupMode::Alternative | GroupMode::Sequential => {
                    group.items.iter().all(Item::is_nullable)
                }
            },
            _ => false,
        }
    }
}

#[derive(Debug)]
pub enum ItemKind {
    /// An unresolved name, as parsed. Rewritten by the resolver.
    NameRef(String),
    TokenRef(String),
    GroupRef(String),
    RuleRef(String),
    /// Inline regex fragment from a quoted or backtick literal.
    Literal(String),
    Group(InlineGroup),
}

#[derive(Debug)]
pub struct InlineGroup {
    pub mode: GroupMode,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    Sequential,
    Alternative,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Multiplicity {
    pub fn is_optional(self) -> bool {
        matches!(self, Multiplicity::ZeroOrOne | Multiplicity::ZeroOrMore)
    }

    pub fn is_repeatable(self) -> bool {
        matches!(self, Multiplicity::ZeroOrMore | Multiplicity::OneOrMore)
    }
}

/// A name binding from a matched item into the enclosing node.
#[derive(Debug, Clone)]
pub struct Capture {
    /// `*name`: append into a list instead of assigning.
    pub list: bool,
    pub name: String,
    /// `name.field`: project this field from the matched sub-node.
    pub field: Option<String>,
    pub loc: Loc,
}

/// One element of a raw capture list, mirroring the item tree.
#[derive(Debug)]
pub enum CaptureEntry {
    /// `_`
    Ignore(Loc),
    Name(Capture),
    /// Parenthesized sublist for an inline group.
    List(Vec<CaptureEntry>, Loc),
}

impl CaptureEntry {
    pub fn loc(&self) -> Loc {
        match self {
            CaptureEntry::Ignore(loc) => *loc,
            CaptureEntry::Name(c) => c.loc,
            CaptureEntry::List(_, loc) => *loc,
        }
    }
}

/// Converts PascalCase or ALL_CAPS to snake_case.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut last: Option<char> = None;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            match last {
                Some(prev) if prev.is_ascii_lowercase() => out.push('_'),
                _ => {}
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
        last = Some(ch);
    }
    out
}

/// Whether `name` is a valid token or group name.
pub fn is_token_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Whether `name` is strict PascalCase: no underscores and no two consecutive
/// uppercase letters, so `RgbColor` passes and `RGBColor` does not.
pub fn is_rule_name(name: &str) -> bool {
    let chars: Vec<char> = name.chars().collect();
    match chars.first() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    for pair in chars.windows(2) {
        if pair[0].is_ascii_uppercase() && pair[1].is_ascii_uppercase() {
            return false;
        }
    }
    chars.iter().all(|c| c.is_ascii_alphanumeric())
}

/// The regex fragment a rule literal matches with. Single metacharacters are
/// escaped so `'+'` means a literal plus; anything longer is taken verbatim.
pub fn literal_pattern(lit: &str) -> String {
    match lit {
        "(" | ")" | "[" | "]" | "{" | "}" | "^" | "$" | "-" | "*" | "+" | "?" | "." | "|"
        | "\\" => format!("\\{lit}"),
        _ => lit.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_handles_pascal_and_caps() {
        assert_eq!(snake_case("RgbColor"), "rgb_color");
        assert_eq!(snake_case("Number"), "number");
        assert_eq!(snake_case("INT_LITERAL"), "int_literal");
    }

    #[test]
    fn rule_names_are_strict_pascal() {
        assert!(is_rule_name("RgbColor"));
        assert!(is_rule_name("A"));
        assert!(!is_rule_name("RGBColor"));
        assert!(!is_rule_name("rgbColor"));
        assert!(!is_rule_name("Rgb_Color"));
    }

    #[test]
    fn token_names_are_all_caps() {
        assert!(is_token_name("INT"));
        assert!(is_token_name("FILE_PATH2"));
        assert!(!is_token_name("Int"));
        assert!(!is_token_name("_INT"));
    }

    #[test]
    fn literal_patterns_escape_metacharacters() {
        assert_eq!(literal_pattern("+"), "\\+");
        assert_eq!(literal_pattern("let"), "let");
        assert_eq!(literal_pattern("=>"), "=>");
    }
}
