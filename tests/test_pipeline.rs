use indoc::indoc;
use rsgrammer::{compile, Reporter, Verbosity};

fn build(src: &str) -> String {
    let mut reporter = Reporter::new(Verbosity::Error, "test.grammar");
    compile(src, &mut reporter).expect("grammar compiles")
}

/// A small expression language touching most of the surface: skip tokens,
/// expansion, exclusions, groups, inline groups, captures, key, merge,
/// scope/declare.
const CALC: &str = indoc! {r#"
    ;; Lexical definitions.
    .token
        WS `\s+` @skip
        COMMENT `#[^\n]*` @skip
        DIGIT `[0-9]` @internal
        FLOAT `DIGIT+\.DIGIT+` @expand
        INTEGER `DIGIT+` @expand
        WORD `[a-zA-Z_][a-zA-Z0-9_]*` ^KEYWORD
    .end

    .token: KEYWORD
        'let' 'in'
    .end

    ;* Syntactic definitions. *;
    .rules
        Program: @{start, scope:names} = Stmt+ => *stmts;
        Stmt: = Let | Expr;
        Let: @{declare:name} = 'let' WORD '=' Expr ';' => _ name.value _ value _;
        Expr: @{key:left} = Operand ( '+' Operand )* => left ( _ right );
        Operand: = Number | WORD;
        Number: @{merge} = FLOAT | INTEGER;
    .end
"#};

#[test]
fn full_grammar_compiles() {
    let mut reporter = Reporter::new(Verbosity::Error, "calc.grammar");
    let code = compile(CALC, &mut reporter).expect("calc grammar compiles");
    assert_eq!(reporter.error_count(), 0);
    assert!(code.contains("struct Patterns"));
    assert!(code.contains("struct Parser"));
    assert!(code.contains("fn main()"));
}

#[test]
fn every_surface_helper_is_emitted() {
    let code = build(CALC);
    for helper in [
        "fn is_float", "fn match_float", "fn expect_float",
        "fn is_integer", "fn match_integer", "fn expect_integer",
        "fn is_word", "fn match_word", "fn expect_word",
        "fn is_keyword", "fn match_keyword", "fn expect_keyword",
        "fn is_program", "fn match_program",
        "fn is_let", "fn match_let",
        "fn is_expr", "fn match_expr",
        "fn is_number", "fn match_number",
    ] {
        assert!(code.contains(helper), "missing `{helper}`");
    }
    // Skip and internal tokens get no helpers.
    assert!(!code.contains("fn match_ws"));
    assert!(!code.contains("fn match_comment"));
    assert!(!code.contains("fn match_digit"));
}

#[test]
fn expansion_is_inlined_into_the_pattern_table() {
    let code = build(CALC);
    assert!(code.contains(r#"t_float: Regex::new("\\A(?:(?:[0-9])+\\.(?:[0-9])+)")"#));
    assert!(code.contains(r#"t_integer: Regex::new("\\A(?:(?:[0-9])+)")"#));
    // The internal fragment itself is not compiled.
    assert!(!code.contains("t_digit"));
}

#[test]
fn skip_table_holds_every_skip_token() {
    let code = build(CALC);
    assert!(code.contains(r#"Regex::new("\\A(?:\\s+)")"#));
    assert!(code.contains(r#"Regex::new("\\A(?:#[^\\n]*)")"#));
}

#[test]
fn lookahead_functions_never_advance() {
    let code = build(CALC);
    // `is_*` bodies consist purely of peeks and other `is_*` calls: no
    // `match_` call and no cursor mutation anywhere in them.
    for part in code.split("fn is_").skip(1) {
        let body: &str = part
            .split_once('{')
            .map(|(_, rest)| rest)
            .unwrap_or("")
            .split("\n    }")
            .next()
            .unwrap_or("");
        assert!(
            !body.contains("self.match_") && !body.contains("self.pos +="),
            "is_ helper advances or matches: {body}"
        );
    }
}

#[test]
fn transactional_rules_restore_the_cursor() {
    let code = build(CALC);
    assert!(code.contains("let start = self.pos;"));
    assert!(code.contains("self.pos = start;"));
    assert!(code.contains("return None;"));
}

#[test]
fn merge_and_key_lowerings_are_present() {
    let code = build(CALC);
    // Number folds into Operand's node (no capture on the reference).
    assert!(code.contains("merge_into(&mut node, m, None);"));
    // Expr collapses to `left` when nothing else matched.
    assert!(code.contains(r#"if node.len() == 3 && node.contains_key("left")"#));
}

#[test]
fn scope_and_declare_lower_to_stack_operations() {
    let code = build(CALC);
    assert!(code.contains("self.push_scope();"));
    assert!(code.contains("let frame = self.pop_scope();"));
    assert!(code.contains(r#"node.insert("names".to_string(), Value::Object(frame));"#));
    assert!(code.contains(r#"self.declare(&node, "name");"#));
}

#[test]
fn exclusions_guard_word_against_keywords() {
    let code = build(CALC);
    assert!(code.contains(r#"Regex::new("\\A(?:let|in)\\z")"#));
    assert!(code.contains("excl_word"));
}

#[test]
fn entry_point_defaults_to_the_start_rule() {
    let code = build(CALC);
    assert!(code.contains(r#"const DEFAULT_START: Option<&str> = Some("Program");"#));
    assert!(code.contains(r#""Program" => parser.match_program(),"#));
    assert!(code.contains(r#""Number" => parser.match_number(),"#));
}

#[test]
fn loadandparse_emits_recursive_parsing() {
    let code = build(indoc! {r#"
        .token
            WS `\s+` @skip
            IMPORT `@([a-z./]+)` @1 @loadandparse @relfilepath
        .end
        .rules
            Module: @{start} = IMPORT* => *imports;
        .end
    "#});
    assert!(code.contains("fn parse_file(path: &str, verbosity: Verbosity) -> Option<Value>"));
    assert!(code.contains("let ast = parse_file(&value, self.verbosity());"));
    assert!(code.contains("let value = self.check_relative(value);"));
    assert!(code.contains("self.warn_missing(&value);"));
    assert!(code.contains(r#"self.take_token("SUBMODULE", "import", len, value.clone());"#));
}

#[test]
fn group_index_tokens_read_their_capture_group() {
    let code = build(indoc! {r#"
        .token
            WS `\s+` @skip
            STRING `"([^"]*)"` @1
        .end
        .rules
            Text: @{start} = STRING => v;
        .end
    "#});
    assert!(code.contains("self.peek_pattern(&self.pat.t_string, 1)"));
}

#[test]
fn verbosity_and_classification_attrs_lower() {
    let code = build(indoc! {r#"
        .token
            WS `\s+` @skip
            WORD `[a-z]+`
        .end
        .rules
            Doc: @{start, verbosity:info, retroclassify:doc.body} = Tag+ => *tags;
            Tag: @{reclassify:tag.name} = WORD => t;
        .end
    "#});
    assert!(code.contains("self.verbs.push(Verbosity::Info);"));
    assert!(code.contains("self.verbs.pop();"));
    assert!(code.contains("let stream_mark = self.stream.len();"));
    assert!(code.contains(r#"self.retroclassify(stream_mark, "doc.body");"#));
    assert!(code.contains(r#"let saved_classifiers = self.swap_classifiers("tag.name");"#));
    assert!(code.contains("self.restore_classifiers(saved_classifiers);"));
}

#[test]
fn generation_success_is_reported() {
    let mut reporter = Reporter::new(Verbosity::Error, "calc.grammar");
    compile(CALC, &mut reporter).expect("compiles");
    assert!(reporter
        .messages()
        .iter()
        .any(|d| d.level == Verbosity::Success && d.message.contains("finished")));
}
