//! Indented source writer for the emitted parser.

use std::fmt::Write as _;

const INDENT: &str = "    ";

pub struct RustWriter {
    output: String,
    indent: usize,
}

impl RustWriter {
    pub fn new() -> RustWriter {
        RustWriter {
            output: String::new(),
            indent: 0,
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    pub fn blank(&mut self) {
        self.output.push('\n');
    }

    pub fn line(&mut self, line: impl AsRef<str>) {
        let line = line.as_ref();
        if line.is_empty() {
            self.output.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.output.push_str(INDENT);
        }
        self.output.push_str(line);
        self.output.push('\n');
    }

    pub fn comment(&mut self, text: &str) {
        self.line(format!("// {text}"));
    }

    pub fn indented(&mut self, inner: impl FnOnce(&mut Self)) {
        self.indent += 1;
        inner(self);
        self.indent = self.indent.saturating_sub(1);
    }

    /// `head {` … `}` with the body indented.
    pub fn block(&mut self, head: &str, inner: impl FnOnce(&mut Self)) {
        self.line(format!("{head} {{"));
        self.indented(inner);
        self.line("}");
    }

    /// Splices a multi-line template, re-indenting each line to the current
    /// level.
    pub fn template(&mut self, template: &str) {
        for line in template.lines() {
            if line.trim().is_empty() {
                self.output.push('\n');
            } else {
                self.line(line);
            }
        }
    }
}

/// Escapes arbitrary text into a double-quoted Rust string literal.
pub fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Default for RustWriter {
    fn default() -> Self {
        RustWriter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_nest_with_indentation() {
        let mut w = RustWriter::new();
        w.block("fn demo()", |w| {
            w.line("let x = 1;");
            w.block("if x == 1", |w| {
                w.line("return;");
            });
        });
        assert_eq!(
            w.finish(),
            "fn demo() {\n    let x = 1;\n    if x == 1 {\n        return;\n    }\n}\n"
        );
    }

    #[test]
    fn quoted_escapes_regex_sources() {
        assert_eq!(quoted(r"\s+"), r#""\\s+""#);
        assert_eq!(quoted("a\"b"), r#""a\"b""#);
        assert_eq!(quoted("line\nbreak"), r#""line\nbreak""#);
    }
}
