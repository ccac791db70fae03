//! Lexer for the grammar description dialect.
//!
//! Lexemes are produced on demand so the parser can stop at the final `.end`
//! and leave trailing text untouched. Whitespace and comments (`;;` to end of
//! line, `;* ... *;` non-nested) are insignificant outside literals.

use crate::reporting::Loc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lexeme {
    /// Identifier, including a bare `_`.
    Ident(String),
    /// Backtick-delimited regex literal, contents verbatim.
    Regex(String),
    /// Single- or double-quoted literal, contents taken as a regex fragment.
    Str(String),
    /// `@name` or `@digit`.
    Decorator(String),
    /// `@{`, opening an attribute/directive block.
    AttrOpen,
    /// `^NAME`, a token-group exclusion.
    Exclusion(String),
    Dot,
    Colon,
    Semi,
    Assign,
    Arrow,
    Pipe,
    Comma,
    Star,
    Plus,
    Question,
    LParen,
    RParen,
    LBracket,
    RBracket,
    RBrace,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub lexeme: Lexeme,
    pub loc: Loc,
}

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub loc: Loc,
}

pub struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    line: u32,
    col: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn loc(&self) -> Loc {
        Loc::new(self.line, self.col)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some(';') if self.peek2() == Some(';') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(';') if self.peek2() == Some('*') => {
                    let start = self.loc();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some('*') if self.peek2() == Some(';') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => {
                                return Err(LexError {
                                    message: "unterminated block comment".to_string(),
                                    loc: start,
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    /// Next lexeme, or `Ok(None)` at end of input. On an error the cursor has
    /// advanced past the offending text, so lexing can continue.
    pub fn next_lexeme(&mut self) -> Result<Option<Spanned>, LexError> {
        self.skip_trivia()?;
        let loc = self.loc();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let lexeme = match ch {
            c if c.is_ascii_alphanumeric() || c == '_' => Lexeme::Ident(self.ident()),
            '`' => {
                self.bump();
                let start = self.pos;
                loop {
                    match self.peek() {
                        Some('`') => break,
                        Some(_) => {
                            self.bump();
                        }
                        None => {
                            return Err(LexError {
                                message: "unterminated regex literal".to_string(),
                                loc,
                            });
                        }
                    }
                }
                let text = self.src[start..self.pos].to_string();
                self.bump();
                if text.is_empty() {
                    return Err(LexError {
                        message: "empty regex literal".to_string(),
                        loc,
                    });
                }
                Lexeme::Regex(text)
            }
            '\'' | '"' => {
                let quote = ch;
                self.bump();
                let start = self.pos;
                loop {
                    match self.peek() {
                        Some(c) if c == quote => break,
                        Some('\n') | None => {
                            return Err(LexError {
                                message: "unterminated string literal".to_string(),
                                loc,
                            });
                        }
                        Some(_) => {
                            self.bump();
                        }
                    }
                }
                let text = self.src[start..self.pos].to_string();
                self.bump();
                Lexeme::Str(text)
            }
            '@' => {
                self.bump();
                match self.peek() {
                    Some('{') => {
                        self.bump();
                        Lexeme::AttrOpen
                    }
                    Some(c) if c.is_ascii_alphanumeric() => Lexeme::Decorator(self.ident()),
                    _ => {
                        return Err(LexError {
                            message: "expected decorator name or `{` after `@`".to_string(),
                            loc,
                        });
                    }
                }
            }
            '^' => {
                self.bump();
                match self.peek() {
                    Some(c) if c.is_ascii_alphabetic() => Lexeme::Exclusion(self.ident()),
                    _ => {
                        return Err(LexError {
                            message: "expected token-group name after `^`".to_string(),
                            loc,
                        });
                    }
                }
            }
            '=' => {
                self.bump();
                if self.peek() == Some('>') {
                    self.bump();
                    Lexeme::Arrow
                } else {
                    Lexeme::Assign
                }
            }
            '.' => {
                self.bump();
                Lexeme::Dot
            }
            ':' => {
                self.bump();
                Lexeme::Colon
            }
            ';' => {
                // `;;` and `;*` were consumed as trivia above.
                self.bump();
                Lexeme::Semi
            }
            '|' => {
                self.bump();
                Lexeme::Pipe
            }
            ',' => {
                self.bump();
                Lexeme::Comma
            }
            '*' => {
                self.bump();
                Lexeme::Star
            }
            '+' => {
                self.bump();
                Lexeme::Plus
            }
            '?' => {
                self.bump();
                Lexeme::Question
            }
            '(' => {
                self.bump();
                Lexeme::LParen
            }
            ')' => {
                self.bump();
                Lexeme::RParen
            }
            '[' => {
                self.bump();
                Lexeme::LBracket
            }
            ']' => {
                self.bump();
                Lexeme::RBracket
            }
            '}' => {
                self.bump();
                Lexeme::RBrace
            }
            other => {
                self.bump();
                return Err(LexError {
                    message: format!("unexpected character `{other}`"),
                    loc,
                });
            }
        };

        Ok(Some(Spanned { lexeme, loc }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<Lexeme> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        while let Some(sp) = lexer.next_lexeme().expect("lex error") {
            out.push(sp.lexeme);
        }
        out
    }

    #[test]
    fn lexes_a_token_entry() {
        let lexemes = lex_all("INT `[0-9]+` @skip ^KEYWORD");
        assert_eq!(
            lexemes,
            vec![
                Lexeme::Ident("INT".into()),
                Lexeme::Regex("[0-9]+".into()),
                Lexeme::Decorator("skip".into()),
                Lexeme::Exclusion("KEYWORD".into()),
            ]
        );
    }

    #[test]
    fn comments_are_trivia() {
        let lexemes = lex_all(";; line\nA ;* block\nstill block *; B");
        assert_eq!(
            lexemes,
            vec![Lexeme::Ident("A".into()), Lexeme::Ident("B".into())]
        );
    }

    #[test]
    fn arrow_and_assign_are_distinct() {
        assert_eq!(
            lex_all("= =>"),
            vec![Lexeme::Assign, Lexeme::Arrow]
        );
    }

    #[test]
    fn attr_block_open_differs_from_decorator() {
        assert_eq!(
            lex_all("@{ key } @skip"),
            vec![
                Lexeme::AttrOpen,
                Lexeme::Ident("key".into()),
                Lexeme::RBrace,
                Lexeme::Decorator("skip".into()),
            ]
        );
    }

    #[test]
    fn dotted_names_lex_as_ident_dot_ident() {
        assert_eq!(
            lex_all("name.value"),
            vec![
                Lexeme::Ident("name".into()),
                Lexeme::Dot,
                Lexeme::Ident("value".into()),
            ]
        );
    }

    #[test]
    fn unterminated_block_comment_is_an_error() {
        let mut lexer = Lexer::new(";* never closed");
        assert!(lexer.next_lexeme().is_err());
    }

    #[test]
    fn locations_are_one_based() {
        let mut lexer = Lexer::new("\n  INT");
        let sp = lexer.next_lexeme().unwrap().unwrap();
        assert_eq!((sp.loc.line, sp.loc.col), (2, 3));
    }
}
