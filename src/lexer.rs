//! Hand-written character scanner.
//!
//! Table-free: each token kind is recognized by a direct character-class
//! check rather than a generated DFA, matching the rest of this crate's
//! preference for small explicit state over generic machinery.

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Integer(i64),
    Float(f64),
    Print,
    Return,
    If,
    Else,
    While,
    For,
    TypeInt,
    TypeFloat,
    TypeBool,
    TypeVoid,
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "print" => TokenKind::Print,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "int" => TokenKind::TypeInt,
        "float" => TokenKind::TypeFloat,
        "bool" => TokenKind::TypeBool,
        "void" => TokenKind::TypeVoid,
        _ => return None,
    })
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Scanner {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_one(&mut self) -> CompileResult<Token> {
        self.skip_trivia();
        let line = self.line;
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                line,
            });
        };

        if c.is_ascii_digit() {
            return self.scan_number(line);
        }
        if c == '_' || c.is_ascii_alphabetic() {
            return self.scan_word(line);
        }

        let two = |s: &mut Self, second: char, one_kind: TokenKind, two_kind: TokenKind, one_lex: &str, two_lex: &str| {
            s.advance();
            if s.peek() == Some(second) {
                s.advance();
                Token {
                    kind: two_kind,
                    lexeme: two_lex.to_string(),
                    line,
                }
            } else {
                Token {
                    kind: one_kind,
                    lexeme: one_lex.to_string(),
                    line,
                }
            }
        };

        let tok = match c {
            '+' => {
                self.advance();
                Token {
                    kind: TokenKind::Plus,
                    lexeme: "+".to_string(),
                    line,
                }
            }
            '-' => {
                self.advance();
                Token {
                    kind: TokenKind::Minus,
                    lexeme: "-".to_string(),
                    line,
                }
            }
            '*' => {
                self.advance();
                Token {
                    kind: TokenKind::Star,
                    lexeme: "*".to_string(),
                    line,
                }
            }
            '/' => {
                self.advance();
                Token {
                    kind: TokenKind::Slash,
                    lexeme: "/".to_string(),
                    line,
                }
            }
            '=' => two(self, '=', TokenKind::Assign, TokenKind::Eq, "=", "=="),
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token {
                        kind: TokenKind::Ne,
                        lexeme: "!=".to_string(),
                        line,
                    }
                } else {
                    return Err(CompileError::lexical(line, format!("Unexpected character '{c}'.")));
                }
            }
            '<' => two(self, '=', TokenKind::Lt, TokenKind::Le, "<", "<="),
            '>' => two(self, '=', TokenKind::Gt, TokenKind::Ge, ">", ">="),
            '(' => {
                self.advance();
                Token {
                    kind: TokenKind::LParen,
                    lexeme: "(".to_string(),
                    line,
                }
            }
            ')' => {
                self.advance();
                Token {
                    kind: TokenKind::RParen,
                    lexeme: ")".to_string(),
                    line,
                }
            }
            '{' => {
                self.advance();
                Token {
                    kind: TokenKind::LBrace,
                    lexeme: "{".to_string(),
                    line,
                }
            }
            '}' => {
                self.advance();
                Token {
                    kind: TokenKind::RBrace,
                    lexeme: "}".to_string(),
                    line,
                }
            }
            ',' => {
                self.advance();
                Token {
                    kind: TokenKind::Comma,
                    lexeme: ",".to_string(),
                    line,
                }
            }
            ';' => {
                self.advance();
                Token {
                    kind: TokenKind::Semi,
                    lexeme: ";".to_string(),
                    line,
                }
            }
            other => {
                self.advance();
                return Err(CompileError::lexical(line, format!("Unexpected character '{other}'.")));
            }
        };
        Ok(tok)
    }

    fn scan_number(&mut self, line: usize) -> CompileResult<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let is_float = self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit());
        if is_float {
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
            let lexeme: String = self.chars[start..self.pos].iter().collect();
            let value: f64 = lexeme
                .parse()
                .map_err(|_| CompileError::lexical(line, format!("Malformed float literal '{lexeme}'.")))?;
            return Ok(Token {
                kind: TokenKind::Float(value),
                lexeme,
                line,
            });
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let value: i64 = lexeme
            .parse()
            .map_err(|_| CompileError::lexical(line, format!("Integer literal '{lexeme}' does not fit.")))?;
        Ok(Token {
            kind: TokenKind::Integer(value),
            lexeme,
            line,
        })
    }

    fn scan_word(&mut self, line: usize) -> CompileResult<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c == '_' || c.is_ascii_alphanumeric()) {
            self.advance();
        }
        let lexeme: String = self.chars[start..self.pos].iter().collect();
        let kind = keyword(&lexeme).unwrap_or_else(|| TokenKind::Identifier(lexeme.clone()));
        Ok(Token { kind, lexeme, line })
    }
}

/// Scan `source` into a token stream terminated by a single trailing `Eof`.
pub fn tokenize(source: &str) -> CompileResult<Vec<Token>> {
    let mut scanner = Scanner {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let tok = scanner.scan_one()?;
        let is_eof = tok.kind == TokenKind::Eof;
        tokens.push(tok);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_and_identifiers_are_distinguished() {
        let tokens = tokenize("int x while y").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::TypeInt);
        assert_eq!(tokens[1].kind, TokenKind::Identifier("x".to_string()));
        assert_eq!(tokens[2].kind, TokenKind::While);
        assert_eq!(tokens[3].kind, TokenKind::Identifier("y".to_string()));
    }

    #[test]
    fn integers_and_floats_are_distinguished() {
        let tokens = tokenize("42 3.14 7").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer(42));
        assert_eq!(tokens[1].kind, TokenKind::Float(3.14));
        assert_eq!(tokens[2].kind, TokenKind::Integer(7));
    }

    #[test]
    fn comments_are_skipped_to_end_of_line() {
        let tokens = tokenize("int x; # a comment\nint y;").unwrap();
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines[0], 1);
        assert!(lines.contains(&2));
    }

    #[test]
    fn two_char_operators_are_not_split() {
        let tokens = tokenize("a <= b >= c == d != e").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Le);
        assert_eq!(tokens[3].kind, TokenKind::Ge);
        assert_eq!(tokens[5].kind, TokenKind::Eq);
        assert_eq!(tokens[7].kind, TokenKind::Ne);
    }

    #[test]
    fn stray_character_is_a_fatal_lexical_error() {
        let err = tokenize("int x = 1 $ 2;").unwrap_err();
        assert_eq!(err.phase, crate::error::Phase::Lexical);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn line_numbers_advance_across_newlines() {
        let tokens = tokenize("int x;\nint y;\nint z;").unwrap();
        let z_tok = tokens.iter().find(|t| t.kind == TokenKind::Identifier("z".to_string())).unwrap();
        assert_eq!(z_tok.line, 3);
    }
}
