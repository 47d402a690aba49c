//! Tokenizer for the surface DSL (§4.1).
//!
//! Lexes ASCII source into a flat token stream. Whitespace and `#`-to-
//! end-of-line comments are skipped. Keywords, once matched, are never
//! identifiers. Numbers are nonnegative integers. Fails with
//! `Diagnostic::lex_error` at the offending byte position.

use crate::diagnostic::Diagnostic;
use crate::lexeme::Token;
use crate::span::{Span, Spanned};

pub struct Lexer<'src> {
    source: &'src [u8],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source: source.as_bytes(),
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Spanned<Token>>, Vec<Diagnostic>) {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            let is_end = tok.node == Token::End;
            tokens.push(tok);
            if is_end {
                break;
            }
        }
        (tokens, self.diagnostics)
    }

    fn next_token(&mut self) -> Spanned<Token> {
        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.source.len() {
                return self.make(Token::End, self.pos, self.pos);
            }

            let start = self.pos;
            let ch = self.source[self.pos];

            if is_ident_start(ch) {
                return self.scan_ident_or_keyword();
            }
            if ch.is_ascii_digit() {
                return self.scan_number();
            }
            if let Some(tok) = self.scan_symbol(start) {
                return tok;
            }
            // scan_symbol recorded a diagnostic and advanced; retry.
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.source.len() && self.source[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos < self.source.len() && self.source[self.pos] == b'#' {
                while self.pos < self.source.len() && self.source[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn scan_ident_or_keyword(&mut self) -> Spanned<Token> {
        let start = self.pos;
        while self.pos < self.source.len() && is_ident_continue(self.source[self.pos]) {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos])
            .expect("ascii source is valid utf8");
        let tok = Token::from_keyword(text).unwrap_or_else(|| Token::Identifier(text.to_string()));
        self.make(tok, start, self.pos)
    }

    fn scan_number(&mut self) -> Spanned<Token> {
        let start = self.pos;
        while self.pos < self.source.len() && self.source[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        let value: u64 = text.parse().unwrap_or(0);
        self.make(Token::Number(value), start, self.pos)
    }

    fn scan_symbol(&mut self, start: usize) -> Option<Spanned<Token>> {
        let ch = self.source[start];
        macro_rules! one {
            ($tok:expr) => {{
                self.pos += 1;
                Some(self.make($tok, start, self.pos))
            }};
        }
        match ch {
            b'{' => one!(Token::LBrace),
            b'}' => one!(Token::RBrace),
            b'(' => one!(Token::LParen),
            b')' => one!(Token::RParen),
            b';' => one!(Token::Semicolon),
            b'|' => one!(Token::Pipe),
            b'/' => one!(Token::Slash),
            b'-' => {
                if self.peek(1) == Some(b'>') {
                    self.pos += 2;
                    Some(self.make(Token::Arrow, start, self.pos))
                } else {
                    one!(Token::Hyphen)
                }
            }
            b'<' => {
                if self.peek(1) == Some(b'-') {
                    self.pos += 2;
                    Some(self.make(Token::BackArrow, start, self.pos))
                } else {
                    self.pos += 1;
                    self.diagnostics.push(Diagnostic::lex_error(
                        "unexpected byte '<'",
                        Span::new(start as u32, self.pos as u32),
                    ));
                    None
                }
            }
            other => {
                self.pos += 1;
                self.diagnostics.push(Diagnostic::lex_error(
                    format!("unexpected byte {:?}", other as char),
                    Span::new(start as u32, self.pos as u32),
                ));
                None
            }
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn make(&self, tok: Token, start: usize, end: usize) -> Spanned<Token> {
        Spanned::new(tok, Span::new(start as u32, end as u32))
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        let (tokens, diags) = Lexer::new(src).tokenize();
        assert!(diags.is_empty(), "unexpected lex errors: {:?}", diags);
        tokens.into_iter().map(|t| t.node).collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        assert_eq!(
            kinds("producer img"),
            vec![Token::Producer, Token::Identifier("img".into()), Token::End]
        );
    }

    #[test]
    fn lexes_arrows_and_back_arrows() {
        assert_eq!(
            kinds("-> <- -"),
            vec![Token::Arrow, Token::BackArrow, Token::Hyphen, Token::End]
        );
    }

    #[test]
    fn lexes_named_forward_arrow_as_parts() {
        // "-(relu)->" lexes as Hyphen LParen Identifier RParen Arrow
        assert_eq!(
            kinds("-(relu)->"),
            vec![
                Token::Hyphen,
                Token::LParen,
                Token::Identifier("relu".into()),
                Token::RParen,
                Token::Arrow,
                Token::End,
            ]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(
            kinds("producer p; # a comment\nconsumer c;"),
            vec![
                Token::Producer,
                Token::Identifier("p".into()),
                Token::Semicolon,
                Token::Consumer,
                Token::Identifier("c".into()),
                Token::Semicolon,
                Token::End,
            ]
        );
    }

    #[test]
    fn reports_lex_error_with_position() {
        let (_, diags) = Lexer::new("producer p @ ;").tokenize();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].span, Span::new(11, 12));
    }

    #[test]
    fn numbers_are_nonnegative_integers() {
        assert_eq!(kinds("{784}"), vec![
            Token::LBrace,
            Token::Number(784),
            Token::RBrace,
            Token::End,
        ]);
    }
}
