//! LL(1) recursive-descent parser for the surface DSL (§4.2).
//!
//! Consumes the flat token stream produced by `syntax::lexer::Lexer` and
//! builds an `ast::DeclarationsAST`. Never resolves names; that is
//! `ir::builder`'s job.

use crate::ast::{ArrowAST, CycleAST, CycleStmt, DeclarationsAST, HarmonicAST, Line, NodeDecl, Ratio};
use crate::diagnostic::Diagnostic;
use crate::lexeme::Token;
use crate::span::{Span, Spanned};

pub struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned<Token>>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].node
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) -> Spanned<Token> {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: &Token) -> Result<Spanned<Token>, Diagnostic> {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(want) {
            Ok(self.advance())
        } else {
            Err(Diagnostic::parse_error(
                want.describe(),
                self.peek().describe(),
                self.span(),
            ))
        }
    }

    fn expect_identifier(&mut self) -> Result<Spanned<String>, Diagnostic> {
        let span = self.span();
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.advance();
                Ok(Spanned::new(name, span))
            }
            other => Err(Diagnostic::parse_error(
                "identifier".to_string(),
                other.describe(),
                span,
            )),
        }
    }

    /// Entry point: a bare `DeclarationsAST` (no enclosing `harmonic` wrapper).
    pub fn parse_declarations(&mut self) -> Result<DeclarationsAST, Diagnostic> {
        let mut ast = DeclarationsAST::default();
        loop {
            match self.peek() {
                Token::Producer => {
                    self.advance();
                    ast.producers.push(self.parse_node_decl(false)?);
                }
                Token::Consumer => {
                    self.advance();
                    ast.consumers.push(self.parse_node_decl(false)?);
                }
                Token::Layer => {
                    self.advance();
                    ast.layers.push(self.parse_node_decl(true)?);
                }
                Token::Cycle => {
                    self.advance();
                    ast.cycle = Some(self.parse_cycle_block()?);
                }
                Token::End => break,
                other => {
                    return Err(Diagnostic::parse_error(
                        "'producer', 'consumer', 'layer', 'cycle', or end of input".to_string(),
                        other.describe(),
                        self.span(),
                    ));
                }
            }
        }
        Ok(ast)
    }

    /// Entry point for the optional `harmonic NAME { ... }` wrapper.
    pub fn parse_harmonic(&mut self) -> Result<HarmonicAST, Diagnostic> {
        self.expect(&Token::Harmonic)?;
        let name = self.expect_identifier()?.node;
        self.expect(&Token::LBrace)?;
        let decls = self.parse_declarations_until_brace()?;
        self.expect(&Token::RBrace)?;
        Ok(HarmonicAST { name, decls })
    }

    fn parse_declarations_until_brace(&mut self) -> Result<DeclarationsAST, Diagnostic> {
        let mut ast = DeclarationsAST::default();
        loop {
            match self.peek() {
                Token::Producer => {
                    self.advance();
                    ast.producers.push(self.parse_node_decl(false)?);
                }
                Token::Consumer => {
                    self.advance();
                    ast.consumers.push(self.parse_node_decl(false)?);
                }
                Token::Layer => {
                    self.advance();
                    ast.layers.push(self.parse_node_decl(true)?);
                }
                Token::Cycle => {
                    self.advance();
                    ast.cycle = Some(self.parse_cycle_block()?);
                }
                _ => break,
            }
        }
        Ok(ast)
    }

    /// `IDENT ('{' NUMBER '}' | NUMBER '/' NUMBER IDENT)? ';'`
    ///
    /// The shape form is available to producers, consumers, and layers;
    /// the ratio form (`lhs/rhs ref`) is layer-only, but we parse it
    /// uniformly here and let the builder ignore it on non-layers — no
    /// producer/consumer declares a ratio in practice, and a ratio on a
    /// producer simply never participates in width resolution.
    fn parse_node_decl(&mut self, allow_ratio: bool) -> Result<NodeDecl, Diagnostic> {
        let name = self.expect_identifier()?;
        let mut declared_width = None;
        let mut ratio = None;

        if matches!(self.peek(), Token::LBrace) {
            self.advance();
            let n = self.expect_number()?;
            self.expect(&Token::RBrace)?;
            declared_width = Some(n);
        } else if allow_ratio && matches!(self.peek(), Token::Number(_)) {
            let lhs = self.expect_number()?;
            self.expect(&Token::Slash)?;
            let rhs = self.expect_number()?;
            let ref_name = self.expect_identifier()?.node;
            ratio = Some(Ratio { lhs, rhs, ref_name });
        }

        self.expect(&Token::Semicolon)?;
        Ok(NodeDecl {
            name,
            declared_width,
            ratio,
        })
    }

    fn expect_number(&mut self) -> Result<u64, Diagnostic> {
        let span = self.span();
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(n)
            }
            other => Err(Diagnostic::parse_error(
                "number".to_string(),
                other.describe(),
                span,
            )),
        }
    }

    /// `'{' stmt* '}'`
    fn parse_cycle_block(&mut self) -> Result<CycleAST, Diagnostic> {
        self.expect(&Token::LBrace)?;
        let stmts = self.parse_stmts()?;
        self.expect(&Token::RBrace)?;
        Ok(CycleAST { stmts })
    }

    fn parse_stmts(&mut self) -> Result<Vec<CycleStmt>, Diagnostic> {
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                Token::If => stmts.push(self.parse_if_stmt()?),
                Token::Identifier(_) | Token::Arrow | Token::Hyphen | Token::BackArrow => {
                    stmts.push(CycleStmt::Line(self.parse_line()?));
                }
                _ => break,
            }
        }
        Ok(stmts)
    }

    /// `'if' IDENT '{' stmt* '}' ('else' '{' stmt* '}')?`
    fn parse_if_stmt(&mut self) -> Result<CycleStmt, Diagnostic> {
        self.expect(&Token::If)?;
        let cond = self.expect_identifier()?;
        self.expect(&Token::LBrace)?;
        let then_branch = self.parse_stmts()?;
        self.expect(&Token::RBrace)?;
        let else_branch = if matches!(self.peek(), Token::Else) {
            self.advance();
            self.expect(&Token::LBrace)?;
            let stmts = self.parse_stmts()?;
            self.expect(&Token::RBrace)?;
            stmts
        } else {
            Vec::new()
        };
        Ok(CycleStmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    /// `IDENT? arrow ('|'? arrow)* ';'`
    ///
    /// An omitted source (line starting directly with an arrow token)
    /// inherits the previous line's source (branch continuation, §3).
    /// A line's single source fans out to every arrow that follows — the
    /// `|` separator is optional punctuation; writing arrows back to back
    /// with no separator means exactly the same thing (§3: "one or more
    /// arrows" sharing the line's source).
    fn parse_line(&mut self) -> Result<Line, Diagnostic> {
        let source = if matches!(self.peek(), Token::Identifier(_)) {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        let mut arrows = vec![self.parse_arrow()?];
        loop {
            if matches!(self.peek(), Token::Pipe) {
                self.advance();
                arrows.push(self.parse_arrow()?);
            } else if matches!(self.peek(), Token::Arrow | Token::Hyphen | Token::BackArrow) {
                arrows.push(self.parse_arrow()?);
            } else {
                break;
            }
        }
        self.expect(&Token::Semicolon)?;
        Ok(Line { source, arrows })
    }

    /// One of:
    ///   `'->' IDENT`                   plain forward
    ///   `'-' '(' IDENT ')' '->' IDENT`  named forward
    ///   `'<-' IDENT`                   plain backward (illegal, caught later)
    ///   `'<-' '(' IDENT ')' '-' IDENT`  named backward
    fn parse_arrow(&mut self) -> Result<ArrowAST, Diagnostic> {
        match self.peek() {
            Token::Arrow => {
                self.advance();
                let target = self.expect_identifier()?;
                Ok(ArrowAST {
                    target,
                    function: None,
                    backward: false,
                })
            }
            Token::Hyphen => {
                self.advance();
                self.expect(&Token::LParen)?;
                let function = self.expect_identifier()?.node;
                self.expect(&Token::RParen)?;
                self.expect(&Token::Arrow)?;
                let target = self.expect_identifier()?;
                Ok(ArrowAST {
                    target,
                    function: Some(function),
                    backward: false,
                })
            }
            Token::BackArrow => {
                self.advance();
                if matches!(self.peek(), Token::LParen) {
                    self.advance();
                    let function = self.expect_identifier()?.node;
                    self.expect(&Token::RParen)?;
                    self.expect(&Token::Hyphen)?;
                    let target = self.expect_identifier()?;
                    Ok(ArrowAST {
                        target,
                        function: Some(function),
                        backward: true,
                    })
                } else {
                    let target = self.expect_identifier()?;
                    Ok(ArrowAST {
                        target,
                        function: None,
                        backward: true,
                    })
                }
            }
            other => Err(Diagnostic::parse_error(
                "'->', '-(', '<-', or '<-('".to_string(),
                other.describe(),
                self.span(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::lexer::Lexer;

    fn parse(src: &str) -> Result<DeclarationsAST, Diagnostic> {
        let (tokens, diags) = Lexer::new(src).tokenize();
        assert!(diags.is_empty(), "{:?}", diags);
        Parser::new(tokens).parse_declarations()
    }

    #[test]
    fn parses_shaped_producer_and_consumer() {
        let ast = parse("producer img {784}; consumer label {10};").unwrap();
        assert_eq!(ast.producers[0].name.node, "img");
        assert_eq!(ast.producers[0].declared_width, Some(784));
        assert_eq!(ast.consumers[0].declared_width, Some(10));
    }

    #[test]
    fn parses_layer_ratio() {
        let ast = parse("layer hidden 1/2 img;").unwrap();
        let ratio = ast.layers[0].ratio.as_ref().unwrap();
        assert_eq!((ratio.lhs, ratio.rhs, ratio.ref_name.as_str()), (1, 2, "img"));
    }

    #[test]
    fn parses_plain_and_named_forward_arrows() {
        let ast = parse("cycle { img -> hidden -(relu)-> out; }").unwrap();
        let CycleStmt::Line(line) = &ast.cycle.unwrap().stmts[0] else {
            panic!("expected line");
        };
        assert_eq!(line.source.as_ref().unwrap().node, "img");
        assert_eq!(line.arrows.len(), 2);
        assert_eq!(line.arrows[1].function.as_deref(), Some("relu"));
    }

    #[test]
    fn parses_pipe_fanout() {
        let ast = parse("cycle { img -> a | -> b; }").unwrap();
        let CycleStmt::Line(line) = &ast.cycle.unwrap().stmts[0] else {
            panic!("expected line");
        };
        assert_eq!(line.arrows.len(), 2);
        assert_eq!(line.arrows[0].target.node, "a");
        assert_eq!(line.arrows[1].target.node, "b");
    }

    #[test]
    fn parses_omitted_source_continuation() {
        let ast = parse("cycle { img -> a; -> b; }").unwrap();
        let stmts = &ast.cycle.unwrap().stmts;
        let CycleStmt::Line(second) = &stmts[1] else {
            panic!("expected line");
        };
        assert!(second.source.is_none());
    }

    #[test]
    fn parses_named_backward_arrow() {
        let ast = parse("cycle { out <-(mse)- label; }").unwrap();
        let CycleStmt::Line(line) = &ast.cycle.unwrap().stmts[0] else {
            panic!("expected line");
        };
        assert!(line.arrows[0].backward);
        assert_eq!(line.arrows[0].function.as_deref(), Some("mse"));
    }

    #[test]
    fn parses_if_else_block() {
        let ast = parse("cycle { if gate { a -> b; } else { a -> c; } }").unwrap();
        let stmts = &ast.cycle.unwrap().stmts;
        match &stmts[0] {
            CycleStmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                assert_eq!(cond.node, "gate");
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.len(), 1);
            }
            _ => panic!("expected if statement"),
        }
    }

    #[test]
    fn missing_semicolon_is_parse_error() {
        let err = parse("producer p").unwrap_err();
        assert_eq!(err.message, "parse error: expected ';', found end of input");
    }
}
