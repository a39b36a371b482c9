//! Recursive-descent / Pratt parser.
//!
//! Turns the lexer's flat token stream into the AST of [`crate::ast`].
//! Precedence climbs `comparisons < + - < * /`, all left-associative. The
//! single top-level sequence of declarations and statements becomes the
//! body of a synthesized [`ast::MAIN_NAME`] function (spec §6), with
//! declarations and statements bucketed into `Body::decls`/`Body::stm_list`
//! independent of their order in the source — symbol collection (§4.2)
//! always walks `decls` before `stm_list` regardless.

use crate::ast::{
    self, BinOp, Body, Declaration, DeclarationFunction, DeclarationVariableInit, DeclarationVariableList,
    Expression, Function, NodeIdGen, Parameter, Program, Statement, StatementAssignment, StatementFor,
    StatementIfThenElse, StatementPrint, StatementReturn, StatementWhile, Type,
};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Token, TokenKind};

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    ids: NodeIdGen,
}

fn token_text(tok: &Token) -> String {
    if tok.kind == TokenKind::Eof {
        "EOF".to_string()
    } else {
        tok.lexeme.clone()
    }
}

fn type_of(kind: &TokenKind) -> Option<Type> {
    Some(match kind {
        TokenKind::TypeInt => Type::Int,
        TokenKind::TypeFloat => Type::Float,
        TokenKind::TypeBool => Type::Bool,
        TokenKind::TypeVoid => Type::Void,
        _ => return None,
    })
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let tok = self.peek().clone();
            Err(CompileError::syntax(tok.line, format!("Problem detected at '{}'.", token_text(&tok))))
        }
    }

    fn expect_identifier(&mut self) -> CompileResult<(String, usize)> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok((name.clone(), tok.line))
            }
            _ => Err(CompileError::syntax(tok.line, format!("Problem detected at '{}'.", token_text(&tok)))),
        }
    }

    fn parse_program(&mut self) -> CompileResult<Program> {
        let body = self.parse_body_until(&TokenKind::Eof)?;
        let main = Function {
            id: self.ids.next(),
            return_type: Type::Void,
            name: ast::MAIN_NAME.to_string(),
            params: Vec::new(),
            body,
            lineno: 1,
        };
        Ok(Program { main })
    }

    /// Parse declarations/statements until the token at `end` is seen
    /// (without consuming it).
    fn parse_body_until(&mut self, end: &TokenKind) -> CompileResult<Body> {
        let id = self.ids.next();
        let lineno = self.peek().line;
        let mut decls = Vec::new();
        let mut stm_list = Vec::new();
        while !self.check(end) {
            if type_of(&self.peek().kind).is_some() {
                decls.push(self.parse_declaration()?);
            } else {
                stm_list.push(self.parse_statement()?);
            }
        }
        Ok(Body {
            id,
            decls,
            stm_list,
            lineno,
        })
    }

    /// `{ ... }`, used by every nested block (function/if/while/for).
    fn parse_block(&mut self) -> CompileResult<Body> {
        self.expect(TokenKind::LBrace)?;
        let body = self.parse_body_until(&TokenKind::RBrace)?;
        self.expect(TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_declaration(&mut self) -> CompileResult<Declaration> {
        let type_tok = self.peek().clone();
        let ty = type_of(&type_tok.kind).expect("caller checked this is a type token");
        self.advance();
        let (name, lineno) = self.expect_identifier()?;

        if self.check(&TokenKind::LParen) {
            let params = self.parse_param_list()?;
            let body = self.parse_block()?;
            return Ok(Declaration::Function(DeclarationFunction {
                function: Function {
                    id: self.ids.next(),
                    return_type: ty,
                    name,
                    params,
                    body,
                    lineno,
                },
            }));
        }

        if self.check(&TokenKind::Assign) {
            self.advance();
            let init = self.parse_expression()?;
            self.expect(TokenKind::Semi)?;
            return Ok(Declaration::VariableInit(DeclarationVariableInit {
                ty,
                name,
                init,
                lineno,
            }));
        }

        let mut names = vec![name];
        while self.check(&TokenKind::Comma) {
            self.advance();
            let (next_name, _) = self.expect_identifier()?;
            names.push(next_name);
        }
        self.expect(TokenKind::Semi)?;
        Ok(Declaration::VariableList(DeclarationVariableList { ty, names, lineno }))
    }

    fn parse_param_list(&mut self) -> CompileResult<Vec<Parameter>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let type_tok = self.peek().clone();
                let ty = type_of(&type_tok.kind)
                    .ok_or_else(|| CompileError::syntax(type_tok.line, format!("Problem detected at '{}'.", token_text(&type_tok))))?;
                self.advance();
                let (name, lineno) = self.expect_identifier()?;
                params.push(Parameter { ty, name, lineno });
                if self.check(&TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_arg_list(&mut self) -> CompileResult<Vec<Expression>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if self.check(&TokenKind::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_statement(&mut self) -> CompileResult<Statement> {
        match &self.peek().kind {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Print => self.parse_print(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Identifier(_) => self.parse_assignment(TokenKind::Semi).map(Statement::Assignment),
            // None of these start a real statement form, but a leading
            // integer/float/parenthesized expression is parsed anyway
            // before reporting it: a malformed expression here (spec §8
            // N3: `1 + ;`) should surface the inner syntax error at the
            // token that actually broke the grammar (the missing operand
            // before `;`), not at the expression's leading token.
            TokenKind::Integer(_) | TokenKind::Float(_) | TokenKind::LParen => {
                let tok = self.peek().clone();
                self.parse_expression()?;
                Err(CompileError::syntax(tok.line, format!("Problem detected at '{}'.", token_text(&tok))))
            }
            _ => {
                let tok = self.peek().clone();
                Err(CompileError::syntax(tok.line, format!("Problem detected at '{}'.", token_text(&tok))))
            }
        }
    }

    /// `name = expr`, terminated by whatever `terminator` is
    /// (`;` for an ordinary statement, `)` for a `for` header's last clause).
    fn parse_assignment(&mut self, terminator: TokenKind) -> CompileResult<StatementAssignment> {
        let (lhs, lineno) = self.expect_identifier()?;
        self.expect(TokenKind::Assign)?;
        let rhs = self.parse_expression()?;
        self.expect(terminator)?;
        Ok(StatementAssignment { lhs, rhs, lineno })
    }

    fn parse_if(&mut self) -> CompileResult<Statement> {
        let lineno = self.advance().line;
        self.expect(TokenKind::LParen)?;
        let exp = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let then = self.parse_block()?;
        let els = if self.check(&TokenKind::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Statement::IfThenElse(StatementIfThenElse {
            id: self.ids.next(),
            exp,
            then,
            els,
            lineno,
        }))
    }

    fn parse_while(&mut self) -> CompileResult<Statement> {
        let lineno = self.advance().line;
        self.expect(TokenKind::LParen)?;
        let exp = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(Statement::While(StatementWhile {
            id: self.ids.next(),
            exp,
            body,
            lineno,
        }))
    }

    fn parse_for(&mut self) -> CompileResult<Statement> {
        let lineno = self.advance().line;
        self.expect(TokenKind::LParen)?;

        let type_tok = self.peek().clone();
        let ty = type_of(&type_tok.kind)
            .ok_or_else(|| CompileError::syntax(type_tok.line, format!("Problem detected at '{}'.", token_text(&type_tok))))?;
        self.advance();
        let (name, iter_lineno) = self.expect_identifier()?;
        self.expect(TokenKind::Assign)?;
        let init = self.parse_expression()?;
        let iter = DeclarationVariableInit {
            ty,
            name,
            init,
            lineno: iter_lineno,
        };
        self.expect(TokenKind::Semi)?;

        let exp = self.parse_expression()?;
        self.expect(TokenKind::Semi)?;

        let assign = self.parse_assignment(TokenKind::RParen)?;
        let body = self.parse_block()?;

        Ok(Statement::For(StatementFor {
            id: self.ids.next(),
            iter,
            exp,
            assign,
            body,
            lineno,
        }))
    }

    fn parse_print(&mut self) -> CompileResult<Statement> {
        let lineno = self.advance().line;
        self.expect(TokenKind::LParen)?;
        let exp = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semi)?;
        Ok(Statement::Print(StatementPrint { exp, lineno }))
    }

    fn parse_return(&mut self) -> CompileResult<Statement> {
        let lineno = self.advance().line;
        if self.check(&TokenKind::Semi) {
            self.advance();
            return Ok(Statement::Return(StatementReturn { exp: None, lineno }));
        }
        let exp = self.parse_expression()?;
        self.expect(TokenKind::Semi)?;
        Ok(Statement::Return(StatementReturn { exp: Some(exp), lineno }))
    }

    fn parse_expression(&mut self) -> CompileResult<Expression> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> CompileResult<Expression> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Ne => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Ge => BinOp::Ge,
                _ => break,
            };
            let lineno = self.advance().line;
            let rhs = self.parse_additive()?;
            lhs = Expression::Binop {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                lineno,
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> CompileResult<Expression> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let lineno = self.advance().line;
            let rhs = self.parse_multiplicative()?;
            lhs = Expression::Binop {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                lineno,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> CompileResult<Expression> {
        let mut lhs = self.parse_primary()?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            let lineno = self.advance().line;
            let rhs = self.parse_primary()?;
            lhs = Expression::Binop {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                lineno,
            };
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> CompileResult<Expression> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expression::Integer { value, lineno: tok.line })
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expression::Float { value, lineno: tok.line })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_arg_list()?;
                    Ok(Expression::Call {
                        name,
                        args,
                        lineno: tok.line,
                    })
                } else {
                    Ok(Expression::Identifier { name, lineno: tok.line })
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            _ => Err(CompileError::syntax(tok.line, format!("Problem detected at '{}'.", token_text(&tok)))),
        }
    }
}

/// Parse a complete Panda token stream into a [`Program`].
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        ids: NodeIdGen::new(),
    };
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(src: &str) -> CompileResult<Program> {
        parse(tokenize(src)?)
    }

    #[test]
    fn arithmetic_precedence_nests_multiplication_under_addition() {
        let program = parse_source("print(1+2*3);").unwrap();
        let Statement::Print(p) = &program.main.body.stm_list[0] else {
            panic!("expected print statement");
        };
        let Expression::Binop { op: BinOp::Add, rhs, .. } = &p.exp else {
            panic!("expected top-level addition");
        };
        assert!(matches!(**rhs, Expression::Binop { op: BinOp::Mul, .. }));
    }

    #[test]
    fn declarations_and_statements_bucket_separately() {
        let program = parse_source("int x = 3; int y = 4; if (x < y) { print(x); } else { print(y); }").unwrap();
        assert_eq!(program.main.body.decls.len(), 2);
        assert_eq!(program.main.body.stm_list.len(), 1);
    }

    #[test]
    fn nested_function_declaration_parses() {
        let program = parse_source(
            "int outer() { int a; a = 7; int inner() { return a + 1; } return inner(); } print(outer());",
        )
        .unwrap();
        assert_eq!(program.main.body.decls.len(), 1);
        let Declaration::Function(outer) = &program.main.body.decls[0] else {
            panic!("expected function declaration");
        };
        assert_eq!(outer.function.name, "outer");
        assert_eq!(outer.function.body.decls.len(), 1);
    }

    #[test]
    fn for_loop_header_parses_without_trailing_semicolons() {
        let program = parse_source("for (int i = 0; i < 3; i = i + 1) { print(i*i); }").unwrap();
        let Statement::For(f) = &program.main.body.stm_list[0] else {
            panic!("expected for statement");
        };
        assert_eq!(f.iter.name, "i");
        assert_eq!(f.assign.lhs, "i");
    }

    #[test]
    fn missing_operand_reports_syntax_error_with_offending_token() {
        let err = parse_source("1 + ;").unwrap_err();
        assert_eq!(err.phase, crate::error::Phase::Syntax);
        assert_eq!(err.line, 1);
        assert!(err.message.contains("';'"));
    }

    #[test]
    fn duplicate_declaration_is_not_a_parser_concern() {
        // Parsing never rejects a redeclared name; §4.2 does.
        let program = parse_source("int x; int x;").unwrap();
        assert_eq!(program.main.body.decls.len(), 2);
    }
}
