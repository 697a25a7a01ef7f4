//! Recursive descent parser for the script language
//!
//! Precedence, loosest first: assignment, arrow, conditional, `??`, `||`,
//! `&&`, equality, relational, additive, multiplicative, unary, postfix,
//! call/member, primary. Semicolons are optional.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::ast::*;
use super::lexer::{Tok, Token};
use super::SandboxError;
use std::sync::Arc;

type ParseResult<T> = Result<T, SandboxError>;

/// Words that cannot name a binding
const RESERVED: &[&str] = &[
    "let", "const", "var", "if", "else", "while", "for", "of", "break", "continue", "return",
    "throw", "true", "false", "null", "undefined", "typeof", "function", "new", "class", "this",
    "import", "export", "async", "await", "yield", "delete", "in", "instanceof", "do", "switch",
    "try", "catch", "finally", "with",
];

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    max_nesting: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, max_nesting: usize) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            max_nesting,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut body = Vec::new();
        while !self.at(&Tok::Eof) {
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    // Token helpers

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn peek_tok(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.position + offset).map(|t| &t.tok)
    }

    fn at(&self, tok: &Tok) -> bool {
        self.current().tok == *tok
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek_tok(0), Some(Tok::Ident(name)) if name == word)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.current().tok.clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek_tok(0) == Some(tok) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> ParseResult<()> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> SandboxError {
        let token = self.current();
        let found = match &token.tok {
            Tok::Eof => "end of input".to_string(),
            Tok::Ident(name) => format!("'{}'", name),
            Tok::Str(_) => "string".to_string(),
            Tok::Number(n) => format!("number {}", n),
            other => format!("{:?}", other),
        };
        SandboxError::Syntax {
            message: format!("expected {}, found {}", expected, found),
            position: token.position,
        }
    }

    fn binding_name(&mut self) -> ParseResult<String> {
        match self.peek_tok(0) {
            Some(Tok::Ident(name)) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.position += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= self.max_nesting {
            return Err(SandboxError::Syntax {
                message: format!("nesting exceeds {} levels", self.max_nesting),
                position: self.current().position,
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn end_statement(&mut self) {
        self.eat(&Tok::Semicolon);
    }

    // Statements

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> ParseResult<Stmt> {
        if self.eat(&Tok::Semicolon) {
            return Ok(Stmt::Empty);
        }
        if self.at(&Tok::LBrace) {
            self.advance();
            return Ok(Stmt::Block(self.block_rest()?));
        }
        if let Some(Tok::Ident(word)) = self.peek_tok(0) {
            match word.as_str() {
                "let" | "var" | "const" => {
                    let declaration = self.declaration()?;
                    self.end_statement();
                    return Ok(declaration);
                }
                "if" => return self.if_statement(),
                "while" => return self.while_statement(),
                "for" => return self.for_statement(),
                "break" => {
                    self.advance();
                    self.end_statement();
                    return Ok(Stmt::Break);
                }
                "continue" => {
                    self.advance();
                    self.end_statement();
                    return Ok(Stmt::Continue);
                }
                "return" => {
                    self.advance();
                    let ends = [Tok::Semicolon, Tok::RBrace, Tok::Eof];
                    let argument = if ends.iter().any(|t| self.at(t)) {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.end_statement();
                    return Ok(Stmt::Return(argument));
                }
                "throw" => {
                    self.advance();
                    let argument = self.expression()?;
                    self.end_statement();
                    return Ok(Stmt::Throw(argument));
                }
                "function" | "class" | "new" | "import" | "export" | "async" | "await"
                | "try" | "switch" | "do" | "with" | "delete" => {
                    let position = self.current().position;
                    return Err(SandboxError::Syntax {
                        message: format!("'{}' is not supported in scripts", word),
                        position,
                    });
                }
                _ => {}
            }
        }
        let expr = self.expression()?;
        self.end_statement();
        Ok(Stmt::Expr(expr))
    }

    /// Statements up to and including the closing `}`
    fn block_rest(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while !self.eat(&Tok::RBrace) {
            if self.at(&Tok::Eof) {
                return Err(self.unexpected("'}'"));
            }
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn declaration(&mut self) -> ParseResult<Stmt> {
        let mutable = !matches!(self.advance(), Tok::Ident(ref w) if w == "const");
        let mut declarations = Vec::new();
        loop {
            let name = self.binding_name()?;
            let init = if self.eat(&Tok::Assign) {
                Some(self.assignment()?)
            } else if !mutable {
                return Err(self.unexpected("'=' in const declaration"));
            } else {
                None
            };
            declarations.push((name, init));
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        Ok(Stmt::Declare {
            declarations,
            mutable,
        })
    }

    fn parenthesized(&mut self) -> ParseResult<Expr> {
        self.expect(Tok::LParen, "'('")?;
        let expr = self.expression()?;
        self.expect(Tok::RParen, "')'")?;
        Ok(expr)
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let test = self.parenthesized()?;
        let consequent = Box::new(self.statement()?);
        let alternate = if self.eat_keyword("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn while_statement(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let test = self.parenthesized()?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { test, body })
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.expect(Tok::LParen, "'('")?;

        // for (const x of items)
        if matches!(self.peek_tok(0), Some(Tok::Ident(w)) if w == "let" || w == "const" || w == "var")
            && matches!(self.peek_tok(2), Some(Tok::Ident(w)) if w == "of")
        {
            let mutable = !self.at_keyword("const");
            self.advance();
            let binding = self.binding_name()?;
            self.advance();
            let iterable = self.expression()?;
            self.expect(Tok::RParen, "')'")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::ForOf {
                binding,
                mutable,
                iterable,
                body,
            });
        }

        let init = if self.eat(&Tok::Semicolon) {
            None
        } else {
            let declares = ["let", "var", "const"].iter().any(|w| self.at_keyword(w));
            let init = if declares {
                self.declaration()?
            } else {
                Stmt::Expr(self.expression()?)
            };
            self.expect(Tok::Semicolon, "';'")?;
            Some(Box::new(init))
        };
        let test = if self.at(&Tok::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(Tok::Semicolon, "';'")?;
        let update = if self.at(&Tok::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(Tok::RParen, "')'")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    // Expressions

    fn expression(&mut self) -> ParseResult<Expr> {
        self.nested(Self::assignment)
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }

        let target = self.conditional()?;
        let op = match self.peek_tok(0) {
            Some(Tok::Assign) => None,
            Some(Tok::PlusAssign) => Some(BinaryOp::Add),
            Some(Tok::MinusAssign) => Some(BinaryOp::Sub),
            Some(Tok::StarAssign) => Some(BinaryOp::Mul),
            Some(Tok::SlashAssign) => Some(BinaryOp::Div),
            Some(Tok::PercentAssign) => Some(BinaryOp::Rem),
            _ => return Ok(target),
        };
        if !target.is_assignable() {
            return Err(SandboxError::Syntax {
                message: "invalid assignment target".to_string(),
                position: self.current().position,
            });
        }
        self.advance();
        let value = self.nested(Self::assignment)?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    /// Parses `x => ...` or `(a, b) => ...` when the tokens ahead form one
    fn try_arrow(&mut self) -> ParseResult<Option<Expr>> {
        let params = match (self.peek_tok(0), self.peek_tok(1)) {
            (Some(Tok::Ident(_)), Some(Tok::Arrow)) => {
                let name = self.binding_name()?;
                vec![name]
            }
            (Some(Tok::LParen), _) if self.parenthesis_is_arrow_head() => {
                self.advance();
                let mut params = Vec::new();
                while !self.eat(&Tok::RParen) {
                    params.push(self.binding_name()?);
                    if !self.eat(&Tok::Comma) {
                        self.expect(Tok::RParen, "')'")?;
                        break;
                    }
                }
                params
            }
            _ => return Ok(None),
        };
        self.expect(Tok::Arrow, "'=>'")?;
        let body = if self.eat(&Tok::LBrace) {
            ArrowBody::Block(self.nested(Self::block_rest)?)
        } else {
            ArrowBody::Expr(self.nested(Self::assignment)?)
        };
        Ok(Some(Expr::Arrow {
            params,
            body: Arc::new(body),
        }))
    }

    fn parenthesis_is_arrow_head(&self) -> bool {
        let mut offset = 1;
        loop {
            match self.peek_tok(offset) {
                Some(Tok::Ident(_)) | Some(Tok::Comma) => offset += 1,
                Some(Tok::RParen) => return self.peek_tok(offset + 1) == Some(&Tok::Arrow),
                _ => return false,
            }
        }
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let test = self.nullish()?;
        if !self.eat(&Tok::Question) {
            return Ok(test);
        }
        let consequent = self.nested(Self::assignment)?;
        self.expect(Tok::Colon, "':'")?;
        let alternate = self.nested(Self::assignment)?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn logical_level(
        &mut self,
        tok: Tok,
        op: LogicalOp,
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;
        while self.eat(&tok) {
            let right = next(self)?;
            left = Expr::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn nullish(&mut self) -> ParseResult<Expr> {
        self.logical_level(Tok::Nullish, LogicalOp::Nullish, Self::or)
    }

    fn or(&mut self) -> ParseResult<Expr> {
        self.logical_level(Tok::OrOr, LogicalOp::Or, Self::and)
    }

    fn and(&mut self) -> ParseResult<Expr> {
        self.logical_level(Tok::AndAnd, LogicalOp::And, Self::equality)
    }

    fn binary_level(
        &mut self,
        table: &[(Tok, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (tok, op) in table {
                if self.eat(tok) {
                    let right = next(self)?;
                    left = Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (Tok::StrictEq, BinaryOp::StrictEq),
                (Tok::StrictNotEq, BinaryOp::StrictNotEq),
                (Tok::Eq, BinaryOp::Eq),
                (Tok::NotEq, BinaryOp::NotEq),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (Tok::Lt, BinaryOp::Lt),
                (Tok::Le, BinaryOp::Le),
                (Tok::Gt, BinaryOp::Gt),
                (Tok::Ge, BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[(Tok::Plus, BinaryOp::Add), (Tok::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        self.binary_level(
            &[
                (Tok::Star, BinaryOp::Mul),
                (Tok::Slash, BinaryOp::Div),
                (Tok::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_tok(0) {
            Some(Tok::Bang) => UnaryOp::Not,
            Some(Tok::Minus) => UnaryOp::Neg,
            Some(Tok::Plus) => UnaryOp::Plus,
            Some(Tok::Ident(w)) if w == "typeof" => UnaryOp::TypeOf,
            Some(Tok::PlusPlus) | Some(Tok::MinusMinus) => {
                let increment = self.advance() == Tok::PlusPlus;
                let target = self.nested(Self::unary)?;
                if !target.is_assignable() {
                    return Err(self.unexpected("assignable operand"));
                }
                return Ok(Expr::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                });
            }
            _ => return self.postfix(),
        };
        self.advance();
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let expr = self.call_member()?;
        let increment = match self.peek_tok(0) {
            Some(Tok::PlusPlus) => true,
            Some(Tok::MinusMinus) => false,
            _ => return Ok(expr),
        };
        if !expr.is_assignable() {
            return Ok(expr);
        }
        self.advance();
        Ok(Expr::Update {
            increment,
            prefix: false,
            target: Box::new(expr),
        })
    }

    fn call_member(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Tok::Dot) {
                let property = match self.advance() {
                    Tok::Ident(name) => name,
                    _ => {
                        self.position -= 1;
                        return Err(self.unexpected("property name"));
                    }
                };
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                };
            } else if self.eat(&Tok::LBracket) {
                let index = self.expression()?;
                self.expect(Tok::RBracket, "']'")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(&Tok::LParen) {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat(&Tok::RParen) {
            args.push(self.expression()?);
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RParen, "')' after arguments")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let position = self.current().position;
        match self.advance() {
            Tok::Number(n) => Ok(Expr::Number(n)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::LParen => {
                let expr = self.expression()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(expr)
            }
            Tok::LBracket => self.nested(Self::array_literal),
            Tok::LBrace => self.nested(Self::object_literal),
            Tok::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                word if RESERVED.contains(&word) => Err(SandboxError::Syntax {
                    message: format!("unexpected keyword '{}'", word),
                    position,
                }),
                _ => Ok(Expr::Ident(name)),
            },
            _ => {
                self.position -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }

    fn array_literal(&mut self) -> ParseResult<Expr> {
        let mut items = Vec::new();
        while !self.eat(&Tok::RBracket) {
            items.push(self.expression()?);
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RBracket, "']'")?;
                break;
            }
        }
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> ParseResult<Expr> {
        let mut entries = Vec::new();
        while !self.eat(&Tok::RBrace) {
            let key = match self.advance() {
                Tok::Ident(name) | Tok::Str(name) => name,
                Tok::Number(n) => super::value::number_to_key(n),
                _ => {
                    self.position -= 1;
                    return Err(self.unexpected("property key"));
                }
            };
            let value = if self.eat(&Tok::Colon) {
                self.expression()?
            } else {
                // shorthand `{ name }`
                Expr::Ident(key.clone())
            };
            entries.push((key, value));
            if !self.eat(&Tok::Comma) {
                self.expect(Tok::RBrace, "'}'")?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::lexer::tokenize;

    fn parse(source: &str) -> ParseResult<Program> {
        Parser::new(tokenize(source)?, 64).parse_program()
    }

    fn expr(source: &str) -> Expr {
        match parse(source).unwrap().body.into_iter().next() {
            Some(Stmt::Expr(e)) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            expr("1 + 2 * 3"),
            Expr::Binary {
                op: BinaryOp::Add,
                left: Box::new(Expr::Number(1.0)),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: Box::new(Expr::Number(2.0)),
                    right: Box::new(Expr::Number(3.0)),
                }),
            }
        );
        assert!(matches!(expr("a ?? b || c"), Expr::Logical { op: LogicalOp::Nullish, .. }));
        assert!(matches!(expr("a ? b : c ? d : e"), Expr::Conditional { .. }));
    }

    #[test]
    fn test_member_chains_and_calls() {
        match expr("value.trim().split(',')[0]") {
            Expr::Index { object, .. } => assert!(matches!(*object, Expr::Call { .. })),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_statements() {
        let program = parse(
            "let total = 0\n\
             for (let i = 0; i < 3; i++) { total += i }\n\
             for (const x of [1, 2]) total += x;\n\
             if (total > 3) return total; else return 0",
        )
        .unwrap();
        assert_eq!(program.body.len(), 4);
        assert!(matches!(program.body[2], Stmt::ForOf { mutable: false, .. }));
    }

    #[test]
    fn test_arrow_functions() {
        assert!(matches!(expr("x => x * 2"), Expr::Arrow { ref params, .. } if params == &["x"]));
        assert!(matches!(expr("(a, b) => { return a + b }"), Expr::Arrow { ref params, .. } if params.len() == 2));
        assert!(matches!(expr("(a)"), Expr::Ident(_)));
    }

    #[test]
    fn test_object_literal_keys() {
        match expr("({ a: 1, 'b c': 2, d })") {
            Expr::Object(entries) => {
                let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b c", "d"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("let = 3").is_err());
        assert!(parse("const x;").is_err());
        assert!(parse("1 = 2").is_err());
        assert!(parse("if (x { }").is_err());
        assert!(parse("function f() {}").is_err());
        assert!(parse("new Date()").is_err());
        assert!(parse("{").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        match parse(&deep) {
            Err(SandboxError::Syntax { message, .. }) => assert!(message.contains("nesting")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse(&format!("{}1{}", "(".repeat(10), ")".repeat(10))).is_ok());
    }
}
