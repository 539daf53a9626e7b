use std::sync::Arc;

use crate::{lexer::prelude::{char_stream, Lexeme, Lexer, Token}, utils::prelude::SrcSpan};
use super::error::{ParseError, ParseErrorType};
use super::ast::{Arg, BinOp, FuncDef, IfCase, LoadKind, Module, Node, Number, Param, UnaryOp};

pub trait Parse
    where Self: Sized,
{
    fn parse(parser: &mut Parser) -> Result<Self, ParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum Precedence {
    Lowest,
    Logic,
    Comparison,
    Sum,
    Product,
    Prefix,
    Index,
    Power,
    Call
}

impl From<&Token> for Precedence {
    fn from(value: &Token) -> Self {
        match value {
            Token::And | Token::Or => Self::Logic,
            Token::EqEq | Token::NotEq | Token::Lt | Token::Gt |
            Token::LtEq | Token::GtEq => Self::Comparison,
            Token::Plus | Token::Minus => Self::Sum,
            Token::Mul | Token::Div | Token::FloorDiv | Token::Mod => Self::Product,
            Token::Dollar => Self::Index,
            Token::Pow => Self::Power,
            Token::LParen | Token::Dot => Self::Call,
            _ => Self::Lowest,
        }
    }
}

const EXPRESSION_START: &[&str] = &[
    "int", "float", "string", "identifier", "'+'", "'-'", "'('", "'['", "'{'",
    "'if'", "'for'", "'while'", "'defun'", "'not'",
];

pub struct Parser {
    tokens: Vec<Lexeme>,
    position: usize,
    /// Error of the statement that could not start, if the last statement
    /// list ended on one.
    unmatched: Option<ParseError>,
}

impl Parser {
    /// `tokens` must end with [`Token::Eof`], as every lexer output does.
    pub fn new(mut tokens: Vec<Lexeme>) -> Self {
        if !matches!(tokens.last(), Some(Lexeme { token: Token::Eof, .. })) {
            let end = tokens.last().map_or(0, |lexeme| lexeme.span.end);
            tokens.push(Lexeme::new(Token::Eof, SrcSpan::from(end, end)));
        }

        Self {
            tokens,
            position: 0,
            unmatched: None,
        }
    }

    pub fn current(&self) -> &Lexeme {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    pub fn token(&self) -> &Token {
        &self.current().token
    }

    fn peek(&self, offset: usize) -> &Lexeme {
        &self.tokens[(self.position + offset).min(self.tokens.len() - 1)]
    }

    fn previous_end(&self) -> u32 {
        match self.position {
            0 => self.current().span.start,
            n => self.tokens[n - 1].span.end,
        }
    }

    fn span_from(&self, start: SrcSpan) -> SrcSpan {
        SrcSpan::from(start.start, self.previous_end().max(start.end))
    }

    pub fn step(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn is(&self, token: &Token) -> bool {
        self.token() == token
    }

    pub fn skip_newline(&mut self) -> usize {
        let mut count = 0;
        while self.is(&Token::Newline) {
            self.step();
            count += 1;
        }
        count
    }

    pub fn current_precedence(&self) -> Precedence {
        Precedence::from(self.token())
    }

    pub fn expect_one(&mut self, token: Token) -> Result<SrcSpan, ParseError> {
        if self.is(&token) {
            let span = self.current().span;
            self.step();
            Ok(span)
        } else {
            self.unexpected(&[&format!("'{}'", token.as_literal())])
        }
    }

    pub fn expect_ident(&mut self) -> Result<(String, SrcSpan), ParseError> {
        match self.current().clone() {
            Lexeme { token: Token::Ident(name), span, .. } => {
                self.step();
                Ok((name, span))
            },
            Lexeme { span, .. } => parse_error(ParseErrorType::ExpectedIdent, span),
        }
    }

    fn unexpected<T>(&self, expected: &[&str]) -> Result<T, ParseError> {
        parse_error(
            ParseErrorType::UnexpectedToken {
                token: self.token().clone(),
                expected: expected.iter().map(|s| s.to_string()).collect(),
            },
            self.current().span
        )
    }

    /// Runs `production` speculatively. A failure that consumed no tokens
    /// rewinds and yields `Ok(None)` so the caller can try something else;
    /// a failure after progress is returned as is.
    pub fn attempt<T>(
        &mut self,
        production: impl FnOnce(&mut Self) -> Result<T, ParseError>
    ) -> Result<Option<T>, ParseError> {
        let start = self.position;

        match production(self) {
            Ok(node) => Ok(Some(node)),
            Err(err) if self.position == start => {
                self.unmatched = Some(err);
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }

    pub fn parse(&mut self) -> Result<Module, ParseError> {
        let start = self.current().span;
        let statements = self.statements()?;
        self.skip_newline();

        if !self.is(&Token::Eof) {
            if let Some(err) = self.unmatched.take() {
                return Err(err);
            }

            return parse_error(
                ParseErrorType::TrailingTokens { token: self.token().clone() },
                self.current().span
            );
        }

        Ok(Module {
            name: "".into(),
            location: self.span_from(start),
            statements,
        })
    }

    /// Newline separated statements up to the first one that cannot start.
    pub fn statements(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut statements = vec![];
        self.unmatched = None;

        loop {
            let newlines = self.skip_newline();
            if !statements.is_empty() && newlines == 0 {
                break;
            }

            match self.attempt(Self::statement)? {
                Some(statement) => {
                    statements.push(statement);
                    self.unmatched = None;
                },
                None => break,
            }
        }

        Ok(statements)
    }

    pub fn statement(&mut self) -> Result<Node, ParseError> {
        let start = self.current().span;

        match self.token() {
            Token::Return => {
                self.step();
                let value = match self.token() {
                    Token::Newline | Token::Eof | Token::Done | Token::Elif | Token::Else | Token::RParen => None,
                    _ => Some(Box::new(self.expr()?)),
                };
                Ok(Node::Return { value, location: self.span_from(start) })
            },
            Token::Continue => {
                self.step();
                Ok(Node::Continue { location: start })
            },
            Token::Break => {
                self.step();
                Ok(Node::Break { location: start })
            },
            _ => self.expr(),
        }
    }

    pub fn expr(&mut self) -> Result<Node, ParseError> {
        match self.token() {
            Token::Let => self.let_expr(),
            Token::Load => self.load_expr(),
            Token::Using => self.using_expr(),
            Token::Del => self.del_expr(),
            _ => {
                let node = self.parse_expression(Precedence::Lowest)?;

                if !self.is(&Token::Eq) {
                    return Ok(node);
                }

                match node {
                    Node::BinOp { left, op: BinOp::Index, right, location } => {
                        self.step();
                        self.skip_newline();
                        let value = self.expr()?;

                        Ok(Node::IndexAssign {
                            target: left,
                            index: right,
                            value: Box::new(value),
                            location: self.span_from(location),
                        })
                    },
                    _ => parse_error(ParseErrorType::InvalidAssignmentTarget, self.current().span),
                }
            },
        }
    }

    fn let_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::Let)?;
        let (name, _) = self.expect_ident()?;

        match self.token() {
            Token::Eq => {
                self.step();
                self.skip_newline();
                let value = self.assigned_value(&name)?;

                Ok(Node::VarAssign { name, value: Box::new(value), location: self.span_from(start) })
            },
            Token::As => {
                self.step();
                let (alias, _) = self.expect_ident()?;

                Ok(Node::Alias { name, alias, location: self.span_from(start) })
            },
            Token::Comma => {
                let mut names = vec![name];
                while self.is(&Token::Comma) {
                    self.step();
                    names.push(self.expect_ident()?.0);
                }
                self.expect_one(Token::Eq)?;
                self.skip_newline();
                let value = self.expr()?;

                Ok(Node::MultiAssign { names, value: Box::new(value), location: self.span_from(start) })
            },
            _ => self.unexpected(&["'='", "'as'", "','"]),
        }
    }

    /// Right-hand side of `let name = ...`. A rewritten `name op= rhs` takes
    /// the whole `rhs` as the operator's second operand.
    fn assigned_value(&mut self, name: &str) -> Result<Node, ParseError> {
        let augmented_op = match (self.token(), self.peek(1)) {
            (Token::Ident(ident), op) if ident == name && op.augmented => BinOp::from_token(&op.token),
            _ => None,
        };

        let Some(op) = augmented_op else {
            return self.expr();
        };

        let target = self.current().span;
        self.step();
        self.step();
        self.skip_newline();
        let right = self.expr()?;

        Ok(Node::BinOp {
            left: Box::new(Node::VarAccess { name: name.to_string(), location: target }),
            op,
            right: Box::new(right),
            location: self.span_from(target),
        })
    }

    fn load_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::Load)?;

        let path = match self.current().clone() {
            Lexeme { token: Token::Str(path), .. } => path,
            _ => return parse_error(ParseErrorType::Expected { what: "string".into() }, self.current().span),
        };

        let kind = if path.starts_with("libs.") {
            LoadKind::Libs
        } else if path.starts_with("local.") {
            LoadKind::Local
        } else {
            return parse_error(ParseErrorType::InvalidLoadPath { path }, self.current().span);
        };
        self.step();

        Ok(Node::Load { path, kind, location: self.span_from(start) })
    }

    fn using_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::Using)?;
        let parent = self.is(&Token::Parent);
        if parent {
            self.step();
        }

        let names = self.name_list()?;
        Ok(Node::Using { names, parent, location: self.span_from(start) })
    }

    fn del_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::Del)?;
        let names = self.name_list()?;

        Ok(Node::Del { names, location: self.span_from(start) })
    }

    fn name_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut names = vec![self.expect_ident()?.0];
        while self.is(&Token::Comma) {
            self.step();
            names.push(self.expect_ident()?.0);
        }
        Ok(names)
    }

    pub fn parse_expression(&mut self, precedence: Precedence) -> Result<Node, ParseError> {
        let mut left = self.prefix()?;

        while precedence < self.current_precedence() {
            left = self.infix(left)?;
        }

        Ok(left)
    }

    fn prefix(&mut self) -> Result<Node, ParseError> {
        let Lexeme { token, span, .. } = self.current().clone();

        match token {
            Token::Int(value) => {
                self.step();
                Ok(Node::Number { value: Number::Int(value), location: span })
            },
            Token::Float(value) => {
                self.step();
                Ok(Node::Number { value: Number::Float(value), location: span })
            },
            Token::Str(value) => {
                self.step();
                Ok(Node::Str { value, location: span })
            },
            Token::Ident(name) => {
                self.step();
                Ok(Node::VarAccess { name, location: span })
            },
            Token::Plus | Token::Minus | Token::Not => {
                self.step();
                let (op, operand_precedence) = match token {
                    Token::Plus => (UnaryOp::Plus, Precedence::Prefix),
                    Token::Minus => (UnaryOp::Minus, Precedence::Prefix),
                    _ => (UnaryOp::Not, Precedence::Logic),
                };
                let operand = self.parse_expression(operand_precedence)?;

                Ok(Node::Unary { op, operand: Box::new(operand), location: self.span_from(span) })
            },
            Token::LParen => {
                self.step();
                self.skip_newline();
                let node = self.expr()?;
                self.skip_newline();
                self.expect_one(Token::RParen)?;
                Ok(node)
            },
            Token::LSquare => self.list_expr(),
            Token::LBrace => self.map_expr(),
            Token::If => self.if_expr(),
            Token::For => self.for_expr(),
            Token::While => self.while_expr(),
            Token::At | Token::Async | Token::Defun => Ok(Node::FuncDef(Arc::new(FuncDef::parse(self)?))),
            Token::Namespace => self.namespace_expr(),
            Token::Await => {
                self.step();
                let value = self.parse_expression(Precedence::Power)?;
                Ok(Node::Await { value: Box::new(value), location: self.span_from(span) })
            },
            Token::Let | Token::Load | Token::Using | Token::Del => self.expr(),
            _ => self.unexpected(EXPRESSION_START),
        }
    }

    fn infix(&mut self, left: Node) -> Result<Node, ParseError> {
        let start = left.location();

        match self.token().clone() {
            Token::LParen => {
                self.step();
                let mut args = vec![];
                while !self.is(&Token::RParen) {
                    args.push(Arg::parse(self)?);
                    if !self.is(&Token::Comma) {
                        break;
                    }
                    self.step();
                }
                self.expect_one(Token::RParen)?;

                Ok(Node::Call { callee: Box::new(left), args, location: self.span_from(start) })
            },
            Token::Dot => {
                self.step();
                let (name, _) = self.expect_ident()?;

                Ok(Node::Member { object: Box::new(left), name, location: self.span_from(start) })
            },
            token => {
                let Some(op) = BinOp::from_token(&token) else {
                    return self.unexpected(&["an operator"]);
                };
                let precedence = Precedence::from(&token);
                self.step();
                self.skip_newline();

                // `^` is right associative
                let right = match op {
                    BinOp::Pow => self.parse_expression(Precedence::Index)?,
                    _ => self.parse_expression(precedence)?,
                };

                Ok(Node::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                    location: self.span_from(start),
                })
            },
        }
    }

    fn list_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::LSquare)?;
        let mut elements = vec![];

        while !self.is(&Token::RSquare) {
            elements.push(self.expr()?);
            if !self.is(&Token::Comma) {
                break;
            }
            self.step();
        }
        self.expect_one(Token::RSquare)?;

        Ok(Node::List { elements, location: self.span_from(start) })
    }

    fn map_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::LBrace)?;
        let mut entries = vec![];

        while !self.is(&Token::RBrace) {
            let key = self.expr()?;
            self.expect_one(Token::Colon)?;
            let value = self.expr()?;
            entries.push((key, value));

            if !self.is(&Token::Comma) {
                break;
            }
            self.step();
        }
        self.expect_one(Token::RBrace)?;

        Ok(Node::Map { entries, location: self.span_from(start) })
    }

    /// Body after `do`: a single statement, or a newline followed by a
    /// statement list. The flag tells which form was found.
    fn clause_body(&mut self) -> Result<(Node, bool), ParseError> {
        if self.is(&Token::Newline) {
            let start = self.current().span;
            let statements = self.statements()?;
            Ok((Node::Block { statements, location: self.span_from(start) }, true))
        } else {
            Ok((self.statement()?, false))
        }
    }

    fn loop_body(&mut self) -> Result<(Node, bool), ParseError> {
        let (body, multiline) = self.clause_body()?;
        if multiline {
            self.skip_newline();
            self.expect_one(Token::Done)?;
        }
        Ok((body, multiline))
    }

    fn if_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::If)?;
        let mut cases = vec![];
        let mut else_case = None;
        let mut multiline: Option<bool> = None;

        let mut check_form = |parser: &Parser, block: bool| match multiline {
            Some(seen) if seen != block => parse_error(
                ParseErrorType::MixedBlockForms { construct: "if" },
                parser.current().span
            ),
            _ => {
                multiline = Some(block);
                Ok(())
            },
        };

        loop {
            let condition = self.expr()?;
            self.expect_one(Token::Do)?;
            let (body, block) = self.clause_body()?;
            check_form(self, block)?;
            cases.push(IfCase { condition, body });

            let resume = self.position;
            self.skip_newline();

            match self.token() {
                Token::Elif => {
                    self.step();
                    continue;
                },
                Token::Else => {
                    self.step();
                    let (body, block) = self.clause_body()?;
                    check_form(self, block)?;
                    else_case = Some(Box::new(body));
                    if block {
                        self.skip_newline();
                        self.expect_one(Token::Done)?;
                    }
                    break;
                },
                Token::Done if block => {
                    self.step();
                    break;
                },
                _ if block => return self.unexpected(&["'elif'", "'else'", "'done'"]),
                _ => {
                    self.position = resume;
                    break;
                },
            }
        }

        Ok(Node::If {
            cases,
            else_case,
            multiline: multiline.unwrap_or(false),
            location: self.span_from(start),
        })
    }

    fn for_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::For)?;
        if self.is(&Token::Let) {
            self.step();
        }
        let (first, _) = self.expect_ident()?;

        if self.is(&Token::Eq) {
            self.step();
            let range_start = self.expr()?;
            self.expect_one(Token::To)?;
            let range_end = self.expr()?;
            let step = if self.is(&Token::Step) {
                self.step();
                Some(Box::new(self.expr()?))
            } else {
                None
            };
            self.expect_one(Token::Do)?;
            let (body, multiline) = self.loop_body()?;

            return Ok(Node::For {
                var: first,
                start: Box::new(range_start),
                end: Box::new(range_end),
                step,
                body: Box::new(body),
                multiline,
                location: self.span_from(start),
            });
        }

        let mut vars = vec![first];
        while self.is(&Token::Comma) {
            self.step();
            vars.push(self.expect_ident()?.0);
        }
        if !self.is(&Token::In) {
            return self.unexpected(&["'='", "'in'"]);
        }
        self.step();
        let iterable = self.expr()?;
        self.expect_one(Token::Do)?;
        let (body, multiline) = self.loop_body()?;

        Ok(Node::ForIn {
            vars,
            iterable: Box::new(iterable),
            body: Box::new(body),
            multiline,
            location: self.span_from(start),
        })
    }

    fn while_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::While)?;
        let condition = self.expr()?;
        self.expect_one(Token::Do)?;
        let (body, multiline) = self.loop_body()?;

        Ok(Node::While {
            condition: Box::new(condition),
            body: Box::new(body),
            multiline,
            location: self.span_from(start),
        })
    }

    fn namespace_expr(&mut self) -> Result<Node, ParseError> {
        let start = self.expect_one(Token::Namespace)?;
        let (name, _) = self.expect_ident()?;
        if !self.is(&Token::Newline) {
            return self.unexpected(&["newline"]);
        }
        let body = self.statements()?;
        self.skip_newline();
        self.expect_one(Token::Done)?;

        Ok(Node::Namespace { name, body: Arc::new(body), location: self.span_from(start) })
    }
}

impl Parse for Arg {
    fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        match parser.token() {
            Token::Mul => {
                parser.step();
                Ok(Arg::Spread(parser.expr()?))
            },
            Token::DoubleStar => {
                parser.step();
                Ok(Arg::SpreadKeywords(parser.expr()?))
            },
            Token::Let => {
                parser.step();
                let (name, _) = parser.expect_ident()?;
                parser.expect_one(Token::Eq)?;
                Ok(Arg::Keyword(name, parser.expr()?))
            },
            Token::Ident(name) if parser.peek(1).token == Token::Eq => {
                let name = name.clone();
                parser.step();
                parser.step();
                Ok(Arg::Keyword(name, parser.expr()?))
            },
            _ => Ok(Arg::Positional(parser.expr()?)),
        }
    }
}

impl Parse for Param {
    fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        match parser.token() {
            Token::Mul => {
                parser.step();
                Ok(Param::Rest(parser.expect_ident()?.0))
            },
            Token::DoubleStar => {
                parser.step();
                Ok(Param::Keywords(parser.expect_ident()?.0))
            },
            Token::Let => {
                parser.step();
                let (name, _) = parser.expect_ident()?;
                parser.expect_one(Token::Eq)?;
                Ok(Param::Default(name, parser.expr()?))
            },
            _ => {
                let (name, _) = parser.expect_ident()?;
                if parser.is(&Token::Eq) {
                    parser.step();
                    return Ok(Param::Default(name, parser.expr()?));
                }
                Ok(Param::Required(name))
            },
        }
    }
}

fn check_params(params: &[(Param, SrcSpan)]) -> Result<(), ParseError> {
    let mut seen: Vec<&str> = vec![];
    let mut defaulted = false;
    let mut rest = false;
    let mut keywords = false;

    for (param, span) in params {
        if seen.contains(&param.name()) {
            return parse_error(ParseErrorType::DuplicateParameter { name: param.name().into() }, *span);
        }
        seen.push(param.name());

        match param {
            Param::Required(name) if defaulted || rest => {
                return parse_error(ParseErrorType::DefaultBeforeRequired { name: name.clone() }, *span);
            },
            Param::Default(..) => defaulted = true,
            Param::Rest(_) if rest => {
                return parse_error(ParseErrorType::DuplicateCollector { kind: "*" }, *span);
            },
            Param::Rest(_) => rest = true,
            Param::Keywords(_) if keywords => {
                return parse_error(ParseErrorType::DuplicateCollector { kind: "**" }, *span);
            },
            Param::Keywords(_) => keywords = true,
            _ => {},
        }
    }

    Ok(())
}

impl Parse for FuncDef {
    fn parse(parser: &mut Parser) -> Result<Self, ParseError> {
        let start = parser.current().span;

        let mut decorators = vec![];
        while parser.is(&Token::At) {
            parser.step();
            decorators.push(parser.parse_expression(Precedence::Power)?);
            if parser.skip_newline() == 0 {
                return parser.unexpected(&["newline"]);
            }
        }

        let is_async = parser.is(&Token::Async);
        if is_async {
            parser.step();
        }
        parser.expect_one(Token::Defun)?;

        let name = match parser.token() {
            Token::Ident(_) => Some(parser.expect_ident()?.0),
            _ => None,
        };

        parser.expect_one(Token::LParen)?;
        let mut params = vec![];
        while !parser.is(&Token::RParen) {
            let span = parser.current().span;
            params.push((Param::parse(parser)?, parser.span_from(span)));
            if !parser.is(&Token::Comma) {
                break;
            }
            parser.step();
        }
        parser.expect_one(Token::RParen)?;
        check_params(&params)?;
        let params = params.into_iter().map(|(param, _)| param).collect();

        let (body, auto_return) = match parser.token() {
            Token::Arrow => {
                parser.step();
                parser.skip_newline();
                (parser.expr()?, true)
            },
            Token::Newline => {
                let block_start = parser.current().span;
                let statements = parser.statements()?;
                let body = Node::Block { statements, location: parser.span_from(block_start) };
                parser.skip_newline();
                parser.expect_one(Token::Done)?;
                (body, false)
            },
            _ => return parser.unexpected(&["'->'", "newline"]),
        };

        Ok(FuncDef {
            name,
            params,
            body,
            auto_return,
            is_async,
            decorators,
            location: parser.span_from(start),
        })
    }
}

pub fn parse_module(src: &str) -> Result<Module, ParseError> {
    let tokens = Lexer::new(char_stream(src))
        .tokenize()
        .map_err(|error| ParseError {
            span: error.location,
            error: ParseErrorType::LexError { error },
        })?;

    Parser::new(tokens).parse()
}

pub fn parse_error<T>(error: ParseErrorType, span: SrcSpan) -> Result<T, ParseError> {
    Err(ParseError { error, span })
}
