//! Recursive-descent parser for the Cypher subset
//!
//! Grammar (read queries):
//!
//! ```text
//! Statement := EXPLAIN? Query | MatchClause WhereClause? CREATE Pattern
//!            | CREATE Pattern | SchemaCommand
//! Query     := MatchClause? WhereClause? ReturnClause OrderByClause? Skip? Limit?
//! ```
//!
//! Clauses outside the subset (MERGE, DELETE, SET, ...) are recognized and
//! reported as unsupported rather than as syntax errors.

use super::ast::*;
use super::lexer::{tokenize, Keyword, Position, SyntaxError, Token, TokenKind};
use crate::graph::{EdgeType, Label, PropertyValue};
use thiserror::Error;

/// Errors produced while parsing a statement
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("{feature} is not supported (at {position})")]
    Unsupported { feature: String, position: Position },
}

impl ParseError {
    pub fn position(&self) -> Position {
        match self {
            ParseError::Syntax(err) => err.position,
            ParseError::Unsupported { position, .. } => *position,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Tokenize and parse a statement
pub fn parse_query(input: &str) -> ParseResult<Statement> {
    let tokens = tokenize(input)?;
    parse(tokens)
}

/// Parse a token stream produced by [`tokenize`]
pub fn parse(tokens: Vec<Token>) -> ParseResult<Statement> {
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.statement()?;
    parser.expect_end()?;
    Ok(statement)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn unsupported_clause(kw: Keyword) -> Option<&'static str> {
    let name = match kw {
        Keyword::Merge => "MERGE",
        Keyword::Delete => "DELETE",
        Keyword::Detach => "DETACH DELETE",
        Keyword::Set => "SET",
        Keyword::Remove => "REMOVE",
        Keyword::With => "WITH",
        Keyword::Unwind => "UNWIND",
        Keyword::Optional => "OPTIONAL MATCH",
        Keyword::Union => "UNION",
        Keyword::Call => "CALL",
        _ => return None,
    };
    Some(name)
}

impl Parser {
    // ============================================================
    // Token helpers
    // ============================================================

    fn peek(&self) -> &Token {
        // The stream always ends with Eof, and `advance` never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_kind_at(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        let snippet = if token.kind == TokenKind::Eof {
            "<end of input>".to_string()
        } else {
            token.text.clone()
        };
        SyntaxError::new(token.position, snippet, message).into()
    }

    fn unsupported_here(&self, feature: impl Into<String>) -> ParseError {
        ParseError::Unsupported {
            feature: feature.into(),
            position: self.peek().position,
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("Expected {}", what)))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword, what: &str) -> ParseResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.error_here(format!("Expected {}", what)))
        }
    }

    /// Fail on an unsupported clause keyword at the current position
    fn reject_unsupported_clause(&self) -> ParseResult<()> {
        if let TokenKind::Keyword(kw) = self.peek_kind() {
            if let Some(name) = unsupported_clause(*kw) {
                return Err(self.unsupported_here(name));
            }
        }
        Ok(())
    }

    fn expect_end(&mut self) -> ParseResult<()> {
        self.reject_unsupported_clause()?;
        if self.check(&TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.error_here("Unexpected token"))
        }
    }

    /// Variable names: plain or backquoted identifiers
    fn variable(&mut self) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("Expected variable name")),
        }
    }

    /// Label, type and property names, which may also be keywords
    fn symbolic_name(&mut self, what: &str) -> ParseResult<String> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            TokenKind::Keyword(_) => Ok(self.advance().text),
            _ => Err(self.error_here(format!("Expected {}", what))),
        }
    }

    // ============================================================
    // Statements
    // ============================================================

    fn statement(&mut self) -> ParseResult<Statement> {
        if self.eat_keyword(Keyword::Explain) {
            if self.check_keyword(Keyword::Create) || self.check_keyword(Keyword::Drop) {
                return Err(self.unsupported_here("EXPLAIN of a write statement"));
            }
            let match_clause = self.optional_match()?;
            let where_clause = self.optional_where()?;
            if self.check_keyword(Keyword::Create) {
                return Err(self.unsupported_here("EXPLAIN of a write statement"));
            }
            return Ok(Statement::Explain(self.query_tail(match_clause, where_clause)?));
        }

        if self.check_keyword(Keyword::Create) {
            if matches!(
                self.peek_kind_at(1),
                TokenKind::Keyword(Keyword::Index) | TokenKind::Keyword(Keyword::Constraint)
            ) {
                return self.schema_command().map(Statement::Schema);
            }
            return self.create_statement(None, None);
        }
        if self.check_keyword(Keyword::Drop) {
            return self.schema_command().map(Statement::Schema);
        }

        let match_clause = self.optional_match()?;
        let where_clause = self.optional_where()?;
        if self.check_keyword(Keyword::Create) {
            if match_clause.is_none() {
                return Err(self.error_here("Expected MATCH or RETURN"));
            }
            return self.create_statement(match_clause, where_clause);
        }
        Ok(Statement::Query(self.query_tail(match_clause, where_clause)?))
    }

    fn optional_match(&mut self) -> ParseResult<Option<MatchClause>> {
        self.reject_unsupported_clause()?;
        if !self.eat_keyword(Keyword::Match) {
            return Ok(None);
        }
        let pattern = self.pattern()?;
        if self.check_keyword(Keyword::Match) {
            return Err(self.unsupported_here("Multiple MATCH clauses"));
        }
        Ok(Some(MatchClause { pattern }))
    }

    fn optional_where(&mut self) -> ParseResult<Option<WhereClause>> {
        if !self.eat_keyword(Keyword::Where) {
            return Ok(None);
        }
        let predicate = self.expression()?;
        Ok(Some(WhereClause { predicate }))
    }

    fn query_tail(
        &mut self,
        match_clause: Option<MatchClause>,
        where_clause: Option<WhereClause>,
    ) -> ParseResult<Query> {
        self.reject_unsupported_clause()?;
        if !self.eat_keyword(Keyword::Return) {
            let expected = if match_clause.is_some() { "RETURN" } else { "MATCH or RETURN" };
            return Err(self.error_here(format!("Expected {}", expected)));
        }
        let return_clause = self.return_clause()?;
        let order_by = self.order_by()?;
        let skip = if self.eat_keyword(Keyword::Skip) {
            Some(self.row_count("SKIP")?)
        } else {
            None
        };
        let limit = if self.eat_keyword(Keyword::Limit) {
            Some(self.row_count("LIMIT")?)
        } else {
            None
        };
        Ok(Query {
            match_clause,
            where_clause,
            return_clause,
            order_by,
            skip,
            limit,
        })
    }

    fn create_statement(
        &mut self,
        match_clause: Option<MatchClause>,
        where_clause: Option<WhereClause>,
    ) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::Create, "CREATE")?;
        let pattern = self.pattern()?;
        if self.check_keyword(Keyword::Return) {
            return Err(self.unsupported_here("RETURN after CREATE"));
        }
        Ok(Statement::Create(CreateStatement {
            match_clause,
            where_clause,
            create_clause: CreateClause { pattern },
        }))
    }

    /// CREATE INDEX ON :L(p) | CREATE CONSTRAINT ON (n:L) ASSERT n.p IS UNIQUE
    /// and the DROP forms of both
    fn schema_command(&mut self) -> ParseResult<SchemaCommand> {
        let action = if self.eat_keyword(Keyword::Create) {
            SchemaAction::Create
        } else {
            self.expect_keyword(Keyword::Drop, "CREATE or DROP")?;
            SchemaAction::Drop
        };

        if self.eat_keyword(Keyword::Index) {
            self.expect_keyword(Keyword::On, "ON")?;
            self.expect(TokenKind::Colon, "':' before label")?;
            let label = self.symbolic_name("label")?;
            self.expect(TokenKind::LParen, "'('")?;
            let property = self.symbolic_name("property name")?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(SchemaCommand {
                action,
                kind: SchemaKind::Index,
                label: Label::new(label),
                property,
            });
        }

        self.expect_keyword(Keyword::Constraint, "INDEX or CONSTRAINT")?;
        self.expect_keyword(Keyword::On, "ON")?;
        self.expect(TokenKind::LParen, "'('")?;
        let variable = self.variable()?;
        self.expect(TokenKind::Colon, "':' before label")?;
        let label = self.symbolic_name("label")?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect_keyword(Keyword::Assert, "ASSERT")?;
        let target = self.variable()?;
        if target != variable {
            return Err(self.error_here(format!("Expected variable '{}'", variable)));
        }
        self.expect(TokenKind::Dot, "'.'")?;
        let property = self.symbolic_name("property name")?;
        self.expect_keyword(Keyword::Is, "IS")?;
        if !self.eat_keyword(Keyword::Unique) {
            return Err(self.unsupported_here("Constraint kinds other than UNIQUE"));
        }
        Ok(SchemaCommand {
            action,
            kind: SchemaKind::UniqueConstraint,
            label: Label::new(label),
            property,
        })
    }

    // ============================================================
    // Patterns
    // ============================================================

    fn pattern(&mut self) -> ParseResult<Pattern> {
        let mut paths = vec![self.path_pattern()?];
        while self.eat(&TokenKind::Comma) {
            paths.push(self.path_pattern()?);
        }
        Ok(Pattern { paths })
    }

    fn path_pattern(&mut self) -> ParseResult<PathPattern> {
        if matches!(self.peek_kind(), TokenKind::Identifier(_)) && self.peek_kind_at(1) == &TokenKind::Eq {
            return Err(self.unsupported_here("Named paths"));
        }
        let start = self.node_pattern()?;
        let mut segments = Vec::new();
        while matches!(self.peek_kind(), TokenKind::Minus | TokenKind::LeftArrow | TokenKind::Arrow) {
            let edge = self.edge_pattern()?;
            let node = self.node_pattern()?;
            segments.push(PathSegment { edge, node });
        }
        Ok(PathPattern { start, segments })
    }

    fn node_pattern(&mut self) -> ParseResult<NodePattern> {
        self.expect(TokenKind::LParen, "'(' to start a node pattern")?;
        let mut node = NodePattern::default();
        if matches!(self.peek_kind(), TokenKind::Identifier(_)) {
            node.variable = Some(self.variable()?);
        }
        while self.eat(&TokenKind::Colon) {
            node.labels.push(Label::new(self.symbolic_name("label")?));
        }
        if self.check(&TokenKind::LBrace) {
            node.properties = self.property_map()?;
        }
        self.expect(TokenKind::RParen, "')' to close the node pattern")?;
        Ok(node)
    }

    fn edge_pattern(&mut self) -> ParseResult<EdgePattern> {
        // `-->` lexes as Minus, Arrow
        let incoming = match self.peek_kind() {
            TokenKind::LeftArrow => {
                self.advance();
                true
            }
            TokenKind::Minus => {
                self.advance();
                false
            }
            TokenKind::Arrow => {
                // `->` right after a node: an empty body with no leading '-'
                return Err(self.error_here("Expected '-' or '<-' to start a relationship"));
            }
            _ => return Err(self.error_here("Expected relationship pattern")),
        };

        let mut variable = None;
        let mut types = Vec::new();
        let mut properties = Vec::new();

        if self.eat(&TokenKind::LBracket) {
            if matches!(self.peek_kind(), TokenKind::Identifier(_)) {
                variable = Some(self.variable()?);
            }
            if self.eat(&TokenKind::Colon) {
                types.push(EdgeType::new(self.symbolic_name("relationship type")?));
                while self.eat(&TokenKind::Pipe) {
                    self.eat(&TokenKind::Colon);
                    types.push(EdgeType::new(self.symbolic_name("relationship type")?));
                }
            }
            if self.check(&TokenKind::Star) {
                return Err(self.unsupported_here("Variable-length relationships"));
            }
            if self.check(&TokenKind::LBrace) {
                properties = self.property_map()?;
            }
            self.expect(TokenKind::RBracket, "']' to close the relationship pattern")?;
        }

        let outgoing = match self.peek_kind() {
            TokenKind::Arrow => {
                self.advance();
                true
            }
            TokenKind::Minus => {
                self.advance();
                false
            }
            _ => return Err(self.error_here("Expected '-' or '->' to end the relationship")),
        };

        let direction = match (incoming, outgoing) {
            (true, true) => return Err(self.error_here("Relationship cannot point both ways")),
            (true, false) => Direction::Incoming,
            (false, true) => Direction::Outgoing,
            (false, false) => Direction::Both,
        };

        Ok(EdgePattern {
            variable,
            types,
            direction,
            properties,
        })
    }

    fn property_map(&mut self) -> ParseResult<Vec<(String, Expression)>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut entries = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(entries);
        }
        loop {
            let key = self.symbolic_name("property name")?;
            self.expect(TokenKind::Colon, "':' after property name")?;
            let value = self.expression()?;
            entries.push((key, value));
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RBrace, "'}' to close the property map")?;
            return Ok(entries);
        }
    }

    // ============================================================
    // RETURN / ORDER BY / SKIP / LIMIT
    // ============================================================

    fn return_clause(&mut self) -> ParseResult<ReturnClause> {
        let distinct = self.eat_keyword(Keyword::Distinct);
        if self.check(&TokenKind::Star) {
            return Err(self.unsupported_here("RETURN *"));
        }
        let mut items = Vec::new();
        loop {
            let expression = self.expression()?;
            let alias = if self.eat_keyword(Keyword::As) {
                Some(self.symbolic_name("alias")?)
            } else {
                None
            };
            items.push(ReturnItem { expression, alias });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(ReturnClause { items, distinct })
    }

    fn order_by(&mut self) -> ParseResult<Option<OrderByClause>> {
        if !self.eat_keyword(Keyword::Order) {
            return Ok(None);
        }
        self.expect_keyword(Keyword::By, "BY after ORDER")?;
        let mut items = Vec::new();
        loop {
            let expression = self.expression()?;
            let ascending = if self.eat_keyword(Keyword::Desc) {
                false
            } else {
                self.eat_keyword(Keyword::Asc);
                true
            };
            items.push(OrderByItem { expression, ascending });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Some(OrderByClause { items }))
    }

    fn row_count(&mut self, clause: &str) -> ParseResult<Expression> {
        match self.peek_kind().clone() {
            TokenKind::Integer(n) if n >= 0 => {
                self.advance();
                Ok(Expression::Literal(PropertyValue::Integer(n)))
            }
            TokenKind::Parameter(name) => {
                self.advance();
                Ok(Expression::Parameter(name))
            }
            _ => Err(self.error_here(format!("{} expects a non-negative integer or parameter", clause))),
        }
    }

    // ============================================================
    // Expressions, lowest precedence first
    // ============================================================

    fn expression(&mut self) -> ParseResult<Expression> {
        self.or_expression()
    }

    fn binary(left: Expression, op: BinaryOp, right: Expression) -> Expression {
        Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn or_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.xor_expression()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.xor_expression()?;
            left = Self::binary(left, BinaryOp::Or, right);
        }
        Ok(left)
    }

    fn xor_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.and_expression()?;
        while self.eat_keyword(Keyword::Xor) {
            let right = self.and_expression()?;
            left = Self::binary(left, BinaryOp::Xor, right);
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.not_expression()?;
        while self.eat_keyword(Keyword::And) {
            let right = self.not_expression()?;
            left = Self::binary(left, BinaryOp::And, right);
        }
        Ok(left)
    }

    fn not_expression(&mut self) -> ParseResult<Expression> {
        if self.check_keyword(Keyword::Not) {
            return Err(self.unsupported_here("NOT"));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expression> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::LeftArrow => {
                    // `a<-1` lexes as LeftArrow; read it as `a < -1`
                    self.advance();
                    let operand = self.multiplicative()?;
                    let negated = Self::negate(operand);
                    left = Self::binary(left, BinaryOp::Lt, negated);
                    continue;
                }
                TokenKind::Keyword(Keyword::Contains) => BinaryOp::Contains,
                TokenKind::Keyword(Keyword::In) => BinaryOp::In,
                TokenKind::Keyword(Keyword::Starts) => {
                    self.advance();
                    self.expect_keyword(Keyword::With, "WITH after STARTS")?;
                    let right = self.additive()?;
                    left = Self::binary(left, BinaryOp::StartsWith, right);
                    continue;
                }
                TokenKind::Keyword(Keyword::Ends) => {
                    self.advance();
                    self.expect_keyword(Keyword::With, "WITH after ENDS")?;
                    let right = self.additive()?;
                    left = Self::binary(left, BinaryOp::EndsWith, right);
                    continue;
                }
                TokenKind::Keyword(Keyword::Is) => {
                    self.advance();
                    let op = if self.eat_keyword(Keyword::Not) {
                        UnaryOp::IsNotNull
                    } else {
                        UnaryOp::IsNull
                    };
                    self.expect_keyword(Keyword::Null, "NULL")?;
                    left = Expression::Unary {
                        op,
                        expr: Box::new(left),
                    };
                    continue;
                }
                _ => return Ok(left),
            };
            self.advance();
            let right = self.additive()?;
            left = Self::binary(left, op, right);
        }
    }

    fn additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Self::binary(left, op, right);
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Self::binary(left, op, right);
        }
    }

    fn negate(expr: Expression) -> Expression {
        match expr {
            Expression::Literal(PropertyValue::Integer(i)) => Expression::Literal(PropertyValue::Integer(-i)),
            Expression::Literal(PropertyValue::Float(f)) => Expression::Literal(PropertyValue::Float(-f)),
            other => Expression::Unary {
                op: UnaryOp::Minus,
                expr: Box::new(other),
            },
        }
    }

    fn unary(&mut self) -> ParseResult<Expression> {
        if self.eat(&TokenKind::Minus) {
            let operand = self.unary()?;
            return Ok(Self::negate(operand));
        }
        if self.eat(&TokenKind::Plus) {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer(i) => {
                self.advance();
                Ok(Expression::Literal(PropertyValue::Integer(i)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expression::Literal(PropertyValue::Float(f)))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expression::Literal(PropertyValue::String(s)))
            }
            TokenKind::Parameter(name) => {
                self.advance();
                Ok(Expression::Parameter(name))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expression::Literal(PropertyValue::Boolean(true)))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expression::Literal(PropertyValue::Boolean(false)))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Expression::Literal(PropertyValue::Null))
            }
            TokenKind::Keyword(kw) if kw.is_aggregate() && self.peek_kind_at(1) == &TokenKind::LParen => {
                self.advance();
                self.function_call(token.text)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.list_literal(),
            TokenKind::LBrace => Err(self.unsupported_here("Map literals")),
            TokenKind::Identifier(name) => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    return self.function_call(name);
                }
                if self.eat(&TokenKind::Dot) {
                    let property = self.symbolic_name("property name")?;
                    if self.check(&TokenKind::Dot) {
                        return Err(self.unsupported_here("Nested property access"));
                    }
                    return Ok(Expression::Property {
                        variable: name,
                        property,
                    });
                }
                Ok(Expression::Variable(name))
            }
            TokenKind::Keyword(kw) if unsupported_clause(kw).is_some() => {
                Err(self.unsupported_here(unsupported_clause(kw).unwrap_or("clause")))
            }
            _ => Err(self.error_here("Expected expression")),
        }
    }

    fn list_literal(&mut self) -> ParseResult<Expression> {
        self.expect(TokenKind::LBracket, "'['")?;
        let mut items = Vec::new();
        if self.eat(&TokenKind::RBracket) {
            return Ok(Expression::List(items));
        }
        loop {
            items.push(self.expression()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RBracket, "']' to close the list")?;
            return Ok(Expression::List(items));
        }
    }

    fn function_call(&mut self, name: String) -> ParseResult<Expression> {
        self.expect(TokenKind::LParen, "'('")?;
        if AggregateKind::from_name(&name) == Some(AggregateKind::Count) && self.eat(&TokenKind::Star) {
            self.expect(TokenKind::RParen, "')' after count(*")?;
            return Ok(Expression::CountStar);
        }
        let distinct = self.eat_keyword(Keyword::Distinct);
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.expression()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' to close the argument list")?;
        Ok(Expression::Function { name, args, distinct })
    }
}
