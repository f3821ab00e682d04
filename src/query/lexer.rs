//! Tokenizer for the Cypher subset
//!
//! Turns query text into a flat token stream. Whitespace, `// line` comments
//! and `/* block */` comments are skipped. Every token remembers where it
//! started so the parser can point at it in a `SyntaxError`.

use std::fmt;
use thiserror::Error;

/// Location of a token in the query text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Byte offset from the start of the query
    pub offset: usize,
    /// 1-based line
    pub line: usize,
    /// 1-based column, counted in characters
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Lexing or parsing failure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at {position} near '{snippet}'")]
pub struct SyntaxError {
    pub position: Position,
    /// Text of the offending token
    pub snippet: String,
    pub message: String,
}

impl SyntaxError {
    pub fn new(position: Position, snippet: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            position,
            snippet: snippet.into(),
            message: message.into(),
        }
    }
}

/// Reserved words, matched case-insensitively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Match,
    Where,
    Return,
    Create,
    Order,
    By,
    Limit,
    Skip,
    Asc,
    Desc,
    And,
    Or,
    Xor,
    Not,
    As,
    Distinct,
    Contains,
    Starts,
    Ends,
    With,
    In,
    Is,
    Null,
    True,
    False,
    Explain,
    Index,
    Constraint,
    On,
    Assert,
    Unique,
    Drop,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Merge,
    Delete,
    Detach,
    Set,
    Remove,
    Unwind,
    Optional,
    Union,
    Call,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Keyword> {
        let kw = match word.to_ascii_uppercase().as_str() {
            "MATCH" => Keyword::Match,
            "WHERE" => Keyword::Where,
            "RETURN" => Keyword::Return,
            "CREATE" => Keyword::Create,
            "ORDER" => Keyword::Order,
            "BY" => Keyword::By,
            "LIMIT" => Keyword::Limit,
            "SKIP" => Keyword::Skip,
            "ASC" | "ASCENDING" => Keyword::Asc,
            "DESC" | "DESCENDING" => Keyword::Desc,
            "AND" => Keyword::And,
            "OR" => Keyword::Or,
            "XOR" => Keyword::Xor,
            "NOT" => Keyword::Not,
            "AS" => Keyword::As,
            "DISTINCT" => Keyword::Distinct,
            "CONTAINS" => Keyword::Contains,
            "STARTS" => Keyword::Starts,
            "ENDS" => Keyword::Ends,
            "WITH" => Keyword::With,
            "IN" => Keyword::In,
            "IS" => Keyword::Is,
            "NULL" => Keyword::Null,
            "TRUE" => Keyword::True,
            "FALSE" => Keyword::False,
            "EXPLAIN" => Keyword::Explain,
            "INDEX" => Keyword::Index,
            "CONSTRAINT" => Keyword::Constraint,
            "ON" => Keyword::On,
            "ASSERT" => Keyword::Assert,
            "UNIQUE" => Keyword::Unique,
            "DROP" => Keyword::Drop,
            "COUNT" => Keyword::Count,
            "SUM" => Keyword::Sum,
            "AVG" => Keyword::Avg,
            "MIN" => Keyword::Min,
            "MAX" => Keyword::Max,
            "MERGE" => Keyword::Merge,
            "DELETE" => Keyword::Delete,
            "DETACH" => Keyword::Detach,
            "SET" => Keyword::Set,
            "REMOVE" => Keyword::Remove,
            "UNWIND" => Keyword::Unwind,
            "OPTIONAL" => Keyword::Optional,
            "UNION" => Keyword::Union,
            "CALL" => Keyword::Call,
            _ => return None,
        };
        Some(kw)
    }

    /// Aggregate function names
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Keyword::Count | Keyword::Sum | Keyword::Avg | Keyword::Min | Keyword::Max
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier(String),
    StringLiteral(String),
    Integer(i64),
    Float(f64),
    /// `$name`
    Parameter(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
    Pipe,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    /// `->`
    Arrow,
    /// `<-`
    LeftArrow,
    Eq,
    /// `<>` or `!=`
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token
    pub text: String,
    pub position: Position,
}

struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
    line: usize,
    column: usize,
}

/// Split query text into tokens, ending with `TokenKind::Eof`
pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(input).run()
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.index).map_or(self.input.len(), |&(o, _)| o)
    }

    fn position(&self) -> Position {
        Position {
            offset: self.offset(),
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let start = self.position();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    position: start,
                });
                return Ok(tokens);
            };

            let kind = match c {
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                ':' => self.single(TokenKind::Colon),
                ',' => self.single(TokenKind::Comma),
                '|' => self.single(TokenKind::Pipe),
                '*' => self.single(TokenKind::Star),
                '+' => self.single(TokenKind::Plus),
                '/' => self.single(TokenKind::Slash),
                '%' => self.single(TokenKind::Percent),
                '=' => self.single(TokenKind::Eq),
                '.' if !self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.single(TokenKind::Dot),
                '-' => {
                    self.bump();
                    if self.peek() == Some('>') {
                        self.bump();
                        TokenKind::Arrow
                    } else {
                        TokenKind::Minus
                    }
                }
                '<' => {
                    self.bump();
                    match self.peek() {
                        Some('=') => {
                            self.bump();
                            TokenKind::Le
                        }
                        Some('>') => {
                            self.bump();
                            TokenKind::Ne
                        }
                        Some('-') => {
                            self.bump();
                            TokenKind::LeftArrow
                        }
                        _ => TokenKind::Lt,
                    }
                }
                '>' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '!' if self.peek_at(1) == Some('=') => {
                    self.bump();
                    self.bump();
                    TokenKind::Ne
                }
                '\'' | '"' => self.string(start, c)?,
                '`' => self.quoted_identifier(start)?,
                '$' => self.parameter(start)?,
                c if c.is_ascii_digit() || c == '.' => self.number(start)?,
                c if c.is_alphabetic() || c == '_' => self.word(),
                other => {
                    return Err(SyntaxError::new(
                        start,
                        other.to_string(),
                        format!("Unexpected character '{}'", other),
                    ))
                }
            };

            let text = self.input[start.offset..self.offset()].to_string();
            tokens.push(Token {
                kind,
                text,
                position: start,
            });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn skip_trivia(&mut self) -> Result<(), SyntaxError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.position();
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(SyntaxError::new(start, "/*", "Unterminated comment"));
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, start: Position, quote: char) -> Result<TokenKind, SyntaxError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(TokenKind::StringLiteral(value)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('\'') => '\'',
                        Some('"') => '"',
                        Some(other) => {
                            return Err(SyntaxError::new(
                                start,
                                format!("\\{}", other),
                                format!("Invalid escape sequence '\\{}'", other),
                            ))
                        }
                        None => break,
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
                None => break,
            }
        }
        Err(SyntaxError::new(
            start,
            &self.input[start.offset..],
            "Unterminated string literal",
        ))
    }

    fn quoted_identifier(&mut self, start: Position) -> Result<TokenKind, SyntaxError> {
        self.bump();
        let mut name = String::new();
        while let Some(c) = self.bump() {
            if c == '`' {
                return Ok(TokenKind::Identifier(name));
            }
            name.push(c);
        }
        Err(SyntaxError::new(
            start,
            &self.input[start.offset..],
            "Unterminated quoted identifier",
        ))
    }

    fn parameter(&mut self, start: Position) -> Result<TokenKind, SyntaxError> {
        self.bump();
        let name_start = self.offset();
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        let name = &self.input[name_start..self.offset()];
        if name.is_empty() {
            return Err(SyntaxError::new(start, "$", "Expected parameter name after '$'"));
        }
        Ok(TokenKind::Parameter(name.to_string()))
    }

    fn number(&mut self, start: Position) -> Result<TokenKind, SyntaxError> {
        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..digit_at {
                    self.bump();
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            }
        }

        let text = &self.input[start.offset..self.offset()];
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(SyntaxError::new(start, text, "Invalid number literal"));
        }
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| SyntaxError::new(start, text, "Invalid float literal"))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Integer)
                .map_err(|_| SyntaxError::new(start, text, "Integer literal out of range"))
        }
    }

    fn word(&mut self) -> TokenKind {
        let start = self.offset();
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        let word = &self.input[start..self.offset()];
        match Keyword::lookup(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier(word.to_string()),
        }
    }
}
