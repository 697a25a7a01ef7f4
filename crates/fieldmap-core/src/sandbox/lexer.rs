//! Tokenizer for the script language
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::SandboxError;

/// Token kinds; keywords arrive as identifiers and are told apart by the parser
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Question,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    Nullish,
    PlusPlus,
    MinusMinus,
    Arrow,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    /// Byte offset into the source
    pub position: usize,
}

/// Punctuators, longest first so that `===` wins over `==` and `=`
const PUNCTUATORS: &[(&str, Tok)] = &[
    ("===", Tok::StrictEq),
    ("!==", Tok::StrictNotEq),
    ("==", Tok::Eq),
    ("=>", Tok::Arrow),
    ("!=", Tok::NotEq),
    ("<=", Tok::Le),
    (">=", Tok::Ge),
    ("&&", Tok::AndAnd),
    ("||", Tok::OrOr),
    ("??", Tok::Nullish),
    ("++", Tok::PlusPlus),
    ("--", Tok::MinusMinus),
    ("+=", Tok::PlusAssign),
    ("-=", Tok::MinusAssign),
    ("*=", Tok::StarAssign),
    ("/=", Tok::SlashAssign),
    ("%=", Tok::PercentAssign),
    ("(", Tok::LParen),
    (")", Tok::RParen),
    ("{", Tok::LBrace),
    ("}", Tok::RBrace),
    ("[", Tok::LBracket),
    ("]", Tok::RBracket),
    (",", Tok::Comma),
    (";", Tok::Semicolon),
    (":", Tok::Colon),
    ("?", Tok::Question),
    (".", Tok::Dot),
    ("=", Tok::Assign),
    ("<", Tok::Lt),
    (">", Tok::Gt),
    ("+", Tok::Plus),
    ("-", Tok::Minus),
    ("*", Tok::Star),
    ("/", Tok::Slash),
    ("%", Tok::Percent),
    ("!", Tok::Bang),
];

struct Lexer<'a> {
    source: &'a str,
    position: usize,
}

fn syntax(message: impl Into<String>, position: usize) -> SandboxError {
    SandboxError::Syntax {
        message: message.into(),
        position,
    }
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.source[self.position..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<(), SandboxError> {
        loop {
            match (self.peek(), self.peek_second()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.position;
                    self.position += 2;
                    match self.rest().find("*/") {
                        Some(end) => self.position += end + 2,
                        None => return Err(syntax("unterminated comment", start)),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn number(&mut self) -> Result<Tok, SandboxError> {
        let start = self.position;
        let rest = self.rest();
        if rest.starts_with("0x") || rest.starts_with("0X") {
            self.position += 2;
            let digits_start = self.position;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
            let digits = &self.source[digits_start..self.position];
            return u64::from_str_radix(digits, 16)
                .map(|n| Tok::Number(n as f64))
                .map_err(|_| syntax("invalid hex literal", start));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        } else if self.peek() == Some('.') && start < self.position {
            // `1.` is a complete literal
            self.bump();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.position;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.position = mark;
            }
        }
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(syntax("identifier directly after number", self.position));
        }
        self.source[start..self.position]
            .parse::<f64>()
            .map(Tok::Number)
            .map_err(|_| syntax("invalid number literal", start))
    }

    fn string(&mut self, quote: char) -> Result<Tok, SandboxError> {
        let start = self.position;
        self.bump();
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(syntax("unterminated string", start));
            };
            match c {
                c if c == quote => return Ok(Tok::Str(out)),
                '\n' if quote != '`' => return Err(syntax("unterminated string", start)),
                '$' if quote == '`' && self.peek() == Some('{') => {
                    return Err(syntax("template interpolation is not supported", self.position - 1));
                }
                '\\' => out.push(self.escape(start)?),
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, start: usize) -> Result<char, SandboxError> {
        let Some(c) = self.bump() else {
            return Err(syntax("unterminated string", start));
        };
        let escaped = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' => '\0',
            'x' => self.hex_escape(2, start)?,
            'u' if self.peek() == Some('{') => {
                self.bump();
                let digits_start = self.position;
                while self.peek().is_some_and(|c| c != '}') {
                    self.bump();
                }
                let digits = &self.source[digits_start..self.position];
                self.bump();
                u32::from_str_radix(digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| syntax("invalid unicode escape", digits_start))?
            }
            'u' => self.hex_escape(4, start)?,
            other => other,
        };
        Ok(escaped)
    }

    fn hex_escape(&mut self, len: usize, start: usize) -> Result<char, SandboxError> {
        let digits_start = self.position;
        for _ in 0..len {
            if !self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                return Err(syntax("invalid escape sequence", start));
            }
            self.bump();
        }
        let digits = &self.source[digits_start..self.position];
        u32::from_str_radix(digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| syntax("invalid escape sequence", digits_start))
    }

    fn identifier(&mut self) -> Tok {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.bump();
        }
        Tok::Ident(self.source[start..self.position].to_string())
    }

    fn next_token(&mut self) -> Result<Token, SandboxError> {
        self.skip_trivia()?;
        let position = self.position;
        let Some(c) = self.peek() else {
            return Ok(Token {
                tok: Tok::Eof,
                position,
            });
        };

        let tok = if c.is_ascii_digit()
            || (c == '.' && self.peek_second().is_some_and(|d| d.is_ascii_digit()))
        {
            self.number()?
        } else if c == '"' || c == '\'' || c == '`' {
            self.string(c)?
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            self.identifier()
        } else {
            let rest = self.rest();
            let (text, tok) = PUNCTUATORS
                .iter()
                .find(|(text, _)| rest.starts_with(text))
                .ok_or_else(|| syntax(format!("unexpected character '{}'", c), position))?;
            self.position += text.len();
            tok.clone()
        };
        Ok(Token { tok, position })
    }
}

/// Split `source` into tokens, ending with [`Tok::Eof`]
pub fn tokenize(source: &str) -> Result<Vec<Token>, SandboxError> {
    let mut lexer = Lexer {
        source,
        position: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.tok == Tok::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}
