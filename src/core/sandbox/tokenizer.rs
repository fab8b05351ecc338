//! Expression tokenizer for the sandbox
//!
//! Converts resolved expressions like "monthlyRate * 1.15" into a sequence of
//! tokens. The token set is deliberately closed: there are no string literals,
//! member accessors, brackets or assignment, so anything outside plain
//! arithmetic fails here before a parser ever sees it.

use std::iter::Peekable;
use std::str::Chars;

/// A token in a sandbox expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 123, 45.67, .5, 1.5e10)
    Number(f64),
    /// A variable, constant or function name
    Identifier(String),
    /// Arithmetic, comparison and logical operators
    Operator(String),
    /// Opening parenthesis
    OpenParen,
    /// Closing parenthesis
    CloseParen,
    /// Comma separator for function arguments
    Comma,
    /// `?` of a conditional expression
    Question,
    /// `:` of a conditional expression
    Colon,
}

/// Error during tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

/// Tokenizer for sandbox expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer for the given expression
    pub fn new(expression: &'a str) -> Self {
        Self {
            chars: expression.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire expression into a vector of tokens
    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        self.skip_whitespace();

        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '(' => {
                self.advance();
                Token::OpenParen
            }
            ')' => {
                self.advance();
                Token::CloseParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            '?' => {
                self.advance();
                Token::Question
            }
            ':' => {
                self.advance();
                Token::Colon
            }

            '+' | '-' | '*' | '/' | '%' | '^' => {
                self.advance();
                Token::Operator(c.to_string())
            }

            '<' | '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Operator(format!("{}=", c))
                } else {
                    Token::Operator(c.to_string())
                }
            }

            '=' => {
                let start = self.position;
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Operator("==".to_string())
                } else {
                    return Err(TokenizeError::new("Assignment is not allowed", start));
                }
            }

            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Operator("!=".to_string())
                } else {
                    Token::Operator("not".to_string())
                }
            }

            '&' | '|' => self.read_doubled_operator(c)?,

            c if c.is_ascii_digit() || c == '.' => self.read_number()?,

            c if c.is_alphabetic() || c == '_' => self.read_identifier(),

            c => {
                return Err(TokenizeError::new(
                    format!("Unexpected character: '{}'", c),
                    self.position,
                ));
            }
        };

        Ok(Some(token))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Push consecutive ASCII digits onto `buf`
    fn read_digits(&mut self, buf: &mut String) {
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            buf.push(c);
            self.advance();
        }
    }

    /// Read a number (integer, decimal, or scientific notation)
    fn read_number(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        self.read_digits(&mut num_str);

        if self.peek() == Some('.') {
            num_str.push('.');
            self.advance();
            self.read_digits(&mut num_str);
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            num_str.push('e');
            self.advance();
            if let Some(sign) = self.peek().filter(|s| *s == '+' || *s == '-') {
                num_str.push(sign);
                self.advance();
            }
            self.read_digits(&mut num_str);
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    /// Read an identifier; `and`, `or` and `not` become operators
    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "and" | "or" | "not" => Token::Operator(ident),
            _ => Token::Identifier(ident),
        }
    }

    /// `&&` and `||`; a single `&` or `|` is rejected
    fn read_doubled_operator(&mut self, c: char) -> Result<Token, TokenizeError> {
        let start = self.position;
        self.advance();
        if self.peek() != Some(c) {
            return Err(TokenizeError::new(
                format!("Unexpected character: '{}'", c),
                start,
            ));
        }
        self.advance();
        Ok(Token::Operator(
            if c == '&' { "and" } else { "or" }.to_string(),
        ))
    }
}

/// Convenience function to tokenize an expression
pub fn tokenize(expression: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(expression).tokenize()
}
