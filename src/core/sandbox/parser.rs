//! Expression parser for the sandbox
//!
//! Converts a sequence of tokens into an Abstract Syntax Tree (AST).
//! Uses recursive descent parsing with operator precedence. Nesting depth is
//! bounded so hostile input cannot exhaust the stack.

use super::tokenizer::Token;

/// Default maximum nesting depth of a parsed expression
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Largest nesting depth a parser accepts, whatever it is configured with.
/// Each level costs a fixed number of recursive calls, so this bounds stack use.
pub const MAX_DEPTH_LIMIT: usize = 128;

/// Abstract Syntax Tree node for sandbox expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal
    Number(f64),
    /// A scope variable or built-in constant
    Variable(String),
    /// Function call: name(arg1, arg2, ...)
    FunctionCall { name: String, args: Vec<Expr> },
    /// Binary operation: left op right
    BinaryOp {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary operation: -expr, +expr, not expr
    UnaryOp { op: String, operand: Box<Expr> },
    /// Conditional: condition ? then : otherwise
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

// Operator chains such as `1 + 1 + ... + 1` build a left-deep tree as long as
// the chain. Unlink the left spine in a loop so dropping it never recurses.
impl Drop for Expr {
    fn drop(&mut self) {
        let Expr::BinaryOp { left, .. } = self else {
            return;
        };
        let mut next = std::mem::replace(&mut **left, Expr::Number(0.0));
        while let Expr::BinaryOp { left, .. } = &mut next {
            let deeper = std::mem::replace(&mut **left, Expr::Number(0.0));
            next = deeper;
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at token {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parser for sandbox tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    /// Create a new parser for the given tokens
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_max_depth(tokens, DEFAULT_MAX_DEPTH)
    }

    /// Create a parser with a custom nesting limit, capped at [`MAX_DEPTH_LIMIT`]
    pub fn with_max_depth(tokens: Vec<Token>, max_depth: usize) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
            max_depth: max_depth.min(MAX_DEPTH_LIMIT),
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let expr = self.expression()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
        }
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Check if current token is any of the given operators and consume it
    fn match_any_operator(&mut self, ops: &[&str]) -> Option<String> {
        if let Some(Token::Operator(s)) = self.peek() {
            if ops.contains(&s.as_str()) {
                let op = s.clone();
                self.advance();
                return Some(op);
            }
        }
        None
    }

    /// Run `f` one nesting level deeper
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError::new(
                format!("Expression nesting exceeds {} levels", self.max_depth),
                self.position,
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Binary left-associative level: next (op next)*
    ///
    /// Chains are not counted against the nesting limit; the evaluator walks
    /// them in a loop.
    fn binary_level(
        &mut self,
        ops: &[&str],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;

        while let Some(op) = self.match_any_operator(ops) {
            let right = next(self)?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.nested(Self::conditional)
    }

    /// Conditional: logical_or ( "?" expression ":" expression )?
    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let condition = self.logical_or()?;

        if !self.match_token(&Token::Question) {
            return Ok(condition);
        }

        let then_branch = self.expression()?;
        if !self.match_token(&Token::Colon) {
            return Err(ParseError::new(
                "Expected ':' in conditional expression",
                self.position,
            ));
        }
        let else_branch = self.expression()?;

        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn logical_or(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["or"], Self::logical_and)
    }

    fn logical_and(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["and"], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["==", "!=", "<", ">", "<=", ">="], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["+", "-"], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&["*", "/", "%"], Self::unary)
    }

    /// Unary: ( "-" | "+" | "not" ) unary | power
    fn unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(op) = self.match_any_operator(&["-", "+", "not"]) {
            let operand = self.nested(Self::unary)?;
            Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            })
        } else {
            self.power()
        }
    }

    /// Power: call ( "^" unary )?   (right-associative, binds tighter than prefix minus)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.call()?;

        if self.match_any_operator(&["^"]).is_some() {
            let exponent = self.nested(Self::unary)?;
            Ok(Expr::BinaryOp {
                op: "^".to_string(),
                left: Box::new(base),
                right: Box::new(exponent),
            })
        } else {
            Ok(base)
        }
    }

    /// Call: primary ( "(" arguments? ")" )?
    fn call(&mut self) -> Result<Expr, ParseError> {
        let bare_name = matches!(self.peek(), Some(Token::Identifier(_)));
        let expr = self.primary()?;

        if !self.match_token(&Token::OpenParen) {
            return Ok(expr);
        }

        let name = match &expr {
            Expr::Variable(name) if bare_name => name.clone(),
            _ => {
                return Err(ParseError::new(
                    "Only named functions can be called",
                    self.position,
                ))
            }
        };

        let args = self.arguments()?;
        if !self.match_token(&Token::CloseParen) {
            return Err(ParseError::new(
                "Expected ')' after function arguments",
                self.position,
            ));
        }

        if self.peek() == Some(&Token::OpenParen) {
            return Err(ParseError::new(
                "Calling the result of a function is not allowed",
                self.position,
            ));
        }

        Ok(Expr::FunctionCall { name, args })
    }

    /// Arguments: ( expr ( "," expr )* )?
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        args.push(self.expression()?);
        while self.match_token(&Token::Comma) {
            args.push(self.expression()?);
        }

        Ok(args)
    }

    /// Primary: NUMBER | IDENTIFIER | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().cloned();

        match token {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::Identifier(name)) => {
                self.advance();
                Ok(Expr::Variable(name))
            }
            Some(Token::OpenParen) => {
                self.advance();
                let expr = self.expression()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                self.position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }
}

/// Convenience function to parse tokens into an AST
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sandbox::tokenizer::tokenize;

    fn parse_expr(expression: &str) -> Result<Expr, ParseError> {
        let tokens = tokenize(expression).map_err(|e| ParseError::new(e.message, e.position))?;
        parse(tokens)
    }

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Variable(name.to_string()))
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_expr("42").unwrap(), Expr::Number(42.0));
    }

    #[test]
    fn test_parse_operator_precedence_mul_over_add() {
        let expr = parse_expr("a + b * c").unwrap();
        assert_eq!(
            expr,
            Expr::BinaryOp {
                op: "+".to_string(),
                left: var("a"),
                right: Box::new(Expr::BinaryOp {
                    op: "*".to_string(),
                    left: var("b"),
                    right: var("c"),
                }),
            }
        );
    }

    #[test]
    fn test_parse_power_is_right_associative() {
        let expr = parse_expr("2 ^ 3 ^ 2").unwrap();
        assert_eq!(
            expr,
            Expr::BinaryOp {
                op: "^".to_string(),
                left: num(2.0),
                right: Box::new(Expr::BinaryOp {
                    op: "^".to_string(),
                    left: num(3.0),
                    right: num(2.0),
                }),
            }
        );
    }

    #[test]
    fn test_parse_unary_minus_binds_looser_than_power() {
        let expr = parse_expr("-2 ^ 2").unwrap();
        assert_eq!(
            expr,
            Expr::UnaryOp {
                op: "-".to_string(),
                operand: Box::new(Expr::BinaryOp {
                    op: "^".to_string(),
                    left: num(2.0),
                    right: num(2.0),
                }),
            }
        );
    }

    #[test]
    fn test_parse_negative_exponent() {
        let expr = parse_expr("2 ^ -1").unwrap();
        assert_eq!(
            expr,
            Expr::BinaryOp {
                op: "^".to_string(),
                left: num(2.0),
                right: Box::new(Expr::UnaryOp {
                    op: "-".to_string(),
                    operand: num(1.0),
                }),
            }
        );
    }

    #[test]
    fn test_parse_function_calls() {
        assert_eq!(
            parse_expr("round(a, 2)").unwrap(),
            Expr::FunctionCall {
                name: "round".to_string(),
                args: vec![Expr::Variable("a".to_string()), Expr::Number(2.0)],
            }
        );
        assert_eq!(
            parse_expr("random()").unwrap(),
            Expr::FunctionCall {
                name: "random".to_string(),
                args: vec![],
            }
        );
    }

    #[test]
    fn test_parse_conditional() {
        let expr = parse_expr("a > 1 ? a : 0").unwrap();
        assert_eq!(
            expr,
            Expr::Conditional {
                condition: Box::new(Expr::BinaryOp {
                    op: ">".to_string(),
                    left: var("a"),
                    right: num(1.0),
                }),
                then_branch: var("a"),
                else_branch: num(0.0),
            }
        );
    }

    #[test]
    fn test_parse_logical_precedence() {
        // a or b and c == a or (b and c)
        let expr = parse_expr("a or b and c").unwrap();
        assert_eq!(
            expr,
            Expr::BinaryOp {
                op: "or".to_string(),
                left: var("a"),
                right: Box::new(Expr::BinaryOp {
                    op: "and".to_string(),
                    left: var("b"),
                    right: var("c"),
                }),
            }
        );
    }

    #[test]
    fn test_parse_error_empty() {
        assert!(parse_expr("").is_err());
    }

    #[test]
    fn test_parse_error_missing_close_paren() {
        let err = parse_expr("max(a, b").unwrap_err();
        assert!(err.message.contains("')'"));
    }

    #[test]
    fn test_parse_error_trailing_tokens() {
        let err = parse_expr("a b").unwrap_err();
        assert!(err.message.contains("Unexpected token after expression"));
    }

    #[test]
    fn test_parse_error_missing_colon() {
        let err = parse_expr("a ? b").unwrap_err();
        assert!(err.message.contains("':'"));
    }

    #[test]
    fn test_parse_rejects_calling_call_results() {
        assert!(parse_expr("(a)(1)").is_err());
        assert!(parse_expr("f(1)(2)").is_err());
    }

    #[test]
    fn test_parse_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        let err = parse_expr(&deep).unwrap_err();
        assert!(err.message.contains("nesting"));

        let unary_chain = format!("{}1", "-".repeat(500));
        assert!(parse_expr(&unary_chain).is_err());
    }

    #[test]
    fn test_parse_long_operator_chain() {
        let chain = vec!["1"; 5000].join(" + ");
        let expr = parse_expr(&chain).unwrap();
        assert!(matches!(expr, Expr::BinaryOp { ref op, .. } if op == "+"));
        // dropping the left-deep tree must not recurse per node
        drop(expr);
    }

    #[test]
    fn test_parse_depth_limit_is_capped() {
        let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let tokens = tokenize(&deep).unwrap();
        let err = Parser::with_max_depth(tokens, 1_000_000).parse().unwrap_err();
        assert!(err.message.contains(&format!("exceeds {} levels", MAX_DEPTH_LIMIT)));
    }

    #[test]
    fn test_parse_with_custom_depth() {
        let tokens = tokenize("((1))").unwrap();
        assert!(Parser::with_max_depth(tokens.clone(), 2).parse().is_err());
        assert!(Parser::with_max_depth(tokens, 3).parse().is_ok());
    }
}
