//! `calculate`: evaluates arithmetic expressions.
//!
//! Supports `+`, `-`, `*`, `/`, `**` (power), parentheses, decimals and
//! unary negation with a small recursive-descent evaluator. Whole results
//! print without a fractional part.

use async_trait::async_trait;
use smore_core::error::ToolError;
use smore_core::tool::{Tool, ToolContext};

pub struct CalculatorTool;

const ALLOWED: &str = "0123456789+-*/.() ";

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Do simple math. Params: math expression (e.g., 2+2, 15*3, 2**8)"
    }

    async fn invoke(&self, params: &str, _ctx: ToolContext<'_>) -> Result<String, ToolError> {
        if !params.chars().all(|c| ALLOWED.contains(c)) {
            return Ok("Error: Only numbers and +-*/() allowed".into());
        }

        Ok(match evaluate(params) {
            Ok(value) => format!("Result: {}", format_number(value)),
            Err(e) => format!("Error: {e}"),
        })
    }
}

/// Whole numbers print without a trailing `.0`.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ── Recursive-descent expression evaluator ────────────────────────────────

/// Evaluate a mathematical expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("Unexpected token at position {}: {tok:?}", parser.pos));
    }
    if !result.is_finite() {
        return Err("Result is too large".into());
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        let token = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::StarStar);
                } else {
                    tokens.push(Token::Star);
                }
                continue;
            }
            '/' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    literal.push(d);
                    chars.next();
                }
                let num = literal
                    .parse()
                    .map_err(|_| format!("Invalid number: {literal}"))?;
                tokens.push(Token::Number(num));
                continue;
            }
            c => return Err(format!("Unexpected character: '{c}'")),
        };
        tokens.push(token);
        chars.next();
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    left += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    left -= self.parse_term()?;
                }
                _ => return Ok(left),
            }
        }
    }

    // term = unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<f64, String> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    left *= self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err("Division by zero".into());
                    }
                    left /= right;
                }
                _ => return Ok(left),
            }
        }
    }

    // unary = ('-' | '+') unary | power
    fn parse_unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // power = primary ('**' unary)?   right-associative, `-2**2` is -4
    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_primary()?;
        if self.peek() == Some(&Token::StarStar) {
            self.advance();
            let exponent = self.parse_unary()?;
            if base == 0.0 && exponent < 0.0 {
                return Err("Division by zero".into());
            }
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // primary = NUMBER | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("Unexpected token: {tok:?}")),
            None => Err("Unexpected end of expression".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smore_core::tool::ToolRegistry;

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("((1 + 2) * (3 + 4))").unwrap(), 21.0);
    }

    #[test]
    fn division_and_decimals() {
        assert_eq!(evaluate("10 / 4").unwrap(), 2.5);
        assert_eq!(evaluate("3.5 * 2").unwrap(), 7.0);
        assert!(evaluate("1 / 0").is_err());
    }

    #[test]
    fn unary_signs() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("+4 - -1").unwrap(), 5.0);
    }

    #[test]
    fn power_operator() {
        assert_eq!(evaluate("2 ** 10").unwrap(), 1024.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ** 2").unwrap(), -4.0);
        assert_eq!(evaluate("2 ** -1").unwrap(), 0.5);
        assert_eq!(evaluate("(1 + 1) ** 2 * 3").unwrap(), 12.0);
        assert!(evaluate("0 ** -1").is_err());
        assert!(evaluate("10 ** 400").is_err());
        assert!(evaluate("2 *** 2").is_err());
    }

    #[test]
    fn malformed_expressions() {
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("1 2").is_err());
        assert!(evaluate("1..2").is_err());
    }

    #[tokio::test]
    async fn tool_formats_results() {
        let registry = ToolRegistry::new();
        let ctx = registry.root_context(1);
        let tool_ctx = ToolContext { registry: &registry, recursion: &ctx };

        assert_eq!(CalculatorTool.invoke("15*3", tool_ctx).await.unwrap(), "Result: 45");
        assert_eq!(CalculatorTool.invoke("10 / 4", tool_ctx).await.unwrap(), "Result: 2.5");
        assert!(
            CalculatorTool.invoke("10 / 3", tool_ctx).await.unwrap().starts_with("Result: 3.333")
        );
    }

    #[tokio::test]
    async fn tool_rejects_foreign_characters() {
        let registry = ToolRegistry::new();
        let ctx = registry.root_context(1);
        let tool_ctx = ToolContext { registry: &registry, recursion: &ctx };

        let out = CalculatorTool.invoke("__import__('os')", tool_ctx).await.unwrap();
        assert_eq!(out, "Error: Only numbers and +-*/() allowed");
        let out = CalculatorTool.invoke("2 +", tool_ctx).await.unwrap();
        assert!(out.starts_with("Error: "));
    }
}
