//! `calculate`: evaluates arithmetic expressions.
//!
//! Supports `+`, `-`, `*`, `/`, `%`, `^` (right-associative power),
//! parentheses, unary minus and decimal numbers. Recursive descent,
//! no `eval`.

use async_trait::async_trait;
use serde_json::{Value, json};
use turnloop_core::error::ToolError;
use turnloop_core::tool::{Arguments, ParameterSchema, Tool};

pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Perform mathematical calculations. Supports + - * / % ^, parentheses and decimals."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object().required_param(
            "expression",
            "string",
            "Mathematical expression to evaluate, e.g. '(2 + 3) * 4'",
        )
    }

    async fn execute(&self, arguments: Arguments) -> Result<Value, ToolError> {
        let expr = match arguments.get("expression") {
            Some(Value::String(s)) => s.clone(),
            // Coerced unquoted arguments arrive as numbers.
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ToolError::InvalidArguments("Missing 'expression' argument".into())),
        };

        let value = evaluate(&expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: "calculate".into(),
            reason: format!("Invalid mathematical expression: {reason}"),
        })?;

        Ok(to_json_number(value))
    }
}

/// Integral results become JSON integers so `2+2` renders as `4`.
fn to_json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("Unexpected token {tok:?} at position {}", parser.pos));
    }
    if !value.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                let n = text.parse().map_err(|_| format!("Invalid number: {text}"))?;
                tokens.push(Token::Num(n));
            }
            c => return Err(format!("Unexpected character: '{c}'")),
        }
    }

    if tokens.is_empty() {
        return Err("Empty expression".into());
    }
    Ok(tokens)
}

/// Nesting limit for parentheses and sign/exponent chains; every
/// recursive path passes through `unary`.
const MAX_DEPTH: usize = 256;

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // expr = term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, String> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.next();
            let right = self.term()?;
            left = if op == '+' { left + right } else { left - right };
        }
        Ok(left)
    }

    // term = unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, String> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.next();
            let right = self.unary()?;
            left = match op {
                '*' => left * right,
                _ if right == 0.0 => return Err("Division by zero".into()),
                '/' => left / right,
                _ => left % right,
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<f64, String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("Expression nested too deeply".into());
        }
        let value = self.signed();
        self.depth -= 1;
        value
    }

    // unary = ('-' | '+') unary | power
    fn signed(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.next();
                Ok(-self.unary()?)
            }
            Some(Token::Op('+')) => {
                self.next();
                self.unary()
            }
            _ => self.power(),
        }
    }

    // power = primary ('^' unary)?
    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.next();
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    // primary = NUMBER | '(' expr ')'
    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Open) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
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

    fn args(expression: &str) -> Arguments {
        let mut map = Arguments::new();
        map.insert("expression".into(), json!(expression));
        map
    }

    #[test]
    fn precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("((1 + 2) * (3 + 4))").unwrap(), 21.0);
    }

    #[test]
    fn modulo_and_power() {
        assert_eq!(evaluate("17 % 5").unwrap(), 2.0);
        assert_eq!(evaluate("2 ^ 10").unwrap(), 1024.0);
        // right-associative: 2^(3^2)
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ^ 2").unwrap(), -4.0);
    }

    #[test]
    fn unary_and_decimals() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("+4").unwrap(), 4.0);
        assert!((evaluate("3.14 * 2").unwrap() - 6.28).abs() < 1e-12);
    }

    #[test]
    fn errors() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("5 % 0").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("2 + x").is_err());
        assert!(evaluate("1.2.3").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let parens = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(evaluate(&parens).unwrap_err(), "Expression nested too deeply");

        let signs = format!("{}1", "-".repeat(200_000));
        assert_eq!(evaluate(&signs).unwrap_err(), "Expression nested too deeply");

        let shallow = format!("{}7{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&shallow).unwrap(), 7.0);
        assert_eq!(evaluate("--1").unwrap(), 1.0);
    }

    #[tokio::test]
    async fn deep_nesting_fails_the_call() {
        let expression = format!("{}2{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = CalculateTool.execute(args(&expression)).await.unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }

    #[tokio::test]
    async fn integral_results_are_integers() {
        let value = CalculateTool.execute(args("2+2")).await.unwrap();
        assert_eq!(value, json!(4));
    }

    #[tokio::test]
    async fn fractional_results_are_floats() {
        let value = CalculateTool.execute(args("10 / 4")).await.unwrap();
        assert_eq!(value, json!(2.5));
    }

    #[tokio::test]
    async fn numeric_argument_is_accepted() {
        let mut map = Arguments::new();
        map.insert("expression".into(), json!(42));
        assert_eq!(CalculateTool.execute(map).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn bad_expression_is_execution_failure() {
        let err = CalculateTool.execute(args("2 * (")).await.unwrap_err();
        assert!(err.to_string().starts_with("Invalid mathematical expression"));
        assert!(matches!(
            CalculateTool.execute(Arguments::new()).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn definition_requires_expression() {
        let def = CalculateTool.to_definition();
        assert_eq!(def.name, "calculate");
        assert!(def.parameters.is_required("expression"));
    }
}
