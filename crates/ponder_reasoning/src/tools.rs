use crate::tool_registry::ToolHandler;
use ponder_core::ToolError;

const MAX_DEPTH: usize = 64;

/// Arithmetic evaluator over numeric literals, `+ - * / ( )` and unary minus.
///
/// Input is tokenized up front; any character outside that alphabet is
/// rejected before evaluation starts.
pub struct CalculatorTool;

#[async_trait::async_trait]
impl ToolHandler for CalculatorTool {
    fn name(&self) -> &str {
        "Calculator"
    }

    fn description(&self) -> &str {
        "Performs arithmetic calculations. Usage: Calculator[expression]"
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        evaluate(input).map(format_number)
    }
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64, ToolError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(ToolError::InvalidInput("empty expression".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(ToolError::InvalidInput(format!("unexpected {}", token)));
    }
    if !value.is_finite() {
        return Err(ToolError::InvalidInput("result is not a finite number".into()));
    }
    Ok(value)
}

/// Integral results print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "number {}", n),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ToolError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &input[start..end];
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| {
                        ToolError::InvalidInput(format!("malformed number '{}'", literal))
                    })?;
                tokens.push(Token::Num(value));
            }
            _ => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => return Err(ToolError::UnsupportedExpression),
                });
                chars.next();
            }
        }
    }
    Ok(tokens)
}

// ============================================================================
// Recursive-descent parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self, depth: usize) -> Result<f64, ToolError> {
        let mut value = self.term(depth)?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term(depth)?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self, depth: usize) -> Result<f64, ToolError> {
        let mut value = self.factor(depth)?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.factor(depth)?;
            if op == Token::Star {
                value *= rhs;
            } else {
                if rhs == 0.0 {
                    return Err(ToolError::InvalidInput("division by zero".into()));
                }
                value /= rhs;
            }
        }
        Ok(value)
    }

    // factor := '-' factor | NUMBER | '(' expr ')'
    fn factor(&mut self, depth: usize) -> Result<f64, ToolError> {
        if depth > MAX_DEPTH {
            return Err(ToolError::InvalidInput("expression nested too deeply".into()));
        }
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Minus) => Ok(-self.factor(depth + 1)?),
            Some(Token::LParen) => {
                let value = self.expr(depth + 1)?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(ToolError::InvalidInput("missing ')'".into())),
                }
            }
            Some(token) => Err(ToolError::InvalidInput(format!("unexpected {}", token))),
            None => Err(ToolError::InvalidInput("unexpected end of expression".into())),
        }
    }
}
