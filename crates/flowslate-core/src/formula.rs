//! Sandboxed formula evaluation.
//!
//! Property values starting with `=` are formulas computed against the current
//! response state. Stored content is never executed as code: formulas go
//! through this small grammar and nothing else.
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := compare ("&&" compare)*
//! compare := sum (("==" | "!=" | "<" | "<=" | ">" | ">=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/" | "%") unary)*
//! unary   := ("-" | "!") unary | primary
//! primary := number | string | "true" | "false" | variable | "(" expr ")"
//! variable:= ident ("." ident)* | "{" name "}" ("." ident)?
//! ```
//!
//! Variables resolve against response keys (`Foo.x`, or `{Fig. 1}.x` when the
//! widget name contains spaces or dots). Unknown variables are empty, not errors.

use std::fmt;

use serde_json::Value;

use crate::error::FormulaError;
use crate::properties::format_number;
use crate::response::{ResponseKey, ResponseSlice};

const MAX_DEPTH: usize = 64;
/// Operator chains fold into left-nested trees, so this also bounds how
/// deep evaluation recurses.
const MAX_NODES: usize = 256;

/// Source of variable values for a formula.
pub trait ResponseLookup {
    fn lookup(&self, key: &ResponseKey) -> Option<Value>;
}

impl ResponseLookup for ResponseSlice<'_> {
    fn lookup(&self, key: &ResponseKey) -> Option<Value> {
        self.step?.get(key).cloned()
    }
}

impl ResponseLookup for () {
    fn lookup(&self, _key: &ResponseKey) -> Option<Value> {
        None
    }
}

/// Result of evaluating a formula.
#[derive(Clone, Debug, PartialEq)]
pub enum FormulaValue {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl FormulaValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Self::Empty, Self::Number),
            Value::String(s) => Self::Text(s.clone()),
            compound => Self::Text(compound.to_string()),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Empty => Some(0.0),
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
            Self::Bool(b) => *b,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Empty => "an empty value".into(),
            Self::Number(n) => format!("number {}", format_number(*n)),
            Self::Text(s) => format!("text {s:?}"),
            Self::Bool(b) => format!("boolean {b}"),
        }
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Parse and evaluate `source` against `responses`.
pub fn evaluate(source: &str, responses: &impl ResponseLookup) -> Result<FormulaValue, FormulaError> {
    let expr = parse(source)?;
    eval(&expr, responses)
}

/// Parse a formula without evaluating it.
pub fn parse(source: &str) -> Result<Expr, FormulaError> {
    let tokens = lex(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        nodes: 0,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        (Token::End, _) => Ok(expr),
        (tok, offset) => Err(FormulaError::Unexpected {
            found: tok.to_string(),
            expected: "end of formula",
            offset: *offset,
        }),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Parsed formula.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(FormulaValue),
    Variable(ResponseKey),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

fn eval(expr: &Expr, responses: &impl ResponseLookup) -> Result<FormulaValue, FormulaError> {
    Ok(match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Variable(key) => responses
            .lookup(key)
            .map_or(FormulaValue::Empty, |v| FormulaValue::from_json(&v)),
        Expr::Neg(inner) => {
            let v = eval(inner, responses)?;
            let n = v.as_number().ok_or_else(|| FormulaError::Type {
                op: "-",
                operand: v.describe(),
            })?;
            FormulaValue::Number(-n)
        }
        Expr::Not(inner) => FormulaValue::Bool(!eval(inner, responses)?.truthy()),
        Expr::Binary(BinOp::And, lhs, rhs) => {
            let l = eval(lhs, responses)?;
            if !l.truthy() {
                return Ok(l);
            }
            eval(rhs, responses)?
        }
        Expr::Binary(BinOp::Or, lhs, rhs) => {
            let l = eval(lhs, responses)?;
            if l.truthy() {
                return Ok(l);
            }
            eval(rhs, responses)?
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, responses)?;
            let r = eval(rhs, responses)?;
            binary(*op, l, r)?
        }
    })
}

fn binary(op: BinOp, l: FormulaValue, r: FormulaValue) -> Result<FormulaValue, FormulaError> {
    use FormulaValue::*;

    let numbers = |l: &FormulaValue, r: &FormulaValue| -> Result<(f64, f64), FormulaError> {
        let ln = l.as_number().ok_or_else(|| FormulaError::Type {
            op: op.symbol(),
            operand: l.describe(),
        })?;
        let rn = r.as_number().ok_or_else(|| FormulaError::Type {
            op: op.symbol(),
            operand: r.describe(),
        })?;
        Ok((ln, rn))
    };

    Ok(match op {
        BinOp::Add => match (&l, &r) {
            // Text concatenates, like the embedded documents expect.
            (Text(_), _) | (_, Text(_)) => Text(format!("{l}{r}")),
            _ => {
                let (a, b) = numbers(&l, &r)?;
                Number(a + b)
            }
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            let (a, b) = numbers(&l, &r)?;
            match op {
                BinOp::Sub => Number(a - b),
                BinOp::Mul => Number(a * b),
                BinOp::Div if b == 0.0 => return Err(FormulaError::DivisionByZero),
                BinOp::Div => Number(a / b),
                BinOp::Rem if b == 0.0 => return Err(FormulaError::DivisionByZero),
                _ => Number(a % b),
            }
        }
        BinOp::Eq => Bool(loosely_equal(&l, &r)),
        BinOp::Ne => Bool(!loosely_equal(&l, &r)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (l.as_number(), r.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => Some(l.to_string().cmp(&r.to_string())),
            };
            let Some(ordering) = ordering else {
                return Ok(Bool(false));
            };
            Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        // Normally short-circuited in `eval`.
        BinOp::And => if l.truthy() { r } else { l },
        BinOp::Or => if l.truthy() { l } else { r },
    })
}

fn loosely_equal(l: &FormulaValue, r: &FormulaValue) -> bool {
    match (l, r) {
        (FormulaValue::Text(a), FormulaValue::Text(b)) => a == b,
        _ => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => l.to_string() == r.to_string(),
        },
    }
}

// === Lexer ===

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// `{Widget name}` response-key prefix.
    Braced(String),
    Op(&'static str),
    LParen,
    RParen,
    Dot,
    End,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", format_number(*n)),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::Ident(s) => write!(f, "`{s}`"),
            Token::Braced(s) => write!(f, "`{{{s}}}`"),
            Token::Op(op) => write!(f, "`{op}`"),
            Token::LParen => f.write_str("`(`"),
            Token::RParen => f.write_str("`)`"),
            Token::Dot => f.write_str("`.`"),
            Token::End => f.write_str("end of formula"),
        }
    }
}

fn lex(source: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' => {
                let mut end = offset;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &source[offset..end];
                let n = text
                    .parse()
                    .map_err(|_| FormulaError::UnexpectedChar { found: c, offset })?;
                tokens.push((Token::Number(n), offset));
            }
            '"' | '\'' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, ch)) = chars.next() {
                    match ch {
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                value.push(escaped);
                            }
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(FormulaError::UnterminatedString { offset });
                }
                tokens.push((Token::Str(value), offset));
            }
            '{' => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == '}' {
                        closed = true;
                        break;
                    }
                    name.push(ch);
                }
                if !closed {
                    return Err(FormulaError::UnexpectedChar { found: '{', offset });
                }
                tokens.push((Token::Braced(name), offset));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = offset;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(source[offset..end].to_string()), offset));
            }
            '(' => {
                chars.next();
                tokens.push((Token::LParen, offset));
            }
            ')' => {
                chars.next();
                tokens.push((Token::RParen, offset));
            }
            '.' => {
                chars.next();
                tokens.push((Token::Dot, offset));
            }
            _ => {
                chars.next();
                let next = chars.peek().map(|&(_, n)| n);
                let op = match (c, next) {
                    ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('='))
                    | ('&', Some('&')) | ('|', Some('|')) => {
                        chars.next();
                        match c {
                            '=' => "==",
                            '!' => "!=",
                            '<' => "<=",
                            '>' => ">=",
                            '&' => "&&",
                            _ => "||",
                        }
                    }
                    ('+', _) => "+",
                    ('-', _) => "-",
                    ('*', _) => "*",
                    ('/', _) => "/",
                    ('%', _) => "%",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    ('!', _) => "!",
                    _ => return Err(FormulaError::UnexpectedChar { found: c, offset }),
                };
                tokens.push((Token::Op(op), offset));
            }
        }
    }

    tokens.push((Token::End, source.len()));
    Ok(tokens)
}

// === Parser ===

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    nodes: usize,
}

impl Parser {
    fn peek(&self) -> &(Token, usize) {
        // The lexer always terminates the stream with `End`.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> (Token, usize) {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn node(&mut self, expr: Expr) -> Result<Expr, FormulaError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(FormulaError::TooLong {
                max_nodes: MAX_NODES,
            });
        }
        Ok(expr)
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            (Token::Op(op), _) if ops.contains(op) => {
                let op = *op;
                self.bump();
                Some(op)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep {
                max_depth: MAX_DEPTH,
            });
        }
        let result = self.or();
        self.depth -= 1;
        result
    }

    fn or(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            let rhs = self.and()?;
            lhs = self.node(Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.compare()?;
        while self.eat_op(&["&&"]).is_some() {
            let rhs = self.compare()?;
            lhs = self.node(Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn compare(&mut self) -> Result<Expr, FormulaError> {
        let lhs = self.sum()?;
        let Some(op) = self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) else {
            return Ok(lhs);
        };
        let op = match op {
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            _ => BinOp::Ge,
        };
        let rhs = self.sum()?;
        self.node(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn sum(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.product()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.product()?;
            let op = if op == "+" { BinOp::Add } else { BinOp::Sub };
            lhs = self.node(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let rhs = self.unary()?;
            let op = match op {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                _ => BinOp::Rem,
            };
            lhs = self.node(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.eat_op(&["-", "!"]) {
            Some("-") => {
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(FormulaError::TooDeep {
                        max_depth: MAX_DEPTH,
                    });
                }
                let inner = self.unary();
                self.depth -= 1;
                self.node(Expr::Neg(Box::new(inner?)))
            }
            Some(_) => {
                self.depth += 1;
                if self.depth > MAX_DEPTH {
                    return Err(FormulaError::TooDeep {
                        max_depth: MAX_DEPTH,
                    });
                }
                let inner = self.unary();
                self.depth -= 1;
                self.node(Expr::Not(Box::new(inner?)))
            }
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let (tok, offset) = self.bump();
        match tok {
            Token::Number(n) => Ok(Expr::Literal(FormulaValue::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(FormulaValue::Text(s))),
            Token::Ident(ident) if ident == "true" => Ok(Expr::Literal(FormulaValue::Bool(true))),
            Token::Ident(ident) if ident == "false" => {
                Ok(Expr::Literal(FormulaValue::Bool(false)))
            }
            Token::Ident(ident) => {
                let mut key = ident;
                while matches!(self.peek(), (Token::Dot, _)) {
                    self.bump();
                    key.push('.');
                    key.push_str(&self.ident()?);
                }
                Ok(Expr::Variable(ResponseKey::parse(&key)))
            }
            Token::Braced(name) => {
                if matches!(self.peek(), (Token::Dot, _)) {
                    self.bump();
                    let id = self.ident()?;
                    Ok(Expr::Variable(ResponseKey::property(name, id)))
                } else {
                    Ok(Expr::Variable(ResponseKey::scalar(name)))
                }
            }
            Token::LParen => {
                let inner = self.expr()?;
                match self.bump() {
                    (Token::RParen, _) => Ok(inner),
                    (found, offset) => Err(FormulaError::Unexpected {
                        found: found.to_string(),
                        expected: "`)`",
                        offset,
                    }),
                }
            }
            found => Err(FormulaError::Unexpected {
                found: found.to_string(),
                expected: "a value",
                offset,
            }),
        }
    }

    fn ident(&mut self) -> Result<String, FormulaError> {
        match self.bump() {
            (Token::Ident(s), _) => Ok(s),
            (found, offset) => Err(FormulaError::Unexpected {
                found: found.to_string(),
                expected: "a property name",
                offset,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{ResponseKey, ResponseMap, StepId};
    use serde_json::json;

    fn responses() -> ResponseMap {
        let step: StepId = "s1".into();
        let mut map = ResponseMap::new();
        map.record(&step, ResponseKey::property("Array", "columns"), json!(4));
        map.record(&step, ResponseKey::property("Array", "rows"), json!(3));
        map.record(&step, ResponseKey::scalar("Short answer"), json!("seven"));
        map.record(&step, ResponseKey::property("Fig. 1", "count"), json!(2));
        map.record(&step, ResponseKey::scalar("Fig. 2"), json!(10));
        map
    }

    fn eval_str(source: &str) -> String {
        let map = responses();
        let slice = map.slice("s1", "Array");
        evaluate(source, &slice).unwrap().to_string()
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval_str("1 + 2 * 3"), "7");
        assert_eq!(eval_str("(1 + 2) * 3"), "9");
        assert_eq!(eval_str("7 % 4 - -1"), "4");
        assert_eq!(eval_str("1 / 4"), "0.25");
    }

    #[test]
    fn test_response_lookup() {
        assert_eq!(eval_str("Array.columns * Array.rows"), "12");
        assert_eq!(eval_str("{Array}.columns + 1"), "5");
        assert_eq!(eval_str("{Short answer}"), "seven");
    }

    #[test]
    fn test_braced_lookup_with_dotted_widget_name() {
        assert_eq!(eval_str("{Fig. 1}.count * {Fig. 2}"), "20");
        assert_eq!(eval_str("{Fig. 1}.missing"), "");
    }

    #[test]
    fn test_unknown_variable_is_empty() {
        assert_eq!(eval_str("Missing.value"), "");
        assert_eq!(eval_str("Missing.value + 2"), "2");
    }

    #[test]
    fn test_string_concatenation_and_comparison() {
        assert_eq!(eval_str("'row ' + Array.rows"), "row 3");
        assert_eq!(eval_str("Array.rows >= 3 && Array.columns < 5"), "true");
        assert_eq!(eval_str("{Short answer} == \"seven\""), "true");
        assert_eq!(eval_str("!(Array.rows == 3)"), "false");
    }

    #[test]
    fn test_rejects_code() {
        assert!(matches!(
            evaluate("alert(1); 2", &()),
            Err(FormulaError::UnexpectedChar { found: ';', .. })
        ));
        assert!(matches!(
            evaluate("1 +", &()),
            Err(FormulaError::Unexpected { .. })
        ));
        assert!(matches!(
            evaluate("\"open", &()),
            Err(FormulaError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(evaluate("1 / 0", &()), Err(FormulaError::DivisionByZero));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(
            evaluate(&deep, &()),
            Err(FormulaError::TooDeep {
                max_depth: MAX_DEPTH
            })
        );
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let chain = vec!["1"; 10_000].join("+");
        assert_eq!(
            evaluate(&chain, &()),
            Err(FormulaError::TooLong {
                max_nodes: MAX_NODES
            })
        );
        let conjunction = vec!["true"; 5_000].join(" && ");
        assert!(matches!(
            evaluate(&conjunction, &()),
            Err(FormulaError::TooLong { .. })
        ));
    }

    #[test]
    fn test_chain_within_limit_evaluates() {
        let chain = vec!["1"; 200].join("+");
        assert_eq!(evaluate(&chain, &()), Ok(FormulaValue::Number(200.0)));
    }
}
