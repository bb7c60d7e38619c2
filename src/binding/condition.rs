//! Trigger Conditions - boolean expressions over a task's bound parameters
//!
//! ```text
//! or      := and ('||' and)*
//! and     := not ('&&' not)*
//! not     := '!' not | cmp
//! cmp     := operand (('=='|'!='|'<'|'<='|'>'|'>=') operand)?
//! operand := inputs.parameter_values['k'] | int(or) | double(or) | string(or)
//!          | 'str' | "str" | number | true | false | '(' or ')'
//! ```
//!
//! Numbers compare numerically and strings lexically; values of different
//! kinds only compare for (in)equality.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::{Number, Value};

use crate::error::KilnError;

const PARAMS_PREFIX: &str = "inputs.parameter_values";

/// Deepest `!` / parenthesis / cast nesting accepted
const MAX_DEPTH: usize = 32;
/// Longest condition accepted, in tokens (bounds `&&` / `||` chains)
const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(Number),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Op(CmpOp),
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cast {
    Int,
    Double,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Cast(Cast, Box<Expr>),
    Param(String),
    Literal(Value),
}

/// A parsed trigger condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, KilnError> {
        let tokens = lex(source).map_err(|reason| parse_error(source, reason))?;
        if tokens.len() > MAX_TOKENS {
            return Err(parse_error(
                source,
                format!("condition exceeds {MAX_TOKENS} tokens"),
            ));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.or().map_err(|reason| parse_error(source, reason))?;
        if parser.pos != parser.tokens.len() {
            return Err(parse_error(source, "trailing input".to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Parameter names the condition reads
    pub fn referenced_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        collect_keys(&self.expr, &mut keys);
        keys
    }

    pub fn evaluate(&self, params: &BTreeMap<String, Value>) -> Result<bool, KilnError> {
        match eval(&self.expr, params).map_err(|reason| self.eval_error(reason))? {
            Value::Bool(b) => Ok(b),
            other => Err(self.eval_error(format!("condition produced {other}, not a boolean"))),
        }
    }

    fn eval_error(&self, reason: String) -> KilnError {
        KilnError::ConditionEval {
            condition: self.source.clone(),
            reason,
        }
    }
}

/// Parse and evaluate in one step
pub fn evaluate_condition(
    source: &str,
    params: &BTreeMap<String, Value>,
) -> Result<bool, KilnError> {
    Condition::parse(source)?.evaluate(params)
}

fn parse_error(source: &str, reason: String) -> KilnError {
    KilnError::ConditionParse {
        condition: source.to_string(),
        reason,
    }
}

fn collect_keys<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Or(a, b) | Expr::And(a, b) | Expr::Cmp(_, a, b) => {
            collect_keys(a, out);
            collect_keys(b, out);
        }
        Expr::Not(e) | Expr::Cast(_, e) => collect_keys(e, out),
        Expr::Param(k) => out.push(k),
        Expr::Literal(_) => {}
    }
}

// ═══════════════════════════════════════════════════════════════
// LEXER
// ═══════════════════════════════════════════════════════════════

fn lex(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CmpOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                let op = match (c, next == Some('=')) {
                    ('<', true) => CmpOp::Le,
                    ('<', false) => CmpOp::Lt,
                    (_, true) => CmpOp::Ge,
                    (_, false) => CmpOp::Gt,
                };
                tokens.push(Token::Op(op));
                i += if next == Some('=') { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".to_string()),
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                s.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-'))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = serde_json::from_str::<Number>(&text)
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '.'))
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run `f` one nesting level deeper
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, String>) -> Result<T, String> {
        if self.depth >= MAX_DEPTH {
            return Err(format!("nesting deeper than {MAX_DEPTH} levels"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.bump() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected {expected:?}, found {t:?}")),
            None => Err(format!("expected {expected:?}, found end of input")),
        }
    }

    fn or(&mut self) -> Result<Expr, String> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut left = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.nested(Self::not)?)));
        }
        self.cmp()
    }

    fn cmp(&mut self) -> Result<Expr, String> {
        let left = self.operand()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.operand()?;
            return Ok(Expr::Cmp(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn operand(&mut self) -> Result<Expr, String> {
        match self.bump() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::LParen) => {
                let inner = self.nested(Self::or)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(ident)) => self.ident_operand(ident),
            Some(t) => Err(format!("unexpected {t:?}")),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn ident_operand(&mut self, ident: String) -> Result<Expr, String> {
        let cast = match ident.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            PARAMS_PREFIX => {
                self.expect(Token::LBracket)?;
                let key = match self.bump() {
                    Some(Token::Str(k)) => k,
                    _ => return Err("expected a quoted parameter name".to_string()),
                };
                self.expect(Token::RBracket)?;
                return Ok(Expr::Param(key));
            }
            "int" => Cast::Int,
            "double" | "float" => Cast::Double,
            "string" | "str" => Cast::Str,
            other => return Err(format!("unknown identifier '{other}'")),
        };
        self.expect(Token::LParen)?;
        let inner = self.nested(Self::or)?;
        self.expect(Token::RParen)?;
        Ok(Expr::Cast(cast, Box::new(inner)))
    }
}

// ═══════════════════════════════════════════════════════════════
// EVALUATION
// ═══════════════════════════════════════════════════════════════

fn as_bool(v: &Value) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("expected a boolean operand, got {v}"))
}

fn eval(expr: &Expr, params: &BTreeMap<String, Value>) -> Result<Value, String> {
    Ok(match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Param(k) => params
            .get(k)
            .cloned()
            .ok_or_else(|| format!("parameter '{k}' is not bound"))?,
        Expr::Not(e) => Value::Bool(!as_bool(&eval(e, params)?)?),
        Expr::And(a, b) => Value::Bool(as_bool(&eval(a, params)?)? && as_bool(&eval(b, params)?)?),
        Expr::Or(a, b) => Value::Bool(as_bool(&eval(a, params)?)? || as_bool(&eval(b, params)?)?),
        Expr::Cast(cast, e) => apply_cast(*cast, eval(e, params)?)?,
        Expr::Cmp(op, a, b) => Value::Bool(compare(*op, &eval(a, params)?, &eval(b, params)?)?),
    })
}

fn apply_cast(cast: Cast, v: Value) -> Result<Value, String> {
    let fail = |v: &Value| format!("cannot convert {v} with {cast:?}");
    Ok(match cast {
        Cast::Str => match v {
            Value::String(_) => v,
            other => Value::String(other.to_string()),
        },
        Cast::Int => {
            let n = match &v {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64)),
                Value::Bool(b) => Some(i64::from(*b)),
                _ => None,
            };
            Value::from(n.ok_or_else(|| fail(&v))?)
        }
        Cast::Double => {
            let f = match &v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            f.and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fail(&v))?
        }
    })
}

fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, String> {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    };

    match (op, ordering) {
        (CmpOp::Eq, Some(o)) => Ok(o == Ordering::Equal),
        (CmpOp::Ne, Some(o)) => Ok(o != Ordering::Equal),
        (CmpOp::Eq, None) => Ok(a == b),
        (CmpOp::Ne, None) => Ok(a != b),
        (CmpOp::Lt, Some(o)) => Ok(o == Ordering::Less),
        (CmpOp::Le, Some(o)) => Ok(o != Ordering::Greater),
        (CmpOp::Gt, Some(o)) => Ok(o == Ordering::Greater),
        (CmpOp::Ge, Some(o)) => Ok(o != Ordering::Less),
        (_, None) => Err(format!("cannot order {a} and {b}")),
    }
}
