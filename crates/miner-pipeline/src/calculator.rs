//! Infix expression evaluator used by the Calculator family of strategies.
//!
//! Grammar:
//! ```text
//! Or         ::= And ( ('||' | 'or') And )*
//! And        ::= Equality ( ('&&' | 'and') Equality )*
//! Equality   ::= Relation ( ('==' | '!=') Relation )*
//! Relation   ::= Sum ( ('<' | '<=' | '>' | '>=') Sum )*
//! Sum        ::= Product ( ('+' | '-') Product )*
//! Product    ::= Unary ( ('*' | '/' | '%') Unary )*
//! Unary      ::= ('-' | '+' | '!') Unary | Power
//! Power      ::= Primary ( '^' Unary )?
//! Primary    ::= Number | Name '(' Args ')' | Name | '(' Or ')'
//! ```
//!
//! Comparisons and logical operators yield `1` or `0`.

use miner_types::{to_double, MinerError, Resource, Result, SharedResource};

/// Symbol lookup used during evaluation.
pub trait VariablePool {
    fn exists(&self, name: &str) -> bool;
    fn value(&self, name: &str, index: usize) -> Result<String>;
}

/// Resolves names against a resource first, then the global pool in order.
pub struct ResourcePool<'a> {
    resource: &'a Resource,
    globals: &'a [SharedResource],
}

impl<'a> ResourcePool<'a> {
    pub fn new(resource: &'a Resource, globals: &'a [SharedResource]) -> Self {
        Self { resource, globals }
    }
}

impl VariablePool for ResourcePool<'_> {
    fn exists(&self, name: &str) -> bool {
        self.resource.exists(name) || self.globals.iter().any(|g| g.exists(name))
    }

    fn value(&self, name: &str, index: usize) -> Result<String> {
        if self.resource.exists(name) {
            return self.resource.value(name, index);
        }
        for global in self.globals {
            if global.exists(name) {
                return global.value(name, index);
            }
        }
        Err(MinerError::Evaluation(format!(
            "variable \"{name}\" not found in resource {} or globals",
            self.resource.name()
        )))
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

const OPERATORS: &[&str] = &[
    "&&", "||", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "^", "<", ">", "!",
];

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal.parse::<f64>().map_err(|_| {
                MinerError::Evaluation(format!("invalid number \"{literal}\" in \"{text}\""))
            })?;
            tokens.push(Token::Number(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            match name.to_ascii_lowercase().as_str() {
                "and" => tokens.push(Token::Op("&&")),
                "or" => tokens.push(Token::Op("||")),
                _ => tokens.push(Token::Name(name)),
            }
            continue;
        }
        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
                    return Err(MinerError::Evaluation(format!(
                        "unexpected character '{c}' in \"{text}\""
                    )));
                };
                tokens.push(Token::Op(op));
                i += op.len();
                continue;
            }
        }
        i += 1;
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(String),
    Unary(&'static str, Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    text: &'t str,
}

impl<'t> Parser<'t> {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn error(&self, message: &str) -> MinerError {
        MinerError::Evaluation(format!("{message} in equation \"{}\"", self.text))
    }

    fn binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut lhs = next(self)?;
        while let Some(op) = self.peek_op().filter(|op| ops.contains(op)) {
            self.pos += 1;
            let rhs = next(self)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr> {
        self.binary_level(&["||"], Self::and)
    }

    fn and(&mut self) -> Result<Expr> {
        self.binary_level(&["&&"], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(&["==", "!="], Self::relation)
    }

    fn relation(&mut self) -> Result<Expr> {
        self.binary_level(&["<", "<=", ">", ">="], Self::sum)
    }

    fn sum(&mut self) -> Result<Expr> {
        self.binary_level(&["+", "-"], Self::product)
    }

    fn product(&mut self) -> Result<Expr> {
        self.binary_level(&["*", "/", "%"], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek_op() {
            Some(op @ ("-" | "!")) => {
                self.pos += 1;
                Ok(Expr::Unary(op, Box::new(self.unary()?)))
            }
            Some("+") => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if self.peek_op() == Some("^") {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary("^", Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Name(name) => {
                if self.tokens.get(self.pos) == Some(&Token::LParen) {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if self.tokens.get(self.pos) == Some(&Token::RParen) {
                        self.pos += 1;
                    } else {
                        loop {
                            args.push(self.or()?);
                            match self.tokens.get(self.pos) {
                                Some(Token::Comma) => self.pos += 1,
                                Some(Token::RParen) => {
                                    self.pos += 1;
                                    break;
                                }
                                _ => return Err(self.error("expected ',' or ')'")),
                            }
                        }
                    }
                    Ok(Expr::Call(name.to_ascii_lowercase(), args))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Token::LParen => {
                let inner = self.or()?;
                if self.tokens.get(self.pos) != Some(&Token::RParen) {
                    return Err(self.error("missing ')'"));
                }
                self.pos += 1;
                Ok(inner)
            }
            other => Err(self.error(&format!("unexpected token {other:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// A compiled equation.
#[derive(Debug, Clone)]
pub struct Calculator {
    equation: String,
    expr: Expr,
}

impl Calculator {
    /// Parse an equation. Syntax errors are `MinerError::Evaluation`.
    pub fn compile(equation: &str) -> Result<Self> {
        let tokens = tokenize(equation)?;
        if tokens.is_empty() {
            return Err(MinerError::Evaluation("empty equation".into()));
        }
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            text: equation,
        };
        let expr = parser.or()?;
        if parser.pos != tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            equation: equation.to_string(),
            expr,
        })
    }

    pub fn equation(&self) -> &str {
        &self.equation
    }

    /// Names referenced by the equation, in order of first use.
    pub fn variables(&self) -> Vec<String> {
        fn walk(expr: &Expr, out: &mut Vec<String>) {
            match expr {
                Expr::Number(_) => {}
                Expr::Variable(name) => {
                    if !out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                        out.push(name.clone());
                    }
                }
                Expr::Unary(_, e) => walk(e, out),
                Expr::Binary(_, l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                Expr::Call(_, args) => args.iter().for_each(|a| walk(a, out)),
            }
        }
        let mut out = Vec::new();
        walk(&self.expr, &mut out);
        out
    }

    pub fn evaluate(&self, pool: &dyn VariablePool) -> Result<f64> {
        eval(&self.expr, pool)
    }
}

fn truth(value: f64) -> bool {
    value != 0.0
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn eval(expr: &Expr, pool: &dyn VariablePool) -> Result<f64> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Variable(name) => {
            if pool.exists(name) {
                return to_double(&pool.value(name, 0)?).map_err(|_| {
                    MinerError::Evaluation(format!("variable \"{name}\" is not numeric"))
                });
            }
            match name.to_ascii_lowercase().as_str() {
                "pi" => Ok(std::f64::consts::PI),
                "e" => Ok(std::f64::consts::E),
                _ => Err(MinerError::Evaluation(format!(
                    "variable \"{name}\" does not exist"
                ))),
            }
        }
        Expr::Unary(op, inner) => {
            let v = eval(inner, pool)?;
            Ok(match *op {
                "-" => -v,
                _ => flag(!truth(v)),
            })
        }
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, pool)?;
            match *op {
                "&&" if !truth(a) => return Ok(0.0),
                "||" if truth(a) => return Ok(1.0),
                _ => {}
            }
            let b = eval(rhs, pool)?;
            match *op {
                "+" => Ok(a + b),
                "-" => Ok(a - b),
                "*" => Ok(a * b),
                "/" | "%" if b == 0.0 => Err(MinerError::Evaluation("division by zero".into())),
                "/" => Ok(a / b),
                "%" => Ok(a % b),
                "^" => Ok(a.powf(b)),
                "<" => Ok(flag(a < b)),
                "<=" => Ok(flag(a <= b)),
                ">" => Ok(flag(a > b)),
                ">=" => Ok(flag(a >= b)),
                "==" => Ok(flag(a == b)),
                "!=" => Ok(flag(a != b)),
                "&&" | "||" => Ok(flag(truth(b))),
                other => Err(MinerError::Evaluation(format!("unknown operator {other}"))),
            }
        }
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, pool))
                .collect::<Result<Vec<f64>>>()?;
            call(name, &values)
        }
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64> {
    let unary = |f: fn(f64) -> f64| -> Result<f64> {
        match args {
            [x] => Ok(f(*x)),
            _ => Err(MinerError::Evaluation(format!(
                "{name}() takes 1 argument, got {}",
                args.len()
            ))),
        }
    };
    let binary = |f: fn(f64, f64) -> f64| -> Result<f64> {
        match args {
            [x, y] => Ok(f(*x, *y)),
            _ => Err(MinerError::Evaluation(format!(
                "{name}() takes 2 arguments, got {}",
                args.len()
            ))),
        }
    };
    match name {
        "abs" => unary(f64::abs),
        "sqrt" => unary(f64::sqrt),
        "exp" => unary(f64::exp),
        "ln" | "log" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "asin" => unary(f64::asin),
        "acos" => unary(f64::acos),
        "atan" => unary(f64::atan),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "round" => unary(f64::round),
        "rads" => unary(f64::to_radians),
        "degs" => unary(f64::to_degrees),
        "atan2" => binary(f64::atan2),
        "pow" => binary(f64::powf),
        "min" | "max" => {
            if args.is_empty() {
                return Err(MinerError::Evaluation(format!("{name}() needs arguments")));
            }
            let pick = if name == "min" { f64::min } else { f64::max };
            Ok(args[1..].iter().fold(args[0], |acc, v| pick(acc, *v)))
        }
        other => Err(MinerError::Evaluation(format!("unknown function {other}()"))),
    }
}

/// Render a numeric result for storage in a keyword.
pub fn format_number(value: f64) -> String {
    format!("{value}")
}
