//! Parser and printer for math expressions.

use std::fmt;
use thiserror::Error;

use crate::schema::value::{format_number, round_significant, SIGNIFICANT_DIGITS};

/// Nesting bound for the recursive-descent parser.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("wrong number of arguments for {0}")]
    Arity(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("domain error: {0}")]
    Domain(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            Self::Add | Self::Sub => 1,
            Self::Mul | Self::Div | Self::Mod => 2,
            Self::Pow => 4,
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Symbol(String),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Factorial(Box<Expr>),
    /// Function call; `Math.` / `math.` prefixes are already stripped.
    Call(String, Vec<Expr>),
    Matrix(Vec<Expr>),
}

impl Expr {
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn call(name: &str, arg: Expr) -> Expr {
        Expr::Call(name.to_string(), vec![arg])
    }

    /// Whether `symbol` occurs anywhere in the tree.
    pub fn mentions(&self, symbol: &str) -> bool {
        match self {
            Expr::Symbol(name) => name == symbol,
            Expr::Number(_) | Expr::Text(_) => false,
            Expr::Neg(inner) | Expr::Factorial(inner) => inner.mentions(symbol),
            Expr::Binary(_, lhs, rhs) => lhs.mentions(symbol) || rhs.mentions(symbol),
            Expr::Call(_, args) | Expr::Matrix(args) => args.iter().any(|a| a.mentions(symbol)),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary(op, _, _) => op.precedence(),
            Expr::Neg(_) => 3,
            Expr::Number(n) if *n < 0.0 => 3,
            Expr::Factorial(_) => 5,
            _ => 6,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => f.write_str(&format_number(round_significant(*n, SIGNIFICANT_DIGITS))),
            Expr::Text(s) => write!(f, "{:?}", s),
            Expr::Symbol(name) => f.write_str(name),
            Expr::Neg(inner) => {
                f.write_str("-")?;
                write_operand(f, inner, inner.precedence() < 3)
            }
            Expr::Binary(op, lhs, rhs) => {
                let prec = op.precedence();
                // `^` is right-associative; the others group to the left.
                let (wrap_lhs, wrap_rhs) = if *op == BinaryOp::Pow {
                    (lhs.precedence() <= prec, rhs.precedence() < prec)
                } else {
                    (lhs.precedence() < prec, rhs.precedence() <= prec && !regroups(*op, rhs))
                };
                write_operand(f, lhs, wrap_lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs, wrap_rhs)
            }
            Expr::Factorial(inner) => {
                write_operand(f, inner, inner.precedence() < 6)?;
                f.write_str("!")
            }
            Expr::Call(name, args) => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::Matrix(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
        }
    }
}

/// `a + (b - c)` and `a * (b / c)` read the same without parentheses.
fn regroups(op: BinaryOp, rhs: &Expr) -> bool {
    matches!(
        (op, rhs),
        (BinaryOp::Add, Expr::Binary(BinaryOp::Add | BinaryOp::Sub, _, _))
            | (BinaryOp::Mul, Expr::Binary(BinaryOp::Mul | BinaryOp::Div, _, _))
    )
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr, wrap: bool) -> fmt::Result {
    if wrap {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Str(String),
    Op(char),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            c if c.is_ascii_digit()
                || (c == '.' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                while i < len && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent only when digits follow; `2e` is 2 * e.
                if i < len && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < len && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < len && chars[j].is_ascii_digit() {
                        i = j;
                        while i < len && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let raw: String = chars[start..i].iter().collect();
                let n = raw
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedToken(raw.clone()))?;
                tokens.push(Token::Num(n));
                // Implicit multiplication: `4i`, `2x`, `3(x + 1)`.
                if i < len && (is_ident_start(chars[i]) || chars[i] == '(') {
                    tokens.push(Token::Op('*'));
                }
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < len && is_ident_part(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut text = String::new();
                while i < len && chars[i] != quote {
                    if chars[i] == '\\' && i + 1 < len {
                        i += 1;
                    }
                    text.push(chars[i]);
                    i += 1;
                }
                if i >= len {
                    return Err(ExprError::UnexpectedEnd);
                }
                i += 1;
                tokens.push(Token::Str(text));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '^' | '!' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
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
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Parse `input` into an expression tree.
pub fn parse_expression(input: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser {
        tokens: tokenize(input)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expression()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some(token) => Err(ExprError::UnexpectedToken(format!("{:?}", token))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(ExprError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(ExprError::UnexpectedToken(format!("{:?}", token)))
        }
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(c)) if ops.contains(c) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        self.descend()?;
        let mut lhs = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            lhs = Expr::binary(op, lhs, rhs);
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/', '%']) {
            let rhs = self.unary()?;
            let op = match op {
                '*' => BinaryOp::Mul,
                '/' => BinaryOp::Div,
                _ => BinaryOp::Mod,
            };
            lhs = Expr::binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        self.descend()?;
        let expr = match self.eat_op(&['-', '+']) {
            Some('-') => Expr::Neg(Box::new(self.unary()?)),
            Some(_) => self.unary()?,
            None => self.power()?,
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.postfix()?;
        if self.eat_op(&['^']).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        while self.eat_op(&['!']).is_some() {
            expr = Expr::Factorial(Box::new(expr));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next()? {
            Token::Num(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Text(s)),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => Ok(Expr::Matrix(self.list(Token::RBracket)?)),
            Token::Ident(mut name) => {
                if (name == "Math" || name == "math") && self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    match self.next()? {
                        Token::Ident(member) => name = member,
                        other => return Err(ExprError::UnexpectedToken(format!("{:?}", other))),
                    }
                }
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    return Ok(Expr::Call(name, self.list(Token::RParen)?));
                }
                Ok(Expr::Symbol(name))
            }
            other => Err(ExprError::UnexpectedToken(format!("{:?}", other))),
        }
    }

    /// Comma-separated expressions up to `close`.
    fn list(&mut self, close: Token) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.peek() == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            match self.next()? {
                Token::Comma => continue,
                token if token == close => return Ok(items),
                other => return Err(ExprError::UnexpectedToken(format!("{:?}", other))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show(input: &str) -> String {
        parse_expression(input).unwrap().to_string()
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(show("1 + 2 * 3"), "1 + 2 * 3");
        assert_eq!(show("(1 + 2) * 3"), "(1 + 2) * 3");
        assert_eq!(show("2 ^ 3 ^ 2"), "2 ^ 3 ^ 2");
        assert_eq!(show("(2 ^ 3) ^ 2"), "(2 ^ 3) ^ 2");
        assert_eq!(show("10 - (4 - 1)"), "10 - (4 - 1)");
        assert_eq!(show("-2^2"), "-2 ^ 2");
    }

    #[test]
    fn unary_binds_looser_than_power() {
        let expr = parse_expression("-2^2").unwrap();
        assert!(matches!(expr, Expr::Neg(ref inner) if matches!(**inner, Expr::Binary(BinaryOp::Pow, _, _))));
    }

    #[test]
    fn namespaces_are_stripped() {
        assert_eq!(
            parse_expression("Math.max(1, math.floor(2.5))").unwrap(),
            Expr::Call(
                "max".to_string(),
                vec![
                    Expr::Number(1.0),
                    Expr::Call("floor".to_string(), vec![Expr::Number(2.5)])
                ]
            )
        );
    }

    #[test]
    fn implicit_multiplication_after_numbers() {
        assert_eq!(show("3 + 4i"), "3 + 4 * i");
        assert_eq!(show("2(x + 1)"), "2 * (x + 1)");
        assert_eq!(show("2e"), "2 * e");
        assert_eq!(parse_expression("1e3").unwrap(), Expr::Number(1000.0));
    }

    #[test]
    fn power_operators() {
        assert_eq!(parse_expression("2**3").unwrap(), parse_expression("2^3").unwrap());
    }

    #[test]
    fn matrices_and_strings() {
        assert_eq!(show("det([[1, 2], [3, 4]])"), "det([[1, 2], [3, 4]])");
        assert_eq!(
            parse_expression("derivative('x^2', 'x')").unwrap(),
            Expr::Call(
                "derivative".to_string(),
                vec![Expr::Text("x^2".into()), Expr::Text("x".into())]
            )
        );
    }

    #[test]
    fn malformed_input() {
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("(1").is_err());
        assert!(parse_expression("1 2").is_err());
        assert!(parse_expression("a # b").is_err());
        assert!(parse_expression("").is_err());
    }

    #[test]
    fn depth_is_bounded() {
        let deep = "(".repeat(MAX_DEPTH + 5) + "1" + &")".repeat(MAX_DEPTH + 5);
        assert_eq!(parse_expression(&deep), Err(ExprError::TooDeep));
        let negations = "-".repeat(MAX_DEPTH + 5) + "1";
        assert_eq!(parse_expression(&negations), Err(ExprError::TooDeep));
    }

    #[test]
    fn mentions_symbol() {
        let expr = parse_expression("sin(x) * 2 + y").unwrap();
        assert!(expr.mentions("x"));
        assert!(expr.mentions("y"));
        assert!(!expr.mentions("z"));
    }
}
