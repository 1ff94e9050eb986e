//! Numeric evaluation of math expressions.
//!
//! Covers real and complex arithmetic, list-valued matrices, sample
//! statistics and symbolic `derivative`. Random draws come from the
//! engine's seeded RNG so a fixed seed gives reproducible batches.

use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use super::calculus::derivative;
use super::expr::{parse_expression, BinaryOp, Expr, ExprError};
use crate::schema::value::{format_number, round_significant, SIGNIFICANT_DIGITS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub const I: Complex = Complex { re: 0.0, im: 1.0 };

    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    pub fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }

    pub fn arg(self) -> f64 {
        self.im.atan2(self.re)
    }

    pub fn conj(self) -> Self {
        Self::new(self.re, -self.im)
    }

    pub fn sqrt(self) -> Self {
        let r = self.norm();
        let re = ((r + self.re) / 2.0).sqrt();
        let im = ((r - self.re) / 2.0).sqrt();
        Self::new(re, if self.im < 0.0 { -im } else { im })
    }

    pub fn exp(self) -> Self {
        let m = self.re.exp();
        Self::new(m * self.im.cos(), m * self.im.sin())
    }

    pub fn ln(self) -> Self {
        Self::new(self.norm().ln(), self.arg())
    }

    pub fn pow(self, exponent: Complex) -> Self {
        if self.re == 0.0 && self.im == 0.0 {
            let zero_exponent = exponent.re == 0.0 && exponent.im == 0.0;
            return Self::new(if zero_exponent { 1.0 } else { 0.0 }, 0.0);
        }
        (exponent * self.ln()).exp()
    }
}

impl From<f64> for Complex {
    fn from(re: f64) -> Self {
        Self::new(re, 0.0)
    }
}

impl Add for Complex {
    type Output = Complex;
    fn add(self, rhs: Complex) -> Complex {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl Sub for Complex {
    type Output = Complex;
    fn sub(self, rhs: Complex) -> Complex {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl Mul for Complex {
    type Output = Complex;
    fn mul(self, rhs: Complex) -> Complex {
        Complex::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl Div for Complex {
    type Output = Complex;
    fn div(self, rhs: Complex) -> Complex {
        let denom = rhs.re * rhs.re + rhs.im * rhs.im;
        Complex::new(
            (self.re * rhs.re + self.im * rhs.im) / denom,
            (self.im * rhs.re - self.re * rhs.im) / denom,
        )
    }
}

impl Neg for Complex {
    type Output = Complex;
    fn neg(self) -> Complex {
        Complex::new(-self.re, -self.im)
    }
}

fn show(x: f64) -> String {
    format_number(round_significant(x, SIGNIFICANT_DIGITS))
}

fn imaginary(im: f64) -> String {
    if im == 1.0 {
        "i".to_string()
    } else {
        format!("{}i", show(im))
    }
}

/// `3 + 4i`, `3 - 4i`, `4i`, `-i`, `3`.
impl fmt::Display for Complex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let re = round_significant(self.re, SIGNIFICANT_DIGITS);
        let im = round_significant(self.im, SIGNIFICANT_DIGITS);
        match (re == 0.0, im == 0.0) {
            (_, true) => f.write_str(&show(re)),
            (true, false) if im == -1.0 => f.write_str("-i"),
            (true, false) => f.write_str(&imaginary(im)),
            (false, false) => {
                let sign = if im < 0.0 { '-' } else { '+' };
                write!(f, "{} {} {}", show(re), sign, imaginary(im.abs()))
            }
        }
    }
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum MathValue {
    Number(f64),
    Complex(Complex),
    /// Vector or nested rows.
    Matrix(Vec<MathValue>),
    Text(String),
}

impl fmt::Display for MathValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathValue::Number(x) => f.write_str(&show(*x)),
            MathValue::Complex(c) => write!(f, "{}", c),
            MathValue::Matrix(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            MathValue::Text(s) => f.write_str(s),
        }
    }
}

fn type_error(what: &str) -> ExprError {
    ExprError::Type(what.to_string())
}

fn constant(name: &str) -> Option<MathValue> {
    let x = match name {
        "pi" | "PI" => consts::PI,
        "e" | "E" => consts::E,
        "tau" | "TAU" => consts::TAU,
        "phi" | "PHI" => (1.0 + 5f64.sqrt()) / 2.0,
        "inf" | "Infinity" => f64::INFINITY,
        "LN2" => consts::LN_2,
        "LN10" => consts::LN_10,
        "LOG2E" => consts::LOG2_E,
        "LOG10E" => consts::LOG10_E,
        "SQRT2" => consts::SQRT_2,
        "SQRT1_2" => consts::FRAC_1_SQRT_2,
        "i" => return Some(MathValue::Complex(Complex::I)),
        _ => return None,
    };
    Some(MathValue::Number(x))
}

/// Evaluates expressions against a borrowed random source.
pub struct Evaluator<'r> {
    rng: &'r mut StdRng,
}

impl<'r> Evaluator<'r> {
    pub fn new(rng: &'r mut StdRng) -> Self {
        Self { rng }
    }

    pub fn evaluate(&mut self, input: &str) -> Result<MathValue, ExprError> {
        let expr = parse_expression(input)?;
        self.eval(&expr)
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<MathValue, ExprError> {
        match expr {
            Expr::Number(x) => Ok(MathValue::Number(*x)),
            Expr::Text(s) => Ok(MathValue::Text(s.clone())),
            Expr::Symbol(name) => {
                constant(name).ok_or_else(|| ExprError::UnknownSymbol(name.clone()))
            }
            Expr::Neg(inner) => negate(self.eval(inner)?),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
            Expr::Factorial(inner) => match self.eval(inner)? {
                MathValue::Number(x) => factorial(x).map(MathValue::Number),
                _ => Err(type_error("factorial expects a number")),
            },
            Expr::Matrix(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(MathValue::Matrix),
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, args)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<MathValue>) -> Result<MathValue, ExprError> {
        use MathValue::{Complex as C, Matrix, Number, Text};

        let value = match name {
            "abs" | "fabs" => match one(name, args)? {
                C(c) => Number(c.norm()),
                v => map_real(v, f64::abs)?,
            },
            "sqrt" => match one(name, args)? {
                Number(x) if x < 0.0 => C(Complex::from(x).sqrt()),
                C(c) => C(c.sqrt()),
                v => map_real(v, f64::sqrt)?,
            },
            "exp" => match one(name, args)? {
                C(c) => C(c.exp()),
                v => map_real(v, f64::exp)?,
            },
            "log" if args.len() == 2 => {
                let (x, base) = two_numbers(name, args)?;
                Number(x.ln() / base.ln())
            }
            "log" => match one(name, args)? {
                Number(x) if x < 0.0 => C(Complex::from(x).ln()),
                C(c) => C(c.ln()),
                v => map_real(v, f64::ln)?,
            },
            "cbrt" => map_real(one(name, args)?, f64::cbrt)?,
            "isqrt" => map_real(one(name, args)?, |x| x.sqrt().floor())?,
            "degrees" => map_real(one(name, args)?, f64::to_degrees)?,
            "radians" => map_real(one(name, args)?, f64::to_radians)?,
            "square" => map_real(one(name, args)?, |x| x * x)?,
            "cube" => map_real(one(name, args)?, |x| x * x * x)?,
            "log10" => map_real(one(name, args)?, f64::log10)?,
            "log2" => map_real(one(name, args)?, f64::log2)?,
            "log1p" => map_real(one(name, args)?, f64::ln_1p)?,
            "expm1" => map_real(one(name, args)?, f64::exp_m1)?,
            "ceil" => map_real(one(name, args)?, f64::ceil)?,
            "floor" => map_real(one(name, args)?, f64::floor)?,
            "trunc" | "fix" => map_real(one(name, args)?, f64::trunc)?,
            "sign" => map_real(one(name, args)?, |x| if x == 0.0 { 0.0 } else { x.signum() })?,
            "sin" => map_real(one(name, args)?, f64::sin)?,
            "cos" => map_real(one(name, args)?, f64::cos)?,
            "tan" => map_real(one(name, args)?, f64::tan)?,
            "asin" => map_real(one(name, args)?, f64::asin)?,
            "acos" => map_real(one(name, args)?, f64::acos)?,
            "atan" => map_real(one(name, args)?, f64::atan)?,
            "sinh" => map_real(one(name, args)?, f64::sinh)?,
            "cosh" => map_real(one(name, args)?, f64::cosh)?,
            "tanh" => map_real(one(name, args)?, f64::tanh)?,
            "asinh" => map_real(one(name, args)?, f64::asinh)?,
            "acosh" => map_real(one(name, args)?, f64::acosh)?,
            "atanh" => map_real(one(name, args)?, f64::atanh)?,
            "round" if args.len() == 2 => {
                let (x, places) = two_numbers(name, args)?;
                let scale = 10f64.powi(places as i32);
                Number((x * scale).round() / scale)
            }
            "round" => map_real(one(name, args)?, f64::round)?,
            "atan2" => {
                let (y, x) = two_numbers(name, args)?;
                Number(y.atan2(x))
            }
            "hypot" => Number(numbers(name, &args)?.iter().map(|x| x * x).sum::<f64>().sqrt()),
            "pow" => {
                let (base, exponent) = two(name, args)?;
                binary(BinaryOp::Pow, base, exponent)?
            }
            "mod" => {
                let (x, m) = two(name, args)?;
                binary(BinaryOp::Mod, x, m)?
            }
            "add" => fold(name, args, BinaryOp::Add)?,
            "subtract" => {
                let (a, b) = two(name, args)?;
                binary(BinaryOp::Sub, a, b)?
            }
            "multiply" => fold(name, args, BinaryOp::Mul)?,
            "divide" => {
                let (a, b) = two(name, args)?;
                binary(BinaryOp::Div, a, b)?
            }
            "factorial" => match one(name, args)? {
                Number(x) => Number(factorial(x)?),
                _ => return Err(type_error("factorial expects a number")),
            },
            "gcd" => Number(integers(name, &args)?.into_iter().reduce(gcd).unwrap_or(0.0)),
            "lcm" => Number(
                integers(name, &args)?
                    .into_iter()
                    .reduce(|a, b| if a == 0.0 || b == 0.0 { 0.0 } else { (a * b).abs() / gcd(a, b) })
                    .unwrap_or(0.0),
            ),
            "min" => Number(numbers(name, &args)?.into_iter().fold(f64::INFINITY, f64::min)),
            "max" => Number(numbers(name, &args)?.into_iter().fold(f64::NEG_INFINITY, f64::max)),
            "sum" => Number(numbers(name, &args)?.iter().sum()),
            "prod" => Number(numbers(name, &args)?.iter().product()),
            "mean" => Number(mean(&numbers(name, &args)?)),
            "median" => Number(median(numbers(name, &args)?)),
            "variance" | "var" => Number(variance(&numbers(name, &args)?)),
            "std" => Number(variance(&numbers(name, &args)?).sqrt()),
            "random" => {
                let unit: f64 = self.rng.gen();
                match args.len() {
                    0 => Number(unit),
                    1 => Number(unit * as_number(&args[0])?),
                    2 => {
                        let (lo, hi) = (as_number(&args[0])?, as_number(&args[1])?);
                        Number(lo + unit * (hi - lo))
                    }
                    _ => return Err(ExprError::Arity(name.to_string())),
                }
            }
            "det" => Number(determinant(&one(name, args)?)?),
            "transpose" => transpose(one(name, args)?)?,
            "size" => Matrix(size(&one(name, args)?).into_iter().map(|n| Number(n as f64)).collect()),
            "complex" => match args.as_slice() {
                [re] => C(Complex::from(as_number(re)?)),
                [re, im] => C(Complex::new(as_number(re)?, as_number(im)?)),
                _ => return Err(ExprError::Arity(name.to_string())),
            },
            "re" | "im" | "conj" | "arg" => {
                let c = match one(name, args)? {
                    Number(x) => Complex::from(x),
                    C(c) => c,
                    _ => return Err(type_error("expected a number")),
                };
                match name {
                    "re" => Number(c.re),
                    "im" => Number(c.im),
                    "conj" => C(c.conj()),
                    _ => Number(c.arg()),
                }
            }
            "derivative" => {
                let (expr, var) = match two(name, args)? {
                    (Text(expr), Text(var)) => (expr, var),
                    _ => return Err(type_error("derivative expects an expression and a variable name")),
                };
                Text(derivative(&parse_expression(&expr)?, var.trim())?.to_string())
            }
            _ => return Err(ExprError::UnknownFunction(name.to_string())),
        };
        Ok(value)
    }
}

fn one(name: &str, mut args: Vec<MathValue>) -> Result<MathValue, ExprError> {
    match args.len() {
        1 => Ok(args.remove(0)),
        _ => Err(ExprError::Arity(name.to_string())),
    }
}

fn two(name: &str, args: Vec<MathValue>) -> Result<(MathValue, MathValue), ExprError> {
    let mut it = args.into_iter();
    match (it.next(), it.next(), it.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(ExprError::Arity(name.to_string())),
    }
}

fn two_numbers(name: &str, args: Vec<MathValue>) -> Result<(f64, f64), ExprError> {
    let (a, b) = two(name, args)?;
    Ok((as_number(&a)?, as_number(&b)?))
}

fn as_number(value: &MathValue) -> Result<f64, ExprError> {
    match value {
        MathValue::Number(x) => Ok(*x),
        _ => Err(type_error("expected a real number")),
    }
}

fn fold(name: &str, args: Vec<MathValue>, op: BinaryOp) -> Result<MathValue, ExprError> {
    if args.len() < 2 {
        return Err(ExprError::Arity(name.to_string()));
    }
    let mut it = args.into_iter();
    let mut acc = it.next().ok_or_else(|| ExprError::Arity(name.to_string()))?;
    for next in it {
        acc = binary(op, acc, next)?;
    }
    Ok(acc)
}

/// Apply a real function to a number, or to every number in a matrix.
fn map_real(value: MathValue, f: impl Fn(f64) -> f64 + Copy) -> Result<MathValue, ExprError> {
    match value {
        MathValue::Number(x) => Ok(MathValue::Number(f(x))),
        MathValue::Matrix(items) => items
            .into_iter()
            .map(|item| map_real(item, f))
            .collect::<Result<Vec<_>, _>>()
            .map(MathValue::Matrix),
        MathValue::Complex(_) => Err(type_error("function is not defined for complex numbers")),
        MathValue::Text(_) => Err(type_error("function expects a number")),
    }
}

/// Flatten scalar and matrix arguments into a list of reals.
fn numbers(name: &str, args: &[MathValue]) -> Result<Vec<f64>, ExprError> {
    fn collect(value: &MathValue, out: &mut Vec<f64>) -> Result<(), ExprError> {
        match value {
            MathValue::Number(x) => out.push(*x),
            MathValue::Matrix(items) => {
                for item in items {
                    collect(item, out)?;
                }
            }
            _ => return Err(type_error("expected real numbers")),
        }
        Ok(())
    }
    let mut out = Vec::new();
    for arg in args {
        collect(arg, &mut out)?;
    }
    if out.is_empty() {
        return Err(ExprError::Arity(name.to_string()));
    }
    Ok(out)
}

fn integers(name: &str, args: &[MathValue]) -> Result<Vec<f64>, ExprError> {
    let values = numbers(name, args)?;
    if values.iter().any(|x| x.fract() != 0.0) {
        return Err(ExprError::Domain(format!("{} expects integers", name)));
    }
    Ok(values)
}

fn gcd(a: f64, b: f64) -> f64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0.0 {
        (a, b) = (b, a % b);
    }
    a
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Sample variance (normalized by `n - 1`).
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

fn factorial(x: f64) -> Result<f64, ExprError> {
    if x < 0.0 || x.fract() != 0.0 || x > 170.0 {
        return Err(ExprError::Domain(format!("factorial of {}", show(x))));
    }
    Ok((1..=x as u64).map(|k| k as f64).product())
}

fn negate(value: MathValue) -> Result<MathValue, ExprError> {
    match value {
        MathValue::Number(x) => Ok(MathValue::Number(-x)),
        MathValue::Complex(c) => Ok(MathValue::Complex(-c)),
        matrix @ MathValue::Matrix(_) => binary(BinaryOp::Mul, MathValue::Number(-1.0), matrix),
        MathValue::Text(_) => Err(type_error("cannot negate text")),
    }
}

fn to_complex(value: &MathValue) -> Option<Complex> {
    match value {
        MathValue::Number(x) => Some(Complex::from(*x)),
        MathValue::Complex(c) => Some(*c),
        _ => None,
    }
}

fn binary(op: BinaryOp, lhs: MathValue, rhs: MathValue) -> Result<MathValue, ExprError> {
    use MathValue::{Matrix, Number, Text};

    match (lhs, rhs) {
        (Text(_), _) | (_, Text(_)) => Err(ExprError::Type(format!(
            "operator {} does not apply to text",
            op.symbol()
        ))),
        (Number(a), Number(b)) => real_binary(op, a, b),
        (Matrix(a), Matrix(b)) => matrix_binary(op, a, b),
        (Matrix(items), scalar) => items
            .into_iter()
            .map(|item| binary(op, item, scalar.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map(Matrix),
        (scalar, Matrix(items)) if matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul) => items
            .into_iter()
            .map(|item| binary(op, scalar.clone(), item))
            .collect::<Result<Vec<_>, _>>()
            .map(Matrix),
        (_, Matrix(_)) => Err(ExprError::Type(format!(
            "operator {} does not accept a matrix on the right",
            op.symbol()
        ))),
        (a, b) => match (to_complex(&a), to_complex(&b)) {
            (Some(a), Some(b)) => complex_binary(op, a, b),
            _ => Err(type_error("unsupported operands")),
        },
    }
}

fn real_binary(op: BinaryOp, a: f64, b: f64) -> Result<MathValue, ExprError> {
    let x = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        // Floored modulo; the sign follows the divisor.
        BinaryOp::Mod if b == 0.0 => a,
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow if a < 0.0 && b.fract() != 0.0 => {
            return Ok(MathValue::Complex(Complex::from(a).pow(Complex::from(b))));
        }
        BinaryOp::Pow => a.powf(b),
    };
    Ok(MathValue::Number(x))
}

fn complex_binary(op: BinaryOp, a: Complex, b: Complex) -> Result<MathValue, ExprError> {
    let c = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Pow => a.pow(b),
        BinaryOp::Mod => return Err(type_error("modulo is not defined for complex numbers")),
    };
    Ok(MathValue::Complex(c))
}

/// Rows of a two-dimensional matrix, or `None` for a plain vector.
fn rows(items: &[MathValue]) -> Option<Vec<&[MathValue]>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|row| match row {
            MathValue::Matrix(cells) => Some(cells.as_slice()),
            _ => None,
        })
        .collect()
}

fn matrix_binary(op: BinaryOp, a: Vec<MathValue>, b: Vec<MathValue>) -> Result<MathValue, ExprError> {
    match op {
        BinaryOp::Add | BinaryOp::Sub => {
            if a.len() != b.len() {
                return Err(ExprError::Domain("matrix dimensions differ".to_string()));
            }
            a.into_iter()
                .zip(b)
                .map(|(x, y)| binary(op, x, y))
                .collect::<Result<Vec<_>, _>>()
                .map(MathValue::Matrix)
        }
        BinaryOp::Mul => matrix_product(&a, &b),
        _ => Err(ExprError::Type(format!(
            "operator {} is not defined between matrices",
            op.symbol()
        ))),
    }
}

fn dot(a: &[MathValue], b: &[MathValue]) -> Result<MathValue, ExprError> {
    if a.len() != b.len() {
        return Err(ExprError::Domain("matrix dimensions differ".to_string()));
    }
    let mut acc = MathValue::Number(0.0);
    for (x, y) in a.iter().zip(b) {
        let product = binary(BinaryOp::Mul, x.clone(), y.clone())?;
        acc = binary(BinaryOp::Add, acc, product)?;
    }
    Ok(acc)
}

fn column(rows: &[&[MathValue]], j: usize) -> Result<Vec<MathValue>, ExprError> {
    rows.iter()
        .map(|row| row.get(j).cloned().ok_or_else(|| ExprError::Domain("ragged matrix".to_string())))
        .collect()
}

fn matrix_product(a: &[MathValue], b: &[MathValue]) -> Result<MathValue, ExprError> {
    let collect = |cells: Result<Vec<MathValue>, ExprError>| cells.map(MathValue::Matrix);
    match (rows(a), rows(b)) {
        (None, None) => dot(a, b),
        (Some(left), Some(right)) => {
            let width = right.first().map_or(0, |row| row.len());
            collect(
                left.iter()
                    .map(|row| {
                        collect((0..width).map(|j| dot(row, &column(&right, j)?)).collect())
                    })
                    .collect(),
            )
        }
        (Some(left), None) => collect(left.iter().map(|row| dot(row, b)).collect()),
        (None, Some(right)) => {
            let width = right.first().map_or(0, |row| row.len());
            collect((0..width).map(|j| dot(a, &column(&right, j)?)).collect())
        }
    }
}

fn transpose(value: MathValue) -> Result<MathValue, ExprError> {
    let MathValue::Matrix(items) = value else {
        return Err(type_error("transpose expects a matrix"));
    };
    let Some(grid) = rows(&items) else {
        return Ok(MathValue::Matrix(items));
    };
    let width = grid.first().map_or(0, |row| row.len());
    (0..width)
        .map(|j| column(&grid, j).map(MathValue::Matrix))
        .collect::<Result<Vec<_>, _>>()
        .map(MathValue::Matrix)
}

fn size(value: &MathValue) -> Vec<usize> {
    match value {
        MathValue::Matrix(items) => {
            let mut dims = vec![items.len()];
            if let Some(first) = items.first() {
                dims.extend(size(first));
            }
            dims
        }
        _ => Vec::new(),
    }
}

/// Determinant by Gaussian elimination with partial pivoting.
fn determinant(value: &MathValue) -> Result<f64, ExprError> {
    let not_square = || ExprError::Domain("det expects a square matrix".to_string());
    let MathValue::Matrix(items) = value else {
        return Err(type_error("det expects a matrix"));
    };
    let grid = rows(items).ok_or_else(not_square)?;
    let n = grid.len();
    let mut m: Vec<Vec<f64>> = grid
        .iter()
        .map(|row| {
            if row.len() != n {
                return Err(not_square());
            }
            row.iter().map(as_number).collect()
        })
        .collect::<Result<_, _>>()?;

    let mut det = 1.0;
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap_or(col);
        if m[pivot][col] == 0.0 {
            return Ok(0.0);
        }
        if pivot != col {
            m.swap(pivot, col);
            det = -det;
        }
        det *= m[col][col];
        for r in col + 1..n {
            let factor = m[r][col] / m[col][col];
            for c in col..n {
                m[r][c] -= factor * m[col][c];
            }
        }
    }
    Ok(det)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn eval(input: &str) -> Result<MathValue, ExprError> {
        let mut rng = StdRng::seed_from_u64(7);
        Evaluator::new(&mut rng).evaluate(input)
    }

    fn shown(input: &str) -> String {
        eval(input).unwrap().to_string()
    }

    fn real(input: &str) -> f64 {
        match eval(input).unwrap() {
            MathValue::Number(x) => x,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(real("2 + 3 * 4"), 14.0);
        assert_eq!(real("2^10"), 1024.0);
        assert_eq!(real("-2^2"), -4.0);
        assert_eq!(real("2^-1"), 0.5);
        assert_eq!(real("2 ** 3 ** 2"), 512.0);
        assert_eq!(real("5!"), 120.0);
    }

    #[test]
    fn modulo_is_floored() {
        assert_eq!(real("7 % 3"), 1.0);
        assert_eq!(real("-7 % 3"), 2.0);
        assert_eq!(real("mod(7, -3)"), -2.0);
    }

    #[test]
    fn namespaced_functions() {
        assert_eq!(real("Math.max(1, 5, 3)"), 5.0);
        assert_eq!(real("math.floor(2.7) + Math.round(2.5)"), 5.0);
        assert_eq!(real("max([1, 9, 2])"), 9.0);
        assert!((real("sin(pi / 2)") - 1.0).abs() < 1e-12);
        assert_eq!(real("round(3.14159, 2)"), 3.14);
        assert_eq!(real("math.isqrt(17)"), 4.0);
        assert!((real("math.degrees(pi)") - 180.0).abs() < 1e-9);
    }

    #[test]
    fn complex_results() {
        assert_eq!(shown("sqrt(-4)"), "2i");
        assert_eq!(shown("3 + 4i"), "3 + 4i");
        assert_eq!(shown("3 - 4i"), "3 - 4i");
        assert_eq!(shown("i * i"), "-1");
        assert_eq!(shown("-i"), "-i");
        assert_eq!(real("abs(3 + 4i)"), 5.0);
        assert_eq!(shown("complex(1, 1) * complex(1, -1)"), "2");
    }

    #[test]
    fn matrices() {
        assert_eq!(shown("det([[1, 2], [3, 4]])"), "-2");
        assert_eq!(
            shown("multiply([[1, 2], [3, 4]], [[5, 6], [7, 8]])"),
            "[[19, 22], [43, 50]]"
        );
        assert_eq!(shown("transpose([[1, 2, 3], [4, 5, 6]])"), "[[1, 4], [2, 5], [3, 6]]");
        assert_eq!(shown("size([[1, 2, 3], [4, 5, 6]])"), "[2, 3]");
        assert_eq!(shown("2 * [1, 2]"), "[2, 4]");
        assert_eq!(shown("[1, 2] * [3, 4]"), "11");
        assert!(eval("det([[1, 2, 3], [4, 5, 6]])").is_err());
    }

    #[test]
    fn statistics_use_sample_normalization() {
        assert_eq!(real("mean(1, 2, 3, 4)"), 2.5);
        assert_eq!(real("median(3, 1, 2)"), 2.0);
        assert_eq!(real("median([4, 1, 3, 2])"), 2.5);
        assert!((real("variance(1, 2, 3, 4)") - 5.0 / 3.0).abs() < 1e-12);
        assert!((real("std([2, 4, 4, 4, 5, 5, 7, 9])") - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(real("gcd(12, 18)"), 6.0);
        assert_eq!(real("lcm(4, 6)"), 12.0);
    }

    #[test]
    fn symbolic_derivative() {
        assert_eq!(
            eval("derivative('x^2', 'x')").unwrap(),
            MathValue::Text("2 * x".to_string())
        );
    }

    #[test]
    fn random_is_seeded() {
        let x = real("random()");
        assert!((0.0..1.0).contains(&x));
        assert_eq!(x, real("random()"));
        let y = real("random(10, 20)");
        assert!((10.0..20.0).contains(&y));
    }

    #[test]
    fn failures() {
        assert_eq!(eval("foo + 1"), Err(ExprError::UnknownSymbol("foo".to_string())));
        assert_eq!(eval("nope(1)"), Err(ExprError::UnknownFunction("nope".to_string())));
        assert!(matches!(eval("'a' + 1"), Err(ExprError::Type(_))));
        assert!(matches!(eval("(-1)!"), Err(ExprError::Domain(_))));
        assert_eq!(eval("'text'"), Ok(MathValue::Text("text".to_string())));
        assert_eq!(eval("1 / 0"), Ok(MathValue::Number(f64::INFINITY)));
    }
}
