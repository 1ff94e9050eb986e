//! Symbolic differentiation over [`Expr`] trees.

use super::expr::{BinaryOp, Expr, ExprError};

use BinaryOp::{Add, Div, Mul, Pow, Sub};

fn num(n: f64) -> Expr {
    Expr::Number(n)
}

/// Differentiate `expr` with respect to `var` and simplify the result.
pub fn derivative(expr: &Expr, var: &str) -> Result<Expr, ExprError> {
    Ok(simplify(differentiate(expr, var)?))
}

fn differentiate(expr: &Expr, var: &str) -> Result<Expr, ExprError> {
    if !expr.mentions(var) {
        return match expr {
            Expr::Text(_) | Expr::Matrix(_) => Err(not_differentiable(expr)),
            _ => Ok(num(0.0)),
        };
    }
    let d = |e: &Expr| differentiate(e, var);
    Ok(match expr {
        Expr::Symbol(_) => num(1.0),
        Expr::Neg(inner) => Expr::Neg(Box::new(d(inner)?)),
        Expr::Binary(op, a, b) => {
            let (a, b) = (a.as_ref().clone(), b.as_ref().clone());
            match op {
                Add | Sub => Expr::binary(*op, d(&a)?, d(&b)?),
                Mul => Expr::binary(
                    Add,
                    Expr::binary(Mul, d(&a)?, b.clone()),
                    Expr::binary(Mul, a.clone(), d(&b)?),
                ),
                Div => Expr::binary(
                    Div,
                    Expr::binary(
                        Sub,
                        Expr::binary(Mul, d(&a)?, b.clone()),
                        Expr::binary(Mul, a.clone(), d(&b)?),
                    ),
                    Expr::binary(Pow, b, num(2.0)),
                ),
                Pow if !b.mentions(var) => Expr::binary(
                    Mul,
                    Expr::binary(
                        Mul,
                        b.clone(),
                        Expr::binary(Pow, a.clone(), Expr::binary(Sub, b, num(1.0))),
                    ),
                    d(&a)?,
                ),
                Pow if !a.mentions(var) => Expr::binary(
                    Mul,
                    Expr::binary(Mul, expr.clone(), Expr::call("log", a)),
                    d(&b)?,
                ),
                Pow => Expr::binary(
                    Mul,
                    expr.clone(),
                    Expr::binary(
                        Add,
                        Expr::binary(Mul, d(&b)?, Expr::call("log", a.clone())),
                        Expr::binary(Div, Expr::binary(Mul, b, d(&a)?), a),
                    ),
                ),
                BinaryOp::Mod => return Err(not_differentiable(expr)),
            }
        }
        Expr::Call(name, args) if args.len() == 1 => {
            let a = args[0].clone();
            let da = d(&a)?;
            let outer = match name.as_str() {
                "sin" => Expr::call("cos", a),
                "cos" => Expr::Neg(Box::new(Expr::call("sin", a))),
                "tan" => Expr::binary(Div, num(1.0), Expr::binary(Pow, Expr::call("cos", a), num(2.0))),
                "exp" => Expr::call("exp", a),
                "log" => Expr::binary(Div, num(1.0), a),
                "sqrt" => Expr::binary(Div, num(1.0), Expr::binary(Mul, num(2.0), Expr::call("sqrt", a))),
                "sinh" => Expr::call("cosh", a),
                "cosh" => Expr::call("sinh", a),
                "asin" => Expr::binary(Div, num(1.0), Expr::call("sqrt", one_minus_square(a))),
                "acos" => Expr::Neg(Box::new(Expr::binary(
                    Div,
                    num(1.0),
                    Expr::call("sqrt", one_minus_square(a)),
                ))),
                "atan" => Expr::binary(
                    Div,
                    num(1.0),
                    Expr::binary(Add, num(1.0), Expr::binary(Pow, a, num(2.0))),
                ),
                _ => return Err(not_differentiable(expr)),
            };
            Expr::binary(Mul, outer, da)
        }
        _ => return Err(not_differentiable(expr)),
    })
}

fn one_minus_square(a: Expr) -> Expr {
    Expr::binary(Sub, num(1.0), Expr::binary(Pow, a, num(2.0)))
}

fn not_differentiable(expr: &Expr) -> ExprError {
    ExprError::Domain(format!("cannot differentiate {}", expr))
}

/// Fold constants and drop identity operations, bottom-up.
pub fn simplify(expr: Expr) -> Expr {
    match expr {
        Expr::Neg(inner) => match simplify(*inner) {
            Expr::Number(n) => num(-n),
            Expr::Neg(double) => *double,
            other => Expr::Neg(Box::new(other)),
        },
        Expr::Binary(op, a, b) => simplify_binary(op, simplify(*a), simplify(*b)),
        Expr::Call(name, args) => Expr::Call(name, args.into_iter().map(simplify).collect()),
        Expr::Factorial(inner) => Expr::Factorial(Box::new(simplify(*inner))),
        Expr::Matrix(items) => Expr::Matrix(items.into_iter().map(simplify).collect()),
        leaf => leaf,
    }
}

fn simplify_binary(op: BinaryOp, a: Expr, b: Expr) -> Expr {
    if let (Expr::Number(x), Expr::Number(y)) = (&a, &b) {
        let folded = match op {
            Add => x + y,
            Sub => x - y,
            Mul => x * y,
            Div => x / y,
            Pow => x.powf(*y),
            BinaryOp::Mod => f64::NAN,
        };
        if folded.is_finite() {
            return num(folded);
        }
    }
    let is = |e: &Expr, v: f64| matches!(e, Expr::Number(n) if *n == v);
    match op {
        Add if is(&a, 0.0) => b,
        Add | Sub if is(&b, 0.0) => a,
        Sub if is(&a, 0.0) => simplify(Expr::Neg(Box::new(b))),
        Mul if is(&a, 0.0) || is(&b, 0.0) => num(0.0),
        Mul if is(&a, 1.0) => b,
        Mul if is(&b, 1.0) => a,
        Mul if is(&b, -1.0) => simplify(Expr::Neg(Box::new(a))),
        // `2 * (3 * x)` → `6 * x`
        Mul => match (&a, &b) {
            (Expr::Number(x), Expr::Binary(Mul, inner_a, inner_b)) => {
                if let Expr::Number(y) = inner_a.as_ref() {
                    Expr::binary(Mul, num(x * y), inner_b.as_ref().clone())
                } else {
                    Expr::binary(Mul, a, b)
                }
            }
            (_, Expr::Number(_)) => Expr::binary(Mul, b, a),
            _ => Expr::binary(Mul, a, b),
        },
        Div if is(&b, 1.0) => a,
        Div if is(&a, 0.0) => num(0.0),
        Pow if is(&b, 1.0) => a,
        Pow if is(&b, 0.0) => num(1.0),
        _ => Expr::binary(op, a, b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expr::parse_expression;

    fn d(input: &str, var: &str) -> String {
        derivative(&parse_expression(input).unwrap(), var).unwrap().to_string()
    }

    #[test]
    fn power_rule() {
        assert_eq!(d("x^2", "x"), "2 * x");
        assert_eq!(d("x^3", "x"), "3 * x ^ 2");
        assert_eq!(d("x", "x"), "1");
    }

    #[test]
    fn constants_vanish() {
        assert_eq!(d("5", "x"), "0");
        assert_eq!(d("y^2", "x"), "0");
        assert_eq!(d("3x + 7", "x"), "3");
    }

    #[test]
    fn chain_rule_through_functions() {
        assert_eq!(d("sin(x)", "x"), "cos(x)");
        assert_eq!(d("cos(x)", "x"), "-sin(x)");
        assert_eq!(d("exp(2x)", "x"), "2 * exp(2 * x)");
        assert_eq!(d("log(x)", "x"), "1 / x");
    }

    #[test]
    fn product_rule() {
        assert_eq!(d("x * sin(x)", "x"), "sin(x) + x * cos(x)");
    }

    #[test]
    fn unsupported_forms_are_errors() {
        let expr = parse_expression("x % 2").unwrap();
        assert!(derivative(&expr, "x").is_err());
        let expr = parse_expression("floor(x)").unwrap();
        assert!(derivative(&expr, "x").is_err());
    }

    #[test]
    fn simplify_folds_constants() {
        let expr = parse_expression("(2 + 3) * x * 1 + 0").unwrap();
        assert_eq!(simplify(expr).to_string(), "5 * x");
    }
}
