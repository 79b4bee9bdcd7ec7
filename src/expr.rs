//! Expression evaluator contract plus the reference
//! implementation this crate ships so end-to-end runs work
//! without a real parser or a host-supplied evaluator.
//!
//! The real Loreline expression language is out of scope; hosts
//! are free to supply their own [`ExpressionEvaluator`]. `ReferenceEvaluator`
//! supports arithmetic, comparison, logical ops, field/array access,
//! script-level and host-registered function calls, and the `chance(n)`
//! stdlib helper.

use crate::error::RuntimeError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A minimal embedded-expression AST. Kept deliberately small: this is a
/// collaborator stand-in, not the language's real expression
/// grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Reads a dotted path (`a.b.c`).
    Path(Vec<String>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    ArrayAccess(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Array(Vec<Expr>),
}

impl Expr {
    pub fn int(i: i64) -> Self {
        Expr::Literal(Value::Integer(i))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Expr::Literal(Value::Text(s.into()))
    }

    pub fn path(segments: &[&str]) -> Self {
        Expr::Path(segments.iter().map(|s| s.to_string()).collect())
    }
}

/// A read-only view over whatever holds current variable state. The
/// evaluator never mutates through this trait — assignment is the
/// Continuation Core's job, applied via
/// [`crate::store::Store`] directly.
pub trait VariableReader {
    fn read_path(&self, segments: &[String]) -> Option<Value>;
    /// Looks up a host-registered or script-level function by name,
    /// without invoking it; used only to validate `Value::Function`
    /// references produced by [`Expr::Path`].
    fn has_function(&self, name: &str) -> bool;
}

/// A host-registered function: `(args) -> Result<Value, RuntimeError>`.
pub type HostFunction = Box<dyn Fn(&[Value]) -> Result<Value, RuntimeError>>;

/// The expression-evaluator contract: given an expression node
/// and a reader over the Store, produce a value or an [`RuntimeError`].
pub trait ExpressionEvaluator {
    fn eval(&self, expr: &Expr, reader: &dyn VariableReader) -> Result<Value, RuntimeError>;
}

/// The reference evaluator this crate ships (see module docs).
#[derive(Default)]
pub struct ReferenceEvaluator;

impl ExpressionEvaluator for ReferenceEvaluator {
    fn eval(&self, expr: &Expr, reader: &dyn VariableReader) -> Result<Value, RuntimeError> {
        eval_expr(expr, reader)
    }
}

fn eval_expr(expr: &Expr, reader: &dyn VariableReader) -> Result<Value, RuntimeError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Path(segments) => reader.read_path(segments).ok_or_else(|| {
            RuntimeError::UndefinedBinding(segments.join("."))
        }),
        Expr::Unary(op, inner) => {
            let value = eval_expr(inner, reader)?;
            eval_unary(*op, value)
        },
        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, reader)?;
            let r = eval_expr(rhs, reader)?;
            eval_binary(*op, l, r)
        },
        Expr::ArrayAccess(base, index) => {
            let base = eval_expr(base, reader)?;
            let index = eval_expr(index, reader)?;
            match (base, index) {
                (Value::Array(items), Value::Integer(i)) => {
                    let idx = usize::try_from(i).map_err(|_| {
                        RuntimeError::EvaluationError(format!("array index out of bounds: {i}"))
                    })?;
                    items.get(idx).cloned().ok_or_else(|| {
                        RuntimeError::EvaluationError(format!("array index out of bounds: {idx}"))
                    })
                },
                (other, _) => Err(RuntimeError::EvaluationError(format!(
                    "cannot index into {}",
                    other.type_name()
                ))),
            }
        },
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|a| eval_expr(a, reader))
                .collect::<Result<Vec<_>, _>>()?;
            eval_builtin(name, &values).unwrap_or_else(|| {
                if reader.has_function(name) {
                    // Resolution to the actual host/script function body
                    // happens in the Continuation Core's call dispatcher;
                    // reaching here means the expression
                    // evaluator was asked to call it directly, which only
                    // stdlib helpers support.
                    Err(RuntimeError::EvaluationError(format!(
                        "function '{name}' must be invoked as a beat call, not inline"
                    )))
                } else {
                    Err(RuntimeError::UndefinedBinding(name.clone()))
                }
            })
        },
        Expr::Array(items) => {
            let values = items
                .iter()
                .map(|i| eval_expr(i, reader))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        },
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, RuntimeError> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Boolean(!v.truthy())),
        (UnaryOp::Neg, Value::Integer(i)) => Ok(Value::Integer(-i)),
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Neg, other) => Err(RuntimeError::EvaluationError(format!(
            "cannot negate {}",
            other.type_name()
        ))),
    }
}

/// Exposed `pub(crate)` so [`crate::interpreter::eval`] can reuse the same
/// arithmetic for compound assignment operators (`+=`, `-=`, ...) without
/// going through the `ExpressionEvaluator` trait — assignment isn't part of
/// the expression-evaluator contract.
pub(crate) fn eval_binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    match op {
        And => return Ok(Value::Boolean(l.truthy() && r.truthy())),
        Or => return Ok(Value::Boolean(l.truthy() || r.truthy())),
        Eq => return Ok(Value::Boolean(values_equal(&l, &r))),
        Ne => return Ok(Value::Boolean(!values_equal(&l, &r))),
        _ => {},
    }

    match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => match op {
            Add => Ok(Value::Integer(a + b)),
            Sub => Ok(Value::Integer(a - b)),
            Mul => Ok(Value::Integer(a * b)),
            Div => {
                if b == 0 {
                    Err(RuntimeError::EvaluationError("division by zero".into()))
                } else {
                    Ok(Value::Integer(a / b))
                }
            },
            Lt => Ok(Value::Boolean(a < b)),
            Le => Ok(Value::Boolean(a <= b)),
            Gt => Ok(Value::Boolean(a > b)),
            Ge => Ok(Value::Boolean(a >= b)),
            Eq | Ne | And | Or => unreachable!(),
        },
        (Value::Number(a), Value::Number(b)) => numeric_binary(op, a, b),
        (Value::Integer(a), Value::Number(b)) => numeric_binary(op, a as f64, b),
        (Value::Number(a), Value::Integer(b)) => numeric_binary(op, a, b as f64),
        (Value::Text(a), Value::Text(b)) => match op {
            Add => Ok(Value::Text(a + &b)),
            Lt => Ok(Value::Boolean(a < b)),
            Le => Ok(Value::Boolean(a <= b)),
            Gt => Ok(Value::Boolean(a > b)),
            Ge => Ok(Value::Boolean(a >= b)),
            _ => Err(RuntimeError::EvaluationError(
                "unsupported text operation".into(),
            )),
        },
        (a, b) => Err(RuntimeError::EvaluationError(format!(
            "type mismatch: {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn numeric_binary(op: BinaryOp, a: f64, b: f64) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    match op {
        Add => Ok(Value::Number(a + b)),
        Sub => Ok(Value::Number(a - b)),
        Mul => Ok(Value::Number(a * b)),
        Div => {
            if b == 0.0 {
                Err(RuntimeError::EvaluationError("division by zero".into()))
            } else {
                Ok(Value::Number(a / b))
            }
        },
        Lt => Ok(Value::Boolean(a < b)),
        Le => Ok(Value::Boolean(a <= b)),
        Gt => Ok(Value::Boolean(a > b)),
        Ge => Ok(Value::Boolean(a >= b)),
        Eq | Ne | And | Or => unreachable!(),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Number(y)) | (Value::Number(y), Value::Integer(x)) => {
            *x as f64 == *y
        },
        _ => a == b,
    }
}

/// The built-in stdlib helpers. `chance(n)` returns true
/// with probability `1/n`.
fn eval_builtin(name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
    match name {
        "chance" => Some(chance(args)),
        "length" => Some(length(args)),
        _ => None,
    }
}

fn chance(args: &[Value]) -> Result<Value, RuntimeError> {
    let n = match args.first() {
        Some(Value::Integer(n)) => *n,
        Some(Value::Number(n)) => *n as i64,
        _ => {
            return Err(RuntimeError::EvaluationError(
                "chance(n) expects one numeric argument".into(),
            ))
        },
    };
    if n <= 0 {
        return Err(RuntimeError::EvaluationError(
            "chance(n) requires n > 0".into(),
        ));
    }
    use rand::Rng;
    let roll: i64 = rand::thread_rng().gen_range(0..n);
    Ok(Value::Boolean(roll == 0))
}

fn length(args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Text(s)) => Ok(Value::Integer(s.chars().count() as i64)),
        Some(Value::Array(a)) => Ok(Value::Integer(a.len() as i64)),
        _ => Err(RuntimeError::EvaluationError(
            "length(x) expects a Text or Array argument".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Env(std::collections::BTreeMap<String, Value>);

    impl VariableReader for Env {
        fn read_path(&self, segments: &[String]) -> Option<Value> {
            self.0.get(&segments[0]).cloned()
        }

        fn has_function(&self, _name: &str) -> bool {
            false
        }
    }

    #[test]
    fn arithmetic_and_compare() {
        let env = Env(Default::default());
        let expr = Expr::Binary(BinaryOp::Sub, Box::new(Expr::int(100)), Box::new(Expr::int(10)));
        assert_eq!(
            ReferenceEvaluator.eval(&expr, &env).unwrap(),
            Value::Integer(90)
        );
    }

    #[test]
    fn division_by_zero_is_evaluation_error() {
        let env = Env(Default::default());
        let expr = Expr::Binary(BinaryOp::Div, Box::new(Expr::int(1)), Box::new(Expr::int(0)));
        assert!(matches!(
            ReferenceEvaluator.eval(&expr, &env),
            Err(RuntimeError::EvaluationError(_))
        ));
    }

    #[test]
    fn undefined_path_is_undefined_binding() {
        let env = Env(Default::default());
        assert!(matches!(
            ReferenceEvaluator.eval(&Expr::path(&["nope"]), &env),
            Err(RuntimeError::UndefinedBinding(_))
        ));
    }
}
