use std::cmp::Ordering;

use weft_state::{Value, ValueMap};

use super::{Equality, Expression, LogicalOp, Op};
use crate::render::{Context, Scope};

/// Evaluate an expression against the scope chain and the render context.
///
/// Evaluation never fails: unknown names, bad indexing and type
/// mismatches all produce `null`, the way the host dialect degrades.
pub(crate) fn eval(expr: &Expression, scope: &Scope, ctx: &Context) -> Value {
    match expr {
        Expression::Null => Value::Null,
        Expression::Bool(b) => Value::Bool(*b),
        Expression::Int(n) => Value::Int(*n),
        Expression::Float(n) => Value::Float(*n),
        Expression::Str(s) => Value::Str(s.clone()),

        Expression::List(items) => Value::List(items.iter().map(|item| eval(item, scope, ctx)).collect()),
        Expression::Map(entries) => {
            let mut map = ValueMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), eval(value, scope, ctx));
            }
            Value::Map(map)
        }

        Expression::Local(name) => scope.value(name).unwrap_or(Value::Null),
        // Dynamic bindings shadow the context: a `t-set` leaked through a
        // `t-call` resolves here even though the callee compiled the name
        // as a context lookup
        Expression::Ctx(name) => match scope.value(name) {
            Some(value) => value,
            None => ctx.values.get(name).cloned().unwrap_or(Value::Null),
        },

        Expression::Index(lhs, rhs) => {
            let lhs = eval(lhs, scope, ctx);
            let rhs = eval(rhs, scope, ctx);
            lhs.get(&rhs).cloned().unwrap_or(Value::Null)
        }

        Expression::Not(expr) => Value::Bool(!eval(expr, scope, ctx).is_truthy()),
        Expression::Neg(expr) => match eval(expr, scope, ctx) {
            Value::Int(n) => Value::Int(n.wrapping_neg()),
            Value::Float(n) => Value::Float(-n),
            _ => Value::Null,
        },

        Expression::Op(lhs, rhs, op) => {
            let lhs = eval(lhs, scope, ctx);
            let rhs = eval(rhs, scope, ctx);
            binop(&lhs, &rhs, *op)
        }

        Expression::Equality(lhs, rhs, eq) => {
            let lhs = eval(lhs, scope, ctx);
            let rhs = eval(rhs, scope, ctx);
            let result = match eq {
                Equality::Eq => lhs.loosely_eq(&rhs),
                Equality::NotEq => !lhs.loosely_eq(&rhs),
                Equality::Gt => lhs.compare(&rhs) == Some(Ordering::Greater),
                Equality::Gte => matches!(lhs.compare(&rhs), Some(Ordering::Greater | Ordering::Equal)),
                Equality::Lt => lhs.compare(&rhs) == Some(Ordering::Less),
                Equality::Lte => matches!(lhs.compare(&rhs), Some(Ordering::Less | Ordering::Equal)),
            };
            Value::Bool(result)
        }

        // Logical operators return their operands, so `name or 'anon'`
        // works as a default
        Expression::Logical(lhs, rhs, op) => {
            let lhs = eval(lhs, scope, ctx);
            match (op, lhs.is_truthy()) {
                (LogicalOp::And, false) => lhs,
                (LogicalOp::And, true) => eval(rhs, scope, ctx),
                (LogicalOp::Or, true) => lhs,
                (LogicalOp::Or, false) => eval(rhs, scope, ctx),
            }
        }

        Expression::Segments(segments) => {
            let mut out = String::new();
            for segment in segments {
                out.push_str(&eval(segment, scope, ctx).to_string());
            }
            Value::Str(out)
        }

        // The compiler rejects calls outside handler position and
        // resolves identifiers before a program is published
        Expression::Call { .. } => unreachable!("calls never reach evaluation"),
        Expression::Ident(_) => unreachable!("identifiers are resolved at compile time"),
    }
}

fn binop(lhs: &Value, rhs: &Value, op: Op) -> Value {
    // string concatenation wins for +
    if let (Op::Add, true) = (op, matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_))) {
        return Value::Str(format!("{lhs}{rhs}"));
    }

    match (lhs, rhs) {
        (Value::Int(lhs), Value::Int(rhs)) => {
            let value = match op {
                Op::Add => lhs.wrapping_add(*rhs),
                Op::Sub => lhs.wrapping_sub(*rhs),
                Op::Mul => lhs.wrapping_mul(*rhs),
                Op::Div | Op::Mod if *rhs == 0 => return Value::Null,
                Op::Div => lhs.wrapping_div(*rhs),
                Op::Mod => lhs.wrapping_rem(*rhs),
            };
            Value::Int(value)
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (lhs, rhs) = match (lhs.as_float(), rhs.as_float()) {
                (Some(lhs), Some(rhs)) => (lhs, rhs),
                _ => return Value::Null,
            };
            let value = match op {
                Op::Add => lhs + rhs,
                Op::Sub => lhs - rhs,
                Op::Mul => lhs * rhs,
                Op::Div => lhs / rhs,
                Op::Mod => lhs % rhs,
            };
            Value::Float(value)
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expressions::parser::parse;
    use crate::render::Context;

    fn eval_src(src: &str, ctx: &Context) -> Value {
        let expr = parse(src).unwrap().resolve(&|_| false);
        let scope = Scope::new();
        eval(&expr, &scope, ctx)
    }

    fn ctx() -> Context {
        let mut ctx = Context::new();
        ctx.values.insert("a", 1);
        ctx.values.insert("name", "bob");
        ctx
    }

    #[test]
    fn arithmetic() {
        let ctx = ctx();
        assert_eq!(eval_src("1 + 2 * 3", &ctx), Value::Int(7));
        assert_eq!(eval_src("10 / 4", &ctx), Value::Int(2));
        assert_eq!(eval_src("10.0 / 4", &ctx), Value::Float(2.5));
        assert_eq!(eval_src("1 / 0", &ctx), Value::Null);
    }

    #[test]
    fn string_concat() {
        let ctx = ctx();
        assert_eq!(eval_src("'n: ' + a", &ctx), Value::Str("n: 1".into()));
    }

    #[test]
    fn comparisons() {
        let ctx = ctx();
        assert_eq!(eval_src("a gt 0", &ctx), Value::Bool(true));
        assert_eq!(eval_src("a lt 0", &ctx), Value::Bool(false));
        assert_eq!(eval_src("a == 1.0", &ctx), Value::Bool(true));
        assert_eq!(eval_src("a != 2", &ctx), Value::Bool(true));
    }

    #[test]
    fn logical_returns_operands() {
        let ctx = ctx();
        assert_eq!(eval_src("missing or 'anon'", &ctx), Value::Str("anon".into()));
        assert_eq!(eval_src("name and a", &ctx), Value::Int(1));
        assert_eq!(eval_src("missing and a", &ctx), Value::Null);
    }

    #[test]
    fn unknown_names_are_null() {
        let ctx = ctx();
        assert_eq!(eval_src("nope", &ctx), Value::Null);
        assert_eq!(eval_src("nope.deeper", &ctx), Value::Null);
    }

    #[test]
    fn member_and_index_lookup() {
        let mut ctx = Context::new();
        let mut state = ValueMap::new();
        state.insert("counter", 5);
        ctx.values.insert("state", state);
        ctx.values.insert("xs", vec![Value::Int(7), Value::Int(9)]);

        assert_eq!(eval_src("state.counter", &ctx), Value::Int(5));
        assert_eq!(eval_src("xs[1]", &ctx), Value::Int(9));
        assert_eq!(eval_src("xs[5]", &ctx), Value::Null);
    }
}
