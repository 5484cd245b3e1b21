//! Expression evaluation against a frame and the evaluation context.

use ordered_float::OrderedFloat;
use quiver_planner::ast::{BinaryOp, Expr, UnaryOp};

use crate::context::ExecutionContext;
use crate::error::{QueryError, QueryResult};
use crate::frame::Frame;
use crate::value::TypedValue;

pub fn evaluate(expr: &Expr, frame: &Frame, context: &ExecutionContext) -> QueryResult<TypedValue> {
    match expr {
        Expr::Literal(value) => Ok(TypedValue::from(value.clone())),
        Expr::Parameter(name) => Ok(TypedValue::from(context.parameter(name)?.clone())),
        Expr::SymbolRef(symbol) => Ok(frame.get(*symbol).clone()),
        Expr::Identifier(name) => Err(QueryError::Type(format!(
            "unresolved identifier `{name}` reached execution"
        ))),
        Expr::Property {
            expr: inner,
            property,
        } => {
            let target = evaluate(inner, frame, context)?;
            let property = context.accessor().property_id(property);
            match target {
                TypedValue::Null => Ok(TypedValue::Null),
                TypedValue::Vertex(vertex) => Ok(TypedValue::from(vertex.property(property)?)),
                TypedValue::Edge(edge) => Ok(TypedValue::from(edge.property(property)?)),
                other => Err(QueryError::Type(format!(
                    "property access on a non-graph value {other:?}"
                ))),
            }
        }
        Expr::HasLabel { expr: inner, label } => {
            let target = evaluate(inner, frame, context)?;
            let label = context.accessor().label_id(label);
            match target {
                TypedValue::Null => Ok(TypedValue::Null),
                TypedValue::Vertex(vertex) => Ok(TypedValue::Bool(vertex.has_label(label)?)),
                other => Err(QueryError::Type(format!(
                    "label test on a non-vertex value {other:?}"
                ))),
            }
        }
        Expr::Unary { op, expr: inner } => {
            let value = evaluate(inner, frame, context)?;
            apply_unary(*op, value)
        }
        Expr::Binary { op, lhs, rhs } => match op {
            // AND/OR shortcut with Kleene three-valued logic.
            BinaryOp::And => {
                let left = evaluate(lhs, frame, context)?;
                if let TypedValue::Bool(false) = left {
                    return Ok(TypedValue::Bool(false));
                }
                let right = evaluate(rhs, frame, context)?;
                kleene_and(left, right)
            }
            BinaryOp::Or => {
                let left = evaluate(lhs, frame, context)?;
                if let TypedValue::Bool(true) = left {
                    return Ok(TypedValue::Bool(true));
                }
                let right = evaluate(rhs, frame, context)?;
                kleene_or(left, right)
            }
            _ => {
                let left = evaluate(lhs, frame, context)?;
                let right = evaluate(rhs, frame, context)?;
                apply_binary(*op, left, right)
            }
        },
        Expr::ListLiteral(items) => Ok(TypedValue::List(
            items
                .iter()
                .map(|item| evaluate(item, frame, context))
                .collect::<QueryResult<_>>()?,
        )),
        Expr::Aggregation { .. } => Err(QueryError::Type(
            "aggregation outside of an aggregating projection".to_owned(),
        )),
    }
}

fn kleene_and(left: TypedValue, right: TypedValue) -> QueryResult<TypedValue> {
    Ok(match (bool3(left)?, bool3(right)?) {
        (Some(false), _) | (_, Some(false)) => TypedValue::Bool(false),
        (Some(true), Some(true)) => TypedValue::Bool(true),
        _ => TypedValue::Null,
    })
}

fn kleene_or(left: TypedValue, right: TypedValue) -> QueryResult<TypedValue> {
    Ok(match (bool3(left)?, bool3(right)?) {
        (Some(true), _) | (_, Some(true)) => TypedValue::Bool(true),
        (Some(false), Some(false)) => TypedValue::Bool(false),
        _ => TypedValue::Null,
    })
}

fn bool3(value: TypedValue) -> QueryResult<Option<bool>> {
    match value {
        TypedValue::Null => Ok(None),
        TypedValue::Bool(value) => Ok(Some(value)),
        other => Err(QueryError::Type(format!(
            "logical operator on non-boolean {other:?}"
        ))),
    }
}

fn apply_unary(op: UnaryOp, value: TypedValue) -> QueryResult<TypedValue> {
    Ok(match (op, value) {
        (_, TypedValue::Null) => TypedValue::Null,
        (UnaryOp::Not, TypedValue::Bool(value)) => TypedValue::Bool(!value),
        (UnaryOp::Minus, TypedValue::Int(value)) => TypedValue::Int(-value),
        (UnaryOp::Minus, TypedValue::Float(value)) => TypedValue::Float(-value),
        (UnaryOp::Plus, value @ (TypedValue::Int(_) | TypedValue::Float(_))) => value,
        (op, other) => {
            return Err(QueryError::Type(format!(
                "cannot apply {op:?} to {other:?}"
            )))
        }
    })
}

fn apply_binary(op: BinaryOp, left: TypedValue, right: TypedValue) -> QueryResult<TypedValue> {
    use BinaryOp::*;
    match op {
        Eq => Ok(option_bool(left.equals(&right))),
        NotEq => Ok(option_bool(left.equals(&right).map(|equal| !equal))),
        Lt | LtEq | Gt | GtEq => {
            if left.is_null() || right.is_null() {
                return Ok(TypedValue::Null);
            }
            let ordering = match left.partial_cmp_values(&right) {
                Some(ordering) => ordering,
                None => return Ok(TypedValue::Null),
            };
            let result = match op {
                Lt => ordering.is_lt(),
                LtEq => ordering.is_le(),
                Gt => ordering.is_gt(),
                GtEq => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(TypedValue::Bool(result))
        }
        In => {
            let TypedValue::List(items) = right else {
                if right.is_null() {
                    return Ok(TypedValue::Null);
                }
                return Err(QueryError::Type("IN expects a list".to_owned()));
            };
            let mut saw_null = false;
            for item in &items {
                match left.equals(item) {
                    Some(true) => return Ok(TypedValue::Bool(true)),
                    Some(false) => {}
                    None => saw_null = true,
                }
            }
            Ok(if saw_null {
                TypedValue::Null
            } else {
                TypedValue::Bool(false)
            })
        }
        Add => arith(left, right, i64::checked_add, |a, b| a + b, true),
        Sub => arith(left, right, i64::checked_sub, |a, b| a - b, false),
        Mul => arith(left, right, i64::checked_mul, |a, b| a * b, false),
        Div => {
            if matches!(right, TypedValue::Int(0)) {
                return Err(QueryError::Type("division by zero".to_owned()));
            }
            arith(left, right, i64::checked_div, |a, b| a / b, false)
        }
        Mod => {
            if matches!(right, TypedValue::Int(0)) {
                return Err(QueryError::Type("modulo by zero".to_owned()));
            }
            arith(left, right, i64::checked_rem, |a, b| a % b, false)
        }
        And | Or => unreachable!("handled by the evaluator"),
    }
}

fn option_bool(value: Option<bool>) -> TypedValue {
    match value {
        Some(value) => TypedValue::Bool(value),
        None => TypedValue::Null,
    }
}

fn arith(
    left: TypedValue,
    right: TypedValue,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
    allow_concat: bool,
) -> QueryResult<TypedValue> {
    use TypedValue::*;
    Ok(match (left, right) {
        (Null, _) | (_, Null) => Null,
        (Int(a), Int(b)) => Int(int_op(a, b)
            .ok_or_else(|| QueryError::Type("integer overflow".to_owned()))?),
        (Int(a), Float(b)) => Float(OrderedFloat(float_op(a as f64, b.into_inner()))),
        (Float(a), Int(b)) => Float(OrderedFloat(float_op(a.into_inner(), b as f64))),
        (Float(a), Float(b)) => Float(OrderedFloat(float_op(a.into_inner(), b.into_inner()))),
        (String(a), String(b)) if allow_concat => String(a + &b),
        (List(mut a), List(b)) if allow_concat => {
            a.extend(b);
            List(a)
        }
        (left, right) => {
            return Err(QueryError::Type(format!(
                "cannot combine {left:?} and {right:?}"
            )))
        }
    })
}
