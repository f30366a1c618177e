use std::cmp::Ordering;

use crate::core::{DbError, Result, Row, Value};
use crate::parser::ast::{BinaryOp, Expr, UnaryOp};

/// Column binding for expression evaluation: names of the row's columns, in order.
pub struct EvaluationContext<'a> {
    columns: &'a [String],
    table: &'a str,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(columns: &'a [String], table: &'a str) -> Self {
        Self { columns, table }
    }

    /// Context with no columns, for constant expressions such as defaults and VALUES lists.
    pub fn constant() -> EvaluationContext<'static> {
        EvaluationContext {
            columns: &[],
            table: "",
        }
    }

    pub fn evaluate(&self, expr: &Expr, row: &Row) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Column(name) => {
                let idx = self
                    .columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| DbError::ColumnNotFound(name.clone(), self.table.to_string()))?;
                row.get(idx).cloned().ok_or_else(|| {
                    DbError::Internal(format!("row is shorter than its column list at {}", idx))
                })
            }
            Expr::IsNull { expr, negated } => {
                let is_null = self.evaluate(expr, row)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
            Expr::Cast { expr, data_type } => self.evaluate(expr, row)?.cast_to(data_type),
            Expr::UnaryOp { op, expr } => {
                let value = self.evaluate(expr, row)?;
                match (op, value) {
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOp::Not, v) => Ok(Value::Boolean(!v.as_bool())),
                    (UnaryOp::Minus, Value::Integer(i)) => Ok(Value::Integer(-i)),
                    (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Plus, v) if v.is_numeric() => Ok(v),
                    (_, v) => Err(DbError::TypeMismatch(format!(
                        "invalid operand for unary operator: {}",
                        v.type_name()
                    ))),
                }
            }
            Expr::BinaryOp { left, op, right } => {
                let lhs = self.evaluate(left, row)?;
                match op {
                    // three-valued logic short circuits
                    BinaryOp::And if !lhs.is_null() && !lhs.as_bool() => Ok(Value::Boolean(false)),
                    BinaryOp::Or if !lhs.is_null() && lhs.as_bool() => Ok(Value::Boolean(true)),
                    _ => {
                        let rhs = self.evaluate(right, row)?;
                        apply_binary(*op, lhs, rhs)
                    }
                }
            }
        }
    }

    /// WHERE-clause semantics: NULL counts as false.
    pub fn matches(&self, predicate: Option<&Expr>, row: &Row) -> Result<bool> {
        match predicate {
            None => Ok(true),
            Some(expr) => Ok(self.evaluate(expr, row)?.as_bool()),
        }
    }
}

fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match op {
        BinaryOp::And | BinaryOp::Or => {
            if lhs.is_null() || rhs.is_null() {
                // lhs was not decisive, so the answer hinges on rhs
                let decisive = matches!(op, BinaryOp::And) != rhs.as_bool();
                return Ok(if !rhs.is_null() && decisive {
                    Value::Boolean(rhs.as_bool())
                } else {
                    Value::Null
                });
            }
            Ok(Value::Boolean(rhs.as_bool()))
        }
        _ if lhs.is_null() || rhs.is_null() => Ok(Value::Null),
        BinaryOp::Eq => Ok(Value::Boolean(lhs.compare(&rhs)? == Ordering::Equal)),
        BinaryOp::NotEq => Ok(Value::Boolean(lhs.compare(&rhs)? != Ordering::Equal)),
        BinaryOp::Lt => Ok(Value::Boolean(lhs.compare(&rhs)? == Ordering::Less)),
        BinaryOp::LtEq => Ok(Value::Boolean(lhs.compare(&rhs)? != Ordering::Greater)),
        BinaryOp::Gt => Ok(Value::Boolean(lhs.compare(&rhs)? == Ordering::Greater)),
        BinaryOp::GtEq => Ok(Value::Boolean(lhs.compare(&rhs)? != Ordering::Less)),
        BinaryOp::Concat => Ok(Value::Text(format!("{}{}", lhs, rhs))),
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
            arithmetic(op, &lhs, &rhs)
        }
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    if let (Some(a), Some(b)) = (integer_operand(lhs), integer_operand(rhs)) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Subtract => a.checked_sub(b),
            BinaryOp::Multiply => a.checked_mul(b),
            BinaryOp::Divide if b == 0 => return Err(DbError::ExecutionError("division by zero".into())),
            BinaryOp::Divide => a.checked_div(b),
            BinaryOp::Modulo if b == 0 => return Err(DbError::ExecutionError("division by zero".into())),
            BinaryOp::Modulo => a.checked_rem(b),
            _ => None,
        };
        return result
            .map(Value::Integer)
            .ok_or_else(|| DbError::ExecutionError("integer out of range".into()));
    }

    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(DbError::TypeMismatch(format!(
            "operator does not exist: {} {:?} {}",
            lhs.type_name(),
            op,
            rhs.type_name()
        )));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => {
            return Err(DbError::ExecutionError("division by zero".into()));
        }
        BinaryOp::Divide => a / b,
        _ => a % b,
    };
    Ok(Value::Float(result))
}

fn integer_operand(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Oid(o) => Some(i64::from(*o)),
        _ => None,
    }
}
