#![forbid(unsafe_code)]

//! Tree-walking evaluator. Evaluation never fails; missing data degrades to
//! `undefined`.

use std::cmp::Ordering;

use pathwatch_core::{Array, Object, Value, same};

use crate::ast::{BinaryOp, Node, Reserved, UnaryOp};
use crate::filters::FilterTable;

/// Evaluate `node` with `scope` as the identifier namespace.
#[must_use]
pub fn evaluate(node: &Node, scope: &Value, filters: &FilterTable) -> Value {
    match node {
        Node::Str(s) => Value::from(s.as_str()),
        Node::Number(n) => Value::Number(*n),
        Node::Reserved(Reserved::True) => Value::Bool(true),
        Node::Reserved(Reserved::False) => Value::Bool(false),
        Node::Reserved(Reserved::Null) => Value::Null,
        Node::Identifier(name) => member(scope, name),
        Node::Scope => scope.clone(),
        Node::Member { object, property } => {
            let object = evaluate(object, scope, filters);
            let key = evaluate(property, scope, filters).to_display();
            member(&object, &key)
        }
        Node::Call { callee, args } => {
            let (receiver, callee) = match &**callee {
                Node::Member { object, property } => {
                    let receiver = evaluate(object, scope, filters);
                    let key = evaluate(property, scope, filters).to_display();
                    let callee = member(&receiver, &key);
                    (receiver, callee)
                }
                other => (scope.clone(), evaluate(other, scope, filters)),
            };
            let args: Vec<Value> = args
                .iter()
                .map(|arg| evaluate(arg, scope, filters))
                .collect();
            callee
                .as_function()
                .map_or(Value::Undefined, |function| function.call(&receiver, &args))
        }
        Node::Unary { op, operand } => {
            let value = evaluate(operand, scope, filters);
            match op {
                UnaryOp::Not => Value::Bool(!value.is_truthy()),
                UnaryOp::Neg => Value::Number(-value.to_number()),
                UnaryOp::Plus => Value::Number(value.to_number()),
            }
        }
        Node::Binary { op, left, right } => {
            let left = evaluate(left, scope, filters);
            let right = evaluate(right, scope, filters);
            binary(*op, &left, &right)
        }
        Node::Filter { name, input, args } => {
            let input = evaluate(input, scope, filters);
            let args: Vec<Value> = args
                .iter()
                .map(|arg| evaluate(arg, scope, filters))
                .collect();
            filters.apply(name, &input, &args)
        }
        Node::Object(fields) => {
            let object = Object::new();
            for (key, value) in fields {
                object.set_raw(key.as_str(), evaluate(value, scope, filters));
            }
            Value::Object(object)
        }
        Node::Array(items) => Value::Array(Array::from_vec(
            items
                .iter()
                .map(|item| evaluate(item, scope, filters))
                .collect(),
        )),
    }
}

/// Property read that yields `undefined` for anything but containers and
/// strings.
fn member(base: &Value, key: &str) -> Value {
    match base {
        Value::Object(_) | Value::Array(_) | Value::String(_) => base.get(key),
        _ => Value::Undefined,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(same(left, right)),
        BinaryOp::NotEq => Value::Bool(!same(left, right)),
        BinaryOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinaryOp::LtEq => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Less | Ordering::Equal)
        )),
        BinaryOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinaryOp::GtEq => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Value::from(format!("{}{}", left.to_display(), right.to_display()))
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pathwatch_core::Function;

    fn eval(source: &str, scope: &Value) -> Value {
        let parsed = parse(source).expect("parse");
        evaluate(parsed.ast(), scope, &FilterTable::with_defaults())
    }

    fn scope() -> Value {
        Value::from(
            Object::new()
                .with("x", Object::new().with("y", Object::new().with("z", 1)))
                .with("name", "Ada")
                .with("list", Array::from_values([3, 1, 2]))
                .with("foo", "12/1/84"),
        )
    }

    #[test]
    fn arithmetic_over_paths() {
        assert_eq!(eval("x.y.z + 1 * 2", &scope()), Value::from(3));
        assert_eq!(eval("7 % 4 - -1", &scope()), Value::from(4));
        assert_eq!(eval("1 / 0", &scope()), Value::Number(f64::INFINITY));
    }

    #[test]
    fn plus_concatenates_with_strings() {
        assert_eq!(eval("'Hi ' + name", &scope()), Value::from("Hi Ada"));
        assert_eq!(eval("1 + '1'", &scope()), Value::from("11"));
        assert_eq!(eval("missing + 'x'", &scope()), Value::from("x"));
    }

    #[test]
    fn comparisons_are_strict() {
        assert_eq!(eval("1 = '1'", &scope()), Value::from(false));
        assert_eq!(eval("name = 'Ada'", &scope()), Value::from(true));
        assert_eq!(eval("x <> x", &scope()), Value::from(false));
        assert_eq!(eval("'b' > 'a'", &scope()), Value::from(true));
        assert_eq!(eval("'10' < '9'", &scope()), Value::from(true));
        assert_eq!(eval("missing < 1", &scope()), Value::from(false));
        assert_eq!(eval("missing >= 1", &scope()), Value::from(false));
    }

    #[test]
    fn reserved_and_unary() {
        assert_eq!(eval("(true)", &scope()), Value::from(true));
        assert_eq!(eval("!null", &scope()), Value::from(true));
        assert_eq!(eval("+'4'", &scope()), Value::from(4));
    }

    #[test]
    fn missing_data_degrades_to_undefined() {
        assert_eq!(eval("nope.deeper.still", &scope()), Value::Undefined);
        assert_eq!(eval("x.y.z.w", &scope()), Value::Undefined);
        assert_eq!(eval("list.length", &scope()), Value::from(3));
        assert_eq!(eval("name.length", &scope()), Value::from(3));
        assert_eq!(eval("list[1]", &scope()), Value::from(1));
        assert_eq!(eval(".['name']", &scope()), Value::from("Ada"));
    }

    #[test]
    fn calls_bind_the_receiver() {
        let greeter = Object::new().with("who", "you").with(
            "greet",
            Function::new(|this, args| {
                Value::from(format!("{} {}", args[0].to_display(), this.get("who").to_display()))
            }),
        );
        let scope = Value::from(Object::new().with("g", greeter));
        assert_eq!(eval("g.greet('hey')", &scope), Value::from("hey you"));
        assert_eq!(eval("g.who()", &scope), Value::Undefined);
    }

    #[test]
    fn filters_apply_in_order() {
        assert_eq!(eval("foo | date", &scope()), Value::from("December 1, 1984"));
        assert_eq!(eval("name | upper | lower", &scope()), Value::from("ada"));
        assert_eq!(eval("list | join:'-'", &scope()), Value::from("3-1-2"));
        assert_eq!(eval("name | unknown", &scope()), Value::from("Ada"));
    }

    #[test]
    fn literals_build_fresh_containers() {
        let value = eval("{a: x.y.z, b: [name, 2]}", &scope());
        assert_eq!(value.get("a"), Value::from(1));
        assert_eq!(value.get("b").get("0"), Value::from("Ada"));
        assert!(!same(&value, &eval("{a: x.y.z, b: [name, 2]}", &scope())));
    }
}
