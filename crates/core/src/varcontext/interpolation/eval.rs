use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::functions;
use super::parser::{parse_template, BinOp, Expr, Part, Template, UnOp};
use super::InterpolationError;

/// Evaluates templates against a variable map.
///
/// One evaluator is one evaluation scope: `counter.next()` counts from 1 per
/// evaluator. `config(key)` resolves dotted keys against the optional raw
/// configuration document.
pub struct Evaluator<'a> {
    pub(super) variables: &'a Map<String, Value>,
    pub(super) config: Option<&'a Value>,
    pub(super) counter: i64,
}

impl<'a> Evaluator<'a> {
    pub fn new(variables: &'a Map<String, Value>) -> Self {
        Self {
            variables,
            config: None,
            counter: 0,
        }
    }

    pub fn with_config(mut self, config: &'a Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Evaluate a template.
    ///
    /// A template that is exactly one `${...}` yields the expression's value,
    /// with scalars rendered as strings and lists/maps kept structured.
    /// Anything else yields the concatenated string.
    pub fn eval(&mut self, template: &str) -> Result<Value, InterpolationError> {
        let parsed = parse_template(template)?;
        self.eval_template(&parsed)
    }

    fn eval_template(&mut self, t: &Template) -> Result<Value, InterpolationError> {
        if let Some(expr) = t.single_expr() {
            let v = self.eval_expr(expr)?;
            return Ok(match v {
                Value::Array(_) | Value::Object(_) => v,
                scalar => Value::String(render(&scalar)),
            });
        }
        let mut out = String::new();
        for part in &t.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Expr(e) => {
                    let v = self.eval_expr(e)?;
                    out.push_str(&render(&v));
                }
            }
        }
        Ok(Value::String(out))
    }

    pub(super) fn eval_expr(&mut self, expr: &Expr) -> Result<Value, InterpolationError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Text(t) => {
                let v = self.eval_template(t)?;
                Ok(Value::String(render(&v)))
            }
            Expr::Var(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| InterpolationError::UnknownVariable(name.clone())),
            Expr::Index(target, idx) => {
                let target = self.eval_expr(target)?;
                let idx = self.eval_expr(idx)?;
                index(&target, &idx)
            }
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval_expr(a)?);
                }
                functions::call(self, name, values)
            }
            Expr::Unary(op, inner) => {
                let v = self.eval_expr(inner)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!as_bool(&v)?)),
                    UnOp::Neg => match as_number(&v)? {
                        Num::Int(n) => Ok(Value::from(-n)),
                        Num::Float(f) => Ok(Value::from(-f)),
                    },
                }
            }
            Expr::Binary(op, l, r) => {
                let l = self.eval_expr(l)?;
                let r = self.eval_expr(r)?;
                binary(*op, &l, &r)
            }
            // both branches are evaluated so side-effecting functions run
            // the same number of times whichever branch is taken
            Expr::Conditional(c, yes, no) => {
                let c = self.eval_expr(c)?;
                let yes = self.eval_expr(yes)?;
                let no = self.eval_expr(no)?;
                Ok(if as_bool(&c)? { yes } else { no })
            }
        }
    }
}

/// Evaluate `template` against `variables` in a fresh scope.
pub fn eval(template: &str, variables: &Map<String, Value>) -> Result<Value, InterpolationError> {
    Evaluator::new(variables).eval(template)
}

/// String rendering used for interpolation into text.
pub fn render(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
pub(super) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(f) => f,
        }
    }
}

pub(super) fn as_number(v: &Value) -> Result<Num, InterpolationError> {
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Num::Int(i))
            } else {
                Ok(Num::Float(n.as_f64().unwrap_or_default()))
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Ok(Num::Int(i))
            } else if let Ok(f) = s.parse::<f64>() {
                Ok(Num::Float(f))
            } else {
                Err(InterpolationError::Type(format!(
                    "cannot convert {s:?} to a number"
                )))
            }
        }
        other => Err(InterpolationError::Type(format!(
            "cannot convert {other} to a number"
        ))),
    }
}

pub(super) fn as_bool(v: &Value) -> Result<bool, InterpolationError> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(InterpolationError::Type(format!(
                "cannot convert {s:?} to a boolean"
            ))),
        },
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        other => Err(InterpolationError::Type(format!(
            "cannot convert {other} to a boolean"
        ))),
    }
}

fn index(target: &Value, idx: &Value) -> Result<Value, InterpolationError> {
    match target {
        Value::Array(items) => {
            let i = match as_number(idx)? {
                Num::Int(i) if i >= 0 => i as usize,
                _ => {
                    return Err(InterpolationError::Type(format!(
                        "invalid list index {}",
                        render(idx)
                    )))
                }
            };
            items.get(i).cloned().ok_or_else(|| {
                InterpolationError::Type(format!(
                    "index {i} out of range for list of length {}",
                    items.len()
                ))
            })
        }
        Value::Object(map) => {
            let key = render(idx);
            map.get(&key)
                .cloned()
                .ok_or_else(|| InterpolationError::Type(format!("key {key:?} not found in map")))
        }
        other => Err(InterpolationError::Type(format!(
            "cannot index into {other}"
        ))),
    }
}

fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, InterpolationError> {
    match op {
        BinOp::And => Ok(Value::Bool(as_bool(l)? && as_bool(r)?)),
        BinOp::Or => Ok(Value::Bool(as_bool(l)? || as_bool(r)?)),
        BinOp::Eq => Ok(Value::Bool(loose_eq(l, r))),
        BinOp::Neq => Ok(Value::Bool(!loose_eq(l, r))),
        BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => {
            let a = as_number(l)?.as_f64();
            let b = as_number(r)?.as_f64();
            let ord = a.partial_cmp(&b).ok_or_else(|| {
                InterpolationError::Type("cannot compare NaN".to_string())
            })?;
            Ok(Value::Bool(match op {
                BinOp::Lt => ord == Ordering::Less,
                BinOp::Lte => ord != Ordering::Greater,
                BinOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            arithmetic(op, as_number(l)?, as_number(r)?)
        }
    }
}

fn arithmetic(op: BinOp, l: Num, r: Num) -> Result<Value, InterpolationError> {
    if let (Num::Int(a), Num::Int(b)) = (l, r) {
        let result = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div => {
                if b == 0 {
                    return Err(InterpolationError::Type("divide by zero".to_string()));
                }
                a.checked_div(b)
            }
            _ => {
                if b == 0 {
                    return Err(InterpolationError::Type("divide by zero".to_string()));
                }
                a.checked_rem(b)
            }
        };
        return result
            .map(Value::from)
            .ok_or_else(|| InterpolationError::Type("integer overflow".to_string()));
    }
    let (a, b) = (l.as_f64(), r.as_f64());
    let f = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        _ => a % b,
    };
    Ok(Value::from(f))
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    if l == r {
        return true;
    }
    match (as_number(l), as_number(r)) {
        (Ok(a), Ok(b)) => a.as_f64() == b.as_f64(),
        _ => render(l) == render(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn ok(template: &str, variables: Value) -> Value {
        eval(template, &vars(variables)).unwrap()
    }

    #[test]
    fn non_templated_string() {
        assert_eq!(ok("foo", json!({})), json!("foo"));
    }

    #[test]
    fn basic_evaluation_renders_string() {
        assert_eq!(ok("${33}", json!({})), json!("33"));
    }

    #[test]
    fn escaped_evaluation() {
        assert_eq!(ok("$${33}", json!({})), json!("${33}"));
    }

    #[test]
    fn missing_variable() {
        let err = eval("${a}", &Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "unknown variable accessed: a");
    }

    #[test]
    fn variable_substitution() {
        assert_eq!(ok("${foo}", json!({"foo": 33})), json!("33"));
        assert_eq!(
            ok("${request.plan_id}-x", json!({"request.plan_id": "p"})),
            json!("p-x")
        );
    }

    #[test]
    fn bad_template() {
        let err = eval("${", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("expected expression"), "{err}");
    }

    #[test]
    fn conditionals() {
        assert_eq!(ok(r#"${true ? "foo" : "bar"}"#, json!({})), json!("foo"));
        assert_eq!(ok(r#"${false ? "foo" : "bar"}"#, json!({})), json!("bar"));
    }

    #[test]
    fn no_short_circuit() {
        assert_eq!(
            ok("${false ? counter.next() : counter.next()}", json!({})),
            json!("2")
        );
    }

    #[test]
    fn arithmetic_and_comparison() {
        assert_eq!(ok("${1 + 2 * 3}", json!({})), json!("7"));
        assert_eq!(ok("${7 / 2}", json!({})), json!("3"));
        assert_eq!(ok("${1.5 * 2}", json!({})), json!("3.0"));
        assert_eq!(ok("${n > 3 && n <= 10}", json!({"n": 5})), json!("true"));
        assert_eq!(ok(r#"${s == "x"}"#, json!({"s": "x"})), json!("true"));
        assert!(eval("${1 / 0}", &Map::new()).is_err());
    }

    #[test]
    fn indexing_lists_and_maps() {
        let v = json!({"list": ["a", "b"], "m": {"k": "v"}});
        assert_eq!(ok("${list[1]}", v.clone()), json!("b"));
        assert_eq!(ok(r#"${m["k"]}"#, v), json!("v"));
    }

    #[test]
    fn structured_values_stay_structured() {
        let v = json!({"obj": {"a": 1}});
        assert_eq!(ok("${obj}", v), json!({"a": 1}));
    }

    #[test]
    fn nested_interpolation_in_string_literal() {
        assert_eq!(ok(r#"${"n=${1+1}"}"#, json!({})), json!("n=2"));
    }
}
