//! Built-in functions callable from templates.

use base64::Engine;
use rand::RngCore;
use serde_json::Value;

use super::eval::{as_bool, as_number, render, Evaluator, Num};
use super::InterpolationError;

pub(super) fn call(
    ev: &mut Evaluator<'_>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, InterpolationError> {
    match name {
        "time.nano" => {
            arity(name, &args, 0)?;
            let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
            Ok(Value::String(nanos.to_string()))
        }
        "rand.base64" => {
            arity(name, &args, 1)?;
            let n = int_arg(name, &args[0])?;
            let mut buf = vec![0u8; n];
            rand::thread_rng().fill_bytes(&mut buf);
            Ok(Value::String(
                base64::engine::general_purpose::STANDARD.encode(buf),
            ))
        }
        "str.truncate" => {
            arity(name, &args, 2)?;
            let n = int_arg(name, &args[0])?;
            let s = render(&args[1]);
            Ok(Value::String(s.chars().take(n).collect()))
        }
        "str.queryEscape" => {
            arity(name, &args, 1)?;
            Ok(Value::String(query_escape(&render(&args[0]))))
        }
        "regexp.matches" => {
            arity(name, &args, 2)?;
            let re = regex::Regex::new(&render(&args[0])).map_err(|e| {
                fail(name, format!("error parsing regexp: {e}"))
            })?;
            Ok(Value::Bool(re.is_match(&render(&args[1]))))
        }
        "counter.next" => {
            arity(name, &args, 0)?;
            ev.counter += 1;
            Ok(Value::from(ev.counter))
        }
        "json.marshal" => {
            arity(name, &args, 1)?;
            serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|e| fail(name, e.to_string()))
        }
        "map.flatten" => {
            arity(name, &args, 3)?;
            let kv_sep = render(&args[0]);
            let pair_sep = render(&args[1]);
            let map = args[2]
                .as_object()
                .ok_or_else(|| fail(name, "third argument must be a map".to_string()))?;
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let pairs: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{k}{kv_sep}{}", render(&map[k])))
                .collect();
            Ok(Value::String(pairs.join(&pair_sep)))
        }
        "env" => {
            arity(name, &args, 1)?;
            let var = render(&args[0]);
            std::env::var(&var)
                .map(Value::String)
                .map_err(|_| fail(name, format!("missing environment variable {var}")))
        }
        "config" => {
            arity(name, &args, 1)?;
            let key = render(&args[0]);
            let found = ev.config.and_then(|c| lookup_config(c, &key));
            match found {
                Some(v) => Ok(Value::String(config_string(&v))),
                None => Err(fail(name, format!("missing config value {key}"))),
            }
        }
        "assert" => {
            arity(name, &args, 2)?;
            if as_bool(&args[0])? {
                Ok(Value::Bool(true))
            } else {
                Err(fail(name, render(&args[1])))
            }
        }
        other => Err(InterpolationError::UnknownFunction(other.to_string())),
    }
}

fn arity(name: &str, args: &[Value], want: usize) -> Result<(), InterpolationError> {
    if args.len() == want {
        Ok(())
    } else {
        Err(fail(
            name,
            format!("expected {want} argument(s), got {}", args.len()),
        ))
    }
}

fn int_arg(name: &str, v: &Value) -> Result<usize, InterpolationError> {
    match as_number(v)? {
        Num::Int(n) if n >= 0 => Ok(n as usize),
        _ => Err(fail(
            name,
            format!("expected a non-negative integer, got {}", render(v)),
        )),
    }
}

fn fail(name: &str, message: String) -> InterpolationError {
    InterpolationError::Function {
        name: name.to_string(),
        message,
    }
}

/// Query-string escaping: space becomes `+`, unreserved characters pass
/// through, everything else is percent-encoded.
fn query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Walk a dotted key through the configuration document. String values
/// holding JSON objects are descended into as well.
fn lookup_config(root: &Value, key: &str) -> Option<Value> {
    if let Some(v) = root.get(key) {
        return Some(v.clone());
    }
    let mut current = root.clone();
    for segment in key.split('.') {
        if let Value::String(s) = &current {
            current = serde_json::from_str::<Value>(s).ok()?;
        }
        current = current.get(segment)?.clone();
    }
    Some(current)
}

fn config_string(v: &Value) -> String {
    match v {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => parsed.to_string(),
            _ => s.clone(),
        },
        other => render(other),
    }
}

#[cfg(test)]
mod tests {
    use super::super::eval;
    use super::*;
    use serde_json::{json, Map};

    fn run(template: &str) -> Result<Value, InterpolationError> {
        eval(template, &Map::new())
    }

    #[test]
    fn truncate() {
        assert_eq!(run(r#"${str.truncate(2, "expression")}"#).unwrap(), json!("ex"));
        assert_eq!(
            run(r#"${str.truncate(200, "expression")}"#).unwrap(),
            json!("expression")
        );
    }

    #[test]
    fn counter_counts_per_evaluation() {
        assert_eq!(
            run("${counter.next()},${counter.next()},${counter.next()}").unwrap(),
            json!("1,2,3")
        );
        assert_eq!(run("${counter.next()}").unwrap(), json!("1"));
    }

    #[test]
    fn query_escape_values() {
        assert_eq!(
            run(r#"${str.queryEscape("hello world")}"#).unwrap(),
            json!("hello+world")
        );
        assert_eq!(
            run(r#"${str.queryEscape("hello&world")}"#).unwrap(),
            json!("hello%26world")
        );
    }

    #[test]
    fn regex_matches() {
        assert_eq!(
            run(r#"${regexp.matches("^(D|d)[0-9]+$", "d12345")}"#).unwrap(),
            json!("true")
        );
        let err = run(r#"${regexp.matches("^($", "d12345")}"#).unwrap_err();
        assert!(err.to_string().contains("error parsing regexp"), "{err}");
    }

    #[test]
    fn assert_function() {
        assert_eq!(
            run(r#"${assert(true, "nothing should happen")}"#).unwrap(),
            json!("true")
        );
        let err = run(r#"${assert(false, "failure message ${1+1}")}"#).unwrap_err();
        assert!(err.to_string().contains("failure message 2"), "{err}");
    }

    #[test]
    fn json_marshal() {
        let mut vars = Map::new();
        vars.insert("mapval".into(), json!({"hello": "world"}));
        vars.insert("list".into(), json!(["a", "b", "c"]));
        assert_eq!(
            eval("${json.marshal(mapval)}", &vars).unwrap(),
            json!(r#"{"hello":"world"}"#)
        );
        assert_eq!(
            eval("${json.marshal(list)}", &vars).unwrap(),
            json!(r#"["a","b","c"]"#)
        );
        assert_eq!(run("${json.marshal(42)}").unwrap(), json!("42"));
        assert_eq!(run(r#"${json.marshal("str")}"#).unwrap(), json!(r#""str""#));
        assert_eq!(run("${json.marshal(false)}").unwrap(), json!("false"));
    }

    #[test]
    fn map_flatten() {
        let mut vars = Map::new();
        vars.insert("empty".into(), json!({}));
        vars.insert("two".into(), json!({"key2": "val2", "key1": "val1"}));
        assert_eq!(
            eval(r#"${map.flatten(":", ";", empty)}"#, &vars).unwrap(),
            json!("")
        );
        assert_eq!(
            eval(r#"${map.flatten(":", ";", two)}"#, &vars).unwrap(),
            json!("key1:val1;key2:val2")
        );
    }

    #[test]
    fn env_lookup() {
        std::env::set_var("INTERPOLATION_TEST_FOO", "Bar");
        assert_eq!(
            run(r#"${env("INTERPOLATION_TEST_FOO")}"#).unwrap(),
            json!("Bar")
        );
        let err = run(r#"${env("_INTERPOLATION_MISSING")}"#).unwrap_err();
        assert!(err
            .to_string()
            .contains("missing environment variable _INTERPOLATION_MISSING"));
    }

    #[test]
    fn config_lookup() {
        let config = json!({
            "config": {"val": "foo"},
            "test": {
                "map": {"value": "one"},
                "string_object": "{\"value\": \"one\"}",
                "string_multiline_object": "{\n  \"value\": \"one\"\n}\n"
            }
        });
        let vars = Map::new();
        let mut ev = Evaluator::new(&vars).with_config(&config);
        assert_eq!(ev.eval(r#"${config("config.val")}"#).unwrap(), json!("foo"));
        assert_eq!(
            ev.eval(r#"${config("test.map")}"#).unwrap(),
            json!(r#"{"value":"one"}"#)
        );
        assert_eq!(
            ev.eval(r#"${config("test.map.value")}"#).unwrap(),
            json!("one")
        );
        assert_eq!(
            ev.eval(r#"${config("test.string_object")}"#).unwrap(),
            json!(r#"{"value":"one"}"#)
        );
        assert_eq!(
            ev.eval(r#"${config("test.string_multiline_object")}"#)
                .unwrap(),
            json!(r#"{"value":"one"}"#)
        );
        let err = ev.eval(r#"${config("config.missing")}"#).unwrap_err();
        assert!(err.to_string().contains("missing config value config.missing"));
    }

    #[test]
    fn time_nano_is_numeric() {
        let v = run("${time.nano()}").unwrap();
        let n: i128 = v.as_str().unwrap().parse().unwrap();
        assert!(n > 0);
    }

    #[test]
    fn rand_base64_length() {
        assert_eq!(run("${rand.base64(32)}").unwrap().as_str().unwrap().len(), 44);
        assert_eq!(run("${rand.base64(16)}").unwrap().as_str().unwrap().len(), 24);
    }
}
