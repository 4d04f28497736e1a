//! Recursive encode of a JSON subtree into a bus message, driven by a
//! target D-Bus signature walked in lock-step with the JSON value.
//!
//! Container bookkeeping goes through `dbus::arg::IterAppend`'s
//! `append_container`, which closes the container for us even on an early
//! return, so a failed recursive call can never leave an unbalanced
//! container open: that falls out of the RAII-style API instead of
//! needing manual discipline.

use dbus::arg::{ArgType, IterAppend};

use crate::error::GatewayError;
use crate::introspect::Method;
use crate::json::{Kind, Value};
use crate::signature::{self, SignatureError};

impl From<SignatureError> for GatewayError {
    fn from(e: SignatureError) -> Self {
        GatewayError::InvalidArgs(e.to_string())
    }
}

fn invalid_args(msg: impl Into<String>) -> GatewayError {
    GatewayError::InvalidArgs(msg.into())
}

fn expect_number(value: &Value) -> Result<f64, GatewayError> {
    value
        .as_f64()
        .ok_or_else(|| invalid_args(format!("expected a number, found {}", value.kind())))
}

/// Appends `value` to `ia` according to the type at `sig[pos..]`. Returns
/// the number of signature characters consumed, so callers stepping across
/// struct/dict-entry siblings know where the next subtype starts.
pub fn append_value(
    ia: &mut IterAppend,
    sig: &str,
    pos: usize,
    value: &Value,
) -> Result<usize, GatewayError> {
    let bytes = sig.as_bytes();
    let c = *bytes.get(pos).ok_or_else(|| invalid_args("signature ended unexpectedly"))?;

    match c {
        b'y' => {
            ia.append(expect_number(value)? as u8);
            Ok(1)
        }
        b'n' => {
            ia.append(expect_number(value)? as i16);
            Ok(1)
        }
        b'q' => {
            ia.append(expect_number(value)? as u16);
            Ok(1)
        }
        b'i' => {
            ia.append(expect_number(value)? as i32);
            Ok(1)
        }
        b'u' => {
            ia.append(expect_number(value)? as u32);
            Ok(1)
        }
        b'x' => {
            ia.append(expect_number(value)? as i64);
            Ok(1)
        }
        b't' => {
            ia.append(expect_number(value)? as u64);
            Ok(1)
        }
        b'd' => {
            ia.append(expect_number(value)?);
            Ok(1)
        }
        b'b' => {
            let b = value
                .as_bool()
                .ok_or_else(|| invalid_args(format!("expected a boolean, found {}", value.kind())))?;
            ia.append(b);
            Ok(1)
        }
        b's' | b'o' | b'g' => {
            let s = value
                .as_str()
                .ok_or_else(|| invalid_args(format!("expected a string, found {}", value.kind())))?;
            ia.append(s.to_string());
            Ok(1)
        }
        b'h' => Err(GatewayError::Unsupported(
            "file descriptors cannot be passed over HTTP".into(),
        )),
        b'a' => {
            let elem_len = signature::element_length(sig, pos + 1)?;
            let elem_sig = &sig[pos + 1..pos + 1 + elem_len];
            append_array(ia, elem_sig, value)?;
            Ok(1 + elem_len)
        }
        b'(' => {
            let full_len = signature::element_length(sig, pos)?;
            let inner_sig = &sig[pos + 1..pos + full_len - 1];
            append_struct(ia, inner_sig, value)?;
            Ok(full_len)
        }
        b'{' => {
            let full_len = signature::element_length(sig, pos)?;
            // `{` only ever arrives here as the element type handed in by
            // `append_array`'s dict branch, which calls `append_dict`
            // directly; reaching it from `append_value` would mean a `{`
            // appeared outside of an array, which the scanner rejects.
            Err(GatewayError::Internal(format!(
                "dict-entry type reached append_value directly: {}",
                &sig[pos..pos + full_len]
            )))
        }
        b'v' => {
            let (inner_sig, inner_value) = resolve_variant(value)?;
            let mut result = Ok(());
            ia.append_container(ArgType::Variant, Some(&inner_sig), |sub| {
                result = append_value(sub, &inner_sig, 0, &inner_value).map(|_| ());
            });
            result?;
            Ok(1)
        }
        other => Err(invalid_args(format!(
            "unsupported signature character {:?}",
            other as char
        ))),
    }
}

fn append_array(ia: &mut IterAppend, elem_sig: &str, value: &Value) -> Result<(), GatewayError> {
    if elem_sig.starts_with('{') {
        return append_dict(ia, elem_sig, value);
    }
    let elements = value
        .as_array()
        .ok_or_else(|| invalid_args(format!("expected an array, found {}", value.kind())))?;
    // `append_container`'s callback isn't fallible, so the first error from
    // a recursive `append_value` is stashed here and re-raised once the
    // container (closed automatically on return) is done.
    let mut result = Ok(());
    ia.append_container(ArgType::Array, Some(elem_sig), |sub| {
        for element in elements {
            if result.is_ok() {
                result = append_value(sub, elem_sig, 0, element).map(|_| ());
            }
        }
    });
    result
}

fn append_dict(ia: &mut IterAppend, entry_sig: &str, value: &Value) -> Result<(), GatewayError> {
    let entries = value
        .as_object()
        .ok_or_else(|| invalid_args(format!("expected an object, found {}", value.kind())))?;
    // entry_sig is "{KV}"; the value subtype starts right after the key
    // character. Dict keys are always written as `s`, regardless of the
    // declared key type.
    let value_sig = &entry_sig[2..entry_sig.len() - 1];
    let mut result = Ok(());
    for (key, v) in entries {
        if result.is_err() {
            break;
        }
        ia.append_container(ArgType::DictEntry, None, |sub| {
            sub.append(key.clone());
            result = append_value(sub, value_sig, 0, v).map(|_| ());
        });
    }
    result
}

fn append_struct(ia: &mut IterAppend, inner_sig: &str, value: &Value) -> Result<(), GatewayError> {
    let elements = value
        .as_array()
        .ok_or_else(|| invalid_args(format!("expected an array for a struct, found {}", value.kind())))?;
    let mut result = Ok(());
    ia.append_container(ArgType::Struct, None, |sub| {
        let mut pos = 0usize;
        let mut idx = 0usize;
        while pos < inner_sig.len() && result.is_ok() {
            let element = match elements.get(idx) {
                Some(e) => e,
                None => {
                    result = Err(invalid_args(
                        "struct has fewer JSON elements than declared fields",
                    ));
                    break;
                }
            };
            match append_value(sub, inner_sig, pos, element) {
                Ok(consumed) => pos += consumed,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
            idx += 1;
        }
    });
    result
}

/// Chooses a signature for a JSON value being written as a variant: an
/// object with both `dbus_variant_sign` and `data` picks the signature
/// explicitly; otherwise a string maps to `s` and a boolean to `b`. Bare
/// numbers and arrays are ambiguous and must be wrapped.
fn resolve_variant(value: &Value) -> Result<(String, Value), GatewayError> {
    if let Value::Object(_) = value {
        if let (Ok(sig), Ok(data)) = (
            value.get("dbus_variant_sign", Some(Kind::String)),
            value.get("data", None),
        ) {
            let sig = sig.as_str().expect("checked Kind::String above").to_string();
            return Ok((sig, data.clone()));
        }
    }
    match value {
        Value::String(_) => Ok(("s".to_string(), value.clone())),
        Value::Bool(_) => Ok(("b".to_string(), value.clone())),
        _ => Err(invalid_args(
            "a bare number or array cannot be sent as a variant; wrap it as \
             {\"dbus_variant_sign\": \"<sig>\", \"data\": <value>}",
        )),
    }
}

/// Writes a whole outgoing method call's arguments, rejecting the call
/// before appending anything if `args` doesn't have the same length as
/// `method.in_args`.
pub fn append_call_args(
    ia: &mut IterAppend,
    method: &Method,
    args: &[Value],
) -> Result<(), GatewayError> {
    if args.len() != method.in_args.len() {
        return Err(GatewayError::MalformedRequest(format!(
            "expected {} argument(s), found {}",
            method.in_args.len(),
            args.len()
        )));
    }
    for (in_arg, json_arg) in method.in_args.iter().zip(args) {
        append_value(ia, &in_arg.ty, 0, json_arg)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::introspect::Argument;
    use crate::reader;
    use dbus::Message;

    fn new_message() -> Message {
        Message::new_method_call("dbus.http.Test", "/", "dbus.http.Test", "M").unwrap()
    }

    #[test]
    fn writes_and_reads_back_scalars() {
        let mut m = new_message();
        {
            let mut ia = IterAppend::new(&mut m);
            append_value(&mut ia, "i", 0, &Value::number(42.0)).unwrap();
        }
        let mut iter = m.iter_init();
        assert_eq!(reader::element_to_json(&mut iter).unwrap(), Value::number(42.0));
    }

    #[test]
    fn writes_and_reads_back_array() {
        let mut m = new_message();
        let arr = {
            let mut v = Value::array();
            v.push(Value::number(1.0)).unwrap();
            v.push(Value::number(2.0)).unwrap();
            v
        };
        {
            let mut ia = IterAppend::new(&mut m);
            append_value(&mut ia, "ai", 0, &arr).unwrap();
        }
        let mut iter = m.iter_init();
        let back = reader::element_to_json(&mut iter).unwrap();
        assert_eq!(back, arr);
    }

    #[test]
    fn writes_and_reads_back_dict() {
        let mut m = new_message();
        let mut obj = Value::object();
        obj.insert_string("a", "1").unwrap();
        {
            let mut ia = IterAppend::new(&mut m);
            append_value(&mut ia, "a{ss}", 0, &obj).unwrap();
        }
        let mut iter = m.iter_init();
        let back = reader::element_to_json(&mut iter).unwrap();
        assert_eq!(back.get_str("a").unwrap(), "1");
    }

    #[test]
    fn writes_and_reads_back_struct() {
        let mut m = new_message();
        let mut arr = Value::array();
        arr.push(Value::number(7.0)).unwrap();
        arr.push(Value::string("x")).unwrap();
        {
            let mut ia = IterAppend::new(&mut m);
            append_value(&mut ia, "(is)", 0, &arr).unwrap();
        }
        let mut iter = m.iter_init();
        let back = reader::element_to_json(&mut iter).unwrap();
        assert_eq!(back, arr);
    }

    #[test]
    fn variant_requires_wrapper_for_bare_numbers() {
        let mut m = new_message();
        let mut ia = IterAppend::new(&mut m);
        let err = append_value(&mut ia, "v", 0, &Value::number(7.0)).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgs(_)));
    }

    #[test]
    fn variant_with_explicit_signature_roundtrips() {
        let mut m = new_message();
        let mut wrapped = Value::object();
        wrapped.insert_string("dbus_variant_sign", "u").unwrap();
        wrapped.insert("data", Value::number(7.0)).unwrap();
        {
            let mut ia = IterAppend::new(&mut m);
            append_value(&mut ia, "v", 0, &wrapped).unwrap();
        }
        let mut iter = m.iter_init();
        let back = reader::element_to_json(&mut iter).unwrap();
        assert_eq!(back, Value::number(7.0));
    }

    #[test]
    fn arity_mismatch_is_rejected_before_any_append() {
        let mut m = new_message();
        let method = Method {
            name: "Multiply".into(),
            in_args: vec![
                Argument { name: "arg0".into(), ty: "i".into() },
                Argument { name: "arg1".into(), ty: "i".into() },
            ],
            out_args: vec![],
        };
        let mut ia = IterAppend::new(&mut m);
        let err = append_call_args(&mut ia, &method, &[Value::number(6.0)]).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedRequest(_)));
    }
}
