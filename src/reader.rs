//! Recursive decode of a bus message into a [`json::Value`], one element
//! at a time, driven entirely by the message's own type cursor:
//! `dbus::arg::Iter::arg_type()` peeks the current element's type and
//! `recurse()` descends into a container.

use dbus::arg::{ArgType, Iter};

use crate::error::GatewayError;
use crate::introspect::Method;
use crate::json::Value;

/// Decodes the single value at the iterator's current position into JSON,
/// without advancing past it.
pub fn element_to_json(iter: &mut Iter) -> Result<Value, GatewayError> {
    match iter.arg_type() {
        ArgType::Byte => Ok(Value::number(iter.get::<u8>().ok_or_else(malformed)? as f64)),
        ArgType::Int16 => Ok(Value::number(iter.get::<i16>().ok_or_else(malformed)? as f64)),
        ArgType::UInt16 => Ok(Value::number(iter.get::<u16>().ok_or_else(malformed)? as f64)),
        ArgType::Int32 => Ok(Value::number(iter.get::<i32>().ok_or_else(malformed)? as f64)),
        ArgType::UInt32 => Ok(Value::number(iter.get::<u32>().ok_or_else(malformed)? as f64)),
        ArgType::Int64 => Ok(Value::number(iter.get::<i64>().ok_or_else(malformed)? as f64)),
        ArgType::UInt64 => Ok(Value::number(iter.get::<u64>().ok_or_else(malformed)? as f64)),
        ArgType::Double => Ok(Value::number(iter.get::<f64>().ok_or_else(malformed)?)),
        ArgType::Boolean => Ok(Value::bool(iter.get::<bool>().ok_or_else(malformed)?)),
        ArgType::String | ArgType::ObjectPath | ArgType::Signature => {
            let s = iter.get::<&str>().ok_or_else(malformed)?;
            Ok(Value::string(s))
        }
        ArgType::UnixFd => Err(GatewayError::Unsupported(
            "file descriptors cannot be represented in JSON".into(),
        )),
        ArgType::Variant => {
            let mut inner = iter.recurse(ArgType::Variant).ok_or_else(malformed)?;
            // The variant's carried signature is consumed here and never
            // surfaces in the JSON, per spec.
            element_to_json(&mut inner)
        }
        ArgType::Array => {
            let mut inner = iter.recurse(ArgType::Array).ok_or_else(malformed)?;
            if inner.arg_type() == ArgType::DictEntry {
                array_of_dict_entries_to_json(&mut inner)
            } else {
                array_to_json(&mut inner)
            }
        }
        ArgType::Struct => {
            let mut inner = iter.recurse(ArgType::Struct).ok_or_else(malformed)?;
            struct_to_json(&mut inner)
        }
        other => Err(GatewayError::Internal(format!(
            "unexpected top-level argument type {other:?}"
        ))),
    }
}

fn array_to_json(inner: &mut Iter) -> Result<Value, GatewayError> {
    let mut array = Value::array();
    loop {
        // An empty array's sub-iterator starts with ArgType::Invalid.
        if inner.arg_type() == ArgType::Invalid {
            break;
        }
        array.push(element_to_json(inner)?).expect("array is a freshly constructed Value::Array");
        if !inner.next() {
            break;
        }
    }
    Ok(array)
}

fn array_of_dict_entries_to_json(inner: &mut Iter) -> Result<Value, GatewayError> {
    let mut object = Value::object();
    loop {
        if inner.arg_type() == ArgType::Invalid {
            break;
        }
        let mut entry = inner
            .recurse(ArgType::DictEntry)
            .ok_or_else(malformed)?;
        let key = dict_key_to_string(&mut entry)?;
        if !entry.next() {
            return Err(malformed());
        }
        let value = element_to_json(&mut entry)?;
        object.insert(key, value).expect("object is a freshly constructed Value::Object");
        if !inner.next() {
            break;
        }
    }
    Ok(object)
}

fn dict_key_to_string(entry: &mut Iter) -> Result<String, GatewayError> {
    // Dict keys are a basic type; numeric keys are stringified in decimal.
    match entry.arg_type() {
        ArgType::Byte => Ok(entry.get::<u8>().ok_or_else(malformed)?.to_string()),
        ArgType::Int16 => Ok(entry.get::<i16>().ok_or_else(malformed)?.to_string()),
        ArgType::UInt16 => Ok(entry.get::<u16>().ok_or_else(malformed)?.to_string()),
        ArgType::Int32 => Ok(entry.get::<i32>().ok_or_else(malformed)?.to_string()),
        ArgType::UInt32 => Ok(entry.get::<u32>().ok_or_else(malformed)?.to_string()),
        ArgType::Int64 => Ok(entry.get::<i64>().ok_or_else(malformed)?.to_string()),
        ArgType::UInt64 => Ok(entry.get::<u64>().ok_or_else(malformed)?.to_string()),
        ArgType::Double => Ok(entry.get::<f64>().ok_or_else(malformed)?.to_string()),
        ArgType::Boolean => Ok(entry.get::<bool>().ok_or_else(malformed)?.to_string()),
        ArgType::String | ArgType::ObjectPath | ArgType::Signature => {
            Ok(entry.get::<&str>().ok_or_else(malformed)?.to_string())
        }
        other => Err(GatewayError::Internal(format!(
            "dict key has non-basic type {other:?}"
        ))),
    }
}

fn struct_to_json(inner: &mut Iter) -> Result<Value, GatewayError> {
    let mut array = Value::array();
    loop {
        if inner.arg_type() == ArgType::Invalid {
            break;
        }
        array.push(element_to_json(inner)?).expect("array is a freshly constructed Value::Array");
        if !inner.next() {
            break;
        }
    }
    Ok(array)
}

fn malformed() -> GatewayError {
    GatewayError::Internal("bus message ended before a declared value was fully read".into())
}

/// Reads a whole method reply: one value per declared out-argument, keyed
/// by the argument's (possibly default `arg<N>`) name. A reply that carries
/// too few or too many values doesn't match the service's own introspection,
/// which is a fault in the service, not in the request, so this fails with
/// `Internal` rather than `MalformedRequest`.
pub fn reply_to_json(method: &Method, mut iter: Iter) -> Result<Value, GatewayError> {
    let mut object = Value::object();
    let mut has_arg = iter.arg_type() != ArgType::Invalid;
    for out_arg in &method.out_args {
        if !has_arg {
            return Err(GatewayError::Internal(
                "reply has fewer values than declared out-arguments".into(),
            ));
        }
        let value = element_to_json(&mut iter)?;
        object.insert(out_arg.name.clone(), value).expect("object is a freshly constructed Value::Object");
        has_arg = iter.next();
    }
    if has_arg {
        return Err(GatewayError::Internal(
            "reply has more values than declared out-arguments".into(),
        ));
    }
    Ok(object)
}

/// Reads a `GetAll` reply: the single top-level `a{sv}` value, emitted
/// directly as a JSON object.
pub fn properties_to_json(mut iter: Iter) -> Result<Value, GatewayError> {
    if iter.arg_type() == ArgType::Invalid {
        return Ok(Value::object());
    }
    element_to_json(&mut iter)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::introspect::Argument;
    use dbus::arg::{Array, Dict, IterAppend, Variant};
    use dbus::Message;

    fn roundtrip_message() -> Message {
        Message::new_method_call("dbus.http.Test", "/", "dbus.http.Test", "M").unwrap()
    }

    #[test]
    fn reads_numeric_and_string_scalars() {
        let mut m = roundtrip_message();
        {
            let mut ia = IterAppend::new(&mut m);
            ia.append(42i32);
            ia.append("hi");
            ia.append(true);
        }
        let mut iter = m.iter_init();
        assert_eq!(element_to_json(&mut iter).unwrap(), Value::number(42.0));
        assert!(iter.next());
        assert_eq!(element_to_json(&mut iter).unwrap(), Value::string("hi"));
        assert!(iter.next());
        assert_eq!(element_to_json(&mut iter).unwrap(), Value::bool(true));
    }

    #[test]
    fn reads_array_of_dict_entries_as_object() {
        let mut m = roundtrip_message();
        let mut map = std::collections::HashMap::new();
        map.insert("a".to_string(), 1u32);
        map.insert("b".to_string(), 2u32);
        {
            let mut ia = IterAppend::new(&mut m);
            ia.append(Dict::new(&map));
        }
        let mut iter = m.iter_init();
        let v = element_to_json(&mut iter).unwrap();
        assert_eq!(v.get("a", None).unwrap().as_f64(), Some(1.0));
        assert_eq!(v.get("b", None).unwrap().as_f64(), Some(2.0));
    }

    #[test]
    fn reads_plain_array_and_struct() {
        let mut m = roundtrip_message();
        {
            let mut ia = IterAppend::new(&mut m);
            ia.append(Array::new(&vec![1i32, 2, 3]));
            ia.append((7i32, "x"));
        }
        let mut iter = m.iter_init();
        let arr = element_to_json(&mut iter).unwrap();
        assert_eq!(arr.len().unwrap(), 3);
        assert!(iter.next());
        let st = element_to_json(&mut iter).unwrap();
        assert_eq!(st.index(0, None).unwrap().as_f64(), Some(7.0));
        assert_eq!(st.index(1, None).unwrap().as_str(), Some("x"));
    }

    #[test]
    fn reads_variant_transparently() {
        let mut m = roundtrip_message();
        {
            let mut ia = IterAppend::new(&mut m);
            ia.append(Variant(9u32));
        }
        let mut iter = m.iter_init();
        assert_eq!(element_to_json(&mut iter).unwrap(), Value::number(9.0));
    }

    #[test]
    fn reply_keyed_by_out_arg_names() {
        let mut m = roundtrip_message();
        {
            let mut ia = IterAppend::new(&mut m);
            ia.append(42i32);
        }
        let method = crate::introspect::Method {
            name: "Multiply".into(),
            in_args: vec![],
            out_args: vec![Argument {
                name: "arg0".into(),
                ty: "i".into(),
            }],
        };
        let v = reply_to_json(&method, m.iter_init()).unwrap();
        assert_eq!(v.get("arg0", None).unwrap().as_f64(), Some(42.0));
    }

    #[test]
    fn reply_with_too_few_values_is_malformed() {
        let m = roundtrip_message();
        let method = crate::introspect::Method {
            name: "Multiply".into(),
            in_args: vec![],
            out_args: vec![Argument {
                name: "arg0".into(),
                ty: "i".into(),
            }],
        };
        assert!(matches!(
            reply_to_json(&method, m.iter_init()),
            Err(GatewayError::MalformedRequest(_))
        ));
    }
}
