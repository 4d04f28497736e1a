//! D-Bus signature scanner: walk a signature string and report how many
//! characters make up the next complete type, enforcing nesting limits and
//! dict-entry validity rules along the way.

use thiserror::Error;

pub const ARRAY: u8 = b'a';
pub const STRUCT_BEGIN: u8 = b'(';
pub const STRUCT_END: u8 = b')';
pub const DICT_ENTRY_BEGIN: u8 = b'{';
pub const DICT_ENTRY_END: u8 = b'}';
pub const VARIANT: u8 = b'v';

const MAX_NESTING: u32 = 32;

/// The D-Bus basic types, grouped the way the type alphabet splits them.
const NUMERIC: &[u8] = b"ynqiuxtd";
const STRING_LIKE: &[u8] = b"sog";
const OTHER_BASIC: &[u8] = b"bh";

pub fn is_numeric(c: u8) -> bool {
    NUMERIC.contains(&c)
}

pub fn is_string_like(c: u8) -> bool {
    STRING_LIKE.contains(&c)
}

pub fn is_basic(c: u8) -> bool {
    is_numeric(c) || is_string_like(c) || OTHER_BASIC.contains(&c)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature ends before a complete type")]
    Truncated,
    #[error("array nesting exceeds the maximum depth of {MAX_NESTING}")]
    ArrayTooDeep,
    #[error("struct/dict-entry nesting exceeds the maximum depth of {MAX_NESTING}")]
    StructTooDeep,
    #[error("dict entry must have exactly two subtypes, the first of which is basic")]
    MalformedDictEntry,
    #[error("'{{' is only valid as the element type of an array")]
    DictEntryNotInArray,
    #[error("unrecognized signature character {0:?}")]
    UnknownType(char),
}

/// Returns the length in bytes of the complete type starting at `position`
/// in `signature`. `signature` must be ASCII (every D-Bus type character
/// is), so byte and character indices coincide.
pub fn element_length(signature: &str, position: usize) -> Result<usize, SignatureError> {
    element_length_internal(signature.as_bytes(), position, true, 0, 0)
}

fn element_length_internal(
    s: &[u8],
    pos: usize,
    allow_dict_entry: bool,
    array_depth: u32,
    struct_depth: u32,
) -> Result<usize, SignatureError> {
    let c = *s.get(pos).ok_or(SignatureError::Truncated)?;

    if is_basic(c) || c == VARIANT {
        return Ok(1);
    }

    if c == ARRAY {
        if array_depth >= MAX_NESTING {
            return Err(SignatureError::ArrayTooDeep);
        }
        let inner = element_length_internal(s, pos + 1, true, array_depth + 1, struct_depth)?;
        return Ok(inner + 1);
    }

    if c == STRUCT_BEGIN {
        if struct_depth >= MAX_NESTING {
            return Err(SignatureError::StructTooDeep);
        }
        let mut p = pos + 1;
        loop {
            match s.get(p) {
                None => return Err(SignatureError::Truncated),
                Some(&STRUCT_END) => break,
                _ => {
                    let t = element_length_internal(s, p, false, array_depth, struct_depth + 1)?;
                    p += t;
                }
            }
        }
        return Ok(p - pos + 1);
    }

    if c == DICT_ENTRY_BEGIN {
        if !allow_dict_entry {
            return Err(SignatureError::DictEntryNotInArray);
        }
        if struct_depth >= MAX_NESTING {
            return Err(SignatureError::StructTooDeep);
        }
        let mut p = pos + 1;
        let mut n = 0u32;
        loop {
            match s.get(p) {
                None => return Err(SignatureError::Truncated),
                Some(&DICT_ENTRY_END) => break,
                Some(&first) => {
                    if n == 0 && !is_basic(first) {
                        return Err(SignatureError::MalformedDictEntry);
                    }
                    let t = element_length_internal(s, p, false, array_depth, struct_depth + 1)?;
                    p += t;
                    n += 1;
                }
            }
        }
        if n != 2 {
            return Err(SignatureError::MalformedDictEntry);
        }
        return Ok(p - pos + 1);
    }

    Err(SignatureError::UnknownType(c as char))
}

/// Splits a signature into its top-level complete types, e.g. `"si(ub)"`
/// becomes `["s", "i", "(ub)"]`. Used by the writer when stepping across
/// struct fields and by the reader for struct decoding.
pub fn split_types(signature: &str) -> Result<Vec<&str>, SignatureError> {
    let bytes = signature.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let len = element_length(signature, pos)?;
        out.push(&signature[pos..pos + len]);
        pos += len;
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basic_types_have_length_one() {
        for c in "ynqiuxtdsogbh".bytes() {
            let sig = (c as char).to_string();
            assert_eq!(element_length(&sig, 0).unwrap(), 1);
        }
        assert_eq!(element_length("v", 0).unwrap(), 1);
    }

    #[test]
    fn arrays_include_their_element() {
        assert_eq!(element_length("as", 0).unwrap(), 2);
        assert_eq!(element_length("aas", 0).unwrap(), 3);
        assert_eq!(element_length("a{sv}", 0).unwrap(), 5);
    }

    #[test]
    fn structs_span_to_matching_paren() {
        assert_eq!(element_length("(sy)", 0).unwrap(), 4);
        assert_eq!(element_length("(s(y)u)", 0).unwrap(), 7);
    }

    #[test]
    fn dict_entry_outside_array_is_rejected() {
        assert_eq!(
            element_length("{sv}", 0),
            Err(SignatureError::DictEntryNotInArray)
        );
    }

    #[test]
    fn dict_entry_requires_exactly_two_basic_first() {
        assert!(element_length("a{s}", 0).is_err());
        assert_eq!(
            element_length("a{svy}", 0),
            Err(SignatureError::MalformedDictEntry)
        );
        assert_eq!(element_length("a{vs}", 0), Err(SignatureError::MalformedDictEntry));
    }

    #[test]
    fn array_nesting_is_bounded() {
        let deep_ok = "a".repeat(32) + "y";
        assert!(element_length(&deep_ok, 0).is_ok());
        let deep_bad = "a".repeat(33) + "y";
        assert_eq!(element_length(&deep_bad, 0), Err(SignatureError::ArrayTooDeep));
    }

    #[test]
    fn struct_nesting_is_bounded() {
        let deep_ok = "(".repeat(32) + "y" + &")".repeat(32);
        assert!(element_length(&deep_ok, 0).is_ok());
        let deep_bad = "(".repeat(33) + "y" + &")".repeat(33);
        assert_eq!(element_length(&deep_bad, 0), Err(SignatureError::StructTooDeep));
    }

    #[test]
    fn element_length_totality_over_full_signature() {
        // Property 1: successive element_length calls sum to the whole
        // signature length, for any syntactically valid signature.
        let sig = "sy(iu)a{sv}";
        let mut pos = 0;
        while pos < sig.len() {
            pos += element_length(sig, pos).unwrap();
        }
        assert_eq!(pos, sig.len());
    }

    #[test]
    fn splits_struct_fields() {
        assert_eq!(split_types("si(ub)").unwrap(), vec!["s", "i", "(ub)"]);
    }
}
