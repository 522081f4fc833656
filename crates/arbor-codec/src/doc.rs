//! The document grammar.
//!
//! Documents are plain `serde_json::Value` trees. Objects may carry a
//! `"__class__"` type-tag; two tags are reserved: [`EXTERN_TAG`] marks a
//! reference into the array store, and the tensor type name marks an
//! inlined array (`dtype` + nested `data`).

use serde_json::{Map, Number, Value};

use arbor_tree::{DType, Elem, Scalar, Tensor};

/// Object key holding the fully-qualified type name of the producer.
pub const CLASS_KEY: &str = "__class__";

/// Reserved type-tag marking an array-store reference.
pub const EXTERN_TAG: &str = "__extern__";

/// Key holding the store path of an external reference.
pub const PATH_KEY: &str = "path";

/// Key holding the dtype name of an inline tensor.
pub const DTYPE_KEY: &str = "dtype";

/// Key holding the nested data of an inline tensor.
pub const DATA_KEY: &str = "data";

/// The type-tag of a document node, if it is a tagged object.
pub fn type_tag(doc: &Value) -> Option<&str> {
    doc.as_object()?.get(CLASS_KEY)?.as_str()
}

/// Build an external reference node.
pub fn extern_ref(path: &str) -> Value {
    let mut map = Map::new();
    map.insert(CLASS_KEY.to_string(), Value::String(EXTERN_TAG.to_string()));
    map.insert(PATH_KEY.to_string(), Value::String(path.to_string()));
    Value::Object(map)
}

/// The store path of an external reference node.
pub fn extern_path(doc: &Value) -> Option<&str> {
    doc.as_object()?.get(PATH_KEY)?.as_str()
}

/// Convert a live scalar into its document form.
pub fn scalar_to_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int(v) => Value::Number(Number::from(*v)),
        // Non-finite floats have no JSON form and degrade to null.
        Scalar::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Scalar::Str(s) => Value::String(s.clone()),
    }
}

/// Convert a primitive document node into a scalar. `None` for arrays and
/// objects.
pub fn value_to_scalar(doc: &Value) -> Option<Scalar> {
    match doc {
        Value::Null => Some(Scalar::Null),
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Scalar::Int(i))
            } else {
                n.as_f64().map(Scalar::Float)
            }
        }
        Value::String(s) => Some(Scalar::Str(s.clone())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn elem_to_value(elem: Elem) -> Value {
    match elem {
        Elem::Bool(b) => Value::Bool(b),
        Elem::Int(v) => Value::Number(Number::from(v)),
        Elem::UInt(v) => Value::Number(Number::from(v)),
        Elem::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
    }
}

fn value_to_elem(doc: &Value) -> Option<Elem> {
    match doc {
        Value::Bool(b) => Some(Elem::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Elem::Int(i))
            } else if let Some(u) = n.as_u64() {
                Some(Elem::UInt(u))
            } else {
                n.as_f64().map(Elem::Float)
            }
        }
        _ => None,
    }
}

fn nest(tensor: &Tensor, shape: &[usize], offset: usize) -> Value {
    match shape.split_first() {
        None => match tensor.get_elem(offset) {
            Some(e) => elem_to_value(e),
            None => Value::Null,
        },
        Some((&dim, rest)) => {
            let stride: usize = rest.iter().product();
            let items = (0..dim)
                .map(|i| nest(tensor, rest, offset + i * stride))
                .collect();
            Value::Array(items)
        }
    }
}

/// Build an inline tensor node: `{"__class__": ..., "dtype": ..., "data": ...}`.
pub fn inline_tensor(tensor: &Tensor) -> Value {
    let mut map = Map::new();
    map.insert(
        CLASS_KEY.to_string(),
        Value::String(arbor_tree::TENSOR_TYPE.to_string()),
    );
    map.insert(
        DTYPE_KEY.to_string(),
        Value::String(tensor.dtype().name().to_string()),
    );
    map.insert(DATA_KEY.to_string(), nest(tensor, tensor.shape(), 0));
    Value::Object(map)
}

fn infer_shape(data: &Value) -> Vec<usize> {
    let mut shape = Vec::new();
    let mut cursor = data;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }
    shape
}

fn flatten(data: &Value, shape: &[usize], out: &mut Vec<Elem>) -> bool {
    match shape.split_first() {
        None => match value_to_elem(data) {
            Some(e) => {
                out.push(e);
                true
            }
            None => false,
        },
        Some((&dim, rest)) => match data {
            Value::Array(items) if items.len() == dim => {
                items.iter().all(|item| flatten(item, rest, out))
            }
            _ => false,
        },
    }
}

/// Reconstruct a tensor from an inline node. `None` when the node is not a
/// well-formed inline tensor (unknown dtype, ragged or non-numeric data).
pub fn tensor_from_doc(doc: &Value) -> Option<Tensor> {
    let map = doc.as_object()?;
    let dtype = DType::parse(map.get(DTYPE_KEY)?.as_str()?).ok()?;
    let data = map.get(DATA_KEY)?;

    let shape = infer_shape(data);
    let mut elems = Vec::with_capacity(shape.iter().product());
    if !flatten(data, &shape, &mut elems) {
        return None;
    }
    Tensor::from_elems(dtype, &shape, &elems).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tag_helpers() {
        let doc = extern_ref("a.b.0");
        assert_eq!(type_tag(&doc), Some(EXTERN_TAG));
        assert_eq!(extern_path(&doc), Some("a.b.0"));
        assert_eq!(type_tag(&json!({"x": 1})), None);
        assert_eq!(type_tag(&json!(3)), None);
    }

    #[test]
    fn scalar_value_roundtrip() {
        for s in [
            Scalar::Null,
            Scalar::Bool(true),
            Scalar::Int(-7),
            Scalar::Float(2.25),
            Scalar::Str("hi".into()),
        ] {
            assert_eq!(value_to_scalar(&scalar_to_value(&s)), Some(s));
        }
    }

    #[test]
    fn non_finite_floats_become_null() {
        assert_eq!(scalar_to_value(&Scalar::Float(f64::NAN)), Value::Null);
        assert_eq!(scalar_to_value(&Scalar::Float(f64::INFINITY)), Value::Null);
    }

    #[test]
    fn inline_tensor_roundtrip_2d() {
        let t = Tensor::from_slice(&[2, 3], &[1i32, 2, 3, 4, 5, 6]).unwrap();
        let doc = inline_tensor(&t);
        assert_eq!(type_tag(&doc), Some(arbor_tree::TENSOR_TYPE));
        assert_eq!(doc["dtype"], json!("i32"));
        assert_eq!(doc["data"], json!([[1, 2, 3], [4, 5, 6]]));
        assert_eq!(tensor_from_doc(&doc).unwrap(), t);
    }

    #[test]
    fn inline_tensor_roundtrip_zero_dim() {
        let t = Tensor::from_slice(&[], &[9.5f64]).unwrap();
        let doc = inline_tensor(&t);
        assert_eq!(doc["data"], json!(9.5));
        assert_eq!(tensor_from_doc(&doc).unwrap(), t);
    }

    #[test]
    fn inline_tensor_roundtrip_empty() {
        let t = Tensor::from_slice::<f32>(&[0], &[]).unwrap();
        let doc = inline_tensor(&t);
        assert_eq!(doc["data"], json!([]));
        let back = tensor_from_doc(&doc).unwrap();
        assert_eq!(back.shape(), &[0]);
        assert_eq!(back.dtype(), DType::F32);
    }

    #[test]
    fn large_u64_elements_survive() {
        let big = u64::MAX - 1;
        let t = Tensor::from_slice(&[2], &[big, 3u64]).unwrap();
        let doc = inline_tensor(&t);
        let back = tensor_from_doc(&doc).unwrap();
        assert_eq!(back.to_vec::<u64>().unwrap(), vec![big, 3]);
    }

    #[test]
    fn ragged_data_is_rejected() {
        let doc = json!({
            "__class__": arbor_tree::TENSOR_TYPE,
            "dtype": "i64",
            "data": [[1, 2], [3]]
        });
        assert!(tensor_from_doc(&doc).is_none());
    }

    #[test]
    fn unknown_dtype_is_rejected() {
        let doc = json!({
            "__class__": arbor_tree::TENSOR_TYPE,
            "dtype": "quaternion",
            "data": [1]
        });
        assert!(tensor_from_doc(&doc).is_none());
    }
}
