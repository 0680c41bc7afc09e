//! Type checks and return-value coercion

use weaver_image::descriptor::{OBJECT_CLASS, STRING_CLASS};
use weaver_image::TypeDescriptor;

use crate::error::{InvokeError, InvokeResult};
use crate::runtime::value::{Primitive, Value};

/// Supertypes every string and boxed primitive is assignable to
const VALUE_SUPERTYPES: [&str; 3] = [OBJECT_CLASS, "java.io.Serializable", "java.lang.Comparable"];

/// Check `value` against `ty`, converting between raw and boxed primitives
/// where the target demands it
pub fn checkcast(value: Value, ty: &TypeDescriptor) -> InvokeResult<Value> {
    if let Some(kind) = ty.primitive_kind() {
        return match value.primitive() {
            Some(p) if p.kind() == kind => Ok(Value::Primitive(p)),
            _ => Err(cast_error(&value, ty)),
        };
    }

    let target = ty.class_name();
    let ok = match &value {
        Value::Null => true,
        Value::Void => false,
        Value::Primitive(p) | Value::Boxed(p) => is_box_assignable(*p, &target),
        Value::Str(_) => {
            target == STRING_CLASS
                || target == "java.lang.CharSequence"
                || VALUE_SUPERTYPES.contains(&target.as_str())
        }
        Value::Array(_) => {
            ty.is_array()
                || target == OBJECT_CLASS
                || target == "java.lang.Cloneable"
                || target == "java.io.Serializable"
        }
        Value::Object(obj) => obj.class().is_subtype_of(&target),
    };

    if ok {
        Ok(value.boxed())
    } else {
        Err(cast_error(&value, ty))
    }
}

/// Convert a callback result to a method's declared return type.
///
/// - `void`: the value is discarded
/// - primitive: boxed or raw values of the same kind are unwrapped, null
///   becomes zero
/// - reference: checked with [`checkcast`]; a `void` result becomes null
pub fn coerce_return(value: Value, ret: &TypeDescriptor) -> InvokeResult<Value> {
    if ret.is_void() {
        return Ok(Value::Void);
    }

    if let Some(kind) = ret.primitive_kind() {
        return match value {
            Value::Null | Value::Void => Primitive::zero(kind)
                .map(Value::Primitive)
                .ok_or_else(|| cast_error(&Value::Null, ret)),
            other => match other.primitive() {
                Some(p) if p.kind() == kind => Ok(Value::Primitive(p)),
                _ => Err(cast_error(&other, ret)),
            },
        };
    }

    match value {
        Value::Void => Ok(Value::Null),
        other => checkcast(other, ret),
    }
}

/// Convert an argument array to the declared parameter types
pub fn unbox_args(args: &[Value], params: &[TypeDescriptor]) -> InvokeResult<Vec<Value>> {
    args.iter()
        .zip(params)
        .map(|(arg, ty)| {
            if ty.is_primitive() {
                checkcast(arg.clone(), ty)
            } else {
                Ok(arg.clone())
            }
        })
        .collect()
}

fn is_box_assignable(p: Primitive, target: &str) -> bool {
    let kind = p.kind();
    target == kind.box_class()
        || (kind.is_numeric() && target == "java.lang.Number")
        || VALUE_SUPERTYPES.contains(&target)
}

fn cast_error(value: &Value, ty: &TypeDescriptor) -> InvokeError {
    InvokeError::ClassCast {
        from: value.type_name(),
        to: ty.class_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weaver_image::PrimitiveKind;

    #[test]
    fn test_coerce_unboxes_matching_kind() {
        let ret = TypeDescriptor::INT;
        let value = coerce_return(Value::Boxed(Primitive::Int(6)), &ret).unwrap();
        assert_eq!(value, Value::int(6));

        let value = coerce_return(Value::int(6), &ret).unwrap();
        assert_eq!(value, Value::int(6));
    }

    #[test]
    fn test_coerce_null_to_zero() {
        let ret = TypeDescriptor::Primitive(PrimitiveKind::Long);
        assert_eq!(coerce_return(Value::Null, &ret).unwrap(), Value::long(0));
        assert_eq!(
            coerce_return(Value::Null, &TypeDescriptor::BOOLEAN).unwrap(),
            Value::boolean(false)
        );
    }

    #[test]
    fn test_coerce_void_discards() {
        let value = coerce_return(Value::string("ignored"), &TypeDescriptor::VOID).unwrap();
        assert!(value.is_void());
    }

    #[test]
    fn test_coerce_rejects_wrong_kind() {
        let err = coerce_return(Value::Boxed(Primitive::Long(1)), &TypeDescriptor::INT).unwrap_err();
        assert!(matches!(err, InvokeError::ClassCast { .. }));

        let err = coerce_return(Value::string("x"), &TypeDescriptor::INT).unwrap_err();
        assert!(matches!(err, InvokeError::ClassCast { .. }));
    }

    #[test]
    fn test_checkcast_references() {
        let string = TypeDescriptor::string();
        let object = TypeDescriptor::object_root();
        let number = TypeDescriptor::object("java.lang.Number");

        assert!(checkcast(Value::string("a"), &string).is_ok());
        assert!(checkcast(Value::string("a"), &object).is_ok());
        assert!(checkcast(Value::string("a"), &number).is_err());
        assert_eq!(
            checkcast(Value::int(3), &number).unwrap(),
            Value::Boxed(Primitive::Int(3))
        );
        assert!(checkcast(Value::Null, &string).is_ok());
        assert!(checkcast(Value::Void, &object).is_err());
        assert!(coerce_return(Value::Void, &string).unwrap().is_null());
    }

    #[test]
    fn test_unbox_args() {
        let params = vec![TypeDescriptor::INT, TypeDescriptor::object_root()];
        let args = vec![Value::Boxed(Primitive::Int(1)), Value::Boxed(Primitive::Int(2))];
        let unboxed = unbox_args(&args, &params).unwrap();
        assert_eq!(unboxed[0], Value::int(1));
        assert_eq!(unboxed[1], Value::Boxed(Primitive::Int(2)));
    }
}
