use std::borrow::Cow;

/// A value that can be bound to a statement parameter or returned from a user-defined function.
///
/// The set of variants is closed: anything that can't be expressed as one of these is rejected
/// at compile time rather than when the statement runs.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The name of the storage class this value binds as.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Int(_) | Value::Long(_) => "INTEGER",
            Value::Double(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }

    /// Integer view of the value; `NULL` and non-numeric values are `0`.
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Int(v) => i64::from(*v),
            Value::Long(v) => *v,
            #[allow(clippy::cast_possible_truncation)]
            Value::Double(v) => *v as i64,
            Value::Text(s) => s.trim().parse().unwrap_or_default(),
            Value::Null | Value::Blob(_) => 0,
        }
    }

    /// Floating-point view of the value; `NULL` and non-numeric values are `0.0`.
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(v) => f64::from(*v),
            #[allow(clippy::cast_precision_loss)]
            Value::Long(v) => *v as f64,
            Value::Double(v) => *v,
            Value::Text(s) => s.trim().parse().unwrap_or_default(),
            Value::Null | Value::Blob(_) => 0.0,
        }
    }

    /// Text view of the value; `None` for `NULL`.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Int(v) => Some(v.to_string().into()),
            Value::Long(v) => Some(v.to_string().into()),
            Value::Double(v) => Some(v.to_string().into()),
            Value::Text(s) => Some(Cow::Borrowed(s)),
            Value::Blob(b) => Some(String::from_utf8_lossy(b)),
        }
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(value: $ty) -> Self {
                    Value::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_value! {
    i8 => Int,
    i16 => Int,
    i32 => Int,
    u8 => Int,
    u16 => Int,
    i64 => Long,
    u32 => Long,
    f32 => Double,
    f64 => Double,
    String => Text,
    &str => Text,
    Vec<u8> => Blob,
    &[u8] => Blob,
}

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Value::Int(i32::from(value))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    #[inline]
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
