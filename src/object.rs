//! PDF object types.

use std::collections::HashMap;

/// PDF object representation.
///
/// Streams are not objects here: the writer emits them directly so it can
/// patch their `/Length` after the filtered data is known.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real (floating-point) value
    Real(f64),
    /// String (byte array)
    String(Vec<u8>),
    /// Name (written with a leading /)
    Name(String),
    /// Array of objects
    Array(Vec<Object>),
    /// Dictionary (key-value pairs)
    Dictionary(HashMap<String, Object>),
    /// Indirect object reference
    Reference(ObjectRef),
}

/// Reference to an indirect object. Generations are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub id: u32,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(id: u32) -> Self {
        Self { id }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} 0 R", self.id)
    }
}

impl From<ObjectRef> for Object {
    fn from(r: ObjectRef) -> Self {
        Object::Reference(r)
    }
}

impl Object {
    /// Try to cast to integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to cast to name.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(s) => Some(s),
            _ => None,
        }
    }

    /// Try to cast to dictionary.
    pub fn as_dict(&self) -> Option<&HashMap<String, Object>> {
        match self {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable access to a dictionary.
    pub fn as_dict_mut(&mut self) -> Option<&mut HashMap<String, Object>> {
        match self {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Try to cast to array.
    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Try to cast to reference.
    pub fn as_reference(&self) -> Option<ObjectRef> {
        match self {
            Object::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Try to cast to string (bytes).
    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Insert a key into a dictionary; no-op for other objects.
    pub fn insert(&mut self, key: &str, value: Object) {
        if let Some(dict) = self.as_dict_mut() {
            dict.insert(key.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_casts() {
        assert_eq!(Object::Integer(42).as_integer(), Some(42));
        assert_eq!(Object::Name("Page".into()).as_name(), Some("Page"));
        assert_eq!(Object::String(b"x".to_vec()).as_string(), Some(&b"x"[..]));
        assert_eq!(Object::Null.as_integer(), None);
        assert_eq!(Object::Reference(ObjectRef::new(3)).as_reference(), Some(ObjectRef::new(3)));
    }

    #[test]
    fn test_dictionary_insert() {
        let mut dict = Object::Dictionary(HashMap::new());
        dict.insert("Count", Object::Integer(2));
        assert_eq!(dict.as_dict().unwrap().get("Count"), Some(&Object::Integer(2)));

        let mut not_dict = Object::Null;
        not_dict.insert("Count", Object::Integer(2));
        assert_eq!(not_dict, Object::Null);
    }

    #[test]
    fn test_object_ref_display() {
        assert_eq!(ObjectRef::new(12).to_string(), "12 0 R");
    }
}
