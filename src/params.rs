use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::ser::{self, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StorageError};

/// Path of the parameter file `name` inside `base_path`.
pub fn parameter_path(base_path: &Path, name: &str) -> PathBuf {
    base_path.join(format!("{}.txt", name))
}

/// Serialize `params` as pretty JSON to `path`.
///
/// The top level must serialize to a mapping and every float must be finite;
/// otherwise nothing is written.
pub fn write_parameters<T: Serialize + ?Sized>(path: &Path, params: &T) -> Result<()> {
    params
        .serialize(FiniteCheck)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let value =
        serde_json::to_value(params).map_err(|e| StorageError::Serialization(e.to_string()))?;
    if !value.is_object() {
        return Err(StorageError::Serialization(format!(
            "parameters must be a mapping, got {}",
            kind_of(&value)
        )));
    }
    let text = serde_json::to_string_pretty(&value)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    fs::write(path, text).map_err(StorageError::io(path))
}

/// Parse a parameter file written by [`write_parameters`].
pub fn read_parameters(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path).map_err(StorageError::io(path))?;
    match serde_json::from_str(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StorageError::format(
            path,
            format!("expected a mapping, found {}", kind_of(&other)),
        )),
        Err(e) => Err(StorageError::format(path, e.to_string())),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[derive(Debug)]
enum CheckError {
    NonFinite { path: Vec<String>, value: f64 },
    Custom(String),
}

impl CheckError {
    fn within(self, key: String) -> Self {
        match self {
            CheckError::NonFinite { mut path, value } => {
                path.insert(0, key);
                CheckError::NonFinite { path, value }
            }
            other => other,
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::NonFinite { path, value } if path.is_empty() => {
                write!(f, "parameter value {} is not representable in JSON", value)
            }
            CheckError::NonFinite { path, value } => write!(
                f,
                "parameter '{}' is {}, which is not representable in JSON",
                path.join("."),
                value
            ),
            CheckError::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for CheckError {}

impl ser::Error for CheckError {
    fn custom<M: fmt::Display>(msg: M) -> Self {
        CheckError::Custom(msg.to_string())
    }
}

fn key_label<K: Serialize + ?Sized>(key: &K) -> String {
    match serde_json::to_value(key) {
        Ok(Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => String::from("?"),
    }
}

/// Serializer that produces nothing and fails on the first NaN or infinity,
/// recording the keys leading to it.
#[derive(Clone, Copy)]
struct FiniteCheck;

macro_rules! accept {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(fn $method(self, _: $ty) -> std::result::Result<(), CheckError> {
            Ok(())
        })*
    };
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = CheckError;
    type SerializeSeq = Compound;
    type SerializeTuple = Compound;
    type SerializeTupleStruct = Compound;
    type SerializeTupleVariant = Compound;
    type SerializeMap = Compound;
    type SerializeStruct = Compound;
    type SerializeStructVariant = Compound;

    accept!(
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
        serialize_char: char,
        serialize_str: &str,
        serialize_bytes: &[u8],
        serialize_unit_struct: &'static str,
    );

    fn serialize_f32(self, v: f32) -> std::result::Result<(), CheckError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> std::result::Result<(), CheckError> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(CheckError::NonFinite {
                path: Vec::new(),
                value: v,
            })
        }
    }

    fn serialize_none(self) -> std::result::Result<(), CheckError> {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> std::result::Result<(), CheckError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> std::result::Result<(), CheckError> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> std::result::Result<(), CheckError> {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> std::result::Result<(), CheckError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        value: &T,
    ) -> std::result::Result<(), CheckError> {
        value
            .serialize(self)
            .map_err(|e| e.within(variant.to_string()))
    }

    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Compound, CheckError> {
        Ok(Compound::default())
    }

    fn serialize_tuple(self, _: usize) -> std::result::Result<Compound, CheckError> {
        Ok(Compound::default())
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Compound, CheckError> {
        Ok(Compound::default())
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> std::result::Result<Compound, CheckError> {
        Ok(Compound::under(variant))
    }

    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Compound, CheckError> {
        Ok(Compound::default())
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Compound, CheckError> {
        Ok(Compound::default())
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> std::result::Result<Compound, CheckError> {
        Ok(Compound::under(variant))
    }
}

#[derive(Default)]
struct Compound {
    variant: Option<&'static str>,
    index: usize,
    key: Option<String>,
}

impl Compound {
    fn under(variant: &'static str) -> Self {
        Self {
            variant: Some(variant),
            ..Self::default()
        }
    }

    fn check<T: Serialize + ?Sized>(
        &self,
        key: String,
        value: &T,
    ) -> std::result::Result<(), CheckError> {
        value.serialize(FiniteCheck).map_err(|e| {
            let e = e.within(key);
            match self.variant {
                Some(variant) => e.within(variant.to_string()),
                None => e,
            }
        })
    }

    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> std::result::Result<(), CheckError> {
        let key = self.index.to_string();
        self.index += 1;
        self.check(key, value)
    }
}

macro_rules! sequence_impls {
    ($($trait:ident :: $method:ident),* $(,)?) => {
        $(impl ser::$trait for Compound {
            type Ok = ();
            type Error = CheckError;

            fn $method<T: Serialize + ?Sized>(
                &mut self,
                value: &T,
            ) -> std::result::Result<(), CheckError> {
                self.element(value)
            }

            fn end(self) -> std::result::Result<(), CheckError> {
                Ok(())
            }
        })*
    };
}

sequence_impls!(
    SerializeSeq::serialize_element,
    SerializeTuple::serialize_element,
    SerializeTupleStruct::serialize_field,
    SerializeTupleVariant::serialize_field,
);

macro_rules! struct_impls {
    ($($trait:ident),* $(,)?) => {
        $(impl ser::$trait for Compound {
            type Ok = ();
            type Error = CheckError;

            fn serialize_field<T: Serialize + ?Sized>(
                &mut self,
                key: &'static str,
                value: &T,
            ) -> std::result::Result<(), CheckError> {
                self.check(key.to_string(), value)
            }

            fn end(self) -> std::result::Result<(), CheckError> {
                Ok(())
            }
        })*
    };
}

struct_impls!(SerializeStruct, SerializeStructVariant);

impl ser::SerializeMap for Compound {
    type Ok = ();
    type Error = CheckError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> std::result::Result<(), CheckError> {
        self.key = Some(key_label(key));
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> std::result::Result<(), CheckError> {
        let key = self.key.take().unwrap_or_default();
        self.check(key, value)
    }

    fn end(self) -> std::result::Result<(), CheckError> {
        Ok(())
    }
}
