//! Type descriptors.
//!
//! Decoders dispatch on a [`TypeDesc`] instead of on the Rust type itself.
//! Every loadable type implements [`Describe`]; std types are covered here
//! and user types use `#[derive(Describe)]`.
//!
//! ```ignore
//! #[derive(Deserialize, Describe)]
//! struct Database {
//!     host: String,
//!     #[serde(default)]
//!     port: u16,
//!     #[config(alias = "pwd", secret)]
//!     password: Secret,
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Display;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::secret::Secret;

/// Fixed-width integer kinds with their bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
}

impl IntKind {
    pub fn name(self) -> &'static str {
        match self {
            IntKind::I8 => "i8",
            IntKind::I16 => "i16",
            IntKind::I32 => "i32",
            IntKind::I64 => "i64",
            IntKind::Isize => "isize",
            IntKind::U8 => "u8",
            IntKind::U16 => "u16",
            IntKind::U32 => "u32",
            IntKind::U64 => "u64",
            IntKind::Usize => "usize",
        }
    }

    /// Inclusive bounds.
    pub fn bounds(self) -> (i128, i128) {
        match self {
            IntKind::I8 => (i8::MIN as i128, i8::MAX as i128),
            IntKind::I16 => (i16::MIN as i128, i16::MAX as i128),
            IntKind::I32 => (i32::MIN as i128, i32::MAX as i128),
            IntKind::I64 => (i64::MIN as i128, i64::MAX as i128),
            IntKind::Isize => (isize::MIN as i128, isize::MAX as i128),
            IntKind::U8 => (0, u8::MAX as i128),
            IntKind::U16 => (0, u16::MAX as i128),
            IntKind::U32 => (0, u32::MAX as i128),
            IntKind::U64 => (0, u64::MAX as i128),
            IntKind::Usize => (0, usize::MAX as i128),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatKind {
    F32,
    F64,
}

impl FloatKind {
    pub fn name(self) -> &'static str {
        match self {
            FloatKind::F32 => "f32",
            FloatKind::F64 => "f64",
        }
    }
}

/// Shape of a target type.
#[derive(Debug, Clone)]
pub enum TypeDesc {
    Bool,
    Integer(IntKind),
    Float(FloatKind),
    Char,
    String,
    Secret,
    Duration,
    /// Any type parsed from its string form; `check` validates the text.
    Parsed {
        name: &'static str,
        check: fn(&str) -> Result<(), String>,
    },
    /// Enum whose variants all carry no data.
    Enum {
        name: String,
        variants: Vec<String>,
    },
    Optional(Box<TypeDesc>),
    List(Box<TypeDesc>),
    Set(Box<TypeDesc>),
    Map {
        key: Box<TypeDesc>,
        value: Box<TypeDesc>,
    },
    Record(RecordDesc),
    Sum(SumDesc),
    /// Arbitrary structure, passed through as JSON.
    Any,
    /// Only decodable by a user-registered decoder.
    Custom {
        name: String,
    },
}

fn check_parse<T>(text: &str) -> Result<(), String>
where
    T: FromStr,
    T::Err: Display,
{
    text.parse::<T>().map(|_| ()).map_err(|e| e.to_string())
}

impl TypeDesc {
    /// Descriptor for a type decoded from its `FromStr` text.
    pub fn parsed<T>(name: &'static str) -> Self
    where
        T: FromStr,
        T::Err: Display,
    {
        TypeDesc::Parsed {
            name,
            check: check_parse::<T>,
        }
    }

    /// Human-readable type name for diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            TypeDesc::Bool => "bool".to_string(),
            TypeDesc::Integer(kind) => kind.name().to_string(),
            TypeDesc::Float(kind) => kind.name().to_string(),
            TypeDesc::Char => "char".to_string(),
            TypeDesc::String => "String".to_string(),
            TypeDesc::Secret => "Secret".to_string(),
            TypeDesc::Duration => "Duration".to_string(),
            TypeDesc::Parsed { name, .. } => name.to_string(),
            TypeDesc::Enum { name, .. } => name.clone(),
            TypeDesc::Optional(inner) => format!("Option<{}>", inner.type_name()),
            TypeDesc::List(inner) => format!("List<{}>", inner.type_name()),
            TypeDesc::Set(inner) => format!("Set<{}>", inner.type_name()),
            TypeDesc::Map { key, value } => {
                format!("Map<{}, {}>", key.type_name(), value.type_name())
            }
            TypeDesc::Record(record) => record.name.clone(),
            TypeDesc::Sum(sum) => sum.name.clone(),
            TypeDesc::Any => "Any".to_string(),
            TypeDesc::Custom { name } => name.clone(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeDesc::Optional(_) | TypeDesc::Any)
    }

    /// Whether a missing value can be produced without any input.
    pub fn accepts_absence(&self) -> bool {
        match self {
            TypeDesc::Optional(_) | TypeDesc::Any => true,
            TypeDesc::Record(record) => record.all_defaulted(),
            _ => false,
        }
    }

    /// Whether values of this type are secrets.
    pub fn is_secret(&self) -> bool {
        match self {
            TypeDesc::Secret => true,
            TypeDesc::Optional(inner) => inner.is_secret(),
            _ => false,
        }
    }

    /// Whether the type reads a single scalar (as opposed to a structure).
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            TypeDesc::Bool
                | TypeDesc::Integer(_)
                | TypeDesc::Float(_)
                | TypeDesc::Char
                | TypeDesc::String
                | TypeDesc::Secret
                | TypeDesc::Duration
                | TypeDesc::Parsed { .. }
                | TypeDesc::Enum { .. }
        )
    }
}

/// A struct with named fields.
#[derive(Debug, Clone)]
pub struct RecordDesc {
    pub name: String,
    pub fields: Vec<FieldDesc>,
}

impl RecordDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDesc) -> Self {
        self.fields.push(field);
        self
    }

    /// Every field can be filled without input.
    pub fn all_defaulted(&self) -> bool {
        self.fields
            .iter()
            .all(|f| f.has_default || f.desc.accepts_absence())
    }
}

/// One field of a record.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    /// Declared name, the base for parameter-name mapping.
    pub name: String,
    /// Key in the decoded output (serde's field name).
    pub key: String,
    /// Extra source keys, probed before any mapped name.
    pub aliases: Vec<String>,
    pub desc: TypeDesc,
    pub has_default: bool,
    pub secret: bool,
}

impl FieldDesc {
    pub fn new(name: impl Into<String>, desc: TypeDesc) -> Self {
        let name = name.into();
        Self {
            key: name.clone(),
            name,
            aliases: Vec::new(),
            desc,
            has_default: false,
            secret: false,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// Whether a missing value is acceptable for this field.
    pub fn may_be_absent(&self) -> bool {
        self.has_default || self.desc.accepts_absence()
    }
}

/// A data-carrying enum.
#[derive(Debug, Clone)]
pub struct SumDesc {
    pub name: String,
    /// Key whose value names the variant, when the type requires one.
    pub discriminator: Option<String>,
    pub variants: Vec<VariantDesc>,
}

impl SumDesc {
    pub fn variant_names(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.name.clone()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&VariantDesc> {
        self.variants.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct VariantDesc {
    pub name: String,
    pub shape: VariantShape,
}

#[derive(Debug, Clone)]
pub enum VariantShape {
    Unit,
    Newtype(Box<TypeDesc>),
    Struct(RecordDesc),
}

/// Types that can describe their own shape.
pub trait Describe {
    fn describe() -> TypeDesc;
}

macro_rules! describe_as {
    ($($ty:ty => $desc:expr),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDesc {
                    $desc
                }
            }
        )*
    };
}

describe_as! {
    bool => TypeDesc::Bool,
    i8 => TypeDesc::Integer(IntKind::I8),
    i16 => TypeDesc::Integer(IntKind::I16),
    i32 => TypeDesc::Integer(IntKind::I32),
    i64 => TypeDesc::Integer(IntKind::I64),
    isize => TypeDesc::Integer(IntKind::Isize),
    u8 => TypeDesc::Integer(IntKind::U8),
    u16 => TypeDesc::Integer(IntKind::U16),
    u32 => TypeDesc::Integer(IntKind::U32),
    u64 => TypeDesc::Integer(IntKind::U64),
    usize => TypeDesc::Integer(IntKind::Usize),
    f32 => TypeDesc::Float(FloatKind::F32),
    f64 => TypeDesc::Float(FloatKind::F64),
    char => TypeDesc::Char,
    String => TypeDesc::String,
    Secret => TypeDesc::Secret,
    Duration => TypeDesc::Duration,
    serde_json::Value => TypeDesc::Any,
    PathBuf => TypeDesc::parsed::<PathBuf>("PathBuf"),
    IpAddr => TypeDesc::parsed::<IpAddr>("IpAddr"),
    Ipv4Addr => TypeDesc::parsed::<Ipv4Addr>("Ipv4Addr"),
    Ipv6Addr => TypeDesc::parsed::<Ipv6Addr>("Ipv6Addr"),
    SocketAddr => TypeDesc::parsed::<SocketAddr>("SocketAddr"),
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Optional(Box::new(T::describe()))
    }
}

impl<T: Describe> Describe for Box<T> {
    fn describe() -> TypeDesc {
        T::describe()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::List(Box::new(T::describe()))
    }
}

impl<T: Describe> Describe for VecDeque<T> {
    fn describe() -> TypeDesc {
        TypeDesc::List(Box::new(T::describe()))
    }
}

impl<T: Describe, S> Describe for HashSet<T, S> {
    fn describe() -> TypeDesc {
        TypeDesc::Set(Box::new(T::describe()))
    }
}

impl<T: Describe> Describe for BTreeSet<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Set(Box::new(T::describe()))
    }
}

impl<K: Describe, V: Describe, S> Describe for HashMap<K, V, S> {
    fn describe() -> TypeDesc {
        TypeDesc::Map {
            key: Box::new(K::describe()),
            value: Box::new(V::describe()),
        }
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn describe() -> TypeDesc {
        TypeDesc::Map {
            key: Box::new(K::describe()),
            value: Box::new(V::describe()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(u16::describe().type_name(), "u16");
        assert_eq!(<Option<Vec<String>>>::describe().type_name(), "Option<List<String>>");
        assert_eq!(
            <HashMap<String, f64>>::describe().type_name(),
            "Map<String, f64>"
        );
        assert_eq!(SocketAddr::describe().type_name(), "SocketAddr");
    }

    #[test]
    fn test_parsed_check() {
        match IpAddr::describe() {
            TypeDesc::Parsed { check, .. } => {
                assert!(check("127.0.0.1").is_ok());
                assert!(check("not-an-ip").is_err());
            }
            other => panic!("unexpected descriptor {:?}", other),
        }
    }

    #[test]
    fn test_absence_rules() {
        assert!(<Option<u8>>::describe().accepts_absence());
        assert!(!u8::describe().accepts_absence());

        let all_default = RecordDesc::new("Pool")
            .field(FieldDesc::new("size", u32::describe()).with_default())
            .field(FieldDesc::new("name", <Option<String>>::describe()));
        assert!(TypeDesc::Record(all_default).accepts_absence());

        let required = RecordDesc::new("Db").field(FieldDesc::new("host", String::describe()));
        assert!(!TypeDesc::Record(required).accepts_absence());
    }

    #[test]
    fn test_secret_detection() {
        assert!(Secret::describe().is_secret());
        assert!(<Option<Secret>>::describe().is_secret());
        assert!(!String::describe().is_secret());
    }

    #[test]
    fn test_int_bounds() {
        assert_eq!(IntKind::U8.bounds(), (0, 255));
        assert_eq!(IntKind::I16.bounds(), (-32768, 32767));
    }
}
