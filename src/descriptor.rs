//! Type descriptors: the structural shape of a Rust type as seen by the extraction pipeline.
//!
//! Rust has no runtime reflection, so record types describe themselves by implementing
//! [`Reflect`]. Standard library types are classified by the blanket implementations at the
//! bottom of this module:
//!
//! - scalars: `bool`, integer and float primitives, `char`, `String`, `str`, `()`
//! - pointers: `Box<T>`, `Arc<T>`, `Rc<T>`, `Option<T>`
//! - collections: `Vec<T>`, `VecDeque<T>`, `[T; N]`, `HashSet<T>`, `BTreeSet<T>`
//! - maps: `HashMap<K, V>`, `BTreeMap<K, V>`
//! - interfaces: `dyn Any + Send + Sync` (and boxes of it)
//!
//! Field types are referenced through [`TypeRef`], which resolves lazily. That is what lets a
//! record refer to itself (or to a record that refers back to it) without building an infinite
//! descriptor.
//!
//! ```rust
//! use typelens::descriptor::{FieldDescriptor, Reflect, TypeDescriptor};
//!
//! pub struct Profile {
//!     pub bio: String,
//! }
//!
//! impl Reflect for Profile {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::record("Profile", "github.com/acme/shop/models")
//!             .field(FieldDescriptor::of::<String>("bio").tags(r#"json:"bio""#))
//!     }
//! }
//!
//! pub struct User {
//!     pub id: String,
//!     pub profile: Option<Box<Profile>>,
//! }
//!
//! impl Reflect for User {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::record("User", "github.com/acme/shop/models")
//!             .field(FieldDescriptor::of::<String>("id").tag("json", "id"))
//!             .field(FieldDescriptor::of::<Option<Box<Profile>>>("profile"))
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::{
    any::Any,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    fmt,
    rc::Rc,
    sync::Arc,
};

use crate::error::LensError;

/// Implemented by every type the lens can describe.
pub trait Reflect {
    fn descriptor() -> TypeDescriptor;
}

/// Structural classification of a type. Derived once per field during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    Pointer,
    Collection,
    Record,
    Map,
    Interface,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldKind::Scalar => "scalar",
            FieldKind::Pointer => "pointer",
            FieldKind::Collection => "collection",
            FieldKind::Record => "record",
            FieldKind::Map => "map",
            FieldKind::Interface => "interface",
        };
        f.write_str(label)
    }
}

/// A lazily resolved reference to another type's descriptor.
#[derive(Clone)]
pub enum TypeRef {
    Lazy(fn() -> TypeDescriptor),
    Resolved(Arc<TypeDescriptor>),
}

impl TypeRef {
    pub fn of<T: Reflect + ?Sized>() -> TypeRef {
        TypeRef::Lazy(<T as Reflect>::descriptor)
    }

    pub fn resolve(&self) -> Arc<TypeDescriptor> {
        match self {
            TypeRef::Lazy(build) => Arc::new(build()),
            TypeRef::Resolved(descriptor) => descriptor.clone(),
        }
    }

    /// Fully qualified name of the referenced type, used for identity comparisons.
    pub fn identity(&self) -> String {
        self.resolve().qualified_name()
    }
}

impl From<TypeDescriptor> for TypeRef {
    fn from(descriptor: TypeDescriptor) -> Self {
        TypeRef::Resolved(Arc::new(descriptor))
    }
}

impl From<Arc<TypeDescriptor>> for TypeRef {
    fn from(descriptor: Arc<TypeDescriptor>) -> Self {
        TypeRef::Resolved(descriptor)
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeRef::Resolved(l), TypeRef::Resolved(r)) if Arc::ptr_eq(l, r) => true,
            _ => self.identity() == other.identity(),
        }
    }
}

impl fmt::Debug for TypeRef {
    // Resolving here could recurse forever on cyclic records, so only print the name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Lazy(_) => write!(f, "TypeRef::Lazy"),
            TypeRef::Resolved(descriptor) => {
                write!(f, "TypeRef::Resolved({})", descriptor.qualified_name())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypeShape {
    Scalar,
    Pointer(TypeRef),
    Collection(TypeRef),
    Map { key: TypeRef, value: TypeRef },
    Record,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    /// `self`
    #[default]
    Value,
    /// `&self` or `&mut self`
    Ref,
}

/// A method exposed by a record, described by name and the textual types of its
/// parameters and return values.
///
/// `receiver` is informational. Convention matching ignores it, so a contract written against
/// `&self` is also met by a by-value method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    #[serde(default)]
    pub receiver: Receiver,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub returns: Vec<String>,
}

impl MethodSignature {
    pub fn new<S: Into<String>>(name: S) -> Self {
        MethodSignature {
            name: name.into(),
            receiver: Receiver::Value,
            params: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn by_ref(mut self) -> Self {
        self.receiver = Receiver::Ref;
        self
    }

    pub fn params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn returns<I, S>(mut self, returns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returns = returns.into_iter().map(Into::into).collect();
        self
    }
}

/// One declared field of a record type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeRef,
    /// Raw annotation pairs in declaration order.
    pub tags: Vec<(String, String)>,
    pub exported: bool,
    pub embedded: bool,
}

impl FieldDescriptor {
    pub fn new<S: Into<String>>(name: S, ty: TypeRef) -> Self {
        FieldDescriptor {
            name: name.into(),
            ty,
            tags: Vec::new(),
            exported: true,
            embedded: false,
        }
    }

    pub fn of<T: Reflect + ?Sized>(name: &str) -> Self {
        FieldDescriptor::new(name, TypeRef::of::<T>())
    }

    pub fn tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.tags.push((key, value)),
        }
        self
    }

    /// Adds every `key:"value"` pair found in a raw annotation string, e.g.
    /// `json:"id" db:"user_id"`. Malformed trailing input is ignored.
    pub fn tags(mut self, raw: &str) -> Self {
        for (key, value) in parse_tag_string(raw) {
            self = self.tag(key, value);
        }
        self
    }

    /// Marks the field as non-`pub`. Private fields are skipped by extraction.
    pub fn private(mut self) -> Self {
        self.exported = false;
        self
    }

    /// Marks the field as embedded (flattened into its owner).
    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn parse_tag_string(raw: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = raw.trim_start();
    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else {
            break;
        };
        let key = &rest[..colon];
        if key.is_empty() || key.contains(char::is_whitespace) || key.contains('"') {
            break;
        }
        let after = &rest[colon + 1..];
        let Some(body) = after.strip_prefix('"') else {
            break;
        };
        let mut value = String::new();
        let mut end = None;
        let mut chars = body.char_indices();
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(escaped);
                    }
                }
                '"' => {
                    end = Some(idx);
                    break;
                }
                _ => value.push(c),
            }
        }
        let Some(end) = end else {
            break;
        };
        pairs.push((key.to_string(), value));
        rest = body[end + 1..].trim_start();
    }
    pairs
}

/// The structural description of one type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Display name as written in Rust source, e.g. `User` or `Option<Box<User>>`.
    pub name: String,
    /// Module/namespace path the type is declared in. Empty for builtins.
    pub domain: String,
    pub shape: TypeShape,
    pub fields: Vec<FieldDescriptor>,
    pub methods: Vec<MethodSignature>,
    pub capabilities: BTreeSet<String>,
}

impl TypeDescriptor {
    fn with_shape<S: Into<String>>(name: S, domain: &str, shape: TypeShape) -> Self {
        TypeDescriptor {
            name: name.into(),
            domain: domain.to_string(),
            shape,
            fields: Vec::new(),
            methods: Vec::new(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn record<S: Into<String>>(name: S, domain: &str) -> Self {
        TypeDescriptor::with_shape(name, domain, TypeShape::Record)
    }

    pub fn scalar<S: Into<String>>(name: S) -> Self {
        TypeDescriptor::with_shape(name, "", TypeShape::Scalar)
    }

    pub fn pointer<S: Into<String>>(name: S, elem: TypeRef) -> Self {
        TypeDescriptor::with_shape(name, "", TypeShape::Pointer(elem))
    }

    pub fn collection<S: Into<String>>(name: S, elem: TypeRef) -> Self {
        TypeDescriptor::with_shape(name, "", TypeShape::Collection(elem))
    }

    pub fn map<S: Into<String>>(name: S, key: TypeRef, value: TypeRef) -> Self {
        TypeDescriptor::with_shape(name, "", TypeShape::Map { key, value })
    }

    pub fn interface<S: Into<String>>(name: S, domain: &str) -> Self {
        TypeDescriptor::with_shape(name, domain, TypeShape::Interface)
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodSignature) -> Self {
        self.methods.push(method);
        self
    }

    /// Declares a trait the type implements, e.g. `"Display"`.
    pub fn capability(mut self, name: &str) -> Self {
        self.capabilities.insert(name.to_string());
        self
    }

    pub fn kind(&self) -> FieldKind {
        match self.shape {
            TypeShape::Scalar => FieldKind::Scalar,
            TypeShape::Pointer(_) => FieldKind::Pointer,
            TypeShape::Collection(_) => FieldKind::Collection,
            TypeShape::Map { .. } => FieldKind::Map,
            TypeShape::Record => FieldKind::Record,
            TypeShape::Interface => FieldKind::Interface,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self.shape, TypeShape::Record)
    }

    /// Domain plus name. This is the cache key, so identically named types declared in
    /// different domains never collide.
    pub fn qualified_name(&self) -> String {
        if self.domain.is_empty() {
            self.name.clone()
        } else {
            format!("{}::{}", self.domain, self.name)
        }
    }

    /// Strips one level of pointer and requires the result to be a record.
    pub fn normalize(descriptor: Arc<TypeDescriptor>) -> Result<Arc<TypeDescriptor>, LensError> {
        let resolved = match &descriptor.shape {
            TypeShape::Pointer(elem) => elem.resolve(),
            _ => descriptor.clone(),
        };
        if resolved.is_record() {
            Ok(resolved)
        } else {
            Err(LensError::UnsupportedTypeKind {
                type_name: descriptor.name.clone(),
                kind: resolved.kind().to_string(),
            })
        }
    }
}

macro_rules! impl_scalar {
    ($($ty:ty => $name:expr),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::scalar($name)
                }
            }
        )*
    };
}

impl_scalar!(
    bool => "bool",
    char => "char",
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    i128 => "i128",
    isize => "isize",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    u128 => "u128",
    usize => "usize",
    f32 => "f32",
    f64 => "f64",
    String => "String",
    str => "str",
    () => "()",
);

impl Reflect for dyn Any + Send + Sync {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::interface("dyn Any + Send + Sync", "")
    }
}

// A pointer to a pointer collapses into one level so `Option<Box<T>>` unwraps straight to `T`.
// A box around an interface is still the interface.
fn pointer_to<T: Reflect + ?Sized>(wrapper: &str) -> TypeDescriptor {
    let inner = T::descriptor();
    let name = format!("{wrapper}<{}>", inner.name);
    match inner.shape {
        TypeShape::Pointer(elem) => TypeDescriptor::pointer(name, elem),
        TypeShape::Interface => TypeDescriptor::interface(name, &inner.domain),
        _ => TypeDescriptor::pointer(name, TypeRef::of::<T>()),
    }
}

impl<T: Reflect + ?Sized> Reflect for Box<T> {
    fn descriptor() -> TypeDescriptor {
        pointer_to::<T>("Box")
    }
}

impl<T: Reflect + ?Sized> Reflect for Arc<T> {
    fn descriptor() -> TypeDescriptor {
        pointer_to::<T>("Arc")
    }
}

impl<T: Reflect + ?Sized> Reflect for Rc<T> {
    fn descriptor() -> TypeDescriptor {
        pointer_to::<T>("Rc")
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn descriptor() -> TypeDescriptor {
        pointer_to::<T>("Option")
    }
}

fn collection_of<T: Reflect>(wrapper: &str) -> TypeDescriptor {
    let name = format!("{wrapper}<{}>", T::descriptor().name);
    TypeDescriptor::collection(name, TypeRef::of::<T>())
}

impl<T: Reflect> Reflect for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        collection_of::<T>("Vec")
    }
}

impl<T: Reflect> Reflect for VecDeque<T> {
    fn descriptor() -> TypeDescriptor {
        collection_of::<T>("VecDeque")
    }
}

impl<T: Reflect> Reflect for HashSet<T> {
    fn descriptor() -> TypeDescriptor {
        collection_of::<T>("HashSet")
    }
}

impl<T: Reflect> Reflect for BTreeSet<T> {
    fn descriptor() -> TypeDescriptor {
        collection_of::<T>("BTreeSet")
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn descriptor() -> TypeDescriptor {
        let name = format!("[{}; {N}]", T::descriptor().name);
        TypeDescriptor::collection(name, TypeRef::of::<T>())
    }
}

fn map_of<K: Reflect, V: Reflect>(wrapper: &str) -> TypeDescriptor {
    let name = format!(
        "{wrapper}<{}, {}>",
        K::descriptor().name,
        V::descriptor().name
    );
    TypeDescriptor::map(name, TypeRef::of::<K>(), TypeRef::of::<V>())
}

impl<K: Reflect, V: Reflect> Reflect for HashMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        map_of::<K, V>("HashMap")
    }
}

impl<K: Reflect, V: Reflect> Reflect for BTreeMap<K, V> {
    fn descriptor() -> TypeDescriptor {
        map_of::<K, V>("BTreeMap")
    }
}
