//! Class and attribute descriptors
//!
//! Descriptors are plain `static` data. A class lists its attributes in
//! declaration order and the registrar uses each attribute's index as the
//! dispatch tag, so the slice length doubles as the attribute count.

use std::fmt;
use std::ptr::NonNull;

use rquickjs::function::Rest;
use rquickjs::{Ctx, Value};

use super::collection::RawList;
use super::handle::{NativeHandle, Synthetic};

/// Creates a fresh, fully initialized native object.
pub type Construct = fn() -> NonNull<()>;

/// Builds a self-allocating object for an attribute of `owner`.
pub type Factory = fn(NonNull<()>, &'static Attribute) -> Option<Box<dyn Synthetic>>;

/// Computed read-only property.
pub type Getter = for<'js> fn(&Ctx<'js>, &NativeHandle) -> rquickjs::Result<Value<'js>>;

/// Prototype method.
pub type Method =
    for<'js> fn(&Ctx<'js>, &NativeHandle, Rest<Value<'js>>) -> rquickjs::Result<Value<'js>>;

/// Static metadata for one exposed native type.
pub struct ClassDescriptor {
    /// Script-visible name, also used for the global constructor.
    pub name: &'static str,
    pub constructor: Option<Construct>,
    /// Only set on synthetic classes such as collection proxies.
    pub factory: Option<Factory>,
    pub attributes: &'static [Attribute],
}

impl ClassDescriptor {
    pub fn attribute(&self, tag: usize) -> Option<&'static Attribute> {
        self.attributes.get(tag)
    }

    /// Index of the attribute a script would see under `name`.
    ///
    /// Duplicated names resolve to the last declaration.
    pub fn tag_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().rposition(|attr| attr.name == name)
    }

    /// Classes this class refers to through object and collection attributes.
    pub fn referenced_classes(
        &self,
    ) -> impl Iterator<Item = (&'static Attribute, &'static ClassDescriptor)> + '_ {
        self.attributes.iter().flat_map(|attr| {
            let refs: [Option<&'static ClassDescriptor>; 2] = match &attr.kind {
                AttributeKind::Object(field) => [Some(field.class), None],
                AttributeKind::Collection(field) => [Some(field.proxy), Some(field.element)],
                _ => [None, None],
            };
            refs.into_iter().flatten().map(move |class| (attr, class))
        })
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("constructor", &self.constructor.is_some())
            .field("factory", &self.factory.is_some())
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// One exposed property of a class.
pub struct Attribute {
    pub name: &'static str,
    pub kind: AttributeKind,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.kind.label())
    }
}

/// What an attribute projects to.
pub enum AttributeKind {
    /// Read-only scalar field.
    Plain(PlainField),
    /// Fixed-capacity, NUL-terminated byte buffer. The only generically writable kind.
    StringBuffer(StringField),
    /// Pointer-valued field wrapped as a handle of `class`.
    Object(ObjectField),
    /// Intrusive list head exposed through a proxy object.
    Collection(CollectionField),
    Getter(Getter),
    Method(Method),
    /// Declared without any accessor. Reads back the dispatch tag.
    Unbound,
}

impl AttributeKind {
    pub fn label(&self) -> &'static str {
        match self {
            AttributeKind::Plain(_) => "plain",
            AttributeKind::StringBuffer(_) => "string",
            AttributeKind::Object(_) => "object",
            AttributeKind::Collection(_) => "collection",
            AttributeKind::Getter(_) => "getter",
            AttributeKind::Method(_) => "method",
            AttributeKind::Unbound => "unbound",
        }
    }
}

pub struct PlainField {
    pub read: fn(NonNull<()>) -> Scalar,
}

pub struct StringField {
    /// Projects the owner onto its buffer. The slice length is the declared capacity.
    pub project: fn(NonNull<()>) -> NonNull<[u8]>,
}

pub struct ObjectField {
    pub class: &'static ClassDescriptor,
    pub project: fn(NonNull<()>) -> Option<NonNull<()>>,
}

pub struct CollectionField {
    /// Class whose factory builds the proxy.
    pub proxy: &'static ClassDescriptor,
    pub element: &'static ClassDescriptor,
    pub head: fn(NonNull<()>) -> NonNull<RawList>,
}

/// Value of a plain field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    pub fn into_value<'js>(self, ctx: &Ctx<'js>) -> Value<'js> {
        match self {
            Scalar::Int(v) => match i32::try_from(v) {
                Ok(small) => Value::new_int(ctx.clone(), small),
                Err(_) => Value::new_number(ctx.clone(), v as f64),
            },
            Scalar::Float(v) => Value::new_number(ctx.clone(), v),
            Scalar::Bool(v) => Value::new_bool(ctx.clone(), v),
        }
    }
}

macro_rules! scalar_from {
    ($variant:ident as $repr:ty: $($ty:ty),*) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::$variant(value as $repr)
                }
            }
        )*
    };
}

scalar_from!(Int as i64: i8, i16, i32, i64, u8, u16, u32);
scalar_from!(Float as f64: f32, f64);

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Associates a host type with its descriptor.
pub trait NativeClass {
    fn class() -> &'static ClassDescriptor;
}

/// Pointer-valued fields that an [`ObjectField`] can project.
pub trait NativePtr {
    fn erase(self) -> Option<NonNull<()>>;
}

impl<T> NativePtr for *mut T {
    fn erase(self) -> Option<NonNull<()>> {
        NonNull::new(self.cast())
    }
}

impl<T> NativePtr for Option<NonNull<T>> {
    fn erase(self) -> Option<NonNull<()>> {
        self.map(NonNull::cast)
    }
}

/// Erases a fixed-size byte array field into a bounded buffer.
///
/// # Safety
///
/// `field` must point at a live `[u8; N]`.
pub unsafe fn byte_buffer<const N: usize>(field: *mut [u8; N]) -> NonNull<[u8]> {
    NonNull::new_unchecked(std::ptr::slice_from_raw_parts_mut(field.cast::<u8>(), N))
}

/// Declares a [`AttributeKind::StringBuffer`] attribute over a `[u8; N]` field.
#[macro_export]
macro_rules! string_attr {
    ($name:expr, $ty:ty, $field:ident) => {
        $crate::bindings::Attribute {
            name: $name,
            kind: $crate::bindings::AttributeKind::StringBuffer($crate::bindings::StringField {
                project: |owner| unsafe {
                    let base = owner.cast::<$ty>().as_ptr();
                    $crate::bindings::descriptor::byte_buffer(::core::ptr::addr_of_mut!(
                        (*base).$field
                    ))
                },
            }),
        }
    };
}

/// Declares a read-only [`AttributeKind::Plain`] attribute over a scalar field.
#[macro_export]
macro_rules! plain_attr {
    ($name:expr, $ty:ty, $field:ident) => {
        $crate::bindings::Attribute {
            name: $name,
            kind: $crate::bindings::AttributeKind::Plain($crate::bindings::PlainField {
                read: |owner| unsafe {
                    let base = owner.cast::<$ty>().as_ptr();
                    $crate::bindings::Scalar::from(::core::ptr::addr_of!((*base).$field).read())
                },
            }),
        }
    };
}

/// Declares an [`AttributeKind::Object`] attribute over a pointer field.
#[macro_export]
macro_rules! object_attr {
    ($name:expr, $ty:ty, $field:ident, $class:expr) => {
        $crate::bindings::Attribute {
            name: $name,
            kind: $crate::bindings::AttributeKind::Object($crate::bindings::ObjectField {
                class: $class,
                project: |owner| unsafe {
                    let base = owner.cast::<$ty>().as_ptr();
                    $crate::bindings::descriptor::NativePtr::erase(
                        ::core::ptr::addr_of!((*base).$field).read(),
                    )
                },
            }),
        }
    };
}

/// Declares an [`AttributeKind::Collection`] attribute over a `DList<E>` field.
#[macro_export]
macro_rules! collection_attr {
    ($name:expr, $ty:ty, $field:ident, $element:expr) => {
        $crate::collection_attr!($name, $ty, $field, $element, &$crate::bindings::LIST_CLASS)
    };
    ($name:expr, $ty:ty, $field:ident, $element:expr, $proxy:expr) => {
        $crate::bindings::Attribute {
            name: $name,
            kind: $crate::bindings::AttributeKind::Collection($crate::bindings::CollectionField {
                proxy: $proxy,
                element: $element,
                head: |owner| unsafe {
                    let base = owner.cast::<$ty>().as_ptr();
                    $crate::bindings::collection::erase_list(::core::ptr::addr_of_mut!(
                        (*base).$field
                    ))
                },
            }),
        }
    };
}
