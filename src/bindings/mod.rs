//! Native object bindings
//!
//! Host types describe themselves with static [`ClassDescriptor`] tables. The
//! registrar turns each table into a prototype whose properties forward to the
//! generic [`dispatch`] functions, and every script value that stands for a
//! native object is a [`NativeHandle`].

pub mod collection;
pub mod descriptor;
pub mod dispatch;
pub mod handle;
pub mod registrar;

pub use collection::{CollectionProxy, DList, Link, Linked, RawList, LIST_CLASS};
pub use descriptor::{
    Attribute, AttributeKind, ClassDescriptor, CollectionField, Construct, Factory, Getter,
    Method, NativeClass, NativePtr, ObjectField, PlainField, Scalar, StringField,
};
pub use handle::{NativeHandle, Synthetic, Target};
pub use registrar::{
    lookup, register_class, registered_classes, verify_references, wrap, wrap_native, ClassId,
    ClassRegistry,
};
