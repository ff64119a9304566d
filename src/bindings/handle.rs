//! Script-visible handles to native objects

use std::any::Any;
use std::fmt;
use std::ptr::NonNull;

use rquickjs::class::{JsClass, Readable, Trace, Tracer};
use rquickjs::function::Constructor;
use rquickjs::{Ctx, JsLifetime};

use super::descriptor::ClassDescriptor;
use super::registrar::ClassId;

/// Objects the binding layer allocates itself, such as collection proxies.
pub trait Synthetic: Any {
    /// Address used for identity comparisons.
    fn identity(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

/// What a handle points at.
pub enum Target {
    /// Host-owned state. Never released by the binding layer.
    Borrowed(NonNull<()>),
    /// Released when the engine finalizes the handle.
    Owned(Box<dyn Synthetic>),
}

impl Target {
    pub fn address(&self) -> usize {
        match self {
            Target::Borrowed(ptr) => ptr.as_ptr() as usize,
            Target::Owned(object) => object.identity(),
        }
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Borrowed(ptr) => f.debug_tuple("Borrowed").field(ptr).finish(),
            Target::Owned(object) => f
                .debug_tuple("Owned")
                .field(&format_args!("{:#x}", object.identity()))
                .finish(),
        }
    }
}

/// Native pointer tagged with its class.
///
/// The class travels with the handle, so property dispatch never has to
/// consult the prototype chain.
#[derive(Debug)]
pub struct NativeHandle {
    class: &'static ClassDescriptor,
    class_id: ClassId,
    target: Target,
}

impl NativeHandle {
    pub fn new(class: &'static ClassDescriptor, class_id: ClassId, target: Target) -> Self {
        NativeHandle {
            class,
            class_id,
            target,
        }
    }

    pub fn class(&self) -> &'static ClassDescriptor {
        self.class
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The wrapped host object, if this handle borrows one.
    pub fn native(&self) -> Option<NonNull<()>> {
        match self.target {
            Target::Borrowed(ptr) => Some(ptr),
            Target::Owned(_) => None,
        }
    }

    pub fn synthetic<T: Synthetic>(&self) -> Option<&T> {
        match &self.target {
            Target::Owned(object) => object.as_any().downcast_ref(),
            Target::Borrowed(_) => None,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.target, Target::Owned(_))
    }

    /// Two handles are the same object when they share a class and an address.
    pub fn same_object(&self, other: &NativeHandle) -> bool {
        self.class_id == other.class_id && self.target.address() == other.target.address()
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {:#x}]", self.class.name, self.target.address())
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if self.is_owned() {
            tracing::trace!(target: "bindings", class = self.class.name, "Releasing synthetic object");
        }
    }
}

impl<'js> Trace<'js> for NativeHandle {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

unsafe impl<'js> JsLifetime<'js> for NativeHandle {
    type Changed<'to> = NativeHandle;
}

impl<'js> JsClass<'js> for NativeHandle {
    const NAME: &'static str = "NativeObject";

    type Mutable = Readable;

    fn constructor(_ctx: &Ctx<'js>) -> rquickjs::Result<Option<Constructor<'js>>> {
        Ok(None)
    }
}
