//! Intrusive doubly-linked lists and their script proxies
//!
//! Elements embed a [`Link`] as their first field. The head's `prev` points
//! at the tail so appends are O(1), while `len` walks the list.

use std::any::Any;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;

use rquickjs::function::Rest;
use rquickjs::{Array, Coerced, Ctx, Exception, FromJs, Value};

use super::descriptor::{Attribute, AttributeKind, ClassDescriptor};
use super::handle::{NativeHandle, Synthetic};
use super::registrar::wrap_native;

/// Link fields embedded at the start of every list element.
#[repr(C)]
#[derive(Debug, Default)]
pub struct Link {
    next: Option<NonNull<Link>>,
    prev: Option<NonNull<Link>>,
}

impl Link {
    pub const fn new() -> Self {
        Link {
            next: None,
            prev: None,
        }
    }
}

/// Types that can live in an intrusive list.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with a [`Link`] as their first field, so
/// that a pointer to the element is also a pointer to its link.
pub unsafe trait Linked: Sized {}

/// Untyped list head.
#[repr(transparent)]
#[derive(Debug, Default)]
pub struct RawList {
    head: Option<NonNull<Link>>,
}

impl RawList {
    pub const fn new() -> Self {
        RawList { head: None }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Counts elements by walking the list.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn get(&self, index: usize) -> Option<NonNull<Link>> {
        self.iter().nth(index)
    }

    pub fn iter(&self) -> RawIter<'_> {
        RawIter {
            cursor: self.head,
            _list: PhantomData,
        }
    }

    /// Links `node` at the tail.
    ///
    /// # Safety
    ///
    /// `node` must point at a live, unlinked element that outlives its membership
    /// in this list.
    pub unsafe fn append(&mut self, node: NonNull<Link>) {
        let add = node.as_ptr();
        (*add).next = None;
        match self.head {
            Some(head) => {
                let head = head.as_ptr();
                // head.prev is always the tail of a non-empty list
                let tail = (*head).prev.unwrap_or(NonNull::new_unchecked(head));
                (*add).prev = Some(tail);
                (*tail.as_ptr()).next = Some(node);
                (*head).prev = Some(node);
            }
            None => {
                (*add).prev = Some(node);
                self.head = Some(node);
            }
        }
    }

    /// Unlinks every element and returns them in order.
    fn take_all(&mut self) -> Vec<NonNull<Link>> {
        let nodes: Vec<_> = self.iter().collect();
        self.head = None;
        nodes
    }
}

/// Iterator over the raw links of a list, head first.
pub struct RawIter<'a> {
    cursor: Option<NonNull<Link>>,
    _list: PhantomData<&'a RawList>,
}

impl Iterator for RawIter<'_> {
    type Item = NonNull<Link>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        self.cursor = unsafe { (*node.as_ptr()).next };
        Some(node)
    }
}

impl FusedIterator for RawIter<'_> {}

/// Owning intrusive list of boxed elements.
#[repr(transparent)]
pub struct DList<T: Linked> {
    raw: RawList,
    _owns: PhantomData<Box<T>>,
}

impl<T: Linked> DList<T> {
    pub const fn new() -> Self {
        DList {
            raw: RawList::new(),
            _owns: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Appends `element` and returns a pointer to its new home.
    pub fn push_back(&mut self, element: Box<T>) -> NonNull<T> {
        let ptr = NonNull::from(Box::leak(element));
        unsafe { self.raw.append(ptr.cast()) };
        ptr
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.raw
            .get(index)
            .map(|node| unsafe { node.cast::<T>().as_ref() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.raw.iter().map(|node| unsafe { node.cast::<T>().as_ref() })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.raw
            .iter()
            .map(|node| unsafe { &mut *node.cast::<T>().as_ptr() })
    }

    pub fn raw(&self) -> &RawList {
        &self.raw
    }
}

impl<T: Linked> Default for DList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Linked + fmt::Debug> fmt::Debug for DList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Linked> Drop for DList<T> {
    fn drop(&mut self) {
        for node in self.raw.take_all() {
            // every element was boxed, either by push_back or by a class constructor
            drop(unsafe { Box::from_raw(node.cast::<T>().as_ptr()) });
        }
    }
}

/// Erases a typed list field to its raw head, for collection descriptors.
pub fn erase_list<T: Linked>(list: *mut DList<T>) -> NonNull<RawList> {
    // DList is transparent over RawList
    NonNull::new(list.cast::<RawList>()).unwrap_or(NonNull::dangling())
}

/// The elements reachable from one list field of one native object.
///
/// Proxies are built on every access and are never shared; they only remember
/// where the list head lives.
#[derive(Debug)]
pub struct CollectionProxy {
    slot: NonNull<RawList>,
    element: &'static ClassDescriptor,
}

impl CollectionProxy {
    pub fn new(slot: NonNull<RawList>, element: &'static ClassDescriptor) -> Self {
        CollectionProxy { slot, element }
    }

    fn list(&self) -> &RawList {
        unsafe { self.slot.as_ref() }
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<NonNull<()>> {
        self.list().get(index).map(NonNull::cast)
    }

    /// Constructs a new element and links it at the tail.
    ///
    /// Returns `None` when the element class has no constructor.
    pub fn append_new(&self) -> Option<NonNull<()>> {
        let construct = self.element.constructor?;
        let element = construct();
        unsafe { (*self.slot.as_ptr()).append(element.cast()) };
        tracing::trace!(
            target: "bindings",
            class = self.element.name,
            length = self.len(),
            "Appended element"
        );
        Some(element)
    }
}

impl Synthetic for CollectionProxy {
    fn identity(&self) -> usize {
        self.slot.as_ptr() as usize
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Generic proxy class for every collection attribute.
pub static LIST_CLASS: ClassDescriptor = ClassDescriptor {
    name: "List",
    constructor: None,
    factory: Some(make_proxy),
    attributes: &[
        Attribute {
            name: "length",
            kind: AttributeKind::Getter(list_length),
        },
        Attribute {
            name: "new",
            kind: AttributeKind::Method(list_new),
        },
        Attribute {
            name: "at",
            kind: AttributeKind::Method(list_at),
        },
        Attribute {
            name: "toArray",
            kind: AttributeKind::Method(list_to_array),
        },
    ],
};

fn make_proxy(owner: NonNull<()>, attribute: &'static Attribute) -> Option<Box<dyn Synthetic>> {
    match &attribute.kind {
        AttributeKind::Collection(field) => Some(Box::new(CollectionProxy::new(
            (field.head)(owner),
            field.element,
        ))),
        _ => None,
    }
}

fn proxy_of<'a>(ctx: &Ctx<'_>, handle: &'a NativeHandle) -> rquickjs::Result<&'a CollectionProxy> {
    handle
        .synthetic::<CollectionProxy>()
        .ok_or_else(|| Exception::throw_type(ctx, "receiver is not a collection"))
}

fn list_length<'js>(ctx: &Ctx<'js>, handle: &NativeHandle) -> rquickjs::Result<Value<'js>> {
    let len = proxy_of(ctx, handle)?.len();
    Ok(match i32::try_from(len) {
        Ok(len) => Value::new_int(ctx.clone(), len),
        Err(_) => Value::new_number(ctx.clone(), len as f64),
    })
}

fn list_new<'js>(
    ctx: &Ctx<'js>,
    handle: &NativeHandle,
    _args: Rest<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let proxy = proxy_of(ctx, handle)?;
    let element = proxy.append_new().ok_or_else(|| {
        Exception::throw_internal(
            ctx,
            &format!("class {} has no constructor", proxy.element.name),
        )
    })?;
    wrap_native(ctx, proxy.element, element)
}

fn list_at<'js>(
    ctx: &Ctx<'js>,
    handle: &NativeHandle,
    args: Rest<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let proxy = proxy_of(ctx, handle)?;
    // Number() semantics, so at("1") reads the second element
    let index = match args.0.into_iter().next() {
        Some(value) => Some(Coerced::<f64>::from_js(ctx, value)?.0),
        None => None,
    }
    .filter(|n| n.fract() == 0.0 && *n >= 0.0)
    .map(|n| n as usize);
    match index.and_then(|i| proxy.get(i)) {
        Some(element) => wrap_native(ctx, proxy.element, element),
        None => Ok(Value::new_undefined(ctx.clone())),
    }
}

fn list_to_array<'js>(
    ctx: &Ctx<'js>,
    handle: &NativeHandle,
    _args: Rest<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let proxy = proxy_of(ctx, handle)?;
    let array = Array::new(ctx.clone())?;
    for (index, node) in proxy.list().iter().enumerate() {
        array.set(index, wrap_native(ctx, proxy.element, node.cast())?)?;
    }
    Ok(array.into_value())
}
