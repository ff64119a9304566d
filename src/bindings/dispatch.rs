//! Generic property dispatch
//!
//! Every non-computed attribute is installed as an accessor pair that forwards
//! here with the attribute's index in its class table. The class comes from
//! the receiving handle.

use std::ptr::NonNull;

use rquickjs::{Coerced, Ctx, Exception, FromJs, IntoJs, Value};

use super::descriptor::{Attribute, AttributeKind, ClassDescriptor};
use super::handle::{NativeHandle, Target};
use super::registrar::{wrap, wrap_native};

fn resolve<'js>(
    ctx: &Ctx<'js>,
    handle: &NativeHandle,
    tag: usize,
) -> rquickjs::Result<&'static Attribute> {
    handle.class().attribute(tag).ok_or_else(|| {
        Exception::throw_type(
            ctx,
            &format!("{} has no attribute #{}", handle.class().name, tag),
        )
    })
}

fn owner<'js>(ctx: &Ctx<'js>, handle: &NativeHandle, attr: &Attribute) -> rquickjs::Result<NonNull<()>> {
    handle.native().ok_or_else(|| {
        Exception::throw_type(
            ctx,
            &format!("{}.{} needs a native receiver", handle.class().name, attr.name),
        )
    })
}

/// Reads attribute `tag` of `handle`.
pub fn get<'js>(ctx: &Ctx<'js>, handle: &NativeHandle, tag: usize) -> rquickjs::Result<Value<'js>> {
    let attr = resolve(ctx, handle, tag)?;
    match &attr.kind {
        AttributeKind::Collection(field) => {
            let owner = owner(ctx, handle, attr)?;
            build_synthetic(ctx, field.proxy, owner, attr)
        }
        AttributeKind::StringBuffer(field) => {
            let owner = owner(ctx, handle, attr)?;
            let text = read_buffer((field.project)(owner));
            text.into_js(ctx)
        }
        AttributeKind::Object(field) => {
            let owner = owner(ctx, handle, attr)?;
            match (field.project)(owner) {
                Some(target) => wrap_native(ctx, field.class, target),
                None => Ok(Value::new_null(ctx.clone())),
            }
        }
        AttributeKind::Plain(field) => {
            let owner = owner(ctx, handle, attr)?;
            Ok((field.read)(owner).into_value(ctx))
        }
        AttributeKind::Getter(getter) => getter(ctx, handle),
        AttributeKind::Method(_) | AttributeKind::Unbound => {
            tracing::warn!(
                target: "bindings",
                class = handle.class().name,
                attribute = attr.name,
                tag,
                "Attribute has no readable projection, returning its tag"
            );
            Ok(Value::new_int(ctx.clone(), tag as i32))
        }
    }
}

/// Writes attribute `tag` of `handle`.
///
/// Only string buffers accept writes. Anything else is ignored.
pub fn set<'js>(
    ctx: &Ctx<'js>,
    handle: &NativeHandle,
    tag: usize,
    value: Value<'js>,
) -> rquickjs::Result<()> {
    let attr = resolve(ctx, handle, tag)?;
    match &attr.kind {
        AttributeKind::StringBuffer(field) => {
            let owner = owner(ctx, handle, attr)?;
            let Coerced(text) = Coerced::<String>::from_js(ctx, value)?;
            let written = write_buffer((field.project)(owner), &text);
            if written < text.len() {
                tracing::debug!(
                    target: "bindings",
                    class = handle.class().name,
                    attribute = attr.name,
                    requested = text.len(),
                    written,
                    "Truncated string write"
                );
            }
            Ok(())
        }
        other => {
            tracing::debug!(
                target: "bindings",
                class = handle.class().name,
                attribute = attr.name,
                kind = other.label(),
                "Ignoring write to read-only attribute"
            );
            Ok(())
        }
    }
}

/// Asks `class` to build a self-allocating object for `attr` of `owner`.
fn build_synthetic<'js>(
    ctx: &Ctx<'js>,
    class: &'static ClassDescriptor,
    owner: NonNull<()>,
    attr: &'static Attribute,
) -> rquickjs::Result<Value<'js>> {
    let object = class
        .factory
        .and_then(|factory| factory(owner, attr))
        .ok_or_else(|| {
            Exception::throw_internal(
                ctx,
                &format!("class {} cannot build {}", class.name, attr.name),
            )
        })?;
    wrap(ctx, class, Target::Owned(object))
}

/// Reads a NUL-terminated string, never past the end of the buffer.
pub fn read_buffer(buffer: NonNull<[u8]>) -> String {
    let bytes = unsafe { buffer.as_ref() };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Copies as much of `text` as fits, leaving room for the terminator.
///
/// Truncation backs off to a char boundary. Returns the number of bytes copied.
pub fn write_buffer(mut buffer: NonNull<[u8]>, text: &str) -> usize {
    let bytes = unsafe { buffer.as_mut() };
    let Some(room) = bytes.len().checked_sub(1) else {
        return 0;
    };
    let mut len = text.len().min(room);
    while !text.is_char_boundary(len) {
        len -= 1;
    }
    bytes[..len].copy_from_slice(&text.as_bytes()[..len]);
    bytes[len] = 0;
    len
}
