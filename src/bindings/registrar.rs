//! Class registration
//!
//! The registry lives in the context's userdata. It owns every prototype, so
//! the closures installed on prototypes only ever capture `'static` data and
//! the engine can collect everything when the runtime shuts down.

use std::cell::RefCell;
use std::fmt;
use std::ptr::{self, NonNull};

use rquickjs::class::Class;
use rquickjs::function::{Rest, This};
use rquickjs::object::Accessor;
use rquickjs::{Ctx, Exception, Function, JsLifetime, Object, Value};

use super::descriptor::{AttributeKind, ClassDescriptor};
use super::dispatch;
use super::handle::{NativeHandle, Target};
use crate::core::{BindingError, BindingResult};

/// Engine-side identifier of a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct RegisteredClass<'js> {
    class: &'static ClassDescriptor,
    prototype: Object<'js>,
}

/// Per-context table of registered classes.
pub struct ClassRegistry<'js> {
    base: Object<'js>,
    classes: RefCell<Vec<RegisteredClass<'js>>>,
}

unsafe impl<'js> JsLifetime<'js> for ClassRegistry<'js> {
    type Changed<'to> = ClassRegistry<'to>;
}

impl<'js> ClassRegistry<'js> {
    /// Installs an empty registry in `ctx`. Does nothing if one already exists.
    pub fn install(ctx: &Ctx<'js>) -> BindingResult<()> {
        if ctx.userdata::<ClassRegistry>().is_some() {
            return Ok(());
        }
        let base = Object::new(ctx.clone())?;
        base.set(
            "equals",
            Function::new(ctx.clone(), native_equals)?.with_name("equals")?,
        )?;
        base.set(
            "toString",
            Function::new(ctx.clone(), native_to_string)?.with_name("toString")?,
        )?;
        let registry = ClassRegistry {
            base,
            classes: RefCell::new(Vec::new()),
        };
        ctx.store_userdata(registry)
            .map_err(|err| BindingError::Engine(err.to_string()))?;
        Ok(())
    }

    fn find(&self, class: &'static ClassDescriptor) -> Option<(ClassId, Object<'js>)> {
        self.classes
            .borrow()
            .iter()
            .position(|entry| ptr::eq(entry.class, class))
            .map(|index| (ClassId(index), self.classes.borrow()[index].prototype.clone()))
    }

    fn is_registered(&self, class: &'static ClassDescriptor) -> bool {
        self.classes
            .borrow()
            .iter()
            .any(|entry| ptr::eq(entry.class, class))
    }

    fn push(&self, class: &'static ClassDescriptor, prototype: Object<'js>) -> ClassId {
        let mut classes = self.classes.borrow_mut();
        classes.push(RegisteredClass { class, prototype });
        ClassId(classes.len() - 1)
    }

    fn names(&self) -> Vec<&'static str> {
        self.classes.borrow().iter().map(|entry| entry.class.name).collect()
    }
}

fn native_equals<'js>(This(this): This<Class<'js, NativeHandle>>, other: Value<'js>) -> bool {
    match Class::<NativeHandle>::from_value(&other) {
        Ok(other) => this.borrow().same_object(&other.borrow()),
        Err(_) => false,
    }
}

fn native_to_string(This(this): This<Class<'_, NativeHandle>>) -> String {
    this.borrow().to_string()
}

/// Checks a descriptor before it is wired into an engine.
pub fn validate(class: &'static ClassDescriptor) -> BindingResult<()> {
    if class.name.is_empty() {
        return Err(BindingError::EmptyClassName);
    }
    for (index, attr) in class.attributes.iter().enumerate() {
        if attr.name.is_empty() {
            return Err(BindingError::EmptyAttributeName {
                class: class.name,
                index,
            });
        }
        if class.tag_of(attr.name) != Some(index) {
            tracing::warn!(
                target: "bindings",
                class = class.name,
                attribute = attr.name,
                "Duplicate attribute name, the later declaration wins"
            );
        }
        match &attr.kind {
            AttributeKind::Collection(field) => {
                if field.element.constructor.is_none() {
                    return Err(BindingError::MissingConstructor {
                        class: class.name,
                        attribute: attr.name,
                        element: field.element.name,
                    });
                }
                if field.proxy.factory.is_none() {
                    return Err(BindingError::MissingFactory {
                        class: class.name,
                        attribute: attr.name,
                        proxy: field.proxy.name,
                    });
                }
            }
            AttributeKind::Unbound => {
                tracing::warn!(
                    target: "bindings",
                    class = class.name,
                    attribute = attr.name,
                    "Attribute has no accessor and will read back its tag"
                );
            }
            _ => {}
        }
    }
    Ok(())
}

/// Wires `class` into the engine and returns its id.
///
/// Registering the same descriptor twice returns the existing id.
pub fn register_class<'js>(
    ctx: &Ctx<'js>,
    class: &'static ClassDescriptor,
) -> BindingResult<ClassId> {
    let registry = ctx
        .userdata::<ClassRegistry>()
        .ok_or(BindingError::RegistryMissing)?;
    if let Some((id, _)) = registry.find(class) {
        return Ok(id);
    }
    validate(class)?;

    let prototype = Object::new(ctx.clone())?;
    prototype.set_prototype(Some(&registry.base))?;

    for (tag, attr) in class.attributes.iter().enumerate() {
        match &attr.kind {
            AttributeKind::Getter(getter) => {
                let getter = *getter;
                prototype.prop(
                    attr.name,
                    Accessor::new_get(
                        move |ctx: Ctx<'js>, This(this): This<Class<'js, NativeHandle>>| {
                            getter(&ctx, &this.borrow())
                        },
                    )
                    .configurable(),
                )?;
            }
            AttributeKind::Method(method) => {
                let method = *method;
                let function = Function::new(
                    ctx.clone(),
                    move |ctx: Ctx<'js>,
                          This(this): This<Class<'js, NativeHandle>>,
                          args: Rest<Value<'js>>| {
                        method(&ctx, &this.borrow(), args)
                    },
                )?
                .with_name(attr.name)?;
                prototype.set(attr.name, function)?;
            }
            _ => {
                prototype.prop(
                    attr.name,
                    Accessor::new(
                        move |ctx: Ctx<'js>, This(this): This<Class<'js, NativeHandle>>| {
                            dispatch::get(&ctx, &this.borrow(), tag)
                        },
                        move |ctx: Ctx<'js>,
                              This(this): This<Class<'js, NativeHandle>>,
                              value: Value<'js>| {
                            dispatch::set(&ctx, &this.borrow(), tag, value)
                        },
                    )
                    .configurable(),
                )?;
            }
        }
    }

    if let Some(construct) = class.constructor {
        let constructor = Function::new(ctx.clone(), move |ctx: Ctx<'js>| {
            let object = construct();
            tracing::trace!(target: "bindings", class = class.name, "Constructed native object");
            wrap_native(&ctx, class, object)
        })?
        .with_name(class.name)?
        .with_constructor(true);
        constructor.set("prototype", prototype.clone())?;
        prototype.set("constructor", constructor.clone())?;
        ctx.globals().set(class.name, constructor)?;
    }

    let id = registry.push(class, prototype);
    tracing::debug!(
        target: "bindings",
        class = class.name,
        id = %id,
        attributes = class.attributes.len(),
        "Registered class"
    );
    Ok(id)
}

/// Checks that every class referenced by a registered class is registered too.
pub fn verify_references(ctx: &Ctx<'_>) -> BindingResult<()> {
    let registry = ctx
        .userdata::<ClassRegistry>()
        .ok_or(BindingError::RegistryMissing)?;
    let classes: Vec<&'static ClassDescriptor> =
        registry.classes.borrow().iter().map(|entry| entry.class).collect();
    for class in classes {
        for (attr, referenced) in class.referenced_classes() {
            if !registry.is_registered(referenced) {
                return Err(BindingError::UnregisteredClass {
                    class: class.name,
                    attribute: attr.name,
                    referenced: referenced.name,
                });
            }
        }
    }
    Ok(())
}

/// Names of the registered classes, in registration order.
pub fn registered_classes(ctx: &Ctx<'_>) -> Vec<&'static str> {
    ctx.userdata::<ClassRegistry>()
        .map(|registry| registry.names())
        .unwrap_or_default()
}

/// Looks up the id and prototype of a registered class.
pub fn lookup<'js>(
    ctx: &Ctx<'js>,
    class: &'static ClassDescriptor,
) -> Option<(ClassId, Object<'js>)> {
    ctx.userdata::<ClassRegistry>()?.find(class)
}

/// Wraps `target` in a fresh handle of `class`.
pub fn wrap<'js>(
    ctx: &Ctx<'js>,
    class: &'static ClassDescriptor,
    target: Target,
) -> rquickjs::Result<Value<'js>> {
    let (id, prototype) = lookup(ctx, class).ok_or_else(|| {
        Exception::throw_internal(ctx, &format!("class {} is not registered", class.name))
    })?;
    let handle = NativeHandle::new(class, id, target);
    Ok(Class::instance_proto(handle, prototype)?.into_value())
}

/// Wraps a host-owned object.
pub fn wrap_native<'js>(
    ctx: &Ctx<'js>,
    class: &'static ClassDescriptor,
    object: NonNull<()>,
) -> rquickjs::Result<Value<'js>> {
    wrap(ctx, class, Target::Borrowed(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::descriptor::Attribute;
    use rquickjs::{Context, Runtime};

    #[repr(C)]
    struct Counter {
        value: i32,
        label: [u8; 8],
    }

    static COUNTER_CLASS: ClassDescriptor = ClassDescriptor {
        name: "Counter",
        constructor: Some(|| {
            NonNull::from(Box::leak(Box::new(Counter {
                value: 0,
                label: [0; 8],
            })))
            .cast()
        }),
        factory: None,
        attributes: &[
            crate::plain_attr!("value", Counter, value),
            crate::string_attr!("label", Counter, label),
            Attribute {
                name: "twice",
                kind: AttributeKind::Getter(counter_twice),
            },
            Attribute {
                name: "bump",
                kind: AttributeKind::Method(counter_bump),
            },
        ],
    };

    fn counter_twice<'js>(ctx: &Ctx<'js>, handle: &NativeHandle) -> rquickjs::Result<Value<'js>> {
        let counter = handle
            .native()
            .map(|ptr| unsafe { ptr.cast::<Counter>().as_ref() })
            .ok_or_else(|| Exception::throw_type(ctx, "not a counter"))?;
        Ok(Value::new_int(ctx.clone(), counter.value * 2))
    }

    fn counter_bump<'js>(
        ctx: &Ctx<'js>,
        handle: &NativeHandle,
        _args: Rest<Value<'js>>,
    ) -> rquickjs::Result<Value<'js>> {
        if let Some(ptr) = handle.native() {
            unsafe { (*ptr.cast::<Counter>().as_ptr()).value += 1 };
        }
        Ok(Value::new_undefined(ctx.clone()))
    }

    static EMPTY_ATTR_CLASS: ClassDescriptor = ClassDescriptor {
        name: "Broken",
        constructor: None,
        factory: None,
        attributes: &[Attribute {
            name: "",
            kind: AttributeKind::Unbound,
        }],
    };

    static DANGLING_REF_CLASS: ClassDescriptor = ClassDescriptor {
        name: "Holder",
        constructor: None,
        factory: None,
        attributes: &[Attribute {
            name: "counter",
            kind: AttributeKind::Object(crate::bindings::ObjectField {
                class: &COUNTER_CLASS,
                project: |_| None,
            }),
        }],
    };

    fn with_registry<F: FnOnce(Ctx<'_>)>(f: F) {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            ClassRegistry::install(&ctx).unwrap();
            f(ctx);
        });
    }

    #[test]
    fn test_register_is_idempotent() {
        with_registry(|ctx| {
            let first = register_class(&ctx, &COUNTER_CLASS).unwrap();
            let second = register_class(&ctx, &COUNTER_CLASS).unwrap();
            assert_eq!(first, second);
            assert_eq!(registered_classes(&ctx), vec!["Counter"]);
        });
    }

    #[test]
    fn test_attributes_reachable_on_prototype() {
        with_registry(|ctx| {
            register_class(&ctx, &COUNTER_CLASS).unwrap();
            for attr in COUNTER_CLASS.attributes {
                let present: bool = ctx
                    .eval(format!("'{}' in Counter.prototype", attr.name))
                    .unwrap();
                assert!(present, "{} missing", attr.name);
            }
        });
    }

    #[test]
    fn test_constructor_and_dispatch() {
        with_registry(|ctx| {
            register_class(&ctx, &COUNTER_CLASS).unwrap();
            let result: String = ctx
                .eval(
                    r#"
                    var c = new Counter();
                    c.bump(); c.bump();
                    c.value = 99;
                    c.label = "counter-label";
                    [c.value, c.twice, c.label, c instanceof Counter].join(",");
                    "#,
                )
                .unwrap();
            assert_eq!(result, "2,4,counter,true");
        });
    }

    #[test]
    fn test_constructor_without_new() {
        with_registry(|ctx| {
            register_class(&ctx, &COUNTER_CLASS).unwrap();
            let same: bool = ctx
                .eval("var c = Counter(); c.equals(c) && c.value === 0")
                .unwrap();
            assert!(same);
        });
    }

    #[test]
    fn test_empty_attribute_name_rejected() {
        with_registry(|ctx| {
            let err = register_class(&ctx, &EMPTY_ATTR_CLASS).unwrap_err();
            assert_eq!(
                err,
                BindingError::EmptyAttributeName {
                    class: "Broken",
                    index: 0
                }
            );
        });
    }

    #[test]
    fn test_unregistered_reference_detected() {
        with_registry(|ctx| {
            register_class(&ctx, &DANGLING_REF_CLASS).unwrap();
            assert!(matches!(
                verify_references(&ctx),
                Err(BindingError::UnregisteredClass {
                    referenced: "Counter",
                    ..
                })
            ));
            register_class(&ctx, &COUNTER_CLASS).unwrap();
            assert!(verify_references(&ctx).is_ok());
        });
    }

    #[test]
    fn test_missing_registry() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            assert_eq!(
                register_class(&ctx, &COUNTER_CLASS),
                Err(BindingError::RegistryMissing)
            );
        });
    }
}
