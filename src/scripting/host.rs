// ============================================================================
// 脚本宿主
// 负责引擎生命周期、类注册、根对象绑定与脚本求值
// ============================================================================

use std::cell::Cell;
use std::ffi::CString;
use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rquickjs::{qjs, Coerced, Context, Ctx, Exception, FromJs, Runtime, Value};

use super::console::Console;
use crate::bindings::{self, ClassDescriptor, ClassRegistry, NativeClass};
use crate::config::ScriptConfig;
use crate::core::{BindingError, ScriptError, ScriptResult};

/// Lifecycle of a [`ScriptHost`].
///
/// `Running` only lasts for one evaluation, after which the host is back in
/// `GlobalsBound` and ready for the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostStage {
    Uninitialized,
    EngineCreated,
    ClassesRegistered,
    GlobalsBound,
    Running,
    Terminated,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Completed,
    /// The script threw. Carries the reported diagnostic.
    Raised(String),
}

impl Evaluation {
    pub fn is_completed(&self) -> bool {
        matches!(self, Evaluation::Completed)
    }
}

/// One engine instance plus the bindings installed into it.
///
/// `'host` is the lifetime of the native objects bound as globals; the engine
/// is torn down before they can go away.
pub struct ScriptHost<'host> {
    stage: HostStage,
    config: ScriptConfig,
    console: Console,
    // context must be dropped before the runtime
    context: Option<Context>,
    runtime: Option<Runtime>,
    deadline: Rc<Cell<Option<Instant>>>,
    _host: PhantomData<&'host mut ()>,
}

impl<'host> ScriptHost<'host> {
    /// Creates a host writing console output to stdout and stderr.
    pub fn new(config: ScriptConfig) -> ScriptResult<Self> {
        Self::with_console(config, Console::stdio())
    }

    pub fn with_console(config: ScriptConfig, console: Console) -> ScriptResult<Self> {
        config.validate()?;
        Ok(ScriptHost {
            stage: HostStage::Uninitialized,
            config,
            console,
            context: None,
            runtime: None,
            deadline: Rc::new(Cell::new(None)),
            _host: PhantomData,
        })
    }

    pub fn stage(&self) -> HostStage {
        self.stage
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    fn expect_stage(&self, allowed: &[HostStage]) -> ScriptResult<()> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(ScriptError::Stage {
                expected: allowed[0],
                actual: self.stage,
            })
        }
    }

    fn context(&self) -> ScriptResult<&Context> {
        self.context.as_ref().ok_or(ScriptError::Stage {
            expected: HostStage::EngineCreated,
            actual: self.stage,
        })
    }

    /// Creates the runtime and context and applies the configured limits.
    pub fn create_engine(&mut self) -> ScriptResult<()> {
        self.expect_stage(&[HostStage::Uninitialized])?;

        let runtime = Runtime::new()?;
        let limits = &self.config.runtime;
        if let Some(limit) = limits.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = limits.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        if let Some(threshold) = limits.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        if limits.timeout_ms.is_some() {
            let deadline = Rc::clone(&self.deadline);
            runtime.set_interrupt_handler(Some(Box::new(move || {
                deadline.get().is_some_and(|at| Instant::now() >= at)
            })));
        }

        let context = Context::full(&runtime)?;
        context.with(|ctx| ClassRegistry::install(&ctx))?;

        self.runtime = Some(runtime);
        self.context = Some(context);
        self.stage = HostStage::EngineCreated;
        tracing::debug!(target: "scripting", "Script engine created");
        Ok(())
    }

    /// Registers `classes` and, on first call, the console.
    ///
    /// Every class referenced by a registered class must be part of the set.
    pub fn register_classes(&mut self, classes: &[&'static ClassDescriptor]) -> ScriptResult<()> {
        self.expect_stage(&[HostStage::EngineCreated, HostStage::ClassesRegistered])?;
        let install_console = self.stage == HostStage::EngineCreated && self.config.bindings.console;
        let console = self.console.clone();

        self.context()?.with(|ctx| -> ScriptResult<()> {
            for &class in classes {
                bindings::register_class(&ctx, class)?;
            }
            bindings::verify_references(&ctx)?;
            if install_console {
                console.install(&ctx).map_err(BindingError::from)?;
            }
            Ok(())
        })?;

        self.stage = HostStage::ClassesRegistered;
        tracing::info!(
            target: "scripting",
            classes = classes.len(),
            console = install_console,
            "Classes registered"
        );
        Ok(())
    }

    /// Publishes `root` as the global `name`.
    pub fn bind_global<R: NativeClass>(&mut self, name: &str, root: &'host mut R) -> ScriptResult<()> {
        self.expect_stage(&[HostStage::ClassesRegistered, HostStage::GlobalsBound])?;
        let class = R::class();
        let object = NonNull::from(root).cast::<()>();

        self.context()?.with(|ctx| -> ScriptResult<()> {
            if bindings::lookup(&ctx, class).is_none() {
                return Err(BindingError::UnknownClass(class.name).into());
            }
            let value = bindings::wrap_native(&ctx, class, object)?;
            ctx.globals().set(name, value)?;
            Ok(())
        })?;

        self.stage = HostStage::GlobalsBound;
        tracing::debug!(target: "scripting", global = name, class = class.name, "Global bound");
        Ok(())
    }

    /// Publishes `root` under the configured root global name.
    pub fn bind_root<R: NativeClass>(&mut self, root: &'host mut R) -> ScriptResult<()> {
        let name = self.config.bindings.root_global.clone();
        self.bind_global(&name, root)
    }

    /// Runs every step up to `GlobalsBound`.
    pub fn bootstrap<R: NativeClass>(
        &mut self,
        classes: &[&'static ClassDescriptor],
        root: &'host mut R,
    ) -> ScriptResult<()> {
        self.create_engine()?;
        self.register_classes(classes)?;
        self.bind_root(root)
    }

    /// Evaluates `source` as global code.
    ///
    /// A thrown exception is reported on the error channel and returned as
    /// [`Evaluation::Raised`]; it never surfaces as an `Err`.
    pub fn eval(&mut self, name: &str, source: impl Into<Vec<u8>>) -> ScriptResult<Evaluation> {
        let outcome = self.run(name, source, |_ctx, _value| Ok(()))?;
        Ok(match outcome {
            Ok(()) => Evaluation::Completed,
            Err(diagnostic) => {
                self.console.write_err(&diagnostic);
                Evaluation::Raised(diagnostic)
            }
        })
    }

    /// Evaluates `source` and converts its completion value.
    ///
    /// A thrown exception becomes [`ScriptError::Runtime`].
    pub fn eval_value<T>(&mut self, source: impl Into<Vec<u8>>) -> ScriptResult<T>
    where
        T: for<'js> FromJs<'js>,
    {
        let outcome = self.run("<eval>", source, |ctx, value| T::from_js(ctx, value))?;
        outcome.map_err(ScriptError::Runtime)
    }

    /// Reads and evaluates a script file.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> ScriptResult<Evaluation> {
        let path = path.as_ref();
        let source = fs::read(path).map_err(|source| ScriptError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        self.eval(&path.display().to_string(), source)
    }

    fn run<T, F>(
        &mut self,
        name: &str,
        source: impl Into<Vec<u8>>,
        convert: F,
    ) -> ScriptResult<Result<T, String>>
    where
        F: for<'js> FnOnce(&Ctx<'js>, Value<'js>) -> rquickjs::Result<T>,
    {
        self.expect_stage(&[HostStage::GlobalsBound])?;
        self.stage = HostStage::Running;
        self.deadline.set(
            self.config
                .runtime
                .timeout_ms
                .map(|ms| Instant::now() + Duration::from_millis(ms)),
        );
        tracing::debug!(target: "scripting", script = name, "Evaluating script");

        let strict = self.config.bindings.strict;
        let outcome = match self.context.as_ref() {
            Some(context) => Ok(context.with(|ctx| {
                let result = eval_named(&ctx, source.into(), name, strict)
                    .and_then(|value| convert(&ctx, value));
                match result {
                    Ok(value) => Ok(value),
                    Err(rquickjs::Error::Exception) => Err(describe_exception(&ctx, ctx.catch())),
                    Err(other) => Err(other.to_string()),
                }
            })),
            None => Err(ScriptError::Stage {
                expected: HostStage::GlobalsBound,
                actual: HostStage::Running,
            }),
        };

        self.deadline.set(None);
        self.stage = HostStage::GlobalsBound;
        if let Ok(Err(diagnostic)) = &outcome {
            tracing::warn!(target: "scripting", script = name, "Uncaught exception: {}", diagnostic);
        }
        outcome
    }

    /// Names of the registered classes, in registration order.
    pub fn registered_classes(&self) -> Vec<&'static str> {
        match self.context.as_ref() {
            Some(context) => context.with(|ctx| bindings::registered_classes(&ctx)),
            None => Vec::new(),
        }
    }

    /// Forces a garbage collection cycle, finalizing unreachable handles.
    pub fn run_gc(&self) {
        if let Some(runtime) = &self.runtime {
            runtime.run_gc();
        }
    }

    /// Frees the context, then the runtime.
    pub fn shutdown(&mut self) {
        if self.stage == HostStage::Terminated {
            return;
        }
        self.context = None;
        self.runtime = None;
        self.stage = HostStage::Terminated;
        tracing::debug!(target: "scripting", "Script engine terminated");
    }
}

impl Drop for ScriptHost<'_> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ScriptHost<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHost")
            .field("stage", &self.stage)
            .field("config", &self.config)
            .finish()
    }
}

/// Evaluates `source` as global code under the file name `name`, so stack
/// traces point at the script rather than a generic label.
fn eval_named<'js>(
    ctx: &Ctx<'js>,
    source: Vec<u8>,
    name: &str,
    strict: bool,
) -> rquickjs::Result<Value<'js>> {
    let len = source.len();
    let source = CString::new(source)?;
    let file_name = CString::new(name.replace('\0', ""))?;
    let mut flags = qjs::JS_EVAL_TYPE_GLOBAL;
    if strict {
        flags |= qjs::JS_EVAL_FLAG_STRICT;
    }

    let value = unsafe {
        qjs::JS_Eval(
            ctx.as_raw().as_ptr(),
            source.as_ptr(),
            len as _,
            file_name.as_ptr(),
            flags as _,
        )
    };
    if unsafe { qjs::JS_IsException(value) } {
        return Err(rquickjs::Error::Exception);
    }
    // JS_Eval hands back an owned reference
    Ok(unsafe { Value::from_raw(ctx.clone(), value) })
}

/// Formats a thrown value as `String(value)` followed by its stack, if any.
fn describe_exception<'js>(ctx: &Ctx<'js>, thrown: Value<'js>) -> String {
    let stack = thrown
        .as_object()
        .and_then(|object| Exception::from_object(object.clone()))
        .and_then(|exception| exception.stack())
        .filter(|stack| !stack.trim().is_empty());

    let text = match Coerced::<String>::from_js(ctx, thrown) {
        Ok(Coerced(text)) => text,
        Err(_) => {
            // String() itself threw
            let _ = ctx.catch();
            return "[exception]".to_string();
        }
    };

    match stack {
        Some(stack) => format!("{}\n{}", text, stack.trim_end()),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Goxel, CLASSES};
    use crate::scripting::console::SharedBuffer;

    fn quiet_host<'a>(config: ScriptConfig) -> (ScriptHost<'a>, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let console = Console::new(Box::new(out.clone()), Box::new(err.clone()));
        let host = ScriptHost::with_console(config, console).unwrap();
        (host, out, err)
    }

    #[test]
    fn test_stages_advance_in_order() {
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(ScriptConfig::default());
        assert_eq!(host.stage(), HostStage::Uninitialized);
        host.create_engine().unwrap();
        assert_eq!(host.stage(), HostStage::EngineCreated);
        host.register_classes(&CLASSES).unwrap();
        assert_eq!(host.stage(), HostStage::ClassesRegistered);
        host.bind_root(&mut goxel).unwrap();
        assert_eq!(host.stage(), HostStage::GlobalsBound);
        assert!(host.eval("noop", "1 + 1").unwrap().is_completed());
        assert_eq!(host.stage(), HostStage::GlobalsBound);
        host.shutdown();
        assert_eq!(host.stage(), HostStage::Terminated);
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(ScriptConfig::default());
        assert!(matches!(
            host.eval("early", "1"),
            Err(ScriptError::Stage {
                actual: HostStage::Uninitialized,
                ..
            })
        ));
        assert!(host.register_classes(&CLASSES).is_err());
        host.create_engine().unwrap();
        assert!(host.bind_root(&mut goxel).is_err());
        assert!(host.create_engine().is_err());
    }

    #[test]
    fn test_unregistered_root_rejected() {
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(ScriptConfig::default());
        host.create_engine().unwrap();
        host.register_classes(&[&bindings::LIST_CLASS]).unwrap();
        assert!(matches!(
            host.bind_root(&mut goxel),
            Err(ScriptError::InvalidBinding(BindingError::UnknownClass("Goxel")))
        ));
    }

    #[test]
    fn test_incomplete_class_set_rejected() {
        let (mut host, _, _) = quiet_host(ScriptConfig::default());
        host.create_engine().unwrap();
        let err = host
            .register_classes(&[&crate::host::IMAGE_CLASS])
            .unwrap_err();
        assert!(matches!(
            err,
            ScriptError::InvalidBinding(BindingError::UnregisteredClass { .. })
        ));
    }

    #[test]
    fn test_exception_is_contained() {
        let mut goxel = Goxel::new();
        let (mut host, _, err) = quiet_host(ScriptConfig::default());
        host.bootstrap(&CLASSES, &mut goxel).unwrap();

        let outcome = host.eval("boom", "throw new TypeError('bad layer')").unwrap();
        match outcome {
            Evaluation::Raised(diagnostic) => {
                assert!(diagnostic.starts_with("TypeError: bad layer"));
                // the stack names the script it came from
                assert!(diagnostic.contains("boom"), "{}", diagnostic);
            }
            Evaluation::Completed => panic!("exception was swallowed"),
        }
        assert!(err.contents().contains("TypeError: bad layer"));

        // the host keeps working afterwards
        assert_eq!(host.eval_value::<i32>("6 * 7").unwrap(), 42);
    }

    #[test]
    fn test_thrown_primitive_and_broken_to_string() {
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(ScriptConfig::default());
        host.bootstrap(&CLASSES, &mut goxel).unwrap();

        assert_eq!(
            host.eval("primitive", "throw 42").unwrap(),
            Evaluation::Raised("42".to_string())
        );
        assert_eq!(
            host.eval(
                "broken",
                "throw { toString() { throw new Error('nope'); } }"
            )
            .unwrap(),
            Evaluation::Raised("[exception]".to_string())
        );
    }

    #[test]
    fn test_syntax_error_is_raised() {
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(ScriptConfig::default());
        host.bootstrap(&CLASSES, &mut goxel).unwrap();
        let outcome = host.eval("syntax", "var = ;").unwrap();
        assert!(matches!(outcome, Evaluation::Raised(msg) if msg.contains("SyntaxError")));
    }

    #[test]
    fn test_sloppy_mode_by_default() {
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(ScriptConfig::default());
        host.bootstrap(&CLASSES, &mut goxel).unwrap();
        assert!(host.eval("sloppy", "implicitGlobal = 1").unwrap().is_completed());

        let mut strict = ScriptConfig::default();
        strict.bindings.strict = true;
        let mut other = Goxel::new();
        let (mut host, _, _) = quiet_host(strict);
        host.bootstrap(&CLASSES, &mut other).unwrap();
        assert!(!host.eval("strict", "implicitGlobal = 1").unwrap().is_completed());
    }

    #[test]
    fn test_timeout_interrupts_script() {
        let mut config = ScriptConfig::default();
        config.runtime.timeout_ms = Some(50);
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(config);
        host.bootstrap(&CLASSES, &mut goxel).unwrap();
        let outcome = host.eval("spin", "for (;;) {}").unwrap();
        assert!(matches!(outcome, Evaluation::Raised(msg) if msg.contains("interrupted")));
        assert!(host.eval("after", "1").unwrap().is_completed());
    }

    #[test]
    fn test_run_file_unreadable() {
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(ScriptConfig::default());
        host.bootstrap(&CLASSES, &mut goxel).unwrap();
        assert!(matches!(
            host.run_file("/definitely/not/here.js"),
            Err(ScriptError::Unreadable { .. })
        ));
        assert_eq!(host.stage(), HostStage::GlobalsBound);
    }

    #[test]
    fn test_console_disabled() {
        let mut config = ScriptConfig::default();
        config.bindings.console = false;
        let mut goxel = Goxel::new();
        let (mut host, _, _) = quiet_host(config);
        host.bootstrap(&CLASSES, &mut goxel).unwrap();
        assert_eq!(
            host.eval_value::<String>("typeof console").unwrap(),
            "undefined"
        );
    }
}
