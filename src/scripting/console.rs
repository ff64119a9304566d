//! `console` and `print` for scripts
//!
//! Arguments are converted with `String()` and joined by single spaces.
//! `log`, `info` and `print` go to the output channel, `warn` and `error` to
//! the error channel.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use rquickjs::function::Rest;
use rquickjs::{Coerced, Ctx, Function, Object};

/// Shared, writable channel.
pub type Channel = Rc<RefCell<Box<dyn Write>>>;

/// Output and error channels used by the console and by diagnostics.
#[derive(Clone)]
pub struct Console {
    out: Channel,
    err: Channel,
}

impl Console {
    pub fn new(out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Console {
            out: Rc::new(RefCell::new(out)),
            err: Rc::new(RefCell::new(err)),
        }
    }

    /// Process stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn write_err(&self, line: &str) {
        write_line(&self.err, line);
    }

    /// Installs `console` and `print` into the context's globals.
    pub fn install(&self, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let console = Object::new(ctx.clone())?;
        console.set("log", self.printer(self.out.clone(), "log", ctx)?)?;
        console.set("info", self.printer(self.out.clone(), "info", ctx)?)?;
        console.set("warn", self.printer(self.err.clone(), "warn", ctx)?)?;
        console.set("error", self.printer(self.err.clone(), "error", ctx)?)?;

        let globals = ctx.globals();
        globals.set("console", console)?;
        globals.set("print", self.printer(self.out.clone(), "print", ctx)?)?;
        Ok(())
    }

    fn printer<'js>(
        &self,
        channel: Channel,
        name: &'static str,
        ctx: &Ctx<'js>,
    ) -> rquickjs::Result<Function<'js>> {
        Function::new(ctx.clone(), move |args: Rest<Coerced<String>>| {
            let line = args
                .0
                .into_iter()
                .map(|Coerced(text)| text)
                .collect::<Vec<_>>()
                .join(" ");
            tracing::trace!(target: "script.console", method = name, "{}", line);
            write_line(&channel, &line);
        })?
        .with_name(name)
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::stdio()
    }
}

fn write_line(channel: &Channel, line: &str) {
    let mut writer = channel.borrow_mut();
    if let Err(err) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
        tracing::warn!(target: "script.console", "Console write failed: {}", err);
    }
}

/// In-memory channel, handy for capturing script output.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_console_routes_channels() {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let console = Console::new(Box::new(out.clone()), Box::new(err.clone()));

        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            console.install(&ctx).unwrap();
            ctx.eval::<(), _>(
                r#"
                console.log("a", 1, true, null);
                print("p");
                console.warn("careful");
                console.error("bad", { toString() { return "obj"; } });
                "#,
            )
            .unwrap();
        });

        assert_eq!(out.contents(), "a 1 true null\np\n");
        assert_eq!(err.contents(), "careful\nbad obj\n");
    }

    #[test]
    fn test_empty_log_prints_blank_line() {
        let out = SharedBuffer::new();
        let console = Console::new(Box::new(out.clone()), Box::new(io::sink()));
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            console.install(&ctx).unwrap();
            ctx.eval::<(), _>("console.log()").unwrap();
        });
        assert_eq!(out.contents(), "\n");
    }
}
