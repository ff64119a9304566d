//! 脚本宿主
//!
//! - `console` - 脚本可见的 `console` / `print`
//! - `host` - 引擎生命周期状态机与求值入口
//! - `runner` - 单次运行脚本文件

pub mod console;
pub mod host;
pub mod runner;

pub use console::{Console, SharedBuffer};
pub use host::{Evaluation, HostStage, ScriptHost};
pub use runner::{run_script, run_with, RunStatus};
