//! 统一错误处理模块
//!
//! 提供绑定层范围内的错误类型定义
//!
//! ## 错误类型分层
//!
//! - **注册期错误** (`BindingError`): 类描述符表不合法、引擎在注册阶段失败
//! - **宿主错误** (`ScriptError`): 脚本文件无法读取、配置错误、宿主阶段顺序错误
//!
//! 脚本自身抛出的异常不属于这两类，它们被限制在单次求值内，以
//! [`Evaluation::Raised`](crate::scripting::Evaluation::Raised) 的形式返回。

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::scripting::HostStage;

/// 类注册错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("Class descriptor has an empty name")]
    EmptyClassName,

    #[error("Attribute #{index} of class {class} has an empty name")]
    EmptyAttributeName { class: &'static str, index: usize },

    #[error("Collection attribute {class}.{attribute} references element class {element}, which has no constructor")]
    MissingConstructor {
        class: &'static str,
        attribute: &'static str,
        element: &'static str,
    },

    #[error("Collection attribute {class}.{attribute} uses proxy class {proxy}, which has no factory")]
    MissingFactory {
        class: &'static str,
        attribute: &'static str,
        proxy: &'static str,
    },

    #[error("Class {referenced} is referenced by {class}.{attribute} but was never registered")]
    UnregisteredClass {
        class: &'static str,
        attribute: &'static str,
        referenced: &'static str,
    },

    #[error("Class {0} has not been registered with this engine")]
    UnknownClass(&'static str),

    #[error("Class registry is not installed in this context")]
    RegistryMissing,

    #[error("Script engine error: {0}")]
    Engine(String),
}

impl From<rquickjs::Error> for BindingError {
    fn from(err: rquickjs::Error) -> Self {
        BindingError::Engine(err.to_string())
    }
}

/// 脚本宿主错误
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script {path:?} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script runtime error: {0}")]
    Runtime(String),

    #[error("Invalid script binding: {0}")]
    InvalidBinding(#[from] BindingError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Script host is {actual:?}, expected {expected:?}")]
    Stage {
        expected: HostStage,
        actual: HostStage,
    },
}

impl From<rquickjs::Error> for ScriptError {
    fn from(err: rquickjs::Error) -> Self {
        ScriptError::Runtime(err.to_string())
    }
}

pub type BindingResult<T> = Result<T, BindingError>;
pub type ScriptResult<T> = Result<T, ScriptError>;
