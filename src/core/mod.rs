//! 核心功能模块
//!
//! 本模块提供了渲染框架的基础功能，与具体图形 API 无关。
//!
//! # 模块组织
//!
//! - `config`：配置管理，支持从配置文件和命令行加载设置
//! - `error`：错误处理，定义统一的错误类型
//! - `log`：日志系统，提供结构化的日志记录功能
//! - `handle`：代际句柄与对象池
//! - `input`：按键状态表

pub mod config;
pub mod error;
pub mod handle;
pub mod input;
pub mod log;

// 重新导出常用类型，方便使用
pub use config::Config;
pub use error::{GraphicsError, HandleError, HarnessError, Result};
pub use handle::{Arena, RawHandle};
pub use input::InputState;
