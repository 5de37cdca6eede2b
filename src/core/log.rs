//! 日志初始化
//!
//! 控制台始终输出；开启 `file_output` 后再加一个按天滚动的文件输出。
//! 渲染环境的创建步骤记在 debug，创建成功和 resize 记在 info，
//! 设备丢失与等待超时记在 error，逐帧的事件记在 trace。
//!
//! ```no_run
//! use dxr_harness::core::log;
//! use dxr_harness::core::config::LogLevel;
//!
//! log::init_logger(LogLevel::Info, false, None).unwrap();
//! tracing::info!(width = 1280, height = 720, "Window created");
//! ```

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use super::config::LogLevel;
use super::error::{HarnessError, Result};

/// 初始化日志系统
///
/// 必须在程序开始时调用一次，重复调用返回错误。
///
/// # 参数
///
/// * `level` - 日志级别，`RUST_LOG` 存在时以环境变量为准
/// * `file_output` - 是否输出到文件
/// * `log_file_path` - 日志文件路径（可选，默认为 "dxr_harness.log"）
pub fn init_logger(level: LogLevel, file_output: bool, log_file_path: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true);

    let result = if file_output {
        let log_path = log_file_path.unwrap_or("dxr_harness.log");
        let path = Path::new(log_path);
        let directory = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("dxr_harness.log");

        // 每天滚动的日志文件
        let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, filename);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
    };

    result.map_err(|e| HarnessError::Log(e.to_string()))
}

impl LogLevel {
    /// EnvFilter 指令
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
