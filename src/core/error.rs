//! 错误处理模块
//!
//! 定义了渲染框架中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - **构建失败**：环境创建过程中任意原生资源创建失败，整个创建操作回滚
//! - **逐帧失败**：begin / submit / present 返回错误，帧循环据此停止
//! - **资源耗尽**：描述符堆超出容量，一律作为硬错误上报
//! - **设备丢失**：设备被移除，或栅栏等待超时

use std::time::Duration;

use crate::renderer::descriptor::DescriptorHeapType;

/// 框架统一的 Result 类型
pub type Result<T> = std::result::Result<T, HarnessError>;

/// 框架的顶层错误类型
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 图形 API 错误
    #[error("Graphics error: {0}")]
    Graphics(#[from] GraphicsError),

    /// 句柄校验失败
    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 日志系统错误
    #[error("Log error: {0}")]
    Log(String),

    /// 初始化错误
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl HarnessError {
    /// 是否属于设备丢失（设备移除或等待超时）
    pub fn is_device_lost(&self) -> bool {
        matches!(self, HarnessError::Graphics(e) if e.is_device_lost())
    }
}

/// 配置相关的错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    /// 没有可用的硬件适配器
    #[error("No hardware adapter found ({0})")]
    NoAdapter(String),

    /// 设备创建失败
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// 原生资源创建失败
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// 交换链错误
    #[error("Swap chain error: {0}")]
    SwapChain(String),

    /// 描述符堆已满
    #[error("{heap_type:?} descriptor heap exhausted (capacity {capacity})")]
    DescriptorHeapExhausted {
        heap_type: DescriptorHeapType,
        capacity: u32,
    },

    /// 命令记录或提交失败
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// 在错误的帧阶段调用了操作
    #[error("'{operation}' is not allowed while the frame is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: &'static str,
    },

    /// 目标帧缓冲不是当前后台缓冲
    #[error("Framebuffer {requested} is not the active back buffer ({active})")]
    InactiveFramebuffer { requested: u32, active: u32 },

    /// 设备已被移除
    #[error("Device removed: {reason}")]
    DeviceRemoved { reason: String },

    /// 栅栏等待超时，按设备丢失处理
    #[error("Timed out after {timeout:?} waiting for fence value {target} (completed {completed})")]
    FenceTimeout {
        target: u64,
        completed: u64,
        timeout: Duration,
    },

    /// 当前平台不支持
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl GraphicsError {
    /// 设备移除与等待超时都视为设备丢失
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            GraphicsError::DeviceRemoved { .. } | GraphicsError::FenceTimeout { .. }
        )
    }
}

/// 句柄相关的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    /// 句柄从未分配过，或索引越界
    #[error("invalid handle")]
    Invalid,

    /// 句柄所指的对象已经销毁或重建
    #[error("stale handle (object was destroyed or recreated)")]
    Stale,
}
