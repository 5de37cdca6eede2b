//! DirectX 12 模型的后端实现
//!
//! 本模块的逻辑只依赖 [`GraphicsDriver`](crate::gfx::backend::GraphicsDriver)，
//! 在任何平台上都可以编译；只有 `native` 子模块直接调用 Win32 / D3D12。
//!
//! - `device`：适配器选择与设备创建
//! - `descriptor`：按类型分池的描述符堆
//! - `command`：命令队列、分配器、命令列表与栅栏
//! - `swap_chain`：交换链与帧缓冲
//! - `context`：渲染环境聚合与逐帧阶段机
//! - `backend`：对外的 `RenderBackend` 实现

pub mod backend;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
#[cfg(target_os = "windows")]
pub mod native;
pub mod swap_chain;

// 重新导出常用类型
pub use backend::Dx12Backend;
pub use context::{EnvironmentOptions, RenderEnvironment};
#[cfg(target_os = "windows")]
pub use native::NativeDriver;
