//! 图形后端模块
//!
//! - `backend`：`GraphicsDriver` trait，原生图形原语的抽象
//! - `dx12`：基于该 trait 的 DirectX 12 后端
//! - `headless`：行为确定的模拟驱动，用于测试和非 Windows 主机

pub mod backend;
pub mod dx12;
pub mod headless;

pub use backend::GraphicsDriver;
pub use dx12::Dx12Backend;
pub use headless::HeadlessDriver;
