//! DXR Harness - 最小化的 DirectX 12 渲染框架
//!
//! 持有 GPU 设备、交换链、命令提交管线和逐帧同步协议，
//! 通过与具体 API 无关的后端接口暴露给渲染器外壳。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（配置、日志、错误处理、句柄、输入）
//! - `renderer`: 后端接口、通用类型和渲染器外壳
//! - `gfx`: 原生驱动抽象、DirectX 12 后端和模拟驱动
//!
//! # 使用示例
//!
//! ```no_run
//! use dxr_harness::core::config::{BackendType, Config};
//! use dxr_harness::renderer::{initialize_gpu_backend, Renderer};
//!
//! # fn main() -> dxr_harness::core::Result<()> {
//! let config = Config::default();
//! let backend = initialize_gpu_backend(BackendType::D3d12, &config.graphics)?;
//! let mut renderer = Renderer::new(backend, &config.graphic_settings())?;
//! renderer.run(60)?;
//! renderer.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod gfx;
pub mod renderer;
