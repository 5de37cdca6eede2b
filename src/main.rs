//! DXR Harness 入口
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 使用模拟驱动渲染 120 帧
//! cargo run -- --headless --frames 120
//! ```
//!
//! # 初始化流程
//!
//! 1. 加载配置文件（config.toml），不存在时使用默认值
//! 2. 应用命令行参数覆盖并验证
//! 3. 初始化日志系统
//! 4. 构建后端并创建渲染器
//! 5. 运行帧循环，结束后销毁

use anyhow::Context;
use tracing::{error, info};

use dxr_harness::core::{log, Config};
use dxr_harness::renderer::{initialize_gpu_backend, Renderer};

fn main() -> anyhow::Result<()> {
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args().skip(1));
    config.validate().context("invalid configuration")?;

    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file)
        .context("failed to initialize logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "DXR Harness starting");
    info!(
        backend = config.graphics.backend.name(),
        driver = ?config.graphics.driver,
        width = config.window.width,
        height = config.window.height,
        frame_sync = ?config.graphics.frame_sync,
        "Graphics configuration"
    );

    let backend = initialize_gpu_backend(config.graphics.backend, &config.graphics)
        .context("failed to initialize the graphics backend")?;
    let mut renderer = Renderer::new(backend, &config.graphic_settings())
        .context("failed to create the render environment")?;

    let frames = renderer.run(config.run.max_frames);
    let stopped_by_failure = !renderer.is_running();
    renderer.destroy().context("failed to destroy the renderer")?;

    let frames = frames.context("frame loop failed")?;
    if stopped_by_failure {
        error!(frames, "Frame loop stopped");
    } else {
        info!(frames, "Frame loop finished");
    }
    Ok(())
}
