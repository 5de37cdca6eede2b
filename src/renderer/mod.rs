//! 渲染器模块
//!
//! 与具体图形 API 无关的部分：后端接口、描述符与同步的通用类型，
//! 以及驱动帧循环的渲染器外壳。
//!
//! # 架构设计
//!
//! - `initialize_gpu_backend`：启动时构建一次后端能力对象
//! - `Renderer`：持有该对象，泵窗口事件并逐帧调用 begin / clear / submit / present
//! - 具体实现在 `gfx` 模块中

use tracing::{debug, error, info};

use crate::core::config::{BackendType, DriverKind, GraphicsConfig};
#[cfg(not(target_os = "windows"))]
use crate::core::error::GraphicsError;
use crate::core::error::Result;
use crate::core::InputState;
use crate::gfx::dx12::Dx12Backend;
use crate::gfx::headless::HeadlessDriver;

pub mod backend_trait;
pub mod command;
pub mod descriptor;
pub mod sync;

use backend_trait::{
    ClearColor, EnvironmentHandle, GraphicSettings, RenderBackend, WindowEvent, WindowHandle,
};

/// 构建渲染后端
///
/// 只有一个后端类型；配置中的驱动类型决定使用原生 D3D12 还是模拟驱动。
pub fn initialize_gpu_backend(
    backend: BackendType,
    config: &GraphicsConfig,
) -> Result<Box<dyn RenderBackend>> {
    match backend {
        BackendType::D3d12 => match config.driver {
            DriverKind::Headless => {
                info!(backend = backend.name(), "Initializing headless driver");
                Ok(Box::new(Dx12Backend::new(HeadlessDriver::new(), config)))
            }
            DriverKind::Native => native_backend(config),
        },
    }
}

#[cfg(target_os = "windows")]
fn native_backend(config: &GraphicsConfig) -> Result<Box<dyn RenderBackend>> {
    use crate::gfx::dx12::NativeDriver;

    info!(backend = BackendType::D3d12.name(), "Initializing native driver");
    Ok(Box::new(Dx12Backend::new(NativeDriver::new(), config)))
}

#[cfg(not(target_os = "windows"))]
fn native_backend(_config: &GraphicsConfig) -> Result<Box<dyn RenderBackend>> {
    Err(GraphicsError::Unsupported(
        "the native D3D12 driver is only available on Windows; use --headless".to_string(),
    )
    .into())
}

/// 渲染器外壳
///
/// 每帧把 begin / clear / submit / present 的结果做逻辑与，
/// 任何一步失败都会让 `is_running` 变为 false，这是帧循环唯一的停止信号。
pub struct Renderer {
    backend: Box<dyn RenderBackend>,
    environment: EnvironmentHandle,
    window: WindowHandle,
    input: InputState,
    running: bool,
    frames_rendered: u64,
}

impl Renderer {
    /// 初始化后端并创建渲染环境
    pub fn new(mut backend: Box<dyn RenderBackend>, settings: &GraphicSettings) -> Result<Self> {
        backend.init()?;
        let environment = backend.create_render_environment(settings)?;
        let window = backend.render_window(environment)?;

        info!(
            backend = backend.backend_name(),
            width = settings.width,
            height = settings.height,
            "Renderer initialized"
        );

        Ok(Self {
            backend,
            environment,
            window,
            input: InputState::new(),
            running: true,
            frames_rendered: 0,
        })
    }

    /// 运行帧循环
    ///
    /// 有窗口事件时先处理事件，没有事件时渲染一帧。
    /// `max_frames` 为 0 表示直到循环停止。返回本次渲染的帧数。
    pub fn run(&mut self, max_frames: u64) -> Result<u64> {
        self.backend.show(self.window)?;
        let start = self.frames_rendered;

        while self.running {
            let events = self.backend.poll_events(self.window)?;
            if events.is_empty() {
                self.render();
            } else {
                for event in events {
                    self.handle_event(event);
                }
            }

            if max_frames > 0 && self.frames_rendered - start >= max_frames {
                debug!(max_frames, "Frame limit reached");
                break;
            }
        }

        Ok(self.frames_rendered - start)
    }

    /// 处理一个窗口事件
    pub fn handle_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::KeyDown(key) => {
                self.input.key_down(key);
            }
            WindowEvent::KeyUp(key) => {
                self.input.key_up(key);
            }
            WindowEvent::Paint => {
                self.update();
                self.render();
            }
            WindowEvent::Resized { width, height } => {
                if let Err(e) = self.backend.resize_window(self.environment, width, height) {
                    error!(width, height, error = %e, "Resize failed, stopping");
                    self.running = false;
                }
            }
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.running = false;
            }
        }
    }

    /// 每帧的逻辑更新，目前没有任何内容
    pub fn update(&mut self) {}

    /// 渲染一帧，返回循环是否继续
    ///
    /// 偶数帧清成红色，奇数帧清成绿色。
    pub fn render(&mut self) -> bool {
        let env = self.environment;

        let began = self.check("begin_frame", |b| b.begin_frame(env));
        let cleared = began
            && self.check("clear", |b| {
                let color = if b.frame_index(env)? % 2 == 0 {
                    ClearColor::RED
                } else {
                    ClearColor::GREEN
                };
                let framebuffer = b.default_frame_buffer(env)?;
                b.clear(framebuffer, color)
            });
        let submitted = began && self.check("submit", |b| b.submit(env));
        let presented = submitted && self.check("present", |b| b.present(env));

        self.running &= began && cleared && submitted && presented;
        if presented {
            self.frames_rendered += 1;
        }
        self.running
    }

    /// 销毁渲染环境并关闭后端
    ///
    /// 渲染环境释放前自行等待 GPU 空闲；设备已丢失时不再等待。
    pub fn destroy(mut self) -> Result<()> {
        self.backend.destroy_render_environment(self.environment)?;
        self.backend.shutdown();
        info!(frames = self.frames_rendered, "Renderer destroyed");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn environment(&self) -> EnvironmentHandle {
        self.environment
    }

    pub fn window(&self) -> WindowHandle {
        self.window
    }

    pub fn backend(&self) -> &dyn RenderBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn RenderBackend {
        self.backend.as_mut()
    }

    fn check<F>(&mut self, operation: &'static str, f: F) -> bool
    where
        F: FnOnce(&mut dyn RenderBackend) -> Result<()>,
    {
        match f(self.backend.as_mut()) {
            Ok(()) => true,
            Err(e) => {
                if e.is_device_lost() {
                    error!(operation, error = %e, "Device lost");
                } else {
                    error!(operation, error = %e, "Frame operation failed");
                }
                false
            }
        }
    }
}
