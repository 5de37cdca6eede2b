//! DirectX 12 渲染后端
//!
//! `Dx12Backend` 是 [`RenderBackend`](crate::renderer::backend_trait::RenderBackend)
//! 的唯一实现。渲染环境存放在代际对象池中，对外只暴露句柄；
//! 每个入口都先校验句柄，已销毁或已重建的对象返回 `HandleError::Stale`。
//!
//! 驱动类型参数只决定使用原生还是模拟的底层对象，逻辑完全相同。

use tracing::{debug, info, warn};

use crate::core::config::{BackendType, GraphicsConfig};
use crate::core::error::{HandleError, HarnessError, Result};
use crate::core::handle::Arena;
use crate::gfx::backend::GraphicsDriver;
use crate::gfx::dx12::context::{EnvironmentOptions, RenderEnvironment};
use crate::renderer::backend_trait::{
    ClearColor, EnvironmentHandle, FramebufferApi, FramebufferHandle, FramebufferInfo,
    GraphicSettings, RenderSystemApi, WindowApi, WindowEvent, WindowHandle,
};

/// DirectX 12 渲染后端
pub struct Dx12Backend<D: GraphicsDriver> {
    driver: D,
    options: EnvironmentOptions,
    environments: Arena<RenderEnvironment<D>>,
    initialized: bool,
}

impl<D: GraphicsDriver> Dx12Backend<D> {
    /// 创建后端，调用 `init` 之后才能创建渲染环境
    pub fn new(driver: D, config: &GraphicsConfig) -> Self {
        Self {
            driver,
            options: EnvironmentOptions::from(config),
            environments: Arena::new(),
            initialized: false,
        }
    }

    /// 底层驱动
    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 按句柄取渲染环境
    pub fn environment(&self, env: EnvironmentHandle) -> Result<&RenderEnvironment<D>> {
        Ok(self.environments.get(env.0)?)
    }

    /// 按句柄取渲染环境（可变）
    pub fn environment_mut(&mut self, env: EnvironmentHandle) -> Result<&mut RenderEnvironment<D>> {
        Ok(self.environments.get_mut(env.0)?)
    }

    fn framebuffer_environment(
        &mut self,
        framebuffer: FramebufferHandle,
    ) -> Result<&mut RenderEnvironment<D>> {
        let environment = self.environment_mut(framebuffer.environment)?;
        check_framebuffer(environment, framebuffer)?;
        Ok(environment)
    }
}

/// 帧缓冲句柄必须来自当前这一代视图，且序号在缓冲数量之内
fn check_framebuffer<D: GraphicsDriver>(
    environment: &RenderEnvironment<D>,
    framebuffer: FramebufferHandle,
) -> std::result::Result<(), HandleError> {
    if framebuffer.epoch != environment.epoch() {
        return Err(HandleError::Stale);
    }
    if framebuffer.buffer >= environment.buffer_count() {
        return Err(HandleError::Invalid);
    }
    Ok(())
}

impl<D: GraphicsDriver> RenderSystemApi for Dx12Backend<D> {
    fn backend_name(&self) -> &'static str {
        BackendType::D3d12.name()
    }

    fn init(&mut self) -> Result<()> {
        if self.initialized {
            warn!("Backend already initialized");
            return Ok(());
        }
        self.initialized = true;
        info!(
            backend = self.backend_name(),
            driver = self.driver.name(),
            "Graphics backend initialized"
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        let handles = self.environments.handles();
        if !handles.is_empty() {
            warn!(
                count = handles.len(),
                "Destroying render environments still alive at shutdown"
            );
        }
        for handle in handles {
            let _ = self.environments.remove(handle);
        }
        if self.initialized {
            info!(backend = self.backend_name(), "Graphics backend shut down");
        }
        self.initialized = false;
    }

    fn create_render_environment(&mut self, settings: &GraphicSettings) -> Result<EnvironmentHandle> {
        if !self.initialized {
            return Err(HarnessError::Initialization(
                "graphics backend is not initialized".to_string(),
            ));
        }

        let environment = RenderEnvironment::create(self.driver.clone(), settings, self.options)?;
        let handle = EnvironmentHandle(self.environments.insert(environment));
        debug!(handle = handle.0.to_bits(), "Render environment registered");
        Ok(handle)
    }

    fn destroy_render_environment(&mut self, env: EnvironmentHandle) -> Result<()> {
        let environment = self.environments.remove(env.0)?;
        drop(environment);
        debug!(handle = env.0.to_bits(), "Render environment released");
        Ok(())
    }

    fn environment_count(&self) -> usize {
        self.environments.len()
    }

    fn render_window(&self, env: EnvironmentHandle) -> Result<WindowHandle> {
        self.environment(env)?;
        Ok(WindowHandle::from(env))
    }

    fn resize_window(&mut self, env: EnvironmentHandle, width: u32, height: u32) -> Result<()> {
        self.environment_mut(env)?.resize(width, height)?;
        Ok(())
    }

    fn default_frame_buffer(&self, env: EnvironmentHandle) -> Result<FramebufferHandle> {
        let environment = self.environment(env)?;
        Ok(FramebufferHandle {
            environment: env,
            buffer: environment.current_buffer(),
            epoch: environment.epoch(),
        })
    }

    fn frame_index(&self, env: EnvironmentHandle) -> Result<u64> {
        Ok(self.environment(env)?.frame_index())
    }

    fn get_time(&self, env: EnvironmentHandle) -> Result<f64> {
        Ok(self.environment(env)?.elapsed_seconds())
    }

    fn begin_frame(&mut self, env: EnvironmentHandle) -> Result<()> {
        self.environment_mut(env)?.begin_frame()
    }

    fn submit(&mut self, env: EnvironmentHandle) -> Result<()> {
        self.environment_mut(env)?.submit()
    }

    fn present(&mut self, env: EnvironmentHandle) -> Result<()> {
        self.environment_mut(env)?.present()
    }

    fn wait_for_idle(&mut self, env: EnvironmentHandle) -> Result<()> {
        self.environment_mut(env)?.wait_for_idle()
    }
}

impl<D: GraphicsDriver> WindowApi for Dx12Backend<D> {
    fn show(&mut self, window: WindowHandle) -> Result<()> {
        self.environment(window.environment())?.set_visible(true);
        Ok(())
    }

    fn hide(&mut self, window: WindowHandle) -> Result<()> {
        self.environment(window.environment())?.set_visible(false);
        Ok(())
    }

    fn is_active(&self, window: WindowHandle) -> Result<bool> {
        Ok(self.environment(window.environment())?.is_visible())
    }

    fn swap(&mut self, window: WindowHandle) -> Result<()> {
        self.environment_mut(window.environment())?.present()
    }

    fn poll_events(&mut self, window: WindowHandle) -> Result<Vec<WindowEvent>> {
        Ok(self.environment(window.environment())?.poll_events())
    }
}

impl<D: GraphicsDriver> FramebufferApi for Dx12Backend<D> {
    fn clear(&mut self, framebuffer: FramebufferHandle, color: ClearColor) -> Result<()> {
        self.framebuffer_environment(framebuffer)?
            .clear(framebuffer.buffer, color)
    }

    fn describe(&self, framebuffer: FramebufferHandle) -> Result<FramebufferInfo> {
        let environment = self.environment(framebuffer.environment)?;
        check_framebuffer(environment, framebuffer)?;
        environment
            .framebuffer_info(framebuffer.buffer)
            .ok_or(HarnessError::Handle(HandleError::Invalid))
    }
}

impl<D: GraphicsDriver> Drop for Dx12Backend<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::HeadlessDriver;

    fn backend(driver: &HeadlessDriver) -> Dx12Backend<HeadlessDriver> {
        let mut backend = Dx12Backend::new(driver.clone(), &GraphicsConfig::default());
        backend.init().unwrap();
        backend
    }

    #[test]
    fn test_create_requires_init() {
        let driver = HeadlessDriver::new();
        let mut backend = Dx12Backend::new(driver.clone(), &GraphicsConfig::default());

        assert!(matches!(
            backend.create_render_environment(&GraphicSettings::default()),
            Err(HarnessError::Initialization(_))
        ));
        assert_eq!(driver.live_objects(), 0);
    }

    #[test]
    fn test_destroyed_environment_handle_is_stale() {
        let driver = HeadlessDriver::new();
        let mut backend = backend(&driver);
        let env = backend
            .create_render_environment(&GraphicSettings::default())
            .unwrap();
        let window = backend.render_window(env).unwrap();

        backend.destroy_render_environment(env).unwrap();
        assert!(matches!(
            backend.begin_frame(env),
            Err(HarnessError::Handle(HandleError::Stale))
        ));
        assert!(matches!(
            backend.show(window),
            Err(HarnessError::Handle(HandleError::Stale))
        ));
        assert!(matches!(
            backend.destroy_render_environment(env),
            Err(HarnessError::Handle(HandleError::Stale))
        ));
    }

    #[test]
    fn test_framebuffer_handle_checks() {
        let driver = HeadlessDriver::new();
        let mut backend = backend(&driver);
        let env = backend
            .create_render_environment(&GraphicSettings::default())
            .unwrap();
        let fb = backend.default_frame_buffer(env).unwrap();

        let out_of_range = FramebufferHandle { buffer: 7, ..fb };
        assert!(matches!(
            backend.describe(out_of_range),
            Err(HarnessError::Handle(HandleError::Invalid))
        ));

        backend.resize_window(env, 800, 600).unwrap();
        assert!(matches!(
            backend.describe(fb),
            Err(HarnessError::Handle(HandleError::Stale))
        ));
        let fresh = backend.default_frame_buffer(env).unwrap();
        assert_eq!(backend.describe(fresh).unwrap().width, 800);
    }

    #[test]
    fn test_shutdown_releases_environments() {
        let driver = HeadlessDriver::new();
        let mut backend = backend(&driver);
        backend
            .create_render_environment(&GraphicSettings::default())
            .unwrap();

        backend.shutdown();
        assert_eq!(backend.environment_count(), 0);
        assert!(!backend.is_initialized());
        assert_eq!(driver.live_objects(), 0);
    }
}
