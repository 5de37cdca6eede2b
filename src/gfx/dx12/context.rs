//! 渲染环境
//!
//! 把窗口、设备、描述符堆池、命令管线和交换链聚合在一起，
//! 并驱动逐帧的阶段机：`begin_frame` → 记录（clear）→ `submit` → `present`。
//!
//! # 创建流程
//!
//! 1. 创建窗口
//! 2. 创建 DXGI 工厂
//! 3. 选择适配器并创建设备
//! 4. 创建命令队列
//! 5. 创建交换链和渲染目标视图
//! 6. 创建命令分配器、命令列表、栅栏和等待事件
//!
//! 任意一步失败时，已创建的对象按创建的逆序释放，错误原样返回。
//!
//! # 销毁顺序
//!
//! 字段按释放顺序声明：交换链（先缓冲后原生交换链）、命令管线、描述符堆、设备、工厂、窗口。
//! 释放前先做一次有上限的 `wait_for_idle`，设备已丢失时跳过。

use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::core::config::{FrameSync, GraphicsConfig};
use crate::core::error::{GraphicsError, Result};
use crate::gfx::backend::{AdapterInfo, DriverResult, GraphicsDriver, ResourceState, WindowDesc};
use crate::gfx::dx12::command::CommandPipeline;
use crate::gfx::dx12::descriptor::DescriptorHeapPool;
use crate::gfx::dx12::device::GpuDevice;
use crate::gfx::dx12::swap_chain::{clamp_extent, SwapChain, SWAP_CHAIN_BUFFER_COUNT};
use crate::renderer::backend_trait::{ClearColor, FramebufferInfo, GraphicSettings, WindowEvent};
use crate::renderer::command::FramePhase;
use crate::renderer::descriptor::{DescriptorHeapStats, DescriptorHeapType};
use crate::renderer::sync::FenceTracker;

/// 创建渲染环境时使用的图形选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentOptions {
    /// 是否创建调试工厂
    pub debug_layer: bool,
    /// 帧同步策略
    pub frame_sync: FrameSync,
    /// present 的同步间隔
    pub sync_interval: u32,
    /// 栅栏等待上限
    pub fence_timeout: Duration,
}

impl From<&GraphicsConfig> for EnvironmentOptions {
    fn from(config: &GraphicsConfig) -> Self {
        Self {
            debug_layer: config.debug_layer,
            frame_sync: config.frame_sync,
            sync_interval: config.sync_interval(),
            fence_timeout: config.fence_timeout(),
        }
    }
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self::from(&GraphicsConfig::default())
    }
}

/// 渲染环境
pub struct RenderEnvironment<D: GraphicsDriver> {
    swap_chain: SwapChain<D>,
    commands: CommandPipeline<D>,
    heaps: DescriptorHeapPool<D>,
    device: GpuDevice<D>,
    _factory: D::Factory,
    window: D::Window,
    driver: D,
    options: EnvironmentOptions,
    frame_index: u64,
    created_at: Instant,
    last_error: Option<String>,
    device_lost: bool,
}

impl<D: GraphicsDriver> RenderEnvironment<D> {
    /// 创建渲染环境
    pub fn create(driver: D, settings: &GraphicSettings, options: EnvironmentOptions) -> Result<Self> {
        let (width, height) = clamp_extent(settings.width, settings.height);
        if settings.fullscreen {
            info!("Fullscreen was requested; the environment always starts windowed");
        }

        debug!(title = %settings.window_name, width, height, "Creating window");
        let window = driver.create_window(&WindowDesc {
            title: &settings.window_name,
            class_name: &settings.window_class,
            width,
            height,
            instance: settings.platform.instance(),
        })?;

        debug!(debug_layer = options.debug_layer, "Creating DXGI factory");
        let factory = driver.create_factory(options.debug_layer)?;
        let device = GpuDevice::create(&driver, &factory)?;

        debug!("Creating command queue");
        let queue = driver.create_command_queue(device.raw())?;

        let mut heaps = DescriptorHeapPool::new();
        let mut swap_chain = SwapChain::create(&driver, &factory, &queue, &window, width, height)?;
        swap_chain.create_views(&driver, device.raw(), &mut heaps)?;

        let allocator_count = match options.frame_sync {
            FrameSync::PerBuffer => SWAP_CHAIN_BUFFER_COUNT as usize,
            FrameSync::Idle => 1,
        };
        debug!(allocator_count, "Creating command allocators");
        let allocators = (0..allocator_count)
            .map(|_| driver.create_command_allocator(device.raw()))
            .collect::<DriverResult<Vec<_>>>()?;
        let first_allocator = allocators.first().ok_or_else(|| {
            GraphicsError::ResourceCreation("no command allocator was created".to_string())
        })?;
        let list = driver.create_command_list(device.raw(), first_allocator)?;

        debug!("Creating fence");
        let fence = driver.create_fence(device.raw(), 0)?;
        let event = driver.create_fence_event()?;
        let commands = CommandPipeline::from_parts(
            &driver,
            queue,
            allocators,
            list,
            fence,
            event,
            FenceTracker::new(options.fence_timeout),
        )?;

        info!(
            driver = driver.name(),
            adapter = %device.adapter_info().name,
            width,
            height,
            frame_sync = ?options.frame_sync,
            "Render environment created"
        );

        Ok(Self {
            swap_chain,
            commands,
            heaps,
            device,
            _factory: factory,
            window,
            driver,
            options,
            frame_index: 0,
            created_at: Instant::now(),
            last_error: None,
            device_lost: false,
        })
    }

    /// 开始新的一帧
    ///
    /// 等待即将复用的后台缓冲不再被 GPU 使用，重置分配器和命令列表，
    /// 查询当前后台缓冲序号，帧计数加一。
    pub fn begin_frame(&mut self) -> Result<()> {
        let result = self.try_begin_frame();
        self.record("begin_frame", result)
    }

    fn try_begin_frame(&mut self) -> DriverResult<()> {
        let next = self.swap_chain.peek_index(&self.driver);
        // 上一次 resize 失败后缓冲视图为空，只能再次 resize 重建
        let fence_value = self
            .swap_chain
            .buffer(next)
            .map(|buffer| buffer.fence_value())
            .ok_or_else(|| {
                GraphicsError::SwapChain(format!(
                    "back buffer {} has no view; resize to rebuild the swap chain",
                    next
                ))
            })?;

        match self.options.frame_sync {
            FrameSync::PerBuffer => self.commands.wait_for_value(&self.driver, fence_value)?,
            // 只有一个分配器，重置前必须确认 GPU 已经空闲
            FrameSync::Idle => self.commands.wait_for_idle(&self.driver)?,
        }

        self.commands.begin(&self.driver, next as usize)?;
        let back_buffer = self.swap_chain.acquire(&self.driver);
        self.frame_index += 1;

        trace!(frame_index = self.frame_index, back_buffer, "Frame begun");
        Ok(())
    }

    /// 清除帧缓冲
    ///
    /// 只能在记录阶段调用，且目标必须是当前后台缓冲。
    pub fn clear(&mut self, buffer: u32, color: ClearColor) -> Result<()> {
        let result = self.try_clear(buffer, color);
        self.record("clear", result)
    }

    fn try_clear(&mut self, buffer: u32, color: ClearColor) -> DriverResult<()> {
        self.commands.check_recording("clear")?;
        let active = self.swap_chain.current_index();
        if buffer != active {
            return Err(GraphicsError::InactiveFramebuffer {
                requested: buffer,
                active,
            });
        }

        let list = self.commands.list();
        let target = self.swap_chain.current_buffer_mut()?;
        target.transition(&self.driver, list, ResourceState::RenderTarget);
        self.driver
            .clear_render_target(list, target.rtv(), color.to_array());

        trace!(buffer, color = ?color.to_array(), "Framebuffer cleared");
        Ok(())
    }

    /// 关闭并提交命令列表
    pub fn submit(&mut self) -> Result<()> {
        let result = self.try_submit();
        self.record("submit", result)
    }

    fn try_submit(&mut self) -> DriverResult<()> {
        self.commands.check_recording("submit")?;

        // 没有缓冲视图时也必须关闭命令列表，否则阶段会停在记录中
        if let Ok(target) = self.swap_chain.current_buffer_mut() {
            target.transition(&self.driver, self.commands.list(), ResourceState::Present);
        }
        let value = self.commands.close_and_execute(&self.driver)?;
        if let Ok(target) = self.swap_chain.current_buffer_mut() {
            target.set_fence_value(value);
        }

        trace!(
            frame_index = self.frame_index,
            fence_value = value.value(),
            "Frame submitted"
        );
        Ok(())
    }

    /// 呈现
    ///
    /// 失败时查询设备移除原因：设备已移除返回 `DeviceRemoved`，否则原样返回交换链错误。
    pub fn present(&mut self) -> Result<()> {
        let result = self.try_present();
        self.record("present", result)
    }

    fn try_present(&mut self) -> DriverResult<()> {
        self.commands.check_present()?;

        if let Err(e) = self.swap_chain.present(&self.driver, self.options.sync_interval) {
            return Err(match self.device.removed_reason(&self.driver) {
                Some(reason) => {
                    error!(%reason, frame_index = self.frame_index, "Present failed, device removed");
                    GraphicsError::DeviceRemoved { reason }
                }
                None => {
                    error!(error = %e, frame_index = self.frame_index, "Present failed");
                    e
                }
            });
        }
        self.commands.presented();

        if self.options.frame_sync == FrameSync::Idle {
            self.commands.wait_for_idle(&self.driver)?;
        }
        trace!(frame_index = self.frame_index, "Frame presented");
        Ok(())
    }

    /// 等待 GPU 完成全部已提交的工作
    pub fn wait_for_idle(&mut self) -> Result<()> {
        let result = self.commands.wait_for_idle(&self.driver);
        self.record("wait_for_idle", result)
    }

    /// 调整交换链尺寸
    ///
    /// 尺寸被限制为至少 1x1；与当前尺寸相同时返回 false，不做任何事情。
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        let result = self.try_resize(width, height);
        self.record("resize", result)
    }

    fn try_resize(&mut self, width: u32, height: u32) -> DriverResult<bool> {
        if self.commands.is_recording() {
            return Err(GraphicsError::InvalidPhase {
                operation: "resize",
                phase: self.commands.phase().name(),
            });
        }

        let (width, height) = clamp_extent(width, height);
        if width == self.swap_chain.width() && height == self.swap_chain.height() {
            debug!(width, height, "Resize to the current size ignored");
            return Ok(false);
        }

        self.commands.wait_for_idle(&self.driver)?;
        self.swap_chain
            .resize(&self.driver, self.device.raw(), &mut self.heaps, width, height)?;

        info!(width, height, epoch = self.swap_chain.epoch(), "Swap chain resized");
        Ok(true)
    }

    /// 显示或隐藏窗口
    pub fn set_visible(&self, visible: bool) {
        self.driver.set_window_visible(&self.window, visible);
        debug!(visible, "Window visibility changed");
    }

    /// 窗口是否可见
    pub fn is_visible(&self) -> bool {
        self.driver.is_window_visible(&self.window)
    }

    /// 取出窗口积压的事件
    pub fn poll_events(&self) -> Vec<WindowEvent> {
        self.driver.poll_events(&self.window)
    }

    /// 描述帧缓冲
    pub fn framebuffer_info(&self, buffer: u32) -> Option<FramebufferInfo> {
        let target = self.swap_chain.buffer(buffer)?;
        Some(FramebufferInfo {
            buffer_index: target.buffer_index(),
            heap_index: target.heap_index(),
            rtv_index: target.rtv_index(),
            rtv: target.rtv(),
            fence_value: target.fence_value(),
            width: self.swap_chain.width(),
            height: self.swap_chain.height(),
            is_active: buffer == self.swap_chain.current_index(),
        })
    }

    /// 帧计数，每次成功的 `begin_frame` 加一
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// 环境创建以来经过的秒数
    pub fn elapsed_seconds(&self) -> f64 {
        self.created_at.elapsed().as_secs_f64()
    }

    pub fn width(&self) -> u32 {
        self.swap_chain.width()
    }

    pub fn height(&self) -> u32 {
        self.swap_chain.height()
    }

    /// 当前后台缓冲序号
    pub fn current_buffer(&self) -> u32 {
        self.swap_chain.current_index()
    }

    pub fn buffer_count(&self) -> u32 {
        self.swap_chain.buffer_count()
    }

    /// 帧缓冲视图代数
    pub fn epoch(&self) -> u32 {
        self.swap_chain.epoch()
    }

    pub fn phase(&self) -> FramePhase {
        self.commands.phase()
    }

    pub fn frame_sync(&self) -> FrameSync {
        self.options.frame_sync
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        self.device.adapter_info()
    }

    /// 描述符堆统计
    pub fn heap_stats(&self, heap_type: DescriptorHeapType) -> DescriptorHeapStats {
        self.heaps.stats(heap_type)
    }

    /// 最近一次失败操作的描述
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// 是否出现过设备移除或栅栏等待超时
    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    fn record<T>(&mut self, operation: &'static str, result: DriverResult<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(e) => {
                warn!(operation, error = %e, "Render environment operation failed");
                self.last_error = Some(format!("{}: {}", operation, e));
                self.device_lost |= e.is_device_lost();
                Err(e.into())
            }
        }
    }
}

impl<D: GraphicsDriver> Drop for RenderEnvironment<D> {
    fn drop(&mut self) {
        // 设备已丢失时再等一次只会再超时一次
        if self.device_lost {
            warn!("Device lost, releasing without waiting for the GPU");
        } else if let Err(e) = self.commands.wait_for_idle(&self.driver) {
            warn!(error = %e, "GPU did not become idle before teardown");
        }
        info!(frames = self.frame_index, "Render environment destroyed");
    }
}
