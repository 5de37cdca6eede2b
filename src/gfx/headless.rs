//! 模拟图形驱动
//!
//! 不依赖任何 GPU 或窗口系统、行为确定的 [`GraphicsDriver`] 实现。
//! 用于测试，以及在非 Windows 主机上运行渲染循环。
//!
//! 除了模拟 DXGI / D3D12 的基本语义（命令列表必须关闭后才能重置、
//! 仍有缓冲引用时不能 resize、present 推进后台缓冲序号），它还提供：
//!
//! - 存活对象计数：每个原生对象析构时计数减一，用于检查泄漏
//! - 故障注入：让任意一步创建、提交或呈现失败
//! - GPU 挂起：signal 之后栅栏不再前进，等待会超时
//!
//! 驱动内部状态通过 `Rc` 共享，克隆出来的驱动观察到的是同一个模拟 GPU。

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::core::error::GraphicsError;
use crate::gfx::backend::{
    AdapterInfo, DriverResult, FeatureLevel, GraphicsDriver, ResourceState, SwapChainDesc,
    WindowDesc,
};
use crate::renderer::backend_trait::WindowEvent;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};
use crate::renderer::sync::WaitStatus;

/// 每个模拟描述符堆占用的地址空间
const HEAP_ADDRESS_SPAN: usize = 0x1_0000;
/// 着色器可见堆的 GPU 地址基址
const GPU_ADDRESS_BASE: u64 = 0x8000_0000;

/// 故障注入点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateWindow,
    CreateFactory,
    CreateDevice,
    CreateCommandQueue,
    CreateSwapChain,
    CreateDescriptorHeap,
    GetSwapChainBuffer,
    CreateCommandAllocator,
    CreateCommandList,
    CreateFence,
    CreateFenceEvent,
    ResetCommandAllocator,
    CloseCommandList,
    Signal,
    /// present 失败并移除设备
    Present,
    /// present 失败但设备仍然可用
    PresentInvalidCall,
    ResizeBuffers,
}

/// 模拟适配器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedAdapter {
    pub name: String,
    pub is_software: bool,
    /// 支持的最高功能级别
    pub feature_level: FeatureLevel,
    pub dedicated_video_memory: u64,
}

impl SimulatedAdapter {
    /// 支持 12_1 的硬件适配器，4 GiB 显存
    pub fn hardware(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_software: false,
            feature_level: FeatureLevel::Level12_1,
            dedicated_video_memory: 4 << 30,
        }
    }

    /// 软件适配器（类似 WARP）
    pub fn software(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_software: true,
            feature_level: FeatureLevel::Level12_1,
            dedicated_video_memory: 0,
        }
    }

    pub fn with_feature_level(mut self, level: FeatureLevel) -> Self {
        self.feature_level = level;
        self
    }

    pub fn with_video_memory(mut self, bytes: u64) -> Self {
        self.dedicated_video_memory = bytes;
        self
    }
}

/// 已执行的命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordedCommand {
    Barrier {
        buffer: u32,
        before: ResourceState,
        after: ResourceState,
    },
    Clear {
        view: CpuDescriptorHandle,
        color: [f32; 4],
    },
}

/// 窗口注册信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRegistration {
    pub title: String,
    pub class_name: String,
    pub width: u32,
    pub height: u32,
}

struct State {
    adapters: Vec<SimulatedAdapter>,
    fail_points: HashSet<FailPoint>,
    gpu_hung: bool,
    removed_reason: Option<String>,
    next_heap_base: usize,
    pending_events: VecDeque<WindowEvent>,
    executed: Vec<RecordedCommand>,
    registrations: Vec<WindowRegistration>,
    presents: u64,
    views_written: u64,
    fence_waits: u64,
}

struct Shared {
    live_objects: Cell<usize>,
    live_windows: Cell<usize>,
    state: RefCell<State>,
}

/// 存活计数守卫，析构时只修改 `Cell`，不借用 `state`
struct Tracked {
    shared: Rc<Shared>,
    window: bool,
}

impl Tracked {
    fn new(shared: &Rc<Shared>, window: bool) -> Self {
        shared.live_objects.set(shared.live_objects.get() + 1);
        if window {
            shared.live_windows.set(shared.live_windows.get() + 1);
        }
        Self {
            shared: Rc::clone(shared),
            window,
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        let shared = &self.shared;
        shared.live_objects.set(shared.live_objects.get().saturating_sub(1));
        if self.window {
            shared.live_windows.set(shared.live_windows.get().saturating_sub(1));
        }
    }
}

pub struct HeadlessWindow {
    _tracked: Tracked,
    visible: Cell<bool>,
}

pub struct HeadlessFactory {
    _tracked: Tracked,
}

pub struct HeadlessAdapter {
    _tracked: Tracked,
    feature_level: FeatureLevel,
}

pub struct HeadlessDevice {
    _tracked: Tracked,
}

pub struct HeadlessQueue {
    _tracked: Tracked,
}

pub struct HeadlessAllocator {
    _tracked: Tracked,
}

pub struct HeadlessCommandList {
    _tracked: Tracked,
    open: Cell<bool>,
    commands: RefCell<Vec<RecordedCommand>>,
}

pub struct HeadlessFence {
    _tracked: Tracked,
    completed: Cell<u64>,
    signaled: Cell<u64>,
}

pub struct HeadlessEvent {
    _tracked: Tracked,
}

struct SimulatedImage {
    index: u32,
}

pub struct HeadlessSwapChain {
    _tracked: Tracked,
    images: RefCell<Vec<Rc<SimulatedImage>>>,
    current: Cell<u32>,
    desc: Cell<SwapChainDesc>,
}

impl HeadlessSwapChain {
    /// 当前后台缓冲尺寸
    pub fn size(&self) -> (u32, u32) {
        let desc = self.desc.get();
        (desc.width, desc.height)
    }
}

pub struct HeadlessResource {
    _tracked: Tracked,
    image: Rc<SimulatedImage>,
}

pub struct HeadlessDescriptorHeap {
    _tracked: Tracked,
    cpu_start: usize,
    gpu_start: Option<u64>,
}

/// 模拟图形驱动
#[derive(Clone)]
pub struct HeadlessDriver {
    shared: Rc<Shared>,
}

impl HeadlessDriver {
    /// 创建带一个硬件适配器的模拟驱动
    pub fn new() -> Self {
        Self::with_adapters(vec![SimulatedAdapter::hardware("Headless Adapter")])
    }

    /// 使用指定的适配器列表（按枚举顺序）
    pub fn with_adapters(adapters: Vec<SimulatedAdapter>) -> Self {
        Self {
            shared: Rc::new(Shared {
                live_objects: Cell::new(0),
                live_windows: Cell::new(0),
                state: RefCell::new(State {
                    adapters,
                    fail_points: HashSet::new(),
                    gpu_hung: false,
                    removed_reason: None,
                    next_heap_base: HEAP_ADDRESS_SPAN,
                    pending_events: VecDeque::new(),
                    executed: Vec::new(),
                    registrations: Vec::new(),
                    presents: 0,
                    views_written: 0,
                    fence_waits: 0,
                }),
            }),
        }
    }

    /// 让指定步骤在之后的每次调用中失败
    pub fn fail_at(&self, point: FailPoint) {
        self.shared.state.borrow_mut().fail_points.insert(point);
    }

    /// 取消所有故障注入
    pub fn clear_failures(&self) {
        self.shared.state.borrow_mut().fail_points.clear();
    }

    /// 模拟 GPU 挂起：signal 之后栅栏不再前进
    pub fn set_gpu_hung(&self, hung: bool) {
        self.shared.state.borrow_mut().gpu_hung = hung;
    }

    /// 模拟设备移除，之后的 present 都会失败
    pub fn remove_device(&self, reason: &str) {
        self.shared.state.borrow_mut().removed_reason = Some(reason.to_string());
    }

    /// 向窗口事件队列追加事件
    pub fn queue_event(&self, event: WindowEvent) {
        self.shared.state.borrow_mut().pending_events.push_back(event);
    }

    /// 存活的原生对象数量（含窗口）
    pub fn live_objects(&self) -> usize {
        self.shared.live_objects.get()
    }

    /// 存活的窗口数量
    pub fn live_windows(&self) -> usize {
        self.shared.live_windows.get()
    }

    /// 已提交给队列执行的命令
    pub fn executed_commands(&self) -> Vec<RecordedCommand> {
        self.shared.state.borrow().executed.clone()
    }

    /// 清空已执行命令记录
    pub fn clear_executed(&self) {
        self.shared.state.borrow_mut().executed.clear();
    }

    /// 成功 present 的次数
    pub fn present_count(&self) -> u64 {
        self.shared.state.borrow().presents
    }

    /// 写入过的渲染目标视图数量
    pub fn views_written(&self) -> u64 {
        self.shared.state.borrow().views_written
    }

    /// 真正阻塞过的栅栏等待次数（目标值已完成的等待不计）
    pub fn fence_waits(&self) -> u64 {
        self.shared.state.borrow().fence_waits
    }

    /// 创建过的窗口
    pub fn window_registrations(&self) -> Vec<WindowRegistration> {
        self.shared.state.borrow().registrations.clone()
    }

    fn fails(&self, point: FailPoint) -> bool {
        self.shared.state.borrow().fail_points.contains(&point)
    }

    fn track(&self) -> Tracked {
        Tracked::new(&self.shared, false)
    }

    fn simulated(point: FailPoint) -> String {
        format!("simulated failure at {:?}", point)
    }
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsDriver for HeadlessDriver {
    type Window = HeadlessWindow;
    type Factory = HeadlessFactory;
    type Adapter = HeadlessAdapter;
    type Device = HeadlessDevice;
    type Queue = HeadlessQueue;
    type Allocator = HeadlessAllocator;
    type CommandList = HeadlessCommandList;
    type Fence = HeadlessFence;
    type Event = HeadlessEvent;
    type SwapChain = HeadlessSwapChain;
    type Resource = HeadlessResource;
    type DescriptorHeap = HeadlessDescriptorHeap;

    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_window(&self, desc: &WindowDesc<'_>) -> DriverResult<HeadlessWindow> {
        if self.fails(FailPoint::CreateWindow) {
            return Err(GraphicsError::ResourceCreation(Self::simulated(
                FailPoint::CreateWindow,
            )));
        }
        self.shared
            .state
            .borrow_mut()
            .registrations
            .push(WindowRegistration {
                title: desc.title.to_string(),
                class_name: desc.class_name.to_string(),
                width: desc.width,
                height: desc.height,
            });
        debug!(title = desc.title, class = desc.class_name, "Headless window created");
        Ok(HeadlessWindow {
            _tracked: Tracked::new(&self.shared, true),
            visible: Cell::new(false),
        })
    }

    fn set_window_visible(&self, window: &HeadlessWindow, visible: bool) {
        window.visible.set(visible);
    }

    fn is_window_visible(&self, window: &HeadlessWindow) -> bool {
        window.visible.get()
    }

    fn poll_events(&self, _window: &HeadlessWindow) -> Vec<WindowEvent> {
        self.shared.state.borrow_mut().pending_events.drain(..).collect()
    }

    fn create_factory(&self, _debug: bool) -> DriverResult<HeadlessFactory> {
        if self.fails(FailPoint::CreateFactory) {
            return Err(GraphicsError::DeviceCreation(Self::simulated(
                FailPoint::CreateFactory,
            )));
        }
        Ok(HeadlessFactory {
            _tracked: self.track(),
        })
    }

    fn enum_adapter(
        &self,
        _factory: &HeadlessFactory,
        index: u32,
    ) -> Option<(HeadlessAdapter, AdapterInfo)> {
        let adapter = self
            .shared
            .state
            .borrow()
            .adapters
            .get(index as usize)
            .cloned()?;
        let info = AdapterInfo {
            index,
            name: adapter.name,
            is_software: adapter.is_software,
            dedicated_video_memory: adapter.dedicated_video_memory,
        };
        Some((
            HeadlessAdapter {
                _tracked: self.track(),
                feature_level: adapter.feature_level,
            },
            info,
        ))
    }

    fn supports_feature_level(&self, adapter: &HeadlessAdapter, level: FeatureLevel) -> bool {
        adapter.feature_level >= level
    }

    fn create_device(
        &self,
        adapter: &HeadlessAdapter,
        level: FeatureLevel,
    ) -> DriverResult<HeadlessDevice> {
        if self.fails(FailPoint::CreateDevice) {
            return Err(GraphicsError::DeviceCreation(Self::simulated(
                FailPoint::CreateDevice,
            )));
        }
        if adapter.feature_level < level {
            return Err(GraphicsError::DeviceCreation(format!(
                "adapter does not support feature level {}",
                level.name()
            )));
        }
        Ok(HeadlessDevice {
            _tracked: self.track(),
        })
    }

    fn device_removed_reason(&self, _device: &HeadlessDevice) -> Option<String> {
        self.shared.state.borrow().removed_reason.clone()
    }

    fn create_descriptor_heap(
        &self,
        _device: &HeadlessDevice,
        heap_type: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> DriverResult<HeadlessDescriptorHeap> {
        if self.fails(FailPoint::CreateDescriptorHeap) {
            return Err(GraphicsError::ResourceCreation(Self::simulated(
                FailPoint::CreateDescriptorHeap,
            )));
        }
        let mut state = self.shared.state.borrow_mut();
        let cpu_start = state.next_heap_base;
        state.next_heap_base += HEAP_ADDRESS_SPAN;
        trace!(heap_type = heap_type.name(), capacity, cpu_start, "Headless heap created");
        Ok(HeadlessDescriptorHeap {
            _tracked: Tracked::new(&self.shared, false),
            cpu_start,
            gpu_start: shader_visible.then_some(GPU_ADDRESS_BASE + cpu_start as u64),
        })
    }

    fn descriptor_increment_size(
        &self,
        _device: &HeadlessDevice,
        heap_type: DescriptorHeapType,
    ) -> u32 {
        match heap_type {
            DescriptorHeapType::CbvSrvUav => 64,
            DescriptorHeapType::Sampler => 32,
            DescriptorHeapType::Rtv => 32,
            DescriptorHeapType::Dsv => 8,
        }
    }

    fn heap_cpu_start(&self, heap: &HeadlessDescriptorHeap) -> CpuDescriptorHandle {
        CpuDescriptorHandle::new(heap.cpu_start)
    }

    fn heap_gpu_start(&self, heap: &HeadlessDescriptorHeap) -> Option<GpuDescriptorHandle> {
        heap.gpu_start.map(GpuDescriptorHandle::new)
    }

    fn create_render_target_view(
        &self,
        _device: &HeadlessDevice,
        _resource: &HeadlessResource,
        _dest: CpuDescriptorHandle,
    ) {
        self.shared.state.borrow_mut().views_written += 1;
    }

    fn create_command_queue(&self, _device: &HeadlessDevice) -> DriverResult<HeadlessQueue> {
        if self.fails(FailPoint::CreateCommandQueue) {
            return Err(GraphicsError::ResourceCreation(Self::simulated(
                FailPoint::CreateCommandQueue,
            )));
        }
        Ok(HeadlessQueue {
            _tracked: self.track(),
        })
    }

    fn create_command_allocator(
        &self,
        _device: &HeadlessDevice,
    ) -> DriverResult<HeadlessAllocator> {
        if self.fails(FailPoint::CreateCommandAllocator) {
            return Err(GraphicsError::ResourceCreation(Self::simulated(
                FailPoint::CreateCommandAllocator,
            )));
        }
        Ok(HeadlessAllocator {
            _tracked: self.track(),
        })
    }

    fn create_command_list(
        &self,
        _device: &HeadlessDevice,
        _allocator: &HeadlessAllocator,
    ) -> DriverResult<HeadlessCommandList> {
        if self.fails(FailPoint::CreateCommandList) {
            return Err(GraphicsError::ResourceCreation(Self::simulated(
                FailPoint::CreateCommandList,
            )));
        }
        Ok(HeadlessCommandList {
            _tracked: self.track(),
            open: Cell::new(true),
            commands: RefCell::new(Vec::new()),
        })
    }

    fn reset_command_allocator(&self, _allocator: &HeadlessAllocator) -> DriverResult<()> {
        if self.fails(FailPoint::ResetCommandAllocator) {
            return Err(GraphicsError::CommandExecution(Self::simulated(
                FailPoint::ResetCommandAllocator,
            )));
        }
        Ok(())
    }

    fn reset_command_list(
        &self,
        list: &HeadlessCommandList,
        _allocator: &HeadlessAllocator,
    ) -> DriverResult<()> {
        if list.open.get() {
            return Err(GraphicsError::CommandExecution(
                "command list reset while still recording".to_string(),
            ));
        }
        list.commands.borrow_mut().clear();
        list.open.set(true);
        Ok(())
    }

    fn close_command_list(&self, list: &HeadlessCommandList) -> DriverResult<()> {
        if self.fails(FailPoint::CloseCommandList) {
            return Err(GraphicsError::CommandExecution(Self::simulated(
                FailPoint::CloseCommandList,
            )));
        }
        if !list.open.get() {
            return Err(GraphicsError::CommandExecution(
                "command list is already closed".to_string(),
            ));
        }
        list.open.set(false);
        Ok(())
    }

    fn resource_barrier(
        &self,
        list: &HeadlessCommandList,
        resource: &HeadlessResource,
        before: ResourceState,
        after: ResourceState,
    ) {
        if !list.open.get() {
            warn!("Barrier recorded into a closed command list was dropped");
            return;
        }
        list.commands.borrow_mut().push(RecordedCommand::Barrier {
            buffer: resource.image.index,
            before,
            after,
        });
    }

    fn clear_render_target(
        &self,
        list: &HeadlessCommandList,
        view: CpuDescriptorHandle,
        color: [f32; 4],
    ) {
        if !list.open.get() {
            warn!("Clear recorded into a closed command list was dropped");
            return;
        }
        list.commands
            .borrow_mut()
            .push(RecordedCommand::Clear { view, color });
    }

    fn execute_command_list(&self, _queue: &HeadlessQueue, list: &HeadlessCommandList) {
        if list.open.get() {
            warn!("Refusing to execute a command list that is still recording");
            return;
        }
        let commands = list.commands.borrow_mut().split_off(0);
        self.shared.state.borrow_mut().executed.extend(commands);
    }

    fn create_fence(&self, _device: &HeadlessDevice, initial: u64) -> DriverResult<HeadlessFence> {
        if self.fails(FailPoint::CreateFence) {
            return Err(GraphicsError::ResourceCreation(Self::simulated(
                FailPoint::CreateFence,
            )));
        }
        Ok(HeadlessFence {
            _tracked: self.track(),
            completed: Cell::new(initial),
            signaled: Cell::new(initial),
        })
    }

    fn create_fence_event(&self) -> DriverResult<HeadlessEvent> {
        if self.fails(FailPoint::CreateFenceEvent) {
            return Err(GraphicsError::ResourceCreation(Self::simulated(
                FailPoint::CreateFenceEvent,
            )));
        }
        Ok(HeadlessEvent {
            _tracked: self.track(),
        })
    }

    fn signal(&self, _queue: &HeadlessQueue, fence: &HeadlessFence, value: u64) -> DriverResult<()> {
        if self.fails(FailPoint::Signal) {
            return Err(GraphicsError::CommandExecution(Self::simulated(
                FailPoint::Signal,
            )));
        }
        fence.signaled.set(value);
        if !self.shared.state.borrow().gpu_hung {
            fence.completed.set(value);
        }
        Ok(())
    }

    fn completed_value(&self, fence: &HeadlessFence) -> u64 {
        fence.completed.get()
    }

    fn wait_for_fence(
        &self,
        fence: &HeadlessFence,
        value: u64,
        _event: &HeadlessEvent,
        timeout: Duration,
    ) -> DriverResult<WaitStatus> {
        if fence.completed.get() >= value {
            return Ok(WaitStatus::Signaled);
        }
        let mut state = self.shared.state.borrow_mut();
        state.fence_waits += 1;
        if state.gpu_hung || fence.signaled.get() < value {
            debug!(value, ?timeout, "Headless fence wait timed out");
            return Ok(WaitStatus::TimedOut);
        }
        // GPU 恢复后，已 signal 的工作立即完成
        fence.completed.set(fence.signaled.get());
        Ok(WaitStatus::Signaled)
    }

    fn create_swap_chain(
        &self,
        _factory: &HeadlessFactory,
        _queue: &HeadlessQueue,
        _window: &HeadlessWindow,
        desc: &SwapChainDesc,
    ) -> DriverResult<HeadlessSwapChain> {
        if self.fails(FailPoint::CreateSwapChain) {
            return Err(GraphicsError::SwapChain(Self::simulated(
                FailPoint::CreateSwapChain,
            )));
        }
        Ok(HeadlessSwapChain {
            _tracked: self.track(),
            images: RefCell::new(
                (0..desc.buffer_count)
                    .map(|index| Rc::new(SimulatedImage { index }))
                    .collect(),
            ),
            current: Cell::new(0),
            desc: Cell::new(*desc),
        })
    }

    fn swap_chain_buffer(
        &self,
        swap_chain: &HeadlessSwapChain,
        index: u32,
    ) -> DriverResult<HeadlessResource> {
        if self.fails(FailPoint::GetSwapChainBuffer) {
            return Err(GraphicsError::SwapChain(Self::simulated(
                FailPoint::GetSwapChainBuffer,
            )));
        }
        let image = swap_chain
            .images
            .borrow()
            .get(index as usize)
            .cloned()
            .ok_or_else(|| GraphicsError::SwapChain(format!("no back buffer {}", index)))?;
        Ok(HeadlessResource {
            _tracked: self.track(),
            image,
        })
    }

    fn current_back_buffer_index(&self, swap_chain: &HeadlessSwapChain) -> u32 {
        swap_chain.current.get()
    }

    fn resize_buffers(&self, swap_chain: &HeadlessSwapChain, desc: &SwapChainDesc) -> DriverResult<()> {
        if self.fails(FailPoint::ResizeBuffers) {
            return Err(GraphicsError::SwapChain(Self::simulated(
                FailPoint::ResizeBuffers,
            )));
        }
        let mut images = swap_chain.images.borrow_mut();
        if images.iter().any(|image| Rc::strong_count(image) > 1) {
            return Err(GraphicsError::SwapChain(
                "cannot resize while back buffer references are outstanding".to_string(),
            ));
        }
        let format = swap_chain.desc.get().format;
        *images = (0..desc.buffer_count)
            .map(|index| Rc::new(SimulatedImage { index }))
            .collect();
        swap_chain.desc.set(SwapChainDesc { format, ..*desc });
        swap_chain.current.set(0);
        Ok(())
    }

    fn present(&self, swap_chain: &HeadlessSwapChain, _sync_interval: u32) -> DriverResult<()> {
        let mut state = self.shared.state.borrow_mut();
        if state.fail_points.contains(&FailPoint::Present) && state.removed_reason.is_none() {
            state.removed_reason = Some("DXGI_ERROR_DEVICE_HUNG (simulated)".to_string());
        }
        if state.removed_reason.is_some() {
            return Err(GraphicsError::SwapChain("Present failed".to_string()));
        }
        if state.fail_points.contains(&FailPoint::PresentInvalidCall) {
            return Err(GraphicsError::SwapChain(
                "DXGI_ERROR_INVALID_CALL (simulated)".to_string(),
            ));
        }
        state.presents += 1;

        let count = swap_chain.desc.get().buffer_count.max(1);
        swap_chain.current.set((swap_chain.current.get() + 1) % count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::{PixelFormat, PresentMode};

    fn window_desc() -> WindowDesc<'static> {
        WindowDesc {
            title: "Test",
            class_name: "TestClass",
            width: 64,
            height: 32,
            instance: 0,
        }
    }

    fn swap_desc() -> SwapChainDesc {
        SwapChainDesc {
            width: 64,
            height: 32,
            buffer_count: 2,
            format: PixelFormat::R8G8B8A8Unorm,
            present_mode: PresentMode::FlipDiscard,
            allow_alt_enter: false,
        }
    }

    #[test]
    fn test_objects_are_counted_until_dropped() {
        let driver = HeadlessDriver::new();
        let window = driver.create_window(&window_desc()).unwrap();
        let factory = driver.create_factory(false).unwrap();
        assert_eq!(driver.live_objects(), 2);
        assert_eq!(driver.live_windows(), 1);

        drop(window);
        assert_eq!(driver.live_windows(), 0);
        drop(factory);
        assert_eq!(driver.live_objects(), 0);
    }

    #[test]
    fn test_fail_points() {
        let driver = HeadlessDriver::new();
        driver.fail_at(FailPoint::CreateFactory);
        assert!(driver.create_factory(false).is_err());
        driver.clear_failures();
        assert!(driver.create_factory(false).is_ok());
    }

    #[test]
    fn test_command_list_must_be_closed_before_reset() {
        let driver = HeadlessDriver::new();
        let factory = driver.create_factory(false).unwrap();
        let (adapter, _) = driver.enum_adapter(&factory, 0).unwrap();
        let device = driver.create_device(&adapter, FeatureLevel::Level12_1).unwrap();
        let allocator = driver.create_command_allocator(&device).unwrap();
        let list = driver.create_command_list(&device, &allocator).unwrap();

        assert!(driver.reset_command_list(&list, &allocator).is_err());
        driver.close_command_list(&list).unwrap();
        assert!(driver.close_command_list(&list).is_err());
        driver.reset_command_list(&list, &allocator).unwrap();
    }

    #[test]
    fn test_hung_gpu_times_out() {
        let driver = HeadlessDriver::new();
        let factory = driver.create_factory(false).unwrap();
        let (adapter, _) = driver.enum_adapter(&factory, 0).unwrap();
        let device = driver.create_device(&adapter, FeatureLevel::Level12_1).unwrap();
        let queue = driver.create_command_queue(&device).unwrap();
        let fence = driver.create_fence(&device, 0).unwrap();
        let event = driver.create_fence_event().unwrap();
        let timeout = Duration::from_millis(1);

        driver.set_gpu_hung(true);
        driver.signal(&queue, &fence, 1).unwrap();
        assert_eq!(driver.completed_value(&fence), 0);
        assert_eq!(
            driver.wait_for_fence(&fence, 1, &event, timeout).unwrap(),
            WaitStatus::TimedOut
        );

        driver.set_gpu_hung(false);
        assert_eq!(
            driver.wait_for_fence(&fence, 1, &event, timeout).unwrap(),
            WaitStatus::Signaled
        );
        assert_eq!(driver.completed_value(&fence), 1);
    }

    #[test]
    fn test_resize_requires_released_buffers() {
        let driver = HeadlessDriver::new();
        let window = driver.create_window(&window_desc()).unwrap();
        let factory = driver.create_factory(false).unwrap();
        let (adapter, _) = driver.enum_adapter(&factory, 0).unwrap();
        let device = driver.create_device(&adapter, FeatureLevel::Level12_1).unwrap();
        let queue = driver.create_command_queue(&device).unwrap();
        let swap_chain = driver
            .create_swap_chain(&factory, &queue, &window, &swap_desc())
            .unwrap();

        let buffer = driver.swap_chain_buffer(&swap_chain, 0).unwrap();
        let bigger = SwapChainDesc {
            width: 128,
            ..swap_desc()
        };
        assert!(driver.resize_buffers(&swap_chain, &bigger).is_err());

        drop(buffer);
        driver.resize_buffers(&swap_chain, &bigger).unwrap();
        assert_eq!(swap_chain.size(), (128, 32));
    }

    #[test]
    fn test_present_advances_back_buffer() {
        let driver = HeadlessDriver::new();
        let window = driver.create_window(&window_desc()).unwrap();
        let factory = driver.create_factory(false).unwrap();
        let (adapter, _) = driver.enum_adapter(&factory, 0).unwrap();
        let device = driver.create_device(&adapter, FeatureLevel::Level12_1).unwrap();
        let queue = driver.create_command_queue(&device).unwrap();
        let swap_chain = driver
            .create_swap_chain(&factory, &queue, &window, &swap_desc())
            .unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(driver.current_back_buffer_index(&swap_chain));
            driver.present(&swap_chain, 0).unwrap();
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
        assert_eq!(driver.present_count(), 4);

        driver.fail_at(FailPoint::Present);
        assert!(driver.present(&swap_chain, 0).is_err());
        assert!(driver.device_removed_reason(&device).is_some());
    }
}
