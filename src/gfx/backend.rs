//! 图形驱动的统一抽象接口
//!
//! 本模块定义了渲染环境所需的全部原生图形原语。渲染环境只通过
//! [`GraphicsDriver`] 调用窗口、DXGI 与 D3D12，具体实现有两个：
//!
//! - `dx12::native::NativeDriver`：Win32 + D3D12（仅 Windows）
//! - `headless::HeadlessDriver`：确定性的模拟驱动，用于测试与无 GPU 的主机
//!
//! 所有关联类型都在 `Drop` 时释放对应的原生对象，
//! 渲染环境因此可以依靠字段的析构顺序完成逆序释放。

use std::time::Duration;

use crate::core::error::GraphicsError;
use crate::renderer::backend_trait::WindowEvent;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};
use crate::renderer::sync::WaitStatus;

/// 驱动调用的返回类型
pub type DriverResult<T> = std::result::Result<T, GraphicsError>;

/// 窗口创建参数
#[derive(Debug, Clone, Copy)]
pub struct WindowDesc<'a> {
    pub title: &'a str,
    pub class_name: &'a str,
    pub width: u32,
    pub height: u32,
    /// 原生实例句柄，0 表示当前模块
    pub instance: usize,
}

/// 适配器信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// 枚举序号
    pub index: u32,
    /// 适配器名称
    pub name: String,
    /// 是否是软件（模拟）适配器
    pub is_software: bool,
    /// 专用显存（字节）
    pub dedicated_video_memory: u64,
}

/// 功能级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FeatureLevel {
    Level11_0,
    Level11_1,
    Level12_0,
    Level12_1,
}

impl FeatureLevel {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureLevel::Level11_0 => "11_0",
            FeatureLevel::Level11_1 => "11_1",
            FeatureLevel::Level12_0 => "12_0",
            FeatureLevel::Level12_1 => "12_1",
        }
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    R8G8B8A8Unorm,
}

/// 呈现模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentMode {
    /// 翻转模型，呈现后丢弃后台缓冲内容
    FlipDiscard,
}

/// 交换链创建参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub buffer_count: u32,
    pub format: PixelFormat,
    pub present_mode: PresentMode,
    /// 是否允许 Alt+Enter 切换全屏
    pub allow_alt_enter: bool,
}

/// 资源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// 可呈现
    Present,
    /// 渲染目标
    RenderTarget,
}

/// 原生图形原语
///
/// 方法都取 `&self`：驱动本身不持有可变状态，原生对象的状态由关联类型自己管理。
/// 实现必须可以廉价克隆，渲染环境会保存一份驱动副本用于析构前的等待。
pub trait GraphicsDriver: Clone + 'static {
    type Window;
    type Factory;
    type Adapter;
    type Device;
    type Queue;
    type Allocator;
    type CommandList;
    type Fence;
    type Event;
    type SwapChain;
    type Resource;
    type DescriptorHeap;

    /// 驱动名称，用于日志输出
    fn name(&self) -> &'static str;

    // ---- 窗口 ----

    fn create_window(&self, desc: &WindowDesc<'_>) -> DriverResult<Self::Window>;
    fn set_window_visible(&self, window: &Self::Window, visible: bool);
    fn is_window_visible(&self, window: &Self::Window) -> bool;
    /// 取出窗口过程积累的事件
    fn poll_events(&self, window: &Self::Window) -> Vec<WindowEvent>;

    // ---- 工厂与设备 ----

    fn create_factory(&self, debug: bool) -> DriverResult<Self::Factory>;
    /// 按序号枚举适配器，序号越界时返回 `None`
    fn enum_adapter(
        &self,
        factory: &Self::Factory,
        index: u32,
    ) -> Option<(Self::Adapter, AdapterInfo)>;
    /// 只探测适配器能否在给定功能级别创建设备，不真正创建
    fn supports_feature_level(&self, adapter: &Self::Adapter, level: FeatureLevel) -> bool;
    fn create_device(&self, adapter: &Self::Adapter, level: FeatureLevel)
        -> DriverResult<Self::Device>;
    /// 设备被移除时返回原因
    fn device_removed_reason(&self, device: &Self::Device) -> Option<String>;

    // ---- 描述符 ----

    fn create_descriptor_heap(
        &self,
        device: &Self::Device,
        heap_type: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> DriverResult<Self::DescriptorHeap>;
    fn descriptor_increment_size(&self, device: &Self::Device, heap_type: DescriptorHeapType)
        -> u32;
    fn heap_cpu_start(&self, heap: &Self::DescriptorHeap) -> CpuDescriptorHandle;
    fn heap_gpu_start(&self, heap: &Self::DescriptorHeap) -> Option<GpuDescriptorHandle>;
    fn create_render_target_view(
        &self,
        device: &Self::Device,
        resource: &Self::Resource,
        dest: CpuDescriptorHandle,
    );

    // ---- 命令 ----

    fn create_command_queue(&self, device: &Self::Device) -> DriverResult<Self::Queue>;
    fn create_command_allocator(&self, device: &Self::Device) -> DriverResult<Self::Allocator>;
    /// 新建的命令列表处于记录状态
    fn create_command_list(
        &self,
        device: &Self::Device,
        allocator: &Self::Allocator,
    ) -> DriverResult<Self::CommandList>;
    fn reset_command_allocator(&self, allocator: &Self::Allocator) -> DriverResult<()>;
    fn reset_command_list(
        &self,
        list: &Self::CommandList,
        allocator: &Self::Allocator,
    ) -> DriverResult<()>;
    fn close_command_list(&self, list: &Self::CommandList) -> DriverResult<()>;
    fn resource_barrier(
        &self,
        list: &Self::CommandList,
        resource: &Self::Resource,
        before: ResourceState,
        after: ResourceState,
    );
    fn clear_render_target(&self, list: &Self::CommandList, view: CpuDescriptorHandle, color: [f32; 4]);
    fn execute_command_list(&self, queue: &Self::Queue, list: &Self::CommandList);

    // ---- 同步 ----

    fn create_fence(&self, device: &Self::Device, initial: u64) -> DriverResult<Self::Fence>;
    fn create_fence_event(&self) -> DriverResult<Self::Event>;
    fn signal(&self, queue: &Self::Queue, fence: &Self::Fence, value: u64) -> DriverResult<()>;
    fn completed_value(&self, fence: &Self::Fence) -> u64;
    /// 等待栅栏到达 `value`，最多阻塞 `timeout`
    fn wait_for_fence(
        &self,
        fence: &Self::Fence,
        value: u64,
        event: &Self::Event,
        timeout: Duration,
    ) -> DriverResult<WaitStatus>;

    // ---- 交换链 ----

    fn create_swap_chain(
        &self,
        factory: &Self::Factory,
        queue: &Self::Queue,
        window: &Self::Window,
        desc: &SwapChainDesc,
    ) -> DriverResult<Self::SwapChain>;
    fn swap_chain_buffer(&self, swap_chain: &Self::SwapChain, index: u32)
        -> DriverResult<Self::Resource>;
    fn current_back_buffer_index(&self, swap_chain: &Self::SwapChain) -> u32;
    /// 调整后台缓冲尺寸，保留原有格式；调用前必须释放所有缓冲引用
    fn resize_buffers(&self, swap_chain: &Self::SwapChain, desc: &SwapChainDesc)
        -> DriverResult<()>;
    fn present(&self, swap_chain: &Self::SwapChain, sync_interval: u32) -> DriverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_level_ordering() {
        assert!(FeatureLevel::Level12_1 > FeatureLevel::Level12_0);
        assert!(FeatureLevel::Level11_0 < FeatureLevel::Level11_1);
        assert_eq!(FeatureLevel::Level12_1.name(), "12_1");
    }
}
