//! 交换链与帧缓冲
//!
//! 双缓冲、R8G8B8A8_UNORM、翻转丢弃模型，禁用 Alt+Enter 全屏切换。
//!
//! # 视图生命周期
//!
//! 交换链创建或 resize 之后，所有帧缓冲都会重建：
//! 重新获取后台缓冲资源，在交换链专用的 RTV 堆中重新分配视图。
//! 每次重建都会递增视图代数（epoch），旧的帧缓冲句柄据此失效。

use tracing::{debug, info};

use crate::core::error::GraphicsError;
use crate::gfx::backend::{
    DriverResult, GraphicsDriver, PixelFormat, PresentMode, ResourceState, SwapChainDesc,
};
use crate::gfx::dx12::descriptor::DescriptorHeapPool;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType};
use crate::renderer::sync::FenceValue;

/// 后台缓冲数量
pub const SWAP_CHAIN_BUFFER_COUNT: u32 = 2;

/// 后台缓冲格式
pub const SWAP_CHAIN_FORMAT: PixelFormat = PixelFormat::R8G8B8A8Unorm;

/// 把请求的尺寸限制为至少 1x1
pub fn clamp_extent(width: u32, height: u32) -> (u32, u32) {
    (width.max(1), height.max(1))
}

/// 帧缓冲：一个后台缓冲及其渲染目标视图
pub struct FrameBuffer<D: GraphicsDriver> {
    resource: Option<D::Resource>,
    buffer_index: u32,
    heap_index: u32,
    rtv_index: u32,
    rtv: CpuDescriptorHandle,
    fence_value: FenceValue,
    state: ResourceState,
}

impl<D: GraphicsDriver> FrameBuffer<D> {
    /// 后台缓冲资源
    pub fn resource(&self) -> Option<&D::Resource> {
        self.resource.as_ref()
    }

    pub fn buffer_index(&self) -> u32 {
        self.buffer_index
    }

    /// 视图所在描述符堆的序号
    pub fn heap_index(&self) -> u32 {
        self.heap_index
    }

    /// 视图在堆内的槽位
    pub fn rtv_index(&self) -> u32 {
        self.rtv_index
    }

    pub fn rtv(&self) -> CpuDescriptorHandle {
        self.rtv
    }

    /// 最后一次使用该缓冲时 signal 的栅栏值
    pub fn fence_value(&self) -> FenceValue {
        self.fence_value
    }

    pub fn set_fence_value(&mut self, value: FenceValue) {
        self.fence_value = value;
    }

    /// 当前资源状态
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// 在命令列表中记录状态转换
    ///
    /// 已经处于目标状态时不记录屏障，返回 false。
    pub fn transition(&mut self, driver: &D, list: &D::CommandList, after: ResourceState) -> bool {
        if self.state == after {
            return false;
        }
        let Some(resource) = self.resource.as_ref() else {
            return false;
        };
        driver.resource_barrier(list, resource, self.state, after);
        self.state = after;
        true
    }
}

/// 交换链
///
/// 帧缓冲字段在原生交换链之前声明，保证缓冲引用先于交换链释放。
pub struct SwapChain<D: GraphicsDriver> {
    buffers: Vec<FrameBuffer<D>>,
    swap_chain: D::SwapChain,
    desc: SwapChainDesc,
    current: u32,
    rtv_heap: Option<u32>,
    epoch: u32,
}

impl<D: GraphicsDriver> SwapChain<D> {
    /// 为窗口创建交换链，此时还没有视图
    pub fn create(
        driver: &D,
        factory: &D::Factory,
        queue: &D::Queue,
        window: &D::Window,
        width: u32,
        height: u32,
    ) -> DriverResult<Self> {
        let (width, height) = clamp_extent(width, height);
        let desc = SwapChainDesc {
            width,
            height,
            buffer_count: SWAP_CHAIN_BUFFER_COUNT,
            format: SWAP_CHAIN_FORMAT,
            present_mode: PresentMode::FlipDiscard,
            allow_alt_enter: false,
        };
        let swap_chain = driver.create_swap_chain(factory, queue, window, &desc)?;
        let current = driver.current_back_buffer_index(&swap_chain);

        info!(
            width,
            height,
            buffers = SWAP_CHAIN_BUFFER_COUNT,
            "Swap chain created"
        );

        Ok(Self {
            buffers: Vec::with_capacity(SWAP_CHAIN_BUFFER_COUNT as usize),
            swap_chain,
            desc,
            current,
            rtv_heap: None,
            epoch: 0,
        })
    }

    /// 为每个后台缓冲创建渲染目标视图
    ///
    /// 第一次调用时创建一个容量恰好等于缓冲数量的 RTV 堆，
    /// 之后的调用复用该堆，只把游标拨回堆首。
    pub fn create_views(
        &mut self,
        driver: &D,
        device: &D::Device,
        heaps: &mut DescriptorHeapPool<D>,
    ) -> DriverResult<()> {
        let heap_index = match self.rtv_heap {
            Some(index) => {
                heaps.reset_heap(DescriptorHeapType::Rtv, index)?;
                index
            }
            None => {
                let index = heaps.create_heap(
                    driver,
                    device,
                    DescriptorHeapType::Rtv,
                    self.desc.buffer_count,
                    false,
                )?;
                self.rtv_heap = Some(index);
                index
            }
        };

        self.buffers.clear();
        for buffer_index in 0..self.desc.buffer_count {
            let resource = driver.swap_chain_buffer(&self.swap_chain, buffer_index)?;
            let slot =
                heaps.allocate_render_target_view(driver, device, heap_index, &resource)?;

            self.buffers.push(FrameBuffer {
                resource: Some(resource),
                buffer_index,
                heap_index,
                rtv_index: slot.index,
                rtv: slot.cpu,
                fence_value: FenceValue::ZERO,
                state: ResourceState::Present,
            });
        }

        self.current = driver.current_back_buffer_index(&self.swap_chain);
        debug!(
            heap_index,
            buffers = self.buffers.len(),
            epoch = self.epoch,
            "Swap chain views created"
        );
        Ok(())
    }

    /// 调整后台缓冲尺寸
    ///
    /// 尺寸被限制为至少 1x1；与当前尺寸相同时什么也不做并返回 false。
    /// 调用方必须保证 GPU 已经空闲且当前没有正在记录的帧。
    pub fn resize(
        &mut self,
        driver: &D,
        device: &D::Device,
        heaps: &mut DescriptorHeapPool<D>,
        width: u32,
        height: u32,
    ) -> DriverResult<bool> {
        let (width, height) = clamp_extent(width, height);
        if width == self.desc.width && height == self.desc.height {
            return Ok(false);
        }

        // 先释放全部缓冲引用，否则底层 resize 会失败
        self.buffers.clear();

        let desc = SwapChainDesc {
            width,
            height,
            ..self.desc
        };
        driver.resize_buffers(&self.swap_chain, &desc)?;
        self.desc = desc;
        self.epoch = self.epoch.wrapping_add(1);

        self.create_views(driver, device, heaps)?;
        Ok(true)
    }

    /// 从交换链查询当前后台缓冲序号
    pub fn acquire(&mut self, driver: &D) -> u32 {
        self.current = driver.current_back_buffer_index(&self.swap_chain);
        self.current
    }

    /// 呈现
    pub fn present(&self, driver: &D, sync_interval: u32) -> DriverResult<()> {
        driver.present(&self.swap_chain, sync_interval)
    }

    /// 最近一次查询到的后台缓冲序号
    pub fn current_index(&self) -> u32 {
        self.current
    }

    /// 下一次 acquire 将得到的后台缓冲序号
    pub fn peek_index(&self, driver: &D) -> u32 {
        driver.current_back_buffer_index(&self.swap_chain)
    }

    pub fn buffer(&self, index: u32) -> Option<&FrameBuffer<D>> {
        self.buffers.get(index as usize)
    }

    pub fn buffer_mut(&mut self, index: u32) -> Option<&mut FrameBuffer<D>> {
        self.buffers.get_mut(index as usize)
    }

    /// 当前后台缓冲
    pub fn current_buffer_mut(&mut self) -> DriverResult<&mut FrameBuffer<D>> {
        let current = self.current;
        self.buffers.get_mut(current as usize).ok_or_else(|| {
            GraphicsError::SwapChain(format!("back buffer {} has no view", current))
        })
    }

    pub fn buffers(&self) -> &[FrameBuffer<D>] {
        &self.buffers
    }

    pub fn buffer_count(&self) -> u32 {
        self.desc.buffer_count
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn desc(&self) -> &SwapChainDesc {
        &self.desc
    }

    /// 视图代数
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// 交换链专用 RTV 堆的序号
    pub fn rtv_heap_index(&self) -> Option<u32> {
        self.rtv_heap
    }

    pub fn raw(&self) -> &D::SwapChain {
        &self.swap_chain
    }
}
