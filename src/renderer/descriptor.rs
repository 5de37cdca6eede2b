//! 描述符管理模块
//!
//! 提供与具体图形 API 无关的描述符堆类型、句柄和线性（bump）分配器。
//! 原生堆对象由 `gfx::dx12::descriptor` 持有，这里只负责槽位记账。
//!
//! # 描述符堆类型
//!
//! - **RTV** (Render Target View)：渲染目标视图
//! - **DSV** (Depth Stencil View)：深度模板视图
//! - **CBV/SRV/UAV**：常量缓冲 / 着色资源 / 无序访问视图
//! - **Sampler**：采样器
//!
//! # 分配策略
//!
//! 每个堆容量固定，分配时游标前进一个步长（stride），
//! 堆满后分配失败，不会自动扩容，也不会溢出到新的堆。

use crate::core::error::GraphicsError;

/// 描述符堆类型数量
pub const NUM_HEAP_TYPES: usize = 4;

/// 描述符堆类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// 常量缓冲 / 着色资源 / 无序访问视图
    CbvSrvUav,
    /// 采样器
    Sampler,
    /// 渲染目标视图
    Rtv,
    /// 深度模板视图
    Dsv,
}

impl DescriptorHeapType {
    /// 全部堆类型
    pub const ALL: [DescriptorHeapType; NUM_HEAP_TYPES] = [
        DescriptorHeapType::CbvSrvUav,
        DescriptorHeapType::Sampler,
        DescriptorHeapType::Rtv,
        DescriptorHeapType::Dsv,
    ];

    /// 在堆池中的下标
    pub fn index(&self) -> usize {
        match self {
            DescriptorHeapType::CbvSrvUav => 0,
            DescriptorHeapType::Sampler => 1,
            DescriptorHeapType::Rtv => 2,
            DescriptorHeapType::Dsv => 3,
        }
    }

    /// 该类型的堆能否对着色器可见（RTV / DSV 只能是 CPU 可见）
    pub fn can_be_shader_visible(&self) -> bool {
        matches!(
            self,
            DescriptorHeapType::CbvSrvUav | DescriptorHeapType::Sampler
        )
    }

    /// 获取类型名称
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorHeapType::CbvSrvUav => "CBV/SRV/UAV",
            DescriptorHeapType::Sampler => "Sampler",
            DescriptorHeapType::Rtv => "RTV",
            DescriptorHeapType::Dsv => "DSV",
        }
    }
}

/// 描述符句柄（CPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: usize,
}

impl CpuDescriptorHandle {
    /// 创建新的 CPU 描述符句柄
    pub fn new(ptr: usize) -> Self {
        Self { ptr }
    }

    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + count as usize * increment_size as usize,
        }
    }
}

/// 描述符句柄（GPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: u64,
}

impl GpuDescriptorHandle {
    /// 创建新的 GPU 描述符句柄
    pub fn new(ptr: u64) -> Self {
        Self { ptr }
    }

    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + u64::from(count) * u64::from(increment_size),
        }
    }
}

/// 一次分配得到的槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSlot {
    /// 槽位在堆内的序号
    pub index: u32,
    /// CPU 句柄
    pub cpu: CpuDescriptorHandle,
    /// GPU 句柄（仅着色器可见的堆）
    pub gpu: Option<GpuDescriptorHandle>,
}

/// 描述符分配器
///
/// 单个固定容量堆的线性分配状态。
/// 不变式：`len <= capacity`，CPU 游标始终等于 `cpu_start + len * stride`。
#[derive(Debug, Clone)]
pub struct DescriptorAllocator {
    /// 描述符类型
    heap_type: DescriptorHeapType,
    /// CPU 句柄基址
    cpu_start: CpuDescriptorHandle,
    /// 下一个空闲槽位的 CPU 句柄
    cpu_current: CpuDescriptorHandle,
    /// GPU 句柄基址
    gpu_start: Option<GpuDescriptorHandle>,
    /// 下一个空闲槽位的 GPU 句柄
    gpu_current: Option<GpuDescriptorHandle>,
    /// 已分配数量
    len: u32,
    /// 最大容量
    capacity: u32,
    /// 描述符增量大小
    stride: u32,
}

impl DescriptorAllocator {
    /// 创建新的描述符分配器
    pub fn new(
        heap_type: DescriptorHeapType,
        capacity: u32,
        stride: u32,
        cpu_start: CpuDescriptorHandle,
        gpu_start: Option<GpuDescriptorHandle>,
    ) -> Self {
        Self {
            heap_type,
            cpu_start,
            cpu_current: cpu_start,
            gpu_start,
            gpu_current: gpu_start,
            len: 0,
            capacity,
            stride,
        }
    }

    /// 分配下一个槽位
    ///
    /// 堆已满时返回 `DescriptorHeapExhausted`，游标保持不动。
    pub fn allocate(&mut self) -> Result<DescriptorSlot, GraphicsError> {
        if self.is_full() {
            return Err(GraphicsError::DescriptorHeapExhausted {
                heap_type: self.heap_type,
                capacity: self.capacity,
            });
        }

        let slot = DescriptorSlot {
            index: self.len,
            cpu: self.cpu_current,
            gpu: self.gpu_current,
        };

        self.cpu_current = self.cpu_current.offset(1, self.stride);
        self.gpu_current = self.gpu_current.map(|g| g.offset(1, self.stride));
        self.len += 1;

        Ok(slot)
    }

    /// 游标回到堆首，旧槽位随后被覆盖
    pub fn reset(&mut self) {
        self.cpu_current = self.cpu_start;
        self.gpu_current = self.gpu_start;
        self.len = 0;
    }

    /// 获取指定序号的 CPU 句柄
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptorHandle {
        self.cpu_start.offset(index, self.stride)
    }

    /// 获取指定序号的 GPU 句柄
    pub fn gpu_handle(&self, index: u32) -> Option<GpuDescriptorHandle> {
        self.gpu_start.map(|g| g.offset(index, self.stride))
    }

    /// 描述符类型
    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    /// 已分配数量
    pub fn len(&self) -> u32 {
        self.len
    }

    /// 是否尚未分配
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 最大容量
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 是否已满
    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    /// 描述符增量大小
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// CPU 句柄基址
    pub fn cpu_start(&self) -> CpuDescriptorHandle {
        self.cpu_start
    }

    /// GPU 句柄基址
    pub fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        self.gpu_start
    }
}

/// 描述符堆统计信息
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorHeapStats {
    /// 描述符类型
    pub heap_type: DescriptorHeapType,
    /// 堆数量
    pub heaps: usize,
    /// 总容量
    pub capacity: u32,
    /// 已使用数量
    pub used: u32,
    /// 可用数量
    pub available: u32,
    /// 使用率 (0.0 - 1.0)
    pub usage_ratio: f32,
}

impl DescriptorHeapStats {
    /// 创建新的统计信息
    pub fn new(heap_type: DescriptorHeapType, heaps: usize, capacity: u32, used: u32) -> Self {
        let available = capacity.saturating_sub(used);
        let usage_ratio = if capacity > 0 {
            used as f32 / capacity as f32
        } else {
            0.0
        };

        Self {
            heap_type,
            heaps,
            capacity,
            used,
            available,
            usage_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtv_allocator(capacity: u32) -> DescriptorAllocator {
        DescriptorAllocator::new(
            DescriptorHeapType::Rtv,
            capacity,
            32,
            CpuDescriptorHandle::new(1000),
            None,
        )
    }

    #[test]
    fn test_heap_type() {
        assert!(DescriptorHeapType::CbvSrvUav.can_be_shader_visible());
        assert!(!DescriptorHeapType::Rtv.can_be_shader_visible());
        assert_eq!(DescriptorHeapType::Rtv.name(), "RTV");

        let mut seen = [false; NUM_HEAP_TYPES];
        for ty in DescriptorHeapType::ALL {
            seen[ty.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_cpu_descriptor_handle_offset() {
        let handle = CpuDescriptorHandle::new(1000);
        assert_eq!(handle.offset(5, 32).ptr, 1160); // 1000 + 5 * 32
    }

    #[test]
    fn test_gpu_descriptor_handle_offset() {
        let handle = GpuDescriptorHandle::new(2000);
        assert_eq!(handle.offset(10, 32).ptr, 2320); // 2000 + 10 * 32
    }

    #[test]
    fn test_allocations_are_contiguous_from_zero() {
        let mut allocator = rtv_allocator(4);

        for expected in 0..4 {
            let slot = allocator.allocate().unwrap();
            assert_eq!(slot.index, expected);
            assert_eq!(slot.cpu.ptr, 1000 + expected as usize * 32);
            assert_eq!(slot.cpu, allocator.cpu_handle(expected));
            assert!(slot.gpu.is_none());
        }
        assert!(allocator.is_full());
    }

    #[test]
    fn test_allocation_past_capacity_fails_closed() {
        let mut allocator = rtv_allocator(2);
        allocator.allocate().unwrap();
        allocator.allocate().unwrap();

        // 第3次分配应该失败，且状态不变
        let err = allocator.allocate().unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::DescriptorHeapExhausted { capacity: 2, .. }
        ));
        assert_eq!(allocator.len(), 2);
        assert!(allocator.allocate().is_err());
    }

    #[test]
    fn test_zero_capacity_heap() {
        let mut allocator = rtv_allocator(0);
        assert!(allocator.is_full());
        assert!(allocator.allocate().is_err());
    }

    #[test]
    fn test_shader_visible_allocator_tracks_gpu_cursor() {
        let mut allocator = DescriptorAllocator::new(
            DescriptorHeapType::CbvSrvUav,
            8,
            64,
            CpuDescriptorHandle::new(0x1000),
            Some(GpuDescriptorHandle::new(0x9000)),
        );
        allocator.allocate().unwrap();
        let second = allocator.allocate().unwrap();
        assert_eq!(second.gpu, Some(GpuDescriptorHandle::new(0x9040)));
        assert_eq!(allocator.gpu_handle(1), second.gpu);
    }

    #[test]
    fn test_reset_rewinds_cursor() {
        let mut allocator = rtv_allocator(2);
        allocator.allocate().unwrap();
        allocator.allocate().unwrap();

        allocator.reset();
        assert!(allocator.is_empty());
        let slot = allocator.allocate().unwrap();
        assert_eq!(slot.index, 0);
        assert_eq!(slot.cpu, allocator.cpu_start());
    }

    #[test]
    fn test_descriptor_heap_stats() {
        let stats = DescriptorHeapStats::new(DescriptorHeapType::Rtv, 2, 100, 50);
        assert_eq!(stats.capacity, 100);
        assert_eq!(stats.used, 50);
        assert_eq!(stats.available, 50);
        assert_eq!(stats.usage_ratio, 0.5);

        let empty = DescriptorHeapStats::new(DescriptorHeapType::Dsv, 0, 0, 0);
        assert_eq!(empty.usage_ratio, 0.0);
    }
}
