//! DirectX 12 描述符堆实现
//!
//! 每种描述符类型对应一个堆池，池中的堆按创建顺序编号，只追加不删除，
//! 与渲染环境同生共死。堆内槽位由 [`DescriptorAllocator`] 线性分配。

use tracing::{debug, error};

use crate::core::error::GraphicsError;
use crate::gfx::backend::{DriverResult, GraphicsDriver};
use crate::renderer::descriptor::{
    CpuDescriptorHandle, DescriptorAllocator, DescriptorHeapStats, DescriptorHeapType,
    DescriptorSlot, GpuDescriptorHandle, NUM_HEAP_TYPES,
};

/// 单个固定容量的描述符堆
pub struct DescriptorHeap<D: GraphicsDriver> {
    /// 底层原生描述符堆
    heap: D::DescriptorHeap,
    /// 槽位分配状态
    allocator: DescriptorAllocator,
}

impl<D: GraphicsDriver> DescriptorHeap<D> {
    /// 创建新的描述符堆
    ///
    /// 步长由设备按堆类型给出；只有 CBV/SRV/UAV 和采样器堆可以对着色器可见。
    pub fn new(
        driver: &D,
        device: &D::Device,
        heap_type: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> DriverResult<Self> {
        let shader_visible = shader_visible && heap_type.can_be_shader_visible();
        let heap = driver.create_descriptor_heap(device, heap_type, capacity, shader_visible)?;
        let stride = driver.descriptor_increment_size(device, heap_type);
        let cpu_start = driver.heap_cpu_start(&heap);
        let gpu_start = if shader_visible {
            driver.heap_gpu_start(&heap)
        } else {
            None
        };

        Ok(Self {
            heap,
            allocator: DescriptorAllocator::new(heap_type, capacity, stride, cpu_start, gpu_start),
        })
    }

    /// 获取底层原生描述符堆
    pub fn raw(&self) -> &D::DescriptorHeap {
        &self.heap
    }

    /// 分配状态
    pub fn allocator(&self) -> &DescriptorAllocator {
        &self.allocator
    }

    /// 获取指定索引的 CPU 句柄
    pub fn cpu_handle(&self, index: u32) -> CpuDescriptorHandle {
        self.allocator.cpu_handle(index)
    }

    /// 获取指定索引的 GPU 句柄（仅对着色器可见的堆）
    pub fn gpu_handle(&self, index: u32) -> Option<GpuDescriptorHandle> {
        self.allocator.gpu_handle(index)
    }
}

/// 描述符堆池
pub struct DescriptorHeapPool<D: GraphicsDriver> {
    pools: [Vec<DescriptorHeap<D>>; NUM_HEAP_TYPES],
}

impl<D: GraphicsDriver> DescriptorHeapPool<D> {
    /// 创建空的堆池
    pub fn new() -> Self {
        Self {
            pools: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// 在对应类型的池尾追加一个堆，返回它在池中的序号
    pub fn create_heap(
        &mut self,
        driver: &D,
        device: &D::Device,
        heap_type: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> DriverResult<u32> {
        let heap = DescriptorHeap::new(driver, device, heap_type, capacity, shader_visible)?;
        let pool = &mut self.pools[heap_type.index()];
        pool.push(heap);
        let heap_index = (pool.len() - 1) as u32;

        debug!(
            heap_type = heap_type.name(),
            heap_index,
            capacity,
            "Descriptor heap created"
        );
        Ok(heap_index)
    }

    /// 在堆中预留下一个槽位，不写入任何视图
    pub fn allocate(
        &mut self,
        heap_type: DescriptorHeapType,
        heap_index: u32,
    ) -> DriverResult<DescriptorSlot> {
        let heap = self.heap_mut(heap_type, heap_index)?;
        heap.allocator.allocate().map_err(|e| {
            error!(
                heap_type = heap_type.name(),
                heap_index,
                capacity = heap.allocator.capacity(),
                "Descriptor heap exhausted"
            );
            e
        })
    }

    /// 为资源分配一个渲染目标视图
    ///
    /// 堆已满时返回 `DescriptorHeapExhausted`，不会写入任何视图。
    pub fn allocate_render_target_view(
        &mut self,
        driver: &D,
        device: &D::Device,
        heap_index: u32,
        resource: &D::Resource,
    ) -> DriverResult<DescriptorSlot> {
        let slot = self.allocate(DescriptorHeapType::Rtv, heap_index)?;
        driver.create_render_target_view(device, resource, slot.cpu);
        Ok(slot)
    }

    /// 游标回到堆首，堆本身保留
    pub fn reset_heap(&mut self, heap_type: DescriptorHeapType, heap_index: u32) -> DriverResult<()> {
        self.heap_mut(heap_type, heap_index)?.allocator.reset();
        Ok(())
    }

    /// 获取指定堆
    pub fn heap(&self, heap_type: DescriptorHeapType, heap_index: u32) -> Option<&DescriptorHeap<D>> {
        self.pools[heap_type.index()].get(heap_index as usize)
    }

    /// 指定类型的堆数量
    pub fn heap_count(&self, heap_type: DescriptorHeapType) -> usize {
        self.pools[heap_type.index()].len()
    }

    /// 指定类型的统计信息（所有堆合计）
    pub fn stats(&self, heap_type: DescriptorHeapType) -> DescriptorHeapStats {
        let pool = &self.pools[heap_type.index()];
        let capacity = pool.iter().map(|h| h.allocator.capacity()).sum();
        let used = pool.iter().map(|h| h.allocator.len()).sum();
        DescriptorHeapStats::new(heap_type, pool.len(), capacity, used)
    }

    /// 所有类型的统计信息
    pub fn all_stats(&self) -> Vec<DescriptorHeapStats> {
        DescriptorHeapType::ALL
            .iter()
            .map(|ty| self.stats(*ty))
            .collect()
    }

    fn heap_mut(
        &mut self,
        heap_type: DescriptorHeapType,
        heap_index: u32,
    ) -> DriverResult<&mut DescriptorHeap<D>> {
        self.pools[heap_type.index()]
            .get_mut(heap_index as usize)
            .ok_or_else(|| {
                GraphicsError::ResourceCreation(format!(
                    "{} descriptor heap {} does not exist",
                    heap_type.name(),
                    heap_index
                ))
            })
    }
}

impl<D: GraphicsDriver> Default for DescriptorHeapPool<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::FeatureLevel;
    use crate::gfx::headless::{HeadlessDevice, HeadlessDriver};

    fn device(driver: &HeadlessDriver) -> HeadlessDevice {
        let factory = driver.create_factory(false).unwrap();
        let (adapter, _) = driver.enum_adapter(&factory, 0).unwrap();
        driver.create_device(&adapter, FeatureLevel::Level12_1).unwrap()
    }

    #[test]
    fn test_heaps_are_appended_per_type() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let mut pool = DescriptorHeapPool::new();

        assert_eq!(
            pool.create_heap(&driver, &device, DescriptorHeapType::Rtv, 2, false)
                .unwrap(),
            0
        );
        assert_eq!(
            pool.create_heap(&driver, &device, DescriptorHeapType::Rtv, 4, false)
                .unwrap(),
            1
        );
        assert_eq!(
            pool.create_heap(&driver, &device, DescriptorHeapType::CbvSrvUav, 8, true)
                .unwrap(),
            0
        );

        assert_eq!(pool.heap_count(DescriptorHeapType::Rtv), 2);
        assert_eq!(pool.heap_count(DescriptorHeapType::Dsv), 0);

        // RTV 堆永远不对着色器可见
        let rtv = pool.heap(DescriptorHeapType::Rtv, 0).unwrap();
        assert!(rtv.gpu_handle(0).is_none());
        let cbv = pool.heap(DescriptorHeapType::CbvSrvUav, 0).unwrap();
        assert!(cbv.gpu_handle(0).is_some());
        assert_eq!(cbv.allocator().stride(), 64);
    }

    #[test]
    fn test_exhausted_heap_is_a_hard_error() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let mut pool = DescriptorHeapPool::new();
        let heap = pool
            .create_heap(&driver, &device, DescriptorHeapType::Rtv, 3, false)
            .unwrap();

        for expected in 0..3 {
            assert_eq!(
                pool.allocate(DescriptorHeapType::Rtv, heap).unwrap().index,
                expected
            );
        }
        assert!(matches!(
            pool.allocate(DescriptorHeapType::Rtv, heap),
            Err(GraphicsError::DescriptorHeapExhausted {
                heap_type: DescriptorHeapType::Rtv,
                capacity: 3
            })
        ));

        let stats = pool.stats(DescriptorHeapType::Rtv);
        assert_eq!(stats.used, 3);
        assert_eq!(stats.available, 0);

        pool.reset_heap(DescriptorHeapType::Rtv, heap).unwrap();
        assert_eq!(pool.stats(DescriptorHeapType::Rtv).used, 0);
    }

    #[test]
    fn test_unknown_heap_index() {
        let mut pool: DescriptorHeapPool<HeadlessDriver> = DescriptorHeapPool::new();
        assert!(pool.allocate(DescriptorHeapType::Rtv, 0).is_err());
        assert!(pool.reset_heap(DescriptorHeapType::Dsv, 3).is_err());
        assert_eq!(pool.all_stats().len(), NUM_HEAP_TYPES);
    }
}
