//! 设备与适配器选择
//!
//! 按序号枚举适配器，跳过软件适配器，选出第一个支持最低功能级别的硬件适配器，
//! 然后在该适配器上创建设备。这是首个满足（first-fit）而不是最优的策略：
//! 选中的适配器创建设备失败时不会再尝试下一个适配器。

use tracing::{debug, info};

use crate::core::error::GraphicsError;
use crate::gfx::backend::{AdapterInfo, DriverResult, FeatureLevel, GraphicsDriver};

/// 设备创建要求的最低功能级别
pub const MINIMUM_FEATURE_LEVEL: FeatureLevel = FeatureLevel::Level12_1;

/// 选中适配器上的逻辑设备
pub struct GpuDevice<D: GraphicsDriver> {
    device: D::Device,
    adapter: AdapterInfo,
    feature_level: FeatureLevel,
}

impl<D: GraphicsDriver> GpuDevice<D> {
    /// 选择适配器并创建设备
    pub fn create(driver: &D, factory: &D::Factory) -> DriverResult<Self> {
        let (adapter, info) = select_adapter(driver, factory, MINIMUM_FEATURE_LEVEL)?;
        let device = driver.create_device(&adapter, MINIMUM_FEATURE_LEVEL)?;

        info!(
            adapter = %info.name,
            index = info.index,
            video_memory_mb = info.dedicated_video_memory / (1024 * 1024),
            feature_level = MINIMUM_FEATURE_LEVEL.name(),
            "D3D12 device created"
        );

        Ok(Self {
            device,
            adapter: info,
            feature_level: MINIMUM_FEATURE_LEVEL,
        })
    }

    /// 原生设备
    pub fn raw(&self) -> &D::Device {
        &self.device
    }

    /// 选中的适配器信息
    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// 适配器专用显存（字节）
    pub fn max_video_memory(&self) -> u64 {
        self.adapter.dedicated_video_memory
    }

    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    /// 设备被移除时返回原因
    pub fn removed_reason(&self, driver: &D) -> Option<String> {
        driver.device_removed_reason(&self.device)
    }
}

/// 选出第一个支持 `level` 的硬件适配器
///
/// 软件适配器永远不会被选中，即使没有任何硬件适配器可用。
pub fn select_adapter<D: GraphicsDriver>(
    driver: &D,
    factory: &D::Factory,
    level: FeatureLevel,
) -> DriverResult<(D::Adapter, AdapterInfo)> {
    let mut index = 0;
    let mut rejected = Vec::new();

    while let Some((adapter, info)) = driver.enum_adapter(factory, index) {
        index += 1;

        if info.is_software {
            debug!(adapter = %info.name, index = info.index, "Skipping software adapter");
            rejected.push(format!("{} (software)", info.name));
            continue;
        }

        if !driver.supports_feature_level(&adapter, level) {
            debug!(
                adapter = %info.name,
                index = info.index,
                feature_level = level.name(),
                "Adapter does not support the required feature level"
            );
            rejected.push(format!("{} (below {})", info.name, level.name()));
            continue;
        }

        return Ok((adapter, info));
    }

    let detail = if rejected.is_empty() {
        "no adapters enumerated".to_string()
    } else {
        format!("rejected: {}", rejected.join(", "))
    };
    Err(GraphicsError::NoAdapter(detail))
}
