//! GPU 同步机制模块
//!
//! 提供与图形 API 无关的栅栏记账，用于 CPU 等待 GPU 的帧同步。
//!
//! # 同步模型
//!
//! - 命令管线只有一个栅栏，CPU 侧维护单调递增的目标值
//! - 每次提交先递增目标值，再让队列 signal 该值
//! - 每个后台缓冲记录最后一次使用它时 signal 的值（见 `FrameBuffer`），
//!   重新获取该缓冲时只需等待这个值完成
//! - 等待总是有上限，超时按设备丢失处理

use std::time::Duration;

/// Fence 值
///
/// 用于CPU-GPU同步的单调递增值。
/// CPU可以等待GPU完成特定Fence值对应的工作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 初始值，尚未 signal 过任何工作
    pub const ZERO: FenceValue = FenceValue(0);

    /// 创建新的Fence值
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// 获取内部值
    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// GPU 已完成到 `completed` 时，该值是否已经到达
    pub fn is_reached(&self, completed: u64) -> bool {
        completed >= self.0
    }
}

/// 有上限等待的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// 目标值已完成
    Signaled,
    /// 超过等待上限仍未完成
    TimedOut,
}

/// 栅栏记账
///
/// 保存 CPU 侧最后一次 signal 的值和单次等待的上限。
#[derive(Debug, Clone)]
pub struct FenceTracker {
    last_signaled: FenceValue,
    timeout: Duration,
}

impl FenceTracker {
    /// 创建新的栅栏记账
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_signaled: FenceValue::ZERO,
            timeout,
        }
    }

    /// 下一次提交要 signal 的值
    pub fn pending(&self) -> FenceValue {
        self.last_signaled.next()
    }

    /// 队列已经 signal 了 `value`
    pub fn signaled(&mut self, value: FenceValue) {
        if value > self.last_signaled {
            self.last_signaled = value;
        }
    }

    /// 最后一次 signal 的值
    pub fn last_signaled(&self) -> FenceValue {
        self.last_signaled
    }

    /// 单次等待的上限
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
