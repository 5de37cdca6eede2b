//! DirectX 12 命令提交管线
//!
//! 一个命令队列、一个命令列表、一个栅栏和一个等待事件。
//! 逐缓冲同步模式下每个后台缓冲有自己的命令分配器，
//! 空闲同步模式下只有一个分配器。
//!
//! 字段按释放顺序声明：事件、栅栏、命令列表、分配器，最后是队列。

use tracing::{error, trace};

use crate::core::error::GraphicsError;
use crate::gfx::backend::{DriverResult, GraphicsDriver};
use crate::renderer::command::{FramePhase, FrameRecorder};
use crate::renderer::sync::{FenceTracker, FenceValue, WaitStatus};

/// 命令提交管线
pub struct CommandPipeline<D: GraphicsDriver> {
    event: D::Event,
    fence: D::Fence,
    list: D::CommandList,
    allocators: Vec<D::Allocator>,
    queue: D::Queue,
    active_allocator: usize,
    tracker: FenceTracker,
    recorder: FrameRecorder,
}

impl<D: GraphicsDriver> CommandPipeline<D> {
    /// 由已创建的原生对象组装管线
    ///
    /// 命令列表创建时处于记录状态，这里先关闭它，
    /// 使帧与帧之间命令列表总是关闭的。
    pub fn from_parts(
        driver: &D,
        queue: D::Queue,
        allocators: Vec<D::Allocator>,
        list: D::CommandList,
        fence: D::Fence,
        event: D::Event,
        tracker: FenceTracker,
    ) -> DriverResult<Self> {
        if allocators.is_empty() {
            return Err(GraphicsError::ResourceCreation(
                "command pipeline needs at least one allocator".to_string(),
            ));
        }
        driver.close_command_list(&list)?;

        Ok(Self {
            event,
            fence,
            list,
            allocators,
            queue,
            active_allocator: 0,
            tracker,
            recorder: FrameRecorder::new(),
        })
    }

    /// 开始记录：先重置分配器，再基于它重置命令列表
    ///
    /// `buffer_index` 选择分配器；调用方必须保证 GPU 已经完成上次使用该分配器的工作。
    pub fn begin(&mut self, driver: &D, buffer_index: usize) -> DriverResult<()> {
        self.recorder.check_begin()?;

        let index = buffer_index % self.allocators.len();
        let allocator = &self.allocators[index];
        driver.reset_command_allocator(allocator)?;
        driver.reset_command_list(&self.list, allocator)?;

        self.active_allocator = index;
        self.recorder.begin();
        Ok(())
    }

    /// 关闭命令列表并提交，然后 signal 下一个栅栏值
    ///
    /// 返回本次 signal 的值。
    pub fn close_and_execute(&mut self, driver: &D) -> DriverResult<FenceValue> {
        self.recorder.check_recording("submit")?;

        driver.close_command_list(&self.list)?;
        self.recorder.submitted();
        driver.execute_command_list(&self.queue, &self.list);

        let value = self.tracker.pending();
        driver.signal(&self.queue, &self.fence, value.value())?;
        self.tracker.signaled(value);

        trace!(
            fence_value = value.value(),
            allocator = self.active_allocator,
            "Command list submitted"
        );
        Ok(value)
    }

    /// 等待栅栏到达 `value`，超时按设备丢失处理
    pub fn wait_for_value(&self, driver: &D, value: FenceValue) -> DriverResult<()> {
        if value.is_reached(driver.completed_value(&self.fence)) {
            return Ok(());
        }

        let timeout = self.tracker.timeout();
        match driver.wait_for_fence(&self.fence, value.value(), &self.event, timeout)? {
            WaitStatus::Signaled => Ok(()),
            WaitStatus::TimedOut => {
                let completed = driver.completed_value(&self.fence);
                error!(
                    target_value = value.value(),
                    completed,
                    ?timeout,
                    "Fence wait timed out, treating the device as lost"
                );
                Err(GraphicsError::FenceTimeout {
                    target: value.value(),
                    completed,
                    timeout,
                })
            }
        }
    }

    /// 等待全部已提交的工作完成
    pub fn wait_for_idle(&self, driver: &D) -> DriverResult<()> {
        self.wait_for_value(driver, self.tracker.last_signaled())
    }

    /// 检查能否 present
    pub fn check_present(&self) -> DriverResult<()> {
        self.recorder.check_present()
    }

    /// 已 present，回到就绪阶段
    pub fn presented(&mut self) {
        self.recorder.presented();
    }

    /// 检查能否记录命令
    pub fn check_recording(&self, operation: &'static str) -> DriverResult<()> {
        self.recorder.check_recording(operation)
    }

    pub fn list(&self) -> &D::CommandList {
        &self.list
    }

    pub fn queue(&self) -> &D::Queue {
        &self.queue
    }

    pub fn phase(&self) -> FramePhase {
        self.recorder.phase()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn allocator_count(&self) -> usize {
        self.allocators.len()
    }

    /// 最后一次 signal 的值
    pub fn last_signaled(&self) -> FenceValue {
        self.tracker.last_signaled()
    }

    /// GPU 已完成的值
    pub fn completed_value(&self, driver: &D) -> FenceValue {
        FenceValue::new(driver.completed_value(&self.fence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::FeatureLevel;
    use crate::gfx::headless::{FailPoint, HeadlessDevice, HeadlessDriver};
    use std::time::Duration;

    fn pipeline(driver: &HeadlessDriver, device: &HeadlessDevice) -> CommandPipeline<HeadlessDriver> {
        let queue = driver.create_command_queue(device).unwrap();
        let allocator = driver.create_command_allocator(device).unwrap();
        let list = driver.create_command_list(device, &allocator).unwrap();
        let fence = driver.create_fence(device, 0).unwrap();
        let event = driver.create_fence_event().unwrap();
        CommandPipeline::from_parts(
            driver,
            queue,
            vec![allocator],
            list,
            fence,
            event,
            FenceTracker::new(Duration::from_millis(10)),
        )
        .unwrap()
    }

    fn device(driver: &HeadlessDriver) -> HeadlessDevice {
        let factory = driver.create_factory(false).unwrap();
        let (adapter, _) = driver.enum_adapter(&factory, 0).unwrap();
        driver.create_device(&adapter, FeatureLevel::Level12_1).unwrap()
    }

    #[test]
    fn test_fence_values_increase_per_submit() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let mut pipeline = pipeline(&driver, &device);

        for expected in 1..=3 {
            pipeline.begin(&driver, 0).unwrap();
            let value = pipeline.close_and_execute(&driver).unwrap();
            assert_eq!(value.value(), expected);
            pipeline.check_present().unwrap();
            pipeline.presented();
        }
        pipeline.wait_for_idle(&driver).unwrap();
        assert_eq!(pipeline.completed_value(&driver).value(), 3);
    }

    #[test]
    fn test_submit_requires_recording() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let mut pipeline = pipeline(&driver, &device);

        assert!(matches!(
            pipeline.close_and_execute(&driver),
            Err(GraphicsError::InvalidPhase { operation: "submit", .. })
        ));
        assert_eq!(pipeline.last_signaled(), FenceValue::ZERO);
    }

    #[test]
    fn test_hung_gpu_wait_is_bounded() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let mut pipeline = pipeline(&driver, &device);

        driver.set_gpu_hung(true);
        pipeline.begin(&driver, 0).unwrap();
        pipeline.close_and_execute(&driver).unwrap();

        let err = pipeline.wait_for_idle(&driver).unwrap_err();
        assert!(err.is_device_lost());
        assert!(matches!(
            err,
            GraphicsError::FenceTimeout {
                target: 1,
                completed: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_signal_does_not_advance() {
        let driver = HeadlessDriver::new();
        let device = device(&driver);
        let mut pipeline = pipeline(&driver, &device);

        driver.fail_at(FailPoint::Signal);
        pipeline.begin(&driver, 0).unwrap();
        assert!(pipeline.close_and_execute(&driver).is_err());
        assert_eq!(pipeline.last_signaled(), FenceValue::ZERO);
    }
}
