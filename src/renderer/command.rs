//! 命令记录状态模块
//!
//! 跟踪命令列表与帧阶段，保证各个逐帧操作按 begin → 记录 → submit → present 的顺序发生。
//! 原生命令对象由 `gfx::dx12::command` 持有，这里只做状态检查。
//!
//! # 命令列表状态
//!
//! - **Closed**：帧与帧之间的常态，可以被重置
//! - **Recording**：begin_frame 之后到 submit 之前，可以记录 clear 等命令

use crate::core::error::GraphicsError;

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// 已关闭
    Closed,
    /// 正在记录
    Recording,
}

/// 帧阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// 可以开始新的一帧
    Ready,
    /// begin_frame 之后，正在记录
    Recording,
    /// 已提交，等待 present
    Submitted,
}

impl FramePhase {
    /// 阶段名称，用于错误信息
    pub fn name(&self) -> &'static str {
        match self {
            FramePhase::Ready => "ready",
            FramePhase::Recording => "recording",
            FramePhase::Submitted => "submitted",
        }
    }
}

/// 帧阶段状态机
///
/// 不变式：命令列表处于 `Recording` 当且仅当帧阶段为 `Recording`。
#[derive(Debug, Clone)]
pub struct FrameRecorder {
    phase: FramePhase,
    list_state: CommandListState,
}

impl FrameRecorder {
    /// 创建新的状态机，命令列表初始为关闭状态
    pub fn new() -> Self {
        Self {
            phase: FramePhase::Ready,
            list_state: CommandListState::Closed,
        }
    }

    /// 当前帧阶段
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// 当前命令列表状态
    pub fn list_state(&self) -> CommandListState {
        self.list_state
    }

    /// 是否正在记录
    pub fn is_recording(&self) -> bool {
        self.list_state == CommandListState::Recording
    }

    /// 检查能否开始新的一帧
    ///
    /// 上一帧提交后未 present 也允许重新开始，此时那一帧不会被呈现。
    pub fn check_begin(&self) -> Result<(), GraphicsError> {
        match self.phase {
            FramePhase::Ready | FramePhase::Submitted => Ok(()),
            FramePhase::Recording => Err(self.invalid("begin_frame")),
        }
    }

    /// 命令列表已重置，进入记录阶段
    pub fn begin(&mut self) {
        self.phase = FramePhase::Recording;
        self.list_state = CommandListState::Recording;
    }

    /// 检查能否记录命令
    pub fn check_recording(&self, operation: &'static str) -> Result<(), GraphicsError> {
        if self.is_recording() {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    /// 命令列表已关闭并提交
    pub fn submitted(&mut self) {
        self.phase = FramePhase::Submitted;
        self.list_state = CommandListState::Closed;
    }

    /// 检查能否 present
    pub fn check_present(&self) -> Result<(), GraphicsError> {
        match self.phase {
            FramePhase::Submitted => Ok(()),
            _ => Err(self.invalid("present")),
        }
    }

    /// 已呈现，回到就绪阶段
    pub fn presented(&mut self) {
        self.phase = FramePhase::Ready;
    }

    fn invalid(&self, operation: &'static str) -> GraphicsError {
        GraphicsError::InvalidPhase {
            operation,
            phase: self.phase.name(),
        }
    }
}

impl Default for FrameRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_state_machine() {
        let mut recorder = FrameRecorder::new();
        assert_eq!(recorder.phase(), FramePhase::Ready);
        assert_eq!(recorder.list_state(), CommandListState::Closed);

        // 记录阶段之外不能 clear
        assert!(recorder.check_recording("clear").is_err());
        assert!(recorder.check_present().is_err());

        recorder.check_begin().unwrap();
        recorder.begin();
        assert!(recorder.is_recording());
        recorder.check_recording("clear").unwrap();

        // 不能重复开始
        assert!(matches!(
            recorder.check_begin(),
            Err(GraphicsError::InvalidPhase {
                operation: "begin_frame",
                phase: "recording"
            })
        ));

        recorder.submitted();
        assert_eq!(recorder.list_state(), CommandListState::Closed);
        recorder.check_present().unwrap();

        recorder.presented();
        assert_eq!(recorder.phase(), FramePhase::Ready);
    }

    #[test]
    fn test_begin_after_unpresented_submit() {
        let mut recorder = FrameRecorder::new();
        recorder.begin();
        recorder.submitted();
        assert!(recorder.check_begin().is_ok());
    }
}
