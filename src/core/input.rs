//! 按键状态
//!
//! 窗口层转发原始虚拟键码，这里按键码维护一张固定大小的按下/释放表。

use tracing::warn;

/// 记录的虚拟键码数量
pub const NUM_KEYS: usize = 254;

/// 每个按键的按下状态
#[derive(Debug, Clone)]
pub struct InputState {
    keys: Vec<bool>,
}

impl InputState {
    /// 创建所有按键都处于释放状态的输入表
    pub fn new() -> Self {
        Self {
            keys: vec![false; NUM_KEYS],
        }
    }

    /// 记录按下，键码越界时返回 false
    pub fn key_down(&mut self, key: u8) -> bool {
        self.set(key, true)
    }

    /// 记录释放，键码越界时返回 false
    pub fn key_up(&mut self, key: u8) -> bool {
        self.set(key, false)
    }

    /// 按键当前是否按下
    pub fn is_down(&self, key: u8) -> bool {
        self.keys.get(key as usize).copied().unwrap_or(false)
    }

    /// 当前按下的按键数量
    pub fn pressed_count(&self) -> usize {
        self.keys.iter().filter(|down| **down).count()
    }

    fn set(&mut self, key: u8, down: bool) -> bool {
        match self.keys.get_mut(key as usize) {
            Some(slot) => {
                *slot = down;
                true
            }
            None => {
                warn!(key, "Ignoring out-of-range key code");
                false
            }
        }
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}
