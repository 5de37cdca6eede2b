//! 配置管理模块
//!
//! 提供框架配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! title = "DXR Demo"
//! class_name = "DxrHarnessWindow"
//! width = 1280
//! height = 720
//! fullscreen = false
//!
//! [graphics]
//! backend = "d3d12"
//! driver = "native"        # 或 "headless"
//! debug_layer = false
//! vsync = false
//! frame_sync = "per_buffer" # 或 "idle"
//! fence_timeout_ms = 5000
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//!
//! [run]
//! max_frames = 0      # 0 表示一直运行到窗口关闭
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{ConfigError, Result};
use crate::renderer::backend_trait::{GraphicSettings, PlatformData};

/// 框架配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,

    /// 运行配置
    #[serde(default)]
    pub run: RunConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,

    /// 窗口类注册名，与标题分开，两个原生注册表互不干扰
    #[serde(default = "default_class_name")]
    pub class_name: String,

    /// 窗口宽度（同时也是后台缓冲宽度）
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度（同时也是后台缓冲高度）
    #[serde(default = "default_height")]
    pub height: u32,

    /// 是否全屏（接受但当前不生效）
    #[serde(default)]
    pub fullscreen: bool,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: BackendType,

    /// 原生驱动还是模拟驱动
    #[serde(default = "default_driver")]
    pub driver: DriverKind,

    /// 是否启用 DXGI 调试工厂
    #[serde(default)]
    pub debug_layer: bool,

    /// 垂直同步
    #[serde(default)]
    pub vsync: bool,

    /// 帧同步策略
    #[serde(default = "default_frame_sync")]
    pub frame_sync: FrameSync,

    /// 栅栏等待超时（毫秒）
    #[serde(default = "default_fence_timeout_ms")]
    pub fence_timeout_ms: u64,
}

/// 图形后端类型
///
/// 目前只有一个实现，保留枚举作为扩展点。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// DirectX 12 模型的后端
    D3d12,
}

/// 驱动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Win32 + D3D12 原生驱动（仅 Windows）
    Native,
    /// 确定性的软件模拟驱动
    Headless,
}

/// 帧同步策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSync {
    /// 每个后台缓冲记录自己的栅栏值，begin_frame 只等待即将复用的缓冲
    PerBuffer,
    /// 每次 present 之后等待 GPU 完全空闲
    Idle,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// 运行配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// 最多渲染的帧数，0 表示不限制
    #[serde(default)]
    pub max_frames: u64,
}

// 默认值函数
fn default_title() -> String { "DXR Demo".to_string() }
fn default_class_name() -> String { "DxrHarnessWindow".to_string() }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_backend() -> BackendType { BackendType::D3d12 }
fn default_driver() -> DriverKind {
    if cfg!(target_os = "windows") {
        DriverKind::Native
    } else {
        DriverKind::Headless
    }
}
fn default_frame_sync() -> FrameSync { FrameSync::PerBuffer }
fn default_fence_timeout_ms() -> u64 { 5000 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_file() -> String { "dxr_harness.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            class_name: default_class_name(),
            width: default_width(),
            height: default_height(),
            fullscreen: false,
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            driver: default_driver(),
            debug_layer: false,
            vsync: false,
            frame_sync: default_frame_sync(),
            fence_timeout_ms: default_fence_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--headless` / `--native`: 选择驱动
    /// - `--width <value>` / `--height <value>`: 窗口尺寸
    /// - `--frames <value>`: 最多渲染的帧数
    /// - `--vsync`: 开启垂直同步
    /// - `--idle-sync`: 每帧等待 GPU 空闲
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--headless") {
            self.graphics.driver = DriverKind::Headless;
        }
        if args.iter().any(|a| a == "--native") {
            self.graphics.driver = DriverKind::Native;
        }
        if args.iter().any(|a| a == "--vsync") {
            self.graphics.vsync = true;
        }
        if args.iter().any(|a| a == "--idle-sync") {
            self.graphics.frame_sync = FrameSync::Idle;
        }

        if let Some(width) = parse_flag_value(&args, "--width") {
            self.window.width = width;
        }
        if let Some(height) = parse_flag_value(&args, "--height") {
            self.window.height = height;
        }
        if let Some(frames) = parse_flag_value(&args, "--frames") {
            self.run.max_frames = frames;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }
            .into());
        }

        if self.window.class_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "window.class_name".to_string(),
                reason: "Window class name must not be empty".to_string(),
            }
            .into());
        }

        if self.graphics.fence_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "graphics.fence_timeout_ms".to_string(),
                reason: "Fence timeout must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// 生成创建渲染环境所需的设置
    pub fn graphic_settings(&self) -> GraphicSettings {
        GraphicSettings {
            window_name: self.window.title.clone(),
            window_class: self.window.class_name.clone(),
            width: self.window.width,
            height: self.window.height,
            fullscreen: self.window.fullscreen,
            platform: PlatformData::default(),
        }
    }
}

fn parse_flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1)?.parse().ok()
}

impl GraphicsConfig {
    /// 栅栏等待的上限
    pub fn fence_timeout(&self) -> Duration {
        Duration::from_millis(self.fence_timeout_ms)
    }

    /// present 的同步间隔
    pub fn sync_interval(&self) -> u32 {
        u32::from(self.vsync)
    }
}

impl BackendType {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::D3d12 => "DirectX 12",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert!(!config.window.fullscreen);
        assert_eq!(config.graphics.backend, BackendType::D3d12);
        assert_eq!(config.graphics.frame_sync, FrameSync::PerBuffer);
        assert_ne!(config.window.title, config.window.class_name);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.fence_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.window.class_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "dxr_harness", "--headless", "--width", "640", "--height", "480", "--frames", "12",
            "--idle-sync",
        ]);
        assert_eq!(config.graphics.driver, DriverKind::Headless);
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 480);
        assert_eq!(config.run.max_frames, 12);
        assert_eq!(config.graphics.frame_sync, FrameSync::Idle);

        // 无法解析的值保持原样
        config.apply_args(["--width", "wide"]);
        assert_eq!(config.window.width, 640);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [window]
            width = 800

            [graphics]
            driver = "headless"
            frame_sync = "idle"
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.driver, DriverKind::Headless);
        assert_eq!(config.graphics.frame_sync, FrameSync::Idle);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_graphic_settings() {
        let mut config = Config::default();
        config.window.width = 1024;
        let settings = config.graphic_settings();
        assert_eq!(settings.width, 1024);
        assert_eq!(settings.window_name, "DXR Demo");
        assert_eq!(settings.window_class, "DxrHarnessWindow");
    }
}
