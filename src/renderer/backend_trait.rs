//! 统一的渲染后端接口
//!
//! 本模块定义了渲染外壳调用后端时使用的全部接口，按职责分为三组：
//!
//! - [`RenderSystemApi`]：系统初始化 / 关闭、渲染环境的创建与销毁、逐帧操作
//! - [`WindowApi`]：窗口显示、隐藏、激活查询、交换与事件泵
//! - [`FramebufferApi`]：帧缓冲清屏与查询
//!
//! 三组接口合起来就是 [`RenderBackend`]。后端对象在启动时构造一次，
//! 以 `Box<dyn RenderBackend>` 的形式交给渲染外壳，调用方从不直接引用具体后端类型。
//!
//! 所有对象都通过代际句柄访问，后端在每个入口处校验句柄，
//! 已销毁或已重建的对象返回 `HandleError::Stale`。

use crate::core::error::Result;
use crate::core::handle::RawHandle;
use crate::renderer::descriptor::CpuDescriptorHandle;
use crate::renderer::sync::FenceValue;

/// 平台数据字数
pub const PLATFORM_WORDS: usize = 4;

/// 平台相关的不透明数据
///
/// 第 0 个字是原生实例句柄，为 0 时由驱动自行获取。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformData {
    pub words: [usize; PLATFORM_WORDS],
}

impl PlatformData {
    /// 原生实例句柄
    pub fn instance(&self) -> usize {
        self.words[0]
    }

    /// 指定原生实例句柄
    pub fn with_instance(mut self, instance: usize) -> Self {
        self.words[0] = instance;
        self
    }
}

/// 创建渲染环境所需的设置
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicSettings {
    /// 窗口标题
    pub window_name: String,
    /// 窗口类注册名
    pub window_class: String,
    /// 窗口与后台缓冲宽度
    pub width: u32,
    /// 窗口与后台缓冲高度
    pub height: u32,
    /// 是否全屏（当前不生效）
    pub fullscreen: bool,
    /// 平台数据
    pub platform: PlatformData,
}

impl Default for GraphicSettings {
    fn default() -> Self {
        Self {
            window_name: "DXR Demo".to_string(),
            window_class: "DxrHarnessWindow".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
            platform: PlatformData::default(),
        }
    }
}

/// 渲染环境句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvironmentHandle(pub RawHandle);

/// 窗口句柄，与渲染环境一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub RawHandle);

impl WindowHandle {
    /// 拥有该窗口的渲染环境
    pub fn environment(&self) -> EnvironmentHandle {
        EnvironmentHandle(self.0)
    }
}

impl From<EnvironmentHandle> for WindowHandle {
    fn from(env: EnvironmentHandle) -> Self {
        WindowHandle(env.0)
    }
}

/// 帧缓冲句柄
///
/// `epoch` 是交换链视图的代数，每次有效的 resize 都会递增，
/// 旧句柄随即失效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle {
    pub environment: EnvironmentHandle,
    pub buffer: u32,
    pub epoch: u32,
}

/// 窗口事件
///
/// 由窗口过程入队，通过 [`WindowApi::poll_events`] 取出。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// 按键按下（虚拟键码）
    KeyDown(u8),
    /// 按键释放（虚拟键码）
    KeyUp(u8),
    /// 需要重绘
    Paint,
    /// 客户区尺寸变化
    Resized { width: u32, height: u32 },
    /// 用户请求关闭窗口
    CloseRequested,
}

/// 清屏颜色
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ClearColor {
    pub const RED: ClearColor = ClearColor::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: ClearColor = ClearColor::new(0.0, 1.0, 0.0, 1.0);
    pub const BLACK: ClearColor = ClearColor::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// 帧缓冲信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramebufferInfo {
    /// 后台缓冲序号
    pub buffer_index: u32,
    /// 视图所在描述符堆的序号
    pub heap_index: u32,
    /// 视图在堆内的槽位
    pub rtv_index: u32,
    /// 渲染目标视图
    pub rtv: CpuDescriptorHandle,
    /// 最后一次使用该缓冲时 signal 的栅栏值
    pub fence_value: FenceValue,
    /// 宽度
    pub width: u32,
    /// 高度
    pub height: u32,
    /// 是否是当前后台缓冲
    pub is_active: bool,
}

/// 渲染系统接口
pub trait RenderSystemApi {
    /// 后端名称，用于日志输出
    fn backend_name(&self) -> &'static str;

    /// 系统初始化，在创建任何渲染环境之前调用一次
    fn init(&mut self) -> Result<()>;

    /// 销毁所有存活的渲染环境并关闭系统
    fn shutdown(&mut self);

    /// 创建渲染环境
    ///
    /// 构造是全有或全无的：任意一步失败都会释放已创建的全部对象，
    /// 调用方只会得到错误，不会得到半成品。
    fn create_render_environment(&mut self, settings: &GraphicSettings)
        -> Result<EnvironmentHandle>;

    /// 销毁渲染环境，按创建的逆序释放全部原生对象
    fn destroy_render_environment(&mut self, env: EnvironmentHandle) -> Result<()>;

    /// 存活的渲染环境数量
    fn environment_count(&self) -> usize;

    /// 渲染环境拥有的窗口
    fn render_window(&self, env: EnvironmentHandle) -> Result<WindowHandle>;

    /// 调整窗口与交换链尺寸，最小为 1x1，尺寸不变时什么也不做
    fn resize_window(&mut self, env: EnvironmentHandle, width: u32, height: u32) -> Result<()>;

    /// 当前后台缓冲对应的帧缓冲
    fn default_frame_buffer(&self, env: EnvironmentHandle) -> Result<FramebufferHandle>;

    /// 已开始的帧数
    fn frame_index(&self, env: EnvironmentHandle) -> Result<u64>;

    /// 渲染环境创建以来经过的秒数
    fn get_time(&self, env: EnvironmentHandle) -> Result<f64>;

    /// 开始新的一帧：重置命令分配器和命令列表，获取当前后台缓冲
    fn begin_frame(&mut self, env: EnvironmentHandle) -> Result<()>;

    /// 结束记录并提交命令列表，随后 signal 栅栏
    fn submit(&mut self, env: EnvironmentHandle) -> Result<()>;

    /// 呈现当前后台缓冲
    fn present(&mut self, env: EnvironmentHandle) -> Result<()>;

    /// 等待 GPU 完成全部已提交的工作（有上限）
    fn wait_for_idle(&mut self, env: EnvironmentHandle) -> Result<()>;
}

/// 窗口接口
pub trait WindowApi {
    /// 显示窗口
    fn show(&mut self, window: WindowHandle) -> Result<()>;

    /// 隐藏窗口
    fn hide(&mut self, window: WindowHandle) -> Result<()>;

    /// 窗口是否可见且未被销毁
    fn is_active(&self, window: WindowHandle) -> Result<bool>;

    /// 呈现该窗口所属渲染环境的当前后台缓冲
    fn swap(&mut self, window: WindowHandle) -> Result<()>;

    /// 取出窗口过程积累的事件
    fn poll_events(&mut self, window: WindowHandle) -> Result<Vec<WindowEvent>>;
}

/// 帧缓冲接口
pub trait FramebufferApi {
    /// 清屏
    ///
    /// 只能在 begin_frame 与 submit 之间调用，且只能作用于当前后台缓冲。
    fn clear(&mut self, framebuffer: FramebufferHandle, color: ClearColor) -> Result<()>;

    /// 查询帧缓冲信息
    fn describe(&self, framebuffer: FramebufferHandle) -> Result<FramebufferInfo>;
}

/// 统一的渲染后端接口
///
/// # 示例
///
/// ```no_run
/// use dxr_harness::core::config::{BackendType, GraphicsConfig};
/// use dxr_harness::renderer::backend_trait::{
///     ClearColor, FramebufferApi, GraphicSettings, RenderSystemApi,
/// };
/// use dxr_harness::renderer::initialize_gpu_backend;
///
/// # fn main() -> dxr_harness::core::Result<()> {
/// let mut backend = initialize_gpu_backend(BackendType::D3d12, &GraphicsConfig::default())?;
/// backend.init()?;
/// let env = backend.create_render_environment(&GraphicSettings::default())?;
///
/// backend.begin_frame(env)?;
/// let fb = backend.default_frame_buffer(env)?;
/// backend.clear(fb, ClearColor::RED)?;
/// backend.submit(env)?;
/// backend.present(env)?;
///
/// backend.destroy_render_environment(env)?;
/// backend.shutdown();
/// # Ok(())
/// # }
/// ```
pub trait RenderBackend: RenderSystemApi + WindowApi + FramebufferApi {}

impl<T: RenderSystemApi + WindowApi + FramebufferApi> RenderBackend for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_data_instance() {
        let data = PlatformData::default();
        assert_eq!(data.instance(), 0);
        assert_eq!(data.with_instance(0x400000).instance(), 0x400000);
    }

    #[test]
    fn test_window_handle_maps_to_environment() {
        let env = EnvironmentHandle(RawHandle::from_bits(3));
        let window = WindowHandle::from(env);
        assert_eq!(window.environment(), env);
    }

    #[test]
    fn test_clear_color() {
        assert_eq!(ClearColor::RED.to_array(), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(ClearColor::GREEN.to_array(), [0.0, 1.0, 0.0, 1.0]);
    }
}
