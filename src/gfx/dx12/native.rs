//! Win32 + DirectX 12 原生驱动
//!
//! 用 `windows` crate 实现 [`GraphicsDriver`]。每个关联类型都是 COM 接口
//! 或者持有原生句柄的包装，析构时释放对应的原生对象。
//!
//! 窗口过程把按键、绘制、尺寸变化和关闭请求放进窗口自己的事件队列，
//! 由 `poll_events` 泵完消息后一次取出。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::time::Duration;

use tracing::{debug, error, warn};
use windows::core::{Interface, HSTRING, PCWSTR};
use windows::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_CLASS_ALREADY_EXISTS, HANDLE, HINSTANCE, HWND, LPARAM,
    LRESULT, RECT, WAIT_OBJECT_0, WAIT_TIMEOUT, WPARAM,
};
use windows::Win32::Graphics::Direct3D::{
    D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_11_1, D3D_FEATURE_LEVEL_12_0,
    D3D_FEATURE_LEVEL_12_1,
};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_FORMAT_UNKNOWN, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::*;
use windows::Win32::Graphics::Gdi::ValidateRect;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::core::error::GraphicsError;
use crate::gfx::backend::{
    AdapterInfo, DriverResult, FeatureLevel, GraphicsDriver, PixelFormat, PresentMode,
    ResourceState, SwapChainDesc, WindowDesc,
};
use crate::renderer::backend_trait::WindowEvent;
use crate::renderer::descriptor::{CpuDescriptorHandle, DescriptorHeapType, GpuDescriptorHandle};
use crate::renderer::sync::WaitStatus;

/// 窗口过程写入、`poll_events` 读取的事件队列
#[derive(Default)]
struct WindowState {
    events: RefCell<VecDeque<WindowEvent>>,
}

impl WindowState {
    fn push(&self, event: WindowEvent) {
        if let Ok(mut events) = self.events.try_borrow_mut() {
            events.push_back(event);
        }
    }
}

/// 原生窗口
pub struct NativeWindow {
    hwnd: HWND,
    state: *mut WindowState,
}

impl NativeWindow {
    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    fn state(&self) -> &WindowState {
        // 指针在窗口存活期间一直有效，只在 Drop 中回收
        unsafe { &*self.state }
    }
}

impl Drop for NativeWindow {
    fn drop(&mut self) {
        unsafe {
            SetWindowLongPtrW(self.hwnd, GWLP_USERDATA, 0);
            if let Err(e) = DestroyWindow(self.hwnd) {
                warn!(error = %e, "DestroyWindow failed");
            }
            drop(Box::from_raw(self.state));
        }
    }
}

/// 栅栏等待事件
pub struct FenceEvent(HANDLE);

impl Drop for FenceEvent {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// 描述符堆及其可见性
pub struct NativeDescriptorHeap {
    heap: ID3D12DescriptorHeap,
    shader_visible: bool,
}

/// Win32 + D3D12 驱动
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDriver;

impl NativeDriver {
    pub fn new() -> Self {
        Self
    }
}

fn feature_level(level: FeatureLevel) -> D3D_FEATURE_LEVEL {
    match level {
        FeatureLevel::Level11_0 => D3D_FEATURE_LEVEL_11_0,
        FeatureLevel::Level11_1 => D3D_FEATURE_LEVEL_11_1,
        FeatureLevel::Level12_0 => D3D_FEATURE_LEVEL_12_0,
        FeatureLevel::Level12_1 => D3D_FEATURE_LEVEL_12_1,
    }
}

fn heap_type(heap_type: DescriptorHeapType) -> D3D12_DESCRIPTOR_HEAP_TYPE {
    match heap_type {
        DescriptorHeapType::CbvSrvUav => D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
        DescriptorHeapType::Sampler => D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
        DescriptorHeapType::Rtv => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
        DescriptorHeapType::Dsv => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
    }
}

fn pixel_format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::R8G8B8A8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
    }
}

fn swap_effect(mode: PresentMode) -> DXGI_SWAP_EFFECT {
    match mode {
        PresentMode::FlipDiscard => DXGI_SWAP_EFFECT_FLIP_DISCARD,
    }
}

fn resource_state(state: ResourceState) -> D3D12_RESOURCE_STATES {
    match state {
        ResourceState::Present => D3D12_RESOURCE_STATE_PRESENT,
        ResourceState::RenderTarget => D3D12_RESOURCE_STATE_RENDER_TARGET,
    }
}

fn creation_error(what: &'static str) -> impl FnOnce(windows::core::Error) -> GraphicsError {
    move |e| GraphicsError::ResourceCreation(format!("{}: {}", what, e))
}

fn command_error(what: &'static str) -> impl FnOnce(windows::core::Error) -> GraphicsError {
    move |e| GraphicsError::CommandExecution(format!("{}: {}", what, e))
}

fn swap_chain_error(what: &'static str) -> impl FnOnce(windows::core::Error) -> GraphicsError {
    move |e| GraphicsError::SwapChain(format!("{}: {}", what, e))
}

fn loword(value: isize) -> u32 {
    (value as usize & 0xffff) as u32
}

fn hiword(value: isize) -> u32 {
    ((value as usize >> 16) & 0xffff) as u32
}

extern "system" fn window_proc(hwnd: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe {
        if message == WM_NCCREATE {
            let create_struct = &*(lparam.0 as *const CREATESTRUCTW);
            SetWindowLongPtrW(hwnd, GWLP_USERDATA, create_struct.lpCreateParams as isize);
            return DefWindowProcW(hwnd, message, wparam, lparam);
        }

        let state = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const WindowState;
        let Some(state) = state.as_ref() else {
            return DefWindowProcW(hwnd, message, wparam, lparam);
        };

        match message {
            WM_KEYDOWN => {
                state.push(WindowEvent::KeyDown(wparam.0 as u8));
                LRESULT(0)
            }
            WM_KEYUP => {
                state.push(WindowEvent::KeyUp(wparam.0 as u8));
                LRESULT(0)
            }
            WM_PAINT => {
                let _ = ValidateRect(Some(hwnd), None);
                state.push(WindowEvent::Paint);
                LRESULT(0)
            }
            WM_SIZE => {
                state.push(WindowEvent::Resized {
                    width: loword(lparam.0),
                    height: hiword(lparam.0),
                });
                LRESULT(0)
            }
            // 窗口的销毁由渲染环境负责
            WM_CLOSE => {
                state.push(WindowEvent::CloseRequested);
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, message, wparam, lparam),
        }
    }
}

impl GraphicsDriver for NativeDriver {
    type Window = NativeWindow;
    type Factory = IDXGIFactory4;
    type Adapter = IDXGIAdapter1;
    type Device = ID3D12Device;
    type Queue = ID3D12CommandQueue;
    type Allocator = ID3D12CommandAllocator;
    type CommandList = ID3D12GraphicsCommandList;
    type Fence = ID3D12Fence;
    type Event = FenceEvent;
    type SwapChain = IDXGISwapChain3;
    type Resource = ID3D12Resource;
    type DescriptorHeap = NativeDescriptorHeap;

    fn name(&self) -> &'static str {
        "d3d12"
    }

    fn create_window(&self, desc: &WindowDesc<'_>) -> DriverResult<NativeWindow> {
        let instance: HINSTANCE = if desc.instance != 0 {
            HINSTANCE(desc.instance as *mut c_void)
        } else {
            unsafe { GetModuleHandleW(None) }
                .map_err(creation_error("GetModuleHandleW"))?
                .into()
        };

        let class_name = HSTRING::from(desc.class_name);
        let title = HSTRING::from(desc.title);

        let class = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: CS_HREDRAW | CS_VREDRAW,
            lpfnWndProc: Some(window_proc),
            hInstance: instance,
            hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }.unwrap_or_default(),
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };
        if unsafe { RegisterClassExW(&class) } == 0 {
            let last = unsafe { GetLastError() };
            if last != ERROR_CLASS_ALREADY_EXISTS {
                return Err(GraphicsError::ResourceCreation(format!(
                    "RegisterClassExW({}) failed: {:?}",
                    desc.class_name, last
                )));
            }
            debug!(class = desc.class_name, "Window class already registered");
        }

        let mut rect = RECT {
            left: 0,
            top: 0,
            right: desc.width as i32,
            bottom: desc.height as i32,
        };
        unsafe { AdjustWindowRect(&mut rect, WS_OVERLAPPEDWINDOW, false) }
            .map_err(creation_error("AdjustWindowRect"))?;

        let state = Box::into_raw(Box::new(WindowState::default()));
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                PCWSTR(class_name.as_ptr()),
                PCWSTR(title.as_ptr()),
                WS_OVERLAPPEDWINDOW,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                rect.right - rect.left,
                rect.bottom - rect.top,
                None,
                None,
                Some(instance),
                Some(state as *const c_void),
            )
        };

        match hwnd {
            Ok(hwnd) => {
                debug!(title = desc.title, class = desc.class_name, "Window created");
                Ok(NativeWindow { hwnd, state })
            }
            Err(e) => {
                drop(unsafe { Box::from_raw(state) });
                Err(creation_error("CreateWindowExW")(e))
            }
        }
    }

    fn set_window_visible(&self, window: &NativeWindow, visible: bool) {
        let command = if visible { SW_SHOW } else { SW_HIDE };
        unsafe {
            let _ = ShowWindow(window.hwnd, command);
        }
    }

    fn is_window_visible(&self, window: &NativeWindow) -> bool {
        unsafe { IsWindowVisible(window.hwnd) }.as_bool()
    }

    fn poll_events(&self, window: &NativeWindow) -> Vec<WindowEvent> {
        let mut message = MSG::default();
        unsafe {
            while PeekMessageW(&mut message, Some(window.hwnd), 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&message);
                DispatchMessageW(&message);
            }
        }
        window.state().events.borrow_mut().drain(..).collect()
    }

    fn create_factory(&self, debug: bool) -> DriverResult<IDXGIFactory4> {
        let flags = if debug {
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            DXGI_CREATE_FACTORY_FLAGS(0)
        };
        unsafe { CreateDXGIFactory2(flags) }
            .map_err(|e| GraphicsError::DeviceCreation(format!("CreateDXGIFactory2: {}", e)))
    }

    fn enum_adapter(&self, factory: &IDXGIFactory4, index: u32) -> Option<(IDXGIAdapter1, AdapterInfo)> {
        let adapter = unsafe { factory.EnumAdapters1(index) }.ok()?;
        let desc = match unsafe { adapter.GetDesc1() } {
            Ok(desc) => desc,
            Err(e) => {
                warn!(index, error = %e, "GetDesc1 failed");
                return None;
            }
        };

        let len = desc
            .Description
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(desc.Description.len());
        let info = AdapterInfo {
            index,
            name: String::from_utf16_lossy(&desc.Description[..len]),
            is_software: desc.Flags & DXGI_ADAPTER_FLAG_SOFTWARE.0 as u32 != 0,
            dedicated_video_memory: desc.DedicatedVideoMemory as u64,
        };
        Some((adapter, info))
    }

    fn supports_feature_level(&self, adapter: &IDXGIAdapter1, level: FeatureLevel) -> bool {
        unsafe {
            D3D12CreateDevice(
                adapter,
                feature_level(level),
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok()
    }

    fn create_device(&self, adapter: &IDXGIAdapter1, level: FeatureLevel) -> DriverResult<ID3D12Device> {
        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(adapter, feature_level(level), &mut device) }
            .map_err(|e| GraphicsError::DeviceCreation(format!("D3D12CreateDevice: {}", e)))?;
        device.ok_or_else(|| GraphicsError::DeviceCreation("D3D12CreateDevice returned no device".to_string()))
    }

    fn device_removed_reason(&self, device: &ID3D12Device) -> Option<String> {
        unsafe { device.GetDeviceRemovedReason() }
            .err()
            .map(|e| format!("{} ({:?})", e.message(), e.code()))
    }

    fn create_descriptor_heap(
        &self,
        device: &ID3D12Device,
        ty: DescriptorHeapType,
        capacity: u32,
        shader_visible: bool,
    ) -> DriverResult<NativeDescriptorHeap> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type(ty),
            NumDescriptors: capacity,
            Flags: if shader_visible {
                D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: 0,
        };
        let heap = unsafe { device.CreateDescriptorHeap(&desc) }
            .map_err(creation_error("CreateDescriptorHeap"))?;
        Ok(NativeDescriptorHeap {
            heap,
            shader_visible,
        })
    }

    fn descriptor_increment_size(&self, device: &ID3D12Device, ty: DescriptorHeapType) -> u32 {
        unsafe { device.GetDescriptorHandleIncrementSize(heap_type(ty)) }
    }

    fn heap_cpu_start(&self, heap: &NativeDescriptorHeap) -> CpuDescriptorHandle {
        let start = unsafe { heap.heap.GetCPUDescriptorHandleForHeapStart() };
        CpuDescriptorHandle::new(start.ptr)
    }

    fn heap_gpu_start(&self, heap: &NativeDescriptorHeap) -> Option<GpuDescriptorHandle> {
        if !heap.shader_visible {
            return None;
        }
        let start = unsafe { heap.heap.GetGPUDescriptorHandleForHeapStart() };
        Some(GpuDescriptorHandle::new(start.ptr))
    }

    fn create_render_target_view(
        &self,
        device: &ID3D12Device,
        resource: &ID3D12Resource,
        dest: CpuDescriptorHandle,
    ) {
        unsafe {
            device.CreateRenderTargetView(
                resource,
                None,
                D3D12_CPU_DESCRIPTOR_HANDLE { ptr: dest.ptr },
            );
        }
    }

    fn create_command_queue(&self, device: &ID3D12Device) -> DriverResult<ID3D12CommandQueue> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
            ..Default::default()
        };
        unsafe { device.CreateCommandQueue(&desc) }.map_err(creation_error("CreateCommandQueue"))
    }

    fn create_command_allocator(&self, device: &ID3D12Device) -> DriverResult<ID3D12CommandAllocator> {
        unsafe { device.CreateCommandAllocator(D3D12_COMMAND_LIST_TYPE_DIRECT) }
            .map_err(creation_error("CreateCommandAllocator"))
    }

    fn create_command_list(
        &self,
        device: &ID3D12Device,
        allocator: &ID3D12CommandAllocator,
    ) -> DriverResult<ID3D12GraphicsCommandList> {
        unsafe {
            device.CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, allocator, None::<&ID3D12PipelineState>)
        }
        .map_err(creation_error("CreateCommandList"))
    }

    fn reset_command_allocator(&self, allocator: &ID3D12CommandAllocator) -> DriverResult<()> {
        unsafe { allocator.Reset() }.map_err(command_error("ID3D12CommandAllocator::Reset"))
    }

    fn reset_command_list(
        &self,
        list: &ID3D12GraphicsCommandList,
        allocator: &ID3D12CommandAllocator,
    ) -> DriverResult<()> {
        unsafe { list.Reset(allocator, None::<&ID3D12PipelineState>) }
            .map_err(command_error("ID3D12GraphicsCommandList::Reset"))
    }

    fn close_command_list(&self, list: &ID3D12GraphicsCommandList) -> DriverResult<()> {
        unsafe { list.Close() }.map_err(command_error("ID3D12GraphicsCommandList::Close"))
    }

    fn resource_barrier(
        &self,
        list: &ID3D12GraphicsCommandList,
        resource: &ID3D12Resource,
        before: ResourceState,
        after: ResourceState,
    ) {
        // 屏障只借用资源指针，不增加引用计数
        let barrier = D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                    pResource: unsafe { std::mem::transmute_copy(resource) },
                    Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                    StateBefore: resource_state(before),
                    StateAfter: resource_state(after),
                }),
            },
        };
        unsafe { list.ResourceBarrier(&[barrier]) };
    }

    fn clear_render_target(&self, list: &ID3D12GraphicsCommandList, view: CpuDescriptorHandle, color: [f32; 4]) {
        unsafe {
            list.ClearRenderTargetView(D3D12_CPU_DESCRIPTOR_HANDLE { ptr: view.ptr }, &color, None);
        }
    }

    fn execute_command_list(&self, queue: &ID3D12CommandQueue, list: &ID3D12GraphicsCommandList) {
        match list.cast::<ID3D12CommandList>() {
            Ok(list) => unsafe { queue.ExecuteCommandLists(&[Some(list)]) },
            Err(e) => error!(error = %e, "Command list does not expose ID3D12CommandList"),
        }
    }

    fn create_fence(&self, device: &ID3D12Device, initial: u64) -> DriverResult<ID3D12Fence> {
        unsafe { device.CreateFence(initial, D3D12_FENCE_FLAG_NONE) }
            .map_err(creation_error("CreateFence"))
    }

    fn create_fence_event(&self) -> DriverResult<FenceEvent> {
        let event = unsafe { CreateEventW(None, false, false, None) }
            .map_err(creation_error("CreateEventW"))?;
        Ok(FenceEvent(event))
    }

    fn signal(&self, queue: &ID3D12CommandQueue, fence: &ID3D12Fence, value: u64) -> DriverResult<()> {
        unsafe { queue.Signal(fence, value) }.map_err(command_error("ID3D12CommandQueue::Signal"))
    }

    fn completed_value(&self, fence: &ID3D12Fence) -> u64 {
        unsafe { fence.GetCompletedValue() }
    }

    fn wait_for_fence(
        &self,
        fence: &ID3D12Fence,
        value: u64,
        event: &FenceEvent,
        timeout: Duration,
    ) -> DriverResult<WaitStatus> {
        unsafe { fence.SetEventOnCompletion(value, event.0) }
            .map_err(command_error("ID3D12Fence::SetEventOnCompletion"))?;

        let millis = u32::try_from(timeout.as_millis())
            .unwrap_or(INFINITE - 1)
            .min(INFINITE - 1);
        let result = unsafe { WaitForSingleObject(event.0, millis) };
        if result == WAIT_OBJECT_0 {
            Ok(WaitStatus::Signaled)
        } else if result == WAIT_TIMEOUT {
            Ok(WaitStatus::TimedOut)
        } else {
            Err(GraphicsError::CommandExecution(format!(
                "WaitForSingleObject returned {:?}",
                result
            )))
        }
    }

    fn create_swap_chain(
        &self,
        factory: &IDXGIFactory4,
        queue: &ID3D12CommandQueue,
        window: &NativeWindow,
        desc: &SwapChainDesc,
    ) -> DriverResult<IDXGISwapChain3> {
        let native_desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: desc.width,
            Height: desc.height,
            Format: pixel_format(desc.format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: desc.buffer_count,
            SwapEffect: swap_effect(desc.present_mode),
            ..Default::default()
        };

        let swap_chain: IDXGISwapChain1 = unsafe {
            factory.CreateSwapChainForHwnd(queue, window.hwnd, &native_desc, None, None)
        }
        .map_err(swap_chain_error("CreateSwapChainForHwnd"))?;

        if !desc.allow_alt_enter {
            unsafe { factory.MakeWindowAssociation(window.hwnd, DXGI_MWA_NO_ALT_ENTER) }
                .map_err(swap_chain_error("MakeWindowAssociation"))?;
        }

        swap_chain
            .cast::<IDXGISwapChain3>()
            .map_err(swap_chain_error("IDXGISwapChain3"))
    }

    fn swap_chain_buffer(&self, swap_chain: &IDXGISwapChain3, index: u32) -> DriverResult<ID3D12Resource> {
        unsafe { swap_chain.GetBuffer(index) }.map_err(swap_chain_error("GetBuffer"))
    }

    fn current_back_buffer_index(&self, swap_chain: &IDXGISwapChain3) -> u32 {
        unsafe { swap_chain.GetCurrentBackBufferIndex() }
    }

    fn resize_buffers(&self, swap_chain: &IDXGISwapChain3, desc: &SwapChainDesc) -> DriverResult<()> {
        // DXGI_FORMAT_UNKNOWN 保留原有格式
        unsafe {
            swap_chain.ResizeBuffers(
                desc.buffer_count,
                desc.width,
                desc.height,
                DXGI_FORMAT_UNKNOWN,
                DXGI_SWAP_CHAIN_FLAG(0),
            )
        }
        .map_err(swap_chain_error("ResizeBuffers"))
    }

    fn present(&self, swap_chain: &IDXGISwapChain3, sync_interval: u32) -> DriverResult<()> {
        unsafe { swap_chain.Present(sync_interval, DXGI_PRESENT(0)) }
            .ok()
            .map_err(swap_chain_error("Present"))
    }
}
