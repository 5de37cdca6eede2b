//! 通过模拟驱动驱动公开 API 的端到端测试：帧循环、句柄、resize、同步

use dxr_harness::core::config::{FrameSync, GraphicsConfig};
use dxr_harness::core::{GraphicsError, HandleError, HarnessError};
use dxr_harness::gfx::dx12::Dx12Backend;
use dxr_harness::gfx::headless::{FailPoint, HeadlessDriver, RecordedCommand};
use dxr_harness::renderer::backend_trait::{
    ClearColor, EnvironmentHandle, FramebufferApi, FramebufferHandle, GraphicSettings,
    RenderSystemApi, WindowApi,
};
use dxr_harness::renderer::Renderer;

fn settings() -> GraphicSettings {
    GraphicSettings {
        width: 1280,
        height: 720,
        fullscreen: false,
        ..GraphicSettings::default()
    }
}

fn config(frame_sync: FrameSync) -> GraphicsConfig {
    GraphicsConfig {
        frame_sync,
        fence_timeout_ms: 10,
        ..GraphicsConfig::default()
    }
}

fn backend(driver: &HeadlessDriver, frame_sync: FrameSync) -> Dx12Backend<HeadlessDriver> {
    let mut backend = Dx12Backend::new(driver.clone(), &config(frame_sync));
    backend.init().unwrap();
    backend
}

fn frame(backend: &mut Dx12Backend<HeadlessDriver>, env: EnvironmentHandle, color: ClearColor) {
    backend.begin_frame(env).unwrap();
    let fb = backend.default_frame_buffer(env).unwrap();
    backend.clear(fb, color).unwrap();
    backend.submit(env).unwrap();
    backend.present(env).unwrap();
}

#[test]
fn test_end_to_end_single_frame() {
    let driver = HeadlessDriver::new();
    let backend = Box::new(Dx12Backend::new(driver.clone(), &config(FrameSync::PerBuffer)));
    let mut renderer = Renderer::new(backend, &settings()).unwrap();
    let env = renderer.environment();

    let fb = renderer.backend().default_frame_buffer(env).unwrap();
    let info = renderer.backend().describe(fb).unwrap();
    assert_eq!((info.width, info.height), (1280, 720));
    assert!(info.is_active);
    assert_eq!(renderer.backend().frame_index(env).unwrap(), 0);

    assert!(renderer.render());
    assert!(renderer.is_running());
    assert_eq!(renderer.backend().frame_index(env).unwrap(), 1);
    assert_eq!(driver.present_count(), 1);

    renderer.destroy().unwrap();
    assert_eq!(driver.live_objects(), 0);
    assert_eq!(driver.live_windows(), 0);
}

#[test]
fn test_window_registration_uses_separate_class_name() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let settings = GraphicSettings {
        window_name: "Title".to_string(),
        window_class: "Class".to_string(),
        ..settings()
    };
    backend.create_render_environment(&settings).unwrap();

    let registrations = driver.window_registrations();
    assert_eq!(registrations.len(), 1);
    assert_eq!(registrations[0].title, "Title");
    assert_eq!(registrations[0].class_name, "Class");
    assert_eq!((registrations[0].width, registrations[0].height), (1280, 720));
}

#[test]
fn test_frame_counter_and_buffer_index_cycle() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();

    let mut indices = Vec::new();
    for expected in 1..=4u64 {
        backend.begin_frame(env).unwrap();
        assert_eq!(backend.frame_index(env).unwrap(), expected);
        indices.push(backend.default_frame_buffer(env).unwrap().buffer);
        backend.submit(env).unwrap();
        backend.present(env).unwrap();
    }

    assert_eq!(indices, vec![0, 1, 0, 1]);
    assert!(indices.windows(2).all(|pair| pair[0] != pair[1]));
}

#[test]
fn test_idle_sync_mode_cycles_the_same_way() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::Idle);
    let env = backend.create_render_environment(&settings()).unwrap();

    for _ in 0..3 {
        frame(&mut backend, env, ClearColor::BLACK);
    }
    assert_eq!(backend.frame_index(env).unwrap(), 3);
    assert_eq!(driver.present_count(), 3);
}

#[test]
fn test_each_frame_clears_the_active_buffer_view() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();

    let fb = backend.default_frame_buffer(env).unwrap();
    let first = backend.describe(FramebufferHandle { buffer: 0, ..fb }).unwrap();
    let second = backend.describe(FramebufferHandle { buffer: 1, ..fb }).unwrap();
    frame(&mut backend, env, ClearColor::RED);
    frame(&mut backend, env, ClearColor::GREEN);

    let views: Vec<_> = driver
        .executed_commands()
        .into_iter()
        .filter_map(|c| match c {
            RecordedCommand::Clear { view, .. } => Some(view),
            _ => None,
        })
        .collect();
    assert_eq!(views, vec![first.rtv, second.rtv]);
    assert_ne!(first.rtv, second.rtv);
}

#[test]
fn test_clear_outside_recording_is_rejected() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();
    let fb = backend.default_frame_buffer(env).unwrap();

    assert!(matches!(
        backend.clear(fb, ClearColor::RED),
        Err(HarnessError::Graphics(GraphicsError::InvalidPhase { .. }))
    ));

    backend.begin_frame(env).unwrap();
    backend.submit(env).unwrap();
    assert!(matches!(
        backend.clear(fb, ClearColor::RED),
        Err(HarnessError::Graphics(GraphicsError::InvalidPhase { .. }))
    ));
    assert!(driver.executed_commands().is_empty());
}

#[test]
fn test_clear_on_inactive_buffer_is_rejected() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();

    let stale_buffer = backend.default_frame_buffer(env).unwrap();
    frame(&mut backend, env, ClearColor::RED);

    // 上一帧的缓冲已经不是当前后台缓冲
    backend.begin_frame(env).unwrap();
    assert!(matches!(
        backend.clear(stale_buffer, ClearColor::GREEN),
        Err(HarnessError::Graphics(GraphicsError::InactiveFramebuffer {
            requested: 0,
            active: 1
        }))
    ));
}

#[test]
fn test_resize_to_current_size_changes_nothing() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();

    let fb = backend.default_frame_buffer(env).unwrap();
    let before = backend.describe(fb).unwrap();
    let views_before = driver.views_written();

    backend.resize_window(env, 1280, 720).unwrap();

    let after = backend.describe(fb).unwrap();
    assert_eq!(before, after);
    assert_eq!(driver.views_written(), views_before);
}

#[test]
fn test_resize_clamps_to_one_pixel_and_invalidates_framebuffers() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();
    frame(&mut backend, env, ClearColor::RED);

    let old = backend.default_frame_buffer(env).unwrap();
    backend.resize_window(env, 0, 0).unwrap();

    assert!(matches!(
        backend.describe(old),
        Err(HarnessError::Handle(HandleError::Stale))
    ));
    let fresh = backend.default_frame_buffer(env).unwrap();
    let info = backend.describe(fresh).unwrap();
    assert_eq!((info.width, info.height), (1, 1));
    assert_eq!(info.fence_value.value(), 0);

    // resize 之后帧循环照常运行
    frame(&mut backend, env, ClearColor::GREEN);
    assert_eq!(backend.frame_index(env).unwrap(), 2);
}

#[test]
fn test_hung_gpu_times_out_as_device_lost() {
    let driver = HeadlessDriver::new();
    let backend = Box::new(Dx12Backend::new(driver.clone(), &config(FrameSync::PerBuffer)));
    let mut renderer = Renderer::new(backend, &settings()).unwrap();

    driver.set_gpu_hung(true);
    // 两个后台缓冲各自的第一帧不需要等待，第三帧复用缓冲 0 时超时
    assert!(renderer.render());
    assert!(renderer.render());
    assert!(!renderer.render());
    assert!(!renderer.is_running());

    let env = renderer.environment();
    let err = renderer.backend_mut().begin_frame(env).unwrap_err();
    assert!(err.is_device_lost());
    assert!(matches!(
        err,
        HarnessError::Graphics(GraphicsError::FenceTimeout { target: 1, .. })
    ));

    renderer.destroy().unwrap();
    assert_eq!(driver.live_objects(), 0);
}

#[test]
fn test_hung_gpu_in_idle_mode_fails_at_present() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::Idle);
    let env = backend.create_render_environment(&settings()).unwrap();

    driver.set_gpu_hung(true);
    backend.begin_frame(env).unwrap();
    backend.submit(env).unwrap();
    let err = backend.present(env).unwrap_err();
    assert!(err.is_device_lost());
}

#[test]
fn test_present_failure_reports_device_removed() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();

    driver.fail_at(FailPoint::Present);
    backend.begin_frame(env).unwrap();
    backend.submit(env).unwrap();
    match backend.present(env) {
        Err(HarnessError::Graphics(GraphicsError::DeviceRemoved { reason })) => {
            assert!(reason.contains("DEVICE_HUNG"));
        }
        other => panic!("unexpected present result: {:?}", other.err()),
    }
    assert!(backend
        .environment(env)
        .unwrap()
        .last_error()
        .unwrap()
        .starts_with("present"));
}

#[test]
fn test_handles_are_stale_after_destroy() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();
    let window = backend.render_window(env).unwrap();
    let fb = backend.default_frame_buffer(env).unwrap();

    backend.show(window).unwrap();
    assert!(backend.is_active(window).unwrap());
    backend.hide(window).unwrap();
    assert!(!backend.is_active(window).unwrap());

    backend.destroy_render_environment(env).unwrap();
    assert_eq!(driver.live_objects(), 0);
    assert_eq!(backend.environment_count(), 0);

    assert!(matches!(
        backend.frame_index(env),
        Err(HarnessError::Handle(HandleError::Stale))
    ));
    assert!(matches!(
        backend.is_active(window),
        Err(HarnessError::Handle(HandleError::Stale))
    ));
    assert!(matches!(
        backend.clear(fb, ClearColor::RED),
        Err(HarnessError::Handle(HandleError::Stale))
    ));

    // 复用槽位的新环境不会被旧句柄访问到
    let second = backend.create_render_environment(&settings()).unwrap();
    assert_ne!(second, env);
    assert!(backend.frame_index(env).is_err());
    assert_eq!(backend.frame_index(second).unwrap(), 0);
}

#[test]
fn test_window_swap_presents() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();
    let window = backend.render_window(env).unwrap();

    backend.begin_frame(env).unwrap();
    backend.submit(env).unwrap();
    backend.swap(window).unwrap();
    assert_eq!(driver.present_count(), 1);

    // 同一帧不能 present 两次
    assert!(backend.swap(window).is_err());
}

#[test]
fn test_get_time_advances() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();

    let first = backend.get_time(env).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = backend.get_time(env).unwrap();
    assert!(first >= 0.0);
    assert!(second > first);
}

#[test]
fn test_environment_recovers_after_failed_resize() {
    let driver = HeadlessDriver::new();
    let mut backend = backend(&driver, FrameSync::PerBuffer);
    let env = backend.create_render_environment(&settings()).unwrap();

    driver.fail_at(FailPoint::ResizeBuffers);
    assert!(backend.resize_window(env, 640, 480).is_err());
    assert!(matches!(
        backend.begin_frame(env),
        Err(HarnessError::Graphics(GraphicsError::SwapChain(_)))
    ));
    assert_eq!(backend.frame_index(env).unwrap(), 0);

    driver.clear_failures();
    backend.resize_window(env, 640, 480).unwrap();
    frame(&mut backend, env, ClearColor::RED);

    let info = backend
        .describe(backend.default_frame_buffer(env).unwrap())
        .unwrap();
    assert_eq!((info.width, info.height), (640, 480));
    assert_eq!(backend.frame_index(env).unwrap(), 1);
}
