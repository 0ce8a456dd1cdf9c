//! Player window: shows the scheduler's frames and turns key presses into
//! playback commands. Runs on the main thread.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use softbuffer::{Context as SoftContext, Surface};
use tracing::{debug, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Icon, Window, WindowId};

use crate::controller::PlaybackController;
use crate::display::DisplaySurface;
use crate::error::Error;
use crate::processing::transition::TransitionFrame;

/// A composited frame in softbuffer's `0RGB` pixel layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePixels {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl FramePixels {
    pub fn from_frame(frame: &TransitionFrame) -> Self {
        let image = frame.composite();
        let (width, height) = image.dimensions();
        let pixels = image
            .pixels()
            .map(|px| {
                let [r, g, b, _] = px.0;
                (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
            })
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Copies the frame centered into a `width` x `height` buffer, black
    /// around it and cropped when the buffer is smaller.
    pub fn blit(&self, dst: &mut [u32], width: u32, height: u32) {
        dst.fill(0);
        let copy_w = self.width.min(width);
        let copy_h = self.height.min(height);
        let (dst_x, dst_y) = ((width - copy_w) / 2, (height - copy_h) / 2);
        let (src_x, src_y) = ((self.width - copy_w) / 2, (self.height - copy_h) / 2);
        let row = copy_w as usize;
        for y in 0..copy_h {
            let s = ((src_y + y) * self.width + src_x) as usize;
            let d = ((dst_y + y) * width + dst_x) as usize;
            dst[d..d + row].copy_from_slice(&self.pixels[s..s + row]);
        }
    }
}

#[derive(Debug)]
pub enum ViewerEvent {
    Frame(FramePixels),
    Shutdown,
}

/// Display surface that hands frames to the window's event loop.
#[derive(Clone)]
pub struct WindowSurface {
    proxy: EventLoopProxy<ViewerEvent>,
}

impl DisplaySurface for WindowSurface {
    fn present(&mut self, frame: &TransitionFrame) {
        let pixels = FramePixels::from_frame(frame);
        if self.proxy.send_event(ViewerEvent::Frame(pixels)).is_err() {
            debug!("viewer closed; dropping frame");
        }
    }
}

/// Asks a running viewer to close from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    proxy: EventLoopProxy<ViewerEvent>,
}

impl ShutdownHandle {
    pub fn request_shutdown(&self) {
        let _ = self.proxy.send_event(ViewerEvent::Shutdown);
    }
}

pub struct ViewerOptions {
    pub title: String,
    pub canvas: (u32, u32),
    pub icon: Option<Icon>,
}

/// Reads a PNG (or any format `image` decodes) into a window icon.
pub fn load_icon(path: &Path) -> Result<Icon> {
    let rgba = image::open(path)
        .with_context(|| format!("failed to read window icon {}", path.display()))?
        .into_rgba8();
    let (width, height) = rgba.dimensions();
    Icon::from_rgba(rgba.into_raw(), width, height)
        .with_context(|| format!("invalid window icon {}", path.display()))
}

pub struct Viewer {
    event_loop: EventLoop<ViewerEvent>,
}

impl Viewer {
    pub fn new() -> Result<Self> {
        let event_loop = EventLoop::<ViewerEvent>::with_user_event()
            .build()
            .context("failed to create event loop")?;
        Ok(Self { event_loop })
    }

    pub fn surface(&self) -> WindowSurface {
        WindowSurface {
            proxy: self.event_loop.create_proxy(),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            proxy: self.event_loop.create_proxy(),
        }
    }

    /// Blocks until the window closes, Escape is pressed or shutdown is requested.
    pub fn run(self, controller: &mut PlaybackController, options: ViewerOptions) -> Result<()> {
        let mut app = ViewerApp::new(controller, options);
        self.event_loop
            .run_app(&mut app)
            .context("viewer event loop failed")?;
        match app.failed.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

type WindowHandle = Arc<Window>;

struct ViewerApp<'a> {
    controller: &'a mut PlaybackController,
    title: String,
    canvas: (u32, u32),
    icon: Option<Icon>,
    window: Option<WindowHandle>,
    context: Option<SoftContext<WindowHandle>>,
    surface: Option<Surface<WindowHandle, WindowHandle>>,
    frame: Option<FramePixels>,
    failed: Option<anyhow::Error>,
}

impl<'a> ViewerApp<'a> {
    fn new(controller: &'a mut PlaybackController, options: ViewerOptions) -> Self {
        Self {
            controller,
            title: options.title,
            canvas: options.canvas,
            icon: options.icon,
            window: None,
            context: None,
            surface: None,
            frame: None,
            failed: None,
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.create_window(event_loop) {
            self.failed = Some(err);
            event_loop.exit();
        }
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (width, height) = self.canvas;
        let attrs = Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(false)
            .with_window_icon(self.icon.take());
        let window = WindowHandle::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );
        let context = SoftContext::new(window.clone())
            .map_err(|err| anyhow::anyhow!("failed to create softbuffer context: {err}"))?;
        let surface = Surface::new(&context, window.clone())
            .map_err(|err| anyhow::anyhow!("failed to create softbuffer surface: {err}"))?;
        self.context = Some(context);
        self.surface = Some(surface);
        self.handle_resize(window.inner_size());
        window.request_redraw();
        self.window = Some(window);
        info!(width, height, "viewer window opened");
        Ok(())
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(surface) = self.surface.as_mut()
            && let (Some(width), Some(height)) = (
                NonZeroU32::new(size.width.max(1)),
                NonZeroU32::new(size.height.max(1)),
            )
        {
            let _ = surface.resize(width, height);
        }
    }

    fn render(&mut self) {
        let (Some(surface), Some(window)) = (self.surface.as_mut(), self.window.as_ref()) else {
            return;
        };
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));
        match surface.buffer_mut() {
            Ok(mut buffer) => {
                match &self.frame {
                    Some(frame) => frame.blit(&mut buffer, width, height),
                    None => buffer.fill(0),
                }
                if let Err(err) = buffer.present() {
                    warn!("failed to present frame: {err}");
                }
            }
            Err(err) => warn!("failed to map window buffer: {err}"),
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let result = match &event.logical_key {
            Key::Named(NamedKey::ArrowRight) => self.controller.next(),
            Key::Named(NamedKey::ArrowLeft) => self.controller.previous(),
            Key::Named(NamedKey::Space) => self.controller.toggle_play_pause().map(|_| ()),
            Key::Named(NamedKey::Escape) => {
                info!("escape pressed; closing viewer");
                event_loop.exit();
                return;
            }
            _ => return,
        };
        match result {
            Ok(()) => {}
            Err(Error::ManualAdvance) => debug!("play/pause ignored for a manual show"),
            Err(err) => warn!("key command failed: {err}"),
        }
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        self.ensure_window(event_loop);
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Frame(frame) => {
                self.frame = Some(frame);
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }
            ViewerEvent::Shutdown => {
                info!("shutdown requested; closing viewer");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => event_loop.exit(),
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::RedrawRequested => self.render(),
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, event),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn pixels_are_packed_as_0rgb() {
        let image = Arc::new(RgbaImage::from_pixel(2, 1, Rgba([0x12, 0x34, 0x56, 0x80])));
        let pixels = FramePixels::from_frame(&TransitionFrame::still(image));
        assert_eq!(pixels.dimensions(), (2, 1));
        assert_eq!(pixels.pixels(), &[0x0012_3456, 0x0012_3456]);
    }

    #[test]
    fn blit_centers_a_small_frame() {
        let frame = FramePixels {
            width: 2,
            height: 1,
            pixels: vec![7, 8],
        };
        let mut dst = vec![1u32; 4 * 3];
        frame.blit(&mut dst, 4, 3);
        assert_eq!(dst, vec![0, 0, 0, 0, 0, 7, 8, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn blit_crops_a_large_frame() {
        let frame = FramePixels {
            width: 3,
            height: 3,
            pixels: (0..9).collect(),
        };
        let mut dst = vec![0u32; 1];
        frame.blit(&mut dst, 1, 1);
        assert_eq!(dst, vec![4]);
    }
}
