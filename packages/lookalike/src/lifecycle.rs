//! Mount/unmount lifecycle for the background animation.
//!
//! `BackgroundHost` ties a scene and a render surface to a frame scheduler.
//! Each frame callback advances the scene, draws, and asks for the next frame.
//! Unmounting cancels the outstanding frame request and disposes the surface.

use std::time::{Duration, Instant};

use crate::background::BackgroundScene;
use crate::pointer::PointerState;

pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(200);

pub type FrameId = u64;

/// Source of frame callbacks (a display refresh loop, or a manual stepper).
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameId;
    fn cancel_frame(&mut self, id: FrameId);
}

/// Anything that can draw the scene.
pub trait RenderSurface {
    fn resize(&mut self, width: u32, height: u32);
    fn draw(&mut self, scene: &BackgroundScene);
    /// Release GPU resources. Called exactly once.
    fn dispose(&mut self);
}

/// Scheduler driven by the caller, one `on_frame` at a time.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    next_id: FrameId,
    pending: Option<FrameId>,
    cancelled: Vec<FrameId>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<FrameId> {
        self.pending
    }

    pub fn cancelled(&self) -> &[FrameId] {
        &self.cancelled
    }
}

impl FrameScheduler for ManualScheduler {
    fn request_frame(&mut self) -> FrameId {
        self.next_id += 1;
        self.pending = Some(self.next_id);
        self.next_id
    }

    fn cancel_frame(&mut self, id: FrameId) {
        if self.pending == Some(id) {
            self.pending = None;
        }
        self.cancelled.push(id);
    }
}

/// Collapses bursts of resize events into one, applied after a quiet period.
#[derive(Debug, Clone)]
pub struct ResizeDebouncer {
    quiet: Duration,
    pending: Option<((u32, u32), Instant)>,
}

impl Default for ResizeDebouncer {
    fn default() -> Self {
        Self::new(RESIZE_DEBOUNCE)
    }
}

impl ResizeDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self { quiet, pending: None }
    }

    /// Record a resize. Restarts the quiet period.
    pub fn notify(&mut self, size: (u32, u32), now: Instant) {
        self.pending = Some((size, now));
    }

    /// The latest size, once no resize has arrived for the quiet period.
    pub fn poll(&mut self, now: Instant) -> Option<(u32, u32)> {
        match self.pending {
            Some((size, at)) if now.saturating_duration_since(at) >= self.quiet => {
                self.pending = None;
                Some(size)
            }
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

pub struct BackgroundHost<S: FrameScheduler, R: RenderSurface> {
    scheduler: S,
    surface: Option<R>,
    scene: Option<BackgroundScene>,
    pointer: PointerState,
    resize: ResizeDebouncer,
    viewport: (u32, u32),
    pending_frame: Option<FrameId>,
    first_frame_ms: Option<f64>,
    last_frame_ms: Option<f64>,
}

impl<S: FrameScheduler, R: RenderSurface> BackgroundHost<S, R> {
    /// Size everything to `viewport` and request the first frame.
    pub fn mount(mut scheduler: S, mut surface: R, mut scene: BackgroundScene, viewport: (u32, u32)) -> Self {
        scene.set_viewport(viewport.0, viewport.1);
        surface.resize(viewport.0, viewport.1);
        let pending_frame = Some(scheduler.request_frame());
        log::debug!("Background mounted at {}x{}", viewport.0, viewport.1);

        Self {
            scheduler,
            surface: Some(surface),
            scene: Some(scene),
            pointer: PointerState::new(),
            resize: ResizeDebouncer::default(),
            viewport,
            pending_frame,
            first_frame_ms: None,
            last_frame_ms: None,
        }
    }

    /// Frame callback. `timestamp_ms` is the scheduler's clock; elapsed time
    /// for the animation is measured from the first frame.
    pub fn on_frame(&mut self, timestamp_ms: f64, now: Instant) {
        let (Some(scene), Some(surface)) = (self.scene.as_mut(), self.surface.as_mut()) else {
            return;
        };
        self.pending_frame = None;

        if let Some((w, h)) = self.resize.poll(now) {
            self.viewport = (w, h);
            scene.set_viewport(w, h);
            surface.resize(w, h);
            log::debug!("Resized to {}x{}", w, h);
        }

        let start = *self.first_frame_ms.get_or_insert(timestamp_ms);
        let dt = self
            .last_frame_ms
            .map(|last| ((timestamp_ms - last) / 1000.0) as f32)
            .unwrap_or(0.0);
        self.last_frame_ms = Some(timestamp_ms);

        self.pointer.ease(dt);
        scene.update(timestamp_ms - start, &self.pointer);
        surface.draw(scene);

        self.pending_frame = Some(self.scheduler.request_frame());
    }

    pub fn on_pointer_move(&mut self, x: f32, y: f32) {
        if self.is_mounted() {
            self.pointer.on_move(x, y, self.viewport);
        }
    }

    pub fn on_resize(&mut self, width: u32, height: u32, now: Instant) {
        if self.is_mounted() {
            self.resize.notify((width, height), now);
        }
    }

    /// Cancel the pending frame and release the scene and surface. Idempotent.
    pub fn unmount(&mut self) {
        if let Some(id) = self.pending_frame.take() {
            self.scheduler.cancel_frame(id);
        }
        if let Some(mut surface) = self.surface.take() {
            surface.dispose();
        }
        if self.scene.take().is_some() {
            log::debug!("Background unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.scene.is_some()
    }

    pub fn pending_frame(&self) -> Option<FrameId> {
        self.pending_frame
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scene(&self) -> Option<&BackgroundScene> {
        self.scene.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut R> {
        self.surface.as_mut()
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }
}

impl<S: FrameScheduler, R: RenderSurface> Drop for BackgroundHost<S, R> {
    fn drop(&mut self) {
        self.unmount();
    }
}
