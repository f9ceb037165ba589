// viewer.rs — one panorama viewer: camera, input, render backend and lifecycle
//
// Constructing ──► Ready ──► Activated ⇄ Deactivated ──► Disposed
//      │
//      └──► Failed (notice shown, no interaction)
//
// The viewer never talks to the admission registry itself; the
// `crate::gallery::Gallery` routes activation so that evicting one viewer
// cannot re-enter admission. Host-facing requests that need DOM work come
// out of `Viewer::take_events`.

use std::sync::Arc;
use std::time::Duration;

use crate::admission::ViewerId;
use crate::backend::{BackendKind, BackendProvider, RenderBackend, RendererConfig, SurfaceSize};
use crate::camera::Camera;
use crate::device::DeviceInfo;
use crate::error::{HostError, RenderError, RenderResult};
use crate::factory;
use crate::fullscreen::{FullscreenApi, FullscreenCoordinator, FullscreenHost};
use crate::i18n::tr;
use crate::input::{AutoRotate, DragAnchor, PointerKind};
use crate::notice::{ErrorNotice, NoticeKind};
use crate::panorama::Panorama;
use crate::settings::ViewerSettings;
use crate::timers::{TimerKind, Timers};
use crate::visibility::VisibilityScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Constructing,
    Ready,
    Activated,
    Deactivated,
    /// Initialization failed; the notice is the only thing left on screen.
    Failed,
    Disposed,
}

/// Work the host has to do on the viewer's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    /// Build a software backend and hand it to [`Viewer::replace_backend`].
    RebuildAsSoftware,
    /// Run the renderer factory again (see [`Viewer::rebuild_backend`]); the
    /// restored context does not carry over any of the old GPU objects.
    RebuildBackend,
    /// Measure the container again and call [`Viewer::resize`].
    Relayout,
}

pub struct Viewer {
    id: ViewerId,
    image_url: String,
    settings: ViewerSettings,
    device: DeviceInfo,
    state: ViewerState,

    camera: Camera,
    size: SurfaceSize,
    drag: Option<DragAnchor>,
    auto_rotate: AutoRotate,

    admitted: bool,
    visibility: VisibilityScheduler,
    context_lost: bool,

    backend: Option<Box<dyn RenderBackend>>,
    panorama: Option<Arc<Panorama>>,

    timers: Timers,
    notice: ErrorNotice,
    fullscreen: FullscreenCoordinator,
    fullscreen_host: Option<Box<dyn FullscreenHost>>,
    events: Vec<ViewerEvent>,
}

impl Viewer {
    pub fn new(
        id: ViewerId,
        image_url: impl Into<String>,
        settings: &ViewerSettings,
        device: &DeviceInfo,
        size: SurfaceSize,
        fullscreen_api: Option<FullscreenApi>,
    ) -> Self {
        Self {
            id,
            image_url: image_url.into(),
            settings: settings.clone(),
            device: device.clone(),
            state: ViewerState::Constructing,
            camera: Camera::new(
                settings.initial_lon,
                settings.initial_lat,
                settings.initial_fov,
                size.aspect(),
            ),
            size,
            drag: None,
            auto_rotate: AutoRotate::new(settings.auto_rotate_speed),
            admitted: false,
            visibility: VisibilityScheduler::new(settings.visibility_threshold),
            context_lost: false,
            backend: None,
            panorama: None,
            timers: Timers::new(),
            notice: ErrorNotice::default(),
            fullscreen: FullscreenCoordinator::new(device, fullscreen_api),
            fullscreen_host: None,
            events: Vec::new(),
        }
    }

    /// Build the backend through the factory and leave `Constructing`.
    pub async fn initialize<P: BackendProvider>(&mut self, provider: &P, config: &RendererConfig) {
        let result = factory::create_renderer(provider, &self.device, config, self.size).await;
        self.attach_backend(result);
    }

    pub async fn rebuild_backend<P: BackendProvider>(&mut self, provider: &P, config: &RendererConfig) {
        let result = factory::create_renderer(provider, &self.device, config, self.size).await;
        self.replace_backend(result);
    }

    /// Finish construction with a backend, or fail visibly without one.
    pub fn attach_backend(&mut self, backend: RenderResult<Box<dyn RenderBackend>>) {
        if self.state != ViewerState::Constructing {
            if let Ok(mut b) = backend {
                b.release();
            }
            return;
        }
        match backend {
            Ok(backend) => {
                log::debug!("{} ready on {:?} backend", self.id, backend.kind());
                self.backend = Some(backend);
                self.state = ViewerState::Ready;
            }
            Err(e) => {
                log::error!("{} failed to initialize: {e}", self.id);
                self.notice.show(NoticeKind::InitFailed);
                self.state = ViewerState::Failed;
            }
        }
    }

    pub fn set_fullscreen_host(&mut self, host: Box<dyn FullscreenHost>) {
        self.fullscreen_host = Some(host);
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    pub fn max_texture_dimension(&self) -> Option<u32> {
        self.backend.as_ref().map(|b| b.max_texture_dimension())
    }

    pub fn notice(&self) -> &ErrorNotice {
        &self.notice
    }

    pub fn is_disposed(&self) -> bool {
        self.state == ViewerState::Disposed
    }

    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    pub fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.is_fullscreen()
    }

    pub fn is_auto_rotating(&self) -> bool {
        self.auto_rotate.is_enabled()
    }

    /// The animation loop runs only while admitted and visible, with a live
    /// backend.
    pub fn is_running(&self) -> bool {
        self.state == ViewerState::Activated
            && self.admitted
            && self.visibility.is_visible()
            && !self.context_lost
            && self.backend.is_some()
    }

    fn is_interactive(&self) -> bool {
        matches!(
            self.state,
            ViewerState::Ready | ViewerState::Activated | ViewerState::Deactivated
        )
    }

    pub fn cursor(&self) -> &'static str {
        if self.drag.is_some() {
            "grabbing"
        } else {
            "move"
        }
    }

    /// Glyph and tooltip for the fullscreen button. Touch devices keep the
    /// "enter" face.
    pub fn fullscreen_button(&self) -> (&'static str, String) {
        if self.fullscreen.is_fullscreen() && self.fullscreen.native_enabled() {
            ("✕", tr("control.fullscreen_exit"))
        } else {
            ("⛶", tr("control.fullscreen_enter"))
        }
    }

    // ---- admission & visibility ----

    /// Mark admitted and start the loop. The registry bookkeeping is done by
    /// the caller.
    pub fn activate(&mut self) -> bool {
        if !self.is_interactive() {
            return false;
        }
        self.admitted = true;
        self.state = ViewerState::Activated;
        self.auto_rotate.reset_baseline();
        log::debug!("{} activated", self.id);
        true
    }

    pub fn deactivate(&mut self) -> bool {
        if !self.is_interactive() {
            return false;
        }
        self.admitted = false;
        self.state = ViewerState::Deactivated;
        self.auto_rotate.reset_baseline();
        log::debug!("{} deactivated", self.id);
        true
    }

    /// Feed an intersection observation. Returns the new visibility if it
    /// changed.
    pub fn observe_visibility(&mut self, is_intersecting: bool, ratio: f64) -> Option<bool> {
        if self.is_disposed() {
            return None;
        }
        let change = self.visibility.observe(is_intersecting, ratio);
        if let Some(visible) = change {
            self.auto_rotate.reset_baseline();
            log::debug!("{} {}", self.id, if visible { "visible" } else { "hidden" });
        }
        change
    }

    // ---- input ----

    pub fn pointer_down(&mut self, x: f32, y: f32) -> bool {
        self.begin_drag(PointerKind::Mouse, x, y)
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        self.drag_to(x, y);
    }

    /// Also used for the pointer leaving the container.
    pub fn pointer_up(&mut self, now: Duration) {
        self.end_drag(now);
    }

    /// Single-finger touches drag; returns true if the event was consumed.
    pub fn touch_start(&mut self, touches: &[(f32, f32)], _now: Duration) -> bool {
        match touches {
            [(x, y)] => self.begin_drag(PointerKind::Touch, *x, *y),
            _ => false,
        }
    }

    pub fn touch_move(&mut self, touches: &[(f32, f32)]) -> bool {
        match touches {
            [(x, y)] if self.drag.is_some() => {
                self.drag_to(*x, *y);
                true
            }
            _ => false,
        }
    }

    pub fn touch_end(&mut self, now: Duration) {
        self.end_drag(now);
    }

    fn begin_drag(&mut self, kind: PointerKind, x: f32, y: f32) -> bool {
        if !self.is_interactive() {
            return false;
        }
        let sensitivity = match kind {
            PointerKind::Mouse => self.settings.pointer_sensitivity,
            PointerKind::Touch => self.settings.touch_sensitivity,
        };
        self.drag = Some(DragAnchor {
            x,
            y,
            lon: self.camera.lon,
            lat: self.camera.lat,
            sensitivity,
        });
        self.auto_rotate.stop();
        self.timers.cancel(TimerKind::AutoRotateResume);
        true
    }

    fn drag_to(&mut self, x: f32, y: f32) {
        if let Some(anchor) = self.drag {
            let (lon, lat) = anchor.orientation_at(x, y);
            self.camera.lon = lon;
            self.camera.lat = lat;
            self.clamp_lat();
        }
    }

    fn end_drag(&mut self, now: Duration) {
        if self.drag.take().is_some() {
            self.timers.arm(
                TimerKind::AutoRotateResume,
                now,
                Duration::from_millis(self.settings.auto_rotate_resume_ms),
            );
        }
    }

    fn clamp_lat(&mut self) {
        let limit = self.settings.lat_limit;
        self.camera.lat = self.camera.lat.clamp(-limit, limit);
    }

    // ---- zoom & size ----

    pub fn zoom_in(&mut self) {
        self.zoom_by(-self.settings.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_by(self.settings.zoom_step);
    }

    fn zoom_by(&mut self, delta: f32) {
        if !self.is_interactive() {
            return;
        }
        self.camera.fov = (self.camera.fov + delta).clamp(self.settings.min_fov, self.settings.max_fov);
        if self.backend_kind() == Some(BackendKind::Software) {
            self.render_now();
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.is_disposed() {
            return;
        }
        self.size = SurfaceSize::new(width, height);
        self.camera.aspect = self.size.aspect();
        if let Some(backend) = self.backend.as_mut() {
            backend.resize(self.size);
        }
    }

    // ---- frames & timers ----

    /// One animation frame. Returns true if a frame was rendered. Never
    /// fails: render errors are logged or routed to context-loss handling.
    pub fn tick(&mut self, now: Duration) -> bool {
        self.poll_timers(now);
        if !self.is_running() {
            return false;
        }
        if self.drag.is_none() {
            self.camera.lon += self.auto_rotate.advance(now);
        } else {
            self.auto_rotate.reset_baseline();
        }
        self.clamp_lat();
        self.render_at(now)
    }

    pub fn poll_timers(&mut self, now: Duration) {
        if self.is_disposed() {
            return;
        }
        for kind in self.timers.take_due(now) {
            match kind {
                TimerKind::AutoRotateResume => {
                    if self.drag.is_none() {
                        self.auto_rotate.start();
                    }
                }
                TimerKind::ContextLossFallback => {
                    if self.context_lost {
                        self.events.push(ViewerEvent::RebuildAsSoftware);
                    }
                }
                TimerKind::NoticeDismiss => self.notice.collapse(),
                TimerKind::FullscreenSettle => self.events.push(ViewerEvent::Relayout),
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn take_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.events)
    }

    fn render_now(&mut self) -> bool {
        self.render_at(Duration::ZERO)
    }

    fn render_at(&mut self, now: Duration) -> bool {
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };
        match backend.render_frame(&self.camera) {
            Ok(()) => true,
            Err(RenderError::ContextLost) => {
                self.context_lost(now);
                false
            }
            Err(e) => {
                log::warn!("{} frame failed: {e}", self.id);
                false
            }
        }
    }

    // ---- panorama ----

    /// Show `panorama`. Failure to upload is reported through the notice.
    pub fn set_panorama(&mut self, panorama: Arc<Panorama>) {
        if self.is_disposed() {
            return;
        }
        self.panorama = Some(panorama.clone());
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.set_panorama(panorama) {
                log::error!("{} texture upload failed: {e}", self.id);
                self.texture_failed();
                return;
            }
        }
        if self.backend_kind() == Some(BackendKind::Software) {
            self.render_now();
        }
    }

    /// The image could not be fetched or decoded. The viewer stays
    /// interactive with an empty sphere.
    pub fn texture_failed(&mut self) {
        if self.is_disposed() {
            return;
        }
        self.notice.show(NoticeKind::TextureLoadFailed {
            url: self.image_url.clone(),
        });
    }

    // ---- context loss ----

    /// The GPU context went away: pause, and on mobile schedule a rebuild on
    /// the software canvas.
    pub fn context_lost(&mut self, now: Duration) {
        if self.is_disposed() || self.context_lost {
            return;
        }
        log::warn!("{} graphics context lost", self.id);
        self.context_lost = true;
        self.auto_rotate.reset_baseline();

        if self.device.is_mobile
            && self.device.gpu_api_supported
            && self.backend_kind() == Some(BackendKind::Gpu)
        {
            self.notice.show(NoticeKind::CanvasFallback);
            self.timers.arm(
                TimerKind::ContextLossFallback,
                now,
                Duration::from_millis(self.settings.context_loss_fallback_ms),
            );
        }
    }

    /// The context came back before the fallback fired. The loop stays
    /// paused until the host answers `ViewerEvent::RebuildBackend`.
    pub fn context_restored(&mut self) {
        if self.is_disposed() || !self.context_lost {
            return;
        }
        log::info!("{} graphics context restored", self.id);
        self.timers.cancel(TimerKind::ContextLossFallback);
        if self.notice.kind() == Some(&NoticeKind::CanvasFallback) {
            self.notice.clear();
        }
        if !self.events.contains(&ViewerEvent::RebuildBackend) {
            self.events.push(ViewerEvent::RebuildBackend);
        }
    }

    /// Swap in a rebuilt backend, re-uploading the current panorama.
    pub fn replace_backend(&mut self, backend: RenderResult<Box<dyn RenderBackend>>) {
        if self.is_disposed() {
            if let Ok(mut b) = backend {
                b.release();
            }
            return;
        }
        let mut backend = match backend {
            Ok(backend) => backend,
            Err(e) => {
                log::error!("{} backend rebuild failed: {e}", self.id);
                self.notice.show(NoticeKind::InitFailed);
                return;
            }
        };

        if let Some(mut old) = self.backend.take() {
            old.release();
        }
        backend.resize(self.size);
        if let Some(panorama) = self.panorama.clone() {
            if let Err(e) = backend.set_panorama(panorama) {
                log::error!("{} texture upload failed after rebuild: {e}", self.id);
                self.texture_failed();
            }
        }
        log::info!("{} switched to {:?} backend", self.id, backend.kind());
        self.backend = Some(backend);
        self.context_lost = false;
        self.timers.cancel(TimerKind::ContextLossFallback);
        self.auto_rotate.reset_baseline();
    }

    // ---- notice ----

    pub fn toggle_notice(&mut self, now: Duration) {
        if self.is_disposed() {
            return;
        }
        if self.notice.toggle() {
            self.timers.arm(
                TimerKind::NoticeDismiss,
                now,
                Duration::from_millis(self.settings.notice_dismiss_ms),
            );
        } else {
            self.timers.cancel(TimerKind::NoticeDismiss);
        }
    }

    // ---- fullscreen ----

    pub fn toggle_fullscreen(&mut self, now: Duration) -> Result<(), HostError> {
        if !self.is_interactive() {
            return Ok(());
        }
        let host = self
            .fullscreen_host
            .as_deref_mut()
            .ok_or(HostError::Unavailable("fullscreen host"))?;
        let was_fullscreen = self.fullscreen.is_fullscreen();
        if self.fullscreen.toggle(host)? {
            self.after_fullscreen_change(was_fullscreen, now);
        }
        Ok(())
    }

    pub fn on_fullscreen_change(&mut self, now: Duration) {
        let Some(host) = self.fullscreen_host.as_deref_mut() else {
            return;
        };
        if self.fullscreen.on_native_change(host) {
            self.after_fullscreen_change(true, now);
        }
    }

    pub fn on_escape(&mut self, now: Duration) {
        let Some(host) = self.fullscreen_host.as_deref_mut() else {
            return;
        };
        if self.fullscreen.on_escape(host) {
            self.after_fullscreen_change(true, now);
        }
    }

    pub fn native_fullscreen_failed(&mut self) {
        if let Some(host) = self.fullscreen_host.as_deref_mut() {
            self.fullscreen.native_request_failed(host);
        }
    }

    fn after_fullscreen_change(&mut self, was_fullscreen: bool, now: Duration) {
        self.events.push(ViewerEvent::Relayout);
        if was_fullscreen {
            self.timers.arm(
                TimerKind::FullscreenSettle,
                now,
                Duration::from_millis(self.settings.fullscreen_settle_ms),
            );
        }
    }

    // ---- teardown ----

    /// Terminal and idempotent. Returns true on the call that actually tore
    /// the viewer down.
    pub fn dispose(&mut self) -> bool {
        if self.is_disposed() {
            return false;
        }
        if let Some(mut host) = self.fullscreen_host.take() {
            self.fullscreen.exit(host.as_mut());
        }
        self.admitted = false;
        self.drag = None;
        self.timers.clear();
        if let Some(mut backend) = self.backend.take() {
            backend.release();
        }
        self.panorama = None;
        self.notice.clear();
        self.events.clear();
        self.state = ViewerState::Disposed;
        log::debug!("{} disposed", self.id);
        true
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        self.dispose();
    }
}
