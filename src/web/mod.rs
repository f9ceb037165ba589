// web/mod.rs — browser host: discovers `.psv-container` elements and drives one
// `Gallery` from DOM events, one shared animation frame loop and one
// timeout for the earliest pending viewer deadline.

mod dom;
mod listener;
mod probe;
mod surface;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{
    Document, Event, HtmlElement, IntersectionObserver, IntersectionObserverEntry, IntersectionObserverInit,
    KeyboardEvent, MouseEvent, Performance, Response, TouchEvent, Window,
};

use self::dom::{within, DomFullscreenHost, ViewerDom, NOTICE_SELECTOR, NO_DRAG_SELECTOR};
use self::listener::{js_error, Listener};
use self::probe::WebDeviceProbe;
use self::surface::{ContextEvent, WebBackendProvider};
use crate::admission::ViewerId;
use crate::backend::renderer_config;
use crate::device::device_info_with_width;
use crate::error::HostError;
use crate::factory;
use crate::fullscreen::{detect_api, FullscreenApi, ALL_APIS};
use crate::gallery::{container_image, Gallery, CONTAINER_CLASS, IMAGE_ATTRIBUTE};
use crate::panorama::Panorama;
use crate::settings::ViewerSettings;
use crate::viewer::{Viewer, ViewerEvent};
use crate::{i18n, logging};

/// Id of the optional JSON settings block.
const SETTINGS_ELEMENT_ID: &str = "psv-settings";

thread_local! {
    static PAGE: RefCell<Option<Rc<Page>>> = const { RefCell::new(None) };
}

#[wasm_bindgen(start)]
pub fn start() {
    let Some(window) = web_sys::window() else {
        return;
    };
    let Some(document) = window.document() else {
        return;
    };

    let settings = read_settings(&document);
    logging::init(settings.diagnostics);
    i18n::init(i18n::resolve_lang(
        settings.language.as_deref(),
        window.navigator().language().as_deref(),
    ));

    if document.ready_state() == "loading" {
        let boot_window = window.clone();
        let boot_document = document.clone();
        let on_ready = Closure::once_into_js(move || boot(boot_window, boot_document, settings));
        if let Err(e) = document.add_event_listener_with_callback("DOMContentLoaded", on_ready.unchecked_ref()) {
            log::error!("cannot wait for DOMContentLoaded: {e:?}");
        }
    } else {
        boot(window, document, settings);
    }
}

fn read_settings(document: &Document) -> ViewerSettings {
    document
        .get_element_by_id(SETTINGS_ELEMENT_ID)
        .and_then(|el| el.text_content())
        .map(|text| ViewerSettings::from_json_or_default(&text))
        .unwrap_or_default()
}

fn boot(window: Window, document: Document, settings: ViewerSettings) {
    let probe = WebDeviceProbe::new(window.clone(), document.clone());
    let device = device_info_with_width(&probe, settings.mobile_max_width).clone();
    let config = renderer_config(&device).clone();
    let fullscreen_api = document.document_element().and_then(|root| {
        detect_api(device.is_desktop_os, |method| {
            js_sys::Reflect::get(&root, &JsValue::from_str(method))
                .map(|v| v.is_function())
                .unwrap_or(false)
        })
    });
    log::info!(
        "panorama viewers starting (mobile: {}, gpu: {}, accelerated: {}, fullscreen api: {:?})",
        device.is_mobile,
        device.gpu_api_supported,
        device.hardware_acceleration_enabled,
        fullscreen_api.map(|api| api.request),
    );

    let threshold = settings.visibility_threshold;
    let mobile = device.is_mobile;
    let page = Rc::new(Page {
        performance: window.performance(),
        window,
        document,
        fullscreen_api,
        gallery: RefCell::new(Gallery::new(settings, device, config)),
        views: RefCell::new(BTreeMap::new()),
        globals: RefCell::new(Vec::new()),
        observer: RefCell::new(None),
        frame: RefCell::new(None),
        frame_closure: RefCell::new(None),
        timeout: RefCell::new(None),
        timeout_closure: RefCell::new(None),
    });
    PAGE.with(|p| *p.borrow_mut() = Some(page.clone()));

    if let Err(e) = page.install_globals(mobile) {
        log::error!("cannot install page listeners: {e}");
    }
    if let Err(e) = page.install_observer(threshold) {
        log::warn!("visibility tracking unavailable: {e}");
    }

    let containers = match page.document.query_selector_all(&format!(".{CONTAINER_CLASS}")) {
        Ok(list) => list,
        Err(e) => {
            log::error!("container discovery failed: {e:?}");
            return;
        }
    };
    for index in 0..containers.length() {
        let Some(container) = containers.item(index).and_then(|n| n.dyn_into::<HtmlElement>().ok()) else {
            continue;
        };
        let url = container.get_attribute(IMAGE_ATTRIBUTE);
        if let Some(url) = container_image(url.as_deref()) {
            page.mount(container.clone(), url.to_string());
        }
    }
}

struct ViewerView {
    dom: ViewerDom,
    provider: Rc<WebBackendProvider>,
    _listeners: Vec<Listener>,
}

struct Page {
    window: Window,
    document: Document,
    performance: Option<Performance>,
    fullscreen_api: Option<FullscreenApi>,
    gallery: RefCell<Gallery>,
    views: RefCell<BTreeMap<ViewerId, ViewerView>>,
    globals: RefCell<Vec<Listener>>,
    observer: RefCell<Option<(IntersectionObserver, Closure<dyn FnMut(js_sys::Array)>)>>,
    frame: RefCell<Option<i32>>,
    frame_closure: RefCell<Option<Closure<dyn FnMut(f64)>>>,
    timeout: RefCell<Option<i32>>,
    timeout_closure: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl Page {
    fn now(&self) -> Duration {
        let ms = self.performance.as_ref().map_or(0.0, Performance::now);
        Duration::from_secs_f64(ms.max(0.0) / 1000.0)
    }

    /// Run `f` on one viewer, then let the page catch up.
    fn with_viewer(self: &Rc<Self>, id: ViewerId, f: impl FnOnce(&mut Viewer, Duration)) {
        let now = self.now();
        if let Some(viewer) = self.gallery.borrow_mut().get_mut(id) {
            f(viewer, now);
        }
        self.settle();
    }

    fn for_each_viewer(self: &Rc<Self>, mut f: impl FnMut(&mut Viewer, Duration)) {
        let now = self.now();
        {
            let mut gallery = self.gallery.borrow_mut();
            for id in gallery.ids() {
                if let Some(viewer) = gallery.get_mut(id) {
                    f(viewer, now);
                }
            }
        }
        self.settle();
    }

    fn mount(self: &Rc<Self>, container: HtmlElement, url: String) {
        let dom = match ViewerDom::new(&self.document, &container) {
            Ok(dom) => dom,
            Err(e) => {
                log::error!("cannot build controls for {url}: {e}");
                return;
            }
        };
        let id = self
            .gallery
            .borrow_mut()
            .add_viewer(&url, dom.size(), self.fullscreen_api);

        let weak = Rc::downgrade(self);
        let on_native_failed: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(page) = weak.upgrade() {
                page.with_viewer(id, |viewer, _| viewer.native_fullscreen_failed());
            }
        });
        let host = DomFullscreenHost::new(
            self.window.clone(),
            self.document.clone(),
            container.clone(),
            on_native_failed,
        );
        if let Some(viewer) = self.gallery.borrow_mut().get_mut(id) {
            viewer.set_fullscreen_host(Box::new(host));
        }

        let weak = Rc::downgrade(self);
        let on_context: Rc<dyn Fn(ContextEvent)> = Rc::new(move |event| {
            if let Some(page) = weak.upgrade() {
                page.with_viewer(id, |viewer, now| match event {
                    ContextEvent::Lost => viewer.context_lost(now),
                    ContextEvent::Restored => viewer.context_restored(),
                });
            }
        });
        let provider = Rc::new(WebBackendProvider::new(
            self.document.clone(),
            container.clone(),
            on_context,
        ));

        let listeners = match self.viewer_listeners(id, &dom) {
            Ok(listeners) => listeners,
            Err(e) => {
                log::error!("cannot attach input listeners for {url}: {e}");
                Vec::new()
            }
        };
        if let Some((observer, _)) = self.observer.borrow().as_ref() {
            observer.observe(&container);
        }
        self.views.borrow_mut().insert(
            id,
            ViewerView {
                dom,
                provider,
                _listeners: listeners,
            },
        );

        spawn_local(self.clone().initialize(id));
    }

    async fn initialize(self: Rc<Self>, id: ViewerId) {
        let (device, config) = {
            let gallery = self.gallery.borrow();
            (gallery.device().clone(), gallery.config().clone())
        };
        let Some((provider, size)) = self
            .views
            .borrow()
            .get(&id)
            .map(|view| (view.provider.clone(), view.dom.size()))
        else {
            return;
        };

        let result = factory::create_renderer(provider.as_ref(), &device, &config, size).await;
        let target = {
            let mut gallery = self.gallery.borrow_mut();
            match gallery.get_mut(id) {
                Some(viewer) => {
                    viewer.attach_backend(result);
                    let target = viewer
                        .max_texture_dimension()
                        .map(|max| (max, viewer.image_url().to_string()));
                    gallery.admit_initialized(id);
                    target
                }
                None => {
                    if let Ok(mut backend) = result {
                        backend.release();
                    }
                    None
                }
            }
        };
        self.settle();

        let Some((max_dimension, url)) = target else {
            return;
        };
        match load_panorama(&self.window, &url, max_dimension).await {
            Ok(panorama) => {
                log::debug!("{id} loaded {url} at {}x{}", panorama.width(), panorama.height());
                self.with_viewer(id, |viewer, _| viewer.set_panorama(Arc::new(panorama)));
            }
            Err(e) => {
                log::error!("{id} cannot load {url}: {e}");
                self.with_viewer(id, |viewer, _| viewer.texture_failed());
            }
        }
    }

    /// New backend after a context restore. The gallery is not borrowed
    /// across the await.
    async fn rebuild(self: Rc<Self>, id: ViewerId, provider: Rc<WebBackendProvider>) {
        let (device, config) = {
            let gallery = self.gallery.borrow();
            (gallery.device().clone(), gallery.config().clone())
        };
        let Some(size) = self.views.borrow().get(&id).map(|view| view.dom.size()) else {
            return;
        };
        let result = factory::create_renderer(provider.as_ref(), &device, &config, size).await;
        let orphan = {
            let mut gallery = self.gallery.borrow_mut();
            match gallery.get_mut(id) {
                Some(viewer) => {
                    viewer.replace_backend(result);
                    None
                }
                None => result.ok(),
            }
        };
        if let Some(mut backend) = orphan {
            backend.release();
        }
        self.settle();
    }

    /// Apply viewer events, sync the DOM and reschedule frame and timeout.
    fn settle(self: &Rc<Self>) {
        let events = self.gallery.borrow_mut().take_events();
        for (id, event) in events {
            let Some((provider, size)) = self
                .views
                .borrow()
                .get(&id)
                .map(|view| (view.provider.clone(), view.dom.size()))
            else {
                continue;
            };
            if event == ViewerEvent::RebuildBackend {
                spawn_local(self.clone().rebuild(id, provider));
                continue;
            }
            let mut gallery = self.gallery.borrow_mut();
            let Some(viewer) = gallery.get_mut(id) else {
                continue;
            };
            match event {
                ViewerEvent::RebuildAsSoftware => {
                    viewer.replace_backend(factory::create_software(provider.as_ref(), size));
                }
                ViewerEvent::Relayout => viewer.resize(size.width, size.height),
                ViewerEvent::RebuildBackend => {}
            }
        }

        {
            let gallery = self.gallery.borrow();
            for (id, view) in self.views.borrow_mut().iter_mut() {
                if let Some(viewer) = gallery.get(*id) {
                    view.dom.sync(viewer);
                }
            }
        }
        self.schedule_timeout();
        self.schedule_frame();
    }

    fn schedule_frame(self: &Rc<Self>) {
        if self.frame.borrow().is_some() || !self.gallery.borrow().any_running() {
            return;
        }
        if self.frame_closure.borrow().is_none() {
            let weak = Rc::downgrade(self);
            let closure = Closure::<dyn FnMut(f64)>::new(move |_timestamp: f64| {
                let Some(page) = weak.upgrade() else {
                    return;
                };
                *page.frame.borrow_mut() = None;
                let now = page.now();
                page.gallery.borrow_mut().tick(now);
                page.settle();
            });
            *self.frame_closure.borrow_mut() = Some(closure);
        }
        if let Some(closure) = self.frame_closure.borrow().as_ref() {
            match self.window.request_animation_frame(closure.as_ref().unchecked_ref()) {
                Ok(handle) => *self.frame.borrow_mut() = Some(handle),
                Err(e) => log::error!("requestAnimationFrame failed: {e:?}"),
            }
        }
    }

    fn schedule_timeout(self: &Rc<Self>) {
        if let Some(handle) = self.timeout.borrow_mut().take() {
            self.window.clear_timeout_with_handle(handle);
        }
        let Some(deadline) = self.gallery.borrow().next_deadline() else {
            return;
        };
        if self.timeout_closure.borrow().is_none() {
            let weak: Weak<Page> = Rc::downgrade(self);
            let closure = Closure::<dyn FnMut()>::new(move || {
                let Some(page) = weak.upgrade() else {
                    return;
                };
                *page.timeout.borrow_mut() = None;
                let now = page.now();
                page.gallery.borrow_mut().poll_timers(now);
                page.settle();
            });
            *self.timeout_closure.borrow_mut() = Some(closure);
        }
        let delay = deadline.saturating_sub(self.now()).as_millis().min(i32::MAX as u128) as i32;
        if let Some(closure) = self.timeout_closure.borrow().as_ref() {
            match self
                .window
                .set_timeout_with_callback_and_timeout_and_arguments_0(closure.as_ref().unchecked_ref(), delay)
            {
                Ok(handle) => *self.timeout.borrow_mut() = Some(handle),
                Err(e) => log::error!("setTimeout failed: {e:?}"),
            }
        }
    }

    fn install_observer(self: &Rc<Self>, threshold: f64) -> Result<(), HostError> {
        let weak = Rc::downgrade(self);
        let callback = Closure::<dyn FnMut(js_sys::Array)>::new(move |entries: js_sys::Array| {
            let Some(page) = weak.upgrade() else {
                return;
            };
            for entry in entries.iter() {
                let Ok(entry) = entry.dyn_into::<IntersectionObserverEntry>() else {
                    continue;
                };
                let target = entry.target();
                let id = page
                    .views
                    .borrow()
                    .iter()
                    .find(|(_, view)| view.dom.container().is_same_node(Some(&*target)))
                    .map(|(id, _)| *id);
                if let Some(id) = id {
                    page.gallery
                        .borrow_mut()
                        .observe_visibility(id, entry.is_intersecting(), entry.intersection_ratio());
                }
            }
            page.settle();
        });
        let init = IntersectionObserverInit::new();
        init.set_threshold(&JsValue::from_f64(threshold));
        let observer = IntersectionObserver::new_with_options(callback.as_ref().unchecked_ref(), &init)
            .map_err(js_error)?;
        *self.observer.borrow_mut() = Some((observer, callback));
        Ok(())
    }

    fn install_globals(self: &Rc<Self>, mobile: bool) -> Result<(), HostError> {
        let mut globals = Vec::new();

        let weak = Rc::downgrade(self);
        globals.push(Listener::new(&self.window, "resize", move |_| {
            if let Some(page) = weak.upgrade() {
                page.relayout_all();
            }
        })?);

        let weak = Rc::downgrade(self);
        globals.push(Listener::new(&self.window, "beforeunload", move |_| {
            if let Some(page) = weak.upgrade() {
                page.teardown();
            }
        })?);

        if !mobile {
            let weak = Rc::downgrade(self);
            globals.push(Listener::new(&self.document, "keydown", move |e: Event| {
                let escape = e
                    .dyn_ref::<KeyboardEvent>()
                    .is_some_and(|k| k.key() == "Escape");
                if !escape {
                    return;
                }
                if let Some(page) = weak.upgrade() {
                    page.for_each_viewer(|viewer, now| {
                        viewer.on_escape(now);
                    });
                }
            })?);

            for api in ALL_APIS {
                let weak = Rc::downgrade(self);
                globals.push(Listener::new(&self.document, api.change_event, move |_| {
                    if let Some(page) = weak.upgrade() {
                        page.for_each_viewer(|viewer, now| viewer.on_fullscreen_change(now));
                    }
                })?);
            }
        }

        self.globals.borrow_mut().extend(globals);
        Ok(())
    }

    fn relayout_all(self: &Rc<Self>) {
        let sizes: Vec<_> = self
            .views
            .borrow()
            .iter()
            .map(|(id, view)| (*id, view.dom.size()))
            .collect();
        {
            let mut gallery = self.gallery.borrow_mut();
            for (id, size) in sizes {
                if let Some(viewer) = gallery.get_mut(id) {
                    viewer.resize(size.width, size.height);
                }
            }
        }
        self.settle();
    }

    fn viewer_listeners(self: &Rc<Self>, id: ViewerId, dom: &ViewerDom) -> Result<Vec<Listener>, HostError> {
        let container = dom.container();
        let mut listeners = Vec::new();

        let weak = Rc::downgrade(self);
        listeners.push(Listener::new(container, "mousedown", move |e: Event| {
            if within(e.target(), NO_DRAG_SELECTOR) {
                return;
            }
            let (Some(page), Some(mouse)) = (weak.upgrade(), e.dyn_ref::<MouseEvent>()) else {
                return;
            };
            e.prevent_default();
            let (x, y) = (mouse.client_x() as f32, mouse.client_y() as f32);
            page.with_viewer(id, |viewer, _| {
                viewer.pointer_down(x, y);
            });
        })?);

        let weak = Rc::downgrade(self);
        listeners.push(Listener::new(container, "mousemove", move |e: Event| {
            let (Some(page), Some(mouse)) = (weak.upgrade(), e.dyn_ref::<MouseEvent>()) else {
                return;
            };
            let (x, y) = (mouse.client_x() as f32, mouse.client_y() as f32);
            page.with_viewer(id, |viewer, _| viewer.pointer_move(x, y));
        })?);

        for event in ["mouseup", "mouseleave"] {
            let weak = Rc::downgrade(self);
            listeners.push(Listener::new(container, event, move |_| {
                if let Some(page) = weak.upgrade() {
                    page.with_viewer(id, |viewer, now| viewer.pointer_up(now));
                }
            })?);
        }

        let weak = Rc::downgrade(self);
        listeners.push(Listener::active(container, "touchstart", move |e: Event| {
            if within(e.target(), NO_DRAG_SELECTOR) {
                return;
            }
            let (Some(page), Some(touch)) = (weak.upgrade(), e.dyn_ref::<TouchEvent>()) else {
                return;
            };
            let points = touch_points(touch);
            let mut consumed = false;
            page.with_viewer(id, |viewer, now| consumed = viewer.touch_start(&points, now));
            if consumed {
                e.prevent_default();
            }
        })?);

        let weak = Rc::downgrade(self);
        listeners.push(Listener::active(container, "touchmove", move |e: Event| {
            if within(e.target(), NO_DRAG_SELECTOR) {
                return;
            }
            let (Some(page), Some(touch)) = (weak.upgrade(), e.dyn_ref::<TouchEvent>()) else {
                return;
            };
            let points = touch_points(touch);
            let mut consumed = false;
            page.with_viewer(id, |viewer, _| consumed = viewer.touch_move(&points));
            if consumed {
                e.prevent_default();
            }
        })?);

        let weak = Rc::downgrade(self);
        listeners.push(Listener::active(container, "touchend", move |e: Event| {
            let Some(page) = weak.upgrade() else {
                return;
            };
            if within(e.target(), NOTICE_SELECTOR) {
                e.prevent_default();
                e.stop_propagation();
                page.with_viewer(id, |viewer, now| viewer.toggle_notice(now));
                return;
            }
            if within(e.target(), NO_DRAG_SELECTOR) {
                return;
            }
            page.with_viewer(id, |viewer, now| viewer.touch_end(now));
        })?);

        let weak = Rc::downgrade(self);
        listeners.push(Listener::new(container, "click", move |e: Event| {
            if within(e.target(), ".psv-btn") {
                return;
            }
            e.prevent_default();
            e.stop_propagation();
            if within(e.target(), NOTICE_SELECTOR) {
                if let Some(page) = weak.upgrade() {
                    page.with_viewer(id, |viewer, now| viewer.toggle_notice(now));
                }
            }
        })?);

        for (button, zoom_in) in [(&dom.zoom_in, true), (&dom.zoom_out, false)] {
            let zoom = move |viewer: &mut Viewer, _: Duration| {
                if zoom_in {
                    viewer.zoom_in();
                } else {
                    viewer.zoom_out();
                }
            };
            let weak = Rc::downgrade(self);
            listeners.push(Listener::new(button, "click", move |e: Event| {
                e.stop_propagation();
                if let Some(page) = weak.upgrade() {
                    page.with_viewer(id, zoom);
                }
            })?);
            let weak = Rc::downgrade(self);
            listeners.push(Listener::active(button, "touchend", move |e: Event| {
                e.prevent_default();
                e.stop_propagation();
                if let Some(page) = weak.upgrade() {
                    page.with_viewer(id, zoom);
                }
            })?);
        }

        let weak = Rc::downgrade(self);
        listeners.push(Listener::new(&dom.fullscreen, "click", move |e: Event| {
            e.stop_propagation();
            if let Some(page) = weak.upgrade() {
                page.with_viewer(id, |viewer, now| {
                    if let Err(e) = viewer.toggle_fullscreen(now) {
                        log::warn!("{id} fullscreen toggle failed: {e}");
                    }
                });
            }
        })?);

        Ok(listeners)
    }

    /// Page teardown: dispose every viewer and stop all scheduling.
    fn teardown(self: &Rc<Self>) {
        if let Some(handle) = self.frame.borrow_mut().take() {
            let _ = self.window.cancel_animation_frame(handle);
        }
        if let Some(handle) = self.timeout.borrow_mut().take() {
            self.window.clear_timeout_with_handle(handle);
        }
        self.gallery.borrow_mut().dispose_all();
        for view in self.views.borrow_mut().values_mut() {
            view.dom.remove();
        }
        self.views.borrow_mut().clear();
        if let Some((observer, _)) = self.observer.borrow_mut().take() {
            observer.disconnect();
        }
        // The beforeunload listener is running right now; drop it afterwards.
        let globals = std::mem::take(&mut *self.globals.borrow_mut());
        spawn_local(async move { drop(globals) });
        log::debug!("page torn down");
    }
}

fn touch_points(event: &TouchEvent) -> Vec<(f32, f32)> {
    let touches = event.touches();
    (0..touches.length())
        .filter_map(|i| touches.get(i))
        .map(|t| (t.client_x() as f32, t.client_y() as f32))
        .collect()
}

async fn load_panorama(window: &Window, url: &str, max_dimension: u32) -> Result<Panorama, HostError> {
    let response: Response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(js_error)?
        .dyn_into()
        .map_err(|_| HostError::Js("fetch did not resolve to a Response".into()))?;
    if !response.ok() {
        return Err(HostError::Js(format!("HTTP {} for {url}", response.status())));
    }
    let buffer = JsFuture::from(response.array_buffer().map_err(js_error)?)
        .await
        .map_err(js_error)?;
    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
    Panorama::decode(&bytes, max_dimension).map_err(|e| HostError::Js(e.to_string()))
}
