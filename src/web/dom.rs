// dom.rs — DOM owned by one viewer: controls, notice, and the fullscreen overlay

use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Document, Element, HtmlElement, Node, OrientationLockType, Window};

use super::listener::{js_error, Listener};
use crate::backend::SurfaceSize;
use crate::error::HostError;
use crate::fullscreen::{ContainerStyle, FullscreenApi, FullscreenHost, ALL_APIS};
use crate::i18n::tr;
use crate::notice::NoticeKind;
use crate::viewer::Viewer;

/// Elements of the notice that must not start a drag.
pub const NOTICE_SELECTOR: &str = ".psv-error-message, .psv-detailed-error";
/// Every injected element that must not start a drag.
pub const NO_DRAG_SELECTOR: &str = ".psv-btn, .psv-error-message, .psv-detailed-error";

const INDICATOR_CSS: &str = "position:absolute;top:10px;left:10px;width:30px;height:30px;\
    background:rgba(255,165,0,0.9);color:white;border-radius:50%;display:flex;\
    align-items:center;justify-content:center;font-family:Arial,sans-serif;font-size:16px;\
    font-weight:bold;cursor:pointer;z-index:1000;user-select:none;";

const DETAIL_CSS: &str = "position:absolute;top:50px;left:10px;right:10px;\
    background:rgba(0,0,0,0.95);color:white;padding:15px;border-radius:8px;\
    font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Arial,sans-serif;font-size:13px;\
    max-width:90%;z-index:1001;box-shadow:0 4px 12px rgba(0,0,0,0.5);line-height:1.5;\
    box-sizing:border-box;";

const OVERLAY_CSS: &str = "position:fixed;top:0;left:0;width:100vw;height:100vh;background:#000;\
    z-index:9999;display:flex;align-items:center;justify-content:center;";

/// What the DOM currently shows, to skip redundant writes.
#[derive(Debug, Clone, PartialEq)]
struct Shown {
    cursor: &'static str,
    fullscreen_glyph: &'static str,
    notice: Option<NoticeKind>,
    expanded: bool,
}

pub struct ViewerDom {
    document: Document,
    container: HtmlElement,
    controls: HtmlElement,
    pub zoom_in: HtmlElement,
    pub zoom_out: HtmlElement,
    pub fullscreen: HtmlElement,
    indicator: Option<HtmlElement>,
    detail: Option<HtmlElement>,
    shown: Option<Shown>,
}

impl ViewerDom {
    pub fn new(document: &Document, container: &HtmlElement) -> Result<Self, HostError> {
        let controls = create_html(document, "div", "psv-controls-container")?;
        let fullscreen = create_button(document, "psv-btn psv-fullscreen-btn", "⛶", &tr("control.fullscreen_enter"))?;
        let zoom_in = create_button(document, "psv-btn psv-zoom-btn psv-zoom-in-btn", "+", &tr("control.zoom_in"))?;
        let zoom_out = create_button(document, "psv-btn psv-zoom-btn psv-zoom-out-btn", "−", &tr("control.zoom_out"))?;
        for button in [&fullscreen, &zoom_in, &zoom_out] {
            controls.append_child(button).map_err(js_error)?;
        }
        container.append_child(&controls).map_err(js_error)?;

        Ok(Self {
            document: document.clone(),
            container: container.clone(),
            controls,
            zoom_in,
            zoom_out,
            fullscreen,
            indicator: None,
            detail: None,
            shown: None,
        })
    }

    pub fn container(&self) -> &HtmlElement {
        &self.container
    }

    /// Logical size of the container.
    pub fn size(&self) -> SurfaceSize {
        SurfaceSize::new(
            self.container.client_width().max(0) as u32,
            self.container.client_height().max(0) as u32,
        )
    }

    /// Bring cursor, buttons and notice in line with `viewer`.
    pub fn sync(&mut self, viewer: &Viewer) {
        let (glyph, title) = viewer.fullscreen_button();
        let shown = Shown {
            cursor: viewer.cursor(),
            fullscreen_glyph: glyph,
            notice: viewer.notice().kind().cloned(),
            expanded: viewer.notice().is_expanded(),
        };
        if self.shown.as_ref() == Some(&shown) {
            return;
        }

        let _ = self.container.style().set_property("cursor", shown.cursor);
        self.fullscreen.set_inner_text(glyph);
        self.fullscreen.set_title(&title);

        let notice_changed = self.shown.as_ref().map(|s| &s.notice) != Some(&shown.notice);
        if notice_changed {
            self.remove_notice();
            if let Some(kind) = &shown.notice {
                self.indicator = self.build_indicator(kind).ok();
            }
        }
        let expanded_changed = self.shown.as_ref().map(|s| s.expanded) != Some(shown.expanded);
        if notice_changed || expanded_changed {
            if let Some(detail) = self.detail.take() {
                detail.remove();
            }
            if let (Some(kind), true) = (&shown.notice, shown.expanded) {
                self.detail = self.build_detail(kind).ok();
            }
        }
        self.shown = Some(shown);
    }

    fn build_indicator(&self, kind: &NoticeKind) -> Result<HtmlElement, HostError> {
        let indicator = create_html(&self.document, "div", "psv-error-message")?;
        indicator.style().set_css_text(INDICATOR_CSS);
        indicator.set_inner_text("i");
        indicator.set_title(&kind.title());
        self.container.append_child(&indicator).map_err(js_error)?;
        Ok(indicator)
    }

    fn build_detail(&self, kind: &NoticeKind) -> Result<HtmlElement, HostError> {
        let detail = create_html(&self.document, "div", "psv-detailed-error")?;
        detail.style().set_css_text(DETAIL_CSS);
        for (class, text) in [
            ("psv-detailed-error-heading", kind.heading()),
            ("psv-detailed-error-body", kind.detail()),
            ("psv-detailed-error-hint", kind.close_hint()),
        ] {
            let part = create_html(&self.document, "div", class)?;
            part.set_inner_text(&text);
            detail.append_child(&part).map_err(js_error)?;
        }
        self.container.append_child(&detail).map_err(js_error)?;
        Ok(detail)
    }

    fn remove_notice(&mut self) {
        for element in [self.indicator.take(), self.detail.take()].into_iter().flatten() {
            element.remove();
        }
    }

    /// Remove every injected element.
    pub fn remove(&mut self) {
        self.remove_notice();
        self.controls.remove();
        let _ = self.container.style().remove_property("cursor");
        self.shown = None;
    }
}

fn create_html(document: &Document, tag: &str, class: &str) -> Result<HtmlElement, HostError> {
    let element: HtmlElement = document
        .create_element(tag)
        .map_err(js_error)?
        .dyn_into()
        .map_err(|_| HostError::Js(format!("<{tag}> is not an HtmlElement")))?;
    element.set_class_name(class);
    Ok(element)
}

fn create_button(document: &Document, class: &str, glyph: &str, title: &str) -> Result<HtmlElement, HostError> {
    let button = create_html(document, "button", class)?;
    button.set_inner_text(glyph);
    button.set_title(title);
    Ok(button)
}

/// Whether `target` sits inside an element matching `selector`.
pub fn within(target: Option<web_sys::EventTarget>, selector: &str) -> bool {
    target
        .and_then(|t| t.dyn_into::<Element>().ok())
        .and_then(|e| e.closest(selector).ok().flatten())
        .is_some()
}

/// Fullscreen side effects against the real document.
pub struct DomFullscreenHost {
    window: Window,
    document: Document,
    container: HtmlElement,
    overlay: Option<HtmlElement>,
    anchor: Option<(Node, Option<Node>)>,
    scroll_guard: Option<Listener>,
    on_native_failed: Rc<dyn Fn()>,
}

impl DomFullscreenHost {
    pub fn new(window: Window, document: Document, container: HtmlElement, on_native_failed: Rc<dyn Fn()>) -> Self {
        Self {
            window,
            document,
            container,
            overlay: None,
            anchor: None,
            scroll_guard: None,
            on_native_failed,
        }
    }
}

const STYLE_PROPERTIES: [&str; 10] = [
    "position",
    "top",
    "left",
    "width",
    "height",
    "z-index",
    "background-color",
    "padding-top",
    "max-width",
    "max-height",
];

impl FullscreenHost for DomFullscreenHost {
    fn lock_landscape(&mut self) {
        let Ok(screen) = self.window.screen() else {
            return;
        };
        match screen.orientation().lock(OrientationLockType::Landscape) {
            Ok(promise) => spawn_local(async move {
                if let Err(e) = JsFuture::from(promise).await {
                    log::debug!("orientation lock refused: {e:?}");
                }
            }),
            Err(e) => log::debug!("orientation lock unavailable: {e:?}"),
        }
    }

    fn unlock_orientation(&mut self) {
        if let Ok(screen) = self.window.screen() {
            let _ = screen.orientation().unlock();
        }
    }

    fn container_style(&self) -> ContainerStyle {
        let style = self.container.style();
        let mut values = STYLE_PROPERTIES.map(|p| style.get_property_value(p).unwrap_or_default());
        let mut take = |i: usize| std::mem::take(&mut values[i]);
        ContainerStyle {
            position: take(0),
            top: take(1),
            left: take(2),
            width: take(3),
            height: take(4),
            z_index: take(5),
            background_color: take(6),
            padding_top: take(7),
            max_width: take(8),
            max_height: take(9),
        }
    }

    fn set_container_style(&mut self, s: &ContainerStyle) {
        let style = self.container.style();
        let values = [
            &s.position,
            &s.top,
            &s.left,
            &s.width,
            &s.height,
            &s.z_index,
            &s.background_color,
            &s.padding_top,
            &s.max_width,
            &s.max_height,
        ];
        for (property, value) in STYLE_PROPERTIES.iter().zip(values) {
            let _ = if value.is_empty() {
                style.remove_property(property).map(|_| ())
            } else {
                style.set_property(property, value)
            };
        }
    }

    fn mount_overlay(&mut self) -> Result<(), HostError> {
        let body = self.document.body().ok_or(HostError::Unavailable("document.body"))?;
        let parent = self
            .container
            .parent_node()
            .ok_or(HostError::Unavailable("container parent"))?;
        let overlay = create_html(&self.document, "div", "psv-fullscreen-overlay")?;
        overlay.style().set_css_text(OVERLAY_CSS);

        self.anchor = Some((parent, self.container.next_sibling()));
        overlay.append_child(&self.container).map_err(js_error)?;
        body.append_child(&overlay).map_err(js_error)?;
        self.overlay = Some(overlay);
        Ok(())
    }

    fn unmount_overlay(&mut self) {
        if let Some((parent, sibling)) = self.anchor.take() {
            if let Err(e) = parent.insert_before(&self.container, sibling.as_ref()) {
                log::warn!("cannot restore container position: {e:?}");
            }
        }
        if let Some(overlay) = self.overlay.take() {
            overlay.remove();
        }
    }

    fn request_native(&mut self, api: &FullscreenApi) -> Result<(), HostError> {
        let root = self
            .document
            .document_element()
            .ok_or(HostError::Unavailable("document element"))?;
        let result = call_method(&root, api.request)?;
        if let Ok(promise) = result.dyn_into::<js_sys::Promise>() {
            let on_failed = self.on_native_failed.clone();
            spawn_local(async move {
                if let Err(e) = JsFuture::from(promise).await {
                    log::debug!("native fullscreen rejected: {e:?}");
                    on_failed();
                }
            });
        }
        Ok(())
    }

    fn exit_native(&mut self, api: &FullscreenApi) {
        match call_method(&self.document, api.exit) {
            Ok(result) => {
                if let Ok(promise) = result.dyn_into::<js_sys::Promise>() {
                    spawn_local(async move {
                        if let Err(e) = JsFuture::from(promise).await {
                            log::debug!("leaving native fullscreen failed: {e:?}");
                        }
                    });
                }
            }
            Err(e) => log::debug!("cannot leave native fullscreen: {e}"),
        }
    }

    fn native_active(&self) -> bool {
        ALL_APIS.iter().any(|api| {
            js_sys::Reflect::get(&self.document, &JsValue::from_str(api.element))
                .map(|v| !v.is_null() && !v.is_undefined())
                .unwrap_or(false)
        })
    }

    fn viewport_meta(&self) -> Option<String> {
        self.document
            .query_selector("meta[name=\"viewport\"]")
            .ok()
            .flatten()
            .and_then(|meta| meta.get_attribute("content"))
    }

    fn set_viewport_meta(&mut self, content: &str) {
        if let Ok(Some(meta)) = self.document.query_selector("meta[name=\"viewport\"]") {
            let _ = meta.set_attribute("content", content);
        }
    }

    fn hide_address_bar(&mut self) {
        let window = self.window.clone();
        let scroll = Closure::once_into_js(move || window.scroll_to_with_x_and_y(0.0, 1.0));
        let _ = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(scroll.unchecked_ref(), 100);
    }

    fn set_scroll_locked(&mut self, locked: bool) {
        if let Some(body) = self.document.body() {
            let _ = if locked {
                body.style().set_property("overflow", "hidden")
            } else {
                body.style().remove_property("overflow").map(|_| ())
            };
        }
        self.scroll_guard = if locked {
            Listener::active(&self.document, "touchmove", |e| e.prevent_default())
                .map_err(|e| log::debug!("cannot guard touch scrolling: {e}"))
                .ok()
        } else {
            None
        };
    }
}

/// Call a possibly vendor-prefixed zero-argument method by name.
fn call_method(target: &JsValue, name: &str) -> Result<JsValue, HostError> {
    let method = js_sys::Reflect::get(target, &JsValue::from_str(name))
        .map_err(js_error)?
        .dyn_into::<js_sys::Function>()
        .map_err(|_| HostError::Unavailable("fullscreen method"))?;
    method.call0(target).map_err(js_error)
}
