// gallery.rs — page-level owner of every viewer and of the admission registry

use std::collections::BTreeMap;
use std::time::Duration;

use crate::admission::{AdmissionRegistry, ViewerId};
use crate::backend::{BackendProvider, RendererConfig, SurfaceSize};
use crate::device::DeviceInfo;
use crate::fullscreen::FullscreenApi;
use crate::settings::ViewerSettings;
use crate::viewer::{Viewer, ViewerEvent};

/// Marker class of panorama containers.
pub const CONTAINER_CLASS: &str = "psv-container";
/// Attribute carrying the image URL.
pub const IMAGE_ATTRIBUTE: &str = "data-img";

/// Image URL of a container, if it names one.
pub fn container_image(data_img: Option<&str>) -> Option<&str> {
    data_img.map(str::trim).filter(|url| !url.is_empty())
}

pub struct Gallery {
    settings: ViewerSettings,
    device: DeviceInfo,
    config: RendererConfig,
    registry: AdmissionRegistry,
    viewers: BTreeMap<ViewerId, Viewer>,
    next_id: u32,
}

impl Gallery {
    pub fn new(settings: ViewerSettings, device: DeviceInfo, config: RendererConfig) -> Self {
        Self {
            registry: AdmissionRegistry::new(settings.max_active_viewers),
            settings,
            device,
            config,
            viewers: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn registry(&self) -> &AdmissionRegistry {
        &self.registry
    }

    /// Create a viewer in the `Constructing` state.
    pub fn add_viewer(&mut self, image_url: &str, size: SurfaceSize, fullscreen_api: Option<FullscreenApi>) -> ViewerId {
        let id = ViewerId(self.next_id);
        self.next_id += 1;
        let viewer = Viewer::new(id, image_url, &self.settings, &self.device, size, fullscreen_api);
        self.viewers.insert(id, viewer);
        log::debug!("{id} created for {image_url}");
        id
    }

    /// Create, initialize and activate a viewer in one go.
    pub async fn spawn<P: BackendProvider>(
        &mut self,
        provider: &P,
        image_url: &str,
        size: SurfaceSize,
        fullscreen_api: Option<FullscreenApi>,
    ) -> ViewerId {
        let id = self.add_viewer(image_url, size, fullscreen_api);
        let config = self.config.clone();
        if let Some(viewer) = self.viewers.get_mut(&id) {
            viewer.initialize(provider, &config).await;
        }
        self.admit_initialized(id);
        id
    }

    pub fn get(&self, id: ViewerId) -> Option<&Viewer> {
        self.viewers.get(&id)
    }

    pub fn get_mut(&mut self, id: ViewerId) -> Option<&mut Viewer> {
        self.viewers.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<ViewerId> {
        self.viewers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    /// Admit `id`, deactivating the oldest admitted viewer when full.
    /// Returns the evicted viewer.
    pub fn activate(&mut self, id: ViewerId) -> Option<ViewerId> {
        let viewer = self.viewers.get_mut(&id)?;
        if !viewer.activate() {
            return None;
        }
        let evicted = self.registry.register(id)?;
        if let Some(old) = self.viewers.get_mut(&evicted) {
            old.deactivate();
        }
        Some(evicted)
    }

    /// Admission right after initialization. A viewer already reported off
    /// screen waits for its next visibility change instead of taking a slot
    /// from one that is on screen.
    pub fn admit_initialized(&mut self, id: ViewerId) -> Option<ViewerId> {
        let viewer = self.viewers.get(&id)?;
        if self.settings.admission_follows_visibility && !viewer.is_visible() {
            log::debug!("{id} initialized off screen, admission deferred");
            return None;
        }
        self.activate(id)
    }

    pub fn deactivate(&mut self, id: ViewerId) {
        self.registry.unregister(id);
        if let Some(viewer) = self.viewers.get_mut(&id) {
            viewer.deactivate();
        }
    }

    /// Route an intersection observation. With admission following
    /// visibility, entering the viewport re-admits and leaving frees the
    /// slot; otherwise only the viewer's own loop pauses.
    pub fn observe_visibility(&mut self, id: ViewerId, is_intersecting: bool, ratio: f64) {
        let Some(viewer) = self.viewers.get_mut(&id) else {
            return;
        };
        let Some(visible) = viewer.observe_visibility(is_intersecting, ratio) else {
            return;
        };
        if self.settings.admission_follows_visibility {
            if visible {
                self.activate(id);
            } else {
                self.deactivate(id);
            }
        }
    }

    /// One animation frame for every viewer. Returns true while any viewer
    /// still wants frames.
    pub fn tick(&mut self, now: Duration) -> bool {
        for viewer in self.viewers.values_mut() {
            viewer.tick(now);
        }
        self.any_running()
    }

    pub fn any_running(&self) -> bool {
        self.viewers.values().any(Viewer::is_running)
    }

    pub fn poll_timers(&mut self, now: Duration) {
        for viewer in self.viewers.values_mut() {
            viewer.poll_timers(now);
        }
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.viewers.values().filter_map(Viewer::next_deadline).min()
    }

    pub fn take_events(&mut self) -> Vec<(ViewerId, ViewerEvent)> {
        self.viewers
            .iter_mut()
            .flat_map(|(id, viewer)| viewer.take_events().into_iter().map(move |e| (*id, e)))
            .collect()
    }

    /// Dispose and forget one viewer.
    pub fn remove(&mut self, id: ViewerId) -> Option<Viewer> {
        self.registry.unregister(id);
        let mut viewer = self.viewers.remove(&id)?;
        viewer.dispose();
        Some(viewer)
    }

    /// Page teardown.
    pub fn dispose_all(&mut self) {
        for viewer in self.viewers.values_mut() {
            viewer.dispose();
        }
        for id in self.ids() {
            self.registry.unregister(id);
        }
        log::debug!("disposed {} viewers", self.viewers.len());
        self.viewers.clear();
    }
}

impl Drop for Gallery {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::tests::FakeProvider;
    use crate::viewer::tests::device;
    use crate::viewer::ViewerState;

    fn gallery(follow: bool) -> Gallery {
        let device = device(false, true);
        let settings = ViewerSettings {
            admission_follows_visibility: follow,
            ..ViewerSettings::default()
        };
        let config = RendererConfig::for_device(&device);
        Gallery::new(settings, device, config)
    }

    fn spawn(g: &mut Gallery, provider: &FakeProvider) -> ViewerId {
        pollster::block_on(g.spawn(provider, "/p.jpg", SurfaceSize::new(320, 180), None))
    }

    #[test]
    fn container_needs_a_non_empty_url() {
        assert_eq!(container_image(Some(" /p.jpg ")), Some("/p.jpg"));
        assert_eq!(container_image(Some("")), None);
        assert_eq!(container_image(None), None);
    }

    #[test]
    fn fourth_viewer_evicts_the_first() {
        let provider = FakeProvider::working();
        let mut g = gallery(true);
        let ids: Vec<_> = (0..4).map(|_| spawn(&mut g, &provider)).collect();

        assert_eq!(g.registry().len(), 3);
        assert!(!g.registry().contains(ids[0]));
        let first = g.get(ids[0]).unwrap();
        assert_eq!(first.state(), ViewerState::Deactivated);
        assert!(!first.is_running());
        assert!(g.get(ids[3]).unwrap().is_running());
    }

    #[test]
    fn leaving_the_viewport_frees_the_slot() {
        let provider = FakeProvider::working();
        let mut g = gallery(true);
        let a = spawn(&mut g, &provider);
        g.observe_visibility(a, false, 0.0);
        assert!(!g.registry().contains(a));
        g.observe_visibility(a, true, 0.5);
        assert!(g.registry().contains(a));
        assert!(g.get(a).unwrap().is_running());
    }

    #[test]
    fn hidden_during_construction_waits_for_visibility() {
        let provider = FakeProvider::working();
        let mut g = gallery(true);
        let id = g.add_viewer("/p.jpg", SurfaceSize::new(320, 180), None);
        g.observe_visibility(id, false, 0.0);

        let config = g.config().clone();
        pollster::block_on(g.get_mut(id).unwrap().initialize(&provider, &config));
        assert_eq!(g.admit_initialized(id), None);
        assert!(!g.registry().contains(id));
        assert_eq!(g.get(id).unwrap().state(), ViewerState::Ready);

        g.observe_visibility(id, true, 0.4);
        assert!(g.registry().contains(id));
        assert!(g.get(id).unwrap().is_running());
    }

    #[test]
    fn visibility_alone_only_pauses() {
        let provider = FakeProvider::working();
        let mut g = gallery(false);
        let a = spawn(&mut g, &provider);
        g.observe_visibility(a, false, 0.0);
        assert!(g.registry().contains(a));
        assert!(!g.any_running());
    }

    #[test]
    fn dispose_all_empties_everything() {
        let provider = FakeProvider::working();
        let mut g = gallery(true);
        spawn(&mut g, &provider);
        spawn(&mut g, &provider);
        g.dispose_all();
        assert!(g.is_empty());
        assert!(g.registry().is_empty());
        assert_eq!(provider.gpu_log.borrow().releases, 2);
        g.dispose_all();
    }
}
