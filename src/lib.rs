// lib.rs — embeddable 360° panorama viewer
//
// The core is platform independent: capability probing, renderer selection,
// the software projector, viewer lifecycle, admission and fullscreen logic
// all run (and are tested) natively. The browser glue lives in `web` and is
// only built for `wasm32`.

pub mod admission;
pub mod backend;
pub mod camera;
pub mod device;
pub mod error;
pub mod factory;
pub mod fullscreen;
pub mod gallery;
pub mod i18n;
pub mod input;
pub mod logging;
pub mod notice;
pub mod panorama;
pub mod projector;
pub mod settings;
pub mod timers;
pub mod viewer;
pub mod visibility;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use admission::{AdmissionRegistry, ViewerId};
pub use backend::{BackendKind, BackendProvider, RenderBackend, RendererConfig, SurfaceSize};
pub use camera::Camera;
pub use device::{device_info, DeviceInfo, DeviceProbe};
pub use error::{HostError, PanoramaError, ProbeError, RenderError, RenderResult};
pub use factory::create_renderer;
pub use gallery::Gallery;
pub use panorama::Panorama;
pub use settings::ViewerSettings;
pub use viewer::{Viewer, ViewerEvent, ViewerState};
