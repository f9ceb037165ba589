// notice.rs — the in-widget error affordance: a small indicator that expands into a
// plain-language explanation.

use crate::i18n::{tr, tr_with};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// The GPU context was lost and the viewer now paints on a 2D canvas.
    CanvasFallback,
    /// The panorama image failed to load; the sphere stays blank.
    TextureLoadFailed { url: String },
    /// Nothing could be rendered at all.
    InitFailed,
}

impl NoticeKind {
    /// Tooltip of the collapsed indicator.
    pub fn title(&self) -> String {
        tr("notice.indicator_title")
    }

    pub fn heading(&self) -> String {
        tr("notice.heading")
    }

    pub fn detail(&self) -> String {
        match self {
            Self::CanvasFallback => tr("notice.canvas_fallback"),
            Self::TextureLoadFailed { url } => tr_with("notice.texture_failed", &[("url", url.clone())]),
            Self::InitFailed => tr("notice.init_failed"),
        }
    }

    pub fn close_hint(&self) -> String {
        tr("notice.close_hint")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorNotice {
    kind: Option<NoticeKind>,
    expanded: bool,
}

impl ErrorNotice {
    /// Show `kind`, replacing any current notice. Starts collapsed.
    pub fn show(&mut self, kind: NoticeKind) {
        log::debug!("notice shown: {kind:?}");
        self.kind = Some(kind);
        self.expanded = false;
    }

    pub fn kind(&self) -> Option<&NoticeKind> {
        self.kind.as_ref()
    }

    pub fn is_shown(&self) -> bool {
        self.kind.is_some()
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Expand or collapse the detail panel. Returns true if now expanded.
    pub fn toggle(&mut self) -> bool {
        self.expanded = self.kind.is_some() && !self.expanded;
        self.expanded
    }

    pub fn collapse(&mut self) {
        self.expanded = false;
    }

    pub fn clear(&mut self) {
        self.kind = None;
        self.expanded = false;
    }
}
