//! The two status surfaces.
//!
//! Both render the same tile grid from the shared catalog; the in-car
//! surface may use a filtered view. Rendering is a pure function of the
//! controller's snapshot.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use trupp_core::{Catalog, StatusCode, Surface, TileColor};

use crate::controller::{ControllerError, Selection, StatusHandle};
use crate::machine::{Confirmation, Phase, StatusSnapshot};

const PENDING_GLYPH: char = '…';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub code: StatusCode,
    pub label: &'static str,
    pub color: TileColor,
    /// `○` idle, `…` pending, `●` success, `✗` failure.
    pub glyph: char,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tile {
    pub code: StatusCode,
    pub label: &'static str,
    pub color: TileColor,
    pub symbol: &'static str,
    /// Drawn at full tint; every other tile is dimmed.
    pub active: bool,
}

/// Everything a surface shows at one moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurfaceView {
    pub surface: Surface,
    pub header: Header,
    pub tiles: Vec<Tile>,
    pub banner: Option<String>,
}

impl SurfaceView {
    pub fn render(surface: Surface, catalog: &Catalog, snapshot: &StatusSnapshot) -> Self {
        let current = snapshot.current.code;
        let def = current.definition();

        let glyph = match snapshot.phase {
            Phase::Pending => PENDING_GLYPH,
            Phase::Idle => snapshot.indicator.glyph(),
        };

        let tiles = catalog
            .iter()
            .map(|d| Tile {
                code: d.code,
                label: d.label,
                color: d.color,
                symbol: d.symbol,
                active: d.code == current,
            })
            .collect();

        Self {
            surface,
            header: Header {
                code: current,
                label: def.label,
                color: def.color,
                glyph,
            },
            tiles,
            banner: snapshot.confirmation.map(banner),
        }
    }

    pub fn active_tile(&self) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.active)
    }
}

fn banner(confirmation: Confirmation) -> String {
    if confirmation.success {
        format!("Status {} sent", confirmation.code)
    } else {
        format!("Failed to send status {}", confirmation.code)
    }
}

impl fmt::Display for SurfaceView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "[{}] {} {} {} ({:?})",
            self.surface, self.header.glyph, self.header.code, self.header.label, self.header.color
        )?;
        for tile in &self.tiles {
            let marker = if tile.active { '>' } else { ' ' };
            writeln!(f, "{marker} {} {}", tile.code, tile.label)?;
        }
        if let Some(banner) = &self.banner {
            writeln!(f, "{banner}")?;
        }
        Ok(())
    }
}

/// A surface bound to its controller.
#[derive(Clone)]
pub struct StatusSurface {
    catalog: Catalog,
    handle: StatusHandle,
}

impl StatusSurface {
    pub fn new(handle: StatusHandle, catalog: Catalog) -> Self {
        Self { catalog, handle }
    }

    pub fn kind(&self) -> Surface {
        self.handle.surface()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn handle(&self) -> &StatusHandle {
        &self.handle
    }

    pub fn view(&self) -> SurfaceView {
        SurfaceView::render(self.kind(), &self.catalog, &self.handle.snapshot())
    }

    /// The user tapped the tile for `code`. Codes without a tile on this
    /// surface are refused.
    pub async fn tap(&self, code: StatusCode) -> Result<Selection, ControllerError> {
        if !self.catalog.contains(code) {
            return Err(ControllerError::NotOnSurface(code, self.kind()));
        }
        self.handle.select(code).await
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.handle.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use trupp_core::{ConnectionIndicator, CurrentStatus};

    use super::*;

    fn code(n: i64) -> StatusCode {
        StatusCode::new(n).unwrap()
    }

    fn snapshot(current: i64) -> StatusSnapshot {
        StatusSnapshot {
            current: CurrentStatus::restored(code(current)),
            indicator: ConnectionIndicator::Idle,
            phase: Phase::Idle,
            pending: None,
            confirmation: None,
        }
    }

    #[test]
    fn exactly_one_tile_is_active() {
        let view = SurfaceView::render(Surface::Mobile, &Catalog::all(), &snapshot(4));

        assert_eq!(view.tiles.len(), 10);
        assert_eq!(view.tiles.iter().filter(|t| t.active).count(), 1);
        assert_eq!(view.active_tile().map(|t| t.code), Some(code(4)));
        assert_eq!(view.header.label, "On scene");
        assert_eq!(view.header.glyph, '○');
    }

    #[test]
    fn pending_shows_previous_status() {
        let mut snap = snapshot(2);
        snap.phase = Phase::Pending;
        snap.pending = Some(code(6));

        let view = SurfaceView::render(Surface::Car, &Catalog::all(), &snap);
        assert_eq!(view.header.glyph, '…');
        assert_eq!(view.active_tile().map(|t| t.code), Some(code(2)));
    }

    #[test]
    fn hidden_current_status_still_in_header() {
        let view = SurfaceView::render(Surface::Car, &Catalog::driving_only(), &snapshot(5));

        assert_eq!(view.tiles.len(), 7);
        assert_eq!(view.active_tile(), None);
        assert_eq!(view.header.code, code(5));
    }

    #[test]
    fn banner_follows_confirmation() {
        let mut snap = snapshot(3);
        snap.indicator = ConnectionIndicator::Success;
        snap.confirmation = Some(Confirmation {
            code: code(3),
            success: true,
        });
        let view = SurfaceView::render(Surface::Mobile, &Catalog::all(), &snap);
        assert_eq!(view.banner.as_deref(), Some("Status 3 sent"));
        assert_eq!(view.header.glyph, '●');

        snap.indicator = ConnectionIndicator::Failure;
        snap.confirmation = Some(Confirmation {
            code: code(8),
            success: false,
        });
        let view = SurfaceView::render(Surface::Mobile, &Catalog::all(), &snap);
        assert_eq!(view.banner.as_deref(), Some("Failed to send status 8"));
        assert_eq!(view.header.glyph, '✗');
    }

    #[test]
    fn display_marks_active_tile() {
        let view = SurfaceView::render(Surface::Car, &Catalog::driving_only(), &snapshot(1));
        let text = view.to_string();

        assert!(text.starts_with("[car] ○ 1 Available on radio"));
        assert!(text.contains("> 1 Available on radio"));
        assert!(text.contains("  2 At station"));
        assert!(!text.contains("Urgent"));
    }
}
