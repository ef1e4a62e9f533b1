//! The one status table both surfaces render from.
//!
//! Surfaces never keep their own copy of the labels. They take a [`Catalog`],
//! a read-only view over [`STATUS_TABLE`] that may hide entries but keeps
//! the table order.

use serde::Serialize;

use crate::StatusCode;

/// Tile tint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileColor {
    Red,
    Green,
    Blue,
    Yellow,
    Orange,
    Purple,
    Gray,
    Indigo,
    Pink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusDefinition {
    pub code: StatusCode,
    pub label: &'static str,
    pub color: TileColor,
    /// Symbol name used by head units that render icons.
    pub symbol: &'static str,
    /// Shown on the in-car surface when it only lists driving statuses.
    pub driving_relevant: bool,
}

const fn entry(
    code: u8,
    label: &'static str,
    color: TileColor,
    symbol: &'static str,
    driving_relevant: bool,
) -> StatusDefinition {
    StatusDefinition {
        code: StatusCode(code),
        label,
        color,
        symbol,
        driving_relevant,
    }
}

/// Display order follows the radio keypad: 1-9, then 0.
pub static STATUS_TABLE: [StatusDefinition; 10] = [
    entry(1, "Available on radio", TileColor::Green, "antenna.radiowaves.left.and.right", true),
    entry(2, "At station", TileColor::Blue, "house.fill", true),
    entry(3, "Job accepted", TileColor::Orange, "checkmark.rectangle.fill", true),
    entry(4, "On scene", TileColor::Purple, "mappin.circle.fill", true),
    entry(5, "Request to talk", TileColor::Yellow, "bubble.left.fill", false),
    entry(6, "Unavailable", TileColor::Gray, "nosign", true),
    entry(7, "Transporting", TileColor::Indigo, "shippingbox.fill", true),
    entry(8, "At destination", TileColor::Pink, "flag.fill", true),
    entry(9, "Other", TileColor::Blue, "ellipsis.circle.fill", false),
    entry(0, "Urgent", TileColor::Red, "exclamationmark.triangle.fill", false),
];

pub(crate) fn definition(code: StatusCode) -> &'static StatusDefinition {
    // Codes are 0..=9 and the table holds each of them once; the keypad
    // order puts code 0 last.
    let index = match code.get() {
        0 => STATUS_TABLE.len() - 1,
        n => usize::from(n) - 1,
    };
    &STATUS_TABLE[index]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogFilter {
    #[default]
    All,
    DrivingOnly,
}

/// Filtered, ordered view of [`STATUS_TABLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Catalog {
    filter: CatalogFilter,
}

impl Catalog {
    pub fn new(filter: CatalogFilter) -> Self {
        Self { filter }
    }

    pub fn all() -> Self {
        Self::new(CatalogFilter::All)
    }

    pub fn driving_only() -> Self {
        Self::new(CatalogFilter::DrivingOnly)
    }

    pub fn filter(&self) -> CatalogFilter {
        self.filter
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static StatusDefinition> + use<> {
        let filter = self.filter;
        STATUS_TABLE
            .iter()
            .filter(move |d| filter == CatalogFilter::All || d.driving_relevant)
    }

    /// Definition of `code` if this view shows it as a tile.
    pub fn get(&self, code: StatusCode) -> Option<&'static StatusDefinition> {
        let def = definition(code);
        self.shows(def).then_some(def)
    }

    pub fn contains(&self, code: StatusCode) -> bool {
        self.get(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shows(&self, def: &StatusDefinition) -> bool {
        match self.filter {
            CatalogFilter::All => true,
            CatalogFilter::DrivingOnly => def.driving_relevant,
        }
    }
}
