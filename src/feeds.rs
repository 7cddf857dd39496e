/// Feed registry for the reservoir chart ingest service.
///
/// Defines the two chart feeds scraped from the provincial hydrological
/// information service, along with the reservoir station whose capacity
/// table converts levels into storage volumes. This is the single source of
/// truth for the default chart URLs; deployments override them through
/// `config::FeedsConfig` rather than editing this table.

use crate::model::{FeedKind, SlotPair};

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

/// Capacity-table key of the monitored reservoir.
pub const DEFAULT_STATION_NAME: &str = "横山水库";

/// Base URL of the chart service's static image directory.
pub const CHART_BASE_URL: &str = "http://www.jsswj.com.cn:88/jsswxxSSI/static/map/chart/0";

// ---------------------------------------------------------------------------
// Feed metadata
// ---------------------------------------------------------------------------

/// Metadata for a single chart feed.
pub struct Feed {
    pub kind: FeedKind,
    /// Human-readable feed name used in logs and verification output.
    pub name: &'static str,
    /// Chart image identifier on the service, without the `_list.png` suffix.
    pub chart_id: &'static str,
}

impl Feed {
    /// Default chart URL, without the cache-busting query parameter.
    pub fn default_url(&self) -> String {
        format!("{}/{}_list.png", CHART_BASE_URL, self.chart_id)
    }

    pub fn slot_pair(&self) -> SlotPair {
        self.kind.slot_pair()
    }
}

/// Both monitored chart feeds. Level is listed first: a cycle processes
/// feeds in registry order.
pub static FEED_REGISTRY: &[Feed] = &[
    Feed {
        kind: FeedKind::Level,
        name: "Reservoir water level",
        // One row per hour: compact time, level in metres.
        chart_id: "f5ae2cba035843f4bca62749cff74106",
    },
    Feed {
        kind: FeedKind::Rain,
        name: "Reservoir rainfall",
        // One row per hour: compact time, hourly and cumulative rainfall in mm.
        chart_id: "ad95798ccba3434d8b0dbe0ea22d0659",
    },
];

/// Looks up the registry entry for a feed kind.
pub fn find_feed(kind: FeedKind) -> &'static Feed {
    match kind {
        FeedKind::Level => &FEED_REGISTRY[0],
        FeedKind::Rain => &FEED_REGISTRY[1],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
