use chrono::Duration;
use crate::pipeline::HistoryWindow;
use crate::types::{AxisRange, ChannelGroupBounds, DisplayBounds, DisplayLayout};
/// Extra room after the newest sample, as a fraction of the visible span.
const X_MARGIN_FRACTION: f64 = 0.05;
/// Lower bound for the time-axis margin, in milliseconds.
const MIN_X_MARGIN_MS: i64 = 1_000;
/// Value-axis padding as a fraction of the observed range.
const Y_MARGIN_FRACTION: f64 = 0.1;
/// Computes display axis ranges from the current window.
#[derive(Clone, Copy, Debug)]
pub struct BoundsEstimator {
    layout: DisplayLayout,
    zero_range_margin: f64,
}
impl BoundsEstimator {
    pub fn new(layout: DisplayLayout, zero_range_margin: f64) -> Self {
        Self {
            layout,
            zero_range_margin,
        }
    }
    /// Uses the layout's default margin for constant signals.
    pub fn for_layout(layout: DisplayLayout) -> Self {
        Self::new(layout, layout.default_zero_range_margin())
    }
    /// Returns `None` for an empty window.
    pub fn estimate(&self, window: &HistoryWindow) -> Option<DisplayBounds> {
        let first = window.values().next()?;
        let (x_min, x_max) = window.values().fold(
            (first.timestamp(), first.timestamp()),
            |(lo, hi), r| (lo.min(r.timestamp()), hi.max(r.timestamp())),
        );
        let span_ms = (x_max - x_min).num_milliseconds() as f64;
        let margin_ms = ((span_ms * X_MARGIN_FRACTION).round() as i64).max(MIN_X_MARGIN_MS);
        let channel_count = first.channel_count();
        let groups = match self.layout {
            DisplayLayout::Overlay => vec![(0..channel_count).collect::<Vec<_>>()],
            DisplayLayout::PerChannel => (0..channel_count).map(|c| vec![c]).collect(),
        };
        let groups = groups
            .into_iter()
            .filter_map(|channels| {
                let y = self.value_range(window, &channels)?;
                Some(ChannelGroupBounds { channels, y })
            })
            .collect();
        Some(DisplayBounds {
            x_min,
            x_max: x_max + Duration::milliseconds(margin_ms),
            groups,
        })
    }
    fn value_range(&self, window: &HistoryWindow, channels: &[usize]) -> Option<AxisRange> {
        let mut values = channels.iter().flat_map(|&c| window.channel(c));
        let first = values.next()?;
        let (lo, hi) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let pad = if hi > lo {
            (hi - lo) * Y_MARGIN_FRACTION
        } else {
            self.zero_range_margin
        };
        Some(AxisRange {
            min: lo - pad,
            max: hi + pad,
        })
    }
}
