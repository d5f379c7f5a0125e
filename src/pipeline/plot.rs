use std::io::Cursor;
use std::path::Path;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::pipeline::error::PlotError;
use crate::pipeline::HistoryWindow;
use crate::types::{ChannelGroupBounds, DisplayBounds};
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
    /// Captions, tick labels and legends. These need a system font.
    pub draw_text: bool,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
            background: RGBColor(10, 10, 10),
            palette: vec![RED, GREEN, BLUE, CYAN, MAGENTA, YELLOW, WHITE],
            draw_text: true,
        }
    }
}
/// Renders the window with the given bounds: one panel per channel group,
/// stacked vertically. The time axis is in seconds since `bounds.x_min`.
pub fn render_window_png(
    window: &HistoryWindow,
    bounds: &DisplayBounds,
    channel_labels: &[String],
    style: &PlotStyle,
) -> Result<Vec<u8>, PlotError> {
    if window.is_empty() || bounds.groups.is_empty() {
        return Err(PlotError::EmptyWindow);
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let panels = root.split_evenly((bounds.groups.len(), 1));
        for (panel, group) in panels.iter().zip(&bounds.groups) {
            draw_group(panel, window, bounds, group, channel_labels, style)?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
/// Renders and writes the snapshot to `path`.
pub fn save_window_png(
    path: &Path,
    window: &HistoryWindow,
    bounds: &DisplayBounds,
    channel_labels: &[String],
    style: &PlotStyle,
) -> Result<(), PlotError> {
    let png = render_window_png(window, bounds, channel_labels, style)?;
    std::fs::write(path, png)?;
    Ok(())
}
fn draw_group(
    panel: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    window: &HistoryWindow,
    bounds: &DisplayBounds,
    group: &ChannelGroupBounds,
    channel_labels: &[String],
    style: &PlotStyle,
) -> Result<(), PlotError> {
    let x_end = seconds_between(bounds, bounds.x_max);
    let mut builder = ChartBuilder::on(panel);
    builder.margin(10);
    if style.draw_text {
        let title = group
            .channels
            .iter()
            .map(|&c| label_for(channel_labels, c))
            .collect::<Vec<_>>()
            .join(" / ");
        builder
            .caption(title, ("sans-serif", 16).into_font().color(&WHITE))
            .set_label_area_size(LabelAreaPosition::Left, 50)
            .set_label_area_size(LabelAreaPosition::Bottom, 30);
    }
    let mut chart = builder.build_cartesian_2d(0f64..x_end, group.y.min..group.y.max)?;
    if style.draw_text {
        chart
            .configure_mesh()
            .light_line_style(&WHITE.mix(0.1))
            .x_desc("s")
            .draw()?;
    }
    for &channel in &group.channels {
        let color = style.palette[channel % style.palette.len()];
        let series = window.values().filter_map(|r| {
            r.channels()
                .get(channel)
                .map(|v| (seconds_between(bounds, r.timestamp()), *v))
        });
        let drawn = chart.draw_series(LineSeries::new(series, &color))?;
        if style.draw_text {
            drawn
                .label(label_for(channel_labels, channel))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }
    }
    if style.draw_text {
        chart
            .configure_series_labels()
            .border_style(&WHITE.mix(0.2))
            .background_style(&style.background)
            .draw()?;
    }
    Ok(())
}
fn seconds_between(bounds: &DisplayBounds, at: chrono::DateTime<chrono::Local>) -> f64 {
    (at - bounds.x_min).num_milliseconds() as f64 / 1000.0
}
fn label_for(channel_labels: &[String], channel: usize) -> String {
    channel_labels
        .get(channel)
        .cloned()
        .unwrap_or_else(|| format!("Ch {channel}"))
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, PlotError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| PlotError::Draw("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
