// src/gui.rs
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::{anyhow, Result};
use chrono::{Local, TimeZone};
use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotBounds, PlotPoints};
use log::{error, info};
use crate::commands::BoxedCycle;
use crate::config::SessionConfig;
use crate::pipeline::CycleError;
use crate::types::{ChannelGroupBounds, DisplayBounds, DisplayLayout};
const PALETTE: [Color32; 6] = [
    Color32::from_rgb(230, 60, 60),
    Color32::from_rgb(60, 200, 90),
    Color32::from_rgb(70, 130, 240),
    Color32::from_rgb(0, 220, 220),
    Color32::from_rgb(220, 0, 220),
    Color32::YELLOW,
];
/// State shared between the window and the caller of [`run`].
struct Session {
    cycle: Option<BoxedCycle>,
    failure: Option<CycleError>,
}
pub struct MonitorApp {
    session: Rc<RefCell<Session>>,
    labels: Vec<String>,
    layout: DisplayLayout,
    interval: Duration,
    last_tick: Option<Instant>,
    stop: Arc<AtomicBool>,
    source: String,
    log_path: String,
}
impl MonitorApp {
    fn new(session: Rc<RefCell<Session>>, config: &SessionConfig, stop: Arc<AtomicBool>) -> Self {
        let source = session
            .borrow()
            .cycle
            .as_ref()
            .map(|c| c.stream().describe())
            .unwrap_or_default();
        Self {
            session,
            labels: config.channel_labels.clone(),
            layout: config.layout,
            interval: config.tick_interval(),
            last_tick: None,
            stop,
            source,
            log_path: config.output.display().to_string(),
        }
    }
    /// Runs one tick when the interval has elapsed. A fatal error or a stop
    /// signal closes the window.
    fn pump(&mut self, ctx: &egui::Context) {
        if self.stop.swap(false, Ordering::Relaxed) {
            info!("Stop requested");
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        let due = self.last_tick.map_or(true, |t| t.elapsed() >= self.interval);
        if !due {
            return;
        }
        self.last_tick = Some(Instant::now());
        let mut session = self.session.borrow_mut();
        if session.failure.is_some() {
            return;
        }
        let Some(cycle) = session.cycle.as_mut() else {
            return;
        };
        if let Err(e) = cycle.tick() {
            error!("{e}");
            session.failure = Some(e);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
    fn label(&self, channel: usize) -> String {
        self.labels
            .get(channel)
            .cloned()
            .unwrap_or_else(|| format!("Ch{channel}"))
    }
    fn draw_group(
        &self,
        ui: &mut egui::Ui,
        id: usize,
        height: f32,
        points: &[Vec<[f64; 2]>],
        bounds: &DisplayBounds,
        group: &ChannelGroupBounds,
    ) {
        let x_min = epoch_seconds(bounds.x_min);
        let x_max = epoch_seconds(bounds.x_max);
        Plot::new(("sensor_plot", id))
            .height(height)
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .legend(Legend::default())
            .x_axis_formatter(|x, _chars, _range| clock_label(x))
            .show(ui, |plot_ui| {
                plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                    [x_min, group.y.min],
                    [x_max, group.y.max],
                ));
                for &channel in &group.channels {
                    let Some(series) = points.get(channel) else {
                        continue;
                    };
                    plot_ui.line(
                        Line::new(PlotPoints::new(series.clone()))
                            .name(self.label(channel))
                            .color(PALETTE[channel % PALETTE.len()]),
                    );
                }
            });
    }
}
impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.pump(ctx);
        ctx.request_repaint_after(self.interval);
        let session = self.session.borrow();
        let Some(cycle) = session.cycle.as_ref() else {
            return;
        };
        let stats = cycle.stats();
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.monospace(&self.source);
                ui.separator();
                ui.monospace(format!(
                    "{} rows -> {}",
                    cycle.log().rows_written(),
                    self.log_path
                ));
                ui.separator();
                ui.monospace(format!(
                    "accepted {} / skipped {} / idle {}",
                    stats.accepted, stats.skipped, stats.no_data
                ));
                if let Some(latest) = cycle.window().latest() {
                    ui.separator();
                    let values = latest
                        .channels()
                        .iter()
                        .enumerate()
                        .map(|(c, v)| format!("{}={v}", self.label(c)))
                        .collect::<Vec<_>>()
                        .join("  ");
                    ui.monospace(values);
                }
            });
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(bounds) = cycle.bounds() else {
                ui.centered_and_justified(|ui| {
                    ui.label(format!("Waiting for data on {}...", self.source));
                });
                return;
            };
            // channel -> [time, value]
            let channel_count = cycle.window().latest().map_or(0, |r| r.channel_count());
            let points: Vec<Vec<[f64; 2]>> = (0..channel_count)
                .map(|c| {
                    cycle
                        .window()
                        .values()
                        .filter_map(|r| r.channels().get(c).map(|v| [epoch_seconds(r.timestamp()), *v]))
                        .collect()
                })
                .collect();
            let panels = bounds.groups.len().max(1);
            let spacing = ui.spacing().item_spacing.y;
            let height = (ui.available_height() - spacing * (panels as f32 - 1.0)) / panels as f32;
            for (id, group) in bounds.groups.iter().enumerate() {
                if self.layout == DisplayLayout::PerChannel {
                    ui.label(
                        group
                            .channels
                            .iter()
                            .map(|&c| self.label(c))
                            .collect::<Vec<_>>()
                            .join(" / "),
                    );
                }
                self.draw_group(ui, id, height, &points, bounds, group);
            }
        });
    }
}
/// Opens the monitor window and blocks until it is closed.
///
/// Returns the cycle so the caller can close it and report on it. A fatal
/// tick error closes the window and is returned instead.
pub fn run(cycle: BoxedCycle, config: &SessionConfig, stop: Arc<AtomicBool>) -> Result<BoxedCycle> {
    let session = Rc::new(RefCell::new(Session {
        cycle: Some(cycle),
        failure: None,
    }));
    let app = MonitorApp::new(Rc::clone(&session), config, stop);
    let title = format!("sensorlog - {}", app.source);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 640.0])
            .with_title(title),
        ..Default::default()
    };
    eframe::run_native(
        "sensorlog",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(app)
        }),
    )
    .map_err(|e| anyhow!("display failed: {e}"))?;
    let mut session = session.borrow_mut();
    if let Some(failure) = session.failure.take() {
        return Err(anyhow::Error::new(failure).context("session aborted"));
    }
    session
        .cycle
        .take()
        .ok_or_else(|| anyhow!("monitor session lost its ingestion cycle"))
}
fn epoch_seconds(at: chrono::DateTime<Local>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}
fn clock_label(x: f64) -> String {
    Local
        .timestamp_millis_opt((x * 1000.0).round() as i64)
        .single()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}
