//! Chart rendering for stored records.
//!
//! [`ReportRenderer`] loads the latest record file, picks one numeric
//! attribute for the x axis and one result for the y axis, and writes an SVG
//! line chart with one series per target. The y axis always starts at zero
//! and ends at 1.3 times the largest plotted value.

use crate::error::{BenchError, Result};
use crate::io::RecordStore;
use crate::record::{BenchmarkRecord, Scalar};
use crate::trial::{ATTR_CLIENT_NUMBER, ATTR_TARGET, RESULT_REQUEST_PER_SECOND};
use echobench_core::timestamp;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Headroom above the largest y value.
pub const Y_HEADROOM: f64 = 1.3;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 500.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 60.0;
const TICKS: usize = 5;
const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b",
];

/// What to plot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    /// Attribute (or result) on the x axis.
    pub x_key: String,
    /// Result (or attribute) on the y axis.
    pub y_key: String,
    /// Attribute splitting records into series; `None` plots one series.
    pub series_key: Option<String>,
    /// Only records whose field equals the value are plotted.
    pub filters: Vec<(String, Scalar)>,
    /// Chart title.
    pub title: String,
    /// X axis label.
    pub x_label: String,
    /// Y axis label.
    pub y_label: String,
}

impl Default for ChartSpec {
    fn default() -> Self {
        Self {
            x_key: ATTR_CLIENT_NUMBER.to_string(),
            y_key: RESULT_REQUEST_PER_SECOND.to_string(),
            series_key: Some(ATTR_TARGET.to_string()),
            filters: Vec::new(),
            title: "Echo Server Throughput".to_string(),
            x_label: "Concurrent Clients".to_string(),
            y_label: "Requests per Second".to_string(),
        }
    }
}

/// One plotted line.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Legend label.
    pub name: String,
    /// Points sorted by x.
    pub points: Vec<(f64, f64)>,
}

/// Data ready for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    /// Series in first-seen order.
    pub series: Vec<Series>,
    /// Smallest and largest x.
    pub x_range: (f64, f64),
    /// Upper bound of the y axis.
    pub y_top: f64,
}

/// Select, group, and sort the values to plot.
pub fn prepare(records: &[BenchmarkRecord], spec: &ChartSpec) -> Result<ChartData> {
    let selected: Vec<&BenchmarkRecord> = records
        .iter()
        .filter(|r| {
            spec.filters
                .iter()
                .all(|(key, value)| r.field(key) == Some(value))
        })
        .collect();
    if selected.is_empty() {
        return Err(BenchError::EmptySelection);
    }

    let numeric = |record: &BenchmarkRecord, key: &str| {
        record
            .field(key)
            .and_then(Scalar::as_f64)
            .ok_or_else(|| BenchError::MissingField { key: key.to_string() })
    };

    let mut order: Vec<String> = Vec::new();
    let mut grouped: BTreeMap<String, Vec<(f64, f64)>> = BTreeMap::new();
    for record in selected {
        let name = match &spec.series_key {
            Some(key) => record
                .field(key)
                .map(Scalar::to_string)
                .ok_or_else(|| BenchError::MissingField { key: key.clone() })?,
            None => spec.y_key.clone(),
        };
        let point = (numeric(record, &spec.x_key)?, numeric(record, &spec.y_key)?);
        if !grouped.contains_key(&name) {
            order.push(name.clone());
        }
        grouped.entry(name).or_default().push(point);
    }

    let mut series = Vec::with_capacity(order.len());
    for name in order {
        let mut points = grouped.remove(&name).unwrap_or_default();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        series.push(Series { name, points });
    }

    let all = series.iter().flat_map(|s| s.points.iter());
    let (x_min, x_max, y_max) = all.fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0f64),
        |(lo, hi, top), &(x, y)| (lo.min(x), hi.max(x), top.max(y)),
    );
    let y_top = if y_max > 0.0 { y_max * Y_HEADROOM } else { 1.0 };

    Ok(ChartData {
        series,
        x_range: (x_min, x_max),
        y_top,
    })
}

/// Render prepared data as an SVG document.
pub fn render_svg(data: &ChartData, spec: &ChartSpec) -> String {
    let plot_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let (x_lo, x_hi) = if data.x_range.0 < data.x_range.1 {
        data.x_range
    } else {
        (data.x_range.0 - 1.0, data.x_range.1 + 1.0)
    };
    let sx = |x: f64| MARGIN_LEFT + (x - x_lo) / (x_hi - x_lo) * plot_w;
    let sy = |y: f64| MARGIN_TOP + plot_h - y / data.y_top * plot_h;

    let mut svg = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" font-family="sans-serif" font-size="12">"#
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle" font-size="16">{}</text>"#,
        WIDTH / 2.0,
        MARGIN_TOP / 2.0,
        escape(&spec.title)
    );

    // Axes
    let _ = writeln!(
        svg,
        r#"<line x1="{l}" y1="{b}" x2="{r}" y2="{b}" stroke="black"/>"#,
        l = MARGIN_LEFT,
        r = MARGIN_LEFT + plot_w,
        b = MARGIN_TOP + plot_h
    );
    let _ = writeln!(
        svg,
        r#"<line x1="{l}" y1="{t}" x2="{l}" y2="{b}" stroke="black"/>"#,
        l = MARGIN_LEFT,
        t = MARGIN_TOP,
        b = MARGIN_TOP + plot_h
    );

    for i in 0..=TICKS {
        let frac = i as f64 / TICKS as f64;
        let xv = x_lo + frac * (x_hi - x_lo);
        let yv = frac * data.y_top;
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            sx(xv),
            MARGIN_TOP + plot_h + 18.0,
            format_tick(xv)
        );
        let _ = writeln!(
            svg,
            r##"<line x1="{l}" y1="{y:.1}" x2="{r}" y2="{y:.1}" stroke="#dddddd"/>"##,
            l = MARGIN_LEFT,
            r = MARGIN_LEFT + plot_w,
            y = sy(yv)
        );
        let _ = writeln!(
            svg,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end">{}</text>"#,
            MARGIN_LEFT - 6.0,
            sy(yv) + 4.0,
            format_tick(yv)
        );
    }

    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
        MARGIN_LEFT + plot_w / 2.0,
        HEIGHT - 15.0,
        escape(&spec.x_label)
    );
    let _ = writeln!(
        svg,
        r#"<text x="20" y="{y}" text-anchor="middle" transform="rotate(-90 20 {y})">{}</text>"#,
        escape(&spec.y_label),
        y = MARGIN_TOP + plot_h / 2.0
    );

    for (i, series) in data.series.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let points: Vec<String> = series
            .points
            .iter()
            .map(|&(x, y)| format!("{:.1},{:.1}", sx(x), sy(y)))
            .collect();
        let _ = writeln!(
            svg,
            r#"<polyline fill="none" stroke="{color}" stroke-width="2" points="{}"/>"#,
            points.join(" ")
        );
        for &(x, y) in &series.points {
            let _ = writeln!(
                svg,
                r#"<circle cx="{:.1}" cy="{:.1}" r="4" fill="{color}"/>"#,
                sx(x),
                sy(y)
            );
        }

        // Legend, upper right
        let ly = MARGIN_TOP + 10.0 + i as f64 * 18.0;
        let lx = MARGIN_LEFT + plot_w - 120.0;
        let _ = writeln!(
            svg,
            r#"<circle cx="{lx}" cy="{ly}" r="5" fill="{color}"/><text x="{}" y="{}">{}</text>"#,
            lx + 10.0,
            ly + 4.0,
            escape(&series.name)
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn format_tick(value: f64) -> String {
    if value.abs() >= 10.0 || value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders charts from the latest record file.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    store: RecordStore,
    img_dir: PathBuf,
}

impl ReportRenderer {
    /// Read records from `record_dir` and write charts to `img_dir`.
    pub fn new(record_dir: impl Into<PathBuf>, img_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: RecordStore::new(record_dir),
            img_dir: img_dir.into(),
        }
    }

    /// Directory charts are written to.
    pub fn img_dir(&self) -> &Path {
        &self.img_dir
    }

    /// Render the latest records and return the chart path.
    ///
    /// # Errors
    ///
    /// [`BenchError::NoReportFound`] without a record file, plus the
    /// selection errors of [`prepare`].
    pub fn render_latest(&self, spec: &ChartSpec) -> Result<PathBuf> {
        let records = self.store.load_latest()?;
        let data = prepare(&records, spec)?;
        let svg = render_svg(&data, spec);

        fs::create_dir_all(&self.img_dir)?;
        let path = self
            .img_dir
            .join(format!("{}_{}.svg", spec.y_key, timestamp::generation_stamp()));
        fs::write(&path, svg)?;

        info!(path = %path.display(), series = data.series.len(), "rendered chart");
        Ok(path)
    }
}
