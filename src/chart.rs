// src/chart.rs
use crate::models::PricePoint;
use std::fmt::Write;

const PADDING: f64 = 8.0;

/// Renders closing prices as an inline SVG line chart.
pub fn render_svg(points: &[PricePoint], width: u32, height: u32) -> String {
    let (w, h) = (f64::from(width), f64::from(height));
    let mut svg = format!(
        r#"<svg class="price-chart" viewBox="0 0 {w} {h}" width="{w}" height="{h}" role="img">"#,
        w = width,
        h = height
    );

    if points.is_empty() {
        let _ = write!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">No price data</text></svg>"#,
            w / 2.0,
            h / 2.0
        );
        return svg;
    }

    let (min, max) = points.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
        (lo.min(p.close), hi.max(p.close))
    });
    let plot_w = w - 2.0 * PADDING;
    let plot_h = h - 2.0 * PADDING;
    let step = if points.len() > 1 {
        plot_w / (points.len() - 1) as f64
    } else {
        0.0
    };

    let coords: Vec<String> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let x = PADDING + step * i as f64;
            let y = if max > min {
                PADDING + (max - p.close) / (max - min) * plot_h
            } else {
                h / 2.0
            };
            format!("{:.1},{:.1}", x, y)
        })
        .collect();

    // A single point still gets a visible segment.
    let coords = if coords.len() == 1 {
        vec![format!("{:.1},{:.1}", PADDING, h / 2.0), format!("{:.1},{:.1}", w - PADDING, h / 2.0)]
    } else {
        coords
    };

    let first = points[0].close;
    let last = points[points.len() - 1].close;
    let trend = if last >= first { "up" } else { "down" };

    let _ = write!(
        svg,
        r#"<polyline class="trend-{}" fill="none" stroke-width="2" points="{}"/>"#,
        trend,
        coords.join(" ")
    );
    let _ = write!(
        svg,
        r#"<title>{} to {}: {:.2} to {:.2}</title></svg>"#,
        points[0].timestamp.format("%Y-%m-%d"),
        points[points.len() - 1].timestamp.format("%Y-%m-%d"),
        first,
        last
    );
    svg
}
