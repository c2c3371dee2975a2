use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::{error::ReportError, types::RankedEntity};

#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
    /// Blank border around the plot area, in pixels.
    pub margin: u32,
    /// Gap between two bars, in pixels.
    pub gap: u32,
    pub background: [u8; 3],
    pub bar: [u8; 3],
    pub axis: [u8; 3],
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            margin: 20,
            gap: 8,
            background: [255, 255, 255],
            bar: [30, 215, 96],
            axis: [40, 40, 40],
        }
    }
}

/// Renders one vertical bar per entry, heights proportional to the
/// occurrence count, encoded as PNG.
///
/// Entries are drawn in the order given. An empty slice yields just the axes.
pub fn render_bar_chart(
    entries: &[RankedEntity],
    options: &ChartOptions,
) -> Result<Vec<u8>, ReportError> {
    let width = options.width.max(options.margin * 2 + 1);
    let height = options.height.max(options.margin * 2 + 1);
    let mut img = RgbImage::from_pixel(width, height, Rgb(options.background));

    let left = options.margin;
    let right = width - options.margin;
    let top = options.margin;
    let bottom = height - options.margin;

    let max = entries.iter().map(|e| e.occurrences).max().unwrap_or(0);
    if max > 0 {
        let count = entries.len() as u32;
        let plot_width = right - left;
        let slot = (plot_width / count).max(1);
        let bar_width = slot.saturating_sub(options.gap).max(1);
        let plot_height = (bottom - top) as f64;

        for (index, entry) in entries.iter().enumerate() {
            let x0 = left + index as u32 * slot + (slot - bar_width) / 2;
            let bar_height = (plot_height * entry.occurrences as f64 / max as f64).round() as u32;
            let y0 = bottom - bar_height;
            fill_rect(&mut img, x0, y0, (x0 + bar_width).min(right), bottom, options.bar);
        }
    }

    // axes
    fill_rect(&mut img, left, top, left + 1, bottom, options.axis);
    fill_rect(&mut img, left, bottom - 1, right, bottom, options.axis);

    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

/// Fills `[x0, x1) x [y0, y1)`, clipped to the image.
fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: [u8; 3]) {
    let x1 = x1.min(img.width());
    let y1 = y1.min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, Rgb(color));
        }
    }
}
