//! Best-overview selection for decimated reads

use tracing::debug;
use crate::band::RasterBand;
use crate::rasterio::{ExtraArg, Window};

/// Overviews up to this much coarser than the request still qualify
const RESOLUTION_SLACK: f64 = 1.2;

/// Picks the most reduced overview that is not much coarser than the
/// request and rescales `window` onto it.
///
/// Returns the overview index and the window in overview pixels, or `None`
/// when no overview helps. A floating window in `extra` is rescaled too.
pub fn best_overview_level(
    band: &RasterBand,
    window: &Window,
    buf_x: usize,
    buf_y: usize,
    extra: &mut ExtraArg<'_>,
) -> Option<(usize, Window)> {
    let x_ratio = window.x_size as f64 / buf_x as f64;
    let y_ratio = window.y_size as f64 / buf_y as f64;
    let desired = if x_ratio < y_ratio || buf_y == 1 {
        x_ratio
    } else {
        y_ratio
    };

    let mut best: Option<(usize, &RasterBand)> = None;
    let mut best_resolution = 0.0;

    for (level, overview) in band.overviews.iter().enumerate() {
        let resolution = overview_resolution(band, overview);
        if resolution >= desired * RESOLUTION_SLACK || resolution <= best_resolution {
            continue;
        }
        let bit2 = overview
            .metadata_item("RESAMPLING")
            .and_then(|r| r.get(..12))
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("AVERAGE_BIT2"));
        if bit2 {
            continue;
        }
        best = Some((level, overview));
        best_resolution = resolution;
    }

    let (level, overview) = best?;
    let (ov_x, ov_y) = (overview.x_size(), overview.y_size());
    let x_res = band.x_size() as f64 / ov_x as f64;
    let y_res = band.y_size() as f64 / ov_y as f64;

    let x_off = (ov_x - 1).min((window.x_off as f64 / x_res + 0.5) as usize);
    let y_off = (ov_y - 1).min((window.y_off as f64 / y_res + 0.5) as usize);
    let x_size = ((window.x_size as f64 / x_res + 0.5) as usize).max(1).min(ov_x - x_off);
    let y_size = ((window.y_size as f64 / y_res + 0.5) as usize).max(1).min(ov_y - y_off);

    if let Some(floating) = &mut extra.floating {
        floating.x_off /= x_res;
        floating.x_size /= x_res;
        floating.y_off /= y_res;
        floating.y_size /= y_res;
    }

    debug!(level, desired, resolution = best_resolution, "selected overview");
    Some((level, Window::new(x_off, y_off, x_size, y_size)))
}

/// Reduction factor of the less reduced axis
fn overview_resolution(band: &RasterBand, overview: &RasterBand) -> f64 {
    let x = band.x_size() as f64 / overview.x_size() as f64;
    let y = band.y_size() as f64 / overview.y_size() as f64;
    if x < y {
        x
    } else {
        y
    }
}
