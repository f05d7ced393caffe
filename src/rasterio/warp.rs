//! Pixel-space warping for complex bands

use crate::band::RasterBand;
use crate::error::Result;
use crate::progress::{self, ProgressFn};
use crate::rasterio::kernels::{self, SampleGeometry, SourceChunk};
use crate::rasterio::resample::{is_nodata, nodata_in_band_type};
use crate::rasterio::{BufferLayout, IoBuffer, MemRasterView, Window};
use crate::types::{DataType, ResampleAlg};

/// Affine mapping between destination buffer pixels and source raster pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterIoTransformer {
    pub x_off: f64,
    pub y_off: f64,
    pub x_ratio: f64,
    pub y_ratio: f64,
}

impl RasterIoTransformer {
    pub fn new(x_off: f64, y_off: f64, x_ratio: f64, y_ratio: f64) -> Self {
        Self {
            x_off,
            y_off,
            x_ratio,
            y_ratio,
        }
    }

    /// Destination coordinates to source coordinates
    pub fn dst_to_src(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.x_ratio + self.x_off, y * self.y_ratio + self.y_off)
    }

    /// Source coordinates to destination coordinates
    pub fn src_to_dst(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.x_off) / self.x_ratio, (y - self.y_off) / self.y_ratio)
    }

    fn geometry(&self) -> SampleGeometry {
        SampleGeometry {
            x_ratio: self.x_ratio,
            y_ratio: self.y_ratio,
            x_origin: self.x_off,
            y_origin: self.y_off,
        }
    }
}

/// Fills a destination window from a source band
pub trait Warper: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn warp(
        &self,
        src: &RasterBand,
        transformer: &RasterIoTransformer,
        alg: ResampleAlg,
        nodata: Option<f64>,
        dst_window: &Window,
        view: &mut MemRasterView<'_>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<()>;
}

/// Default warper: resamples the real and imaginary parts independently
/// with the pixel-space kernels.
///
/// The padded source footprint of `dst_window` is read at once, so callers
/// bound memory through the window size.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelWarper;

impl Warper for PixelWarper {
    fn warp(
        &self,
        src: &RasterBand,
        transformer: &RasterIoTransformer,
        alg: ResampleAlg,
        nodata: Option<f64>,
        dst_window: &Window,
        view: &mut MemRasterView<'_>,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<()> {
        let pad_x = alg.kernel_radius() as f64 * transformer.x_ratio.max(1.0) + 1.0;
        let pad_y = alg.kernel_radius() as f64 * transformer.y_ratio.max(1.0) + 1.0;
        let (left, top) = transformer.dst_to_src(dst_window.x_off as f64, dst_window.y_off as f64);
        let (right, bottom) = transformer.dst_to_src(
            (dst_window.x_off + dst_window.x_size) as f64,
            (dst_window.y_off + dst_window.y_size) as f64,
        );
        let x0 = ((left - pad_x).floor().max(0.0) as usize).min(src.x_size() - 1);
        let y0 = ((top - pad_y).floor().max(0.0) as usize).min(src.y_size() - 1);
        let x1 = ((right + pad_x).ceil().max(0.0) as usize).clamp(x0 + 1, src.x_size());
        let y1 = ((bottom + pad_y).ceil().max(0.0) as usize).clamp(y0 + 1, src.y_size());
        let source = Window::new(x0, y0, x1 - x0, y1 - y0);

        let mut pairs = vec![[0f64; 2]; source.x_size * source.y_size];
        src.raster_io(
            source,
            IoBuffer::Read(bytemuck::cast_slice_mut(&mut pairs)),
            &BufferLayout::packed(source.x_size, source.y_size, DataType::CF64),
            None,
        )?;

        let real: Vec<f64> = pairs.iter().map(|p| p[0]).collect();
        let imag: Vec<f64> = pairs.iter().map(|p| p[1]).collect();
        let mask: Option<Vec<u8>> = nodata.map(|nd| {
            let nd = nodata_in_band_type(nd, src.data_type());
            real.iter()
                .map(|&v| if is_nodata(v, nd) { 0 } else { 255 })
                .collect()
        });

        let geometry = transformer.geometry();
        let dst_x = dst_window.x_off..dst_window.x_off + dst_window.x_size;
        let dst_y = dst_window.y_off..dst_window.y_off + dst_window.y_size;
        let resample_part = |values: &[f64], fill: f64| -> Vec<f64> {
            let chunk = SourceChunk {
                values,
                mask: mask.as_deref(),
                x_off: source.x_off,
                y_off: source.y_off,
                width: source.x_size,
                height: source.y_size,
            };
            kernels::resample(alg, &chunk, &geometry, dst_x.clone(), dst_y.clone(), fill)
        };
        let re = resample_part(&real, nodata.unwrap_or(0.0));
        let im = resample_part(&imag, 0.0);

        let round = !src.data_type().is_floating();
        let mut row = Vec::with_capacity(dst_window.x_size);
        for r in 0..dst_window.y_size {
            row.clear();
            for c in 0..dst_window.x_size {
                let i = r * dst_window.x_size + c;
                let (a, b) = (re[i], im[i]);
                row.push(if round { [a.round(), b.round()] } else { [a, b] });
            }
            view.write_complex_row(dst_window.x_off, dst_window.y_off + r, &row);
        }

        progress::check(progress, 1.0, "User terminated RasterIO()")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::rasterio::ExtraArg;

    #[test]
    fn test_transformer_round_trip() {
        let t = RasterIoTransformer::new(10.0, 4.0, 2.0, 0.5);
        assert_eq!(t.dst_to_src(3.0, 8.0), (16.0, 8.0));
        assert_eq!(t.src_to_dst(16.0, 8.0), (3.0, 8.0));
    }

    #[test]
    fn test_complex_average_goes_through_warper() {
        let band = RasterBand::builder(4, 2, DataType::CF32).block_size(4, 2).build();
        let data: Vec<[f32; 2]> = (0..8).map(|i| [i as f32, -(i as f32)]).collect();
        band.write_slice(Window::new(0, 0, 4, 2), &data, 4, 2).unwrap();

        let extra = ExtraArg::new().with_resample_alg(ResampleAlg::Average);
        let out: Vec<[f32; 2]> = band
            .read_vec(Window::new(0, 0, 4, 2), 2, 1, Some(&extra))
            .unwrap();
        // mean of 0,1,4,5 and 2,3,6,7
        assert_relative_eq!(out[0][0], 2.5);
        assert_relative_eq!(out[0][1], -2.5);
        assert_relative_eq!(out[1][0], 4.5);
        assert_relative_eq!(out[1][1], -4.5);
    }

    #[test]
    fn test_gauss_on_complex_falls_back_to_nearest() {
        let band = RasterBand::builder(4, 4, DataType::CI16).block_size(2, 2).build();
        let data: Vec<[i16; 2]> = (0..16).map(|i| [i as i16, 1]).collect();
        band.write_slice(Window::new(0, 0, 4, 4), &data, 4, 4).unwrap();

        let extra = ExtraArg::new().with_resample_alg(ResampleAlg::Gauss);
        let out: Vec<[i16; 2]> = band
            .read_vec(Window::new(0, 0, 4, 4), 2, 2, Some(&extra))
            .unwrap();
        assert_eq!(out, vec![[5, 1], [7, 1], [13, 1], [15, 1]]);
    }

    #[test]
    fn test_nodata_is_cast_to_band_type() {
        // 2.5 is stored as 2 in an Int16 component
        let band = RasterBand::builder(2, 1, DataType::CI16)
            .block_size(2, 1)
            .nodata(2.5)
            .build();
        band.write_slice(Window::new(0, 0, 2, 1), &[[2i16, 4], [6, 8]], 2, 1).unwrap();

        let extra = ExtraArg::new().with_resample_alg(ResampleAlg::Average);
        let out: Vec<[i16; 2]> = band
            .read_vec(Window::new(0, 0, 2, 1), 1, 1, Some(&extra))
            .unwrap();
        assert_eq!(out, vec![[6, 8]]);
    }

    struct ConstantWarper(f64);

    impl Warper for ConstantWarper {
        fn warp(
            &self,
            _src: &RasterBand,
            _transformer: &RasterIoTransformer,
            _alg: ResampleAlg,
            _nodata: Option<f64>,
            dst_window: &Window,
            view: &mut MemRasterView<'_>,
            _progress: Option<ProgressFn<'_>>,
        ) -> Result<()> {
            for y in dst_window.y_off..dst_window.y_off + dst_window.y_size {
                view.fill(dst_window.x_off, y, dst_window.x_size, self.0);
            }
            Ok(())
        }
    }

    #[test]
    fn test_custom_warper_is_used() {
        let band = RasterBand::builder(4, 4, DataType::CF64)
            .block_size(4, 4)
            .warper(std::sync::Arc::new(ConstantWarper(3.0)))
            .build();
        let extra = ExtraArg::new().with_resample_alg(ResampleAlg::Bilinear);
        let out: Vec<[f64; 2]> = band
            .read_vec(Window::new(0, 0, 4, 4), 3, 3, Some(&extra))
            .unwrap();
        assert_eq!(out, vec![[3.0, 0.0]; 9]);
    }
}
