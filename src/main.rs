use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use skyforest_rasterio::{
    copy_whole_raster, term_progress, ByteOrder, Config, CopyOptions, DataType, Dataset,
    ExtraArg, ProgressFn, RasterBand, RawBlockStore, RawLayout, ResampleAlg, Result, Window,
};

const WIDTH: usize = 1024;
const HEIGHT: usize = 768;

fn terrain(x: usize, y: usize) -> f32 {
    let (fx, fy) = (x as f32 / WIDTH as f32, y as f32 / HEIGHT as f32);
    1200.0 + 300.0 * (fx * 6.0).sin() * (fy * 4.0).cos() + 80.0 * fx
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(?config, "skyforest-rasterio demo");

    let elevation = RasterBand::builder(WIDTH, HEIGHT, DataType::F32)
        .block_size(256, 256)
        .nodata(-9999.0)
        .config(config.clone())
        .build();
    let data: Vec<f32> = (0..WIDTH * HEIGHT)
        .map(|i| terrain(i % WIDTH, i / WIDTH))
        .collect();
    elevation.write_slice(Window::new(0, 0, WIDTH, HEIGHT), &data, WIDTH, HEIGHT)?;

    let full = Window::new(0, 0, WIDTH, HEIGHT);
    let decimated: Vec<i16> = elevation.read_vec(full, WIDTH / 8, HEIGHT / 8, None)?;
    info!(first = decimated[0], count = decimated.len(), "nearest 1/8 read as Int16");

    for alg in [ResampleAlg::Bilinear, ResampleAlg::Cubic, ResampleAlg::Average, ResampleAlg::Mode] {
        let extra = ExtraArg::new().with_resample_alg(alg);
        let out: Vec<f32> = elevation.read_vec(full, WIDTH / 16, HEIGHT / 16, Some(&extra))?;
        let mean = out.iter().map(|&v| v as f64).sum::<f64>() / out.len() as f64;
        info!(alg = alg.name(), mean, "resampled 1/16 read");
    }

    let source = Dataset::builder(WIDTH, HEIGHT).band(elevation).build()?;

    let path = std::env::temp_dir().join("skyforest-rasterio-demo.raw");
    let layout = RawLayout::for_raster(WIDTH, HEIGHT, WIDTH, 16, DataType::U16, ByteOrder::LittleEndian)?;
    let store = Arc::new(RawBlockStore::create(&path, layout)?);
    let target = Dataset::builder(WIDTH, HEIGHT)
        .band(
            RasterBand::builder(WIDTH, HEIGHT, DataType::U16)
                .block_size(WIDTH, 16)
                .store(store.clone())
                .config(config.clone())
                .build(),
        )
        .build()?;

    let progress = term_progress();
    let progress_ref: ProgressFn = &progress;
    copy_whole_raster(&source, &target, &CopyOptions::default(), &config, Some(progress_ref))?;
    target.flush()?;
    store.flush()?;
    info!(path = %path.display(), bytes = layout.file_len(), "copied to raw UInt16 file");

    Ok(())
}
