use std::fs::File;

use indicatif::{ProgressBar, ProgressStyle};
use lenslet::{
    BinIndexMap, Builder, FromBuilder, NoiseDataSheet, Photometry, Plane, ShackHartmann,
    SubapertureGeometry, SynthesisMode, Wavefront,
};

const N_SIDE: usize = 8;
const N_PX: usize = 8;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let n = N_SIDE * N_PX;
    let pupil: Vec<f32> = (0..n * n)
        .map(|k| {
            let (x, y) = ((k % n) as f32 - 31.5, (k / n) as f32 - 31.5);
            let r = x.hypot(y);
            if r < 32. && r > 8. {
                1.
            } else {
                0.
            }
        })
        .collect();
    let geometry = SubapertureGeometry::lenslet_array(N_SIDE, N_PX, 4)
        .valid_lenslets(&Plane::new(&pupil, n, n)?, 0.5)?;
    let n_sub = geometry.len();

    let n_iter = 10;
    let mut wfs = ShackHartmann::builder()
        .fft_pow2(4)
        .phase_size(n, n)
        .frame_size(N_SIDE * 4, N_SIDE * 4)
        .bin_map(BinIndexMap::centered(16, 4, 2)?)
        .geometry(geometry)
        .mode(SynthesisMode::default().noise())
        .photometry(Photometry::uniform(n_sub, 100., 5.))
        .detector(NoiseDataSheet::new(0.1).read_out(1.))
        .n_iter(n_iter)
        .build()?;
    println!("{:?}", wfs);

    let offset = vec![0f32; n * n];
    let pb = ProgressBar::new(n_iter as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7}")?
            .progress_chars("##-"),
    );
    for k in 0..n_iter {
        pb.inc(1);
        let t = k as f32 / n_iter as f32;
        let phase: Vec<f32> = (0..n * n)
            .map(|i| 0.05 * ((i % n) as f32 * (1. + t) + (i / n) as f32 * (1. - t)))
            .collect();
        wfs.process(&Wavefront::new(n, n, &pupil, &phase, &offset, 1.)?)?;
    }
    pb.finish();

    let slopes = wfs.slopes();
    println!(
        "mean slopes: ({:.3}, {:.3}) pixel",
        slopes.x().iter().sum::<f32>() / n_sub as f32,
        slopes.y().iter().sum::<f32>() / n_sub as f32
    );
    let mut file = File::create("sh_frame.pkl")?;
    serde_pickle::to_writer(&mut file, wfs.frame(), Default::default())?;
    Ok(())
}
