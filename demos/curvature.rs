use lenslet::{Builder, Curvature, CurvatureDetector, Defocus, FromBuilder, Wavefront};

const NS: usize = 64;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // 4 quadrants of a disk
    let radius = |k: usize| ((k % NS) as f32 - 32.).hypot((k / NS) as f32 - 32.);
    let pupil: Vec<f32> = (0..NS * NS)
        .map(|k| if radius(k) < 24. { 1. } else { 0. })
        .collect();
    let subapertures: Vec<Vec<usize>> = (0..4)
        .map(|q| {
            (0..NS * NS)
                .filter(|&k| {
                    let (left, bottom) = (k % NS < NS / 2, k / NS < NS / 2);
                    radius(k) < 30. && q == left as usize + 2 * bottom as usize
                })
                .collect()
        })
        .collect();

    let mut cwfs = Curvature::builder()
        .fft_pow2(6)
        .defocus(Defocus::paraxial(NS, 5e-3))
        .subapertures(subapertures)
        .detector(CurvatureDetector::new(1e5).sky(1e2).read_out(1.))
        .build()?;

    let offset = vec![0f32; NS * NS];
    for amplitude in [0f32, 0.5, 1.] {
        // focus aberration
        let phase: Vec<f32> = (0..NS * NS)
            .map(|k| amplitude * (radius(k) / 24.).powi(2))
            .collect();
        let signal = cwfs.measure(&Wavefront::new(NS, NS, &pupil, &phase, &offset, 1.)?)?;
        println!("focus {:.1} rd: {:?}", amplitude, signal);
    }
    let (image1, image2) = cwfs.images();
    serde_pickle::to_writer(
        &mut std::fs::File::create("curvature_images.pkl")?,
        &(image1, image2),
        Default::default(),
    )?;
    Ok(())
}
