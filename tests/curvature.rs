use lenslet::{Builder, Curvature, CurvatureDetector, Defocus, FromBuilder, Wavefront};

const NS: usize = 16;

/// Columns 1 to 7 and 9 to 15, mirror images of each other about the transform origin
fn halves() -> Vec<Vec<usize>> {
    let columns = |range: std::ops::Range<usize>| {
        (0..NS * NS)
            .filter(|k| range.contains(&(k % NS)))
            .collect::<Vec<_>>()
    };
    vec![columns(1..8), columns(9..16)]
}

fn disk() -> Vec<f32> {
    (0..NS * NS)
        .map(|k| {
            let (x, y) = ((k % NS) as f32 - 8., (k / NS) as f32 - 8.);
            if x.hypot(y) < 6. {
                1.
            } else {
                0.
            }
        })
        .collect()
}

#[test]
fn flat_wavefront() -> anyhow::Result<()> {
    let mut cwfs = Curvature::builder()
        .fft_pow2(4)
        .defocus(Defocus::paraxial(NS, 0.02))
        .subapertures(halves())
        .build()?;
    let pupil = disk();
    let phase = vec![0f32; NS * NS];
    let signal = cwfs.measure(&Wavefront::new(NS, NS, &pupil, &phase, &phase, 1.)?)?;
    assert!(signal.iter().all(|s| s.abs() < 1e-4));
    let (image1, image2) = cwfs.images();
    let (e1, e2): (f32, f32) = (image1.iter().sum(), image2.iter().sum());
    approx::assert_relative_eq!(e1, e2, max_relative = 1e-5);
    Ok(())
}

#[test]
fn tilt_signal() -> anyhow::Result<()> {
    let mut cwfs = Curvature::builder()
        .fft_pow2(4)
        .defocus(Defocus::paraxial(NS, 0.05))
        .subapertures(halves())
        .build()?;
    let pupil = disk();
    let phase: Vec<f32> = (0..NS * NS).map(|k| 0.5 * (k % NS) as f32).collect();
    let offset = vec![0f32; NS * NS];
    let signal = cwfs
        .measure(&Wavefront::new(NS, NS, &pupil, &phase, &offset, 0.4)?)?
        .to_vec();
    // the two defocused images move in opposite directions
    assert!(signal[0].abs() > 1e-3);
    approx::assert_relative_eq!(signal[0], -signal[1], max_relative = 1e-3);
    Ok(())
}

#[test]
fn zero_denominator() -> anyhow::Result<()> {
    let mut cwfs = Curvature::builder()
        .fft_pow2(4)
        .subapertures(vec![vec![], (0..NS * NS).collect()])
        .detector(CurvatureDetector::new(1e4))
        .seed(1)
        .build()?;
    let pupil = disk();
    let phase = vec![0f32; NS * NS];
    let signal = cwfs.measure(&Wavefront::new(NS, NS, &pupil, &phase, &phase, 1.)?)?;
    assert_eq!(signal[0], 0.);
    Ok(())
}

#[test]
fn photon_noise() -> anyhow::Result<()> {
    let mut cwfs = Curvature::builder()
        .fft_pow2(4)
        .subapertures(halves())
        .detector(CurvatureDetector::new(1e6).sky(1e2).read_out(2.))
        .seed(42)
        .build()?;
    let pupil = disk();
    let phase = vec![0f32; NS * NS];
    let wavefront = Wavefront::new(NS, NS, &pupil, &phase, &phase, 1.)?;
    let first = cwfs.measure(&wavefront)?.to_vec();
    let second = cwfs.measure(&wavefront)?.to_vec();
    assert_ne!(first, second);
    assert!(first.iter().chain(&second).all(|s| s.abs() < 0.01));
    Ok(())
}
