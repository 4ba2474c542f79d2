use std::f32::consts::PI;

use approx::assert_relative_eq;
use lenslet::{
    BackgroundMode, BinIndexMap, Builder, ConvolutionReadout, Fft2d, FromBuilder,
    NoiseDataSheet, Photometry, Rayleigh, ShackHartmann, ShackHartmannBuilder,
    SubapertureGeometry, SynthesisMode, Transform2D, Wavefront,
};
use rustfft::num_complex::Complex32;

const NS: usize = 16;

/// 2x2 lenslets of 8x8 pupil pixels, 16x16 FFTs binned in 4x4 pixels
fn quad_cell() -> ShackHartmannBuilder {
    ShackHartmann::builder()
        .fft_pow2(4)
        .phase_size(16, 16)
        .frame_size(8, 8)
        .bin_map(BinIndexMap::centered(NS, 4, 2).unwrap())
        .geometry(SubapertureGeometry::lenslet_array(2, 8, 4))
}

fn tilt(x: f32, y: f32) -> Vec<f32> {
    (0..NS * NS)
        .map(|k| 2. * PI * (x * (k % NS) as f32 + y * (k / NS) as f32) / NS as f32)
        .collect()
}

fn assert_frames_eq(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).for_each(|(a, b)| {
        assert_relative_eq!(a, b, epsilon = 1e-3, max_relative = 1e-4);
    });
}

/// 1 lenslet of 4x4 pupil pixels, 8x8 FFT and one detector pixel per FFT pixel
fn single_lenslet() -> ShackHartmannBuilder {
    ShackHartmann::builder()
        .fft_pow2(3)
        .phase_size(4, 4)
        .frame_size(8, 8)
        .bin_map(BinIndexMap::identity(8))
        .geometry(SubapertureGeometry::lenslet_array(1, 4, 8))
        .photometry(Photometry::uniform(1, 50., 0.))
}

/// Far field intensity of the 4x4 unit pupil zero padded to 8x8
fn intensity(phase: &[f32]) -> Vec<f32> {
    let fft = Fft2d::new(3);
    let mut field = vec![Complex32::default(); 64];
    for j in 0..4 {
        for i in 0..4 {
            field[i + j * 8] = Complex32::from_polar(1., phase[i + j * 4]);
        }
    }
    fft.forward(&mut field);
    field.iter().map(|z| z.norm_sqr()).collect()
}

fn scaled(image: &[f32], flux: f32) -> Vec<f32> {
    let total: f32 = image.iter().sum();
    image.iter().map(|x| x * flux / total).collect()
}

#[test]
fn identity_binning() -> anyhow::Result<()> {
    let mut wfs = single_lenslet().build()?;
    let pupil = vec![1f32; 16];
    let phase: Vec<f32> = (0..16).map(|k| (0.3 * k as f32).sin()).collect();
    let offset = vec![0f32; 16];
    wfs.process(&Wavefront::new(4, 4, &pupil, &phase, &offset, 1.)?)?;
    assert_frames_eq(wfs.frame().as_slice(), &scaled(&intensity(&phase), 50.));
    Ok(())
}

#[test]
fn squared_modulus_convolution() -> anyhow::Result<()> {
    let mut delta = vec![0f32; 64];
    delta[0] = 1.;
    let mut wfs = single_lenslet()
        .mode(SynthesisMode::default().convolution(ConvolutionReadout::SquaredModulus))
        .kernels(delta)
        .build()?;
    let pupil = vec![1f32; 16];
    let phase: Vec<f32> = (0..16).map(|k| (0.3 * k as f32).sin()).collect();
    let offset = vec![0f32; 16];
    let wavefront = Wavefront::new(4, 4, &pupil, &phase, &offset, 1.)?;
    // the unnormalized transforms give N.I, read out as N^2.I^2
    let squared: Vec<f32> = intensity(&phase).iter().map(|x| x * x).collect();
    wfs.process(&wavefront)?;
    assert_frames_eq(wfs.frame().as_slice(), &scaled(&squared, 50.));

    // a delta one pixel to the right shifts the image by one column
    let mut shift = vec![0f32; 64];
    shift[1] = 1.;
    wfs.set_kernel(Some(&shift))?;
    wfs.process(&wavefront)?;
    let shifted: Vec<f32> = (0..64)
        .map(|k| squared[(k % 8 + 7) % 8 + (k / 8) * 8])
        .collect();
    assert_frames_eq(wfs.frame().as_slice(), &scaled(&shifted, 50.));
    Ok(())
}

#[test]
fn centered_spots() -> anyhow::Result<()> {
    let mut wfs = quad_cell()
        .photometry(Photometry::uniform(4, 100., 0.))
        .build()?;
    let pupil = vec![1f32; NS * NS];
    let phase = vec![0f32; NS * NS];
    // half a pixel tilt centers the spots on the detector pixel corners
    let offset = tilt(-0.5, -0.5);
    wfs.process(&Wavefront::new(NS, NS, &pupil, &phase, &offset, 1.)?)?;
    assert!(wfs.slopes().iter().all(|s| s.abs() < 1e-4));

    let tilted = tilt(1., 0.);
    wfs.process(&Wavefront::new(NS, NS, &pupil, &tilted, &offset, 1.)?)?;
    assert!(wfs.slopes().x().iter().all(|s| *s > 0.1));
    assert!(wfs.slopes().y().iter().all(|s| s.abs() < 1e-4));
    Ok(())
}

#[test]
fn zero_flux_backgrounds() -> anyhow::Result<()> {
    let n = NS * NS;
    let background: Vec<f32> = (0..4 * n).map(|k| (k % 7) as f32 + 1.).collect();
    let flux = vec![5f32, 10., 0., 20.];
    let mut wfs = quad_cell()
        .mode(SynthesisMode::default().rayleigh())
        .photometry(Photometry {
            flux: vec![0f32; 4],
            sky_flux: vec![32f32; 4],
        })
        .detector(NoiseDataSheet::new(0.25))
        .rayleigh(Rayleigh {
            background: background.clone(),
            flux: flux.clone(),
        })
        .build()?;
    let pupil = vec![1f32; n];
    let phase = vec![0f32; n];
    wfs.process(&Wavefront::new(NS, NS, &pupil, &phase, &phase, 1.)?)?;

    let bin_map = BinIndexMap::centered(NS, 4, 2)?;
    for (l, s) in wfs.geometry().iter().enumerate() {
        let mut rayleigh = vec![0f32; 16];
        bin_map.bin(&background[l * n..(l + 1) * n], &mut rayleigh);
        let total: f32 = rayleigh.iter().sum();
        let expected: Vec<_> = rayleigh
            .iter()
            .map(|r| r * flux[l] / total + 2. + 0.25)
            .collect();
        assert_frames_eq(&wfs.frame().block(s.im_i_start, s.im_j_start, 4), &expected);
    }
    Ok(())
}

#[test]
fn masked_signal() -> anyhow::Result<()> {
    let mut wfs = quad_cell()
        .mode(SynthesisMode::default().amplitude_mask())
        .amplitude_mask(vec![0f32; NS * NS])
        .photometry(Photometry::uniform(4, 100., 16.))
        .build()?;
    let pupil = vec![1f32; NS * NS];
    let phase = vec![0f32; NS * NS];
    wfs.process(&Wavefront::new(NS, NS, &pupil, &phase, &phase, 1.)?)?;
    assert!(wfs.frame().as_slice().iter().all(|x| *x == 1.));
    assert!(wfs.slopes().iter().all(|s| *s == 0.));
    Ok(())
}

#[test]
fn integration_equivalence() -> anyhow::Result<()> {
    let k = 4;
    let pupil = vec![1f32; NS * NS];
    let phase: Vec<f32> = (0..NS * NS).map(|k| (0.05 * k as f32).cos()).collect();
    let offset = tilt(-0.5, -0.5);
    let wavefront = Wavefront::new(NS, NS, &pupil, &phase, &offset, 1.)?;

    let mut single = quad_cell()
        .photometry(Photometry::uniform(4, 400., 32.))
        .detector(NoiseDataSheet::new(1.))
        .build()?;
    single.process(&wavefront)?;

    let mut integrated = quad_cell()
        .photometry(Photometry::uniform(4, 400. / k as f32, 32. / k as f32))
        .detector(NoiseDataSheet::new(1. / k as f32))
        .n_iter(k)
        .build()?;
    for _ in 0..k {
        integrated.process(&wavefront)?;
    }

    assert_frames_eq(integrated.frame().as_slice(), single.frame().as_slice());
    assert_frames_eq(integrated.slopes(), single.slopes());
    Ok(())
}

#[test]
fn explicit_cycles() -> anyhow::Result<()> {
    let mut wfs = quad_cell().n_iter(3).build()?;
    let pupil = vec![1f32; NS * NS];
    let phase = vec![0f32; NS * NS];
    let wavefront = Wavefront::new(NS, NS, &pupil, &phase, &phase, 1.)?;
    assert!(wfs.process_cycle(&wavefront, 4).is_err());
    wfs.process_cycle(&wavefront, 1)?;
    wfs.process_cycle(&wavefront, 1)?;
    assert_relative_eq!(wfs.frame().sum(), 4., max_relative = 1e-5);
    assert_eq!(
        wfs.process_cycle(&wavefront, 3)?,
        lenslet::IntegrationState::Finalized
    );
    assert_relative_eq!(wfs.frame().sum(), 8., max_relative = 1e-5);
    Ok(())
}

#[test]
fn delta_kernels() -> anyhow::Result<()> {
    let n = NS * NS;
    let mut kernels = vec![0f32; 4 * n];
    (0..4).for_each(|l| kernels[l * n] = 1.);
    let pupil = vec![1f32; n];
    let phase: Vec<f32> = (0..n).map(|k| (0.11 * k as f32).sin()).collect();
    let wavefront = Wavefront::new(NS, NS, &pupil, &phase, &phase, 1.)?;

    let mut reference = quad_cell()
        .photometry(Photometry::uniform(4, 100., 0.))
        .build()?;
    reference.process(&wavefront)?;

    let mut convolved = quad_cell()
        .photometry(Photometry::uniform(4, 100., 0.))
        .mode(SynthesisMode::default().convolution(ConvolutionReadout::Modulus))
        .kernels(kernels.clone())
        .build()?;
    convolved.process(&wavefront)?;
    assert_frames_eq(convolved.frame().as_slice(), reference.frame().as_slice());

    convolved.set_kernel(Some(&kernels[..n]))?;
    convolved.process(&wavefront)?;
    assert_frames_eq(convolved.frame().as_slice(), reference.frame().as_slice());
    assert!(convolved.set_kernel(Some(&kernels[..n - 1])).is_err());
    Ok(())
}

#[test]
fn background_subtraction() -> anyhow::Result<()> {
    let pupil = vec![1f32; NS * NS];
    let phase = vec![0f32; NS * NS];
    let offset = tilt(-0.5, -0.5);
    let wavefront = Wavefront::new(NS, NS, &pupil, &phase, &offset, 1.)?;

    let mut reference = quad_cell()
        .photometry(Photometry::uniform(4, 100., 0.))
        .n_iter(3)
        .build()?;
    let mut wfs = quad_cell()
        .photometry(Photometry::uniform(4, 100., 64.))
        .detector(NoiseDataSheet::new(0.5))
        .n_iter(3)
        .build()?;

    let background = wfs.calibrate_background(&wavefront)?;
    assert!(background.iter().all(|b| (b - 13.5).abs() < 1e-4));
    assert_eq!(wfs.mode().background, BackgroundMode::Ignore);
    assert_eq!(wfs.counter(), 0);

    let mode = wfs.mode().background(BackgroundMode::Subtract);
    wfs.set_mode(mode)?;
    for _ in 0..3 {
        wfs.process(&wavefront)?;
        reference.process(&wavefront)?;
    }
    assert_frames_eq(wfs.frame().as_slice(), reference.frame().as_slice());
    Ok(())
}

#[test]
fn seeded_noise() -> anyhow::Result<()> {
    let pupil = vec![1f32; NS * NS];
    let phase = vec![0f32; NS * NS];
    let wavefront = Wavefront::new(NS, NS, &pupil, &phase, &phase, 1.)?;
    let noisy = |seed: u64| -> anyhow::Result<Vec<f32>> {
        let mut wfs = quad_cell()
            .mode(SynthesisMode::default().noise())
            .photometry(Photometry::uniform(4, 1e4, 0.))
            .detector(NoiseDataSheet::default().read_out(1.))
            .seed(seed)
            .build()?;
        wfs.process(&wavefront)?;
        Ok(wfs.frame().as_slice().to_vec())
    };
    let frame = noisy(7)?;
    assert_eq!(frame, noisy(7)?);
    assert_ne!(frame, noisy(8)?);
    let total: f32 = frame.iter().sum();
    assert!((total - 4e4).abs() < 1e3);
    Ok(())
}
