use approx::assert_abs_diff_eq;
use ndarray::{Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sht_core::{
    AlmLayout, ChunkPolicy, Complex64, EngineOptions, GeometryInfo, ReductionOrder, ShtError, Spin,
    TransformEngine, Weighting, ZBounds,
};

/// Random coefficients of a real field; `l < spin` entries stay zero.
fn random_alm(rng: &mut StdRng, layout: &AlmLayout, spin: usize) -> Vec<Complex64> {
    layout
        .iter()
        .map(|(l, m, _)| {
            if l < spin {
                return Complex64::new(0.0, 0.0);
            }
            let re = rng.gen_range(-1.0..1.0);
            let im = if m == 0 { 0.0 } else { rng.gen_range(-1.0..1.0) };
            Complex64::new(re, im)
        })
        .collect()
}

fn random_map(rng: &mut StdRng, npix: usize) -> Vec<f64> {
    (0..npix).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn engine(threads: usize) -> TransformEngine {
    TransformEngine::new(EngineOptions::default()).with_threads(threads)
}

fn assert_alm_close(actual: &[Complex64], expected: &[Complex64], eps: f64) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert_abs_diff_eq!(a.re, e.re, epsilon = eps);
        assert_abs_diff_eq!(a.im, e.im, epsilon = eps);
    }
}

#[test]
fn gauss_legendre_scalar_round_trip_recovers_coefficients() {
    let mut rng = StdRng::seed_from_u64(7);
    for (lmax, mmax) in [(12usize, 12usize), (12, 7), (5, 0)] {
        let layout = AlmLayout::triangular(lmax, mmax).unwrap();
        let geometry = GeometryInfo::gauss_legendre(lmax + 1, 2 * mmax + 2).unwrap();
        let alm = random_alm(&mut rng, &layout, 0);
        let engine = engine(2);
        let map = engine.alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
        assert_eq!(map.len(), geometry.npix());
        let back = engine.map2alm(&geometry, &layout, &map, ZBounds::FULL).unwrap();
        assert_alm_close(&back, &alm, 1e-10);
    }
}

#[test]
fn gauss_legendre_spin_round_trip_recovers_coefficients() {
    let mut rng = StdRng::seed_from_u64(11);
    let lmax = 10;
    let layout = AlmLayout::full(lmax);
    let geometry = GeometryInfo::gauss_legendre(lmax + 1, 2 * lmax + 2).unwrap();
    for spin in [1usize, 2, 3] {
        let n = layout.coefficient_count();
        let mut rows = random_alm(&mut rng, &layout, spin);
        rows.extend(random_alm(&mut rng, &layout, spin));
        let alm = Array2::from_shape_vec((2, n), rows).unwrap();
        let engine = engine(3);
        let map = engine
            .alm2map_spin(&geometry, &layout, alm.view(), spin, ZBounds::FULL)
            .unwrap();
        assert_eq!(map.dim(), (2, geometry.npix()));
        let back = engine
            .map2alm_spin(&geometry, &layout, map.view(), spin, ZBounds::FULL)
            .unwrap();
        for (a, e) in back.iter().zip(alm.iter()) {
            assert_abs_diff_eq!(a.re, e.re, epsilon = 1e-10);
            assert_abs_diff_eq!(a.im, e.im, epsilon = 1e-10);
        }
    }
}

#[test]
fn synthesis_is_linear() {
    let mut rng = StdRng::seed_from_u64(3);
    let layout = AlmLayout::full(9);
    let geometry = GeometryInfo::healpix(4, 1).unwrap();
    let a = random_alm(&mut rng, &layout, 0);
    let b = random_alm(&mut rng, &layout, 0);
    let (alpha, beta) = (0.75, -2.5);
    let combined: Vec<Complex64> = a.iter().zip(&b).map(|(x, y)| x * alpha + y * beta).collect();

    let engine = engine(2);
    let map_a = engine.alm2map(&geometry, &layout, &a, ZBounds::FULL).unwrap();
    let map_b = engine.alm2map(&geometry, &layout, &b, ZBounds::FULL).unwrap();
    let map_ab = engine.alm2map(&geometry, &layout, &combined, ZBounds::FULL).unwrap();
    for ((x, y), z) in map_a.iter().zip(&map_b).zip(&map_ab) {
        assert_abs_diff_eq!(alpha * x + beta * y, *z, epsilon = 1e-11);
    }
}

#[test]
fn zero_map_gives_zero_coefficients() {
    let geometry = GeometryInfo::healpix(2, 1).unwrap();
    let layout = AlmLayout::full(6);
    let map = vec![0.0; geometry.npix()];
    let alm = engine(1).map2alm(&geometry, &layout, &map, ZBounds::FULL).unwrap();
    assert!(alm.iter().all(|c| c.re == 0.0 && c.im == 0.0));
}

#[test]
fn monopole_synthesizes_a_constant_map() {
    let geometry = GeometryInfo::healpix(4, 1).unwrap();
    let layout = AlmLayout::full(8);
    let mut alm = vec![Complex64::new(0.0, 0.0); layout.coefficient_count()];
    alm[0] = Complex64::new((4.0 * std::f64::consts::PI).sqrt(), 0.0);
    let map = engine(2).alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
    assert!(map.iter().all(|&v| (v - 1.0).abs() < 1e-13));

    let back = engine(2).map2alm(&geometry, &layout, &map, ZBounds::FULL).unwrap();
    assert_abs_diff_eq!(back[0].re, alm[0].re, epsilon = 1e-12);
}

#[test]
fn full_zbounds_match_unrestricted_transform() {
    let mut rng = StdRng::seed_from_u64(5);
    let geometry = GeometryInfo::healpix(4, 1).unwrap();
    let layout = AlmLayout::full(8);
    let alm = random_alm(&mut rng, &layout, 0);
    let engine = engine(2);
    let full = engine.alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
    let wide = engine
        .alm2map(&geometry, &layout, &alm, ZBounds::new(-1.5, 1.5))
        .unwrap();
    assert_eq!(full, wide);
}

#[test]
fn zbounds_restrict_synthesis_to_selected_rings() {
    let mut rng = StdRng::seed_from_u64(9);
    let geometry = GeometryInfo::gauss_legendre(9, 16).unwrap();
    let layout = AlmLayout::full(7);
    let alm = random_alm(&mut rng, &layout, 0);
    let bounds = ZBounds::new(0.2, 1.0);
    let engine = engine(2);
    let full = engine.alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
    let north = engine.alm2map(&geometry, &layout, &alm, bounds).unwrap();
    assert_eq!(north.len(), full.len());

    let mut kept = 0;
    for ring in geometry.rings() {
        for j in 0..ring.nph() {
            let p = ring.pixel(j);
            if bounds.contains(ring.cth()) {
                assert_abs_diff_eq!(north[p], full[p], epsilon = 1e-13);
            } else {
                assert_eq!(north[p], 0.0);
            }
        }
        kept += usize::from(bounds.contains(ring.cth()));
    }
    assert!(kept > 0 && kept < geometry.nrings());
}

#[test]
fn zbounds_analysis_ignores_excluded_rings() {
    let mut rng = StdRng::seed_from_u64(13);
    let geometry = GeometryInfo::gauss_legendre(10, 18).unwrap();
    let layout = AlmLayout::full(8);
    let map = random_map(&mut rng, geometry.npix());
    let bounds = ZBounds::new(-0.3, 0.6);

    let mut masked = map.clone();
    for ring in geometry.rings().iter().filter(|r| !bounds.contains(r.cth())) {
        for j in 0..ring.nph() {
            masked[ring.pixel(j)] = 0.0;
        }
    }
    let engine = engine(2);
    let restricted = engine.map2alm(&geometry, &layout, &map, bounds).unwrap();
    let reference = engine.map2alm(&geometry, &layout, &masked, ZBounds::FULL).unwrap();
    assert_alm_close(&restricted, &reference, 1e-12);
}

#[test]
fn zbounds_excluding_every_ring_is_an_empty_geometry() {
    let geometry = GeometryInfo::gauss_legendre(4, 8).unwrap();
    let layout = AlmLayout::full(3);
    let alm = vec![Complex64::new(0.0, 0.0); layout.coefficient_count()];
    let err = engine(1)
        .alm2map(&geometry, &layout, &alm, ZBounds::new(0.999_999, 1.0))
        .unwrap_err();
    assert!(matches!(err, ShtError::EmptyGeometry));
}

#[test]
fn short_coefficient_array_is_a_size_mismatch() {
    let geometry = GeometryInfo::healpix(2, 1).unwrap();
    let layout = AlmLayout::full(4);
    let alm = vec![Complex64::new(0.0, 0.0); layout.coefficient_count() - 1];
    let err = engine(1)
        .alm2map(&geometry, &layout, &alm, ZBounds::FULL)
        .unwrap_err();
    match err {
        ShtError::SizeMismatch {
            what,
            expected,
            actual,
        } => {
            assert_eq!(what, "alm");
            assert_eq!(expected, 15);
            assert_eq!(actual, 14);
        }
        other => panic!("unexpected error: {other}"),
    }

    let short_map = vec![0.0; geometry.npix() - 1];
    assert!(matches!(
        engine(1).map2alm(&geometry, &layout, &short_map, ZBounds::FULL),
        Err(ShtError::SizeMismatch { what: "map", .. })
    ));
}

#[test]
fn indexed_transforms_are_independent_of_thread_count() {
    let mut rng = StdRng::seed_from_u64(21);
    let geometry = GeometryInfo::healpix(8, 1).unwrap();
    let layout = AlmLayout::full(12);
    let map = random_map(&mut rng, geometry.npix());
    let options = EngineOptions {
        policy: ChunkPolicy::Fixed(3),
        reduction: ReductionOrder::Indexed,
        ..EngineOptions::default()
    };

    let alm = random_alm(&mut rng, &layout, 0);

    let single = TransformEngine::new(options.clone()).with_threads(1);
    let reference = single.map2alm(&geometry, &layout, &map, ZBounds::FULL).unwrap();
    let reference_map = single.alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
    for threads in [2usize, 4, 7] {
        let engine = TransformEngine::new(options.clone()).with_threads(threads);
        let coefficients = engine.map2alm(&geometry, &layout, &map, ZBounds::FULL).unwrap();
        assert_eq!(coefficients, reference, "map2alm threads={threads}");
        let synthesized = engine.alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
        assert_eq!(synthesized, reference_map, "alm2map threads={threads}");
    }

    let tree = TransformEngine::new(options)
        .with_threads(4)
        .with_reduction(ReductionOrder::Tree)
        .map2alm(&geometry, &layout, &map, ZBounds::FULL)
        .unwrap();
    assert_alm_close(&tree, &reference, 1e-12);
}

#[test]
fn phase_pipelines_compose_to_full_transforms() {
    let mut rng = StdRng::seed_from_u64(17);
    let geometry = GeometryInfo::healpix(4, 1).unwrap();
    let layout = AlmLayout::triangular(10, 6).unwrap();
    let alm = random_alm(&mut rng, &layout, 0);
    let map = random_map(&mut rng, geometry.npix());
    let engine = engine(3).with_policy(ChunkPolicy::Fixed(2));

    let alm_view = ndarray::aview1(&alm).insert_axis(Axis(0));
    let phases = engine
        .alm2phases(&geometry, &layout, alm_view, Spin::Scalar)
        .unwrap();
    assert_eq!(phases.len(), engine.plan(&geometry, Spin::Scalar).nchunks());
    let mut composed = Array2::zeros((1, geometry.npix()));
    engine.phases2map(&geometry, &phases, composed.view_mut()).unwrap();
    let direct = engine.alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
    assert_eq!(composed.into_raw_vec(), direct);

    let map_view = ndarray::aview1(&map).insert_axis(Axis(0));
    let phases = engine
        .map2phases(&geometry, map_view, layout.mmax(), Spin::Scalar)
        .unwrap();
    let composed = engine
        .phases2alm(&geometry, &layout, &phases, Spin::Scalar)
        .unwrap();
    let direct = engine.map2alm(&geometry, &layout, &map, ZBounds::FULL).unwrap();
    assert_eq!(composed.into_raw_vec(), direct);
}

#[test]
fn per_chunk_half_transforms_assemble_the_full_map() {
    let mut rng = StdRng::seed_from_u64(23);
    let geometry = GeometryInfo::gauss_legendre(7, 12).unwrap();
    let layout = AlmLayout::full(5);
    let alm = random_alm(&mut rng, &layout, 0);
    let alm_view = ndarray::aview1(&alm).insert_axis(Axis(0));
    let engine = engine(1);

    let mut map = Array2::zeros((1, geometry.npix()));
    let mut analysed = Array2::<Complex64>::zeros((1, layout.coefficient_count()));
    for chunk in sht_core::RingPairChunker::plan(geometry.npairs(), 2) {
        let phase = engine
            .alm2phase(&geometry, &layout, alm_view, Spin::Scalar, chunk)
            .unwrap();
        engine.phase2map(&geometry, &phase, map.view_mut()).unwrap();
    }
    for chunk in sht_core::RingPairChunker::plan(geometry.npairs(), 2) {
        let phase = engine
            .map2phase(&geometry, map.view(), layout.mmax(), Spin::Scalar, chunk)
            .unwrap();
        engine
            .phase2alm(&geometry, &layout, &phase, Spin::Scalar, analysed.view_mut())
            .unwrap();
    }

    let direct = engine.alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
    for (a, b) in map.iter().zip(&direct) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-13);
    }
    assert_alm_close(analysed.as_slice().unwrap(), &alm, 1e-10);
}

#[test]
fn spin_phase_pipelines_compose_to_full_transforms() {
    let mut rng = StdRng::seed_from_u64(31);
    let lmax = 10;
    let spin = 2;
    let layout = AlmLayout::full(lmax);
    let geometry = GeometryInfo::gauss_legendre(lmax + 1, 2 * lmax + 2).unwrap();
    let n = layout.coefficient_count();
    let mut rows = random_alm(&mut rng, &layout, spin);
    rows.extend(random_alm(&mut rng, &layout, spin));
    let alm = Array2::from_shape_vec((2, n), rows).unwrap();
    let engine = engine(3).with_policy(ChunkPolicy::Fixed(2));
    let weighted = Spin::Weighted(spin);

    let phases = engine.alm2phases(&geometry, &layout, alm.view(), weighted).unwrap();
    assert_eq!(phases.len(), engine.plan(&geometry, weighted).nchunks());
    assert!(phases.iter().all(|phase| phase.components() == 2));
    let mut composed = Array2::zeros((2, geometry.npix()));
    engine.phases2map(&geometry, &phases, composed.view_mut()).unwrap();
    let direct = engine
        .alm2map_spin(&geometry, &layout, alm.view(), spin, ZBounds::FULL)
        .unwrap();
    assert_eq!(composed, direct);

    let phases = engine
        .map2phases(&geometry, direct.view(), layout.mmax(), weighted)
        .unwrap();
    let composed = engine.phases2alm(&geometry, &layout, &phases, weighted).unwrap();
    let analysed = engine
        .map2alm_spin(&geometry, &layout, direct.view(), spin, ZBounds::FULL)
        .unwrap();
    assert_eq!(composed, analysed);
    for (a, e) in composed.iter().zip(alm.iter()) {
        assert_abs_diff_eq!(a.re, e.re, epsilon = 1e-10);
        assert_abs_diff_eq!(a.im, e.im, epsilon = 1e-10);
    }

    // The same round trip one chunk at a time.
    let mut map = Array2::zeros((2, geometry.npix()));
    let mut recovered = Array2::<Complex64>::zeros((2, n));
    for chunk in sht_core::RingPairChunker::plan(geometry.npairs(), 2) {
        let phase = engine
            .alm2phase(&geometry, &layout, alm.view(), weighted, chunk)
            .unwrap();
        engine.phase2map(&geometry, &phase, map.view_mut()).unwrap();
    }
    for chunk in sht_core::RingPairChunker::plan(geometry.npairs(), 2) {
        let phase = engine
            .map2phase(&geometry, map.view(), layout.mmax(), weighted, chunk)
            .unwrap();
        engine
            .phase2alm(&geometry, &layout, &phase, weighted, recovered.view_mut())
            .unwrap();
    }
    for (a, b) in map.iter().zip(direct.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-13);
    }
    for (a, e) in recovered.iter().zip(alm.iter()) {
        assert_abs_diff_eq!(a.re, e.re, epsilon = 1e-10);
        assert_abs_diff_eq!(a.im, e.im, epsilon = 1e-10);
    }
}

#[test]
fn unweighted_analysis_is_the_adjoint_of_synthesis() {
    let mut rng = StdRng::seed_from_u64(29);
    let geometry = GeometryInfo::healpix(4, 1).unwrap();
    let layout = AlmLayout::triangular(9, 5).unwrap();
    let alm = random_alm(&mut rng, &layout, 0);
    let map = random_map(&mut rng, geometry.npix());
    let engine = engine(2).with_weighting(Weighting::None);

    let synthesized = engine.alm2map(&geometry, &layout, &alm, ZBounds::FULL).unwrap();
    let adjoint = engine.map2alm(&geometry, &layout, &map, ZBounds::FULL).unwrap();

    let lhs: f64 = synthesized.iter().zip(&map).map(|(x, y)| x * y).sum();
    let rhs: f64 = layout
        .iter()
        .map(|(_, m, idx)| {
            let factor = if m == 0 { 1.0 } else { 2.0 };
            factor * (alm[idx] * adjoint[idx].conj()).re
        })
        .sum();
    assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-9 * lhs.abs().max(1.0));
}
