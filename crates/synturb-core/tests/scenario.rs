//! End-to-end runs of both generation paths at a realistic (small) size.

use synturb_core::{
    stats, Cascade, CascadeParams, FieldConfig, LagrangianMapper, MapperOptions,
};

fn reference_config(seed: u64) -> FieldConfig {
    let mut config = FieldConfig::new(3, 32);
    config.threads = Some(4);
    config.seed = Some(seed);
    config
}

fn reference_params() -> CascadeParams {
    CascadeParams {
        number_of_modes: 8,
        correlation_length: 0.5,
        spectral_index: 5.0 / 3.0,
        intermittency: 0.2,
    }
}

#[test]
fn cascade_reference_scenario() {
    let mut cascade = Cascade::<f64>::new("B", reference_config(2024)).unwrap();
    let res = cascade.generate(&reference_params()).unwrap();

    assert_eq!(res.len(), 3);
    assert!(res.iter().all(|plane| plane.len() == 32 * 32 * 32));
    assert!((cascade.field().rms() - 1.0).abs() < 1e-6);

    let count = (32usize * 32 * 32) as f64;
    for plane in cascade.field().res() {
        let mean: f64 = plane.iter().sum::<f64>() / count;
        assert!(mean.abs() < 1e-6, "component mean {mean}");
    }

    let div = stats::divergence(cascade.field());
    let max_div = div.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    assert!(max_div < 1e-8, "max |div| = {max_div}");
}

#[test]
fn cascade_spectrum_decays_toward_small_scales() {
    let mut cascade = Cascade::<f64>::new("B", reference_config(11)).unwrap();
    cascade.generate(&reference_params()).unwrap();
    let grid = cascade.field().grid().clone();
    let (edges, centers) = stats::kbins(&grid, None, None, None, false);
    let spectra = stats::spectrum(cascade.field_mut(), &edges);
    // Power at the largest resolved scales must dominate the smallest.
    for s in &spectra {
        let first = s[0];
        let last = *s.last().unwrap();
        assert!(
            first > 10.0 * last,
            "no spectral decay: S({}) = {first}, S({}) = {last}",
            centers[0],
            centers[centers.len() - 1]
        );
    }
}

#[test]
fn lagrangian_mapping_reference_scenario() {
    let mut mapper =
        LagrangianMapper::<f64>::new("B", reference_config(2024), 0.3, 2.0).unwrap();
    let res = mapper.generate(&reference_params(), &MapperOptions::default()).unwrap();

    assert_eq!(res.len(), 3);
    assert!((mapper.field().rms() - 1.0).abs() < 1e-6);
    // The regrid must have reached essentially every output cell.
    let covered = mapper.weights().iter().filter(|w| **w > 0.0).count();
    let total = 32 * 32 * 32;
    assert!(
        covered as f64 > 0.99 * total as f64,
        "only {covered} of {total} cells covered"
    );
}

#[test]
fn both_paths_are_deterministic_across_runs() {
    let params = reference_params();
    let mut a = Cascade::<f64>::new("a", reference_config(5)).unwrap();
    let mut b = Cascade::<f64>::new("b", reference_config(5)).unwrap();
    a.generate(&params).unwrap();
    b.generate(&params).unwrap();
    assert_eq!(a.field().res(), b.field().res());

    let mut ma = LagrangianMapper::<f64>::new("a", reference_config(5), 0.3, 2.0).unwrap();
    let mut mb = LagrangianMapper::<f64>::new("b", reference_config(5), 0.3, 2.0).unwrap();
    ma.generate(&params, &MapperOptions::default()).unwrap();
    mb.generate(&params, &MapperOptions::default()).unwrap();
    assert_eq!(ma.field().res(), mb.field().res());
}
