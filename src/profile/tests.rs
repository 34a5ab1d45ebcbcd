use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::{arr1, arr2, Array1, Array3};

use super::*;
use crate::config::RangeLimits;
use crate::meteo;

fn build(
    hgt: &Array3<f64>,
    temp: &Array3<f64>,
    press: &Array3<f64>,
    rh: &Array3<f64>,
) -> Profile {
    Profile::builder(
        hgt.view().into_dyn(),
        temp.view().into_dyn(),
        press.view().into_dyn(),
        Humidity::Relative(rh.view().into_dyn()),
    )
    .unwrap()
    .build()
    .unwrap()
}

fn column(values: &[f64]) -> Array3<f64> {
    Array1::from(values.to_vec())
        .into_shape_with_order((1, 1, values.len()))
        .unwrap()
}

fn sounding() -> Profile {
    build(
        &column(&[0., 1000., 2000.]),
        &column(&[280., 280., 280.]),
        &column(&[101325., 90000., 80000.]),
        &column(&[0.5, 0.5, 0.5]),
    )
}

/// A 2x2 grid with different columns, the last one a layer shorter.
fn grid() -> Profile {
    let hgt = Array3::from_shape_fn((2, 2, 4), |(x, y, z)| {
        if (x, y, z) == (1, 1, 3) {
            MISSING
        } else {
            (z as f64) * (900. + 100. * x as f64 + 50. * y as f64)
        }
    });
    let temp = Array3::from_shape_fn((2, 2, 4), |(x, y, z)| {
        290. - 6. * z as f64 - x as f64 - y as f64
    });
    let press = Array3::from_shape_fn((2, 2, 4), |(x, y, z)| {
        101325. * (-(hgt[[x, y, z]].max(0.)) / 8000.).exp()
    });
    let rh = Array3::from_shape_fn((2, 2, 4), |(x, y, z)| 0.3 + 0.1 * (x + y + z) as f64);
    let mut profile = build(&hgt, &temp, &press, &rh);
    profile
        .set_field(Field::MixingRatio(Hydrometeor::Rain), FieldValue::from(1e-4))
        .unwrap();
    profile
}

#[test]
fn three_level_sounding() {
    let profile = sounding();
    assert_eq!(profile.nlyrs()[[0, 0]], 2);

    let press = profile.layer_pressure().unwrap();
    let arithmetic = 0.5 * (101325. + 90000.);
    assert!(press[[0, 0, 0]] > 90000. && press[[0, 0, 0]] < 101325.);
    assert!((press[[0, 0, 0]] - arithmetic).abs() > 1.);

    let q = profile.specific_humidity().unwrap();
    let saturated = meteo::rh_to_q(1., 280., 90000.);
    for &q in q.iter() {
        assert!(q > 0. && q < saturated, "{q} not in (0, {saturated})");
    }
}

#[test]
fn weak_pressure_gradient_approaches_arithmetic_mean() {
    let profile = build(
        &column(&[0., 1000.]),
        &column(&[280., 280.]),
        &column(&[90000., 89990.]),
        &column(&[0.5, 0.5]),
    );
    let press = profile.layer_pressure().unwrap();
    assert_relative_eq!(press[[0, 0, 0]], 89995., max_relative = 1e-7);
}

#[test]
fn missing_values_propagate() {
    let profile = grid();
    assert_eq!(profile.nlyrs(), arr2(&[[3, 3], [3, 2]]));

    let temp = profile.layer_temperature().unwrap();
    let press = profile.layer_pressure().unwrap();
    let q_lev = profile.level_specific_humidity().unwrap();
    assert!(!is_missing(temp[[1, 1, 2]]));
    assert!(is_missing(press[[1, 1, 2]]));
    assert!(!is_missing(press[[1, 1, 1]]));
    assert!(is_missing(q_lev[[1, 1, 3]]));
    assert!(!is_missing(q_lev[[1, 1, 2]]));

    let dz = profile.layer_thickness().unwrap();
    assert_eq!(dz[[1, 1, 2]], profile.guards().degenerate_thickness);
}

#[test]
fn derivations_are_cached() {
    let profile = sounding();
    assert_eq!(profile.recomputations(), 0);

    let first = profile.moist_density().unwrap();
    let computed = profile.recomputations();
    assert!(computed > 0);

    let second = profile.moist_density().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    profile.specific_humidity().unwrap();
    assert_eq!(profile.recomputations(), computed);
    assert!(profile.cached_derivations().contains(&Derived::RhoMoist));
}

#[test]
fn concurrent_derivations_agree() {
    let profile = grid();
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| profile.moist_density().unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for rho in &results[1..] {
        assert_eq!(**rho, *results[0]);
    }
}

#[test]
fn mutation_evicts_derivations() {
    let mut profile = sounding();
    let before = profile.specific_humidity().unwrap();
    let generation = profile.generation();

    profile.set_field(Field::TempLev, FieldValue::from(290.)).unwrap();
    assert!(profile.cached_derivations().is_empty());
    assert!(profile.generation() > generation);
    assert!(profile.specific_humidity().unwrap()[[0, 0, 0]] > before[[0, 0, 0]]);

    assert!(matches!(
        profile.set_field(Field::HgtLev, FieldValue::from(0.)),
        Err(ProfileError::NotSettable(Field::HgtLev))
    ));
}

#[test]
fn filtering_and_deriving_commute() {
    let mask = arr2(&[[true, false], [false, true]]);

    let mut derived_first = grid();
    let expected: Vec<_> = Derived::ALL
        .iter()
        .map(|&d| derived_first.derived(d).unwrap())
        .collect();
    derived_first.filter(mask.view().into_dyn()).unwrap();

    let mut filtered_first = grid();
    filtered_first.filter(mask.view().into_dyn()).unwrap();
    assert!(filtered_first.cached_derivations().is_empty());

    for (&d, full) in Derived::ALL.iter().zip(&expected) {
        let from_cache = derived_first.derived(d).unwrap();
        let fresh = filtered_first.derived(d).unwrap();
        assert_eq!(*from_cache, *fresh, "{d} differs");
        assert_eq!(fresh[[0, 1, 0]], full[[1, 1, 0]]);
    }
    assert_eq!(derived_first.recomputations(), Derived::ALL.len());
}

#[test]
fn filter_flattens_to_kept_columns() {
    let mut profile = grid();
    let mask = arr1(&[false, true, true, false]);
    profile.filter(mask.view().into_dyn()).unwrap();

    assert_eq!(profile.grid(), (1, 2));
    assert_eq!(profile.source_index(), arr2(&[[(1, 2), (2, 1)]]));
    assert_eq!(profile.level(Field::HgtLev).unwrap().dim(), (1, 2, 4));
    assert_eq!(profile.column(Field::Lat).unwrap().dim(), (1, 2));
}

#[test]
fn mask_must_match_the_grid() {
    let mut profile = grid();
    let mask = arr1(&[true, false, true]);
    let err = profile.filter(mask.view().into_dyn()).unwrap_err();
    assert!(matches!(err, ProfileError::ShapeMismatch { .. }));

    let mask = arr2(&[[true, false, true, true]]);
    assert!(profile.filter(mask.view().into_dyn()).is_err());
    assert_eq!(profile.grid(), (2, 2));
}

#[test]
fn regrid_onto_finer_axis() {
    let mut profile = build(
        &column(&[0., 1000., 2000.]),
        &column(&[280., 270., 260.]),
        &column(&[100000., 90000., 80000.]),
        &column(&[0.5, 0.6, 0.7]),
    );
    let cwc = Field::MixingRatio(Hydrometeor::Cloud);
    profile
        .set_field(cwc, FieldValue::from(&column(&[1e-4, 2e-4])))
        .unwrap();
    profile.specific_humidity().unwrap();
    let generation = profile.generation();

    profile
        .rescale_heights(&[0., 500., 1000., 1500., 2000., 2500.])
        .unwrap();
    assert_eq!(profile.max_nlyrs(), 5);
    assert_eq!(profile.nlyrs()[[0, 0]], 4);
    assert!(profile.cached_derivations().is_empty());
    assert!(profile.generation() > generation);

    let hgt = profile.level(Field::HgtLev).unwrap();
    assert_eq!(hgt.as_slice().unwrap(), &[0., 500., 1000., 1500., 2000., MISSING]);

    let temp = profile.level(Field::TempLev).unwrap();
    assert_relative_eq!(temp[[0, 0, 1]], 275.);
    assert!(is_missing(temp[[0, 0, 5]]));

    let press = profile.level(Field::PressLev).unwrap();
    assert_relative_eq!(press[[0, 0, 1]], (100000f64 * 90000.).sqrt(), max_relative = 1e-12);

    let cwc = profile.layer(cwc).unwrap();
    assert_relative_eq!(cwc[[0, 0, 0]], 1e-4);
    assert_relative_eq!(cwc[[0, 0, 1]], 1.25e-4);
    assert_relative_eq!(cwc[[0, 0, 3]], 2e-4);
    assert!(is_missing(cwc[[0, 0, 4]]));
}

#[test]
fn regrid_columns_of_different_heights() {
    let grid = |values: [f64; 8]| Array3::from_shape_vec((1, 2, 4), values.to_vec()).unwrap();
    let mut profile = build(
        &grid([0., 1000., 2000., 3000., 0., 1000., MISSING, MISSING]),
        &grid([290., 284., 278., 272., 288., 282., MISSING, MISSING]),
        &grid([100000., 90000., 80000., 70000., 100000., 90000., MISSING, MISSING]),
        &grid([0.5, 0.5, 0.5, 0.5, 0.5, 0.5, MISSING, MISSING]),
    );
    assert_eq!(profile.nlyrs(), arr2(&[[3, 1]]));
    let rain = Field::MixingRatio(Hydrometeor::Rain);
    let mixing_ratio =
        Array3::from_shape_vec((1, 2, 3), vec![1e-4, 2e-4, 3e-4, 4e-4, MISSING, MISSING]).unwrap();
    profile.set_field(rain, FieldValue::from(&mixing_ratio)).unwrap();

    profile.rescale_heights(&[0., 500., 1000., 2000., 3000.]).unwrap();
    assert_eq!(profile.max_nlyrs(), 4);
    assert_eq!(profile.nlyrs(), arr2(&[[4, 2]]));

    let hgt = profile.level(Field::HgtLev).unwrap();
    assert_eq!(hgt.slice(ndarray::s![0, 0, ..]).to_vec(), vec![0., 500., 1000., 2000., 3000.]);
    assert_eq!(hgt.slice(ndarray::s![0, 1, ..]).to_vec(), vec![0., 500., 1000., MISSING, MISSING]);

    let temp = profile.level(Field::TempLev).unwrap();
    assert_relative_eq!(temp[[0, 0, 1]], 287.);
    assert_relative_eq!(temp[[0, 0, 3]], 278.);
    assert_relative_eq!(temp[[0, 1, 1]], 285.);
    assert_eq!(temp[[0, 1, 2]], 282.);
    assert!(temp.slice(ndarray::s![0, 1, 3..]).iter().all(|&t| is_missing(t)));

    let press = profile.level(Field::PressLev).unwrap();
    assert_relative_eq!(press[[0, 1, 1]], (100000f64 * 90000.).sqrt(), max_relative = 1e-12);
    assert!(is_missing(press[[0, 1, 3]]));

    let rain = profile.layer(rain).unwrap();
    assert_relative_eq!(rain[[0, 0, 0]], 1e-4);
    assert_relative_eq!(rain[[0, 0, 1]], 1.25e-4);
    assert_relative_eq!(rain[[0, 0, 2]], 2e-4);
    assert_relative_eq!(rain[[0, 0, 3]], 3e-4);
    assert_relative_eq!(rain[[0, 1, 0]], 4e-4);
    assert_relative_eq!(rain[[0, 1, 1]], 4e-4);
    assert!(is_missing(rain[[0, 1, 2]]));
    assert!(is_missing(rain[[0, 1, 3]]));
}

#[test]
fn regrid_keeps_values_on_old_levels() {
    let mut profile = build(
        &column(&[0., 1000., 2000.]),
        &column(&[280., MISSING, 260.]),
        &column(&[100000., 90000., 80000.]),
        &column(&[0.5, 0.6, 0.7]),
    );
    profile.rescale_heights(&[0., 2000.]).unwrap();
    let temp = profile.level(Field::TempLev).unwrap();
    assert_eq!(temp.as_slice().unwrap(), &[280., 260.]);
}

#[test]
fn regrid_rejects_bad_axes() {
    let mut profile = sounding();
    let axes: [&[f64]; 4] = [&[0.], &[0., 0.], &[0., f64::NAN], &[1000., 0.]];
    for axis in axes {
        assert!(matches!(
            profile.rescale_heights(axis),
            Err(ProfileError::InvalidAxis(_))
        ));
    }
    assert_eq!(profile.max_nlyrs(), 2);
}

#[test]
fn regrid_warns_about_long_columns() {
    let mut profile = sounding();
    let axis: Vec<f64> = (0..=MAX_LAYERS + 1).map(|k| 5. * k as f64).collect();
    profile.take_warnings();
    profile.rescale_heights(&axis).unwrap();
    assert_eq!(profile.max_nlyrs(), MAX_LAYERS + 1);
    assert!(profile
        .warnings()
        .iter()
        .any(|w| matches!(w, Warning::TooManyLayers { .. })));
}

#[test]
fn range_check() {
    let limits = RangeLimits::default();
    let mut profile = grid();
    profile.check_ranges(&limits).unwrap();

    profile.set_field(Field::TempLev, FieldValue::from(330.)).unwrap();
    match profile.check_ranges(&limits) {
        Err(ProfileError::RangeViolation {
            field,
            value,
            bound_kind,
            ..
        }) => {
            assert_eq!(field, Field::TempLev);
            assert_eq!(value, 330.);
            assert_eq!(bound_kind, "maximum");
        }
        other => panic!("unexpected {other:?}"),
    }

    let rh = Array3::from_elem((2, 2, 4), -0.5);
    profile.set_field(Field::TempLev, FieldValue::from(280.)).unwrap();
    profile.set_field(Field::RelhumLev, FieldValue::from(&rh)).unwrap();
    assert!(matches!(
        profile.check_ranges(&limits),
        Err(ProfileError::RangeViolation { bound_kind: "minimum", .. })
    ));
}

#[test]
fn missing_values_pass_the_minimum_check() {
    let profile = grid();
    assert!(is_missing(profile.level(Field::HgtLev).unwrap()[[1, 1, 3]]));
    let limits = RangeLimits {
        bounds: vec![(Field::HgtLev, 0., 1e5)],
    };
    profile.check_ranges(&limits).unwrap();
}

#[test]
fn integrated_values() {
    let mut profile = sounding();
    profile.add_integrated_values().unwrap();

    let q = profile.specific_humidity().unwrap();
    let rho = profile.moist_density().unwrap();
    let expected = 1000. * (q[[0, 0, 0]] * rho[[0, 0, 0]] + q[[0, 0, 1]] * rho[[0, 0, 1]]);
    let iwv = profile.column(Field::Iwv).unwrap()[[0, 0]];
    assert_relative_eq!(iwv, expected, max_relative = 1e-12);
    for species in Hydrometeor::ALL {
        assert_eq!(profile.column(Field::WaterPath(species)).unwrap()[[0, 0]], 0.);
    }

    let cwc = Field::MixingRatio(Hydrometeor::Cloud);
    profile.set_field(cwc, FieldValue::from(1e-4)).unwrap();
    profile.add_integrated_values().unwrap();
    let rho = profile.moist_density().unwrap();
    let cwp = profile.column(Field::WaterPath(Hydrometeor::Cloud)).unwrap()[[0, 0]];
    let expected = 1e-4 * 1000. * (rho[[0, 0, 0]] + rho[[0, 0, 1]]);
    assert_relative_eq!(cwp, expected, max_relative = 1e-12);
}

#[test]
fn cloud_shape_and_adiabatic_water() {
    let mut profile = build(
        &column(&[0., 500., 1000., 1500., 2000.]),
        &column(&[285., 282., 279., 276., 273.]),
        &column(&[100000., 94000., 88500., 83500., 79000.]),
        &column(&[0.5, 0.97, 0.98, 0.5, 0.5]),
    );
    profile.add_cloud_shape().unwrap();
    assert_eq!(profile.column(Field::CloudBase).unwrap()[[0, 0]], 500.);
    assert_eq!(profile.column(Field::CloudTop).unwrap()[[0, 0]], 1500.);

    profile.add_pseudo_adiabatic_lwc().unwrap();
    let cwc = profile.layer(Field::MixingRatio(Hydrometeor::Cloud)).unwrap();
    // levels 1 and 2 are cloudy, which leaves layer 1 between them
    assert_eq!(cwc[[0, 0, 0]], 0.);
    assert!(cwc[[0, 0, 1]] > 0.);
    assert_eq!(cwc[[0, 0, 2]], 0.);
    assert_eq!(cwc[[0, 0, 3]], 0.);
    assert!(profile.column(Field::WaterPath(Hydrometeor::Cloud)).unwrap()[[0, 0]] > 0.);
}

#[test]
fn clear_columns_have_no_cloud_shape() {
    let mut profile = sounding();
    profile.add_cloud_shape().unwrap();
    assert!(is_missing(profile.column(Field::CloudBase).unwrap()[[0, 0]]));
    assert!(is_missing(profile.column(Field::CloudTop).unwrap()[[0, 0]]));
}

#[test]
fn specific_humidity_input_derives_relative_humidity() {
    let q = column(&[0.005, 0.004]);
    let profile = Profile::builder(
        column(&[0., 1000., 2000.]).view().into_dyn(),
        column(&[280., 275., 270.]).view().into_dyn(),
        column(&[100000., 90000., 80000.]).view().into_dyn(),
        Humidity::Specific(q.view().into_dyn()),
    )
    .unwrap()
    .build()
    .unwrap();

    assert_eq!(*profile.specific_humidity().unwrap(), q);
    let rh = profile.level(Field::RelhumLev).unwrap();
    let q_lev = profile.level_specific_humidity().unwrap();
    assert_relative_eq!(q_lev[[0, 0, 1]], 0.0045);
    for k in 0..3 {
        assert!(rh[[0, 0, k]] > 0. && rh[[0, 0, k]] < 2.);
    }
}
