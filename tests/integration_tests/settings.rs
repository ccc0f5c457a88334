use crate::integration_tests::toy_bars;
use feti::FetiSettings;

#[test]
fn default_settings() {
    let settings = FetiSettings::<f64>::default();
    assert_eq!(settings.tolerance, 1e-10);
    assert_eq!(settings.max_iterations, 500);
    assert_eq!(settings.kernel_tolerance, 1e-10);
    assert_eq!(settings.coarse_rcond_threshold, 1e-12);
    assert!(!settings.parallel);
}

#[test]
fn settings_json_round_trip() {
    let settings = FetiSettings {
        tolerance: 1e-8,
        max_iterations: 20,
        kernel_tolerance: 1e-9,
        coarse_rcond_threshold: 1e-14,
        parallel: true,
    };
    let json = serde_json::to_string(&settings).unwrap();
    let deserialized: FetiSettings<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, settings);
}

#[test]
fn partial_settings_fall_back_to_defaults() {
    let settings: FetiSettings<f64> = serde_json::from_str(r#"{ "max_iterations": 3, "parallel": true }"#).unwrap();
    assert_eq!(settings.max_iterations, 3);
    assert!(settings.parallel);
    assert_eq!(settings.tolerance, FetiSettings::<f64>::default().tolerance);

    let solution = toy_bars().solver(settings).unwrap().solve().unwrap();
    assert!(solution.converged);
}
