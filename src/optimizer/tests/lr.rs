use crate::errors::HapiError;
use crate::optimizer::LearningRate;

#[test]
fn test_piecewise_value_at() {
    let lr = LearningRate::piecewise(&[2, 5], &[0.1, 0.01, 0.001]).unwrap();
    assert!(lr.is_scheduled());
    assert_eq!(lr.value_at(-1), 0.1);
    assert_eq!(lr.value_at(0), 0.1);
    assert_eq!(lr.value_at(1), 0.1);
    assert_eq!(lr.value_at(2), 0.01);
    assert_eq!(lr.value_at(4), 0.01);
    assert_eq!(lr.value_at(5), 0.001);
    assert_eq!(lr.value_at(100), 0.001);
}

#[test]
fn test_fixed_value_ignores_step() {
    let lr = LearningRate::from(0.5);
    assert!(!lr.is_scheduled());
    assert_eq!(lr.value_at(0), 0.5);
    assert_eq!(lr.value_at(1000), 0.5);
}

#[test]
fn test_piecewise_rejects_bad_config() {
    assert!(matches!(
        LearningRate::piecewise(&[2, 5], &[0.1, 0.01]),
        Err(HapiError::InvalidArgument(_))
    ));
    assert!(matches!(
        LearningRate::piecewise(&[5, 2], &[0.1, 0.01, 0.001]),
        Err(HapiError::InvalidArgument(_))
    ));
}
