use super::store_with;
use crate::adapter::GraphKind;
use crate::checkpoint::{RequiredVar, STATIC_COUNTER, VarRole};
use crate::nn::Gradients;
use crate::optimizer::{Adam, LearningRate, Momentum, Optimizer, unique_name};
use crate::tensor::Tensor;

#[test]
fn test_unique_name_counts_per_key() {
    assert_eq!(unique_name("naming_test_key"), "naming_test_key_0");
    assert_eq!(unique_name("naming_test_key"), "naming_test_key_1");
    assert_eq!(unique_name("naming_test_other"), "naming_test_other_0");
}

#[test]
fn test_unique_name_uses_name_or_class() {
    let named = Momentum::named("naming_opt", 0.1, 0.9);
    assert_eq!(named.core().unique_name(), "naming_opt_0");
    let unnamed = Momentum::new(0.1, 0.9);
    assert!(unnamed.core().unique_name().starts_with("Momentum_"));
    assert_eq!(unnamed.core().class_name(), "Momentum");
    assert_eq!(unnamed.core().name(), None);
}

#[test]
fn test_static_names_are_created_at_bind() {
    let store = store_with(Tensor::new(&[1., 2.], &[2]));
    let mut opt = Momentum::new(0.1, 0.9);
    opt.core_mut().bind(GraphKind::Static, &store);

    let slots = opt.core().accumulators("w").unwrap();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].var_name, "w_velocity_0");
    assert_eq!(slots[0].value, Tensor::zeros(&[2]));
    assert_eq!(
        opt.core().required_vars(),
        vec![
            RequiredVar {
                name: "learning_rate_0".to_string(),
                role: VarRole::LearningRate,
            },
            RequiredVar {
                name: "w_velocity_0".to_string(),
                role: VarRole::Accumulator {
                    param: "w".to_string(),
                    kind: "velocity".to_string(),
                },
            },
        ]
    );
}

#[test]
fn test_static_names_with_optimizer_name_and_schedule() {
    let store = store_with(Tensor::new(&[1., 2.], &[2]));
    let lr = LearningRate::piecewise(&[10], &[0.1, 0.01]).unwrap();
    let mut opt = Adam::named("adam_opt", lr);
    opt.core_mut().bind(GraphKind::Static, &store);

    let names = opt
        .core()
        .accumulators("w")
        .unwrap()
        .iter()
        .map(|s| s.var_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "w_adam_opt_moment1_0",
            "w_adam_opt_moment2_0",
            "w_adam_opt_beta1_pow_acc_0",
            "w_adam_opt_beta2_pow_acc_0",
        ]
    );
    let required = opt.core().required_vars();
    assert_eq!(required[0].name, STATIC_COUNTER);
    assert_eq!(required[0].role, VarRole::Counter);
    assert_eq!(required.len(), 5);
}

#[test]
fn test_dynamic_names_are_created_lazily() {
    let mut store = store_with(Tensor::new(&[1., 2.], &[2]));
    let mut opt = Momentum::new(0.1, 0.9);
    opt.core_mut().bind(GraphKind::Dynamic, &store);
    assert!(opt.core().accumulators("w").is_none());
    assert!(opt.state_dict().is_empty());

    let mut grads = Gradients::new();
    grads.insert("w".to_string(), Tensor::new(&[0.5, 0.5], &[2]));
    opt.minimize(&mut store, &grads).unwrap();

    let expected = format!("w_{}_velocity_0", opt.core().unique_name());
    assert_eq!(opt.core().accumulators("w").unwrap()[0].var_name, expected);
    assert!(opt.state_dict().contains_key(&expected));
}
