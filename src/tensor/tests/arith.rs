use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

#[test]
fn test_add_with_row_broadcast() {
    let a = Tensor::new(&[1., 2., 3., 4.], &[2, 2]);
    let b = Tensor::new(&[10., 20.], &[1, 2]);
    let c = &a + &b;
    assert_eq!(c, Tensor::new(&[11., 22., 13., 24.], &[2, 2]));
}

#[test]
fn test_scalar_ops_both_sides() {
    let a = Tensor::new(&[1., 2.], &[2]);
    assert_eq!(&a * 2., Tensor::new(&[2., 4.], &[2]));
    assert_eq!(1. - &a, Tensor::new(&[0., -1.], &[2]));
    assert_eq!(&a / 2., Tensor::new(&[0.5, 1.], &[2]));
}

#[test]
fn test_broadcast_shape() {
    assert_eq!(Tensor::broadcast_shape("加", &[4, 3], &[3]).unwrap(), vec![4, 3]);
    assert_eq!(Tensor::broadcast_shape("加", &[4, 1], &[1, 5]).unwrap(), vec![4, 5]);
    assert!(Tensor::broadcast_shape("加", &[4, 3], &[2]).is_err());
}

#[test]
fn test_mat_mul_and_transpose() {
    let a = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    let b = Tensor::new(&[1., 0., 0., 1., 1., 1.], &[3, 2]);
    let c = a.mat_mul(&b).unwrap();
    assert_eq!(c, Tensor::new(&[4., 5., 10., 11.], &[2, 2]));
    assert_eq!(a.transpose().unwrap().shape(), &[3, 2]);
    assert!(a.mat_mul(&a).is_err());
}

#[test]
fn test_sum_to_shape_reduces_broadcast_axes() {
    let g = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[3, 2]);
    let reduced = g.sum_to_shape(&[2]).unwrap();
    assert_abs_diff_eq!(reduced, Tensor::new(&[9., 12.], &[2]), epsilon = 1e-6);
    let keep = g.sum_to_shape(&[1, 2]).unwrap();
    assert_abs_diff_eq!(keep, Tensor::new(&[9., 12.], &[1, 2]), epsilon = 1e-6);
}

#[test]
fn test_argmax_rows() {
    let t = Tensor::new(&[0.1, 0.7, 0.2, 0.9, 0.05, 0.05], &[2, 3]);
    assert_eq!(t.argmax_rows().unwrap(), vec![1, 0]);
}
