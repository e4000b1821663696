use crate::tensor::{DType, Tensor};

#[test]
fn test_le_bytes_are_bit_exact() {
    let t = Tensor::new(&[0.1, -3.25, f32::MIN_POSITIVE, 7.0e20], &[2, 2]);
    let bytes = t.to_le_bytes();
    assert_eq!(bytes.len(), 16);
    let back = Tensor::from_le_bytes(DType::F32, &[2, 2], &bytes).unwrap();
    for (a, b) in t.to_vec().iter().zip(back.to_vec()) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn test_from_le_bytes_rejects_wrong_length() {
    assert!(Tensor::from_le_bytes(DType::F32, &[2], &[0u8; 7]).is_err());
    assert!(Tensor::from_le_bytes(DType::F32, &[3], &[0u8; 8]).is_err());
}
