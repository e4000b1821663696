use crate::data::{Batch, DataError, DataSource, TensorDataset};
use crate::errors::HapiError;
use crate::tensor::Tensor;

#[test]
fn test_flat_batch_splits_by_input_count() {
    let batch = Batch::Flat(vec![
        Tensor::zeros(&[2, 3]),
        Tensor::zeros(&[2, 4]),
        Tensor::full(&[2, 1], 1.0),
    ]);
    let (inputs, labels) = batch.split(2).unwrap();
    assert_eq!(inputs.len(), 2);
    assert_eq!(labels, vec![Tensor::full(&[2, 1], 1.0)]);
}

#[test]
fn test_flat_batch_without_labels() {
    let (inputs, labels) = Batch::Flat(vec![Tensor::zeros(&[2, 3])]).split(1).unwrap();
    assert_eq!(inputs.len(), 1);
    assert!(labels.is_empty());

    let err = Batch::Flat(vec![Tensor::zeros(&[2, 3])]).split(2).unwrap_err();
    assert!(matches!(
        err,
        HapiError::Data(DataError::NotEnoughFields { inputs: 2, got: 1 })
    ));
}

#[test]
fn test_paired_batch_is_taken_as_is() {
    let batch = Batch::from((Tensor::zeros(&[3, 2]), Tensor::zeros(&[3, 1])));
    assert_eq!(batch.batch_size(), 3);
    let (inputs, labels) = batch.split(5).unwrap();
    assert_eq!((inputs.len(), labels.len()), (1, 1));
}

#[test]
fn test_data_source_len() {
    let ds = TensorDataset::pair(Tensor::zeros(&[7, 2]), Tensor::zeros(&[7, 1])).unwrap();
    assert_eq!(DataSource::dataset(ds).dataset_len(), Some(7));
    assert_eq!(DataSource::from(Vec::<Batch>::new()).dataset_len(), None);
}
