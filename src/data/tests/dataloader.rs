//! DataLoader 单元测试

use crate::data::{Batch, DataError, DataLoader, Dataset, TensorDataset};
use crate::errors::HapiError;
use crate::tensor::Tensor;

fn dataset(n: usize) -> TensorDataset {
    let features = Tensor::new(&(0..2 * n).map(|x| x as f32).collect::<Vec<_>>(), &[n, 2]);
    let labels = Tensor::new(&(0..n).map(|x| x as f32).collect::<Vec<_>>(), &[n, 1]);
    TensorDataset::pair(features, labels).unwrap()
}

fn labels_of(batch: &Batch) -> Vec<f32> {
    match batch {
        Batch::Flat(fields) => fields[1].to_vec(),
        Batch::Paired(_, y) => y[0].to_vec(),
    }
}

#[test]
fn test_tensor_dataset() {
    let ds = dataset(3);
    assert_eq!(ds.len(), 3);
    assert!(!ds.is_empty());
    assert_eq!(ds.get(1).unwrap(), vec![
        Tensor::new(&[2., 3.], &[2]),
        Tensor::new(&[1.], &[1]),
    ]);
    assert!(matches!(
        ds.get(3),
        Err(HapiError::Data(DataError::IndexOutOfBounds { index: 3, len: 3 }))
    ));
}

#[test]
fn test_tensor_dataset_rejects_length_mismatch() {
    let result = TensorDataset::pair(Tensor::zeros(&[3, 2]), Tensor::zeros(&[2, 1]));
    assert!(matches!(
        result,
        Err(HapiError::Data(DataError::LengthMismatch {
            field: 1,
            expected: 3,
            got: 2
        }))
    ));
    assert!(matches!(
        TensorDataset::new(Vec::new()),
        Err(HapiError::Data(DataError::NoField))
    ));
}

#[test]
fn test_dataloader_basic() {
    let loader = DataLoader::new(dataset(10), 3).unwrap();
    assert_eq!(loader.num_batches(), 4); // 10 / 3 = 3.33, 向上取整 = 4
    assert_eq!(loader.dataset_len(), 10);

    let batches = loader.iter().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(batches.len(), 4);
    // 前 3 个批次大小为 3，最后一个批次大小为 1
    let sizes = batches.iter().map(Batch::batch_size).collect::<Vec<_>>();
    assert_eq!(sizes, vec![3, 3, 3, 1]);
    assert_eq!(labels_of(&batches[0]), vec![0., 1., 2.]);
}

#[test]
fn test_dataloader_drop_last() {
    let loader = DataLoader::new(dataset(10), 3).unwrap().drop_last(true);
    assert_eq!(loader.num_batches(), 3); // 10 / 3 = 3
    assert_eq!(loader.iter().count(), 3);
}

#[test]
fn test_dataloader_rejects_zero_batch_size() {
    assert!(matches!(
        DataLoader::new(dataset(4), 0),
        Err(HapiError::InvalidArgument(_))
    ));
}

#[test]
fn test_dataloader_shuffle_with_seed() {
    // 使用相同种子，两次迭代应该产生相同的结果
    let loader1 = DataLoader::new(dataset(10), 3).unwrap().shuffle(true).seed(42);
    let loader2 = DataLoader::new(dataset(10), 3).unwrap().shuffle(true).seed(42);

    let batches1 = loader1.iter().collect::<Result<Vec<_>, _>>().unwrap();
    let batches2 = loader2.iter().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(batches1, batches2);

    // 打乱后仍覆盖全部样本
    let mut seen = batches1.iter().flat_map(labels_of).collect::<Vec<_>>();
    seen.sort_by(f32::total_cmp);
    assert_eq!(seen, (0..10).map(|x| x as f32).collect::<Vec<_>>());
}

#[test]
fn test_dataloader_shards_across_ranks() {
    let shared = std::sync::Arc::new(dataset(10));
    let rank0 = DataLoader::from_shared(shared.clone(), 2, 2, 0).unwrap();
    let rank1 = DataLoader::from_shared(shared, 2, 2, 1).unwrap();
    // 每个进程分到 5 个样本：2 + 2 + 1
    assert_eq!(rank0.num_batches(), 3);
    assert_eq!(rank0.dataset_len(), 10);

    let labels0 = rank0.iter().map(|b| labels_of(&b.unwrap())).collect::<Vec<_>>();
    let labels1 = rank1.iter().map(|b| labels_of(&b.unwrap())).collect::<Vec<_>>();
    assert_eq!(labels0, vec![vec![0., 1.], vec![4., 5.], vec![8.]]);
    assert_eq!(labels1, vec![vec![2., 3.], vec![6., 7.], vec![9.]]);
}

#[test]
fn test_dataloader_3d_features() {
    // 模拟序列输入: [samples, seq_len, input_size]
    let features = Tensor::new(&(0..24).map(|x| x as f32).collect::<Vec<_>>(), &[4, 3, 2]);
    let labels = Tensor::new(&[0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0], &[4, 2]);
    let loader = DataLoader::new(TensorDataset::pair(features, labels).unwrap(), 2).unwrap();

    let batches = loader.iter().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(batches.len(), 2);
    let Batch::Flat(fields) = &batches[0] else {
        panic!("加载器应产生扁平批次");
    };
    assert_eq!(fields[0].shape(), &[2, 3, 2]);
    assert_eq!(fields[1].shape(), &[2, 2]);
}
