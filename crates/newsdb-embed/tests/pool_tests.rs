use candle_core::{DType, Device, Tensor};
use newsdb_embed::masked_mean_l2;

#[test]
fn masked_mean_l2_ignores_padding() {
    let dev = Device::Cpu;
    // Batch of two: row 0 masks its second token, row 1 keeps both.
    let h = Tensor::from_slice(
        &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 1.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0],
        (2, 2, 4),
        &dev,
    )
    .unwrap();
    let mask = Tensor::from_slice(&[1u32, 0, 1, 1], (2, 2), &dev).unwrap().to_dtype(DType::F32).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();

    let norm = 30f32.sqrt();
    for (a, b) in out[0].iter().zip([1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm]) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
    // Mean of [1,0,0,0] and [3,0,0,0] is [2,0,0,0], normalised to a unit axis.
    assert!((out[1][0] - 1.0).abs() < 1e-5);
    assert!(out[1][1..].iter().all(|x| x.abs() < 1e-6));
}
