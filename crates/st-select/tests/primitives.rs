// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use st_select::ops::heap::{make_heap, pop_heap, push_heap, sort_heap};
use st_select::{
    kernel_row_partitioning, radix_sort_by_key, radix_sort_rows_by_key, ComputeQueue, DeviceCaps,
    SelectConfig, SubGroup,
};

fn cpu_queue() -> ComputeQueue {
    ComputeQueue::with_config(DeviceCaps::cpu(), SelectConfig::default()).expect("queue")
}

#[test]
fn partition_keeps_multiset_and_tracks_columns() {
    let mut rng = StdRng::seed_from_u64(64);
    for width in [1usize, 8, 16, 128] {
        let group = SubGroup::new(width);
        for _ in 0..20 {
            let len = rng.gen_range(0..400);
            let original: Vec<f32> = (0..len).map(|_| rng.gen_range(-5..5) as f32).collect();
            let start = if len == 0 { 0 } else { rng.gen_range(0..=len) };
            let end = rng.gen_range(start..=len);
            let pivot = rng.gen_range(-6..6) as f32;

            let mut values = original.clone();
            let mut indices: Vec<i32> = (0..len as i32).collect();
            let split = kernel_row_partitioning(&group, &mut values, &mut indices, start, end, pivot);

            assert!(start <= split && split <= end);
            assert!(values[start..split].iter().all(|v| *v < pivot));
            assert!(values[split..end].iter().all(|v| *v >= pivot));
            for pos in 0..len {
                assert_eq!(values[pos], original[indices[pos] as usize]);
            }
            let mut inside: Vec<i32> = indices[start..end].to_vec();
            inside.sort_unstable();
            assert_eq!(inside, (start as i32..end as i32).collect::<Vec<_>>());
        }
    }
}

#[test]
fn radix_sort_orders_scores_with_indices() {
    let q = cpu_queue();
    let mut rng = StdRng::seed_from_u64(9);
    let original: Vec<f64> = (0..2000).map(|_| rng.gen_range(-1.0e6..1.0e6)).collect();
    let mut values = original.clone();
    let mut indices: Vec<i32> = (0..2000).collect();
    radix_sort_by_key(&q, &mut values, &mut indices).unwrap();

    let mut expected = original.clone();
    expected.sort_by(f64::total_cmp);
    assert_eq!(values, expected);
    for (v, i) in values.iter().zip(&indices) {
        assert_eq!(*v, original[*i as usize]);
    }
}

#[test]
fn row_radix_sort_handles_each_row() {
    let q = cpu_queue();
    let mut values = Array2::from_shape_vec((2, 4), vec![3.0_f32, 1.0, 2.0, 0.0, -1.0, -3.0, -2.0, -4.0])
        .unwrap();
    let mut indices = Array2::from_shape_vec((2, 4), vec![0, 1, 2, 3, 0, 1, 2, 3]).unwrap();
    radix_sort_rows_by_key(&q, values.view_mut(), indices.view_mut()).unwrap();
    assert_eq!(values.row(0).to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(indices.row(0).to_vec(), vec![3, 1, 2, 0]);
    assert_eq!(values.row(1).to_vec(), vec![-4.0, -3.0, -2.0, -1.0]);
    assert_eq!(indices.row(1).to_vec(), vec![3, 1, 2, 0]);
}

#[test]
fn heap_utilities_sort_candidates() {
    let less = |a: &(f32, i32), b: &(f32, i32)| a.0 < b.0 || (a.0 == b.0 && a.1 < b.1);
    let mut heap: Vec<(f32, i32)> = Vec::new();
    for (i, v) in [4.0_f32, 1.0, 4.0, 0.5, 7.0].into_iter().enumerate() {
        heap.push((v, i as i32));
        push_heap(&mut heap, less);
    }
    pop_heap(&mut heap, less);
    assert_eq!(heap.pop(), Some((7.0, 4)));

    make_heap(&mut heap, less);
    sort_heap(&mut heap, less);
    assert_eq!(heap, vec![(0.5, 3), (1.0, 1), (4.0, 0), (4.0, 2)]);
}
