// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use approx::assert_relative_eq;
use ndarray::{arr2, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use st_select::{
    choose_strategy, kselect, kselect_sq_l2, row_major_view, row_major_view_mut, ComputeQueue,
    DeviceCaps, Error, KSelect, SelectConfig, SelectOrder, StrategyKind,
};

fn queue_with(caps: DeviceCaps, seed: u64, parallel_threshold: usize) -> ComputeQueue {
    // Shared by every test in this binary; only the first call installs.
    let _ = st_select::telemetry::init_tracing();
    let cfg = SelectConfig {
        seed: Some(seed),
        parallel_threshold,
        ..SelectConfig::default()
    };
    ComputeQueue::with_config(caps, cfg).expect("queue")
}

fn cpu_queue() -> ComputeQueue {
    queue_with(DeviceCaps::cpu(), 17, usize::MAX)
}

/// Narrow device: SIMD lists up to 8, no room for heaps.
fn narrow_queue(parallel_threshold: usize) -> ComputeQueue {
    let caps = DeviceCaps::wgpu(8, true, 8).with_shared_mem(Some(64));
    queue_with(caps, 5, parallel_threshold)
}

fn oracle(data: &Array2<f32>, k: usize) -> (Array2<f32>, Array2<i32>) {
    let rows = data.nrows();
    let mut sel = Array2::zeros((rows, k));
    let mut idx = Array2::zeros((rows, k));
    for (r, row) in data.rows().into_iter().enumerate() {
        let mut keys: Vec<(f32, i32)> = row.iter().enumerate().map(|(c, v)| (*v, c as i32)).collect();
        keys.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (slot, (v, c)) in keys.into_iter().take(k).enumerate() {
            sel[[r, slot]] = v;
            idx[[r, slot]] = c;
        }
    }
    (sel, idx)
}

fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize, distinct: i32) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0..distinct) as f32 * 0.25)
}

fn run(plan: &mut KSelect<f32>, q: &ComputeQueue, data: &Array2<f32>) -> (Array2<f32>, Array2<i32>) {
    let (rows, _) = plan.shape();
    let mut sel = Array2::zeros((rows, plan.k()));
    let mut idx = Array2::zeros((rows, plan.k()));
    plan.select(q, data.view(), Some(sel.view_mut()), Some(idx.view_mut()))
        .expect("select");
    (sel, idx)
}

#[test]
fn example_row_selects_three_smallest() {
    let q = cpu_queue();
    let data = arr2(&[[5.0_f32, 3.0, 8.0, 1.0, 9.0, 2.0]]);
    for kind in [StrategyKind::Simd, StrategyKind::Heap, StrategyKind::QuickSelect] {
        let mut plan = KSelect::with_strategy(&q, 1, 6, 3, kind).unwrap();
        let (sel, idx) = run(&mut plan, &q, &data);
        assert_eq!(sel, arr2(&[[1.0, 2.0, 3.0]]), "{kind}");
        assert_eq!(idx, arr2(&[[3, 5, 1]]), "{kind}");
    }
}

#[test]
fn planned_strategy_matches_oracle() {
    let mut rng = StdRng::seed_from_u64(2024);
    let data = random_matrix(&mut rng, 9, 301, 60);
    for threshold in [usize::MAX, 0] {
        for q in [queue_with(DeviceCaps::cpu(), 3, threshold), narrow_queue(threshold)] {
            for k in [1, 2, 7, 8, 9, 40, 129, 300, 301] {
                let mut plan = KSelect::new(&q, 9, 301, k).unwrap();
                let (sel, idx) = run(&mut plan, &q, &data);
                let (want_sel, want_idx) = oracle(&data, k);
                assert_eq!(sel, want_sel, "k = {k} via {}", plan.kind());
                assert_eq!(idx, want_idx, "k = {k} via {}", plan.kind());
            }
        }
    }
}

#[test]
fn narrow_device_routes_large_k_to_quick_select() {
    let q = narrow_queue(usize::MAX);
    let plan = KSelect::<f32>::new(&q, 2, 100, 9).unwrap();
    assert_eq!(plan.kind(), StrategyKind::QuickSelect);
    let plan = KSelect::<f32>::new(&q, 2, 100, 8).unwrap();
    assert_eq!(plan.kind(), StrategyKind::Simd);
    assert_eq!(plan.simd_width(), Some(8));
}

#[test]
fn strategies_agree_on_ties() {
    let q = cpu_queue();
    let mut rng = StdRng::seed_from_u64(8);
    let data = random_matrix(&mut rng, 5, 200, 6);
    for k in [2, 16, 64, 128] {
        let mut results = Vec::new();
        for kind in [StrategyKind::Simd, StrategyKind::Heap, StrategyKind::QuickSelect] {
            let mut plan = KSelect::with_strategy(&q, 5, 200, k, kind).unwrap();
            results.push(run(&mut plan, &q, &data));
        }
        assert_eq!(results[0], results[1], "simd vs heap, k = {k}");
        assert_eq!(results[0], results[2], "simd vs quick-select, k = {k}");
    }
}

#[test]
fn single_column_matches_general_strategies() {
    let q = cpu_queue();
    let mut rng = StdRng::seed_from_u64(81);
    let data = random_matrix(&mut rng, 12, 77, 10);
    let mut single = KSelect::with_strategy(&q, 12, 77, 1, StrategyKind::SingleColumn).unwrap();
    let expected = run(&mut single, &q, &data);
    for kind in [StrategyKind::Simd, StrategyKind::Heap, StrategyKind::QuickSelect] {
        let mut plan = KSelect::with_strategy(&q, 12, 77, 1, kind).unwrap();
        assert_eq!(run(&mut plan, &q, &data), expected, "{kind}");
    }
}

#[test]
fn output_is_ascending_and_indices_point_at_values() {
    let q = narrow_queue(0);
    let mut rng = StdRng::seed_from_u64(4);
    let data = Array2::from_shape_fn((4, 513), |_| rng.gen_range(-1.0_f32..1.0));
    let mut plan = KSelect::new(&q, 4, 513, 250).unwrap();
    let (sel, idx) = run(&mut plan, &q, &data);
    for r in 0..4 {
        for c in 0..250 {
            assert_eq!(sel[[r, c]], data[[r, idx[[r, c]] as usize]]);
            if c > 0 {
                assert!(sel[[r, c - 1]] <= sel[[r, c]]);
            }
        }
    }
}

#[test]
fn repeated_calls_reuse_the_plan() {
    let q = narrow_queue(usize::MAX);
    let mut rng = StdRng::seed_from_u64(12);
    let mut plan = KSelect::new(&q, 3, 150, 60).unwrap();
    for _ in 0..4 {
        let data = random_matrix(&mut rng, 3, 150, 30);
        let got = run(&mut plan, &q, &data);
        assert_eq!(got, oracle(&data, 60));
    }
}

#[test]
fn pivot_seed_does_not_change_results() {
    let mut rng = StdRng::seed_from_u64(77);
    let data = random_matrix(&mut rng, 6, 400, 50);
    let caps = DeviceCaps::wgpu(8, true, 8).with_shared_mem(Some(64));
    let mut outputs = Vec::new();
    for seed in [1, 2, 3] {
        let q = queue_with(caps, seed, usize::MAX);
        let mut plan = KSelect::new(&q, 6, 400, 123).unwrap();
        outputs.push(run(&mut plan, &q, &data));
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}

#[test]
fn padded_rows_are_respected() {
    let q = cpu_queue();
    let (rows, cols, ld) = (3, 5, 8);
    let mut storage = vec![f32::NEG_INFINITY; rows * ld];
    let values = [
        [4.0, 2.0, 9.0, 2.0, 1.0],
        [0.0, 7.0, 3.0, -1.0, 5.0],
        [6.0, 6.0, 6.0, 6.0, 6.0],
    ];
    for (r, row) in values.iter().enumerate() {
        storage[r * ld..r * ld + cols].copy_from_slice(row);
    }
    let data = row_major_view(&storage, rows, cols, ld).unwrap();

    let mut sel_store = vec![0.0_f32; rows * 4];
    let mut idx_store = vec![-7i32; rows * 4];
    let sel = row_major_view_mut(&mut sel_store, rows, 2, 4).unwrap();
    let idx = row_major_view_mut(&mut idx_store, rows, 2, 4).unwrap();
    kselect(&q, data, 2, Some(sel), Some(idx)).unwrap();

    assert_eq!(&sel_store[0..2], &[1.0, 2.0]);
    assert_eq!(&idx_store[0..2], &[4, 1]);
    assert_eq!(&sel_store[4..6], &[-1.0, 0.0]);
    assert_eq!(&idx_store[4..6], &[3, 0]);
    assert_eq!(&idx_store[8..10], &[0, 1]);
    assert_eq!(&idx_store[2..4], &[-7, -7]);
}

#[test]
fn either_output_may_be_omitted() {
    let q = cpu_queue();
    let data = arr2(&[[5.0_f32, 3.0, 8.0, 1.0, 9.0, 2.0], [0.0, 0.0, -1.0, 4.0, 2.0, 2.0]]);
    let mut sel = Array2::<f32>::zeros((2, 2));
    kselect(&q, data.view(), 2, Some(sel.view_mut()), None).unwrap();
    assert_eq!(sel, arr2(&[[1.0, 2.0], [-1.0, 0.0]]));

    let mut idx = Array2::<i32>::zeros((2, 2));
    kselect(&q, data.view(), 2, None, Some(idx.view_mut())).unwrap();
    assert_eq!(idx, arr2(&[[3, 5], [2, 0]]));

    assert!(matches!(
        kselect::<f32>(&q, data.view(), 2, None, None),
        Err(Error::MissingOutput)
    ));
}

#[test]
fn sq_l2_matches_materialised_distances() {
    let q = cpu_queue();
    let mut rng = StdRng::seed_from_u64(31);
    let (rows, cols, k) = (7, 90, 5);
    let norms1 = Array1::from_shape_fn(rows, |_| rng.gen_range(0.0_f32..4.0));
    let norms2 = Array1::from_shape_fn(cols, |_| rng.gen_range(0.0_f32..4.0));
    let ip = Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-4.0_f32..0.0));
    let dist = Array2::from_shape_fn((rows, cols), |(r, c)| norms1[r] + norms2[c] + ip[[r, c]]);

    let mut sel = Array2::<f32>::zeros((rows, k));
    let mut idx = Array2::<i32>::zeros((rows, k));
    let kind = kselect_sq_l2(
        &q,
        norms1.view(),
        norms2.view(),
        ip.view(),
        k,
        Some(sel.view_mut()),
        Some(idx.view_mut()),
    )
    .unwrap();
    assert_eq!(kind, StrategyKind::Simd);

    let (want_sel, want_idx) = oracle(&dist, k);
    assert_eq!(idx, want_idx);
    for (got, want) in sel.iter().zip(want_sel.iter()) {
        assert_relative_eq!(*got, *want, epsilon = 1e-6);
    }
}

#[test]
fn largest_order_selects_top_scores() {
    let q = narrow_queue(usize::MAX);
    let mut rng = StdRng::seed_from_u64(90);
    let data = random_matrix(&mut rng, 4, 64, 12);
    let negated = data.mapv(|v| -v);
    let (want_neg, want_idx) = oracle(&negated, 20);
    let mut plan = KSelect::new(&q, 4, 64, 20).unwrap().with_order(SelectOrder::Largest);
    let (sel, idx) = run(&mut plan, &q, &data);
    assert_eq!(idx, want_idx);
    assert_eq!(sel, want_neg.mapv(|v| -v));
}

#[test]
fn nan_sorts_after_every_number() {
    let q = cpu_queue();
    let data = arr2(&[[f32::NAN, 1.0, f32::INFINITY, -0.0, 0.0]]);
    let mut idx = Array2::<i32>::zeros((1, 5));
    kselect(&q, data.view(), 5, None, Some(idx.view_mut())).unwrap();
    assert_eq!(idx, arr2(&[[3, 4, 1, 2, 0]]));
}

#[test]
fn contract_violations_are_errors() {
    let q = cpu_queue();
    assert!(matches!(
        KSelect::<f32>::new(&q, 2, 4, 0),
        Err(Error::InvalidK { k: 0, cols: 4 })
    ));
    assert!(matches!(
        KSelect::<f32>::new(&q, 2, 4, 5),
        Err(Error::InvalidK { k: 5, cols: 4 })
    ));
    assert!(matches!(
        choose_strategy(&DeviceCaps::cpu(), i32::MAX as usize + 1, 1, 4),
        Err(Error::Domain(_))
    ));
}

#[test]
fn f64_rows_are_supported() {
    let q = cpu_queue();
    let data = arr2(&[[0.5_f64, -2.5, 3.25, -2.5], [1.0, 1.0, 1.0, 0.0]]);
    let mut sel = Array2::<f64>::zeros((2, 3));
    let mut idx = Array2::<i32>::zeros((2, 3));
    kselect(&q, data.view(), 3, Some(sel.view_mut()), Some(idx.view_mut())).unwrap();
    assert_eq!(sel, arr2(&[[-2.5, -2.5, 0.5], [0.0, 1.0, 1.0]]));
    assert_eq!(idx, arr2(&[[1, 3, 0], [3, 0, 1]]));
}
