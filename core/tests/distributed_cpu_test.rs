use fleet_rs::FleetError;
use fleet_rs::distributed::{CollectiveBackend, CpuBackend};
use std::thread;

/// Runs `f` once per rank of a fresh ring, each on its own thread.
fn run_ring<F, R>(world_size: usize, f: F) -> Vec<R>
where
    F: Fn(CpuBackend) -> R + Send + Sync + Clone + 'static,
    R: Send + 'static,
{
    let handles: Vec<_> = CpuBackend::ring(world_size)
        .unwrap()
        .into_iter()
        .map(|backend| {
            let f = f.clone();
            thread::spawn(move || f(backend))
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_ring_all_reduce_cpu() {
    // Rank 0 has 1s, Rank 1 has 2s, etc.
    // Sum should be 1+2+3+4 = 10.
    let results = run_ring(4, |backend| {
        let data = vec![(backend.rank() + 1) as f32; 8];
        backend.all_reduce_sum(&data).unwrap()
    });

    for (rank, result) in results.iter().enumerate() {
        for &val in result {
            assert!(
                (val - 10.0).abs() < 1e-5,
                "Rank {}: Expected {}, got {}",
                rank,
                10.0,
                val
            );
        }
    }
}

#[test]
fn test_ring_all_reduce_uneven_chunks() {
    // 7 elements over 3 ranks: chunks of 3, 3, 1.
    for world_size in 1..=5 {
        let results = run_ring(world_size, |backend| {
            let rank = backend.rank() as i64;
            let data: Vec<i64> = (0..7).map(|i| i * 10 + rank).collect();
            backend.all_reduce_sum(&data).unwrap()
        });

        let ranks: i64 = (0..world_size as i64).sum();
        let expected: Vec<i64> = (0..7)
            .map(|i| i * 10 * world_size as i64 + ranks)
            .collect();
        for result in results {
            assert_eq!(result, expected);
        }
    }
}

#[test]
fn test_ring_all_reduce_fewer_elements_than_ranks() {
    let results = run_ring(5, |backend| backend.all_reduce_sum(&[1.0f64, 2.0]).unwrap());
    for result in results {
        assert_eq!(result, vec![5.0, 10.0]);
    }
}

#[test]
fn test_ring_all_reduce_mean() {
    let results = run_ring(4, |backend| {
        let data = vec![backend.rank() as f64; 3];
        backend.all_reduce_mean(&data).unwrap()
    });
    for result in results {
        assert_eq!(result, vec![1.5, 1.5, 1.5]);
    }
}

#[test]
fn test_repeated_collectives_stay_in_lockstep() {
    let results = run_ring(3, |backend| {
        (1..=4)
            .map(|round| {
                let v = (backend.rank() * round) as f32;
                backend.all_reduce_sum(&[v]).unwrap()[0]
            })
            .collect::<Vec<f32>>()
    });
    for result in results {
        assert_eq!(result, vec![3.0, 6.0, 9.0, 12.0]);
    }
}

#[test]
fn test_cpu_backend_properties() {
    let backends = CpuBackend::ring(4).unwrap();
    assert_eq!(backends[2].rank(), 2);
    assert_eq!(backends[2].world_size(), 4);
}

#[test]
fn test_peer_gone_surfaces_as_error() {
    let mut backends = CpuBackend::ring(3).unwrap();
    let rank0 = backends.remove(0);
    drop(backends);
    assert!(matches!(
        rank0.all_reduce_sum(&[1u32, 2, 3]),
        Err(FleetError::Communication(_))
    ));
}

#[test]
fn test_length_mismatch_fails_on_every_rank() {
    let results = run_ring(3, |backend| {
        let len = if backend.rank() == 1 { 1 } else { 3 };
        let first = backend.all_reduce_sum(&vec![1.0f64; len]);
        // The ring is still usable afterwards.
        let second = backend.all_reduce_sum(&[1.0f64]).unwrap();
        (first, second)
    });
    for (first, second) in results {
        assert!(matches!(first, Err(FleetError::ShapeMismatch { .. })));
        assert_eq!(second, vec![3.0]);
    }
}

#[test]
fn test_large_integers_sum_exactly() {
    let big: i64 = (1 << 53) + 1;
    let results = run_ring(2, move |backend| backend.all_reduce_sum(&[big, -big, 7]).unwrap());
    for result in results {
        assert_eq!(result, vec![2 * big, -2 * big, 14]);
    }

    let results = run_ring(3, |backend| {
        backend.all_reduce_sum(&[u64::MAX / 4]).unwrap()
    });
    for result in results {
        assert_eq!(result, vec![3 * (u64::MAX / 4)]);
    }
}
