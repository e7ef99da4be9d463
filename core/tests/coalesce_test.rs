use fleet_rs::distributed::{CoalesceBuilder, CpuBackend, FusedBuffer};
use std::thread;

/// Gradients a rank would produce for a tiny two-layer model.
fn gradients(rank: usize) -> FusedBuffer<f32> {
    let r = rank as f32;
    let mut builder = CoalesceBuilder::new().with_alignment(4);
    builder
        .add("fc1.w@GRAD", &[2, 3], &[r; 6])
        .unwrap()
        .add("fc1.b@GRAD", &[3], &[1.0, 2.0, 3.0])
        .unwrap()
        .add("fc2.w@GRAD", &[3, 1], &[r * 2.0; 3])
        .unwrap();
    builder.build()
}

#[test]
fn test_layout_is_identical_across_ranks() {
    let a = gradients(0);
    let b = gradients(5);
    assert_eq!(a.slots(), b.slots());
    assert_eq!(a.len(), 15);
    assert_eq!(a.slot("fc1.b@GRAD").unwrap().offset, 8);
    assert_eq!(a.slot("fc2.w@GRAD").unwrap().offset, 12);
}

#[test]
fn test_fused_all_reduce_mean() {
    let world_size = 4;
    let handles: Vec<_> = CpuBackend::ring(world_size)
        .unwrap()
        .into_iter()
        .map(|backend| {
            thread::spawn(move || {
                let mut fused = gradients(backend.worker().rank());
                fused.all_reduce_mean(&backend).unwrap();
                fused
            })
        })
        .collect();

    for handle in handles {
        let fused = handle.join().unwrap();
        // Mean of ranks 0..4 is 1.5.
        assert_eq!(fused.get("fc1.w@GRAD").unwrap(), &[1.5; 6]);
        assert_eq!(fused.get("fc1.b@GRAD").unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(fused.get("fc2.w@GRAD").unwrap(), &[3.0; 3]);
        // Padding stays zero.
        assert_eq!(&fused.data()[6..8], &[0.0, 0.0]);
    }
}

#[test]
fn test_fused_all_reduce_sum_then_split() {
    let handles: Vec<_> = CpuBackend::ring(2)
        .unwrap()
        .into_iter()
        .map(|backend| {
            thread::spawn(move || {
                let mut fused = gradients(backend.worker().rank());
                fused.all_reduce_sum(&backend).unwrap();
                fused.split()
            })
        })
        .collect();

    for handle in handles {
        let split = handle.join().unwrap();
        let names: Vec<&str> = split.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["fc1.w@GRAD", "fc1.b@GRAD", "fc2.w@GRAD"]);
        assert_eq!(split[0].1, vec![2, 3]);
        assert_eq!(split[0].2, vec![1.0; 6]);
        assert_eq!(split[1].2, vec![2.0, 4.0, 6.0]);
        assert_eq!(split[2].2, vec![2.0; 3]);
    }
}

#[test]
fn test_renames_cover_every_gradient() {
    let fused = gradients(0);
    let renames: Vec<(&str, &str)> = fused.renames().collect();
    assert_eq!(
        renames,
        vec![
            ("fc1.w@GRAD", "output_fc1.w@GRAD"),
            ("fc1.b@GRAD", "output_fc1.b@GRAD"),
            ("fc2.w@GRAD", "output_fc2.w@GRAD"),
        ]
    );
}
