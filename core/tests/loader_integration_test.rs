use fleet_rs::data::{
    DataLoader, DistributedSampler, GeneratorLoader, LoaderConfig, Phase, ShardExt,
    ShardedGenerator, TailPolicy, num_batches,
};
use fleet_rs::distributed::{CpuBackend, MetricPair};
use fleet_rs::{CollectiveBackend, WorkerInfo};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

const SAMPLES: usize = 10;
const WORLD_SIZE: usize = 3;

/// One sample per file: `sample_00.txt` .. `sample_09.txt`.
fn write_one_per_file(dir: &Path) -> Vec<PathBuf> {
    (0..SAMPLES)
        .map(|i| {
            let path = dir.join(format!("sample_{i:02}.txt"));
            fs::write(&path, format!("{i}\n")).unwrap();
            path
        })
        .collect()
}

/// Several samples per file: `files` files of `per_file` lines each.
fn write_many_per_file(dir: &Path, files: usize, per_file: usize) -> Vec<PathBuf> {
    (0..files)
        .map(|f| {
            let path = dir.join(format!("part_{f}.txt"));
            let body: String = (0..per_file)
                .map(|j| format!("{}\n", f * per_file + j))
                .collect();
            fs::write(&path, body).unwrap();
            path
        })
        .collect()
}

fn parse_lines(path: &Path) -> Vec<u32> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.trim().parse().unwrap())
        .collect()
}

#[test]
fn test_one_sample_per_file_train_batches_are_uneven() {
    let dir = TempDir::new().unwrap();
    let files = write_one_per_file(dir.path());

    let counts: Vec<usize> = WorkerInfo::group(WORLD_SIZE)
        .unwrap()
        .into_iter()
        .map(|worker| {
            let shard = ShardedGenerator::new(|| files.iter(), worker);
            let loader = GeneratorLoader::new(shard, 2).unwrap();
            assert!(loader.drops_last());
            loader.iter().count()
        })
        .collect();

    // 4, 3, 3 samples per rank: drop_last alone does not line the ranks up.
    assert_eq!(counts, vec![2, 1, 1]);
}

#[test]
fn test_drop_uneven_equalizes_batch_counts() {
    let dir = TempDir::new().unwrap();
    let files = write_one_per_file(dir.path());

    for worker in WorkerInfo::group(WORLD_SIZE).unwrap() {
        let shard = ShardedGenerator::new(|| files.iter(), worker)
            .with_tail_policy(TailPolicy::DropUneven);
        let loader = GeneratorLoader::new(shard, 2).unwrap();
        assert_eq!(loader.iter().count(), 1);
    }

    for worker in WorkerInfo::group(WORLD_SIZE).unwrap() {
        let loader = DataLoader::new((0..SAMPLES).collect::<Vec<_>>(), 2)
            .unwrap()
            .with_sampler(DistributedSampler::new(worker).drop_uneven(true))
            .phase(Phase::Train);
        assert_eq!(loader.len(), num_batches(3, 2, true));
        assert_eq!(loader.iter().count(), 1);
    }
}

#[test]
fn test_many_samples_per_file_shards_the_file_list() {
    let dir = TempDir::new().unwrap();
    let files = write_many_per_file(dir.path(), 4, 5);

    let per_rank: Vec<Vec<u32>> = WorkerInfo::group(2)
        .unwrap()
        .into_iter()
        .map(|worker| {
            let my_files = ShardedGenerator::new(|| files.iter(), worker);
            my_files.iter().flat_map(|p| parse_lines(p)).collect()
        })
        .collect();

    assert_eq!(per_rank[0], (0..5).chain(10..15).collect::<Vec<_>>());
    assert_eq!(per_rank[1], (5..10).chain(15..20).collect::<Vec<_>>());
}

#[test]
fn test_whole_dataset_parsed_then_sharded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("all.txt");
    let body: String = (0..SAMPLES).map(|i| format!("{i}\n")).collect();
    fs::write(&path, body).unwrap();

    let mut seen = Vec::new();
    for worker in WorkerInfo::group(WORLD_SIZE).unwrap() {
        let shard = ShardedGenerator::new(|| parse_lines(&path), worker);
        let loader =
            GeneratorLoader::from_config(shard, LoaderConfig::new(4).phase(Phase::Eval)).unwrap();
        for batch in loader.iter() {
            assert!(batch.iter().all(|&x| worker.owns(x as usize)));
            seen.extend(batch);
        }
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..SAMPLES as u32).collect::<Vec<_>>());
}

#[test]
fn test_training_loop_with_per_batch_all_reduce() {
    let dir = TempDir::new().unwrap();
    let files = write_one_per_file(dir.path());

    let results: Vec<(usize, f64)> = thread::scope(|s| {
        let handles: Vec<_> = CpuBackend::ring(WORLD_SIZE)
            .unwrap()
            .into_iter()
            .map(|backend| {
                let files = &files;
                s.spawn(move || {
                    let shard = ShardedGenerator::new(|| files.iter(), backend.worker())
                        .with_tail_policy(TailPolicy::DropUneven);
                    let loader = GeneratorLoader::new(shard, 1).unwrap();

                    let mut steps = 0;
                    let mut total = 0.0;
                    for batch in loader.iter() {
                        let local: f64 = batch.iter().map(|p| parse_lines(p)[0] as f64).sum();
                        total += backend.all_reduce_sum(&[local]).unwrap()[0];
                        steps += 1;
                    }
                    (steps, total)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Sample 9 is dropped; every rank saw the same three global steps.
    for (steps, total) in results {
        assert_eq!(steps, 3);
        assert_eq!(total, (0..9).sum::<u32>() as f64);
    }
}

#[test]
fn test_eval_keeps_every_sample_in_the_metric() {
    let results: Vec<MetricPair<f64>> = thread::scope(|s| {
        let handles: Vec<_> = CpuBackend::ring(WORLD_SIZE)
            .unwrap()
            .into_iter()
            .map(|backend| {
                s.spawn(move || {
                    let shard = ShardedGenerator::new(|| 0..SAMPLES, backend.worker());
                    let loader = GeneratorLoader::new(shard, 2).unwrap().phase(Phase::Eval);

                    let mut local = MetricPair::zeros(1);
                    for batch in loader.iter() {
                        let even = batch.iter().filter(|&&x| x % 2 == 0).count();
                        local
                            .accumulate(&MetricPair::scalar(even as f64, batch.len() as f64))
                            .unwrap();
                    }
                    local.all_reduce(&backend).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for reduced in results {
        assert_eq!(reduced.denominator(), &[SAMPLES as f64]);
        assert_eq!(reduced.numerator(), &[5.0]);
        assert_eq!(reduced.scalar_ratio(), Some(0.5));
    }
}

#[test]
fn test_shard_then_batch_by_hand() {
    let worker = WorkerInfo::new(2, WORLD_SIZE).unwrap();
    let batches: Vec<Vec<usize>> = (0..SAMPLES)
        .shard(worker)
        .collect::<Vec<_>>()
        .chunks(2)
        .map(<[usize]>::to_vec)
        .collect();
    assert_eq!(batches, vec![vec![2, 5], vec![8]]);
}
