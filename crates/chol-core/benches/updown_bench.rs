use chol_core::{ldl, SparseMatrix, UpdownEngine};
use criterion::{criterion_group, criterion_main, Criterion};

/// Upper triangle of a banded SPD matrix (bandwidth 2).
fn banded_upper(n: usize) -> SparseMatrix {
    let mut t = Vec::new();
    for j in 0..n {
        if j >= 2 {
            t.push((j - 2, j, -0.5));
        }
        if j >= 1 {
            t.push((j - 1, j, -1.0));
        }
        t.push((j, j, 6.0));
    }
    SparseMatrix::from_triplets(n, n, &t).unwrap()
}

fn rank_k_update(crit: &mut Criterion, n: usize, k: usize) {
    let a = banded_upper(n);
    let base = ldl::factorize(&a).unwrap();
    let mut triplets = Vec::new();
    for col in 0..k {
        let r0 = (col * 7) % (n / 2);
        triplets.push((r0, col, 0.3));
        triplets.push((r0 + 1, col, 0.2));
    }
    let c = SparseMatrix::from_triplets(n, k, &triplets).unwrap();

    let mut engine = UpdownEngine::new(n);
    crit.bench_function(&format!("update_n{}_rank{}", n, k), |b| {
        b.iter(|| {
            let mut l = base.clone();
            engine.update(&c, &mut l).unwrap();
            engine.downdate(&c, &mut l).unwrap();
            l
        })
    });
}

fn bench_updates(crit: &mut Criterion) {
    rank_k_update(crit, 500, 1);
    rank_k_update(crit, 500, 4);
    rank_k_update(crit, 500, 8);
    rank_k_update(crit, 2000, 4);
}

criterion_group!(benches, bench_updates);
criterion_main!(benches);
