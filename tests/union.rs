use qdigest::{Error, QDigest};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn digest(compression: f64, values: &[u64]) -> QDigest {
    let mut digest = QDigest::new(compression);
    digest.extend(values);
    digest
}

#[test]
fn disjoint_streams() {
    let a = digest(5.0, &[0, 1, 2]);
    let b = digest(5.0, &[100, 101, 102]);

    let c = QDigest::union_of(&a, &b).unwrap();

    assert_eq!(c.len(), 6);
    assert_eq!(c.log_capacity(), 7);
    assert_eq!(c.quantile(0.0), Some(1));
    // The lone 102 is folded up to the node covering 64..=127.
    let last = *c.ascending_ranges().last().unwrap();
    assert!(last.left <= 100 && last.right >= 102, "{last:?}");
    assert_eq!(c.quantile(1.0), Some(last.right));

    // Inputs are left untouched.
    assert_eq!(a, digest(5.0, &[0, 1, 2]));
    assert_eq!(b.len(), 3);
}

#[test]
fn compression_mismatch() {
    let a = digest(5.0, &[1]);
    let b = digest(6.5, &[2]);

    let err = QDigest::union_of(&a, &b).unwrap_err();
    assert_eq!(
        err,
        Error::CompressionMismatch {
            left: 5.0,
            right: 6.5
        }
    );
    assert_eq!(
        err.to_string(),
        "compression factors must be the same: left is 5, right is 6.5"
    );
}

#[test]
fn commutative() {
    let mut rng = StdRng::seed_from_u64(3);
    let a: Vec<u64> = (0..2_000).map(|_| rng.gen_range(0..500)).collect();
    let b: Vec<u64> = (0..3_000).map(|_| rng.gen_range(0..1 << 24)).collect();
    let a = digest(20.0, &a);
    let b = digest(20.0, &b);

    let ab = QDigest::union_of(&a, &b).unwrap();
    let ba = QDigest::union_of(&b, &a).unwrap();

    assert_eq!(ab.len(), 5_000);
    assert_eq!(ab.ascending_ranges(), ba.ascending_ranges());
}

#[test]
fn empty_side() {
    let a = digest(10.0, &[]);
    let b = digest(10.0, &[3, 1_000, 70]);

    let ab = QDigest::union_of(&a, &b).unwrap();
    let ba = QDigest::union_of(&b, &a).unwrap();

    assert_eq!(ab.len(), 3);
    assert_eq!(ab.ascending_ranges(), b.ascending_ranges());
    assert_eq!(ba.ascending_ranges(), b.ascending_ranges());
    assert!(QDigest::union_of(&a, &a).unwrap().is_empty());
}

#[test]
fn matches_single_stream() {
    let compression = 200.0;
    let mut rng = StdRng::seed_from_u64(11);
    let left: Vec<u64> = (0..10_000).map(|_| rng.gen_range(0..100_000)).collect();
    let right: Vec<u64> = (0..10_000).map(|_| rng.gen_range(50_000..1_000_000)).collect();

    let union = QDigest::union_of(&digest(compression, &left), &digest(compression, &right)).unwrap();
    let mut all = left.clone();
    all.extend(&right);
    let whole = digest(compression, &all);

    let total = |d: &QDigest| d.ascending_ranges().iter().map(|r| r.count).sum::<u64>();
    assert_eq!(union.len(), whole.len());
    assert_eq!(total(&union), total(&whole));

    all.sort_unstable();
    let height = (u64::BITS - all.last().unwrap().leading_zeros()) as f64;
    let bound = 2. * height / compression * all.len() as f64;
    for level in [0.01, 0.1, 0.25, 0.5, 0.75, 0.9, 0.99] {
        let u = union.quantile(level).unwrap();
        let w = whole.quantile(level).unwrap();
        let rank = |value: u64| all.partition_point(|&x| x <= value) as f64;
        assert!(
            (rank(u) - rank(w)).abs() <= bound,
            "quantile {level}: {u} vs {w}"
        );
    }
}

#[test]
fn merge_in_place() {
    let mut merged = QDigest::new(10.0);
    let mut parts = Vec::new();
    for part in 0..8u64 {
        let values: Vec<u64> = (0..250).map(|i| part * 1_000 + i * 3).collect();
        parts.push(digest(10.0, &values));
    }
    for part in &parts {
        merged.merge(part).unwrap();
    }

    assert_eq!(merged.len(), 2_000);
    assert_eq!(
        merged.ascending_ranges().iter().map(|r| r.count).sum::<u64>(),
        2_000
    );
    assert!(merged.node_count() as f64 <= 3. * merged.compression());

    let folded = parts
        .iter()
        .try_fold(QDigest::new(10.0), |acc, part| QDigest::union_of(&acc, part))
        .unwrap();
    assert_eq!(folded.ascending_ranges(), merged.ascending_ranges());
}

#[test]
#[should_panic(expected = "observed count overflows u64")]
fn merge_count_overflow() {
    let mut a = QDigest::new(10.0);
    a.insert_many(1, u64::MAX - 1);
    let b = digest(10.0, &[2, 3]);
    let _ = a.merge(&b);
}
