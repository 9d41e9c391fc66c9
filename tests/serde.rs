#![cfg(feature = "serde")]

use qdigest::QDigest;

#[test]
fn serialize() {
    let mut digest = QDigest::new(100.0);
    digest.extend([1, 2, 3]);
    let serialized = serde_json::to_string(&digest).unwrap();
    assert_eq!(serialized, "[100.0,2,3,[[5,1],[6,1],[7,1]]]");
}

#[test]
fn deserialize() {
    let digest: QDigest = serde_json::from_str("[100.0,2,3,[[5,1],[6,1],[7,1]]]").unwrap();
    assert_eq!(digest.len(), 3);
    assert_eq!(digest.log_capacity(), 2);
    assert_eq!(digest.quantile(0.0), Some(2));
    assert_eq!(digest.quantile(1.0), Some(3));
}

#[test]
fn round_trip() {
    let mut digest = QDigest::new(7.5);
    digest.extend((0..5_000).map(|i| (i * 7_919) % 100_003));
    let serialized = serde_json::to_string(&digest).unwrap();
    let deserialized: QDigest = serde_json::from_str(&serialized).unwrap();
    assert_eq!(deserialized, digest);

    // Both keep evolving the same way.
    let (mut a, mut b) = (digest, deserialized);
    a.insert(1 << 40);
    b.insert(1 << 40);
    assert_eq!(a, b);
}

#[test]
fn deserialize_invalid() {
    for (input, message) in [
        ("[0.0,2,1,[[5,1]]]", "compression factor must be finite and positive"),
        ("[10.0,65,1,[[5,1]]]", "log capacity 65 exceeds 64"),
        ("[10.0,2,1,[[8,1]]]", "node 8 is outside a tree of height 2"),
        ("[10.0,2,1,[[0,1]]]", "node 0 is outside a tree of height 2"),
        ("[10.0,2,1,[[5,0],[6,1]]]", "node 5 has a zero count"),
        ("[10.0,2,3,[[5,1],[6,1]]]", "node counts sum up to 2, expected 3"),
    ] {
        let err = serde_json::from_str::<QDigest>(input).unwrap_err();
        assert!(
            err.to_string().contains(message),
            "{input}: {err}"
        );
    }
}
