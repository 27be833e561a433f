use braid::Braid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn split_on_exact_block_boundaries() {
    for &at in &[32usize, 64, 1024, 2048] {
        let mut braid: Braid<u32> = (0..4100).collect();
        let right = braid.split_off(at);
        braid.debug_validate();
        right.debug_validate();
        assert_eq!(braid.to_vec(), (0..at as u32).collect::<Vec<_>>());
        assert_eq!(right.to_vec(), (at as u32..4100).collect::<Vec<_>>());
    }
}

#[test]
fn random_split_and_rejoin_reproduces_the_sequence() {
    let mut rng = StdRng::seed_from_u64(7);
    let original: Vec<u32> = (0..3000).collect();
    for _ in 0..40 {
        let at = rng.gen_range(0..=original.len());
        let mut braid: Braid<u32> = original.iter().copied().collect();
        let right = braid.split_off(at);
        braid.append(right);
        braid.debug_validate();
        assert_eq!(braid.to_vec(), original, "split at {at}");
    }
}

#[test]
fn random_range_removals_match_a_vec() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut braid: Braid<u32> = (0..5000).collect();
    let mut model: Vec<u32> = (0..5000).collect();
    while !model.is_empty() {
        let a = rng.gen_range(0..=model.len());
        let b = rng.gen_range(0..=model.len());
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        braid.remove_range(from..to);
        model.drain(from..to);
        braid.debug_validate();
        assert_eq!(braid.to_vec(), model);
        if from == to {
            // Avoid spinning on empty ranges.
            if !model.is_empty() {
                braid.remove(0);
                model.remove(0);
            }
        }
    }
    assert!(braid.is_empty());
}

#[test]
fn removing_the_sole_element() {
    let mut braid: Braid<u32> = std::iter::once(7).collect();
    braid.remove_range(0..1);
    assert!(braid.is_empty());
    braid.debug_validate();
}

#[test]
fn fork_range_on_block_boundaries() {
    let mut braid: Braid<u32> = (0..4100).collect();
    for &(from, to) in &[(0usize, 32usize), (32, 64), (0, 2048), (1024, 4100), (4095, 4100)] {
        let sub = braid.fork_range(from..to);
        sub.debug_validate();
        assert_eq!(sub.to_vec(), (from as u32..to as u32).collect::<Vec<_>>());
    }
    assert_eq!(braid.to_vec(), (0..4100).collect::<Vec<_>>());
    braid.debug_validate();
}

#[test]
fn sub_range_forks_stay_independent() {
    let mut braid: Braid<u32> = (0..2000).collect();
    let mut sub = braid.fork_range(500..1500);
    sub.set(0, 9999);
    sub.push_back(1);
    braid.set(500, 1111);
    assert_eq!(sub[0], 9999);
    assert_eq!(braid[500], 1111);
    assert_eq!(sub.len(), 1001);
    assert_eq!(braid.len(), 2000);
    braid.debug_validate();
    sub.debug_validate();
}

#[test]
fn truncate_to_every_block_boundary() {
    for &at in &[4096usize, 1056, 1024, 33, 32, 31, 1, 0] {
        let mut braid: Braid<u32> = (0..4100).collect();
        braid.truncate(at);
        braid.debug_validate();
        assert_eq!(braid.to_vec(), (0..at as u32).collect::<Vec<_>>());
    }
}
