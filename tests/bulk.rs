use braid::Braid;

#[test]
fn seeded_bulk_append_is_fully_addressable() {
    let mut c: Braid<u32> = (1..=5).collect();
    c.extend(6..=260);
    c.debug_validate();
    assert_eq!(c.len(), 260);
    for i in 0..260usize {
        assert_eq!(c[i], i as u32 + 1);
    }
}

#[test]
fn bulk_sizes_around_block_powers() {
    // Exactly filling, exceeding by one, and exceeding by a full block
    // power minus one, for each tree height.
    for &n in &[
        31u32, 32, 33, 63, 1023, 1024, 1025, 2047, 32767, 32768, 32769, 65535,
    ] {
        let braid: Braid<u32> = (0..n).collect();
        braid.debug_validate();
        assert_eq!(braid.len(), n as usize);
        assert_eq!(braid[0], 0);
        assert_eq!(braid[n as usize - 1], n - 1);
        let total: u64 = braid.iter().map(|&v| u64::from(v)).sum();
        assert_eq!(total, (0..u64::from(n)).sum::<u64>());
    }
}

#[test]
fn hundred_thousand_elements_round_trip() {
    let braid: Braid<u64> = (0..100_000).collect();
    braid.debug_validate();
    assert_eq!(braid.len(), 100_000);
    for i in (0..100_000usize).step_by(997) {
        assert_eq!(braid[i], i as u64);
    }
    let back: Vec<u64> = braid.into_iter().collect();
    assert_eq!(back, (0..100_000).collect::<Vec<_>>());
}

#[test]
fn large_insert_all_into_a_deep_tree() {
    let mut braid: Braid<u32> = (0..50_000).collect();
    braid.insert_all(25_000, 900_000..903_000);
    braid.debug_validate();
    assert_eq!(braid.len(), 53_000);
    assert_eq!(braid[24_999], 24_999);
    assert_eq!(braid[25_000], 900_000);
    assert_eq!(braid[27_999], 902_999);
    assert_eq!(braid[28_000], 25_000);
}

#[test]
fn retain_halves_a_large_sequence() {
    let mut braid: Braid<u32> = (1..=10_000).collect();
    braid.retain(|value| value % 2 == 1);
    braid.debug_validate();
    assert_eq!(braid.len(), 5_000);
    assert_eq!(braid[0], 1);
    assert_eq!(braid[4_999], 9_999);
}

#[test]
fn repeated_joins_stack_up() {
    let block: Braid<u32> = (0..1000).collect();
    let mut joined = Braid::new();
    for _ in 0..50 {
        joined.append(block.clone());
        joined.debug_validate();
    }
    assert_eq!(joined.len(), 50_000);
    for chunk in 0..50usize {
        assert_eq!(joined[chunk * 1000], 0);
        assert_eq!(joined[chunk * 1000 + 999], 999);
    }
}

#[test]
fn alternating_push_and_bulk_keeps_invariants() {
    let mut braid: Braid<u32> = Braid::new();
    let mut expected: Vec<u32> = Vec::new();
    for round in 0..30u32 {
        for i in 0..17 {
            braid.push_back(round * 1000 + i);
            expected.push(round * 1000 + i);
        }
        braid.extend(round * 1000 + 100..round * 1000 + 171);
        expected.extend(round * 1000 + 100..round * 1000 + 171);
        braid.debug_validate();
    }
    assert_eq!(braid.to_vec(), expected);
}
