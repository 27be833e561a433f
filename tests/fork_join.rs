use braid::Braid;

#[test]
fn fork_keeps_the_snapshot_stable() {
    let mut log: Braid<u32> = (1..=10).collect();
    let snapshot = log.fork();
    log.push_back(11);
    assert_eq!(log.to_vec(), (1..=11).collect::<Vec<_>>());
    assert_eq!(snapshot.to_vec(), (1..=10).collect::<Vec<_>>());
    log.debug_validate();
    snapshot.debug_validate();
}

#[test]
fn join_a_sublist_of_another_container() {
    let a: Braid<u32> = (1..=10).collect();
    let mut b: Braid<u32> = (11..=20).collect();
    let s = a.slice(3..7);
    assert_eq!(s.to_vec(), vec![4, 5, 6, 7]);
    b.append(s.to_braid());
    assert_eq!(
        b.to_vec(),
        (11..=20).chain(4..=7).collect::<Vec<_>>()
    );
    assert_eq!(a.to_vec(), (1..=10).collect::<Vec<_>>());
    b.debug_validate();
}

#[test]
fn interior_insert_keeps_the_tree_balanced() {
    let mut c: Braid<u32> = (1..=1057).collect();
    c.insert(5, 99);
    c.debug_validate();
    let mut expected: Vec<u32> = (1..=1057).collect();
    expected.insert(5, 99);
    assert_eq!(c.to_vec(), expected);
}

#[test]
fn join_at_an_index_matches_the_flat_equivalent() {
    for &at in &[0usize, 1, 31, 32, 33, 500, 999, 1000] {
        let mut a: Braid<u32> = (0..1000).collect();
        let b: Braid<u32> = (5000..5100).collect();
        a.splice(at, b);
        a.debug_validate();
        let expected: Vec<u32> = (0..at as u32)
            .chain(5000..5100)
            .chain(at as u32..1000)
            .collect();
        assert_eq!(a.to_vec(), expected, "join at {at}");
    }
}

#[test]
fn joining_an_empty_container_is_identity() {
    let mut a: Braid<u32> = (0..500).collect();
    a.append(Braid::new());
    assert_eq!(a.len(), 500);

    let mut empty: Braid<u32> = Braid::new();
    let b: Braid<u32> = (0..500).collect();
    empty.append(b);
    assert_eq!(empty.to_vec(), (0..500).collect::<Vec<_>>());
    empty.debug_validate();
}

#[test]
fn fork_of_a_fork_is_sequence_equal() {
    let mut a: Braid<u32> = (0..321).collect();
    let mut once = a.fork();
    let twice = once.fork();
    assert_eq!(a, twice);
    // All three stay independently mutable.
    a.push_back(1);
    once.push_back(2);
    assert_eq!(a.len(), 322);
    assert_eq!(once.len(), 322);
    assert_eq!(twice.len(), 321);
}

#[test]
fn forked_sides_diverge_without_interference() {
    let mut a: Braid<u64> = (0..4096).collect();
    let mut b = a.fork();
    for i in 0..64 {
        a.set(i * 64, 0);
        b.remove(0);
    }
    assert_eq!(a.len(), 4096);
    assert_eq!(b.len(), 4096 - 64);
    assert_eq!(b[0], 64);
    a.debug_validate();
    b.debug_validate();
}
