//! Model-based checks against an independent relaxed-radix vector
//! implementation (`im::Vector`) and the braid strategy module.

use braid::Braid;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    PushBack(u32),
    PopBack,
    Insert(usize, u32),
    Remove(usize),
    Set(usize, u32),
    Append(Vec<u32>),
    SplitOffAndAppendBack(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u32>().prop_map(Op::PushBack),
        Just(Op::PopBack),
        (any::<usize>(), any::<u32>()).prop_map(|(i, v)| Op::Insert(i, v)),
        any::<usize>().prop_map(Op::Remove),
        (any::<usize>(), any::<u32>()).prop_map(|(i, v)| Op::Set(i, v)),
        prop::collection::vec(any::<u32>(), 0..100).prop_map(Op::Append),
        any::<usize>().prop_map(Op::SplitOffAndAppendBack),
    ]
}

fn apply(op: Op, braid: &mut Braid<u32>, oracle: &mut im::Vector<u32>) {
    match op {
        Op::PushBack(value) => {
            braid.push_back(value);
            oracle.push_back(value);
        }
        Op::PopBack => {
            assert_eq!(braid.pop_back(), oracle.pop_back());
        }
        Op::Insert(at, value) => {
            let at = at % (oracle.len() + 1);
            braid.insert(at, value);
            oracle.insert(at, value);
        }
        Op::Remove(at) => {
            if !oracle.is_empty() {
                let at = at % oracle.len();
                assert_eq!(braid.remove(at), oracle.remove(at));
            }
        }
        Op::Set(at, value) => {
            if !oracle.is_empty() {
                let at = at % oracle.len();
                assert_eq!(braid.set(at, value), oracle.set(at, value));
            }
        }
        Op::Append(values) => {
            braid.append(values.iter().copied().collect());
            oracle.append(values.into_iter().collect());
        }
        Op::SplitOffAndAppendBack(at) => {
            let at = at % (oracle.len() + 1);
            let right = braid.split_off(at);
            braid.append(right);
        }
    }
}

proptest! {
    #[test]
    fn braid_and_oracle_agree(
        seed in prop::collection::vec(any::<u32>(), 0..800),
        ops in prop::collection::vec(op_strategy(), 0..60),
    ) {
        let mut braid: Braid<u32> = seed.iter().copied().collect();
        let mut oracle: im::Vector<u32> = seed.into_iter().collect();
        for op in ops {
            apply(op, &mut braid, &mut oracle);
            braid.debug_validate();
            prop_assert_eq!(braid.len(), oracle.len());
        }
        prop_assert!(braid.iter().eq(oracle.iter()));
    }

    #[test]
    fn generated_braids_are_well_formed(
        braid in braid::proptest::braid(any::<u16>(), 0..2500usize),
    ) {
        braid.debug_validate();
        let flat: Vec<u16> = braid.to_vec();
        prop_assert_eq!(braid.len(), flat.len());
        let round: Braid<u16> = flat.iter().copied().collect();
        prop_assert_eq!(&braid, &round);
        for (i, value) in flat.iter().enumerate() {
            prop_assert_eq!(&braid[i], value);
        }
    }

    #[test]
    fn into_iter_matches_iter(
        braid in braid::proptest::braid(any::<u32>(), 0..1500usize),
    ) {
        let borrowed: Vec<u32> = braid.iter().copied().collect();
        let owned: Vec<u32> = braid.into_iter().collect();
        prop_assert_eq!(borrowed, owned);
    }
}
