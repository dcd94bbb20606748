use pretty_assertions::assert_eq;
use quill_types::{ContractAddress, Felt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use starknet_types_core::hash::{Pedersen, Poseidon, StarkHash};

use crate::test_utils::get_test_storage;
use crate::trie::{
    open_classes_trie, open_contract_storage_trie, open_contracts_trie, TriePath,
};

// The root of a trie holding a single leaf: the leaf value wrapped with the
// full-height edge.
fn single_leaf_root<H: StarkHash>(key: &Felt, value: &Felt) -> Felt {
    H::hash(value, key) + Felt::from(251u64)
}

#[test]
fn empty_trie() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.root().unwrap(), Felt::ZERO);
    assert_eq!(trie.get(&Felt::from(0x99cadc82u64)).unwrap(), Felt::ZERO);
}

#[test]
fn single_leaf() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();

    let key = Felt::ONE;
    let value = Felt::from(0xabcu64);
    assert_eq!(trie.put(&key, &value).unwrap(), Felt::ZERO);
    assert_eq!(trie.get(&key).unwrap(), value);
    assert_eq!(trie.root().unwrap(), single_leaf_root::<Pedersen>(&key, &value));

    // Overwriting returns the previous value and rehashes.
    let new_value = Felt::from(0xdefu64);
    assert_eq!(trie.put(&key, &new_value).unwrap(), value);
    assert_eq!(trie.root().unwrap(), single_leaf_root::<Pedersen>(&key, &new_value));

    trie.commit().unwrap();

    // The committed trie reads back identically.
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.get(&key).unwrap(), new_value);
    assert_eq!(trie.root().unwrap(), single_leaf_root::<Pedersen>(&key, &new_value));
}

#[test]
fn two_leaves_fork() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();

    let value0 = Felt::from(0xabcu64);
    let value1 = Felt::from(0xdefu64);
    trie.put(&Felt::ONE, &value0).unwrap();
    trie.put(&Felt::TWO, &value1).unwrap();

    // Keys 0b01 and 0b10 fork after 249 shared zero bits. Each child hangs
    // off the binary node through a one-bit edge.
    let left = Pedersen::hash(&value0, &Felt::ONE) + Felt::ONE;
    let right = Pedersen::hash(&value1, &Felt::ZERO) + Felt::ONE;
    let binary = Pedersen::hash(&left, &right);
    let expected_root = Pedersen::hash(&binary, &Felt::ZERO) + Felt::from(249u64);
    assert_eq!(trie.root().unwrap(), expected_root);

    trie.commit().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.root().unwrap(), expected_root);
    assert_eq!(trie.get(&Felt::ONE).unwrap(), value0);
    assert_eq!(trie.get(&Felt::TWO).unwrap(), value1);
}

#[test]
fn delete_leaves() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();

    let key0 = Felt::from(0x99cadc82u64);
    let key1 = Felt::from(0x901823u64);
    let key2 = Felt::from(0x8975u64);
    trie.put(&key0, &Felt::ONE).unwrap();
    trie.put(&key1, &Felt::TWO).unwrap();
    trie.put(&key2, &Felt::THREE).unwrap();
    trie.commit().unwrap();

    // Writing zero deletes a leaf; the sibling subtree is reattached.
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.put(&key1, &Felt::ZERO).unwrap(), Felt::TWO);
    assert_eq!(trie.get(&key0).unwrap(), Felt::ONE);
    assert_eq!(trie.get(&key1).unwrap(), Felt::ZERO);
    assert_eq!(trie.get(&key2).unwrap(), Felt::THREE);

    // Deleting an absent key is a no-op.
    assert_eq!(trie.put(&key1, &Felt::ZERO).unwrap(), Felt::ZERO);

    // Deleting the remaining leaves empties the trie.
    trie.put(&key0, &Felt::ZERO).unwrap();
    trie.put(&key2, &Felt::ZERO).unwrap();
    assert_eq!(trie.root().unwrap(), Felt::ZERO);
    trie.commit().unwrap();

    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.root().unwrap(), Felt::ZERO);
}

// The goerli genesis block's global state trie, as computed by the StarkNet
// sequencer.
#[test]
fn known_root() {
    let leaves = [
        ("0x5", "0x66"),
        ("0x1BF95D4B58F0741FEA29F94EE5A118D0847C8B7AE0173C2A570C9F74CCA9EA1", "0x7E5"),
        ("0x3C75C20765D020B0EC41B48BB8C5338AC4B619FC950D59994E844E1E1B9D2A9", "0x7C7"),
        (
            "0x4065B936C56F5908A981084DAFA66DC17600937DC80C52EEB834693BB811792",
            "0x7970C532B764BB36FAF5696B8BC1317505B8A4DC9EEE5DF4994671757975E4D",
        ),
        (
            "0x4B5FBB4904167E2E8195C35F7D4E78501A3FE95896794367C85B60B39AEFFC2",
            "0x232C969EAFC5B30C20648759D7FA1E2F4256AC6604E1921578101DCE4DFDF48",
        ),
    ];

    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    for (key, value) in leaves {
        trie.put(&Felt::from_hex_unchecked(key), &Felt::from_hex_unchecked(value)).unwrap();
    }

    let expected =
        Felt::from_hex_unchecked("0x6ee9a8202b40f3f76f1a132f953faa2df78b3b33ccb2b4406431abdc99c2dfe");
    assert_eq!(trie.root().unwrap(), expected);

    // Committing does not change the root.
    trie.commit().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.root().unwrap(), expected);
}

#[test]
fn fork_at_last_bit() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();

    // Keys 0b100 and 0b101 diverge only at the final bit: the binary node
    // sits at depth 250 and both children are bare leaves.
    let key0 = Felt::from(4u64);
    let key1 = Felt::from(5u64);
    let value0 = Felt::from(0xabcu64);
    let value1 = Felt::from(0xdefu64);
    trie.put(&key0, &value0).unwrap();
    trie.put(&key1, &value1).unwrap();

    let binary = Pedersen::hash(&value0, &value1);
    // The shared path is 0b10 extended to 250 bits, i.e. the felt 2.
    let expected_root = Pedersen::hash(&binary, &Felt::TWO) + Felt::from(250u64);
    assert_eq!(trie.root().unwrap(), expected_root);

    assert_eq!(trie.get(&key0).unwrap(), value0);
    assert_eq!(trie.get(&key1).unwrap(), value1);
}

#[test]
fn delete_and_reinsert_within_one_batch() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    trie.put(&Felt::ONE, &Felt::from(0xau64)).unwrap();
    trie.put(&Felt::TWO, &Felt::from(0xbu64)).unwrap();
    trie.commit().unwrap();

    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.put(&Felt::ONE, &Felt::ZERO).unwrap(), Felt::from(0xau64));
    assert_eq!(trie.put(&Felt::ONE, &Felt::from(0xcu64)).unwrap(), Felt::ZERO);
    trie.commit().unwrap();

    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.get(&Felt::ONE).unwrap(), Felt::from(0xcu64));
    assert_eq!(trie.get(&Felt::TWO).unwrap(), Felt::from(0xbu64));

    // A trie emptied and refilled within one batch persists the refill.
    trie.put(&Felt::ONE, &Felt::ZERO).unwrap();
    trie.put(&Felt::TWO, &Felt::ZERO).unwrap();
    assert_eq!(trie.root().unwrap(), Felt::ZERO);
    trie.put(&Felt::THREE, &Felt::from(0xdu64)).unwrap();
    trie.commit().unwrap();

    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    assert_eq!(trie.get(&Felt::THREE).unwrap(), Felt::from(0xdu64));
    assert_eq!(
        trie.root().unwrap(),
        single_leaf_root::<Pedersen>(&Felt::THREE, &Felt::from(0xdu64))
    );
}

#[test]
fn classes_trie_hashes_with_poseidon() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_classes_trie(&txn.txn, &txn.tables).unwrap();

    let key = Felt::from(9u64);
    let value = Felt::from(0xcu64);
    trie.put(&key, &value).unwrap();
    assert_eq!(trie.root().unwrap(), single_leaf_root::<Poseidon>(&key, &value));
}

#[test]
fn contract_storage_tries_are_isolated() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let first = ContractAddress::try_from(Felt::ONE).unwrap();
    let second = ContractAddress::try_from(Felt::TWO).unwrap();

    let mut trie = open_contract_storage_trie(&txn.txn, &txn.tables, first).unwrap();
    trie.put(&Felt::from(0xau64), &Felt::from(7u64)).unwrap();
    trie.commit().unwrap();

    let trie = open_contract_storage_trie(&txn.txn, &txn.tables, first).unwrap();
    assert_eq!(trie.get(&Felt::from(0xau64)).unwrap(), Felt::from(7u64));
    let mut other = open_contract_storage_trie(&txn.txn, &txn.tables, second).unwrap();
    assert_eq!(other.get(&Felt::from(0xau64)).unwrap(), Felt::ZERO);
    assert_eq!(other.root().unwrap(), Felt::ZERO);
}

// Random inserts, overwrites and deletes end up with the same root as a trie
// built directly from the surviving entries, and reads match a mirror map.
#[test]
fn randomized_consistency() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut keys = Vec::new();
    for _ in 0..40 {
        let mut bytes: [u8; 32] = rng.gen();
        // Keep keys under the trie height.
        bytes[0] &= 0x03;
        keys.push(Felt::from_bytes_be(&bytes));
    }

    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    let mut mirror = std::collections::HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        let value = Felt::from(i as u64 + 1);
        trie.put(key, &value).unwrap();
        mirror.insert(*key, value);
    }
    // Overwrite some entries and delete every third one.
    for (i, key) in keys.iter().enumerate() {
        if i % 2 == 0 {
            let value = Felt::from(0x1000 + i as u64);
            trie.put(key, &value).unwrap();
            mirror.insert(*key, value);
        }
        if i % 3 == 0 {
            trie.put(key, &Felt::ZERO).unwrap();
            mirror.remove(key);
        }
    }
    trie.commit().unwrap();

    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    for key in &keys {
        let expected = mirror.get(key).copied().unwrap_or(Felt::ZERO);
        assert_eq!(trie.get(key).unwrap(), expected);
    }
    let root = trie.root().unwrap();

    // A trie built from scratch out of the surviving entries has the same
    // root: the shape is canonical in the entry set.
    let ((_, mut other_writer), _other_temp_dir) = get_test_storage();
    let other_txn = other_writer.begin_rw_txn().unwrap();
    let mut rebuilt = open_contracts_trie(&other_txn.txn, &other_txn.tables).unwrap();
    for (key, value) in &mirror {
        rebuilt.put(key, value).unwrap();
    }
    assert_eq!(rebuilt.root().unwrap(), root);
}

#[test]
fn clean_commit_is_a_no_op() {
    let ((_, mut writer), _temp_dir) = get_test_storage();
    let txn = writer.begin_rw_txn().unwrap();
    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    trie.put(&Felt::ONE, &Felt::TWO).unwrap();
    trie.commit().unwrap();
    let root = trie.root().unwrap();

    let mut trie = open_contracts_trie(&txn.txn, &txn.tables).unwrap();
    trie.commit().unwrap();
    assert_eq!(trie.root().unwrap(), root);
}

#[test]
fn path_felt_round_trip() {
    let felt = Felt::from_hex_unchecked("0x4b5fbb4904167e2e8195c35f7d4e78501a3fe95896794367");
    let path = TriePath::from_felt(&felt);
    assert_eq!(path.len(), 251);
    assert_eq!(path.to_felt(), felt);

    let prefix = path.prefix(17);
    let suffix = path.suffix(17);
    assert_eq!(prefix.len(), 17);
    assert_eq!(suffix.len(), 234);
    assert!(path.starts_with(&prefix));
    assert_eq!(path.common_prefix_len(&prefix), 17);
}
