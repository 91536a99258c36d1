//! Property-based tests: codec round-trips, address codec, the subsidy
//! schedule, merkle determinism, and PoW target shape under random inputs.

use proptest::prelude::*;

use oxide_core::consensus::{block_reward, target_bytes, Block};
use oxide_core::constants::{HALVING_INTERVAL, INITIAL_SUBSIDY, MAX_SUPPLY};
use oxide_core::crypto::{merkle_root, sha256, Hash};
use oxide_core::tx::{Transaction, TxInput, TxOutput, TxOutputs};
use oxide_core::wallet::{address_from_pub_key_hash, pub_key_hash_from_address, validate_address};

prop_compose! {
    fn arb_hash()(bytes in any::<[u8; 32]>()) -> Hash {
        Hash::from_bytes(bytes)
    }
}

prop_compose! {
    fn arb_output()(value in any::<u64>(), pkh in proptest::collection::vec(any::<u8>(), 20)) -> TxOutput {
        TxOutput { value, pubkey_hash: pkh }
    }
}

prop_compose! {
    fn arb_input()(
        prev in arb_hash(),
        index in -1i32..16,
        signature in proptest::collection::vec(any::<u8>(), 0..64),
        pubkey in proptest::collection::vec(any::<u8>(), 0..64),
    ) -> TxInput {
        TxInput { prev_tx_id: prev, prev_out_index: index, signature, pubkey }
    }
}

prop_compose! {
    fn arb_transaction()(
        inputs in proptest::collection::vec(arb_input(), 1..4),
        outputs in proptest::collection::vec(arb_output(), 1..4),
    ) -> Transaction {
        let mut tx = Transaction { id: Hash::zero(), inputs, outputs };
        tx.id = tx.hash();
        tx
    }
}

proptest! {
    /// Transactions survive serialization byte-for-byte.
    #[test]
    fn prop_transaction_roundtrip(tx in arb_transaction()) {
        let bytes = tx.serialize();
        let recovered = Transaction::deserialize(&bytes).unwrap();
        prop_assert_eq!(&tx, &recovered);
        prop_assert_eq!(bytes, recovered.serialize());
    }

    /// The stored id always equals the hash of the id-cleared encoding.
    #[test]
    fn prop_transaction_id_invariant(tx in arb_transaction()) {
        prop_assert_eq!(tx.id, tx.hash());
    }

    /// Blocks survive serialization byte-for-byte.
    #[test]
    fn prop_block_roundtrip(
        timestamp in any::<i64>(),
        nonce in any::<i64>(),
        height in 0i64..1_000_000,
        difficulty in 1u32..64,
        hash in arb_hash(),
        prev in arb_hash(),
        txs in proptest::collection::vec(arb_transaction(), 1..3),
    ) {
        let mut block = Block {
            timestamp,
            hash,
            prev_hash: prev,
            transactions: txs,
            nonce,
            height,
            difficulty,
            merkle_root: Hash::zero(),
        };
        block.merkle_root = block.hash_transactions();

        let recovered = Block::deserialize(&block.serialize()).unwrap();
        prop_assert_eq!(&block, &recovered);
        prop_assert_eq!(block.merkle_root, recovered.hash_transactions());
    }

    /// UTXO index entries survive serialization.
    #[test]
    fn prop_outputs_roundtrip(outputs in proptest::collection::vec(arb_output(), 0..8)) {
        let outs = TxOutputs { outputs };
        prop_assert_eq!(&outs, &TxOutputs::deserialize(&outs.serialize()).unwrap());
    }

    /// Any 20-byte hash encodes to a valid address and decodes back.
    #[test]
    fn prop_address_roundtrip(pkh in proptest::collection::vec(any::<u8>(), 20)) {
        let address = address_from_pub_key_hash(&pkh);
        prop_assert!(validate_address(&address));
        prop_assert_eq!(pub_key_hash_from_address(&address), Some(pkh));
    }

    /// Tampering with a pubkey hash changes the address.
    #[test]
    fn prop_address_binds_pkh(pkh in proptest::collection::vec(any::<u8>(), 20), flip in 0usize..20) {
        let mut other = pkh.clone();
        other[flip] ^= 0x01;
        prop_assert_ne!(address_from_pub_key_hash(&pkh), address_from_pub_key_hash(&other));
    }

    /// Rewards never exceed the initial subsidy and never increase with
    /// height.
    #[test]
    fn prop_reward_bounded_and_monotone(height in 0i64..100_000_000) {
        let reward = block_reward(height);
        prop_assert!(reward <= INITIAL_SUBSIDY);
        prop_assert!(block_reward(height + HALVING_INTERVAL) <= reward);
    }

    /// Rewards are zero from the seventh halving era on.
    #[test]
    fn prop_reward_exhausts(height in 7 * HALVING_INTERVAL..i64::MAX) {
        prop_assert_eq!(block_reward(height), 0);
    }

    /// The per-era subsidy sum stays below the supply cap.
    #[test]
    fn prop_era_issuance_within_cap(eras in 1i64..20) {
        let mut total = 0u64;
        for era in 0..eras {
            total += block_reward(era * HALVING_INTERVAL) * HALVING_INTERVAL as u64;
        }
        prop_assert!(total <= MAX_SUPPLY);
    }

    /// Merkle roots are deterministic and sensitive to every leaf.
    #[test]
    fn prop_merkle_sensitive(
        leaves in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..64), 1..9),
        flip in any::<proptest::sample::Index>(),
    ) {
        let root = merkle_root(&leaves);
        prop_assert_eq!(root, merkle_root(&leaves));

        let mut tampered = leaves.clone();
        let index = flip.index(tampered.len());
        tampered[index][0] ^= 0x01;
        prop_assert_ne!(root, merkle_root(&tampered));
    }

    /// A higher difficulty always yields a smaller (harder) target.
    #[test]
    fn prop_target_monotone(difficulty in 1u32..255) {
        prop_assert!(target_bytes(difficulty + 1) < target_bytes(difficulty));
    }

    /// Hex round-trip for hashes.
    #[test]
    fn prop_hash_hex_roundtrip(bytes in any::<[u8; 32]>()) {
        let hash = Hash::from_bytes(bytes);
        prop_assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
    }
}

/// A digest meets difficulty d exactly when its first d bits are zero.
#[test]
fn test_target_matches_leading_zero_bits() {
    for seed in 0u32..64 {
        let digest = sha256(&seed.to_be_bytes());
        let leading = digest
            .0
            .iter()
            .flat_map(|byte| (0..8).map(move |i| (byte >> (7 - i)) & 1))
            .take_while(|&bit| bit == 0)
            .count() as u32;

        for difficulty in 1u32..=64 {
            assert_eq!(
                digest.0 < target_bytes(difficulty),
                difficulty <= leading,
                "difficulty {} vs {} leading zeros",
                difficulty,
                leading
            );
        }
    }
}
