use starknet_types_core::felt::Felt;

use crate::state::StateUpdate;

// A trimmed-down state update in the shape the feeder gateway returns.
#[test]
fn state_update_from_feeder_json() {
    let raw = r#"{
        "block_hash": "0x47c3637b57c2b079b93c61539950c17e868a28f46cdef28f88521067f21e943",
        "new_root": "0x3ae8d63b9b5ac45a3ca8dca1fc6d5be6e42ea55808c7f4e6a20a61b4f2d91bb",
        "old_root": "0x0",
        "state_diff": {
            "storage_diffs": {
                "0x37a1bde9a1c1e9f21302cd73a2b0f4ad9b3b4b24c73a1ea4b723dde6e15355e": [
                    { "key": "0x5", "value": "0x22b" }
                ]
            },
            "nonces": { "0x5a1": "0x2" },
            "deployed_contracts": [
                {
                    "address": "0x2fb7ff5b1b474e8e691f5bebad9aa7aa3009f6ef22ccc2816f96cdfe217604d",
                    "class_hash": "0x10455c752b86932ce552f2b0fe81a880746649b9aee7e0d842bf3f52378f9f8"
                }
            ],
            "old_declared_contracts": [
                "0x10455c752b86932ce552f2b0fe81a880746649b9aee7e0d842bf3f52378f9f8"
            ],
            "declared_classes": [
                {
                    "class_hash": "0x2ed6bb4d57ad27a22972b81feb9d09798ff8c273684376ec72c154d90343453",
                    "compiled_class_hash": "0x65a35d488049b5a6a4bbf94a0e0cb9a8dc3bf9ceda725ab2ab17fa09e988366"
                }
            ],
            "replaced_classes": []
        }
    }"#;

    let state_update: StateUpdate = serde_json::from_str(raw).unwrap();
    let diff = &state_update.state_diff;
    assert_eq!(state_update.old_root.0, Felt::ZERO);
    assert_eq!(diff.storage_diffs.len(), 1);
    let (address, entries) = diff.storage_diffs.first().unwrap();
    assert_eq!(
        *address.0.key(),
        Felt::from_hex_unchecked(
            "0x37a1bde9a1c1e9f21302cd73a2b0f4ad9b3b4b24c73a1ea4b723dde6e15355e"
        )
    );
    assert_eq!(entries[0].value, Felt::from_hex_unchecked("0x22b"));
    assert_eq!(diff.deployed_contracts.len(), 1);
    assert_eq!(diff.declared_v0_classes.len(), 1);
    assert_eq!(diff.declared_v1_classes.len(), 1);
    assert!(diff.replaced_classes.is_empty());
    assert_eq!(diff.nonces.first().unwrap().1 .0, Felt::from(2u64));

    // The shape survives a serde round trip.
    let json = serde_json::to_string(&state_update).unwrap();
    let reparsed: StateUpdate = serde_json::from_str(&json).unwrap();
    assert_eq!(reparsed, state_update);
}
