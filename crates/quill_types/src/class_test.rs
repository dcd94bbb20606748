use crate::class::{ContractClass, EntryPointType};

// A trimmed-down Cairo 0 class in the shape the feeder gateway returns.
#[test]
fn deprecated_class_from_feeder_json() {
    let raw = r#"{
        "abi": [
            { "inputs": [], "name": "increase_balance", "type": "function" }
        ],
        "program": {
            "builtins": ["pedersen", "range_check"],
            "data": ["0x480680017fff8000", "0x3e8"],
            "prime": "0x800000000000011000000000000000000000000000000000000000000000001"
        },
        "entry_points_by_type": {
            "CONSTRUCTOR": [],
            "EXTERNAL": [
                { "offset": "0x3a", "selector": "0x362398bec32bc0ebb411203221a35a0301193a96f317ebe5e40be9f60d15320" }
            ],
            "L1_HANDLER": []
        }
    }"#;

    let class: ContractClass = serde_json::from_str(raw).unwrap();
    let ContractClass::Deprecated(class) = class else {
        panic!("Expected a Cairo 0 class.");
    };
    assert_eq!(class.entry_points_by_type[&EntryPointType::External].len(), 1);
    assert!(class.entry_points_by_type[&EntryPointType::Constructor].is_empty());
    assert_eq!(class.program["builtins"][0], "pedersen");
}

// A trimmed-down Sierra class.
#[test]
fn sierra_class_from_feeder_json() {
    let raw = r#"{
        "sierra_program": ["0x1", "0x5", "0x2d"],
        "contract_class_version": "0.1.0",
        "entry_points_by_type": {
            "CONSTRUCTOR": [
                { "function_idx": 2, "selector": "0x28ffe4ff0f226a9107253e17a904099aa4f63a02a5621de0576e5aa71bc5194" }
            ],
            "EXTERNAL": [
                { "function_idx": 0, "selector": "0x362398bec32bc0ebb411203221a35a0301193a96f317ebe5e40be9f60d15320" }
            ],
            "L1_HANDLER": []
        },
        "abi": "[{\"type\": \"function\", \"name\": \"increase_balance\"}]"
    }"#;

    let class: ContractClass = serde_json::from_str(raw).unwrap();
    let ContractClass::Sierra(class) = class else {
        panic!("Expected a Sierra class.");
    };
    assert_eq!(class.sierra_program.len(), 3);
    assert_eq!(class.contract_class_version, "0.1.0");
    assert_eq!(class.entry_points_by_type[&EntryPointType::Constructor][0].function_idx, 2);
}

#[test]
fn class_json_round_trip() {
    for class in [ContractClass::default()] {
        let json = serde_json::to_string(&class).unwrap();
        let reparsed: ContractClass = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, class);
    }
}
