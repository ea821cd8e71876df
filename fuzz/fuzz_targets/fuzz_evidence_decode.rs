#![no_main]

use libfuzzer_sys::fuzz_target;
use mrv_core::attestation::Attestation;
use mrv_core::evidence::EvidenceRecord;
use mrv_core::scorer::ForestModel;
use mrv_core::verifier::ReasonCode;

fuzz_target!(|data: &[u8]| {
    if let Ok(att) = Attestation::from_json_bytes(data) {
        assert!(att.verify_integrity().is_ok());
        let bytes = att.to_json_bytes().unwrap_or_default();
        let again = Attestation::from_json_bytes(&bytes);
        assert!(matches!(again, Ok(ref a) if a == &att));
    }

    if let Ok(record) = EvidenceRecord::from_json_bytes(data) {
        assert!(record.attestation.verify_signature().is_ok());
        assert!(record.decision.validate().is_ok());
        assert_eq!(
            record.decision.approved,
            record.decision.reason_code == ReasonCode::Ok
        );
        assert_eq!(
            record.decision.attestation_hash,
            record.attestation.attestation.content_hash()
        );
    }

    if let Ok(model) = ForestModel::from_json_bytes(data) {
        // Validated arenas must score every input into [0, 1].
        for x in [[0.0, 0.0, 0.0], [1e9, 23.0, -1e9], [f64::MAX, 0.5, f64::MIN]] {
            let s = model.forest.score(&x);
            assert!((0.0..=1.0).contains(&s));
        }
    }
});
