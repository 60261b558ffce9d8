#![no_main]

use keycustody::{DeviceRecoveryObject, RecoveryFileObject, Share};
use libfuzzer_sys::fuzz_target;

// Imports arbitrary bytes as every portable artifact. Imports only ever
// return InvalidRecoveryFile or a parsed object, and a parsed object must
// survive a second export/import unchanged.
fuzz_target!(|data: &[u8]| {
    if let Ok(file) = RecoveryFileObject::from_json(data) {
        let exported = file.to_json().expect("parsed file exports");
        let reimported = RecoveryFileObject::from_json(&exported).expect("export re-imports");
        assert_eq!(reimported, file);
        let _ = file.share_a.kdf.params();
        let _ = file.share_a.envelope.nonce_bytes();
    }

    if let Ok(object) = DeviceRecoveryObject::from_json(data) {
        let exported = object.to_json().expect("parsed object exports");
        assert_eq!(DeviceRecoveryObject::from_json(&exported).expect("re-imports"), object);
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = Share::from_hex(text);
    }
});
