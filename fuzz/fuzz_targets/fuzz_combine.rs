#![no_main]

use keycustody::{ShamirShare, Share};
use libfuzzer_sys::fuzz_target;

// Builds arbitrary, mostly malformed share sets and feeds them to combine.
// Zero or duplicate indices, mismatched metadata and uneven data lengths must
// all come back as errors, never panics.
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let mut shares = Vec::new();
    let num_shares = (data[0] % 8).max(1);
    let mut offset = 1;

    for _ in 0..num_shares {
        if offset + 4 > data.len() {
            break;
        }

        let index = data[offset];
        let threshold = data[offset + 1];
        let total_shares = data[offset + 2];
        let data_len = (data[offset + 3] as usize).min(64);
        offset += 4;

        let end = (offset + data_len).min(data.len());
        let mut share_data = data[offset..end].to_vec();
        share_data.resize(data_len, 0);
        offset = end;

        shares.push(Share {
            index,
            data: share_data,
            threshold,
            total_shares,
        });
    }

    let _ = ShamirShare::combine(&shares);
    let _ = ShamirShare::combine(&[]);

    if shares.len() >= 2 {
        let duplicate = vec![shares[0].clone(), shares[0].clone()];
        let _ = ShamirShare::combine(&duplicate);
    }

    for share in &shares {
        let _ = Share::from_hex(&share.to_hex());
    }
});
