#![no_main]

use libfuzzer_sys::fuzz_target;
use lunaris_core::codec::{self, Endian};
use lunaris_core::coerce;

fuzz_target!(|data: &[u8]| {
    // Decoders reject malformed input with an error; they must never panic.
    for endian in [Endian::Little, Endian::Big] {
        if let Ok(text) = codec::decode_utf16(data, endian) {
            assert_eq!(codec::encode_utf16(&text, endian), data);
        }
        if let Ok(text) = codec::decode_utf32(data, endian) {
            assert_eq!(codec::encode_utf32(&text, endian), data);
        }
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = codec::decode_base64(text);
    }
    let _ = coerce::str_to_number(data);
});
