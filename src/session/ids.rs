use rand::rngs::OsRng;
use rand::RngCore;

/// Uppercase letters and digits; codes are read aloud across a room.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const SESSION_CODE_LEN: usize = 6;
const OPAQUE_ID_BYTES: usize = 8;

/// Random short session code. Callers must still check it against the registry.
pub fn new_session_code() -> String {
    let mut bytes = [0u8; SESSION_CODE_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| CODE_ALPHABET[*b as usize % CODE_ALPHABET.len()] as char)
        .collect()
}

/// Random hex identifier for participants
pub fn new_opaque_id() -> String {
    let mut bytes = [0u8; OPAQUE_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
