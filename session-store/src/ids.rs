use rand::Rng;

/// Room ids avoid visually similar characters (no I/O/0/1).
pub const ROOM_ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_ID_LEN: usize = 6;

/// Bearer tokens draw from the full alphanumeric alphabet.
pub const TOKEN_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
pub const TOKEN_LEN: usize = 32;

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Short human-typeable room identifier.
pub fn generate_room_id() -> String {
    random_string(ROOM_ID_ALPHABET, ROOM_ID_LEN)
}

/// Opaque bearer credential for host or player authorization.
pub fn generate_token() -> String {
    random_string(TOKEN_ALPHABET, TOKEN_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_length_and_alphabet() {
        for _ in 0..50 {
            let id = generate_room_id();
            assert_eq!(id.len(), ROOM_ID_LEN);
            assert!(id.bytes().all(|b| ROOM_ID_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn token_length_and_alphabet() {
        for _ in 0..50 {
            let token = generate_token();
            assert_eq!(token.len(), TOKEN_LEN);
            assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn room_id_excludes_ambiguous_characters() {
        for banned in [b'I', b'O', b'0', b'1'] {
            assert!(!ROOM_ID_ALPHABET.contains(&banned));
        }
    }
}
