use rand::Rng;

/// Local parts are hex so they are unambiguous to read aloud and type.
/// 10 hex chars = 40 bits of entropy, plenty for collision-free issuance.
pub const RANDOM_LOCAL_LEN: usize = 10;

pub fn random_local_part() -> String {
    const CHARSET: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..RANDOM_LOCAL_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Lowercases and strips anything that is not alphanumeric, so a requested
/// username is clean before it becomes a local part.
pub fn sanitize_local_part(username: &str) -> String {
    username
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}
