/// Atoms per coin.
pub const ATOMS_PER_COIN: i64 = 100_000_000;

/// Format an atom amount as a decimal coin amount.
pub fn format_atoms(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let per_coin = ATOMS_PER_COIN as u64;
    format!("{}{}.{:08}", sign, abs / per_coin, abs % per_coin)
}

/// Hex-encode a hash in display order, which is the reverse of its internal byte order.
pub fn reverse_hash_hex(hash: &[u8]) -> String {
    let mut reversed = hash.to_vec();
    reversed.reverse();
    hex::encode(reversed)
}
