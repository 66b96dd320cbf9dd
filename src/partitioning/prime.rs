//! Prime-based shard count sizing.
//!
//! Shard counts are rounded up to a prime so that any structure in a hash
//! digest correlated with small factors does not fold onto a subset of
//! shards under the modulo.

/// Shards allocated per unit of available hardware parallelism.
pub const DEFAULT_SHARDS_PER_CPU: u64 = 7;

/// Largest prime representable in a `u64` (2^64 - 59).
pub const LARGEST_U64_PRIME: u64 = 18_446_744_073_709_551_557;

/// Miller-Rabin witnesses that make the test exact for every `u64`.
const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Return the smallest prime greater than or equal to `n`.
///
/// Returns `None` when no such prime fits in a `u64`, which only happens for
/// `n > LARGEST_U64_PRIME`.
pub fn next_prime(n: u64) -> Option<u64> {
    match n {
        0 | 1 => return Some(2),
        2 | 3 => return Some(n),
        _ => {}
    }

    let mut candidate = if n % 2 == 0 { n + 1 } else { n };
    // Prime gaps below 2^64 are tiny, walking odd candidates is enough.
    loop {
        if is_prime(candidate) {
            return Some(candidate);
        }
        candidate = candidate.checked_add(2)?;
    }
}

/// Deterministic primality test, exact over the whole `u64` range.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in &WITNESSES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }

    true
}

/// Default shard count for the given hardware parallelism.
///
/// Oversizes relative to the core count so hot keys under bursty load still
/// see little shard-level contention.
pub fn default_shard_count(parallelism: usize) -> usize {
    let target = (parallelism.max(1) as u64).saturating_mul(DEFAULT_SHARDS_PER_CPU);
    let prime = next_prime(target).unwrap_or(LARGEST_U64_PRIME);
    usize::try_from(prime).unwrap_or(usize::MAX)
}

/// Hardware parallelism of the current machine, or 1 if it cannot be read.
pub fn available_parallelism() -> usize {
    match std::thread::available_parallelism() {
        Ok(n) => n.get(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to detect available parallelism, assuming 1");
            1
        }
    }
}

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut result = 1;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_prime_naive(n: u64) -> bool {
        if n < 2 {
            return false;
        }
        let mut i = 2;
        while i * i <= n {
            if n % i == 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    #[test]
    fn test_next_prime_small_values() {
        assert_eq!(next_prime(0), Some(2));
        assert_eq!(next_prime(1), Some(2));
        assert_eq!(next_prime(2), Some(2));
        assert_eq!(next_prime(3), Some(3));
        assert_eq!(next_prime(4), Some(5));
        assert_eq!(next_prime(8), Some(11));
        assert_eq!(next_prime(14), Some(17));
        assert_eq!(next_prime(24), Some(29));
    }

    #[test]
    fn test_next_prime_is_minimal() {
        for n in 0..5_000u64 {
            let p = next_prime(n).unwrap();
            assert!(p >= n);
            assert!(is_prime_naive(p), "next_prime({}) = {} is not prime", n, p);
            for q in n..p {
                assert!(!is_prime_naive(q), "{} is prime and smaller than {}", q, p);
            }
        }
    }

    #[test]
    fn test_is_prime_matches_trial_division() {
        for n in 0..20_000u64 {
            assert_eq!(is_prime(n), is_prime_naive(n), "mismatch at {}", n);
        }
    }

    #[test]
    fn test_is_prime_rejects_pseudoprimes() {
        // Carmichael numbers
        assert!(!is_prime(561));
        assert!(!is_prime(41_041));
        // Strong pseudoprime to bases 2, 3, 5 and 7
        assert!(!is_prime(3_215_031_751));
        // Strong pseudoprime to every prime base up to 23
        assert!(!is_prime(3_825_123_056_546_413_051));
    }

    #[test]
    fn test_is_prime_large_values() {
        assert!(is_prime((1u64 << 61) - 1));
        assert!(is_prime(LARGEST_U64_PRIME));
        assert!(!is_prime(u64::MAX));
        assert!(!is_prime(LARGEST_U64_PRIME - 2));
    }

    #[test]
    fn test_next_prime_upper_bound() {
        assert_eq!(next_prime(LARGEST_U64_PRIME - 1), Some(LARGEST_U64_PRIME));
        assert_eq!(next_prime(LARGEST_U64_PRIME), Some(LARGEST_U64_PRIME));
        assert_eq!(next_prime(LARGEST_U64_PRIME + 1), None);
        assert_eq!(next_prime(u64::MAX), None);
    }

    #[test]
    fn test_default_shard_count() {
        assert_eq!(default_shard_count(0), 7);
        assert_eq!(default_shard_count(1), 7);
        assert_eq!(default_shard_count(2), 17);
        assert_eq!(default_shard_count(4), 29);
        assert_eq!(default_shard_count(8), 59);
        assert_eq!(default_shard_count(16), 113);

        let parallelism = available_parallelism();
        let count = default_shard_count(parallelism);
        assert!(is_prime(count as u64));
        assert_eq!(
            count as u64,
            next_prime(parallelism as u64 * DEFAULT_SHARDS_PER_CPU).unwrap()
        );
    }
}
