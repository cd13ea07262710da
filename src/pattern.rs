//! Case-sensitive wildcard matching.
//!
//! `*` matches any run of characters, separators included; every other
//! character matches itself. The whole subject must be consumed, so
//! `admin/*` matches `admin/users/1` but not `xadmin/users`. Used for
//! pattern-bound middleware and for host-based environment detection.

/// Returns `true` when `subject` matches `pattern` in full.
pub fn is_match(pattern: &str, subject: &str) -> bool {
    let p = pattern.as_bytes();
    let s = subject.as_bytes();

    let (mut pi, mut si) = (0, 0);
    // Position of the last `*` seen and the subject index it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, si));
            pi += 1;
        } else if pi < p.len() && p[pi] == s[si] {
            pi += 1;
            si += 1;
        } else if let Some((star_pi, star_si)) = star {
            // Let the last star swallow one more byte and retry.
            pi = star_pi + 1;
            si = star_si + 1;
            star = Some((star_pi, si));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&b| b == b'*')
}
