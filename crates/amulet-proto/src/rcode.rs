//! DNS response codes.

/// No error.
pub const NOERROR: u8 = 0;

/// Format error.
pub const FORMERR: u8 = 1;

/// Server failure.
pub const SERVFAIL: u8 = 2;

/// Non-existent domain.
pub const NXDOMAIN: u8 = 3;

/// Not implemented.
pub const NOTIMP: u8 = 4;

/// Query refused.
pub const REFUSED: u8 = 5;

/// Returns the conventional name for a response code, for logging.
pub fn name(rcode: u8) -> &'static str {
    match rcode {
        NOERROR => "NOERROR",
        FORMERR => "FORMERR",
        SERVFAIL => "SERVFAIL",
        NXDOMAIN => "NXDOMAIN",
        NOTIMP => "NOTIMP",
        REFUSED => "REFUSED",
        _ => "RCODE?",
    }
}

/// Returns true for codes that should trigger failover to the next
/// upstream rather than being propagated to the client.
#[inline]
pub fn is_retryable(rcode: u8) -> bool {
    rcode == SERVFAIL || rcode == REFUSED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_codes() {
        assert!(is_retryable(SERVFAIL));
        assert!(is_retryable(REFUSED));
        assert!(!is_retryable(NOERROR));
        assert!(!is_retryable(NXDOMAIN));
        assert!(!is_retryable(FORMERR));
    }

    #[test]
    fn test_names() {
        assert_eq!(name(0), "NOERROR");
        assert_eq!(name(3), "NXDOMAIN");
        assert_eq!(name(12), "RCODE?");
    }
}
