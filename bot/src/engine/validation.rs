use std::net::SocketAddr;

use super::snapshot::split_address;

/// Maximum message content length (characters).
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Validate a server address given by a user. Accepts `ip:port` with an
/// optional `protocol://` prefix and returns the normalized `ip:port`.
pub fn validate_address(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("Address cannot be empty".into());
    }
    let Some((_, address)) = split_address(raw) else {
        return Err("Address cannot be empty".into());
    };
    match address.parse::<SocketAddr>() {
        Ok(addr) if addr.port() == 0 => Err("Port cannot be 0".into()),
        Ok(addr) => Ok(addr.to_string()),
        Err(_) => Err(format!("'{address}' is not an ip:port address")),
    }
}

/// Validate message content. Must be non-empty and under the length limit.
pub fn validate_message(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("Message cannot be empty".into());
    }
    if content.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(format!(
            "Message too long (max {} characters)",
            MAX_MESSAGE_LENGTH
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        assert_eq!(validate_address("1.2.3.4:8303").unwrap(), "1.2.3.4:8303");
        assert_eq!(
            validate_address(" tw-0.6+udp://1.2.3.4:8303 ").unwrap(),
            "1.2.3.4:8303"
        );
        assert_eq!(validate_address("[0:0::1]:8303").unwrap(), "[::1]:8303");
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(validate_address("").is_err());
        assert!(validate_address("tw-0.6+udp://").is_err());
        assert!(validate_address("1.2.3.4").is_err());
        assert!(validate_address("example.org:8303").is_err());
        assert!(validate_address("1.2.3.4:0").is_err());
    }

    #[test]
    fn test_message_validation() {
        assert!(validate_message("hello").is_ok());
        assert!(validate_message("").is_err());
        assert!(validate_message("   ").is_err());
        assert!(validate_message(&"a".repeat(2001)).is_err());
        // Limit counts characters, not bytes.
        assert!(validate_message(&"é".repeat(2000)).is_ok());
    }
}
