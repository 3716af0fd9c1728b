//! Identifier generation

use rand::Rng;

const SCAN_ID_PREFIX: &str = "scan_";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a scan identifier: `scan_<unix millis>_<9 base36 chars>`
pub fn generate_scan_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!(
        "{}{}_{}",
        SCAN_ID_PREFIX,
        chrono::Utc::now().timestamp_millis(),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_id_shape() {
        let id = generate_scan_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "scan");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_scan_ids_differ() {
        assert_ne!(generate_scan_id(), generate_scan_id());
    }
}
