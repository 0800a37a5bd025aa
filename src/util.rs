/// Current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
    }
}
