//! Health probes.

/// Liveness probe. Answers without touching any session state.
pub async fn health_check() -> &'static str {
    "OK\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_body() {
        assert_eq!(health_check().await, "OK\n");
    }
}
