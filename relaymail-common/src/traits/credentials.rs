use async_trait::async_trait;

/// Verifies AUTH credentials presented by an inbound client.
///
/// Implementations must not reveal whether the username exists.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_credential(&self, username: &str, password: &str) -> bool;
}
