//! Admin credential check guarding the audit log.

use crate::LifecycleError;

/// Configured admin secret. With no secret every check fails, so audit routes stay closed.
#[derive(Clone, Default)]
pub struct AdminAuth {
    secret: Option<String>,
}

/// Proof that [`AdminAuth::verify`] succeeded. Only `verify` can build one, and the audit
/// operations of [`crate::DeviceLifecycle`] take it by reference.
#[derive(Debug)]
pub struct AdminGrant {
    _sealed: (),
}

impl AdminAuth {
    /// An empty secret counts as no secret.
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Exact string comparison against the configured secret.
    pub fn verify(&self, provided: Option<&str>) -> Result<AdminGrant, LifecycleError> {
        match (self.secret.as_deref(), provided) {
            (Some(secret), Some(token)) if secret == token => Ok(AdminGrant { _sealed: () }),
            _ => Err(LifecycleError::Unauthorized),
        }
    }
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_requires_exact_match() {
        let auth = AdminAuth::new(Some("s3cret".to_string()));
        assert!(auth.verify(Some("s3cret")).is_ok());
        assert!(auth.verify(Some("s3cret ")).is_err());
        assert!(auth.verify(Some("S3CRET")).is_err());
        assert!(auth.verify(None).is_err());
    }

    #[test]
    fn missing_or_empty_secret_refuses_everyone() {
        for auth in [AdminAuth::new(None), AdminAuth::new(Some(String::new()))] {
            assert!(!auth.is_enabled());
            assert!(matches!(
                auth.verify(Some("")),
                Err(LifecycleError::Unauthorized)
            ));
        }
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let auth = AdminAuth::new(Some("hunter2".to_string()));
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
