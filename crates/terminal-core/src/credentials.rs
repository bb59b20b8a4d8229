//! 접속 인증 정보 접근자.
//!
//! 스트림 연결과 REST 요청은 토큰을 직접 보관하지 않고 필요할 때마다 접근자에게 묻습니다.

use secrecy::{ExposeSecret, SecretString};
use std::sync::{PoisonError, RwLock};

/// 접속 토큰 접근자.
pub trait CredentialProvider: Send + Sync {
    /// 현재 접속 토큰.
    fn access_token(&self) -> Option<SecretString>;

    /// 현재 사용자 ID (주문/잔고 스트림에 필요).
    fn user_id(&self) -> Option<String>;
}

#[derive(Default)]
struct Inner {
    token: Option<SecretString>,
    user_id: Option<String>,
}

/// 메모리에 보관하는 인증 정보.
///
/// 로그인/로그아웃 시 [`StaticCredentials::set`] / [`StaticCredentials::clear`]로 교체합니다.
#[derive(Default)]
pub struct StaticCredentials {
    inner: RwLock<Inner>,
}

impl StaticCredentials {
    pub fn new(token: SecretString, user_id: impl Into<String>) -> Self {
        let credentials = Self::default();
        credentials.set(token, user_id);
        credentials
    }

    /// 인증 정보 없이 생성합니다.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// 환경 변수 `TERMINAL_ACCESS_TOKEN`, `TERMINAL_USER_ID`에서 읽습니다.
    pub fn from_env() -> Self {
        let credentials = Self::default();
        {
            let mut inner = credentials.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.token = std::env::var("TERMINAL_ACCESS_TOKEN")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| SecretString::new(s.into()));
            inner.user_id = std::env::var("TERMINAL_USER_ID")
                .ok()
                .filter(|s| !s.is_empty());
        }
        credentials
    }

    pub fn set(&self, token: SecretString, user_id: impl Into<String>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.token = Some(token);
        inner.user_id = Some(user_id.into());
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *inner = Inner::default();
    }
}

impl CredentialProvider for StaticCredentials {
    fn access_token(&self) -> Option<SecretString> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .token
            .as_ref()
            .map(|token| SecretString::new(token.expose_secret().into()))
    }

    fn user_id(&self) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.user_id.clone()
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("StaticCredentials")
            .field("token", &inner.token.as_ref().map(|_| "[REDACTED]"))
            .field("user_id", &inner.user_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let credentials = StaticCredentials::anonymous();
        assert!(credentials.access_token().is_none());

        credentials.set(SecretString::new("tok".into()), "u-1");
        assert_eq!(
            credentials.access_token().map(|t| t.expose_secret().to_string()),
            Some("tok".to_string())
        );
        assert_eq!(credentials.user_id().as_deref(), Some("u-1"));

        credentials.clear();
        assert!(credentials.access_token().is_none());
    }

    #[test]
    fn test_blank_env_token_is_absent() {
        std::env::set_var("TERMINAL_ACCESS_TOKEN", "");
        let credentials = StaticCredentials::from_env();
        assert!(credentials.access_token().is_none());
        std::env::remove_var("TERMINAL_ACCESS_TOKEN");
    }

    #[test]
    fn test_debug_redacts_token() {
        let credentials = StaticCredentials::new(SecretString::new("secret-token".into()), "u-1");
        let printed = format!("{:?}", credentials);
        assert!(!printed.contains("secret-token"));
        assert!(printed.contains("REDACTED"));
    }
}
