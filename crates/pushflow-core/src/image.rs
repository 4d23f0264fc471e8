//! プッシュするイメージの名前とタグ

use crate::error::{ConfigError, Result};
use std::fmt;

/// イメージ名の環境変数
pub const ENV_IMAGE_NAME: &str = "IMG_NAME";
/// イメージタグの環境変数
pub const ENV_IMAGE_TAG: &str = "IMG_TAG";

/// タグ未指定時のデフォルト
pub const DEFAULT_TAG: &str = "latest";

/// イメージ名とタグ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIdentity {
    name: String,
    tag: String,
}

impl ImageIdentity {
    /// 新しい ImageIdentity を作成
    ///
    /// タグが未指定または空の場合は `latest` になります。
    pub fn new(name: impl Into<String>, tag: Option<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::Missing {
                key: ENV_IMAGE_NAME,
            });
        }

        let tag = tag
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TAG.to_string());

        Ok(Self { name, tag })
    }

    /// 環境変数 `IMG_NAME` / `IMG_TAG` から作成
    pub fn from_env() -> Result<Self> {
        let name = std::env::var(ENV_IMAGE_NAME).unwrap_or_default();
        Self::new(name, std::env::var(ENV_IMAGE_TAG).ok())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// ローカル参照 `name:tag`
    pub fn local_ref(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// レジストリ込みの参照 `address/name:tag`
    pub fn full_ref(&self, registry_addr: &str) -> String {
        format!("{}/{}", registry_addr, self.local_ref())
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryConfig;

    #[test]
    fn test_default_tag() {
        let img = ImageIdentity::new("myapp", None).unwrap();
        assert_eq!(img.local_ref(), "myapp:latest");

        let img = ImageIdentity::new("myapp", Some(String::new())).unwrap();
        assert_eq!(img.local_ref(), "myapp:latest");
    }

    #[test]
    fn test_explicit_tag() {
        let img = ImageIdentity::new("org/myapp", Some("v1.2.0".into())).unwrap();
        assert_eq!(img.local_ref(), "org/myapp:v1.2.0");
        assert_eq!(img.to_string(), "org/myapp:v1.2.0");
    }

    #[test]
    fn test_full_ref() {
        let img = ImageIdentity::new("myapp", Some("dev".into())).unwrap();
        assert_eq!(img.full_ref("localhost:5000"), "localhost:5000/myapp:dev");
    }

    #[test]
    fn test_full_ref_with_trailing_slash_registry() {
        let img = ImageIdentity::new("myapp", None).unwrap();
        for input in ["ghcr.io/org", "ghcr.io/org/"] {
            let reg = RegistryConfig::new(input, None, None).unwrap();
            assert_eq!(img.full_ref(reg.address()), "ghcr.io/org/myapp:latest");
        }
    }

    #[test]
    fn test_missing_name() {
        assert_eq!(
            ImageIdentity::new("", Some("v1".into())).unwrap_err(),
            ConfigError::Missing {
                key: ENV_IMAGE_NAME
            }
        );
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [(ENV_IMAGE_NAME, Some("hello")), (ENV_IMAGE_TAG, None::<&str>)],
            || {
                let img = ImageIdentity::from_env().unwrap();
                assert_eq!(img.name(), "hello");
                assert_eq!(img.tag(), "latest");
            },
        );
    }
}
