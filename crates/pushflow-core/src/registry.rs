//! プッシュ先レジストリの設定
//!
//! レジストリアドレスと認証情報を保持し、Docker Engine API の
//! `X-Registry-Auth` ヘッダに載せられる認証トークンを生成します。

use crate::error::{ConfigError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// レジストリアドレスの環境変数
pub const ENV_REGISTRY_ADDR: &str = "REG_ADDR";
/// レジストリユーザー名の環境変数
pub const ENV_REGISTRY_USER: &str = "REG_USER";
/// レジストリパスワードの環境変数
pub const ENV_REGISTRY_PASS: &str = "REG_PASS";

/// Docker の AuthConfig と同じ JSON 形式の認証レコード
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serveraddress: String,
}

/// プッシュ先レジストリ
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    address: String,
    username: Option<String>,
    password: Option<String>,
}

impl RegistryConfig {
    /// 新しい RegistryConfig を作成
    ///
    /// アドレス末尾の `/` は1つだけ取り除かれます。
    /// 空文字列の認証情報は未指定として扱います。
    pub fn new(
        address: impl Into<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self> {
        let address = address.into();
        if address.is_empty() {
            return Err(ConfigError::Missing {
                key: ENV_REGISTRY_ADDR,
            });
        }

        let address = match address.strip_suffix('/') {
            Some(stripped) => stripped.to_string(),
            None => address,
        };

        Ok(Self {
            address,
            username: username.filter(|u| !u.is_empty()),
            password: password.filter(|p| !p.is_empty()),
        })
    }

    /// 環境変数 `REG_ADDR` / `REG_USER` / `REG_PASS` から作成
    pub fn from_env() -> Result<Self> {
        let address = std::env::var(ENV_REGISTRY_ADDR).unwrap_or_default();
        Self::new(
            address,
            std::env::var(ENV_REGISTRY_USER).ok(),
            std::env::var(ENV_REGISTRY_PASS).ok(),
        )
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// ユーザー名とパスワードが両方とも指定されているか
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// 認証レコードを組み立てる
    pub fn auth_record(&self) -> AuthRecord {
        AuthRecord {
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            serveraddress: self.address.clone(),
        }
    }

    /// 認証トークンを生成
    ///
    /// 認証レコードを JSON にシリアライズし、標準 Base64 でエンコードします。
    pub fn encode(&self) -> String {
        // 文字列フィールドのみの構造体なのでシリアライズは失敗しない
        let json = serde_json::to_vec(&self.auth_record()).unwrap_or_default();
        base64::engine::general_purpose::STANDARD.encode(json)
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}
