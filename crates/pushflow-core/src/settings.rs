//! 起動時に一度だけ読み込む設定

use crate::error::Result;
use crate::image::ImageIdentity;
use crate::registry::RegistryConfig;
use std::fmt;

/// プッシュ方式フラグの環境変数
pub const ENV_USE_ENGINE: &str = "USE_ENGINE";

/// プッシュ方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// ビルドエンジンから直接レジストリへプッシュ
    Engine,
    /// アーカイブをローカルの Docker デーモンに読み込ませてからプッシュ
    Daemon,
}

impl StrategyKind {
    /// フラグ値からプッシュ方式を決定
    ///
    /// 大文字小文字を区別せず `false` と完全一致した場合のみ `Daemon`。
    /// 未指定を含むそれ以外の値はすべて `Engine` になります。
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag {
            Some(value) if value.to_lowercase() == "false" => StrategyKind::Daemon,
            _ => StrategyKind::Engine,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Engine => "engine",
            StrategyKind::Daemon => "daemon",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1回のプッシュに必要な設定一式
#[derive(Debug, Clone)]
pub struct Settings {
    pub registry: RegistryConfig,
    pub image: ImageIdentity,
    pub strategy: StrategyKind,
}

impl Settings {
    /// 環境変数から読み込む
    pub fn from_env() -> Result<Self> {
        let registry = RegistryConfig::from_env()?;
        let image = ImageIdentity::from_env()?;
        let flag = std::env::var(ENV_USE_ENGINE).ok();

        Ok(Self {
            registry,
            image,
            strategy: StrategyKind::from_flag(flag.as_deref()),
        })
    }
}
