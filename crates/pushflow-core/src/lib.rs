//! PushFlow core model
//!
//! プッシュ先レジストリとイメージ名の定義、および環境変数からの設定読み込みを提供します。

pub mod error;
pub mod image;
pub mod registry;
pub mod settings;

pub use error::{ConfigError, Result};
pub use image::{DEFAULT_TAG, ImageIdentity};
pub use registry::{AuthRecord, RegistryConfig};
pub use settings::{Settings, StrategyKind};
