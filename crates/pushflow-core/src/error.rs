use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("必須の設定がありません: {key}\nヒント: 環境変数 {key} またはCLIフラグで指定してください")]
    Missing { key: &'static str },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
