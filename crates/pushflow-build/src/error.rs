use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Build engine connection error: {0}")]
    EngineConnection(String),

    #[error("Docker connection error: {0}")]
    DaemonConnection(#[source] bollard::errors::Error),

    #[error("failed to push: {message}")]
    EnginePush { message: String },

    #[error("failed to export container: {message}")]
    ExportFailed { message: String },

    #[error("failed to export container to {}", path.display())]
    ExportIncomplete { path: PathBuf },

    #[error("failed to read tarball {}: {source}", path.display())]
    ArchiveRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load image: {message}")]
    LoadFailed { message: String },

    #[error("could not determine loaded image ID")]
    ImageIdNotFound,

    #[error("failed to tag image {source_ref} as {target_ref}: {message}")]
    TagFailed {
        source_ref: String,
        target_ref: String,
        message: String,
    },

    #[error("failed to push image: {message}")]
    PushFailed { message: String },

    #[error("Invalid registry auth token: {0}")]
    AuthToken(String),

    #[error("Invalid compression: {0} (expected zstd, gzip or uncompressed)")]
    InvalidCompression(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DaemonConnection(e) => {
                format!(
                    "Docker接続エラー: {}\n\
                     \n\
                     解決方法:\n\
                     • Dockerが起動しているか確認してください\n\
                     • docker ps コマンドが正常に動作するか確認してください",
                    e
                )
            }
            BuildError::EngineConnection(msg) => {
                format!(
                    "ビルドエンジンに接続できません: {}\n\
                     \n\
                     docker buildx がインストールされているか確認してください。",
                    msg
                )
            }
            BuildError::ImageIdNotFound => "could not determine loaded image ID\n\
                 \n\
                 Docker デーモンの応答からイメージIDを読み取れませんでした。\n\
                 `pushflow extract` で応答テキストを確認してください。"
                .to_string(),
            _ => format!("{}", self),
        }
    }
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
