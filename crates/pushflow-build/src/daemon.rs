//! ローカル Docker デーモン操作
//!
//! イメージアーカイブのロード、タグ付け、レジストリへのプッシュを行います。

use crate::auth::decode_registry_auth;
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{BuildInfo, PushImageInfo};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// アーカイブ送信時のチャンクサイズ
const ARCHIVE_CHUNK_SIZE: usize = 64 * 1024;

/// プッシュオプション
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// `RegistryConfig::encode` で生成した認証トークン
    pub registry_auth: Option<String>,
}

/// Docker デーモンの抽象
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// イメージアーカイブをロードし、応答テキストをすべて読み切って返す
    async fn load_image(&self, archive: File) -> BuildResult<String>;

    /// `source` を `target` としてタグ付け
    async fn tag_image(&self, source: &str, target: &str) -> BuildResult<()>;

    /// イメージをプッシュし、応答テキストをすべて読み切って返す
    async fn push_image(&self, reference: &str, options: PushOptions) -> BuildResult<String>;
}

/// Bollard を使った Docker デーモンクライアント
pub struct DockerDaemon {
    docker: Docker,
}

impl DockerDaemon {
    /// ローカルのデフォルト設定で接続し、疎通を確認
    pub async fn connect() -> BuildResult<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(BuildError::DaemonConnection)?;
        docker.ping().await.map_err(BuildError::DaemonConnection)?;
        Ok(Self { docker })
    }
}

/// ファイルをチャンク単位で読み出すストリーム
///
/// 読み込みエラーが起きた時点でストリームを終了します。
/// 途中で切れたアーカイブはデーモン側でロード失敗になります。
fn archive_stream(file: File) -> impl Stream<Item = Bytes> + Send + 'static {
    futures_util::stream::unfold(file, |mut file| async move {
        let mut buf = vec![0u8; ARCHIVE_CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Bytes::from(buf), file))
            }
            Err(e) => {
                tracing::warn!("Failed to read archive chunk: {}", e);
                None
            }
        }
    })
}

/// イメージ参照をリポジトリとタグに分離
///
/// # Examples
/// - `ghcr.io/org/app:v1.0` -> `("ghcr.io/org/app", "v1.0")`
/// - `ghcr.io/org/app` -> `("ghcr.io/org/app", "latest")`
/// - `localhost:5000/app:dev` -> `("localhost:5000/app", "dev")`
/// - `localhost:5000/app` -> `("localhost:5000/app", "latest")`
pub fn split_image_tag(image: &str) -> (String, String) {
    if let Some(pos) = image.rfind(':') {
        let potential_tag = &image[pos + 1..];
        let potential_image = &image[..pos];

        // レジストリのポート番号の後ろには必ず `/` が続く
        if !potential_tag.contains('/') {
            return (potential_image.to_string(), potential_tag.to_string());
        }
    }

    (image.to_string(), "latest".to_string())
}

/// イメージロードの応答ストリームを読み切ってテキストにまとめる
///
/// `stream` と `status` を行単位で連結します。`error` を含むメッセージは
/// ロード失敗として扱います。
async fn collect_load_output<S>(stream: S) -> BuildResult<String>
where
    S: Stream<Item = Result<BuildInfo, bollard::errors::Error>>,
{
    futures_util::pin_mut!(stream);

    let mut output = String::new();
    while let Some(result) = stream.next().await {
        let info = result.map_err(|e| BuildError::LoadFailed {
            message: e.to_string(),
        })?;

        if let Some(error) = info.error {
            return Err(BuildError::LoadFailed { message: error });
        }
        if let Some(text) = info.stream {
            output.push_str(&text);
            if !text.ends_with('\n') {
                output.push('\n');
            }
        }
        if let Some(status) = info.status {
            output.push_str(&status);
            output.push('\n');
        }
    }

    Ok(output)
}

/// プッシュの応答ストリームを読み切ってテキストにまとめる
///
/// ストリーム自体のエラーはプッシュ失敗です。
async fn collect_push_output<S>(reference: &str, stream: S) -> BuildResult<String>
where
    S: Stream<Item = Result<PushImageInfo, bollard::errors::Error>>,
{
    futures_util::pin_mut!(stream);

    let mut output = String::new();
    while let Some(result) = stream.next().await {
        let info = result.map_err(|e| BuildError::PushFailed {
            message: e.to_string(),
        })?;

        // レイヤー単位のエラーは呼び出し自体の失敗として扱わない
        if let Some(err) = &info.error {
            tracing::warn!("Push reported error for {}: {}", reference, err);
            output.push_str(err);
            output.push('\n');
        }
        if let Some(status) = &info.status {
            output.push_str(status);
            if let Some(progress) = &info.progress {
                output.push(' ');
                output.push_str(progress);
            }
            output.push('\n');
        }
    }

    Ok(output)
}

#[async_trait]
impl DaemonClient for DockerDaemon {
    async fn load_image(&self, archive: File) -> BuildResult<String> {
        #[allow(deprecated)]
        let options = bollard::image::ImportImageOptions { quiet: false };

        #[allow(deprecated)]
        let stream = self
            .docker
            .import_image_stream(options, archive_stream(archive), None);

        collect_load_output(stream).await
    }

    async fn tag_image(&self, source: &str, target: &str) -> BuildResult<()> {
        let (repo, tag) = split_image_tag(target);

        #[allow(deprecated)]
        let options = bollard::image::TagImageOptions { repo, tag };

        #[allow(deprecated)]
        let result = self.docker.tag_image(source, Some(options)).await;

        result.map_err(|e| BuildError::TagFailed {
            source_ref: source.to_string(),
            target_ref: target.to_string(),
            message: e.to_string(),
        })
    }

    async fn push_image(&self, reference: &str, options: PushOptions) -> BuildResult<String> {
        let (image, tag) = split_image_tag(reference);

        let credentials = options
            .registry_auth
            .as_deref()
            .map(decode_registry_auth)
            .transpose()?;

        #[allow(deprecated)]
        let push_options = bollard::image::PushImageOptions::<String> { tag };

        #[allow(deprecated)]
        let stream = self
            .docker
            .push_image(&image, Some(push_options), credentials);

        collect_push_output(reference, stream).await
    }
}
