//! ビルドエンジン
//!
//! コンテナ定義をビルドし、レジストリへの直接プッシュまたは
//! イメージアーカイブへのエクスポートを行います。
//! 実装は `docker buildx build` (BuildKit) を使用します。

use crate::auth::ScopedDockerConfig;
use crate::container::{Compression, ContainerSpec, Secret};
use crate::context::ContextBuilder;
use crate::error::{BuildError, BuildResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// ビルドエンジンの抽象
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// シークレットをエンジンに登録
    fn set_secret(&self, name: &str, value: &str) -> Secret;

    /// コンテナをビルドしてレジストリへプッシュ
    ///
    /// エンジンが正規化した参照（ダイジェスト付きなど）を返します。
    async fn publish(&self, container: &ContainerSpec, reference: &str) -> BuildResult<String>;

    /// コンテナをビルドしてイメージアーカイブに書き出す
    ///
    /// アーカイブが生成されなかった場合は `Ok(false)` を返します。
    async fn export(
        &self,
        container: &ContainerSpec,
        path: &Path,
        compression: Compression,
    ) -> BuildResult<bool>;
}

/// `--metadata-file` の内容
#[derive(Debug, Deserialize)]
struct BuildMetadata {
    #[serde(rename = "containerimage.digest")]
    digest: Option<String>,
}

/// docker buildx を使うビルドエンジン
#[derive(Debug, Clone)]
pub struct BuildxEngine {
    docker_bin: String,
}

impl BuildxEngine {
    /// buildx が利用可能か確認して接続
    pub async fn connect() -> BuildResult<Self> {
        Self::connect_with_binary("docker").await
    }

    /// docker CLI のパスを指定して接続
    pub async fn connect_with_binary(docker_bin: impl Into<String>) -> BuildResult<Self> {
        let docker_bin = docker_bin.into();

        let output = Command::new(&docker_bin)
            .args(["buildx", "version"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                BuildError::EngineConnection(format!("failed to run {}: {}", docker_bin, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::EngineConnection(stderr.trim().to_string()));
        }

        tracing::debug!(
            "Connected to build engine: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );

        Ok(Self { docker_bin })
    }

    /// コンテキストを標準入力に流して `docker buildx build` を実行
    async fn run_build(
        &self,
        container: &ContainerSpec,
        args: &[String],
        docker_config: Option<&Path>,
    ) -> BuildResult<()> {
        let context = ContextBuilder::create_context(container)?;

        let mut cmd = Command::new(&self.docker_bin);
        cmd.arg("buildx").arg("build").args(args).arg("-");
        if let Some(dir) = docker_config {
            cmd.env("DOCKER_CONFIG", dir);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} buildx build {} -", self.docker_bin, args.join(" "));

        let mut child = cmd.spawn().map_err(|e| {
            BuildError::CommandFailed(format!("failed to run docker buildx: {}", e))
        })?;

        // stdin への書き込みは stdout/stderr の読み出しと並行して行う
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                stdin.write_all(&context).await?;
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            let written = writer.await.map_err(|e| {
                BuildError::CommandFailed(format!("context writer task failed: {}", e))
            })?;
            // ビルド失敗時は終了状態のエラーを優先
            if let Err(e) = written
                && output.status.success()
            {
                return Err(BuildError::Io(e));
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuildError::CommandFailed(format!(
                "docker buildx build failed:\n{}",
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// プッシュ用の buildx 引数
fn publish_args(reference: &str, metadata_file: &Path) -> Vec<String> {
    vec![
        "--push".to_string(),
        "-t".to_string(),
        reference.to_string(),
        "--metadata-file".to_string(),
        metadata_file.display().to_string(),
    ]
}

/// エクスポート用の buildx 引数
fn export_args(path: &Path, compression: Compression) -> Vec<String> {
    vec![
        "--output".to_string(),
        format!(
            "type=docker,dest={},compression={},force-compression=true",
            path.display(),
            compression
        ),
    ]
}

/// プッシュ結果の参照を正規化（ダイジェストがあれば `ref@digest`）
fn normalize_reference(reference: &str, metadata: &str) -> String {
    match serde_json::from_str::<BuildMetadata>(metadata) {
        Ok(BuildMetadata {
            digest: Some(digest),
        }) if !digest.is_empty() => format!("{}@{}", reference, digest),
        _ => reference.to_string(),
    }
}

#[async_trait]
impl BuildEngine for BuildxEngine {
    fn set_secret(&self, name: &str, value: &str) -> Secret {
        Secret::new(name, value)
    }

    async fn publish(&self, container: &ContainerSpec, reference: &str) -> BuildResult<String> {
        let workdir = tempfile::Builder::new()
            .prefix("pushflow-publish-")
            .tempdir()?;
        let metadata_file = workdir.path().join("metadata.json");

        // レジストリ認証は呼び出しの間だけ有効
        let docker_config = container
            .registry_auth()
            .map(ScopedDockerConfig::create)
            .transpose()?;

        self.run_build(
            container,
            &publish_args(reference, &metadata_file),
            docker_config.as_ref().map(|c| c.path()),
        )
        .await?;

        let metadata = tokio::fs::read_to_string(&metadata_file)
            .await
            .unwrap_or_default();

        Ok(normalize_reference(reference, &metadata))
    }

    async fn export(
        &self,
        container: &ContainerSpec,
        path: &Path,
        compression: Compression,
    ) -> BuildResult<bool> {
        self.run_build(container, &export_args(path, compression), None)
            .await?;

        Ok(tokio::fs::try_exists(path).await.unwrap_or(false))
    }
}
