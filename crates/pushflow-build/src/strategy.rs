//! プッシュ方式
//!
//! ビルドエンジンから直接プッシュする `EnginePush` と、
//! イメージアーカイブをローカルの Docker デーモン経由でプッシュする `DaemonPush` を提供します。
//! どちらも `PublishStrategy` として `Publisher` から呼び出されます。

use crate::container::{Compression, ContainerSpec};
use crate::daemon::{DaemonClient, DockerDaemon, PushOptions};
use crate::engine::{BuildEngine, BuildxEngine};
use crate::error::{BuildError, BuildResult};
use crate::extract::extract_image_id;
use async_trait::async_trait;
use pushflow_core::{ImageIdentity, RegistryConfig, StrategyKind};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// レジストリパスワードを登録するシークレット名
pub const REGISTRY_SECRET_NAME: &str = "reg-pass";

/// プッシュ方式の抽象
#[async_trait]
pub trait PublishStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// コンテナをビルドしてプッシュし、プッシュした参照を返す
    async fn publish(
        &self,
        container: &ContainerSpec,
        registry: &RegistryConfig,
        image: &ImageIdentity,
    ) -> BuildResult<String>;
}

/// ビルドエンジンから直接プッシュ
pub struct EnginePush<E> {
    engine: E,
}

impl<E: BuildEngine> EnginePush<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<E: BuildEngine> PublishStrategy for EnginePush<E> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Engine
    }

    async fn publish(
        &self,
        container: &ContainerSpec,
        registry: &RegistryConfig,
        image: &ImageIdentity,
    ) -> BuildResult<String> {
        let reference = image.full_ref(registry.address());

        let mut container = container.clone();
        if registry.has_credentials()
            && let (Some(username), Some(password)) = (registry.username(), registry.password())
        {
            let secret = self.engine.set_secret(REGISTRY_SECRET_NAME, password);
            container = container.with_registry_auth(registry.address(), username, secret);
        }

        tracing::info!("Publishing {} with build engine", reference);

        let pushed = self
            .engine
            .publish(&container, &reference)
            .await
            .map_err(|e| BuildError::EnginePush {
                message: e.to_string(),
            })?;

        tracing::info!("Pushed with build engine: {}", pushed);
        Ok(pushed)
    }
}

/// イメージアーカイブを Docker デーモンに読み込ませてからプッシュ
///
/// デーモンへの接続は構築前に済ませておきます。
pub struct DaemonPush<E, D> {
    engine: E,
    daemon: D,
    compression: Compression,
    archive_dir: PathBuf,
}

impl<E: BuildEngine, D: DaemonClient> DaemonPush<E, D> {
    pub fn new(engine: E, daemon: D) -> Self {
        Self {
            engine,
            daemon,
            compression: Compression::default(),
            archive_dir: std::env::temp_dir(),
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// アーカイブを書き出すディレクトリを指定
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }
}

/// イメージごとに一意なアーカイブパス
///
/// 同じプロセスで別のイメージを並行してプッシュしても衝突しないよう、
/// イメージ名とタグをファイル名に含めます。
pub fn archive_path(dir: &Path, image: &ImageIdentity) -> PathBuf {
    let scoped: String = image
        .local_ref()
        .chars()
        .map(|c| if c == '/' || c == ':' { '-' } else { c })
        .collect();
    dir.join(format!("pushflow-push-{}.tar", scoped))
}

#[async_trait]
impl<E: BuildEngine, D: DaemonClient> PublishStrategy for DaemonPush<E, D> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Daemon
    }

    async fn publish(
        &self,
        container: &ContainerSpec,
        registry: &RegistryConfig,
        image: &ImageIdentity,
    ) -> BuildResult<String> {
        let path = archive_path(&self.archive_dir, image);

        // ドロップ時にアーカイブを削除する（成功・失敗どちらでも）
        let archive = TempPath::from_path(&path);

        tracing::info!("Exporting image as tarball to {}", path.display());
        match self.engine.export(container, &path, self.compression).await {
            Ok(true) => {}
            Ok(false) => return Err(BuildError::ExportIncomplete { path }),
            Err(e) => {
                return Err(BuildError::ExportFailed {
                    message: e.to_string(),
                });
            }
        }

        tracing::info!("Loading image into Docker daemon...");
        let tarball = tokio::fs::File::open(&archive)
            .await
            .map_err(|source| BuildError::ArchiveRead {
                path: path.clone(),
                source,
            })?;
        let load_output = self.daemon.load_image(tarball).await?;
        tracing::debug!("Load response: {}", load_output.trim_end());

        let source_ref = extract_image_id(&load_output);
        if source_ref.is_empty() {
            return Err(BuildError::ImageIdNotFound);
        }

        let target_ref = image.full_ref(registry.address());
        tracing::info!("Tagging image {} as {}", source_ref, target_ref);
        self.daemon.tag_image(&source_ref, &target_ref).await?;

        let mut options = PushOptions::default();
        if registry.has_credentials() {
            options.registry_auth = Some(registry.encode());
        }

        tracing::info!("Pushing {} to registry...", target_ref);
        let push_output = self.daemon.push_image(&target_ref, options).await?;
        tracing::debug!("Push response: {}", push_output.trim_end());

        tracing::info!("Pushed with Docker: {}", target_ref);
        Ok(target_ref)
    }
}

/// プッシュ結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub published_ref: String,
    pub strategy: StrategyKind,
}

/// 選択したプッシュ方式で1回のプッシュを実行
pub struct Publisher {
    strategy: Box<dyn PublishStrategy>,
}

impl Publisher {
    pub fn new(strategy: Box<dyn PublishStrategy>) -> Self {
        Self { strategy }
    }

    /// プッシュ方式に応じてビルドエンジンと Docker デーモンに接続
    pub async fn connect(kind: StrategyKind, compression: Compression) -> BuildResult<Self> {
        tracing::info!("Connecting to build engine...");
        let engine = BuildxEngine::connect().await?;

        let strategy: Box<dyn PublishStrategy> = match kind {
            StrategyKind::Engine => Box::new(EnginePush::new(engine)),
            StrategyKind::Daemon => {
                tracing::info!("Connecting to Docker daemon...");
                let daemon = DockerDaemon::connect().await?;
                Box::new(DaemonPush::new(engine, daemon).with_compression(compression))
            }
        };

        Ok(Self::new(strategy))
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub async fn publish(
        &self,
        container: &ContainerSpec,
        registry: &RegistryConfig,
        image: &ImageIdentity,
    ) -> BuildResult<PublishOutcome> {
        tracing::info!("Using {} strategy for push...", self.kind());

        let published_ref = self.strategy.publish(container, registry, image).await?;

        Ok(PublishOutcome {
            published_ref,
            strategy: self.kind(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Secret;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncReadExt;

    #[derive(Clone, Copy)]
    enum ExportBehavior {
        Write,
        Missing,
        Fail,
    }

    #[derive(Default)]
    struct EngineCalls {
        secrets: Vec<(String, String)>,
        published: Vec<(ContainerSpec, String)>,
        exported: Vec<(PathBuf, Compression)>,
    }

    #[derive(Clone)]
    struct FakeEngine {
        calls: Arc<Mutex<EngineCalls>>,
        publish_error: Option<String>,
        export: ExportBehavior,
    }

    impl FakeEngine {
        fn new() -> Self {
            Self {
                calls: Arc::default(),
                publish_error: None,
                export: ExportBehavior::Write,
            }
        }
    }

    #[async_trait]
    impl BuildEngine for FakeEngine {
        fn set_secret(&self, name: &str, value: &str) -> Secret {
            self.calls
                .lock()
                .unwrap()
                .secrets
                .push((name.to_string(), value.to_string()));
            Secret::new(name, value)
        }

        async fn publish(
            &self,
            container: &ContainerSpec,
            reference: &str,
        ) -> BuildResult<String> {
            self.calls
                .lock()
                .unwrap()
                .published
                .push((container.clone(), reference.to_string()));
            match &self.publish_error {
                Some(message) => Err(BuildError::CommandFailed(message.clone())),
                None => Ok(reference.to_string()),
            }
        }

        async fn export(
            &self,
            _container: &ContainerSpec,
            path: &Path,
            compression: Compression,
        ) -> BuildResult<bool> {
            self.calls
                .lock()
                .unwrap()
                .exported
                .push((path.to_path_buf(), compression));
            match self.export {
                ExportBehavior::Write => {
                    std::fs::write(path, b"fake image archive")?;
                    Ok(true)
                }
                ExportBehavior::Missing => Ok(false),
                ExportBehavior::Fail => Err(BuildError::CommandFailed("no space left".into())),
            }
        }
    }

    #[derive(Default)]
    struct DaemonCalls {
        loaded: Vec<Vec<u8>>,
        tagged: Vec<(String, String)>,
        pushed: Vec<(String, PushOptions)>,
    }

    #[derive(Clone)]
    struct FakeDaemon {
        calls: Arc<Mutex<DaemonCalls>>,
        load_output: String,
        tag_error: bool,
        push_error: bool,
    }

    impl FakeDaemon {
        fn new(load_output: &str) -> Self {
            Self {
                calls: Arc::default(),
                load_output: load_output.to_string(),
                tag_error: false,
                push_error: false,
            }
        }
    }

    #[async_trait]
    impl DaemonClient for FakeDaemon {
        async fn load_image(&self, mut archive: tokio::fs::File) -> BuildResult<String> {
            let mut data = Vec::new();
            archive.read_to_end(&mut data).await?;
            self.calls.lock().unwrap().loaded.push(data);
            Ok(self.load_output.clone())
        }

        async fn tag_image(&self, source: &str, target: &str) -> BuildResult<()> {
            self.calls
                .lock()
                .unwrap()
                .tagged
                .push((source.to_string(), target.to_string()));
            if self.tag_error {
                return Err(BuildError::TagFailed {
                    source_ref: source.to_string(),
                    target_ref: target.to_string(),
                    message: "No such image".to_string(),
                });
            }
            Ok(())
        }

        async fn push_image(&self, reference: &str, options: PushOptions) -> BuildResult<String> {
            self.calls
                .lock()
                .unwrap()
                .pushed
                .push((reference.to_string(), options));
            if self.push_error {
                return Err(BuildError::PushFailed {
                    message: "connection refused".to_string(),
                });
            }
            // レイヤーエラーを含む応答でも呼び出しは成功
            Ok("Preparing\nerror: blob upload unknown\nPushed\n".to_string())
        }
    }

    fn registry(with_creds: bool) -> RegistryConfig {
        if with_creds {
            RegistryConfig::new(
                "registry.example.com/",
                Some("ci".into()),
                Some("s3cret".into()),
            )
            .unwrap()
        } else {
            RegistryConfig::new("registry.example.com/", None, None).unwrap()
        }
    }

    fn image() -> ImageIdentity {
        ImageIdentity::new("myimg", None).unwrap()
    }

    fn container() -> ContainerSpec {
        ContainerSpec::hello_world("python:3.11-slim")
    }

    #[test]
    fn test_archive_path_is_scoped_to_image() {
        let img = ImageIdentity::new("org/app", Some("v1".into())).unwrap();
        assert_eq!(
            archive_path(Path::new("/tmp"), &img),
            PathBuf::from("/tmp/pushflow-push-org-app-v1.tar")
        );

        let other = ImageIdentity::new("org/app", Some("v2".into())).unwrap();
        assert_ne!(
            archive_path(Path::new("/tmp"), &img),
            archive_path(Path::new("/tmp"), &other)
        );
    }

    #[tokio::test]
    async fn test_engine_push_without_credentials() {
        let engine = FakeEngine::new();
        let publisher = Publisher::new(Box::new(EnginePush::new(engine.clone())));

        let outcome = publisher
            .publish(&container(), &registry(false), &image())
            .await
            .unwrap();

        assert_eq!(outcome.published_ref, "registry.example.com/myimg:latest");
        assert_eq!(outcome.strategy, StrategyKind::Engine);

        let calls = engine.calls.lock().unwrap();
        assert!(calls.secrets.is_empty());
        assert_eq!(calls.published.len(), 1);
        assert!(calls.published[0].0.registry_auth().is_none());
        assert!(calls.exported.is_empty());
    }

    #[tokio::test]
    async fn test_engine_push_attaches_secret() {
        let engine = FakeEngine::new();
        let strategy = EnginePush::new(engine.clone());

        strategy
            .publish(&container(), &registry(true), &image())
            .await
            .unwrap();

        let calls = engine.calls.lock().unwrap();
        assert_eq!(
            calls.secrets,
            vec![(REGISTRY_SECRET_NAME.to_string(), "s3cret".to_string())]
        );
        let auth = calls.published[0].0.registry_auth().unwrap();
        assert_eq!(auth.address, "registry.example.com");
        assert_eq!(auth.username, "ci");
        assert_eq!(auth.secret.expose(), "s3cret");
    }

    #[tokio::test]
    async fn test_engine_push_error_is_wrapped() {
        let mut engine = FakeEngine::new();
        engine.publish_error = Some("unauthorized".to_string());
        let strategy = EnginePush::new(engine);

        let err = strategy
            .publish(&container(), &registry(false), &image())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::EnginePush { .. }));
        assert!(err.to_string().starts_with("failed to push"));
        assert!(err.to_string().contains("unauthorized"));
    }

    #[tokio::test]
    async fn test_daemon_push_with_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let daemon = FakeDaemon::new("Loaded image: myimg:latest\n");
        let publisher = Publisher::new(Box::new(
            DaemonPush::new(engine.clone(), daemon.clone()).with_archive_dir(dir.path()),
        ));
        let reg = registry(true);

        let outcome = publisher
            .publish(&container(), &reg, &image())
            .await
            .unwrap();

        assert_eq!(outcome.published_ref, "registry.example.com/myimg:latest");
        assert_eq!(outcome.strategy, StrategyKind::Daemon);

        let engine_calls = engine.calls.lock().unwrap();
        assert_eq!(engine_calls.exported.len(), 1);
        assert_eq!(engine_calls.exported[0].1, Compression::Zstd);
        let archive = engine_calls.exported[0].0.clone();

        let daemon_calls = daemon.calls.lock().unwrap();
        assert_eq!(daemon_calls.loaded, vec![b"fake image archive".to_vec()]);
        assert_eq!(
            daemon_calls.tagged,
            vec![(
                "myimg:latest".to_string(),
                "registry.example.com/myimg:latest".to_string()
            )]
        );

        let (pushed_ref, options) = &daemon_calls.pushed[0];
        assert_eq!(pushed_ref, "registry.example.com/myimg:latest");
        let token = options.registry_auth.as_deref().unwrap();
        assert!(!token.is_empty());
        assert_eq!(token, reg.encode());

        // アーカイブは削除済み
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_daemon_push_without_credentials_has_no_token() {
        let dir = tempfile::tempdir().unwrap();
        let daemon = FakeDaemon::new("Loaded image ID: sha256:0123456789abcdef0123\n");
        let strategy =
            DaemonPush::new(FakeEngine::new(), daemon.clone()).with_archive_dir(dir.path());

        strategy
            .publish(&container(), &registry(false), &image())
            .await
            .unwrap();

        let calls = daemon.calls.lock().unwrap();
        assert_eq!(calls.tagged[0].0, "sha256:0123456789ab");
        assert_eq!(calls.pushed[0].1, PushOptions::default());
    }

    #[tokio::test]
    async fn test_daemon_push_unknown_load_output() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let daemon = FakeDaemon::new("Loading layer [=====>] 1.2MB/3.4MB\n");
        let strategy =
            DaemonPush::new(engine.clone(), daemon.clone()).with_archive_dir(dir.path());

        let err = strategy
            .publish(&container(), &registry(true), &image())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::ImageIdNotFound));
        assert_eq!(err.to_string(), "could not determine loaded image ID");

        let daemon_calls = daemon.calls.lock().unwrap();
        assert!(daemon_calls.tagged.is_empty());
        assert!(daemon_calls.pushed.is_empty());

        let archive = engine.calls.lock().unwrap().exported[0].0.clone();
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_daemon_push_export_not_produced() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = FakeEngine::new();
        engine.export = ExportBehavior::Missing;
        let daemon = FakeDaemon::new("Loaded image: myimg:latest\n");
        let strategy = DaemonPush::new(engine, daemon.clone()).with_archive_dir(dir.path());

        let err = strategy
            .publish(&container(), &registry(false), &image())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::ExportIncomplete { .. }));
        assert!(daemon.calls.lock().unwrap().loaded.is_empty());
    }

    #[tokio::test]
    async fn test_daemon_push_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = FakeEngine::new();
        engine.export = ExportBehavior::Fail;
        let strategy = DaemonPush::new(engine, FakeDaemon::new("")).with_archive_dir(dir.path());

        let err = strategy
            .publish(&container(), &registry(false), &image())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::ExportFailed { .. }));
        assert!(err.to_string().contains("no space left"));
    }

    #[tokio::test]
    async fn test_daemon_push_tag_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FakeEngine::new();
        let mut daemon = FakeDaemon::new("Loaded image: myimg:latest\n");
        daemon.tag_error = true;
        let strategy =
            DaemonPush::new(engine.clone(), daemon.clone()).with_archive_dir(dir.path());

        let err = strategy
            .publish(&container(), &registry(false), &image())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::TagFailed { .. }));
        assert!(daemon.calls.lock().unwrap().pushed.is_empty());

        let archive = engine.calls.lock().unwrap().exported[0].0.clone();
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_daemon_push_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = FakeDaemon::new("Loaded image: myimg:latest\n");
        daemon.push_error = true;
        let strategy = DaemonPush::new(FakeEngine::new(), daemon).with_archive_dir(dir.path());

        let err = strategy
            .publish(&container(), &registry(true), &image())
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::PushFailed { .. }));
    }
}
