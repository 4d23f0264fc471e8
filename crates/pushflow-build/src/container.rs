//! ビルドするコンテナの定義
//!
//! ベースイメージ・追加ファイル・作業ディレクトリ・エントリポイントを宣言的に保持し、
//! ビルドエンジンに渡す Dockerfile を生成します。

use crate::error::BuildError;
use std::fmt;
use std::str::FromStr;

/// デフォルトのベースイメージ
pub const DEFAULT_BASE_IMAGE: &str = "python:3.11-slim";

/// コンテナに書き込むファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// コンテナ内の絶対パス
    pub path: String,
    pub contents: String,
    /// パーミッション (例: 0o755)
    pub permissions: u32,
}

/// ビルドエンジンに登録されたシークレット
///
/// 値はログや Debug 出力に現れません。
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    name: String,
    value: String,
}

impl Secret {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("name", &self.name)
            .field("value", &"********")
            .finish()
    }
}

/// コンテナに紐付けたレジストリ認証
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryAuthBinding {
    pub address: String,
    pub username: String,
    pub secret: Secret,
}

/// エクスポート時の圧縮方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    Zstd,
    Gzip,
    Uncompressed,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Zstd => "zstd",
            Compression::Gzip => "gzip",
            Compression::Uncompressed => "uncompressed",
        }
    }
}

impl FromStr for Compression {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zstd" => Ok(Compression::Zstd),
            "gzip" => Ok(Compression::Gzip),
            "uncompressed" | "none" => Ok(Compression::Uncompressed),
            other => Err(BuildError::InvalidCompression(other.to_string())),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// コンテナ定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    base_image: String,
    files: Vec<FileEntry>,
    workdir: Option<String>,
    entrypoint: Vec<String>,
    registry_auth: Option<RegistryAuthBinding>,
}

impl ContainerSpec {
    /// ベースイメージから新しい定義を作成
    pub fn from(base_image: impl Into<String>) -> Self {
        Self {
            base_image: base_image.into(),
            files: Vec::new(),
            workdir: None,
            entrypoint: Vec::new(),
            registry_auth: None,
        }
    }

    /// Hello World を出力する Python スクリプトを載せた定義
    pub fn hello_world(base_image: impl Into<String>) -> Self {
        Self::from(base_image)
            .with_new_file(
                "/app/hello.py",
                "#!/usr/bin/env python3\nprint('Hello World from PushFlow!')",
                0o755,
            )
            .with_workdir("/app")
            .with_entrypoint(["python3", "hello.py"])
    }

    pub fn with_new_file(
        mut self,
        path: impl Into<String>,
        contents: impl Into<String>,
        permissions: u32,
    ) -> Self {
        self.files.push(FileEntry {
            path: path.into(),
            contents: contents.into(),
            permissions,
        });
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_entrypoint<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = args.into_iter().map(Into::into).collect();
        self
    }

    /// プッシュ時に使うレジストリ認証を紐付ける
    pub fn with_registry_auth(
        mut self,
        address: impl Into<String>,
        username: impl Into<String>,
        secret: Secret,
    ) -> Self {
        self.registry_auth = Some(RegistryAuthBinding {
            address: address.into(),
            username: username.into(),
            secret,
        });
        self
    }

    pub fn base_image(&self) -> &str {
        &self.base_image
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn registry_auth(&self) -> Option<&RegistryAuthBinding> {
        self.registry_auth.as_ref()
    }

    /// ビルドコンテキスト内でのファイル配置先
    pub(crate) fn context_path(index: usize) -> String {
        format!("files/{}", index)
    }

    /// Dockerfile を生成
    ///
    /// 追加ファイルはビルドコンテキストの `files/<index>` に置かれ、
    /// `COPY --chmod` でコンテナ内のパスへコピーされます。
    pub fn to_dockerfile(&self) -> String {
        let mut lines = vec![format!("FROM {}", self.base_image)];

        for (index, file) in self.files.iter().enumerate() {
            lines.push(format!(
                "COPY --chmod={:o} {} {}",
                file.permissions,
                Self::context_path(index),
                file.path
            ));
        }

        if let Some(workdir) = &self.workdir {
            lines.push(format!("WORKDIR {}", workdir));
        }

        if !self.entrypoint.is_empty() {
            // exec 形式 (JSON 配列)。文字列配列のシリアライズは失敗しない
            let args = serde_json::to_string(&self.entrypoint).unwrap_or_default();
            lines.push(format!("ENTRYPOINT {}", args));
        }

        let mut dockerfile = lines.join("\n");
        dockerfile.push('\n');
        dockerfile
    }
}
