//! レジストリ認証処理
//!
//! `RegistryConfig::encode` が生成した認証トークンを Bollard の
//! `DockerCredentials` に戻す処理と、ビルドエンジン用の一時的な
//! Docker 設定ディレクトリの生成を扱います。

use crate::container::RegistryAuthBinding;
use crate::error::{BuildError, BuildResult};
use base64::Engine;
use bollard::auth::DockerCredentials;
use pushflow_core::AuthRecord;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// ユーザーの Docker 設定ディレクトリから引き継ぐエントリ
///
/// CLI プラグイン（buildx 本体）、コンテキスト、buildx のビルダー情報。
const LINKED_ENTRIES: [&str; 3] = ["cli-plugins", "contexts", "buildx"];

/// 認証トークンをデコードして DockerCredentials に変換
pub fn decode_registry_auth(token: &str) -> BuildResult<DockerCredentials> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(token)
        .map_err(|e| BuildError::AuthToken(format!("Failed to decode auth: {}", e)))?;

    let record: AuthRecord = serde_json::from_slice(&decoded)
        .map_err(|e| BuildError::AuthToken(format!("Failed to parse auth: {}", e)))?;

    Ok(DockerCredentials {
        username: Some(record.username),
        password: Some(record.password),
        serveraddress: Some(record.serveraddress),
        ..Default::default()
    })
}

/// ユーザーの Docker 設定ディレクトリ
///
/// `DOCKER_CONFIG` が優先され、なければ `$HOME/.docker` を使います。
fn user_docker_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".docker"))
}

/// 既存の config.json を読み込む（無い・壊れている場合は空のオブジェクト）
fn load_base_config(base_dir: Option<&Path>) -> Map<String, Value> {
    let Some(path) = base_dir.map(|dir| dir.join("config.json")) else {
        return Map::new();
    };

    let content = match std::fs::read(&path) {
        Ok(content) => content,
        Err(_) => return Map::new(),
    };

    match serde_json::from_slice::<Value>(&content) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            tracing::warn!("Ignoring unreadable docker config at {:?}", path);
            Map::new()
        }
    }
}

/// 対象レジストリの認証を `auths` に書き込み、資格情報ヘルパーを外す
///
/// 他のレジストリ向けの `credsStore` / `credHelpers` はそのまま残します。
/// `credsStore` がある場合は対象レジストリだけ空のヘルパーで上書きし、
/// config.json の `auths` が読まれるようにします。
fn merge_registry_auth(config: &mut Map<String, Value>, address: &str, auth: String) {
    let has_creds_store = config
        .get("credsStore")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());

    if let Some(Value::Object(helpers)) = config.get_mut("credHelpers") {
        helpers.remove(address);
    }
    if has_creds_store {
        let helpers = config
            .entry("credHelpers")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(helpers) = helpers {
            helpers.insert(address.to_string(), Value::String(String::new()));
        }
    }

    let auths = config
        .entry("auths")
        .or_insert_with(|| Value::Object(Map::new()));
    if !auths.is_object() {
        *auths = Value::Object(Map::new());
    }
    if let Value::Object(auths) = auths {
        let mut entry = Map::new();
        entry.insert("auth".to_string(), Value::String(auth));
        auths.insert(address.to_string(), Value::Object(entry));
    }
}

#[cfg(unix)]
fn link_entry(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn link_entry(source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}

/// 1回のビルドエンジン呼び出しの間だけ存在する Docker 設定ディレクトリ
///
/// ユーザーの設定（`currentContext`、CLI プラグイン、コンテキスト、buildx の
/// ビルダー）を引き継いだうえで、対象レジストリの認証だけを差し替えます。
/// `DOCKER_CONFIG` に指定すると、config.json の `auths` から認証情報が読まれます。
/// ドロップ時にディレクトリごと削除されます（リンク先は削除されません）。
#[derive(Debug)]
pub struct ScopedDockerConfig {
    dir: TempDir,
}

impl ScopedDockerConfig {
    /// ユーザーの Docker 設定を元に、レジストリ認証を書き込んだ設定ディレクトリを作成
    pub fn create(binding: &RegistryAuthBinding) -> BuildResult<Self> {
        let base_dir = user_docker_config_dir();
        Self::create_from(base_dir.as_deref(), binding)
    }

    /// `base_dir` の設定を元に設定ディレクトリを作成
    pub fn create_from(
        base_dir: Option<&Path>,
        binding: &RegistryAuthBinding,
    ) -> BuildResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pushflow-docker-config-")
            .tempdir()?;

        let credentials = format!("{}:{}", binding.username, binding.secret.expose());
        let auth = base64::engine::general_purpose::STANDARD.encode(credentials);

        let mut config = load_base_config(base_dir);
        merge_registry_auth(&mut config, &binding.address, auth);

        let content = serde_json::to_vec_pretty(&Value::Object(config))?;
        std::fs::write(dir.path().join("config.json"), content)?;

        if let Some(base) = base_dir {
            for name in LINKED_ENTRIES {
                let source = base.join(name);
                if source.exists() {
                    link_entry(&source, &dir.path().join(name))?;
                }
            }
        }

        tracing::debug!(
            "Wrote scoped docker config for {} at {:?} (base: {:?})",
            binding.address,
            dir.path(),
            base_dir
        );

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
