mod commands;

use clap::{Parser, Subcommand};
use pushflow_build::DEFAULT_BASE_IMAGE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pushflow")]
#[command(about = "コンテナイメージをビルドしてレジストリへプッシュする", long_about = None)]
struct Cli {
    /// デバッグログを表示（RUST_LOG が優先）
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// イメージをビルドしてプッシュ
    Push {
        /// レジストリアドレス（例: ghcr.io/org, localhost:5000）
        #[arg(long, env = "REG_ADDR")]
        registry: Option<String>,
        /// レジストリのユーザー名
        #[arg(long, env = "REG_USER")]
        username: Option<String>,
        /// レジストリのパスワード
        #[arg(long, env = "REG_PASS", hide_env_values = true)]
        password: Option<String>,
        /// イメージ名
        #[arg(short = 'i', long, env = "IMG_NAME")]
        image: Option<String>,
        /// イメージタグ（省略時は latest）
        #[arg(short, long, env = "IMG_TAG")]
        tag: Option<String>,
        /// false を指定すると Docker デーモン経由でプッシュ
        #[arg(long, env = "USE_ENGINE")]
        use_engine: Option<String>,
        /// ベースイメージ
        #[arg(long, default_value = DEFAULT_BASE_IMAGE)]
        base_image: String,
        /// デーモン経由プッシュ時のアーカイブ圧縮方式 (zstd, gzip, uncompressed)
        #[arg(long, default_value = "zstd")]
        compression: String,
    },
    /// イメージロード応答からイメージIDを抽出（デバッグ用）
    Extract {
        /// 応答テキストのファイル（省略時は標準入力）
        file: Option<PathBuf>,
    },
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout は結果表示に使うので、ログは stderr に出力
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Push {
            registry,
            username,
            password,
            image,
            tag,
            use_engine,
            base_image,
            compression,
        } => {
            let args = commands::push::PushArgs {
                registry,
                username,
                password,
                image,
                tag,
                use_engine,
                base_image,
                compression,
            };
            commands::push::handle(args).await?;
        }
        Commands::Extract { file } => {
            commands::extract::handle(file.as_deref()).await?;
        }
        Commands::Version => {
            println!("pushflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
