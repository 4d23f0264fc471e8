use colored::Colorize;
use pushflow_build::extract_image_id;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// ロード応答テキストを読み込み、抽出したイメージIDを表示
pub async fn handle(file: Option<&Path>) -> anyhow::Result<()> {
    let output = match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("{} を読み込めません: {}", path.display(), e))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };

    let image_id = extract_image_id(&output);
    if image_id.is_empty() {
        eprintln!(
            "{} could not determine loaded image ID",
            "✗".red().bold()
        );
        std::process::exit(1);
    }

    println!("{}", image_id);
    Ok(())
}
