use colored::Colorize;
use pushflow_build::{BuildError, Compression, ContainerSpec, Publisher};
use pushflow_core::{ConfigError, ImageIdentity, RegistryConfig, Settings, StrategyKind};

/// push コマンドの引数（CLIフラグまたは環境変数）
pub struct PushArgs {
    pub registry: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub image: Option<String>,
    pub tag: Option<String>,
    pub use_engine: Option<String>,
    pub base_image: String,
    pub compression: String,
}

/// 引数から設定を組み立てる
fn build_settings(args: &PushArgs) -> Result<Settings, ConfigError> {
    let registry = RegistryConfig::new(
        args.registry.clone().unwrap_or_default(),
        args.username.clone(),
        args.password.clone(),
    )?;
    let image = ImageIdentity::new(args.image.clone().unwrap_or_default(), args.tag.clone())?;

    Ok(Settings {
        registry,
        image,
        strategy: StrategyKind::from_flag(args.use_engine.as_deref()),
    })
}

fn exit_with_build_error(error: &BuildError) -> ! {
    eprintln!();
    eprintln!("{} {}", "✗".red().bold(), error.user_message());
    std::process::exit(1);
}

pub async fn handle(args: PushArgs) -> anyhow::Result<()> {
    let settings = match build_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let compression: Compression = match args.compression.parse() {
        Ok(compression) => compression,
        Err(e) => exit_with_build_error(&e),
    };

    let target_ref = settings.image.full_ref(settings.registry.address());
    println!("{}", "イメージをビルドしてプッシュします".green());
    println!("  → Image: {}", target_ref.cyan());
    println!("  → Base: {}", args.base_image.cyan());
    println!("  → Strategy: {}", settings.strategy.to_string().cyan());
    if settings.registry.has_credentials() {
        println!("  → Auth: {}", "registry credentials".cyan());
    }

    let publisher = match Publisher::connect(settings.strategy, compression).await {
        Ok(publisher) => publisher,
        Err(e) => exit_with_build_error(&e),
    };

    let container = ContainerSpec::hello_world(&args.base_image);

    match publisher
        .publish(&container, &settings.registry, &settings.image)
        .await
    {
        Ok(outcome) => {
            println!();
            println!(
                "{} {}",
                "✓ プッシュ完了:".green().bold(),
                outcome.published_ref.cyan()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("{} push failed: {}", settings.strategy, e);
            exit_with_build_error(&e)
        }
    }
}
