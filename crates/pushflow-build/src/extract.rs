//! イメージロード応答からのイメージID抽出
//!
//! Docker デーモンの `load` 応答は型付きの API ではなく、バージョンによって
//! 形の変わるテキストです。ここでは既知の2つの形を上から順に走査し、
//! 最初に見つかった識別子を返します。
//!
//! - `Loaded image: <ref>` 行: ラベル以降をそのまま参照として返す
//! - `sha256:<digest>` を含む行: 先頭12文字に短縮した `sha256:<short>` を返す
//!
//! 複数の候補行がある場合も、より具体的な行ではなく最初にマッチした行が勝ちます。

/// `Loaded image: <ref>` 行のラベル
const LOADED_IMAGE_LABEL: &str = "Loaded image:";

/// コンテンツダイジェストの接頭辞
const DIGEST_PREFIX: &str = "sha256:";

/// 短縮ダイジェストの長さ（docker CLI の短縮IDと同じ）
const SHORT_DIGEST_LEN: usize = 12;

/// ロード応答テキストからタグ付けに使えるイメージIDを取り出す
///
/// 見つからない場合は空文字列を返します。呼び出し側はこれを
/// 「応答を解釈できなかった」失敗として扱ってください。
///
/// # Examples
/// - `Loaded image: myimg:latest` -> `myimg:latest`
/// - `Loaded image: sha256:abcdef0123456789` -> `sha256:abcdef0123456789`
/// - `Loaded image ID: sha256:abcdef0123456789` -> `sha256:abcdef012345`
pub fn extract_image_id(load_output: &str) -> String {
    for line in load_output.lines() {
        if line.contains(LOADED_IMAGE_LABEL)
            && let Some((_, rest)) = line.split_once(':')
            && rest.contains(':')
        {
            // 参照自体に含まれる `:` (タグ区切り、ダイジェスト) は残す
            return rest.trim().to_string();
        }

        if let Some((_, rest)) = line.split_once(DIGEST_PREFIX) {
            let id = rest.trim();
            if id.chars().count() >= SHORT_DIGEST_LEN {
                let short: String = id.chars().take(SHORT_DIGEST_LEN).collect();
                return format!("{}{}", DIGEST_PREFIX, short);
            }
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_image_reference() {
        assert_eq!(
            extract_image_id("Loaded image: myimg:latest\n"),
            "myimg:latest"
        );
    }

    #[test]
    fn test_loaded_image_with_registry_port() {
        assert_eq!(
            extract_image_id("Loaded image: localhost:5000/app:dev"),
            "localhost:5000/app:dev"
        );
    }

    #[test]
    fn test_loaded_image_digest_is_not_truncated() {
        assert_eq!(
            extract_image_id("Loaded image: sha256:abcdef012345678901234567890123"),
            "sha256:abcdef012345678901234567890123"
        );
    }

    #[test]
    fn test_bare_digest_is_shortened() {
        assert_eq!(
            extract_image_id("sha256:abcdef0123456789"),
            "sha256:abcdef012345"
        );
    }

    #[test]
    fn test_loaded_image_id_line_is_shortened() {
        // "Loaded image ID:" はラベルに一致しないのでダイジェストとして扱う
        assert_eq!(
            extract_image_id("Loaded image ID: sha256:0123456789abcdef0123"),
            "sha256:0123456789ab"
        );
    }

    #[test]
    fn test_loaded_image_single_colon_yields_nothing() {
        // ":" が1つしかない行は参照として採用しない
        assert_eq!(extract_image_id("Loaded image: myimg"), "");
    }

    #[test]
    fn test_short_digest_line_is_skipped() {
        let output = "sha256:abc\nLoaded image: app:v2\n";
        assert_eq!(extract_image_id(output), "app:v2");
    }

    #[test]
    fn test_short_digest_only_is_empty() {
        assert_eq!(extract_image_id("sha256:0123456789a"), "");
    }

    #[test]
    fn test_digest_with_surrounding_whitespace() {
        assert_eq!(
            extract_image_id("   sha256:   fedcba9876543210fedcba  \r\n"),
            "sha256:fedcba987654"
        );
    }

    #[test]
    fn test_no_markers() {
        assert_eq!(extract_image_id(""), "");
        assert_eq!(extract_image_id("Loading layer 1/3\nDone\n"), "");
    }

    #[test]
    fn test_first_matching_line_wins() {
        let output = "sha256:1111111111111111\nLoaded image: app:latest\n";
        assert_eq!(extract_image_id(output), "sha256:111111111111");

        let output = "Loaded image: app:latest\nsha256:1111111111111111\n";
        assert_eq!(extract_image_id(output), "app:latest");
    }

    #[test]
    fn test_label_checked_before_digest_on_same_line() {
        assert_eq!(
            extract_image_id("Loaded image: app@sha256:0123456789abcdef"),
            "app@sha256:0123456789abcdef"
        );
    }

    #[test]
    fn test_is_pure() {
        let output = "noise\nLoaded image: hello:1.0\n";
        assert_eq!(extract_image_id(output), extract_image_id(output));
    }
}
