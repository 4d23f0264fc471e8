use crate::container::ContainerSpec;
use crate::error::BuildResult;
use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;

pub struct ContextBuilder;

impl ContextBuilder {
    /// コンテナ定義からビルドコンテキストを tar.gz アーカイブとして作成
    ///
    /// アーカイブには `Dockerfile` と、追加ファイルを `files/<index>` として含めます。
    pub fn create_context(spec: &ContainerSpec) -> BuildResult<Vec<u8>> {
        tracing::debug!(
            "Creating build context for {} ({} files)",
            spec.base_image(),
            spec.files().len()
        );

        let mut archive_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut archive_data, Compression::default());
            let mut tar = Builder::new(encoder);

            let dockerfile = spec.to_dockerfile();
            Self::append_file(&mut tar, "Dockerfile", dockerfile.as_bytes(), 0o644)?;

            for (index, file) in spec.files().iter().enumerate() {
                Self::append_file(
                    &mut tar,
                    &ContainerSpec::context_path(index),
                    file.contents.as_bytes(),
                    file.permissions,
                )?;
            }

            tar.into_inner()?.finish()?;
        }

        tracing::debug!("Build context created: {} bytes", archive_data.len());

        Ok(archive_data)
    }

    fn append_file<W: std::io::Write>(
        tar: &mut Builder<W>,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> BuildResult<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(mode);
        header.set_cksum();

        tar.append_data(&mut header, path, contents)?;
        Ok(())
    }
}
