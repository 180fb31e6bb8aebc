//! Small filesystem helpers.

use std::{io::Write, path::Path};

use anyhow::Context;

/// Atomically replace `path` with `bytes`: write a sibling temp file, set
/// its mode, then rename it into place. Readers never observe a torn file.
pub fn write_file_atomic(
    path: &Path,
    bytes: &[u8],
    mode: u32,
) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("No parent directory: {}", path.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Could not create temp file in {}", dir.display()))?;
    tmp.write_all(bytes).context("Could not write temp file")?;
    tmp.flush().context("Could not flush temp file")?;

    #[cfg(unix)]
    {
        use std::{fs::Permissions, os::unix::fs::PermissionsExt};
        tmp.as_file()
            .set_permissions(Permissions::from_mode(mode))
            .context("Could not set file mode")?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.persist(path)
        .with_context(|| format!("Could not persist {}", path.display()))?;
    Ok(())
}
