use norsim::store::FileStore;
use std::path::Path;

/// Create an erased backing file of `size_kb` KiB.
pub fn run(path: &Path, size_kb: u64) -> anyhow::Result<()> {
    let size = size_kb
        .checked_mul(1024)
        .ok_or_else(|| anyhow::anyhow!("Size too large: {}kB", size_kb))?;
    if size == 0 {
        anyhow::bail!("Size must be greater than zero");
    }
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing file {}", path.display());
    }

    FileStore::create(path, size)?;
    println!("Created {} ({} bytes, erased)", path.display(), size);
    Ok(())
}
