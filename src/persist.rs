use std::io::Write;
use std::path::Path;

/// Write `bytes` to a sibling `.tmp` file, fsync, then rename over `path`.
/// Readers see either the old contents or the new, never a torn file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
