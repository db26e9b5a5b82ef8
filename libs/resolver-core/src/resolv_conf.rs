//! Publication of the upstream server view as a `resolv.conf` file.

use std::fs;
use std::io::Write as _;
use std::net::IpAddr;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;

use anyhow::{Context as _, Result};

/// The libc resolver reads at most this many `nameserver` lines.
pub const MAXNS: usize = 3;

const HEADER: &str = "\
# This file is managed by resolverd(8). Do not edit.
#
# Third party programs must not access this file directly, but only
# through the symlink at /etc/resolv.conf.

";

/// Atomically replace `path` with a `resolv.conf` listing `servers` in
/// order. Readers never observe a partially written file.
pub(crate) fn write(path: &Path, servers: impl Iterator<Item = IpAddr>) -> Result<()> {
    let directory = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".resolv.conf.")
        .tempfile_in(directory)
        .with_context(|| format!("Failed to create temporary file in {}", directory.display()))?;

    if let Err(e) = write_contents(&mut temp, servers) {
        // The temporary file unlinks itself on drop.
        let _ = fs::remove_file(path);

        return Err(e);
    }

    if let Err(e) = temp.persist(path) {
        let _ = fs::remove_file(path);

        return Err(e.error)
            .with_context(|| format!("Failed to move temporary file over {}", path.display()));
    }

    Ok(())
}

fn write_contents(
    temp: &mut tempfile::NamedTempFile,
    servers: impl Iterator<Item = IpAddr>,
) -> Result<()> {
    temp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o644))
        .context("Failed to set file mode")?;

    temp.write_all(HEADER.as_bytes())
        .context("Failed to write header")?;

    for (count, address) in servers.enumerate() {
        if count == MAXNS {
            temp.write_all(
                b"# Too many DNS servers configured, the following entries may be ignored\n",
            )
            .context("Failed to write overflow comment")?;
        }

        writeln!(temp, "nameserver {address}").context("Failed to write nameserver line")?;
    }

    temp.flush().context("Failed to flush")?;
    temp.as_file().sync_all().context("Failed to sync")?;

    Ok(())
}
