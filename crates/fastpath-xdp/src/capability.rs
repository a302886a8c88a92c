//! XDP capability probe
//!
//! Reads kernel version and mount table from procfs and tries to open an
//! `AF_XDP` socket. The procfs root is injectable for tests.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;

/// Oldest kernel with AF_XDP sockets
pub const MIN_KERNEL: KernelVersion = KernelVersion { major: 4, minor: 18 };

/// `major.minor` kernel release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
}

impl KernelVersion {
    /// Parse the leading `major.minor` of a release string (`6.8.0-45-generic`)
    pub fn parse(release: &str) -> Option<Self> {
        let mut parts = release.trim().split(|c: char| !c.is_ascii_digit());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Self { major, minor })
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What the host offers for XDP
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct XdpCapability {
    /// Kernel and socket family both allow AF_XDP
    pub supported: bool,
    pub kernel: Option<KernelVersion>,
    /// A `bpf` filesystem is mounted (needed to pin maps)
    pub bpf_fs_mounted: bool,
    /// `socket(AF_XDP, ...)` is accepted by the kernel
    pub af_xdp_socket: bool,
}

impl XdpCapability {
    /// Probe the running host
    pub fn probe() -> Self {
        Self::probe_with(Path::new("/proc"), af_xdp_socket_available())
    }

    /// Probe against a procfs tree; the socket check is passed in
    pub fn probe_with(proc_root: &Path, af_xdp_socket: bool) -> Self {
        let kernel = fs::read_to_string(proc_root.join("sys/kernel/osrelease"))
            .ok()
            .and_then(|s| KernelVersion::parse(&s));

        let bpf_fs_mounted = fs::read_to_string(proc_root.join("mounts"))
            .map(|s| mounts_have_bpffs(&s))
            .unwrap_or(false);

        let supported = cfg!(target_os = "linux")
            && af_xdp_socket
            && kernel.is_some_and(|k| k >= MIN_KERNEL);

        Self {
            supported,
            kernel,
            bpf_fs_mounted,
            af_xdp_socket,
        }
    }
}

/// Best-effort check used only for status reporting
pub fn is_xdp_supported() -> bool {
    XdpCapability::probe().supported
}

fn mounts_have_bpffs(mounts: &str) -> bool {
    mounts
        .lines()
        .any(|line| line.split_whitespace().nth(2) == Some("bpf"))
}

#[cfg(target_os = "linux")]
fn af_xdp_socket_available() -> bool {
    // SAFETY: plain socket(2) call; the fd is closed right away
    let fd = unsafe { libc::socket(libc::AF_XDP, libc::SOCK_RAW, 0) };
    if fd >= 0 {
        // SAFETY: fd was just returned by socket(2)
        unsafe { libc::close(fd) };
        return true;
    }

    // EPERM/EACCES: the family exists, we just lack CAP_NET_RAW
    matches!(
        std::io::Error::last_os_error().raw_os_error(),
        Some(libc::EPERM) | Some(libc::EACCES)
    )
}

#[cfg(not(target_os = "linux"))]
fn af_xdp_socket_available() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_proc(release: &str, mounts: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sys/kernel")).unwrap();
        fs::write(dir.path().join("sys/kernel/osrelease"), release).unwrap();
        fs::write(dir.path().join("mounts"), mounts).unwrap();
        dir
    }

    #[test]
    fn test_kernel_version_parse() {
        assert_eq!(
            KernelVersion::parse("6.8.0-45-generic\n"),
            Some(KernelVersion { major: 6, minor: 8 })
        );
        assert_eq!(
            KernelVersion::parse("4.18"),
            Some(KernelVersion { major: 4, minor: 18 })
        );
        assert_eq!(KernelVersion::parse("garbage"), None);
        assert_eq!(KernelVersion::parse("5"), None);
        assert!(KernelVersion { major: 5, minor: 0 } > MIN_KERNEL);
        assert!(KernelVersion { major: 4, minor: 9 } < MIN_KERNEL);
        assert_eq!(MIN_KERNEL.to_string(), "4.18");
    }

    #[test]
    fn test_bpffs_detection() {
        let mounts = "proc /proc proc rw 0 0\nbpf /sys/fs/bpf bpf rw,nosuid 0 0\n";
        assert!(mounts_have_bpffs(mounts));
        assert!(!mounts_have_bpffs("proc /proc proc rw 0 0\n"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_probe_modern_kernel() {
        let proc_root = fake_proc("6.1.0\n", "bpf /sys/fs/bpf bpf rw 0 0\n");
        let cap = XdpCapability::probe_with(proc_root.path(), true);
        assert!(cap.supported);
        assert!(cap.bpf_fs_mounted);
        assert_eq!(cap.kernel, Some(KernelVersion { major: 6, minor: 1 }));
    }

    #[test]
    fn test_probe_old_kernel_or_no_socket() {
        let proc_root = fake_proc("4.15.0\n", "");
        assert!(!XdpCapability::probe_with(proc_root.path(), true).supported);

        let proc_root = fake_proc("6.1.0\n", "");
        assert!(!XdpCapability::probe_with(proc_root.path(), false).supported);
    }

    #[test]
    fn test_probe_missing_procfs() {
        let cap = XdpCapability::probe_with(Path::new("/nonexistent/proc"), true);
        assert!(!cap.supported);
        assert_eq!(cap.kernel, None);
        assert!(!cap.bpf_fs_mounted);
    }

    #[test]
    fn test_live_probe_does_not_panic() {
        let cap = XdpCapability::probe();
        assert_eq!(cap.supported, is_xdp_supported());
    }
}
