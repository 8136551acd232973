//! Peer-credential authorization (spec §4.1): the broker only serves
//! connections from its own process principal. Uses `SO_PEERCRED` directly
//! via `libc`, already a teacher dependency (`eric8810-authy`'s vault module
//! links `libc` for `getuid`), rather than pulling in `nix`'s higher-level
//! wrapper for a single syscall.

use std::os::unix::io::AsRawFd;

use tokio::net::UnixStream;

/// The peer's effective UID, read via `getsockopt(SO_PEERCRED)`.
pub fn peer_uid(stream: &UnixStream) -> std::io::Result<u32> {
    #[repr(C)]
    struct UCred {
        pid: libc::pid_t,
        uid: libc::uid_t,
        gid: libc::gid_t,
    }

    let fd = stream.as_raw_fd();
    let mut cred = UCred { pid: 0, uid: 0, gid: 0 };
    let mut len = std::mem::size_of::<UCred>() as libc::socklen_t;

    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut UCred as *mut libc::c_void,
            &mut len,
        )
    };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(cred.uid)
}

/// True when the connecting peer's UID matches this process's effective UID
/// (spec §4.1 "if it does not equal the current process principal, close
/// the connection without reading").
pub fn is_same_principal(stream: &UnixStream) -> bool {
    match peer_uid(stream) {
        Ok(uid) => uid == unsafe { libc::geteuid() },
        Err(e) => {
            tracing::warn!(error = %e, "failed to read peer credentials, rejecting connection");
            false
        }
    }
}
