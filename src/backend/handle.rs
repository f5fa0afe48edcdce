// Exported memory handle ownership
//
// The handle returned by the driver references an image's backing device
// memory and is meant to be imported by another API (OpenGL, CUDA, ...).
// Nothing on this side ever imports it; we only compare values and make sure
// the OS resource is released again when the image goes away.

#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
#[cfg(windows)]
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};

/// Owned OS handle to exported image memory.
///
/// Closes the underlying descriptor/handle on drop so repeated runs don't
/// leak kernel objects.
#[derive(Debug)]
pub struct ExternalHandle {
    #[cfg(unix)]
    fd: OwnedFd,
    #[cfg(windows)]
    handle: OwnedHandle,
}

impl ExternalHandle {
    /// Takes ownership of a file descriptor returned by `vkGetMemoryFdKHR`.
    ///
    /// # Safety
    /// `fd` must be a valid open descriptor that nothing else closes.
    #[cfg(unix)]
    pub unsafe fn from_raw_fd(fd: i32) -> Self {
        Self {
            fd: OwnedFd::from_raw_fd(fd),
        }
    }

    /// Takes ownership of a handle returned by `vkGetMemoryWin32HandleKHR`.
    ///
    /// # Safety
    /// `handle` must be a valid NT handle that nothing else closes.
    #[cfg(windows)]
    pub unsafe fn from_raw_handle(handle: *mut std::ffi::c_void) -> Self {
        Self {
            handle: OwnedHandle::from_raw_handle(handle),
        }
    }

    /// Raw handle value, for equality checks and diagnostics only.
    pub fn raw_value(&self) -> u64 {
        #[cfg(unix)]
        {
            self.fd.as_raw_fd() as u64
        }
        #[cfg(windows)]
        {
            self.handle.as_raw_handle() as u64
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::fd::IntoRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Duration;

    #[test]
    fn wraps_and_releases_a_descriptor() {
        let (mut ours, theirs) = UnixStream::pair().expect("socket pair");
        ours.set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");

        let fd = theirs.into_raw_fd();
        let handle = unsafe { ExternalHandle::from_raw_fd(fd) };
        assert_eq!(handle.raw_value(), fd as u64);

        // The peer only sees end-of-stream once the wrapped descriptor is
        // actually closed; descriptor-number reuse by other threads cannot
        // fake that.
        drop(handle);
        let mut buf = [0u8; 1];
        assert_eq!(ours.read(&mut buf).expect("read from peer"), 0);
    }
}
