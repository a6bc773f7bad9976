//! Bus transport boundary
//!
//! The raw I2C primitives (file-descriptor `write`/`read`, `ioctl`
//! `I2C_RDWR`) live outside this crate. A [`Transport`] hands the codec
//! whole byte buffers and reports failures as errno values; everything else
//! (timing, retries, validation) happens on this side of the trait.

use thiserror::Error;

/// I/O error (`EIO`), historically the signature of a flaky display.
pub const EIO: i32 = 5;
/// No such device or address (`ENXIO`), seen when a display NAKs.
pub const ENXIO: i32 = 6;
/// Resource temporarily unavailable (`EAGAIN`).
pub const EAGAIN: i32 = 11;
/// Device or resource busy (`EBUSY`).
pub const EBUSY: i32 = 16;

/// DDC/CI slave address of the display, 7-bit form.
pub const DDC_SLAVE_ADDR: u8 = 0x37;

/// Errno-like failure reported by a transport call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed with errno {errno}")]
pub struct TransportError {
    /// Positive host errno value.
    pub errno: i32,
    pub operation: &'static str,
}

impl TransportError {
    pub fn new(errno: i32, operation: &'static str) -> Self {
        Self { errno, operation }
    }

    /// Errors worth another attempt on the same bus.
    pub fn is_transient(&self) -> bool {
        matches!(self.errno, EIO | ENXIO | EAGAIN | EBUSY)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError { errno: err.raw_os_error().unwrap_or(EIO), operation: "io" }
    }
}

/// Byte-level access to one display's DDC channel.
///
/// Implementations return exactly what the bus produced. Partial transfers
/// are reported through the returned length and turned into data-integrity
/// errors by the session layer.
pub trait Transport {
    /// Write `bytes` to `dest_addr`. Returns the number of bytes accepted.
    fn write(&mut self, dest_addr: u8, bytes: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `count` bytes from `dest_addr`, one byte per bus
    /// transaction when `single_byte` is set.
    fn read(
        &mut self,
        dest_addr: u8,
        single_byte: bool,
        count: usize,
    ) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, dest_addr: u8, bytes: &[u8]) -> Result<usize, TransportError> {
        (**self).write(dest_addr, bytes)
    }

    fn read(
        &mut self,
        dest_addr: u8,
        single_byte: bool,
        count: usize,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).read(dest_addr, single_byte, count)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, dest_addr: u8, bytes: &[u8]) -> Result<usize, TransportError> {
        (**self).write(dest_addr, bytes)
    }

    fn read(
        &mut self,
        dest_addr: u8,
        single_byte: bool,
        count: usize,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).read(dest_addr, single_byte, count)
    }
}
