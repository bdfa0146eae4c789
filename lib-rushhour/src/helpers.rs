use std::fmt::Write as _;

use jiff::Timestamp;
use rand::Rng;

/// Seconds per generation slice. The rate model and the arrival sampler both
/// speak in events per slice.
pub const SLICE_SECS: u64 = 1;

pub(crate) const SECS_PER_MINUTE: f64 = 60.0;

#[macro_export]
macro_rules! map_err {
    ($variant:ident, $err_ty:ty) => {
        impl From<$err_ty> for Error {
            fn from(err: $err_ty) -> Self {
                Error::$variant(err)
            }
        }
    };
}

/// RFC 3339 with millisecond precision, the encoding every timestamp field
/// carries on the wire.
pub(crate) fn rfc3339_millis(ts: Timestamp) -> String {
    format!("{ts:.3}")
}

pub(crate) fn hex_token<R: Rng + ?Sized>(rng: &mut R, n_bytes: usize) -> String {
    let mut out = String::with_capacity(n_bytes * 2);
    for _ in 0..n_bytes {
        let byte: u8 = rng.random();
        let _ = write!(out, "{byte:02x}");
    }
    out
}
