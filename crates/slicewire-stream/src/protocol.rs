//! Wire-level constants.

/// Encoding major version. Must match exactly on receipt.
pub const ENCODING_MAJOR: u8 = 1;

/// Highest encoding minor version this implementation decodes.
pub const ENCODING_MINOR: u8 = 0;

/// Bytes taken by an encapsulation header: 4-byte length, major, minor.
pub const ENCAPS_HEADER_SIZE: usize = 6;

/// Bytes taken by a slice header: the 4-byte length.
pub const SLICE_HEADER_SIZE: usize = 4;

/// Size-field marker announcing a 4-byte size follows.
pub const SIZE_ESCAPE: u8 = 255;

/// Largest size encoded in a single byte.
pub const MAX_SHORT_SIZE: usize = 254;

/// Type ID of the root of every class hierarchy.
pub const BASE_OBJECT_TYPE_ID: &str = "::Ice::Object";
